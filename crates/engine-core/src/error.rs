use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] sled::Error),

    #[error("failed to encode store record: {0}")]
    Encode(String),

    #[error("failed to decode store record: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to persist cursor for dataset {dataset_id}: {message}")]
    SaveCursor { dataset_id: String, message: String },

    #[error("failed to load cursor for dataset {dataset_id}: {message}")]
    LoadCursor { dataset_id: String, message: String },

    #[error("failed to persist job {job_id}: {message}")]
    SaveJob { job_id: String, message: String },

    #[error("failed to load job {job_id}: {message}")]
    LoadJob { job_id: String, message: String },
}
