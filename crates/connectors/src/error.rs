use thiserror::Error;

/// Errors from the source read path.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Any SQL driver error.
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    /// HTTP transport failure against an API source.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The strategy asked this source for something it cannot express.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Connection descriptor could not be turned into a working adapter.
    #[error("bad connection: {0}")]
    BadConnection(String),

    /// A row arrived in a shape we could not decode.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Errors from the destination write path.
#[derive(Debug, Error)]
pub enum DestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The destination rejected a statement; body carries its error text.
    #[error("destination returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("decode error: {0}")]
    Decode(String),
}

impl DestError {
    /// Transient failures are retried; server-side statement errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            DestError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            DestError::Server { status, .. } => *status >= 500,
            DestError::Decode(_) => false,
        }
    }
}
