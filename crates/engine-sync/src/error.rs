use connectors::error::{DestError, SourceError};
use engine_core::error::StateError;
use model::{connection::SourceKind, dataset::SyncStrategyKind};
use thiserror::Error;

/// Unrecoverable sync failures. Cancellation is not one of them: a
/// cooperative exit returns the partial row count as a successful result.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A required column or parameter is missing and no fallback applies.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// This strategy/source combination is not implemented; the job fails
    /// rather than silently falling back.
    #[error("strategy {strategy} is not supported for {kind} sources")]
    UnsupportedSource {
        strategy: SyncStrategyKind,
        kind: SourceKind,
    },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Destination(#[from] DestError),

    #[error(transparent)]
    State(#[from] StateError),
}
