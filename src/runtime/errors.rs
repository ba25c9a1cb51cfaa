//! Error types for the decode runtime

/// Error type for decode operations
///
/// Recoverable errors are never thrown across the decode thread boundary.
/// The stack stores the last one and callers poll it once the stack is back
/// in [`DecodeState::Stopped`](super::stack::DecodeState::Stopped).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// A decoder in the stack is missing one of its required channel bindings
    #[error("{0}")]
    Configuration(String),

    /// The snapshot cannot provide samples for a bound channel
    #[error("{0}")]
    DataUnavailable(String),

    /// A decoder could not be created or started, or rejected a chunk
    #[error("{0}")]
    DecoderFailure(String),

    /// An annotation could not be allocated or stored
    #[error("Out of memory")]
    OutOfMemory,

    /// A decoder emitted a class that maps to no row
    #[error("Unexpected annotation: decoder = {decoder}, format = {format}")]
    UnexpectedAnnotation { decoder: String, format: u32 },
}

impl From<std::collections::TryReserveError> for DecodeError {
    fn from(_: std::collections::TryReserveError) -> Self {
        DecodeError::OutOfMemory
    }
}

/// Result type for decode operations
pub type DecodeResult<T = ()> = Result<T, DecodeError>;

pub(crate) const MISSING_CHANNELS: &str = "One or more required channels have not been specified";
pub(crate) const CHANNEL_NOT_ENABLED: &str = "At least one of selected channels are not enabled.";
pub(crate) const INSTANCE_FAILED: &str = "Failed to create decoder instance";
