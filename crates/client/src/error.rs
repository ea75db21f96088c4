//! Client-side error types.

/// Errors surfaced by the shared transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The outbound frame could not be serialized to JSON.
    #[error("Failed to serialize frame: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The transport's connection task has exited (released, cancelled,
    /// or terminally failed); the frame was not sent.
    #[error("Transport is closed")]
    Closed,
}
