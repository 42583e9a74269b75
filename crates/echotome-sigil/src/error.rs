//! Error types

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Steganography errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Image is not a valid RGB buffer
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Payload does not fit into the carrier image
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Embedded payload failed magic or checksum validation
    #[error("Payload corrupt: {0}")]
    PayloadCorrupt(String),

    /// Declared payload length exceeds the image capacity
    #[error("Payload truncated: {0}")]
    PayloadTruncated(String),

    /// Payload JSON error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
