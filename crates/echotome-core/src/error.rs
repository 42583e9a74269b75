//! Error types for the Echotome core engine

use std::fmt;

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Core engine errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or unusable input (empty passphrase, too-short audio, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No contiguous span of meaningful audio content was found
    #[error("No active region: {0}")]
    NoActiveRegion(String),

    /// Temporal salt chain frames arrived out of order
    #[error("Ordering error: {0}")]
    Ordering(String),

    /// Temporal hash mismatch or playback speed outside the accepted window
    #[error("Temporal mismatch: {0}")]
    TemporalMismatch(String),

    /// AEAD authentication failure
    #[error("AEAD failure: {0}")]
    AeadFailure(String),

    /// Malformed ciphertext envelope
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Key derivation error
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),
}

impl Error {
    /// Get error category for logging and client-side classification
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidInput(_) => ErrorCategory::Input,
            Error::NoActiveRegion(_) => ErrorCategory::Audio,
            Error::Ordering(_) => ErrorCategory::Ordering,
            Error::TemporalMismatch(_) => ErrorCategory::Temporal,
            Error::AeadFailure(_) => ErrorCategory::Aead,
            Error::InvalidEnvelope(_) => ErrorCategory::Input,
            Error::KeyDerivation(_) => ErrorCategory::Keys,
        }
    }

    /// Get user-friendly error message. Never leaks cryptographic internals.
    pub fn user_message(&self) -> String {
        match self {
            Error::NoActiveRegion(_) => {
                "The audio is silent or too short to bind a ritual.".to_string()
            }
            Error::TemporalMismatch(_) => {
                "This audio doesn't match the ritual bound to this vault.".to_string()
            }
            Error::AeadFailure(_) => {
                "Unlock failed. Check the passphrase and the ritual audio.".to_string()
            }
            Error::InvalidInput(msg) => format!("Invalid input: {msg}"),
            _ => self.to_string(),
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Input validation errors
    Input,
    /// Audio analysis errors
    Audio,
    /// Frame ordering errors
    Ordering,
    /// Temporal verification errors
    Temporal,
    /// AEAD errors
    Aead,
    /// Key derivation errors
    Keys,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Input => write!(f, "Input"),
            ErrorCategory::Audio => write!(f, "Audio"),
            ErrorCategory::Ordering => write!(f, "Ordering"),
            ErrorCategory::Temporal => write!(f, "Temporal"),
            ErrorCategory::Aead => write!(f, "Aead"),
            ErrorCategory::Keys => write!(f, "Keys"),
        }
    }
}
