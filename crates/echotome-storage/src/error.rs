//! Error types for Echotome storage

use std::fmt;

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Core engine error
    #[error(transparent)]
    Core(#[from] echotome_core::Error),

    /// Identity keystore error
    #[error("Identity error: {0}")]
    Identity(String),

    /// Refused operation for security reasons (permissions, key exposure)
    #[error("Security error: {0}")]
    Security(String),

    /// Certificate failed verification
    #[error("Certificate invalid ({reason}): {detail}")]
    CertificateInvalid {
        /// Which check failed
        reason: CertificateReason,
        /// Machine-readable detail
        detail: String,
    },

    /// Input validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Session exists but its TTL has elapsed
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// No session with the given id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Too many concurrent sessions
    #[error("Session cap exceeded: {0}")]
    SessionCapExceeded(String),
}

impl Error {
    /// Build a certificate error with a sub-reason
    pub fn certificate(reason: CertificateReason, detail: impl Into<String>) -> Self {
        Error::CertificateInvalid {
            reason,
            detail: detail.into(),
        }
    }
}

/// Sub-reasons for certificate verification failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateReason {
    /// Ed25519 signature did not verify
    Signature,
    /// A track's audio hash did not match the presented audio
    AudioHash,
    /// Version outside the accepted range
    Version,
    /// Signer public key does not match the declared owner
    Owner,
    /// Document structure is unreadable
    Malformed,
}

impl fmt::Display for CertificateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertificateReason::Signature => write!(f, "signature"),
            CertificateReason::AudioHash => write!(f, "audio-hash"),
            CertificateReason::Version => write!(f, "version"),
            CertificateReason::Owner => write!(f, "owner"),
            CertificateReason::Malformed => write!(f, "malformed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_error_carries_reason() {
        let err = Error::certificate(CertificateReason::Signature, "bad signature bytes");
        match err {
            Error::CertificateInvalid { reason, .. } => {
                assert_eq!(reason, CertificateReason::Signature);
            }
            other => panic!("Unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(CertificateReason::AudioHash.to_string(), "audio-hash");
        assert_eq!(CertificateReason::Owner.to_string(), "owner");
    }
}
