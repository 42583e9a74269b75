//! Error types for the enrollment and unlock pipeline

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors
///
/// Most failures bubble up from the core, storage, or sigil layers with
/// their original category intact; the pipeline adds only request-level
/// validation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Core engine error (audio, KDF, TSC, AEAD)
    #[error(transparent)]
    Core(#[from] echotome_core::Error),

    /// Storage error (identity, certificates, vaults, sessions)
    #[error(transparent)]
    Storage(#[from] echotome_storage::Error),

    /// Steganography error
    #[error(transparent)]
    Sigil(#[from] echotome_sigil::Error),

    /// Malformed request
    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Whether this failure means the presented ritual did not match
    pub fn is_ritual_mismatch(&self) -> bool {
        matches!(
            self,
            Error::Core(echotome_core::Error::TemporalMismatch(_))
                | Error::Core(echotome_core::Error::AeadFailure(_))
                | Error::Storage(echotome_storage::Error::CertificateInvalid { .. })
        )
    }
}
