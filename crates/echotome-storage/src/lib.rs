//! Persistent state for the Echotome engine
//!
//! Everything that touches disk lives here: the device identity keystore,
//! ritual certificates, vault metadata and ciphertexts, and the ephemeral
//! session directories with their secure-deletion lifecycle.
//!
//! ## Security posture
//!
//! - **Identity**: Ed25519 keypair, owner-only files, atomic writes, refuses
//!   group/world-readable private keys
//! - **Certificates**: canonical-JSON signing, verification with sub-reasons
//! - **Vaults**: atomic metadata updates, ciphertext-only blobs
//! - **Sessions**: time-limited plaintext windows, zeroized keys, three-pass
//!   secure deletion

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod certificates;
pub mod error;
pub mod identity;
pub mod paths;
pub mod recovery;
pub mod sessions;
pub mod vaults;
pub mod wipe;

pub use certificates::{
    certificate_summary, create_certificate, verify_certificate, verify_track_audio,
    CertificatePayload, CertificateStore, CertificateSummary, RitualCertificate, RitualTrack,
    ACCEPTED_MAJOR_VERSION, ROC_VERSION,
};
pub use error::{CertificateReason, Error, Result};
pub use identity::{
    fingerprint, import_public_base64, verify_signature, IdentityKeypair, IdentityKeystore,
};
pub use paths::{atomic_write, create_private_dir, DataRoot};
pub use recovery::{
    create_recovery_config, disable_recovery, generate_recovery_codes, hash_recovery_codes,
    validate_and_mark_used, verify_recovery_code, RecoveryConfig, DEFAULT_CODE_COUNT,
};
pub use sessions::{
    CleanupHandle, SessionInfo, SessionManager, SessionState, DEFAULT_CLEANUP_INTERVAL,
    MAX_ACTIVE_SESSIONS, PENDING_UNLOCK_TIMEOUT,
};
pub use vaults::{Vault, VaultStats, VaultStore};
pub use wipe::{secure_delete_file, wipe_directory};
