//! Recovery codes
//!
//! Optional fallback for users who do not want a fully unrecoverable vault.
//! Codes are shown once at creation; only their SHA-256 hashes are stored.
//! Using a code increments a use counter so clients can surface recovery
//! events.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default number of codes generated per vault
pub const DEFAULT_CODE_COUNT: usize = 5;

/// Recovery configuration carried in the certificate payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Whether recovery is enabled
    pub enabled: bool,
    /// SHA-256 hashes (hex) of the recovery codes
    pub codes_hashes: Vec<String>,
    /// Number of times a recovery code has been used
    #[serde(default)]
    pub use_count: u32,
    /// Unix timestamp of the last recovery use
    #[serde(default)]
    pub last_used_at: Option<i64>,
}

impl RecoveryConfig {
    /// A disabled configuration (unrecoverable vault)
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            codes_hashes: Vec::new(),
            use_count: 0,
            last_used_at: None,
        }
    }

    /// Number of codes that have not been consumed yet
    pub fn codes_remaining(&self) -> usize {
        self.codes_hashes.len().saturating_sub(self.use_count as usize)
    }

    /// Human-readable recovery posture
    pub fn describe(&self) -> String {
        if !self.enabled || self.codes_hashes.is_empty() {
            return "Unrecoverable (no recovery codes)".to_string();
        }
        match self.codes_remaining() {
            0 => "Unrecoverable (all recovery codes used)".to_string(),
            n => format!("Recoverable ({n} codes remaining)"),
        }
    }
}

/// Generate recovery codes in `XXXX-XXXX-XXXX-XXXX` form
pub fn generate_recovery_codes(count: usize) -> Vec<String> {
    (0..count)
        .map(|_| {
            let mut bytes = [0u8; 8];
            OsRng.fill_bytes(&mut bytes);
            let hx = hex::encode_upper(bytes);
            format!("{}-{}-{}-{}", &hx[0..4], &hx[4..8], &hx[8..12], &hx[12..16])
        })
        .collect()
}

/// Hash codes for storage; the plaintext codes are never persisted
pub fn hash_recovery_codes(codes: &[String]) -> Vec<String> {
    codes
        .iter()
        .map(|code| hex::encode(Sha256::digest(normalize(code))))
        .collect()
}

/// Create an enabled configuration plus the one-time plaintext codes
pub fn create_recovery_config(count: usize) -> (RecoveryConfig, Vec<String>) {
    let codes = generate_recovery_codes(count);
    let config = RecoveryConfig {
        enabled: true,
        codes_hashes: hash_recovery_codes(&codes),
        use_count: 0,
        last_used_at: None,
    };
    (config, codes)
}

/// Check a code against the stored hashes
pub fn verify_recovery_code(code: &str, hashes: &[String]) -> bool {
    let digest = hex::encode(Sha256::digest(normalize(code)));
    hashes.iter().any(|h| *h == digest)
}

/// Validate a code and mark the configuration as used
///
/// Returns `true` when the code was valid; side effect is recorded on the
/// configuration so callers persist it.
pub fn validate_and_mark_used(config: &mut RecoveryConfig, code: &str, now: i64) -> bool {
    if !config.enabled || !verify_recovery_code(code, &config.codes_hashes) {
        return false;
    }
    config.use_count += 1;
    config.last_used_at = Some(now);
    tracing::warn!(
        use_count = config.use_count,
        "Recovery code used"
    );
    true
}

/// Disable recovery, clearing all code hashes
pub fn disable_recovery(config: &mut RecoveryConfig) {
    config.enabled = false;
    config.codes_hashes.clear();
}

fn normalize(code: &str) -> Vec<u8> {
    code.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_ascii_uppercase()
        .into_bytes()
}
