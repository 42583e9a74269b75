//! Privacy profile definitions for the Echotome engine
//!
//! A profile selects KDF hardness, audio weighting, timing enforcement, and
//! session policy. Profiles are a closed set; all constants live here so that
//! every crate agrees on them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};

/// Privacy profile enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrivacyProfile {
    /// Passphrase-only encryption, no audio binding
    QuickLock,
    /// Audio-enhanced encryption with timing enforcement
    RitualLock,
    /// Maximum hardness, full audio dependence, strict timing
    BlackVault,
}

/// Argon2id parameters for a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Iteration count (t_cost)
    pub time_cost: u32,
    /// Memory cost in KiB (m_cost)
    pub memory_kib: u32,
    /// Parallelism (p_cost)
    pub parallelism: u32,
}

/// Session lifetime policy for a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Default session TTL in seconds
    pub default_ttl_secs: u64,
    /// Maximum session TTL in seconds (extension cap)
    pub max_ttl_secs: u64,
    /// Lock immediately when the host goes to background
    pub background_autolock: bool,
    /// Overwrite session files before unlinking
    pub secure_delete: bool,
}

/// Full constant table for a profile
#[derive(Debug, Clone, Copy)]
pub struct ProfileParams {
    /// Profile tag
    pub profile: PrivacyProfile,
    /// Human-readable name
    pub name: &'static str,
    /// Wire identifier used in ciphertext headers
    pub profile_id: u8,
    /// Argon2id parameters
    pub kdf: KdfParams,
    /// Fraction of audio-derived key material mixed into the master key
    pub audio_weight: f64,
    /// Whether playback timing is enforced during unlock
    pub timing_enforced: bool,
    /// Whether a live microphone capture is required for the ritual
    pub mic_required: bool,
    /// Session lifetime policy
    pub session: SessionPolicy,
}

impl PrivacyProfile {
    /// All profiles in ascending hardness order
    pub const ALL: [PrivacyProfile; 3] = [
        PrivacyProfile::QuickLock,
        PrivacyProfile::RitualLock,
        PrivacyProfile::BlackVault,
    ];

    /// Get the constant table for this profile
    pub const fn params(self) -> ProfileParams {
        match self {
            PrivacyProfile::QuickLock => ProfileParams {
                profile: PrivacyProfile::QuickLock,
                name: "QuickLock",
                profile_id: 1,
                kdf: KdfParams {
                    time_cost: 1,
                    memory_kib: 32 * 1024,
                    parallelism: 4,
                },
                audio_weight: 0.0,
                timing_enforced: false,
                mic_required: false,
                session: SessionPolicy {
                    default_ttl_secs: 30 * 60,
                    max_ttl_secs: 2 * 60 * 60,
                    background_autolock: false,
                    secure_delete: false,
                },
            },
            PrivacyProfile::RitualLock => ProfileParams {
                profile: PrivacyProfile::RitualLock,
                name: "RitualLock",
                profile_id: 2,
                kdf: KdfParams {
                    time_cost: 3,
                    memory_kib: 128 * 1024,
                    parallelism: 4,
                },
                audio_weight: 0.7,
                timing_enforced: true,
                mic_required: false,
                session: SessionPolicy {
                    default_ttl_secs: 15 * 60,
                    max_ttl_secs: 60 * 60,
                    background_autolock: false,
                    secure_delete: true,
                },
            },
            PrivacyProfile::BlackVault => ProfileParams {
                profile: PrivacyProfile::BlackVault,
                name: "BlackVault",
                profile_id: 3,
                kdf: KdfParams {
                    time_cost: 5,
                    memory_kib: 512 * 1024,
                    parallelism: 4,
                },
                audio_weight: 1.0,
                timing_enforced: true,
                mic_required: true,
                session: SessionPolicy {
                    default_ttl_secs: 5 * 60,
                    max_ttl_secs: 15 * 60,
                    background_autolock: true,
                    secure_delete: true,
                },
            },
        }
    }

    /// Wire identifier used in ciphertext headers
    pub const fn profile_id(self) -> u8 {
        self.params().profile_id
    }

    /// Human-readable profile name
    pub const fn name(self) -> &'static str {
        self.params().name
    }

    /// Whether the master key is bound to the temporal hash
    pub const fn audio_bound(self) -> bool {
        !matches!(self, PrivacyProfile::QuickLock)
    }

    /// Look up a profile by wire identifier
    pub fn from_profile_id(id: u8) -> Option<PrivacyProfile> {
        PrivacyProfile::ALL
            .into_iter()
            .find(|p| p.profile_id() == id)
    }

    /// Parse a profile name, accepting the short aliases the CLI clients use
    /// (`q`, `quick`, `r`, `ritual`, `b`, `black`, ...). Case-insensitive,
    /// ignores `-` and `_`.
    pub fn parse(name: &str) -> Option<PrivacyProfile> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "q" | "quick" | "quicklock" => Some(PrivacyProfile::QuickLock),
            "r" | "ritual" | "rituallock" => Some(PrivacyProfile::RitualLock),
            "b" | "black" | "blackvault" => Some(PrivacyProfile::BlackVault),
            _ => None,
        }
    }

    /// One-line description used by clients when listing profiles
    pub const fn describe(self) -> &'static str {
        match self {
            PrivacyProfile::QuickLock => {
                "Fast passphrase-only encryption; no audio involvement"
            }
            PrivacyProfile::RitualLock => {
                "Audio-enhanced encryption; the ritual must be performed in real time"
            }
            PrivacyProfile::BlackVault => {
                "Maximum hardness; full audio dependence, strict timing, aggressive session lockdown"
            }
        }
    }
}
