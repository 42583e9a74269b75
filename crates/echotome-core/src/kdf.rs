//! Audio-Field Key Derivation Function (AF-KDF)
//!
//! Derives the vault master key from a passphrase and the audio feature hash.
//! Argon2id (profile-tuned) hardens the passphrase; HKDF expands the audio
//! features; a profile-weighted bit mask controls how much audio-derived
//! material folds into the final key. Ritual profiles additionally bind the
//! effective encryption key to the temporal hash.

use crate::{Error, Result};
use argon2::{Algorithm, Argon2, ParamsBuilder, Version};
use data_encoding::BASE32_NOPAD;
use echotome_profiles::PrivacyProfile;
use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

/// Master key size in bytes
pub const KEY_SIZE: usize = 32;

/// Salt size fed to Argon2id
pub const SALT_SIZE: usize = 16;

/// Prefix of every rune id
pub const RUNE_PREFIX: &str = "ECH";

/// A 256-bit symmetric key, zeroized on drop
#[derive(Clone)]
pub struct MasterKey(Zeroizing<[u8; KEY_SIZE]>);

impl MasterKey {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material never reaches logs
        f.write_str("MasterKey(..)")
    }
}

impl PartialEq for MasterKey {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        self.0.ct_eq(&*other.0).into()
    }
}

impl Eq for MasterKey {}

/// Derive the master key from a passphrase and the audio feature hash
///
/// `feature_hash` is the canonical audio feature hash (or the multi-track
/// fold of several). The profile selects Argon2id cost and the audio weight.
pub fn derive_master_key(
    passphrase: &str,
    feature_hash: &[u8; 32],
    profile: PrivacyProfile,
) -> Result<MasterKey> {
    if passphrase.is_empty() {
        return Err(Error::InvalidInput("Empty passphrase".into()));
    }

    let salt = kdf_salt(feature_hash);
    let k_pw = derive_passphrase_key(passphrase, &salt, profile)?;
    let k_audio = derive_audio_key(&salt, feature_hash)?;
    let mask = mixing_mask(profile.params().audio_weight);

    let mut mixed = Zeroizing::new([0u8; KEY_SIZE]);
    for i in 0..KEY_SIZE {
        mixed[i] = k_pw[i] ^ (k_audio[i] & mask[i]);
    }

    let digest: [u8; 32] = Sha256::digest(&*mixed).into();
    Ok(MasterKey::from_bytes(digest))
}

/// Derive the effective encryption key for a profile
///
/// QuickLock uses the master key directly; ritual profiles bind it to the
/// temporal hash so the key only exists after a successful ritual.
pub fn effective_key(
    master: &MasterKey,
    temporal_hash: &[u8; 32],
    profile: PrivacyProfile,
) -> Result<MasterKey> {
    if profile.audio_bound() {
        temporal_bound_key(master, temporal_hash)
    } else {
        Ok(master.clone())
    }
}

/// Bind a master key to a temporal hash
pub fn temporal_bound_key(master: &MasterKey, temporal_hash: &[u8; 32]) -> Result<MasterKey> {
    let hk = Hkdf::<Sha256>::from_prk(master.as_bytes())
        .map_err(|_| Error::KeyDerivation("Invalid PRK length".into()))?;

    let mut info = Vec::with_capacity(16 + 32);
    info.extend_from_slice(b"echotome-tbk-v1");
    info.extend_from_slice(temporal_hash);

    let mut out = [0u8; KEY_SIZE];
    hk.expand(&info, &mut out)
        .map_err(|_| Error::KeyDerivation("HKDF expansion failed".into()))?;
    Ok(MasterKey::from_bytes(out))
}

/// Derive the human-legible vault identifier from the master key
pub fn rune_id(master: &MasterKey) -> String {
    let digest: [u8; 32] = Sha256::digest(master.as_bytes()).into();
    format!("{RUNE_PREFIX}-{}", BASE32_NOPAD.encode(&digest[..5]))
}

/// Fold per-track feature hashes into the AF-KDF input, in ritual order
pub fn combined_feature_hash(hashes: &[[u8; 32]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"echotome-multi-feat-v1");
    for h in hashes {
        hasher.update(h);
    }
    hasher.finalize().into()
}

/// Fold per-track temporal hashes into the key-binding input, in ritual order
pub fn combined_temporal_hash(hashes: &[[u8; 32]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"echotome-multi-tsc-v1");
    for h in hashes {
        hasher.update(h);
    }
    hasher.finalize().into()
}

/// The deterministic audio-weight bit mask
///
/// `round(weight * 256)` bits, allocated LSB-first as whole 0xFF bytes plus a
/// single low-bits remainder byte. The folded-bit fraction equals the weight
/// to within 1/256. This pattern is normative; changing it breaks every
/// existing vault.
pub fn mixing_mask(weight: f64) -> [u8; KEY_SIZE] {
    let bits = (weight.clamp(0.0, 1.0) * (KEY_SIZE * 8) as f64).round() as usize;
    let mut mask = [0u8; KEY_SIZE];
    for (i, slot) in mask.iter_mut().enumerate() {
        let remaining = bits.saturating_sub(i * 8);
        *slot = match remaining {
            0 => 0x00,
            r if r >= 8 => 0xFF,
            r => (1u8 << r) - 1,
        };
    }
    mask
}

fn kdf_salt(feature_hash: &[u8; 32]) -> [u8; SALT_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(b"echotome-afkdf-v1");
    hasher.update(feature_hash);
    let digest: [u8; 32] = hasher.finalize().into();
    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&digest[..SALT_SIZE]);
    salt
}

fn derive_passphrase_key(
    passphrase: &str,
    salt: &[u8; SALT_SIZE],
    profile: PrivacyProfile,
) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let kdf = profile.params().kdf;
    let params = ParamsBuilder::new()
        .m_cost(kdf.memory_kib)
        .t_cost(kdf.time_cost)
        .p_cost(kdf.parallelism)
        .output_len(KEY_SIZE)
        .build()
        .map_err(|e| Error::KeyDerivation(e.to_string()))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut *key)
        .map_err(|e| Error::KeyDerivation(e.to_string()))?;
    Ok(key)
}

fn derive_audio_key(
    salt: &[u8; SALT_SIZE],
    feature_hash: &[u8; 32],
) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), feature_hash);
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    hk.expand(b"echotome-audio", &mut *key)
        .map_err(|_| Error::KeyDerivation("HKDF expansion failed".into()))?;
    Ok(key)
}
