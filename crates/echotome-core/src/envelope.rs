//! Authenticated encryption and the ciphertext envelope
//!
//! XChaCha20-Poly1305 with a random 24-byte nonce per message; AES-256-GCM is
//! the fallback algorithm, identified by the algo id stored in the header.
//! The associated data binds every ciphertext to its profile, rune id, and
//! envelope version.
//!
//! Envelope format:
//! `"ECHO" || version(1) || algo_id(1) || profile_id(1) || nonce(24) ||
//!  ad_len(4, LE) || ad || ct_len(4, LE) || ciphertext+tag`

use crate::kdf::MasterKey;
use crate::{Error, Result};
use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::Aes256Gcm;
use chacha20poly1305::XChaCha20Poly1305;
use echotome_profiles::PrivacyProfile;
use rand::RngCore;

/// Magic prefix of every ciphertext envelope
pub const ENVELOPE_MAGIC: [u8; 4] = *b"ECHO";

/// Current envelope format version
pub const ENVELOPE_VERSION: u8 = 1;

/// Nonce field size; AES-GCM uses the first 12 bytes, remainder must be zero
pub const NONCE_SIZE: usize = 24;

const AES_GCM_NONCE_SIZE: usize = 12;
const MAX_AD_LEN: usize = 1024;

/// Supported AEAD algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeadAlgorithm {
    /// XChaCha20-Poly1305 (preferred, 24-byte nonce)
    XChaCha20Poly1305,
    /// AES-256-GCM fallback (12-byte nonce)
    Aes256Gcm,
}

impl AeadAlgorithm {
    /// Wire identifier stored in the envelope header
    pub const fn algo_id(self) -> u8 {
        match self {
            AeadAlgorithm::XChaCha20Poly1305 => 1,
            AeadAlgorithm::Aes256Gcm => 2,
        }
    }

    /// Look up an algorithm by wire identifier
    pub fn from_algo_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(AeadAlgorithm::XChaCha20Poly1305),
            2 => Some(AeadAlgorithm::Aes256Gcm),
            _ => None,
        }
    }
}

/// A decrypted envelope with its authenticated context
#[derive(Debug)]
pub struct OpenedEnvelope {
    /// Recovered plaintext
    pub plaintext: Vec<u8>,
    /// Profile the ciphertext was bound to
    pub profile: PrivacyProfile,
    /// Rune id the ciphertext was bound to
    pub rune_id: String,
    /// Algorithm the message was sealed with
    pub algorithm: AeadAlgorithm,
}

/// Encrypt plaintext into a complete envelope
pub fn seal(
    key: &MasterKey,
    plaintext: &[u8],
    profile: PrivacyProfile,
    rune_id: &str,
    algorithm: AeadAlgorithm,
) -> Result<Vec<u8>> {
    let ad = encode_ad(profile, rune_id);

    let mut nonce = [0u8; NONCE_SIZE];
    match algorithm {
        AeadAlgorithm::XChaCha20Poly1305 => OsRng.fill_bytes(&mut nonce),
        AeadAlgorithm::Aes256Gcm => OsRng.fill_bytes(&mut nonce[..AES_GCM_NONCE_SIZE]),
    }

    let payload = Payload {
        msg: plaintext,
        aad: &ad,
    };
    let ciphertext = match algorithm {
        AeadAlgorithm::XChaCha20Poly1305 => {
            let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
            cipher.encrypt(chacha20poly1305::XNonce::from_slice(&nonce), payload)
        }
        AeadAlgorithm::Aes256Gcm => {
            let cipher = Aes256Gcm::new(key.as_bytes().into());
            cipher.encrypt(
                aes_gcm::Nonce::from_slice(&nonce[..AES_GCM_NONCE_SIZE]),
                payload,
            )
        }
    }
    .map_err(|_| Error::AeadFailure("Encryption failed".into()))?;

    let mut out = Vec::with_capacity(4 + 3 + NONCE_SIZE + 4 + ad.len() + 4 + ciphertext.len());
    out.extend_from_slice(&ENVELOPE_MAGIC);
    out.push(ENVELOPE_VERSION);
    out.push(algorithm.algo_id());
    out.push(profile.profile_id());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&(ad.len() as u32).to_le_bytes());
    out.extend_from_slice(&ad);
    out.extend_from_slice(&(ciphertext.len() as u32).to_le_bytes());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a complete envelope
///
/// Structural problems surface as `InvalidEnvelope`; an authentication tag
/// mismatch surfaces as `AeadFailure` without revealing which byte differed.
pub fn open(key: &MasterKey, data: &[u8]) -> Result<OpenedEnvelope> {
    let parsed = parse(data)?;

    let payload = Payload {
        msg: parsed.ciphertext,
        aad: parsed.ad,
    };
    let plaintext = match parsed.algorithm {
        AeadAlgorithm::XChaCha20Poly1305 => {
            let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
            cipher.decrypt(chacha20poly1305::XNonce::from_slice(&parsed.nonce), payload)
        }
        AeadAlgorithm::Aes256Gcm => {
            let cipher = Aes256Gcm::new(key.as_bytes().into());
            cipher.decrypt(
                aes_gcm::Nonce::from_slice(&parsed.nonce[..AES_GCM_NONCE_SIZE]),
                payload,
            )
        }
    }
    .map_err(|_| Error::AeadFailure("Authentication tag mismatch".into()))?;

    Ok(OpenedEnvelope {
        plaintext,
        profile: parsed.profile,
        rune_id: parsed.rune_id,
        algorithm: parsed.algorithm,
    })
}

/// Envelope header fields readable without the key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeHeader {
    /// Profile the ciphertext claims to be bound to
    pub profile: PrivacyProfile,
    /// Rune id the ciphertext claims to be bound to
    pub rune_id: String,
    /// Sealing algorithm
    pub algorithm: AeadAlgorithm,
}

/// Parse an envelope's header without decrypting
///
/// The fields are only trustworthy after a successful [`open`]; this exists
/// so callers can route a ciphertext to the right vault and profile.
pub fn peek_header(data: &[u8]) -> Result<EnvelopeHeader> {
    let parsed = parse(data)?;
    Ok(EnvelopeHeader {
        profile: parsed.profile,
        rune_id: parsed.rune_id,
        algorithm: parsed.algorithm,
    })
}

struct ParsedEnvelope<'a> {
    algorithm: AeadAlgorithm,
    profile: PrivacyProfile,
    rune_id: String,
    nonce: [u8; NONCE_SIZE],
    ad: &'a [u8],
    ciphertext: &'a [u8],
}

fn parse(data: &[u8]) -> Result<ParsedEnvelope<'_>> {
    let header_len = 4 + 3 + NONCE_SIZE + 4;
    if data.len() < header_len {
        return Err(Error::InvalidEnvelope("Truncated header".into()));
    }
    if data[..4] != ENVELOPE_MAGIC {
        return Err(Error::InvalidEnvelope("Bad magic".into()));
    }
    let version = data[4];
    if version != ENVELOPE_VERSION {
        return Err(Error::InvalidEnvelope(format!(
            "Unsupported envelope version: {version}"
        )));
    }
    let algorithm = AeadAlgorithm::from_algo_id(data[5])
        .ok_or_else(|| Error::InvalidEnvelope(format!("Unknown algorithm id: {}", data[5])))?;
    let profile = PrivacyProfile::from_profile_id(data[6])
        .ok_or_else(|| Error::InvalidEnvelope(format!("Unknown profile id: {}", data[6])))?;

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&data[7..7 + NONCE_SIZE]);
    if algorithm == AeadAlgorithm::Aes256Gcm && nonce[AES_GCM_NONCE_SIZE..].iter().any(|&b| b != 0)
    {
        return Err(Error::InvalidEnvelope(
            "Nonzero AES-GCM nonce padding".into(),
        ));
    }

    let mut pos = 7 + NONCE_SIZE;
    let ad_len =
        u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
    pos += 4;
    if ad_len > MAX_AD_LEN || data.len() < pos + ad_len + 4 {
        return Err(Error::InvalidEnvelope("Bad associated data length".into()));
    }
    let ad = &data[pos..pos + ad_len];
    pos += ad_len;

    let ct_len =
        u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
    pos += 4;
    if data.len() != pos + ct_len {
        return Err(Error::InvalidEnvelope("Bad ciphertext length".into()));
    }
    let ciphertext = &data[pos..];

    let (ad_profile, rune_id, ad_version) = decode_ad(ad)?;
    if ad_profile != profile || ad_version != version {
        return Err(Error::InvalidEnvelope(
            "Header does not match associated data".into(),
        ));
    }

    Ok(ParsedEnvelope {
        algorithm,
        profile,
        rune_id,
        nonce,
        ad,
        ciphertext,
    })
}

/// Associated data: `profile_id || rune_id || version`
fn encode_ad(profile: PrivacyProfile, rune_id: &str) -> Vec<u8> {
    let mut ad = Vec::with_capacity(2 + rune_id.len());
    ad.push(profile.profile_id());
    ad.extend_from_slice(rune_id.as_bytes());
    ad.push(ENVELOPE_VERSION);
    ad
}

fn decode_ad(ad: &[u8]) -> Result<(PrivacyProfile, String, u8)> {
    if ad.len() < 2 {
        return Err(Error::InvalidEnvelope("Associated data too short".into()));
    }
    let profile = PrivacyProfile::from_profile_id(ad[0])
        .ok_or_else(|| Error::InvalidEnvelope("Unknown profile in associated data".into()))?;
    let version = ad[ad.len() - 1];
    let rune_id = std::str::from_utf8(&ad[1..ad.len() - 1])
        .map_err(|_| Error::InvalidEnvelope("Rune id is not UTF-8".into()))?
        .to_string();
    Ok((profile, rune_id, version))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> MasterKey {
        MasterKey::from_bytes([42u8; 32])
    }

    #[test]
    fn test_round_trip_xchacha() {
        let key = test_key();
        let sealed = seal(
            &key,
            b"ritual plaintext",
            PrivacyProfile::RitualLock,
            "ECH-AAAAAAAA",
            AeadAlgorithm::XChaCha20Poly1305,
        )
        .unwrap();

        let opened = open(&key, &sealed).unwrap();
        assert_eq!(opened.plaintext, b"ritual plaintext");
        assert_eq!(opened.profile, PrivacyProfile::RitualLock);
        assert_eq!(opened.rune_id, "ECH-AAAAAAAA");
        assert_eq!(opened.algorithm, AeadAlgorithm::XChaCha20Poly1305);
    }

    #[test]
    fn test_round_trip_aes_gcm() {
        let key = test_key();
        let sealed = seal(
            &key,
            b"fallback plaintext",
            PrivacyProfile::QuickLock,
            "ECH-BBBBBBBB",
            AeadAlgorithm::Aes256Gcm,
        )
        .unwrap();

        let opened = open(&key, &sealed).unwrap();
        assert_eq!(opened.plaintext, b"fallback plaintext");
        assert_eq!(opened.algorithm, AeadAlgorithm::Aes256Gcm);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = seal(
            &test_key(),
            b"secret",
            PrivacyProfile::QuickLock,
            "ECH-AAAAAAAA",
            AeadAlgorithm::XChaCha20Poly1305,
        )
        .unwrap();

        let err = open(&MasterKey::from_bytes([43u8; 32]), &sealed).unwrap_err();
        assert!(matches!(err, Error::AeadFailure(_)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = test_key();
        let mut sealed = seal(
            &key,
            b"secret",
            PrivacyProfile::QuickLock,
            "ECH-AAAAAAAA",
            AeadAlgorithm::XChaCha20Poly1305,
        )
        .unwrap();

        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(
            open(&key, &sealed).unwrap_err(),
            Error::AeadFailure(_)
        ));
    }

    #[test]
    fn test_tampered_header_fails() {
        let key = test_key();
        let sealed = seal(
            &key,
            b"secret",
            PrivacyProfile::QuickLock,
            "ECH-AAAAAAAA",
            AeadAlgorithm::XChaCha20Poly1305,
        )
        .unwrap();

        // Flip the profile byte in the header: no longer matches the AD
        let mut flipped = sealed.clone();
        flipped[6] = PrivacyProfile::BlackVault.profile_id();
        assert!(matches!(
            open(&key, &flipped).unwrap_err(),
            Error::InvalidEnvelope(_)
        ));

        // Flip the algorithm id: decryption runs with the wrong cipher
        let mut flipped = sealed;
        flipped[5] = AeadAlgorithm::Aes256Gcm.algo_id();
        assert!(open(&key, &flipped).is_err());
    }

    #[test]
    fn test_structural_errors() {
        let key = test_key();
        assert!(matches!(
            open(&key, b"ECHO").unwrap_err(),
            Error::InvalidEnvelope(_)
        ));
        assert!(matches!(
            open(&key, &[0u8; 64]).unwrap_err(),
            Error::InvalidEnvelope(_)
        ));

        let mut sealed = seal(
            &key,
            b"secret",
            PrivacyProfile::QuickLock,
            "ECH-AAAAAAAA",
            AeadAlgorithm::XChaCha20Poly1305,
        )
        .unwrap();
        sealed.truncate(sealed.len() - 3);
        assert!(matches!(
            open(&key, &sealed).unwrap_err(),
            Error::InvalidEnvelope(_)
        ));
    }

    #[test]
    fn test_peek_header() {
        let sealed = seal(
            &test_key(),
            b"secret",
            PrivacyProfile::BlackVault,
            "ECH-CCCCCCCC",
            AeadAlgorithm::XChaCha20Poly1305,
        )
        .unwrap();

        let header = peek_header(&sealed).unwrap();
        assert_eq!(header.profile, PrivacyProfile::BlackVault);
        assert_eq!(header.rune_id, "ECH-CCCCCCCC");
    }

    #[test]
    fn test_nonces_are_fresh() {
        let key = test_key();
        let a = seal(
            &key,
            b"same plaintext",
            PrivacyProfile::QuickLock,
            "ECH-AAAAAAAA",
            AeadAlgorithm::XChaCha20Poly1305,
        )
        .unwrap();
        let b = seal(
            &key,
            b"same plaintext",
            PrivacyProfile::QuickLock,
            "ECH-AAAAAAAA",
            AeadAlgorithm::XChaCha20Poly1305,
        )
        .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_aes_gcm_nonce_padding_must_be_zero() {
        let key = test_key();
        let mut sealed = seal(
            &key,
            b"secret",
            PrivacyProfile::QuickLock,
            "ECH-AAAAAAAA",
            AeadAlgorithm::Aes256Gcm,
        )
        .unwrap();
        // Corrupt a padding byte of the 24-byte nonce field
        sealed[7 + 20] = 0xAA;
        assert!(matches!(
            open(&key, &sealed).unwrap_err(),
            Error::InvalidEnvelope(_)
        ));
    }
}
