//! Ritual Ownership Certificates (ROC)
//!
//! A ROC is a signed canonical-JSON document binding a vault to one or more
//! audio tracks and a device public key. The signature covers exactly the
//! canonical serialization of the payload: keys sorted, no whitespace, arrays
//! in declared order, bytes as unpadded base64url.

use crate::identity::{self, IdentityKeypair};
use crate::paths::{atomic_write, DataRoot};
use crate::recovery::RecoveryConfig;
use crate::{CertificateReason, Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use echotome_core::audio_content_hash;
use echotome_profiles::PrivacyProfile;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

/// Current ROC format version
pub const ROC_VERSION: &str = "3.2";

/// Accepted ROC major version
pub const ACCEPTED_MAJOR_VERSION: u32 = 3;

/// Certificate filename extension under `rituals/`
pub const ROC_EXTENSION: &str = "roc";

/// One enrolled audio track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RitualTrack {
    /// Last frame of the active region (exclusive)
    pub active_end: u64,
    /// First frame of the active region (inclusive)
    pub active_start: u64,
    /// Unpadded base64url SHA-256 of the decoded samples
    pub audio_hash: String,
    /// Unpadded base64url ritual imprint vector
    pub riv: String,
    /// Unpadded base64url temporal hash
    pub temporal_hash: String,
    /// Track length in samples
    pub track_length: u64,
}

impl RitualTrack {
    /// Build a track record from raw digests
    pub fn new(
        audio_hash: &[u8; 32],
        active_start: u64,
        active_end: u64,
        track_length: u64,
        riv: &[u8; 32],
        temporal_hash: &[u8; 32],
    ) -> Self {
        Self {
            active_end,
            active_start,
            audio_hash: URL_SAFE_NO_PAD.encode(audio_hash),
            riv: URL_SAFE_NO_PAD.encode(riv),
            temporal_hash: URL_SAFE_NO_PAD.encode(temporal_hash),
            track_length,
        }
    }

    /// Decode the audio hash
    pub fn audio_hash_bytes(&self) -> Result<[u8; 32]> {
        decode_b64_32(&self.audio_hash, "audio_hash")
    }

    /// Decode the ritual imprint vector
    pub fn riv_bytes(&self) -> Result<[u8; 32]> {
        decode_b64_32(&self.riv, "riv")
    }

    /// Decode the temporal hash
    pub fn temporal_hash_bytes(&self) -> Result<[u8; 32]> {
        decode_b64_32(&self.temporal_hash, "temporal_hash")
    }
}

fn decode_b64_32(value: &str, field: &str) -> Result<[u8; 32]> {
    let bytes = URL_SAFE_NO_PAD.decode(value).map_err(|e| {
        Error::certificate(CertificateReason::Malformed, format!("Bad {field}: {e}"))
    })?;
    bytes.try_into().map_err(|_| {
        Error::certificate(CertificateReason::Malformed, format!("Bad {field} length"))
    })
}

/// The signed portion of a certificate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificatePayload {
    /// Creation time, Unix seconds
    pub created_at: i64,
    /// Unpadded base64url owner public key
    pub owner_pub: String,
    /// Privacy profile the vault was enrolled under
    pub profile: PrivacyProfile,
    /// Optional recovery configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryConfig>,
    /// Stable vault identifier
    pub rune_id: String,
    /// Enrolled tracks, in the order the ritual must be performed
    pub tracks: Vec<RitualTrack>,
    /// Format version, `major.minor`
    pub version_info: String,
}

impl CertificatePayload {
    /// Canonical serialization: sorted keys, compact, UTF-8
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        canonical_json(self)
    }

    /// Decode the owner public key
    pub fn owner_pub_bytes(&self) -> Result<[u8; 32]> {
        decode_b64_32(&self.owner_pub, "owner_pub")
    }
}

/// A complete certificate: payload, signature, and the signer's public key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RitualCertificate {
    /// Signed payload
    pub payload: CertificatePayload,
    /// Unpadded base64url Ed25519 signature over the canonical payload bytes
    pub signature: String,
    /// Unpadded base64url signer public key
    pub signer_pub: String,
}

impl RitualCertificate {
    /// Canonical serialization of the whole document
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        canonical_json(self)
    }

    /// SHA-256 of the canonical certificate bytes, for cross-verification
    /// with the steganographic payload
    pub fn roc_hash(&self) -> Result<[u8; 32]> {
        Ok(Sha256::digest(self.canonical_bytes()?).into())
    }

    /// Decode the signer public key
    pub fn signer_pub_bytes(&self) -> Result<[u8; 32]> {
        decode_b64_32(&self.signer_pub, "signer_pub")
    }

    /// Decode the signature
    pub fn signature_bytes(&self) -> Result<[u8; 64]> {
        let bytes = URL_SAFE_NO_PAD.decode(&self.signature).map_err(|e| {
            Error::certificate(CertificateReason::Malformed, format!("Bad signature: {e}"))
        })?;
        bytes.try_into().map_err(|_| {
            Error::certificate(CertificateReason::Malformed, "Bad signature length")
        })
    }
}

/// Serialize any value as canonical JSON (sorted keys, no whitespace)
fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    // serde_json's default map is ordered; round-tripping through Value sorts
    // object keys regardless of struct field order.
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&value)?)
}

/// Create and sign a certificate for a set of enrolled tracks
pub fn create_certificate(
    rune_id: &str,
    profile: PrivacyProfile,
    tracks: Vec<RitualTrack>,
    recovery: Option<RecoveryConfig>,
    keypair: &IdentityKeypair,
) -> Result<RitualCertificate> {
    if tracks.is_empty() {
        return Err(Error::certificate(
            CertificateReason::Malformed,
            "A certificate must bind at least one track",
        ));
    }

    let payload = CertificatePayload {
        created_at: chrono::Utc::now().timestamp(),
        owner_pub: URL_SAFE_NO_PAD.encode(keypair.public_bytes()),
        profile,
        recovery,
        rune_id: rune_id.to_string(),
        tracks,
        version_info: ROC_VERSION.to_string(),
    };

    let signature = keypair.sign(&payload.canonical_bytes()?);
    Ok(RitualCertificate {
        payload,
        signature: URL_SAFE_NO_PAD.encode(signature),
        signer_pub: URL_SAFE_NO_PAD.encode(keypair.public_bytes()),
    })
}

/// Verify a certificate's structure, signature, owner binding, and version
///
/// Audio hashes are verified separately with [`verify_track_audio`], which
/// needs the decoded samples.
pub fn verify_certificate(cert: &RitualCertificate) -> Result<()> {
    if cert.payload.tracks.is_empty() {
        return Err(Error::certificate(
            CertificateReason::Malformed,
            "Certificate binds no tracks",
        ));
    }

    let signer_pub = cert.signer_pub_bytes()?;
    let signature = cert.signature_bytes()?;
    let payload_bytes = cert.payload.canonical_bytes()?;
    if !identity::verify_signature(&signer_pub, &payload_bytes, &signature) {
        return Err(Error::certificate(
            CertificateReason::Signature,
            "Signature does not verify under signer_pub",
        ));
    }

    if cert.payload.owner_pub_bytes()? != signer_pub {
        return Err(Error::certificate(
            CertificateReason::Owner,
            "owner_pub does not match signer_pub",
        ));
    }

    check_version(&cert.payload.version_info)?;
    Ok(())
}

/// Verify one track's audio hash against presented samples
pub fn verify_track_audio(cert: &RitualCertificate, track_index: usize, samples: &[f32]) -> Result<()> {
    let track = cert.payload.tracks.get(track_index).ok_or_else(|| {
        Error::certificate(
            CertificateReason::Malformed,
            format!("No track at index {track_index}"),
        )
    })?;

    if track.audio_hash_bytes()? != audio_content_hash(samples) {
        return Err(Error::certificate(
            CertificateReason::AudioHash,
            format!("Track {track_index} audio does not match enrollment"),
        ));
    }
    Ok(())
}

fn check_version(version_info: &str) -> Result<()> {
    let major = version_info
        .split('.')
        .next()
        .and_then(|m| m.parse::<u32>().ok())
        .ok_or_else(|| {
            Error::certificate(
                CertificateReason::Version,
                format!("Unparseable version_info: {version_info}"),
            )
        })?;
    if major != ACCEPTED_MAJOR_VERSION {
        return Err(Error::certificate(
            CertificateReason::Version,
            format!("Unsupported certificate version: {version_info}"),
        ));
    }
    Ok(())
}

/// Human-oriented certificate summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    /// Vault rune id
    pub rune_id: String,
    /// Profile name
    pub profile: &'static str,
    /// Creation time, Unix seconds
    pub created_at: i64,
    /// Owner key fingerprint
    pub owner_fingerprint: String,
    /// Number of bound tracks
    pub track_count: usize,
}

/// Summarize a certificate for listings
pub fn certificate_summary(cert: &RitualCertificate) -> Result<CertificateSummary> {
    Ok(CertificateSummary {
        rune_id: cert.payload.rune_id.clone(),
        profile: cert.payload.profile.name(),
        created_at: cert.payload.created_at,
        owner_fingerprint: identity::fingerprint(&cert.payload.owner_pub_bytes()?),
        track_count: cert.payload.tracks.len(),
    })
}

/// Filesystem store for certificates under `rituals/`
#[derive(Debug, Clone)]
pub struct CertificateStore {
    root: DataRoot,
}

impl CertificateStore {
    /// Open a store under the given data root
    pub fn new(root: DataRoot) -> Self {
        Self { root }
    }

    fn path_for(&self, rune_id: &str) -> PathBuf {
        self.root
            .rituals_dir()
            .join(format!("{rune_id}.{ROC_EXTENSION}"))
    }

    /// Persist a certificate as canonical JSON
    pub fn save(&self, cert: &RitualCertificate) -> Result<PathBuf> {
        let path = self.path_for(&cert.payload.rune_id);
        atomic_write(&path, &cert.canonical_bytes()?)?;
        tracing::info!(rune_id = %cert.payload.rune_id, "Saved ritual certificate");
        Ok(path)
    }

    /// Load a certificate by rune id
    pub fn load(&self, rune_id: &str) -> Result<RitualCertificate> {
        let path = self.path_for(rune_id);
        if !path.exists() {
            return Err(Error::NotFound(format!("Certificate {rune_id}")));
        }
        let bytes = fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// List all certificates, newest first
    pub fn list(&self) -> Result<Vec<RitualCertificate>> {
        let dir = self.root.rituals_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut certs = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ROC_EXTENSION) {
                continue;
            }
            match fs::read(&path).map_err(Error::from).and_then(|bytes| {
                serde_json::from_slice::<RitualCertificate>(&bytes).map_err(Error::from)
            }) {
                Ok(cert) => certs.push(cert),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable certificate");
                }
            }
        }
        certs.sort_by_key(|c| std::cmp::Reverse(c.payload.created_at));
        Ok(certs)
    }

    /// Find the certificate binding a given audio hash, if any
    pub fn find_by_audio_hash(&self, audio_hash: &[u8; 32]) -> Result<Option<RitualCertificate>> {
        let needle = URL_SAFE_NO_PAD.encode(audio_hash);
        Ok(self
            .list()?
            .into_iter()
            .find(|c| c.payload.tracks.iter().any(|t| t.audio_hash == needle)))
    }

    /// Delete a certificate; returns whether it existed
    pub fn delete(&self, rune_id: &str) -> Result<bool> {
        let path = self.path_for(rune_id);
        if path.exists() {
            fs::remove_file(&path)?;
            tracing::info!(rune_id, "Deleted ritual certificate");
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
