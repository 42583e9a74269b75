//! Enrollment pipeline
//!
//! Binds a vault to one or more audio tracks: analyze each track, chain it
//! through the TSC, derive the master key with the AF-KDF, sign a ritual
//! certificate, and embed the linking payload into a sigil image.

use crate::engine::{Engine, TrackAnalysis};
use crate::{Error, Result};
use echotome_core::{
    combined_feature_hash, combined_temporal_hash, derive_master_key, effective_key, envelope,
    rune_id,
};
use echotome_profiles::PrivacyProfile;
use echotome_sigil::{embed_stego_payload, SigilImage, StegoPayload};
use echotome_storage::{
    create_certificate, create_recovery_config, RitualCertificate, RitualTrack, Vault,
};

/// Inputs to an enrollment
pub struct EnrollmentRequest<'a> {
    /// Human-readable vault name
    pub vault_name: &'a str,
    /// User passphrase
    pub passphrase: &'a str,
    /// Privacy profile for the new vault
    pub profile: PrivacyProfile,
    /// Decoded mono PCM per track, in the order the ritual must be performed
    pub tracks: Vec<&'a [f32]>,
    /// Carrier image the sigil payload is embedded into
    pub carrier: &'a SigilImage,
    /// Plaintexts sealed into the vault during enrollment
    pub files: Vec<(&'a str, &'a [u8])>,
    /// Number of recovery codes to generate, or `None` for unrecoverable
    pub recovery_codes: Option<usize>,
}

/// Everything an enrollment produces
#[derive(Debug)]
pub struct Enrollment {
    /// The created vault record
    pub vault: Vault,
    /// The signed ritual certificate (also persisted under `rituals/`)
    pub certificate: RitualCertificate,
    /// Carrier image with the embedded payload
    pub sigil: SigilImage,
    /// Vault rune id
    pub rune_id: String,
    /// Plaintext recovery codes, shown exactly once
    pub recovery_codes: Vec<String>,
}

impl Engine {
    /// Enroll a new vault
    pub fn enroll(&self, request: EnrollmentRequest<'_>) -> Result<Enrollment> {
        if request.tracks.is_empty() {
            return Err(Error::Validation(
                "Enrollment requires at least one track".into(),
            ));
        }

        let keypair = self.keystore().ensure_identity_keypair()?;
        let owner_pub = keypair.public_bytes();

        let analyses: Vec<TrackAnalysis> = request
            .tracks
            .iter()
            .map(|samples| self.analyze_track(samples, &owner_pub))
            .collect::<Result<_>>()?;

        let feature_hashes: Vec<[u8; 32]> =
            analyses.iter().map(|t| t.analysis.feature_hash).collect();
        let temporal_hashes: Vec<[u8; 32]> = analyses.iter().map(|t| t.temporal_hash).collect();
        let folded_features = combined_feature_hash(&feature_hashes);
        let folded_temporal = combined_temporal_hash(&temporal_hashes);

        let master = derive_master_key(request.passphrase, &folded_features, request.profile)?;
        let rune = rune_id(&master);
        let vault_key = effective_key(&master, &folded_temporal, request.profile)?;

        // Key-confirmation blob: the master key sealed under the effective
        // key. Unlock decrypts this before any file ciphertext is touched.
        let enc_mk = envelope::seal(
            &vault_key,
            master.as_bytes(),
            request.profile,
            &rune,
            self.algorithm(),
        )?;

        let (recovery, recovery_codes) = match request.recovery_codes {
            Some(count) => {
                let (config, codes) = create_recovery_config(count);
                (Some(config), codes)
            }
            None => (None, Vec::new()),
        };

        let tracks: Vec<RitualTrack> = analyses
            .iter()
            .map(|t| {
                RitualTrack::new(
                    &t.audio_hash,
                    t.region.start_frame as u64,
                    t.region.end_frame as u64,
                    t.track_length,
                    &t.riv,
                    &t.temporal_hash,
                )
            })
            .collect();

        let certificate =
            create_certificate(&rune, request.profile, tracks, recovery, &keypair)?;
        self.certificates().save(&certificate)?;

        let vault = self
            .vaults()
            .create_vault(request.vault_name, request.profile, &rune)?;

        for (name, plaintext) in &request.files {
            let sealed = envelope::seal(
                &vault_key,
                plaintext,
                request.profile,
                &rune,
                self.algorithm(),
            )?;
            self.vaults().store_blob(&vault.id, name, &sealed)?;
        }
        let vault = self.vaults().get_vault(&vault.id)?;

        let payload = StegoPayload::new(
            rune.clone(),
            &enc_mk,
            &certificate.roc_hash()?,
            &analyses[0].riv,
        );
        let sigil = embed_stego_payload(request.carrier, &payload)?;

        tracing::info!(
            vault_id = %vault.id,
            rune_id = %rune,
            tracks = analyses.len(),
            profile = request.profile.name(),
            "Enrollment complete"
        );

        Ok(Enrollment {
            vault,
            certificate,
            sigil,
            rune_id: rune,
            recovery_codes,
        })
    }
}
