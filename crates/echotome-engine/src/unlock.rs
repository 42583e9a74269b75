//! Unlock pipeline
//!
//! A ritual attempt: extract the sigil payload, verify the certificate,
//! re-perform the audio analysis over the live capture, compare the temporal
//! chain, recover the master key, and open a time-limited session. The
//! pending key enters the session manager's `Unlocking` slot before
//! verification and is zeroized on any failure; a session directory only
//! exists once every check has passed.

use crate::engine::{Engine, TrackAnalysis};
use crate::{Error, Result};
use echotome_core::{
    check_playback_speed, combined_feature_hash, combined_temporal_hash, derive_master_key,
    effective_key, envelope, hashes_match, rune_id, MasterKey,
};
use echotome_profiles::PrivacyProfile;
use echotome_sigil::{extract_stego_payload, SigilImage, StegoPayload};
use echotome_storage::{
    verify_certificate, verify_track_audio, RitualCertificate, SessionInfo,
};
use std::time::Duration;

/// One live track performance
pub struct LivePerformance<'a> {
    /// Decoded mono PCM captured during the ritual
    pub samples: &'a [f32],
    /// Wall-clock time the performance took
    pub elapsed: Duration,
}

/// Inputs to an unlock attempt
pub struct UnlockRequest<'a> {
    /// Vault to unlock
    pub vault_id: &'a str,
    /// User passphrase
    pub passphrase: &'a str,
    /// Sigil image carrying the stego payload
    pub sigil: &'a SigilImage,
    /// Live performances, in certificate track order
    pub performances: Vec<LivePerformance<'a>>,
    /// Session TTL override in seconds (clamped to the profile cap)
    pub ttl_secs: Option<u64>,
}

impl Engine {
    /// Perform a ritual and open a session on success
    pub fn unlock(&self, request: UnlockRequest<'_>) -> Result<SessionInfo> {
        let payload = extract_stego_payload(request.sigil)?;
        let vault = self.vaults().get_vault(request.vault_id)?;
        if vault.rune_id != payload.rune_id {
            return Err(Error::Validation(
                "Sigil belongs to a different vault".into(),
            ));
        }

        let certificate = self.certificates().load(&payload.rune_id)?;
        verify_certificate(&certificate)?;
        let profile = certificate.payload.profile;
        if profile != vault.profile {
            return Err(Error::Validation(
                "Certificate profile does not match the vault".into(),
            ));
        }

        // Cross-checks binding the sigil payload to this exact certificate
        if certificate.roc_hash()? != payload.roc_hash_bytes()? {
            return Err(Error::Sigil(echotome_sigil::Error::PayloadCorrupt(
                "Payload does not reference this certificate".into(),
            )));
        }
        if payload.riv_bytes()? != certificate.payload.tracks[0].riv_bytes()? {
            return Err(Error::Sigil(echotome_sigil::Error::PayloadCorrupt(
                "Payload RIV does not match the certificate".into(),
            )));
        }

        if request.performances.len() != certificate.payload.tracks.len() {
            return Err(Error::Core(echotome_core::Error::TemporalMismatch(
                format!(
                    "Ritual has {} tracks, got {}",
                    certificate.payload.tracks.len(),
                    request.performances.len()
                ),
            )));
        }

        let owner_pub = certificate.payload.owner_pub_bytes()?;
        let live: Vec<TrackAnalysis> = request
            .performances
            .iter()
            .map(|p| self.analyze_track(p.samples, &owner_pub))
            .collect::<Result<_>>()?;

        let feature_hashes: Vec<[u8; 32]> =
            live.iter().map(|t| t.analysis.feature_hash).collect();
        let temporal_hashes: Vec<[u8; 32]> = live.iter().map(|t| t.temporal_hash).collect();
        let master = derive_master_key(
            request.passphrase,
            &combined_feature_hash(&feature_hashes),
            profile,
        )?;
        let vault_key = effective_key(&master, &combined_temporal_hash(&temporal_hashes), profile)?;

        // Enter Unlocking: the derived key sits in a pending slot and is
        // zeroized on any verification failure
        let token = self
            .sessions()
            .begin_unlock(&vault.id, profile, vault_key.clone())?;

        if let Err(e) = self.verify_ritual(
            &certificate,
            &payload,
            &live,
            &request.performances,
            profile,
            &vault_key,
            &master,
        ) {
            self.sessions().cancel_pending(&token);
            tracing::info!(
                vault_id = %vault.id,
                error = %e,
                "Ritual rejected"
            );
            return Err(e);
        }

        let info = self.sessions().activate(&token, request.ttl_secs)?;
        if vault.certificate_ref.is_none() {
            self.vaults()
                .bind_certificate(&vault.id, &certificate.payload.rune_id)?;
        }

        tracing::info!(
            vault_id = %vault.id,
            session_id = %&info.session_id[..8],
            "Ritual accepted, session open"
        );
        Ok(info)
    }

    #[allow(clippy::too_many_arguments)]
    fn verify_ritual(
        &self,
        certificate: &RitualCertificate,
        payload: &StegoPayload,
        live: &[TrackAnalysis],
        performances: &[LivePerformance<'_>],
        profile: PrivacyProfile,
        vault_key: &MasterKey,
        master: &MasterKey,
    ) -> Result<()> {
        let timing = profile.params().timing_enforced;

        for (i, (enrolled, performed)) in certificate
            .payload
            .tracks
            .iter()
            .zip(live.iter())
            .enumerate()
        {
            if timing {
                check_playback_speed(
                    enrolled.track_length,
                    self.analysis_params().sample_rate,
                    performances[i].elapsed,
                )?;
                if !hashes_match(&performed.temporal_hash, &enrolled.temporal_hash_bytes()?) {
                    return Err(Error::Core(echotome_core::Error::TemporalMismatch(
                        format!("Track {i} temporal hash mismatch"),
                    )));
                }
            }

            verify_track_audio(certificate, i, performances[i].samples)?;

            if performed.riv != enrolled.riv_bytes()? {
                return Err(Error::Core(echotome_core::Error::TemporalMismatch(
                    format!("Track {i} imprint mismatch"),
                )));
            }
        }

        // Key confirmation: decrypt the master key blob before any file
        // ciphertext is touched. A wrong passphrase dies here.
        let opened = envelope::open(vault_key, &payload.enc_mk_bytes()?)?;
        if opened.rune_id != payload.rune_id {
            return Err(Error::Sigil(echotome_sigil::Error::PayloadCorrupt(
                "Key blob bound to a different rune".into(),
            )));
        }
        let recovered: [u8; 32] = opened.plaintext.as_slice().try_into().map_err(|_| {
            Error::Sigil(echotome_sigil::Error::PayloadCorrupt(
                "Key blob has the wrong size".into(),
            ))
        })?;
        let recovered = MasterKey::from_bytes(recovered);
        if recovered != *master || rune_id(&recovered) != payload.rune_id {
            return Err(Error::Sigil(echotome_sigil::Error::PayloadCorrupt(
                "Recovered key does not derive this rune".into(),
            )));
        }

        Ok(())
    }
}
