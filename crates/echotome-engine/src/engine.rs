//! Engine handle and vault file operations

use crate::{Error, Result};
use echotome_core::{
    analyze_samples, audio_content_hash, compute_riv, compute_temporal_hash,
    detect_active_region, envelope, ActiveRegion, AeadAlgorithm, AnalysisParams, AudioAnalysis,
};
use echotome_storage::{
    CertificateStore, CleanupHandle, DataRoot, IdentityKeystore, SessionManager, VaultStore,
    DEFAULT_CLEANUP_INTERVAL,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// The assembled Echotome engine
///
/// Owns the identity keystore, the certificate and vault stores, and the
/// session manager, all rooted at one data directory. One instance per data
/// root; the session table is process-wide state.
pub struct Engine {
    root: DataRoot,
    params: AnalysisParams,
    algorithm: AeadAlgorithm,
    keystore: IdentityKeystore,
    certificates: CertificateStore,
    vaults: VaultStore,
    sessions: Arc<SessionManager>,
}

impl Engine {
    /// Open an engine with default analysis parameters
    pub fn open(root: DataRoot) -> Result<Self> {
        Self::with_params(root, AnalysisParams::default())
    }

    /// Open an engine with explicit analysis parameters
    pub fn with_params(root: DataRoot, params: AnalysisParams) -> Result<Self> {
        params.validate()?;
        root.ensure_layout()?;

        Ok(Self {
            params,
            algorithm: AeadAlgorithm::XChaCha20Poly1305,
            keystore: IdentityKeystore::new(root.clone()),
            certificates: CertificateStore::new(root.clone()),
            vaults: VaultStore::new(root.clone()),
            sessions: Arc::new(SessionManager::new(root.clone())?),
            root,
        })
    }

    /// The data root everything is stored under
    pub fn data_root(&self) -> &DataRoot {
        &self.root
    }

    /// Select the AEAD algorithm for subsequently sealed blobs
    pub fn with_algorithm(mut self, algorithm: AeadAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Analysis parameters in effect
    pub fn analysis_params(&self) -> AnalysisParams {
        self.params
    }

    /// AEAD algorithm in effect
    pub fn algorithm(&self) -> AeadAlgorithm {
        self.algorithm
    }

    /// The identity keystore
    pub fn keystore(&self) -> &IdentityKeystore {
        &self.keystore
    }

    /// The certificate store
    pub fn certificates(&self) -> &CertificateStore {
        &self.certificates
    }

    /// The vault store
    pub fn vaults(&self) -> &VaultStore {
        &self.vaults
    }

    /// The session manager
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Spawn the background session cleanup task
    pub fn spawn_session_cleanup(&self) -> CleanupHandle {
        self.sessions.spawn_cleanup(DEFAULT_CLEANUP_INTERVAL)
    }

    /// Lock one session
    pub fn lock(&self, session_id: &str) -> Result<()> {
        Ok(self.sessions.end_session(session_id)?)
    }

    /// Emergency lock: tear down every session immediately
    pub fn emergency_lock(&self) {
        tracing::warn!("Emergency lock");
        self.sessions.end_all();
    }

    /// Host went to background; profiles with background auto-lock close
    pub fn host_background(&self) {
        self.sessions.on_host_background();
    }

    /// Seal a plaintext into the session's vault as an encrypted blob
    ///
    /// The plaintext never touches disk; only the envelope is stored.
    pub fn seal_into_vault(
        &self,
        session_id: &str,
        blob_name: &str,
        plaintext: &[u8],
    ) -> Result<()> {
        let info = self.sessions.get_session(session_id)?;
        let vault = self.vaults.get_vault(&info.vault_id)?;

        let sealed = self.sessions.with_key(session_id, |key| {
            envelope::seal(key, plaintext, vault.profile, &vault.rune_id, self.algorithm)
        })??;

        self.vaults.store_blob(&vault.id, blob_name, &sealed)?;
        tracing::info!(vault_id = %vault.id, blob_name, "Sealed blob into vault");
        Ok(())
    }

    /// Decrypt a vault blob into the session directory
    ///
    /// Returns the path of the plaintext file; it lives only as long as the
    /// session and is wiped with it.
    pub fn open_to_session(&self, session_id: &str, blob_name: &str) -> Result<PathBuf> {
        let info = self.sessions.get_session(session_id)?;
        let vault = self.vaults.get_vault(&info.vault_id)?;
        let sealed = self.vaults.load_blob(&vault.id, blob_name)?;

        let opened = self
            .sessions
            .with_key(session_id, |key| envelope::open(key, &sealed))??;
        if opened.rune_id != vault.rune_id {
            return Err(Error::Validation(
                "Blob is bound to a different vault".into(),
            ));
        }

        let out_path = info.dir.join(blob_name);
        fs::write(&out_path, &opened.plaintext).map_err(|e| Error::Storage(e.into()))?;
        self.sessions.record_decrypted_file(session_id, blob_name)?;
        Ok(out_path)
    }

    /// Per-track ritual analysis shared by enrollment and unlock
    pub(crate) fn analyze_track(&self, samples: &[f32], owner_pub: &[u8; 32]) -> Result<TrackAnalysis> {
        let analysis = analyze_samples(samples, self.params)?;
        let region = detect_active_region(&analysis)?;
        let track_length = samples.len() as u64;
        let temporal_hash =
            compute_temporal_hash(&region, &self.params, owner_pub, track_length)?;
        let riv = compute_riv(&analysis, &temporal_hash);

        Ok(TrackAnalysis {
            audio_hash: audio_content_hash(samples),
            track_length,
            region,
            temporal_hash,
            riv,
            analysis,
        })
    }
}

/// Everything the pipeline derives from one track
pub(crate) struct TrackAnalysis {
    pub analysis: AudioAnalysis,
    pub region: ActiveRegion,
    pub audio_hash: [u8; 32],
    pub track_length: u64,
    pub temporal_hash: [u8; 32],
    pub riv: [u8; 32],
}
