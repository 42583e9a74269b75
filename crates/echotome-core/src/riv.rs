//! Ritual Imprint Vector (RIV)
//!
//! A 256-bit fingerprint folding the audio feature hash, the temporal hash,
//! and coarse spectral/rhythm signatures. The RIV cross-links the ritual
//! certificate and the steganographic payload and must match bit-for-bit.

use crate::audio::{self, AudioAnalysis};
use sha2::{Digest, Sha256};

/// RIV size in bytes
pub const RIV_SIZE: usize = 32;

/// Bins folded into the coarse spectral signature
const SPECTRAL_SIG_BINS: usize = 32;
/// Samples taken from each envelope for the rhythm signature
const RHYTHM_SIG_POINTS: usize = 32;
/// Length of the rhythm signature in bytes
const RHYTHM_SIG_LEN: usize = 16;

/// Compute the RIV for an analyzed track and its temporal hash
pub fn compute_riv(analysis: &AudioAnalysis, temporal_hash: &[u8; 32]) -> [u8; 32] {
    let spectral = spectral_signature(analysis);
    let rhythm = rhythm_signature(analysis);

    let mut hasher = Sha256::new();
    hasher.update(b"echotome-riv-v1");
    hasher.update(analysis.feature_hash);
    hasher.update(temporal_hash);
    hasher.update(spectral);
    hasher.update(rhythm);
    hasher.finalize().into()
}

/// Verify that a RIV was computed from the given inputs
pub fn verify_riv(riv: &[u8; 32], analysis: &AudioAnalysis, temporal_hash: &[u8; 32]) -> bool {
    compute_riv(analysis, temporal_hash) == *riv
}

/// Short human-readable RIV fingerprint (uppercase hex of the leading bytes)
pub fn riv_fingerprint(riv: &[u8; 32]) -> String {
    hex::encode_upper(&riv[..4])
}

/// 32-byte reduction of the spectral map: per-bin means of the first 32 bins
/// plus centroid statistics
fn spectral_signature(analysis: &AudioAnalysis) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"echotome-spec-sig-v1");
    for bin_mean in audio::spectral_bin_means(&analysis.spectral_map, SPECTRAL_SIG_BINS) {
        hasher.update(bin_mean.to_le_bytes());
    }
    hasher.update(audio::series_mean(&analysis.centroid_series).to_le_bytes());
    hasher.update(audio::series_variance(&analysis.centroid_series).to_le_bytes());
    hasher.finalize().into()
}

/// 16-byte reduction of the flux and loudness envelopes
fn rhythm_signature(analysis: &AudioAnalysis) -> [u8; RHYTHM_SIG_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(b"echotome-rhythm-sig-v1");
    for value in resample(&analysis.flux_series, RHYTHM_SIG_POINTS) {
        hasher.update(value.to_le_bytes());
    }
    for value in resample(&analysis.rms_envelope, RHYTHM_SIG_POINTS) {
        hasher.update(value.to_le_bytes());
    }
    let digest: [u8; 32] = hasher.finalize().into();
    let mut sig = [0u8; RHYTHM_SIG_LEN];
    sig.copy_from_slice(&digest[..RHYTHM_SIG_LEN]);
    sig
}

/// Deterministic fixed-length reduction by index sampling
fn resample(series: &[f32], points: usize) -> Vec<f32> {
    if series.is_empty() {
        return vec![0.0; points];
    }
    if series.len() == 1 {
        return vec![series[0]; points];
    }
    (0..points)
        .map(|k| series[k * (series.len() - 1) / (points - 1)])
        .collect()
}
