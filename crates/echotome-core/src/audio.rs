//! Audio framing and feature extraction
//!
//! Consumes decoded mono PCM (decoding and resampling happen upstream) and
//! produces the deterministic per-frame features the rest of the engine is
//! built on: magnitude spectra, RMS envelope, spectral centroid, spectral
//! flux, and a canonical feature hash. Identical samples always produce
//! identical bytes.

use crate::{Error, Result};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use sha2::{Digest, Sha256};

/// Default sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// Default analysis frame size in samples
pub const DEFAULT_FRAME_SIZE: usize = 512;

/// Default hop between frames in samples
pub const DEFAULT_HOP_SIZE: usize = 256;

/// Minimum number of frames required to compute a feature hash
pub const MIN_FRAMES_FOR_HASH: usize = 8;

/// Spectrum bins folded into the canonical feature serialization
const FEATURE_HASH_SPECTRAL_BINS: usize = 32;

/// Audio analysis parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisParams {
    /// Sample rate of the incoming PCM in Hz
    pub sample_rate: u32,
    /// Frame size in samples
    pub frame_size: usize,
    /// Hop between successive frames in samples
    pub hop_size: usize,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            frame_size: DEFAULT_FRAME_SIZE,
            hop_size: DEFAULT_HOP_SIZE,
        }
    }
}

impl AnalysisParams {
    /// Validate parameter sanity
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::InvalidInput("Sample rate must be non-zero".into()));
        }
        if self.frame_size < 2 * FEATURE_HASH_SPECTRAL_BINS {
            return Err(Error::InvalidInput(format!(
                "Frame size too small: {}",
                self.frame_size
            )));
        }
        if self.hop_size == 0 || self.hop_size > self.frame_size {
            return Err(Error::InvalidInput(format!(
                "Hop size must be in 1..={}, got {}",
                self.frame_size, self.hop_size
            )));
        }
        Ok(())
    }

    /// Number of spectrum bins per frame
    pub fn spectrum_bins(&self) -> usize {
        self.frame_size / 2 + 1
    }

    /// Minimum number of active frames for a usable region (~100 ms)
    pub fn min_active_frames(&self) -> usize {
        let frames = (self.sample_rate as f64 * 0.1 / self.hop_size as f64).ceil();
        frames as usize
    }

    /// Start time of a frame in milliseconds, measured from the first frame
    pub fn frame_start_ms(&self, frame_index: usize) -> u64 {
        (frame_index as u64 * self.hop_size as u64 * 1000) / self.sample_rate as u64
    }
}

/// Full analysis of one audio track
#[derive(Debug, Clone)]
pub struct AudioAnalysis {
    /// Parameters the analysis was run with
    pub params: AnalysisParams,
    /// Total number of input samples
    pub total_samples: usize,
    /// Overlapping frames; the final partial frame is zero-padded
    pub frames: Vec<Vec<f32>>,
    /// Per-frame magnitude spectra (`frame_size / 2 + 1` bins each)
    pub spectral_map: Vec<Vec<f32>>,
    /// Per-frame RMS energy
    pub rms_envelope: Vec<f32>,
    /// Per-frame spectral centroid in Hz
    pub centroid_series: Vec<f32>,
    /// Per-frame spectral flux; index 0 is always 0 for alignment
    pub flux_series: Vec<f32>,
    /// SHA-256 of the canonical feature serialization
    pub feature_hash: [u8; 32],
}

impl AudioAnalysis {
    /// Number of frames in the track
    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }
}

/// Frame audio into overlapping windows, zero-padding the final partial frame
pub fn frame_audio(samples: &[f32], frame_size: usize, hop_size: usize) -> Vec<Vec<f32>> {
    if samples.is_empty() {
        return Vec::new();
    }

    let n_frames = if samples.len() <= frame_size {
        1
    } else {
        1 + (samples.len() - frame_size).div_ceil(hop_size)
    };

    let mut frames = Vec::with_capacity(n_frames);
    for i in 0..n_frames {
        let start = i * hop_size;
        let end = (start + frame_size).min(samples.len());
        let mut frame = vec![0.0f32; frame_size];
        frame[..end - start].copy_from_slice(&samples[start..end]);
        frames.push(frame);
    }

    frames
}

/// Analyze a mono PCM track into the full feature set
///
/// Fails with `InvalidInput` when fewer than [`MIN_FRAMES_FOR_HASH`] frames
/// are available.
pub fn analyze_samples(samples: &[f32], params: AnalysisParams) -> Result<AudioAnalysis> {
    params.validate()?;

    if samples.iter().any(|s| !s.is_finite()) {
        return Err(Error::InvalidInput(
            "Audio contains non-finite samples".into(),
        ));
    }

    let frames = frame_audio(samples, params.frame_size, params.hop_size);
    if frames.len() < MIN_FRAMES_FOR_HASH {
        return Err(Error::InvalidInput(format!(
            "Audio too short: {} frames, need at least {}",
            frames.len(),
            MIN_FRAMES_FOR_HASH
        )));
    }

    let window = hann_window(params.frame_size);
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(params.frame_size);
    let n_bins = params.spectrum_bins();

    let mut spectral_map: Vec<Vec<f32>> = Vec::with_capacity(frames.len());
    let mut scratch = vec![Complex::new(0.0f32, 0.0f32); params.frame_size];
    for frame in &frames {
        for (slot, (&s, &w)) in scratch.iter_mut().zip(frame.iter().zip(window.iter())) {
            *slot = Complex::new(s * w, 0.0);
        }
        fft.process(&mut scratch);
        spectral_map.push(scratch[..n_bins].iter().map(|c| c.norm()).collect());
    }

    let rms_envelope: Vec<f32> = frames.iter().map(|f| rms(f)).collect();
    let centroid_series: Vec<f32> = spectral_map
        .iter()
        .map(|mag| spectral_centroid(mag, params.sample_rate, params.frame_size))
        .collect();
    let flux_series = spectral_flux(&spectral_map);

    let feature_hash = compute_feature_hash(
        &params,
        &spectral_map,
        &rms_envelope,
        &centroid_series,
        &flux_series,
    );

    Ok(AudioAnalysis {
        params,
        total_samples: samples.len(),
        frames,
        spectral_map,
        rms_envelope,
        centroid_series,
        flux_series,
        feature_hash,
    })
}

/// SHA-256 over the little-endian float32 encoding of the samples.
///
/// The engine never sees encoded audio files, so this is the content identity
/// of a track everywhere a certificate or payload references one.
pub fn audio_content_hash(samples: &[f32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for s in samples {
        hasher.update(s.to_le_bytes());
    }
    hasher.finalize().into()
}

fn hann_window(size: usize) -> Vec<f32> {
    let denom = (size - 1) as f32;
    (0..size)
        .map(|n| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * n as f32 / denom).cos())
        .collect()
}

fn rms(frame: &[f32]) -> f32 {
    let sum_sq: f32 = frame.iter().map(|s| s * s).sum();
    (sum_sq / frame.len() as f32).sqrt()
}

fn spectral_centroid(mag: &[f32], sample_rate: u32, frame_size: usize) -> f32 {
    let bin_hz = sample_rate as f32 / frame_size as f32;
    let total: f32 = mag.iter().sum();
    let weighted: f32 = mag
        .iter()
        .enumerate()
        .map(|(k, &m)| m * k as f32 * bin_hz)
        .sum();
    weighted / (total + 1e-8)
}

/// L2 norm of the positive part of the spectrum difference; leading 0.
fn spectral_flux(spectral_map: &[Vec<f32>]) -> Vec<f32> {
    let mut flux = Vec::with_capacity(spectral_map.len());
    flux.push(0.0);
    for pair in spectral_map.windows(2) {
        let sum_sq: f32 = pair[0]
            .iter()
            .zip(pair[1].iter())
            .map(|(&prev, &cur)| {
                let d = (cur - prev).max(0.0);
                d * d
            })
            .sum();
        flux.push(sum_sq.sqrt());
    }
    flux
}

/// Mean of a series (0 for empty input)
pub(crate) fn series_mean(series: &[f32]) -> f32 {
    if series.is_empty() {
        return 0.0;
    }
    series.iter().sum::<f32>() / series.len() as f32
}

/// Population variance of a series (0 for empty input)
pub(crate) fn series_variance(series: &[f32]) -> f32 {
    if series.is_empty() {
        return 0.0;
    }
    let mean = series_mean(series);
    series.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>() / series.len() as f32
}

/// Per-bin means of the first `count` spectrum bins, averaged over frames
pub(crate) fn spectral_bin_means(spectral_map: &[Vec<f32>], count: usize) -> Vec<f32> {
    let mut means = vec![0.0f32; count];
    if spectral_map.is_empty() {
        return means;
    }
    for mag in spectral_map {
        for (slot, &m) in means.iter_mut().zip(mag.iter()) {
            *slot += m;
        }
    }
    for slot in &mut means {
        *slot /= spectral_map.len() as f32;
    }
    means
}

/// Canonical feature serialization: analysis parameters, then f32-LE
/// reductions (means, variances, first 32 per-bin spectrum averages).
/// The recipe is fixed; changing it invalidates every existing vault.
fn compute_feature_hash(
    params: &AnalysisParams,
    spectral_map: &[Vec<f32>],
    rms_envelope: &[f32],
    centroid_series: &[f32],
    flux_series: &[f32],
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(params.sample_rate.to_le_bytes());
    hasher.update((params.frame_size as u32).to_le_bytes());
    hasher.update((params.hop_size as u32).to_le_bytes());

    for series in [rms_envelope, centroid_series, flux_series] {
        hasher.update(series_mean(series).to_le_bytes());
        hasher.update(series_variance(series).to_le_bytes());
    }

    for bin_mean in spectral_bin_means(spectral_map, FEATURE_HASH_SPECTRAL_BINS) {
        hasher.update(bin_mean.to_le_bytes());
    }

    hasher.finalize().into()
}
