//! Active region detection
//!
//! Trims leading and trailing silence so that silent lead-in cannot be abused
//! as key material. A composite activity score over RMS, spectral flux, and
//! centroid movement is thresholded with two-level hysteresis; the longest
//! surviving run of hot frames becomes the active region.

use crate::audio::AudioAnalysis;
use crate::{Error, Result};

/// Composite score weight for RMS energy
pub const WEIGHT_RMS: f32 = 0.5;
/// Composite score weight for spectral flux
pub const WEIGHT_FLUX: f32 = 0.3;
/// Composite score weight for centroid movement
pub const WEIGHT_CENTROID: f32 = 0.2;

/// Score at or above which a frame opens a hot run
pub const HIGH_THRESHOLD: f32 = 0.35;
/// Score below which frames count toward closing a hot run
pub const LOW_THRESHOLD: f32 = 0.20;
/// Consecutive below-low frames required to close a hot run
pub const RELEASE_FRAMES: usize = 4;
/// Maximum cold gap between hot runs that still merges them
pub const GAP_FRAMES: usize = 8;

/// A contiguous span of meaningful audio content
///
/// `[start_frame, end_frame)` indexes into the source track's frame sequence;
/// `frames` holds the frames themselves.
#[derive(Debug, Clone)]
pub struct ActiveRegion {
    /// First frame of the region (inclusive)
    pub start_frame: usize,
    /// One past the last frame of the region (exclusive)
    pub end_frame: usize,
    /// The active frames, in order
    pub frames: Vec<Vec<f32>>,
}

impl ActiveRegion {
    /// Number of frames in the region
    pub fn len(&self) -> usize {
        self.end_frame - self.start_frame
    }

    /// Whether the region is empty (never true for a detected region)
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Detect the active region of an analyzed track
///
/// Fails with `NoActiveRegion` when no run of hot frames reaches
/// `min_active_frames` (~100 ms of audio at the analysis hop).
pub fn detect_active_region(analysis: &AudioAnalysis) -> Result<ActiveRegion> {
    let scores = activity_scores(analysis);
    let min_frames = analysis.params.min_active_frames();

    let (start, end) = select_longest_run(&scores, min_frames).ok_or_else(|| {
        Error::NoActiveRegion(format!(
            "No contiguous span of at least {min_frames} active frames"
        ))
    })?;

    debug_assert!(start < end && end <= analysis.n_frames());

    Ok(ActiveRegion {
        start_frame: start,
        end_frame: end,
        frames: analysis.frames[start..end].to_vec(),
    })
}

/// The longest merged hot run of at least `min_frames` frames, if any
fn select_longest_run(scores: &[f32], min_frames: usize) -> Option<(usize, usize)> {
    merge_runs(hot_runs(scores), GAP_FRAMES)
        .into_iter()
        .max_by_key(|(start, end)| end - start)
        .filter(|(start, end)| end - start >= min_frames)
}

/// Per-frame composite activity score in [0, 1]
pub fn activity_scores(analysis: &AudioAnalysis) -> Vec<f32> {
    let rms = min_max_normalize(&analysis.rms_envelope);
    let flux = min_max_normalize(&analysis.flux_series);

    let mut centroid_delta = Vec::with_capacity(analysis.n_frames());
    centroid_delta.push(0.0);
    for pair in analysis.centroid_series.windows(2) {
        centroid_delta.push((pair[1] - pair[0]).abs());
    }
    let centroid = min_max_normalize(&centroid_delta);

    rms.iter()
        .zip(flux.iter())
        .zip(centroid.iter())
        .map(|((&r, &f), &c)| WEIGHT_RMS * r + WEIGHT_FLUX * f + WEIGHT_CENTROID * c)
        .collect()
}

/// Min-max normalization over the track; a constant series maps to all zeros
fn min_max_normalize(series: &[f32]) -> Vec<f32> {
    let min = series.iter().copied().fold(f32::INFINITY, f32::min);
    let max = series.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !min.is_finite() || !max.is_finite() || max - min <= f32::EPSILON {
        return vec![0.0; series.len()];
    }
    series.iter().map(|&x| (x - min) / (max - min)).collect()
}

/// Two-threshold hysteresis: a run opens at `score >= HIGH_THRESHOLD` and
/// closes before the first of `RELEASE_FRAMES` consecutive frames below
/// `LOW_THRESHOLD`. Returns half-open `(start, end)` runs.
fn hot_runs(scores: &[f32]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut run_start: Option<usize> = None;
    let mut below = 0usize;

    for (i, &score) in scores.iter().enumerate() {
        match run_start {
            None => {
                if score >= HIGH_THRESHOLD {
                    run_start = Some(i);
                    below = 0;
                }
            }
            Some(start) => {
                if score < LOW_THRESHOLD {
                    below += 1;
                    if below >= RELEASE_FRAMES {
                        runs.push((start, i + 1 - RELEASE_FRAMES));
                        run_start = None;
                        below = 0;
                    }
                } else {
                    below = 0;
                }
            }
        }
    }

    // A run still open at end-of-track closes before any trailing below-low
    // frames that had not yet reached the release count.
    if let Some(start) = run_start {
        let end = scores.len() - below;
        if end > start {
            runs.push((start, end));
        }
    }

    runs
}

/// Merge runs separated by at most `gap` cold frames
fn merge_runs(runs: Vec<(usize, usize)>, gap: usize) -> Vec<(usize, usize)> {
    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(runs.len());
    for (start, end) in runs {
        match merged.last_mut() {
            Some((_, prev_end)) if start - *prev_end <= gap => *prev_end = end,
            _ => merged.push((start, end)),
        }
    }
    merged
}
