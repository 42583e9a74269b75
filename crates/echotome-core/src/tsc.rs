//! Temporal Salt Chain (TSC)
//!
//! A SHA-256 hash chain over the active-region frames, salted by the device
//! public key and the track length. Binding the chain to frame indices and
//! start times means acceleration, reordering, or partial playback produces a
//! different output. Comparisons are constant-time.

use crate::audio::AnalysisParams;
use crate::region::{detect_active_region, ActiveRegion};
use crate::{audio, Error, Result};
use sha2::{Digest, Sha256};
use std::time::Duration;
use subtle::ConstantTimeEq;

/// Domain prefix for chain initialization
const TSC_DOMAIN: &[u8] = b"echotome-tsc-v1";

/// Slowest accepted playback speed during verification
pub const MIN_PLAYBACK_SPEED: f64 = 0.8;
/// Fastest accepted playback speed during verification
pub const MAX_PLAYBACK_SPEED: f64 = 1.2;

/// Initialize the chain state from the owner identity and track length
fn init_state(owner_pub: &[u8; 32], track_length: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(TSC_DOMAIN);
    hasher.update(owner_pub);
    hasher.update(track_length.to_le_bytes());
    hasher.finalize().into()
}

/// SHA-256 over the little-endian float32 samples of one frame
fn frame_digest(frame: &[f32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for s in frame {
        hasher.update(s.to_le_bytes());
    }
    hasher.finalize().into()
}

fn chain_frame(state: &[u8; 32], index: u32, t_ms: u64, frame: &[f32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(state);
    hasher.update(index.to_le_bytes());
    hasher.update(t_ms.to_le_bytes());
    hasher.update(frame_digest(frame));
    hasher.finalize().into()
}

/// Compute the temporal hash over an active region in one pass
///
/// Frame start times are derived from the analysis hop and sample rate,
/// measured from the region origin.
pub fn compute_temporal_hash(
    region: &ActiveRegion,
    params: &AnalysisParams,
    owner_pub: &[u8; 32],
    track_length: u64,
) -> Result<[u8; 32]> {
    if region.frames.is_empty() {
        return Err(Error::InvalidInput("Empty active region".into()));
    }

    let mut state = init_state(owner_pub, track_length);
    for (i, frame) in region.frames.iter().enumerate() {
        state = chain_frame(&state, i as u32, params.frame_start_ms(i), frame);
    }
    Ok(state)
}

/// Streaming temporal hash computation for live capture
///
/// The same state machine as [`compute_temporal_hash`], exposed as
/// init / add_frame / finalize so frames can be chained as they arrive from a
/// microphone. One streamer is owned by one producer; indices must arrive
/// strictly increasing and with no gaps.
#[derive(Debug)]
pub struct TemporalChain {
    state: [u8; 32],
    last_index: Option<u32>,
    frames_added: u64,
}

impl TemporalChain {
    /// Initialize a streamer for the given identity and track length
    pub fn init(owner_pub: &[u8; 32], track_length: u64) -> Self {
        Self {
            state: init_state(owner_pub, track_length),
            last_index: None,
            frames_added: 0,
        }
    }

    /// Chain one frame at the given index and start time
    ///
    /// Fails with `OrderingError` when `index` does not exceed the previous
    /// index; duplicates and rewinds are rejected immediately.
    pub fn add_frame(&mut self, index: u32, t_ms: u64, frame: &[f32]) -> Result<()> {
        if let Some(last) = self.last_index {
            if index <= last {
                return Err(Error::Ordering(format!(
                    "Frame index {index} after {last}"
                )));
            }
        }
        self.state = chain_frame(&self.state, index, t_ms, frame);
        self.last_index = Some(index);
        self.frames_added += 1;
        Ok(())
    }

    /// Number of frames chained so far
    pub fn frames_added(&self) -> u64 {
        self.frames_added
    }

    /// Finalize the chain and return the temporal hash
    ///
    /// Fails with `OrderingError` when no frames were added or when indices
    /// were skipped (the chain must cover every index from 0 to the last).
    pub fn finalize(self) -> Result<[u8; 32]> {
        let last = self
            .last_index
            .ok_or_else(|| Error::Ordering("No frames chained".into()))?;
        if self.frames_added != u64::from(last) + 1 {
            return Err(Error::Ordering(format!(
                "Chained {} frames but last index was {last}",
                self.frames_added
            )));
        }
        Ok(self.state)
    }
}

/// Verify that a live capture reproduces the enrolled temporal hash
///
/// Detects the active region of the live samples, recomputes the chain over
/// it, compares against `expected` in constant time, and independently checks
/// that the elapsed wall-clock time corresponds to a playback speed within
/// [`MIN_PLAYBACK_SPEED`, `MAX_PLAYBACK_SPEED`] (inclusive). Every failure
/// surfaces as `TemporalMismatch`.
pub fn verify_temporal_consistency(
    expected: &[u8; 32],
    owner_pub: &[u8; 32],
    track_length: u64,
    live_samples: &[f32],
    params: AnalysisParams,
    elapsed: Duration,
) -> Result<()> {
    check_playback_speed(track_length, params.sample_rate, elapsed)?;

    let analysis = audio::analyze_samples(live_samples, params)
        .map_err(|e| Error::TemporalMismatch(format!("Live analysis failed: {e}")))?;
    let region = detect_active_region(&analysis)
        .map_err(|e| Error::TemporalMismatch(format!("Live region detection failed: {e}")))?;

    let computed = compute_temporal_hash(&region, &params, owner_pub, track_length)?;

    if hashes_match(&computed, expected) {
        Ok(())
    } else {
        Err(Error::TemporalMismatch(
            "Temporal hash does not match enrollment".into(),
        ))
    }
}

/// Constant-time comparison of two 32-byte digests
pub fn hashes_match(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.ct_eq(b).into()
}

/// Check elapsed wall-clock time against the expected track duration
pub fn check_playback_speed(track_length: u64, sample_rate: u32, elapsed: Duration) -> Result<()> {
    let expected_secs = track_length as f64 / sample_rate as f64;
    let elapsed_secs = elapsed.as_secs_f64();
    if elapsed_secs <= 0.0 || expected_secs <= 0.0 {
        return Err(Error::TemporalMismatch("Implausible playback timing".into()));
    }

    let speed = expected_secs / elapsed_secs;
    if !(MIN_PLAYBACK_SPEED..=MAX_PLAYBACK_SPEED).contains(&speed) {
        return Err(Error::TemporalMismatch(format!(
            "Playback speed {speed:.2}x outside accepted window"
        )));
    }
    Ok(())
}
