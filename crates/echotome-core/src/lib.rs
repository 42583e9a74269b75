//! Echotome cryptographic engine
//!
//! This crate implements the ritual-cryptography core: deterministic audio
//! feature extraction, active region detection, the Temporal Salt Chain,
//! the Ritual Imprint Vector, the Audio-Field KDF, and authenticated
//! encryption envelopes. It consumes decoded mono PCM and produces byte
//! payloads; codecs, transport, and UI live elsewhere.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audio;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod region;
pub mod riv;
pub mod tsc;

pub use audio::{
    analyze_samples, audio_content_hash, frame_audio, AnalysisParams, AudioAnalysis,
    DEFAULT_FRAME_SIZE, DEFAULT_HOP_SIZE, DEFAULT_SAMPLE_RATE, MIN_FRAMES_FOR_HASH,
};
pub use envelope::{
    open, peek_header, seal, AeadAlgorithm, EnvelopeHeader, OpenedEnvelope, ENVELOPE_MAGIC,
    ENVELOPE_VERSION, NONCE_SIZE,
};
pub use error::{Error, ErrorCategory, Result};
pub use kdf::{
    combined_feature_hash, combined_temporal_hash, derive_master_key, effective_key, mixing_mask,
    rune_id, temporal_bound_key, MasterKey, KEY_SIZE, RUNE_PREFIX,
};
pub use region::{detect_active_region, ActiveRegion};
pub use riv::{compute_riv, riv_fingerprint, verify_riv, RIV_SIZE};
pub use tsc::{
    check_playback_speed, compute_temporal_hash, hashes_match, verify_temporal_consistency,
    TemporalChain, MAX_PLAYBACK_SPEED, MIN_PLAYBACK_SPEED,
};
