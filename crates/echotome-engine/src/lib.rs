//! Echotome enrollment and unlock orchestration
//!
//! Glues the core engine, the sigil layer, and the storage layer into the
//! two top-level flows: enrollment (bind a vault to audio, sign a
//! certificate, emit a sigil) and unlock (perform the ritual, recover the
//! key, open a time-limited session). Consumed by separate clients; this
//! crate exposes no CLI or transport.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod engine;
mod enroll;
mod error;
mod unlock;

pub use engine::Engine;
pub use enroll::{Enrollment, EnrollmentRequest};
pub use error::{Error, Result};
pub use unlock::{LivePerformance, UnlockRequest};

pub use echotome_core::{AeadAlgorithm, AnalysisParams};
pub use echotome_profiles::PrivacyProfile;
pub use echotome_sigil::SigilImage;
pub use echotome_storage::{DataRoot, SessionInfo};
