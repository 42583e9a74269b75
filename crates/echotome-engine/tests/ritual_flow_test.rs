//! End-to-end enrollment and unlock flows
//!
//! Exercises the full pipeline: analysis, certificates, sigil payloads,
//! key derivation, sessions, and the attack scenarios the engine must
//! reject.

use echotome_engine::{
    DataRoot, Engine, EnrollmentRequest, LivePerformance, PrivacyProfile, SigilImage,
    UnlockRequest,
};
use std::time::Duration;

const SAMPLE_RATE: u32 = 16_000;
const PASSPHRASE: &str = "correct horse battery staple";

/// A track with silence around a frequency-swept burst
fn burst_track(lead_secs: f32, burst_secs: f32, tail_secs: f32, base_hz: f32) -> Vec<f32> {
    let sr = SAMPLE_RATE as f32;
    let mut samples = vec![0.0f32; (lead_secs * sr) as usize];
    for i in 0..(burst_secs * sr) as usize {
        let t = i as f32 / sr;
        let freq = base_hz + 400.0 * t;
        samples.push((2.0 * std::f32::consts::PI * freq * t).sin() * 0.6);
    }
    samples.extend(std::iter::repeat(0.0).take((tail_secs * sr) as usize));
    samples
}

fn carrier() -> SigilImage {
    let rgb = (0..96usize * 96 * 3).map(|i| (i % 247) as u8).collect();
    SigilImage::new(96, 96, rgb).unwrap()
}

fn engine() -> (tempfile::TempDir, Engine) {
    let tmp = tempfile::tempdir().unwrap();
    let engine = Engine::open(DataRoot::new(tmp.path().join("echotome"))).unwrap();
    (tmp, engine)
}

fn enroll(
    engine: &Engine,
    profile: PrivacyProfile,
    tracks: Vec<&[f32]>,
) -> echotome_engine::Enrollment {
    engine
        .enroll(EnrollmentRequest {
            vault_name: "test-vault",
            passphrase: PASSPHRASE,
            profile,
            tracks,
            carrier: &carrier(),
            files: vec![("note.txt", b"sealed at enrollment".as_slice())],
            recovery_codes: None,
        })
        .unwrap()
}

fn perform<'a>(samples: &'a [f32], speed: f64) -> LivePerformance<'a> {
    let real_secs = samples.len() as f64 / SAMPLE_RATE as f64;
    LivePerformance {
        samples,
        elapsed: Duration::from_secs_f64(real_secs / speed),
    }
}

// ============================================================================
// S1: enrollment / unlock happy path
// ============================================================================

#[test]
fn test_enroll_unlock_happy_path() {
    let (_tmp, engine) = engine();
    let track = burst_track(1.5, 3.0, 1.5, 400.0);

    let enrollment = enroll(&engine, PrivacyProfile::RitualLock, vec![&track]);
    assert_eq!(enrollment.certificate.payload.tracks.len(), 1);
    assert!(enrollment.rune_id.starts_with("ECH-"));
    assert_ne!(enrollment.sigil, carrier());

    // Replaying the identical samples at 1.0x opens a session
    let session = engine
        .unlock(UnlockRequest {
            vault_id: &enrollment.vault.id,
            passphrase: PASSPHRASE,
            sigil: &enrollment.sigil,
            performances: vec![perform(&track, 1.0)],
            ttl_secs: None,
        })
        .unwrap();

    assert_eq!(session.expires_at - session.created_at, 900);
    let key_nonzero = engine
        .sessions()
        .with_key(&session.session_id, |key| key.as_bytes().iter().any(|&b| b != 0))
        .unwrap();
    assert!(key_nonzero);

    // The file sealed at enrollment decrypts into the session directory
    let path = engine
        .open_to_session(&session.session_id, "note.txt")
        .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"sealed at enrollment");
    assert!(path.starts_with(&session.dir));

    // The vault got its certificate bound by the successful ritual
    let vault = engine.vaults().get_vault(&enrollment.vault.id).unwrap();
    assert_eq!(vault.certificate_ref.as_deref(), Some(enrollment.rune_id.as_str()));
}

// ============================================================================
// S2: acceleration attack
// ============================================================================

#[test]
fn test_acceleration_attack_rejected() {
    let (_tmp, engine) = engine();
    let track = burst_track(1.0, 3.0, 1.0, 400.0);
    let enrollment = enroll(&engine, PrivacyProfile::RitualLock, vec![&track]);

    // Same frames, wall clock compressed to 1.5x speed
    let err = engine
        .unlock(UnlockRequest {
            vault_id: &enrollment.vault.id,
            passphrase: PASSPHRASE,
            sigil: &enrollment.sigil,
            performances: vec![perform(&track, 1.5)],
            ttl_secs: None,
        })
        .unwrap_err();

    assert!(
        matches!(
            err,
            echotome_engine::Error::Core(echotome_core::Error::TemporalMismatch(_))
        ),
        "{err:?}"
    );

    // The attempt never got past Unlocking: no session, no session directory
    assert!(engine.sessions().list_active().is_empty());
    let session_dirs = std::fs::read_dir(engine.data_root().sessions_dir())
        .unwrap()
        .count();
    assert_eq!(session_dirs, 0);
}

// ============================================================================
// S4: wrong passphrase
// ============================================================================

#[test]
fn test_wrong_passphrase_fails_before_plaintext() {
    let (_tmp, engine) = engine();
    let track = burst_track(1.0, 3.0, 1.0, 400.0);
    let enrollment = enroll(&engine, PrivacyProfile::RitualLock, vec![&track]);

    let err = engine
        .unlock(UnlockRequest {
            vault_id: &enrollment.vault.id,
            passphrase: "correct horse battery staplf",
            sigil: &enrollment.sigil,
            performances: vec![perform(&track, 1.0)],
            ttl_secs: None,
        })
        .unwrap_err();

    assert!(
        matches!(
            err,
            echotome_engine::Error::Core(echotome_core::Error::AeadFailure(_))
        ),
        "{err:?}"
    );
    assert!(engine.sessions().list_active().is_empty());
}

// ============================================================================
// S5: session expiry and wipe
// ============================================================================

#[test]
fn test_session_expiry_wipes_plaintext() {
    let (_tmp, engine) = engine();
    let track = burst_track(0.5, 2.0, 0.5, 400.0);
    let enrollment = enroll(&engine, PrivacyProfile::QuickLock, vec![&track]);

    let session = engine
        .unlock(UnlockRequest {
            vault_id: &enrollment.vault.id,
            passphrase: PASSPHRASE,
            sigil: &enrollment.sigil,
            performances: vec![perform(&track, 1.0)],
            ttl_secs: Some(1),
        })
        .unwrap();

    let path = engine
        .open_to_session(&session.session_id, "note.txt")
        .unwrap();
    assert!(path.exists());

    std::thread::sleep(Duration::from_millis(1600));
    engine.sessions().cleanup();

    assert!(!session.dir.exists());
    assert!(!path.exists());
    assert!(matches!(
        engine.sessions().get_session(&session.session_id).unwrap_err(),
        echotome_storage::Error::SessionNotFound(_)
    ));
}

// ============================================================================
// S6: multi-track ritual ordering
// ============================================================================

#[test]
fn test_multi_track_order_enforced() {
    let (_tmp, engine) = engine();
    let track_one = burst_track(0.5, 2.0, 0.5, 300.0);
    let track_two = burst_track(0.5, 2.0, 0.5, 900.0);

    let enrollment = enroll(
        &engine,
        PrivacyProfile::RitualLock,
        vec![&track_one, &track_two],
    );
    assert_eq!(enrollment.certificate.payload.tracks.len(), 2);

    // The per-track imprints are distinct
    let riv_one = enrollment.certificate.payload.tracks[0].riv_bytes().unwrap();
    let riv_two = enrollment.certificate.payload.tracks[1].riv_bytes().unwrap();
    assert_ne!(riv_one, riv_two);

    // Swapped order fails the temporal comparison
    let err = engine
        .unlock(UnlockRequest {
            vault_id: &enrollment.vault.id,
            passphrase: PASSPHRASE,
            sigil: &enrollment.sigil,
            performances: vec![perform(&track_two, 1.0), perform(&track_one, 1.0)],
            ttl_secs: None,
        })
        .unwrap_err();
    assert!(
        matches!(
            err,
            echotome_engine::Error::Core(echotome_core::Error::TemporalMismatch(_))
        ),
        "{err:?}"
    );

    // Correct order succeeds
    let session = engine
        .unlock(UnlockRequest {
            vault_id: &enrollment.vault.id,
            passphrase: PASSPHRASE,
            sigil: &enrollment.sigil,
            performances: vec![perform(&track_one, 1.0), perform(&track_two, 1.0)],
            ttl_secs: None,
        })
        .unwrap();
    assert!(!session.dir.as_os_str().is_empty());
}

// ============================================================================
// Supporting flows
// ============================================================================

#[test]
fn test_quicklock_ignores_timing() {
    let (_tmp, engine) = engine();
    let track = burst_track(0.5, 2.0, 0.5, 400.0);
    let enrollment = enroll(&engine, PrivacyProfile::QuickLock, vec![&track]);

    // Grossly wrong elapsed time is fine for QuickLock
    let session = engine
        .unlock(UnlockRequest {
            vault_id: &enrollment.vault.id,
            passphrase: PASSPHRASE,
            sigil: &enrollment.sigil,
            performances: vec![LivePerformance {
                samples: &track,
                elapsed: Duration::from_millis(10),
            }],
            ttl_secs: None,
        })
        .unwrap();
    assert_eq!(session.expires_at - session.created_at, 30 * 60);
}

#[test]
fn test_wrong_audio_rejected() {
    let (_tmp, engine) = engine();
    let track = burst_track(0.5, 2.0, 0.5, 400.0);
    let other = burst_track(0.5, 2.0, 0.5, 1200.0);
    let enrollment = enroll(&engine, PrivacyProfile::RitualLock, vec![&track]);

    let err = engine
        .unlock(UnlockRequest {
            vault_id: &enrollment.vault.id,
            passphrase: PASSPHRASE,
            sigil: &enrollment.sigil,
            performances: vec![perform(&other, 1.0)],
            ttl_secs: None,
        })
        .unwrap_err();
    assert!(err.is_ritual_mismatch(), "{err:?}");
}

#[test]
fn test_sigil_from_other_vault_rejected() {
    let (_tmp, engine) = engine();
    let track_a = burst_track(0.5, 2.0, 0.5, 400.0);
    let track_b = burst_track(0.5, 2.0, 0.5, 800.0);

    let enrollment_a = enroll(&engine, PrivacyProfile::QuickLock, vec![&track_a]);
    let enrollment_b = enroll(&engine, PrivacyProfile::QuickLock, vec![&track_b]);

    let err = engine
        .unlock(UnlockRequest {
            vault_id: &enrollment_a.vault.id,
            passphrase: PASSPHRASE,
            sigil: &enrollment_b.sigil,
            performances: vec![perform(&track_a, 1.0)],
            ttl_secs: None,
        })
        .unwrap_err();
    assert!(matches!(err, echotome_engine::Error::Validation(_)));
}

#[test]
fn test_seal_into_vault_during_session() {
    let (_tmp, engine) = engine();
    let track = burst_track(0.5, 2.0, 0.5, 400.0);
    let enrollment = enroll(&engine, PrivacyProfile::QuickLock, vec![&track]);

    let session = engine
        .unlock(UnlockRequest {
            vault_id: &enrollment.vault.id,
            passphrase: PASSPHRASE,
            sigil: &enrollment.sigil,
            performances: vec![perform(&track, 1.0)],
            ttl_secs: None,
        })
        .unwrap();

    engine
        .seal_into_vault(&session.session_id, "added.txt", b"sealed mid-session")
        .unwrap();

    let path = engine
        .open_to_session(&session.session_id, "added.txt")
        .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"sealed mid-session");

    // Blob on disk is an envelope, not plaintext
    let raw = engine
        .vaults()
        .load_blob(&enrollment.vault.id, "added.txt")
        .unwrap();
    assert_eq!(&raw[..4], b"ECHO");

    engine.lock(&session.session_id).unwrap();
    assert!(!session.dir.exists());
}

#[test]
fn test_recovery_codes_issued_once() {
    let (_tmp, engine) = engine();
    let track = burst_track(0.5, 2.0, 0.5, 400.0);

    let enrollment = engine
        .enroll(EnrollmentRequest {
            vault_name: "recoverable",
            passphrase: PASSPHRASE,
            profile: PrivacyProfile::QuickLock,
            tracks: vec![&track],
            carrier: &carrier(),
            files: vec![],
            recovery_codes: Some(3),
        })
        .unwrap();

    assert_eq!(enrollment.recovery_codes.len(), 3);
    let recovery = enrollment
        .certificate
        .payload
        .recovery
        .as_ref()
        .expect("recovery config in certificate");
    assert!(recovery.enabled);
    assert_eq!(recovery.codes_hashes.len(), 3);
    assert!(echotome_storage::verify_recovery_code(
        &enrollment.recovery_codes[0],
        &recovery.codes_hashes
    ));
}

#[test]
fn test_silent_audio_cannot_enroll() {
    let (_tmp, engine) = engine();
    let silence = vec![0.0f32; SAMPLE_RATE as usize * 3];

    let err = engine
        .enroll(EnrollmentRequest {
            vault_name: "silent",
            passphrase: PASSPHRASE,
            profile: PrivacyProfile::QuickLock,
            tracks: vec![&silence],
            carrier: &carrier(),
            files: vec![],
            recovery_codes: None,
        })
        .unwrap_err();
    assert!(
        matches!(
            err,
            echotome_engine::Error::Core(echotome_core::Error::NoActiveRegion(_))
        ),
        "{err:?}"
    );
}
