//! Property-based tests for echotome-core
//!
//! Uses proptest to verify invariants across randomized inputs

use echotome_core::envelope::{open, seal, AeadAlgorithm};
use echotome_core::kdf::{mixing_mask, MasterKey};
use echotome_core::tsc::TemporalChain;
use echotome_core::{Error, ENVELOPE_VERSION};
use echotome_profiles::PrivacyProfile;
use proptest::prelude::*;

// ============================================================================
// Property Test Strategies
// ============================================================================

/// Generate a 32-byte key
fn key_strategy() -> impl Strategy<Value = [u8; 32]> {
    any::<[u8; 32]>()
}

/// Generate a small set of audio frames (4-24 frames of 32 samples)
fn frames_strategy() -> impl Strategy<Value = Vec<Vec<f32>>> {
    prop::collection::vec(
        prop::collection::vec(-1.0f32..1.0, 32),
        4..24,
    )
}

/// Generate plaintext payloads (0-2048 bytes)
fn plaintext_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..2048)
}

/// Generate a plausible rune id
fn rune_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("ECH-[A-Z2-7]{8}").unwrap()
}

fn chain_all(frames: &[Vec<f32>], owner: &[u8; 32], track_length: u64) -> [u8; 32] {
    let mut chain = TemporalChain::init(owner, track_length);
    for (i, frame) in frames.iter().enumerate() {
        chain
            .add_frame(i as u32, (i as u64) * 16, frame)
            .expect("Indices are contiguous");
    }
    chain.finalize().expect("Chain is complete")
}

// ============================================================================
// Temporal Salt Chain Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: Same frames + same identity = same temporal hash
    #[test]
    fn prop_tsc_deterministic(
        frames in frames_strategy(),
        owner in key_strategy()
    ) {
        let a = chain_all(&frames, &owner, 16_000);
        let b = chain_all(&frames, &owner, 16_000);
        prop_assert_eq!(a, b);
    }

    /// Property: Swapping any two adjacent frames changes the hash
    #[test]
    fn prop_tsc_order_sensitive(
        frames in frames_strategy(),
        owner in key_strategy(),
        swap_at in 0usize..22
    ) {
        prop_assume!(swap_at + 1 < frames.len());
        prop_assume!(frames[swap_at] != frames[swap_at + 1]);

        let baseline = chain_all(&frames, &owner, 16_000);

        let mut permuted = frames.clone();
        permuted.swap(swap_at, swap_at + 1);
        let permuted_hash = chain_all(&permuted, &owner, 16_000);

        prop_assert_ne!(baseline, permuted_hash);
    }

    /// Property: Different owners produce different chains
    #[test]
    fn prop_tsc_owner_bound(
        frames in frames_strategy(),
        owner_a in key_strategy(),
        owner_b in key_strategy()
    ) {
        prop_assume!(owner_a != owner_b);
        prop_assert_ne!(
            chain_all(&frames, &owner_a, 16_000),
            chain_all(&frames, &owner_b, 16_000)
        );
    }

    /// Property: A non-contiguous index sequence never finalizes cleanly
    #[test]
    fn prop_tsc_gaps_rejected(
        frames in frames_strategy(),
        owner in key_strategy(),
        skip in 1usize..8
    ) {
        prop_assume!(frames.len() > skip + 1);

        let mut chain = TemporalChain::init(&owner, 16_000);
        chain.add_frame(0, 0, &frames[0]).unwrap();
        chain.add_frame((skip + 1) as u32, 16, &frames[1]).unwrap();
        for (offset, frame) in frames[2..].iter().enumerate() {
            chain
                .add_frame((skip + 2 + offset) as u32, 32 + offset as u64 * 16, frame)
                .unwrap();
        }
        prop_assert!(matches!(chain.finalize(), Err(Error::Ordering(_))));
    }
}

// ============================================================================
// Envelope Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: seal then open recovers the plaintext and context
    #[test]
    fn prop_envelope_round_trip(
        key in key_strategy(),
        plaintext in plaintext_strategy(),
        rune in rune_id_strategy()
    ) {
        let key = MasterKey::from_bytes(key);
        for algorithm in [AeadAlgorithm::XChaCha20Poly1305, AeadAlgorithm::Aes256Gcm] {
            let sealed = seal(&key, &plaintext, PrivacyProfile::RitualLock, &rune, algorithm)
                .unwrap();
            let opened = open(&key, &sealed).unwrap();
            prop_assert_eq!(&opened.plaintext, &plaintext);
            prop_assert_eq!(&opened.rune_id, &rune);
            prop_assert_eq!(opened.profile, PrivacyProfile::RitualLock);
        }
    }

    /// Property: A different key never opens the envelope
    #[test]
    fn prop_envelope_wrong_key_fails(
        key_a in key_strategy(),
        key_b in key_strategy(),
        plaintext in plaintext_strategy(),
        rune in rune_id_strategy()
    ) {
        prop_assume!(key_a != key_b);
        let sealed = seal(
            &MasterKey::from_bytes(key_a),
            &plaintext,
            PrivacyProfile::QuickLock,
            &rune,
            AeadAlgorithm::XChaCha20Poly1305,
        )
        .unwrap();
        let result = open(&MasterKey::from_bytes(key_b), &sealed);
        prop_assert!(matches!(result, Err(Error::AeadFailure(_))));
    }

    /// Property: Flipping any ciphertext byte breaks authentication
    #[test]
    fn prop_envelope_bit_flip_detected(
        key in key_strategy(),
        plaintext in prop::collection::vec(any::<u8>(), 1..256),
        rune in rune_id_strategy(),
        flip in any::<prop::sample::Index>()
    ) {
        let key = MasterKey::from_bytes(key);
        let sealed = seal(
            &key,
            &plaintext,
            PrivacyProfile::RitualLock,
            &rune,
            AeadAlgorithm::XChaCha20Poly1305,
        )
        .unwrap();

        // Flip one byte of the ciphertext+tag section
        let ct_start = sealed.len() - plaintext.len() - 16;
        let mut tampered = sealed.clone();
        let idx = ct_start + flip.index(tampered.len() - ct_start);
        tampered[idx] ^= 0x01;

        prop_assert!(open(&key, &tampered).is_err());
    }
}

// ============================================================================
// Mixing Mask Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Property: The mask folds round(w * 256) bits
    #[test]
    fn prop_mask_bit_count(weight in 0.0f64..=1.0) {
        let mask = mixing_mask(weight);
        let bits: u32 = mask.iter().map(|b| b.count_ones()).sum();
        prop_assert_eq!(bits, (weight * 256.0).round() as u32);
    }

    /// Property: Mask bit count is monotone in the weight
    #[test]
    fn prop_mask_monotone(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let lo_bits: u32 = mixing_mask(lo).iter().map(|x| x.count_ones()).sum();
        let hi_bits: u32 = mixing_mask(hi).iter().map(|x| x.count_ones()).sum();
        prop_assert!(lo_bits <= hi_bits);
    }
}

// ============================================================================
// Envelope format regression
// ============================================================================

#[test]
fn test_envelope_layout_is_stable() {
    let key = MasterKey::from_bytes([1u8; 32]);
    let sealed = seal(
        &key,
        b"layout",
        PrivacyProfile::QuickLock,
        "ECH-AAAAAAAA",
        AeadAlgorithm::XChaCha20Poly1305,
    )
    .unwrap();

    assert_eq!(&sealed[..4], b"ECHO");
    assert_eq!(sealed[4], ENVELOPE_VERSION);
    assert_eq!(sealed[5], 1); // XChaCha20-Poly1305
    assert_eq!(sealed[6], PrivacyProfile::QuickLock.profile_id());

    // ad = profile_id || rune_id || version
    let ad_len_pos = 4 + 3 + 24;
    let ad_len =
        u32::from_le_bytes(sealed[ad_len_pos..ad_len_pos + 4].try_into().unwrap()) as usize;
    assert_eq!(ad_len, 1 + "ECH-AAAAAAAA".len() + 1);
}
