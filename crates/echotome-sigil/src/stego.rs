//! LSB payload embedding and extraction
//!
//! Payload bytes are framed as `magic(4) || len(4, LE) || crc32(4, LE) ||
//! payload`, split into bits MSB-first, and stored in the least significant
//! bit of successive channel bytes in row-major order, (R, G, B) per pixel.
//! Alpha never exists here: the engine consumes decoded RGB buffers.

use crate::{Error, Result};

/// Magic prefix of every embedded frame
pub const STEGO_MAGIC: [u8; 4] = *b"ECHS";

/// Frame header length in bytes (magic + length + crc32)
pub const FRAME_HEADER_LEN: usize = 12;

/// A decoded RGB image: `width * height * 3` channel bytes, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigilImage {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Channel bytes, (R, G, B) per pixel
    pub rgb: Vec<u8>,
}

impl SigilImage {
    /// Wrap an RGB buffer, validating its dimensions
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() != expected {
            return Err(Error::InvalidImage(format!(
                "Expected {expected} channel bytes for {width}x{height}, got {}",
                rgb.len()
            )));
        }
        Ok(Self { width, height, rgb })
    }

    /// Number of payload bits the image can carry
    pub fn capacity_bits(&self) -> usize {
        self.rgb.len()
    }

    /// Maximum unframed payload size in bytes
    pub fn capacity_bytes(&self) -> usize {
        (self.capacity_bits() / 8).saturating_sub(FRAME_HEADER_LEN)
    }
}

/// Embed a payload, returning a new image
///
/// The result differs from the input only in the least significant bits of
/// the first `8 * framed_len` channel bytes.
pub fn embed_payload(image: &SigilImage, payload: &[u8]) -> Result<SigilImage> {
    let framed = frame_payload(payload);
    if framed.len() * 8 > image.capacity_bits() {
        return Err(Error::CapacityExceeded(format!(
            "Need {} bits, image carries {}",
            framed.len() * 8,
            image.capacity_bits()
        )));
    }

    let mut out = image.clone();
    for (bit_idx, bit) in bits_of(&framed).enumerate() {
        out.rgb[bit_idx] = (out.rgb[bit_idx] & 0xFE) | bit;
    }
    Ok(out)
}

/// Extract a payload embedded with [`embed_payload`]
pub fn extract_payload(image: &SigilImage) -> Result<Vec<u8>> {
    if image.capacity_bits() < FRAME_HEADER_LEN * 8 {
        return Err(Error::PayloadTruncated(
            "Image too small to carry a frame header".into(),
        ));
    }

    let header = read_bytes(image, 0, FRAME_HEADER_LEN);
    if header[..4] != STEGO_MAGIC {
        return Err(Error::PayloadCorrupt("Bad magic".into()));
    }
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let expected_crc = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);

    if (FRAME_HEADER_LEN + len) * 8 > image.capacity_bits() {
        return Err(Error::PayloadTruncated(format!(
            "Declared length {len} exceeds image capacity"
        )));
    }

    let payload = read_bytes(image, FRAME_HEADER_LEN, len);
    if crc32fast::hash(&payload) != expected_crc {
        return Err(Error::PayloadCorrupt("CRC mismatch".into()));
    }
    Ok(payload)
}

fn frame_payload(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    framed.extend_from_slice(&STEGO_MAGIC);
    framed.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    framed.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    framed.extend_from_slice(payload);
    framed
}

/// Bits of a byte slice, MSB-first
fn bits_of(bytes: &[u8]) -> impl Iterator<Item = u8> + '_ {
    bytes
        .iter()
        .flat_map(|byte| (0..8).map(move |i| (byte >> (7 - i)) & 1))
}

/// Read `count` bytes starting at `byte_offset` within the bit stream
fn read_bytes(image: &SigilImage, byte_offset: usize, count: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(count);
    let base = byte_offset * 8;
    for byte_idx in 0..count {
        let mut byte = 0u8;
        for bit in 0..8 {
            byte = (byte << 1) | (image.rgb[base + byte_idx * 8 + bit] & 1);
        }
        out.push(byte);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image(width: u32, height: u32) -> SigilImage {
        let rgb = (0..width as usize * height as usize * 3)
            .map(|i| (i % 251) as u8)
            .collect();
        SigilImage::new(width, height, rgb).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let image = gradient_image(64, 64);
        let payload = b"the ritual payload";
        let embedded = embed_payload(&image, payload).unwrap();
        assert_eq!(extract_payload(&embedded).unwrap(), payload);
    }

    #[test]
    fn test_empty_payload_round_trip() {
        let image = gradient_image(8, 8);
        let embedded = embed_payload(&image, b"").unwrap();
        assert_eq!(extract_payload(&embedded).unwrap(), b"");
    }

    #[test]
    fn test_only_lsbs_change() {
        let image = gradient_image(64, 64);
        let payload = b"delta check";
        let embedded = embed_payload(&image, payload).unwrap();

        let framed_bits = (FRAME_HEADER_LEN + payload.len()) * 8;
        for (i, (&before, &after)) in image.rgb.iter().zip(embedded.rgb.iter()).enumerate() {
            if i < framed_bits {
                assert_eq!(before & 0xFE, after & 0xFE, "non-LSB change at byte {i}");
            } else {
                assert_eq!(before, after, "byte {i} beyond the frame changed");
            }
        }
    }

    #[test]
    fn test_capacity_exceeded() {
        let image = gradient_image(4, 4); // 48 channel bytes = 48 bits
        let err = embed_payload(&image, &[0u8; 64]).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded(_)));
    }

    #[test]
    fn test_capacity_boundary() {
        // 16x16 image: 768 bits = 96 bytes; header takes 12, payload up to 84
        let image = gradient_image(16, 16);
        assert_eq!(image.capacity_bytes(), 84);
        assert!(embed_payload(&image, &[7u8; 84]).is_ok());
        assert!(embed_payload(&image, &[7u8; 85]).is_err());
    }

    #[test]
    fn test_missing_payload_detected() {
        let image = gradient_image(32, 32);
        let err = extract_payload(&image).unwrap_err();
        assert!(matches!(err, Error::PayloadCorrupt(_)));
    }

    #[test]
    fn test_corrupted_payload_detected() {
        let image = gradient_image(64, 64);
        let mut embedded = embed_payload(&image, b"payload under test").unwrap();
        // Flip an LSB inside the payload section
        let target = (FRAME_HEADER_LEN + 3) * 8;
        embedded.rgb[target] ^= 0x01;
        let err = extract_payload(&embedded).unwrap_err();
        assert!(matches!(err, Error::PayloadCorrupt(_)));
    }

    #[test]
    fn test_truncated_declared_length() {
        let image = gradient_image(16, 16);
        let mut embedded = embed_payload(&image, b"ok").unwrap();
        // Rewrite the length field to something beyond capacity
        let bogus = frame_with_length(u32::MAX / 2);
        for (bit_idx, bit) in super::bits_of(&bogus).enumerate() {
            embedded.rgb[bit_idx] = (embedded.rgb[bit_idx] & 0xFE) | bit;
        }
        let err = extract_payload(&embedded).unwrap_err();
        assert!(matches!(err, Error::PayloadTruncated(_)));
    }

    fn frame_with_length(len: u32) -> Vec<u8> {
        let mut framed = Vec::new();
        framed.extend_from_slice(&STEGO_MAGIC);
        framed.extend_from_slice(&len.to_le_bytes());
        framed.extend_from_slice(&0u32.to_le_bytes());
        framed
    }

    #[test]
    fn test_image_dimension_validation() {
        assert!(SigilImage::new(4, 4, vec![0u8; 48]).is_ok());
        assert!(SigilImage::new(4, 4, vec![0u8; 47]).is_err());
        assert!(SigilImage::new(4, 4, vec![0u8; 64]).is_err());
    }
}
