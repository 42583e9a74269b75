//! Steganographic payload model
//!
//! The payload embedded into a sigil image is a small UTF-8 JSON document
//! linking the image to a vault: the encrypted master key, the ritual imprint
//! vector, and the hash of the ritual certificate it belongs with.

use crate::stego::{embed_payload, extract_payload, SigilImage};
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Current stego payload format version
pub const STEGO_PAYLOAD_VERSION: &str = "steg-1";

/// The recognized payload fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StegoPayload {
    /// Base64 of the AEAD-encrypted master key envelope
    pub enc_mk: String,
    /// Hex SHA-256 of the canonical ritual certificate bytes
    pub roc_hash: String,
    /// Hex ritual imprint vector
    pub riv: String,
    /// Vault rune id
    pub rune_id: String,
    /// Payload format version
    pub version: String,
}

impl StegoPayload {
    /// Assemble a payload from its raw components
    pub fn new(rune_id: String, enc_mk: &[u8], roc_hash: &[u8; 32], riv: &[u8; 32]) -> Self {
        Self {
            enc_mk: BASE64.encode(enc_mk),
            roc_hash: hex::encode(roc_hash),
            riv: hex::encode(riv),
            rune_id,
            version: STEGO_PAYLOAD_VERSION.to_string(),
        }
    }

    /// Decode the encrypted master key envelope
    pub fn enc_mk_bytes(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(&self.enc_mk)
            .map_err(|e| Error::PayloadCorrupt(format!("Bad enc_mk encoding: {e}")))
    }

    /// Decode the certificate hash
    pub fn roc_hash_bytes(&self) -> Result<[u8; 32]> {
        decode_hex32(&self.roc_hash, "roc_hash")
    }

    /// Decode the ritual imprint vector
    pub fn riv_bytes(&self) -> Result<[u8; 32]> {
        decode_hex32(&self.riv, "riv")
    }
}

fn decode_hex32(value: &str, field: &str) -> Result<[u8; 32]> {
    let bytes =
        hex::decode(value).map_err(|e| Error::PayloadCorrupt(format!("Bad {field}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| Error::PayloadCorrupt(format!("Bad {field} length")))
}

/// Embed a stego payload into a sigil image
pub fn embed_stego_payload(image: &SigilImage, payload: &StegoPayload) -> Result<SigilImage> {
    let json = serde_json::to_vec(payload)?;
    tracing::debug!(
        rune_id = %payload.rune_id,
        bytes = json.len(),
        "Embedding stego payload"
    );
    embed_payload(image, &json)
}

/// Extract and validate a stego payload from a sigil image
pub fn extract_stego_payload(image: &SigilImage) -> Result<StegoPayload> {
    let bytes = extract_payload(image)?;
    let payload: StegoPayload = serde_json::from_slice(&bytes)?;
    if payload.version != STEGO_PAYLOAD_VERSION {
        return Err(Error::PayloadCorrupt(format!(
            "Unsupported payload version: {}",
            payload.version
        )));
    }
    Ok(payload)
}
