//! Steganographic sigil layer for Echotome
//!
//! Embeds and extracts the vault-linking payload in the least significant
//! bits of a decoded RGB image. Image encoding and decoding (PNG etc.) happen
//! upstream; this crate only sees raw channel bytes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod payload;
pub mod stego;

pub use error::{Error, Result};
pub use payload::{
    embed_stego_payload, extract_stego_payload, StegoPayload, STEGO_PAYLOAD_VERSION,
};
pub use stego::{embed_payload, extract_payload, SigilImage, FRAME_HEADER_LEN, STEGO_MAGIC};
