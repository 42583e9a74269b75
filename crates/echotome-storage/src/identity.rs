//! Device identity keystore
//!
//! A persistent per-device Ed25519 keypair. Generated once on first use,
//! written atomically with owner-only permissions, and loaded into memory for
//! the lifetime of the process. The private key never leaves this module:
//! seed bytes are held in zero-on-drop containers while they are persisted or
//! loaded, the signing key itself wipes its seed on drop, and a keystore that
//! finds its private key readable by group or other refuses to load it.

use crate::paths::{atomic_write, create_private_dir, DataRoot};
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use zeroize::Zeroizing;

/// Private key filename under `identity/`
pub const PRIVATE_KEY_FILE: &str = "identity.key";

/// Public key filename under `identity/`
pub const PUBLIC_KEY_FILE: &str = "identity.pub";

/// Device identity keypair held in memory
pub struct IdentityKeypair {
    signing: SigningKey,
}

impl IdentityKeypair {
    fn from_signing(signing: SigningKey) -> Self {
        Self { signing }
    }

    /// Raw 32-byte public key
    pub fn public_bytes(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// Sign arbitrary bytes, returning the 64-byte Ed25519 signature
    pub fn sign(&self, bytes: &[u8]) -> [u8; 64] {
        self.signing.sign(bytes).to_bytes()
    }

    /// Short lowercase-hex fingerprint of the public key
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.public_bytes())
    }

    /// Export the public key as base64
    pub fn export_public_base64(&self) -> String {
        BASE64.encode(self.public_bytes())
    }
}

impl std::fmt::Debug for IdentityKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IdentityKeypair({})", self.fingerprint())
    }
}

/// Fingerprint of a raw public key: `hex(SHA-256(pub)[..8])`
pub fn fingerprint(public_key: &[u8; 32]) -> String {
    let digest: [u8; 32] = Sha256::digest(public_key).into();
    hex::encode(&digest[..8])
}

/// Verify a detached Ed25519 signature
pub fn verify_signature(public_key: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> bool {
    let Ok(verifying) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    verifying
        .verify(message, &Signature::from_bytes(signature))
        .is_ok()
}

/// Import a base64 public key
pub fn import_public_base64(encoded: &str) -> Result<[u8; 32]> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| Error::Identity(format!("Bad public key encoding: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| Error::Identity("Public key must be 32 bytes".into()))
}

/// Persistent identity keystore rooted at the data directory
#[derive(Debug, Clone)]
pub struct IdentityKeystore {
    root: DataRoot,
}

impl IdentityKeystore {
    /// Open a keystore under the given data root
    pub fn new(root: DataRoot) -> Self {
        Self { root }
    }

    fn private_key_path(&self) -> PathBuf {
        self.root.identity_dir().join(PRIVATE_KEY_FILE)
    }

    fn public_key_path(&self) -> PathBuf {
        self.root.identity_dir().join(PUBLIC_KEY_FILE)
    }

    /// Return the device keypair, generating and persisting one on first use
    pub fn ensure_identity_keypair(&self) -> Result<IdentityKeypair> {
        if self.private_key_path().exists() {
            self.load()
        } else {
            self.generate()
        }
    }

    /// Rotate the device identity, discarding the previous keypair
    ///
    /// Every certificate signed by the old key becomes unverifiable.
    pub fn reset_identity_keypair(&self) -> Result<IdentityKeypair> {
        for path in [self.private_key_path(), self.public_key_path()] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        tracing::warn!("Device identity rotated; existing certificates are now orphaned");
        self.generate()
    }

    fn generate(&self) -> Result<IdentityKeypair> {
        create_private_dir(&self.root.identity_dir())?;

        let signing = SigningKey::generate(&mut OsRng);
        let keypair = IdentityKeypair::from_signing(signing);

        let seed = Zeroizing::new(keypair.signing.to_bytes());
        atomic_write(&self.private_key_path(), &*seed)?;
        atomic_write(&self.public_key_path(), &keypair.public_bytes())?;

        tracing::info!(
            fingerprint = %keypair.fingerprint(),
            "Generated device identity keypair"
        );
        Ok(keypair)
    }

    fn load(&self) -> Result<IdentityKeypair> {
        self.check_private_key_permissions()?;

        let priv_bytes = Zeroizing::new(fs::read(self.private_key_path())?);
        if priv_bytes.len() != 32 {
            return Err(Error::Identity("Private key must be 32 bytes".into()));
        }
        let mut seed = Zeroizing::new([0u8; 32]);
        seed.copy_from_slice(&priv_bytes);
        let signing = SigningKey::from_bytes(&seed);
        let keypair = IdentityKeypair::from_signing(signing);

        // The stored public key must correspond to the private key
        let pub_bytes = fs::read(self.public_key_path())?;
        if pub_bytes != keypair.public_bytes() {
            return Err(Error::Identity(
                "Stored public key does not match private key".into(),
            ));
        }

        Ok(keypair)
    }

    fn check_private_key_permissions(&self) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(self.private_key_path())?.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(Error::Security(format!(
                    "Refusing to load private key with mode {:o}; expected owner-only",
                    mode & 0o777
                )));
            }
        }
        Ok(())
    }
}
