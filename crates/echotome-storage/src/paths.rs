//! On-disk layout
//!
//! Everything lives under a single data root (default `~/.echotome/`):
//! `identity/` for the device keypair, `rituals/` for certificates,
//! `vaults/` for metadata and ciphertexts, `sessions/` for ephemeral
//! plaintext. Directories are created owner-only.

use crate::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Directory permissions for everything under the data root
#[cfg(unix)]
pub const DIR_MODE: u32 = 0o700;

/// File permissions for key material and metadata
#[cfg(unix)]
pub const FILE_MODE: u32 = 0o600;

/// The Echotome data root
#[derive(Debug, Clone)]
pub struct DataRoot {
    root: PathBuf,
}

impl DataRoot {
    /// Use an explicit data root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the default `~/.echotome` root from `$HOME`
    pub fn default_root() -> Result<Self> {
        let home = std::env::var_os("HOME")
            .ok_or_else(|| Error::Validation("HOME is not set; pass a data root".into()))?;
        Ok(Self::new(PathBuf::from(home).join(".echotome")))
    }

    /// The root directory itself
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Identity keystore directory
    pub fn identity_dir(&self) -> PathBuf {
        self.root.join("identity")
    }

    /// Ritual certificate directory
    pub fn rituals_dir(&self) -> PathBuf {
        self.root.join("rituals")
    }

    /// Vault metadata and ciphertext directory
    pub fn vaults_dir(&self) -> PathBuf {
        self.root.join("vaults")
    }

    /// Ephemeral session directory
    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    /// Create the full layout with owner-only permissions
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [
            self.root.clone(),
            self.identity_dir(),
            self.rituals_dir(),
            self.vaults_dir(),
            self.sessions_dir(),
        ] {
            create_private_dir(&dir)?;
        }
        Ok(())
    }
}

/// Create a directory (and parents) restricted to the owner
pub fn create_private_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(DIR_MODE))?;
    }
    Ok(())
}

/// Atomically replace `path` with `bytes` (write-to-temp + rename)
///
/// The temporary file is created in the target directory so the rename never
/// crosses filesystems, and it is restricted to the owner before any payload
/// byte is written.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Validation(format!("No parent directory for {}", path.display())))?;

    let tmp_path = dir.join(format!(
        ".{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "write".into())
    ));

    let mut file = fs::File::create(&tmp_path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(FILE_MODE))?;
    }
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    Ok(())
}
