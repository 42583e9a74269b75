//! Secure deletion
//!
//! Session plaintext is wiped with a three-pass overwrite (zeros, 0xFF,
//! random), fsyncing after each pass, before the file is unlinked and the
//! directory removed. Overwriting is best-effort against journaling and
//! copy-on-write filesystems; the session layer additionally keeps plaintext
//! lifetimes short.

use crate::Result;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

/// Overwrite passes applied to each file, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Zeros,
    Ones,
    Random,
}

const PASSES: [Pass; 3] = [Pass::Zeros, Pass::Ones, Pass::Random];

const CHUNK_SIZE: usize = 64 * 1024;

/// Securely delete a single file
pub fn secure_delete_file(path: &Path) -> Result<()> {
    let len = fs::metadata(path)?.len();

    let mut file = OpenOptions::new().write(true).open(path)?;
    for pass in PASSES {
        file.seek(SeekFrom::Start(0))?;
        overwrite(&mut file, len, pass)?;
        file.sync_all()?;
    }
    drop(file);

    fs::remove_file(path)?;
    Ok(())
}

fn overwrite(file: &mut fs::File, len: u64, pass: Pass) -> Result<()> {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut remaining = len;
    while remaining > 0 {
        let take = remaining.min(CHUNK_SIZE as u64) as usize;
        match pass {
            Pass::Zeros => chunk[..take].fill(0x00),
            Pass::Ones => chunk[..take].fill(0xFF),
            Pass::Random => OsRng.fill_bytes(&mut chunk[..take]),
        }
        file.write_all(&chunk[..take])?;
        remaining -= take as u64;
    }
    Ok(())
}

/// Remove a directory tree, optionally overwriting every file first
///
/// With `secure` false this is a plain recursive removal.
pub fn wipe_directory(dir: &Path, secure: bool) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    if secure {
        wipe_tree(dir)?;
    }
    fs::remove_dir_all(dir)?;
    tracing::debug!(dir = %dir.display(), secure, "Wiped directory");
    Ok(())
}

fn wipe_tree(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            wipe_tree(&path)?;
        } else if let Err(e) = secure_delete_file(&path) {
            // Keep wiping the rest; remove_dir_all still unlinks this file
            tracing::warn!(path = %path.display(), error = %e, "Secure delete failed");
        }
    }
    Ok(())
}
