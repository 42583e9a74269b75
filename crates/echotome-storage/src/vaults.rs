//! Vault registry
//!
//! Vault metadata lives in `vaults/<vault_id>.json`; ciphertext blobs live in
//! a sibling `vaults/<vault_id>/` directory. Metadata writes are atomic
//! (temp + rename). Nothing in this module ever touches plaintext.

use crate::paths::{atomic_write, create_private_dir, DataRoot};
use crate::{Error, Result};
use echotome_profiles::PrivacyProfile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

/// Vault metadata record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vault {
    /// Stable vault identifier (UUID v4)
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Privacy profile the vault was enrolled under
    pub profile: PrivacyProfile,
    /// Rune id derived from the master key
    pub rune_id: String,
    /// Creation time, Unix seconds
    pub created_at: i64,
    /// Last update time, Unix seconds
    pub updated_at: i64,
    /// Rune id of the bound certificate, once a ritual succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_ref: Option<String>,
    /// Names of the encrypted blobs stored beside this record
    #[serde(default)]
    pub encrypted_blobs: Vec<String>,
}

/// Aggregate statistics over all vaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultStats {
    /// Number of vaults
    pub total_vaults: usize,
    /// Number of encrypted blobs across all vaults
    pub total_blobs: usize,
    /// Vault count per profile name
    pub per_profile: BTreeMap<String, usize>,
}

/// Filesystem store for vault metadata and ciphertexts
#[derive(Debug, Clone)]
pub struct VaultStore {
    root: DataRoot,
}

impl VaultStore {
    /// Open a store under the given data root
    pub fn new(root: DataRoot) -> Self {
        Self { root }
    }

    fn metadata_path(&self, vault_id: &str) -> PathBuf {
        self.root.vaults_dir().join(format!("{vault_id}.json"))
    }

    fn blobs_dir(&self, vault_id: &str) -> PathBuf {
        self.root.vaults_dir().join(vault_id)
    }

    /// Create a new vault
    pub fn create_vault(
        &self,
        name: &str,
        profile: PrivacyProfile,
        rune_id: &str,
    ) -> Result<Vault> {
        if name.is_empty() {
            return Err(Error::Validation("Vault name must not be empty".into()));
        }

        let now = chrono::Utc::now().timestamp();
        let vault = Vault {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            profile,
            rune_id: rune_id.to_string(),
            created_at: now,
            updated_at: now,
            certificate_ref: None,
            encrypted_blobs: Vec::new(),
        };

        self.write_metadata(&vault)?;
        tracing::info!(vault_id = %vault.id, rune_id, "Created vault");
        Ok(vault)
    }

    /// Load a vault by id
    pub fn get_vault(&self, vault_id: &str) -> Result<Vault> {
        let path = self.metadata_path(vault_id);
        if !path.exists() {
            return Err(Error::NotFound(format!("Vault {vault_id}")));
        }
        Ok(serde_json::from_slice(&fs::read(&path)?)?)
    }

    /// List all vaults, most recently updated first
    pub fn list_vaults(&self) -> Result<Vec<Vault>> {
        let dir = self.root.vaults_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut vaults = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read(&path)
                .map_err(Error::from)
                .and_then(|bytes| serde_json::from_slice::<Vault>(&bytes).map_err(Error::from))
            {
                Ok(vault) => vaults.push(vault),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable vault record");
                }
            }
        }
        vaults.sort_by_key(|v| std::cmp::Reverse(v.updated_at));
        Ok(vaults)
    }

    /// Persist updated metadata, bumping `updated_at`
    pub fn update_vault(&self, vault: &mut Vault) -> Result<()> {
        vault.updated_at = chrono::Utc::now().timestamp();
        self.write_metadata(vault)
    }

    /// Record the certificate a successful ritual bound to this vault
    pub fn bind_certificate(&self, vault_id: &str, certificate_rune_id: &str) -> Result<Vault> {
        let mut vault = self.get_vault(vault_id)?;
        vault.certificate_ref = Some(certificate_rune_id.to_string());
        self.update_vault(&mut vault)?;
        Ok(vault)
    }

    /// Delete a vault, its metadata, and every ciphertext blob
    pub fn delete_vault(&self, vault_id: &str) -> Result<bool> {
        let path = self.metadata_path(vault_id);
        if !path.exists() {
            return Ok(false);
        }

        let blobs = self.blobs_dir(vault_id);
        if blobs.exists() {
            fs::remove_dir_all(&blobs)?;
        }
        fs::remove_file(&path)?;
        tracing::info!(vault_id, "Deleted vault and its blobs");
        Ok(true)
    }

    /// Store an encrypted blob under the vault
    pub fn store_blob(&self, vault_id: &str, blob_name: &str, envelope: &[u8]) -> Result<PathBuf> {
        validate_blob_name(blob_name)?;
        let mut vault = self.get_vault(vault_id)?;

        let dir = self.blobs_dir(vault_id);
        create_private_dir(&dir)?;
        let path = dir.join(blob_name);
        atomic_write(&path, envelope)?;

        if !vault.encrypted_blobs.iter().any(|b| b == blob_name) {
            vault.encrypted_blobs.push(blob_name.to_string());
        }
        self.update_vault(&mut vault)?;
        Ok(path)
    }

    /// Load an encrypted blob
    pub fn load_blob(&self, vault_id: &str, blob_name: &str) -> Result<Vec<u8>> {
        validate_blob_name(blob_name)?;
        let path = self.blobs_dir(vault_id).join(blob_name);
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "Blob {blob_name} in vault {vault_id}"
            )));
        }
        Ok(fs::read(&path)?)
    }

    /// List blob names recorded for a vault
    pub fn list_blobs(&self, vault_id: &str) -> Result<Vec<String>> {
        Ok(self.get_vault(vault_id)?.encrypted_blobs)
    }

    /// Aggregate statistics over every vault
    pub fn stats(&self) -> Result<VaultStats> {
        let vaults = self.list_vaults()?;
        let mut per_profile = BTreeMap::new();
        let mut total_blobs = 0;
        for vault in &vaults {
            *per_profile
                .entry(vault.profile.name().to_string())
                .or_insert(0) += 1;
            total_blobs += vault.encrypted_blobs.len();
        }
        Ok(VaultStats {
            total_vaults: vaults.len(),
            total_blobs,
            per_profile,
        })
    }

    fn write_metadata(&self, vault: &Vault) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(vault)?;
        atomic_write(&self.metadata_path(&vault.id), &bytes)
    }
}

fn validate_blob_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if ok {
        Ok(())
    } else {
        Err(Error::Validation(format!("Invalid blob name: {name:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, VaultStore) {
        let tmp = tempdir().unwrap();
        let root = DataRoot::new(tmp.path().join("echotome"));
        root.ensure_layout().unwrap();
        (tmp, VaultStore::new(root))
    }

    #[test]
    fn test_create_and_get() {
        let (_tmp, store) = store();
        let vault = store
            .create_vault("journal", PrivacyProfile::RitualLock, "ECH-AAAAAAAA")
            .unwrap();

        let loaded = store.get_vault(&vault.id).unwrap();
        assert_eq!(loaded, vault);
        assert_eq!(loaded.profile, PrivacyProfile::RitualLock);
        assert!(loaded.certificate_ref.is_none());

        assert!(matches!(
            store.get_vault("missing").unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[test]
    fn test_empty_name_rejected() {
        let (_tmp, store) = store();
        assert!(store
            .create_vault("", PrivacyProfile::QuickLock, "ECH-AAAAAAAA")
            .is_err());
    }

    #[test]
    fn test_blob_round_trip() {
        let (_tmp, store) = store();
        let vault = store
            .create_vault("files", PrivacyProfile::QuickLock, "ECH-AAAAAAAA")
            .unwrap();

        store
            .store_blob(&vault.id, "notes.ech", b"sealed envelope bytes")
            .unwrap();
        assert_eq!(
            store.load_blob(&vault.id, "notes.ech").unwrap(),
            b"sealed envelope bytes"
        );
        assert_eq!(store.list_blobs(&vault.id).unwrap(), vec!["notes.ech"]);

        // Overwriting does not duplicate the registry entry
        store
            .store_blob(&vault.id, "notes.ech", b"updated envelope")
            .unwrap();
        assert_eq!(store.list_blobs(&vault.id).unwrap().len(), 1);
    }

    #[test]
    fn test_blob_name_validation() {
        let (_tmp, store) = store();
        let vault = store
            .create_vault("files", PrivacyProfile::QuickLock, "ECH-AAAAAAAA")
            .unwrap();

        for bad in ["../escape", "a/b", "", ".hidden"] {
            assert!(
                store.store_blob(&vault.id, bad, b"x").is_err(),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_bind_certificate() {
        let (_tmp, store) = store();
        let vault = store
            .create_vault("journal", PrivacyProfile::BlackVault, "ECH-AAAAAAAA")
            .unwrap();
        let bound = store.bind_certificate(&vault.id, "ECH-AAAAAAAA").unwrap();
        assert_eq!(bound.certificate_ref.as_deref(), Some("ECH-AAAAAAAA"));

        let reloaded = store.get_vault(&vault.id).unwrap();
        assert_eq!(reloaded.certificate_ref.as_deref(), Some("ECH-AAAAAAAA"));
    }

    #[test]
    fn test_delete_removes_blobs() {
        let (_tmp, store) = store();
        let vault = store
            .create_vault("files", PrivacyProfile::QuickLock, "ECH-AAAAAAAA")
            .unwrap();
        let blob_path = store.store_blob(&vault.id, "a.ech", b"bytes").unwrap();
        assert!(blob_path.exists());

        assert!(store.delete_vault(&vault.id).unwrap());
        assert!(!blob_path.exists());
        assert!(store.get_vault(&vault.id).is_err());
        assert!(!store.delete_vault(&vault.id).unwrap());
    }

    #[test]
    fn test_list_sorted_by_update() {
        let (_tmp, store) = store();
        let a = store
            .create_vault("first", PrivacyProfile::QuickLock, "ECH-AAAAAAAA")
            .unwrap();
        let _b = store
            .create_vault("second", PrivacyProfile::RitualLock, "ECH-BBBBBBBB")
            .unwrap();

        // Touch the first vault so it sorts newest; timestamps have second
        // granularity, so force a distinct value
        let mut first = store.get_vault(&a.id).unwrap();
        store.update_vault(&mut first).unwrap();
        first.updated_at += 10;
        store.write_metadata(&first).unwrap();

        let listed = store.list_vaults().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "first");
    }

    #[test]
    fn test_stats() {
        let (_tmp, store) = store();
        let a = store
            .create_vault("a", PrivacyProfile::QuickLock, "ECH-AAAAAAAA")
            .unwrap();
        store
            .create_vault("b", PrivacyProfile::QuickLock, "ECH-BBBBBBBB")
            .unwrap();
        store
            .create_vault("c", PrivacyProfile::BlackVault, "ECH-CCCCCCCC")
            .unwrap();
        store.store_blob(&a.id, "x.ech", b"1").unwrap();
        store.store_blob(&a.id, "y.ech", b"2").unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_vaults, 3);
        assert_eq!(stats.total_blobs, 2);
        assert_eq!(stats.per_profile.get("QuickLock"), Some(&2));
        assert_eq!(stats.per_profile.get("BlackVault"), Some(&1));
    }
}
