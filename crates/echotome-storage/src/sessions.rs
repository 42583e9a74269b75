//! Session management
//!
//! A session is the time-bounded window in which a vault's master key is
//! materialized in memory and plaintext may exist in a dedicated on-disk
//! directory. The state machine is `Locked -> Unlocking -> Active ->
//! Expiring -> Wiped`; expiry, explicit lock, emergency lock, and (for
//! BlackVault) the host going to background all drive the same teardown:
//! zeroize the key, wipe the directory, drop the record.
//!
//! Locking discipline: session table first, filesystem second. The table
//! lock is never held across a wipe; a session is marked `Expiring` under the
//! lock, the lock is released for deletion, and the record is removed on a
//! second acquisition.

use crate::paths::{create_private_dir, DataRoot};
use crate::wipe::wipe_directory;
use crate::{Error, Result};
use echotome_core::MasterKey;
use echotome_profiles::PrivacyProfile;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Maximum concurrent sessions (active plus pending unlocks)
pub const MAX_ACTIVE_SESSIONS: usize = 16;

/// How often the background task sweeps for expired sessions
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5);

/// How long an unlock may sit in `Unlocking` before its key is discarded
pub const PENDING_UNLOCK_TIMEOUT: Duration = Duration::from_secs(120);

/// Session lifecycle states
///
/// `Locked` is the absence of a session and `Wiped` is terminal; the table
/// only ever holds records in the three states between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session exists for the vault
    Locked,
    /// A ritual attempt holds a freshly derived key in a pending slot
    Unlocking,
    /// The session is open; plaintext may exist in the session directory
    Active,
    /// Teardown started; the directory is being wiped
    Expiring,
    /// Key zeroized, directory gone
    Wiped,
}

/// Metadata view of a session; never carries key material
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// 128-bit random identifier, hex
    pub session_id: String,
    /// Vault this session belongs to
    pub vault_id: String,
    /// Profile governing TTLs and teardown
    pub profile: PrivacyProfile,
    /// Current lifecycle state
    pub state: SessionState,
    /// Creation time, Unix seconds
    pub created_at: i64,
    /// Expiry time, Unix seconds
    pub expires_at: i64,
    /// Last activity time, Unix seconds
    pub last_activity: i64,
    /// Directory holding session plaintext (mode 0700)
    pub dir: PathBuf,
    /// Names of plaintext files decrypted into the session directory
    pub decrypted_files: Vec<String>,
}

impl SessionInfo {
    /// Seconds remaining before expiry
    pub fn time_remaining(&self) -> u64 {
        (self.expires_at - now_ts()).max(0) as u64
    }

    /// Time remaining formatted as MM:SS
    pub fn format_time_remaining(&self) -> String {
        let remaining = self.time_remaining();
        format!("{:02}:{:02}", remaining / 60, remaining % 60)
    }

    fn is_expired(&self) -> bool {
        now_ts() >= self.expires_at
    }
}

struct SessionRecord {
    info: SessionInfo,
    master_key: MasterKey,
}

struct PendingUnlock {
    vault_id: String,
    profile: PrivacyProfile,
    master_key: MasterKey,
    started: Instant,
}

#[derive(Default)]
struct Table {
    sessions: HashMap<String, SessionRecord>,
    pending: HashMap<String, PendingUnlock>,
}

/// Process-wide session coordinator
pub struct SessionManager {
    root: DataRoot,
    table: Mutex<Table>,
}

impl SessionManager {
    /// Create a manager, sweeping any session directories left over from a
    /// previous run
    pub fn new(root: DataRoot) -> Result<Self> {
        create_private_dir(&root.sessions_dir())?;
        let manager = Self {
            root,
            table: Mutex::new(Table::default()),
        };
        manager.sweep_stale_dirs();
        Ok(manager)
    }

    fn sweep_stale_dirs(&self) {
        let Ok(entries) = std::fs::read_dir(self.root.sessions_dir()) else {
            return;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_dir() {
                // Nothing in a leftover directory is resumable; wipe it
                if let Err(e) = wipe_directory(&path, true) {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to sweep stale session dir");
                } else {
                    tracing::debug!(path = %path.display(), "Swept stale session dir");
                }
            }
        }
    }

    /// Start a ritual attempt: park the freshly derived master key in a
    /// pending slot and return its token
    ///
    /// The slot is dropped (and the key zeroized) on [`cancel_pending`], on
    /// timeout, or when [`activate`] promotes it to a session.
    pub fn begin_unlock(
        &self,
        vault_id: &str,
        profile: PrivacyProfile,
        master_key: MasterKey,
    ) -> Result<String> {
        let mut table = self.table.lock();
        if table.sessions.len() + table.pending.len() >= MAX_ACTIVE_SESSIONS {
            return Err(Error::SessionCapExceeded(format!(
                "At most {MAX_ACTIVE_SESSIONS} concurrent sessions"
            )));
        }

        let token = random_id();
        table.pending.insert(
            token.clone(),
            PendingUnlock {
                vault_id: vault_id.to_string(),
                profile,
                master_key,
                started: Instant::now(),
            },
        );
        tracing::debug!(vault_id, "Unlock pending");
        Ok(token)
    }

    /// Abandon a pending unlock, zeroizing its key
    pub fn cancel_pending(&self, token: &str) -> bool {
        self.table.lock().pending.remove(token).is_some()
    }

    /// Promote a verified pending unlock to an active session
    ///
    /// `ttl_secs` overrides the profile default and is clamped to the
    /// profile's maximum TTL.
    pub fn activate(&self, token: &str, ttl_secs: Option<u64>) -> Result<SessionInfo> {
        let pending = {
            let mut table = self.table.lock();
            let pending = table
                .pending
                .remove(token)
                .ok_or_else(|| Error::SessionNotFound("No such pending unlock".into()))?;
            if pending.started.elapsed() > PENDING_UNLOCK_TIMEOUT {
                // The key is dropped (and zeroized) right here
                return Err(Error::SessionExpired("Unlock attempt timed out".into()));
            }
            pending
        };

        let policy = pending.profile.params().session;
        let ttl = ttl_secs
            .unwrap_or(policy.default_ttl_secs)
            .clamp(1, policy.max_ttl_secs);

        let session_id = random_id();
        let dir = self.root.sessions_dir().join(&session_id);
        create_private_dir(&dir)?;

        let now = now_ts();
        let info = SessionInfo {
            session_id: session_id.clone(),
            vault_id: pending.vault_id,
            profile: pending.profile,
            state: SessionState::Active,
            created_at: now,
            expires_at: now + ttl as i64,
            last_activity: now,
            dir,
            decrypted_files: Vec::new(),
        };

        tracing::info!(
            session_id = %redact(&session_id),
            vault_id = %info.vault_id,
            ttl,
            "Session active"
        );

        let mut table = self.table.lock();
        table.sessions.insert(
            session_id,
            SessionRecord {
                info: info.clone(),
                master_key: pending.master_key,
            },
        );
        Ok(info)
    }

    /// Get a session's metadata, refusing expired sessions
    ///
    /// An expired session is torn down on the spot and reported as
    /// `SessionExpired`; once wiped, lookups yield `SessionNotFound`.
    pub fn get_session(&self, session_id: &str) -> Result<SessionInfo> {
        let expired = {
            let mut table = self.table.lock();
            let record = table
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| Error::SessionNotFound(redact(session_id)))?;
            if record.info.is_expired() {
                true
            } else {
                record.info.last_activity = now_ts();
                return Ok(record.info.clone());
            }
        };

        debug_assert!(expired);
        self.end_session(session_id)?;
        Err(Error::SessionExpired(redact(session_id)))
    }

    /// Find the active session for a vault, if any
    pub fn get_session_by_vault(&self, vault_id: &str) -> Option<SessionInfo> {
        let table = self.table.lock();
        table
            .sessions
            .values()
            .find(|r| r.info.vault_id == vault_id && !r.info.is_expired())
            .map(|r| r.info.clone())
    }

    /// Reset the inactivity clock; does not move the expiry
    pub fn touch(&self, session_id: &str) -> Result<()> {
        self.get_session(session_id).map(|_| ())
    }

    /// Extend the session so it expires `additional` from now
    ///
    /// Succeeds only while `now + additional <= created_at + max_ttl`.
    pub fn extend(&self, session_id: &str, additional: Duration) -> Result<i64> {
        let mut table = self.table.lock();
        let record = table
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(redact(session_id)))?;
        if record.info.is_expired() {
            return Err(Error::SessionExpired(redact(session_id)));
        }

        let now = now_ts();
        let max_ttl = record.info.profile.params().session.max_ttl_secs as i64;
        let requested = now + additional.as_secs() as i64;
        if requested > record.info.created_at + max_ttl {
            return Err(Error::Validation(
                "Extension would exceed the profile's maximum TTL".into(),
            ));
        }

        record.info.expires_at = requested;
        record.info.last_activity = now;
        Ok(requested)
    }

    /// Run a closure against the session's master key
    ///
    /// The key is copied into a zero-on-drop container for the duration of
    /// the call; callers never receive key material that outlives it.
    pub fn with_key<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&MasterKey) -> R,
    ) -> Result<R> {
        let key = {
            let mut table = self.table.lock();
            let record = table
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| Error::SessionNotFound(redact(session_id)))?;
            if record.info.is_expired() {
                drop(table);
                self.end_session(session_id)?;
                return Err(Error::SessionExpired(redact(session_id)));
            }
            record.info.last_activity = now_ts();
            record.master_key.clone()
        };
        Ok(f(&key))
    }

    /// Record a plaintext file decrypted into the session directory
    pub fn record_decrypted_file(&self, session_id: &str, name: &str) -> Result<()> {
        let mut table = self.table.lock();
        let record = table
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(redact(session_id)))?;
        if !record.info.decrypted_files.iter().any(|f| f == name) {
            record.info.decrypted_files.push(name.to_string());
        }
        Ok(())
    }

    /// End a session: zeroize the key, wipe the directory, drop the record
    pub fn end_session(&self, session_id: &str) -> Result<()> {
        let (dir, secure) = {
            let mut table = self.table.lock();
            let record = table
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| Error::SessionNotFound(redact(session_id)))?;
            if record.info.state == SessionState::Expiring {
                // Another caller is already wiping it
                return Ok(());
            }
            record.info.state = SessionState::Expiring;
            // Zeroize the real key now; the placeholder is never handed out
            // because `with_key` refuses non-Active states via expiry checks
            let key = std::mem::replace(&mut record.master_key, MasterKey::from_bytes([0u8; 32]));
            drop(key);
            (
                record.info.dir.clone(),
                record.info.profile.params().session.secure_delete,
            )
        };

        let wipe_result = wipe_directory(&dir, secure);

        let mut table = self.table.lock();
        table.sessions.remove(session_id);
        drop(table);

        tracing::info!(session_id = %redact(session_id), "Session wiped");
        wipe_result
    }

    /// End every session (shutdown path)
    pub fn end_all(&self) {
        let ids: Vec<String> = self.table.lock().sessions.keys().cloned().collect();
        for id in &ids {
            if let Err(e) = self.end_session(id) {
                tracing::warn!(session_id = %redact(id), error = %e, "Failed to end session");
            }
        }
        self.table.lock().pending.clear();
        tracing::info!(count = ids.len(), "Ended all sessions");
    }

    /// Host went to background: lock every profile that demands it
    pub fn on_host_background(&self) {
        let ids: Vec<String> = {
            let table = self.table.lock();
            table
                .sessions
                .values()
                .filter(|r| r.info.profile.params().session.background_autolock)
                .map(|r| r.info.session_id.clone())
                .collect()
        };
        for id in &ids {
            tracing::info!(session_id = %redact(id), "Background auto-lock");
            let _ = self.end_session(id);
        }
    }

    /// Sweep expired sessions and timed-out pending unlocks
    ///
    /// Returns the number of sessions wiped. Driven by the background task
    /// but safe to call from anywhere.
    pub fn cleanup(&self) -> usize {
        let expired: Vec<String> = {
            let mut table = self.table.lock();
            table
                .pending
                .retain(|_, p| p.started.elapsed() <= PENDING_UNLOCK_TIMEOUT);
            table
                .sessions
                .values()
                .filter(|r| r.info.is_expired())
                .map(|r| r.info.session_id.clone())
                .collect()
        };

        let mut wiped = 0;
        for id in &expired {
            match self.end_session(id) {
                Ok(()) => wiped += 1,
                Err(Error::SessionNotFound(_)) => {}
                Err(e) => {
                    tracing::warn!(session_id = %redact(id), error = %e, "Cleanup failed")
                }
            }
        }
        wiped
    }

    /// Metadata for every live session
    pub fn list_active(&self) -> Vec<SessionInfo> {
        self.table
            .lock()
            .sessions
            .values()
            .filter(|r| !r.info.is_expired())
            .map(|r| r.info.clone())
            .collect()
    }

    /// Spawn the background cleanup task
    ///
    /// The task holds only a weak reference; it exits when the manager is
    /// dropped or the handle is.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration) -> CleanupHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let weak: Weak<SessionManager> = Arc::downgrade(self);
        let stop_flag = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("echotome-session-cleanup".into())
            .spawn(move || loop {
                let mut slept = Duration::ZERO;
                while slept < interval {
                    if stop_flag.load(Ordering::SeqCst) {
                        return;
                    }
                    let slice = Duration::from_millis(50).min(interval - slept);
                    std::thread::sleep(slice);
                    slept += slice;
                }
                match weak.upgrade() {
                    Some(manager) => {
                        manager.cleanup();
                    }
                    None => return,
                }
            })
            .expect("Failed to spawn cleanup thread");

        CleanupHandle {
            stop,
            handle: Some(handle),
        }
    }
}

/// Stops the background cleanup task when dropped
pub struct CleanupHandle {
    stop: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

fn random_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn redact(session_id: &str) -> String {
    format!("{}...", &session_id[..session_id.len().min(8)])
}
