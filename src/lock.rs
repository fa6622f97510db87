// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Advisory run lock.
//!
//! Independent runs are serialized through a lock keyed by the operation. Each holder
//! owns a slot file in `<lock_dir>/<key>/`; a lock admits at most `concurrency` live
//! slots, and a slot stops counting once its TTL is past so a crashed run can't block
//! everyone else forever.
//!
//! Slots are counted and written while holding an exclusive OS lock on
//! `<lock_dir>/<key>/.mutex`, so two processes can never both see room for one more
//! holder. Releasing a slot only removes its file and needs no mutex.
//!
//! Read-only runs (status, check) use the `ro` suffix with a high concurrency and a
//! short TTL. Mutating runs use the `rw` suffix with a concurrency of one.
//!
//! # Example
//!
//! ```rust,no_run
//! use dnsdisc::lock::{FileLockManager, LockArgs};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let locks = FileLockManager::new("/var/lock/dnsdisc");
//! let guard = locks.acquire(&LockArgs::for_action("dnsdisc-depool-codfw", false)).await?;
//! // ... pool/depool ...
//! guard.release().await?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::constants::{
    LOCK_RO_CONCURRENCY, LOCK_RO_TTL_SECS, LOCK_RW_CONCURRENCY, LOCK_RW_TTL_SECS,
};
use crate::dns_errors::LockError;

/// Parameters of one lock acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockArgs {
    /// Lock key, also the directory name of its slots
    pub key: String,
    /// Maximum number of concurrent holders
    pub concurrency: usize,
    /// How long a slot stays valid
    pub ttl: Duration,
}

impl LockArgs {
    /// Lock parameters for an operation.
    ///
    /// Read-only operations share the lock widely, mutating ones hold it alone.
    #[must_use]
    pub fn for_action(operation: &str, read_only: bool) -> Self {
        if read_only {
            Self {
                key: format!("{operation}-ro"),
                concurrency: LOCK_RO_CONCURRENCY,
                ttl: Duration::from_secs(LOCK_RO_TTL_SECS),
            }
        } else {
            Self {
                key: format!("{operation}-rw"),
                concurrency: LOCK_RW_CONCURRENCY,
                ttl: Duration::from_secs(LOCK_RW_TTL_SECS),
            }
        }
    }
}

/// Contents of a slot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSlot {
    /// Identifier of the holder
    pub owner: String,
    /// When the slot was taken
    pub acquired_at: DateTime<Utc>,
    /// When the slot stops counting
    pub expires_at: DateTime<Utc>,
}

impl LockSlot {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// File-based lock manager.
#[derive(Debug, Clone)]
pub struct FileLockManager {
    dir: PathBuf,
}

impl FileLockManager {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Take a slot of the lock.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Contended`] if the lock already has `concurrency` live
    /// holders, [`LockError::Storage`] if the lock directory can't be used.
    pub async fn acquire(&self, args: &LockArgs) -> Result<LockGuard, LockError> {
        let key_dir = self.dir.join(&args.key);
        tokio::fs::create_dir_all(&key_dir)
            .await
            .map_err(|e| storage_error(&key_dir, &e))?;

        let mutex = lock_key_dir(&key_dir).await?;

        let now = Utc::now();
        let live = live_slots(&key_dir, now).await?;
        if live.len() >= args.concurrency {
            drop(mutex);
            warn!(key = %args.key, holders = live.len(), "Lock is contended");
            return Err(LockError::Contended {
                key: args.key.clone(),
                holders: live.len(),
                concurrency: args.concurrency,
            });
        }

        let ttl =
            chrono::Duration::from_std(args.ttl).unwrap_or_else(|_| chrono::Duration::days(3650));
        let slot = LockSlot {
            owner: owner_id(),
            acquired_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        let path = key_dir.join(format!("{}.json", slot.owner));
        write_slot(&path, &slot).await?;
        drop(mutex);

        info!(
            key = %args.key,
            owner = %slot.owner,
            expires_at = %slot.expires_at,
            "Lock acquired"
        );
        Ok(LockGuard {
            path: Some(path),
            key: args.key.clone(),
        })
    }
}

/// A held lock slot. Released on [`LockGuard::release`], or on drop as a fallback.
#[derive(Debug)]
pub struct LockGuard {
    path: Option<PathBuf>,
    key: String,
}

impl LockGuard {
    /// Lock key held by this guard.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot file can't be removed.
    pub async fn release(mut self) -> Result<(), LockError> {
        if let Some(path) = self.path.take() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(storage_error(&path, &e)),
            }
            info!(key = %self.key, "Lock released");
        }
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Failed to remove lock slot");
            }
        }
    }
}

fn storage_error(path: &Path, err: &std::io::Error) -> LockError {
    LockError::Storage {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

fn owner_id() -> String {
    format!(
        "{}-{}-{:08x}",
        Utc::now().format("%Y%m%dT%H%M%S%.6f"),
        std::process::id(),
        rand::random::<u32>()
    )
}

/// Take the exclusive OS lock guarding the slots of a key.
///
/// The lock is held until the returned file is dropped.
async fn lock_key_dir(key_dir: &Path) -> Result<std::fs::File, LockError> {
    let path = key_dir.join(".mutex");
    tokio::task::spawn_blocking(move || {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| storage_error(&path, &e))?;
        file.lock().map_err(|e| storage_error(&path, &e))?;
        Ok(file)
    })
    .await
    .map_err(|e| LockError::Storage {
        path: key_dir.display().to_string(),
        reason: e.to_string(),
    })?
}

/// Write a slot file atomically, so readers never see a partial slot.
async fn write_slot(path: &Path, slot: &LockSlot) -> Result<(), LockError> {
    let body = serde_json::to_vec(slot).map_err(|e| LockError::Storage {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp)
        .await
        .map_err(|e| storage_error(&tmp, &e))?;
    file.write_all(&body)
        .await
        .map_err(|e| storage_error(&tmp, &e))?;
    file.flush().await.map_err(|e| storage_error(&tmp, &e))?;
    drop(file);
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| storage_error(path, &e))
}

/// Read the live slots of a lock, removing expired or unreadable ones.
async fn live_slots(key_dir: &Path, now: DateTime<Utc>) -> Result<Vec<LockSlot>, LockError> {
    let mut entries = tokio::fs::read_dir(key_dir)
        .await
        .map_err(|e| storage_error(key_dir, &e))?;
    let mut live = Vec::new();

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| storage_error(key_dir, &e))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let slot = tokio::fs::read(&path)
            .await
            .ok()
            .and_then(|body| serde_json::from_slice::<LockSlot>(&body).ok());
        match slot {
            Some(slot) if slot.is_live(now) => live.push(slot),
            Some(slot) => {
                debug!(owner = %slot.owner, "Reclaiming expired lock slot");
                let _ = tokio::fs::remove_file(&path).await;
            }
            None => {
                debug!(path = %path.display(), "Removing unreadable lock slot");
                let _ = tokio::fs::remove_file(&path).await;
            }
        }
    }
    Ok(live)
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod lock_tests;
