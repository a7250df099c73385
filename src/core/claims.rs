//! Exclusive claims on destination paths
//!
//! A path being written is claimed first, so two operations (or two
//! workers of one tree copy) never write the same destination at once.

use crate::error::{FilekitError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

/// Shared registry of claimed destinations
#[derive(Debug, Clone, Default)]
pub struct DestinationClaims {
    claimed: Arc<Mutex<HashSet<PathBuf>>>,
}

impl DestinationClaims {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        // A panicking holder cannot leave the set half-updated
        self.claimed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn key(path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    }

    /// Claim `path`, failing with [`FilekitError::DestinationBusy`] when
    /// it is already held
    pub fn claim(&self, path: &Path) -> Result<ClaimGuard> {
        let key = Self::key(path);
        if !self.lock().insert(key.clone()) {
            return Err(FilekitError::DestinationBusy(path.to_path_buf()));
        }
        trace!("Claimed {}", key.display());
        Ok(ClaimGuard {
            claims: self.clone(),
            key,
        })
    }

    /// Whether `path` is currently claimed
    pub fn is_claimed(&self, path: &Path) -> bool {
        self.lock().contains(&Self::key(path))
    }

    /// Number of live claims
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// No live claims
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Held claim; released on drop
#[derive(Debug)]
pub struct ClaimGuard {
    claims: DestinationClaims,
    key: PathBuf,
}

impl ClaimGuard {
    /// Claimed path
    pub fn path(&self) -> &Path {
        &self.key
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.claims.lock().remove(&self.key);
        trace!("Released {}", self.key.display());
    }
}
