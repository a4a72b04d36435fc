//! In-memory secret store for testing.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{filter_children, Revision, SecretStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Entry {
    value: String,
    revisions: Vec<Revision>,
}

#[derive(Debug)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    history_supported: bool,
    failure: Option<String>,
    unreadable: HashSet<String>,
}

/// In-memory store with a git-like revision log per entry.
///
/// Every write appends one revision. History support, global failures and
/// per-entry read failures can be toggled to exercise error paths.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: BTreeMap::new(),
                history_supported: true,
                failure: None,
                unreadable: HashSet::new(),
            }),
        }
    }

    /// Store without revision history (like a plain `pass` mount).
    pub fn without_history() -> Self {
        let store = Self::new();
        store.set_history_supported(false);
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }

    /// Write an entry directly, appending a revision. Simulates changes made
    /// outside this process.
    pub fn insert(&self, path: impl Into<String>, value: impl Into<String>) {
        let mut inner = self.lock();
        let entry = inner.entries.entry(path.into()).or_default();
        entry.value = value.into();
        let hash = format!("{:07x}", entry.revisions.len() + 1);
        entry.revisions.push(Revision::new(hash));
    }

    /// Current plaintext value of an entry.
    pub fn value(&self, path: &str) -> Option<String> {
        self.lock().entries.get(path).map(|e| e.value.clone())
    }

    pub fn set_history_supported(&self, supported: bool) {
        self.lock().history_supported = supported;
    }

    /// Make every operation fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        self.lock().failure = Some(message.into());
    }

    pub fn clear_failure(&self) {
        self.lock().failure = None;
    }

    /// Make reads of `path` fail while leaving it listed.
    pub fn make_unreadable(&self, path: impl Into<String>) {
        self.lock().unreadable.insert(path.into());
    }

    fn check_failure(inner: &Inner, command: &'static str, path: &str) -> StoreResult<()> {
        match &inner.failure {
            Some(message) => Err(StoreError::CommandFailed {
                command,
                path: path.to_string(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn exists(&self, path: &str) -> StoreResult<bool> {
        let inner = self.lock();
        Self::check_failure(&inner, "show", path)?;
        Ok(inner.entries.contains_key(path))
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let inner = self.lock();
        Self::check_failure(&inner, "list", prefix)?;
        Ok(filter_children(inner.entries.keys(), prefix, false))
    }

    async fn list_recursive(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let inner = self.lock();
        Self::check_failure(&inner, "list", prefix)?;
        Ok(filter_children(inner.entries.keys(), prefix, true))
    }

    async fn get(&self, path: &str) -> StoreResult<SecretString> {
        let inner = self.lock();
        Self::check_failure(&inner, "show", path)?;
        if inner.unreadable.contains(path) {
            return Err(StoreError::Gpg {
                message: format!("gpg: decryption failed for {path}"),
            });
        }
        inner
            .entries
            .get(path)
            .map(|e| SecretString::from(e.value.clone()))
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_string(),
            })
    }

    async fn set(&self, path: &str, value: &SecretString) -> StoreResult<()> {
        {
            let inner = self.lock();
            Self::check_failure(&inner, "insert", path)?;
        }
        self.insert(path, value.expose_secret());
        Ok(())
    }

    async fn remove(&self, path: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        Self::check_failure(&inner, "rm", path)?;
        inner
            .entries
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_string(),
            })
    }

    async fn history(&self, path: &str) -> StoreResult<Vec<Revision>> {
        let inner = self.lock();
        Self::check_failure(&inner, "history", path)?;
        if !inner.history_supported {
            return Err(StoreError::HistoryUnsupported {
                path: path.to_string(),
                message: "store has no revision history".to_string(),
            });
        }
        inner
            .entries
            .get(path)
            .map(|e| e.revisions.clone())
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_string(),
            })
    }
}
