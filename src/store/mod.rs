//! Secret store abstraction.
//!
//! The store is the only component that touches the password store. It is
//! built once from [`crate::config::Config`] and passed explicitly to every
//! operation that needs it.
//!
//! Two backends exist:
//!
//! - [`GopassStore`] shells out to the `gopass` binary,
//! - [`MemoryStore`] keeps everything in memory for tests.

mod error;
mod gopass;
mod memory;

pub use error::{StoreError, StoreResult};
pub use gopass::{GopassConfig, GopassStore};
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::tree::FlatSecretMap;

/// One entry of a secret's revision history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub hash: String,
    pub author: String,
    pub date: Option<DateTime<Utc>>,
    pub message: String,
}

impl Revision {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            author: String::new(),
            date: None,
            message: String::new(),
        }
    }
}

/// Access to a password store.
///
/// Paths are slash-delimited entry names (e.g. `infrastructure/db/password`).
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Check whether an entry exists.
    ///
    /// Returns `Ok(false)` for a missing entry; `Err` only when the store
    /// itself could not answer.
    async fn exists(&self, path: &str) -> StoreResult<bool>;

    /// List the immediate children of `prefix` (full paths).
    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// List every entry below `prefix` (full paths).
    async fn list_recursive(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Read the first line (the password) of an entry.
    async fn get(&self, path: &str) -> StoreResult<SecretString>;

    /// Write `value` as the password of an entry, creating it if needed.
    async fn set(&self, path: &str, value: &SecretString) -> StoreResult<()>;

    /// Remove an entry.
    async fn remove(&self, path: &str) -> StoreResult<()>;

    /// Revision history of an entry.
    ///
    /// Backends without versioning return [`StoreError::HistoryUnsupported`].
    async fn history(&self, path: &str) -> StoreResult<Vec<Revision>>;
}

/// Strip a trailing `/` from a listing prefix.
pub fn normalize_prefix(prefix: &str) -> &str {
    prefix.strip_suffix('/').unwrap_or(prefix)
}

/// Path of `full` relative to `prefix`, if `full` lies below it.
pub fn relative_path<'a>(prefix: &str, full: &'a str) -> Option<&'a str> {
    let prefix = normalize_prefix(prefix);
    if prefix.is_empty() {
        return Some(full);
    }
    full.strip_prefix(prefix)?.strip_prefix('/')
}

/// Keep the entries of `all` that lie below `prefix`; with `recursive` unset,
/// only immediate children survive.
pub fn filter_children<I, S>(all: I, prefix: &str, recursive: bool) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    all.into_iter()
        .filter_map(|path| {
            let path = path.as_ref();
            let rel = relative_path(prefix, path)?;
            if rel.is_empty() || (!recursive && rel.contains('/')) {
                return None;
            }
            Some(path.to_string())
        })
        .collect()
}

/// Read every secret below `prefix` into a flat map keyed by relative path.
///
/// A listing failure is returned; a secret that fails to read is skipped
/// with a warning.
pub async fn read_flat(
    store: &dyn SecretStore,
    prefix: &str,
    recursive: bool,
) -> StoreResult<FlatSecretMap> {
    let prefix = normalize_prefix(prefix);
    let paths = if recursive {
        store.list_recursive(prefix).await?
    } else {
        store.list(prefix).await?
    };

    let mut values = FlatSecretMap::new();
    for full_path in paths {
        let Some(key) = relative_path(prefix, &full_path) else {
            continue;
        };
        let key = key.to_string();

        match store.get(&full_path).await {
            Ok(value) => {
                values.insert(key, value.expose_secret().to_string());
            }
            Err(err) => {
                tracing::warn!(path = %full_path, error = %err, "Failed to read secret, skipping");
            }
        }
    }

    tracing::debug!(prefix = %prefix, count = values.len(), recursive, "Read secrets");
    Ok(values)
}
