//! JSON state file for managed secrets.
//!
//! ```json
//! {
//!   "resources": {
//!     "infra/db/password": {
//!       "id": "infra/db/password",
//!       "path": "infra/db/password",
//!       "value_wo_version": 2,
//!       "delete_on_remove": true,
//!       "revision_count": 3
//!     }
//!   }
//! }
//! ```
//!
//! Only [`SecretResourceState`] is stored; secret values never are.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::resource::SecretResourceState;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub resources: BTreeMap<String, SecretResourceState>,
}

impl State {
    pub fn get(&self, path: &str) -> Option<&SecretResourceState> {
        self.resources.get(path)
    }

    pub fn put(&mut self, state: SecretResourceState) {
        self.resources.insert(state.path.clone(), state);
    }

    pub fn remove(&mut self, path: &str) -> Option<SecretResourceState> {
        self.resources.remove(path)
    }
}

/// State persisted as pretty-printed JSON.
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load state, returning an empty state if the file doesn't exist.
    pub async fn load(&self) -> Result<State> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse state file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(State::default()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read state file {}", self.path.display())),
        }
    }

    /// Write state via a temporary file and rename.
    pub async fn save(&self, state: &State) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create state directory")?;
            }
        }

        let content = serde_json::to_string_pretty(state).context("Failed to serialize state")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace state file {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(path: &str) -> SecretResourceState {
        SecretResourceState {
            id: path.to_string(),
            path: path.to_string(),
            value_wo_version: Some(2),
            delete_on_remove: true,
            revision_count: 3,
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_state() -> Result<()> {
        let dir = TempDir::new()?;
        let file = StateFile::new(dir.path().join("state.json"));
        assert_eq!(file.load().await?, State::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_save_and_load() -> Result<()> {
        let dir = TempDir::new()?;
        let file = StateFile::new(dir.path().join("nested/state.json"));

        let mut state = State::default();
        state.put(sample("infra/db"));
        file.save(&state).await?;

        let loaded = file.load().await?;
        assert_eq!(loaded.get("infra/db"), Some(&sample("infra/db")));
        assert!(!dir.path().join("nested/state.json.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_defaults_for_missing_fields() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"resources": {"a": {"id": "a", "path": "a"}}}"#,
        )?;

        let state = StateFile::new(&path).load().await?;
        let a = state.get("a").unwrap();
        assert!(a.delete_on_remove);
        assert_eq!(a.value_wo_version, None);
        assert_eq!(a.revision_count, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json")?;

        let err = StateFile::new(&path).load().await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse state file"));
        Ok(())
    }
}
