//! Write-back resource for a single secret.
//!
//! The value is write-only: it goes to the store and nowhere else. What gets
//! persisted between runs is [`SecretResourceState`]: the path, the version
//! marker of the last written value and the revision count used for drift
//! detection.
//!
//! Lifecycle of the version marker:
//!
//! ```text
//! NoVersion        --first apply with value-->    Versioned(v)   write
//! Versioned(v)     --same version-->              Versioned(v)   no write
//! Versioned(v)     --new version, value-->        Versioned(v')  write
//! Versioned(v)     --new version, no value-->     Versioned(v')  warning, no write
//! ```

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostic;
use crate::revision::{detect_drift, plan_write, revision_count, version_changed, WriteDecision};
use crate::store::SecretStore;

fn default_delete_on_remove() -> bool {
    true
}

/// Persisted state of a managed secret. Never contains the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretResourceState {
    /// Same as `path`.
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub value_wo_version: Option<i64>,
    #[serde(default = "default_delete_on_remove")]
    pub delete_on_remove: bool,
    #[serde(default)]
    pub revision_count: i64,
}

/// Desired configuration for a managed secret.
#[derive(Debug)]
pub struct SecretPlan {
    pub path: String,
    pub value_wo: Option<SecretString>,
    pub value_wo_version: Option<i64>,
    pub delete_on_remove: bool,
}

impl SecretPlan {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value_wo: None,
            value_wo_version: None,
            delete_on_remove: true,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value_wo = Some(SecretString::from(value.into()));
        self
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.value_wo_version = Some(version);
        self
    }

    pub fn keep_on_remove(mut self) -> Self {
        self.delete_on_remove = false;
        self
    }
}

/// Whether applying `version` at `path` over `prior` can write a value.
///
/// Lets callers skip producing a value the write gate would discard.
pub fn value_needed(prior: Option<&SecretResourceState>, path: &str, version: Option<i64>) -> bool {
    match prior {
        Some(prior) if prior.path == path => version_changed(prior.value_wo_version, version),
        _ => true,
    }
}

/// Result of create/update: the new state plus any warnings.
#[derive(Debug, Clone)]
pub struct Applied {
    pub state: SecretResourceState,
    /// Whether the store was written to.
    pub written: bool,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone)]
pub enum ReadOutcome {
    /// The secret still exists; state carries the refreshed revision count.
    Present {
        state: SecretResourceState,
        diagnostics: Vec<Diagnostic>,
    },
    /// The secret was deleted outside of gopass-bridge; drop the state.
    Removed,
}

/// Lifecycle operations for write-only secrets.
pub struct SecretResource<'a> {
    store: &'a dyn SecretStore,
}

impl<'a> SecretResource<'a> {
    pub fn new(store: &'a dyn SecretStore) -> Self {
        Self { store }
    }

    /// Create or update depending on whether there is prior state. A changed
    /// path replaces the old secret.
    pub async fn apply(
        &self,
        prior: Option<&SecretResourceState>,
        plan: SecretPlan,
    ) -> Result<Applied> {
        match prior {
            None => self.create(plan).await,
            Some(state) if state.path != plan.path => {
                let mut diagnostics = self.delete(state).await?;
                let mut applied = self.create(plan).await?;
                diagnostics.append(&mut applied.diagnostics);
                applied.diagnostics = diagnostics;
                Ok(applied)
            }
            Some(state) => self.update(state, plan).await,
        }
    }

    pub async fn create(&self, plan: SecretPlan) -> Result<Applied> {
        let path = plan.path;
        tracing::debug!(path = %path, "Creating secret");

        let mut diagnostics = Vec::new();
        let written = match &plan.value_wo {
            Some(value) => {
                self.store
                    .set(&path, value)
                    .await
                    .with_context(|| format!("Could not write secret at {path:?}"))?;
                true
            }
            None => {
                diagnostics.push(Diagnostic::warning(
                    "No value provided",
                    "The secret was created but no value_wo was provided. \
                     The secret in gopass may be empty or unchanged.",
                ));
                false
            }
        };

        let revision_count = match revision_count(self.store, &path).await {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(path = %path, error = %err, "Could not get revision count");
                1
            }
        };

        tracing::debug!(path = %path, revision_count, "Created secret");
        Ok(Applied {
            state: SecretResourceState {
                id: path.clone(),
                path,
                value_wo_version: plan.value_wo_version,
                delete_on_remove: plan.delete_on_remove,
                revision_count,
            },
            written,
            diagnostics,
        })
    }

    /// Refresh state from the store. The value itself is never read back.
    pub async fn read(&self, state: &SecretResourceState) -> Result<ReadOutcome> {
        let path = &state.path;
        tracing::debug!(path = %path, "Reading secret state");

        let exists = self
            .store
            .exists(path)
            .await
            .with_context(|| format!("Could not check if secret exists at {path:?}"))?;
        if !exists {
            tracing::info!(path = %path, "Secret no longer exists, removing from state");
            return Ok(ReadOutcome::Removed);
        }

        let mut state = state.clone();
        let mut diagnostics = Vec::new();
        match revision_count(self.store, path).await {
            Ok(current) => {
                let check = detect_drift(state.revision_count, current);
                if let Some(detail) = check.warning(path) {
                    diagnostics.push(Diagnostic::warning(
                        "Secret modified outside of gopass-bridge",
                        detail,
                    ));
                }
                state.revision_count = check.current;
            }
            Err(err) => {
                tracing::warn!(
                    path = %path,
                    error = %err,
                    "Could not get revision count for drift detection"
                );
            }
        }

        Ok(ReadOutcome::Present { state, diagnostics })
    }

    pub async fn update(&self, state: &SecretResourceState, plan: SecretPlan) -> Result<Applied> {
        let path = plan.path;
        tracing::debug!(path = %path, "Updating secret");

        let decision = plan_write(
            state.value_wo_version,
            plan.value_wo_version,
            plan.value_wo.is_some(),
        );

        let mut diagnostics = Vec::new();
        let written = match &plan.value_wo {
            Some(value) if decision.should_write() => {
                self.store
                    .set(&path, value)
                    .await
                    .with_context(|| format!("Could not write secret at {path:?}"))?;
                tracing::info!(
                    path = %path,
                    old_version = ?state.value_wo_version,
                    new_version = ?plan.value_wo_version,
                    "Updated secret (value_wo_version changed)"
                );
                true
            }
            _ => {
                if decision == WriteDecision::MissingValue {
                    diagnostics.push(Diagnostic::warning(
                        "Version changed but no value provided",
                        "value_wo_version was incremented but no value_wo was provided. \
                         The secret in gopass was not updated.",
                    ));
                }
                false
            }
        };

        let revision_count = match revision_count(self.store, &path).await {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(path = %path, error = %err, "Could not get revision count after update");
                state.revision_count
            }
        };

        Ok(Applied {
            state: SecretResourceState {
                id: path.clone(),
                path,
                value_wo_version: plan.value_wo_version,
                delete_on_remove: plan.delete_on_remove,
                revision_count,
            },
            written,
            diagnostics,
        })
    }

    /// Destroy the resource, removing the secret unless `delete_on_remove`
    /// is unset.
    pub async fn delete(&self, state: &SecretResourceState) -> Result<Vec<Diagnostic>> {
        let path = &state.path;
        tracing::debug!(path = %path, delete_on_remove = state.delete_on_remove, "Deleting secret resource");

        if !state.delete_on_remove {
            tracing::info!(path = %path, "Keeping secret (delete_on_remove=false)");
            return Ok(Vec::new());
        }

        let exists = match self.store.exists(path).await {
            Ok(exists) => exists,
            Err(err) => {
                return Ok(vec![Diagnostic::warning(
                    "Failed to check secret existence",
                    format!("Could not verify if secret exists at {path:?}: {err}"),
                )]);
            }
        };

        if exists {
            self.store
                .remove(path)
                .await
                .with_context(|| format!("Could not remove secret at {path:?}"))?;
            tracing::info!(path = %path, "Removed secret");
        }

        Ok(Vec::new())
    }

    /// Adopt an existing secret. Set a version and value afterwards to manage
    /// its content.
    pub async fn import(&self, path: &str) -> Result<SecretResourceState> {
        tracing::debug!(path = %path, "Importing secret");

        let exists = self
            .store
            .exists(path)
            .await
            .with_context(|| format!("Could not check if secret exists at {path:?}"))?;
        if !exists {
            anyhow::bail!("Secret not found: no secret exists at path {path:?}");
        }

        let revision_count = match revision_count(self.store, path).await {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(path = %path, error = %err, "Could not get revision count during import");
                1
            }
        };

        Ok(SecretResourceState {
            id: path.to_string(),
            path: path.to_string(),
            value_wo_version: None,
            delete_on_remove: true,
            revision_count,
        })
    }
}
