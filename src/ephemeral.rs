//! Ephemeral reads: values handed to the caller and never persisted.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Serialize;

use crate::diagnostics::Diagnostic;
use crate::store::{normalize_prefix, read_flat, SecretStore};
use crate::tree::{build_tree, FlatSecretMap, TreeNode};

/// Read a single secret (first line of the entry).
pub async fn read_secret(store: &dyn SecretStore, path: &str) -> Result<SecretString> {
    tracing::debug!(path = %path, "Reading secret");
    let value = store
        .get(path)
        .await
        .with_context(|| format!("Failed to read secret {path:?}"))?;
    tracing::debug!(path = %path, "Successfully read secret");
    Ok(value)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnvOptions {
    /// Include nested entries, not only immediate children of the prefix.
    pub recursive: bool,
}

/// Secrets below a prefix, keyed by their path relative to it.
#[derive(Debug, Clone, Serialize)]
pub struct EnvSecrets {
    pub path: String,
    /// Flat map of relative path to value.
    pub values: FlatSecretMap,
    /// The same values as a nested tree.
    pub credentials: TreeNode,
    #[serde(skip)]
    pub diagnostics: Vec<Diagnostic>,
}

/// Read every secret below `prefix`, environment-variable style.
///
/// Secrets that fail to read are skipped. An empty result is not an error
/// but carries a "No secrets found" warning.
pub async fn read_env(
    store: &dyn SecretStore,
    prefix: &str,
    options: EnvOptions,
) -> Result<EnvSecrets> {
    let path = normalize_prefix(prefix).to_string();
    tracing::debug!(path = %path, recursive = options.recursive, "Reading env secrets");

    let values = read_flat(store, &path, options.recursive)
        .await
        .with_context(|| format!("Failed to list secrets under {path:?}"))?;

    let mut diagnostics = Vec::new();
    if values.is_empty() {
        let scope = if options.recursive {
            "secrets"
        } else {
            "immediate child secrets"
        };
        diagnostics.push(Diagnostic::warning(
            "No secrets found",
            format!("No {scope} found under path {path:?}"),
        ));
    }

    let credentials = build_tree(&values);
    tracing::debug!(path = %path, count = values.len(), "Successfully read env secrets");

    Ok(EnvSecrets {
        path,
        values,
        credentials,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use secrecy::ExposeSecret;

    fn scaleway_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert("env/terraform/scaleway/istr/SCW_ACCESS_KEY", "access");
        store.insert("env/terraform/scaleway/istr/SCW_SECRET_KEY", "secret");
        store.insert("env/terraform/scaleway/istr/nested/DEEP", "deep");
        store.insert("env/terraform/other/KEY", "other");
        store
    }

    #[tokio::test]
    async fn test_read_secret() -> Result<()> {
        let store = scaleway_store();
        let value = read_secret(&store, "env/terraform/other/KEY").await?;
        assert_eq!(value.expose_secret(), "other");
        Ok(())
    }

    #[tokio::test]
    async fn test_read_secret_missing_is_error() {
        let store = scaleway_store();
        let err = read_secret(&store, "nope").await.unwrap_err();
        assert!(err.to_string().contains("Failed to read secret"));
    }

    #[tokio::test]
    async fn test_read_env_immediate_children() -> Result<()> {
        let store = scaleway_store();
        let env = read_env(&store, "env/terraform/scaleway/istr/", EnvOptions::default()).await?;

        assert_eq!(env.path, "env/terraform/scaleway/istr");
        assert_eq!(env.values.len(), 2);
        assert_eq!(env.values.get("SCW_ACCESS_KEY").map(String::as_str), Some("access"));
        assert!(env.diagnostics.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_read_env_recursive_builds_tree() -> Result<()> {
        let store = scaleway_store();
        let env = read_env(
            &store,
            "env/terraform/scaleway/istr",
            EnvOptions { recursive: true },
        )
        .await?;

        assert_eq!(env.values.len(), 3);
        assert_eq!(
            env.credentials.get("nested/DEEP").and_then(TreeNode::value),
            Some("deep")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_read_env_skips_unreadable() -> Result<()> {
        let store = scaleway_store();
        store.make_unreadable("env/terraform/scaleway/istr/SCW_SECRET_KEY");

        let env = read_env(&store, "env/terraform/scaleway/istr", EnvOptions::default()).await?;
        assert_eq!(env.values.len(), 1);
        assert!(env.values.contains_key("SCW_ACCESS_KEY"));
        Ok(())
    }

    #[tokio::test]
    async fn test_read_env_list_failure_is_error() {
        let store = scaleway_store();
        store.fail_with("store offline");

        let err = read_env(&store, "env/terraform", EnvOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to list secrets"));
    }

    #[tokio::test]
    async fn test_read_env_empty_warns() -> Result<()> {
        let store = scaleway_store();
        let env = read_env(&store, "env/missing", EnvOptions::default()).await?;

        assert!(env.values.is_empty());
        assert_eq!(env.credentials, TreeNode::default());
        assert_eq!(env.diagnostics.len(), 1);
        assert_eq!(env.diagnostics[0].summary, "No secrets found");
        Ok(())
    }
}
