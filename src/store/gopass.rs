//! gopass command-line backend.
//!
//! Every operation spawns the `gopass` binary:
//!
//! | operation        | command                         |
//! |------------------|---------------------------------|
//! | `exists`, `get`  | `gopass show -o <path>`         |
//! | `list*`          | `gopass list --flat <prefix>`   |
//! | `set`            | `gopass insert -f <path>` (stdin) |
//! | `remove`         | `gopass rm -f <path>`           |
//! | `history`        | `gopass history <path>`         |
//!
//! Secret values are only ever passed through stdin/stdout, never as
//! arguments.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{filter_children, normalize_prefix, Revision, SecretStore, StoreError, StoreResult};

fn default_binary() -> String {
    "gopass".to_string()
}

/// Settings for the gopass backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GopassConfig {
    /// Path to the gopass binary. Defaults to `gopass` (found via PATH).
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Name of a non-default gopass mount, passed as `--store`.
    #[serde(default)]
    pub store: Option<String>,

    /// Password store directory, exported as `PASSWORD_STORE_DIR` to gopass.
    /// A leading `~/` is expanded to the home directory.
    #[serde(default)]
    pub store_path: Option<String>,
}

impl Default for GopassConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            store: None,
            store_path: None,
        }
    }
}

/// Secret store backed by the gopass CLI.
#[derive(Debug, Clone)]
pub struct GopassStore {
    binary: String,
    store: Option<String>,
    store_dir: Option<PathBuf>,
}

impl GopassStore {
    /// Create the backend, validating `store_path` if one is configured.
    pub fn new(config: GopassConfig) -> StoreResult<Self> {
        Self::with_home(config, dirs::home_dir())
    }

    /// Like [`GopassStore::new`] with an explicit home directory for `~/`
    /// expansion.
    pub fn with_home(config: GopassConfig, home: Option<PathBuf>) -> StoreResult<Self> {
        let store_dir = match config.store_path.as_deref() {
            Some(raw) if !raw.is_empty() => {
                let dir = expand_home(raw, home.as_deref())?;
                if !dir.exists() {
                    return Err(StoreError::StoreDirMissing { path: dir });
                }
                tracing::debug!(path = %dir.display(), "Using PASSWORD_STORE_DIR");
                Some(dir)
            }
            _ => None,
        };

        let binary = if config.binary.is_empty() {
            default_binary()
        } else {
            config.binary
        };

        Ok(Self {
            binary,
            store: config.store.filter(|s| !s.is_empty()),
            store_dir,
        })
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn store_dir(&self) -> Option<&Path> {
        self.store_dir.as_deref()
    }

    fn command(&self, subcommand: &str, flags: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(subcommand).args(flags);
        if let Some(store) = &self.store {
            cmd.arg("--store").arg(store);
        }
        if let Some(dir) = &self.store_dir {
            cmd.env("PASSWORD_STORE_DIR", dir);
        }
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run a gopass command and return its stdout.
    async fn run(
        &self,
        name: &'static str,
        mut cmd: Command,
        path: &str,
        stdin: Option<&str>,
    ) -> StoreResult<String> {
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;
        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input.as_bytes()).await?;
                pipe.shutdown().await?;
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StoreError::from_stderr(name, path, &stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn spawn_error(&self, err: io::Error) -> StoreError {
        if err.kind() == io::ErrorKind::NotFound {
            StoreError::BinaryNotFound {
                binary: self.binary.clone(),
            }
        } else {
            StoreError::Io(err)
        }
    }

    async fn list_all(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let prefix = normalize_prefix(prefix);
        let mut cmd = self.command("list", &["--flat"]);
        if !prefix.is_empty() {
            cmd.arg(prefix);
        }

        match self.run("list", cmd, prefix, None).await {
            Ok(stdout) => Ok(stdout
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()),
            // gopass reports an unknown prefix as "not found"; that is an empty listing.
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    async fn show(&self, path: &str) -> StoreResult<String> {
        let mut cmd = self.command("show", &["-o"]);
        cmd.arg(path);
        self.run("show", cmd, path, None).await
    }
}

#[async_trait]
impl SecretStore for GopassStore {
    async fn exists(&self, path: &str) -> StoreResult<bool> {
        match self.show(path).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        tracing::debug!(prefix = %prefix, "Listing secrets");
        let all = self.list_all(prefix).await?;
        Ok(filter_children(all, prefix, false))
    }

    async fn list_recursive(&self, prefix: &str) -> StoreResult<Vec<String>> {
        tracing::debug!(prefix = %prefix, "Listing secrets recursively");
        let all = self.list_all(prefix).await?;
        Ok(filter_children(all, prefix, true))
    }

    async fn get(&self, path: &str) -> StoreResult<SecretString> {
        tracing::debug!(path = %path, "Reading secret");
        let output = self.show(path).await?;
        Ok(SecretString::from(first_line(&output).to_string()))
    }

    async fn set(&self, path: &str, value: &SecretString) -> StoreResult<()> {
        tracing::debug!(path = %path, "Writing secret");
        let mut cmd = self.command("insert", &["-f"]);
        cmd.arg(path);
        self.run("insert", cmd, path, Some(value.expose_secret()))
            .await?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> StoreResult<()> {
        tracing::debug!(path = %path, "Removing secret");
        let mut cmd = self.command("rm", &["-f"]);
        cmd.arg(path);
        self.run("rm", cmd, path, None).await?;
        Ok(())
    }

    async fn history(&self, path: &str) -> StoreResult<Vec<Revision>> {
        let mut cmd = self.command("history", &[]);
        cmd.arg(path);
        match self.run("history", cmd, path, None).await {
            Ok(stdout) => Ok(parse_history(&stdout)),
            Err(StoreError::CommandFailed { message, .. }) => Err(StoreError::HistoryUnsupported {
                path: path.to_string(),
                message,
            }),
            Err(err) => Err(err),
        }
    }
}

/// Expand a leading `~/` using `home`.
pub(crate) fn expand_home(raw: &str, home: Option<&Path>) -> StoreResult<PathBuf> {
    match raw.strip_prefix("~/") {
        Some(rest) => {
            let home = home.ok_or_else(|| StoreError::HomeDirUnavailable {
                path: raw.to_string(),
            })?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(raw)),
    }
}

/// The password convention: the first line of the trimmed entry.
fn first_line(output: &str) -> &str {
    output.trim().lines().next().unwrap_or_default()
}

/// Parse `gopass history` output.
///
/// Each line reads `<hash> - <author> <email> - <date> - <message>`; lines
/// that do not follow the format are kept with only the hash filled in, so
/// the revision count stays accurate.
fn parse_history(output: &str) -> Vec<Revision> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let mut parts = line.splitn(4, " - ");
            let hash = parts.next().unwrap_or_default();
            let author = parts.next().unwrap_or_default();
            let date = parts.next().and_then(parse_date);
            let message = parts.next().unwrap_or_default();
            Revision {
                hash: hash.to_string(),
                author: author.to_string(),
                date,
                message: message.to_string(),
            }
        })
        .collect()
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S %z"))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}
