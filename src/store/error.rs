//! Errors reported by secret store backends.

use std::path::PathBuf;

/// Failure of a single store operation.
///
/// `NotFound` is a normal outcome for existence checks and revision counting;
/// `HistoryUnsupported` is absorbed by revision counting. Everything else is a
/// hard failure that callers surface.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("secret {path:?} not found")]
    NotFound { path: String },

    #[error(
        "gopass store access denied: {message}\n\n\
         Unable to access the gopass store due to permission issues.\n\
         Please check file permissions on your password store directory."
    )]
    PermissionDenied { message: String },

    #[error(
        "GPG error while accessing the gopass store: {message}\n\n\
         There was a problem with GPG. Please ensure:\n\
         - gpg-agent is running\n\
         - Your GPG key is available\n\
         - If using a hardware token, it is connected"
    )]
    Gpg { message: String },

    #[error("gopass binary {binary:?} not found; install gopass or set gopass_binary in the configuration")]
    BinaryNotFound { binary: String },

    #[error(
        "gopass store not found at configured path: {}\n\n\
         Please verify the path exists and contains a valid gopass/pass store, \
         or remove the store_path configuration to use gopass defaults",
        .path.display()
    )]
    StoreDirMissing { path: PathBuf },

    #[error(
        "gopass store not found: {message}\n\n\
         No gopass password store was found. Possible solutions:\n\
         - initialize a new store with `gopass init`\n\
         - set store_path in the configuration to your password store directory\n\
         - check the mount name passed as --store / store"
    )]
    StoreUnavailable { message: String },

    #[error("could not expand home directory in store path {path:?}")]
    HomeDirUnavailable { path: String },

    #[error("revision history not available for {path:?}: {message}")]
    HistoryUnsupported { path: String, message: String },

    #[error("gopass {command} failed for {path:?}: {message}")]
    CommandFailed {
        command: &'static str,
        path: String,
        message: String,
    },

    #[error("I/O error talking to gopass: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Classify a failed gopass invocation by its stderr output.
    pub(crate) fn from_stderr(command: &'static str, path: &str, stderr: &str) -> Self {
        let message = stderr.trim().to_string();
        let lower = message.to_lowercase();

        // Store-level patterns win over "not found": a missing mount or a gpg
        // "key not found" is not an absent entry.
        if lower.contains("permission denied") {
            StoreError::PermissionDenied { message }
        } else if message.contains("gpg") || message.contains("GPG") {
            StoreError::Gpg { message }
        } else if lower.contains("does not exist") || lower.contains("no such file or directory") {
            StoreError::StoreUnavailable { message }
        } else if lower.contains("not found") {
            StoreError::NotFound {
                path: path.to_string(),
            }
        } else {
            StoreError::CommandFailed {
                command,
                path: path.to_string(),
                message,
            }
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
