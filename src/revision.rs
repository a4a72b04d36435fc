//! Revision counting, drift detection and the version-triggered write gate.
//!
//! The revision count of a secret is the number of history entries the store
//! reports for it:
//!
//! - `0` when the secret does not exist,
//! - `1` when it exists but history is unavailable or empty,
//! - `N` for `N` history entries otherwise.
//!
//! A caller keeps the count from its last write. When the store later
//! reports more revisions than that, someone changed the secret out of band.

use crate::store::{Revision, SecretStore, StoreError, StoreResult};

/// Revision count from an existence flag and a history lookup.
///
/// Never fails: a failed lookup is logged and treated like a store without
/// versioning.
pub fn compute_revision_count(exists: bool, history: Result<Vec<Revision>, StoreError>) -> i64 {
    if !exists {
        return 0;
    }

    match history {
        Ok(revisions) if revisions.is_empty() => 1,
        Ok(revisions) => revisions.len() as i64,
        Err(err) => {
            tracing::debug!(
                error = %err,
                "Revision history not available, falling back to existence check"
            );
            1
        }
    }
}

/// Query the store for the revision count of `path`.
///
/// A missing secret yields `0`. Errors from the existence check are
/// returned; errors from the history lookup are absorbed.
pub async fn revision_count(store: &dyn SecretStore, path: &str) -> StoreResult<i64> {
    let exists = match store.exists(path).await {
        Ok(exists) => exists,
        Err(err) if err.is_not_found() => false,
        Err(err) => return Err(err),
    };
    if !exists {
        return Ok(0);
    }

    let history = store.history(path).await;
    Ok(compute_revision_count(true, history))
}

/// Outcome of comparing a stored revision count with the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriftCheck {
    pub stored: i64,
    /// Count to persist from now on.
    pub current: i64,
    pub drifted: bool,
}

impl DriftCheck {
    /// Warning text for a drifted secret.
    pub fn warning(&self, path: &str) -> Option<String> {
        if !self.drifted {
            return None;
        }
        Some(format!(
            "The secret at {path:?} has {} revisions, but {} were expected. \
             This indicates the secret was modified outside of gopass-bridge. \
             The actual value may differ from what was last written. \
             Consider incrementing value_wo_version to overwrite with the intended value.",
            self.current, self.stored
        ))
    }
}

/// Compare a stored revision count against the current one.
///
/// A stored count of `0` means there is no baseline yet and never drifts.
/// Equal or decreasing counts are not drift.
pub fn detect_drift(stored: i64, current: i64) -> DriftCheck {
    DriftCheck {
        stored,
        current,
        drifted: stored > 0 && current > stored,
    }
}

/// What the write gate decided for a write-only value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDecision {
    /// Version changed and a value is present.
    Write,
    /// Version unchanged, nothing to do.
    Unchanged,
    /// Version changed but no value was supplied. Skip and warn.
    MissingValue,
}

impl WriteDecision {
    pub fn should_write(self) -> bool {
        self == WriteDecision::Write
    }
}

/// Whether the version marker moved from `previous` to `next`.
///
/// No previous marker counts as a change; no new marker never does.
pub fn version_changed(previous: Option<i64>, next: Option<i64>) -> bool {
    match (previous, next) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(prev), Some(next)) => prev != next,
    }
}

/// Gate a write on the version marker.
pub fn plan_write(previous: Option<i64>, next: Option<i64>, has_value: bool) -> WriteDecision {
    if !version_changed(previous, next) {
        WriteDecision::Unchanged
    } else if has_value {
        WriteDecision::Write
    } else {
        WriteDecision::MissingValue
    }
}
