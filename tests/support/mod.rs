#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Result;
use gopass_bridge::store::{GopassConfig, GopassStore};
use tempfile::TempDir;

/// Shell stand-in for the gopass CLI.
///
/// Entries are plain files below `$PASSWORD_STORE_DIR` (or a `--store`
/// subdirectory). Each write appends a line to `<entry>.history`; entries
/// without a history file report history as unsupported. An entry whose
/// content starts with `!gpg` fails to decrypt. A `--store` mount without a
/// matching subdirectory fails every command.
const FAKE_GOPASS: &str = r#"#!/bin/sh
cmd="$1"
shift
store=""
target=""
while [ $# -gt 0 ]; do
  case "$1" in
    --store) store="$2"; shift 2 ;;
    -o|-f|--flat) shift ;;
    *) target="$1"; shift ;;
  esac
done
root="$PASSWORD_STORE_DIR"
if [ -n "$store" ]; then root="$root/$store"; fi
if [ ! -d "$root" ]; then
  echo "Error: failed to initialize store: mount point '$store' does not exist" >&2
  exit 1
fi

case "$cmd" in
  show)
    if [ ! -f "$root/$target" ]; then
      echo "Entry '$target' not found. Starting search..." >&2
      exit 11
    fi
    if head -n 1 "$root/$target" | grep -q '^!gpg'; then
      echo "gpg: decryption failed: No secret key" >&2
      exit 1
    fi
    cat "$root/$target"
    ;;
  list)
    if [ -n "$target" ] && [ ! -d "$root/$target" ]; then
      echo "Entry '$target' not found" >&2
      exit 1
    fi
    (cd "$root" && find . -type f ! -name '*.history' | sed 's|^\./||' | LC_ALL=C sort) | grep "^$target" || true
    ;;
  insert)
    mkdir -p "$(dirname "$root/$target")"
    cat > "$root/$target"
    echo "Save secret to $target" >> "$root/$target.history"
    ;;
  rm)
    if [ ! -f "$root/$target" ]; then
      echo "Entry '$target' not found" >&2
      exit 1
    fi
    rm -f "$root/$target" "$root/$target.history"
    ;;
  history)
    if [ ! -f "$root/$target.history" ]; then
      echo "history is not supported by this storage backend" >&2
      exit 1
    fi
    n=0
    while read -r line; do
      n=$((n + 1))
      echo "abc000$n - Test User <test@example.com> - 2024-01-01T00:00:00Z - $line"
    done < "$root/$target.history"
    ;;
  *)
    echo "unknown command $cmd" >&2
    exit 2
    ;;
esac
"#;

/// Path of the fake gopass script, written once per test binary so no
/// test forks while another still holds the script open for writing.
pub fn fake_binary() -> PathBuf {
    static BINARY: OnceLock<PathBuf> = OnceLock::new();
    BINARY
        .get_or_init(|| {
            let dir = std::env::temp_dir().join(format!("gopass-bridge-fake-{}", std::process::id()));
            fs::create_dir_all(&dir).expect("create fake gopass dir");
            let binary = dir.join("gopass");
            fs::write(&binary, FAKE_GOPASS).expect("write fake gopass");
            make_executable(&binary).expect("chmod fake gopass");
            binary
        })
        .clone()
}

/// A temporary password store served by the fake gopass binary.
pub struct FakeGopass {
    pub dir: TempDir,
    pub binary: PathBuf,
    pub store_dir: PathBuf,
}

impl FakeGopass {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let binary = fake_binary();

        let store_dir = dir.path().join("store");
        fs::create_dir_all(&store_dir)?;

        Ok(Self {
            dir,
            binary,
            store_dir,
        })
    }

    pub fn config(&self) -> GopassConfig {
        GopassConfig {
            binary: self.binary.display().to_string(),
            store: None,
            store_path: Some(self.store_dir.display().to_string()),
        }
    }

    pub fn store(&self) -> Result<GopassStore> {
        Ok(GopassStore::new(self.config())?)
    }

    /// Seed an entry with `revisions` history lines (0 = no history file).
    /// Store handle pointed at a mount that was never created.
    pub fn missing_mount_store(&self) -> Result<GopassStore> {
        Ok(GopassStore::new(GopassConfig {
            store: Some("work".to_string()),
            ..self.config()
        })?)
    }

    pub fn seed(&self, path: &str, content: &str, revisions: usize) -> Result<()> {
        seed_entry(&self.store_dir, path, content, revisions)
    }

    pub fn read(&self, path: &str) -> Option<String> {
        fs::read_to_string(self.store_dir.join(path)).ok()
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.path().join("state.json")
    }
}

pub fn seed_entry(root: &Path, path: &str, content: &str, revisions: usize) -> Result<()> {
    let file = root.join(path);
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&file, content)?;
    if revisions > 0 {
        let history: String = (1..=revisions).map(|i| format!("revision {i}\n")).collect();
        fs::write(root.join(format!("{path}.history")), history)?;
    }
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
