// ABOUTME: Local run lock preventing two concurrent swaps of the same group pair.
// ABOUTME: Uses atomic file creation with lock info stored in ~/.local/state/rolling-replacer/.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::pipeline::DeploymentContext;

/// State directory relative to `$HOME` (XDG Base Directory layout).
const STATE_DIR: &str = ".local/state/rolling-replacer";

/// Slack added to a run's own limit before its lock counts as stale.
const STALE_GRACE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("run lock held by {holder} (pid {pid}) since {started_at}; pass --force to break it")]
    Held {
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    #[error("run lock error: {0}")]
    Failed(String),
}

impl LockError {
    fn failed(what: &str, path: &Path, e: impl std::fmt::Display) -> Self {
        LockError::Failed(format!("{what} {}: {e}", path.display()))
    }
}

/// Who holds a run lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    /// When the holder can no longer be running. `None` for runs without a wait limit.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub inactive_group: String,
    pub new_group: String,
}

impl LockInfo {
    /// Lock info for a run expected to finish within `run_limit`, or never
    /// to be considered abandoned when `run_limit` is `None`.
    pub fn new(context: &DeploymentContext, run_limit: Option<Duration>) -> Self {
        let started_at = Utc::now();
        let expires_at = run_limit.and_then(|limit| {
            let ttl = chrono::Duration::from_std(limit.saturating_add(STALE_GRACE)).ok()?;
            started_at.checked_add_signed(ttl)
        });
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at,
            expires_at,
            inactive_group: context.inactive_group().to_string(),
            new_group: context.new_group().to_string(),
        }
    }

    /// Past its expiry. Locks without one never go stale.
    pub fn is_stale(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    /// Written by the same run as `other`.
    fn same_run(&self, other: &LockInfo) -> bool {
        self.holder == other.holder && self.pid == other.pid && self.started_at == other.started_at
    }

    /// `<inactive>--<new>.lock`, with anything unusual in the names replaced.
    pub fn file_name(context: &DeploymentContext) -> String {
        format!(
            "{}--{}.lock",
            sanitize(context.inactive_group().as_str()),
            sanitize(context.new_group().as_str())
        )
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `$HOME/.local/state/rolling-replacer`, if `HOME` is set.
pub fn default_state_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(STATE_DIR))
}

/// A held run lock. Call [`RunLock::release`] when the run ends.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    info: LockInfo,
}

impl RunLock {
    /// Acquire the lock for the context's group pair inside `state_dir`.
    ///
    /// `run_limit` bounds how long this run may hold the lock; `None` means
    /// it waits without limit. Stale locks are broken with a warning; `force`
    /// breaks any lock.
    pub async fn acquire(
        state_dir: &Path,
        context: &DeploymentContext,
        run_limit: Option<Duration>,
        force: bool,
    ) -> Result<Self, LockError> {
        tokio::fs::create_dir_all(state_dir)
            .await
            .map_err(|e| LockError::failed("failed to create", state_dir, e))?;

        let path = state_dir.join(LockInfo::file_name(context));
        let info = LockInfo::new(context, run_limit);
        let json = serde_json::to_vec(&info)
            .map_err(|e| LockError::Failed(format!("failed to serialize lock: {e}")))?;

        if Self::try_create(&path, &json).await? {
            return Ok(Self { path, info });
        }

        if !Self::should_break(&path, force).await? {
            return Err(match Self::read(&path).await {
                Some(existing) => LockError::Held {
                    holder: existing.holder,
                    pid: existing.pid,
                    started_at: existing.started_at,
                },
                None => LockError::Failed("lock held by another process".to_string()),
            });
        }

        tracing::debug!("removing stale or forced lock at {}", path.display());
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(LockError::failed("failed to remove", &path, e)),
        }

        if Self::try_create(&path, &json).await? {
            Ok(Self { path, info })
        } else {
            Err(LockError::Failed(
                "lock acquired by another process during break".to_string(),
            ))
        }
    }

    /// Create the lock file only if it does not exist yet.
    async fn try_create(path: &Path, contents: &[u8]) -> Result<bool, LockError> {
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await;

        let mut file = match file {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(LockError::failed("failed to create", path, e)),
        };

        file.write_all(contents)
            .await
            .map_err(|e| LockError::failed("failed to write", path, e))?;
        file.flush()
            .await
            .map_err(|e| LockError::failed("failed to write", path, e))?;
        Ok(true)
    }

    async fn read(path: &Path) -> Option<LockInfo> {
        let content = tokio::fs::read(path).await.ok()?;
        serde_json::from_slice(&content).ok()
    }

    /// Whether an existing lock should be broken (stale, forced, or corrupted).
    async fn should_break(path: &Path, force: bool) -> Result<bool, LockError> {
        let Some(existing) = Self::read(path).await else {
            tracing::warn!("lock info at {} unreadable, breaking lock", path.display());
            return Ok(true);
        };

        if force {
            tracing::warn!(
                "breaking lock held by {} (pid {}) since {}",
                existing.holder,
                existing.pid,
                existing.started_at
            );
            Ok(true)
        } else if existing.is_stale() {
            tracing::warn!(
                "auto-breaking stale lock held by {} (pid {}) since {}",
                existing.holder,
                existing.pid,
                existing.started_at
            );
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lock file if it still belongs to this run.
    ///
    /// A lock another run took over (with `--force` or after expiry) is left
    /// in place and reported as an error.
    pub async fn release(self) -> Result<(), LockError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!("run lock {} already removed", self.path.display());
                return Ok(());
            }
            Err(e) => return Err(LockError::failed("failed to read", &self.path, e)),
        }

        match Self::read(&self.path).await {
            Some(current) if current.same_run(&self.info) => {}
            Some(current) => {
                return Err(LockError::Failed(format!(
                    "{} now held by {} (pid {}) since {}; leaving it in place",
                    self.path.display(),
                    current.holder,
                    current.pid,
                    current.started_at
                )));
            }
            None => {
                return Err(LockError::Failed(format!(
                    "{} is unreadable; leaving it in place",
                    self.path.display()
                )));
            }
        }

        tokio::fs::remove_file(&self.path)
            .await
            .map_err(|e| LockError::failed("failed to remove", &self.path, e))
    }
}
