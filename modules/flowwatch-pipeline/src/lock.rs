use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{info, warn};
use uuid::Uuid;

use flowwatch_common::{FlowwatchError, Result};

/// Locks older than this are assumed to belong to a killed process.
pub const STALE_AFTER: Duration = Duration::from_secs(30 * 60);

/// Exclusive marker file held for the duration of a run.
///
/// The file holds a token unique to this holder. Release and stale reclaim
/// only ever remove a file whose token matches the one they expect, so a run
/// that outlived its lock cannot delete a successor's.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    token: String,
}

impl RunLock {
    /// Try to take the lock. `Ok(None)` means another run holds it.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let token = format!("{} {}", std::process::id(), Uuid::new_v4());

        if let Some(lock) = Self::create(path, &token)? {
            return Ok(Some(lock));
        }

        let held = match std::fs::read_to_string(path) {
            Ok(held) => held,
            // Released between our create and read.
            Err(e) if e.kind() == ErrorKind::NotFound => return Self::create(path, &token),
            Err(e) => return Err(FlowwatchError::io(path, e)),
        };
        if !is_stale(path) {
            return Ok(None);
        }

        warn!(path = %path.display(), holder = held.trim(), "Reclaiming stale run lock");
        if !remove_if_owned(path, &held).map_err(|e| FlowwatchError::io(path, e))? {
            // Someone else reclaimed it first.
            return Ok(None);
        }
        Self::create(path, &token)
    }

    fn create(path: &Path, token: &str) -> Result<Option<Self>> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                file.write_all(token.as_bytes())
                    .and_then(|_| file.sync_all())
                    .map_err(|e| FlowwatchError::io(path, e))?;
                info!(path = %path.display(), "Run lock acquired");
                Ok(Some(Self {
                    path: path.to_path_buf(),
                    token: token.to_string(),
                }))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(FlowwatchError::io(path, e)),
        }
    }

    /// Content written into the lock file by this holder.
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        match remove_if_owned(&self.path, &self.token) {
            Ok(true) => {}
            Ok(false) => warn!(
                path = %self.path.display(),
                "Run lock was reclaimed by another run, leaving it in place"
            ),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to release run lock")
            }
        }
    }
}

/// Remove `path` only if it still holds `expected`.
///
/// The file is first renamed to a private name, so the content check and the
/// delete both act on a file no other run can see. A file that turns out to
/// belong to someone else is linked back under its original name.
fn remove_if_owned(path: &Path, expected: &str) -> std::io::Result<bool> {
    let mut parked = path.as_os_str().to_owned();
    parked.push(format!(".release-{}", Uuid::new_v4()));
    let parked = PathBuf::from(parked);

    match std::fs::rename(path, &parked) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    }

    let content = std::fs::read_to_string(&parked)?;
    if content == expected {
        std::fs::remove_file(&parked)?;
        return Ok(true);
    }

    // Not ours. Put it back unless a new lock has appeared meanwhile.
    match std::fs::hard_link(&parked, path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e),
    }
    std::fs::remove_file(&parked)?;
    Ok(false)
}

fn is_stale(path: &Path) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > STALE_AFTER)
}
