//! Watermark persistence.
//!
//! The cursor is the only state that survives between runs. Reads never fail:
//! anything that cannot be turned into a timestamp means "start from the
//! beginning of history".

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{info, warn};

use flowwatch_common::{FlowwatchError, Result, Watermark};

pub trait CursorStore: Send + Sync {
    /// Last persisted watermark, or epoch zero when there is none.
    fn read(&self) -> Watermark;

    /// Replace the persisted watermark.
    fn write(&self, watermark: &Watermark) -> Result<()>;
}

// ---------------------------------------------------------------------------
// FileCursorStore
// ---------------------------------------------------------------------------

/// Single text file holding exactly the watermark string.
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }
}

impl CursorStore for FileCursorStore {
    fn read(&self) -> Watermark {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Watermark::parse(&raw).unwrap_or_else(|| {
                warn!(
                    path = %self.path.display(),
                    content = raw.trim(),
                    "Saved watermark is not a timestamp, starting from epoch"
                );
                Watermark::epoch()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No saved watermark, starting from epoch");
                Watermark::epoch()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read watermark, starting from epoch");
                Watermark::epoch()
            }
        }
    }

    /// Write to a sibling temp file and rename it into place, so a crash or a
    /// full disk leaves the previous watermark untouched.
    fn write(&self, watermark: &Watermark) -> Result<()> {
        let dir = self.dir();
        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| FlowwatchError::io(dir, e))?;
        tmp.write_all(watermark.as_str().as_bytes())
            .map_err(|e| FlowwatchError::io(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| FlowwatchError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| FlowwatchError::io(&self.path, e.error))?;

        info!(watermark = %watermark, path = %self.path.display(), "Watermark saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryCursorStore
// ---------------------------------------------------------------------------

/// In-process cursor. Nothing survives the process; used for tests and dry runs.
#[derive(Default)]
pub struct MemoryCursorStore {
    value: Mutex<Option<Watermark>>,
    writes: Mutex<u32>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_watermark(watermark: Watermark) -> Self {
        Self {
            value: Mutex::new(Some(watermark)),
            writes: Mutex::new(0),
        }
    }

    /// Number of successful `write` calls.
    pub fn write_count(&self) -> u32 {
        *self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CursorStore for MemoryCursorStore {
    fn read(&self) -> Watermark {
        self.value
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_default()
    }

    fn write(&self, watermark: &Watermark) -> Result<()> {
        *self.value.lock().unwrap_or_else(|e| e.into_inner()) = Some(watermark.clone());
        *self.writes.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}
