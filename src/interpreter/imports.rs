use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use tracing::debug;

use super::RuntimeErrorKind;

/// Tracks which source files are being executed and which already ran.
#[derive(Debug, Default)]
pub struct Modules {
    in_progress: Vec<PathBuf>,
    completed: FxHashSet<PathBuf>,
}

/// Resolves an import path against the working directory. Existing files
/// are canonicalized so different spellings of one file agree.
pub fn resolve(path: impl AsRef<Path>) -> Result<PathBuf, RuntimeErrorKind> {
    let path = path.as_ref();
    match path.canonicalize() {
        Ok(resolved) => Ok(resolved),
        Err(_) => Ok(std::path::absolute(path)?),
    }
}

impl Modules {
    /// Marks `path` as in progress. Returns `false` when it has already run.
    pub fn begin(&mut self, path: &Path) -> Result<bool, RuntimeErrorKind> {
        if self.completed.contains(path) {
            debug!(path = %path.display(), "already imported");
            return Ok(false);
        }
        if self.in_progress.iter().any(|p| p == path) {
            return Err(RuntimeErrorKind::CircularImport(path.display().to_string()));
        }
        debug!(path = %path.display(), depth = self.in_progress.len(), "importing");
        self.in_progress.push(path.to_path_buf());
        Ok(true)
    }

    pub fn finish(&mut self) {
        if let Some(path) = self.in_progress.pop() {
            debug!(path = %path.display(), "finished import");
            self.completed.insert(path);
        }
    }

    /// Drops the innermost in-progress entry after a failure.
    pub fn abandon(&mut self) {
        self.in_progress.pop();
    }
}
