use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Tracks ephemeral directories created for one job and guarantees their
/// removal on every pipeline exit path.
///
/// Cleanup is idempotent: calling it twice, or on paths that were already
/// removed out from under us, is safe.
#[derive(Debug, Default)]
pub struct ResourceJanitor {
    paths: Mutex<Vec<PathBuf>>,
}

impl ResourceJanitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!(path = %path.display(), "registered scratch directory");
        self.paths.lock().push(path);
    }

    /// Remove every registered path. Paths that no longer exist are
    /// skipped; removal failures are logged and do not abort the sweep.
    pub fn cleanup(&self) {
        let paths: Vec<PathBuf> = self.paths.lock().drain(..).collect();
        for path in paths {
            remove_tree(&path);
        }
    }

    pub fn tracked(&self) -> usize {
        self.paths.lock().len()
    }
}

fn remove_tree(path: &Path) {
    if !path.exists() {
        return;
    }
    match std::fs::remove_dir_all(path) {
        Ok(()) => debug!(path = %path.display(), "removed scratch directory"),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove scratch directory"),
    }
}

impl Drop for ResourceJanitor {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_removes_registered_dirs() {
        let dir = tempfile::Builder::new()
            .prefix("codesweep_janitor_")
            .tempdir()
            .unwrap();
        let path = dir.keep();
        std::fs::write(path.join("payload.txt"), "x").unwrap();

        let janitor = ResourceJanitor::new();
        janitor.register(&path);
        assert_eq!(janitor.tracked(), 1);

        janitor.cleanup();
        assert!(!path.exists());
        assert_eq!(janitor.tracked(), 0);
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let dir = tempfile::Builder::new()
            .prefix("codesweep_janitor_")
            .tempdir()
            .unwrap();
        let path = dir.keep();

        let janitor = ResourceJanitor::new();
        janitor.register(&path);
        janitor.cleanup();
        janitor.cleanup();
        assert!(!path.exists());

        // Registering an already-missing path must not panic either.
        janitor.register(&path);
        janitor.cleanup();
    }
}
