//! Payload file locations on the target

use crate::InjectError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the before-stage payload
pub const BEFORE_HOOK_FILE: &str = "hermes-before-hook.js";

/// File name of the after-stage payload
pub const AFTER_HOOK_FILE: &str = "hermes-hook.js";

/// Deterministic payload paths inside the application's private directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadPaths {
    /// Path of the before-stage script
    pub before: PathBuf,
    /// Path of the after-stage script
    pub after: PathBuf,
}

impl PayloadPaths {
    /// Paths for `package` under `root` (`/data/data` on a device)
    pub fn new(root: &Path, package: &str) -> Self {
        let files = root.join(package).join("files");
        Self {
            before: files.join(BEFORE_HOOK_FILE),
            after: files.join(AFTER_HOOK_FILE),
        }
    }
}

/// Write a payload, creating its directory if needed
pub fn write_payload(path: &Path, contents: &str) -> Result<(), InjectError> {
    let wrap = |source| InjectError::PayloadWrite {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(wrap)?;
    }
    fs::write(path, contents).map_err(wrap)?;
    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_follow_package() {
        let paths = PayloadPaths::new(Path::new("/data/data"), "com.example.app");
        assert_eq!(
            paths.before,
            PathBuf::from("/data/data/com.example.app/files/hermes-before-hook.js")
        );
        assert_eq!(paths.after, PathBuf::from("/data/data/com.example.app/files/hermes-hook.js"));
    }

    #[test]
    fn test_write_payload_creates_dirs() {
        let dir = TempDir::new().unwrap();
        let paths = PayloadPaths::new(dir.path(), "com.example.app");

        write_payload(&paths.before, "before").unwrap();
        write_payload(&paths.before, "again").unwrap();
        assert_eq!(fs::read_to_string(&paths.before).unwrap(), "again");
    }

    #[test]
    fn test_write_payload_reports_path() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();

        let target = blocker.join("files").join(AFTER_HOOK_FILE);
        match write_payload(&target, "x") {
            Err(InjectError::PayloadWrite { path, .. }) => assert_eq!(path, target),
            other => panic!("Expected PayloadWrite error, got {:?}", other),
        }
    }
}
