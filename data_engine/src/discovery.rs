use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::DataError;

/// Regular files in `dir` whose name contains `pattern`, ignoring case,
/// sorted by name.
pub fn files_with_pattern(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, DataError> {
    let needle = pattern.to_lowercase();
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| DataError::io(dir, e))? {
        let path = entry.map_err(|e| DataError::io(dir, e))?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.to_lowercase().contains(&needle));
        if matches {
            files.push(path);
        }
    }
    files.sort();
    debug!(dir = %dir.display(), pattern, found = files.len(), "files discovered");
    Ok(files)
}
