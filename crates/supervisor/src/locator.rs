//! Build artifact lookup.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Suffix of the pre-repackaging copy a build leaves next to the real
/// artifact.
const BACKUP_SUFFIX: &str = ".original";

/// Find the most recently modified `*.{ext}` file directly inside
/// `target_dir`, ignoring `*.original` backups.
///
/// A missing directory yields `Ok(None)`. Equal modification times are
/// broken by file name so the result is deterministic.
pub fn locate_artifact(target_dir: &Path, ext: &str) -> io::Result<Option<PathBuf>> {
    let entries = match std::fs::read_dir(target_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let suffix = format!(".{ext}");
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.ends_with(&suffix) || name.ends_with(BACKUP_SUFFIX) {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified()?;
        let path = entry.path();

        let is_newer = match &newest {
            None => true,
            Some((best_time, best_path)) => {
                modified > *best_time || (modified == *best_time && path > *best_path)
            }
        };
        if is_newer {
            newest = Some((modified, path));
        }
    }

    Ok(newest.map(|(_, path)| path))
}
