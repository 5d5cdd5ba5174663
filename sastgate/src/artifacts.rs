use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ScanError;

/// Artifact types the remote engine accepts for upload.
const ALLOWED_SUFFIXES: &[&str] = &[
    "exe", "pdb", "dll", "jar", "zip", "tar", "tgz", "war", "ear", "apk", "ipa",
];

/// Whether a file qualifies for upload based on its extension. Compound
/// `.tar.gz` archives are allowed even though bare `.gz` is not.
pub fn is_uploadable(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return false,
    };

    if name.to_ascii_lowercase().ends_with(".tar.gz") {
        debug!(artifact = %path.display(), "compound archive suffix accepted");
        return true;
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ALLOWED_SUFFIXES.contains(&ext.to_ascii_lowercase().as_str()) => {
            debug!(artifact = %path.display(), "suffix accepted");
            true
        }
        _ => false,
    }
}

/// Collect the uploadable artifacts in a build directory, sorted by name so
/// upload order is deterministic. Filtered-out files are logged and skipped;
/// an empty result is an error because a scan with nothing to analyze can
/// only fail downstream.
pub fn collect(build_dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
    let entries = std::fs::read_dir(build_dir).map_err(|e| ScanError::Configuration(format!(
        "cannot read build directory {}: {e}",
        build_dir.display()
    )))?;

    let mut artifacts = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                warn!(dir = %build_dir.display(), error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        if is_uploadable(&path) {
            artifacts.push(path);
        } else {
            warn!(artifact = %path.display(), "filtered out by file extension");
        }
    }

    if artifacts.is_empty() {
        return Err(ScanError::NoArtifacts {
            dir: build_dir.to_path_buf(),
        });
    }

    artifacts.sort();
    Ok(artifacts)
}
