use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Create `path` and its parents if missing
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("Failed to create directory: {:?}", path))
}

/// Directory a file will be written into, `.` for bare file names
pub fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Remove downloaded tiles, the VRT and the staging directory
///
/// Every removal is attempted; failures are logged as warnings and counted,
/// never returned as errors.
pub fn cleanup_temp_files(temp_files: &[PathBuf], temp_dir: &Path, vrt_path: &Path) -> usize {
    let mut failures = 0;

    for temp_file in temp_files {
        if let Err(e) = fs::remove_file(temp_file) {
            log::warn!("Could not remove {:?}: {}", temp_file, e);
            failures += 1;
        }
    }

    if vrt_path.exists() {
        if let Err(e) = fs::remove_file(vrt_path) {
            log::warn!("Could not remove VRT {:?}: {}", vrt_path, e);
            failures += 1;
        }
    }

    if temp_dir.exists() {
        if let Err(e) = fs::remove_dir_all(temp_dir) {
            log::warn!("Could not remove temp directory {:?}: {}", temp_dir, e);
            failures += 1;
        }
    }

    failures
}
