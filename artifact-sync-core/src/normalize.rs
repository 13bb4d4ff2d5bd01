//! Best-effort cleanup of a fetched artifact tree.
//!
//! Files whose extension is not allow-listed are removed, then every directory left
//! empty below the root is pruned bottom-up. Nothing here fails: deletion problems are
//! logged as warnings and skipped.

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

/// Extensions kept by default. Everything else is mirror metadata.
pub const ESSENTIAL_EXTENSIONS: &[&str] = &[
    ".pt",
    ".bin",
    ".json",
    ".yaml",
    ".onnx",
    ".pth",
    ".safetensors",
];

#[derive(Debug, Default)]
struct Tally {
    removed_files: usize,
    removed_dirs: usize,
    warnings: usize,
}

/// Remove non-essential files and empty directories below `local_path`.
///
/// `allowed_extensions` entries are matched case-insensitively and may be given with
/// or without the leading dot. The root directory itself is never removed.
pub fn normalize(local_path: &Path, allowed_extensions: &[&str]) {
    let allowed: Vec<String> = allowed_extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let mut tally = Tally::default();
    remove_disallowed_files(local_path, &allowed, &mut tally);
    prune_empty_dirs(local_path, true, &mut tally);

    info!(
        path = %local_path.display(),
        removed_files = tally.removed_files,
        removed_dirs = tally.removed_dirs,
        warnings = tally.warnings,
        "[NORMALIZE] Cleanup finished"
    );
}

fn is_allowed(path: &Path, allowed: &[String]) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

fn remove_disallowed_files(dir: &Path, allowed: &[String], tally: &mut Tally) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = ?e, path = %dir.display(), "[NORMALIZE] Cannot read directory");
            tally.warnings += 1;
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = ?e, path = %dir.display(), "[NORMALIZE] Cannot read directory entry");
                tally.warnings += 1;
                continue;
            }
        };
        let path = entry.path();
        // Symlinks are treated as files and never followed.
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            remove_disallowed_files(&path, allowed, tally);
        } else if !is_allowed(&path, allowed) {
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "[NORMALIZE] Removed non-essential file");
                    tally.removed_files += 1;
                }
                Err(e) => {
                    warn!(error = ?e, path = %path.display(), "[NORMALIZE] Failed to remove file");
                    tally.warnings += 1;
                }
            }
        }
    }
}

/// Returns true when `dir` is empty after pruning its children.
fn prune_empty_dirs(dir: &Path, is_root: bool, tally: &mut Tally) -> bool {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = ?e, path = %dir.display(), "[NORMALIZE] Cannot read directory");
            tally.warnings += 1;
            return false;
        }
    };

    let mut empty = true;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir && prune_empty_dirs(&path, false, tally) {
            continue;
        }
        empty = false;
    }

    if empty && !is_root {
        match fs::remove_dir(dir) {
            Ok(()) => {
                debug!(path = %dir.display(), "[NORMALIZE] Removed empty directory");
                tally.removed_dirs += 1;
                return true;
            }
            Err(e) => {
                warn!(error = ?e, path = %dir.display(), "[NORMALIZE] Failed to remove directory");
                tally.warnings += 1;
                return false;
            }
        }
    }
    empty
}
