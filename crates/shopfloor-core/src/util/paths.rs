//! Path resolution utilities.
//!
//! Used by the CLI to locate its own executable (the supervisor re-executes
//! itself to start domain servers) and to resolve the data directory.

use std::env;
use std::path::{Path, PathBuf};

/// Maximum number of parent directories to walk when searching for a marker.
pub const MAX_WALK_LEVELS: usize = 10;

/// Returns the absolute path to the currently running binary.
pub fn binary_path() -> Option<PathBuf> {
    env::current_exe().ok()
}

/// Walks up the directory tree from `start` looking for a directory containing `marker`.
///
/// `marker` may be a nested relative path such as `data/factory`. Returns the
/// directory containing the marker, or `None` if not found within
/// [`MAX_WALK_LEVELS`] iterations.
///
/// # Example
///
/// ```no_run
/// use shopfloor_core::util::paths::find_dir_with_marker;
///
/// if let Some(root) = find_dir_with_marker(".", "data/factory") {
///     println!("Plant data lives under {}", root.join("data").display());
/// }
/// ```
pub fn find_dir_with_marker<P: AsRef<Path>>(start: P, marker: &str) -> Option<PathBuf> {
    let mut current = start.as_ref().to_path_buf();

    for _ in 0..MAX_WALK_LEVELS {
        if current.join(marker).exists() {
            return Some(current);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    None
}
