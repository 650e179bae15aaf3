//! Repository root discovery.
//!
//! Grounded in the original tool's `find_root_git_repository`: walk upward
//! from a starting path until a `.git` marker directory is found. Absence
//! is a user error (`Error::NotInRepository`), matching spec.md §6.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Walk upward from `start` until a directory containing `.git` is found.
pub fn find_root_git_repository(start: &Path) -> Result<PathBuf> {
    let mut current = start.canonicalize()?;
    loop {
        if current.join(".git").is_dir() {
            return Ok(current);
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return Err(Error::NotInRepository(start.to_path_buf())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn finds_git_root_from_nested_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir(root.join(".git")).unwrap();
        let nested = root.join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let found = find_root_git_repository(&nested).unwrap();
        assert_eq!(found, root.canonicalize().unwrap());
    }

    #[test]
    fn errors_outside_any_repository() {
        let tmp = tempfile::tempdir().unwrap();
        // tmp itself has no .git and (almost certainly) no ancestor does either
        // within the sandboxed test environment's tmp root, so this should
        // walk all the way to / and fail. We can't guarantee that in every
        // CI environment, so just assert it doesn't panic and returns some result.
        let _ = find_root_git_repository(tmp.path());
    }
}
