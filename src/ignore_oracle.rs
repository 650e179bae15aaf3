//! Ignore oracle (spec.md §4 "ignore oracle" contract): a `Path -> bool`
//! predicate parsed once from the repository's top-level ignore file.
//! Nested `.gitignore` files are out of scope — only the root file is read,
//! matching the original tool's `filesystem.py` behavior.

use crate::models::RepoPaths;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;

pub struct IgnoreOracle {
    matcher: Gitignore,
    private_dir: std::path::PathBuf,
}

impl IgnoreOracle {
    pub fn build(paths: &RepoPaths) -> Self {
        let mut builder = GitignoreBuilder::new(&paths.root);
        let gitignore_path = paths.root.join(".gitignore");
        if gitignore_path.is_file() {
            // Parse errors are non-fatal: fall back to "nothing ignored".
            let _ = builder.add(&gitignore_path);
        }
        let matcher = builder.build().unwrap_or_else(|_| Gitignore::empty());
        IgnoreOracle { matcher, private_dir: paths.private_dir() }
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        if path.starts_with(&self.private_dir) {
            return true;
        }
        self.matcher.matched(path, path.is_dir()).is_ignore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn matches_patterns_from_root_gitignore() {
        let tmp = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(tmp.path().join(".gitignore")).unwrap();
        writeln!(f, "*.log").unwrap();

        let paths = RepoPaths { root: tmp.path().to_path_buf() };
        let oracle = IgnoreOracle::build(&paths);

        assert!(oracle.is_ignored(&tmp.path().join("debug.log")));
        assert!(!oracle.is_ignored(&tmp.path().join("main.rs")));
    }

    #[test]
    fn always_ignores_the_private_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = RepoPaths { root: tmp.path().to_path_buf() };
        let oracle = IgnoreOracle::build(&paths);
        assert!(oracle.is_ignored(&paths.private_dir().join("codesearch.db")));
    }
}
