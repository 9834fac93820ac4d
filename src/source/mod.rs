//! PathSource (spec §4.1): enumerate the candidate files a repository's
//! index should consider, honoring `.gitignore`/`.cbignore` precedence,
//! hidden-directory skipping, symlink avoidance, and binary detection.

mod binary;
mod language;

pub use binary::looks_binary;
pub use language::Language;

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;

use crate::constants::ALWAYS_EXCLUDED;

/// A single candidate file surfaced by `PathSource::scan`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Absolute path on disk.
    pub absolute: PathBuf,
    /// Path relative to the repository root, using `/` separators.
    pub relative: String,
}

/// Enumerates files under `root`, honoring `.gitignore` (ancestor rules
/// apply, deeper rules override — native to the `ignore` crate) and a
/// repo-local `.cbignore` with identical syntax, layered as a second
/// matcher so `.cbignore` rules take precedence without needing to fork
/// `ignore`'s own gitignore-precedence algorithm.
///
/// The `.cbignore` matcher is rebuilt on every call rather than cached at
/// construction time, so a long-lived `PathSource` picks up a `.cbignore`
/// added or edited after indexing has started (spec §8 scenario 4) the
/// same way `ignore::WalkBuilder` already re-reads `.gitignore` fresh on
/// every walk.
pub struct PathSource {
    root: PathBuf,
}

impl PathSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        PathSource { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Yield the finite, restartable sequence of absolute paths to
    /// consider. Hidden directories are skipped by default (except the
    /// root itself); symlinks are not followed, so their targets are never
    /// yielded; binary files are dropped via an 8 KiB NUL/UTF-8 sniff.
    pub fn scan(&self) -> Vec<Candidate> {
        let cbignore = build_cbignore(&self.root);
        let mut walker = WalkBuilder::new(&self.root);
        walker
            .hidden(true)
            .follow_links(false)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .parents(true);

        let mut out = Vec::new();
        for entry in walker.build() {
            let Ok(entry) = entry else { continue };
            let path = entry.path();

            if path == self.root {
                continue;
            }
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if is_always_excluded(path, &self.root) {
                continue;
            }
            if cbignore.matched_path_or_any_parents(path, false).is_ignore() {
                continue;
            }
            if looks_binary(path) {
                continue;
            }

            let relative = path
                .strip_prefix(&self.root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");

            out.push(Candidate {
                absolute: path.to_path_buf(),
                relative,
            });
        }
        out
    }

    /// Re-check a single path against `.cbignore`/always-excluded rules
    /// (used by the Watcher to re-apply ignore rules at event time, §4.8).
    pub fn is_indexable(&self, path: &Path) -> bool {
        if is_always_excluded(path, &self.root) {
            return false;
        }
        if build_cbignore(&self.root).matched_path_or_any_parents(path, false).is_ignore() {
            return false;
        }
        !looks_binary(path)
    }
}

fn is_always_excluded(path: &Path, root: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|name| ALWAYS_EXCLUDED.contains(&name))
            .unwrap_or(false)
    })
}

/// Build a combined `.cbignore` matcher by walking the repo tree ahead of
/// time and adding every `.cbignore` file found, rooted at its own
/// directory. `Gitignore`'s own precedence rules (deeper entries win) then
/// apply exactly as they do for `.gitignore`.
fn build_cbignore(root: &Path) -> Gitignore {
    let mut builder = GitignoreBuilder::new(root);
    for entry in WalkBuilder::new(root)
        .hidden(false)
        .follow_links(false)
        .git_ignore(false)
        .build()
    {
        let Ok(entry) = entry else { continue };
        if entry.file_name() == ".cbignore" {
            let _ = builder.add(entry.path());
        }
    }
    builder.build().unwrap_or_else(|_| {
        GitignoreBuilder::new(root)
            .build()
            .expect("empty gitignore builder never fails")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn scan_skips_hidden_dirs_and_gitignore() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "ignored.txt\n").unwrap();
        fs::write(dir.path().join("ignored.txt"), "x").unwrap();
        fs::write(dir.path().join("kept.rs"), "fn main() {}").unwrap();
        fs::create_dir(dir.path().join(".hidden")).unwrap();
        fs::write(dir.path().join(".hidden/inner.rs"), "fn f() {}").unwrap();

        let source = PathSource::new(dir.path());
        let found: Vec<String> = source.scan().into_iter().map(|c| c.relative).collect();

        assert!(found.contains(&"kept.rs".to_string()));
        assert!(!found.contains(&"ignored.txt".to_string()));
        assert!(!found.iter().any(|p| p.starts_with(".hidden")));
    }

    #[test]
    fn cbignore_precedes_gitignore_negation() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("vendor")).unwrap();
        fs::write(dir.path().join(".gitignore"), "vendor/\n!vendor/keep.go\n").unwrap();
        fs::write(dir.path().join(".cbignore"), "vendor/\n").unwrap();
        fs::write(dir.path().join("vendor/keep.go"), "package vendor").unwrap();

        let source = PathSource::new(dir.path());
        let found: Vec<String> = source.scan().into_iter().map(|c| c.relative).collect();
        assert!(!found.iter().any(|p| p.contains("vendor")));
    }

    #[test]
    fn skips_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("real.rs"), "fn f() {}").unwrap();
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(dir.path().join("real.rs"), dir.path().join("link.rs"))
                .unwrap();
            let source = PathSource::new(dir.path());
            let found: Vec<String> = source.scan().into_iter().map(|c| c.relative).collect();
            assert!(found.contains(&"real.rs".to_string()));
            assert!(!found.contains(&"link.rs".to_string()));
        }
    }

    #[test]
    fn skips_binary_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bin.dat"), [0u8, 1, 2, 0, 3]).unwrap();
        fs::write(dir.path().join("text.rs"), "fn f() {}").unwrap();
        let source = PathSource::new(dir.path());
        let found: Vec<String> = source.scan().into_iter().map(|c| c.relative).collect();
        assert!(found.contains(&"text.rs".to_string()));
        assert!(!found.contains(&"bin.dat".to_string()));
    }
}
