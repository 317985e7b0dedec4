//! Recursive directory insertion.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::archive::{Archive, Mode};
use crate::error::{Error, Result};

/// What [`Archive::add_dir_with`] does with symbolic links.
///
/// Links are never descended into, whichever policy is picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymlinkPolicy {
    /// Leave links out of the archive.
    #[default]
    Skip,
    /// Store a link to a regular file as a plain entry holding the target's
    /// content. Links to directories are still skipped.
    Leaf,
}

/// Options for [`Archive::add_dir_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    /// Compression level for every file, `None` for the default.
    pub level: Option<u8>,
    pub symlinks: SymlinkPolicy,
}

impl Archive {
    /// Add every regular file under `dir`, named by its path relative to `dir`.
    ///
    /// Names always use `/` as separator. Directories get no marker entries
    /// of their own and symbolic links are skipped. Files are visited in
    /// file-name order within each directory.
    pub fn add_dir<P: AsRef<Path>>(&mut self, dir: P, level: Option<u8>) -> Result<()> {
        self.add_dir_with(
            dir,
            &WalkOptions {
                level,
                ..WalkOptions::default()
            },
        )
    }

    /// [`Archive::add_dir`] with explicit options.
    pub fn add_dir_with<P: AsRef<Path>>(&mut self, dir: P, options: &WalkOptions) -> Result<()> {
        self.require(Mode::Write, "add_dir");
        let root = dir.as_ref();
        tracing::debug!(root = %root.display(), "scanning directory");

        let mut added = 0usize;
        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry?;
            let file_type = entry.file_type();

            if file_type.is_symlink() {
                if !accept_link(entry.path(), options.symlinks) {
                    tracing::debug!(path = %entry.path().display(), "skipping symbolic link");
                    continue;
                }
            } else if !file_type.is_file() {
                continue;
            }

            let name = archive_name(root, entry.path())?;
            tracing::trace!(%name, "adding walked file");
            self.add_file_from_path(&name, entry.path(), options.level)?;
            added += 1;
        }

        tracing::debug!(root = %root.display(), added, "added directory");
        Ok(())
    }
}

/// Whether a link should be stored under `policy`.
///
/// Resolving the link's metadata reads one hop; nothing below it is walked.
fn accept_link(path: &Path, policy: SymlinkPolicy) -> bool {
    match policy {
        SymlinkPolicy::Skip => false,
        SymlinkPolicy::Leaf => fs::metadata(path).is_ok_and(|meta| meta.is_file()),
    }
}

/// Archive name for `path`: relative to `root`, forward slashes only.
fn archive_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let relative = relative.to_str().ok_or_else(|| Error::NonUtf8Path {
        path: path.to_path_buf(),
    })?;
    Ok(relative.replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn names_are_relative_to_root() {
        let root = Path::new("data");
        let name = archive_name(root, &root.join("all").join("a").join("a.txt")).unwrap();
        assert_eq!(name, "all/a/a.txt");
    }

    #[test]
    fn backslashes_become_forward_slashes() {
        let root = PathBuf::from("base");
        let name = archive_name(&root, &root.join("sub\\file.txt")).unwrap();
        assert_eq!(name, "sub/file.txt");
    }

    #[test]
    fn skip_policy_rejects_every_link() {
        assert!(!accept_link(Path::new("anything"), SymlinkPolicy::Skip));
        assert!(!accept_link(Path::new("does/not/exist"), SymlinkPolicy::Leaf));
    }
}
