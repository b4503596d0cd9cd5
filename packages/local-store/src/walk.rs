//! Directory listing and glob walking shared by both local adapters.

use std::fs;
use std::path::{Path, PathBuf};

use storeloc_core::{EntryIter, Error, GlobPattern, Result, Segments};
use walkdir::WalkDir;

pub(crate) fn key_of(path: &Path) -> String {
    path.display().to_string()
}

fn child_segments(at: &Segments, name: &std::ffi::OsStr) -> Result<Segments> {
    match name.to_str() {
        Some(name) => at.child(name),
        None => Err(Error::validation(format!(
            "non UTF-8 file name under {}: {:?}",
            at, name
        ))),
    }
}

/// Direct children of `dir`, lazily.
pub(crate) fn read_dir(dir: &Path, at: &Segments) -> Result<EntryIter> {
    let entries = fs::read_dir(dir).map_err(|e| Error::from_io(key_of(dir), e))?;
    let at = at.clone();
    let dir = dir.to_path_buf();
    Ok(Box::new(entries.map(move |entry| {
        let entry = entry.map_err(|e| Error::from_io(key_of(&dir), e))?;
        child_segments(&at, &entry.file_name())
    })))
}

fn walk_error(e: walkdir::Error) -> Error {
    let key = e.path().map(key_of).unwrap_or_default();
    match e.into_io_error() {
        Some(io) => Error::from_io(key, io),
        None => Error::Integrity {
            key,
            message: "filesystem loop".to_string(),
        },
    }
}

/// Entries below `base` matching `pattern`, in file-name order.
///
/// Symlinks are listed but never descended into. A missing base yields
/// nothing.
pub(crate) fn glob(base: PathBuf, at: &Segments, pattern: &GlobPattern) -> Result<EntryIter> {
    if !base.is_dir() {
        return Ok(Box::new(std::iter::empty()));
    }
    let mut walker = WalkDir::new(&base)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();
    if let Some(depth) = pattern.max_depth() {
        walker = walker.max_depth(depth);
    }
    let at = at.clone();
    let pattern = pattern.clone();
    Ok(Box::new(walker.into_iter().filter_map(move |entry| {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => return Some(Err(walk_error(e))),
        };
        let rel = entry.path().strip_prefix(&base).ok()?;
        let mut parts = Vec::new();
        for component in rel.components() {
            match component.as_os_str().to_str() {
                Some(part) => parts.push(part.to_string()),
                None => return Some(Err(Error::validation(format!(
                    "non UTF-8 file name: {}",
                    entry.path().display()
                )))),
            }
        }
        if !pattern.matches(&parts, entry.file_type().is_dir()) {
            return None;
        }
        Some(at.join(&parts))
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        for file in ["top.txt", "a/1.txt", "a/2.md", "a/b/3.txt", "a/b/c/4.txt"] {
            fs::write(dir.path().join(file), file).unwrap();
        }
        dir
    }

    fn run(dir: &TempDir, at: &str, pattern: GlobPattern) -> Vec<String> {
        let at = Segments::parse_str(at).unwrap();
        let base = dir.path().join(at.as_posix());
        glob(base, &at, &pattern)
            .unwrap()
            .map(|s| s.unwrap().as_posix())
            .collect()
    }

    #[test]
    fn test_glob_single_level() {
        let dir = tree();
        let got = run(&dir, "a", GlobPattern::parse("*.txt").unwrap());
        assert_eq!(got, vec!["a/1.txt"]);
    }

    #[test]
    fn test_rglob_walks_every_depth_in_order() {
        let dir = tree();
        let got = run(&dir, ".", GlobPattern::recursive("*.txt").unwrap());
        assert_eq!(got, vec!["a/1.txt", "a/b/3.txt", "a/b/c/4.txt", "top.txt"]);
    }

    #[test]
    fn test_trailing_double_star_yields_directories() {
        let dir = tree();
        let got = run(&dir, "a", GlobPattern::parse("**").unwrap());
        assert_eq!(got, vec!["a/b", "a/b/c"]);
    }

    #[test]
    fn test_missing_base_is_empty() {
        let dir = tree();
        assert!(run(&dir, "nope", GlobPattern::parse("*").unwrap()).is_empty());
    }

    #[test]
    fn test_read_dir_children() {
        let dir = tree();
        let at = Segments::parse_str("a/b").unwrap();
        let mut got: Vec<String> = read_dir(&dir.path().join("a/b"), &at)
            .unwrap()
            .map(|s| s.unwrap().as_posix())
            .collect();
        got.sort();
        assert_eq!(got, vec!["a/b/3.txt", "a/b/c"]);

        let missing = read_dir(&dir.path().join("zzz"), &at).err().unwrap();
        assert!(missing.is_not_found());
    }
}
