//! Path parsing. Grounded on upstream `ParseDir` (`filesys/file_system.cc`):
//! splits a `/`-separated path into the directory components to traverse
//! and the final file name component. Unlike the original, which recurses
//! on a single path string by re-deleting it for the directory-remove
//! case (a bug the upstream `Remove` is documented as working around
//! incorrectly — see `DESIGN.md`), this returns owned data so the caller
//! is never tempted to share a buffer across a recursive call.

use crate::fs::FsError;

/// Splits `path` into the directory names to walk through and the final
/// component (the file or directory being named). `"a/b/c"` splits into
/// `(["a", "b"], "c")`; a bare `"c"` splits into `([], "c")`.
pub fn split(path: &str) -> Result<(Vec<&str>, &str), FsError> {
    if path.is_empty() {
        return Err(FsError::InvalidPath);
    }
    let mut components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let name = components.pop().ok_or(FsError::InvalidPath)?;
    Ok((components, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_nested_path() {
        let (dirs, name) = split("a/b/c").unwrap();
        assert_eq!(dirs, vec!["a", "b"]);
        assert_eq!(name, "c");
    }

    #[test]
    fn bare_name_has_no_directories() {
        let (dirs, name) = split("file.txt").unwrap();
        assert!(dirs.is_empty());
        assert_eq!(name, "file.txt");
    }

    #[test]
    fn empty_path_is_invalid() {
        assert_eq!(split(""), Err(FsError::InvalidPath));
    }
}
