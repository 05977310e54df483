use crate::errors::{StoreError, StoreResult};
use crate::id::seek_zid;
use std::path::Path;
use walkdir::WalkDir;

/// True for names that start with a valid zid and are not editor leftovers.
pub fn is_zettel_file_name(name: &str) -> bool {
    if !seek_zid(name).is_valid() {
        return false;
    }
    !(name.ends_with('~') || name.ends_with(".swp") || name.ends_with(".swx") || name.contains(".#"))
}

/// Names of the regular zettel files directly inside `dir`, sorted.
pub fn list_dir_entries(dir: &Path) -> StoreResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                if error.depth() == 0 {
                    let source = error
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                    return Err(StoreError::io(format!("list {}", dir.display()), source));
                }
                tracing::warn!(error = %error, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if is_zettel_file_name(name) {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_only_regular_zettel_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("20200310195100.zettel"), "x").expect("write");
        std::fs::write(dir.path().join("20200310195101 Title.md"), "x").expect("write");
        std::fs::write(dir.path().join("20200310195101.md~"), "x").expect("write");
        std::fs::write(dir.path().join("README.md"), "x").expect("write");
        std::fs::create_dir(dir.path().join("20200310195102")).expect("mkdir");

        let names = list_dir_entries(dir.path()).expect("list");
        assert_eq!(
            names,
            vec![
                "20200310195100.zettel".to_string(),
                "20200310195101 Title.md".to_string()
            ]
        );
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("gone");
        let error = list_dir_entries(&missing).expect_err("missing dir");
        assert!(matches!(error, StoreError::Io { .. }));
    }
}
