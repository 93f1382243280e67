use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

/// Recursively collect every file under `root`. Files moved out by a previous
/// run simply no longer appear, so re-running skips already-processed files.
pub fn collect_files(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    visit(root, &mut files)?;
    Ok(files)
}

fn visit(dir: &Path, files: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("reading directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            visit(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_collect_files_recurses() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("top.jpg"), "x").unwrap();
        fs::write(dir.path().join("a/mid.mp4"), "x").unwrap();
        fs::write(dir.path().join("a/b/deep.txt"), "x").unwrap();

        let mut files = collect_files(dir.path()).unwrap();
        files.sort();
        assert_eq!(files.len(), 3);
        assert!(files.iter().any(|p| p.ends_with("a/b/deep.txt")));
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(collect_files(&dir.path().join("missing")).is_err());
    }
}
