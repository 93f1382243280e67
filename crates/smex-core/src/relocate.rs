//! Collision-safe relocation of files and directories.
//!
//! The check-then-move naming loop is race-free only under the sequential
//! execution model of the batch loop; concurrent callers would need an
//! exclusive-create primitive instead.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

/// Move `src` (file or directory) into `dst_dir`, creating `dst_dir` if
/// absent and renaming on collision (`name (1).ext`, `name (2).ext`, ...).
/// Returns the final destination path.
pub fn safe_move(src: &Path, dst_dir: &Path) -> anyhow::Result<PathBuf> {
    if !src.exists() {
        bail!("source path does not exist: {}", src.display());
    }
    fs::create_dir_all(dst_dir)
        .with_context(|| format!("creating destination directory {}", dst_dir.display()))?;

    let file_name = src
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("source path has no usable file name: {}", src.display()))?;

    let dst = unique_destination(dst_dir, file_name, src.is_dir());
    move_path(src, &dst)?;
    Ok(dst)
}

/// One-time input staging: copy the whole input tree into a writable
/// staging directory, leaving the original untouched.
pub fn stage_copy(src_root: &Path, staging_dir: &Path) -> anyhow::Result<()> {
    if !src_root.is_dir() {
        bail!("input root is not a directory: {}", src_root.display());
    }
    copy_dir_recursive(src_root, staging_dir)
        .with_context(|| format!("staging {} into {}", src_root.display(), staging_dir.display()))
}

/// Find a free name in `dst_dir`, appending ` (n)` before the extension.
/// Directories use the same scheme without an extension split.
fn unique_destination(dst_dir: &Path, file_name: &str, is_dir: bool) -> PathBuf {
    let dst = dst_dir.join(file_name);
    if !dst.exists() {
        return dst;
    }

    let (stem, ext) = if is_dir {
        (file_name, None)
    } else {
        let path = Path::new(file_name);
        (
            path.file_stem().and_then(|s| s.to_str()).unwrap_or(file_name),
            path.extension().and_then(|s| s.to_str()),
        )
    };

    let mut counter = 1u32;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{} ({}).{}", stem, counter, ext),
            None => format!("{} ({})", stem, counter),
        };
        let dst = dst_dir.join(candidate);
        if !dst.exists() {
            return dst;
        }
        counter += 1;
    }
}

fn move_path(src: &Path, dst: &Path) -> anyhow::Result<()> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    // rename fails across filesystems; fall back to copy + remove.
    if src.is_dir() {
        copy_dir_recursive(src, dst)?;
        fs::remove_dir_all(src)
            .with_context(|| format!("removing {} after copy", src.display()))?;
    } else {
        fs::copy(src, dst)
            .with_context(|| format!("copying {} to {}", src.display(), dst.display()))?;
        fs::remove_file(src)
            .with_context(|| format!("removing {} after copy", src.display()))?;
    }
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src).with_context(|| format!("reading {}", src.display()))? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)
                .with_context(|| format!("copying {}", src_path.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_collision_naming_increments() {
        let dir = tempdir().unwrap();
        let src_dir = dir.path().join("src");
        let dst_dir = dir.path().join("dst");
        fs::create_dir_all(&src_dir).unwrap();

        for i in 0..3 {
            let staging = src_dir.join(format!("{i}"));
            fs::create_dir_all(&staging).unwrap();
            let src = staging.join("photo.jpg");
            fs::write(&src, format!("contents {i}")).unwrap();
            safe_move(&src, &dst_dir).unwrap();
        }

        // Nothing overwritten: all three survive with incrementing suffixes.
        assert!(dst_dir.join("photo.jpg").exists());
        assert!(dst_dir.join("photo (1).jpg").exists());
        assert!(dst_dir.join("photo (2).jpg").exists());
        assert_eq!(
            fs::read_to_string(dst_dir.join("photo (2).jpg")).unwrap(),
            "contents 2"
        );
    }

    #[test]
    fn test_directory_naming_has_no_extension_split() {
        let dir = tempdir().unwrap();
        let dst_dir = dir.path().join("dst");

        for i in 0..2 {
            let src = dir.path().join(format!("stage{i}")).join("bundle.d");
            fs::create_dir_all(&src).unwrap();
            fs::write(src.join("inner.txt"), "x").unwrap();
            safe_move(&src, &dst_dir).unwrap();
        }

        assert!(dst_dir.join("bundle.d").join("inner.txt").exists());
        assert!(dst_dir.join("bundle.d (1)").join("inner.txt").exists());
    }

    #[test]
    fn test_missing_source_fails_before_mutation() {
        let dir = tempdir().unwrap();
        let dst_dir = dir.path().join("dst");
        let missing = dir.path().join("nope.jpg");

        assert!(safe_move(&missing, &dst_dir).is_err());
        // The destination directory was not created either.
        assert!(!dst_dir.exists());
    }

    #[test]
    fn test_stage_copy_leaves_source_intact() {
        let dir = tempdir().unwrap();
        let src_root = dir.path().join("export");
        fs::create_dir_all(src_root.join("memories")).unwrap();
        fs::write(src_root.join("memories").join("a.jpg"), "a").unwrap();

        let staged = dir.path().join("staging");
        stage_copy(&src_root, &staged).unwrap();

        assert!(staged.join("memories").join("a.jpg").exists());
        assert!(src_root.join("memories").join("a.jpg").exists());
    }
}
