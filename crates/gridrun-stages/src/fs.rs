//! Filesystem helpers shared by the staging stages.

use std::io;
use std::path::Path;

use tokio::fs;

/// Copy the regular files of `src` whose names pass `keep` into `dest`.
///
/// Existing files in `dest` are overwritten. Returns the number copied.
pub(crate) async fn copy_files<F>(src: &Path, dest: &Path, keep: F) -> io::Result<usize>
where
    F: Fn(&str) -> bool,
{
    fs::create_dir_all(dest).await?;

    let mut copied = 0;
    let mut entries = fs::read_dir(src).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if keep(name) {
            fs::copy(entry.path(), dest.join(name)).await?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_copy_files_filters_and_skips_dirs() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::write(src.join("a.txt"), "a").unwrap();
        std::fs::write(src.join("b.bin"), "b").unwrap();

        let dest = tmp.path().join("dest");
        let copied = copy_files(&src, &dest, |n| n.ends_with(".txt")).await.unwrap();

        assert_eq!(copied, 1);
        assert!(dest.join("a.txt").exists());
        assert!(!dest.join("b.bin").exists());
        assert!(!dest.join("nested").exists());
    }
}
