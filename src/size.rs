use crate::catalog::{self, ItemToken};
use crate::constants::MAIN_FOLDERS;
use humansize::{BINARY, format_size};
use jwalk::WalkDir;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

pub fn format_bytes(bytes: u64) -> String {
    format_size(bytes, BINARY)
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}

pub fn is_real_dir(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.is_dir())
}

/// Recursive size of every regular file below `path`. Symlinks are neither
/// counted nor followed, and files that vanish mid-walk count as zero.
pub fn directory_size(path: &Path) -> u64 {
    if !path.exists() || is_symlink(path) {
        return 0;
    }

    // Serial walk per item; callers parallelize across items.
    WalkDir::new(path)
        .skip_hidden(false)
        .follow_links(false)
        .parallelism(jwalk::Parallelism::Serial)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.metadata().map_or(0, |m| m.len()))
        .sum()
}

pub fn loose_file_size(dir: &Path) -> u64 {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return 0;
    };

    read_dir
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .map(|entry| entry.metadata().map_or(0, |m| m.len()))
        .sum()
}

pub fn size_of(root: &Path, token: &ItemToken) -> u64 {
    let path = token.path(root);
    match token {
        ItemToken::MainFolder(_) => loose_file_size(&path),
        // Only real directories are deletable subfolders.
        ItemToken::Subfolder { .. } if is_real_dir(&path) => directory_size(&path),
        ItemToken::Subfolder { .. } => 0,
    }
}

/// Loose-file and subfolder sizes never overlap, so selecting both a main
/// folder and one of its subfolders counts each byte once.
pub fn size_of_selection<S: AsRef<str>>(root: &Path, ids: &[S]) -> u64 {
    let tokens: HashSet<ItemToken> = ids
        .iter()
        .filter_map(|id| catalog::parse_token(id.as_ref()))
        .collect();

    tokens.par_iter().map(|token| size_of(root, token)).sum()
}

pub fn total_potential_size(root: &Path) -> u64 {
    MAIN_FOLDERS
        .par_iter()
        .map(|main| directory_size(&root.join(main)))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(path: &Path, len: usize) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        file.write_all(&vec![0u8; len])?;
        Ok(())
    }

    #[test]
    fn directory_size_is_recursive() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path();
        write_file(&root.join("a.bin"), 100)?;
        write_file(&root.join("nested/b.bin"), 200)?;
        write_file(&root.join("nested/deeper/c.bin"), 300)?;

        assert_eq!(directory_size(root), 600);
        Ok(())
    }

    #[test]
    fn missing_paths_are_zero() {
        let path = Path::new("/path/to/non/existent/directory/cachewarden_test_12345");
        assert_eq!(directory_size(path), 0);
        assert_eq!(loose_file_size(path), 0);
    }

    #[test]
    fn loose_file_size_ignores_subdirectories() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path();
        write_file(&root.join("Intermediate/stray.log"), 50)?;
        write_file(&root.join("Intermediate/Build/obj.o"), 1000)?;

        assert_eq!(loose_file_size(&root.join("Intermediate")), 50);
        assert_eq!(
            size_of(root, &ItemToken::MainFolder("Intermediate")),
            50
        );
        Ok(())
    }

    #[test]
    fn selection_deduplicates_tokens() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path();
        write_file(&root.join("Intermediate/stray.log"), 50)?;
        write_file(&root.join("Intermediate/Build/obj.o"), 1000)?;
        write_file(&root.join("Saved/Logs/editor.log"), 7)?;

        let once = size_of_selection(root, &["Intermediate", "Intermediate/Build"]);
        let twice = size_of_selection(
            root,
            &["Intermediate", "Intermediate", "Intermediate\\Build", "Intermediate/Build"],
        );
        assert_eq!(once, 1050);
        assert_eq!(twice, once);
        assert_eq!(size_of_selection(root, &["Saved/Logs", "Bogus/Entry"]), 7);
        assert_eq!(size_of_selection::<&str>(root, &[]), 0);
        Ok(())
    }

    #[test]
    fn total_potential_size_spans_main_folders() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path();
        write_file(&root.join("Intermediate/stray.log"), 50)?;
        write_file(&root.join("Intermediate/Build/obj.o"), 1000)?;
        write_file(&root.join("DerivedDataCache/VT/x.ddc"), 25)?;
        write_file(&root.join("Content/Map.umap"), 9999)?;

        assert_eq!(total_potential_size(root), 1075);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_counted() -> Result<()> {
        let dir = tempdir()?;
        let outside = tempdir()?;
        let root = dir.path();
        write_file(&outside.path().join("big.bin"), 5000)?;
        write_file(&root.join("Intermediate/Build/obj.o"), 10)?;
        std::os::unix::fs::symlink(
            outside.path().join("big.bin"),
            root.join("Intermediate/Build/link.bin"),
        )?;
        std::os::unix::fs::symlink(outside.path(), root.join("Intermediate/Build/linkdir"))?;
        std::os::unix::fs::symlink(
            outside.path().join("big.bin"),
            root.join("Intermediate/loose-link.bin"),
        )?;

        assert_eq!(directory_size(&root.join("Intermediate/Build")), 10);
        assert_eq!(loose_file_size(&root.join("Intermediate")), 0);
        assert_eq!(directory_size(&root.join("Intermediate/Build/linkdir")), 0);
        Ok(())
    }

    #[test]
    fn file_named_like_a_subfolder_counts_zero() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path();
        write_file(&root.join("Intermediate/stray.bin"), 300_000)?;

        let token = catalog::parse_token("Intermediate/stray.bin").expect("token");
        assert_eq!(size_of(root, &token), 0);
        assert_eq!(size_of_selection(root, &["Intermediate/stray.bin"]), 0);
        assert_eq!(size_of(root, &ItemToken::MainFolder("Intermediate")), 300_000);
        Ok(())
    }

    #[test]
    fn format_bytes_uses_binary_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1024), "1 KiB");
    }
}
