use crate::catalog::{self, ItemToken};
use crate::constants::{CLEAN_LOCK_FILE, STALE_LOCK_AGE};
use crate::guard;
use crate::model::{CleanupFailure, CleanupResult};
use crate::registry::ProjectKey;
use crate::size;
use std::collections::{BTreeSet, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex, PoisonError};

fn failure(path: PathBuf, err: &io::Error) -> CleanupFailure {
    tracing::warn!(path = %path.display(), error = %err, "failed to delete");
    CleanupFailure {
        path,
        cause: err.to_string(),
    }
}

fn remove_subfolder(root: &Path, token: &ItemToken, result: &mut CleanupResult) -> bool {
    let path = token.path(root);
    let metadata = match fs::symlink_metadata(&path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "already clean");
            return false;
        }
        Err(err) => {
            result.errors.push(failure(path, &err));
            return false;
        }
    };

    if !metadata.is_dir() {
        // Symlinks and stray files never qualify as a subfolder item.
        tracing::debug!(path = %path.display(), "not a directory, skipping");
        return false;
    }

    let folder_size = size::directory_size(&path);
    tracing::info!(path = %path.display(), "deleting");
    match fs::remove_dir_all(&path) {
        Ok(()) => {
            result.bytes_freed += folder_size;
            result.deleted_subfolders.push(token.id());
            true
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => false,
        Err(err) => {
            result.errors.push(failure(path, &err));
            false
        }
    }
}

fn remove_loose_files(dir: &Path, result: &mut CleanupResult) {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return,
        Err(err) => {
            result.errors.push(failure(dir.to_path_buf(), &err));
            return;
        }
    };

    for entry in read_dir.filter_map(Result::ok) {
        if !entry.file_type().is_ok_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        let len = entry.metadata().map_or(0, |m| m.len());
        match fs::remove_file(&path) {
            Ok(()) => result.bytes_freed += len,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => result.errors.push(failure(path, &err)),
        }
    }
}

/// Deletes the items named by `ids`. A main folder that lost a subfolder
/// also loses its loose files, selected or not.
pub fn clean<S: AsRef<str>>(root: &Path, ids: &[S]) -> CleanupResult {
    let mut result = CleanupResult::default();
    let mut subfolders: Vec<ItemToken> = Vec::new();
    let mut main_folders: BTreeSet<&'static str> = BTreeSet::new();

    for id in ids {
        match catalog::parse_token(id.as_ref()) {
            Some(ItemToken::MainFolder(main)) => {
                main_folders.insert(main);
            }
            Some(token) => {
                if !subfolders.contains(&token) {
                    subfolders.push(token);
                }
            }
            None => tracing::warn!(token = id.as_ref(), "ignoring unknown cleanup item"),
        }
    }

    tracing::info!(root = %root.display(), items = ids.len(), "starting cleanup");

    for token in &subfolders {
        if remove_subfolder(root, token, &mut result) {
            main_folders.insert(token.main_folder());
        }
    }

    for main in main_folders {
        remove_loose_files(&root.join(main), &mut result);
    }

    tracing::info!(
        root = %root.display(),
        freed = result.bytes_freed,
        deleted = result.deleted_subfolders.len(),
        errors = result.errors.len(),
        "cleanup finished"
    );
    result
}

#[derive(Clone, Default)]
pub struct CleanLocks {
    active: Arc<Mutex<HashSet<ProjectKey>>>,
}

pub struct CleanPermit {
    key: ProjectKey,
    active: Arc<Mutex<HashSet<ProjectKey>>>,
    lock_file: Option<PathBuf>,
}

enum FileLock {
    Held(PathBuf),
    Busy,
    Unavailable,
}

fn lock_is_stale(path: &Path) -> bool {
    match fs::read_to_string(path).map(|raw| raw.trim().parse::<u32>()) {
        Ok(Ok(pid)) => !guard::process_alive(pid),
        // Owner crashed before writing its pid, or is writing it right now.
        _ => fs::metadata(path)
            .and_then(|m| m.modified())
            .is_ok_and(|modified| modified.elapsed().is_ok_and(|age| age > STALE_LOCK_AGE)),
    }
}

fn acquire_lock_file(root: &Path) -> FileLock {
    let path = root.join(CLEAN_LOCK_FILE);
    for _ in 0..2 {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                if let Err(err) = write!(file, "{}", process::id()) {
                    tracing::warn!(path = %path.display(), error = %err, "could not record lock owner");
                }
                return FileLock::Held(path);
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                if !lock_is_stale(&path) {
                    return FileLock::Busy;
                }
                tracing::warn!(path = %path.display(), "removing stale clean lock");
                let _ = fs::remove_file(&path);
            }
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "no lock file, locking in-process only");
                return FileLock::Unavailable;
            }
        }
    }
    FileLock::Busy
}

impl CleanLocks {
    pub fn try_acquire(&self, root: &Path) -> Option<CleanPermit> {
        let key = ProjectKey::new(root);
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.contains(&key) {
            return None;
        }

        let lock_file = match acquire_lock_file(root) {
            FileLock::Held(path) => Some(path),
            FileLock::Unavailable => None,
            FileLock::Busy => {
                tracing::info!(root = %root.display(), "cleanup running in another process");
                return None;
            }
        };

        active.insert(key.clone());
        Some(CleanPermit {
            key,
            active: Arc::clone(&self.active),
            lock_file,
        })
    }
}

impl Drop for CleanPermit {
    fn drop(&mut self) {
        if let Some(path) = &self.lock_file {
            let _ = fs::remove_file(path);
        }
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
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

    fn build_scenario(root: &Path) -> Result<()> {
        for i in 0..10 {
            write_file(&root.join(format!("Intermediate/Build/obj{i}.o")), 50_000)?;
        }
        for i in 0..3 {
            write_file(
                &root.join(format!("Intermediate/ProjectFiles/p{i}.vcxproj")),
                20_000 / 3 + usize::from(i == 0) * (20_000 % 3),
            )?;
        }
        Ok(())
    }

    #[test]
    fn cleaning_one_subfolder_leaves_siblings() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path();
        build_scenario(root)?;

        assert_eq!(size::directory_size(&root.join("Intermediate/ProjectFiles")), 20_000);

        let result = clean(root, &["Intermediate/Build"]);

        assert_eq!(result.bytes_freed, 500_000);
        assert_eq!(result.deleted_subfolders, ["Intermediate/Build"]);
        assert!(result.errors.is_empty());
        assert!(!root.join("Intermediate/Build").exists());
        assert_eq!(size::directory_size(&root.join("Intermediate/ProjectFiles")), 20_000);
        Ok(())
    }

    #[test]
    fn deleted_subfolders_size_to_zero() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path();
        build_scenario(root)?;
        write_file(&root.join("Saved/Logs/editor.log"), 300)?;

        let ids = ["Intermediate/Build", "Saved/Logs"];
        let result = clean(root, &ids);
        for deleted in &result.deleted_subfolders {
            assert_eq!(size::size_of_selection(root, &[deleted.as_str()]), 0);
        }
        assert_eq!(size::size_of_selection(root, &ids), 0);
        Ok(())
    }

    #[test]
    fn subfolder_deletion_sweeps_parent_loose_files() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path();
        write_file(&root.join("Intermediate/Build/obj.o"), 1000)?;
        write_file(&root.join("Intermediate/stray.tmp"), 24)?;
        write_file(&root.join("Saved/notes.txt"), 5)?;

        let result = clean(root, &["Intermediate/Build"]);

        assert_eq!(result.bytes_freed, 1024);
        assert!(!root.join("Intermediate/stray.tmp").exists());
        assert!(root.join("Saved/notes.txt").exists());
        Ok(())
    }

    #[test]
    fn stray_file_token_frees_nothing_and_sizes_zero() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path();
        write_file(&root.join("Intermediate/stray.bin"), 300_000)?;

        let ids = ["Intermediate/stray.bin"];
        assert_eq!(size::size_of_selection(root, &ids), 0);

        let result = clean(root, &ids);
        assert_eq!(result.bytes_freed, 0);
        assert!(result.deleted_subfolders.is_empty());
        assert!(root.join("Intermediate/stray.bin").exists());
        assert_eq!(size::size_of_selection(root, &ids), 0);
        Ok(())
    }

    #[test]
    fn main_folder_token_only_removes_loose_files() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path();
        write_file(&root.join("Saved/notes.txt"), 5)?;
        write_file(&root.join("Saved/Logs/editor.log"), 300)?;

        let result = clean(root, &["Saved", "Saved"]);

        assert_eq!(result.bytes_freed, 5);
        assert!(result.deleted_subfolders.is_empty());
        assert!(root.join("Saved/Logs/editor.log").exists());
        Ok(())
    }

    #[test]
    fn missing_items_are_already_clean() -> Result<()> {
        let dir = tempdir()?;
        let result = clean(
            dir.path(),
            &["Intermediate", "Intermediate/Build", "DerivedDataCache/VT"],
        );
        assert_eq!(result, CleanupResult::default());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_never_followed() -> Result<()> {
        let dir = tempdir()?;
        let outside = tempdir()?;
        let root = dir.path();
        write_file(&outside.path().join("precious.bin"), 4096)?;
        write_file(&root.join("Intermediate/Build/obj.o"), 10)?;
        std::os::unix::fs::symlink(
            outside.path().join("precious.bin"),
            root.join("Intermediate/Build/link.bin"),
        )?;
        std::os::unix::fs::symlink(outside.path(), root.join("Intermediate/Linked"))?;
        std::os::unix::fs::symlink(
            outside.path().join("precious.bin"),
            root.join("Intermediate/loose-link.bin"),
        )?;

        let result = clean(root, &["Intermediate/Build", "Intermediate/Linked"]);

        assert_eq!(result.bytes_freed, 10);
        assert_eq!(result.deleted_subfolders, ["Intermediate/Build"]);
        assert!(outside.path().join("precious.bin").exists());
        assert!(fs::symlink_metadata(root.join("Intermediate/Linked")).is_ok());
        assert!(fs::symlink_metadata(root.join("Intermediate/loose-link.bin")).is_ok());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn failures_are_collected_without_aborting() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir()?;
        let root = dir.path();
        write_file(&root.join("Intermediate/Build/obj.o"), 100)?;
        write_file(&root.join("Saved/Logs/editor.log"), 300)?;

        let saved = root.join("Saved");
        fs::set_permissions(&saved, fs::Permissions::from_mode(0o555))?;
        // Privileged users ignore directory permissions.
        if File::create(saved.join("writable")).is_ok() {
            fs::set_permissions(&saved, fs::Permissions::from_mode(0o755))?;
            return Ok(());
        }

        let result = clean(root, &["Saved/Logs", "Intermediate/Build"]);
        fs::set_permissions(&saved, fs::Permissions::from_mode(0o755))?;

        assert_eq!(result.deleted_subfolders, ["Intermediate/Build"]);
        assert_eq!(result.bytes_freed, 100);
        assert!(!result.errors.is_empty());
        assert!(result.errors[0].path.starts_with(&saved));
        Ok(())
    }

    #[test]
    fn clean_locks_reject_same_project() {
        let locks = CleanLocks::default();
        let permit = locks.try_acquire(Path::new("/p/Game"));
        assert!(permit.is_some());
        assert!(locks.try_acquire(Path::new("/p/Game/")).is_none());
        assert!(locks.try_acquire(Path::new("/p/Other")).is_some());

        drop(permit);
        assert!(locks.try_acquire(Path::new("/p/Game")).is_some());
    }

    #[test]
    fn lock_file_excludes_other_processes() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path();
        let lock = root.join(CLEAN_LOCK_FILE);

        // Separate lock sets stand in for separate processes.
        let here = CleanLocks::default();
        let there = CleanLocks::default();

        let permit = here.try_acquire(root).expect("free");
        assert_eq!(fs::read_to_string(&lock)?, process::id().to_string());
        assert!(there.try_acquire(root).is_none());

        drop(permit);
        assert!(!lock.exists());
        assert!(there.try_acquire(root).is_some());
        Ok(())
    }

    #[test]
    fn stale_lock_file_is_taken_over() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path();
        fs::write(root.join(CLEAN_LOCK_FILE), "999999999")?;

        let permit = CleanLocks::default().try_acquire(root);
        assert!(permit.is_some());
        assert_eq!(
            fs::read_to_string(root.join(CLEAN_LOCK_FILE))?,
            process::id().to_string()
        );
        Ok(())
    }

    #[test]
    fn fresh_unreadable_lock_counts_as_busy() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join(CLEAN_LOCK_FILE), "")?;
        assert!(CleanLocks::default().try_acquire(dir.path()).is_none());
        Ok(())
    }
}
