use crate::model::{Project, ProjectSettings};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Lexically normalizes a path: drops `.`, resolves `..` and trailing
/// separators. Symlinks are not resolved.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

pub fn canonical_root(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    normalize_path(&absolute)
}

/// Dedup key of a project. Case-insensitive on Windows, like the filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectKey(String);

impl ProjectKey {
    pub fn new(path: &Path) -> Self {
        let normalized = canonical_root(path).to_string_lossy().into_owned();
        if cfg!(windows) {
            Self(normalized.to_lowercase())
        } else {
            Self(normalized)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// A filesystem scan. Never overrides settings already on record.
    Discovery,
    Persisted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    Merged,
}

#[derive(Default)]
struct Inner {
    order: Vec<ProjectKey>,
    projects: HashMap<ProjectKey, Arc<Project>>,
}

#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_or_update(&self, mut project: Project, provenance: Provenance) -> AddOutcome {
        project.root = canonical_root(&project.root);
        let key = ProjectKey::new(&project.root);
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = inner.projects.get(&key) {
            let merged = match provenance {
                Provenance::Discovery => Project {
                    root: existing.root.clone(),
                    settings: existing.settings.clone(),
                    ..project
                },
                Provenance::Persisted => Project {
                    root: existing.root.clone(),
                    ..project
                },
            };
            inner.projects.insert(key, Arc::new(merged));
            return AddOutcome::Merged;
        }

        inner.order.push(key.clone());
        inner.projects.insert(key, Arc::new(project));
        AddOutcome::Inserted
    }

    pub fn update_settings<F>(&self, path: &Path, edit: F) -> Option<Arc<Project>>
    where
        F: FnOnce(&mut ProjectSettings),
    {
        let key = ProjectKey::new(path);
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let current = inner.projects.get(&key)?;

        let mut updated = Project::clone(current);
        edit(&mut updated.settings);
        let updated = Arc::new(updated);
        inner.projects.insert(key, Arc::clone(&updated));
        Some(updated)
    }

    pub fn remove(&self, path: &Path) -> Option<Arc<Project>> {
        let key = ProjectKey::new(path);
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let removed = inner.projects.remove(&key)?;
        inner.order.retain(|k| *k != key);
        Some(removed)
    }

    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&Project) -> bool,
    {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = inner.projects.len();
        inner.projects.retain(|_, project| keep(project));
        let Inner { order, projects } = &mut *inner;
        order.retain(|key| projects.contains_key(key));
        before - projects.len()
    }

    pub fn get(&self, path: &Path) -> Option<Arc<Project>> {
        let key = ProjectKey::new(path);
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.projects.get(&key).cloned()
    }

    pub fn list_all(&self) -> Vec<Arc<Project>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .order
            .iter()
            .filter_map(|key| inner.projects.get(key).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
