use crate::constants::{DESCRIPTOR_EXTENSION, DOCUMENTS_DIR, UNREAL_PROJECTS_DIR};
use crate::error::DiscoveryError;
use crate::model::Project;
use std::fs;
use std::path::{Path, PathBuf};

pub fn default_projects_dir() -> Option<PathBuf> {
    let documents = dirs::document_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(DOCUMENTS_DIR)))?;
    Some(documents.join(UNREAL_PROJECTS_DIR))
}

/// Name of the first `.uproject` file in `root`, by name order.
pub fn find_descriptor(root: &Path) -> Option<String> {
    let read_dir = fs::read_dir(root).ok()?;
    read_dir
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| !t.is_dir()))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(DESCRIPTOR_EXTENSION))
        .min()
}

pub fn validate_project_folder(path: &Path) -> Option<Project> {
    if !path.is_dir() {
        return None;
    }
    let descriptor = find_descriptor(path)?;
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    Some(Project::new(path.to_path_buf(), name, descriptor))
}

pub fn discover(base: &Path) -> Result<Vec<Project>, DiscoveryError> {
    if !base.exists() {
        return Err(DiscoveryError::BaseNotFound(base.to_path_buf()));
    }

    let read_dir = fs::read_dir(base).map_err(|source| DiscoveryError::Io {
        path: base.to_path_buf(),
        source,
    })?;

    let mut candidates: Vec<PathBuf> = read_dir
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    candidates.sort();

    let projects: Vec<Project> = candidates
        .iter()
        .filter_map(|path| validate_project_folder(path))
        .inspect(|project| {
            tracing::debug!(
                name = %project.name,
                root = %project.root.display(),
                descriptor = %project.descriptor_file,
                "found project"
            );
        })
        .collect();

    if projects.is_empty() {
        return Err(DiscoveryError::NoProjects(base.to_path_buf()));
    }
    Ok(projects)
}
