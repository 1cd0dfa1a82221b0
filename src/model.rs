use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectSettings {
    pub monitor_automatically: bool,
    pub allow_automatic_cleanup: bool,
    /// Only ever holds a finite, positive value.
    pub byte_limit_gb: Option<f64>,
    pub selected_items: BTreeSet<String>,
}

impl ProjectSettings {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn byte_limit(&self) -> Option<u64> {
        self.byte_limit_gb
            .map(|gb| (gb * crate::constants::GIB) as u64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub root: PathBuf,
    pub name: String,
    pub descriptor_file: String,
    pub settings: ProjectSettings,
}

impl Project {
    pub fn new(root: PathBuf, name: String, descriptor_file: String) -> Self {
        Self {
            root,
            name,
            descriptor_file,
            settings: ProjectSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupItemKind {
    MainFolderLooseFiles,
    Subfolder,
}

impl CleanupItemKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::MainFolderLooseFiles => "loose files",
            Self::Subfolder => "subfolder",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupItem {
    pub id: String,
    pub kind: CleanupItemKind,
    pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    pub path: PathBuf,
    pub cause: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    Cleaned,
    Partial,
    NothingToClean,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupResult {
    pub bytes_freed: u64,
    /// Subfolder tokens that were removed. Loose files are not listed.
    pub deleted_subfolders: Vec<String>,
    pub errors: Vec<CleanupFailure>,
}

impl CleanupResult {
    pub fn outcome(&self) -> CleanupOutcome {
        if !self.errors.is_empty() {
            CleanupOutcome::Partial
        } else if self.bytes_freed > 0 || !self.deleted_subfolders.is_empty() {
            CleanupOutcome::Cleaned
        } else {
            CleanupOutcome::NothingToClean
        }
    }
}
