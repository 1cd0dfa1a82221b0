use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EngineError {
    #[error("project is not registered: {0}")]
    ProjectNotFound(PathBuf),

    #[error("project is open in the editor: {0}")]
    ProjectOpen(PathBuf),

    #[error("no cleanup items selected for {0}")]
    NothingSelected(PathBuf),

    #[error("cleanup is not allowed for {0}")]
    CleanupNotAllowed(PathBuf),

    #[error("a cleanup is already running for {0}")]
    CleanInProgress(PathBuf),
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("projects folder not found: {0}")]
    BaseNotFound(PathBuf),

    #[error("no Unreal projects found in {0}")]
    NoProjects(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to access config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),
}
