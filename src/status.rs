use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StatusScope {
    Global,
    Project(PathBuf),
}

impl StatusScope {
    pub fn project(path: &Path) -> Self {
        Self::Project(path.to_path_buf())
    }
}

impl fmt::Display for StatusScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Project(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub scope: StatusScope,
    pub message: String,
}

pub trait StatusSink: Send + Sync {
    fn on_status(&self, scope: &StatusScope, message: &str);
}

pub struct TracingSink;

impl StatusSink for TracingSink {
    fn on_status(&self, scope: &StatusScope, message: &str) {
        tracing::info!(target: "cachewarden::status", scope = %scope, "{message}");
    }
}

impl StatusSink for mpsc::Sender<StatusEvent> {
    fn on_status(&self, scope: &StatusScope, message: &str) {
        // Receiver gone means nobody is listening anymore.
        let _ = self.send(StatusEvent {
            scope: scope.clone(),
            message: message.to_string(),
        });
    }
}
