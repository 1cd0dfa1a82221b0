use crate::cleaner::{self, CleanLocks};
use crate::config::AppConfig;
use crate::discovery;
use crate::error::{DiscoveryError, EngineError};
use crate::guard::{self, ProcessSource, SystemProcesses};
use crate::model::{CleanupOutcome, CleanupResult, Project};
use crate::registry::{AddOutcome, Provenance, Registry};
use crate::size::{self, format_bytes};
use crate::status::{StatusScope, StatusSink};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanSummary {
    pub cleaned_projects: usize,
    pub bytes_freed: u64,
}

pub struct Engine {
    pub(crate) registry: Arc<Registry>,
    pub(crate) sink: Arc<dyn StatusSink>,
    pub(crate) processes: Arc<dyn ProcessSource>,
    pub(crate) locks: CleanLocks,
}

impl Engine {
    pub fn new(registry: Arc<Registry>, sink: Arc<dyn StatusSink>) -> Self {
        Self::with_processes(registry, sink, Arc::new(SystemProcesses))
    }

    pub fn with_processes(
        registry: Arc<Registry>,
        sink: Arc<dyn StatusSink>,
        processes: Arc<dyn ProcessSource>,
    ) -> Self {
        Self {
            registry,
            sink,
            processes,
            locks: CleanLocks::default(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub(crate) fn report(&self, root: &Path, message: &str) {
        self.sink.on_status(&StatusScope::project(root), message);
    }

    pub(crate) fn report_global(&self, message: &str) {
        self.sink.on_status(&StatusScope::Global, message);
    }

    fn project(&self, path: &Path) -> Result<Arc<Project>, EngineError> {
        self.registry
            .get(path)
            .ok_or_else(|| EngineError::ProjectNotFound(path.to_path_buf()))
    }

    pub fn is_open(&self, root: &Path) -> bool {
        guard::is_open_with(root, self.processes.as_ref())
    }

    pub fn check_size(&self, path: &Path) -> Result<u64, EngineError> {
        let project = self.project(path)?;
        let root = &project.root;
        let selected: Vec<String> = project.settings.selected_items.iter().cloned().collect();

        if selected.is_empty() {
            self.report(root, "Cache: nothing selected");
            return Err(EngineError::NothingSelected(root.clone()));
        }

        self.report(root, "Cache: checking...");
        let bytes = size::size_of_selection(root, &selected);
        self.report(root, &format!("Cache: {}", format_bytes(bytes)));
        Ok(bytes)
    }

    pub fn clean_project(&self, path: &Path) -> Result<CleanupResult, EngineError> {
        let project = self.project(path)?;
        let root = &project.root;

        if !project.settings.allow_automatic_cleanup {
            self.report(root, "Cleanup not allowed (enable allow-clean first)");
            return Err(EngineError::CleanupNotAllowed(root.clone()));
        }
        if project.settings.selected_items.is_empty() {
            self.report(root, "Cache: nothing selected");
            return Err(EngineError::NothingSelected(root.clone()));
        }
        if self.is_open(root) {
            self.report(root, "Cache: skipped, project is open");
            return Err(EngineError::ProjectOpen(root.clone()));
        }

        self.clean_selection(&project, false)
    }

    pub(crate) fn clean_selection(
        &self,
        project: &Project,
        automatic: bool,
    ) -> Result<CleanupResult, EngineError> {
        let root = &project.root;
        let Some(_permit) = self.locks.try_acquire(root) else {
            self.report(root, "Cache: cleanup already running");
            return Err(EngineError::CleanInProgress(root.clone()));
        };

        let selected: Vec<String> = project.settings.selected_items.iter().cloned().collect();
        self.report(
            root,
            if automatic {
                "Cache: (auto) cleaning..."
            } else {
                "Cache: cleaning..."
            },
        );

        let result = cleaner::clean(root, &selected);
        let prefix = if automatic { "Auto: " } else { "" };
        let freed = format_bytes(result.bytes_freed);
        let message = match result.outcome() {
            CleanupOutcome::Partial => {
                let causes: Vec<String> = result
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.path.display(), e.cause))
                    .collect();
                format!(
                    "{prefix}Partial cleanup. Freed: {freed}. Errors: {}",
                    causes.join("; ")
                )
            }
            CleanupOutcome::Cleaned => format!("{prefix}Cleaned! Freed: {freed}."),
            CleanupOutcome::NothingToClean => {
                format!("{prefix}Nothing to clean or folders not found.")
            }
        };
        self.report(root, &message);

        if result.outcome() != CleanupOutcome::NothingToClean {
            let remaining = size::size_of_selection(root, &selected);
            self.report(root, &format!("Cache now: {}", format_bytes(remaining)));
        }
        Ok(result)
    }

    pub fn analyze_all(&self) -> Vec<(PathBuf, u64)> {
        let projects = self.registry.list_all();
        if projects.is_empty() {
            self.report_global("No projects to analyze.");
            return vec![];
        }

        self.report_global(&format!("Analyzing {} project(s)...", projects.len()));
        let sizes: Vec<(PathBuf, u64)> = projects
            .iter()
            .filter_map(|p| self.check_size(&p.root).ok().map(|b| (p.root.clone(), b)))
            .collect();
        self.report_global("Analysis finished.");
        sizes
    }

    pub fn clean_allowed(&self) -> CleanSummary {
        let projects = self.registry.list_all();
        if projects.is_empty() {
            self.report_global("No projects to clean.");
            return CleanSummary::default();
        }

        self.report_global("Cleaning allowed projects...");
        let mut summary = CleanSummary::default();
        for project in projects
            .iter()
            .filter(|p| p.settings.allow_automatic_cleanup)
        {
            match self.clean_project(&project.root) {
                Ok(result) if result.outcome() == CleanupOutcome::Cleaned => {
                    summary.cleaned_projects += 1;
                    summary.bytes_freed += result.bytes_freed;
                }
                Ok(_) => {}
                Err(err) => tracing::info!(project = %project.name, reason = %err, "skipped"),
            }
        }

        let status = if summary.bytes_freed > 0 {
            format!(
                "Done. {} project(s) cleaned. Total freed: {}.",
                summary.cleaned_projects,
                format_bytes(summary.bytes_freed)
            )
        } else {
            format!("Done. {} project(s) cleaned.", summary.cleaned_projects)
        };
        self.report_global(&status);
        summary
    }

    /// Scans `base` and merges what it finds without touching saved
    /// settings. Returns how many projects were new.
    pub fn discover_into_registry(&self, base: &Path) -> Result<usize, DiscoveryError> {
        self.report_global(&format!("Scanning {}...", base.display()));
        let projects = match discovery::discover(base) {
            Ok(projects) => projects,
            Err(err) => {
                self.report_global(&format!("Discovery: {err}"));
                return Err(err);
            }
        };

        let found = projects.len();
        let added = projects
            .into_iter()
            .filter(|p| {
                self.registry.add_or_update(p.clone(), Provenance::Discovery)
                    == AddOutcome::Inserted
            })
            .count();

        if added > 0 {
            self.report_global(&format!("{added} new project(s) added."));
        } else {
            self.report_global(&format!("{found} project(s) found, all already listed."));
        }
        Ok(added)
    }

    pub fn add_manually(&self, path: &Path) -> Option<AddOutcome> {
        let Some(project) = discovery::validate_project_folder(path) else {
            self.report_global(&format!(
                "{} is not a valid Unreal project folder.",
                path.display()
            ));
            return None;
        };

        let name = project.name.clone();
        let outcome = self.registry.add_or_update(project, Provenance::Discovery);
        match outcome {
            AddOutcome::Inserted => self.report_global(&format!("Project '{name}' added.")),
            AddOutcome::Merged => {
                self.report_global(&format!("Project '{name}' is already listed."));
            }
        }
        Some(outcome)
    }

    pub fn reload_config(&self, path: &Path) -> bool {
        match AppConfig::load(path) {
            Ok(config) => {
                let dropped = config.sync_into(&self.registry);
                tracing::debug!(dropped, "registry synced from config");
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not reload config, keeping current projects");
                false
            }
        }
    }

    pub fn spawn_check_size(self: &Arc<Self>, path: PathBuf) -> JoinHandle<Result<u64, EngineError>> {
        let engine = Arc::clone(self);
        thread::spawn(move || engine.check_size(&path))
    }

    pub fn spawn_clean(
        self: &Arc<Self>,
        path: PathBuf,
    ) -> JoinHandle<Result<CleanupResult, EngineError>> {
        let engine = Arc::clone(self);
        thread::spawn(move || engine.clean_project(&path))
    }

    pub fn spawn_discovery(
        self: &Arc<Self>,
        base: PathBuf,
    ) -> JoinHandle<Result<usize, DiscoveryError>> {
        let engine = Arc::clone(self);
        thread::spawn(move || engine.discover_into_registry(&base))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Engine;
    use crate::guard::testing::FakeProcesses;
    use crate::model::Project;
    use crate::registry::{Provenance, Registry};
    use crate::status::testing::RecordingSink;
    use anyhow::Result;
    use std::fs::{self, File};
    use std::io::Write;
    use std::path::Path;
    use std::sync::Arc;

    pub struct Harness {
        pub engine: Arc<Engine>,
        pub sink: Arc<RecordingSink>,
        pub processes: Arc<FakeProcesses>,
    }

    pub fn harness() -> Harness {
        let sink = Arc::new(RecordingSink::default());
        let processes = Arc::new(FakeProcesses::default());
        let engine = Arc::new(Engine::with_processes(
            Arc::new(Registry::new()),
            sink.clone(),
            processes.clone(),
        ));
        Harness {
            engine,
            sink,
            processes,
        }
    }

    pub fn write_file(path: &Path, len: usize) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        file.write_all(&vec![0u8; len])?;
        Ok(())
    }

    pub fn register_project(
        harness: &Harness,
        root: &Path,
        bytes: usize,
        edit: impl FnOnce(&mut Project),
    ) -> Result<Arc<Project>> {
        fs::write(root.join("Game.uproject"), "{}")?;
        write_file(&root.join("Intermediate/Build/obj.o"), bytes)?;

        let mut project = crate::discovery::validate_project_folder(root).expect("project");
        edit(&mut project);
        harness
            .engine
            .registry()
            .add_or_update(project, Provenance::Persisted);
        Ok(harness.engine.registry().get(root).expect("registered"))
    }

    pub fn editor_opens(harness: &Harness, root: &Path) {
        let descriptor = root.join("Game.uproject").display().to_string();
        harness
            .processes
            .launch(&["UnrealEditor.exe", descriptor.as_str()]);
    }
}
