use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_MONITOR_INTERVAL, MIN_MONITOR_INTERVAL,
};
use crate::catalog;
use crate::error::ConfigError;
use crate::model::{Project, ProjectSettings};
use crate::registry::{ProjectKey, Provenance, Registry};
use crate::status::{StatusScope, StatusSink};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectRecord {
    pub path: String,
    pub name: String,
    #[serde(rename = "uproject_file", alias = "descriptorFile")]
    pub descriptor_file: String,
    pub monitor_auto: bool,
    pub allow_clean: bool,
    pub gb_limit: String,
    pub selected_cleanup_items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub auto_start_monitoring_on_launch: bool,
    pub monitoring_interval_seconds: String,
    /// Carried for the autostart integration; not acted on here.
    pub start_with_windows: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_start_monitoring_on_launch: false,
            monitoring_interval_seconds: DEFAULT_MONITOR_INTERVAL.as_secs().to_string(),
            start_with_windows: false,
        }
    }
}

impl Settings {
    pub fn monitoring_interval(&self) -> Duration {
        parse_interval(&self.monitoring_interval_seconds)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub projects: Vec<ProjectRecord>,
    pub settings: Settings,
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

pub fn parse_gb_limit(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|gb| gb.is_finite() && *gb > 0.0)
}

pub fn parse_interval(raw: &str) -> Duration {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Duration::from_secs(secs).max(MIN_MONITOR_INTERVAL),
        _ => {
            tracing::warn!(value = raw, "invalid monitoring interval, using default");
            DEFAULT_MONITOR_INTERVAL
        }
    }
}

impl ProjectRecord {
    pub fn from_project(project: &Project) -> Self {
        Self {
            path: project.root.display().to_string(),
            name: project.name.clone(),
            descriptor_file: project.descriptor_file.clone(),
            monitor_auto: project.settings.monitor_automatically,
            allow_clean: project.settings.allow_automatic_cleanup,
            gb_limit: project
                .settings
                .byte_limit_gb
                .map(|gb| gb.to_string())
                .unwrap_or_default(),
            selected_cleanup_items: project.settings.selected_items.iter().cloned().collect(),
        }
    }

    pub fn to_project(&self) -> Option<Project> {
        if self.path.trim().is_empty() {
            return None;
        }
        let gb_limit = parse_gb_limit(&self.gb_limit);
        if gb_limit.is_none() && !self.gb_limit.trim().is_empty() {
            tracing::warn!(project = %self.name, value = %self.gb_limit, "ignoring invalid GB limit");
        }

        Some(Project {
            root: PathBuf::from(&self.path),
            name: self.name.clone(),
            descriptor_file: self.descriptor_file.clone(),
            settings: ProjectSettings {
                monitor_automatically: self.monitor_auto,
                allow_automatic_cleanup: self.allow_clean,
                byte_limit_gb: gb_limit,
                selected_items: self
                    .selected_cleanup_items
                    .iter()
                    .map(|id| catalog::normalize_token(id))
                    .filter(|id| !id.is_empty())
                    .collect(),
            },
        })
    }
}

impl AppConfig {
    /// Missing file yields the default config.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)
    }

    pub fn load_or_default(path: &Path, sink: &dyn StatusSink) -> Self {
        Self::load(path).unwrap_or_else(|err| {
            tracing::error!(error = %err, "could not load config");
            sink.on_status(
                &StatusScope::Global,
                &format!("Could not load config, continuing with defaults: {err}"),
            );
            Self::default()
        })
    }

    pub fn apply_to(&self, registry: &Registry) -> usize {
        let mut applied = 0;
        for record in &self.projects {
            let Some(project) = record.to_project() else {
                tracing::warn!(name = %record.name, "saved project has no path, skipping");
                continue;
            };
            registry.add_or_update(project, Provenance::Persisted);
            applied += 1;
        }
        applied
    }

    pub fn sync_into(&self, registry: &Registry) -> usize {
        self.apply_to(registry);
        let saved: HashSet<ProjectKey> = self
            .projects
            .iter()
            .filter(|record| !record.path.trim().is_empty())
            .map(|record| ProjectKey::new(Path::new(&record.path)))
            .collect();
        registry.retain(|project| saved.contains(&ProjectKey::new(&project.root)))
    }

    pub fn capture(registry: &Registry, settings: &Settings) -> Self {
        Self {
            projects: registry
                .list_all()
                .iter()
                .map(|project| ProjectRecord::from_project(project))
                .collect(),
            settings: settings.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::testing::RecordingSink;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn gb_limit_validation() {
        assert_eq!(parse_gb_limit("2.5"), Some(2.5));
        assert_eq!(parse_gb_limit(" 0.0001 "), Some(0.0001));
        assert_eq!(parse_gb_limit(""), None);
        assert_eq!(parse_gb_limit("abc"), None);
        assert_eq!(parse_gb_limit("0"), None);
        assert_eq!(parse_gb_limit("-3"), None);
        assert_eq!(parse_gb_limit("NaN"), None);
        assert_eq!(parse_gb_limit("inf"), None);
    }

    #[test]
    fn interval_validation() {
        assert_eq!(parse_interval("7200"), Duration::from_secs(7200));
        assert_eq!(parse_interval("5"), MIN_MONITOR_INTERVAL);
        assert_eq!(parse_interval("0"), DEFAULT_MONITOR_INTERVAL);
        assert_eq!(parse_interval("-10"), DEFAULT_MONITOR_INTERVAL);
        assert_eq!(parse_interval("soon"), DEFAULT_MONITOR_INTERVAL);
    }

    #[test]
    fn parses_saved_schema() -> Result<()> {
        let raw = r#"{
            "projects": [{
                "path": "/p/Game/",
                "name": "Game",
                "uproject_file": "Game.uproject",
                "monitor_auto": true,
                "allow_clean": true,
                "gb_limit": "x",
                "selected_cleanup_items": ["Intermediate\\Build", "Saved"]
            }, {
                "name": "NoPath"
            }],
            "settings": {
                "auto_start_monitoring_on_launch": true,
                "monitoring_interval_seconds": "120",
                "start_with_windows": true,
                "theme": "dark"
            }
        }"#;
        let config: AppConfig = serde_json::from_str(raw)?;
        assert_eq!(config.settings.monitoring_interval(), Duration::from_secs(120));

        let registry = Registry::new();
        assert_eq!(config.apply_to(&registry), 1);
        let project = registry.get(Path::new("/p/Game")).expect("project");
        assert_eq!(project.settings.byte_limit_gb, None);
        assert!(project.settings.selected_items.contains("Intermediate/Build"));
        assert!(project.settings.monitor_automatically);
        Ok(())
    }

    #[test]
    fn save_and_load_preserve_projects() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested/config.json");

        let registry = Registry::new();
        let mut project = Project::new(
            PathBuf::from("/p/Game"),
            "Game".to_string(),
            "Game.uproject".to_string(),
        );
        project.settings.byte_limit_gb = Some(1.5);
        project.settings.selected_items.insert("Saved/Logs".to_string());
        registry.add_or_update(project, Provenance::Persisted);

        let config = AppConfig::capture(&registry, &Settings::default());
        config.save(&path)?;

        let loaded = AppConfig::load(&path)?;
        assert_eq!(loaded, config);
        assert_eq!(loaded.projects[0].gb_limit, "1.5");
        assert!(!path.with_extension("json.tmp").exists());
        Ok(())
    }

    #[test]
    fn sync_picks_up_edits_and_removals() -> Result<()> {
        let registry = Registry::new();
        for root in ["/p/Game", "/p/Gone"] {
            registry.add_or_update(
                Project::new(PathBuf::from(root), "x".to_string(), "x.uproject".to_string()),
                Provenance::Discovery,
            );
        }

        let raw = r#"{ "projects": [{
            "path": "/p/Game/", "name": "Game", "uproject_file": "Game.uproject",
            "monitor_auto": true, "gb_limit": "2",
            "selected_cleanup_items": ["Saved/Logs"] }] }"#;
        let config: AppConfig = serde_json::from_str(raw)?;

        assert_eq!(config.sync_into(&registry), 1);
        assert_eq!(registry.len(), 1);
        let game = registry.get(Path::new("/p/Game")).expect("project");
        assert!(game.settings.monitor_automatically);
        assert_eq!(game.settings.byte_limit_gb, Some(2.0));
        assert!(game.settings.selected_items.contains("Saved/Logs"));
        Ok(())
    }

    #[test]
    fn unreadable_config_falls_back_once() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json")?;

        let sink = RecordingSink::default();
        let config = AppConfig::load_or_default(&path, &sink);
        assert_eq!(config, AppConfig::default());
        assert_eq!(sink.global_messages().len(), 1);
        Ok(())
    }

    #[test]
    fn missing_config_is_default() -> Result<()> {
        let dir = tempdir()?;
        assert_eq!(
            AppConfig::load(&dir.path().join("absent.json"))?,
            AppConfig::default()
        );
        Ok(())
    }
}
