use crate::catalog;
use crate::config::{self, AppConfig};
use crate::discovery;
use crate::engine::Engine;
use crate::model::{CleanupResult, Project};
use crate::monitor::Monitor;
use crate::registry::{AddOutcome, Registry};
use crate::size::{self, format_bytes};
use crate::status::{StatusEvent, StatusScope, StatusSink, TracingSink};
use crate::{Command, Toggle};
use anyhow::{Context, Result, anyhow, bail};
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::thread::JoinHandle;
use std::time::Duration;

const STOPPED: &str = "Monitoring: stopped";

struct App {
    config_path: PathBuf,
    config: AppConfig,
    engine: Arc<Engine>,
}

impl App {
    fn registry(&self) -> &Registry {
        self.engine.registry()
    }

    fn save(&self) {
        let snapshot = AppConfig::capture(self.registry(), &self.config.settings);
        match snapshot.save(&self.config_path) {
            Ok(()) => tracing::debug!(path = %self.config_path.display(), "config saved"),
            Err(err) => tracing::error!(error = %err, "could not save config"),
        }
    }

    fn project(&self, dir: &Path) -> Result<Arc<Project>> {
        self.registry()
            .get(dir)
            .with_context(|| format!("{} is not a tracked project", dir.display()))
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn join<T>(handle: JoinHandle<T>) -> Result<T> {
    handle.join().map_err(|_| anyhow!("worker thread panicked"))
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

pub fn run(config_path: PathBuf, command: Option<Command>) -> Result<()> {
    let config = AppConfig::load_or_default(&config_path, &TracingSink);
    let registry = Arc::new(Registry::new());
    let applied = config.apply_to(&registry);
    tracing::debug!(projects = applied, path = %config_path.display(), "config loaded");

    let foreground_monitor = match &command {
        Some(Command::Monitor { interval }) => Some(*interval),
        None if config.settings.auto_start_monitoring_on_launch => Some(None),
        _ => None,
    };

    if let Some(interval) = foreground_monitor {
        let (tx, rx) = mpsc::channel();
        let sink: Arc<dyn StatusSink> = Arc::new(tx);
        let app = App {
            config_path,
            config,
            engine: Arc::new(Engine::new(registry, sink)),
        };
        return monitor(&app, interval, &rx);
    }

    let app = App {
        config_path,
        config,
        engine: Arc::new(Engine::new(registry, Arc::new(TracingSink))),
    };

    match command {
        None | Some(Command::List) => list(&app),
        Some(Command::Scan { base }) => scan(&app, base),
        Some(Command::Add { dir }) => add(&app, &dir),
        Some(Command::Remove { dir }) => remove(&app, &dir),
        Some(Command::Items { dir }) => items(&app, &dir),
        Some(Command::Select { dir, tokens }) => select(&app, &dir, &tokens, true),
        Some(Command::Deselect { dir, tokens }) => select(&app, &dir, &tokens, false),
        Some(Command::Set {
            dir,
            monitor,
            allow_clean,
            limit,
            no_limit,
        }) => set(&app, &dir, monitor, allow_clean, limit.as_deref(), no_limit),
        Some(Command::Size { dir }) => size_cmd(&app, dir.as_deref()),
        Some(Command::Clean { dir }) => clean(&app, dir.as_deref()),
        Some(Command::Settings {
            auto_start,
            interval,
        }) => settings(app, auto_start, interval.as_deref()),
        Some(Command::Monitor { .. }) => Ok(()),
    }
}

fn scan(app: &App, base: Option<PathBuf>) -> Result<()> {
    let base = base
        .or_else(discovery::default_projects_dir)
        .context("could not determine the Unreal Projects folder, pass --base")?;

    let pb = spinner(&format!("Scanning {}...", base.display()));
    let added = join(app.engine.spawn_discovery(base));
    pb.finish_and_clear();

    let added = added??;
    if added > 0 {
        app.save();
    }
    println!(
        "{added} new project(s), {} tracked in total",
        app.registry().len()
    );
    Ok(())
}

fn add(app: &App, dir: &Path) -> Result<()> {
    match app.engine.add_manually(dir) {
        None => bail!(
            "{} is not an Unreal project folder (no .uproject file found)",
            dir.display()
        ),
        Some(AddOutcome::Inserted) => {
            app.save();
            println!("Added {}", dir.display());
        }
        Some(AddOutcome::Merged) => println!("{} is already tracked", dir.display()),
    }
    Ok(())
}

fn remove(app: &App, dir: &Path) -> Result<()> {
    let removed = app
        .registry()
        .remove(dir)
        .with_context(|| format!("{} is not a tracked project", dir.display()))?;
    app.save();
    println!("Removed {} ({})", removed.name, removed.root.display());
    Ok(())
}

fn list(app: &App) -> Result<()> {
    if app.registry().is_empty() {
        println!("No projects tracked. Run `cachewarden scan` or `cachewarden add <dir>`.");
        return Ok(());
    }

    let projects = app.registry().list_all();
    let pb = spinner("Measuring caches...");
    let totals: Vec<u64> = projects
        .par_iter()
        .map(|project| size::total_potential_size(&project.root))
        .collect();
    pb.finish_and_clear();

    for (project, total) in projects.iter().zip(totals) {
        let settings = &project.settings;
        let limit = settings
            .byte_limit_gb
            .map_or_else(|| "none".to_string(), |gb| format!("{gb} GB"));

        println!("{}  {}", project.name, project.root.display());
        println!(
            "  monitor: {}  allow-clean: {}  limit: {}  selected: {}  potential: {}",
            on_off(settings.monitor_automatically),
            on_off(settings.allow_automatic_cleanup),
            limit,
            settings.selected_items.len(),
            format_bytes(total)
        );
    }

    let interval = app.config.settings.monitoring_interval();
    println!(
        "\nMonitoring interval: {}s, auto-start: {}",
        interval.as_secs(),
        on_off(app.config.settings.auto_start_monitoring_on_launch)
    );
    Ok(())
}

fn items(app: &App, dir: &Path) -> Result<()> {
    let project = app.project(dir)?;
    let root = &project.root;
    let selected = &project.settings.selected_items;

    let pb = spinner("Reading cleanup items...");
    let found = catalog::enumerate(root);
    let sizes: Vec<u64> = found
        .items
        .par_iter()
        .map(|item| catalog::parse_token(&item.id).map_or(0, |token| size::size_of(root, &token)))
        .collect();
    pb.finish_and_clear();

    println!("{}  {}", project.name, root.display());
    for (item, bytes) in found.items.iter().zip(sizes) {
        let mark = if selected.contains(&item.id) { "x" } else { " " };
        println!(
            "  [{mark}] {:<40} {:>10}  {} ({})",
            item.id,
            format_bytes(bytes),
            item.description,
            item.kind.name()
        );
    }
    for main in &found.missing_main_folders {
        println!("  [-] {main:<40} folder not found");
    }

    let listed: Vec<&str> = found.ids().collect();
    for id in selected.iter().filter(|id| !listed.contains(&id.as_str())) {
        println!("  [x] {id:<40} not on disk");
    }
    Ok(())
}

fn select(app: &App, dir: &Path, tokens: &[String], selected: bool) -> Result<()> {
    let project = app.project(dir)?;

    let mut ids = Vec::with_capacity(tokens.len());
    for raw in tokens {
        let token = catalog::parse_token(raw).with_context(|| {
            format!("`{raw}` is not a cleanup item (expected e.g. `Saved` or `Saved/Logs`)")
        })?;
        if selected && !catalog::is_selectable(&project.root, &token) {
            bail!("`{raw}` is not a folder in {}", project.root.display());
        }
        ids.push(token.id());
    }

    let updated = app
        .registry()
        .update_settings(dir, |settings| {
            for id in &ids {
                if selected {
                    settings.selected_items.insert(id.clone());
                } else {
                    settings.selected_items.remove(id);
                }
            }
        })
        .with_context(|| format!("{} is not a tracked project", dir.display()))?;
    app.save();

    let current: Vec<&str> = updated
        .settings
        .selected_items
        .iter()
        .map(String::as_str)
        .collect();
    if current.is_empty() {
        println!("{}: nothing selected", updated.name);
    } else {
        println!("{}: {}", updated.name, current.join(", "));
    }
    Ok(())
}

fn set(
    app: &App,
    dir: &Path,
    monitor: Option<Toggle>,
    allow_clean: Option<Toggle>,
    limit: Option<&str>,
    no_limit: bool,
) -> Result<()> {
    app.project(dir)?;

    let limit = match limit {
        _ if no_limit => Some(None),
        Some(raw) => Some(Some(config::parse_gb_limit(raw).with_context(|| {
            format!("`{raw}` is not a valid GB limit (must be a number above zero)")
        })?)),
        None => None,
    };

    let updated = app
        .registry()
        .update_settings(dir, |settings| {
            if let Some(toggle) = monitor {
                settings.monitor_automatically = toggle.enabled();
            }
            if let Some(toggle) = allow_clean {
                settings.allow_automatic_cleanup = toggle.enabled();
            }
            if let Some(limit) = limit {
                settings.byte_limit_gb = limit;
            }
        })
        .with_context(|| format!("{} is not a tracked project", dir.display()))?;
    app.save();

    let settings = &updated.settings;
    println!(
        "{}: monitor {}, allow-clean {}, limit {}",
        updated.name,
        on_off(settings.monitor_automatically),
        on_off(settings.allow_automatic_cleanup),
        settings
            .byte_limit_gb
            .map_or_else(|| "none".to_string(), |gb| format!("{gb} GB"))
    );
    Ok(())
}

fn size_cmd(app: &App, dir: Option<&Path>) -> Result<()> {
    let Some(dir) = dir else {
        let pb = spinner("Analyzing projects...");
        let sizes = app.engine.analyze_all();
        pb.finish_and_clear();

        let mut total = 0;
        for (root, bytes) in sizes {
            let name = app.registry().get(&root).map(|p| p.name.clone());
            println!(
                "{:<30} {:>10}",
                name.unwrap_or_else(|| root.display().to_string()),
                format_bytes(bytes)
            );
            total += bytes;
        }
        println!("{:<30} {:>10}", "Total", format_bytes(total));
        return Ok(());
    };

    let project = app.project(dir)?;
    let pb = spinner(&format!("Sizing {}...", project.name));
    let bytes = join(app.engine.spawn_check_size(project.root.clone()));
    pb.finish_and_clear();

    println!("{}: {}", project.name, format_bytes(bytes??));
    Ok(())
}

fn print_result(name: &str, result: &CleanupResult) {
    println!(
        "{name}: freed {}, removed {} subfolder(s)",
        format_bytes(result.bytes_freed),
        result.deleted_subfolders.len()
    );
    for deleted in &result.deleted_subfolders {
        println!("  - {deleted}");
    }
    for failure in &result.errors {
        println!("  ! {}: {}", failure.path.display(), failure.cause);
    }
}

fn clean(app: &App, dir: Option<&Path>) -> Result<()> {
    let Some(dir) = dir else {
        let summary = app.engine.clean_allowed();
        println!(
            "{} project(s) cleaned, {} freed",
            summary.cleaned_projects,
            format_bytes(summary.bytes_freed)
        );
        return Ok(());
    };

    let project = app.project(dir)?;
    let pb = spinner(&format!("Cleaning {}...", project.name));
    let result = join(app.engine.spawn_clean(project.root.clone()));
    pb.finish_and_clear();

    print_result(&project.name, &result??);
    Ok(())
}

fn settings(mut app: App, auto_start: Option<Toggle>, interval: Option<&str>) -> Result<()> {
    if let Some(raw) = interval {
        let secs: u64 = raw
            .trim()
            .parse()
            .ok()
            .filter(|secs| *secs > 0)
            .with_context(|| format!("`{raw}` is not a valid number of seconds"))?;
        app.config.settings.monitoring_interval_seconds = secs.to_string();
    }
    if let Some(toggle) = auto_start {
        app.config.settings.auto_start_monitoring_on_launch = toggle.enabled();
    }
    app.save();

    println!(
        "Monitoring interval: {}s, auto-start: {}",
        app.config.settings.monitoring_interval().as_secs(),
        on_off(app.config.settings.auto_start_monitoring_on_launch)
    );
    Ok(())
}

fn monitor(app: &App, interval: Option<u64>, events: &mpsc::Receiver<StatusEvent>) -> Result<()> {
    let interval = interval.map_or_else(
        || app.config.settings.monitoring_interval(),
        Duration::from_secs,
    );

    let monitor = Arc::new(Monitor::with_config(
        Arc::clone(&app.engine),
        Some(app.config_path.clone()),
    ));
    let handler = Arc::clone(&monitor);
    ctrlc::set_handler(move || handler.stop()).context("could not install Ctrl-C handler")?;

    monitor.start(interval);
    println!("Press Ctrl-C to stop.");

    // The engine keeps a sender alive, so the loop ends on the final status
    // line rather than on disconnect.
    for event in events {
        println!("[{}] {}", event.scope, event.message);
        if event.scope == StatusScope::Global && event.message == STOPPED {
            break;
        }
    }

    monitor.join();
    tracing::debug!(state = ?monitor.state(), "monitor joined");
    Ok(())
}
