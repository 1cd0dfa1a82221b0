use std::time::Duration;

pub const DESCRIPTOR_EXTENSION: &str = ".uproject";

/// Top-level project folders known to hold disposable build artifacts.
pub const MAIN_FOLDERS: [&str; 4] = ["Binaries", "DerivedDataCache", "Intermediate", "Saved"];

pub const EDITOR_EXECUTABLES: [&str; 6] = [
    "UE4Editor.exe",
    "UE5Editor.exe",
    "UnrealEditor.exe",
    "UE4Editor",
    "UE5Editor",
    "UnrealEditor",
];

pub const DOCUMENTS_DIR: &str = "Documents";
pub const UNREAL_PROJECTS_DIR: &str = "Unreal Projects";

pub const CONFIG_DIR_NAME: &str = "cachewarden";
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Created in a project root while a cleanup runs. Holds the owner's pid.
pub const CLEAN_LOCK_FILE: &str = ".cachewarden.lock";
pub const STALE_LOCK_AGE: Duration = Duration::from_secs(60);

pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(3600);
pub const MIN_MONITOR_INTERVAL: Duration = Duration::from_secs(60);

pub const GIB: f64 = 1_073_741_824.0;

pub const TOKEN_SEPARATOR: char = '/';
