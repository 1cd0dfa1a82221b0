use crate::constants::{MAIN_FOLDERS, TOKEN_SEPARATOR};
use crate::model::{CleanupItem, CleanupItemKind};
use crate::size;
use std::fs;
use std::path::{Path, PathBuf};

const UNCLASSIFIED: &str = "Unclassified subfolder";

static DESCRIPTIONS: &[(&str, &str)] = &[
    ("Binaries", "Loose files in Binaries (compiled modules, PDBs)"),
    ("DerivedDataCache", "Loose files in DerivedDataCache"),
    ("Intermediate", "Loose files in Intermediate"),
    ("Saved", "Loose files in Saved"),
    ("Binaries/Win64", "Windows editor and game binaries"),
    ("Binaries/Linux", "Linux editor and game binaries"),
    ("Binaries/Mac", "macOS editor and game binaries"),
    ("DerivedDataCache/VT", "Virtual texture cache"),
    ("Intermediate/Build", "Build intermediates (object files, generated code)"),
    ("Intermediate/ProjectFiles", "Generated IDE project files"),
    ("Intermediate/ShaderAutogen", "Auto-generated shader sources"),
    ("Intermediate/Config", "Intermediate config cache"),
    ("Intermediate/Plugins", "Plugin build intermediates"),
    ("Intermediate/DatasmithContentTemp", "Datasmith import scratch data"),
    ("Intermediate/CachedAssetRegistry", "Cached asset registry"),
    ("Saved/Logs", "Editor and game logs"),
    ("Saved/Crashes", "Crash reports and minidumps"),
    ("Saved/Autosaves", "Editor autosaves"),
    ("Saved/Backup", "Asset backups"),
    ("Saved/Config", "User config overrides (editor preferences)"),
    ("Saved/SaveGames", "Save game slots"),
    ("Saved/StagedBuilds", "Staged packaged builds"),
    ("Saved/Cooked", "Cooked content"),
    ("Saved/Shaders", "Shader debug output"),
    ("Saved/ShaderDebugInfo", "Shader debug info"),
    ("Saved/MaterialStats", "Material statistics"),
];

pub fn describe(token: &str) -> &'static str {
    DESCRIPTIONS
        .iter()
        .find(|(known, _)| *known == token)
        .map_or(UNCLASSIFIED, |&(_, description)| description)
}

pub fn normalize_token(token: &str) -> String {
    token
        .trim()
        .replace('\\', "/")
        .trim_end_matches(TOKEN_SEPARATOR)
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemToken {
    MainFolder(&'static str),
    Subfolder { main: &'static str, name: String },
}

impl ItemToken {
    pub fn main_folder(&self) -> &'static str {
        match self {
            Self::MainFolder(main) | Self::Subfolder { main, .. } => main,
        }
    }

    pub fn id(&self) -> String {
        match self {
            Self::MainFolder(main) => (*main).to_string(),
            Self::Subfolder { main, name } => format!("{main}{TOKEN_SEPARATOR}{name}"),
        }
    }

    pub fn path(&self, root: &Path) -> PathBuf {
        match self {
            Self::MainFolder(main) => root.join(main),
            Self::Subfolder { main, name } => root.join(main).join(name),
        }
    }

    pub fn kind(&self) -> CleanupItemKind {
        match self {
            Self::MainFolder(_) => CleanupItemKind::MainFolderLooseFiles,
            Self::Subfolder { .. } => CleanupItemKind::Subfolder,
        }
    }
}

fn known_main_folder(name: &str) -> Option<&'static str> {
    MAIN_FOLDERS.iter().copied().find(|main| *main == name)
}

/// Parses a token. Tokens outside the main folders, nested deeper than one
/// level, or trying to climb out of the project are rejected.
pub fn parse_token(token: &str) -> Option<ItemToken> {
    let token = normalize_token(token);
    let mut parts = token.split(TOKEN_SEPARATOR);
    let main = known_main_folder(parts.next()?)?;

    match (parts.next(), parts.next()) {
        (None, _) => Some(ItemToken::MainFolder(main)),
        (Some(name), None) if !name.is_empty() && name != "." && name != ".." => {
            Some(ItemToken::Subfolder {
                main,
                name: name.to_string(),
            })
        }
        _ => None,
    }
}

pub fn is_selectable(root: &Path, token: &ItemToken) -> bool {
    match token {
        ItemToken::MainFolder(_) => true,
        ItemToken::Subfolder { .. } => {
            let path = token.path(root);
            fs::symlink_metadata(&path).is_err() || size::is_real_dir(&path)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    pub items: Vec<CleanupItem>,
    /// Main folders that do not exist in this project. Not an error.
    pub missing_main_folders: Vec<&'static str>,
}

impl Catalog {
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.id.as_str())
    }
}

fn child_directories(dir: &Path) -> Vec<String> {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return vec![];
    };

    // file_type() does not follow links, so symlinked directories are left out.
    let mut names: Vec<String> = read_dir
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn item(token: &ItemToken) -> CleanupItem {
    let id = token.id();
    CleanupItem {
        description: describe(&id),
        kind: token.kind(),
        id,
    }
}

pub fn enumerate(root: &Path) -> Catalog {
    let mut catalog = Catalog::default();

    for main in MAIN_FOLDERS {
        let main_path = root.join(main);
        if !main_path.is_dir() {
            tracing::debug!(folder = %main_path.display(), "folder not found");
            catalog.missing_main_folders.push(main);
            continue;
        }

        catalog.items.push(item(&ItemToken::MainFolder(main)));
        for name in child_directories(&main_path) {
            catalog.items.push(item(&ItemToken::Subfolder { main, name }));
        }
    }

    catalog
}
