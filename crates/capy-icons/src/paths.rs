//! Path helpers: default cache locations and XDG icon theme directories.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "CapyLauncher";

/// Default artifact directory: `icons` beside the running executable.
/// Falls back to the user cache dir when the executable path is unknown.
pub fn default_icon_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("icons")))
        .unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR_NAME)
                .join("icons")
        })
}

/// Default engine config file, e.g. ~/.config/CapyLauncher/icons.json
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join("icons.json")
}

/// Icon search roots in XDG order: user data dir, `~/.icons`, every
/// `XDG_DATA_DIRS` entry (icons then pixmaps), then Flatpak and Snap exports.
pub fn icon_base_directories() -> Vec<PathBuf> {
    let home = dirs::home_dir().unwrap_or_default();
    let data_home = dirs::data_dir().unwrap_or_else(|| home.join(".local/share"));
    let data_dirs = std::env::var("XDG_DATA_DIRS")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "/usr/local/share:/usr/share".to_string());

    let mut roots = vec![data_home.join("icons"), home.join(".icons")];
    for data_dir in data_dirs.split(':').filter(|d| !d.is_empty()) {
        let data_dir = Path::new(data_dir);
        roots.push(data_dir.join("icons"));
        roots.push(data_dir.join("pixmaps"));
    }

    let pixmaps = PathBuf::from("/usr/share/pixmaps");
    if !roots.contains(&pixmaps) {
        roots.push(pixmaps);
    }
    roots.extend([
        PathBuf::from("/var/lib/flatpak/exports/share/icons"),
        data_home.join("flatpak/exports/share/icons"),
        PathBuf::from("/var/lib/snapd/desktop/icons"),
    ]);

    roots
}

/// Parsed index.theme content.
pub struct ParsedIconTheme {
    pub directories: Vec<String>,
    pub inherits: Vec<String>,
}

pub fn parse_icon_theme_index(theme_root: &Path) -> Option<ParsedIconTheme> {
    let content = fs::read_to_string(theme_root.join("index.theme")).ok()?;
    Some(parse_icon_theme_str(&content))
}

fn parse_icon_theme_str(content: &str) -> ParsedIconTheme {
    let mut directories = Vec::new();
    let mut inherits = Vec::new();
    let mut section = String::new();

    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            section = line.to_string();
            continue;
        }

        if section.eq_ignore_ascii_case("[Icon Theme]") {
            if let Some((k, v)) = line.split_once('=') {
                let values = v
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty());
                match k.trim() {
                    "Directories" => directories = values.collect(),
                    "Inherits" => inherits = values.collect(),
                    _ => {}
                }
            }
        }
    }

    ParsedIconTheme {
        directories,
        inherits,
    }
}

/// Ordered list of icon themes to search, user theme first, hicolor last.
pub fn icon_theme_order() -> Vec<String> {
    let mut themes = Vec::new();

    if let Ok(theme) = std::env::var("ICON_THEME") {
        themes.push(theme);
    }
    themes.push("Adwaita".to_string());
    themes.push("hicolor".to_string());

    resolve_theme_inheritance(themes)
}

fn resolve_theme_inheritance(start_themes: Vec<String>) -> Vec<String> {
    let mut result = Vec::new();
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from(start_themes);
    let base_dirs = icon_base_directories();

    while let Some(theme) = queue.pop_front() {
        if !visited.insert(theme.clone()) {
            continue;
        }
        result.push(theme.clone());

        // first installed copy of a theme wins
        let parents = base_dirs
            .iter()
            .find_map(|base| parse_icon_theme_index(&base.join(&theme)))
            .map(|parsed| parsed.inherits)
            .unwrap_or_default();
        queue.extend(parents.into_iter().filter(|p| !visited.contains(p)));
    }

    // hicolor is the mandated last resort
    if let Some(pos) = result.iter().position(|t| t == "hicolor") {
        let hicolor = result.remove(pos);
        result.push(hicolor);
    }

    result
}
