//! Freedesktop icon theme backend.
//!
//! ELF binaries carry no icon resource, so "the binary's own icon" is the
//! themed icon named after the executable, and the file-type icon is the
//! generic MIME icon for its kind.

use super::IconBackend;
use crate::bitmap::{IconSize, fit_square};
use crate::paths::{icon_base_directories, icon_theme_order, parse_icon_theme_index};
use image::RgbaImage;
use log::debug;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// One indexed icon file.
#[derive(Clone, Debug)]
struct Candidate {
    path: PathBuf,
    /// Position of the owning theme in the search order; lower wins.
    rank: usize,
    /// Nominal size parsed from a `NNxNN` directory, None for scalable/pixmaps.
    nominal: Option<u32>,
}

/// Icon name (lowercase, no ext) -> candidates.
#[derive(Default)]
struct ThemeIndex {
    entries: HashMap<String, Vec<Candidate>>,
}

impl ThemeIndex {
    fn build() -> Self {
        let mut index = ThemeIndex::default();
        let search_dirs = search_directories();
        debug!("Scanning {} icon directories...", search_dirs.len());

        for (rank, dir_path) in search_dirs {
            if !dir_path.exists() {
                continue;
            }

            let walker = walkdir::WalkDir::new(&dir_path)
                .follow_links(true)
                .max_depth(10);

            for entry in walker.into_iter().filter_map(|e| e.ok()) {
                let path = entry.path();
                let is_png = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("png"));
                if !is_png {
                    continue;
                }

                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };

                index.insert(
                    stem.to_lowercase(),
                    Candidate {
                        path: path.to_path_buf(),
                        rank,
                        nominal: nominal_size(path),
                    },
                );
            }
        }

        debug!("Indexed {} themed icon names", index.entries.len());
        index
    }

    fn insert(&mut self, name: String, candidate: Candidate) {
        self.entries.entry(name).or_default().push(candidate);
    }

    /// Pick the best file for `name`: earliest theme, then the smallest
    /// nominal size that is not below the request, then the largest.
    fn lookup(&self, name: &str, size: IconSize) -> Option<&Path> {
        let candidates = self.entries.get(name)?;
        let best_rank = candidates.iter().map(|c| c.rank).min()?;
        let wanted = size.pixels();

        candidates
            .iter()
            .filter(|c| c.rank == best_rank)
            .min_by_key(|c| match c.nominal {
                Some(n) if n >= wanted => (0, n - wanted),
                Some(n) => (1, wanted - n),
                None => (2, 0),
            })
            .map(|c| c.path.as_path())
    }
}

/// Theme directories in search order, tagged with their theme rank.
fn search_directories() -> Vec<(usize, PathBuf)> {
    let mut result = Vec::new();
    let icon_dirs = icon_base_directories();
    let theme_order = icon_theme_order();

    for (rank, theme) in theme_order.iter().enumerate() {
        for base_dir in &icon_dirs {
            let theme_root = base_dir.join(theme);
            if !theme_root.exists() {
                continue;
            }

            match parse_icon_theme_index(&theme_root) {
                Some(parsed) if !parsed.directories.is_empty() => {
                    for relative in &parsed.directories {
                        result.push((rank, theme_root.join(relative)));
                    }
                }
                _ => result.push((rank, theme_root)),
            }
        }
    }

    // Unthemed pixmaps rank after every theme
    let pixmap_rank = theme_order.len();
    for dir in icon_dirs {
        if dir.ends_with("pixmaps") {
            result.push((pixmap_rank, dir));
        }
    }

    result
}

/// "48x48/apps/foo.png" -> Some(48), "48x48@2/apps" -> Some(96)
fn nominal_size(path: &Path) -> Option<u32> {
    path.components().rev().skip(1).find_map(|component| {
        let text = component.as_os_str().to_str()?;
        let (dims, scale) = match text.split_once('@') {
            Some((dims, scale)) => (dims, scale.parse::<u32>().ok()?),
            None => (text, 1),
        };
        let (w, h) = dims.split_once('x')?;
        let w = w.parse::<u32>().ok()?;
        (h.parse::<u32>().ok()? == w).then_some(w * scale)
    })
}

/// Icon names worth trying for an executable, most specific first.
/// "Google_Chrome-stable" -> google-chrome-stable, google-chrome, google
fn name_candidates(path: &Path) -> Vec<String> {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return Vec::new();
    };
    let base = stem.trim().to_lowercase().replace([' ', '_'], "-");
    if base.is_empty() {
        return Vec::new();
    }

    let mut names = vec![base.clone()];
    let mut current = base.as_str();
    while let Some((head, _)) = current.rsplit_once('-') {
        if head.is_empty() {
            break;
        }
        names.push(head.to_string());
        current = head;
    }
    names
}

/// Generic MIME icon names for a file, by extension.
fn mime_icon_names(path: &Path) -> &'static [&'static str] {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "sh" | "bash" | "zsh" | "fish" => &["text-x-script", "application-x-shellscript"],
        "py" => &["text-x-python", "text-x-script"],
        "pl" | "rb" | "lua" => &["text-x-script"],
        "exe" | "com" | "bat" | "msi" => &["application-x-ms-dos-executable", "application-x-executable"],
        "jar" => &["application-x-java-archive"],
        "appimage" => &["application-x-iso9660-appimage", "application-x-executable"],
        "desktop" => &["application-x-desktop", "application-x-executable"],
        "so" => &["application-x-sharedlib"],
        _ => &["application-x-executable", "application-x-executable-script"],
    }
}

fn decode(path: &Path, size: IconSize) -> Option<RgbaImage> {
    let bytes = fs::read(path).ok()?;
    match image::load_from_memory(&bytes) {
        Ok(img) => Some(fit_square(&img, size)),
        Err(e) => {
            debug!("Skipping undecodable theme icon {:?}: {}", path, e);
            None
        }
    }
}

/// Icon lookups against the installed freedesktop icon themes.
pub struct XdgThemeBackend {
    index: OnceLock<ThemeIndex>,
}

impl XdgThemeBackend {
    pub fn new() -> Self {
        Self {
            index: OnceLock::new(),
        }
    }

    /// The index is built on first use; scanning themes is slow.
    fn index(&self) -> &ThemeIndex {
        self.index.get_or_init(ThemeIndex::build)
    }

    fn first_decodable<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
        size: IconSize,
    ) -> Option<RgbaImage> {
        let index = self.index();
        names
            .into_iter()
            .filter_map(|name| index.lookup(name, size))
            .find_map(|path| decode(path, size))
    }
}

impl Default for XdgThemeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl IconBackend for XdgThemeBackend {
    fn extract_resource(&self, path: &Path, size: IconSize) -> Option<RgbaImage> {
        let names = name_candidates(path);
        self.first_decodable(names.iter().map(String::as_str), size)
    }

    fn file_type_icon(&self, path: &Path, size: IconSize) -> Option<RgbaImage> {
        self.first_decodable(mime_icon_names(path).iter().copied(), size)
    }

    fn name(&self) -> &'static str {
        "xdg-theme"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(path: &str, rank: usize) -> Candidate {
        Candidate {
            path: PathBuf::from(path),
            rank,
            nominal: nominal_size(Path::new(path)),
        }
    }

    #[test]
    fn test_nominal_size_from_theme_dirs() {
        assert_eq!(nominal_size(Path::new("/usr/share/icons/hicolor/48x48/apps/a.png")), Some(48));
        assert_eq!(nominal_size(Path::new("/icons/Adwaita/16x16@2/apps/a.png")), Some(32));
        assert_eq!(nominal_size(Path::new("/icons/hicolor/scalable/apps/a.png")), None);
        assert_eq!(nominal_size(Path::new("/usr/share/pixmaps/a.png")), None);
    }

    #[test]
    fn test_name_candidates_strip_suffixes() {
        let names = name_candidates(Path::new("/opt/google/Google_Chrome-stable"));
        assert_eq!(names, vec!["google-chrome-stable", "google-chrome", "google"]);
        assert!(name_candidates(Path::new("/")).is_empty());
    }

    #[test]
    fn test_mime_icon_names_by_extension() {
        assert_eq!(mime_icon_names(Path::new("run.SH"))[0], "text-x-script");
        assert_eq!(mime_icon_names(Path::new("setup.exe"))[0], "application-x-ms-dos-executable");
        assert_eq!(mime_icon_names(Path::new("/usr/bin/true"))[0], "application-x-executable");
    }

    #[test]
    fn test_lookup_prefers_theme_rank_then_size() {
        let mut index = ThemeIndex::default();
        index.insert("app".into(), candidate("/t1/16x16/apps/app.png", 0));
        index.insert("app".into(), candidate("/t1/64x64/apps/app.png", 0));
        index.insert("app".into(), candidate("/t1/256x256/apps/app.png", 0));
        index.insert("app".into(), candidate("/t2/48x48/apps/app.png", 1));

        let found = index.lookup("app", IconSize::new(48)).unwrap();
        assert_eq!(found, Path::new("/t1/64x64/apps/app.png"));

        let found = index.lookup("app", IconSize::new(256)).unwrap();
        assert_eq!(found, Path::new("/t1/256x256/apps/app.png"));
        assert!(index.lookup("missing", IconSize::new(48)).is_none());
    }

    #[test]
    fn test_lookup_falls_back_to_largest_smaller_size() {
        let mut index = ThemeIndex::default();
        index.insert("app".into(), candidate("/t/16x16/apps/app.png", 0));
        index.insert("app".into(), candidate("/t/32x32/apps/app.png", 0));
        let found = index.lookup("app", IconSize::new(48)).unwrap();
        assert_eq!(found, Path::new("/t/32x32/apps/app.png"));
    }
}
