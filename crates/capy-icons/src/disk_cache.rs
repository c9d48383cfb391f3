//! Persistent PNG artifacts, one per executable.
//!
//! Artifact names are `{stem20}_{hash8}.png`: the first 20 characters of the
//! executable's base name plus the first 8 hex digits of the SHA-256 of its
//! normalized path. The same executable always maps to the same file.

use crate::bitmap::{Bitmap, IconSize, fit_square};
use crate::error::{IconError, IconResult};
use crate::source::IconSource;
use crate::working_set::{CachedIcon, IconKey};
use image::ImageFormat;
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Artifacts at or below this many bytes are leftovers of failed extractions.
pub const DEGENERATE_THRESHOLD: u64 = 200;

const STEM_CHARS: usize = 20;
const HASH_CHARS: usize = 8;
const ARTIFACT_EXT: &str = "png";
const TEMP_EXT: &str = "png.tmp";

/// File name of the artifact for `executable_path`, without directory.
pub fn artifact_file_name(executable_path: &Path) -> String {
    let key = IconKey::from_path(executable_path);

    let mut hasher = Sha256::new();
    hasher.update(key.as_str().as_bytes());
    let hash = hex::encode(hasher.finalize());

    let stem = sanitized_stem(key.as_str());
    let stem = if stem.is_empty() { "app".to_string() } else { stem };

    format!("{}_{}.{}", stem, &hash[..HASH_CHARS], ARTIFACT_EXT)
}

/// Base name without its last extension, truncated to 20 characters, with
/// characters that are illegal in file names replaced.
fn sanitized_stem(normalized: &str) -> String {
    let base = normalized.rsplit('/').next().unwrap_or_default();
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    };

    stem.chars()
        .take(STEM_CHARS)
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Result of [`IconDiskCache::ensure_icon`].
#[derive(Clone, Debug)]
pub struct EnsureOutcome {
    /// Working-set key for this icon.
    pub key: IconKey,
    pub icon: CachedIcon,
    /// True when IconSource had to run.
    pub extracted: bool,
    /// True when a fresh artifact was written to disk.
    pub persisted: bool,
}

pub struct IconDiskCache {
    base_dir: PathBuf,
    icon_size: IconSize,
    degenerate_threshold: u64,
}

impl IconDiskCache {
    pub fn new(base_dir: impl Into<PathBuf>, icon_size: IconSize) -> Self {
        Self {
            base_dir: base_dir.into(),
            icon_size,
            degenerate_threshold: DEGENERATE_THRESHOLD,
        }
    }

    pub fn with_degenerate_threshold(mut self, bytes: u64) -> Self {
        self.degenerate_threshold = bytes;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn icon_size(&self) -> IconSize {
        self.icon_size
    }

    /// Deterministic artifact path for an executable.
    pub fn path_for(&self, executable_path: &Path, base_dir: Option<&Path>) -> PathBuf {
        base_dir
            .unwrap_or(&self.base_dir)
            .join(artifact_file_name(executable_path))
    }

    /// Whether `path` is one of this cache's artifacts rather than a foreign
    /// icon file. Only artifacts are ever deleted for regeneration.
    pub fn is_artifact(&self, path: &Path) -> bool {
        let is_png = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(ARTIFACT_EXT));
        is_png
            && path
                .parent()
                .is_some_and(|dir| IconKey::from_path(dir) == IconKey::from_path(&self.base_dir))
    }

    /// Whether a usable (non-degenerate) artifact exists.
    pub fn has(&self, disk_path: &Path) -> bool {
        fs::metadata(disk_path)
            .map(|m| m.is_file() && m.len() > self.degenerate_threshold)
            .unwrap_or(false)
    }

    /// Load an artifact. Degenerate or corrupt files are deleted so the next
    /// `ensure` regenerates them.
    pub fn load(&self, disk_path: &Path) -> Option<Bitmap> {
        match self.try_load(disk_path) {
            Ok(bitmap) => Some(bitmap),
            Err(e) => {
                self.discard_if_repairable(disk_path, &e);
                None
            }
        }
    }

    /// Load without side effects.
    pub fn try_load(&self, disk_path: &Path) -> IconResult<Bitmap> {
        // size is a cheap pre-filter, decoding is the real check
        let size = fs::metadata(disk_path)?.len();
        if size <= self.degenerate_threshold {
            return Err(IconError::Degenerate {
                path: disk_path.to_path_buf(),
                size,
            });
        }

        let bytes = fs::read(disk_path)?;
        let image = image::load_from_memory(&bytes).map_err(|e| IconError::Corrupt {
            path: disk_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(Arc::new(fit_square(&image, self.icon_size)))
    }

    /// Write `bitmap` as PNG. Failure is advisory: the caller keeps using
    /// the in-memory bitmap.
    pub fn save(&self, disk_path: &Path, bitmap: &Bitmap) -> bool {
        match self.try_save(disk_path, bitmap) {
            Ok(()) => {
                debug!("Icon saved to {:?}", disk_path);
                true
            }
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    pub fn try_save(&self, disk_path: &Path, bitmap: &Bitmap) -> IconResult<()> {
        let persistence = |source: IconError| IconError::Persistence {
            path: disk_path.to_path_buf(),
            source: Box::new(source),
        };

        if let Some(parent) = disk_path.parent() {
            fs::create_dir_all(parent).map_err(|e| persistence(e.into()))?;
        }

        // write beside the target and rename, so readers never see half a PNG
        let temp = disk_path.with_extension(TEMP_EXT);
        if let Err(e) = bitmap.save_with_format(&temp, ImageFormat::Png) {
            let _ = fs::remove_file(&temp);
            return Err(persistence(e.into()));
        }
        if let Err(e) = fs::rename(&temp, disk_path) {
            let _ = fs::remove_file(&temp);
            return Err(persistence(e.into()));
        }
        Ok(())
    }

    /// Make sure an artifact exists for `executable_path` and return its path.
    pub fn ensure(
        &self,
        executable_path: &Path,
        base_dir: Option<&Path>,
        source: &IconSource,
    ) -> PathBuf {
        self.ensure_in(executable_path, None, base_dir, source)
            .icon
            .disk_path
    }

    /// Load-or-extract-and-save, returning the decoded icon as well.
    ///
    /// A readable `hint` short-circuits everything. Otherwise a valid artifact
    /// is a cache hit; a missing, degenerate or corrupt one is (re)generated.
    pub fn ensure_icon(
        &self,
        executable_path: &Path,
        hint: Option<&Path>,
        source: &IconSource,
    ) -> EnsureOutcome {
        self.ensure_in(executable_path, hint, None, source)
    }

    fn ensure_in(
        &self,
        executable_path: &Path,
        hint: Option<&Path>,
        base_dir: Option<&Path>,
        source: &IconSource,
    ) -> EnsureOutcome {
        let source_path = Some(executable_path.to_path_buf());

        if let Some(hint) = hint.filter(|h| !h.as_os_str().is_empty()) {
            // never delete a hint, it may be a user-chosen file
            match self.try_load(hint) {
                Ok(bitmap) => {
                    return EnsureOutcome {
                        key: IconKey::from_path(hint),
                        icon: CachedIcon {
                            source_path,
                            disk_path: hint.to_path_buf(),
                            bitmap,
                            fallback: false,
                        },
                        extracted: false,
                        persisted: false,
                    };
                }
                Err(e) => debug!("Ignoring icon hint {:?}: {}", hint, e),
            }
        }

        let disk_path = self.path_for(executable_path, base_dir);
        let key = IconKey::from_path(&disk_path);

        match self.try_load(&disk_path) {
            Ok(bitmap) => {
                debug!("Icon cache hit: {:?}", disk_path);
                return EnsureOutcome {
                    key,
                    icon: CachedIcon {
                        source_path,
                        disk_path,
                        bitmap,
                        fallback: false,
                    },
                    extracted: false,
                    persisted: false,
                };
            }
            Err(e) => self.discard_if_repairable(&disk_path, &e),
        }

        let bitmap = source.extract(executable_path);

        // an unreachable executable (unmounted drive, stale entry) gets the
        // placeholder for now but no artifact, so it is retried later
        let persisted = executable_path.exists() && self.save(&disk_path, &bitmap);

        EnsureOutcome {
            key,
            icon: CachedIcon {
                source_path,
                disk_path,
                bitmap,
                fallback: false,
            },
            extracted: true,
            persisted,
        }
    }

    fn discard_if_repairable(&self, disk_path: &Path, error: &IconError) {
        match error {
            e if e.is_repairable() => {
                warn!("{}; deleting for regeneration", e);
                if let Err(e) = fs::remove_file(disk_path) {
                    if e.kind() != ErrorKind::NotFound {
                        warn!("Failed to delete {:?}: {}", disk_path, e);
                    }
                }
            }
            IconError::Io(e) if e.kind() == ErrorKind::NotFound => {}
            e => debug!("Icon artifact {:?} unavailable: {}", disk_path, e),
        }
    }

    /// Artifact files directly under the base dir.
    fn artifacts(&self) -> Vec<PathBuf> {
        walkdir::WalkDir::new(&self.base_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                let name = p.to_string_lossy();
                name.ends_with(".png") || name.ends_with(".png.tmp")
            })
            .collect()
    }

    /// Delete every artifact. Returns how many files were removed.
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        for path in self.artifacts() {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to delete {:?}: {}", path, e),
            }
        }
        info!("Cleared {} icon artifacts from {:?}", removed, self.base_dir);
        removed
    }

    /// Delete degenerate, corrupt and orphaned temp artifacts.
    pub fn prune(&self) -> usize {
        let mut removed = 0;
        for path in self.artifacts() {
            let stale_temp = path.to_string_lossy().ends_with(".png.tmp");
            let broken = !stale_temp
                && self
                    .try_load(&path)
                    .err()
                    .is_some_and(|e| e.is_repairable());

            if (stale_temp || broken) && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        info!("Pruned {} broken icon artifacts from {:?}", removed, self.base_dir);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::NullBackend;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn cache(dir: &TempDir) -> IconDiskCache {
        IconDiskCache::new(dir.path().join("icons"), IconSize::new(32))
    }

    fn source() -> IconSource {
        IconSource::with_backend(Box::new(NullBackend), IconSize::new(32))
    }

    fn exe(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, b"MZ").unwrap();
        path
    }

    #[test]
    fn test_artifact_name_shape() {
        let name = artifact_file_name(Path::new("/opt/Some Very Long Application Name/bin/app-launcher.exe"));
        assert!(name.starts_with("app-launcher_"), "{name}");
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), "app-launcher_".len() + 8 + 4);

        let long = artifact_file_name(Path::new("/x/abcdefghijklmnopqrstuvwxyz.exe"));
        assert!(long.starts_with("abcdefghijklmnopqrst_"), "{long}");
    }

    #[test]
    fn test_artifact_name_is_deterministic_and_separator_agnostic() {
        let a = artifact_file_name(Path::new("C:\\Tools\\tool.exe"));
        let b = artifact_file_name(Path::new("C:/Tools/tool.exe"));
        assert_eq!(a, b);
        assert_ne!(a, artifact_file_name(Path::new("C:/Tools2/tool.exe")));
    }

    #[test]
    fn test_artifact_name_handles_unusual_stems() {
        assert!(artifact_file_name(Path::new("")).starts_with("app_"));
        assert!(artifact_file_name(Path::new("/opt/.hidden")).starts_with(".hidden_"));
        let name = artifact_file_name(Path::new("/opt/アプリケーション.exe"));
        assert!(name.starts_with("アプリケーション_"));
    }

    #[test]
    fn test_is_artifact_only_under_base_dir() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let exe = dir.path().join("tool");

        assert!(cache.is_artifact(&cache.path_for(&exe, None)));
        assert!(!cache.is_artifact(&dir.path().join("tool.png")));
        assert!(!cache.is_artifact(&cache.base_dir().join("sub").join("tool.png")));
        assert!(!cache.is_artifact(&cache.base_dir().join("notes.txt")));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let path = cache.base_dir().join("x_00000000.png");
        let bitmap: Bitmap = Arc::new(crate::bitmap::placeholder(IconSize::new(32)));

        assert!(cache.save(&path, &bitmap));
        assert!(cache.has(&path));
        let loaded = cache.load(&path).unwrap();
        assert_eq!(loaded.as_raw(), bitmap.as_raw());
        assert!(!path.with_extension(TEMP_EXT).exists());
    }

    #[test]
    fn test_load_resizes_foreign_images() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let path = dir.path().join("big.png");
        let mut big = RgbaImage::new(128, 128);
        for (x, y, px) in big.enumerate_pixels_mut() {
            *px = Rgba([x as u8, y as u8, 7, 255]);
        }
        big.save(&path).unwrap();

        assert_eq!(cache.load(&path).unwrap().dimensions(), (32, 32));
    }

    #[test]
    fn test_degenerate_artifact_is_deleted_on_load() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        fs::create_dir_all(cache.base_dir()).unwrap();
        let path = cache.base_dir().join("tiny_00000000.png");
        fs::write(&path, [0u8; 150]).unwrap();

        assert!(!cache.has(&path));
        assert!(cache.load(&path).is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_artifact_is_deleted_on_load() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        fs::create_dir_all(cache.base_dir()).unwrap();
        let path = cache.base_dir().join("junk_00000000.png");
        fs::write(&path, vec![0xAB; 4096]).unwrap();

        assert!(cache.has(&path));
        assert!(matches!(cache.try_load(&path), Err(IconError::Corrupt { .. })));
        assert!(cache.load(&path).is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_save_failure_is_reported_not_fatal() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"file").unwrap();
        let cache = IconDiskCache::new(&blocker, IconSize::new(32));
        let bitmap: Bitmap = Arc::new(crate::bitmap::placeholder(IconSize::new(32)));

        assert!(!cache.save(&blocker.join("a.png"), &bitmap));
        assert!(matches!(
            cache.try_save(&blocker.join("a.png"), &bitmap),
            Err(IconError::Persistence { .. })
        ));
    }

    #[test]
    fn test_ensure_extracts_then_hits() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let source = source();
        let exe = exe(&dir, "tool.exe");

        let first = cache.ensure_icon(&exe, None, &source);
        assert!(first.extracted && first.persisted);
        assert!(cache.has(&first.icon.disk_path));

        let second = cache.ensure_icon(&exe, None, &source);
        assert!(!second.extracted);
        assert_eq!(second.key, first.key);
        assert_eq!(source.stats().requests, 1);
    }

    #[test]
    fn test_ensure_uses_readable_hint() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let source = source();
        let hint = dir.path().join("custom.png");
        crate::bitmap::placeholder(IconSize::new(64)).save(&hint).unwrap();

        let outcome = cache.ensure_icon(Path::new("/nowhere/app"), Some(&hint), &source);
        assert!(!outcome.extracted);
        assert_eq!(outcome.icon.disk_path, hint);
        assert_eq!(outcome.key, IconKey::from_path(&hint));
        assert_eq!(source.stats().requests, 0);
    }

    #[test]
    fn test_ensure_ignores_but_keeps_degenerate_hint() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let source = source();
        let exe = exe(&dir, "tool");
        let hint = dir.path().join("tiny.png");
        fs::write(&hint, [1u8; 10]).unwrap();

        let outcome = cache.ensure_icon(&exe, Some(&hint), &source);
        assert!(outcome.extracted);
        assert_eq!(outcome.icon.disk_path, cache.path_for(&exe, None));
        assert!(hint.exists());
    }

    #[test]
    fn test_ensure_does_not_persist_for_missing_executable() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let missing = dir.path().join("gone.exe");

        let outcome = cache.ensure_icon(&missing, None, &source());
        assert!(outcome.extracted);
        assert!(!outcome.persisted);
        assert!(!outcome.icon.disk_path.exists());
        assert_eq!(outcome.icon.size_pixels(), (32, 32));
    }

    #[test]
    fn test_ensure_honors_explicit_base_dir() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let other = dir.path().join("elsewhere");
        let exe = exe(&dir, "tool");

        let path = cache.ensure(&exe, Some(&other), &source());
        assert!(path.starts_with(&other));
        assert!(cache.has(&path));
    }

    #[test]
    fn test_clear_and_prune() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let source = source();
        for name in ["a", "b", "c"] {
            cache.ensure(&exe(&dir, name), None, &source);
        }
        fs::write(cache.base_dir().join("bad_00000000.png"), [0u8; 12]).unwrap();
        fs::write(cache.base_dir().join("half_00000000.png.tmp"), [0u8; 900]).unwrap();
        fs::write(cache.base_dir().join("notes.txt"), b"keep").unwrap();

        assert_eq!(cache.prune(), 2);
        assert_eq!(cache.clear(), 3);
        assert!(cache.base_dir().join("notes.txt").exists());
    }

    #[test]
    fn test_clear_missing_dir_is_noop() {
        let dir = TempDir::new().unwrap();
        assert_eq!(cache(&dir).clear(), 0);
    }
}
