//! Paint-path lookups.
//!
//! `resolve` is called from draw callbacks, so a working-set hit costs one
//! micro-cache lookup plus one map lookup. A miss fills the working set, and
//! the next call for the same path never touches the disk.

use crate::bitmap::Bitmap;
use crate::builder::WarmupEntry;
use crate::disk_cache::{EnsureOutcome, IconDiskCache};
use crate::source::IconSource;
use crate::working_set::{CachedIcon, IconKey, IconWorkingSet};
use log::debug;
use lru::LruCache;
use std::collections::HashMap;
use std::mem;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

pub const DEFAULT_MICRO_CACHE_CAPACITY: usize = 256;

const IMAGE_EXTENSIONS: &[&str] = &["png", "ico", "bmp", "jpg", "jpeg", "gif", "webp"];

/// What a raw row path turned out to be.
#[derive(Clone, Debug, PartialEq, Eq)]
enum ResolvedKey {
    /// Already an icon file.
    Artifact(IconKey),
    /// An executable and the key of its artifact.
    Executable { exe: PathBuf, key: IconKey },
}

impl ResolvedKey {
    fn key(&self) -> &IconKey {
        match self {
            ResolvedKey::Artifact(key) => key,
            ResolvedKey::Executable { key, .. } => key,
        }
    }
}

/// The app an icon file belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
struct IconOwner {
    app_id: String,
    executable_path: PathBuf,
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|i| ext.eq_ignore_ascii_case(i)))
}

pub struct IconRenderAdapter {
    /// raw path string -> normalized key. Never holds bitmaps.
    keys: LruCache<String, ResolvedKey>,
    /// artifact and hint keys -> registered app
    owners: HashMap<IconKey, IconOwner>,
    /// `(app_id, disk_path)` persisted from the paint path, not yet handed out
    write_backs: Vec<(String, PathBuf)>,
}

impl IconRenderAdapter {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            keys: LruCache::new(capacity),
            owners: HashMap::new(),
            write_backs: Vec::new(),
        }
    }

    fn resolved(&mut self, raw: &str, disk: &IconDiskCache) -> ResolvedKey {
        if let Some(hit) = self.keys.get(raw) {
            return hit.clone();
        }

        let path = Path::new(raw.trim());
        let resolved = if is_image_path(path) {
            ResolvedKey::Artifact(IconKey::from_path(path))
        } else {
            ResolvedKey::Executable {
                exe: path.to_path_buf(),
                key: IconKey::from_path(&disk.path_for(path, None)),
            }
        };

        self.keys.put(raw.to_string(), resolved.clone());
        resolved
    }

    /// Working-set key for a row path.
    pub fn key_for(&mut self, raw: &str, disk: &IconDiskCache) -> IconKey {
        self.resolved(raw, disk).key().clone()
    }

    /// Remember which app an artifact or hint belongs to, so a broken icon
    /// file can be regenerated from its executable.
    pub fn register_owner(&mut self, entry: &WarmupEntry, disk: &IconDiskCache) {
        let owner = IconOwner {
            app_id: entry.app_id.clone(),
            executable_path: entry.executable_path.clone(),
        };
        if let Some(hint) = entry.icon_path_hint.as_deref() {
            self.owners.insert(IconKey::from_path(hint), owner.clone());
        }
        let artifact = disk.path_for(&entry.executable_path, None);
        self.owners.insert(IconKey::from_path(&artifact), owner);
    }

    /// App id registered for `key`, if any.
    pub fn owner_of(&self, key: &IconKey) -> Option<&str> {
        self.owners.get(key).map(|owner| owner.app_id.as_str())
    }

    /// `(app_id, disk_path)` pairs persisted by `resolve` since the last call.
    pub fn take_write_backs(&mut self) -> Vec<(String, PathBuf)> {
        mem::take(&mut self.write_backs)
    }

    /// Bitmap for an icon file or executable path. Never fails.
    pub fn resolve(
        &mut self,
        raw: &str,
        working_set: &mut IconWorkingSet,
        disk: &IconDiskCache,
        source: &IconSource,
    ) -> Bitmap {
        if raw.trim().is_empty() {
            return source.placeholder();
        }

        let resolved = self.resolved(raw, disk);
        if let Some(bitmap) = working_set.bitmap(resolved.key()) {
            return bitmap;
        }

        match resolved {
            ResolvedKey::Artifact(key) => self.resolve_icon_file(key, working_set, disk, source),
            ResolvedKey::Executable { exe, key } => {
                let outcome = disk.ensure_icon(&exe, None, source);
                self.record(&key, &outcome);
                let bitmap = outcome.icon.bitmap.clone();
                working_set.put(outcome.key, outcome.icon);
                bitmap
            }
        }
    }

    fn resolve_icon_file(
        &mut self,
        key: IconKey,
        working_set: &mut IconWorkingSet,
        disk: &IconDiskCache,
        source: &IconSource,
    ) -> Bitmap {
        let disk_path = key.to_path_buf();
        let loaded = if disk.is_artifact(&disk_path) {
            // ours: a degenerate or corrupt artifact is deleted for regeneration
            disk.load(&disk_path)
        } else {
            // a foreign file is never deleted from here
            disk.try_load(&disk_path)
                .map_err(|e| debug!("Icon file {:?} unusable: {}", disk_path, e))
                .ok()
        };

        if let Some(bitmap) = loaded {
            working_set.put(
                key,
                CachedIcon {
                    source_path: None,
                    disk_path,
                    bitmap: bitmap.clone(),
                    fallback: false,
                },
            );
            return bitmap;
        }

        if let Some(owner) = self.owners.get(&key).cloned() {
            debug!("Regenerating icon {} from {:?}", key, owner.executable_path);
            let outcome = disk.ensure_icon(&owner.executable_path, None, source);
            self.record(&key, &outcome);
            let bitmap = outcome.icon.bitmap.clone();
            if outcome.key != key {
                working_set.put(key, outcome.icon.clone());
            }
            working_set.put(outcome.key, outcome.icon);
            return bitmap;
        }

        // nothing to regenerate from; warm-up replaces this slot
        let bitmap = source.placeholder();
        working_set.put(
            key,
            CachedIcon {
                source_path: None,
                disk_path,
                bitmap: bitmap.clone(),
                fallback: true,
            },
        );
        bitmap
    }

    fn record(&mut self, key: &IconKey, outcome: &EnsureOutcome) {
        if !outcome.persisted {
            return;
        }
        if let Some(owner) = self.owners.get(key) {
            self.write_backs
                .push((owner.app_id.clone(), outcome.icon.disk_path.clone()));
        }
    }

    /// Drop the memoized key for one raw path.
    pub fn forget(&mut self, raw: &str) {
        self.keys.pop(raw);
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Default for IconRenderAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_MICRO_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::{IconSize, placeholder};
    use crate::native::NullBackend;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        disk: IconDiskCache,
        source: IconSource,
        set: IconWorkingSet,
        adapter: IconRenderAdapter,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            Self {
                disk: IconDiskCache::new(dir.path().join("icons"), IconSize::new(32)),
                source: IconSource::with_backend(Box::new(NullBackend), IconSize::new(32)),
                set: IconWorkingSet::new(),
                adapter: IconRenderAdapter::new(4),
                dir,
            }
        }

        fn resolve(&mut self, raw: &str) -> Bitmap {
            self.adapter
                .resolve(raw, &mut self.set, &self.disk, &self.source)
        }
    }

    #[test]
    fn test_image_extension_detection() {
        assert!(is_image_path(Path::new("/icons/a.PNG")));
        assert!(is_image_path(Path::new("C:/x/y.ico")));
        assert!(!is_image_path(Path::new("/usr/bin/firefox")));
        assert!(!is_image_path(Path::new("C:/x/y.exe")));
    }

    #[test]
    fn test_empty_path_is_placeholder() {
        let mut fx = Fixture::new();
        let bitmap = fx.resolve("   ");
        assert_eq!(bitmap.as_raw(), fx.source.placeholder().as_raw());
        assert!(fx.set.is_empty());
    }

    #[test]
    fn test_executable_miss_then_hit() {
        let mut fx = Fixture::new();
        let exe = fx.dir.path().join("tool");
        fs::write(&exe, b"x").unwrap();
        let raw = exe.to_string_lossy().into_owned();

        fx.resolve(&raw);
        fx.resolve(&raw);
        assert_eq!(fx.source.stats().requests, 1);
        assert_eq!(fx.set.len(), 1);
        assert!(fx.disk.has(&fx.disk.path_for(&exe, None)));
    }

    #[test]
    fn test_artifact_hit_does_not_reread_disk() {
        let mut fx = Fixture::new();
        let icon = fx.dir.path().join("shown.png");
        placeholder(IconSize::new(32)).save(&icon).unwrap();
        let raw = icon.to_string_lossy().into_owned();

        let first = fx.resolve(&raw);
        fs::remove_file(&icon).unwrap();
        let second = fx.resolve(&raw);

        assert_eq!(first.as_raw(), second.as_raw());
        assert_eq!(fx.source.stats().requests, 0);
    }

    #[test]
    fn test_unloadable_artifact_is_memoized_placeholder() {
        let mut fx = Fixture::new();
        let icon = fx.dir.path().join("broken.png");
        fs::write(&icon, vec![0x55; 1024]).unwrap();
        let raw = icon.to_string_lossy().into_owned();

        let bitmap = fx.resolve(&raw);
        assert_eq!(bitmap.as_raw(), fx.source.placeholder().as_raw());
        assert!(fx.set.get(&IconKey::from_path(&icon)).unwrap().fallback);
        // not ours to delete
        assert!(icon.exists());
    }

    #[test]
    fn test_corrupt_artifact_is_regenerated_from_owner() {
        let mut fx = Fixture::new();
        let exe = fx.dir.path().join("player");
        fs::write(&exe, b"x").unwrap();
        let artifact = fx.disk.path_for(&exe, None);
        fs::create_dir_all(fx.disk.base_dir()).unwrap();
        fs::write(&artifact, vec![0xAB; 4096]).unwrap();
        fx.adapter
            .register_owner(&WarmupEntry::new("player", &exe), &fx.disk);

        fx.resolve(&artifact.to_string_lossy());

        assert_eq!(fx.source.stats().requests, 1);
        assert!(fx.disk.try_load(&artifact).is_ok());
        assert!(fx.set.is_warm(&IconKey::from_path(&artifact)));
        assert_eq!(
            fx.adapter.take_write_backs(),
            vec![("player".to_string(), artifact.clone())]
        );
        assert!(fx.adapter.take_write_backs().is_empty());
    }

    #[test]
    fn test_corrupt_artifact_without_owner_is_deleted() {
        let mut fx = Fixture::new();
        let artifact = fx.disk.path_for(Path::new("/opt/unknown/bin/unknown"), None);
        fs::create_dir_all(fx.disk.base_dir()).unwrap();
        fs::write(&artifact, vec![0xAB; 4096]).unwrap();

        let bitmap = fx.resolve(&artifact.to_string_lossy());

        assert_eq!(bitmap.as_raw(), fx.source.placeholder().as_raw());
        assert!(!artifact.exists());
        assert!(fx.set.get(&IconKey::from_path(&artifact)).unwrap().fallback);
        assert_eq!(fx.source.stats().requests, 0);
    }

    #[test]
    fn test_stale_hint_with_owner_points_at_new_artifact() {
        let mut fx = Fixture::new();
        let exe = fx.dir.path().join("mail");
        fs::write(&exe, b"x").unwrap();
        let stale = fx.dir.path().join("old-mail.png");
        fx.adapter
            .register_owner(&WarmupEntry::new("mail", &exe).with_hint(&stale), &fx.disk);

        fx.resolve(&stale.to_string_lossy());

        let artifact = fx.disk.path_for(&exe, None);
        let slot = fx.set.get(&IconKey::from_path(&stale)).unwrap();
        assert!(!slot.fallback);
        assert_eq!(slot.disk_path, artifact);
        assert_eq!(fx.adapter.take_write_backs(), vec![("mail".to_string(), artifact)]);
    }

    #[test]
    fn test_executable_write_back_needs_registered_owner() {
        let mut fx = Fixture::new();
        let known = fx.dir.path().join("known");
        let stray = fx.dir.path().join("stray");
        fs::write(&known, b"x").unwrap();
        fs::write(&stray, b"x").unwrap();
        fx.adapter
            .register_owner(&WarmupEntry::new("known", &known), &fx.disk);

        fx.resolve(&known.to_string_lossy());
        fx.resolve(&stray.to_string_lossy());

        let artifact = fx.disk.path_for(&known, None);
        assert_eq!(
            fx.adapter.owner_of(&IconKey::from_path(&artifact)),
            Some("known")
        );
        assert_eq!(fx.adapter.take_write_backs(), vec![("known".to_string(), artifact)]);
    }

    #[test]
    fn test_equivalent_spellings_share_one_entry() {
        let mut fx = Fixture::new();
        let icon = fx.dir.path().join("a.png");
        placeholder(IconSize::new(32)).save(&icon).unwrap();
        let raw = icon.to_string_lossy().into_owned();

        fx.resolve(&raw);
        fx.resolve(&format!("  {raw}  "));
        assert_eq!(fx.set.len(), 1);
        assert_eq!(fx.adapter.len(), 2);
    }

    #[test]
    fn test_micro_cache_is_bounded_and_forgettable() {
        let mut fx = Fixture::new();
        for i in 0..10 {
            fx.adapter.key_for(&format!("/bin/app{i}"), &fx.disk);
        }
        assert_eq!(fx.adapter.len(), 4);

        fx.adapter.forget("/bin/app9");
        assert_eq!(fx.adapter.len(), 3);
        fx.adapter.clear();
        assert!(fx.adapter.is_empty());
    }

    #[test]
    fn test_key_for_executable_is_artifact_path() {
        let mut fx = Fixture::new();
        let key = fx.adapter.key_for("/opt/tool/bin/tool", &fx.disk);
        let expected = fx.disk.path_for(Path::new("/opt/tool/bin/tool"), None);
        assert_eq!(key, IconKey::from_path(&expected));
    }
}
