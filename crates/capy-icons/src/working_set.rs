//! In-memory icon table used on the paint path.
//!
//! Keys are normalized artifact paths: `path_for(exe)` for executables, or the
//! explicit icon file for rows that carry one. No eviction beyond explicit
//! invalidation; a launcher holds at most a few thousand small bitmaps.

use crate::bitmap::Bitmap;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Canonical working-set key: a normalized path string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IconKey(String);

impl IconKey {
    /// Trim, use `/` separators, collapse repeats and drop a trailing slash.
    /// Lowercased on Windows, where paths are case-insensitive.
    pub fn normalize(raw: &str) -> Self {
        let trimmed = raw.trim();
        let mut out = String::with_capacity(trimmed.len());

        // keep a UNC prefix intact
        let rest = match trimmed
            .strip_prefix("\\\\")
            .or_else(|| trimmed.strip_prefix("//"))
        {
            Some(rest) => {
                out.push_str("//");
                rest
            }
            None => trimmed,
        };
        let floor = out.len().max(1);

        for ch in rest.chars() {
            let ch = if ch == '\\' { '/' } else { ch };
            if ch == '/' && out.len() >= floor && out.ends_with('/') {
                continue;
            }
            out.push(ch);
        }

        while out.len() > floor && out.ends_with('/') {
            out.pop();
        }

        #[cfg(windows)]
        let out = out.to_lowercase();

        IconKey(out)
    }

    pub fn from_path(path: &Path) -> Self {
        Self::normalize(&path.to_string_lossy())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }
}

impl fmt::Display for IconKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved icon. Never mutated; invalidation replaces the slot.
#[derive(Clone, Debug)]
pub struct CachedIcon {
    /// Owning executable, when known.
    pub source_path: Option<PathBuf>,
    /// On-disk artifact location.
    pub disk_path: PathBuf,
    pub bitmap: Bitmap,
    /// The icon file could not be loaded and `bitmap` is a stand-in.
    /// Warm-up replaces these slots instead of skipping them.
    pub fallback: bool,
}

impl CachedIcon {
    pub fn size_pixels(&self) -> (u32, u32) {
        self.bitmap.dimensions()
    }
}

#[derive(Default)]
pub struct IconWorkingSet {
    entries: HashMap<IconKey, CachedIcon>,
}

impl IconWorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &IconKey) -> Option<&CachedIcon> {
        self.entries.get(key)
    }

    /// Bitmap only, for the paint path.
    pub fn bitmap(&self, key: &IconKey) -> Option<Bitmap> {
        self.entries.get(key).map(|icon| icon.bitmap.clone())
    }

    /// Insert or overwrite.
    pub fn put(&mut self, key: IconKey, icon: CachedIcon) {
        self.entries.insert(key, icon);
    }

    pub fn contains(&self, key: &IconKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Holds a real icon, not a fallback stand-in.
    pub fn is_warm(&self, key: &IconKey) -> bool {
        self.entries.get(key).is_some_and(|icon| !icon.fallback)
    }

    /// Drop one entry. Returns whether anything was removed.
    pub fn invalidate(&mut self, key: &IconKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop everything. Disk artifacts are the caller's business.
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
