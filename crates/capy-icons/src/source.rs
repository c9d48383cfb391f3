//! Tiered icon extraction for a single executable.
//!
//! native resource -> file-type icon -> placeholder. The first tier that
//! produces pixels wins; misses are absorbed and never reach the caller.

use crate::bitmap::{Bitmap, IconSize, placeholder};
use crate::error::{IconError, IconResult};
use crate::native::{IconBackend, platform_backend};
use log::debug;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One extraction request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IconRequest {
    pub executable_path: PathBuf,
    pub preferred_size: IconSize,
}

impl IconRequest {
    pub fn new(executable_path: impl Into<PathBuf>, preferred_size: IconSize) -> Self {
        Self {
            executable_path: executable_path.into(),
            preferred_size,
        }
    }
}

/// Which tier answered an extraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    Native,
    FileType,
    Placeholder,
}

/// Per-tier counters since the source was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub requests: u64,
    pub native_hits: u64,
    pub file_type_hits: u64,
    pub placeholders: u64,
}

/// Best-effort icon extraction with no caching of its own.
pub struct IconSource {
    backend: Box<dyn IconBackend>,
    default_size: IconSize,
    placeholder: Bitmap,
    stats: Cell<ExtractStats>,
}

impl IconSource {
    /// Source backed by the platform's native icon APIs.
    pub fn new(default_size: IconSize) -> Self {
        Self::with_backend(platform_backend(), default_size)
    }

    pub fn with_backend(backend: Box<dyn IconBackend>, default_size: IconSize) -> Self {
        Self {
            backend,
            default_size,
            placeholder: Arc::new(placeholder(default_size)),
            stats: Cell::new(ExtractStats::default()),
        }
    }

    pub fn default_size(&self) -> IconSize {
        self.default_size
    }

    /// The shared placeholder at the default size.
    pub fn placeholder(&self) -> Bitmap {
        self.placeholder.clone()
    }

    pub fn stats(&self) -> ExtractStats {
        self.stats.get()
    }

    /// Extract at the default size. Never fails.
    pub fn extract(&self, executable_path: impl AsRef<Path>) -> Bitmap {
        self.extract_with_tier(executable_path.as_ref(), self.default_size)
            .0
    }

    pub fn extract_request(&self, request: &IconRequest) -> Bitmap {
        self.extract_with_tier(&request.executable_path, request.preferred_size)
            .0
    }

    /// Extract and report which tier answered.
    pub fn extract_with_tier(&self, path: &Path, size: IconSize) -> (Bitmap, Tier) {
        let mut stats = self.stats.get();
        stats.requests += 1;

        let (bitmap, tier) = self.run_tiers(path, size);
        match tier {
            Tier::Native => stats.native_hits += 1,
            Tier::FileType => stats.file_type_hits += 1,
            Tier::Placeholder => stats.placeholders += 1,
        }
        self.stats.set(stats);

        debug!("Icon for {:?} from {:?} tier ({})", path, tier, self.backend.name());
        (bitmap, tier)
    }

    fn run_tiers(&self, path: &Path, size: IconSize) -> (Bitmap, Tier) {
        // fail fast: nothing to introspect
        if path.as_os_str().is_empty() || !path.exists() {
            return (self.placeholder_at(size), Tier::Placeholder);
        }

        for tier in [Tier::Native, Tier::FileType] {
            match self.try_tier(tier, path, size) {
                Ok(bitmap) => return (bitmap, tier),
                Err(e) => debug!("{}", e),
            }
        }

        (self.placeholder_at(size), Tier::Placeholder)
    }

    /// Run a single tier. Not counted in [`ExtractStats`].
    pub fn try_tier(&self, tier: Tier, path: &Path, size: IconSize) -> IconResult<Bitmap> {
        let image = match tier {
            Tier::Native => self.backend.extract_resource(path, size),
            Tier::FileType => self.backend.file_type_icon(path, size),
            Tier::Placeholder => return Ok(self.placeholder_at(size)),
        };
        image.map(Arc::new).ok_or_else(|| IconError::ExtractionMiss {
            path: path.to_path_buf(),
            tier,
        })
    }

    fn placeholder_at(&self, size: IconSize) -> Bitmap {
        if size == self.default_size {
            self.placeholder.clone()
        } else {
            Arc::new(placeholder(size))
        }
    }
}
