//! Platform icon backends.
//!
//! Everything platform specific (Win32 icon handles, freedesktop icon themes)
//! stays behind [`IconBackend`]; the rest of the engine only ever sees RGBA
//! pixels.

use crate::bitmap::IconSize;
use image::RgbaImage;
use std::path::Path;

#[cfg(windows)]
mod win32;
#[cfg(unix)]
mod xdg;

#[cfg(windows)]
pub use win32::Win32Backend;
#[cfg(unix)]
pub use xdg::XdgThemeBackend;

/// Source of platform icons for one executable.
///
/// Implementations must release every OS handle they allocate before
/// returning, on success and failure alike.
pub trait IconBackend: Send {
    /// Tier 1: the icon embedded in (or registered for) the binary itself.
    fn extract_resource(&self, _path: &Path, _size: IconSize) -> Option<RgbaImage> {
        None
    }

    /// Tier 2: the generic icon the OS shows for this kind of file.
    fn file_type_icon(&self, _path: &Path, _size: IconSize) -> Option<RgbaImage> {
        None
    }

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Backend that always misses; extraction goes straight to the placeholder.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

impl IconBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }
}

/// Create the backend for the compilation target.
pub fn platform_backend() -> Box<dyn IconBackend> {
    #[cfg(windows)]
    {
        Box::new(Win32Backend)
    }
    #[cfg(unix)]
    {
        Box::new(XdgThemeBackend::new())
    }
    #[cfg(not(any(windows, unix)))]
    {
        Box::new(NullBackend)
    }
}
