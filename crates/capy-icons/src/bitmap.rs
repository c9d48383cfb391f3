//! Pixel buffers shared by every layer of the engine.

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use std::sync::Arc;

/// Decoded icon pixels. Immutable once built; clones share the buffer.
pub type Bitmap = Arc<RgbaImage>;

/// Requests at or below this edge length use the platform's small icon variant.
pub const SMALL_ICON_THRESHOLD: u32 = 16;

pub const MIN_ICON_SIZE: u32 = 16;
pub const MAX_ICON_SIZE: u32 = 256;

/// Square icon edge length in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IconSize(u32);

impl IconSize {
    pub fn new(pixels: u32) -> Self {
        Self(pixels.clamp(MIN_ICON_SIZE, MAX_ICON_SIZE))
    }

    pub fn pixels(self) -> u32 {
        self.0
    }

    /// Whether the large platform variant should be preferred.
    pub fn wants_large(self) -> bool {
        self.0 > SMALL_ICON_THRESHOLD
    }
}

impl Default for IconSize {
    fn default() -> Self {
        Self(48)
    }
}

/// Raw pixels as handed back by a platform backend.
///
/// Rows are top-down, 4 bytes per pixel in BGRA order. Alpha is kept as-is
/// unless the whole buffer has a zero alpha channel, which means the source
/// bitmap carried no alpha at all.
#[derive(Clone, Debug)]
pub struct RawPixelBuffer {
    pub width: u32,
    pub height: u32,
    pub bgra: Vec<u8>,
}

impl RawPixelBuffer {
    pub fn new(width: u32, height: u32, bgra: Vec<u8>) -> Self {
        Self {
            width,
            height,
            bgra,
        }
    }

    /// Convert to an RGBA image. Returns None for empty or truncated buffers.
    pub fn into_rgba(self) -> Option<RgbaImage> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let expected = (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(4)?;
        if self.bgra.len() != expected {
            return None;
        }

        let has_alpha = self.bgra.chunks_exact(4).any(|px| px[3] != 0);
        let mut rgba = Vec::with_capacity(self.bgra.len());
        for px in self.bgra.chunks_exact(4) {
            rgba.push(px[2]);
            rgba.push(px[1]);
            rgba.push(px[0]);
            rgba.push(if has_alpha { px[3] } else { 255 });
        }

        RgbaImage::from_raw(self.width, self.height, rgba)
    }
}

/// Scale `image` to fit a `size`x`size` square, keeping its aspect ratio,
/// and center it on a transparent canvas.
pub fn fit_square(image: &DynamicImage, size: IconSize) -> RgbaImage {
    let edge = size.pixels();
    if image.width() == edge && image.height() == edge {
        return image.to_rgba8();
    }

    // CatmullRom for quality, these are small images
    let scaled = image.resize(edge, edge, FilterType::CatmullRom).to_rgba8();
    let mut canvas = RgbaImage::new(edge, edge);
    let x = (edge.saturating_sub(scaled.width()) / 2) as i64;
    let y = (edge.saturating_sub(scaled.height()) / 2) as i64;
    imageops::overlay(&mut canvas, &scaled, x, y);
    canvas
}

const BODY: [u8; 3] = [200, 200, 200];
const BAND: [u8; 3] = [150, 160, 175];
const BORDER: [u8; 3] = [120, 120, 120];
const DITHER: i32 = 8;

/// The generic application glyph used when every extraction tier misses.
///
/// A gray window shape with a title band. The low-amplitude dither keeps the
/// encoded PNG well above the degenerate-artifact threshold at every size.
pub fn placeholder(size: IconSize) -> RgbaImage {
    let edge = size.pixels();
    let margin = edge / 16;
    let border = (edge / 24).max(1);
    let band_end = margin + border + edge / 6;

    let mut image = RgbaImage::new(edge, edge);
    for y in margin..edge - margin {
        for x in margin..edge - margin {
            let on_border = x < margin + border
                || y < margin + border
                || x >= edge - margin - border
                || y >= edge - margin - border;
            let base = if on_border {
                BORDER
            } else if y < band_end {
                BAND
            } else {
                BODY
            };

            let mut px = [0u8; 4];
            for (c, value) in base.iter().enumerate() {
                let shifted = *value as i32 + dither(x, y, c as u32);
                px[c] = shifted.clamp(0, 255) as u8;
            }
            px[3] = 255;
            image.put_pixel(x, y, Rgba(px));
        }
    }
    image
}

/// Deterministic per-pixel offset in `-DITHER..=DITHER`.
fn dither(x: u32, y: u32, channel: u32) -> i32 {
    let mut h = x
        .wrapping_mul(73_856_093)
        ^ y.wrapping_mul(19_349_663)
        ^ channel.wrapping_mul(83_492_791);
    h ^= h << 13;
    h ^= h >> 17;
    h ^= h << 5;
    (h % (2 * DITHER as u32 + 1)) as i32 - DITHER
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_len(image: &RgbaImage) -> usize {
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(image.clone())
            .write_to(&mut Cursor::new(&mut buf), image::ImageOutputFormat::Png)
            .unwrap();
        buf.len()
    }

    #[test]
    fn test_icon_size_is_clamped() {
        assert_eq!(IconSize::new(4).pixels(), MIN_ICON_SIZE);
        assert_eq!(IconSize::new(1024).pixels(), MAX_ICON_SIZE);
        assert!(!IconSize::new(16).wants_large());
        assert!(IconSize::new(32).wants_large());
    }

    #[test]
    fn test_raw_buffer_swizzles_bgra() {
        let raw = RawPixelBuffer::new(1, 1, vec![10, 20, 30, 40]);
        let image = raw.into_rgba().unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [30, 20, 10, 40]);
    }

    #[test]
    fn test_raw_buffer_without_alpha_is_opaque() {
        let raw = RawPixelBuffer::new(2, 1, vec![1, 2, 3, 0, 4, 5, 6, 0]);
        let image = raw.into_rgba().unwrap();
        assert!(image.pixels().all(|p| p.0[3] == 255));
    }

    #[test]
    fn test_raw_buffer_rejects_truncated_data() {
        assert!(RawPixelBuffer::new(2, 2, vec![0; 12]).into_rgba().is_none());
        assert!(RawPixelBuffer::new(0, 2, Vec::new()).into_rgba().is_none());
    }

    #[test]
    fn test_fit_square_centers_wide_images() {
        let wide = DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 32, Rgba([255, 0, 0, 255])));
        let fitted = fit_square(&wide, IconSize::new(32));
        assert_eq!(fitted.dimensions(), (32, 32));
        // top rows are padding, middle row is image
        assert_eq!(fitted.get_pixel(16, 0).0[3], 0);
        assert_eq!(fitted.get_pixel(16, 16).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_placeholder_is_deterministic() {
        let a = placeholder(IconSize::new(48));
        let b = placeholder(IconSize::new(48));
        assert_eq!(a.as_raw(), b.as_raw());
        assert_eq!(a.dimensions(), (48, 48));
    }

    #[test]
    fn test_placeholder_png_exceeds_degenerate_threshold() {
        for edge in [16, 32, 48, 64, 256] {
            let len = png_len(&placeholder(IconSize::new(edge)));
            assert!(len > 200, "placeholder {edge}px encoded to {len} bytes");
        }
    }
}
