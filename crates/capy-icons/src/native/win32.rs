//! Win32 icon extraction.
//!
//! HICON -> top-down 32bpp pixels through GetIconInfo + GetDIBits, without
//! any toolkit image type in between. Every HICON, HBITMAP and HDC allocated
//! here is released before the function returns.

use super::IconBackend;
use crate::bitmap::{IconSize, RawPixelBuffer, fit_square};
use image::{DynamicImage, RgbaImage};
use std::ffi::c_void;
use std::path::Path;
use windows_sys::Win32::Graphics::Gdi::{
    BI_RGB, BITMAP, BITMAPINFO, CreateCompatibleDC, DIB_RGB_COLORS, DeleteDC, DeleteObject,
    GetDIBits, GetObjectW,
};
use windows_sys::Win32::Storage::FileSystem::FILE_ATTRIBUTE_NORMAL;
use windows_sys::Win32::UI::Shell::{
    ExtractIconExW, SHFILEINFOW, SHGFI_ICON, SHGFI_LARGEICON, SHGFI_SMALLICON,
    SHGFI_USEFILEATTRIBUTES, SHGetFileInfoW,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{DestroyIcon, GetIconInfo, HICON, ICONINFO};

#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Backend;

impl IconBackend for Win32Backend {
    fn extract_resource(&self, path: &Path, size: IconSize) -> Option<RgbaImage> {
        let wide = to_wide_null(path);
        let mut large: [HICON; 1] = [std::ptr::null_mut(); 1];
        let mut small: [HICON; 1] = [std::ptr::null_mut(); 1];

        let extracted =
            unsafe { ExtractIconExW(wide.as_ptr(), 0, large.as_mut_ptr(), small.as_mut_ptr(), 1) };
        if extracted == 0 {
            return None;
        }

        let chosen = match (size.wants_large(), large[0].is_null(), small[0].is_null()) {
            (true, false, _) => large[0],
            (false, _, false) => small[0],
            (_, false, _) => large[0],
            _ => small[0],
        };

        let raw = if chosen.is_null() {
            None
        } else {
            hicon_to_raw(chosen)
        };

        unsafe {
            if !small[0].is_null() {
                DestroyIcon(small[0]);
            }
            if !large[0].is_null() && large[0] != small[0] {
                DestroyIcon(large[0]);
            }
        }

        raw.and_then(|raw| to_icon(raw, size))
    }

    fn file_type_icon(&self, path: &Path, size: IconSize) -> Option<RgbaImage> {
        let wide = to_wide_null(path);
        let mut info: SHFILEINFOW = unsafe { std::mem::zeroed() };
        let variant = if size.wants_large() {
            SHGFI_LARGEICON
        } else {
            SHGFI_SMALLICON
        };

        let result = unsafe {
            SHGetFileInfoW(
                wide.as_ptr(),
                FILE_ATTRIBUTE_NORMAL,
                &mut info,
                std::mem::size_of::<SHFILEINFOW>() as u32,
                SHGFI_ICON | SHGFI_USEFILEATTRIBUTES | variant,
            )
        };
        if result == 0 || info.hIcon.is_null() {
            return None;
        }

        let raw = hicon_to_raw(info.hIcon);
        unsafe {
            DestroyIcon(info.hIcon);
        }

        raw.and_then(|raw| to_icon(raw, size))
    }

    fn name(&self) -> &'static str {
        "win32"
    }
}

fn to_wide_null(path: &Path) -> Vec<u16> {
    path.to_string_lossy()
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect()
}

fn to_icon(raw: RawPixelBuffer, size: IconSize) -> Option<RgbaImage> {
    let rgba = raw.into_rgba()?;
    Some(fit_square(&DynamicImage::ImageRgba8(rgba), size))
}

/// Copy the color plane of `icon` into a top-down BGRA buffer.
/// Does not destroy `icon`; the caller owns it.
fn hicon_to_raw(icon: HICON) -> Option<RawPixelBuffer> {
    let mut icon_info: ICONINFO = unsafe { std::mem::zeroed() };
    if unsafe { GetIconInfo(icon, &mut icon_info) } == 0 {
        return None;
    }

    let raw = read_icon_bitmap(&icon_info);
    cleanup_icon_info(&icon_info);
    raw
}

fn read_icon_bitmap(icon_info: &ICONINFO) -> Option<RawPixelBuffer> {
    // monochrome icons carry no color plane; leave them to the next tier
    let bitmap = icon_info.hbmColor;
    if bitmap.is_null() {
        return None;
    }

    let mut bmp: BITMAP = unsafe { std::mem::zeroed() };
    let got_obj = unsafe {
        GetObjectW(
            bitmap as _,
            std::mem::size_of::<BITMAP>() as i32,
            &mut bmp as *mut _ as *mut c_void,
        )
    };
    if got_obj == 0 {
        return None;
    }

    let width = bmp.bmWidth.max(1);
    let height = bmp.bmHeight.abs().max(1);

    let mut bmi: BITMAPINFO = unsafe { std::mem::zeroed() };
    bmi.bmiHeader.biSize = std::mem::size_of_val(&bmi.bmiHeader) as u32;
    bmi.bmiHeader.biWidth = width;
    bmi.bmiHeader.biHeight = -height; // top-down
    bmi.bmiHeader.biPlanes = 1;
    bmi.bmiHeader.biBitCount = 32;
    bmi.bmiHeader.biCompression = BI_RGB;

    let pixel_count = (width as usize).saturating_mul(height as usize);
    let mut bgra = vec![0_u8; pixel_count.saturating_mul(4)];

    let dc = unsafe { CreateCompatibleDC(std::ptr::null_mut()) };
    if dc.is_null() {
        return None;
    }

    let got_bits = unsafe {
        GetDIBits(
            dc,
            bitmap,
            0,
            height as u32,
            bgra.as_mut_ptr() as *mut c_void,
            &mut bmi,
            DIB_RGB_COLORS,
        )
    };

    unsafe {
        DeleteDC(dc);
    }

    if got_bits == 0 {
        return None;
    }

    Some(RawPixelBuffer::new(width as u32, height as u32, bgra))
}

fn cleanup_icon_info(icon_info: &ICONINFO) {
    unsafe {
        if !icon_info.hbmColor.is_null() {
            DeleteObject(icon_info.hbmColor as _);
        }
        if !icon_info.hbmMask.is_null() {
            DeleteObject(icon_info.hbmMask as _);
        }
    }
}
