//! Outline rendering for colored slices.
//!
//! A pixel whose RGBA matches all 8 neighbours is interior to a uniform
//! region and is made transparent, leaving only region boundaries drawn.
//! Pixels on the image border are never changed.

use image::RgbaImage;
use tracing::trace;

/// Reduce an RGBA8 slice of `width` columns and `height` rows to outlines
///
/// Pixel (i, j) starts at byte `(i + width * j) * 4`. Comparisons use the
/// unmodified input, so the result does not depend on scan order.
///
/// # Panics
/// When `rgba` is shorter than `width * height * 4`
pub fn convert_to_outline(rgba: &mut [u8], width: usize, height: usize) {
    let len = width * height * 4;
    if len == 0 {
        return;
    }
    assert!(
        rgba.len() >= len,
        "rgba buffer holds {} bytes, slice needs {len}",
        rgba.len()
    );
    let original = rgba[..len].to_vec();
    let pixel = |i: usize, j: usize| {
        let offset = (i + width * j) * 4;
        &original[offset..offset + 4]
    };

    let mut cleared = 0usize;
    for i in 1..width.saturating_sub(1) {
        for j in 1..height.saturating_sub(1) {
            let own = pixel(i, j);
            if own[3] == 0 {
                continue;
            }
            let uniform = (i - 1..=i + 1)
                .flat_map(|ni| (j - 1..=j + 1).map(move |nj| (ni, nj)))
                .all(|(ni, nj)| pixel(ni, nj) == own);
            if uniform {
                rgba[(i + width * j) * 4 + 3] = 0;
                cleared += 1;
            }
        }
    }
    trace!("Outline cleared {cleared} interior pixels of {width}x{height} slice");
}

/// [`convert_to_outline`] over an [`RgbaImage`]
pub fn convert_image_to_outline(image: &mut RgbaImage) {
    let (width, height) = image.dimensions();
    let buffer: &mut [u8] = image;
    convert_to_outline(buffer, width as usize, height as usize);
}
