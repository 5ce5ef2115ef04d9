//! Color-space helpers shared by derivation and the color stage.

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

/// BT.601 luma of an 8-bit RGB pixel, rounded.
#[inline]
pub fn luma(pixel: &Rgb<u8>) -> u8 {
    let [r, g, b] = pixel.0;
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}

/// Converts a color image to single-channel luminance.
pub fn rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    let (width, height) = rgb.dimensions();
    GrayImage::from_fn(width, height, |x, y| Luma([luma(rgb.get_pixel(x, y))]))
}

/// Collapses any decoded image to one channel.
///
/// Single-channel 8-bit data is returned unchanged; everything else is
/// flattened to RGB first (dropping alpha) and weighted with BT.601.
pub fn collapse_to_gray(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => rgb_to_gray(&other.to_rgb8()),
    }
}

/// RGB in `0..=255` to (hue degrees `0..360`, saturation `0..=1`, value `0..=1`).
pub fn rgb_to_hsv(pixel: &Rgb<u8>) -> (f32, f32, f32) {
    let r = pixel[0] as f32 / 255.0;
    let g = pixel[1] as f32 / 255.0;
    let b = pixel[2] as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let hue = if hue < 0.0 { hue + 360.0 } else { hue };

    let saturation = if max <= f32::EPSILON { 0.0 } else { delta / max };

    (hue, saturation, max)
}

/// Inverse of [`rgb_to_hsv`].
pub fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> Rgb<u8> {
    let hue = hue.rem_euclid(360.0);
    let c = value * saturation;
    let h = hue / 60.0;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = value - c;
    let to_u8 = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;

    Rgb([to_u8(r), to_u8(g), to_u8(b)])
}

/// HSV on the 8-bit OpenCV scale: hue `0..180`, saturation and value `0..=255`.
pub fn rgb_to_hsv_u8(pixel: &Rgb<u8>) -> [u8; 3] {
    let (hue, saturation, _) = rgb_to_hsv(pixel);
    let value = pixel[0].max(pixel[1]).max(pixel[2]);

    let h = ((hue / 2.0).round() as u32 % 180) as u8;
    let s = (saturation * 255.0).round().clamp(0.0, 255.0) as u8;

    [h, s, value]
}
