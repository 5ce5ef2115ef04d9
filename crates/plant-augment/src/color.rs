//! Color transform stage.
//!
//! Photometric perturbations applied to the color member of a triple
//! after the geometric stage. Masks and grayscale images never pass
//! through here.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};
use plant_core::{ColorOp, Error, Result};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::colorspace::{hsv_to_rgb, luma, rgb_to_hsv};
use crate::random::{gate, standard_normal, symmetric, uniform};

/// Applies the configured color operations, in order, to one image.
pub fn apply_color<R: Rng + ?Sized>(
    color: &RgbImage,
    ops: &[ColorOp],
    rng: &mut R,
) -> Result<RgbImage> {
    let mut result = color.clone();

    for op in ops {
        if !gate(rng, op.probability()) {
            continue;
        }

        result = match *op {
            ColorOp::BrightnessContrast {
                brightness_limit,
                contrast_limit,
                ..
            } => {
                let alpha = 1.0 + symmetric(rng, contrast_limit);
                let beta = symmetric(rng, brightness_limit) * 255.0;
                linear(&result, alpha, beta)
            }
            ColorOp::NoiseOrCompression {
                noise_weight,
                compression_weight,
                noise_variance,
                quality,
                ..
            } => {
                let pick = rng.gen::<f32>() * (noise_weight + compression_weight);
                if pick < noise_weight {
                    let sigma = uniform(rng, noise_variance).sqrt();
                    gaussian_noise(&result, sigma, rng)
                } else {
                    let q = rng.gen_range(quality.0..=quality.1);
                    jpeg_roundtrip(&result, q)?
                }
            }
            ColorOp::ColorJitter {
                brightness,
                contrast,
                saturation,
                hue,
                ..
            } => color_jitter(&result, [brightness, contrast, saturation, hue], rng),
        };
    }

    Ok(result)
}

/// `out = p * alpha + beta`, clamped.
fn linear(img: &RgbImage, alpha: f32, beta: f32) -> RgbImage {
    let mut output = img.clone();
    for pixel in output.pixels_mut() {
        for c in pixel.0.iter_mut() {
            *c = (*c as f32 * alpha + beta).round().clamp(0.0, 255.0) as u8;
        }
    }
    output
}

/// Per-channel additive Gaussian noise with standard deviation `sigma`.
fn gaussian_noise<R: Rng + ?Sized>(img: &RgbImage, sigma: f32, rng: &mut R) -> RgbImage {
    let mut output = img.clone();
    for pixel in output.pixels_mut() {
        for c in pixel.0.iter_mut() {
            let noise = standard_normal(rng) * sigma;
            *c = (*c as f32 + noise).round().clamp(0.0, 255.0) as u8;
        }
    }
    output
}

/// Encodes as JPEG at `quality` and decodes again.
fn jpeg_roundtrip(img: &RgbImage, quality: u8) -> Result<RgbImage> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(img)
        .map_err(|e| Error::Image(format!("JPEG encode at quality {quality} failed: {e}")))?;

    let decoded = image::load(Cursor::new(buffer), ImageFormat::Jpeg)
        .map_err(|e| Error::Image(format!("JPEG decode failed: {e}")))?;

    Ok(decoded.to_rgb8())
}

#[derive(Debug, Clone, Copy)]
enum Jitter {
    Brightness,
    Contrast,
    Saturation,
    Hue,
}

/// Brightness, contrast, saturation and hue changes in a shuffled order.
///
/// `limits` is `[brightness, contrast, saturation, hue]`.
fn color_jitter<R: Rng + ?Sized>(img: &RgbImage, limits: [f32; 4], rng: &mut R) -> RgbImage {
    let [brightness, contrast, saturation, hue] = limits;

    let b = 1.0 + symmetric(rng, brightness);
    let c = 1.0 + symmetric(rng, contrast);
    let s = 1.0 + symmetric(rng, saturation);
    let h = symmetric(rng, hue);

    let mut order = [Jitter::Brightness, Jitter::Contrast, Jitter::Saturation, Jitter::Hue];
    order.shuffle(rng);

    let mut result = img.clone();
    for jitter in order {
        result = match jitter {
            Jitter::Brightness => linear(&result, b, 0.0),
            Jitter::Contrast => blend_with_mean(&result, c),
            Jitter::Saturation => blend_with_gray(&result, s),
            Jitter::Hue => rotate_hue(&result, h),
        };
    }
    result
}

/// Blends each channel towards the mean luma by `factor`.
fn blend_with_mean(img: &RgbImage, factor: f32) -> RgbImage {
    let count = (img.width() as f64 * img.height() as f64).max(1.0);
    let mean = (img.pixels().map(|p| luma(p) as f64).sum::<f64>() / count) as f32;

    let mut output = img.clone();
    for pixel in output.pixels_mut() {
        for ch in pixel.0.iter_mut() {
            *ch = (mean + factor * (*ch as f32 - mean)).round().clamp(0.0, 255.0) as u8;
        }
    }
    output
}

/// Blends each pixel towards its own luma by `factor`.
fn blend_with_gray(img: &RgbImage, factor: f32) -> RgbImage {
    let mut output = img.clone();
    for pixel in output.pixels_mut() {
        let gray = luma(pixel) as f32;
        for ch in pixel.0.iter_mut() {
            *ch = (gray + factor * (*ch as f32 - gray)).round().clamp(0.0, 255.0) as u8;
        }
    }
    output
}

/// Rotates hue by `turns` of a full circle.
fn rotate_hue(img: &RgbImage, turns: f32) -> RgbImage {
    if turns == 0.0 {
        return img.clone();
    }

    let shift = turns * 360.0;
    let mut output = img.clone();
    for pixel in output.pixels_mut() {
        let (h, s, v) = rgb_to_hsv(pixel);
        *pixel = hsv_to_rgb(h + shift, s, v);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::seeded_rng;
    use image::Rgb;

    fn create_test_image() -> RgbImage {
        RgbImage::from_fn(64, 64, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 128]))
    }

    fn always(op: ColorOp) -> ColorOp {
        match op {
            ColorOp::BrightnessContrast {
                brightness_limit,
                contrast_limit,
                ..
            } => ColorOp::BrightnessContrast {
                p: 1.0,
                brightness_limit,
                contrast_limit,
            },
            ColorOp::NoiseOrCompression {
                noise_weight,
                compression_weight,
                noise_variance,
                quality,
                ..
            } => ColorOp::NoiseOrCompression {
                p: 1.0,
                noise_weight,
                compression_weight,
                noise_variance,
                quality,
            },
            ColorOp::ColorJitter {
                brightness,
                contrast,
                saturation,
                hue,
                ..
            } => ColorOp::ColorJitter {
                p: 1.0,
                brightness,
                contrast,
                saturation,
                hue,
            },
        }
    }

    #[test]
    fn test_no_ops_is_identity() {
        let img = create_test_image();
        let out = apply_color(&img, &[], &mut seeded_rng(1)).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn test_default_ops_keep_dimensions() {
        let img = create_test_image();
        let ops: Vec<_> = plant_core::AugmentationConfig::default()
            .color
            .into_iter()
            .map(always)
            .collect();
        let mut rng = seeded_rng(42);

        for _ in 0..5 {
            let out = apply_color(&img, &ops, &mut rng).unwrap();
            assert_eq!(out.dimensions(), img.dimensions());
        }
    }

    #[test]
    fn test_apply_color_is_deterministic() {
        let img = create_test_image();
        let ops = plant_core::AugmentationConfig::default().color;
        let a = apply_color(&img, &ops, &mut seeded_rng(8)).unwrap();
        let b = apply_color(&img, &ops, &mut seeded_rng(8)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_linear_brightens_and_darkens() {
        let img = create_test_image();
        let brighter = linear(&img, 1.0, 40.0);
        let darker = linear(&img, 1.0, -40.0);

        let orig = img.get_pixel(10, 10);
        assert_eq!(brighter.get_pixel(10, 10)[2], orig[2] + 40);
        assert_eq!(darker.get_pixel(10, 10)[2], orig[2] - 40);
    }

    #[test]
    fn test_noise_branch_only() {
        let img = RgbImage::from_pixel(32, 32, Rgb([128, 128, 128]));
        let op = ColorOp::NoiseOrCompression {
            p: 1.0,
            noise_weight: 1.0,
            compression_weight: 0.0,
            noise_variance: (400.0, 400.0),
            quality: (60, 100),
        };
        let out = apply_color(&img, &[op], &mut seeded_rng(3)).unwrap();
        assert_ne!(out, img);

        let mean = out.pixels().map(|p| p[0] as f32).sum::<f32>() / (32.0 * 32.0);
        assert!((mean - 128.0).abs() < 4.0, "mean {mean}");
    }

    #[test]
    fn test_compression_branch_only() {
        let img = create_test_image();
        let op = ColorOp::NoiseOrCompression {
            p: 1.0,
            noise_weight: 0.0,
            compression_weight: 1.0,
            noise_variance: (10.0, 50.0),
            quality: (60, 60),
        };
        let out = apply_color(&img, &[op], &mut seeded_rng(3)).unwrap();
        assert_eq!(out.dimensions(), img.dimensions());
        assert_eq!(out, jpeg_roundtrip(&img, 60).unwrap());
    }

    #[test]
    fn test_saturation_zero_is_gray() {
        let img = create_test_image();
        let gray = blend_with_gray(&img, 0.0);
        for p in gray.pixels() {
            assert_eq!(p[0], p[1]);
            assert_eq!(p[1], p[2]);
        }
    }

    #[test]
    fn test_half_turn_hue_maps_green_to_magenta() {
        let img = RgbImage::from_pixel(2, 2, Rgb([0, 255, 0]));
        let out = rotate_hue(&img, 0.5);
        assert_eq!(out.get_pixel(0, 0), &Rgb([255, 0, 255]));
    }
}
