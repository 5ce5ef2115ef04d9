//! Geometric transform stage.
//!
//! One [`GeometricParams`] value is sampled per repetition and then
//! applied to each member of a [`SampleTriple`] in turn, so the color
//! image, the mask and the grayscale image always receive the same
//! flips, quarter turns and warps.
//!
//! # Interpolation
//!
//! Flips and quarter turns are exact pixel permutations. Continuous
//! steps (shift/scale/rotate, perspective, shear) are resampled through
//! a projective warp: bilinear for color and gray, nearest for the mask
//! so that it never gains values other than those it already holds.
//!
//! Shift/scale/rotate samples outside the source frame are mirrored back
//! in without repeating the edge pixel (`gfedcb|abcdefgh|gfedcba`).
//! Perspective and shear warps fill out-of-frame pixels with 0.

use image::imageops;
use image::{GrayImage, ImageBuffer, Luma, Pixel, Rgb, RgbImage};
use imageproc::geometric_transformations::{warp, Interpolation, Projection};
use plant_core::{GeometricOp, SampleTriple};
use rand::Rng;

use crate::random::{gate, standard_normal, symmetric, uniform};

/// Interpolation used for the color member
pub const COLOR_INTERPOLATION: Interpolation = Interpolation::Bilinear;
/// Interpolation used for the grayscale member
pub const GRAY_INTERPOLATION: Interpolation = Interpolation::Bilinear;
/// Interpolation used for the mask member
pub const MASK_INTERPOLATION: Interpolation = Interpolation::Nearest;

/// Largest inward corner displacement for perspective warps, as a fraction of size
const MAX_CORNER_OFFSET: f32 = 0.45;

/// One concrete, already-sampled geometric step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeometricStep {
    /// Clockwise quarter turns (0..=3)
    Rotate90 { quarter_turns: u8 },
    FlipHorizontal,
    FlipVertical,
    /// Shift as fractions of width/height, scale factor, angle in degrees
    ShiftScaleRotate { dx: f32, dy: f32, scale: f32, angle: f32 },
    /// Inward corner offsets (fractions of width, height) for the
    /// top-left, top-right, bottom-right and bottom-left corners
    Perspective { corners: [(f32, f32); 4] },
    /// Shear angles in degrees along x and y
    Shear { x: f32, y: f32 },
}

impl GeometricStep {
    /// Projective transform of a continuous step for an image of the given
    /// size, mapping source coordinates to output coordinates.
    ///
    /// `None` for discrete steps and for degenerate (non-invertible) samples.
    pub fn projection(&self, (width, height): (u32, u32)) -> Option<Projection> {
        let (w, h) = (width as f32, height as f32);
        let (cx, cy) = (w / 2.0, h / 2.0);

        match *self {
            GeometricStep::ShiftScaleRotate { dx, dy, scale, angle } => {
                let (sin, cos) = angle.to_radians().sin_cos();
                let (a, b) = (scale * cos, -scale * sin);
                let (d, e) = (scale * sin, scale * cos);
                let tx = cx + dx * w;
                let ty = cy + dy * h;
                #[rustfmt::skip]
                let matrix = [
                    a,   b,   tx - a * cx - b * cy,
                    d,   e,   ty - d * cx - e * cy,
                    0.0, 0.0, 1.0,
                ];
                Projection::from_matrix(matrix)
            }
            GeometricStep::Shear { x, y } => {
                let shx = x.to_radians().tan();
                let shy = y.to_radians().tan();
                #[rustfmt::skip]
                let matrix = [
                    1.0, shx, -shx * cy,
                    shy, 1.0, -shy * cx,
                    0.0, 0.0, 1.0,
                ];
                Projection::from_matrix(matrix)
            }
            GeometricStep::Perspective { corners } => {
                let [tl, tr, br, bl] = corners;
                let from = [
                    (tl.0 * w, tl.1 * h),
                    (w - tr.0 * w, tr.1 * h),
                    (w - br.0 * w, h - br.1 * h),
                    (bl.0 * w, h - bl.1 * h),
                ];
                let to = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
                Projection::from_control_points(from, to)
            }
            GeometricStep::Rotate90 { .. }
            | GeometricStep::FlipHorizontal
            | GeometricStep::FlipVertical => None,
        }
    }

    /// Whether out-of-frame samples are reflected instead of filled
    pub fn reflects_border(&self) -> bool {
        matches!(self, GeometricStep::ShiftScaleRotate { .. })
    }
}

/// The sampled parameter set of one repetition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometricParams {
    steps: Vec<GeometricStep>,
}

impl GeometricParams {
    /// Builds parameters from explicit steps
    pub fn from_steps(steps: Vec<GeometricStep>) -> Self {
        Self { steps }
    }

    /// Samples one parameter set.
    ///
    /// Each op consumes one gate draw; magnitude draws follow only when
    /// the gate passes. The order of draws is the order of `ops`.
    pub fn sample<R: Rng + ?Sized>(ops: &[GeometricOp], rng: &mut R) -> Self {
        let mut steps = Vec::with_capacity(ops.len());

        for op in ops {
            if !gate(rng, op.probability()) {
                continue;
            }

            let step = match *op {
                GeometricOp::Rotate90 { .. } => GeometricStep::Rotate90 {
                    quarter_turns: rng.gen_range(0..4),
                },
                GeometricOp::HorizontalFlip { .. } => GeometricStep::FlipHorizontal,
                GeometricOp::VerticalFlip { .. } => GeometricStep::FlipVertical,
                GeometricOp::ShiftScaleRotate {
                    shift_limit,
                    scale_limit,
                    rotate_limit,
                    ..
                } => GeometricStep::ShiftScaleRotate {
                    dx: symmetric(rng, shift_limit),
                    dy: symmetric(rng, shift_limit),
                    scale: 1.0 + symmetric(rng, scale_limit),
                    angle: symmetric(rng, rotate_limit),
                },
                GeometricOp::Perspective { scale, .. } => {
                    let sigma = uniform(rng, scale);
                    let mut corners = [(0.0, 0.0); 4];
                    for corner in corners.iter_mut() {
                        let ox = (standard_normal(rng) * sigma).abs().min(MAX_CORNER_OFFSET);
                        let oy = (standard_normal(rng) * sigma).abs().min(MAX_CORNER_OFFSET);
                        *corner = (ox, oy);
                    }
                    GeometricStep::Perspective { corners }
                }
                GeometricOp::Shear { limit, .. } => GeometricStep::Shear {
                    x: symmetric(rng, limit),
                    y: symmetric(rng, limit),
                },
            };
            steps.push(step);
        }

        Self { steps }
    }

    pub fn steps(&self) -> &[GeometricStep] {
        &self.steps
    }

    pub fn is_identity(&self) -> bool {
        self.steps.is_empty()
    }

    /// Applies the parameters to a color image
    pub fn apply_rgb(&self, image: &RgbImage) -> RgbImage {
        self.transform(image, COLOR_INTERPOLATION, Rgb([0, 0, 0]))
    }

    /// Applies the parameters to a grayscale image
    pub fn apply_gray(&self, image: &GrayImage) -> GrayImage {
        self.transform(image, GRAY_INTERPOLATION, Luma([0]))
    }

    /// Applies the parameters to a mask
    pub fn apply_mask(&self, image: &GrayImage) -> GrayImage {
        self.transform(image, MASK_INTERPOLATION, Luma([0]))
    }

    /// Applies the parameters to all three members of a triple
    pub fn apply(&self, triple: &SampleTriple) -> SampleTriple {
        let out = SampleTriple {
            color: self.apply_rgb(&triple.color),
            mask: self.apply_mask(&triple.mask),
            gray: self.apply_gray(&triple.gray),
        };
        debug_assert!(out.is_aligned());
        out
    }

    fn transform<P>(
        &self,
        image: &ImageBuffer<P, Vec<u8>>,
        interpolation: Interpolation,
        fill: P,
    ) -> ImageBuffer<P, Vec<u8>>
    where
        P: Pixel<Subpixel = u8> + Send + Sync + 'static,
    {
        let mut current = image.clone();

        for step in &self.steps {
            current = match *step {
                GeometricStep::Rotate90 { quarter_turns } => match quarter_turns % 4 {
                    1 => imageops::rotate90(&current),
                    2 => imageops::rotate180(&current),
                    3 => imageops::rotate270(&current),
                    _ => current,
                },
                GeometricStep::FlipHorizontal => imageops::flip_horizontal(&current),
                GeometricStep::FlipVertical => imageops::flip_vertical(&current),
                continuous => match continuous.projection(current.dimensions()) {
                    Some(projection) if continuous.reflects_border() => {
                        warp_reflect(&current, projection, interpolation)
                    }
                    Some(projection) => warp(&current, &projection, interpolation, fill),
                    None => current,
                },
            };
        }

        current
    }
}

/// Index into `0..len` for any integer coordinate, reflecting about the
/// first and last pixel without repeating them.
fn reflect_101(index: i64, len: u32) -> u32 {
    if len <= 1 {
        return 0;
    }
    let len = i64::from(len);
    let period = 2 * (len - 1);
    let folded = index.rem_euclid(period);
    (if folded < len { folded } else { period - folded }) as u32
}

/// Projective warp whose out-of-frame samples are reflected into the image.
fn warp_reflect<P>(
    image: &ImageBuffer<P, Vec<u8>>,
    projection: Projection,
    interpolation: Interpolation,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = image.dimensions();
    let inverse = projection.invert();

    ImageBuffer::from_fn(width, height, |x, y| {
        let (sx, sy) = inverse * (x as f32, y as f32);
        match interpolation {
            Interpolation::Nearest => {
                let column = reflect_101((sx + 0.5).floor() as i64, width);
                let row = reflect_101((sy + 0.5).floor() as i64, height);
                *image.get_pixel(column, row)
            }
            _ => sample_bilinear(image, sx, sy),
        }
    })
}

fn sample_bilinear<P>(image: &ImageBuffer<P, Vec<u8>>, x: f32, y: f32) -> P
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = image.dimensions();
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);
    let columns = [reflect_101(x0, width), reflect_101(x0.saturating_add(1), width)];
    let rows = [reflect_101(y0, height), reflect_101(y0.saturating_add(1), height)];

    let taps = [
        (image.get_pixel(columns[0], rows[0]), (1.0 - fx) * (1.0 - fy)),
        (image.get_pixel(columns[1], rows[0]), fx * (1.0 - fy)),
        (image.get_pixel(columns[0], rows[1]), (1.0 - fx) * fy),
        (image.get_pixel(columns[1], rows[1]), fx * fy),
    ];

    let mut out = *taps[0].0;
    for (c, channel) in out.channels_mut().iter_mut().enumerate() {
        let value: f32 = taps.iter().map(|(p, w)| f32::from(p.channels()[c]) * w).sum();
        *channel = value.round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Samples one geometric parameter set and applies it to the whole triple.
pub fn apply_geometric<R: Rng + ?Sized>(
    triple: &SampleTriple,
    ops: &[GeometricOp],
    rng: &mut R,
) -> SampleTriple {
    GeometricParams::sample(ops, rng).apply(triple)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::seeded_rng;

    fn marked_triple(width: u32, height: u32) -> SampleTriple {
        // Bright square, off-centre so flips and turns move it
        let inside = |x: u32, y: u32| (8..18).contains(&x) && (6..14).contains(&y);
        let color = RgbImage::from_fn(width, height, |x, y| {
            if inside(x, y) { Rgb([0, 220, 0]) } else { Rgb([0, 0, 0]) }
        });
        let mask = GrayImage::from_fn(width, height, |x, y| {
            Luma([if inside(x, y) { 255 } else { 0 }])
        });
        let gray = GrayImage::from_fn(width, height, |x, y| {
            Luma([if inside(x, y) { 129 } else { 0 }])
        });
        SampleTriple::new(color, mask, gray).unwrap()
    }

    fn centroid<F: Fn(u32, u32) -> bool>(width: u32, height: u32, on: F) -> Option<(f32, f32)> {
        let mut sum = (0.0, 0.0);
        let mut count = 0.0;
        for y in 0..height {
            for x in 0..width {
                if on(x, y) {
                    sum.0 += x as f32;
                    sum.1 += y as f32;
                    count += 1.0;
                }
            }
        }
        (count > 0.0).then(|| (sum.0 / count, sum.1 / count))
    }

    fn all_ops() -> Vec<GeometricOp> {
        vec![
            GeometricOp::Rotate90 { p: 1.0 },
            GeometricOp::HorizontalFlip { p: 1.0 },
            GeometricOp::VerticalFlip { p: 1.0 },
            GeometricOp::ShiftScaleRotate {
                p: 1.0,
                shift_limit: 0.05,
                scale_limit: 0.15,
                rotate_limit: 20.0,
            },
            GeometricOp::Perspective {
                p: 1.0,
                scale: (0.05, 0.1),
            },
            GeometricOp::Shear { p: 1.0, limit: 10.0 },
        ]
    }

    #[test]
    fn test_sampling_is_deterministic() {
        let ops = plant_core::AugmentationConfig::default().geometric;
        let a = GeometricParams::sample(&ops, &mut seeded_rng(5));
        let b = GeometricParams::sample(&ops, &mut seeded_rng(5));
        assert_eq!(a, b);
    }

    #[test]
    fn test_sampling_advances_the_stream() {
        let ops = all_ops();
        let mut rng = seeded_rng(11);
        let first = GeometricParams::sample(&ops, &mut rng);
        let second = GeometricParams::sample(&ops, &mut rng);
        assert_ne!(first, second);
    }

    #[test]
    fn test_zero_probability_ops_produce_identity() {
        let ops = vec![
            GeometricOp::Rotate90 { p: 0.0 },
            GeometricOp::HorizontalFlip { p: 0.0 },
            GeometricOp::Shear { p: 0.0, limit: 10.0 },
        ];
        let params = GeometricParams::sample(&ops, &mut seeded_rng(1));
        assert!(params.is_identity());

        let triple = marked_triple(32, 24);
        assert_eq!(params.apply(&triple), triple);
    }

    #[test]
    fn test_horizontal_flip_mirrors_every_member() {
        let triple = marked_triple(32, 24);
        let params = GeometricParams::from_steps(vec![GeometricStep::FlipHorizontal]);
        let out = params.apply(&triple);

        assert_eq!(out.color, imageops::flip_horizontal(&triple.color));
        assert_eq!(out.mask, imageops::flip_horizontal(&triple.mask));
        assert_eq!(out.gray, imageops::flip_horizontal(&triple.gray));
    }

    #[test]
    fn test_quarter_turn_swaps_dimensions_together() {
        let triple = marked_triple(32, 24);
        let params =
            GeometricParams::from_steps(vec![GeometricStep::Rotate90 { quarter_turns: 1 }]);
        let out = params.apply(&triple);

        assert_eq!(out.dimensions(), (24, 32));
        assert!(out.is_aligned());
    }

    #[test]
    fn test_warped_mask_stays_binary() {
        let triple = marked_triple(40, 30);
        let ops = all_ops();
        let mut rng = seeded_rng(99);

        for _ in 0..20 {
            let out = apply_geometric(&triple, &ops, &mut rng);
            assert!(out.mask.pixels().all(|p| p[0] == 0 || p[0] == 255));
        }
    }

    #[test]
    fn test_alignment_of_marked_region() {
        let triple = marked_triple(40, 30);
        let ops = all_ops();

        for seed in 0..25 {
            let mut rng = seeded_rng(seed);
            let out = apply_geometric(&triple, &ops, &mut rng);
            assert!(out.is_aligned());

            let (w, h) = out.dimensions();
            let mask_c = centroid(w, h, |x, y| out.mask.get_pixel(x, y)[0] == 255);
            let color_c = centroid(w, h, |x, y| out.color.get_pixel(x, y)[1] >= 110);
            let gray_c = centroid(w, h, |x, y| out.gray.get_pixel(x, y)[0] >= 65);

            let (Some(m), Some(c), Some(g)) = (mask_c, color_c, gray_c) else {
                assert!(mask_c.is_none() && color_c.is_none() && gray_c.is_none());
                continue;
            };
            for other in [c, g] {
                assert!(
                    (m.0 - other.0).abs() < 1.5 && (m.1 - other.1).abs() < 1.5,
                    "seed {seed}: mask {m:?} vs {other:?}"
                );
            }
        }
    }

    #[test]
    fn test_shift_projection_moves_points() {
        let step = GeometricStep::ShiftScaleRotate {
            dx: 0.1,
            dy: 0.0,
            scale: 1.0,
            angle: 0.0,
        };
        let projection = step.projection((100, 50)).unwrap();
        let (x, y) = projection * (10.0, 20.0);
        assert!((x - 20.0).abs() < 1e-3);
        assert!((y - 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_reflect_101_indices() {
        let folded: Vec<u32> = (-4..9).map(|i| reflect_101(i, 5)).collect();
        assert_eq!(folded, vec![4, 3, 2, 1, 0, 1, 2, 3, 4, 3, 2, 1, 0]);
        assert_eq!(reflect_101(-7, 1), 0);
    }

    #[test]
    fn test_shift_scale_rotate_reflects_border() {
        let color = RgbImage::from_pixel(40, 30, Rgb([30, 180, 60]));
        let mask = GrayImage::from_pixel(40, 30, Luma([255]));
        let gray = GrayImage::from_pixel(40, 30, Luma([120]));
        let triple = SampleTriple::new(color.clone(), mask.clone(), gray.clone()).unwrap();

        let params = GeometricParams::from_steps(vec![GeometricStep::ShiftScaleRotate {
            dx: 0.1,
            dy: -0.05,
            scale: 0.8,
            angle: 25.0,
        }]);
        let out = params.apply(&triple);

        assert_eq!(out.color, color);
        assert_eq!(out.mask, mask);
        assert_eq!(out.gray, gray);
    }

    #[test]
    fn test_reflected_border_mirrors_content() {
        // Shifting right by 3 pulls columns 3, 2, 1 in from beyond the left edge
        let gray = GrayImage::from_fn(10, 4, |x, _| Luma([(x * 20) as u8]));
        let params = GeometricParams::from_steps(vec![GeometricStep::ShiftScaleRotate {
            dx: 0.3,
            dy: 0.0,
            scale: 1.0,
            angle: 0.0,
        }]);

        for out in [params.apply_gray(&gray), params.apply_mask(&gray)] {
            let row: Vec<u8> = (0..10).map(|x| out.get_pixel(x, 2)[0]).collect();
            assert_eq!(row, vec![60, 40, 20, 0, 20, 40, 60, 80, 100, 120]);
        }
    }

    #[test]
    fn test_shear_pads_with_zero() {
        let mask = GrayImage::from_pixel(40, 30, Luma([255]));
        let params = GeometricParams::from_steps(vec![GeometricStep::Shear { x: 20.0, y: 0.0 }]);
        let out = params.apply_mask(&mask);

        assert_eq!(out.get_pixel(0, 29)[0], 0);
        assert_eq!(out.get_pixel(39, 0)[0], 0);
        assert_eq!(out.get_pixel(20, 15)[0], 255);
    }

    #[test]
    fn test_discrete_steps_have_no_projection() {
        assert!(GeometricStep::FlipHorizontal.projection((10, 10)).is_none());
        assert!(GeometricStep::Rotate90 { quarter_turns: 2 }.projection((10, 10)).is_none());
    }
}
