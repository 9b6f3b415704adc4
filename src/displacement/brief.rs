//! Steered BRIEF descriptors

use super::fast::sample;
use image::GrayImage;
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DESCRIPTOR_BITS: usize = 256;

/// Gaussian sigma applied to a level before sampling
pub const BLUR_SIGMA: f32 = 2.0;

const PATCH_HALF: i32 = 13;
const PATTERN_SEED: u64 = 0x5EED_B41E;

/// Fixed sampling pattern shared by every extractor
static PATTERN: Lazy<Vec<[(i32, i32); 2]>> = Lazy::new(|| {
    let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
    (0..DESCRIPTOR_BITS)
        .map(|_| {
            [
                (
                    rng.gen_range(-PATCH_HALF..=PATCH_HALF),
                    rng.gen_range(-PATCH_HALF..=PATCH_HALF),
                ),
                (
                    rng.gen_range(-PATCH_HALF..=PATCH_HALF),
                    rng.gen_range(-PATCH_HALF..=PATCH_HALF),
                ),
            ]
        })
        .collect()
});

/// 256-bit binary descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BriefDescriptor(pub [u64; 4]);

impl BriefDescriptor {
    pub fn hamming(&self, other: &Self) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

pub struct BriefExtractor;

impl BriefExtractor {
    /// Describes the patch around `(x, y)` of an already smoothed image,
    /// with the sampling pattern rotated by `angle`
    pub fn describe(smoothed: &GrayImage, x: u32, y: u32, angle: f32) -> BriefDescriptor {
        let (sin, cos) = angle.sin_cos();
        let (cx, cy) = (x as i32, y as i32);
        let rotate = |(px, py): (i32, i32)| {
            let (px, py) = (px as f32, py as f32);
            (
                cx + (cos * px - sin * py).round() as i32,
                cy + (sin * px + cos * py).round() as i32,
            )
        };

        let mut bits = [0u64; 4];
        for (i, [p, q]) in PATTERN.iter().enumerate() {
            let (px, py) = rotate(*p);
            let (qx, qy) = rotate(*q);
            if sample(smoothed, px, py) < sample(smoothed, qx, qy) {
                bits[i / 64] |= 1 << (i % 64);
            }
        }

        BriefDescriptor(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn gradient() -> GrayImage {
        GrayImage::from_fn(64, 64, |x, y| Luma([((x * 3 + y * 2) % 256) as u8]))
    }

    #[test]
    fn test_pattern_is_fixed_and_bounded() {
        assert_eq!(PATTERN.len(), DESCRIPTOR_BITS);
        for [p, q] in PATTERN.iter() {
            for (x, y) in [p, q] {
                assert!(x.abs() <= PATCH_HALF && y.abs() <= PATCH_HALF);
            }
        }
    }

    #[test]
    fn test_hamming_distance() {
        let a = BriefDescriptor([0, 0, 0, 0]);
        let b = BriefDescriptor([0b1011, 0, 0, u64::MAX]);
        assert_eq!(a.hamming(&a), 0);
        assert_eq!(a.hamming(&b), 67);
        assert_eq!(b.hamming(&a), 67);
    }

    #[test]
    fn test_same_patch_same_descriptor() {
        let image = gradient();
        let a = BriefExtractor::describe(&image, 32, 32, 0.4);
        let b = BriefExtractor::describe(&image, 32, 32, 0.4);
        assert_eq!(a, b);
        assert_ne!(a, BriefDescriptor::default());
    }

    #[test]
    fn test_flat_patch_sets_no_bits() {
        let flat = GrayImage::from_pixel(64, 64, Luma([90]));
        assert_eq!(
            BriefExtractor::describe(&flat, 32, 32, 1.0),
            BriefDescriptor::default()
        );
    }
}
