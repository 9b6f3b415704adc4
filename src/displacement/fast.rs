//! FAST-9 corner detection on an image pyramid

use image::imageops::{self, FilterType};
use image::GrayImage;

/// Pixels kept clear of the image border so that orientation and
/// descriptor patches never leave the image
pub const EDGE: u32 = 20;

const ARC_LENGTH: usize = 9;
const ORIENTATION_RADIUS: i32 = 15;

/// Bresenham circle of radius 3, clockwise from 12 o'clock
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Oriented feature location
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    /// Position in level-0 pixel coordinates
    pub x: f32,
    pub y: f32,
    /// Pyramid level the point was detected on
    pub level: usize,
    /// Position in the coordinates of its own level
    pub level_x: u32,
    pub level_y: u32,
    pub score: u32,
    /// Intensity-centroid orientation in radians
    pub angle: f32,
}

/// Corner surviving non-maximum suppression, in level coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Corner {
    pub x: u32,
    pub y: u32,
    pub score: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct FastDetector {
    threshold: u8,
}

impl FastDetector {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }

    /// Detects corners at least `border` pixels away from the image edge,
    /// keeping only 3x3 local maxima of the corner score
    pub fn detect(&self, image: &GrayImage, border: u32) -> Vec<Corner> {
        let (width, height) = image.dimensions();
        let border = border.max(3);
        if width <= 2 * border || height <= 2 * border {
            return Vec::new();
        }

        let index = |x: u32, y: u32| (y * width + x) as usize;
        let mut scores = vec![0u32; (width * height) as usize];

        for y in border..height - border {
            for x in border..width - border {
                if let Some(score) = self.corner_score(image, x, y) {
                    scores[index(x, y)] = score;
                }
            }
        }

        let mut corners = Vec::new();
        for y in border..height - border {
            for x in border..width - border {
                let score = scores[index(x, y)];
                if score == 0 {
                    continue;
                }

                let mut is_max = true;
                'neighbours: for ny in y - 1..=y + 1 {
                    for nx in x - 1..=x + 1 {
                        if nx == x && ny == y {
                            continue;
                        }
                        let other = scores[index(nx, ny)];
                        // Equal scores: the first in raster order wins
                        let earlier = ny < y || (ny == y && nx < x);
                        if other > score || (other == score && earlier) {
                            is_max = false;
                            break 'neighbours;
                        }
                    }
                }

                if is_max {
                    corners.push(Corner { x, y, score });
                }
            }
        }

        corners
    }

    /// Sum of absolute differences beyond the threshold, or `None` if the
    /// pixel has no arc of 9 contiguous brighter or darker circle pixels
    fn corner_score(&self, image: &GrayImage, x: u32, y: u32) -> Option<u32> {
        let center = image.get_pixel(x, y)[0] as i32;
        let threshold = self.threshold as i32;

        let mut ring = [0i32; 16];
        for (diff, (dx, dy)) in ring.iter_mut().zip(CIRCLE.iter()) {
            *diff = sample(image, x as i32 + dx, y as i32 + dy) as i32 - center;
        }

        if !has_arc(&ring, |d| d > threshold) && !has_arc(&ring, |d| d < -threshold) {
            return None;
        }

        Some(
            ring.iter()
                .map(|d| (d.abs() - threshold).max(0) as u32)
                .sum(),
        )
    }
}

fn has_arc(ring: &[i32; 16], pred: impl Fn(i32) -> bool) -> bool {
    let mut run = 0;
    for i in 0..ring.len() + ARC_LENGTH - 1 {
        if pred(ring[i % ring.len()]) {
            run += 1;
            if run >= ARC_LENGTH {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

/// Pixel value, or 0 outside the image
pub(crate) fn sample(image: &GrayImage, x: i32, y: i32) -> u8 {
    if x < 0 || y < 0 {
        return 0;
    }
    image
        .get_pixel_checked(x as u32, y as u32)
        .map_or(0, |p| p[0])
}

/// Angle of the vector from the patch center to its intensity centroid
pub fn orientation(image: &GrayImage, x: u32, y: u32) -> f32 {
    let (cx, cy) = (x as i32, y as i32);
    let (mut m10, mut m01) = (0i64, 0i64);

    for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
        let span = ((ORIENTATION_RADIUS * ORIENTATION_RADIUS - dy * dy) as f32).sqrt() as i32;
        for dx in -span..=span {
            let value = sample(image, cx + dx, cy + dy) as i64;
            m10 += dx as i64 * value;
            m01 += dy as i64 * value;
        }
    }

    (m01 as f32).atan2(m10 as f32)
}

pub struct PyramidLevel {
    pub image: GrayImage,
    /// Level-0 pixels per pixel of this level
    pub scale: f32,
}

/// Builds up to `levels` downscaled copies; stops early once a level would
/// be too small to hold any feature
pub fn build_pyramid(image: &GrayImage, levels: usize, scale_factor: f32) -> Vec<PyramidLevel> {
    let mut pyramid = vec![PyramidLevel {
        image: image.clone(),
        scale: 1.0,
    }];

    let (width, height) = image.dimensions();
    for level in 1..levels.max(1) {
        let scale = scale_factor.powi(level as i32);
        let w = (width as f32 / scale).round() as u32;
        let h = (height as f32 / scale).round() as u32;
        if w <= 2 * EDGE || h <= 2 * EDGE {
            break;
        }

        pyramid.push(PyramidLevel {
            image: imageops::resize(image, w, h, FilterType::Triangle),
            scale,
        });
    }

    pyramid
}

/// Splits the feature budget across levels, geometrically decreasing with
/// the level area
pub fn level_budgets(max_features: usize, levels: usize, scale_factor: f32) -> Vec<usize> {
    if levels == 0 {
        return Vec::new();
    }

    let ratio = 1.0 / scale_factor as f64;
    let first = if (1.0 - ratio).abs() < f64::EPSILON {
        max_features as f64 / levels as f64
    } else {
        max_features as f64 * (1.0 - ratio) / (1.0 - ratio.powi(levels as i32))
    };

    let mut budgets = Vec::with_capacity(levels);
    let mut assigned = 0;
    for level in 0..levels - 1 {
        let n = ((first * ratio.powi(level as i32)).round() as usize)
            .min(max_features - assigned);
        budgets.push(n);
        assigned += n;
    }
    budgets.push(max_features - assigned);
    budgets
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Dark square on a bright background
    fn square_image() -> GrayImage {
        GrayImage::from_fn(80, 80, |x, y| {
            if (30..50).contains(&x) && (30..50).contains(&y) {
                Luma([20])
            } else {
                Luma([220])
            }
        })
    }

    #[test]
    fn test_flat_image_has_no_corners() {
        let flat = GrayImage::from_pixel(80, 80, Luma([128]));
        assert!(FastDetector::new(20).detect(&flat, EDGE).is_empty());
    }

    #[test]
    fn test_square_corners_detected() {
        let corners = FastDetector::new(20).detect(&square_image(), EDGE);
        assert!(!corners.is_empty());

        // Every surviving corner sits near one of the four square corners
        for corner in &corners {
            let near = [(30, 30), (49, 30), (30, 49), (49, 49)]
                .iter()
                .any(|&(cx, cy)| {
                    (corner.x as i32 - cx).abs() <= 3 && (corner.y as i32 - cy).abs() <= 3
                });
            assert!(near, "unexpected corner at {:?}", corner);
        }
    }

    #[test]
    fn test_border_is_respected() {
        let corners = FastDetector::new(20).detect(&square_image(), EDGE);
        for corner in corners {
            assert!(corner.x >= EDGE && corner.x < 80 - EDGE);
            assert!(corner.y >= EDGE && corner.y < 80 - EDGE);
        }
    }

    #[test]
    fn test_arc_detection() {
        let mut ring = [0i32; 16];
        for d in ring.iter_mut().take(8) {
            *d = 50;
        }
        assert!(!has_arc(&ring, |d| d > 20));

        // Wraps around the end of the ring
        ring[15] = 50;
        assert!(has_arc(&ring, |d| d > 20));
    }

    #[test]
    fn test_orientation_points_to_bright_side() {
        let image = GrayImage::from_fn(64, 64, |x, _| if x > 32 { Luma([255]) } else { Luma([0]) });
        let angle = orientation(&image, 32, 32);
        assert!(angle.abs() < 0.01, "angle = {}", angle);
    }

    #[test]
    fn test_pyramid_stops_when_too_small() {
        let image = GrayImage::new(100, 100);
        let pyramid = build_pyramid(&image, 8, 1.2);
        assert!(pyramid.len() < 8);
        assert_eq!(pyramid[0].scale, 1.0);
        for level in &pyramid {
            assert!(level.image.width() > 2 * EDGE);
        }
    }

    #[test]
    fn test_budgets_sum_to_total() {
        let budgets = level_budgets(500, 4, 1.2);
        assert_eq!(budgets.len(), 4);
        assert_eq!(budgets.iter().sum::<usize>(), 500);
        assert!(budgets[0] > budgets[3]);

        assert_eq!(level_budgets(500, 1, 1.2), vec![500]);
    }
}
