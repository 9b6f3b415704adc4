//! Inter-camera displacement estimation
//!
//! ORB-style pipeline: FAST-9 corners on a scale pyramid, intensity-centroid
//! orientation, steered BRIEF descriptors, cross-checked Hamming matching.
//! The mean offset of the matched keypoints is scaled to physical units and
//! passed through a per-axis hysteresis filter.

mod brief;
mod fast;
mod hysteresis;
mod matcher;

pub use brief::{BriefDescriptor, BriefExtractor, BLUR_SIGMA, DESCRIPTOR_BITS};
pub use fast::{build_pyramid, FastDetector, KeyPoint, EDGE};
pub use hysteresis::Hysteresis;
pub use matcher::{cross_check_match, Match};

use crate::frame::Frame;
use crate::session::CameraSession;
use image::{imageops, DynamicImage, GrayImage};
use thiserror::Error;
use tracing::{debug, trace};

/// Estimator tuning
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorConfig {
    /// Physical units per pixel of displacement
    pub units_per_pixel: f64,
    /// Minimum change before a new value is reported, in physical units
    pub threshold: f64,
    pub max_features: usize,
    pub fast_threshold: u8,
    pub pyramid_levels: usize,
    pub scale_factor: f32,
    /// Drop cross-checked matches farther apart than this
    pub max_hamming_distance: Option<u32>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            units_per_pixel: 0.1,
            threshold: 1.0,
            max_features: 500,
            fast_threshold: 20,
            pyramid_levels: 4,
            scale_factor: 1.2,
            max_hamming_distance: None,
        }
    }
}

/// Displacement in physical units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Displacement {
    pub dx: f64,
    pub dy: f64,
}

/// Raw mean keypoint offset in level-0 pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelShift {
    pub dx: f64,
    pub dy: f64,
    pub matches: usize,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EstimateError {
    #[error("not enough features (reference {reference}, target {target})")]
    InsufficientFeatures { reference: usize, target: usize },

    #[error("no descriptor matches")]
    NoMatches,
}

/// Keypoints and their descriptors, index-aligned
#[derive(Debug, Clone, Default)]
pub struct Features {
    pub keypoints: Vec<KeyPoint>,
    pub descriptors: Vec<BriefDescriptor>,
}

impl Features {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Detects and describes up to `config.max_features` oriented features
pub fn extract_features(image: &GrayImage, config: &EstimatorConfig) -> Features {
    let detector = FastDetector::new(config.fast_threshold);
    let pyramid = build_pyramid(image, config.pyramid_levels, config.scale_factor);
    let budgets = fast::level_budgets(config.max_features, pyramid.len(), config.scale_factor);

    let mut features = Features::default();

    for (level, (layer, budget)) in pyramid.iter().zip(budgets).enumerate() {
        let mut corners = detector.detect(&layer.image, EDGE);
        corners.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.y.cmp(&b.y))
                .then(a.x.cmp(&b.x))
        });
        corners.truncate(budget);
        if corners.is_empty() {
            continue;
        }

        let smoothed = imageops::blur(&layer.image, BLUR_SIGMA);
        for corner in corners {
            let angle = fast::orientation(&layer.image, corner.x, corner.y);
            features.descriptors.push(BriefExtractor::describe(
                &smoothed, corner.x, corner.y, angle,
            ));
            features.keypoints.push(KeyPoint {
                x: corner.x as f32 * layer.scale,
                y: corner.y as f32 * layer.scale,
                level,
                level_x: corner.x,
                level_y: corner.y,
                score: corner.score,
                angle,
            });
        }
    }

    trace!(features = features.len(), levels = pyramid.len(), "Features extracted");
    features
}

/// Stateful displacement estimator
///
/// The hysteresis state persists across calls, so one estimator should be
/// used per camera pair.
#[derive(Debug, Clone)]
pub struct DisplacementEstimator {
    config: EstimatorConfig,
    x: Hysteresis,
    y: Hysteresis,
    last: Option<Displacement>,
}

impl DisplacementEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            x: Hysteresis::new(config.threshold),
            y: Hysteresis::new(config.threshold),
            config,
            last: None,
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Result of the most recent estimate
    pub fn last(&self) -> Option<Displacement> {
        self.last
    }

    /// Mean pixel shift from `reference` to `target`, without calibration
    /// or hysteresis
    pub fn measure(
        &self,
        reference: &GrayImage,
        target: &GrayImage,
    ) -> Result<PixelShift, EstimateError> {
        let reference = extract_features(reference, &self.config);
        let target = extract_features(target, &self.config);
        self.measure_features(&reference, &target)
    }

    pub fn measure_features(
        &self,
        reference: &Features,
        target: &Features,
    ) -> Result<PixelShift, EstimateError> {
        if reference.is_empty() || target.is_empty() {
            return Err(EstimateError::InsufficientFeatures {
                reference: reference.len(),
                target: target.len(),
            });
        }

        let mut matches = cross_check_match(&reference.descriptors, &target.descriptors);
        if let Some(max) = self.config.max_hamming_distance {
            matches.retain(|m| m.distance <= max);
        }
        if matches.is_empty() {
            return Err(EstimateError::NoMatches);
        }

        matches.sort_by_key(|m| (m.distance, m.query));

        let (sum_x, sum_y) = matches.iter().fold((0.0f64, 0.0f64), |(sx, sy), m| {
            let src = &reference.keypoints[m.query];
            let dst = &target.keypoints[m.train];
            (sx + (dst.x - src.x) as f64, sy + (dst.y - src.y) as f64)
        });

        let n = matches.len() as f64;
        Ok(PixelShift {
            dx: sum_x / n,
            dy: sum_y / n,
            matches: matches.len(),
        })
    }

    /// Scales a pixel shift to physical units and runs it through hysteresis
    pub fn apply(&mut self, shift: PixelShift) -> Displacement {
        let displacement = Displacement {
            dx: self.x.apply(shift.dx * self.config.units_per_pixel),
            dy: self.y.apply(shift.dy * self.config.units_per_pixel),
        };
        self.last = Some(displacement);
        displacement
    }

    /// Displacement of `target` relative to `reference`, or `None` when
    /// either image yields no features or nothing matches
    pub fn estimate(
        &mut self,
        reference: &DynamicImage,
        target: &DynamicImage,
    ) -> Option<Displacement> {
        self.estimate_luma(&reference.to_luma8(), &target.to_luma8())
    }

    pub fn estimate_frames(&mut self, reference: &Frame, target: &Frame) -> Option<Displacement> {
        self.estimate_luma(&reference.luma(), &target.luma())
    }

    fn estimate_luma(&mut self, reference: &GrayImage, target: &GrayImage) -> Option<Displacement> {
        match self.measure(reference, target) {
            Ok(shift) => {
                trace!(
                    dx = shift.dx,
                    dy = shift.dy,
                    matches = shift.matches,
                    "Pixel shift measured"
                );
                Some(self.apply(shift))
            }
            Err(e) => {
                debug!(error = %e, "No displacement estimate");
                self.last = None;
                None
            }
        }
    }

    /// Estimates from the latest cached frames of two sessions
    ///
    /// `None` if either session has not produced a frame yet. Runs feature
    /// extraction inline, so call it off the async executor.
    pub fn compute(
        &mut self,
        reference: &CameraSession,
        target: &CameraSession,
    ) -> Option<Displacement> {
        let (Some(a), Some(b)) = (reference.latest_frame(), target.latest_frame()) else {
            self.last = None;
            return None;
        };
        self.estimate_frames(&a, &b)
    }

    /// Clears the hysteresis state
    pub fn reset(&mut self) {
        self.x.reset();
        self.y.reset();
        self.last = None;
    }
}

impl Default for DisplacementEstimator {
    fn default() -> Self {
        Self::new(EstimatorConfig::default())
    }
}
