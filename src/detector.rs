use anyhow::{Context as AnyhowContext, Result};
use opencv as cv2;
use cv2::prelude::*;

use crate::my_types::*;

/// Shi-Tomasi corner detection parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorParams {
    pub max_corners: i32,
    /// minimum accepted corner quality relative to the strongest corner
    pub quality_level: f64,
    pub min_distance: f64,
    pub block_size: i32,
}

pub trait FeatureDetector {
    /// Find at most `params.max_corners` trackable points in a grayscale image.
    /// A textureless image yields fewer points, possibly none.
    fn detect(&mut self, gray: &cv2::core::Mat, params: &DetectorParams) -> Result<FeatureSet>;
}

/// Detector backed by `cv::goodFeaturesToTrack`
pub struct ShiTomasiDetector {
    corners: cv2::core::Vector<cv2::core::Point2f>,
    mask: cv2::core::Mat,
}

impl ShiTomasiDetector {
    pub fn new() -> Self {
        ShiTomasiDetector {
            corners: cv2::core::Vector::new(),
            mask: cv2::core::Mat::default(),
        }
    }
}

impl Default for ShiTomasiDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureDetector for ShiTomasiDetector {
    fn detect(&mut self, gray: &cv2::core::Mat, params: &DetectorParams) -> Result<FeatureSet> {
        self.corners.clear();
        if gray.empty() {
            return Ok(vec![]);
        }
        cv2::imgproc::good_features_to_track(
            gray,
            &mut self.corners,
            params.max_corners,
            params.quality_level,
            params.min_distance,
            &self.mask,
            params.block_size,
            false,
            0.04,
        )
        .context("corner detection failed")?;

        Ok(self
            .corners
            .iter()
            .map(|p| Vector2d::new(p.x as f64, p.y as f64))
            .collect())
    }
}
