use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sampling::FrameSamplingMode;

/// Harris corner detector and patch descriptor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarrisConfig {
    /// Harris sensitivity `k` in `det(M) - k * trace(M)^2`.
    pub k: f32,
    /// Half size of the structure tensor window.
    pub window_radius: u32,
    /// Responses below `relative_threshold * max_response` are dropped.
    pub relative_threshold: f32,
    /// Half size of the non-maximum suppression neighbourhood.
    pub nms_radius: u32,
    /// Half size of the square intensity patch used as descriptor.
    pub descriptor_radius: u32,
}

impl Default for HarrisConfig {
    fn default() -> Self {
        Self {
            k: 0.04,
            window_radius: 2,
            relative_threshold: 0.01,
            nms_radius: 2,
            descriptor_radius: 4,
        }
    }
}

impl HarrisConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.k.is_finite() && self.k > 0.0 && self.k < 0.25) {
            return Err(Error::Configuration(format!(
                "harris `k` must be in (0, 0.25), but got {}",
                self.k
            )));
        }
        if !(0.0..1.0).contains(&self.relative_threshold) {
            return Err(Error::Configuration(format!(
                "harris `relative_threshold` must be in [0, 1), but got {}",
                self.relative_threshold
            )));
        }
        // a 1x1 window has a singular structure tensor everywhere
        if self.window_radius == 0 {
            return Err(Error::Configuration(
                "harris `window_radius` must be at least 1".to_string(),
            ));
        }
        if self.descriptor_radius == 0 {
            return Err(Error::Configuration(
                "harris `descriptor_radius` must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    /// Maximum transfer error in pixels for a point pair to count as inlier.
    pub reprojection_threshold: f64,
    pub max_iters: usize,
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            reprojection_threshold: 3.0,
            max_iters: 2000,
            confidence: 0.995,
            seed: 0,
        }
    }
}

impl RansacConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.reprojection_threshold.is_finite() && self.reprojection_threshold > 0.0) {
            return Err(Error::Configuration(format!(
                "ransac `reprojection_threshold` must be a positive number of pixels, but got {}",
                self.reprojection_threshold
            )));
        }
        if self.max_iters == 0 {
            return Err(Error::Configuration(
                "ransac `max_iters` must be at least 1".to_string(),
            ));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(Error::Configuration(format!(
                "ransac `confidence` must be in (0, 1), but got {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// Per-pair correspondence extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Minimum number of matched features required per frame pair.
    pub min_features: usize,
    /// Optional cap on the number of keypoints detected per frame.
    pub max_features: Option<usize>,
    /// Skip keypoints on dynamic objects.
    pub ignore_dynamic_objects: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_features: 20,
            max_features: None,
            ignore_dynamic_objects: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    pub frame_sampling: FrameSamplingMode,
    pub mask_features: bool,
    pub min_features_per_frame: usize,
    pub max_features_per_frame: Option<usize>,
    pub harris: HarrisConfig,
    pub ransac: RansacConfig,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            frame_sampling: FrameSamplingMode::Hierarchical,
            mask_features: true,
            min_features_per_frame: 20,
            max_features_per_frame: Some(2048),
            harris: HarrisConfig::default(),
            ransac: RansacConfig::default(),
        }
    }
}

impl RefinementConfig {
    pub fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            min_features: self.min_features_per_frame,
            max_features: self.max_features_per_frame,
            ignore_dynamic_objects: self.mask_features,
        }
    }
}
