use glam::Vec2;
use image::GrayImage;
use indicatif::ParallelProgressIterator;
use nalgebra as na;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{ExtractorConfig, HarrisConfig, RansacConfig, RefinementConfig};
use crate::data_loader::RgbdSequence;
use crate::detected_points::{Keypoint, PairCorrespondences};
use crate::error::{Error, Result};
use crate::features::{BruteForceMatcher, DescriptorMatcher, HarrisDetector, KeypointDetector};
use crate::optimization::homography::{RansacHomography, RobustHomographyFitter};
use crate::sampling::FramePair;
use crate::visualization::{MatchSink, PairDiagnostics};

/// Lowe's ratio: the best candidate must be at most this fraction of the second best.
pub const LOWE_RATIO: f32 = 0.7;
/// Smallest accepted `min_features`.
pub const MIN_FEATURES_FLOOR: usize = 5;
/// Below this `min_features` the results are usually too noisy to be useful.
pub const RECOMMENDED_MIN_FEATURES: usize = 20;

/// Frames, depth maps and masks of one run, loaded once and never mutated.
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    frames: Vec<GrayImage>,
    depth_maps: Vec<na::DMatrix<f32>>,
    masks: Option<Vec<GrayImage>>,
}

impl ExtractionContext {
    pub fn new(
        frames: Vec<GrayImage>,
        depth_maps: Vec<na::DMatrix<f32>>,
        masks: Option<Vec<GrayImage>>,
    ) -> Result<ExtractionContext> {
        if frames.len() != depth_maps.len() {
            return Err(Error::DataIntegrity(format!(
                "{} frames but {} depth maps",
                frames.len(),
                depth_maps.len()
            )));
        }
        for (index, (frame, depth)) in frames.iter().zip(&depth_maps).enumerate() {
            let (w, h) = frame.dimensions();
            if depth.shape() != (h as usize, w as usize) {
                return Err(Error::DataIntegrity(format!(
                    "depth map {} is {}x{} but the frame is {}x{}",
                    index,
                    depth.ncols(),
                    depth.nrows(),
                    w,
                    h
                )));
            }
        }
        if let Some(masks) = &masks {
            if masks.len() != frames.len() {
                return Err(Error::DataIntegrity(format!(
                    "{} frames but {} masks",
                    frames.len(),
                    masks.len()
                )));
            }
            for (index, (frame, mask)) in frames.iter().zip(masks).enumerate() {
                if frame.dimensions() != mask.dimensions() {
                    return Err(Error::DataIntegrity(format!(
                        "mask {} is {:?} but the frame is {:?}",
                        index,
                        mask.dimensions(),
                        frame.dimensions()
                    )));
                }
            }
        }
        Ok(ExtractionContext {
            frames,
            depth_maps,
            masks,
        })
    }

    /// Loads every frame (as grayscale), depth map and, if requested, mask.
    pub fn load(sequence: &dyn RgbdSequence, with_masks: bool) -> Result<ExtractionContext> {
        let num_frames = sequence.num_frames();

        log::info!("Loading frames...");
        let frames = (0..num_frames)
            .into_par_iter()
            .progress_count(num_frames as u64)
            .map(|i| sequence.rgb_frame(i).map(|f| f.to_luma8()))
            .collect::<Result<Vec<_>>>()?;

        log::info!("Loading depth maps...");
        let depth_maps = (0..num_frames)
            .into_par_iter()
            .progress_count(num_frames as u64)
            .map(|i| sequence.depth_map(i))
            .collect::<Result<Vec<_>>>()?;

        let masks = if with_masks {
            log::info!("Loading masks...");
            let masks = (0..num_frames)
                .into_par_iter()
                .progress_count(num_frames as u64)
                .map(|i| {
                    sequence.dynamic_object_mask(i)?.ok_or_else(|| {
                        Error::DataIntegrity(format!(
                            "dynamic object masking is enabled but frame {} has no mask",
                            i
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Some(masks)
        } else {
            None
        };

        ExtractionContext::new(frames, depth_maps, masks)
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, index: usize) -> &GrayImage {
        &self.frames[index]
    }

    pub fn depth_map(&self, index: usize) -> &na::DMatrix<f32> {
        &self.depth_maps[index]
    }

    pub fn mask(&self, index: usize) -> Option<&GrayImage> {
        self.masks.as_ref().map(|m| &m[index])
    }

    pub fn has_masks(&self) -> bool {
        self.masks.is_some()
    }
}

/// Stage at which a frame pair was turned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionStage {
    /// Too few keypoints in one of the frames; matching is skipped.
    InsufficientKeypoints,
    /// Too few matches left after the ratio test and depth check.
    InsufficientMatches,
    /// Too few matches consistent with the robust homography.
    InsufficientInliers,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PairOutcome {
    Accepted(PairCorrespondences),
    Rejected(RejectionStage),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairStats {
    pub keypoints_i: usize,
    pub keypoints_j: usize,
    pub candidate_matches: usize,
    pub filtered_matches: usize,
    pub inliers: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairResult {
    pub pair: FramePair,
    pub outcome: PairOutcome,
    pub stats: PairStats,
}

impl PairResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self.outcome, PairOutcome::Accepted(_))
    }
}

/// Depth at the nearest pixel, `None` outside the map or where the depth is not positive.
pub fn depth_at(depth: &na::DMatrix<f32>, pt: Vec2) -> Option<f32> {
    if !pt.is_finite() {
        return None;
    }
    let row = pt.y.round_ties_even();
    let col = pt.x.round_ties_even();
    if row < 0.0 || col < 0.0 {
        return None;
    }
    let d = *depth.get((row as usize, col as usize))?;
    (d > 0.0 && d.is_finite()).then_some(d)
}

fn retain_inliers<T>(values: Vec<T>, inliers: &[bool]) -> Vec<T> {
    values
        .into_iter()
        .zip(inliers)
        .filter_map(|(v, &inlier)| inlier.then_some(v))
        .collect()
}

/// Fails on invalid settings and warns about settings that usually give poor results.
pub fn validate_config(config: &ExtractorConfig) -> Result<()> {
    let min_features = config.min_features;
    if min_features < MIN_FEATURES_FLOOR {
        return Err(Error::Configuration(format!(
            "`min_features` must be at least {}, but got {}",
            MIN_FEATURES_FLOOR, min_features
        )));
    }
    if let Some(max_features) = config.max_features {
        if max_features <= min_features {
            return Err(Error::Configuration(format!(
                "`max_features` must be greater than `min_features` ({}), but got {}",
                min_features, max_features
            )));
        }
        if max_features < min_features.saturating_mul(2) {
            log::warn!(
                "`max_features` was set to {}, it is recommended to use at least 2 * `min_features` ({}) so that enough matches survive filtering",
                max_features,
                min_features.saturating_mul(2)
            );
        }
    }
    if min_features < RECOMMENDED_MIN_FEATURES {
        log::warn!(
            "`min_features` was set to {}, it is recommended to use at least {}; fewer usually gives a low SNR and bad results",
            min_features,
            RECOMMENDED_MIN_FEATURES
        );
    }
    Ok(())
}

/// Finds depth-validated, geometrically consistent matches between two frames.
pub struct CorrespondenceExtractor {
    config: ExtractorConfig,
    detector: Box<dyn KeypointDetector>,
    matcher: Box<dyn DescriptorMatcher>,
    fitter: Box<dyn RobustHomographyFitter>,
    sink: Option<Box<dyn MatchSink>>,
}

impl CorrespondenceExtractor {
    /// Harris keypoints, brute force matching and RANSAC with default settings.
    pub fn new(config: ExtractorConfig) -> Result<CorrespondenceExtractor> {
        let detector = HarrisDetector::new(HarrisConfig::default(), config.max_features);
        CorrespondenceExtractor::with_components(
            config,
            Box::new(detector),
            Box::new(BruteForceMatcher),
            Box::new(RansacHomography::new(RansacConfig::default())),
        )
    }

    pub fn from_refinement_config(config: &RefinementConfig) -> Result<CorrespondenceExtractor> {
        let extractor_config = config.extractor_config();
        let detector = HarrisDetector::new(config.harris.clone(), extractor_config.max_features);
        CorrespondenceExtractor::with_components(
            extractor_config,
            Box::new(detector),
            Box::new(BruteForceMatcher),
            Box::new(RansacHomography::new(config.ransac.clone())),
        )
    }

    pub fn with_components(
        config: ExtractorConfig,
        detector: Box<dyn KeypointDetector>,
        matcher: Box<dyn DescriptorMatcher>,
        fitter: Box<dyn RobustHomographyFitter>,
    ) -> Result<CorrespondenceExtractor> {
        validate_config(&config)?;
        detector.validate()?;
        fitter.validate()?;
        Ok(CorrespondenceExtractor {
            config,
            detector,
            matcher,
            fitter,
            sink: None,
        })
    }

    pub fn with_sink(mut self, sink: Box<dyn MatchSink>) -> CorrespondenceExtractor {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    fn keypoints(&self, ctx: &ExtractionContext, index: usize) -> Result<Vec<Keypoint>> {
        let mask = if self.config.ignore_dynamic_objects {
            Some(ctx.mask(index).ok_or_else(|| {
                Error::DataIntegrity(
                    "dynamic objects are ignored but the context has no masks".to_string(),
                )
            })?)
        } else {
            None
        };
        Ok(self.detector.detect_and_compute(ctx.frame(index), mask))
    }

    fn record(&self, diagnostics: PairDiagnostics<'_>) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.record(&diagnostics) {
                log::warn!(
                    "could not record diagnostics for pair {:?}: {}",
                    diagnostics.pair,
                    e
                );
            }
        }
    }

    /// Runs detection, matching and filtering for one frame pair.
    ///
    /// Rejection is a normal outcome; errors only come from invalid indices or
    /// a context that does not fit the configuration.
    pub fn extract_pair(&self, ctx: &ExtractionContext, pair: FramePair) -> Result<PairResult> {
        let (i, j) = pair;
        for index in [i, j] {
            if index >= ctx.num_frames() {
                return Err(Error::DataIntegrity(format!(
                    "frame pair {:?} references frame {} but there are only {} frames",
                    pair,
                    index,
                    ctx.num_frames()
                )));
            }
        }
        let min_features = self.config.min_features;

        let keypoints_i = self.keypoints(ctx, i)?;
        let keypoints_j = self.keypoints(ctx, j)?;
        let mut stats = PairStats {
            keypoints_i: keypoints_i.len(),
            keypoints_j: keypoints_j.len(),
            ..Default::default()
        };

        if keypoints_i.len().min(keypoints_j.len()) < min_features {
            log::trace!("pair {:?}: not enough keypoints ({:?})", pair, stats);
            return Ok(PairResult {
                pair,
                outcome: PairOutcome::Rejected(RejectionStage::InsufficientKeypoints),
                stats,
            });
        }

        let matches = self.matcher.knn_match(&keypoints_i, &keypoints_j, 2);
        stats.candidate_matches = matches.len();

        let depth_map_i = ctx.depth_map(i);
        let depth_map_j = ctx.depth_map(j);
        let mut match_mask = vec![false; matches.len()];
        let mut accepted_candidates = Vec::new();
        let mut points_i = Vec::new();
        let mut points_j = Vec::new();
        let mut depth_i = Vec::new();
        let mut depth_j = Vec::new();

        for (k, candidates) in matches.iter().enumerate() {
            let [m, n, ..] = candidates.as_slice() else {
                continue;
            };
            if m.distance > LOWE_RATIO * n.distance {
                continue;
            }
            let point_i = keypoints_i[m.query_idx].pt;
            let point_j = keypoints_j[m.train_idx].pt;
            let (Some(d_i), Some(d_j)) = (
                depth_at(depth_map_i, point_i),
                depth_at(depth_map_j, point_j),
            ) else {
                continue;
            };

            match_mask[k] = true;
            accepted_candidates.push(k);
            points_i.push(point_i);
            points_j.push(point_j);
            depth_i.push(d_i);
            depth_j.push(d_j);
        }
        stats.filtered_matches = points_i.len();
        log::trace!(
            "pair {:?}: {}/{} matches pass ratio and depth checks",
            pair,
            points_i.len(),
            matches.len()
        );

        let diagnostics = |match_mask: &[bool], stats: &PairStats, accepted: bool| {
            PairDiagnostics {
                pair,
                accepted,
                frame_i: ctx.frame(i),
                frame_j: ctx.frame(j),
                keypoints_i: &keypoints_i,
                keypoints_j: &keypoints_j,
                matches: &matches,
                match_mask: match_mask.to_vec(),
                stats: *stats,
            }
        };

        if points_i.len() < min_features {
            self.record(diagnostics(&match_mask, &stats, false));
            return Ok(PairResult {
                pair,
                outcome: PairOutcome::Rejected(RejectionStage::InsufficientMatches),
                stats,
            });
        }

        let inliers = self
            .fitter
            .fit(&points_i, &points_j)
            .map(|fit| fit.inliers)
            .filter(|inliers| inliers.len() == points_i.len())
            .unwrap_or_else(|| vec![false; points_i.len()]);
        for (idx, &k) in accepted_candidates.iter().enumerate() {
            if !inliers[idx] {
                match_mask[k] = false;
            }
        }
        let points_i = retain_inliers(points_i, &inliers);
        let points_j = retain_inliers(points_j, &inliers);
        let depth_i = retain_inliers(depth_i, &inliers);
        let depth_j = retain_inliers(depth_j, &inliers);
        stats.inliers = points_i.len();

        if points_i.len() < min_features {
            self.record(diagnostics(&match_mask, &stats, false));
            return Ok(PairResult {
                pair,
                outcome: PairOutcome::Rejected(RejectionStage::InsufficientInliers),
                stats,
            });
        }

        self.record(diagnostics(&match_mask, &stats, true));
        Ok(PairResult {
            pair,
            outcome: PairOutcome::Accepted(PairCorrespondences {
                frame_i: i,
                frame_j: j,
                points_i,
                points_j,
                depth_i,
                depth_j,
            }),
            stats,
        })
    }
}
