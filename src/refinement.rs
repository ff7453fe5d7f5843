use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::aggregator::{CorrespondenceAggregator, CoverageReport};
use crate::config::RefinementConfig;
use crate::data_loader::RgbdSequence;
use crate::detected_points::CorrespondenceSet;
use crate::error::{Error, Result};
use crate::extractor::{CorrespondenceExtractor, ExtractionContext};
use crate::sampling::{FramePair, sample_frame_pairs};
use crate::types::{RvecTvec, ToRvecTvec};
use crate::visualization::MatchSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RefinementStage {
    Initialized,
    Sampled,
    Extracted,
    Parameterized,
    Optimized,
}

/// Fixed inputs of a trajectory optimisation.
#[derive(Debug, Clone)]
pub struct OptimizationProblem<'a> {
    pub camera_matrix: na::Matrix3<f64>,
    /// Initial camera poses in axis-angle form, one per frame.
    pub poses: Vec<RvecTvec>,
    pub frame_pairs: &'a [FramePair],
    pub correspondences: &'a CorrespondenceSet,
}

#[derive(Debug, Clone)]
pub struct OptimizedTrajectory {
    pub camera_matrix: na::Matrix3<f64>,
    pub poses: Vec<RvecTvec>,
}

/// Refines intrinsics and poses from the extracted correspondences.
///
/// The crate ships no implementation. Cost function, parameterisation and
/// convergence criteria are up to the implementor.
pub trait TrajectoryOptimizer: Send + Sync {
    fn optimize(&self, problem: &OptimizationProblem<'_>) -> Result<OptimizedTrajectory>;
}

#[derive(Debug, Clone)]
pub struct RefinementOutput {
    pub camera_matrix: na::Matrix3<f64>,
    pub trajectory: Vec<na::Matrix4<f64>>,
    pub frame_pairs: Vec<FramePair>,
    pub correspondences: CorrespondenceSet,
    pub coverage: CoverageReport,
    pub stage: RefinementStage,
}

/// Sample pairs, extract correspondences and, if an optimiser is set, optimise.
pub struct PoseRefinementDriver {
    config: RefinementConfig,
    extractor: CorrespondenceExtractor,
    optimizer: Option<Box<dyn TrajectoryOptimizer>>,
    stage: RefinementStage,
}

impl PoseRefinementDriver {
    pub fn new(config: RefinementConfig) -> Result<PoseRefinementDriver> {
        let extractor = CorrespondenceExtractor::from_refinement_config(&config)?;
        Ok(PoseRefinementDriver {
            config,
            extractor,
            optimizer: None,
            stage: RefinementStage::Initialized,
        })
    }

    /// Uses a custom extractor, e.g. with other feature capabilities.
    pub fn with_extractor(mut self, extractor: CorrespondenceExtractor) -> PoseRefinementDriver {
        self.extractor = extractor;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn MatchSink>) -> PoseRefinementDriver {
        self.extractor = self.extractor.with_sink(sink);
        self
    }

    pub fn with_optimizer(mut self, optimizer: Box<dyn TrajectoryOptimizer>) -> PoseRefinementDriver {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    pub fn stage(&self) -> RefinementStage {
        self.stage
    }

    pub fn run(&mut self, sequence: &dyn RgbdSequence) -> Result<RefinementOutput> {
        self.stage = RefinementStage::Initialized;
        let num_frames = sequence.num_frames();
        let camera_matrix = sequence.camera_matrix();
        let trajectory = sequence.camera_trajectory();
        if !trajectory.is_empty() && trajectory.len() != num_frames {
            return Err(Error::DataIntegrity(format!(
                "{} frames but {} trajectory poses",
                num_frames,
                trajectory.len()
            )));
        }

        let frame_pairs = sample_frame_pairs(num_frames, self.config.frame_sampling)?;
        self.stage = RefinementStage::Sampled;
        log::debug!(
            "sampled {} frame pairs ({})",
            frame_pairs.len(),
            self.config.frame_sampling
        );

        log::info!("Extracting image feature matches...");
        let ctx = ExtractionContext::load(sequence, self.extractor.config().ignore_dynamic_objects)?;
        let (correspondences, coverage) =
            CorrespondenceAggregator::new(&self.extractor).aggregate(&ctx, &frame_pairs)?;
        self.stage = RefinementStage::Extracted;
        log::debug!("extracted {} correspondences", correspondences.len());

        let Some(optimizer) = &self.optimizer else {
            log::info!("no trajectory optimizer set, keeping the input trajectory");
            return Ok(RefinementOutput {
                camera_matrix,
                trajectory,
                frame_pairs,
                correspondences,
                coverage,
                stage: self.stage,
            });
        };

        let problem = OptimizationProblem {
            camera_matrix,
            poses: trajectory.iter().map(|t| t.to_rvec_tvec()).collect(),
            frame_pairs: &frame_pairs,
            correspondences: &correspondences,
        };
        self.stage = RefinementStage::Parameterized;
        log::debug!("parameterized {} poses", problem.poses.len());

        let optimized = optimizer.optimize(&problem)?;
        self.stage = RefinementStage::Optimized;
        let trajectory = optimized.poses.iter().map(|p| p.to_matrix()).collect();

        Ok(RefinementOutput {
            camera_matrix: optimized.camera_matrix,
            trajectory,
            frame_pairs,
            correspondences,
            coverage,
            stage: self.stage,
        })
    }
}
