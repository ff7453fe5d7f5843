mod common;

use camera_pose_refinement::config::{ExtractorConfig, RefinementConfig};
use camera_pose_refinement::data_loader::InMemorySequence;
use camera_pose_refinement::error::{Error, Result};
use camera_pose_refinement::extractor::CorrespondenceExtractor;
use camera_pose_refinement::features::BruteForceMatcher;
use camera_pose_refinement::geometry::pose_vec_to_mat;
use camera_pose_refinement::optimization::RansacHomography;
use camera_pose_refinement::refinement::{
    OptimizationProblem, OptimizedTrajectory, PoseRefinementDriver, RefinementStage,
    TrajectoryOptimizer,
};
use camera_pose_refinement::sampling::FrameSamplingMode;
use camera_pose_refinement::types::{RvecTvec, ToRvecTvec};
use common::*;
use image::DynamicImage;
use nalgebra as na;

fn sequence(num_frames: usize) -> InMemorySequence {
    let trajectory = (0..num_frames)
        .map(|i| {
            let m = pose_vec_to_mat(&na::dvector![0.0, 0.01 * i as f64, 0.0, 0.1 * i as f64, 0.0, 0.0])
                .unwrap();
            na::Matrix4::from_iterator(m.iter().cloned())
        })
        .collect();
    InMemorySequence {
        frames: (0..num_frames)
            .map(|_| DynamicImage::ImageLuma8(tagged_frame(1)))
            .collect(),
        depth_maps: (0..num_frames).map(|_| constant_depth(1.0)).collect(),
        masks: None,
        camera_matrix: na::Matrix3::new(500.0, 0.0, 64.0, 0.0, 500.0, 48.0, 0.0, 0.0, 1.0),
        trajectory,
    }
}

fn scripted_extractor() -> CorrespondenceExtractor {
    let points = spread_points(30);
    let detector = ScriptedDetector::default()
        .with(1, keypoints(&points, (0..30).map(|k| one_hot(k, 30)).collect()));
    CorrespondenceExtractor::with_components(
        ExtractorConfig {
            min_features: 20,
            max_features: None,
            ignore_dynamic_objects: false,
        },
        Box::new(detector),
        Box::new(BruteForceMatcher),
        Box::new(RansacHomography::default()),
    )
    .unwrap()
}

fn driver(mode: FrameSamplingMode) -> PoseRefinementDriver {
    let config = RefinementConfig {
        frame_sampling: mode,
        mask_features: false,
        ..Default::default()
    };
    PoseRefinementDriver::new(config)
        .unwrap()
        .with_extractor(scripted_extractor())
}

/// Shifts every pose along x and doubles the focal length.
struct ShiftOptimizer;

impl TrajectoryOptimizer for ShiftOptimizer {
    fn optimize(&self, problem: &OptimizationProblem<'_>) -> Result<OptimizedTrajectory> {
        assert!(!problem.correspondences.is_empty());
        let poses = problem
            .poses
            .iter()
            .map(|p| {
                let mut v = p.to_pose_vector();
                v[3] += 1.0;
                RvecTvec::from_pose_vector(&v)
            })
            .collect::<Result<Vec<_>>>()?;
        let mut camera_matrix = problem.camera_matrix;
        camera_matrix[(0, 0)] *= 2.0;
        Ok(OptimizedTrajectory {
            camera_matrix,
            poses,
        })
    }
}

#[test]
fn test_run_without_optimizer_stops_after_extraction() {
    let seq = sequence(5);
    let mut driver = driver(FrameSamplingMode::Hierarchical);
    assert_eq!(driver.stage(), RefinementStage::Initialized);

    let output = driver.run(&seq).unwrap();
    assert_eq!(output.stage, RefinementStage::Extracted);
    assert_eq!(driver.stage(), RefinementStage::Extracted);
    assert_eq!(output.frame_pairs.len(), 7);
    assert_eq!(output.coverage.accepted_pairs, 7);
    assert_eq!(output.coverage.coverage, 1.0);
    assert_eq!(output.correspondences.len(), 7 * 30);
    assert_eq!(output.camera_matrix, seq.camera_matrix);
    assert_eq!(output.trajectory, seq.trajectory);
}

#[test]
fn test_run_with_optimizer_reaches_optimized() {
    let seq = sequence(3);
    let mut driver = driver(FrameSamplingMode::Consecutive).with_optimizer(Box::new(ShiftOptimizer));

    let output = driver.run(&seq).unwrap();
    assert_eq!(output.stage, RefinementStage::Optimized);
    assert_eq!(output.camera_matrix[(0, 0)], 1000.0);
    assert_eq!(output.trajectory.len(), 3);
    for (refined, initial) in output.trajectory.iter().zip(&seq.trajectory) {
        let delta = refined.to_rvec_tvec().to_pose_vector() - initial.to_rvec_tvec().to_pose_vector();
        assert!((delta[3] - 1.0).abs() < 1e-9);
        assert!(delta.rows(0, 3).norm() < 1e-9);
    }
}

#[test]
fn test_run_with_masking_needs_masks() {
    let seq = sequence(3);
    let config = RefinementConfig {
        frame_sampling: FrameSamplingMode::Consecutive,
        ..Default::default()
    };
    let mut driver = PoseRefinementDriver::new(config).unwrap();
    assert!(matches!(driver.run(&seq), Err(Error::DataIntegrity(_))));
    assert_eq!(driver.stage(), RefinementStage::Sampled);
}

#[test]
fn test_run_with_single_frame() {
    let seq = sequence(1);
    let mut driver = driver(FrameSamplingMode::Hierarchical);
    assert!(matches!(driver.run(&seq), Err(Error::Configuration(_))));
    assert_eq!(driver.stage(), RefinementStage::Initialized);
}

#[test]
fn test_invalid_config_fails_at_construction() {
    let config = RefinementConfig {
        min_features_per_frame: 4,
        ..Default::default()
    };
    assert!(matches!(
        PoseRefinementDriver::new(config),
        Err(Error::Configuration(_))
    ));

    let config = RefinementConfig {
        min_features_per_frame: 40,
        max_features_per_frame: Some(40),
        ..Default::default()
    };
    assert!(PoseRefinementDriver::new(config).is_err());
}

#[test]
fn test_stages_are_ordered() {
    assert!(RefinementStage::Initialized < RefinementStage::Sampled);
    assert!(RefinementStage::Sampled < RefinementStage::Extracted);
    assert!(RefinementStage::Extracted < RefinementStage::Parameterized);
    assert!(RefinementStage::Parameterized < RefinementStage::Optimized);
}
