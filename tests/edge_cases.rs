mod common;

use camera_pose_refinement::config::ExtractorConfig;
use camera_pose_refinement::detected_points::{CorrespondenceSet, PairCorrespondences};
use camera_pose_refinement::extractor::{
    CorrespondenceExtractor, ExtractionContext, PairOutcome, RejectionStage,
};
use camera_pose_refinement::features::BruteForceMatcher;
use camera_pose_refinement::optimization::RansacHomography;
use common::*;
use glam::Vec2;

fn extractor(detector: ScriptedDetector) -> CorrespondenceExtractor {
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

fn context() -> ExtractionContext {
    ExtractionContext::new(
        vec![tagged_frame(0), tagged_frame(1)],
        vec![constant_depth(1.0), constant_depth(1.0)],
        None,
    )
    .unwrap()
}

#[test]
fn test_exactly_min_features_is_accepted() {
    let points = spread_points(20);
    let descriptors = || (0..20).map(|k| one_hot(k, 20)).collect::<Vec<_>>();
    let detector = ScriptedDetector::default()
        .with(0, keypoints(&points, descriptors()))
        .with(1, keypoints(&points, descriptors()));

    let result = extractor(detector).extract_pair(&context(), (0, 1)).unwrap();
    let PairOutcome::Accepted(pair) = result.outcome else {
        panic!("expected acceptance");
    };
    assert_eq!(pair.len(), 20);
}

#[test]
fn test_single_train_keypoint_has_no_ratio_candidates() {
    let points = spread_points(25);
    let detector = ScriptedDetector::default()
        .with(0, keypoints(&points, (0..25).map(|k| one_hot(k, 25)).collect()))
        .with(1, keypoints(&points[..1], vec![one_hot(0, 25)]));

    let result = extractor(detector).extract_pair(&context(), (0, 1)).unwrap();
    // frame j is below min_features already
    assert_eq!(
        result.outcome,
        PairOutcome::Rejected(RejectionStage::InsufficientKeypoints)
    );
}

#[test]
fn test_duplicate_exact_matches_pass_ratio_test() {
    // every train descriptor appears twice, the best and second best are both 0 apart
    let points = spread_points(30);
    let mut train_points = points.clone();
    train_points.extend(points.iter().map(|p| *p + Vec2::new(0.25, 0.0)));
    let detector = ScriptedDetector::default()
        .with(0, keypoints(&points, (0..30).map(|k| one_hot(k, 30)).collect()))
        .with(
            1,
            keypoints(&train_points, (0..60).map(|k| one_hot(k % 30, 30)).collect()),
        );

    let result = extractor(detector).extract_pair(&context(), (0, 1)).unwrap();
    assert_eq!(result.stats.filtered_matches, 30);
    assert!(result.is_accepted());
}

#[test]
fn test_correspondence_set_sides_stay_parallel() {
    let mut set = CorrespondenceSet::default();
    assert!(set.is_empty());
    for (i, j, n) in [(0, 1, 3), (4, 6, 2)] {
        set.extend_from_pair(&PairCorrespondences {
            frame_i: i,
            frame_j: j,
            points_i: vec![Vec2::new(i as f32, 0.0); n],
            points_j: vec![Vec2::new(j as f32, 0.0); n],
            depth_i: vec![1.0; n],
            depth_j: vec![2.0; n],
        });
    }
    assert_eq!(set.len(), 5);
    assert_eq!(set.frame_i.index, vec![0, 0, 0, 4, 4]);
    assert_eq!(set.frame_j.index, vec![1, 1, 1, 6, 6]);
    assert_eq!(set.frame_j.points[4], Vec2::new(6.0, 0.0));
    let mut frames: Vec<usize> = set.frame_indices().collect();
    frames.sort();
    frames.dedup();
    assert_eq!(frames, vec![0, 1, 4, 6]);
}
