use std::collections::HashSet;
use std::str::FromStr;

use camera_pose_refinement::error::Error;
use camera_pose_refinement::sampling::{FrameSamplingMode, sample_frame_pairs};

#[test]
fn test_hierarchical_five_frames() {
    let pairs = sample_frame_pairs(5, FrameSamplingMode::Hierarchical).unwrap();
    assert_eq!(
        pairs,
        vec![(0, 1), (1, 2), (2, 3), (3, 4), (0, 2), (2, 4), (0, 4)]
    );
}

#[test]
fn test_hierarchical_non_power_of_two() {
    let pairs = sample_frame_pairs(6, FrameSamplingMode::Hierarchical).unwrap();
    assert_eq!(
        pairs,
        vec![
            (0, 1),
            (1, 2),
            (2, 3),
            (3, 4),
            (4, 5),
            (0, 2),
            (2, 4),
            (0, 4)
        ]
    );
}

#[test]
fn test_hierarchical_nine_frames() {
    let pairs = sample_frame_pairs(9, FrameSamplingMode::Hierarchical).unwrap();
    assert!(pairs.contains(&(0, 1)));
    assert!(pairs.contains(&(0, 8)));
    assert!(pairs.iter().all(|&(_, j)| j < 9));
    assert_eq!(pairs.len(), 8 + 4 + 2 + 1);
}

#[test]
fn test_consecutive() {
    let pairs = sample_frame_pairs(5, FrameSamplingMode::Consecutive).unwrap();
    assert_eq!(pairs, vec![(0, 1), (1, 2), (2, 3), (3, 4)]);
}

#[test]
fn test_exhaustive_counts_and_uniqueness() {
    for n in [2, 3, 7, 12] {
        let pairs = sample_frame_pairs(n, FrameSamplingMode::Exhaustive).unwrap();
        assert_eq!(pairs.len(), n * (n - 1) / 2);
        let unique: HashSet<_> = pairs.iter().collect();
        assert_eq!(unique.len(), pairs.len());
        assert!(pairs.iter().all(|&(i, j)| i < j && j < n));
    }
}

#[test]
fn test_hierarchical_pairs_are_unique_and_in_range() {
    for n in 2..40 {
        let pairs = sample_frame_pairs(n, FrameSamplingMode::Hierarchical).unwrap();
        let unique: HashSet<_> = pairs.iter().collect();
        assert_eq!(unique.len(), pairs.len());
        assert!(pairs.iter().all(|&(i, j)| i < j && j < n));
        // every consecutive pair is present
        assert!((0..n - 1).all(|i| unique.contains(&(i, i + 1))));
    }
}

#[test]
fn test_two_frames_gives_one_pair_in_every_mode() {
    for mode in [
        FrameSamplingMode::Exhaustive,
        FrameSamplingMode::Consecutive,
        FrameSamplingMode::Hierarchical,
    ] {
        assert_eq!(sample_frame_pairs(2, mode).unwrap(), vec![(0, 1)]);
    }
}

#[test]
fn test_fewer_than_two_frames() {
    for n in [0, 1] {
        assert!(matches!(
            sample_frame_pairs(n, FrameSamplingMode::Hierarchical),
            Err(Error::Configuration(_))
        ));
    }
}

#[test]
fn test_mode_parsing() {
    assert_eq!(
        FrameSamplingMode::from_str("Hierarchical").unwrap(),
        FrameSamplingMode::Hierarchical
    );
    assert_eq!(
        "consecutive".parse::<FrameSamplingMode>().unwrap(),
        FrameSamplingMode::Consecutive
    );
    let err = "random".parse::<FrameSamplingMode>().unwrap_err();
    assert!(matches!(err, Error::UnsupportedMode(ref m) if m == "random"));
    assert_eq!(FrameSamplingMode::default(), FrameSamplingMode::Hierarchical);
    assert_eq!(FrameSamplingMode::Exhaustive.to_string(), "exhaustive");
}
