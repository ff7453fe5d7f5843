use glam::Vec2;
use serde::{Deserialize, Serialize};

/// A detected image feature and its descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Keypoint {
    pub pt: Vec2,
    pub response: f32,
    pub descriptor: Vec<f32>,
}

/// One k-NN candidate: keypoint `query_idx` of frame i against `train_idx` of frame j.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescriptorMatch {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

/// Frame index, match coordinates and the depth at those coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureData {
    pub index: Vec<usize>,
    pub points: Vec<Vec2>,
    pub depth: Vec<f32>,
}

impl FeatureData {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Accepted correspondences of a single frame pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairCorrespondences {
    pub frame_i: usize,
    pub frame_j: usize,
    pub points_i: Vec<Vec2>,
    pub points_j: Vec<Vec2>,
    pub depth_i: Vec<f32>,
    pub depth_j: Vec<f32>,
}

impl PairCorrespondences {
    pub fn len(&self) -> usize {
        self.points_i.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points_i.is_empty()
    }
}

/// [`FeatureData`] for both sides of every accepted pair. Entry `k` of
/// `frame_i` and entry `k` of `frame_j` are the same correspondence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceSet {
    pub frame_i: FeatureData,
    pub frame_j: FeatureData,
}

impl CorrespondenceSet {
    pub fn len(&self) -> usize {
        self.frame_i.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame_i.is_empty()
    }

    pub fn extend_from_pair(&mut self, pair: &PairCorrespondences) {
        let n = pair.len();
        self.frame_i.index.extend(std::iter::repeat_n(pair.frame_i, n));
        self.frame_i.points.extend_from_slice(&pair.points_i);
        self.frame_i.depth.extend_from_slice(&pair.depth_i);

        self.frame_j.index.extend(std::iter::repeat_n(pair.frame_j, n));
        self.frame_j.points.extend_from_slice(&pair.points_j);
        self.frame_j.depth.extend_from_slice(&pair.depth_j);
    }

    /// Every frame index that appears on either side.
    pub fn frame_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.frame_i
            .index
            .iter()
            .chain(self.frame_j.index.iter())
            .copied()
    }
}
