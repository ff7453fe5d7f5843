use crate::detected_points::{DescriptorMatch, Keypoint};

/// k-nearest-neighbour search in descriptor space.
pub trait DescriptorMatcher: Send + Sync {
    /// For every query keypoint, up to `k` train candidates sorted by
    /// ascending distance.
    fn knn_match(&self, query: &[Keypoint], train: &[Keypoint], k: usize)
    -> Vec<Vec<DescriptorMatch>>;
}

/// Exhaustive L2 matcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct BruteForceMatcher;

pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

impl DescriptorMatcher for BruteForceMatcher {
    fn knn_match(
        &self,
        query: &[Keypoint],
        train: &[Keypoint],
        k: usize,
    ) -> Vec<Vec<DescriptorMatch>> {
        query
            .iter()
            .enumerate()
            .map(|(query_idx, q)| {
                let mut candidates: Vec<DescriptorMatch> = train
                    .iter()
                    .enumerate()
                    .map(|(train_idx, t)| DescriptorMatch {
                        query_idx,
                        train_idx,
                        distance: l2_distance(&q.descriptor, &t.descriptor),
                    })
                    .collect();
                candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
                candidates.truncate(k);
                candidates
            })
            .collect()
    }
}
