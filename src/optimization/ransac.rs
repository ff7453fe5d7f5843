//! Model-agnostic RANSAC loop.
//!
//! Implement [`Estimator`] for a model and call [`ransac`]. Sampling uses a
//! seeded ChaCha generator so the same input always gives the same result.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::RansacConfig;

pub trait Estimator {
    type Datum;
    type Model;

    /// Minimal number of samples needed to estimate a model.
    const MIN_SAMPLES: usize;

    /// Fits a model to the sampled data, `None` when the fit fails.
    fn fit(data: &[Self::Datum], sample_indices: &[usize]) -> Option<Self::Model>;

    /// Non-negative residual in the same unit as the inlier threshold.
    fn residual(model: &Self::Model, datum: &Self::Datum) -> f64;

    fn is_degenerate(_data: &[Self::Datum], _sample_indices: &[usize]) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct RansacResult<M> {
    pub model: M,
    pub inliers: Vec<usize>,
    pub iters: usize,
}

/// Iteration bound for the requested confidence at the current inlier ratio.
fn calculate_iterations(
    confidence: f64,
    inlier_ratio: f64,
    min_samples: usize,
    iters_so_far: usize,
    max_iters: usize,
) -> usize {
    if confidence <= 0.0 || inlier_ratio <= 0.0 {
        return max_iters;
    }
    let denom = (1.0 - inlier_ratio.powi(min_samples as i32)).max(1e-12).ln();
    if denom >= 0.0 {
        return max_iters;
    }
    let n_iter = ((1.0 - confidence).ln() / denom).ceil() as usize;
    n_iter.clamp(iters_so_far, max_iters)
}

fn inliers_of<E: Estimator>(data: &[E::Datum], model: &E::Model, thresh: f64) -> Vec<usize> {
    data.iter()
        .enumerate()
        .filter(|(_, d)| E::residual(model, d) <= thresh)
        .map(|(i, _)| i)
        .collect()
}

/// Runs RANSAC and refits the best model on its inliers.
///
/// Returns `None` when there is not enough data or no sample produced a model.
pub fn ransac<E: Estimator>(
    data: &[E::Datum],
    config: &RansacConfig,
) -> Option<RansacResult<E::Model>> {
    if data.len() < E::MIN_SAMPLES {
        return None;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut best: Option<(E::Model, Vec<usize>)> = None;
    let mut max_iters = config.max_iters;
    let mut iters = 0;

    while iters < max_iters {
        iters += 1;
        let sample = rand::seq::index::sample(&mut rng, data.len(), E::MIN_SAMPLES).into_vec();
        if E::is_degenerate(data, &sample) {
            continue;
        }
        let Some(model) = E::fit(data, &sample) else {
            continue;
        };

        let inliers = inliers_of::<E>(data, &model, config.reprojection_threshold);
        let better = best
            .as_ref()
            .is_none_or(|(_, best_inliers)| inliers.len() > best_inliers.len());
        if better {
            let ratio = inliers.len() as f64 / data.len() as f64;
            max_iters = calculate_iterations(
                config.confidence,
                ratio,
                E::MIN_SAMPLES,
                iters,
                config.max_iters,
            );
            best = Some((model, inliers));
        }
    }

    let (mut model, mut inliers) = best?;
    if inliers.len() >= E::MIN_SAMPLES {
        if let Some(refit) = E::fit(data, &inliers) {
            let refit_inliers = inliers_of::<E>(data, &refit, config.reprojection_threshold);
            if refit_inliers.len() >= inliers.len() {
                model = refit;
                inliers = refit_inliers;
            }
        }
    }
    log::trace!(
        "ransac: {}/{} inliers after {} iterations",
        inliers.len(),
        data.len(),
        iters
    );

    Some(RansacResult {
        model,
        inliers,
        iters,
    })
}
