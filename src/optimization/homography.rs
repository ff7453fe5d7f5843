use glam::Vec2;
use nalgebra as na;

use super::ransac::{Estimator, ransac};
use crate::config::RansacConfig;
use crate::error::Result;

/// A fitted homography `x_j ~ H x_i` and the inlier flag of every input pair.
#[derive(Debug, Clone)]
pub struct HomographyFit {
    pub homography: na::Matrix3<f64>,
    pub inliers: Vec<bool>,
}

impl HomographyFit {
    pub fn num_inliers(&self) -> usize {
        self.inliers.iter().filter(|&&b| b).count()
    }
}

/// Robust planar-transform fit used to reject geometrically inconsistent matches.
pub trait RobustHomographyFitter: Send + Sync {
    /// `None` when no homography could be estimated.
    fn fit(&self, points_i: &[Vec2], points_j: &[Vec2]) -> Option<HomographyFit>;

    /// Rejects settings the fitter cannot work with.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Hartley normalisation: zero mean and an average distance of sqrt(2).
fn normalize_points_2d(
    points: &[na::Point2<f64>],
) -> Option<(Vec<na::Point2<f64>>, na::Matrix3<f64>)> {
    let n = points.len() as f64;
    let centroid = points
        .iter()
        .fold(na::Vector2::zeros(), |acc, p| acc + p.coords)
        / n;
    let mean_dist = points.iter().map(|p| (p.coords - centroid).norm()).sum::<f64>() / n;
    if mean_dist <= f64::EPSILON {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = na::Matrix3::new(
        s,
        0.0,
        -s * centroid.x,
        0.0,
        s,
        -s * centroid.y,
        0.0,
        0.0,
        1.0,
    );
    let normalized = points
        .iter()
        .map(|p| na::Point2::from((p.coords - centroid) * s))
        .collect();
    Some((normalized, t))
}

/// Normalised direct linear transform, `H[2, 2] == 1` when possible.
pub fn dlt_homography(
    src: &[na::Point2<f64>],
    dst: &[na::Point2<f64>],
) -> Option<na::Matrix3<f64>> {
    let n = src.len();
    if n < 4 || dst.len() != n {
        return None;
    }
    let (src_n, t_src) = normalize_points_2d(src)?;
    let (dst_n, t_dst) = normalize_points_2d(dst)?;

    // pad to at least 9 rows so the SVD yields the full right null space
    let rows = (2 * n).max(9);
    let mut a = na::DMatrix::<f64>::zeros(rows, 9);
    for (i, (p, q)) in src_n.iter().zip(&dst_n).enumerate() {
        let (x, y, u, v) = (p.x, p.y, q.x, q.y);
        let r0 = 2 * i;
        let r1 = 2 * i + 1;
        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let h = v_t.row(min_idx);

    let h_norm = na::Matrix3::from_row_slice(&[
        h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8],
    ]);
    let mut h_mat = t_dst.try_inverse()? * h_norm * t_src;
    let scale = h_mat[(2, 2)];
    if scale.abs() > f64::EPSILON {
        h_mat /= scale;
    }
    if h_mat.iter().all(|v| v.is_finite()) {
        Some(h_mat)
    } else {
        None
    }
}

/// Euclidean distance between `H * src` and `dst` in pixels.
pub fn transfer_error(
    h: &na::Matrix3<f64>,
    src: &na::Point2<f64>,
    dst: &na::Point2<f64>,
) -> f64 {
    let p = h * na::Vector3::new(src.x, src.y, 1.0);
    if p.z.abs() <= f64::EPSILON {
        return f64::INFINITY;
    }
    ((p.x / p.z - dst.x).powi(2) + (p.y / p.z - dst.y).powi(2)).sqrt()
}

fn is_collinear(a: &na::Point2<f64>, b: &na::Point2<f64>, c: &na::Point2<f64>) -> bool {
    let area = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
    area.abs() < 1e-6
}

struct HomographyEstimator;

impl Estimator for HomographyEstimator {
    type Datum = (na::Point2<f64>, na::Point2<f64>);
    type Model = na::Matrix3<f64>;

    const MIN_SAMPLES: usize = 4;

    fn fit(data: &[Self::Datum], sample_indices: &[usize]) -> Option<Self::Model> {
        let (src, dst): (Vec<_>, Vec<_>) = sample_indices.iter().map(|&i| data[i]).unzip();
        dlt_homography(&src, &dst)
    }

    fn residual(model: &Self::Model, datum: &Self::Datum) -> f64 {
        transfer_error(model, &datum.0, &datum.1)
    }

    fn is_degenerate(data: &[Self::Datum], sample_indices: &[usize]) -> bool {
        let triples = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
        triples.iter().any(|t| {
            let [a, b, c] = t.map(|k| data[sample_indices[k]]);
            is_collinear(&a.0, &b.0, &c.0) || is_collinear(&a.1, &b.1, &c.1)
        })
    }
}

/// RANSAC over 4-point normalised DLT samples.
#[derive(Debug, Clone, Default)]
pub struct RansacHomography {
    pub config: RansacConfig,
}

impl RansacHomography {
    pub fn new(config: RansacConfig) -> RansacHomography {
        RansacHomography { config }
    }
}

impl RobustHomographyFitter for RansacHomography {
    fn validate(&self) -> Result<()> {
        self.config.validate()
    }

    fn fit(&self, points_i: &[Vec2], points_j: &[Vec2]) -> Option<HomographyFit> {
        if points_i.len() != points_j.len() {
            return None;
        }
        let data: Vec<_> = points_i
            .iter()
            .zip(points_j)
            .map(|(p, q)| {
                (
                    na::Point2::new(p.x as f64, p.y as f64),
                    na::Point2::new(q.x as f64, q.y as f64),
                )
            })
            .collect();

        let result = ransac::<HomographyEstimator>(&data, &self.config)?;
        let mut inliers = vec![false; data.len()];
        for i in result.inliers {
            inliers[i] = true;
        }
        Some(HomographyFit {
            homography: result.model,
            inliers,
        })
    }
}
