use nalgebra as na;

use crate::error::{Error, Result, validate_shape};
use crate::types::RvecTvec;

fn shape_of<T>(m: &na::DMatrix<T>) -> [usize; 2] {
    [m.nrows(), m.ncols()]
}

/// Checks K (3, 3), R (3, 3) and t (3, 1).
pub fn validate_camera_parameter_shapes(
    k: &na::DMatrix<f64>,
    r: &na::DMatrix<f64>,
    t: &na::DMatrix<f64>,
) -> Result<()> {
    validate_shape("K", &shape_of(k), &[Some(3), Some(3)])?;
    validate_shape("R", &shape_of(r), &[Some(3), Some(3)])?;
    validate_shape("t", &shape_of(t), &[Some(3), Some(1)])
}

pub fn identity_rotation() -> na::DMatrix<f64> {
    na::DMatrix::identity(3, 3)
}

pub fn zero_translation() -> na::DMatrix<f64> {
    na::DMatrix::zeros(3, 1)
}

pub fn to_dynamic<const R: usize, const C: usize>(
    m: &na::SMatrix<f64, R, C>,
) -> na::DMatrix<f64> {
    na::DMatrix::from_column_slice(R, C, m.as_slice())
}

/// Converts a 6-vector `[r, t]` (axis-angle rotation, translation) into a
/// (4, 4) homogeneous transformation matrix.
pub fn pose_vec_to_mat(pose: &na::DVector<f64>) -> Result<na::DMatrix<f64>> {
    let rt = RvecTvec::from_pose_vector(pose)?;
    Ok(to_dynamic(&rt.to_matrix()))
}

/// Splits a (4, 4) camera pose into the (3, 3) rotation and the (3, 1) translation.
pub fn get_pose_components(
    pose: &na::DMatrix<f64>,
) -> Result<(na::DMatrix<f64>, na::DMatrix<f64>)> {
    validate_shape("pose", &shape_of(pose), &[Some(4), Some(4)])?;
    let r = pose.view((0, 0), (3, 3)).into_owned();
    let t = pose.view((0, 3), (3, 1)).into_owned();
    Ok((r, t))
}

/// Projects (N, 3) world points into the image.
///
/// Returns the (N, 2) pixel coordinates and the depth of every point.
/// Points with zero depth are not guarded against and produce non-finite pixels.
pub fn world_to_image(
    points: &na::DMatrix<f64>,
    k: &na::DMatrix<f64>,
    r: &na::DMatrix<f64>,
    t: &na::DMatrix<f64>,
    scale_factor: f64,
) -> Result<(na::DMatrix<f64>, na::DVector<f64>)> {
    validate_shape("points", &shape_of(points), &[None, Some(3)])?;
    validate_camera_parameter_shapes(k, r, t)?;

    let num_points = points.nrows();
    let mut camera_space = r * points.transpose();
    for c in 0..num_points {
        for row in 0..3 {
            camera_space[(row, c)] += t[(row, 0)];
        }
    }
    let camera_space = k * camera_space;

    let depth: na::DVector<f64> = camera_space.row(2).transpose();
    let mut pixels = na::DMatrix::zeros(num_points, 2);
    for i in 0..num_points {
        pixels[(i, 0)] = camera_space[(0, i)] / depth[i] / scale_factor;
        pixels[(i, 1)] = camera_space[(1, i)] / depth[i] / scale_factor;
    }
    Ok((pixels, depth))
}

/// Same as [`world_to_image`] with pixel coordinates rounded to the nearest
/// integer (ties to even) before the cast. Truncating would bias every pixel
/// towards the origin.
pub fn world_to_image_rounded(
    points: &na::DMatrix<f64>,
    k: &na::DMatrix<f64>,
    r: &na::DMatrix<f64>,
    t: &na::DMatrix<f64>,
    scale_factor: f64,
) -> Result<(na::DMatrix<i32>, na::DVector<f64>)> {
    let (pixels, depth) = world_to_image(points, k, r, t, scale_factor)?;
    Ok((pixels.map(|v| v.round_ties_even() as i32), depth))
}

/// Back-projects (N, 2) image points with known depth into (N, 3) world points.
pub fn image_to_world(
    points: &na::DMatrix<f64>,
    depth: &na::DVector<f64>,
    k: &na::DMatrix<f64>,
    r: &na::DMatrix<f64>,
    t: &na::DMatrix<f64>,
    scale_factor: f64,
) -> Result<na::DMatrix<f64>> {
    validate_shape("points", &shape_of(points), &[None, Some(2)])?;
    validate_shape("depth", &[depth.len()], &[Some(points.nrows())])?;
    validate_camera_parameter_shapes(k, r, t)?;

    let k_inv = k.clone().try_inverse().ok_or(Error::SingularMatrix("K"))?;

    let num_points = points.nrows();
    let mut homogeneous = na::DMatrix::zeros(3, num_points);
    for i in 0..num_points {
        homogeneous[(0, i)] = points[(i, 0)] * scale_factor;
        homogeneous[(1, i)] = points[(i, 1)] * scale_factor;
        homogeneous[(2, i)] = 1.0;
    }

    let mut camera_space = k_inv * homogeneous;
    for i in 0..num_points {
        for row in 0..3 {
            camera_space[(row, i)] = camera_space[(row, i)] * depth[i] - t[(row, 0)];
        }
    }

    Ok((r.transpose() * camera_space).transpose())
}

/// Back-projects every pixel where `mask` is set and the depth is positive.
///
/// Pixels are visited in row-major order; the image point of pixel
/// `(row, col)` is `(x = col, y = row)`.
pub fn point_cloud_from_depth(
    depth: &na::DMatrix<f32>,
    mask: &na::DMatrix<bool>,
    k: &na::DMatrix<f64>,
    r: &na::DMatrix<f64>,
    t: &na::DMatrix<f64>,
    scale_factor: f64,
) -> Result<na::DMatrix<f64>> {
    validate_shape(
        "mask",
        &shape_of(mask),
        &[Some(depth.nrows()), Some(depth.ncols())],
    )?;

    let mut coords = Vec::new();
    let mut depths = Vec::new();
    for row in 0..depth.nrows() {
        for col in 0..depth.ncols() {
            let d = depth[(row, col)];
            if mask[(row, col)] && d > 0.0 {
                coords.push(col as f64);
                coords.push(row as f64);
                depths.push(d as f64);
            }
        }
    }

    let points = na::DMatrix::from_row_slice(depths.len(), 2, &coords);
    image_to_world(
        &points,
        &na::DVector::from_vec(depths),
        k,
        r,
        t,
        scale_factor,
    )
}
