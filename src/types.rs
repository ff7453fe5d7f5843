use nalgebra as na;

use crate::error::{Result, validate_shape};

/// Compact camera pose: axis-angle rotation and translation.
#[derive(Debug, Clone, PartialEq)]
pub struct RvecTvec {
    rvec: na::Vector3<f64>,
    tvec: na::Vector3<f64>,
}

impl RvecTvec {
    pub fn new(rvec: &na::Vector3<f64>, tvec: &na::Vector3<f64>) -> RvecTvec {
        RvecTvec {
            rvec: *rvec,
            tvec: *tvec,
        }
    }

    /// Builds a pose from dynamically sized axis-angle and translation vectors.
    pub fn from_dvectors(rvec: &na::DVector<f64>, tvec: &na::DVector<f64>) -> Result<RvecTvec> {
        validate_shape("rvec", &[rvec.len()], &[Some(3)])?;
        validate_shape("tvec", &[tvec.len()], &[Some(3)])?;
        Ok(RvecTvec {
            rvec: rvec.fixed_rows::<3>(0).into_owned(),
            tvec: tvec.fixed_rows::<3>(0).into_owned(),
        })
    }

    /// Splits a `[r0, r1, r2, t0, t1, t2]` pose vector.
    pub fn from_pose_vector(pose: &na::DVector<f64>) -> Result<RvecTvec> {
        validate_shape("pose", &[pose.len()], &[Some(6)])?;
        Ok(RvecTvec {
            rvec: pose.fixed_rows::<3>(0).into_owned(),
            tvec: pose.fixed_rows::<3>(3).into_owned(),
        })
    }

    pub fn to_pose_vector(&self) -> na::DVector<f64> {
        na::dvector![
            self.rvec.x,
            self.rvec.y,
            self.rvec.z,
            self.tvec.x,
            self.tvec.y,
            self.tvec.z
        ]
    }

    pub fn na_rvec(&self) -> na::DVector<f64> {
        na::dvector![self.rvec.x, self.rvec.y, self.rvec.z]
    }

    pub fn na_tvec(&self) -> na::DVector<f64> {
        na::dvector![self.tvec.x, self.tvec.y, self.tvec.z]
    }

    pub fn to_na_isometry3(&self) -> na::Isometry3<f64> {
        na::Isometry3::new(self.tvec, self.rvec)
    }

    /// Homogeneous `[R | t; 0 0 0 1]` matrix.
    pub fn to_matrix(&self) -> na::Matrix4<f64> {
        let rotation = na::Rotation3::from_scaled_axis(self.rvec);
        let mut m = na::Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(rotation.matrix());
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.tvec);
        m
    }
}

pub trait ToRvecTvec {
    fn to_rvec_tvec(&self) -> RvecTvec;
}

impl ToRvecTvec for na::Isometry3<f64> {
    fn to_rvec_tvec(&self) -> RvecTvec {
        RvecTvec {
            rvec: self.rotation.scaled_axis(),
            tvec: self.translation.vector,
        }
    }
}

impl ToRvecTvec for na::Matrix4<f64> {
    /// The rotation block is re-orthonormalised on the way to axis-angle.
    fn to_rvec_tvec(&self) -> RvecTvec {
        let r: na::Matrix3<f64> = self.fixed_view::<3, 3>(0, 0).into_owned();
        let rotation = na::Rotation3::from_matrix(&r);
        RvecTvec {
            rvec: rotation.scaled_axis(),
            tvec: self.fixed_view::<3, 1>(0, 3).into_owned(),
        }
    }
}
