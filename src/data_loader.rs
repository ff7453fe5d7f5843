use std::path::{Path, PathBuf};

use glob::glob;
use image::{DynamicImage, GrayImage, ImageReader};
use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::pose_vec_to_mat;

/// The RGB-D sequence the correspondence search reads from.
///
/// Implementations only need to hand out frames by index; loading happens
/// once per run and the data is shared read-only afterwards.
pub trait RgbdSequence: Sync {
    fn num_frames(&self) -> usize;
    fn rgb_frame(&self, index: usize) -> Result<DynamicImage>;
    /// Depth in the same resolution as the frame, `0` where unknown.
    fn depth_map(&self, index: usize) -> Result<na::DMatrix<f32>>;
    /// Non-zero pixels belong to dynamic objects. `None` if the sequence has no masks.
    fn dynamic_object_mask(&self, index: usize) -> Result<Option<GrayImage>>;
    fn camera_matrix(&self) -> na::Matrix3<f64>;
    fn camera_trajectory(&self) -> Vec<na::Matrix4<f64>>;
}

fn check_index(index: usize, num_frames: usize) -> Result<()> {
    if index < num_frames {
        Ok(())
    } else {
        Err(Error::DataIntegrity(format!(
            "frame index {} out of range for {} frames",
            index, num_frames
        )))
    }
}

/// A sequence that already lives in memory.
#[derive(Debug, Clone)]
pub struct InMemorySequence {
    pub frames: Vec<DynamicImage>,
    pub depth_maps: Vec<na::DMatrix<f32>>,
    pub masks: Option<Vec<GrayImage>>,
    pub camera_matrix: na::Matrix3<f64>,
    pub trajectory: Vec<na::Matrix4<f64>>,
}

impl RgbdSequence for InMemorySequence {
    fn num_frames(&self) -> usize {
        self.frames.len()
    }

    fn rgb_frame(&self, index: usize) -> Result<DynamicImage> {
        check_index(index, self.frames.len())?;
        Ok(self.frames[index].clone())
    }

    fn depth_map(&self, index: usize) -> Result<na::DMatrix<f32>> {
        check_index(index, self.depth_maps.len())?;
        Ok(self.depth_maps[index].clone())
    }

    fn dynamic_object_mask(&self, index: usize) -> Result<Option<GrayImage>> {
        match &self.masks {
            Some(masks) => {
                check_index(index, masks.len())?;
                Ok(Some(masks[index].clone()))
            }
            None => Ok(None),
        }
    }

    fn camera_matrix(&self) -> na::Matrix3<f64> {
        self.camera_matrix
    }

    fn camera_trajectory(&self) -> Vec<na::Matrix4<f64>> {
        self.trajectory.clone()
    }
}

/// `camera.json` of a [`FolderSequence`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraFile {
    /// Row-major 3x3 intrinsics.
    pub camera_matrix: [f64; 9],
    /// One `[r0, r1, r2, t0, t1, t2]` pose vector per frame.
    #[serde(default)]
    pub trajectory: Vec<[f64; 6]>,
}

/// A sequence stored as image folders.
///
/// ```text
/// root/rgb/*.png|jpg    colour frames
/// root/depth/*.png      16-bit depth, divided by `depth_scale`
/// root/mask/*.png       optional dynamic object masks
/// root/camera.json      see [`CameraFile`]
/// ```
/// Files are paired by their sorted order.
#[derive(Debug, Clone)]
pub struct FolderSequence {
    rgb_paths: Vec<PathBuf>,
    depth_paths: Vec<PathBuf>,
    mask_paths: Option<Vec<PathBuf>>,
    depth_scale: f32,
    camera_matrix: na::Matrix3<f64>,
    trajectory: Vec<na::Matrix4<f64>>,
}

fn img_filter(rp: glob::GlobResult) -> Option<PathBuf> {
    if let Ok(p) = rp {
        for ext in &[".png", ".jpg"] {
            if p.as_os_str().to_string_lossy().ends_with(ext) {
                return Some(p);
            }
        }
    }
    None
}

fn sorted_images(folder: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/*", folder.display());
    let mut paths: Vec<PathBuf> = glob(&pattern)?.filter_map(img_filter).collect();
    paths.sort();
    Ok(paths)
}

impl FolderSequence {
    pub fn open<P: AsRef<Path>>(root: P, depth_scale: f32) -> Result<FolderSequence> {
        let root = root.as_ref();
        let rgb_paths = sorted_images(&root.join("rgb"))?;
        let depth_paths = sorted_images(&root.join("depth"))?;
        let mask_folder = root.join("mask");
        let mask_paths = if mask_folder.is_dir() {
            Some(sorted_images(&mask_folder)?)
        } else {
            None
        };
        log::trace!(
            "found {} frames, {} depth maps in {}",
            rgb_paths.len(),
            depth_paths.len(),
            root.display()
        );

        if rgb_paths.len() != depth_paths.len() {
            return Err(Error::DataIntegrity(format!(
                "{} rgb frames but {} depth maps",
                rgb_paths.len(),
                depth_paths.len()
            )));
        }
        if let Some(masks) = &mask_paths {
            if masks.len() != rgb_paths.len() {
                return Err(Error::DataIntegrity(format!(
                    "{} rgb frames but {} masks",
                    rgb_paths.len(),
                    masks.len()
                )));
            }
        }

        let camera: CameraFile = crate::io::object_from_json(root.join("camera.json"))?;
        let trajectory = camera
            .trajectory
            .iter()
            .map(|pose| {
                let m = pose_vec_to_mat(&na::DVector::from_column_slice(pose))?;
                Ok(na::Matrix4::from_iterator(m.iter().cloned()))
            })
            .collect::<Result<Vec<_>>>()?;
        if !trajectory.is_empty() && trajectory.len() != rgb_paths.len() {
            return Err(Error::DataIntegrity(format!(
                "{} rgb frames but {} trajectory poses",
                rgb_paths.len(),
                trajectory.len()
            )));
        }

        Ok(FolderSequence {
            rgb_paths,
            depth_paths,
            mask_paths,
            depth_scale,
            camera_matrix: na::Matrix3::from_row_slice(&camera.camera_matrix),
            trajectory,
        })
    }
}

impl RgbdSequence for FolderSequence {
    fn num_frames(&self) -> usize {
        self.rgb_paths.len()
    }

    fn rgb_frame(&self, index: usize) -> Result<DynamicImage> {
        check_index(index, self.rgb_paths.len())?;
        Ok(ImageReader::open(&self.rgb_paths[index])?.decode()?)
    }

    fn depth_map(&self, index: usize) -> Result<na::DMatrix<f32>> {
        check_index(index, self.depth_paths.len())?;
        let raw = ImageReader::open(&self.depth_paths[index])?
            .decode()?
            .to_luma16();
        let (w, h) = raw.dimensions();
        Ok(na::DMatrix::from_fn(h as usize, w as usize, |r, c| {
            raw.get_pixel(c as u32, r as u32).0[0] as f32 / self.depth_scale
        }))
    }

    fn dynamic_object_mask(&self, index: usize) -> Result<Option<GrayImage>> {
        match &self.mask_paths {
            Some(paths) => {
                check_index(index, paths.len())?;
                Ok(Some(ImageReader::open(&paths[index])?.decode()?.to_luma8()))
            }
            None => Ok(None),
        }
    }

    fn camera_matrix(&self) -> na::Matrix3<f64> {
        self.camera_matrix
    }

    fn camera_trajectory(&self) -> Vec<na::Matrix4<f64>> {
        self.trajectory.clone()
    }
}
