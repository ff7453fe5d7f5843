use glam::Vec2;
use image::GrayImage;

use crate::config::HarrisConfig;
use crate::detected_points::Keypoint;
use crate::error::Result;

/// Detects keypoints and computes their descriptors.
pub trait KeypointDetector: Send + Sync {
    /// `dynamic_mask` marks dynamic objects with non-zero pixels; no keypoint
    /// may be reported on them.
    fn detect_and_compute(&self, image: &GrayImage, dynamic_mask: Option<&GrayImage>)
    -> Vec<Keypoint>;

    /// Rejects settings the detector cannot work with.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Harris corners described by a normalised intensity patch.
#[derive(Debug, Clone)]
pub struct HarrisDetector {
    config: HarrisConfig,
    max_features: Option<usize>,
}

impl HarrisDetector {
    pub fn new(config: HarrisConfig, max_features: Option<usize>) -> HarrisDetector {
        HarrisDetector {
            config,
            max_features,
        }
    }

    fn border(&self) -> u32 {
        (self.config.descriptor_radius + 1)
            .max(self.config.window_radius + 2)
            .max(self.config.nms_radius + 1)
    }

    /// Harris response of every pixel, row-major.
    pub fn response(&self, image: &GrayImage) -> Vec<f32> {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let px = |x: usize, y: usize| image.get_pixel(x as u32, y as u32).0[0] as f32;

        let mut ixx = vec![0.0f32; w * h];
        let mut iyy = vec![0.0f32; w * h];
        let mut ixy = vec![0.0f32; w * h];
        for y in 1..h.saturating_sub(1) {
            for x in 1..w.saturating_sub(1) {
                let gx = (px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1))
                    - (px(x - 1, y - 1) + 2.0 * px(x - 1, y) + px(x - 1, y + 1));
                let gy = (px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1))
                    - (px(x - 1, y - 1) + 2.0 * px(x, y - 1) + px(x + 1, y - 1));
                let idx = y * w + x;
                ixx[idx] = gx * gx;
                iyy[idx] = gy * gy;
                ixy[idx] = gx * gy;
            }
        }

        let r = self.config.window_radius as usize;
        let sxx = box_sum(&ixx, w, h, r);
        let syy = box_sum(&iyy, w, h, r);
        let sxy = box_sum(&ixy, w, h, r);

        sxx.iter()
            .zip(&syy)
            .zip(&sxy)
            .map(|((&a, &b), &c)| {
                let trace = a + b;
                a * b - c * c - self.config.k * trace * trace
            })
            .collect()
    }

    fn descriptor(&self, image: &GrayImage, x: u32, y: u32) -> Vec<f32> {
        let r = self.config.descriptor_radius as i64;
        let mut patch = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
        for dy in -r..=r {
            for dx in -r..=r {
                let p = image.get_pixel((x as i64 + dx) as u32, (y as i64 + dy) as u32);
                patch.push(p.0[0] as f32);
            }
        }
        let mean = patch.iter().sum::<f32>() / patch.len() as f32;
        patch.iter_mut().for_each(|v| *v -= mean);
        let norm = patch.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            patch.iter_mut().for_each(|v| *v /= norm);
        }
        patch
    }
}

impl KeypointDetector for HarrisDetector {
    fn validate(&self) -> Result<()> {
        self.config.validate()
    }

    fn detect_and_compute(
        &self,
        image: &GrayImage,
        dynamic_mask: Option<&GrayImage>,
    ) -> Vec<Keypoint> {
        let (w, h) = (image.width(), image.height());
        let border = self.border();
        if w <= 2 * border || h <= 2 * border {
            return Vec::new();
        }

        let response = self.response(image);
        let max_response = response.iter().cloned().fold(0.0f32, f32::max);
        if max_response <= 0.0 {
            return Vec::new();
        }
        let threshold = max_response * self.config.relative_threshold;
        let wu = w as usize;
        let at = |x: u32, y: u32| response[y as usize * wu + x as usize];

        let is_dynamic = |x: u32, y: u32| {
            dynamic_mask
                .and_then(|m| m.get_pixel_checked(x, y))
                .is_some_and(|p| p.0[0] != 0)
        };

        let n = self.config.nms_radius as i64;
        let mut candidates: Vec<(u32, u32, f32)> = Vec::new();
        for y in border..h - border {
            for x in border..w - border {
                let value = at(x, y);
                if value <= threshold || is_dynamic(x, y) {
                    continue;
                }
                let mut is_max = true;
                'nms: for dy in -n..=n {
                    for dx in -n..=n {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let other = at((x as i64 + dx) as u32, (y as i64 + dy) as u32);
                        // ties go to the first pixel in raster order
                        let earlier = dy < 0 || (dy == 0 && dx < 0);
                        if other > value || (other == value && earlier) {
                            is_max = false;
                            break 'nms;
                        }
                    }
                }
                if is_max {
                    candidates.push((x, y, value));
                }
            }
        }

        candidates.sort_by(|a, b| b.2.total_cmp(&a.2));
        if let Some(max_features) = self.max_features {
            candidates.truncate(max_features);
        }
        log::trace!("harris: {} keypoints", candidates.len());

        candidates
            .into_iter()
            .map(|(x, y, value)| {
                let offset_x = parabola_peak(at(x - 1, y), value, at(x + 1, y));
                let offset_y = parabola_peak(at(x, y - 1), value, at(x, y + 1));
                Keypoint {
                    pt: Vec2::new(x as f32 + offset_x, y as f32 + offset_y),
                    response: value,
                    descriptor: self.descriptor(image, x, y),
                }
            })
            .collect()
    }
}

/// Sub-pixel offset of the peak of a parabola through three samples.
fn parabola_peak(left: f32, center: f32, right: f32) -> f32 {
    let denom = 2.0 * center - left - right;
    if denom <= f32::EPSILON {
        return 0.0;
    }
    (0.5 * (right - left) / denom).clamp(-0.5, 0.5)
}

/// Separable `(2r+1) x (2r+1)` box sum, zero outside the image.
fn box_sum(src: &[f32], w: usize, h: usize, r: usize) -> Vec<f32> {
    let mut horizontal = vec![0.0f32; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            let lo = x.saturating_sub(r);
            let hi = (x + r).min(w - 1);
            horizontal[y * w + x] = row[lo..=hi].iter().sum();
        }
    }
    let mut out = vec![0.0f32; w * h];
    for y in 0..h {
        let lo = y.saturating_sub(r);
        let hi = (y + r).min(h - 1);
        for x in 0..w {
            out[y * w + x] = (lo..=hi).map(|yy| horizontal[yy * w + x]).sum();
        }
    }
    out
}
