#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use camera_pose_refinement::detected_points::{DescriptorMatch, Keypoint};
use camera_pose_refinement::error::Result;
use camera_pose_refinement::features::{BruteForceMatcher, DescriptorMatcher, KeypointDetector};
use camera_pose_refinement::sampling::FramePair;
use camera_pose_refinement::visualization::{MatchSink, PairDiagnostics};
use glam::Vec2;
use image::{GrayImage, Luma};
use nalgebra as na;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

pub const WIDTH: u32 = 128;
pub const HEIGHT: u32 = 96;

/// Random 8x8 blocks, every block junction is a distinct corner.
pub fn textured_frame(seed: u64, width: u32, height: u32) -> GrayImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let blocks_x = width.div_ceil(8);
    let blocks_y = height.div_ceil(8);
    let values: Vec<u8> = (0..blocks_x * blocks_y).map(|_| rng.random()).collect();
    GrayImage::from_fn(width, height, |x, y| {
        Luma([values[((y / 8) * blocks_x + x / 8) as usize]])
    })
}

/// A blank frame carrying `tag` in its top left pixel.
pub fn tagged_frame(tag: u8) -> GrayImage {
    let mut img = GrayImage::new(WIDTH, HEIGHT);
    img.put_pixel(0, 0, Luma([tag]));
    img
}

pub fn constant_depth(value: f32) -> na::DMatrix<f32> {
    na::DMatrix::from_element(HEIGHT as usize, WIDTH as usize, value)
}

pub fn one_hot(k: usize, dim: usize) -> Vec<f32> {
    let mut d = vec![0.0; dim];
    d[k] = 1.0;
    d
}

/// Well spread, non-collinear positions inside a WIDTH x HEIGHT frame.
pub fn spread_points(n: usize) -> Vec<Vec2> {
    (0..n)
        .map(|k| {
            let col = (k % 6) as f32;
            let row = (k / 6) as f32;
            let jitter = ((k * 7) % 5) as f32 * 0.37;
            Vec2::new(10.0 + col * 18.0 + jitter, 8.0 + row * 14.0 + 0.5 * jitter)
        })
        .collect()
}

pub fn keypoints(points: &[Vec2], descriptors: Vec<Vec<f32>>) -> Vec<Keypoint> {
    points
        .iter()
        .zip(descriptors)
        .map(|(pt, descriptor)| Keypoint {
            pt: *pt,
            response: 1.0,
            descriptor,
        })
        .collect()
}

/// Returns the keypoints registered for the tag in the top left pixel.
#[derive(Default)]
pub struct ScriptedDetector {
    pub keypoints: HashMap<u8, Vec<Keypoint>>,
}

impl ScriptedDetector {
    pub fn with(mut self, tag: u8, keypoints: Vec<Keypoint>) -> Self {
        self.keypoints.insert(tag, keypoints);
        self
    }
}

impl KeypointDetector for ScriptedDetector {
    fn detect_and_compute(
        &self,
        image: &GrayImage,
        _dynamic_mask: Option<&GrayImage>,
    ) -> Vec<Keypoint> {
        let tag = image.get_pixel(0, 0).0[0];
        self.keypoints.get(&tag).cloned().unwrap_or_default()
    }
}

/// Brute force matching that counts how often it is asked.
#[derive(Default)]
pub struct CountingMatcher {
    pub calls: AtomicUsize,
}

impl CountingMatcher {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Handle passed to the extractor while the test keeps the counter.
pub struct SharedMatcher(pub Arc<CountingMatcher>);

impl DescriptorMatcher for SharedMatcher {
    fn knn_match(
        &self,
        query: &[Keypoint],
        train: &[Keypoint],
        k: usize,
    ) -> Vec<Vec<DescriptorMatch>> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        BruteForceMatcher.knn_match(query, train, k)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub pair: FramePair,
    pub accepted: bool,
    pub num_selected: usize,
    pub num_candidates: usize,
}

#[derive(Default)]
pub struct RecordingSink {
    pub records: Mutex<Vec<Recorded>>,
}

pub struct SharedSink(pub Arc<RecordingSink>);

impl MatchSink for SharedSink {
    fn record(&self, diagnostics: &PairDiagnostics<'_>) -> Result<()> {
        self.0.records.lock().unwrap().push(Recorded {
            pair: diagnostics.pair,
            accepted: diagnostics.accepted,
            num_selected: diagnostics.num_selected(),
            num_candidates: diagnostics.match_mask.len(),
        });
        Ok(())
    }
}
