use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_line_segment_mut,
};
use imageproc::rect::Rect;
use rerun::{RecordingStream, TimeCell};

use crate::detected_points::{DescriptorMatch, Keypoint};
use crate::error::{Error, Result};
use crate::extractor::PairStats;
use crate::sampling::FramePair;

const STATUS_BAR_HEIGHT: u32 = 12;
const ACCEPTED: Rgb<u8> = Rgb([0, 255, 0]);
const REJECTED: Rgb<u8> = Rgb([255, 0, 0]);
const UNSELECTED: Rgb<u8> = Rgb([160, 0, 0]);

/// Everything known about a frame pair once matching has run.
#[derive(Debug, Clone)]
pub struct PairDiagnostics<'a> {
    pub pair: FramePair,
    pub accepted: bool,
    pub frame_i: &'a GrayImage,
    pub frame_j: &'a GrayImage,
    pub keypoints_i: &'a [Keypoint],
    pub keypoints_j: &'a [Keypoint],
    /// k-NN candidates per keypoint of frame i.
    pub matches: &'a [Vec<DescriptorMatch>],
    /// `true` for every candidate list whose best match survived all filters.
    pub match_mask: Vec<bool>,
    pub stats: PairStats,
}

impl PairDiagnostics<'_> {
    pub fn num_selected(&self) -> usize {
        self.match_mask.iter().filter(|&&m| m).count()
    }

    pub fn match_rate(&self) -> f32 {
        if self.match_mask.is_empty() {
            0.0
        } else {
            self.num_selected() as f32 / self.match_mask.len() as f32
        }
    }

    /// `selected/total (pct%)`
    pub fn summary(&self) -> String {
        format!(
            "{}/{} ({:.2}%)",
            self.num_selected(),
            self.match_mask.len(),
            100.0 * self.match_rate()
        )
    }

    fn selected_points(&self) -> impl Iterator<Item = (glam::Vec2, glam::Vec2)> + '_ {
        self.matches
            .iter()
            .zip(&self.match_mask)
            .filter(|(_, selected)| **selected)
            .filter_map(|(candidates, _)| candidates.first())
            .map(|m| (self.keypoints_i[m.query_idx].pt, self.keypoints_j[m.train_idx].pt))
    }
}

/// Receives the diagnostics of every pair that reached the matching stage.
pub trait MatchSink: Send + Sync {
    fn record(&self, diagnostics: &PairDiagnostics<'_>) -> Result<()>;
}

/// Both frames side by side, selected matches as lines, unselected candidates
/// as dots and a status bar on top.
///
/// The bar is green for accepted and red for rejected pairs; its white part
/// shows the share of candidates that were selected.
pub fn draw_matches(diagnostics: &PairDiagnostics<'_>) -> RgbImage {
    let (w_i, h_i) = diagnostics.frame_i.dimensions();
    let (w_j, h_j) = diagnostics.frame_j.dimensions();
    let width = w_i + w_j;
    let height = h_i.max(h_j) + STATUS_BAR_HEIGHT;

    let mut canvas = RgbImage::new(width, height);
    let left = DynamicImage::ImageLuma8(diagnostics.frame_i.clone()).to_rgb8();
    let right = DynamicImage::ImageLuma8(diagnostics.frame_j.clone()).to_rgb8();
    image::imageops::replace(&mut canvas, &left, 0, STATUS_BAR_HEIGHT as i64);
    image::imageops::replace(&mut canvas, &right, w_i as i64, STATUS_BAR_HEIGHT as i64);

    let offset_y = STATUS_BAR_HEIGHT as f32;
    for (candidates, _) in diagnostics
        .matches
        .iter()
        .zip(&diagnostics.match_mask)
        .filter(|(_, selected)| !**selected)
    {
        if let Some(m) = candidates.first() {
            let p = diagnostics.keypoints_i[m.query_idx].pt;
            let center = (p.x as i32, (p.y + offset_y) as i32);
            draw_filled_circle_mut(&mut canvas, center, 1, UNSELECTED);
        }
    }

    let num_selected = diagnostics.num_selected().max(1);
    for (k, (p, q)) in diagnostics.selected_points().enumerate() {
        let c = colorous::TURBO.eval_continuous(k as f64 / num_selected as f64);
        let color = Rgb([c.r, c.g, c.b]);
        let start = (p.x, p.y + offset_y);
        let end = (q.x + w_i as f32, q.y + offset_y);
        draw_line_segment_mut(&mut canvas, start, end, color);
        draw_hollow_circle_mut(&mut canvas, (start.0 as i32, start.1 as i32), 3, color);
        draw_hollow_circle_mut(&mut canvas, (end.0 as i32, end.1 as i32), 3, color);
    }

    let status = if diagnostics.accepted {
        ACCEPTED
    } else {
        REJECTED
    };
    draw_filled_rect_mut(
        &mut canvas,
        Rect::at(0, 0).of_size(width, STATUS_BAR_HEIGHT),
        status,
    );
    let rate_width = (diagnostics.match_rate() * width as f32).round() as u32;
    if rate_width > 0 {
        draw_filled_rect_mut(
            &mut canvas,
            Rect::at(0, 0).of_size(rate_width.min(width), STATUS_BAR_HEIGHT / 3),
            Rgb([255, 255, 255]),
        );
    }
    canvas
}

/// File name of the debug image of a pair.
pub fn debug_image_name(pair: FramePair) -> String {
    format!("{:06}-{:06}.jpg", pair.0, pair.1)
}

/// Writes one JPEG per pair into a folder that is emptied on creation.
#[derive(Debug, Clone)]
pub struct ImageFolderSink {
    folder: PathBuf,
}

impl ImageFolderSink {
    pub fn new<P: AsRef<Path>>(folder: P) -> Result<ImageFolderSink> {
        let folder = folder.as_ref().to_path_buf();
        if folder.exists() {
            std::fs::remove_dir_all(&folder)?;
        }
        std::fs::create_dir_all(&folder)?;
        log::info!("writing feature match images to {}", folder.display());
        Ok(ImageFolderSink { folder })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }
}

impl MatchSink for ImageFolderSink {
    fn record(&self, diagnostics: &PairDiagnostics<'_>) -> Result<()> {
        let canvas = draw_matches(diagnostics);
        let path = self.folder.join(debug_image_name(diagnostics.pair));
        log::trace!(
            "{}: {} {}",
            path.display(),
            if diagnostics.accepted {
                "accepted"
            } else {
                "rejected"
            },
            diagnostics.summary()
        );
        canvas.save(path)?;
        Ok(())
    }
}

/// rerun use top left corner as (0, 0)
pub fn rerun_shift(p2ds: &[(f32, f32)]) -> Vec<(f32, f32)> {
    p2ds.iter().map(|(x, y)| (*x + 0.5, *y + 0.5)).collect()
}

/// Streams the match canvas and the selected points of every pair to rerun.
pub struct RerunSink {
    recording: RecordingStream,
    topic: String,
    sequence: AtomicI64,
}

impl RerunSink {
    pub fn new(recording: RecordingStream, topic: &str) -> RerunSink {
        RerunSink {
            recording,
            topic: topic.to_string(),
            sequence: AtomicI64::new(0),
        }
    }
}

impl MatchSink for RerunSink {
    fn record(&self, diagnostics: &PairDiagnostics<'_>) -> Result<()> {
        let canvas = draw_matches(diagnostics);
        let mut bytes: Vec<u8> = Vec::new();
        canvas.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)?;

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.recording
            .set_time("pair", TimeCell::from_sequence(sequence));
        let image = rerun::EncodedImage::from_file_contents(bytes);
        let (i, j) = diagnostics.pair;
        self.recording
            .log(format!("{}/matches/{:06}-{:06}", self.topic, i, j), &image)
            .map_err(|e| Error::Visualization(e.to_string()))?;

        let (pts_i, pts_j): (Vec<_>, Vec<_>) = diagnostics
            .selected_points()
            .map(|(p, q)| ((p.x, p.y), (q.x, q.y)))
            .unzip();
        for (name, pts) in [("frame_i", pts_i), ("frame_j", pts_j)] {
            self.recording
                .log(
                    format!("{}/{}", self.topic, name),
                    &rerun::Points2D::new(rerun_shift(&pts))
                        .with_radii([rerun::Radius::new_ui_points(3.0)]),
                )
                .map_err(|e| Error::Visualization(e.to_string()))?;
        }
        Ok(())
    }
}

impl MatchSink for Vec<Box<dyn MatchSink>> {
    fn record(&self, diagnostics: &PairDiagnostics<'_>) -> Result<()> {
        for sink in self {
            sink.record(diagnostics)?;
        }
        Ok(())
    }
}
