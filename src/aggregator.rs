use indicatif::ParallelProgressIterator;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::detected_points::CorrespondenceSet;
use crate::error::{Error, Result};
use crate::extractor::{
    CorrespondenceExtractor, ExtractionContext, PairOutcome, PairResult, RejectionStage,
};
use crate::sampling::FramePair;

/// How many pairs were turned down at each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionCounts {
    pub insufficient_keypoints: usize,
    pub insufficient_matches: usize,
    pub insufficient_inliers: usize,
}

impl RejectionCounts {
    fn add(&mut self, stage: RejectionStage) {
        match stage {
            RejectionStage::InsufficientKeypoints => self.insufficient_keypoints += 1,
            RejectionStage::InsufficientMatches => self.insufficient_matches += 1,
            RejectionStage::InsufficientInliers => self.insufficient_inliers += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.insufficient_keypoints + self.insufficient_matches + self.insufficient_inliers
    }
}

/// A pair whose extraction raised an error instead of a rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPair {
    pub pair: FramePair,
    pub error: String,
}

/// Frames touched by accepted correspondences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameCoverage {
    pub covered_frames: usize,
    /// `covered_frames / num_frames`
    pub coverage: f64,
    /// Maximal runs of covered frames as inclusive `(first, last)` ranges.
    pub groups: Vec<(usize, usize)>,
}

/// Scans `0..num_frames` and groups consecutive covered frames.
pub fn frame_coverage<I: IntoIterator<Item = usize>>(indices: I, num_frames: usize) -> FrameCoverage {
    let mut covered = vec![false; num_frames];
    for i in indices {
        if let Some(c) = covered.get_mut(i) {
            *c = true;
        }
    }

    let mut groups = Vec::new();
    let mut start = None;
    for (i, &c) in covered.iter().enumerate() {
        match (c, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                groups.push((s, i - 1));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        groups.push((s, num_frames - 1));
    }

    let covered_frames = covered.iter().filter(|&&c| c).count();
    let coverage = if num_frames == 0 {
        0.0
    } else {
        covered_frames as f64 / num_frames as f64
    };
    FrameCoverage {
        covered_frames,
        coverage,
        groups,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub accepted_pairs: usize,
    pub total_pairs: usize,
    pub num_frames: usize,
    pub covered_frames: usize,
    pub coverage: f64,
    pub contiguous_groups: usize,
    pub groups: Vec<(usize, usize)>,
    pub rejections: RejectionCounts,
    pub failed_pairs: Vec<FailedPair>,
}

impl CoverageReport {
    fn log_summary(&self) {
        log::info!(
            "Found {} good frame pairs ({}/{})",
            self.accepted_pairs,
            self.accepted_pairs,
            self.total_pairs
        );
        log::info!("Frame pairs cover {:.2}% of the frames.", 100.0 * self.coverage);
        log::info!("Found {} groups of consecutive frames.", self.contiguous_groups);
        log::debug!("rejections: {:?}", self.rejections);
        if !self.failed_pairs.is_empty() {
            log::warn!("{} frame pairs failed", self.failed_pairs.len());
        }
    }
}

/// Runs the extractor over every sampled pair and merges the accepted ones.
pub struct CorrespondenceAggregator<'a> {
    extractor: &'a CorrespondenceExtractor,
}

impl<'a> CorrespondenceAggregator<'a> {
    pub fn new(extractor: &'a CorrespondenceExtractor) -> CorrespondenceAggregator<'a> {
        CorrespondenceAggregator { extractor }
    }

    /// Pairs are processed in parallel and merged in the order of `pairs`.
    ///
    /// A pair that fails is logged and listed in [`CoverageReport::failed_pairs`];
    /// the remaining pairs are still processed.
    pub fn aggregate(
        &self,
        ctx: &ExtractionContext,
        pairs: &[FramePair],
    ) -> Result<(CorrespondenceSet, CoverageReport)> {
        let num_frames = ctx.num_frames();
        if let Some(pair) = pairs
            .iter()
            .find(|(i, j)| *i >= num_frames || *j >= num_frames)
        {
            return Err(Error::DataIntegrity(format!(
                "frame pair {:?} is out of range for {} frames",
                pair, num_frames
            )));
        }

        log::info!("Extracting matching image feature info...");
        let results: Vec<(FramePair, Result<PairResult>)> = pairs
            .par_iter()
            .progress_count(pairs.len() as u64)
            .map(|&pair| (pair, self.extractor.extract_pair(ctx, pair)))
            .collect();

        let mut correspondences = CorrespondenceSet::default();
        let mut rejections = RejectionCounts::default();
        let mut failed_pairs = Vec::new();
        let mut accepted_pairs = 0;
        for (pair, result) in results {
            match result {
                Ok(PairResult {
                    outcome: PairOutcome::Accepted(pair_correspondences),
                    ..
                }) => {
                    correspondences.extend_from_pair(&pair_correspondences);
                    accepted_pairs += 1;
                }
                Ok(PairResult {
                    outcome: PairOutcome::Rejected(stage),
                    ..
                }) => rejections.add(stage),
                Err(e) => {
                    log::warn!("frame pair {:?} failed: {}", pair, e);
                    failed_pairs.push(FailedPair {
                        pair,
                        error: e.to_string(),
                    });
                }
            }
        }

        let coverage = frame_coverage(correspondences.frame_indices(), num_frames);
        let report = CoverageReport {
            accepted_pairs,
            total_pairs: pairs.len(),
            num_frames,
            covered_frames: coverage.covered_frames,
            coverage: coverage.coverage,
            contiguous_groups: coverage.groups.len(),
            groups: coverage.groups,
            rejections,
            failed_pairs,
        };
        report.log_summary();
        Ok((correspondences, report))
    }
}
