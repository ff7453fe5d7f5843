use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub type FramePair = (usize, usize);

/// Strategy used to pick which frame pairs get compared.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameSamplingMode {
    /// All unique pairs of frames.
    Exhaustive,
    /// All consecutive pairs.
    Consecutive,
    /// Consecutive pairs plus pairs at increasing power-of-two distances.
    #[default]
    Hierarchical,
}

impl fmt::Display for FrameSamplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameSamplingMode::Exhaustive => "exhaustive",
            FrameSamplingMode::Consecutive => "consecutive",
            FrameSamplingMode::Hierarchical => "hierarchical",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for FrameSamplingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "exhaustive" => Ok(FrameSamplingMode::Exhaustive),
            "consecutive" => Ok(FrameSamplingMode::Consecutive),
            "hierarchical" => Ok(FrameSamplingMode::Hierarchical),
            _ => Err(Error::UnsupportedMode(s.to_string())),
        }
    }
}

/// Selects the frame pairs for feature extraction.
///
/// Every returned pair `(i, j)` satisfies `i < j` and no pair appears twice.
pub fn sample_frame_pairs(num_frames: usize, mode: FrameSamplingMode) -> Result<Vec<FramePair>> {
    if num_frames < 2 {
        return Err(Error::Configuration(format!(
            "frame pair sampling needs at least 2 frames, but got {}",
            num_frames
        )));
    }

    let frame_pairs: Vec<FramePair> = match mode {
        FrameSamplingMode::Exhaustive => (0..num_frames)
            .flat_map(|i| (i + 1..num_frames).map(move |j| (i, j)))
            .collect(),
        FrameSamplingMode::Consecutive => (0..num_frames - 1).map(|i| (i, i + 1)).collect(),
        FrameSamplingMode::Hierarchical => {
            let max_level = (num_frames - 1).ilog2();
            (0..=max_level)
                .flat_map(|level| {
                    let step = 1usize << level;
                    (0..num_frames)
                        .step_by(step)
                        .map(move |start| (start, start + step))
                        .filter(|&(_, end)| end < num_frames)
                })
                .collect()
        }
    };

    log::info!(
        "sampled {} frame pairs from {} frames ({})",
        frame_pairs.len(),
        num_frames,
        mode
    );
    Ok(frame_pairs)
}
