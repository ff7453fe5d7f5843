use std::io::Write;
use std::path::Path;

use serde::{Serialize, de::DeserializeOwned};

use crate::aggregator::CoverageReport;
use crate::error::Result;
use crate::sampling::FrameSamplingMode;

/// Serializes an object to a JSON file.
pub fn object_to_json<T: Serialize, P: AsRef<Path>>(output_path: P, object: &T) -> Result<()> {
    let j = serde_json::to_string_pretty(object)?;
    let mut file = std::fs::File::create(output_path)?;
    file.write_all(j.as_bytes())?;
    Ok(())
}

/// Deserializes an object from a JSON file.
pub fn object_from_json<T: DeserializeOwned, P: AsRef<Path>>(file_path: P) -> Result<T> {
    let contents = std::fs::read_to_string(file_path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[derive(Debug, Serialize)]
struct RefinementReport<'a> {
    timestamp: String,
    frame_sampling: FrameSamplingMode,
    num_correspondences: usize,
    coverage: &'a CoverageReport,
}

fn local_timestamp() -> String {
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    now.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

/// Writes the coverage statistics of a run as pretty JSON.
pub fn write_coverage_report<P: AsRef<Path>>(
    output_path: P,
    frame_sampling: FrameSamplingMode,
    num_correspondences: usize,
    coverage: &CoverageReport,
) -> Result<()> {
    let report = RefinementReport {
        timestamp: local_timestamp(),
        frame_sampling,
        num_correspondences,
        coverage,
    };
    object_to_json(output_path, &report)
}
