pub mod aggregator;
pub mod config;
pub mod data_loader;
pub mod detected_points;
pub mod error;
pub mod extractor;
pub mod features;
pub mod geometry;
pub mod io;
pub mod optimization;
pub mod refinement;
pub mod sampling;
pub mod types;
pub mod visualization;

pub use error::{Error, Result};
