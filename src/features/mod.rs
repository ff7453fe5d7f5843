pub mod detector;
pub mod matcher;

pub use detector::*;
pub use matcher::*;
