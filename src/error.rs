use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid constructor or parameter values. Never silently clamped.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("`{name}` must have shape {expected}, but got {actual}")]
    Shape {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("unsupported frame sampling mode: {0}")]
    UnsupportedMode(String),

    #[error("`{0}` is not invertible")]
    SingularMatrix(&'static str),

    /// Frames, depth maps and masks that do not agree with each other.
    #[error("data integrity: {0}")]
    DataIntegrity(String),

    #[error("visualization: {0}")]
    Visualization(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Glob(#[from] glob::PatternError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Formats a shape the way the error messages print it, `None` meaning "any".
pub(crate) fn fmt_shape(dims: &[Option<usize>]) -> String {
    let parts: Vec<String> = dims
        .iter()
        .map(|d| match d {
            Some(v) => v.to_string(),
            None => "?".to_string(),
        })
        .collect();
    if parts.len() == 1 {
        format!("({},)", parts[0])
    } else {
        format!("({})", parts.join(", "))
    }
}

/// Fails with [`Error::Shape`] when `actual` does not match `expected`.
pub(crate) fn validate_shape(
    name: &str,
    actual: &[usize],
    expected: &[Option<usize>],
) -> Result<()> {
    let matches = actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected)
            .all(|(a, e)| e.is_none_or(|e| e == *a));
    if matches {
        Ok(())
    } else {
        let actual: Vec<Option<usize>> = actual.iter().map(|a| Some(*a)).collect();
        Err(Error::Shape {
            name: name.to_string(),
            expected: fmt_shape(expected),
            actual: fmt_shape(&actual),
        })
    }
}
