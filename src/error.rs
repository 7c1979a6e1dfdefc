use std::io;

/// Errors surfaced by the position-encoding layer.
#[derive(Debug, thiserror::Error)]
pub enum EmbedPositionError {
    #[error("shape mismatch in {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("prev_context requested but no chunk has been processed on this stream yet")]
    UninitializedStreamState,

    #[error("non-finite value in recurrent state ({count} entries)")]
    NonFiniteOutput { count: usize },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("weights file error: {0}")]
    Io(#[from] io::Error),

    #[error("weights json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EmbedPositionError {
    pub(crate) fn shape(what: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EmbedPositionError>;
