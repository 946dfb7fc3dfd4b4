use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid {what} index {index} (valid range 0..{len})")]
    InvalidIndex {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Boundary {boundary_id} is not flagged reflective")]
    NotReflective { boundary_id: usize },

    #[error("No mirror direction for direction {direction} on boundary {boundary_id}")]
    NoMirrorFound { boundary_id: usize, direction: usize },

    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Solver failed at iteration {iteration}: {message}")]
    SolverFailure { iteration: usize, message: String },

    #[error("Run cancelled before generation {generation}")]
    Cancelled { generation: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Linear algebra error: {0}")]
    LinAlg(String),
}

pub type TransportResult<T> = Result<T, TransportError>;
