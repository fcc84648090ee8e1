use thiserror::Error;

/// Failure modes of the linear-response core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResponseError {
    /// The requested functional/spin/collinearity combination has no kernel.
    #[error("no response kernel available for {kind}: {reason}")]
    KernelUnavailable { kind: String, reason: String },

    /// A candidate root with X†X - Y†Y <= 0.
    #[error("root at {energy:.8} Eh has a non-positive norm X†X - Y†Y = {norm:.3e}")]
    DegenerateNorm { energy: f64, norm: f64 },

    #[error("only {found} of {requested} requested roots survived the norm check")]
    InsufficientRoots { requested: usize, found: usize },

    #[error("{solver} did not converge within {iterations} iterations")]
    EigensolveDidNotConverge {
        solver: &'static str,
        iterations: usize,
    },

    #[error("invalid orbital set: {0}")]
    InvalidOrbitals(String),

    #[error("shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },

    #[error("linear algebra failure: {0}")]
    Linalg(String),
}

impl ResponseError {
    pub(crate) fn shape<E: std::fmt::Debug, F: std::fmt::Debug>(expected: E, found: F) -> Self {
        ResponseError::ShapeMismatch {
            expected: format!("{:?}", expected),
            found: format!("{:?}", found),
        }
    }
}

impl From<ndarray_linalg::error::LinalgError> for ResponseError {
    fn from(err: ndarray_linalg::error::LinalgError) -> Self {
        ResponseError::Linalg(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ResponseError {
    fn from(err: ndarray::ShapeError) -> Self {
        ResponseError::Linalg(err.to_string())
    }
}
