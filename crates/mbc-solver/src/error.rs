//! Error types for mbc-solver

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("dimension mismatch: node {node} has {found} DOFs, element requires {expected}")]
    DimensionMismatch {
        node: i32,
        expected: usize,
        found: usize,
    },

    #[error("singular matrix: {0}")]
    SingularMatrix(String),

    #[error("no convergence after {iterations} iterations: {context}")]
    SectionConvergence { context: String, iterations: usize },

    #[error("state determination of element {element} failed: {source}")]
    ConvergenceFailure {
        element: i32,
        #[source]
        source: Box<Error>,
    },

    #[error("element {0} is not attached to a domain")]
    NotAttached(i32),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Numerical failures the global driver may recover from by cutting the step.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::SingularMatrix(_) | Error::SectionConvergence { .. } => true,
            Error::ConvergenceFailure { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }

    /// Innermost error of a `ConvergenceFailure` chain.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::ConvergenceFailure { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub(crate) fn within(self, element: i32) -> Error {
        match self {
            Error::ConvergenceFailure { .. } => self,
            err if err.is_recoverable() => Error::ConvergenceFailure {
                element,
                source: Box::new(err),
            },
            err => err,
        }
    }
}

/// Integer status of a lifecycle call as seen by a global driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ReturnCode {
    Success = 0,
    Recoverable = -1,
    Fatal = -2,
}

impl ReturnCode {
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => ReturnCode::Success,
            Err(err) if err.is_recoverable() => ReturnCode::Recoverable,
            Err(_) => ReturnCode::Fatal,
        }
    }
}

/// Status code of a lifecycle call: 0 on success, negative on failure.
pub fn status_code<T>(result: &Result<T>) -> i32 {
    ReturnCode::of(result) as i32
}
