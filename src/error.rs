// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::utils::limits::LimitError;

use thiserror::Error;

/// Errors that abort a query.
///
/// "No solution" is not an error: a path that fails simply backtracks, and a query without
/// solutions returns an empty result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Rules produced different values for a complete document or the same key of a partial
    /// object, or a function produced different outputs for the same inputs.
    #[error("{path}: conflicting values: {message}")]
    Conflict { path: String, message: String },

    /// A virtual document (or function) was requested while it was being evaluated.
    #[error("rego_recursion_error: rule {} is recursive: {}", chain.last().map(String::as_str).unwrap_or_default(), chain.join(" -> "))]
    Recursion { chain: Vec<String> },

    #[error("{name}: {message}")]
    Builtin {
        name: String,
        operands: Vec<String>,
        message: String,
    },

    /// A built-in was called with an operand outside its declared signature.
    #[error("{name}: operand {position} must be {expected} but got {found}")]
    TypeMismatch {
        name: String,
        position: usize,
        expected: String,
        found: String,
    },

    #[error("evaluation cancelled")]
    Cancelled,

    #[error("evaluation cancelled: {0}")]
    Timeout(LimitError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid module: {0}")]
    Compile(String),

    #[error("json error: {0}")]
    Json(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EvalError {
    /// True for both explicit cancellation and time limit expiry.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, EvalError::Cancelled | EvalError::Timeout(_))
    }
}

impl From<anyhow::Error> for EvalError {
    fn from(err: anyhow::Error) -> Self {
        EvalError::Internal(format!("{err}"))
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(err: serde_json::Error) -> Self {
        EvalError::Json(err.to_string())
    }
}

impl From<LimitError> for EvalError {
    fn from(err: LimitError) -> Self {
        EvalError::Timeout(err)
    }
}

pub type Result<T> = core::result::Result<T, EvalError>;
