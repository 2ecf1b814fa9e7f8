// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt;
use core::time::Duration;

/// Reported when a query runs past its configured time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitError {
    TimeLimitExceeded {
        /// Elapsed evaluation time when the overrun was observed.
        elapsed: Duration,
        /// Configured budget.
        limit: Duration,
    },
}

impl fmt::Display for LimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeLimitExceeded { elapsed, limit } => write!(
                f,
                "execution exceeded time limit (elapsed={}ns, limit={}ns)",
                elapsed.as_nanos(),
                limit.as_nanos()
            ),
        }
    }
}

impl core::error::Error for LimitError {}
