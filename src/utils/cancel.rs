// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::{EvalError, Result};
use crate::utils::limits::{monotonic_now, ExecutionTimer, ExecutionTimerConfig};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag used to abort running queries from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Clears the flag so the token can be reused for later queries.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Per-query check point combining the cancellation flag and the time budget.
#[derive(Debug)]
pub(crate) struct CancelCheck {
    token: Option<CancellationToken>,
    timer: ExecutionTimer,
}

impl CancelCheck {
    pub(crate) fn new(
        token: Option<CancellationToken>,
        timer_config: Option<ExecutionTimerConfig>,
    ) -> Self {
        let mut timer = ExecutionTimer::new(timer_config);
        if let Some(now) = monotonic_now() {
            timer.start(now);
        }
        Self { token, timer }
    }

    pub(crate) fn check(&mut self) -> Result<()> {
        if self.token.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(EvalError::Cancelled);
        }
        self.timer.tick(monotonic_now)?;
        Ok(())
    }
}
