// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/*
ExecutionTimer bounds the wall-clock time a single query may spend in the evaluator.

The evaluator calls tick() at every cancellation check point (each expression and each
iteration step). Reading the clock on every tick would dominate tight loops, so ticks are
counted and the clock is only consulted once `check_interval` ticks have accumulated.

The timer never reads a clock itself; callers pass the current monotonic Duration obtained
from monotonic_now(). Std builds anchor a std::time::Instant once per process. Tests can
install their own TimeSource to make deadlines deterministic.
*/

use core::num::NonZeroU32;
use core::time::Duration;

use spin::Mutex;

use super::LimitError;

#[cfg(test)]
use std::sync::{Mutex as StdMutex, MutexGuard as StdMutexGuard};

/// Time budget of a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutionTimerConfig {
    /// Maximum wall-clock duration of one query.
    pub limit: Duration,
    /// Number of check points between clock reads.
    pub check_interval: NonZeroU32,
}

/// Monotonic time provider.
pub trait TimeSource: Send + Sync {
    /// Non-decreasing duration since an arbitrary anchor.
    fn now(&self) -> Option<Duration>;
}

#[cfg(feature = "std")]
struct StdTimeSource;

#[cfg(feature = "std")]
impl TimeSource for StdTimeSource {
    fn now(&self) -> Option<Duration> {
        use std::sync::OnceLock;

        static ANCHOR: OnceLock<std::time::Instant> = OnceLock::new();
        Some(ANCHOR.get_or_init(std::time::Instant::now).elapsed())
    }
}

#[cfg(feature = "std")]
static STD_TIME_SOURCE: StdTimeSource = StdTimeSource;

static TIME_SOURCE_OVERRIDE: Mutex<Option<&'static dyn TimeSource>> = Mutex::new(None);

static FALLBACK_EXECUTION_TIMER_CONFIG: Mutex<Option<ExecutionTimerConfig>> = Mutex::new(None);

#[cfg(test)]
static LIMITS_TEST_LOCK: StdMutex<()> = StdMutex::new(());

#[cfg(test)]
pub fn acquire_limits_test_lock() -> StdMutexGuard<'static, ()> {
    LIMITS_TEST_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Current monotonic time from the installed source.
pub fn monotonic_now() -> Option<Duration> {
    let source = *TIME_SOURCE_OVERRIDE.lock();
    if let Some(duration) = source.and_then(|s| s.now()) {
        return Some(duration);
    }

    #[cfg(feature = "std")]
    {
        STD_TIME_SOURCE.now()
    }

    #[cfg(not(feature = "std"))]
    {
        None
    }
}

/// Replaces the clock used by [`monotonic_now`]. Passing `None` restores the default clock.
/// Returns the previously installed source.
pub fn set_time_source(
    source: Option<&'static dyn TimeSource>,
) -> Option<&'static dyn TimeSource> {
    core::mem::replace(&mut *TIME_SOURCE_OVERRIDE.lock(), source)
}

/// Sets the process-wide time budget used by engines that have no budget of their own.
pub fn set_fallback_execution_timer_config(config: Option<ExecutionTimerConfig>) {
    *FALLBACK_EXECUTION_TIMER_CONFIG.lock() = config;
}

pub fn fallback_execution_timer_config() -> Option<ExecutionTimerConfig> {
    *FALLBACK_EXECUTION_TIMER_CONFIG.lock()
}

/// Cooperative deadline tracker owned by one query.
#[derive(Debug)]
pub struct ExecutionTimer {
    config: Option<ExecutionTimerConfig>,
    start: Option<Duration>,
    pending_ticks: u32,
}

impl ExecutionTimer {
    pub const fn new(config: Option<ExecutionTimerConfig>) -> Self {
        Self {
            config,
            start: None,
            pending_ticks: 0,
        }
    }

    /// Records the start of the query.
    pub fn start(&mut self, now: Duration) {
        self.start = Some(now);
        self.pending_ticks = 0;
    }

    pub const fn config(&self) -> Option<ExecutionTimerConfig> {
        self.config
    }

    /// Counts one check point and reads the clock when the interval is reached.
    pub fn tick(&mut self, now: impl FnOnce() -> Option<Duration>) -> Result<(), LimitError> {
        let Some(config) = self.config else {
            return Ok(());
        };
        self.pending_ticks = self.pending_ticks.saturating_add(1);
        if self.pending_ticks < config.check_interval.get() {
            return Ok(());
        }
        self.pending_ticks = 0;
        match now() {
            Some(now) => self.check_now(now),
            None => Ok(()),
        }
    }

    /// Compares `now` against the deadline regardless of the tick count.
    pub fn check_now(&self, now: Duration) -> Result<(), LimitError> {
        let (Some(config), Some(start)) = (self.config, self.start) else {
            return Ok(());
        };
        let elapsed = now.saturating_sub(start);
        if elapsed > config.limit {
            return Err(LimitError::TimeLimitExceeded {
                elapsed,
                limit: config.limit,
            });
        }
        Ok(())
    }

    pub fn elapsed(&self, now: Duration) -> Option<Duration> {
        Some(now.saturating_sub(self.start?))
    }
}
