// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cooperative wall-clock limits for query evaluation.

mod error;
mod time;

pub use error::LimitError;
pub use time::{
    fallback_execution_timer_config, monotonic_now, set_fallback_execution_timer_config, set_time_source,
    ExecutionTimer, ExecutionTimerConfig, TimeSource,
};

#[cfg(test)]
pub(crate) use time::acquire_limits_test_lock;
