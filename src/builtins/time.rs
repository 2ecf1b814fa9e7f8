// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::{BuiltinContext, BuiltinDescriptor, OperandType, RegistryBuilder};
use crate::number::Number;
use crate::term::Term;

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

pub fn register(m: &mut RegistryBuilder) {
    m.insert(
        BuiltinDescriptor::contextual("time.now_ns", &[], OperandType::Number, now_ns)
            .nondeterministic(),
    );
}

/// Nanoseconds since the epoch, or 0 if the clock is before it.
pub(crate) fn wall_clock_ns() -> i128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i128::try_from(d.as_nanos()).unwrap_or(i128::MAX))
        .unwrap_or(0)
}

// Every call within one query observes the query's start time.
fn now_ns(ctx: &BuiltinContext<'_>, _args: &[Term]) -> Result<Option<Term>> {
    Ok(Some(Term::Number(Number::from(ctx.time_ns))))
}
