// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::utils::{ensure_args_count, ensure_string};
use crate::builtins::{BuiltinContext, BuiltinDescriptor, OperandType, RegistryBuilder};
use crate::term::Term;
use crate::trace::TraceEvent;

use anyhow::Result;

pub fn register(m: &mut RegistryBuilder) {
    m.insert(BuiltinDescriptor::contextual(
        "trace",
        &[OperandType::String],
        OperandType::Boolean,
        trace,
    ));
}

fn trace(ctx: &BuiltinContext<'_>, args: &[Term]) -> Result<Option<Term>> {
    let name = "trace";
    ensure_args_count(name, args, 1)?;
    let msg = ensure_string(name, &args[0])?;

    if let Some(tracer) = ctx.tracer {
        tracer.event(TraceEvent::Note {
            depth: ctx.depth,
            message: msg.to_string(),
        });
    }
    Ok(Some(Term::Bool(true)))
}
