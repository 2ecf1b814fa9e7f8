// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::utils::{ensure_args_count, ensure_array, ensure_integer};
use crate::builtins::{BuiltinDescriptor, OperandType, RegistryBuilder};
use crate::term::Term;
use crate::Rc;

use anyhow::Result;

pub fn register(m: &mut RegistryBuilder) {
    m.insert(BuiltinDescriptor::pure(
        "array.concat",
        &[OperandType::Array, OperandType::Array],
        OperandType::Array,
        concat,
    ));
    m.insert(BuiltinDescriptor::pure(
        "array.reverse",
        &[OperandType::Array],
        OperandType::Array,
        reverse,
    ));
    m.insert(BuiltinDescriptor::pure(
        "array.slice",
        &[OperandType::Array, OperandType::Number, OperandType::Number],
        OperandType::Array,
        slice,
    ));
}

fn concat(args: &[Term]) -> Result<Option<Term>> {
    let name = "array.concat";
    ensure_args_count(name, args, 2)?;
    let mut v1 = ensure_array(name, &args[0])?;
    let v2 = ensure_array(name, &args[1])?;

    Rc::make_mut(&mut v1).extend(v2.iter().cloned());
    Ok(Some(Term::Array(v1)))
}

fn reverse(args: &[Term]) -> Result<Option<Term>> {
    let name = "array.reverse";
    ensure_args_count(name, args, 1)?;

    let mut v1 = ensure_array(name, &args[0])?;
    Rc::make_mut(&mut v1).reverse();
    Ok(Some(Term::Array(v1)))
}

/// Indices are clamped to the array bounds; an empty range gives an empty array.
fn slice(args: &[Term]) -> Result<Option<Term>> {
    let name = "array.slice";
    ensure_args_count(name, args, 3)?;

    let array = ensure_array(name, &args[0])?;
    let clamp = |i: i64| usize::try_from(i.max(0)).unwrap_or(usize::MAX).min(array.len());
    let start = clamp(ensure_integer(name, &args[1])?);
    let stop = clamp(ensure_integer(name, &args[2])?);

    if start >= stop {
        return Ok(Some(Term::new_array()));
    }
    Ok(Some(Term::from(array[start..stop].to_vec())))
}
