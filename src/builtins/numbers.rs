// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::utils::{ensure_args_count, ensure_integer, ensure_numeric, ensure_set, ensure_string};
use crate::builtins::{BuiltinDescriptor, OperandType, RegistryBuilder};
use crate::number::Number;
use crate::term::Term;

use std::str::FromStr;

use anyhow::{bail, Result};
use rand::{thread_rng, Rng};

const NUM: &[OperandType] = &[OperandType::Number];
const NUM2: &[OperandType] = &[OperandType::Number, OperandType::Number];
const NUM_OR_SET: OperandType = OperandType::Union(&[OperandType::Number, OperandType::Set]);

// Guard against accidental huge allocations from `numbers.range`.
const MAX_RANGE_LEN: u64 = 10_000_000;

pub fn register(m: &mut RegistryBuilder) {
    m.insert(BuiltinDescriptor::pure("plus", NUM2, OperandType::Number, plus));
    m.insert(BuiltinDescriptor::pure(
        "minus",
        &[NUM_OR_SET, NUM_OR_SET],
        NUM_OR_SET,
        minus,
    ));
    m.insert(BuiltinDescriptor::pure("mul", NUM2, OperandType::Number, mul));
    m.insert(BuiltinDescriptor::pure("div", NUM2, OperandType::Number, div));
    m.insert(BuiltinDescriptor::pure("rem", NUM2, OperandType::Number, rem));
    m.insert(BuiltinDescriptor::pure("abs", NUM, OperandType::Number, abs));
    m.insert(BuiltinDescriptor::pure("ceil", NUM, OperandType::Number, ceil));
    m.insert(BuiltinDescriptor::pure("floor", NUM, OperandType::Number, floor));
    m.insert(BuiltinDescriptor::pure("round", NUM, OperandType::Number, round));
    m.insert(BuiltinDescriptor::pure(
        "numbers.range",
        NUM2,
        OperandType::Array,
        range,
    ));
    m.insert(BuiltinDescriptor::pure(
        "to_number",
        &[OperandType::Union(&[
            OperandType::Null,
            OperandType::Boolean,
            OperandType::Number,
            OperandType::String,
        ])],
        OperandType::Number,
        to_number,
    ));
    m.insert(
        BuiltinDescriptor::pure(
            "rand.intn",
            &[OperandType::String, OperandType::Number],
            OperandType::Number,
            intn,
        )
        .nondeterministic(),
    );
}

fn binary(
    name: &str,
    args: &[Term],
    op: fn(&Number, &Number) -> Result<Number>,
) -> Result<Option<Term>> {
    ensure_args_count(name, args, 2)?;
    let v1 = ensure_numeric(name, &args[0])?;
    let v2 = ensure_numeric(name, &args[1])?;
    Ok(Some(Term::Number(op(&v1, &v2)?)))
}

fn plus(args: &[Term]) -> Result<Option<Term>> {
    binary("plus", args, Number::add)
}

/// Numeric subtraction, or set difference when both operands are sets.
fn minus(args: &[Term]) -> Result<Option<Term>> {
    let name = "minus";
    ensure_args_count(name, args, 2)?;
    match (&args[0], &args[1]) {
        (Term::Set(_), _) | (_, Term::Set(_)) => {
            let s1 = ensure_set(name, &args[0])?;
            let s2 = ensure_set(name, &args[1])?;
            Ok(Some(Term::from(
                s1.difference(&s2).cloned().collect::<std::collections::BTreeSet<_>>(),
            )))
        }
        _ => binary(name, args, Number::sub),
    }
}

fn mul(args: &[Term]) -> Result<Option<Term>> {
    binary("mul", args, Number::mul)
}

fn div(args: &[Term]) -> Result<Option<Term>> {
    binary("div", args, Number::divide)
}

fn rem(args: &[Term]) -> Result<Option<Term>> {
    binary("rem", args, Number::modulo)
}

fn unary(name: &str, args: &[Term], op: fn(&Number) -> Number) -> Result<Option<Term>> {
    ensure_args_count(name, args, 1)?;
    Ok(Some(Term::Number(op(&ensure_numeric(name, &args[0])?))))
}

fn abs(args: &[Term]) -> Result<Option<Term>> {
    unary("abs", args, Number::abs)
}

fn ceil(args: &[Term]) -> Result<Option<Term>> {
    unary("ceil", args, Number::ceil)
}

fn floor(args: &[Term]) -> Result<Option<Term>> {
    unary("floor", args, Number::floor)
}

fn round(args: &[Term]) -> Result<Option<Term>> {
    unary("round", args, Number::round)
}

fn range(args: &[Term]) -> Result<Option<Term>> {
    let name = "numbers.range";
    ensure_args_count(name, args, 2)?;
    let v1 = ensure_integer(name, &args[0])?;
    let v2 = ensure_integer(name, &args[1])?;

    if v1.abs_diff(v2) >= MAX_RANGE_LEN {
        bail!("`{name}` range {v1}..{v2} is too large");
    }

    let values: Vec<Term> = if v2 >= v1 {
        (v1..=v2).map(Term::from).collect()
    } else {
        (v2..=v1).rev().map(Term::from).collect()
    };
    Ok(Some(Term::from(values)))
}

fn to_number(args: &[Term]) -> Result<Option<Term>> {
    let name = "to_number";
    ensure_args_count(name, args, 1)?;
    Ok(Some(Term::Number(match &args[0] {
        Term::Null => Number::from(0u64),
        Term::Bool(b) => Number::from(u64::from(*b)),
        Term::Number(n) => n.clone(),
        Term::String(s) => match Number::from_str(s) {
            Ok(n) => n,
            Err(_) => bail!("`{name}` could not parse `{s}` as a number"),
        },
        v => bail!("`{name}` expects null, boolean, number or string. Got `{v}`"),
    })))
}

fn intn(args: &[Term]) -> Result<Option<Term>> {
    let name = "rand.intn";
    ensure_args_count(name, args, 2)?;
    let _ = ensure_string(name, &args[0])?;
    let n = ensure_integer(name, &args[1])?;

    let n = n.unsigned_abs();
    if n == 0 {
        return Ok(Some(Term::from(0u64)));
    }

    let mut rng = thread_rng();
    let v = rng.gen_range(0..n);
    Ok(Some(Term::from(v)))
}
