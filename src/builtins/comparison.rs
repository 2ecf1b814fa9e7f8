// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::utils::ensure_args_count;
use crate::builtins::{BuiltinDescriptor, OperandType, RegistryBuilder};
use crate::term::Term;

use core::cmp::Ordering;

use anyhow::Result;

const ANY2: &[OperandType] = &[OperandType::Any, OperandType::Any];

pub fn register(m: &mut RegistryBuilder) {
    m.insert(BuiltinDescriptor::pure("equal", ANY2, OperandType::Boolean, equal));
    m.insert(BuiltinDescriptor::pure("neq", ANY2, OperandType::Boolean, neq));
    m.insert(BuiltinDescriptor::pure("lt", ANY2, OperandType::Boolean, lt));
    m.insert(BuiltinDescriptor::pure("lte", ANY2, OperandType::Boolean, lte));
    m.insert(BuiltinDescriptor::pure("gt", ANY2, OperandType::Boolean, gt));
    m.insert(BuiltinDescriptor::pure("gte", ANY2, OperandType::Boolean, gte));
}

/// Compares two values using the total order of terms.
///
/// Values of different kinds compare by kind: null < boolean < number < string < array <
/// object < set. Collections compare element-wise, then by length.
fn compare(name: &str, args: &[Term], accept: fn(Ordering) -> bool) -> Result<Option<Term>> {
    ensure_args_count(name, args, 2)?;
    Ok(Some(Term::Bool(accept(args[0].cmp(&args[1])))))
}

fn equal(args: &[Term]) -> Result<Option<Term>> {
    compare("equal", args, Ordering::is_eq)
}

fn neq(args: &[Term]) -> Result<Option<Term>> {
    compare("neq", args, Ordering::is_ne)
}

fn lt(args: &[Term]) -> Result<Option<Term>> {
    compare("lt", args, Ordering::is_lt)
}

fn lte(args: &[Term]) -> Result<Option<Term>> {
    compare("lte", args, Ordering::is_le)
}

fn gt(args: &[Term]) -> Result<Option<Term>> {
    compare("gt", args, Ordering::is_gt)
}

fn gte(args: &[Term]) -> Result<Option<Term>> {
    compare("gte", args, Ordering::is_ge)
}
