// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::utils::{ensure_args_count, ensure_iterable, ensure_numeric};
use crate::builtins::{BuiltinDescriptor, OperandType, RegistryBuilder};
use crate::number::Number;
use crate::term::Term;

use anyhow::{bail, Result};

const ITERABLE: &[OperandType] = &[OperandType::ITERABLE];

pub fn register(m: &mut RegistryBuilder) {
    m.insert(BuiltinDescriptor::pure(
        "count",
        &[OperandType::Union(&[
            OperandType::Array,
            OperandType::Object,
            OperandType::Set,
            OperandType::String,
        ])],
        OperandType::Number,
        count,
    ));
    m.insert(BuiltinDescriptor::pure("max", ITERABLE, OperandType::Any, max));
    m.insert(BuiltinDescriptor::pure("min", ITERABLE, OperandType::Any, min));
    m.insert(BuiltinDescriptor::pure("product", ITERABLE, OperandType::Number, product));
    m.insert(BuiltinDescriptor::pure("sort", ITERABLE, OperandType::Array, sort));
    m.insert(BuiltinDescriptor::pure("sum", ITERABLE, OperandType::Number, sum));
}

fn count(args: &[Term]) -> Result<Option<Term>> {
    ensure_args_count("count", args, 1)?;

    Ok(Some(Term::from(match &args[0] {
        Term::Array(a) => a.len(),
        Term::Set(a) => a.len(),
        Term::Object(a) => a.len(),
        Term::String(a) => a.chars().count(),
        a => bail!("`count` requires array/object/set/string argument. Got `{a}`."),
    })))
}

// Empty collections have no maximum or minimum.
fn max(args: &[Term]) -> Result<Option<Term>> {
    ensure_args_count("max", args, 1)?;
    Ok(ensure_iterable("max", &args[0])?.into_iter().max().cloned())
}

fn min(args: &[Term]) -> Result<Option<Term>> {
    ensure_args_count("min", args, 1)?;
    Ok(ensure_iterable("min", &args[0])?.into_iter().min().cloned())
}

fn fold(name: &str, args: &[Term], init: Number, op: fn(&Number, &Number) -> Result<Number>) -> Result<Option<Term>> {
    ensure_args_count(name, args, 1)?;
    let mut v = init;
    for e in ensure_iterable(name, &args[0])? {
        v = op(&v, &ensure_numeric(name, e)?)?;
    }
    Ok(Some(Term::Number(v)))
}

fn product(args: &[Term]) -> Result<Option<Term>> {
    fold("product", args, Number::one(), Number::mul)
}

fn sum(args: &[Term]) -> Result<Option<Term>> {
    fold("sum", args, Number::from(0u64), Number::add)
}

fn sort(args: &[Term]) -> Result<Option<Term>> {
    ensure_args_count("sort", args, 1)?;
    let mut items: Vec<Term> = ensure_iterable("sort", &args[0])?
        .into_iter()
        .cloned()
        .collect();
    items.sort();
    Ok(Some(Term::from(items)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(s: &str) -> Term {
        Term::from_json_str(s).unwrap()
    }

    #[test]
    fn count_counts_characters() {
        assert_eq!(count(&[Term::from("héllo")]).unwrap(), Some(Term::from(5u64)));
        assert_eq!(count(&[json(r#"{"a": 1}"#)]).unwrap(), Some(Term::from(1u64)));
    }

    #[test]
    fn min_and_max() {
        let a = json(r#"[3, "a", 1, null]"#);
        assert_eq!(max(&[a.clone()]).unwrap(), Some(Term::from("a")));
        assert_eq!(min(&[a]).unwrap(), Some(Term::Null));
        assert_eq!(max(&[json("[]")]).unwrap(), None);
    }

    #[test]
    fn sums_and_products() {
        assert_eq!(sum(&[json("[1, 2, 3.5]")]).unwrap(), Some(Term::from(6.5)));
        assert_eq!(product(&[json("[2, 3]")]).unwrap(), Some(Term::from(6u64)));
        assert_eq!(sum(&[json("[]")]).unwrap(), Some(Term::from(0u64)));
        assert!(sum(&[json(r#"[1, "x"]"#)]).is_err());
    }

    #[test]
    fn sort_orders_mixed_kinds() {
        assert_eq!(
            sort(&[json(r#"[3, "b", null, 1]"#)]).unwrap().unwrap().to_string(),
            r#"[null, 1, 3, "b"]"#
        );
    }
}
