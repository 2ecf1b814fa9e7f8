// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Membership tests behind `x in xs` and `k, v in xs`. With unbound operands the evaluator turns
//! the same calls into generators; these implementations only see ground operands.

use crate::builtins::utils::ensure_args_count;
use crate::builtins::{BuiltinDescriptor, OperandType, RegistryBuilder};
use crate::term::Term;

use anyhow::Result;

pub fn register(m: &mut RegistryBuilder) {
    m.insert(BuiltinDescriptor::pure(
        "internal.member_2",
        &[OperandType::Any, OperandType::Any],
        OperandType::Boolean,
        member_2,
    ));
    m.insert(BuiltinDescriptor::pure(
        "internal.member_3",
        &[OperandType::Any, OperandType::Any, OperandType::Any],
        OperandType::Boolean,
        member_3,
    ));
}

fn member_2(args: &[Term]) -> Result<Option<Term>> {
    ensure_args_count("internal.member_2", args, 2)?;
    let (x, xs) = (&args[0], &args[1]);
    Ok(Some(Term::Bool(match xs {
        Term::Array(a) => a.contains(x),
        Term::Set(s) => s.contains(x),
        Term::Object(o) => o.values().any(|v| v == x),
        _ => false,
    })))
}

fn member_3(args: &[Term]) -> Result<Option<Term>> {
    ensure_args_count("internal.member_3", args, 3)?;
    let (k, v, xs) = (&args[0], &args[1], &args[2]);
    Ok(Some(Term::Bool(match xs {
        Term::Array(_) | Term::Object(_) => xs.lookup(k) == Some(v),
        _ => false,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_over_collections() {
        let arr = Term::from_json_str(r#"["a", "b"]"#).unwrap();
        let obj = Term::from_json_str(r#"{"k": "b"}"#).unwrap();
        let t = Some(Term::Bool(true));
        let f = Some(Term::Bool(false));

        assert_eq!(member_2(&[Term::from("b"), arr.clone()]).unwrap(), t);
        assert_eq!(member_2(&[Term::from("b"), obj.clone()]).unwrap(), t);
        assert_eq!(member_2(&[Term::from("k"), obj.clone()]).unwrap(), f);
        assert_eq!(member_3(&[Term::from(1u64), Term::from("b"), arr]).unwrap(), t);
        assert_eq!(member_3(&[Term::from("k"), Term::from("b"), obj]).unwrap(), t);
        assert_eq!(member_2(&[Term::from(1u64), Term::from("s")]).unwrap(), f);
    }
}
