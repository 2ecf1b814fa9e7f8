// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::utils::{ensure_args_count, ensure_string};
use crate::builtins::{BuiltinDescriptor, OperandType, RegistryBuilder};
use crate::term::Term;

use anyhow::{Context, Result};

pub fn register(m: &mut RegistryBuilder) {
    m.insert(BuiltinDescriptor::pure(
        "json.is_valid",
        &[OperandType::String],
        OperandType::Boolean,
        json_is_valid,
    ));
    m.insert(BuiltinDescriptor::pure(
        "json.marshal",
        &[OperandType::Any],
        OperandType::String,
        json_marshal,
    ));
    m.insert(BuiltinDescriptor::pure(
        "json.unmarshal",
        &[OperandType::String],
        OperandType::Any,
        json_unmarshal,
    ));
}

fn json_is_valid(args: &[Term]) -> Result<Option<Term>> {
    let name = "json.is_valid";
    ensure_args_count(name, args, 1)?;
    let json_str = ensure_string(name, &args[0])?;
    Ok(Some(Term::Bool(
        serde_json::from_str::<serde_json::Value>(&json_str).is_ok(),
    )))
}

fn json_marshal(args: &[Term]) -> Result<Option<Term>> {
    let name = "json.marshal";
    ensure_args_count(name, args, 1)?;
    let s = serde_json::to_string(&args[0]).with_context(|| format!("{name} failed"))?;
    Ok(Some(Term::from(s)))
}

fn json_unmarshal(args: &[Term]) -> Result<Option<Term>> {
    let name = "json.unmarshal";
    ensure_args_count(name, args, 1)?;
    let json_str = ensure_string(name, &args[0])?;
    Ok(Some(
        Term::from_json_str(&json_str).with_context(|| format!("{name}: invalid json"))?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marshal_round_trips_sets_as_arrays() {
        let set = Term::from(std::collections::BTreeSet::from([Term::from(2u64), Term::from(1u64)]));
        assert_eq!(json_marshal(&[set]).unwrap(), Some(Term::from("[1,2]")));
        assert_eq!(
            json_unmarshal(&[Term::from(r#"{"a": [true]}"#)]).unwrap(),
            Some(Term::from_json_str(r#"{"a": [true]}"#).unwrap())
        );
        assert!(json_unmarshal(&[Term::from("{")]).is_err());
        assert_eq!(json_is_valid(&[Term::from("{")]).unwrap(), Some(Term::Bool(false)));
    }
}
