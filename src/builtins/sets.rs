// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::utils::{ensure_args_count, ensure_set};
use crate::builtins::{BuiltinDescriptor, OperandType, RegistryBuilder};
use crate::term::Term;

use std::collections::BTreeSet;

use anyhow::{bail, Result};

const SET2: &[OperandType] = &[OperandType::Set, OperandType::Set];

pub fn register(m: &mut RegistryBuilder) {
    m.insert(BuiltinDescriptor::pure("and", SET2, OperandType::Set, and));
    m.insert(BuiltinDescriptor::pure("or", SET2, OperandType::Set, or));
    m.insert(BuiltinDescriptor::pure(
        "intersection",
        &[OperandType::Set],
        OperandType::Set,
        intersection_of_set_of_sets,
    ));
    m.insert(BuiltinDescriptor::pure(
        "union",
        &[OperandType::Set],
        OperandType::Set,
        union_of_set_of_sets,
    ));
}

fn and(args: &[Term]) -> Result<Option<Term>> {
    ensure_args_count("and", args, 2)?;
    let s1 = ensure_set("and", &args[0])?;
    let s2 = ensure_set("and", &args[1])?;
    Ok(Some(Term::from(
        s1.intersection(&s2).cloned().collect::<BTreeSet<_>>(),
    )))
}

fn or(args: &[Term]) -> Result<Option<Term>> {
    ensure_args_count("or", args, 2)?;
    let s1 = ensure_set("or", &args[0])?;
    let s2 = ensure_set("or", &args[1])?;
    Ok(Some(Term::from(s1.union(&s2).cloned().collect::<BTreeSet<_>>())))
}

fn intersection_of_set_of_sets(args: &[Term]) -> Result<Option<Term>> {
    let name = "intersection";
    ensure_args_count(name, args, 1)?;
    let set = ensure_set(name, &args[0])?;

    let mut res: Option<BTreeSet<Term>> = None;
    for s in set.iter() {
        let s = match s {
            Term::Set(s) => s,
            _ => bail!("`{name}` expects set of sets. Got `{}`", args[0]),
        };
        res = Some(match res {
            None => (**s).clone(),
            Some(r) => r.intersection(s).cloned().collect(),
        });
    }

    Ok(Some(Term::from(res.unwrap_or_default())))
}

fn union_of_set_of_sets(args: &[Term]) -> Result<Option<Term>> {
    let name = "union";
    ensure_args_count(name, args, 1)?;
    let set = ensure_set(name, &args[0])?;

    let mut res = BTreeSet::new();
    for s in set.iter() {
        match s {
            Term::Set(s) => res.extend(s.iter().cloned()),
            _ => bail!("`{name}` expects set of sets. Got `{}`", args[0]),
        }
    }

    Ok(Some(Term::from(res)))
}
