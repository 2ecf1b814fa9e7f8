// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::utils::{ensure_args_count, ensure_array, ensure_object};
use crate::builtins::{BuiltinDescriptor, OperandType, RegistryBuilder};
use crate::term::Term;
use crate::Rc;

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Result};

const KEYS: OperandType = OperandType::COLLECTION;

pub fn register(m: &mut RegistryBuilder) {
    m.insert(BuiltinDescriptor::pure(
        "object.filter",
        &[OperandType::Object, KEYS],
        OperandType::Object,
        filter,
    ));
    m.insert(BuiltinDescriptor::pure(
        "object.get",
        &[OperandType::Object, OperandType::Any, OperandType::Any],
        OperandType::Any,
        get,
    ));
    m.insert(BuiltinDescriptor::pure(
        "object.keys",
        &[OperandType::Object],
        OperandType::Set,
        keys,
    ));
    m.insert(BuiltinDescriptor::pure(
        "object.remove",
        &[OperandType::Object, KEYS],
        OperandType::Object,
        remove,
    ));
    m.insert(BuiltinDescriptor::pure(
        "object.subset",
        &[OperandType::Any, OperandType::Any],
        OperandType::Boolean,
        subset,
    ));
    m.insert(BuiltinDescriptor::pure(
        "object.union",
        &[OperandType::Object, OperandType::Object],
        OperandType::Object,
        object_union,
    ));
    m.insert(BuiltinDescriptor::pure(
        "object.union_n",
        &[OperandType::Array],
        OperandType::Object,
        object_union_n,
    ));
}

fn key_set<'a>(name: &str, keys: &'a Term) -> Result<BTreeSet<&'a Term>> {
    Ok(match keys {
        Term::Array(a) => a.iter().collect(),
        Term::Set(s) => s.iter().collect(),
        Term::Object(o) => o.keys().collect(),
        _ => bail!("`{name}` requires array/object/set argument"),
    })
}

fn filter(args: &[Term]) -> Result<Option<Term>> {
    let name = "object.filter";
    ensure_args_count(name, args, 2)?;
    let mut obj = ensure_object(name, &args[0])?;
    let keys = key_set(name, &args[1])?;
    Rc::make_mut(&mut obj).retain(|k, _| keys.contains(k));
    Ok(Some(Term::Object(obj)))
}

/// `object.get(obj, key, default)`. An array key is a path into nested collections.
fn get(args: &[Term]) -> Result<Option<Term>> {
    let name = "object.get";
    ensure_args_count(name, args, 3)?;
    let obj = ensure_object(name, &args[0])?;
    let default = &args[2];

    Ok(Some(match &args[1] {
        Term::Array(path) => {
            let mut v = &args[0];
            for k in path.iter() {
                match v.lookup(k) {
                    Some(next) => v = next,
                    None => return Ok(Some(default.clone())),
                }
            }
            v.clone()
        }
        key => obj.get(key).unwrap_or(default).clone(),
    }))
}

fn keys(args: &[Term]) -> Result<Option<Term>> {
    let name = "object.keys";
    ensure_args_count(name, args, 1)?;
    let obj = ensure_object(name, &args[0])?;
    Ok(Some(Term::from(obj.keys().cloned().collect::<BTreeSet<_>>())))
}

fn remove(args: &[Term]) -> Result<Option<Term>> {
    let name = "object.remove";
    ensure_args_count(name, args, 2)?;
    let mut obj = ensure_object(name, &args[0])?;
    let keys = key_set(name, &args[1])?;
    Rc::make_mut(&mut obj).retain(|k, _| !keys.contains(k));
    Ok(Some(Term::Object(obj)))
}

fn is_subset(sup: &Term, sub: &Term) -> bool {
    match (sup, sub) {
        (Term::Object(sup), Term::Object(sub)) => sub
            .iter()
            .all(|(k, vsub)| sup.get(k).is_some_and(|vsup| is_subset(vsup, vsub))),
        (Term::Set(sup), Term::Set(sub)) => sub.is_subset(sup),
        (Term::Array(sup), Term::Array(sub)) => {
            sub.is_empty() || sup.windows(sub.len()).any(|w| w == &sub[..])
        }
        (Term::Array(sup), Term::Set(sub)) => sub.iter().all(|s| sup.contains(s)),
        (sup, sub) => sup == sub,
    }
}

fn subset(args: &[Term]) -> Result<Option<Term>> {
    ensure_args_count("object.subset", args, 2)?;
    Ok(Some(Term::Bool(is_subset(&args[0], &args[1]))))
}

/// Recursive merge; on conflicting keys the right-hand value wins.
fn union(obj1: &Term, obj2: &Term) -> Term {
    match (obj1, obj2) {
        (Term::Object(m1), Term::Object(m2)) => {
            let mut u: BTreeMap<Term, Term> = (**m1).clone();
            for (key2, value2) in m2.iter() {
                let vm = match m1.get(key2) {
                    Some(value1) => union(value1, value2),
                    None => value2.clone(),
                };
                u.insert(key2.clone(), vm);
            }
            Term::from(u)
        }
        _ => obj2.clone(),
    }
}

fn object_union(args: &[Term]) -> Result<Option<Term>> {
    let name = "object.union";
    ensure_args_count(name, args, 2)?;
    ensure_object(name, &args[0])?;
    ensure_object(name, &args[1])?;
    Ok(Some(union(&args[0], &args[1])))
}

fn object_union_n(args: &[Term]) -> Result<Option<Term>> {
    let name = "object.union_n";
    ensure_args_count(name, args, 1)?;
    let arr = ensure_array(name, &args[0])?;

    let mut u = Term::new_object();
    for (idx, a) in arr.iter().enumerate() {
        if !matches!(a, Term::Object(_)) {
            bail!("`{name}` item at index {idx} is not an object");
        }
        u = union(&u, a);
    }
    Ok(Some(u))
}
