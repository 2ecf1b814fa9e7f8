// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::number::Number;
use crate::term::Term;
use crate::Rc;

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Result};

pub fn ensure_args_count(fcn: &str, args: &[Term], expected: usize) -> Result<()> {
    if args.len() != expected {
        if expected == 1 {
            bail!("`{fcn}` expects 1 argument")
        } else {
            bail!("`{fcn}` expects {expected} arguments")
        }
    }
    Ok(())
}

pub fn ensure_numeric(fcn: &str, v: &Term) -> Result<Number> {
    Ok(match v {
        Term::Number(n) => n.clone(),
        _ => bail!("`{fcn}` expects numeric argument. Got `{v}` instead"),
    })
}

pub fn ensure_integer(fcn: &str, v: &Term) -> Result<i64> {
    match v {
        Term::Number(n) if n.is_integer() => match n.as_i64() {
            Some(i) => Ok(i),
            None => bail!("`{fcn}` integer argument `{v}` is out of range"),
        },
        _ => bail!("`{fcn}` expects integer argument. Got `{v}` instead"),
    }
}

pub fn ensure_string(fcn: &str, v: &Term) -> Result<Rc<str>> {
    Ok(match v {
        Term::String(s) => s.clone(),
        _ => bail!("`{fcn}` expects string argument. Got `{v}` instead"),
    })
}

pub fn ensure_string_collection<'a>(fcn: &str, v: &'a Term) -> Result<Vec<&'a str>> {
    let items: Box<dyn Iterator<Item = &'a Term> + 'a> = match v {
        Term::Array(a) => Box::new(a.iter()),
        Term::Set(s) => Box::new(s.iter()),
        _ => bail!("`{fcn}` expects array/set of strings."),
    };
    items
        .enumerate()
        .map(|(idx, elem)| match elem {
            Term::String(s) => Ok(s.as_ref()),
            _ => bail!("`{fcn}` expects string collection. Element {idx} is not a string."),
        })
        .collect()
}

pub fn ensure_array(fcn: &str, v: &Term) -> Result<Rc<Vec<Term>>> {
    Ok(match v {
        Term::Array(a) => a.clone(),
        _ => bail!("`{fcn}` expects array argument. Got `{v}` instead"),
    })
}

pub fn ensure_set(fcn: &str, v: &Term) -> Result<Rc<BTreeSet<Term>>> {
    Ok(match v {
        Term::Set(s) => s.clone(),
        _ => bail!("`{fcn}` expects set argument. Got `{v}` instead"),
    })
}

pub fn ensure_object(fcn: &str, v: &Term) -> Result<Rc<BTreeMap<Term, Term>>> {
    Ok(match v {
        Term::Object(o) => o.clone(),
        _ => bail!("`{fcn}` expects object argument. Got `{v}` instead"),
    })
}

/// Members of an array or set in iteration order.
pub fn ensure_iterable<'a>(fcn: &str, v: &'a Term) -> Result<Vec<&'a Term>> {
    Ok(match v {
        Term::Array(a) => a.iter().collect(),
        Term::Set(s) => s.iter().collect(),
        _ => bail!("`{fcn}` requires array/set argument. Got `{v}`."),
    })
}
