// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::bindings::{is_wildcard, Bindings};
use crate::term::Term;

use std::collections::BTreeMap;

/// Extends `b` so that `x` and `y` become equal. On failure every binding made by this call is
/// rolled back and `false` is returned; failure only means "no solution on this path".
pub(crate) fn unify(b: &mut Bindings, x: &Term, y: &Term) -> bool {
    let mark = b.mark();
    if unify_terms(b, x, y) {
        true
    } else {
        b.undo(mark);
        false
    }
}

fn unify_terms(b: &mut Bindings, x: &Term, y: &Term) -> bool {
    let x = b.deref(x);
    let y = b.deref(y);
    match (&x, &y) {
        (Term::Var(l), Term::Var(r)) if l == r => true,
        (Term::Var(v), _) | (_, Term::Var(v)) if is_wildcard(v) => true,
        (Term::Var(l), _) => b.bind(l, y.clone()),
        (_, Term::Var(r)) => b.bind(r, x.clone()),

        (Term::Array(l), Term::Array(r)) => {
            l.len() == r.len() && l.iter().zip(r.iter()).all(|(l, r)| unify_terms(b, l, r))
        }

        (Term::Object(l), Term::Object(r)) => {
            let l: BTreeMap<Term, &Term> = l.iter().map(|(k, v)| (b.plug(k), v)).collect();
            let r: BTreeMap<Term, &Term> = r.iter().map(|(k, v)| (b.plug(k), v)).collect();
            if l.len() != r.len() || !l.keys().eq(r.keys()) {
                return false;
            }
            l.iter()
                .zip(r.iter())
                .all(|((_, lv), (_, rv))| unify_terms(b, lv, rv))
        }

        // Set members are compared, never unified.
        (Term::Set(_), Term::Set(_)) => b.plug(&x) == b.plug(&y),

        _ => x == y,
    }
}
