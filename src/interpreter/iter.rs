// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::term::Term;

use core::mem;
use core::ops::Bound::{self, Excluded, Unbounded};

#[derive(Debug, Clone)]
pub(crate) enum Position {
    Index(usize),
    Key(Term),
}

/// Resumable enumeration of a collection as `(key, value)` pairs.
///
/// Arrays yield `(index, item)` in index order, objects `(key, value)` and sets
/// `(member, member)` in term order. Scalars have no entries. The iterator owns its domain, so
/// callers may freely bind and evaluate between steps.
#[derive(Debug, Clone)]
pub(crate) enum DomainIter {
    NotStarted(Term),
    Enumerating { domain: Term, pos: Position },
    Exhausted,
}

impl DomainIter {
    pub(crate) fn new(domain: Term) -> Self {
        DomainIter::NotStarted(domain)
    }
}

fn entry_after(domain: &Term, pos: Option<&Position>) -> Option<(Position, Term, Term)> {
    match domain {
        Term::Array(items) => {
            let idx = match pos {
                None => 0,
                Some(Position::Index(i)) => i + 1,
                Some(Position::Key(_)) => return None,
            };
            items
                .get(idx)
                .map(|v| (Position::Index(idx), Term::from(idx), v.clone()))
        }
        Term::Object(fields) => {
            let lower: Bound<&Term> = match pos {
                None => Unbounded,
                Some(Position::Key(k)) => Excluded(k),
                Some(Position::Index(_)) => return None,
            };
            fields
                .range::<Term, _>((lower, Unbounded))
                .next()
                .map(|(k, v)| (Position::Key(k.clone()), k.clone(), v.clone()))
        }
        Term::Set(members) => {
            let lower: Bound<&Term> = match pos {
                None => Unbounded,
                Some(Position::Key(k)) => Excluded(k),
                Some(Position::Index(_)) => return None,
            };
            members
                .range::<Term, _>((lower, Unbounded))
                .next()
                .map(|m| (Position::Key(m.clone()), m.clone(), m.clone()))
        }
        _ => None,
    }
}

impl Iterator for DomainIter {
    type Item = (Term, Term);

    fn next(&mut self) -> Option<Self::Item> {
        let (domain, entry) = match mem::replace(self, DomainIter::Exhausted) {
            DomainIter::NotStarted(domain) => {
                let entry = entry_after(&domain, None);
                (domain, entry)
            }
            DomainIter::Enumerating { domain, pos } => {
                let entry = entry_after(&domain, Some(&pos));
                (domain, entry)
            }
            DomainIter::Exhausted => return None,
        };

        let (pos, key, value) = entry?;
        *self = DomainIter::Enumerating { domain, pos };
        Some((key, value))
    }
}
