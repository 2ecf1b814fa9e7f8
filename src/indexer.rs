// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Rule indexing.
//!
//! For every rule the indexer collects equality and membership constraints on ground `input` and
//! `data` refs that must hold for the body to succeed. At evaluation time the refs are resolved
//! once and only rules whose constraints are all satisfied are evaluated. Rules without such
//! constraints are always candidates, so the index may over-include but never excludes a rule
//! that could succeed.

use crate::ast::{Expr, ExprKind, Rule};
use crate::error::Result;
use crate::term::Term;
use crate::Rc;

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Resolves ground refs for the index. Implemented by the interpreter, which knows about `with`
/// overrides and the store.
pub(crate) trait ValueResolver {
    fn resolve(&mut self, reference: &Term) -> Result<Option<Term>>;
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Constraint {
    /// `ref == value`
    Eq(Term, Term),

    /// `value in ref`
    Member(Term, Term),
}

#[derive(Debug, Default)]
pub struct RuleIndex {
    eq: BTreeMap<Term, HashMap<Term, Vec<usize>>>,
    member: BTreeMap<Term, HashMap<Term, Vec<usize>>>,

    /// Number of distinct constraints per rule.
    counts: Vec<usize>,
}

fn is_index_value(t: &Term) -> bool {
    match t {
        Term::Array(items) => items.iter().all(Term::is_scalar),
        t => t.is_scalar(),
    }
}

/// A ground ref rooted at `input`, or at a `data` path that involves no rules.
fn is_index_ref(t: &Term, overlaps_rules: &dyn Fn(&[Rc<str>]) -> bool) -> bool {
    let Term::Ref(parts) = t else {
        return false;
    };
    let Some((Term::Var(root), operands)) = parts.split_first() else {
        return false;
    };
    if !operands.iter().all(Term::is_scalar) {
        return false;
    }
    match root.as_ref() {
        "input" => true,
        "data" => {
            let path: Vec<Rc<str>> = operands
                .iter()
                .map_while(|o| match o {
                    Term::String(s) => Some(s.clone()),
                    _ => None,
                })
                .collect();
            !overlaps_rules(&path)
        }
        _ => false,
    }
}

fn constraint_of(expr: &Expr, overlaps_rules: &dyn Fn(&[Rc<str>]) -> bool) -> Option<Constraint> {
    if expr.negated || !expr.with.is_empty() || !matches!(expr.kind, ExprKind::Term(_)) {
        return None;
    }
    let (op, args) = expr.as_call()?;
    match (op.as_str(), args) {
        ("eq" | "equal", [a, b]) => {
            if is_index_ref(a, overlaps_rules) && is_index_value(b) {
                Some(Constraint::Eq(a.clone(), b.clone()))
            } else if is_index_ref(b, overlaps_rules) && is_index_value(a) {
                Some(Constraint::Eq(b.clone(), a.clone()))
            } else {
                None
            }
        }
        ("internal.member_2", [x, xs]) if x.is_scalar() && is_index_ref(xs, overlaps_rules) => {
            Some(Constraint::Member(xs.clone(), x.clone()))
        }
        _ => None,
    }
}

impl RuleIndex {
    pub(crate) fn build(rules: &[Rc<Rule>], overlaps_rules: impl Fn(&[Rc<str>]) -> bool) -> Self {
        let mut index = RuleIndex::default();
        for (idx, rule) in rules.iter().enumerate() {
            // The value of an else chain depends on which clause fails.
            if rule.else_rule.is_some() {
                index.counts.push(0);
                continue;
            }

            let constraints: BTreeSet<Constraint> = rule
                .body
                .iter()
                .filter_map(|e| constraint_of(e, &overlaps_rules))
                .collect();
            index.counts.push(constraints.len());

            for c in constraints {
                let (table, reference, value) = match c {
                    Constraint::Eq(r, v) => (&mut index.eq, r, v),
                    Constraint::Member(r, v) => (&mut index.member, r, v),
                };
                table
                    .entry(reference)
                    .or_default()
                    .entry(value)
                    .or_default()
                    .push(idx);
            }
        }
        index
    }

    /// Number of rules with at least one constraint.
    pub fn indexed_rules(&self) -> usize {
        self.counts.iter().filter(|c| **c > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.eq.is_empty() && self.member.is_empty()
    }

    /// Indices of the rules that may succeed, in declaration order.
    pub(crate) fn candidates(&self, resolver: &mut dyn ValueResolver) -> Result<Vec<usize>> {
        let mut satisfied = vec![0usize; self.counts.len()];

        for (reference, table) in &self.eq {
            if let Some(value) = resolver.resolve(reference)? {
                for idx in table.get(&value).into_iter().flatten() {
                    satisfied[*idx] += 1;
                }
            }
        }

        for (reference, table) in &self.member {
            let Some(collection) = resolver.resolve(reference)? else {
                continue;
            };
            let members: BTreeSet<&Term> = match &collection {
                Term::Array(a) => a.iter().collect(),
                Term::Set(s) => s.iter().collect(),
                Term::Object(o) => o.values().collect(),
                _ => continue,
            };
            for m in members {
                for idx in table.get(m).into_iter().flatten() {
                    satisfied[*idx] += 1;
                }
            }
        }

        Ok(satisfied
            .iter()
            .zip(&self.counts)
            .enumerate()
            .filter(|(_, (s, c))| s == c)
            .map(|(idx, _)| idx)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::*;

    struct Input(Term);

    impl ValueResolver for Input {
        fn resolve(&mut self, reference: &Term) -> Result<Option<Term>> {
            let Term::Ref(parts) = reference else {
                return Ok(None);
            };
            let mut v = match parts.first() {
                Some(Term::Var(root)) if root.as_ref() == "input" => self.0.clone(),
                _ => return Ok(None),
            };
            for p in &parts[1..] {
                match v.lookup(p) {
                    Some(next) => v = next.clone(),
                    None => return Ok(None),
                }
            }
            Ok(Some(v))
        }
    }

    fn rules() -> Vec<Rc<Rule>> {
        vec![
            // 0: input.user == "admin"
            rule("allow")
                .body(vec![call_expr("equal", vec![reference("input.user"), string("admin")])])
                .build(),
            // 1: "superuser" == input.role; input.user = "bob"
            rule("allow")
                .body(vec![
                    call_expr("equal", vec![string("superuser"), reference("input.role")]),
                    eq(reference("input.user"), string("bob")),
                ])
                .build(),
            // 2: "x" in input.tags
            rule("allow")
                .body(vec![call_expr(
                    "internal.member_2",
                    vec![string("x"), reference("input.tags")],
                )])
                .build(),
            // 3: not indexable
            rule("allow")
                .body(vec![not(eq(reference("input.user"), string("eve")))])
                .build(),
            // 4: refs into rules are skipped
            rule("allow")
                .body(vec![eq(reference("data.p.q"), num(1u64))])
                .build(),
        ]
        .into_iter()
        .map(Rc::new)
        .collect()
    }

    fn candidates(input: &str) -> Vec<usize> {
        let index = RuleIndex::build(&rules(), |p| p.first().is_some_and(|s| s.as_ref() == "p"));
        index
            .candidates(&mut Input(Term::from_json_str(input).unwrap()))
            .unwrap()
    }

    #[test]
    fn narrows_by_equality_and_membership() {
        assert_eq!(candidates(r#"{"user": "admin"}"#), vec![0, 3, 4]);
        assert_eq!(
            candidates(r#"{"user": "bob", "role": "superuser"}"#),
            vec![1, 3, 4]
        );
        assert_eq!(candidates(r#"{"user": "bob"}"#), vec![3, 4]);
        assert_eq!(candidates(r#"{"tags": ["y", "x", "x"]}"#), vec![2, 3, 4]);
        assert_eq!(candidates(r#"{"tags": {"a": "x"}}"#), vec![2, 3, 4]);
        assert_eq!(candidates("{}"), vec![3, 4]);
    }

    #[test]
    fn counts_indexed_rules() {
        let index = RuleIndex::build(&rules(), |_| false);
        assert_eq!(index.indexed_rules(), 4);
        assert!(!index.is_empty());
    }

    #[test]
    fn numbers_match_across_representations() {
        let r = vec![Rc::new(
            rule("p")
                .body(vec![eq(reference("input.n"), num(1u64))])
                .build(),
        )];
        let index = RuleIndex::build(&r, |_| false);
        let found = index
            .candidates(&mut Input(Term::from_json_str(r#"{"n": 1.0}"#).unwrap()))
            .unwrap();
        assert_eq!(found, vec![0]);
    }
}
