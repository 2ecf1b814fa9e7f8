// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Helpers for assembling compiled modules directly in Rust.

use super::*;
use crate::number::Number;
use crate::term::{Comprehension, Term};
use crate::Rc;

use std::collections::{BTreeMap, BTreeSet};

pub fn var(name: &str) -> Term {
    Term::var(name)
}

pub fn string(s: &str) -> Term {
    Term::from(s)
}

pub fn num(n: impl Into<Number>) -> Term {
    Term::Number(n.into())
}

pub fn boolean(b: bool) -> Term {
    Term::Bool(b)
}

pub fn null() -> Term {
    Term::Null
}

pub fn array(items: Vec<Term>) -> Term {
    Term::from(items)
}

pub fn set(items: Vec<Term>) -> Term {
    Term::from(items.into_iter().collect::<BTreeSet<_>>())
}

pub fn object(items: Vec<(Term, Term)>) -> Term {
    Term::from(items.into_iter().collect::<BTreeMap<_, _>>())
}

/// Static ref from a dotted path, e.g. `input.user.name`.
pub fn reference(path: &str) -> Term {
    let mut parts = path.split('.');
    let mut terms = vec![Term::var(parts.next().unwrap_or_default())];
    terms.extend(parts.map(Term::from));
    Term::Ref(Rc::new(terms))
}

/// Ref with arbitrary operands after the dotted prefix, e.g. `input.xs[i]`.
pub fn ref_with(prefix: &str, operands: Vec<Term>) -> Term {
    let mut terms = match reference(prefix) {
        Term::Ref(r) => (*r).clone(),
        _ => vec![],
    };
    terms.extend(operands);
    Term::Ref(Rc::new(terms))
}

pub fn call(op: &str, args: Vec<Term>) -> Term {
    let mut terms = vec![reference(op)];
    terms.extend(args);
    Term::Call(Rc::new(terms))
}

pub fn expr(t: Term) -> Expr {
    Expr::new(ExprKind::Term(t))
}

pub fn call_expr(op: &str, args: Vec<Term>) -> Expr {
    expr(call(op, args))
}

/// `a = b`
pub fn eq(a: Term, b: Term) -> Expr {
    call_expr("eq", vec![a, b])
}

/// `a := b`
pub fn assign(a: Term, b: Term) -> Expr {
    call_expr("assign", vec![a, b])
}

pub fn not(mut e: Expr) -> Expr {
    e.negated = true;
    e
}

pub fn with(mut e: Expr, target: &str, value: Term) -> Expr {
    e.with.push(With {
        target: reference(target),
        value,
    });
    e
}

pub fn some(vars: Vec<Term>) -> Expr {
    Expr::new(ExprKind::SomeDecl(vars))
}

/// `some x in domain` or `some k, x in domain`.
pub fn some_in(key: Option<Term>, value: Term, domain: Term) -> Expr {
    let c = match key {
        Some(k) => call("internal.member_3", vec![k, value, domain]),
        None => call("internal.member_2", vec![value, domain]),
    };
    Expr::new(ExprKind::SomeDecl(vec![c]))
}

pub fn every(key: Option<Term>, value: Term, domain: Term, exprs: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::Every(Rc::new(Every {
        key,
        value,
        domain,
        body: body(exprs),
    })))
}

pub fn array_compr(term: Term, exprs: Vec<Expr>) -> Term {
    Term::ArrayCompr(Rc::new(Comprehension {
        key: None,
        term,
        body: body(exprs),
    }))
}

pub fn set_compr(term: Term, exprs: Vec<Expr>) -> Term {
    Term::SetCompr(Rc::new(Comprehension {
        key: None,
        term,
        body: body(exprs),
    }))
}

pub fn object_compr(key: Term, value: Term, exprs: Vec<Expr>) -> Term {
    Term::ObjectCompr(Rc::new(Comprehension {
        key: Some(key),
        term: value,
        body: body(exprs),
    }))
}

/// Numbers the expressions in order.
pub fn body(exprs: Vec<Expr>) -> Body {
    Rc::new(
        exprs
            .into_iter()
            .enumerate()
            .map(|(index, e)| Expr { index, ..e })
            .collect(),
    )
}

#[derive(Debug, Clone)]
pub struct RuleBuilder {
    rule: Rule,
}

/// Starts a rule whose head ref is the dotted `name` (e.g. `allow` or `a.b.c`).
pub fn rule(name: &str) -> RuleBuilder {
    let reference = match reference(name) {
        Term::Ref(r) => (*r).clone(),
        _ => vec![],
    };
    RuleBuilder {
        rule: Rule {
            default: false,
            head: Head {
                reference,
                key: None,
                value: None,
                args: vec![],
                assign: false,
            },
            body: Rc::new(vec![]),
            else_rule: None,
        },
    }
}

impl RuleBuilder {
    pub fn key(mut self, key: Term) -> Self {
        self.rule.head.key = Some(key);
        self
    }

    pub fn value(mut self, value: Term) -> Self {
        self.rule.head.value = Some(value);
        self.rule.head.assign = true;
        self
    }

    pub fn args(mut self, args: Vec<Term>) -> Self {
        self.rule.head.args = args;
        self
    }

    pub fn default(mut self) -> Self {
        self.rule.default = true;
        self
    }

    pub fn body(mut self, exprs: Vec<Expr>) -> Self {
        self.rule.body = body(exprs);
        self
    }

    /// Appends `else = value { body }` at the end of the chain.
    pub fn or_else(mut self, value: Option<Term>, exprs: Vec<Expr>) -> Self {
        let mut clause = Rule {
            default: false,
            head: Head {
                value,
                ..self.rule.head.clone()
            },
            body: body(exprs),
            else_rule: None,
        };
        clause.head.key = None;

        fn append(rule: &mut Rule, clause: Rule) {
            match &mut rule.else_rule {
                Some(next) => append(Rc::make_mut(next), clause),
                None => rule.else_rule = Some(Rc::new(clause)),
            }
        }
        append(&mut self.rule, clause);
        self
    }

    pub fn build(self) -> Rule {
        self.rule
    }
}

/// Module for `package <path>` (dotted, without the leading `data`).
pub fn module(package: &str, rules: Vec<Rule>) -> Module {
    Module {
        package: Package {
            path: package
                .split('.')
                .filter(|s| !s.is_empty())
                .map(Rc::from)
                .collect(),
        },
        rules: rules.into_iter().map(Rc::new).collect(),
    }
}
