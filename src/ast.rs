// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Compiled rule modules as handed over by the compiler front end.
//!
//! Bodies are expected to be safety-checked and reordered already: every variable is bound by an
//! earlier expression before it is used, and built-in calls match their declared signatures.

pub mod builder;
mod json;

use crate::term::Term;
use crate::Rc;

use core::fmt;

/// Ordered conjunction of expressions.
pub type Body = Rc<Vec<Expr>>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExprKind {
    /// A term or a call, e.g. `x = input.y` is `eq(x, input.y)`.
    Term(Term),

    /// `some x, y` or the generator forms `some x in xs` / `some k, v in xs`, which carry a single
    /// `internal.member_2` / `internal.member_3` call.
    SomeDecl(Vec<Term>),

    Every(Rc<Every>),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Every {
    pub key: Option<Term>,
    pub value: Term,
    pub domain: Term,
    pub body: Body,
}

/// `with <target> as <value>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct With {
    pub target: Term,
    pub value: Term,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Expr {
    pub kind: ExprKind,
    pub negated: bool,
    pub with: Vec<With>,
    pub index: usize,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            negated: false,
            with: vec![],
            index: 0,
        }
    }

    /// Operator name and operands if this is a call expression.
    pub fn as_call(&self) -> Option<(String, &[Term])> {
        match &self.kind {
            ExprKind::Term(Term::Call(c)) => {
                let (op, args) = c.split_first()?;
                Some((ref_name(op)?, args))
            }
            _ => None,
        }
    }
}

/// Dotted name of a static ref such as `count`, `array.concat` or `data.lib.f`.
pub fn ref_name(term: &Term) -> Option<String> {
    let Term::Ref(parts) = term else {
        return None;
    };
    let (head, rest) = parts.split_first()?;
    let Term::Var(head) = head else {
        return None;
    };
    let mut name = head.to_string();
    for p in rest {
        match p {
            Term::String(s) => {
                name.push('.');
                name.push_str(s);
            }
            _ => return None,
        }
    }
    Some(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DocKind {
    Complete,
    PartialSet,
    PartialObject,
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Head {
    /// Rule name followed by static string keys, e.g. `a.b.c := 1` has `[a, "b", "c"]`.
    pub reference: Vec<Term>,
    pub key: Option<Term>,
    pub value: Option<Term>,
    pub args: Vec<Term>,
    pub assign: bool,
}

impl Head {
    pub fn doc_kind(&self) -> DocKind {
        if !self.args.is_empty() {
            DocKind::Function
        } else if self.key.is_some() {
            match self.value {
                Some(_) => DocKind::PartialObject,
                None => DocKind::PartialSet,
            }
        } else {
            DocKind::Complete
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rule {
    pub default: bool,
    pub head: Head,
    pub body: Body,
    pub else_rule: Option<Rc<Rule>>,
}

impl Rule {
    /// Value produced by a successful body; rules without an explicit value produce `true`.
    pub fn value_term(&self) -> Term {
        self.head.value.clone().unwrap_or(Term::Bool(true))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Package {
    /// Path below `data`.
    pub path: Vec<Rc<str>>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Module {
    pub package: Package,
    pub rules: Vec<Rc<Rule>>,
}

impl Module {
    /// Loads a module from the compiler's JSON AST.
    pub fn from_json_str(json: &str) -> crate::Result<Module> {
        json::module_from_json_str(json)
    }
}

/// Parses a query body from the compiler's JSON AST (a list of expressions).
pub fn query_from_json_str(json: &str) -> crate::Result<Body> {
    json::body_from_json_str(json)
}

impl fmt::Display for With {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "with {} as {}", self.target, self.value)
    }
}

fn write_terms(f: &mut fmt::Formatter<'_>, terms: &[Term]) -> fmt::Result {
    let parts: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
    f.write_str(&parts.join(", "))
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("not ")?;
        }
        match &self.kind {
            ExprKind::Term(t) => match self.as_call() {
                Some((op, [a, b])) if op == "eq" => write!(f, "{a} = {b}")?,
                Some((op, [a, b])) if op == "assign" => write!(f, "{a} := {b}")?,
                _ => write!(f, "{t}")?,
            },
            ExprKind::SomeDecl(symbols) => match symbols.as_slice() {
                [Term::Call(c)] => match (
                    c.first().and_then(ref_name).as_deref(),
                    c.get(1..).unwrap_or_default(),
                ) {
                    (Some("internal.member_2"), [x, xs]) => write!(f, "some {x} in {xs}")?,
                    (Some("internal.member_3"), [k, v, xs]) => {
                        write!(f, "some {k}, {v} in {xs}")?
                    }
                    _ => write!(f, "some {}", symbols[0])?,
                },
                _ => {
                    f.write_str("some ")?;
                    write_terms(f, symbols)?;
                }
            },
            ExprKind::Every(e) => {
                f.write_str("every ")?;
                if let Some(k) = &e.key {
                    write!(f, "{k}, ")?;
                }
                write!(f, "{} in {} {{ ", e.value, e.domain)?;
                let body: Vec<String> = e.body.iter().map(|x| x.to_string()).collect();
                write!(f, "{} }}", body.join("; "))?;
            }
        }
        for w in &self.with {
            write!(f, " {w}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.default {
            f.write_str("default ")?;
        }
        let name = Term::Ref(Rc::new(self.head.reference.clone()));
        write!(f, "{name}")?;
        if !self.head.args.is_empty() {
            f.write_str("(")?;
            write_terms(f, &self.head.args)?;
            f.write_str(")")?;
        }
        if let Some(k) = &self.head.key {
            write!(f, "[{k}]")?;
        }
        if let Some(v) = &self.head.value {
            write!(f, " = {v}")?;
        }
        let body: Vec<String> = self.body.iter().map(|x| x.to_string()).collect();
        write!(f, " {{ {} }}", body.join("; "))
    }
}
