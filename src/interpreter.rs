// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

mod bindings;
mod iter;
mod unify;

use crate::ast::{ref_name, Body, DocKind, Every, Expr, ExprKind, Rule, With};
use crate::builtins::debugging::UNDEFINED_OPERAND;
use crate::builtins::{BuiltinContext, BuiltinDescriptor, BuiltinRegistry};
use crate::compiled_policy::{CompiledPolicy, RuleSet};
use crate::engine::EvalOptions;
use crate::error::{EvalError, Result};
use crate::indexer::ValueResolver;
use crate::store::{PathSegment, Store, Transaction};
use crate::term::Term;
use crate::trace::{PrintSink, StderrPrinter, TraceEvent};
use crate::utils::cancel::CancelCheck;
use crate::utils::get_path_string;
use crate::utils::path::{parse_data_path, ReferenceChain};
use crate::Rc;

use bindings::Bindings;
use iter::DomainIter;
use unify::unify;

use core::mem;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, trace, warn};
use serde::Serialize;

/// Tells a search whether to look for further solutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// One solution of a query: the values of its variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub bindings: BTreeMap<Rc<str>, Term>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResults {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub result: Vec<QueryResult>,
}

/// Replacement installed for a function by `with`.
#[derive(Debug, Clone)]
enum FunctionMock {
    /// Another function or built-in, by name.
    Alias(String),
    Value(Term),
}

/// Overrides active for the expression being evaluated.
#[derive(Debug, Clone, Default)]
struct WithState {
    input: Option<Term>,

    /// `data` overrides in the order they were installed; later ones take precedence.
    data: Vec<(Vec<Rc<str>>, Term)>,
    functions: HashMap<String, FunctionMock>,

    /// Distinguishes memoized documents computed under different overrides. Zero when no
    /// override is active.
    id: u64,
}

enum Callee<'a> {
    Builtin(&'a BuiltinDescriptor),
    User(&'a RuleSet),
    Constant(Term),
}

type Cont<'k, 'a> = dyn FnMut(&mut Interpreter<'a>) -> Result<Flow> + 'k;
type ValueCont<'k, 'a> = dyn FnMut(&mut Interpreter<'a>, Term) -> Result<Flow> + 'k;
type OperandsCont<'k, 'a> = dyn FnMut(&mut Interpreter<'a>, &[Term]) -> Result<Flow> + 'k;

/// Evaluation state of a single query.
///
/// Bodies are searched depth first. Each step receives a continuation that is called once per
/// solution of the step; bindings made for a solution are undone after the continuation
/// returns, so alternatives are explored with the environment they started from.
pub(crate) struct Interpreter<'a> {
    policy: &'a CompiledPolicy,
    store: &'a dyn Store,
    txn: &'a Transaction,
    builtins: &'a BuiltinRegistry,
    options: &'a EvalOptions,

    bindings: Bindings,
    with_state: WithState,
    next_with_id: u64,

    // Virtual documents evaluated so far, per override scope. A scope's entries are dropped
    // when the scope closes.
    cache: HashMap<u64, HashMap<Vec<Rc<str>>, Option<Term>>>,
    in_progress: Vec<String>,
    nondeterministic_cache: HashMap<(&'static str, Vec<Term>), Option<Term>>,

    cancel: CancelCheck,
    depth: usize,
    time_ns: i128,
    printer: Rc<dyn PrintSink>,
}

fn data_segments(path: &[Rc<str>]) -> Vec<PathSegment> {
    path.iter().map(|p| PathSegment::Key(p.clone())).collect()
}

fn path_segment(key: &Term) -> Option<PathSegment> {
    match key {
        Term::String(s) => Some(PathSegment::Key(s.clone())),
        Term::Number(n) if n.is_integer() => n.as_usize().map(PathSegment::Index),
        _ => None,
    }
}

fn lookup_keys(value: &Term, path: &[Rc<str>]) -> Option<Term> {
    path.iter()
        .try_fold(value, |v, key| v.lookup(&Term::String(key.clone())))
        .cloned()
}

fn is_query_var(name: &str) -> bool {
    !matches!(name, "input" | "data" | "_") && !name.starts_with('$') && !name.starts_with("__")
}

/// Variables of a query whose values are reported with each solution.
fn query_vars(body: &[Expr]) -> BTreeSet<Rc<str>> {
    let mut vars = BTreeSet::new();
    for expr in body {
        match &expr.kind {
            ExprKind::Term(Term::Call(parts)) => parts
                .iter()
                .skip(1)
                .for_each(|t| t.collect_vars(&mut vars)),
            ExprKind::Term(t) => t.collect_vars(&mut vars),
            ExprKind::SomeDecl(symbols) => {
                for s in symbols {
                    match s {
                        Term::Call(parts) => parts
                            .iter()
                            .skip(1)
                            .for_each(|t| t.collect_vars(&mut vars)),
                        _ => s.collect_vars(&mut vars),
                    }
                }
            }
            ExprKind::Every(every) => every.domain.collect_vars(&mut vars),
        }
    }
    vars.retain(|v| is_query_var(v));
    vars
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(
        policy: &'a CompiledPolicy,
        store: &'a dyn Store,
        txn: &'a Transaction,
        builtins: &'a BuiltinRegistry,
        options: &'a EvalOptions,
        input: Option<Term>,
    ) -> Self {
        let timer_config = options
            .execution_timer
            .or_else(crate::utils::limits::fallback_execution_timer_config);
        Self {
            policy,
            store,
            txn,
            builtins,
            options,
            bindings: Bindings::default(),
            with_state: WithState {
                input,
                ..WithState::default()
            },
            next_with_id: 0,
            cache: HashMap::new(),
            in_progress: vec![],
            nondeterministic_cache: HashMap::new(),
            cancel: CancelCheck::new(options.cancellation.clone(), timer_config),
            depth: 0,
            time_ns: crate::builtins::time::wall_clock_ns(),
            printer: options
                .printer
                .clone()
                .unwrap_or_else(|| Rc::new(StderrPrinter) as Rc<dyn PrintSink>),
        }
    }

    fn trace_event(&self, event: impl FnOnce() -> TraceEvent) {
        if let Some(tracer) = &self.options.tracer {
            tracer.event(event());
        }
    }

    /// Runs `body` and hands each solution to `on_result` until it asks to stop.
    pub(crate) fn eval_query(
        &mut self,
        body: &Body,
        on_result: &mut dyn FnMut(QueryResult) -> Flow,
    ) -> Result<()> {
        let vars = query_vars(body);
        let depth = self.depth;
        self.trace_event(|| TraceEvent::Enter {
            depth,
            node: "query".to_string(),
        });

        self.eval_exprs(body, &mut |this| {
            let mut bindings = BTreeMap::new();
            for v in &vars {
                let value = this.bindings.plug(&Term::Var(v.clone()));
                if value.is_ground() {
                    bindings.insert(v.clone(), value);
                }
            }
            this.trace_event(|| TraceEvent::Exit {
                depth,
                node: "query".to_string(),
            });
            Ok(on_result(QueryResult { bindings }))
        })?;
        Ok(())
    }

    /// Value of the document at `path` below `data`.
    pub(crate) fn eval_rule(&mut self, path: &[Rc<str>]) -> Result<Option<Term>> {
        self.data_value_at(path)
    }

    fn eval_exprs(&mut self, exprs: &[Expr], k: &mut Cont<'_, 'a>) -> Result<Flow> {
        match exprs.split_first() {
            None => k(self),
            Some((first, rest)) => self.eval_expr(first, &mut |this| this.eval_exprs(rest, k)),
        }
    }

    fn eval_expr(&mut self, expr: &Expr, k: &mut Cont<'_, 'a>) -> Result<Flow> {
        self.cancel.check()?;
        trace!("eval {expr}");
        let depth = self.depth;
        self.trace_event(|| TraceEvent::Eval {
            depth,
            expr: expr.to_string(),
        });

        let mut found = false;
        let flow = {
            let mut on_success = |this: &mut Self| {
                found = true;
                k(this)
            };
            if !expr.with.is_empty() {
                self.eval_with(expr, &mut on_success)?
            } else {
                self.eval_expr_inner(expr, &mut on_success)?
            }
        };

        if !found {
            self.trace_event(|| TraceEvent::Fail {
                depth,
                expr: expr.to_string(),
            });
        }
        Ok(flow)
    }

    fn eval_expr_inner(&mut self, expr: &Expr, k: &mut Cont<'_, 'a>) -> Result<Flow> {
        match expr.negated {
            true => self.eval_not(expr, k),
            false => self.eval_expr_kind(expr, k),
        }
    }

    fn eval_not(&mut self, expr: &Expr, k: &mut Cont<'_, 'a>) -> Result<Flow> {
        let mark = self.bindings.mark();
        let mut found = false;
        let r = self.eval_expr_kind(expr, &mut |_| {
            found = true;
            Ok(Flow::Stop)
        });
        self.bindings.undo(mark);
        r?;

        match found {
            true => Ok(Flow::Continue),
            false => k(self),
        }
    }

    fn eval_expr_kind(&mut self, expr: &Expr, k: &mut Cont<'_, 'a>) -> Result<Flow> {
        match &expr.kind {
            ExprKind::Term(Term::Call(parts)) => {
                let Some((op, args)) = parts.split_first() else {
                    return Ok(Flow::Continue);
                };
                let name = ref_name(op)
                    .ok_or_else(|| EvalError::Internal(format!("invalid operator `{op}`")))?;
                match (name.as_str(), args) {
                    ("eq" | "assign", [lhs, rhs]) => self.eval_unify(lhs, rhs, k),
                    _ => self.eval_call(&name, args, k),
                }
            }
            ExprKind::Term(t) => self.eval_term(t, &mut |this, v| match v {
                Term::Bool(false) | Term::Var(_) => Ok(Flow::Continue),
                _ => k(this),
            }),
            ExprKind::SomeDecl(symbols) => self.eval_some_decl(symbols, k),
            ExprKind::Every(every) => self.eval_every(every, k),
        }
    }

    fn eval_unify(&mut self, lhs: &Term, rhs: &Term, k: &mut Cont<'_, 'a>) -> Result<Flow> {
        self.eval_term(lhs, &mut |this, x| {
            this.eval_term(rhs, &mut |this, y| this.unify_then(&x, &y, k))
        })
    }

    /// Calls `k` with `x` and `y` unified, then undoes the bindings.
    fn unify_then(&mut self, x: &Term, y: &Term, k: &mut Cont<'_, 'a>) -> Result<Flow> {
        let mark = self.bindings.mark();
        if !unify(&mut self.bindings, x, y) {
            return Ok(Flow::Continue);
        }
        let r = k(self);
        self.bindings.undo(mark);
        r
    }

    /// Binds the pattern of a quantifier or generator. Plain variables are fresh in that scope.
    fn bind_local(&mut self, pattern: &Term, value: Term) -> bool {
        match pattern {
            Term::Var(v) => {
                self.bindings.shadow(v, value);
                true
            }
            _ => unify(&mut self.bindings, pattern, &value),
        }
    }

    fn eval_some_decl(&mut self, symbols: &[Term], k: &mut Cont<'_, 'a>) -> Result<Flow> {
        if let [Term::Call(parts)] = symbols {
            let (op, args) = parts
                .split_first()
                .ok_or_else(|| EvalError::Internal("empty some declaration".to_string()))?;
            return match (ref_name(op).as_deref(), args) {
                (Some("internal.member_2"), [value, domain]) => {
                    self.eval_some_in(None, value, domain, k)
                }
                (Some("internal.member_3"), [key, value, domain]) => {
                    self.eval_some_in(Some(key), value, domain, k)
                }
                _ => Err(EvalError::Internal(format!(
                    "invalid some declaration `{}`",
                    symbols[0]
                ))),
            };
        }

        // `some x, y` only introduces fresh variables.
        let mark = self.bindings.mark();
        for s in symbols {
            if let Term::Var(v) = s {
                self.bindings.hide(v);
            }
        }
        let r = k(self);
        self.bindings.undo(mark);
        r
    }

    fn eval_some_in(
        &mut self,
        key: Option<&Term>,
        value: &Term,
        domain: &Term,
        k: &mut Cont<'_, 'a>,
    ) -> Result<Flow> {
        self.eval_term(domain, &mut |this, collection| {
            for (entry_key, entry_value) in DomainIter::new(collection) {
                this.cancel.check()?;
                let mark = this.bindings.mark();
                let bound = key.map_or(true, |kt| this.bind_local(kt, entry_key))
                    && this.bind_local(value, entry_value);
                let flow = match bound {
                    true => k(this),
                    false => Ok(Flow::Continue),
                };
                this.bindings.undo(mark);
                if flow? == Flow::Stop {
                    return Ok(Flow::Stop);
                }
            }
            Ok(Flow::Continue)
        })
    }

    // Every element of the domain must satisfy the body. Nothing bound inside escapes.
    fn eval_every(&mut self, every: &Every, k: &mut Cont<'_, 'a>) -> Result<Flow> {
        let Some(domain) = self.first_value(&every.domain)? else {
            return k(self);
        };

        for (key, value) in DomainIter::new(domain) {
            self.cancel.check()?;
            let mark = self.bindings.mark();
            let bound = every
                .key
                .as_ref()
                .map_or(true, |kt| self.bind_local(kt, key))
                && self.bind_local(&every.value, value);

            let mut satisfied = false;
            let r = match bound {
                true => self.eval_exprs(&every.body, &mut |_| {
                    satisfied = true;
                    Ok(Flow::Stop)
                }),
                false => Ok(Flow::Continue),
            };
            self.bindings.undo(mark);
            r?;

            if !satisfied {
                return Ok(Flow::Continue);
            }
        }
        k(self)
    }

    fn eval_with(&mut self, expr: &Expr, k: &mut Cont<'_, 'a>) -> Result<Flow> {
        let saved = self.with_state.clone();
        let mut state = saved.clone();
        for w in &expr.with {
            if !self.apply_with(&mut state, w)? {
                // The replacement value is undefined.
                return Ok(Flow::Continue);
            }
        }
        self.next_with_id += 1;
        state.id = self.next_with_id;
        let scope = state.id;

        self.with_state = state;
        let r = self.eval_expr_inner(expr, &mut |this| {
            // The continuation belongs to the enclosing scope.
            let inner = mem::replace(&mut this.with_state, saved.clone());
            let r = k(this);
            this.with_state = inner;
            r
        });
        self.with_state = saved;
        self.cache.remove(&scope);
        r
    }

    /// Adds the override `w` to `state`. Returns false if the replacement is undefined.
    fn apply_with(&mut self, state: &mut WithState, w: &With) -> Result<bool> {
        let chain = ReferenceChain::new(&w.target)
            .filter(ReferenceChain::is_fully_static)
            .ok_or_else(|| EvalError::Internal(format!("invalid with target `{}`", w.target)))?;

        match chain.root {
            "input" => {
                let Some(value) = self.first_value(&w.value)? else {
                    return Ok(false);
                };
                match chain.prefix.is_empty() {
                    true => state.input = Some(value),
                    false => {
                        let doc = state.input.get_or_insert_with(Term::new_object);
                        *doc.make_or_get_value_mut(&chain.prefix)? = value;
                    }
                }
            }
            "data" => {
                let is_function = self
                    .policy
                    .rule_set(&chain.prefix)
                    .is_some_and(|rs| rs.kind() == DocKind::Function);
                if is_function {
                    let Some(mock) = self.function_mock(&w.value)? else {
                        return Ok(false);
                    };
                    state
                        .functions
                        .insert(get_path_string(&chain.prefix), mock);
                } else {
                    let Some(value) = self.first_value(&w.value)? else {
                        return Ok(false);
                    };
                    state.data.push((chain.prefix, value));
                }
            }
            _ => {
                let name = chain.to_path_string().unwrap_or_default();
                if !self.builtins.contains(&name) {
                    return Err(EvalError::Internal(format!(
                        "invalid with target `{}`",
                        w.target
                    )));
                }
                let Some(mock) = self.function_mock(&w.value)? else {
                    return Ok(false);
                };
                state.functions.insert(name, mock);
            }
        }
        Ok(true)
    }

    fn function_mock(&mut self, value: &Term) -> Result<Option<FunctionMock>> {
        if let Some(name) = ref_name(value) {
            if self.lookup_function(&name).is_ok() {
                return Ok(Some(FunctionMock::Alias(name)));
            }
        }
        Ok(self.first_value(value)?.map(FunctionMock::Value))
    }

    /// First ground value of `term`, if any.
    fn first_value(&mut self, term: &Term) -> Result<Option<Term>> {
        let mut out = None;
        self.eval_term(term, &mut |this, v| {
            let v = this.bindings.plug(&v);
            if !v.is_ground() {
                return Ok(Flow::Continue);
            }
            out = Some(v);
            Ok(Flow::Stop)
        })?;
        Ok(out)
    }

    /// Calls `k` once per value of `term`. Unbound variables are passed through as they are.
    fn eval_term(&mut self, term: &Term, k: &mut ValueCont<'_, 'a>) -> Result<Flow> {
        match term {
            Term::Var(_) => match self.bindings.deref(term) {
                Term::Var(root) if matches!(root.as_ref(), "input" | "data") => {
                    self.eval_ref(&[Term::Var(root)], k)
                }
                value @ Term::Var(_) => k(self, value),
                value => {
                    let value = self.bindings.plug(&value);
                    k(self, value)
                }
            },
            Term::Ref(parts) => self.eval_ref(parts, k),
            Term::Call(parts) => self.eval_call_term(parts, k),
            Term::ArrayCompr(c) => {
                let mut items = vec![];
                let mark = self.bindings.mark();
                let r = self.eval_exprs(&c.body, &mut |this| {
                    this.eval_term(&c.term, &mut |this, v| {
                        let v = this.bindings.plug(&v);
                        if v.is_ground() {
                            items.push(v);
                        }
                        Ok(Flow::Continue)
                    })
                });
                self.bindings.undo(mark);
                r?;
                k(self, Term::from(items))
            }
            Term::SetCompr(c) => {
                let mut items = BTreeSet::new();
                let mark = self.bindings.mark();
                let r = self.eval_exprs(&c.body, &mut |this| {
                    this.eval_term(&c.term, &mut |this, v| {
                        let v = this.bindings.plug(&v);
                        if v.is_ground() {
                            items.insert(v);
                        }
                        Ok(Flow::Continue)
                    })
                });
                self.bindings.undo(mark);
                r?;
                k(self, Term::from(items))
            }
            Term::ObjectCompr(c) => {
                let key_term = c.key.clone().unwrap_or(Term::Null);
                let mut fields: BTreeMap<Term, Term> = BTreeMap::new();
                let mark = self.bindings.mark();
                let r = self.eval_exprs(&c.body, &mut |this| {
                    this.eval_operands(
                        &[key_term.clone(), c.term.clone()],
                        &mut vec![],
                        &mut |this, kv| {
                            let [key, value] = kv else {
                                return Ok(Flow::Continue);
                            };
                            let key = this.bindings.plug(key);
                            let value = this.bindings.plug(value);
                            if !key.is_ground() || !value.is_ground() {
                                return Ok(Flow::Continue);
                            }
                            match fields.get(&key) {
                                Some(prev) if *prev != value => Err(EvalError::Conflict {
                                    path: "object comprehension".to_string(),
                                    message: format!("key {key} has values {prev} and {value}"),
                                }),
                                _ => {
                                    fields.insert(key, value);
                                    Ok(Flow::Continue)
                                }
                            }
                        },
                    )
                });
                self.bindings.undo(mark);
                r?;
                k(self, Term::from(fields))
            }
            Term::Array(items) if term.needs_eval() => {
                self.eval_operands(items, &mut vec![], &mut |this, values| {
                    k(this, Term::from(values.to_vec()))
                })
            }
            Term::Set(items) if term.needs_eval() => {
                let items: Vec<Term> = items.iter().cloned().collect();
                self.eval_operands(&items, &mut vec![], &mut |this, values| {
                    k(this, Term::from(values.iter().cloned().collect::<BTreeSet<_>>()))
                })
            }
            Term::Object(fields) if term.needs_eval() => {
                let flat: Vec<Term> = fields
                    .iter()
                    .flat_map(|(key, value)| [key.clone(), value.clone()])
                    .collect();
                self.eval_operands(&flat, &mut vec![], &mut |this, values| {
                    let map: BTreeMap<Term, Term> = values
                        .chunks(2)
                        .filter_map(|kv| match kv {
                            [key, value] => Some((key.clone(), value.clone())),
                            _ => None,
                        })
                        .collect();
                    k(this, Term::from(map))
                })
            }
            _ => {
                let value = self.bindings.plug(term);
                k(self, value)
            }
        }
    }

    /// Cartesian product over the values of `terms`.
    fn eval_operands(
        &mut self,
        terms: &[Term],
        values: &mut Vec<Term>,
        k: &mut OperandsCont<'_, 'a>,
    ) -> Result<Flow> {
        match terms.split_first() {
            None => k(self, values),
            Some((first, rest)) => self.eval_term(first, &mut |this, v| {
                values.push(v);
                let r = this.eval_operands(rest, values, k);
                values.pop();
                r
            }),
        }
    }

    fn eval_ref(&mut self, parts: &[Term], k: &mut ValueCont<'_, 'a>) -> Result<Flow> {
        let Some((head, rest)) = parts.split_first() else {
            return Ok(Flow::Continue);
        };
        match head {
            Term::Var(root) if self.bindings.lookup(root).is_none() && root.as_ref() == "input" => {
                match self.with_state.input.clone() {
                    Some(input) => self.walk_value(input, rest, k),
                    None => Ok(Flow::Continue),
                }
            }
            Term::Var(root) if self.bindings.lookup(root).is_none() && root.as_ref() == "data" => {
                self.eval_data_ref(rest, k)
            }
            _ => self.eval_term(head, &mut |this, value| match value {
                Term::Var(_) => Ok(Flow::Continue),
                value => this.walk_value(value, rest, k),
            }),
        }
    }

    /// Follows `path` into `value`. Operands with unbound variables enumerate the collection.
    fn walk_value(&mut self, value: Term, path: &[Term], k: &mut ValueCont<'_, 'a>) -> Result<Flow> {
        let Some((first, rest)) = path.split_first() else {
            return k(self, value);
        };

        self.eval_term(first, &mut |this, key| {
            let key = this.bindings.plug(&key);
            if key.is_ground() {
                return match value.lookup(&key) {
                    Some(v) => this.walk_value(v.clone(), rest, k),
                    None => Ok(Flow::Continue),
                };
            }

            for (entry_key, entry_value) in DomainIter::new(value.clone()) {
                this.cancel.check()?;
                let mark = this.bindings.mark();
                if !unify(&mut this.bindings, &key, &entry_key) {
                    continue;
                }
                let flow = this.walk_value(entry_value, rest, k);
                this.bindings.undo(mark);
                if flow? == Flow::Stop {
                    return Ok(Flow::Stop);
                }
            }
            Ok(Flow::Continue)
        })
    }

    fn eval_data_ref(&mut self, operands: &[Term], k: &mut ValueCont<'_, 'a>) -> Result<Flow> {
        let policy = self.policy;

        // Descend through string keys until a rule set or a region without rules is reached.
        let mut path: Vec<Rc<str>> = vec![];
        let mut consumed = 0;
        for operand in operands {
            if policy.rule_set(&path).is_some() || !policy.overlaps_rules(&path) {
                break;
            }
            match self.bindings.plug(operand) {
                Term::String(s) => path.push(s),
                _ => break,
            }
            consumed += 1;
        }

        let rest = &operands[consumed..];
        if !rest.is_empty() && !policy.overlaps_rules(&path) && !self.has_data_overrides_near(&path) {
            return self.walk_store(&mut data_segments(&path), rest, k);
        }

        match self.data_value_at(&path)? {
            Some(value) => self.walk_value(value, rest, k),
            None => Ok(Flow::Continue),
        }
    }

    fn has_data_overrides_near(&self, path: &[Rc<str>]) -> bool {
        self.with_state
            .data
            .iter()
            .any(|(p, _)| p.starts_with(path) || path.starts_with(p))
    }

    /// Follows `operands` through base documents held by the store. Unbound operands enumerate
    /// the keys the store lists below `path`, and only the documents reached are read.
    fn walk_store(
        &mut self,
        path: &mut Vec<PathSegment>,
        operands: &[Term],
        k: &mut ValueCont<'_, 'a>,
    ) -> Result<Flow> {
        let Some((first, rest)) = operands.split_first() else {
            return match self.store.read(self.txn, path)? {
                Some(value) => k(self, value),
                None => Ok(Flow::Continue),
            };
        };

        self.eval_term(first, &mut |this, key| {
            let key = this.bindings.plug(&key);
            if key.is_ground() {
                return match path_segment(&key) {
                    Some(seg) => {
                        path.push(seg);
                        let r = this.walk_store_child(path, &key, rest, k);
                        path.pop();
                        r
                    }
                    None => match this.store.read(this.txn, path)? {
                        Some(doc) => match doc.lookup(&key) {
                            Some(v) => this.walk_value(v.clone(), rest, k),
                            None => Ok(Flow::Continue),
                        },
                        None => Ok(Flow::Continue),
                    },
                };
            }

            let Some(children) = this.store.list_child_keys(this.txn, path)? else {
                return Ok(Flow::Continue);
            };
            trace!("enumerating {} stored keys below {path:?}", children.len());
            for child in children {
                this.cancel.check()?;
                let mark = this.bindings.mark();
                if !unify(&mut this.bindings, &key, &child) {
                    continue;
                }
                let flow = match path_segment(&child) {
                    Some(seg) => {
                        path.push(seg);
                        let r = this.walk_store_child(path, &child, rest, k);
                        path.pop();
                        r
                    }
                    // Composite set members.
                    None => this.walk_value(child.clone(), rest, k),
                };
                this.bindings.undo(mark);
                if flow? == Flow::Stop {
                    return Ok(Flow::Stop);
                }
            }
            Ok(Flow::Continue)
        })
    }

    // `path` ends with the segment addressing `key`.
    fn walk_store_child(
        &mut self,
        path: &mut Vec<PathSegment>,
        key: &Term,
        rest: &[Term],
        k: &mut ValueCont<'_, 'a>,
    ) -> Result<Flow> {
        if !rest.is_empty() {
            return self.walk_store(path, rest, k);
        }
        if let Some(value) = self.store.read(self.txn, path)? {
            return k(self, value);
        }

        // Members of a stored set are not addressable by segment.
        let parent = &path[..path.len().saturating_sub(1)];
        match self.store.read(self.txn, parent)? {
            Some(Term::Set(members)) if members.contains(key) => k(self, key.clone()),
            _ => Ok(Flow::Continue),
        }
    }

    /// Document at `path` below `data` with active overrides applied.
    fn data_value_at(&mut self, path: &[Rc<str>]) -> Result<Option<Term>> {
        let covering = self
            .with_state
            .data
            .iter()
            .rposition(|(p, _)| path.starts_with(p));

        let (mut value, later) = match covering {
            Some(idx) => {
                let (prefix, doc) = &self.with_state.data[idx];
                (lookup_keys(doc, &path[prefix.len()..]), idx + 1)
            }
            None => (self.base_value_at(path)?, 0),
        };

        // Overrides strictly below `path` patch the value.
        let below: Vec<(Vec<Rc<str>>, Term)> = self.with_state.data[later..]
            .iter()
            .filter(|(p, _)| p.len() > path.len() && p.starts_with(path))
            .cloned()
            .collect();
        for (p, v) in below {
            let doc = value.get_or_insert_with(Term::new_object);
            *doc.make_or_get_value_mut(&p[path.len()..])? = v;
        }
        Ok(value)
    }

    fn base_value_at(&mut self, path: &[Rc<str>]) -> Result<Option<Term>> {
        let policy = self.policy;

        if let Some(rs) = policy.rule_set_covering(path) {
            let value = self.eval_rule_set(rs)?;
            return Ok(value.and_then(|v| lookup_keys(&v, &path[rs.path().len()..])));
        }

        if policy.has_rules_below(path) {
            let mut doc = match self.store.read(self.txn, &data_segments(path))? {
                Some(v @ Term::Object(_)) => v,
                _ => Term::new_object(),
            };
            for rs in policy.rule_sets_below(path) {
                if rs.kind() == DocKind::Function {
                    continue;
                }
                if let Some(v) = self.eval_rule_set(rs)? {
                    *doc.make_or_get_value_mut(&rs.path()[path.len()..])? = v;
                }
            }
            return Ok(Some(doc));
        }

        self.store.read(self.txn, &data_segments(path))
    }

    fn enter_rule_set(&mut self, rs: &RuleSet) -> Result<()> {
        if self.in_progress.iter().any(|n| n == rs.name()) {
            let mut chain = self.in_progress.clone();
            chain.push(rs.name().to_string());
            return Err(EvalError::Recursion { chain });
        }
        if self.depth >= self.options.max_depth {
            return Err(EvalError::Internal(format!(
                "max evaluation depth exceeded while evaluating {}",
                rs.name()
            )));
        }
        self.in_progress.push(rs.name().to_string());
        self.depth += 1;
        Ok(())
    }

    fn leave_rule_set(&mut self) {
        self.in_progress.pop();
        self.depth -= 1;
    }

    /// Value of the virtual document defined by `rs`, memoized per override scope.
    fn eval_rule_set(&mut self, rs: &RuleSet) -> Result<Option<Term>> {
        if rs.kind() == DocKind::Function {
            return Ok(None);
        }
        let scope = self.with_state.id;
        if let Some(v) = self.cache.get(&scope).and_then(|docs| docs.get(rs.path())) {
            return Ok(v.clone());
        }

        self.enter_rule_set(rs)?;
        debug!("evaluating {}", rs.name());
        let saved = mem::take(&mut self.bindings);
        let r = match rs.kind() {
            DocKind::Complete => self.eval_complete(rs),
            DocKind::PartialSet => self.eval_partial_set(rs),
            DocKind::PartialObject => self.eval_partial_object(rs),
            DocKind::Function => Ok(None),
        };
        self.bindings = saved;
        self.leave_rule_set();

        let value = r?;
        self.cache
            .entry(scope)
            .or_default()
            .insert(rs.path().to_vec(), value.clone());
        Ok(value)
    }

    /// Rules of `rs` that may succeed for the current input and data.
    fn candidate_rules<'r>(&mut self, rs: &'r RuleSet) -> Result<Vec<&'r Rc<Rule>>> {
        if !self.options.index_rules || rs.kind() == DocKind::Function {
            return Ok(rs.rules().iter().collect());
        }
        let index = rs.index(self.policy);
        if index.is_empty() {
            return Ok(rs.rules().iter().collect());
        }
        let ids = index.candidates(self)?;
        debug!(
            "{}: {} of {} rules selected by index",
            rs.name(),
            ids.len(),
            rs.rules().len()
        );
        Ok(ids.into_iter().filter_map(|i| rs.rules().get(i)).collect())
    }

    fn eval_complete(&mut self, rs: &RuleSet) -> Result<Option<Term>> {
        let mut result: Option<Term> = None;
        for rule in self.candidate_rules(rs)? {
            let Some(value) = self.eval_rule_chain(rs, rule, None)? else {
                continue;
            };
            match &result {
                None => result = Some(value),
                Some(prev) if *prev == value => (),
                Some(prev) => {
                    return Err(EvalError::Conflict {
                        path: rs.name().to_string(),
                        message: format!(
                            "complete rules must not produce multiple outputs: {prev} and {value}"
                        ),
                    })
                }
            }
        }

        if result.is_none() {
            if let Some(default) = rs.default_rule() {
                result = self.eval_rule_clause(rs, default, None)?;
            }
        }
        Ok(result)
    }

    /// Value of the first clause in the else chain of `rule` that has a solution.
    fn eval_rule_chain(
        &mut self,
        rs: &RuleSet,
        rule: &Rule,
        args: Option<&[Term]>,
    ) -> Result<Option<Term>> {
        let mut clause = Some(rule);
        while let Some(r) = clause {
            if let Some(v) = self.eval_rule_clause(rs, r, args)? {
                return Ok(Some(v));
            }
            clause = r.else_rule.as_deref();
        }
        Ok(None)
    }

    fn eval_rule_clause(
        &mut self,
        rs: &RuleSet,
        rule: &Rule,
        args: Option<&[Term]>,
    ) -> Result<Option<Term>> {
        let value_term = rule.value_term();
        let constant = value_term.is_ground() && !value_term.needs_eval();
        let depth = self.depth;
        self.trace_event(|| TraceEvent::Enter {
            depth,
            node: rs.name().to_string(),
        });

        let mut value: Option<Term> = None;
        let mut on_solution = |this: &mut Self| -> Result<Flow> {
            this.eval_term(&value_term, &mut |this, v| {
                let v = this.bindings.plug(&v);
                if !v.is_ground() {
                    return Ok(Flow::Continue);
                }
                this.trace_event(|| TraceEvent::Exit {
                    depth,
                    node: rs.name().to_string(),
                });
                match &value {
                    None => value = Some(v),
                    Some(prev) if *prev == v => (),
                    Some(prev) => {
                        let what = match rs.kind() {
                            DocKind::Function => "functions must not produce multiple outputs for same inputs",
                            _ => "complete rules must not produce multiple outputs",
                        };
                        return Err(EvalError::Conflict {
                            path: rs.name().to_string(),
                            message: format!("{what}: {prev} and {v}"),
                        });
                    }
                }
                Ok(Flow::Stop)
            })?;
            Ok(match constant {
                true => Flow::Stop,
                false => Flow::Continue,
            })
        };

        match args {
            Some(args) => self.eval_with_args(&rule.head.args, args, &rule.body, &mut on_solution)?,
            None => self.eval_exprs(&rule.body, &mut on_solution)?,
        };
        Ok(value)
    }

    /// Unifies function parameters with the call's operands and evaluates the body.
    fn eval_with_args(
        &mut self,
        params: &[Term],
        args: &[Term],
        body: &Body,
        k: &mut Cont<'_, 'a>,
    ) -> Result<Flow> {
        if params.len() != args.len() {
            return Ok(Flow::Continue);
        }
        let mark = self.bindings.mark();
        for (p, a) in params.iter().zip(args) {
            if !unify(&mut self.bindings, p, a) {
                self.bindings.undo(mark);
                return Ok(Flow::Continue);
            }
        }
        let r = self.eval_exprs(body, k);
        self.bindings.undo(mark);
        r
    }

    fn eval_partial_set(&mut self, rs: &RuleSet) -> Result<Option<Term>> {
        let mut members = BTreeSet::new();
        let depth = self.depth;
        for rule in self.candidate_rules(rs)? {
            let Some(key) = &rule.head.key else {
                continue;
            };
            self.trace_event(|| TraceEvent::Enter {
                depth,
                node: rs.name().to_string(),
            });
            self.eval_exprs(&rule.body, &mut |this| {
                this.eval_term(key, &mut |this, k| {
                    let k = this.bindings.plug(&k);
                    if k.is_ground() {
                        this.trace_event(|| TraceEvent::Exit {
                            depth,
                            node: rs.name().to_string(),
                        });
                        members.insert(k);
                    }
                    Ok(Flow::Continue)
                })
            })?;
        }
        Ok(Some(Term::from(members)))
    }

    fn eval_partial_object(&mut self, rs: &RuleSet) -> Result<Option<Term>> {
        let mut fields: BTreeMap<Term, Term> = BTreeMap::new();
        let depth = self.depth;
        for rule in self.candidate_rules(rs)? {
            let Some(key_term) = &rule.head.key else {
                continue;
            };
            let value_term = rule.value_term();
            self.trace_event(|| TraceEvent::Enter {
                depth,
                node: rs.name().to_string(),
            });
            self.eval_exprs(&rule.body, &mut |this| {
                this.eval_operands(
                    &[key_term.clone(), value_term.clone()],
                    &mut vec![],
                    &mut |this, kv| {
                        let [key, value] = kv else {
                            return Ok(Flow::Continue);
                        };
                        let key = this.bindings.plug(key);
                        let value = this.bindings.plug(value);
                        if !key.is_ground() || !value.is_ground() {
                            return Ok(Flow::Continue);
                        }
                        match fields.get(&key) {
                            Some(prev) if *prev != value => Err(EvalError::Conflict {
                                path: rs.name().to_string(),
                                message: format!(
                                    "object keys must be unique: key {key} has values {prev} and {value}"
                                ),
                            }),
                            _ => {
                                this.trace_event(|| TraceEvent::Exit {
                                    depth,
                                    node: rs.name().to_string(),
                                });
                                fields.insert(key, value);
                                Ok(Flow::Continue)
                            }
                        }
                    },
                )
            })?;
        }
        Ok(Some(Term::from(fields)))
    }

    fn eval_user_function(&mut self, rs: &RuleSet, args: &[Term]) -> Result<Option<Term>> {
        self.enter_rule_set(rs)?;
        let saved = mem::take(&mut self.bindings);
        let r = self.eval_function_rules(rs, args);
        self.bindings = saved;
        self.leave_rule_set();
        r
    }

    fn eval_function_rules(&mut self, rs: &RuleSet, args: &[Term]) -> Result<Option<Term>> {
        let mut result: Option<Term> = None;
        for rule in rs.rules() {
            let Some(value) = self.eval_rule_chain(rs, rule, Some(args))? else {
                continue;
            };
            match &result {
                Some(prev) if *prev != value => {
                    return Err(EvalError::Conflict {
                        path: rs.name().to_string(),
                        message: format!(
                            "functions must not produce multiple outputs for same inputs: {prev} and {value}"
                        ),
                    })
                }
                _ => result = Some(value),
            }
        }
        Ok(result)
    }

    fn lookup_function(&self, name: &str) -> Result<(Callee<'a>, Option<usize>)> {
        let policy = self.policy;
        if let Some(path) = parse_data_path(name) {
            if let Some(rs) = policy.rule_set(&path) {
                if rs.kind() == DocKind::Function {
                    return Ok((Callee::User(rs), Some(rs.arity())));
                }
            }
        }
        let registry = self.builtins;
        match registry.get(name) {
            Some(d) => Ok((Callee::Builtin(d), d.arity())),
            None => Err(EvalError::Internal(format!("unknown function `{name}`"))),
        }
    }

    /// Function to call for `name` under the active overrides, with the arity of the original.
    fn resolve_function(&self, name: &str) -> Result<(Callee<'a>, Option<usize>)> {
        let (callee, arity) = self.lookup_function(name)?;
        match self.with_state.functions.get(name) {
            Some(FunctionMock::Alias(target)) => {
                let (replacement, _) = self.lookup_function(target)?;
                Ok((replacement, arity))
            }
            Some(FunctionMock::Value(v)) => Ok((Callee::Constant(v.clone()), arity)),
            None => Ok((callee, arity)),
        }
    }

    /// A call used as an expression: the last operand, if beyond the arity, receives the
    /// result; otherwise the expression holds unless the result is `false`.
    fn eval_call(&mut self, name: &str, args: &[Term], k: &mut Cont<'_, 'a>) -> Result<Flow> {
        let (callee, arity) = self.resolve_function(name)?;
        let (inputs, output) = match arity {
            Some(n) if args.len() == n + 1 => (&args[..n], Some(&args[n])),
            _ => (args, None),
        };

        self.eval_function_call(&callee, inputs, &mut |this, result| match output {
            Some(out) => this.eval_term(out, &mut |this, o| this.unify_then(&o, &result, k)),
            None if result == Term::Bool(false) => Ok(Flow::Continue),
            None => k(this),
        })
    }

    /// A call used as a term yields its result.
    fn eval_call_term(&mut self, parts: &[Term], k: &mut ValueCont<'_, 'a>) -> Result<Flow> {
        let Some((op, args)) = parts.split_first() else {
            return Ok(Flow::Continue);
        };
        let name = ref_name(op)
            .ok_or_else(|| EvalError::Internal(format!("invalid operator `{op}`")))?;
        let (callee, _) = self.resolve_function(&name)?;
        self.eval_function_call(&callee, args, k)
    }

    fn eval_function_call(
        &mut self,
        callee: &Callee<'a>,
        inputs: &[Term],
        k: &mut ValueCont<'_, 'a>,
    ) -> Result<Flow> {
        if let Callee::Builtin(d) = callee {
            if d.lenient {
                let values = self.eval_lenient_operands(inputs)?;
                return match self.eval_builtin_call(d, &values)? {
                    Some(v) => k(self, v),
                    None => Ok(Flow::Continue),
                };
            }
        }

        self.eval_operands(inputs, &mut vec![], &mut |this, values| {
            let result = match callee {
                Callee::Builtin(d) => this.eval_builtin_call(d, values)?,
                Callee::User(rs) if values.iter().all(Term::is_ground) => {
                    this.eval_user_function(rs, values)?
                }
                Callee::User(_) => None,
                Callee::Constant(v) => Some(v.clone()),
            };
            match result {
                Some(v) => k(this, v),
                None => Ok(Flow::Continue),
            }
        })
    }

    /// Every value of each operand. Undefined operands become a placeholder and operands with
    /// several values are passed as a set.
    fn eval_lenient_operands(&mut self, inputs: &[Term]) -> Result<Vec<Term>> {
        let mut operands = Vec::with_capacity(inputs.len());
        for t in inputs {
            let mut values = BTreeSet::new();
            self.eval_term(t, &mut |this, v| {
                let v = this.bindings.plug(&v);
                if v.is_ground() {
                    values.insert(v);
                }
                Ok(Flow::Continue)
            })?;
            operands.push(match values.len() {
                0 => Term::from(UNDEFINED_OPERAND),
                1 => values.into_iter().next().unwrap_or(Term::Null),
                _ => Term::from(values),
            });
        }
        Ok(operands)
    }

    fn eval_builtin_call(&mut self, d: &BuiltinDescriptor, args: &[Term]) -> Result<Option<Term>> {
        if !args.iter().all(Term::is_ground) {
            return Ok(None);
        }
        if !d.lenient {
            d.check_operands(args)?;
        }

        let cache_key = (d.name, args.to_vec());
        if !d.deterministic {
            if let Some(v) = self.nondeterministic_cache.get(&cache_key) {
                return Ok(v.clone());
            }
        }

        let ctx = BuiltinContext {
            name: d.name,
            time_ns: self.time_ns,
            depth: self.depth,
            tracer: self.options.tracer.as_deref(),
            printer: &*self.printer,
        };
        let result = match d.invoke(&ctx, args) {
            Ok(v) => v,
            Err(e) if d.lenient => {
                warn!("{}: {e}", d.name);
                Some(Term::Bool(true))
            }
            Err(e) if self.options.strict_builtin_errors => {
                return Err(EvalError::Builtin {
                    name: d.name.to_string(),
                    operands: args.iter().map(|a| a.to_string()).collect(),
                    message: format!("{e:#}"),
                })
            }
            Err(e) => {
                debug!("{} is undefined: {e}", d.name);
                None
            }
        };

        if !d.deterministic {
            self.nondeterministic_cache.insert(cache_key, result.clone());
        }
        Ok(result)
    }
}

impl ValueResolver for Interpreter<'_> {
    fn resolve(&mut self, reference: &Term) -> Result<Option<Term>> {
        let Some(chain) = ReferenceChain::new(reference) else {
            return Ok(None);
        };
        let base = match chain.root {
            "input" => self
                .with_state
                .input
                .as_ref()
                .and_then(|input| lookup_keys(input, &chain.prefix)),
            "data" => self.data_value_at(&chain.prefix)?,
            _ => None,
        };
        Ok(base.and_then(|mut v| {
            for key in chain.rest {
                v = v.lookup(key)?.clone();
            }
            Some(v)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::*;
    use crate::ast::Module;
    use crate::store::InMemoryStore;

    fn solutions(modules: Vec<Module>, input: Option<&str>, query: Vec<Expr>) -> Result<Vec<String>> {
        let policy =
            CompiledPolicy::compile(&modules.into_iter().map(Rc::new).collect::<Vec<_>>())?;
        let store = InMemoryStore::new();
        let txn = store.begin_read()?;
        let builtins = BuiltinRegistry::default();
        let options = EvalOptions::default();
        let input = input.map(|s| Term::from_json_str(s).unwrap());
        let mut interp = Interpreter::new(&policy, &store, &txn, &builtins, &options, input);

        let mut out = vec![];
        interp.eval_query(&body(query), &mut |r| {
            let parts: Vec<String> = r
                .bindings
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            out.push(parts.join(","));
            Flow::Continue
        })?;
        Ok(out)
    }

    #[test]
    fn conjunction_yields_one_solution() {
        let r = solutions(
            vec![],
            None,
            vec![eq(var("x"), num(1)), eq(var("y"), num(2))],
        )
        .unwrap();
        assert_eq!(r, vec!["x=1,y=2"]);
    }

    #[test]
    fn refs_enumerate_in_order() {
        let r = solutions(
            vec![],
            Some(r#"{"xs": ["a", "b", "c"]}"#),
            vec![
                eq(ref_with("input.xs", vec![var("i")]), var("x")),
                not(eq(var("x"), string("b"))),
            ],
        )
        .unwrap();
        assert_eq!(r, vec![r#"i=0,x="a""#, r#"i=2,x="c""#]);
    }

    #[test]
    fn negation_does_not_leak() {
        let r = solutions(
            vec![],
            None,
            vec![not(eq(var("x"), num(1))), eq(var("y"), num(1))],
        )
        .unwrap();
        // `x = 1` succeeds, so the negation fails.
        assert!(r.is_empty());

        let r = solutions(
            vec![],
            None,
            vec![
                eq(var("x"), num(2)),
                not(eq(var("x"), num(1))),
            ],
        )
        .unwrap();
        assert_eq!(r, vec!["x=2"]);
    }

    #[test]
    fn comprehensions_and_every() {
        let r = solutions(
            vec![],
            None,
            vec![
                assign(
                    var("xs"),
                    array_compr(
                        var("x"),
                        vec![some_in(None, var("x"), array(vec![num(1), num(2), num(3)]))],
                    ),
                ),
                every(
                    None,
                    var("v"),
                    var("xs"),
                    vec![call_expr("gt", vec![var("v"), num(0)])],
                ),
            ],
        )
        .unwrap();
        assert_eq!(r, vec!["xs=[1, 2, 3]"]);
    }

    #[test]
    fn complete_rules_and_defaults() {
        let m = module(
            "t",
            vec![
                rule("p")
                    .value(num(1))
                    .body(vec![eq(reference("input.x"), num(1))])
                    .build(),
                rule("p").default().value(num(0)).build(),
            ],
        );
        let q = vec![eq(var("v"), reference("data.t.p"))];
        assert_eq!(
            solutions(vec![m.clone()], Some(r#"{"x": 1}"#), q.clone()).unwrap(),
            vec!["v=1"]
        );
        assert_eq!(
            solutions(vec![m], Some(r#"{"x": 2}"#), q).unwrap(),
            vec!["v=0"]
        );
    }

    #[test]
    fn closed_with_scopes_release_their_documents() -> Result<()> {
        let m = module(
            "t",
            vec![
                rule("p").value(reference("input.x")).build(),
                rule("q").value(num(1)).build(),
            ],
        );
        let policy = CompiledPolicy::compile(&[Rc::new(m)])?;
        let store = InMemoryStore::new();
        let txn = store.begin_read()?;
        let builtins = BuiltinRegistry::default();
        let options = EvalOptions::default();
        let mut interp = Interpreter::new(&policy, &store, &txn, &builtins, &options, None);

        let mut out = vec![];
        interp.eval_query(
            &body(vec![
                some_in(None, var("x"), array(vec![num(1), num(2), num(3)])),
                with(
                    eq(var("y"), reference("data.t.p")),
                    "input.x",
                    var("x"),
                ),
                eq(var("z"), reference("data.t.q")),
            ]),
            &mut |r| {
                out.push(r.bindings["y"].clone());
                Flow::Continue
            },
        )?;
        assert_eq!(out, vec![num(1), num(2), num(3)]);

        // Only the unscoped document survives.
        assert_eq!(interp.cache.len(), 1);
        let top = &interp.cache[&0];
        assert_eq!(top.len(), 1);
        let q: Vec<Rc<str>> = vec!["t".into(), "q".into()];
        assert!(top.contains_key(&q));
        Ok(())
    }

    #[test]
    fn functions_unify_arguments() {
        let m = module(
            "t",
            vec![
                rule("f")
                    .args(vec![var("x")])
                    .value(string("small"))
                    .body(vec![call_expr("lt", vec![var("x"), num(10)])])
                    .build(),
                rule("f")
                    .args(vec![var("x")])
                    .value(string("big"))
                    .body(vec![call_expr("gte", vec![var("x"), num(10)])])
                    .build(),
            ],
        );
        let r = solutions(
            vec![m],
            None,
            vec![call_expr("data.t.f", vec![num(12), var("s")])],
        )
        .unwrap();
        assert_eq!(r, vec![r#"s="big""#]);
    }

    #[test]
    fn unknown_functions_are_internal_errors() {
        let err = solutions(vec![], None, vec![call_expr("no.such", vec![num(1)])]).unwrap_err();
        assert!(matches!(err, EvalError::Internal(_)));
    }

    #[test]
    fn query_vars_skip_generated_names() {
        let vars = query_vars(&body(vec![
            eq(var("x"), reference("input.a")),
            eq(var("__local0__"), var("_")),
            call_expr("count", vec![var("xs"), var("$n")]),
        ]));
        assert_eq!(
            vars.into_iter().map(|v| v.to_string()).collect::<Vec<_>>(),
            vec!["x", "xs"]
        );
    }
}
