// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::{DocKind, Module, Rule};
use crate::error::{EvalError, Result};
use crate::indexer::RuleIndex;
use crate::term::Term;
use crate::utils::get_path_string;
use crate::Rc;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use log::debug;

static GENERATION: AtomicU64 = AtomicU64::new(1);

/// All rules that define one document (or function) path.
#[derive(Debug)]
pub struct RuleSet {
    pub(crate) path: Vec<Rc<str>>,
    pub(crate) name: String,
    pub(crate) kind: DocKind,

    /// Non-default rules in declaration order.
    pub(crate) rules: Vec<Rc<Rule>>,
    pub(crate) default_rule: Option<Rc<Rule>>,
    index: OnceLock<RuleIndex>,
}

impl RuleSet {
    /// Path below `data`.
    pub fn path(&self) -> &[Rc<str>] {
        &self.path
    }

    /// Dotted name, e.g. `data.authz.allow`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DocKind {
        self.kind
    }

    pub fn rules(&self) -> &[Rc<Rule>] {
        &self.rules
    }

    pub fn default_rule(&self) -> Option<&Rc<Rule>> {
        self.default_rule.as_ref()
    }

    /// Number of arguments for functions, zero for documents.
    pub fn arity(&self) -> usize {
        self.rules
            .first()
            .map(|r| r.head.args.len())
            .unwrap_or_default()
    }

    /// Index over the rules, built on first use.
    pub(crate) fn index(&self, policy: &CompiledPolicy) -> &RuleIndex {
        self.index.get_or_init(|| {
            let index = RuleIndex::build(&self.rules, |path| policy.overlaps_rules(path));
            debug!(
                "built rule index for {}: {} rules, {} indexed",
                self.name,
                self.rules.len(),
                index.indexed_rules()
            );
            index
        })
    }
}

#[derive(Debug)]
pub(crate) struct CompiledPolicyData {
    pub(crate) modules: Vec<Rc<Module>>,
    pub(crate) rules: BTreeMap<Vec<Rc<str>>, Rc<RuleSet>>,
    pub(crate) generation: u64,
}

/// Rule tree built from a set of modules. Cheap to clone and immutable; any change to the
/// modules produces a new policy with a new generation, so rule indices are never stale.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    pub(crate) inner: Rc<CompiledPolicyData>,
}

/// Turns a rule head into its document path and normalizes `p[k] = v` style heads so the key
/// lives in `head.key`.
fn normalize_rule(package: &[Rc<str>], rule: &Rule) -> Result<(Vec<Rc<str>>, Rule)> {
    let mut rule = rule.clone();
    let head = &mut rule.head;

    if head.key.is_none() && head.args.is_empty() && head.reference.len() > 1 {
        if let Some(last) = head.reference.last() {
            if !matches!(last, Term::String(_)) {
                head.key = Some(last.clone());
                head.reference.pop();
            }
        }
    } else if head.key.is_some() && head.reference.len() > 1 && head.reference.last() == head.key.as_ref() {
        head.reference.pop();
    }

    let mut path = package.to_vec();
    let mut parts = head.reference.iter();
    match parts.next() {
        Some(Term::Var(name)) => path.push(name.clone()),
        Some(Term::String(name)) => path.push(name.clone()),
        other => {
            return Err(EvalError::Compile(format!(
                "invalid rule head `{}`",
                other.map(|t| t.to_string()).unwrap_or_default()
            )))
        }
    }
    for p in parts {
        match p {
            Term::String(s) => path.push(s.clone()),
            _ => {
                return Err(EvalError::Compile(format!(
                    "{}: rule head refs must be static except for the last element. Got `{p}`",
                    get_path_string(&path)
                )))
            }
        }
    }

    if let Some(else_rule) = &rule.else_rule {
        let (_, normalized) = normalize_rule(package, else_rule)?;
        rule.else_rule = Some(Rc::new(normalized));
    }
    Ok((path, rule))
}

impl CompiledPolicy {
    pub fn compile(modules: &[Rc<Module>]) -> Result<Self> {
        let mut grouped: BTreeMap<Vec<Rc<str>>, (Vec<Rc<Rule>>, Option<Rc<Rule>>, DocKind)> =
            BTreeMap::new();

        for module in modules {
            for rule in &module.rules {
                let (path, rule) = normalize_rule(&module.package.path, rule)?;
                let kind = rule.head.doc_kind();
                let name = get_path_string(&path);

                let entry = grouped
                    .entry(path)
                    .or_insert_with(|| (vec![], None, kind));
                if entry.2 != kind {
                    return Err(EvalError::Compile(format!(
                        "{name}: conflicting rule kinds {:?} and {kind:?}",
                        entry.2
                    )));
                }
                if kind == DocKind::Function
                    && entry.0.first().is_some_and(|r| r.head.args.len() != rule.head.args.len())
                {
                    return Err(EvalError::Compile(format!(
                        "{name}: functions must have the same number of arguments"
                    )));
                }

                if rule.default {
                    if kind != DocKind::Complete {
                        return Err(EvalError::Compile(format!(
                            "{name}: default rules must define complete documents"
                        )));
                    }
                    if entry.1.is_some() {
                        return Err(EvalError::Compile(format!(
                            "{name}: multiple default rules"
                        )));
                    }
                    entry.1 = Some(Rc::new(rule));
                } else {
                    entry.0.push(Rc::new(rule));
                }
            }
        }

        let mut rules = BTreeMap::new();
        for (path, (set, default_rule, kind)) in grouped {
            let name = get_path_string(&path);
            rules.insert(
                path.clone(),
                Rc::new(RuleSet {
                    path,
                    name,
                    kind,
                    rules: set,
                    default_rule,
                    index: OnceLock::new(),
                }),
            );
        }

        // A document cannot be both a rule and a namespace of other rules.
        let paths: Vec<&Vec<Rc<str>>> = rules.keys().collect();
        for w in paths.windows(2) {
            if w[1].starts_with(w[0]) {
                return Err(EvalError::Compile(format!(
                    "rule {} conflicts with rule {}",
                    get_path_string(w[0]),
                    get_path_string(w[1])
                )));
            }
        }

        let generation = GENERATION.fetch_add(1, Ordering::Relaxed);
        debug!(
            "compiled policy generation {generation}: {} modules, {} rule sets",
            modules.len(),
            rules.len()
        );

        Ok(Self {
            inner: Rc::new(CompiledPolicyData {
                modules: modules.to_vec(),
                rules,
                generation,
            }),
        })
    }

    pub fn modules(&self) -> &[Rc<Module>] {
        &self.inner.modules
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation
    }

    pub fn rule_set(&self, path: &[Rc<str>]) -> Option<&Rc<RuleSet>> {
        self.inner.rules.get(path)
    }

    pub fn rule_sets(&self) -> impl Iterator<Item = &Rc<RuleSet>> {
        self.inner.rules.values()
    }

    /// Rule sets strictly below `prefix`, in path order.
    pub(crate) fn rule_sets_below(&self, prefix: &[Rc<str>]) -> Vec<&Rc<RuleSet>> {
        self.inner
            .rules
            .range(prefix.to_vec()..)
            .take_while(|(p, _)| p.starts_with(prefix))
            .filter(|(p, _)| p.len() > prefix.len())
            .map(|(_, rs)| rs)
            .collect()
    }

    pub(crate) fn has_rules_below(&self, prefix: &[Rc<str>]) -> bool {
        self.inner
            .rules
            .range(prefix.to_vec()..)
            .take_while(|(p, _)| p.starts_with(prefix))
            .any(|(p, _)| p.len() > prefix.len())
    }

    /// Longest prefix of `path` that is a rule path.
    pub(crate) fn rule_set_covering(&self, path: &[Rc<str>]) -> Option<&Rc<RuleSet>> {
        (0..=path.len()).rev().find_map(|i| self.rule_set(&path[..i]))
    }

    /// True if reading `data` at `path` may involve rule evaluation.
    pub(crate) fn overlaps_rules(&self, path: &[Rc<str>]) -> bool {
        self.rule_set_covering(path).is_some() || self.has_rules_below(path)
    }
}
