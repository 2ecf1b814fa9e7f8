// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::term::Term;
use crate::Rc;

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Variable environment of one body evaluation.
///
/// Every change is recorded on a trail together with the previous value, so a choice point
/// only needs to remember the trail length ([`Bindings::mark`]) to roll back everything bound
/// after it ([`Bindings::undo`]).
#[derive(Debug, Default)]
pub(crate) struct Bindings {
    values: HashMap<Rc<str>, Term>,
    trail: Vec<(Rc<str>, Option<Term>)>,
}

pub(crate) fn is_wildcard(name: &str) -> bool {
    name == "_"
}

impl Bindings {
    pub(crate) fn mark(&self) -> usize {
        self.trail.len()
    }

    pub(crate) fn undo(&mut self, mark: usize) {
        while self.trail.len() > mark {
            let Some((name, previous)) = self.trail.pop() else {
                break;
            };
            match previous {
                Some(v) => self.values.insert(name, v),
                None => self.values.remove(&name),
            };
        }
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&Term> {
        self.values.get(name)
    }

    /// Binds an unbound variable. Fails if `value` still contains `name` after substitution.
    pub(crate) fn bind(&mut self, name: &Rc<str>, value: Term) -> bool {
        if is_wildcard(name) {
            return true;
        }
        if !value.is_ground() {
            let mut vars = BTreeSet::new();
            self.plug(&value).collect_vars(&mut vars);
            if vars.contains(name) {
                return false;
            }
        }
        self.set(name, Some(value));
        true
    }

    /// Binds `name` regardless of any current value. Used for variables declared local to a
    /// quantifier or generator.
    pub(crate) fn shadow(&mut self, name: &Rc<str>, value: Term) {
        if !is_wildcard(name) {
            self.set(name, Some(value));
        }
    }

    /// Makes `name` unbound until the next undo past this point.
    pub(crate) fn hide(&mut self, name: &Rc<str>) {
        if self.values.contains_key(name) {
            self.set(name, None);
        }
    }

    fn set(&mut self, name: &Rc<str>, value: Option<Term>) {
        let previous = match value {
            Some(v) => self.values.insert(name.clone(), v),
            None => self.values.remove(name),
        };
        self.trail.push((name.clone(), previous));
    }

    /// Follows variable-to-variable bindings. Returns the last variable of the chain if it is
    /// unbound.
    pub(crate) fn deref(&self, term: &Term) -> Term {
        let mut t = term;
        while let Term::Var(v) = t {
            match self.values.get(v) {
                Some(next) => t = next,
                None => break,
            }
        }
        t.clone()
    }

    /// Substitutes bound variables throughout `term`. Comprehension bodies are left alone.
    pub(crate) fn plug(&self, term: &Term) -> Term {
        match term {
            Term::Var(_) => match self.deref(term) {
                v @ Term::Var(_) => v,
                v => self.plug(&v),
            },
            Term::Array(items) if !term.is_ground() => {
                Term::from(items.iter().map(|t| self.plug(t)).collect::<Vec<_>>())
            }
            Term::Set(items) if !term.is_ground() => {
                Term::from(items.iter().map(|t| self.plug(t)).collect::<BTreeSet<_>>())
            }
            Term::Object(fields) if !term.is_ground() => Term::from(
                fields
                    .iter()
                    .map(|(k, v)| (self.plug(k), self.plug(v)))
                    .collect::<BTreeMap<_, _>>(),
            ),
            Term::Ref(parts) => Term::Ref(Rc::new(parts.iter().map(|t| self.plug(t)).collect())),
            Term::Call(parts) => {
                Term::Call(Rc::new(parts.iter().map(|t| self.plug(t)).collect()))
            }
            _ => term.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::*;

    fn name(s: &str) -> Rc<str> {
        s.into()
    }

    #[test]
    fn undo_restores_previous_state() {
        let mut b = Bindings::default();
        assert!(b.bind(&name("x"), num(1)));

        let mark = b.mark();
        assert!(b.bind(&name("y"), var("x")));
        b.shadow(&name("x"), num(2));
        assert_eq!(b.plug(&var("y")), num(2));

        b.undo(mark);
        assert_eq!(b.lookup("x"), Some(&num(1)));
        assert_eq!(b.lookup("y"), None);
    }

    #[test]
    fn plug_substitutes_nested_vars() {
        let mut b = Bindings::default();
        assert!(b.bind(&name("x"), var("y")));
        assert!(b.bind(&name("y"), array(vec![var("z"), string("a")])));
        assert!(b.bind(&name("z"), boolean(true)));

        assert_eq!(
            b.plug(&object(vec![(string("k"), var("x"))])),
            object(vec![(string("k"), array(vec![boolean(true), string("a")]))])
        );
        assert_eq!(b.deref(&var("w")), var("w"));
    }

    #[test]
    fn occurs_check_rejects_cycles() {
        let mut b = Bindings::default();
        assert!(!b.bind(&name("x"), array(vec![var("x")])));
        assert!(b.bind(&name("y"), array(vec![var("z")])));
        assert!(!b.bind(&name("z"), var("y")));
    }

    #[test]
    fn wildcard_is_never_bound() {
        let mut b = Bindings::default();
        assert!(b.bind(&name("_"), num(1)));
        b.shadow(&name("_"), num(2));
        assert_eq!(b.lookup("_"), None);
        assert_eq!(b.mark(), 0);
    }

    #[test]
    fn hide_is_undone() {
        let mut b = Bindings::default();
        assert!(b.bind(&name("x"), num(1)));
        let mark = b.mark();
        b.hide(&name("x"));
        assert_eq!(b.lookup("x"), None);
        b.undo(mark);
        assert_eq!(b.lookup("x"), Some(&num(1)));
    }
}
