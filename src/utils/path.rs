// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Decomposition of refs into a root, a static prefix and the remaining operands.

use crate::term::Term;
use crate::Rc;

/// A ref such as `data.a.b[x].c` viewed as root `data`, static prefix `["a", "b"]` and
/// remaining operands `[x, "c"]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceChain<'a> {
    pub root: &'a str,
    pub prefix: Vec<Rc<str>>,
    pub rest: &'a [Term],
}

impl<'a> ReferenceChain<'a> {
    /// Splits a ref whose head is a variable. Returns `None` for other terms.
    pub fn new(term: &'a Term) -> Option<Self> {
        let Term::Ref(parts) = term else {
            return None;
        };
        let (Term::Var(root), operands) = parts.split_first()? else {
            return None;
        };
        let static_len = operands
            .iter()
            .take_while(|t| matches!(t, Term::String(_)))
            .count();
        let prefix = operands[..static_len]
            .iter()
            .filter_map(|t| match t {
                Term::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        Some(Self {
            root: root.as_ref(),
            prefix,
            rest: &operands[static_len..],
        })
    }

    pub fn is_fully_static(&self) -> bool {
        self.rest.is_empty()
    }

    /// Dotted path for fully static chains.
    pub fn to_path_string(&self) -> Option<String> {
        if !self.is_fully_static() {
            return None;
        }
        let mut parts = vec![self.root.to_string()];
        parts.extend(self.prefix.iter().map(|p| p.to_string()));
        Some(parts.join("."))
    }
}

/// Splits `data.a.b` into `["a", "b"]`. Returns `None` if the path is not rooted at `data`.
pub fn parse_data_path(path: &str) -> Option<Vec<Rc<str>>> {
    let mut parts = path.split('.');
    if parts.next()? != "data" {
        return None;
    }
    Some(parts.filter(|p| !p.is_empty()).map(Rc::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::*;

    #[test]
    fn static_prefix_stops_at_first_operand() {
        let r = ref_with("data.a.b", vec![var("x"), string("c")]);
        let chain = ReferenceChain::new(&r).unwrap();
        assert_eq!(chain.root, "data");
        assert_eq!(chain.prefix, vec![Rc::<str>::from("a"), Rc::from("b")]);
        assert_eq!(chain.rest.len(), 2);
        assert!(!chain.is_fully_static());
        assert_eq!(chain.to_path_string(), None);
    }

    #[test]
    fn fully_static_chain() {
        let r = reference("input.user.name");
        let chain = ReferenceChain::new(&r).unwrap();
        assert!(chain.is_fully_static());
        assert_eq!(chain.to_path_string().as_deref(), Some("input.user.name"));
        assert!(ReferenceChain::new(&var("x")).is_none());
    }

    #[test]
    fn data_paths() {
        assert_eq!(
            parse_data_path("data.pkg.rule"),
            Some(vec![Rc::<str>::from("pkg"), Rc::from("rule")])
        );
        assert_eq!(parse_data_path("data"), Some(vec![]));
        assert_eq!(parse_data_path("input.x"), None);
    }
}
