// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::{EvalError, Result};
use crate::term::Term;
use crate::Rc;

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "std")]
use parking_lot::RwLock;
#[cfg(not(feature = "std"))]
use spin::RwLock;

/// One step of a storage path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathSegment {
    Key(Rc<str>),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => f.write_str(k),
            PathSegment::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        PathSegment::Key(s.into())
    }
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self {
        PathSegment::Index(i)
    }
}

/// Read handle supplied by the caller of a query. All reads of one query go through the same
/// transaction and therefore observe a single snapshot.
#[derive(Debug, Clone)]
pub struct Transaction {
    id: u64,
    snapshot: Option<Term>,
}

impl Transaction {
    /// Creates a handle for stores that track snapshots themselves.
    pub fn new(id: u64) -> Self {
        Self { id, snapshot: None }
    }

    /// Creates a handle pinning the root document `snapshot`.
    pub fn with_snapshot(id: u64, snapshot: Term) -> Self {
        Self {
            id,
            snapshot: Some(snapshot),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn snapshot(&self) -> Option<&Term> {
        self.snapshot.as_ref()
    }
}

/// Document store consumed by the evaluator. The evaluator only reads; writes are the host's
/// business.
pub trait Store {
    fn begin_read(&self) -> Result<Transaction>;

    /// Document at `path`, or `None` if nothing is stored there.
    fn read(&self, txn: &Transaction, path: &[PathSegment]) -> Result<Option<Term>>;

    /// Keys directly below `path` in their natural order, or `None` if `path` does not exist
    /// or is a scalar.
    fn list_child_keys(&self, txn: &Transaction, path: &[PathSegment])
        -> Result<Option<Vec<Term>>>;

    fn end(&self, _txn: Transaction) {}
}

fn walk<'a>(mut doc: &'a Term, path: &[PathSegment]) -> Option<&'a Term> {
    for seg in path {
        doc = match (doc, seg) {
            (Term::Object(o), PathSegment::Key(k)) => o.get(&Term::String(k.clone()))?,
            (Term::Array(a), PathSegment::Index(i)) => a.get(*i)?,
            (Term::Array(a), PathSegment::Key(k)) => a.get(k.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(doc)
}

/// Copy-on-write in-memory document tree.
///
/// Each read transaction pins the root as it was when the transaction began, so writes made
/// while a query runs are not visible to it.
pub struct InMemoryStore {
    root: RwLock<Term>,
    next_txn: AtomicU64,
}

impl fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("root", &*self.root.read())
            .finish()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Term::new_object()),
            next_txn: AtomicU64::new(1),
        }
    }

    pub fn from_value(root: Term) -> Result<Self> {
        if !matches!(root, Term::Object(_)) {
            return Err(EvalError::Storage(format!(
                "root document must be an object. Got {}",
                root.type_name()
            )));
        }
        Ok(Self {
            root: RwLock::new(root),
            next_txn: AtomicU64::new(1),
        })
    }

    /// Replaces the document at `path`, creating intermediate objects.
    pub fn write(&self, path: &[PathSegment], value: Term) -> Result<()> {
        let mut root = self.root.write();
        let keys = path
            .iter()
            .map(|seg| match seg {
                PathSegment::Key(k) => Ok(k.clone()),
                PathSegment::Index(i) => Err(EvalError::Storage(format!(
                    "cannot write through array index {i}"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        let slot = root
            .make_or_get_value_mut(&keys)
            .map_err(|e| EvalError::Storage(e.to_string()))?;
        *slot = value;
        Ok(())
    }

    /// Deep-merges `data` into the root. Objects merge key-wise; a key holding two different
    /// non-object values is an error.
    pub fn merge(&self, data: Term) -> Result<()> {
        fn merge_into(dst: &mut Term, src: Term, path: &mut Vec<String>) -> Result<()> {
            match (dst, src) {
                (Term::Object(d), Term::Object(s)) => {
                    let d = Rc::make_mut(d);
                    for (k, v) in s.iter() {
                        match d.get_mut(k) {
                            Some(existing) => {
                                path.push(match k {
                                    Term::String(s) => s.to_string(),
                                    _ => k.to_string(),
                                });
                                merge_into(existing, v.clone(), path)?;
                                path.pop();
                            }
                            None => {
                                d.insert(k.clone(), v.clone());
                            }
                        }
                    }
                    Ok(())
                }
                (d, s) if *d == s => Ok(()),
                (_, _) => Err(EvalError::Storage(format!(
                    "merge error: data.{} is already defined",
                    path.join(".")
                ))),
            }
        }

        if !matches!(data, Term::Object(_)) {
            return Err(EvalError::Storage(format!(
                "data must be an object. Got {}",
                data.type_name()
            )));
        }
        let mut root = self.root.write();
        merge_into(&mut root, data, &mut vec![])
    }
}

impl Store for InMemoryStore {
    fn begin_read(&self) -> Result<Transaction> {
        let id = self.next_txn.fetch_add(1, Ordering::Relaxed);
        Ok(Transaction::with_snapshot(id, self.root.read().clone()))
    }

    fn read(&self, txn: &Transaction, path: &[PathSegment]) -> Result<Option<Term>> {
        match txn.snapshot() {
            Some(root) => Ok(walk(root, path).cloned()),
            None => Ok(walk(&self.root.read(), path).cloned()),
        }
    }

    fn list_child_keys(
        &self,
        txn: &Transaction,
        path: &[PathSegment],
    ) -> Result<Option<Vec<Term>>> {
        Ok(self.read(txn, path)?.and_then(|doc| match doc {
            Term::Object(o) => Some(o.keys().cloned().collect()),
            Term::Array(a) => Some((0..a.len()).map(Term::from).collect()),
            Term::Set(s) => Some(s.iter().cloned().collect()),
            _ => None,
        }))
    }
}
