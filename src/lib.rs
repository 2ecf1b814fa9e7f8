// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Top-down evaluator for compiled Rego policies.
//!
//! The crate consumes rule modules produced by an external compiler (either built in Rust through
//! [`ast::builder`] or loaded from the compiler's JSON AST) and answers queries against an input
//! document and a [`Store`] of base documents. Evaluation is a backtracking search over rule
//! bodies with unification, memoized virtual documents, indexed rule selection, comprehensions
//! and `with` overrides.

#![allow(clippy::module_inception)]

pub mod ast;
pub mod builtins;
mod compiled_policy;
mod engine;
mod error;
mod indexer;
mod interpreter;
mod number;
mod store;
mod term;
mod trace;
pub mod utils;

pub use compiled_policy::{CompiledPolicy, RuleSet};
pub use engine::{Engine, EvalOptions};
pub use error::{EvalError, Result};
pub use interpreter::{Flow, QueryResult, QueryResults};
pub use number::Number;
pub use store::{InMemoryStore, PathSegment, Store, Transaction};
pub use term::Term;
pub use trace::{BufferedPrinter, BufferedTracer, PrintSink, StderrPrinter, TraceEvent, Tracer};
pub use utils::cancel::CancellationToken;
pub use utils::limits::ExecutionTimerConfig;

pub use builtins::{BuiltinDescriptor, BuiltinRegistry, OperandType, RegistryBuilder};

#[cfg(feature = "arc")]
pub(crate) use std::sync::Arc as Rc;

#[cfg(not(feature = "arc"))]
pub(crate) use std::rc::Rc;
