// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Built-in function registry.
//!
//! A [`BuiltinRegistry`] is an immutable table built once with a [`RegistryBuilder`] and shared by
//! every evaluation that uses it. [`BuiltinRegistry::default`] holds the core library.

pub mod aggregates;
pub mod arrays;
pub mod comparison;
pub mod debugging;
pub mod encoding;
pub mod membership;
pub mod numbers;
pub mod objects;
pub mod sets;
pub mod strings;
pub mod time;
pub mod tracing;
pub mod types;
pub mod utils;

use crate::error::EvalError;
use crate::term::Term;
use crate::trace::{PrintSink, Tracer};
use crate::Rc;

use core::fmt;
use std::collections::HashMap;

use anyhow::Result;

/// Built-in that only looks at its operands.
pub type BuiltinFcn = fn(&[Term]) -> Result<Option<Term>>;

/// Built-in that also needs the evaluation context (clock, tracer, print sink).
pub type ContextualFcn = fn(&BuiltinContext<'_>, &[Term]) -> Result<Option<Term>>;

#[derive(Clone, Copy)]
pub enum BuiltinImpl {
    Pure(BuiltinFcn),
    Contextual(ContextualFcn),
}

impl fmt::Debug for BuiltinImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuiltinImpl::Pure(_) => f.write_str("Pure"),
            BuiltinImpl::Contextual(_) => f.write_str("Contextual"),
        }
    }
}

/// Declared type of an operand or result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    Any,
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
    Set,
    Union(&'static [OperandType]),
}

impl OperandType {
    /// Array, set or object.
    pub const COLLECTION: OperandType =
        OperandType::Union(&[OperandType::Array, OperandType::Set, OperandType::Object]);

    /// Array or set.
    pub const ITERABLE: OperandType = OperandType::Union(&[OperandType::Array, OperandType::Set]);

    pub fn accepts(&self, t: &Term) -> bool {
        match self {
            OperandType::Any => true,
            OperandType::Null => matches!(t, Term::Null),
            OperandType::Boolean => matches!(t, Term::Bool(_)),
            OperandType::Number => matches!(t, Term::Number(_)),
            OperandType::String => matches!(t, Term::String(_)),
            OperandType::Array => matches!(t, Term::Array(_)),
            OperandType::Object => matches!(t, Term::Object(_)),
            OperandType::Set => matches!(t, Term::Set(_)),
            OperandType::Union(types) => types.iter().any(|ty| ty.accepts(t)),
        }
    }
}

impl fmt::Display for OperandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperandType::Any => f.write_str("any"),
            OperandType::Null => f.write_str("null"),
            OperandType::Boolean => f.write_str("boolean"),
            OperandType::Number => f.write_str("number"),
            OperandType::String => f.write_str("string"),
            OperandType::Array => f.write_str("array"),
            OperandType::Object => f.write_str("object"),
            OperandType::Set => f.write_str("set"),
            OperandType::Union(types) => {
                let parts: Vec<String> = types.iter().map(|t| t.to_string()).collect();
                write!(f, "any<{}>", parts.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuiltinDescriptor {
    pub name: &'static str,

    /// Declared operand types. For variadic built-ins these describe the leading operands and
    /// any further operand is unconstrained.
    pub operands: &'static [OperandType],
    pub result: OperandType,
    pub variadic: bool,
    pub deterministic: bool,

    /// Accepts undefined operands and never fails the query (`print`).
    pub lenient: bool,
    pub implementation: BuiltinImpl,
}

impl BuiltinDescriptor {
    pub fn pure(
        name: &'static str,
        operands: &'static [OperandType],
        result: OperandType,
        f: BuiltinFcn,
    ) -> Self {
        Self {
            name,
            operands,
            result,
            variadic: false,
            deterministic: true,
            lenient: false,
            implementation: BuiltinImpl::Pure(f),
        }
    }

    pub fn contextual(
        name: &'static str,
        operands: &'static [OperandType],
        result: OperandType,
        f: ContextualFcn,
    ) -> Self {
        Self {
            implementation: BuiltinImpl::Contextual(f),
            ..Self::pure(name, operands, result, |_| Ok(None))
        }
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn nondeterministic(mut self) -> Self {
        self.deterministic = false;
        self
    }

    pub fn lenient(mut self) -> Self {
        self.lenient = true;
        self
    }

    /// Number of input operands, `None` for variadic built-ins.
    pub fn arity(&self) -> Option<usize> {
        match self.variadic {
            true => None,
            false => Some(self.operands.len()),
        }
    }

    pub fn needs_context(&self) -> bool {
        matches!(self.implementation, BuiltinImpl::Contextual(_))
    }

    /// Defensive signature check of ground operands.
    pub fn check_operands(&self, args: &[Term]) -> crate::Result<()> {
        if let Some(arity) = self.arity() {
            if args.len() != arity {
                return Err(EvalError::TypeMismatch {
                    name: self.name.to_string(),
                    position: args.len().min(arity),
                    expected: format!("{arity} operand(s)"),
                    found: format!("{} operand(s)", args.len()),
                });
            }
        }
        for (idx, (ty, arg)) in self.operands.iter().zip(args).enumerate() {
            if !ty.accepts(arg) {
                return Err(EvalError::TypeMismatch {
                    name: self.name.to_string(),
                    position: idx + 1,
                    expected: ty.to_string(),
                    found: arg.type_name().to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn invoke(&self, ctx: &BuiltinContext<'_>, args: &[Term]) -> Result<Option<Term>> {
        match self.implementation {
            BuiltinImpl::Pure(f) => f(args),
            BuiltinImpl::Contextual(f) => f(ctx, args),
        }
    }
}

/// What a contextual built-in may see of the running query.
pub struct BuiltinContext<'a> {
    pub name: &'a str,

    /// Wall-clock time at which the query started, in nanoseconds since the epoch.
    pub time_ns: i128,
    pub depth: usize,
    pub tracer: Option<&'a dyn Tracer>,
    pub printer: &'a dyn PrintSink,
}

#[derive(Debug, Clone)]
pub struct BuiltinRegistry {
    builtins: Rc<HashMap<&'static str, BuiltinDescriptor>>,
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        RegistryBuilder::with_core().build()
    }
}

impl BuiltinRegistry {
    /// Registry without any built-ins.
    pub fn empty() -> Self {
        RegistryBuilder::new().build()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::with_core()
    }

    pub fn get(&self, name: &str) -> Option<&BuiltinDescriptor> {
        self.builtins.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.builtins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builtins.is_empty()
    }

    /// Names in sorted order.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.builtins.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    builtins: HashMap<&'static str, BuiltinDescriptor>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_core() -> Self {
        let mut m = Self::new();

        comparison::register(&mut m);
        numbers::register(&mut m);
        aggregates::register(&mut m);
        sets::register(&mut m);
        arrays::register(&mut m);
        strings::register(&mut m);
        objects::register(&mut m);
        types::register(&mut m);
        encoding::register(&mut m);
        debugging::register(&mut m);
        tracing::register(&mut m);
        time::register(&mut m);
        membership::register(&mut m);

        m
    }

    /// Adds or replaces a built-in.
    pub fn insert(&mut self, descriptor: BuiltinDescriptor) -> &mut Self {
        self.builtins.insert(descriptor.name, descriptor);
        self
    }

    pub fn remove(&mut self, name: &str) -> &mut Self {
        self.builtins.remove(name);
        self
    }

    pub fn build(self) -> BuiltinRegistry {
        BuiltinRegistry {
            builtins: Rc::new(self.builtins),
        }
    }
}
