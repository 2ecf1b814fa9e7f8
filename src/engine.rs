// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::{query_from_json_str, Body, Module};
use crate::builtins::BuiltinRegistry;
use crate::compiled_policy::CompiledPolicy;
use crate::error::{EvalError, Result};
use crate::interpreter::{Flow, Interpreter, QueryResult, QueryResults};
use crate::store::{InMemoryStore, Store, Transaction};
use crate::term::Term;
use crate::trace::{PrintSink, Tracer};
use crate::utils::cancel::CancellationToken;
use crate::utils::limits::ExecutionTimerConfig;
use crate::utils::path::parse_data_path;
use crate::Rc;

use core::fmt;

use log::{debug, info};

/// Knobs for a query. Shared by every evaluation an [`Engine`] runs.
#[derive(Clone)]
pub struct EvalOptions {
    /// Abort the query when a built-in fails. When false the failing call is undefined.
    pub strict_builtin_errors: bool,

    /// Wall-clock budget. Falls back to the process-wide config when unset.
    pub execution_timer: Option<ExecutionTimerConfig>,
    pub cancellation: Option<CancellationToken>,
    pub tracer: Option<Rc<dyn Tracer>>,

    /// Destination of `print`. Standard error when unset.
    pub printer: Option<Rc<dyn PrintSink>>,
    pub index_rules: bool,

    /// Limit on nested rule and function evaluations.
    pub max_depth: usize,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            strict_builtin_errors: true,
            execution_timer: None,
            cancellation: None,
            tracer: None,
            printer: None,
            index_rules: true,
            max_depth: 4096,
        }
    }
}

impl fmt::Debug for EvalOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalOptions")
            .field("strict_builtin_errors", &self.strict_builtin_errors)
            .field("execution_timer", &self.execution_timer)
            .field("cancellation", &self.cancellation)
            .field("tracer", &self.tracer.is_some())
            .field("printer", &self.printer.is_some())
            .field("index_rules", &self.index_rules)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

/// The policy evaluation engine.
///
/// Holds the modules, the input, the base documents and the options. Modules are compiled on
/// the first evaluation after they change.
pub struct Engine {
    modules: Vec<Rc<Module>>,
    policy: Option<CompiledPolicy>,
    input: Option<Term>,
    store: Rc<dyn Store>,

    // Set while the engine owns its store; `add_data` writes here.
    data: Option<Rc<InMemoryStore>>,
    builtins: BuiltinRegistry,
    options: EvalOptions,
}

/// Create a default engine.
impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        let data = Rc::new(InMemoryStore::new());
        Self {
            modules: vec![],
            policy: None,
            input: None,
            store: data.clone(),
            data: Some(data),
            builtins: BuiltinRegistry::default(),
            options: EvalOptions::default(),
        }
    }

    pub fn add_module(&mut self, module: Module) {
        self.modules.push(Rc::new(module));
        // if modules change, the policy needs to be compiled again
        self.policy = None;
    }

    /// Adds a module given in the compiler's JSON AST format.
    pub fn add_module_json(&mut self, json: &str) -> Result<()> {
        self.add_module(Module::from_json_str(json)?);
        Ok(())
    }

    pub fn get_modules(&self) -> &[Rc<Module>] {
        &self.modules
    }

    pub fn set_input(&mut self, input: Term) {
        info!("input: {input}");
        self.input = Some(input);
    }

    pub fn set_input_json(&mut self, json: &str) -> Result<()> {
        self.set_input(Term::from_json_str(json)?);
        Ok(())
    }

    pub fn clear_input(&mut self) {
        self.input = None;
    }

    /// Replaces the base documents with an empty in-memory store.
    pub fn clear_data(&mut self) {
        let data = Rc::new(InMemoryStore::new());
        self.store = data.clone();
        self.data = Some(data);
    }

    /// Merges `data` into the base documents of the engine's in-memory store.
    pub fn add_data(&mut self, data: Term) -> Result<()> {
        match &self.data {
            Some(store) => store.merge(data),
            None => Err(EvalError::Storage(
                "add_data is not available with an external store".to_string(),
            )),
        }
    }

    pub fn add_data_json(&mut self, json: &str) -> Result<()> {
        self.add_data(Term::from_json_str(json)?)
    }

    /// Reads base documents from `store` instead of the engine's own in-memory store.
    pub fn set_store(&mut self, store: Rc<dyn Store>) {
        self.store = store;
        self.data = None;
    }

    pub fn set_builtins(&mut self, builtins: BuiltinRegistry) {
        self.builtins = builtins;
    }

    pub fn get_builtins(&self) -> &BuiltinRegistry {
        &self.builtins
    }

    pub fn set_strict_builtin_errors(&mut self, b: bool) {
        self.options.strict_builtin_errors = b;
    }

    pub fn set_execution_timer_config(&mut self, config: Option<ExecutionTimerConfig>) {
        self.options.execution_timer = config;
    }

    pub fn set_cancellation_token(&mut self, token: Option<CancellationToken>) {
        self.options.cancellation = token;
    }

    pub fn set_tracer(&mut self, tracer: Option<Rc<dyn Tracer>>) {
        self.options.tracer = tracer;
    }

    pub fn set_printer(&mut self, printer: Option<Rc<dyn PrintSink>>) {
        self.options.printer = printer;
    }

    pub fn set_index_rules(&mut self, b: bool) {
        self.options.index_rules = b;
    }

    pub fn set_max_depth(&mut self, depth: usize) {
        self.options.max_depth = depth;
    }

    pub fn get_options(&self) -> &EvalOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: EvalOptions) {
        self.options = options;
    }

    /// Compiles the modules if they changed since the last compilation.
    pub fn compile(&mut self) -> Result<CompiledPolicy> {
        if let Some(policy) = &self.policy {
            return Ok(policy.clone());
        }
        let policy = CompiledPolicy::compile(&self.modules)?;
        debug!(
            "compiled {} modules into {} rule sets (generation {})",
            self.modules.len(),
            policy.rule_sets().count(),
            policy.generation()
        );
        self.policy = Some(policy.clone());
        Ok(policy)
    }

    /// Evaluates `query` and collects all solutions.
    pub fn eval_query(&mut self, query: &Body) -> Result<QueryResults> {
        let mut results = QueryResults::default();
        self.eval_query_with(query, None, |r| {
            results.result.push(r.clone());
            Flow::Continue
        })?;
        Ok(results)
    }

    /// Evaluates a query given in the compiler's JSON AST format (a list of expressions).
    pub fn eval_query_json(&mut self, query: &str) -> Result<QueryResults> {
        let body = query_from_json_str(query)?;
        self.eval_query(&body)
    }

    /// Evaluates `query`, handing each solution to `on_result` as soon as it is found.
    /// Returning [`Flow::Stop`] ends the search.
    ///
    /// Reads go through `txn` if given. Otherwise a read transaction is opened for the
    /// duration of the query.
    pub fn eval_query_with(
        &mut self,
        query: &Body,
        txn: Option<&Transaction>,
        mut on_result: impl FnMut(&QueryResult) -> Flow,
    ) -> Result<()> {
        let policy = self.compile()?;
        self.with_transaction(txn, |engine, txn| {
            let mut interpreter = Interpreter::new(
                &policy,
                engine.store.as_ref(),
                txn,
                &engine.builtins,
                &engine.options,
                engine.input.clone(),
            );
            interpreter.eval_query(query, &mut |r| on_result(&r))
        })
    }

    /// Value of the document at `path`, e.g. `data.authz.allow`. Undefined documents are
    /// `None`.
    pub fn eval_rule(&mut self, path: &str) -> Result<Option<Term>> {
        let path = parse_data_path(path)
            .ok_or_else(|| EvalError::Internal(format!("not a data path: `{path}`")))?;
        let policy = self.compile()?;
        self.with_transaction(None, |engine, txn| {
            let mut interpreter = Interpreter::new(
                &policy,
                engine.store.as_ref(),
                txn,
                &engine.builtins,
                &engine.options,
                engine.input.clone(),
            );
            interpreter.eval_rule(&path)
        })
    }

    fn with_transaction<T>(
        &self,
        txn: Option<&Transaction>,
        f: impl FnOnce(&Self, &Transaction) -> Result<T>,
    ) -> Result<T> {
        match txn {
            Some(txn) => f(self, txn),
            None => {
                let txn = self.store.begin_read()?;
                let r = f(self, &txn);
                self.store.end(txn);
                r
            }
        }
    }
}
