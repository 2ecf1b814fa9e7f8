// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use rego_topdown::ast::builder::*;
use rego_topdown::ast::{Expr, Module};
use rego_topdown::utils::limits::{set_time_source, TimeSource};
use rego_topdown::*;

use core::num::NonZeroU32;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use std::sync::{Arc, Mutex};

use anyhow::Result;

fn engine_with(modules: Vec<Module>) -> Engine {
    let mut engine = Engine::new();
    for m in modules {
        engine.add_module(m);
    }
    engine
}

fn input(json: &str) -> Term {
    Term::from_json_str(json).unwrap()
}

/// Solutions rendered as `name=value` lists, in the order they were found.
fn solutions(engine: &mut Engine, query: Vec<Expr>) -> Result<Vec<String>> {
    let results = engine.eval_query(&body(query))?;
    Ok(results
        .result
        .iter()
        .map(|r| {
            r.bindings
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect())
}

fn authz() -> Module {
    module(
        "authz",
        vec![rule("allow")
            .value(boolean(true))
            .body(vec![call_expr(
                "equal",
                vec![reference("input.user"), string("admin")],
            )])
            .build()],
    )
}

#[test]
fn allow_for_admin_only() -> Result<()> {
    let mut engine = engine_with(vec![authz()]);
    let query = vec![eq(var("x"), reference("data.authz.allow"))];

    engine.set_input(input(r#"{"user": "admin"}"#));
    assert_eq!(solutions(&mut engine, query.clone())?, vec!["x=true"]);

    engine.set_input(input(r#"{"user": "guest"}"#));
    assert!(solutions(&mut engine, query)?.is_empty());
    assert_eq!(engine.eval_rule("data.authz.allow")?, None);
    Ok(())
}

#[test]
fn solutions_follow_backtracking_order() -> Result<()> {
    let mut engine = Engine::new();
    engine.set_input(input(r#"{"xs": [2, 1], "ys": ["b", "a"]}"#));
    let r = solutions(
        &mut engine,
        vec![
            eq(var("x"), ref_with("input.xs", vec![var("_")])),
            eq(var("y"), ref_with("input.ys", vec![var("_")])),
        ],
    )?;
    assert_eq!(
        r,
        vec![r#"x=2,y="b""#, r#"x=2,y="a""#, r#"x=1,y="b""#, r#"x=1,y="a""#]
    );
    Ok(())
}

#[test]
fn negation_leaves_no_bindings() -> Result<()> {
    let m = module(
        "t",
        vec![rule("deny")
            .value(boolean(true))
            .body(vec![
                eq(var("u"), reference("input.user")),
                call_expr("equal", vec![var("u"), string("mallory")]),
            ])
            .build()],
    );
    let mut engine = engine_with(vec![m]);
    engine.set_input(input(r#"{"user": "alice"}"#));

    let r = solutions(
        &mut engine,
        vec![
            eq(var("x"), num(1)),
            not(expr(reference("data.t.deny"))),
            not(call_expr("equal", vec![var("x"), num(2)])),
        ],
    )?;
    assert_eq!(r, vec!["x=1"]);

    engine.set_input(input(r#"{"user": "mallory"}"#));
    let r = solutions(
        &mut engine,
        vec![eq(var("x"), num(1)), not(expr(reference("data.t.deny")))],
    )?;
    assert!(r.is_empty());
    Ok(())
}

#[test]
fn partial_object_key_conflict() {
    let m = module(
        "t",
        vec![
            rule("p").key(string("a")).value(num(1)).build(),
            rule("p").key(string("a")).value(num(2)).build(),
            rule("p").key(string("b")).value(num(2)).build(),
        ],
    );
    let mut engine = engine_with(vec![m]);
    let err = engine.eval_rule("data.t.p").unwrap_err();
    assert!(
        matches!(&err, EvalError::Conflict { path, .. } if path == "data.t.p"),
        "{err}"
    );
}

#[test]
fn complete_rule_conflict() {
    let m = module(
        "t",
        vec![
            rule("p").value(num(1)).build(),
            rule("p").value(num(2)).build(),
        ],
    );
    let mut engine = engine_with(vec![m]);
    assert!(matches!(
        engine.eval_rule("data.t.p"),
        Err(EvalError::Conflict { .. })
    ));
}

#[test]
fn partial_sets_are_idempotent() -> Result<()> {
    let m = module(
        "t",
        vec![
            rule("q").key(string("a")).build(),
            rule("q").key(string("a")).build(),
            rule("q")
                .key(var("x"))
                .body(vec![some_in(
                    None,
                    var("x"),
                    array(vec![string("b"), string("a"), string("b")]),
                )])
                .build(),
        ],
    );
    let mut engine = engine_with(vec![m]);
    assert_eq!(
        engine.eval_rule("data.t.q")?,
        Some(set(vec![string("a"), string("b")]))
    );
    Ok(())
}

#[test]
fn mutual_recursion_is_reported() {
    let m = module(
        "t",
        vec![
            rule("p")
                .value(boolean(true))
                .body(vec![expr(reference("data.t.q"))])
                .build(),
            rule("q")
                .value(boolean(true))
                .body(vec![expr(reference("data.t.p"))])
                .build(),
        ],
    );
    let mut engine = engine_with(vec![m]);
    match engine.eval_rule("data.t.p") {
        Err(EvalError::Recursion { chain }) => {
            assert_eq!(chain, vec!["data.t.p", "data.t.q", "data.t.p"]);
        }
        r => panic!("expected recursion error, got {r:?}"),
    }
}

#[test]
fn else_chain_and_default() -> Result<()> {
    let m = module(
        "t",
        vec![
            rule("level")
                .value(string("high"))
                .body(vec![call_expr("gt", vec![reference("input.n"), num(10)])])
                .or_else(
                    Some(string("mid")),
                    vec![call_expr("gt", vec![reference("input.n"), num(5)])],
                )
                .build(),
            rule("level").default().value(string("low")).build(),
        ],
    );
    let mut engine = engine_with(vec![m]);
    for (n, want) in [("11", "high"), ("6", "mid"), ("1", "low")] {
        engine.set_input(input(&format!(r#"{{"n": {n}}}"#)));
        assert_eq!(engine.eval_rule("data.t.level")?, Some(string(want)), "n={n}");
    }
    Ok(())
}

// Linear congruential generator so failures reproduce.
struct Lcg(u64);

impl Lcg {
    fn below(&mut self, n: u64) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) % n
    }
}

const ROLES: [&str; 3] = ["admin", "dev", "ops"];

fn random_condition(rng: &mut Lcg) -> Expr {
    let role = string(ROLES[rng.below(3) as usize]);
    let level = num(rng.below(3));
    match rng.below(7) {
        0 => eq(reference("input.role"), role),
        1 => call_expr("equal", vec![level, reference("input.level")]),
        2 => call_expr("internal.member_2", vec![role, reference("input.tags")]),
        3 => call_expr("gt", vec![reference("input.level"), level]),
        4 => not(eq(reference("input.role"), role)),
        5 => eq(
            reference("data.config.mode"),
            string(["on", "off"][rng.below(2) as usize]),
        ),
        _ => eq(ref_with("input.tags", vec![var("_")]), role),
    }
}

fn random_input(rng: &mut Lcg) -> Term {
    let mut fields = vec![];
    if rng.below(4) != 0 {
        fields.push((string("role"), string(ROLES[rng.below(3) as usize])));
    }
    fields.push((string("level"), num(rng.below(3))));
    let tags = ROLES
        .iter()
        .filter(|_| rng.below(2) == 0)
        .map(|r| string(r))
        .collect();
    fields.push((string("tags"), array(tags)));
    object(fields)
}

#[test]
fn rule_index_agrees_with_full_scan() -> Result<()> {
    let mut rng = Lcg(0x5eed);
    for round in 0..50 {
        let rules = (0..12)
            .map(|i| {
                let conditions = (0..=rng.below(3)).map(|_| random_condition(&mut rng)).collect();
                rule("hits").key(num(i)).body(conditions).build()
            })
            .collect();
        let mut engine = engine_with(vec![module("gen", rules)]);
        let mode = ["on", "off"][rng.below(2) as usize];
        engine.add_data_json(&format!(r#"{{"config": {{"mode": "{mode}"}}}}"#))?;

        for _ in 0..10 {
            engine.set_input(random_input(&mut rng));

            engine.set_index_rules(true);
            let indexed = engine.eval_rule("data.gen.hits")?;
            engine.set_index_rules(false);
            let scanned = engine.eval_rule("data.gen.hits")?;
            assert_eq!(indexed, scanned, "round {round}");
        }
    }
    Ok(())
}

#[test]
fn with_overrides_are_scoped() -> Result<()> {
    let m = module(
        "t",
        vec![
            rule("p")
                .value(boolean(true))
                .body(vec![call_expr("equal", vec![reference("input.x"), num(1)])])
                .build(),
            rule("f")
                .args(vec![var("a")])
                .value(var("a"))
                .build(),
        ],
    );
    let mut engine = engine_with(vec![m]);
    engine.set_input(input(r#"{"x": 2}"#));

    let r = solutions(
        &mut engine,
        vec![
            with(
                eq(var("a"), reference("data.t.p")),
                "input.x",
                num(1),
            ),
            not(expr(reference("data.t.p"))),
            with(
                call_expr("data.t.f", vec![num(5), var("b")]),
                "data.t.f",
                string("mocked"),
            ),
            call_expr("data.t.f", vec![num(5), var("c")]),
            with(
                call_expr("count", vec![array(vec![]), var("n")]),
                "count",
                num(7),
            ),
        ],
    )?;
    assert_eq!(r, vec![r#"a=true,b="mocked",c=5,n=7"#]);
    Ok(())
}

#[test]
fn with_data_patches_base_documents() -> Result<()> {
    let mut engine = Engine::new();
    engine.add_data_json(r#"{"roles": {"alice": "admin", "bob": "dev"}}"#)?;
    let r = solutions(
        &mut engine,
        vec![
            with(
                eq(var("x"), reference("data.roles.bob")),
                "data.roles.bob",
                string("ops"),
            ),
            eq(var("y"), reference("data.roles.alice")),
            eq(var("z"), reference("data.roles.bob")),
        ],
    )?;
    assert_eq!(r, vec![r#"x="ops",y="admin",z="dev""#]);
    Ok(())
}

#[test]
fn data_refs_merge_rules_and_base_documents() -> Result<()> {
    let m = module(
        "app",
        vec![rule("allow")
            .value(boolean(true))
            .body(vec![eq(reference("data.app.owner"), reference("input.user"))])
            .build()],
    );
    let mut engine = engine_with(vec![m]);
    engine.add_data_json(r#"{"app": {"owner": "alice"}}"#)?;
    engine.set_input(input(r#"{"user": "alice"}"#));

    assert_eq!(
        engine.eval_rule("data.app")?,
        Some(input(r#"{"owner": "alice", "allow": true}"#))
    );

    // Conflicting writes are rejected by the store.
    assert!(matches!(
        engine.add_data_json(r#"{"app": {"owner": "bob"}}"#),
        Err(EvalError::Storage(_))
    ));
    Ok(())
}

#[test]
fn external_store_is_read_through_transaction() -> Result<()> {
    let store = Arc::new(InMemoryStore::from_value(input(r#"{"limit": 3}"#))?);
    let mut engine = Engine::new();
    engine.set_store(store.clone());
    assert!(engine.add_data_json("{}").is_err());

    let txn = store.begin_read()?;
    // Writes after the transaction began are invisible to it.
    store.write(&[PathSegment::from("limit")], num(4))?;

    let mut seen = vec![];
    engine.eval_query_with(
        &body(vec![eq(var("l"), reference("data.limit"))]),
        Some(&txn),
        |r| {
            seen.push(r.bindings.get("l").cloned());
            Flow::Continue
        },
    )?;
    store.end(txn);
    assert_eq!(seen, vec![Some(num(3))]);
    assert_eq!(engine.eval_rule("data.limit")?, Some(num(4)));
    Ok(())
}

// Records every path the evaluator reads or enumerates.
struct CountingStore {
    inner: InMemoryStore,
    calls: Mutex<Vec<String>>,
}

impl CountingStore {
    fn log(&self, op: &str, path: &[PathSegment]) {
        let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        self.calls
            .lock()
            .unwrap()
            .push(format!("{op} {}", path.join(".")));
    }

    fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

impl Store for CountingStore {
    fn begin_read(&self) -> rego_topdown::Result<Transaction> {
        self.inner.begin_read()
    }

    fn read(&self, txn: &Transaction, path: &[PathSegment]) -> rego_topdown::Result<Option<Term>> {
        self.log("read", path);
        self.inner.read(txn, path)
    }

    fn list_child_keys(
        &self,
        txn: &Transaction,
        path: &[PathSegment],
    ) -> rego_topdown::Result<Option<Vec<Term>>> {
        self.log("list", path);
        self.inner.list_child_keys(txn, path)
    }
}

#[test]
fn base_documents_are_enumerated_through_child_keys() -> Result<()> {
    let store = Arc::new(CountingStore {
        inner: InMemoryStore::from_value(object(vec![
            (string("roles"), set(vec![string("admin"), string("dev")])),
            (
                string("users"),
                input(r#"{"alice": {"role": "admin", "bio": "x"}, "bob": {"role": "dev"}}"#),
            ),
        ]))?,
        calls: Default::default(),
    });
    let mut engine = engine_with(vec![authz()]);
    engine.set_store(store.clone());

    let r = solutions(
        &mut engine,
        vec![eq(
            var("r"),
            ref_with("data.users", vec![var("u"), string("role")]),
        )],
    )?;
    assert_eq!(r, vec![r#"r="admin",u="alice""#, r#"r="dev",u="bob""#]);
    assert_eq!(
        store.take_calls(),
        vec!["list users", "read users.alice.role", "read users.bob.role"]
    );

    let r = solutions(
        &mut engine,
        vec![eq(var("r"), ref_with("data.roles", vec![var("x")]))],
    )?;
    assert_eq!(r, vec![r#"r="admin",x="admin""#, r#"r="dev",x="dev""#]);
    assert_eq!(store.take_calls()[0], "list roles");

    let r = solutions(
        &mut engine,
        vec![eq(var("y"), ref_with("data.roles", vec![string("dev")]))],
    )?;
    assert_eq!(r, vec![r#"y="dev""#]);
    let r = solutions(
        &mut engine,
        vec![eq(var("y"), ref_with("data.roles", vec![string("ops")]))],
    )?;
    assert!(r.is_empty());
    Ok(())
}

#[test]
fn callback_can_stop_the_search() -> Result<()> {
    let mut engine = Engine::new();
    let mut seen = vec![];
    engine.eval_query_with(
        &body(vec![some_in(
            None,
            var("x"),
            array(vec![num(1), num(2), num(3)]),
        )]),
        None,
        |r| {
            seen.push(r.bindings["x"].clone());
            match seen.len() {
                2 => Flow::Stop,
                _ => Flow::Continue,
            }
        },
    )?;
    assert_eq!(seen, vec![num(1), num(2)]);
    Ok(())
}

#[test]
fn cancellation_aborts_query() {
    let token = CancellationToken::new();
    token.cancel();

    let mut engine = Engine::new();
    engine.set_cancellation_token(Some(token.clone()));
    let err = engine
        .eval_query(&body(vec![eq(var("x"), num(1))]))
        .unwrap_err();
    assert_eq!(err, EvalError::Cancelled);
    assert!(err.is_cancellation());

    token.reset();
    assert!(engine.eval_query(&body(vec![eq(var("x"), num(1))])).is_ok());
}

// Serializes tests that swap the process-wide time source.
static LIMITS_TEST_LOCK: Mutex<()> = Mutex::new(());

// Every clock read advances by one millisecond.
struct SteppingClock(AtomicU64);

impl TimeSource for SteppingClock {
    fn now(&self) -> Option<Duration> {
        Some(Duration::from_millis(self.0.fetch_add(1, Ordering::SeqCst)))
    }
}

static CLOCK: SteppingClock = SteppingClock(AtomicU64::new(0));

#[test]
fn time_limit_aborts_query() {
    let _lock = LIMITS_TEST_LOCK.lock().unwrap();
    let mut engine = Engine::new();
    engine.set_input(Term::from((0..1000u64).map(Term::from).collect::<Vec<_>>()));
    engine.set_execution_timer_config(Some(ExecutionTimerConfig {
        limit: Duration::from_millis(50),
        check_interval: NonZeroU32::new(1).unwrap(),
    }));

    let clock: &'static dyn TimeSource = &CLOCK;
    let previous = set_time_source(Some(clock));
    let r = engine.eval_query(&body(vec![
        eq(var("x"), ref_with("input", vec![var("_")])),
        call_expr("lt", vec![var("x"), num(0)]),
    ]));
    set_time_source(previous);

    match r {
        Err(EvalError::Timeout(_)) => (),
        r => panic!("expected timeout, got {r:?}"),
    }
}

#[test]
fn tracer_records_evaluation_steps() -> Result<()> {
    let tracer = Arc::new(BufferedTracer::new());
    let mut engine = Engine::new();
    engine.set_tracer(Some(tracer.clone()));

    engine.eval_query(&body(vec![eq(var("x"), num(1)), eq(var("x"), num(2))]))?;
    let ops: Vec<_> = tracer.events().iter().map(|e| e.op()).collect();
    assert_eq!(ops, vec!["Enter", "Eval", "Eval", "Fail"]);
    assert_eq!(
        tracer.events()[3],
        TraceEvent::Fail {
            depth: 0,
            expr: "x = 2".to_string()
        }
    );

    tracer.clear();
    engine.eval_query(&body(vec![eq(var("x"), num(1))]))?;
    assert_eq!(tracer.pretty(), "Enter query\nEval x = 1\nExit query\n");
    Ok(())
}

#[test]
fn print_reports_undefined_operands() -> Result<()> {
    let printer = Arc::new(BufferedPrinter::new());
    let mut engine = Engine::new();
    engine.set_printer(Some(printer.clone()));
    engine.set_input(input(r#"{"user": "alice"}"#));

    let r = engine.eval_query(&body(vec![call_expr(
        "print",
        vec![
            string("user:"),
            reference("input.user"),
            reference("input.missing"),
        ],
    )]))?;
    assert_eq!(r.result.len(), 1);
    assert_eq!(printer.lines(), vec![r#"user: alice <undefined>"#]);
    Ok(())
}

#[test]
fn nondeterministic_builtins_are_stable_within_a_query() -> Result<()> {
    let mut engine = Engine::new();
    let r = engine.eval_query(&body(vec![
        call_expr("time.now_ns", vec![var("a")]),
        call_expr("time.now_ns", vec![var("b")]),
        call_expr("rand.intn", vec![string("k"), num(1_000_000), var("c")]),
        call_expr("rand.intn", vec![string("k"), num(1_000_000), var("d")]),
    ]))?;
    let b = &r.result[0].bindings;
    assert_eq!(b["a"], b["b"]);
    assert_eq!(b["c"], b["d"]);
    Ok(())
}

#[test]
fn builtin_errors_follow_strictness() -> Result<()> {
    let mut engine = Engine::new();
    let query = body(vec![call_expr("div", vec![num(1), num(0), var("x")])]);

    assert!(matches!(
        engine.eval_query(&query),
        Err(EvalError::Builtin { name, .. }) if name == "div"
    ));

    engine.set_strict_builtin_errors(false);
    assert!(engine.eval_query(&query)?.result.is_empty());

    // Operand types are checked regardless of strictness.
    let query = body(vec![call_expr("plus", vec![num(1), string("a"), var("x")])]);
    assert!(matches!(
        engine.eval_query(&query),
        Err(EvalError::TypeMismatch { position: 2, .. })
    ));
    Ok(())
}

#[test]
fn custom_builtins() -> Result<()> {
    fn shout(args: &[Term]) -> anyhow::Result<Option<Term>> {
        Ok(Some(Term::from(args[0].as_string()?.to_uppercase())))
    }

    let mut builder = BuiltinRegistry::builder();
    builder.insert(BuiltinDescriptor::pure(
        "shout",
        &[OperandType::String],
        OperandType::String,
        shout,
    ));
    let mut engine = Engine::new();
    engine.set_builtins(builder.build());
    assert!(engine.get_builtins().contains("count"));

    let r = solutions(&mut engine, vec![call_expr("shout", vec![string("hi"), var("s")])])?;
    assert_eq!(r, vec![r#"s="HI""#]);
    Ok(())
}

#[test]
fn depth_limit() {
    let m = module(
        "t",
        vec![rule("f")
            .args(vec![var("n")])
            .value(var("n"))
            .build()],
    );
    let mut engine = engine_with(vec![m]);
    engine.set_max_depth(0);
    assert!(matches!(
        engine.eval_query(&body(vec![call_expr("data.t.f", vec![num(1), var("x")])])),
        Err(EvalError::Internal(_))
    ));
}

#[test]
fn json_entry_points() -> Result<()> {
    let mut engine = Engine::new();
    engine.add_module_json(
        r#"{
          "package": {"path": [{"type": "var", "value": "data"}, {"type": "string", "value": "j"}]},
          "rules": [{
            "head": {"name": "names", "key": {"type": "var", "value": "n"}},
            "body": [{
              "terms": [
                {"type": "ref", "value": [{"type": "var", "value": "eq"}]},
                {"type": "var", "value": "n"},
                {"type": "ref", "value": [
                  {"type": "var", "value": "input"},
                  {"type": "string", "value": "users"},
                  {"type": "var", "value": "$0"},
                  {"type": "string", "value": "name"}
                ]}
              ]
            }]
          }]
        }"#,
    )?;
    engine.set_input_json(r#"{"users": [{"name": "b"}, {"name": "a"}]}"#)?;
    assert_eq!(engine.get_modules().len(), 1);

    let r = engine.eval_query_json(
        r#"[{"terms": [
              {"type": "ref", "value": [{"type": "var", "value": "eq"}]},
              {"type": "var", "value": "x"},
              {"type": "ref", "value": [{"type": "var", "value": "data"}, {"type": "string", "value": "j"}, {"type": "string", "value": "names"}]}
            ]}]"#,
    )?;
    assert_eq!(
        serde_json::to_string(&r)?,
        r#"{"result":[{"bindings":{"x":["a","b"]}}]}"#
    );

    engine.clear_input();
    assert_eq!(engine.eval_rule("data.j.names")?, Some(Term::new_set()));
    Ok(())
}
