// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use std::collections::{BTreeMap, BTreeSet};
use std::env;

use anyhow::{bail, Result};
use rego_topdown::*;
use serde::Deserialize;
use test_generator::test_resources;
use walkdir::WalkDir;

const UNDEFINED: &str = "#undefined";

// Items of a special encoding `{tag: [...]}`.
fn encoded<'a>(v: &'a Term, tag: &str) -> Option<&'a Vec<Term>> {
    match v {
        Term::Object(fields) if fields.len() == 1 => match v.lookup(&Term::from(tag)) {
            Some(Term::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

// Process test value specified in yaml to interpret special encodings.
pub fn process_value(v: &Term) -> Result<Term> {
    // Handle set encoded as an object
    // set! :
    //   - item1
    //   - item2
    if let Some(items) = encoded(v, "set!") {
        let mut set = BTreeSet::new();
        for item in items {
            set.insert(process_value(item)?);
        }
        return Ok(Term::from(set));
    }

    // Handle object with non-string keys:
    // object! :
    //  - key: ...
    //    value: ...
    if let Some(items) = encoded(v, "object!") {
        let mut object = BTreeMap::new();
        for item in items {
            let (Some(key), Some(value)) =
                (item.lookup(&Term::from("key")), item.lookup(&Term::from("value")))
            else {
                bail!("object! items need key and value: {item}");
            };
            object.insert(process_value(key)?, process_value(value)?);
        }
        return Ok(Term::from(object));
    }

    match v {
        Term::Array(items) => Ok(Term::from(
            items.iter().map(process_value).collect::<Result<Vec<_>>>()?,
        )),

        Term::Object(fields) => {
            let mut object = BTreeMap::new();
            for (key, value) in fields.iter() {
                object.insert(process_value(key)?, process_value(value)?);
            }
            Ok(Term::from(object))
        }

        Term::Set(_) => bail!("unexpected set in value read from yaml"),

        _ => Ok(v.clone()),
    }
}

fn is_undefined(v: &Term) -> bool {
    matches!(v, Term::String(s) if s.as_ref() == UNDEFINED)
}

fn display_values(c: &Term, e: &Term) -> String {
    format!("\nleft  = {c}\nright = {e}\n")
}

// Helper function to match computed and expected values.
// On mismatch, prints the failing sub-value instead of the whole value.
fn match_values_impl(computed: &Term, expected: &Term) -> Result<()> {
    match (computed, expected) {
        (Term::Array(a1), Term::Array(a2)) => {
            if a1.len() != a2.len() {
                bail!(
                    "array length mismatch: {} != {}{}",
                    a1.len(),
                    a2.len(),
                    display_values(computed, expected)
                );
            }
            for (v1, v2) in a1.iter().zip(a2.iter()) {
                match_values_impl(v1, v2)?;
            }
            Ok(())
        }

        (Term::Set(s1), Term::Set(s2)) => {
            if s1.len() != s2.len() {
                bail!(
                    "set length mismatch: {} != {}{}",
                    s1.len(),
                    s2.len(),
                    display_values(computed, expected)
                );
            }
            for (v1, v2) in s1.iter().zip(s2.iter()) {
                match_values_impl(v1, v2)?;
            }
            Ok(())
        }

        (Term::Object(o1), Term::Object(o2)) => {
            if o1.len() != o2.len() {
                bail!(
                    "object length mismatch: {} != {}{}",
                    o1.len(),
                    o2.len(),
                    display_values(computed, expected)
                );
            }
            for ((k1, v1), (k2, v2)) in o1.iter().zip(o2.iter()) {
                match_values_impl(k1, k2)?;
                match_values_impl(v1, v2)?;
            }
            Ok(())
        }

        (Term::Number(n1), Term::Number(n2)) if n1 == n2 => Ok(()),
        (Term::String(s1), Term::String(s2)) if s1 == s2 => Ok(()),
        (Term::Bool(b1), Term::Bool(b2)) if b1 == b2 => Ok(()),
        (Term::Null, Term::Null) => Ok(()),

        _ => bail!("value mismatch: {}", display_values(computed, expected)),
    }
}

fn match_values(computed: &Term, expected: &Term) -> Result<()> {
    match match_values_impl(computed, expected) {
        Ok(()) => Ok(()),
        Err(e) => bail!("\nmismatch in {}{}", display_values(computed, expected), e),
    }
}

// Expected bindings of one solution. Variables marked `#undefined` must not be bound.
fn expected_bindings(expected: &Term) -> Result<Term> {
    let mut bindings = BTreeMap::new();
    for (k, v) in expected.as_object()?.iter() {
        if !is_undefined(v) {
            bindings.insert(k.clone(), process_value(v)?);
        }
    }
    Ok(Term::from(bindings))
}

pub fn check_output(computed: &QueryResults, expected: &[Term]) -> Result<()> {
    if computed.result.len() != expected.len() {
        bail!(
            "the number of computed results ({}) and expected results ({}) is not equal\n{}",
            computed.result.len(),
            expected.len(),
            serde_json::to_string_pretty(computed)?
        );
    }

    for (computed, expected) in computed.result.iter().zip(expected) {
        let bindings: BTreeMap<Term, Term> = computed
            .bindings
            .iter()
            .map(|(k, v)| (Term::from(k.clone()), v.clone()))
            .collect();
        match_values(&Term::from(bindings), &expected_bindings(expected)?)?;
    }
    Ok(())
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct TestCase {
    note: String,
    data: Option<Term>,
    input: Option<Term>,

    // Modules and the query are in the compiler's JSON AST format.
    #[serde(default)]
    modules: Vec<serde_json::Value>,
    query: Option<serde_json::Value>,

    // Alternatively, the document at a `data` path is evaluated.
    rule: Option<String>,

    want_result: Option<Vec<Term>>,
    want_value: Option<Term>,
    want_prints: Option<Vec<String>>,
    strict_builtin_errors: Option<bool>,
    skip: Option<bool>,
    error: Option<String>,
}

#[derive(Deserialize, Debug)]
struct YamlTest {
    cases: Vec<TestCase>,
}

fn eval_case(case: &TestCase, printer: std::sync::Arc<BufferedPrinter>) -> Result<()> {
    let mut engine = Engine::new();
    engine.set_printer(Some(printer));
    if let Some(strict) = case.strict_builtin_errors {
        engine.set_strict_builtin_errors(strict);
    }
    for m in &case.modules {
        engine.add_module_json(&serde_json::to_string(m)?)?;
    }
    if let Some(data) = &case.data {
        engine.add_data(data.clone())?;
    }
    if let Some(input) = &case.input {
        engine.set_input(input.clone());
    }

    match (&case.query, &case.rule) {
        (Some(query), None) => {
            let results = engine.eval_query_json(&serde_json::to_string(query)?)?;
            match &case.want_result {
                Some(expected) => check_output(&results, expected),
                None => bail!("eval succeeded and did not produce any errors"),
            }
        }
        (None, Some(path)) => {
            let value = engine.eval_rule(path)?;
            let expected = match &case.want_value {
                Some(v) if is_undefined(v) => None,
                Some(v) => Some(process_value(v)?),
                None => bail!("eval succeeded and did not produce any errors"),
            };
            match (&value, &expected) {
                (Some(c), Some(e)) => match_values(c, e),
                (None, None) => Ok(()),
                _ => bail!(
                    "value mismatch: computed {}, expected {}",
                    value.as_ref().map_or(UNDEFINED.to_string(), |v| v.to_string()),
                    expected.as_ref().map_or(UNDEFINED.to_string(), |v| v.to_string())
                ),
            }
        }
        _ => bail!("exactly one of query and rule must be specified"),
    }
}

fn yaml_test_impl(file: &str) -> Result<()> {
    let yaml_str = std::fs::read_to_string(file)?;
    let test: YamlTest = serde_yaml::from_str(&yaml_str)?;

    println!("running {file}");

    for case in test.cases {
        print!("case {} ", case.note);
        if case.skip == Some(true) {
            println!("skipped");
            continue;
        }

        match (&case.want_result, &case.want_value, &case.error) {
            (Some(_), None, None) | (None, Some(_), None) | (None, None, Some(_)) => (),
            _ => panic!("exactly one of want_result, want_value or error must be specified"),
        }

        let printer = std::sync::Arc::new(BufferedPrinter::new());
        match eval_case(&case, printer.clone()) {
            Ok(()) => (),
            Err(actual) => match &case.error {
                Some(expected) => {
                    let actual = actual.to_string();
                    if !actual.contains(expected) {
                        bail!("Error message\n`{actual}\n`\ndoes not contain `{expected}`");
                    }
                    println!("{actual}");
                }
                _ => return Err(actual),
            },
        }

        if let Some(prints) = &case.want_prints {
            if &printer.lines() != prints {
                bail!("printed {:?}, expected {prints:?}", printer.lines());
            }
        }

        println!("passed");
    }

    Ok(())
}

fn yaml_test(file: &str) -> Result<()> {
    match yaml_test_impl(file) {
        Ok(_) => Ok(()),
        Err(e) => {
            // If Err is returned, it doesn't always get printed by cargo test.
            // Therefore, panic with the error.
            panic!("{}", e);
        }
    }
}

#[test_resources("tests/interpreter/cases/**/*.yaml")]
fn run(path: &str) {
    let _ = env_logger::builder().is_test(true).try_init();
    yaml_test(path).unwrap()
}

// Guards against cases that test_resources missed at build time.
#[test]
fn all_cases() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut count = 0;
    for entry in WalkDir::new("tests/interpreter/cases")
        .sort_by_file_name()
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path().to_string_lossy().to_string();
        if path.ends_with(".yaml") {
            yaml_test(&path)?;
            count += 1;
        }
    }
    assert!(count > 0, "no yaml cases found");
    Ok(())
}

#[test]
#[ignore = "intended for running a single yaml file"]
fn one_yaml() -> Result<()> {
    let mut file = String::default();
    for a in env::args() {
        if a.ends_with(".yaml") {
            file = a;
        }
    }

    if file.is_empty() {
        bail!("missing <yaml-file>");
    }

    yaml_test(file.as_str())
}
