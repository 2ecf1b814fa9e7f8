// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Reader for the compiler's JSON AST. Terms are encoded as `{"type": ..., "value": ...}`;
// expressions carry their operands under `terms`.

use super::*;
use crate::error::{EvalError, Result};
use crate::number::Number;
use crate::term::{Comprehension, Term};
use crate::Rc;

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde_json::{Map, Value as Json};

fn invalid(msg: impl Into<String>) -> EvalError {
    EvalError::Compile(msg.into())
}

fn field<'a>(obj: &'a Map<String, Json>, name: &str) -> Option<&'a Json> {
    obj.get(name).filter(|v| !v.is_null())
}

fn as_object<'a>(v: &'a Json, what: &str) -> Result<&'a Map<String, Json>> {
    v.as_object()
        .ok_or_else(|| invalid(format!("{what} must be a json object. Got `{v}`")))
}

fn as_array<'a>(v: &'a Json, what: &str) -> Result<&'a Vec<Json>> {
    v.as_array()
        .ok_or_else(|| invalid(format!("{what} must be a json array. Got `{v}`")))
}

fn terms(v: &Json, what: &str) -> Result<Vec<Term>> {
    as_array(v, what)?.iter().map(term).collect()
}

pub fn term(v: &Json) -> Result<Term> {
    let obj = as_object(v, "term")?;
    let ty = obj
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| invalid(format!("term without type: `{v}`")))?;
    let value = obj.get("value").unwrap_or(&Json::Null);

    Ok(match ty {
        "null" => Term::Null,
        "boolean" => Term::Bool(
            value
                .as_bool()
                .ok_or_else(|| invalid(format!("invalid boolean `{value}`")))?,
        ),
        "number" => {
            let text = match value {
                Json::Number(n) => n.to_string(),
                Json::String(s) => s.clone(),
                _ => return Err(invalid(format!("invalid number `{value}`"))),
            };
            Term::Number(
                Number::from_str(&text)
                    .map_err(|_| invalid(format!("invalid number `{text}`")))?,
            )
        }
        "string" => Term::from(
            value
                .as_str()
                .ok_or_else(|| invalid(format!("invalid string `{value}`")))?,
        ),
        "var" => Term::Var(
            value
                .as_str()
                .ok_or_else(|| invalid(format!("invalid var `{value}`")))?
                .into(),
        ),
        "ref" => {
            let parts = terms(value, "ref")?;
            if parts.is_empty() {
                return Err(invalid("empty ref"));
            }
            Term::Ref(Rc::new(parts))
        }
        "array" => Term::from(terms(value, "array")?),
        "set" => Term::from(terms(value, "set")?.into_iter().collect::<BTreeSet<_>>()),
        "object" => {
            let mut map = BTreeMap::new();
            for pair in as_array(value, "object")? {
                match as_array(pair, "object item")?.as_slice() {
                    [k, v] => {
                        map.insert(term(k)?, term(v)?);
                    }
                    _ => return Err(invalid(format!("invalid object item `{pair}`"))),
                }
            }
            Term::from(map)
        }
        "call" => {
            let parts = terms(value, "call")?;
            if parts.is_empty() {
                return Err(invalid("empty call"));
            }
            Term::Call(Rc::new(parts))
        }
        "arraycomprehension" | "setcomprehension" => {
            let c = as_object(value, ty)?;
            let compr = Comprehension {
                key: None,
                term: term(c.get("term").ok_or_else(|| invalid("missing term"))?)?,
                body: body(c.get("body").ok_or_else(|| invalid("missing body"))?)?,
            };
            match ty {
                "arraycomprehension" => Term::ArrayCompr(Rc::new(compr)),
                _ => Term::SetCompr(Rc::new(compr)),
            }
        }
        "objectcomprehension" => {
            let c = as_object(value, ty)?;
            Term::ObjectCompr(Rc::new(Comprehension {
                key: Some(term(c.get("key").ok_or_else(|| invalid("missing key"))?)?),
                term: term(c.get("value").ok_or_else(|| invalid("missing value"))?)?,
                body: body(c.get("body").ok_or_else(|| invalid("missing body"))?)?,
            }))
        }
        _ => return Err(invalid(format!("unknown term type `{ty}`"))),
    })
}

fn with(v: &Json) -> Result<With> {
    let obj = as_object(v, "with")?;
    Ok(With {
        target: term(field(obj, "target").ok_or_else(|| invalid("with without target"))?)?,
        value: term(field(obj, "value").ok_or_else(|| invalid("with without value"))?)?,
    })
}

fn expr(v: &Json, position: usize) -> Result<Expr> {
    let obj = as_object(v, "expr")?;
    let operands = obj
        .get("terms")
        .ok_or_else(|| invalid(format!("expr without terms: `{v}`")))?;

    let kind = match operands {
        Json::Array(parts) => {
            let parts = parts.iter().map(term).collect::<Result<Vec<_>>>()?;
            if parts.is_empty() {
                return Err(invalid("empty call expression"));
            }
            ExprKind::Term(Term::Call(Rc::new(parts)))
        }
        Json::Object(o) if o.contains_key("symbols") => {
            ExprKind::SomeDecl(terms(&o["symbols"], "symbols")?)
        }
        Json::Object(o) if o.contains_key("domain") => ExprKind::Every(Rc::new(Every {
            key: field(o, "key").map(term).transpose()?,
            value: term(field(o, "value").ok_or_else(|| invalid("every without value"))?)?,
            domain: term(&o["domain"])?,
            body: body(o.get("body").ok_or_else(|| invalid("every without body"))?)?,
        })),
        _ => ExprKind::Term(term(operands)?),
    };

    let with = match field(obj, "with") {
        Some(w) => as_array(w, "with")?
            .iter()
            .map(with)
            .collect::<Result<Vec<_>>>()?,
        None => vec![],
    };

    Ok(Expr {
        kind,
        negated: field(obj, "negated").and_then(Json::as_bool).unwrap_or(false),
        with,
        index: field(obj, "index")
            .and_then(Json::as_u64)
            .and_then(|i| usize::try_from(i).ok())
            .unwrap_or(position),
    })
}

pub fn body(v: &Json) -> Result<Body> {
    Ok(Rc::new(
        as_array(v, "body")?
            .iter()
            .enumerate()
            .map(|(idx, e)| expr(e, idx))
            .collect::<Result<Vec<_>>>()?,
    ))
}

fn head(v: &Json) -> Result<Head> {
    let obj = as_object(v, "head")?;
    let reference = match field(obj, "ref") {
        Some(r) => terms(r, "head ref")?,
        None => {
            let name = field(obj, "name")
                .and_then(Json::as_str)
                .ok_or_else(|| invalid(format!("rule head without name or ref: `{v}`")))?;
            vec![Term::var(name)]
        }
    };
    if reference.is_empty() {
        return Err(invalid("empty rule head ref"));
    }

    Ok(Head {
        reference,
        key: field(obj, "key").map(term).transpose()?,
        value: field(obj, "value").map(term).transpose()?,
        args: match field(obj, "args") {
            Some(a) => terms(a, "args")?,
            None => vec![],
        },
        assign: field(obj, "assign").and_then(Json::as_bool).unwrap_or(false),
    })
}

fn rule(v: &Json) -> Result<Rule> {
    let obj = as_object(v, "rule")?;
    Ok(Rule {
        default: field(obj, "default").and_then(Json::as_bool).unwrap_or(false),
        head: head(field(obj, "head").ok_or_else(|| invalid("rule without head"))?)?,
        body: match field(obj, "body") {
            Some(b) => body(b)?,
            None => Rc::new(vec![]),
        },
        else_rule: field(obj, "else").map(rule).transpose()?.map(Rc::new),
    })
}

fn package_path(v: &Json) -> Result<Vec<Rc<str>>> {
    let obj = as_object(v, "package")?;
    let path = terms(
        field(obj, "path").ok_or_else(|| invalid("package without path"))?,
        "package path",
    )?;
    let mut segments = path.into_iter();
    match segments.next() {
        Some(Term::Var(v)) if v.as_ref() == "data" => (),
        other => {
            return Err(invalid(format!(
                "package path must start with data. Got `{other:?}`"
            )))
        }
    }
    segments
        .map(|s| match s {
            Term::String(s) => Ok(s),
            _ => Err(invalid(format!("invalid package path segment `{s}`"))),
        })
        .collect()
}

pub fn module_from_json_str(json: &str) -> Result<Module> {
    let v: Json = serde_json::from_str(json)?;
    let obj = as_object(&v, "module")?;
    let package = Package {
        path: package_path(field(obj, "package").ok_or_else(|| invalid("module without package"))?)?,
    };
    let rules = match field(obj, "rules") {
        Some(r) => as_array(r, "rules")?
            .iter()
            .map(|r| rule(r).map(Rc::new))
            .collect::<Result<Vec<_>>>()?,
        None => vec![],
    };
    Ok(Module { package, rules })
}

pub fn body_from_json_str(json: &str) -> Result<Body> {
    let v: Json = serde_json::from_str(json)?;
    body(&v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_partial_object_rule_with_else_free_body() {
        let m = module_from_json_str(
            r#"{
              "package": {"path": [{"type": "var", "value": "data"}, {"type": "string", "value": "authz"}]},
              "rules": [{
                "head": {
                  "name": "p",
                  "key": {"type": "var", "value": "k"},
                  "value": {"type": "number", "value": 1}
                },
                "body": [{
                  "index": 0,
                  "terms": [
                    {"type": "ref", "value": [{"type": "var", "value": "eq"}]},
                    {"type": "var", "value": "k"},
                    {"type": "string", "value": "a"}
                  ]
                }]
              }]
            }"#,
        )
        .unwrap();

        assert_eq!(m.package.path, vec![Rc::<str>::from("authz")]);
        let r = &m.rules[0];
        assert_eq!(r.head.doc_kind(), DocKind::PartialObject);
        assert_eq!(r.body[0].to_string(), r#"k = "a""#);
    }

    #[test]
    fn reads_some_every_and_with() {
        let b = body_from_json_str(
            r#"[
              {"index": 0, "terms": {"symbols": [{"type": "call", "value": [
                  {"type": "ref", "value": [{"type": "var", "value": "internal"}, {"type": "string", "value": "member_2"}]},
                  {"type": "var", "value": "x"},
                  {"type": "ref", "value": [{"type": "var", "value": "input"}, {"type": "string", "value": "xs"}]}
              ]}]}},
              {"index": 1, "terms": {"key": null, "value": {"type": "var", "value": "y"},
                 "domain": {"type": "array", "value": [{"type": "number", "value": 1}]},
                 "body": [{"index": 0, "terms": {"type": "boolean", "value": true}}]}},
              {"index": 2, "negated": true, "terms": {"type": "var", "value": "x"},
               "with": [{"target": {"type": "ref", "value": [{"type": "var", "value": "input"}]},
                         "value": {"type": "object", "value": [[{"type": "string", "value": "a"}, {"type": "null"}]]}}]}
            ]"#,
        )
        .unwrap();

        assert_eq!(b[0].to_string(), "some x in input.xs");
        assert_eq!(b[1].to_string(), "every y in [1] { true }");
        assert_eq!(b[2].to_string(), r#"not x with input as {"a": null}"#);
    }

    #[test]
    fn rejects_unknown_term_types() {
        let err = body_from_json_str(r#"[{"terms": {"type": "bogus", "value": 1}}]"#).unwrap_err();
        assert!(matches!(err, EvalError::Compile(_)));
    }
}
