// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::Body;
use crate::number::Number;
use crate::Rc;

use core::fmt;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// A term of the policy language.
///
/// Ground values (`Null` through `Set`) are what documents are made of. `Var`, `Ref`, `Call`
/// and the comprehension variants only occur inside rule bodies and queries.
///
/// The derived ordering is the language's total order: variants rank in declaration order and
/// compare recursively within a variant. `Hash` agrees with it because `Number` hashes by
/// numeric value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    Null,
    Bool(bool),
    Number(Number),
    String(Rc<str>),
    Array(Rc<Vec<Term>>),
    Object(Rc<BTreeMap<Term, Term>>),
    Set(Rc<BTreeSet<Term>>),

    Var(Rc<str>),

    /// Head (a `Var`, or any term for refs like `f(x)[0]`) followed by the path operands.
    Ref(Rc<Vec<Term>>),

    /// Operator ref followed by the operands.
    Call(Rc<Vec<Term>>),

    ArrayCompr(Rc<Comprehension>),
    SetCompr(Rc<Comprehension>),
    ObjectCompr(Rc<Comprehension>),
}

/// Capture term(s) and body of a comprehension. `key` is only present for object comprehensions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Comprehension {
    pub key: Option<Term>,
    pub term: Term,
    pub body: Body,
}

impl Term {
    pub fn new_object() -> Term {
        Term::from(BTreeMap::new())
    }

    pub fn new_set() -> Term {
        Term::from(BTreeSet::new())
    }

    pub fn new_array() -> Term {
        Term::from(vec![])
    }

    pub fn var(name: &str) -> Term {
        Term::Var(name.into())
    }

    pub fn from_json_str(json: &str) -> Result<Term> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_str(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Term::Null | Term::Bool(_) | Term::Number(_) | Term::String(_)
        )
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }

    /// True if the term is a plain value: no variables, refs or calls anywhere inside.
    /// Comprehensions capture their own scope and count as ground.
    pub fn is_ground(&self) -> bool {
        match self {
            Term::Null | Term::Bool(_) | Term::Number(_) | Term::String(_) => true,
            Term::Array(a) => a.iter().all(Term::is_ground),
            Term::Object(o) => o.iter().all(|(k, v)| k.is_ground() && v.is_ground()),
            Term::Set(s) => s.iter().all(Term::is_ground),
            Term::Var(_) | Term::Ref(_) | Term::Call(_) => false,
            Term::ArrayCompr(_) | Term::SetCompr(_) | Term::ObjectCompr(_) => true,
        }
    }

    /// True if evaluating the term requires more than substituting variables.
    pub fn needs_eval(&self) -> bool {
        match self {
            Term::Ref(_) | Term::Call(_) => true,
            Term::ArrayCompr(_) | Term::SetCompr(_) | Term::ObjectCompr(_) => true,
            Term::Array(a) => a.iter().any(Term::needs_eval),
            Term::Object(o) => o.iter().any(|(k, v)| k.needs_eval() || v.needs_eval()),
            Term::Set(s) => s.iter().any(Term::needs_eval),
            _ => false,
        }
    }

    /// Collects the variables occurring in the term. Variables inside comprehension bodies
    /// are local to the comprehension and are not visited.
    pub fn collect_vars(&self, vars: &mut BTreeSet<Rc<str>>) {
        match self {
            Term::Var(v) => {
                vars.insert(v.clone());
            }
            Term::Array(items) | Term::Ref(items) | Term::Call(items) => {
                items.iter().for_each(|t| t.collect_vars(vars))
            }
            Term::Set(s) => s.iter().for_each(|t| t.collect_vars(vars)),
            Term::Object(o) => o.iter().for_each(|(k, v)| {
                k.collect_vars(vars);
                v.collect_vars(vars);
            }),
            _ => (),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Term::Null => "null",
            Term::Bool(_) => "boolean",
            Term::Number(_) => "number",
            Term::String(_) => "string",
            Term::Array(_) => "array",
            Term::Object(_) => "object",
            Term::Set(_) => "set",
            Term::Var(_) => "var",
            Term::Ref(_) => "ref",
            Term::Call(_) => "call",
            Term::ArrayCompr(_) => "arraycomprehension",
            Term::SetCompr(_) => "setcomprehension",
            Term::ObjectCompr(_) => "objectcomprehension",
        }
    }

    /// Looks up `key` in a collection: array index, object key or set member.
    pub fn lookup(&self, key: &Term) -> Option<&Term> {
        match (self, key) {
            (Term::Object(o), _) => o.get(key),
            (Term::Set(s), _) => s.get(key),
            (Term::Array(a), Term::Number(n)) => n.as_usize().and_then(|i| a.get(i)),
            _ => None,
        }
    }

    /// Looks up a path of string keys through nested objects.
    pub fn lookup_path<'a>(&'a self, path: &[Rc<str>]) -> Option<&'a Term> {
        path.iter().try_fold(self, |t, key| match t {
            Term::Object(o) => o.get(&Term::String(key.clone())),
            _ => None,
        })
    }

    /// Returns a mutable slot at `paths`, creating empty objects along the way.
    pub fn make_or_get_value_mut<'a>(&'a mut self, paths: &[Rc<str>]) -> Result<&'a mut Term> {
        let Some((first, rest)) = paths.split_first() else {
            return Ok(self);
        };
        match self {
            Term::Object(map) => {
                let slot = Rc::make_mut(map)
                    .entry(Term::String(first.clone()))
                    .or_insert_with(Term::new_object);
                slot.make_or_get_value_mut(rest)
            }
            _ => bail!("cannot set `{first}` on {}", self.type_name()),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Term::Bool(b) => Ok(*b),
            _ => Err(anyhow!("not a bool")),
        }
    }

    pub fn as_string(&self) -> Result<&Rc<str>> {
        match self {
            Term::String(s) => Ok(s),
            _ => Err(anyhow!("not a string")),
        }
    }

    pub fn as_number(&self) -> Result<&Number> {
        match self {
            Term::Number(n) => Ok(n),
            _ => Err(anyhow!("not a number")),
        }
    }

    pub fn as_array(&self) -> Result<&Vec<Term>> {
        match self {
            Term::Array(a) => Ok(a),
            _ => Err(anyhow!("not an array")),
        }
    }

    pub fn as_set(&self) -> Result<&BTreeSet<Term>> {
        match self {
            Term::Set(s) => Ok(s),
            _ => Err(anyhow!("not a set")),
        }
    }

    pub fn as_object(&self) -> Result<&BTreeMap<Term, Term>> {
        match self {
            Term::Object(o) => Ok(o),
            _ => Err(anyhow!("not an object")),
        }
    }
}

impl From<bool> for Term {
    fn from(b: bool) -> Self {
        Term::Bool(b)
    }
}

impl From<&str> for Term {
    fn from(s: &str) -> Self {
        Term::String(s.into())
    }
}

impl From<String> for Term {
    fn from(s: String) -> Self {
        Term::String(s.into())
    }
}

impl From<Rc<str>> for Term {
    fn from(s: Rc<str>) -> Self {
        Term::String(s)
    }
}

impl From<Number> for Term {
    fn from(n: Number) -> Self {
        Term::Number(n)
    }
}

impl From<u64> for Term {
    fn from(n: u64) -> Self {
        Term::Number(Number::from(n))
    }
}

impl From<i64> for Term {
    fn from(n: i64) -> Self {
        Term::Number(Number::from(n))
    }
}

impl From<i32> for Term {
    fn from(n: i32) -> Self {
        Term::Number(Number::from(n))
    }
}

impl From<usize> for Term {
    fn from(n: usize) -> Self {
        Term::Number(Number::from(n))
    }
}

impl From<f64> for Term {
    fn from(n: f64) -> Self {
        Term::Number(Number::from(n))
    }
}

impl From<Vec<Term>> for Term {
    fn from(a: Vec<Term>) -> Self {
        Term::Array(Rc::new(a))
    }
}

impl From<BTreeSet<Term>> for Term {
    fn from(s: BTreeSet<Term>) -> Self {
        Term::Set(Rc::new(s))
    }
}

impl From<BTreeMap<Term, Term>> for Term {
    fn from(m: BTreeMap<Term, Term>) -> Self {
        Term::Object(Rc::new(m))
    }
}

impl Serialize for Term {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::Error;
        match self {
            Term::Null => serializer.serialize_none(),
            Term::Bool(b) => serializer.serialize_bool(*b),
            Term::String(s) => serializer.serialize_str(s.as_ref()),
            Term::Number(n) => n.serialize(serializer),
            Term::Array(a) => a.serialize(serializer),
            Term::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields.iter() {
                    match k {
                        Term::String(_) => map.serialize_entry(k, v)?,
                        _ => {
                            let key_str = serde_json::to_string(k).map_err(Error::custom)?;
                            map.serialize_entry(&key_str, v)?
                        }
                    }
                }
                map.end()
            }

            // sets serialize as arrays
            Term::Set(s) => s.serialize(serializer),

            _ => Err(Error::custom(format!(
                "cannot serialize non-ground term `{self}`"
            ))),
        }
    }
}

struct TermVisitor;

impl<'de> Visitor<'de> for TermVisitor {
    type Value = Term;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a json value")
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Term::Null)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Term::Null)
    }

    fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Term::Bool(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Term::from(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Term::from(v))
    }

    fn visit_u128<E>(self, v: u128) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Term::Number(Number::from(v)))
    }

    fn visit_i128<E>(self, v: i128) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Term::Number(Number::from(v)))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Term::from(v))
    }

    fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Term::from(s))
    }

    fn visit_string<E>(self, s: String) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Term::from(s))
    }

    fn visit_seq<V>(self, mut visitor: V) -> Result<Self::Value, V::Error>
    where
        V: SeqAccess<'de>,
    {
        let mut arr = vec![];
        while let Some(v) = visitor.next_element()? {
            arr.push(v);
        }
        Ok(Term::from(arr))
    }

    fn visit_map<V>(self, mut visitor: V) -> Result<Self::Value, V::Error>
    where
        V: MapAccess<'de>,
    {
        let Some((key, value)) = visitor.next_entry::<Term, Term>()? else {
            return Ok(Term::new_object());
        };

        // serde_json's arbitrary precision numbers arrive as a single-entry map.
        if let (Term::String(k), Term::String(v)) = (&key, &value) {
            if k.as_ref() == "$serde_json::private::Number" {
                return Number::from_str(v)
                    .map(Term::Number)
                    .map_err(|_| de::Error::custom("failed to read big number"));
            }
        }

        let mut map = BTreeMap::new();
        map.insert(key, value);
        while let Some((key, value)) = visitor.next_entry()? {
            map.insert(key, value);
        }
        Ok(Term::from(map))
    }
}

impl<'de> Deserialize<'de> for Term {
    fn deserialize<D>(deserializer: D) -> Result<Term, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(TermVisitor)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: impl Iterator<Item = String>) -> fmt::Result {
    let items: Vec<String> = items.collect();
    f.write_str(&items.join(", "))
}

fn write_body(f: &mut fmt::Formatter<'_>, body: &Body) -> fmt::Result {
    let exprs: Vec<String> = body.iter().map(|e| e.to_string()).collect();
    f.write_str(&exprs.join("; "))
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Null => f.write_str("null"),
            Term::Bool(b) => write!(f, "{b}"),
            Term::Number(n) => write!(f, "{n}"),
            Term::String(s) => match serde_json::to_string(s.as_ref()) {
                Ok(s) => f.write_str(&s),
                Err(_) => Err(fmt::Error),
            },
            Term::Array(a) => {
                f.write_str("[")?;
                write_joined(f, a.iter().map(|t| t.to_string()))?;
                f.write_str("]")
            }
            Term::Object(o) => {
                f.write_str("{")?;
                write_joined(f, o.iter().map(|(k, v)| format!("{k}: {v}")))?;
                f.write_str("}")
            }
            Term::Set(s) if s.is_empty() => f.write_str("set()"),
            Term::Set(s) => {
                f.write_str("{")?;
                write_joined(f, s.iter().map(|t| t.to_string()))?;
                f.write_str("}")
            }
            Term::Var(v) => f.write_str(v),
            Term::Ref(r) => {
                let Some((head, path)) = r.split_first() else {
                    return Ok(());
                };
                write!(f, "{head}")?;
                for p in path {
                    match p {
                        Term::String(s) if is_identifier(s) => write!(f, ".{s}")?,
                        _ => write!(f, "[{p}]")?,
                    }
                }
                Ok(())
            }
            Term::Call(c) => {
                let Some((op, args)) = c.split_first() else {
                    return Ok(());
                };
                write!(f, "{op}(")?;
                write_joined(f, args.iter().map(|t| t.to_string()))?;
                f.write_str(")")
            }
            Term::ArrayCompr(c) => {
                write!(f, "[{} | ", c.term)?;
                write_body(f, &c.body)?;
                f.write_str("]")
            }
            Term::SetCompr(c) => {
                write!(f, "{{{} | ", c.term)?;
                write_body(f, &c.body)?;
                f.write_str("}")
            }
            Term::ObjectCompr(c) => {
                match &c.key {
                    Some(k) => write!(f, "{{{k}: {} | ", c.term)?,
                    None => write!(f, "{{{} | ", c.term)?,
                }
                write_body(f, &c.body)?;
                f.write_str("}")
            }
        }
    }
}
