// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::utils::{
    ensure_args_count, ensure_array, ensure_integer, ensure_numeric, ensure_string,
    ensure_string_collection,
};
use crate::builtins::{BuiltinDescriptor, OperandType, RegistryBuilder};
use crate::number::Number;
use crate::term::Term;

use anyhow::{bail, Result};

const STR: &[OperandType] = &[OperandType::String];
const STR2: &[OperandType] = &[OperandType::String, OperandType::String];

pub fn register(m: &mut RegistryBuilder) {
    m.insert(BuiltinDescriptor::pure(
        "concat",
        &[OperandType::String, OperandType::ITERABLE],
        OperandType::String,
        concat,
    ));
    m.insert(BuiltinDescriptor::pure("contains", STR2, OperandType::Boolean, contains));
    m.insert(BuiltinDescriptor::pure("endswith", STR2, OperandType::Boolean, endswith));
    m.insert(BuiltinDescriptor::pure(
        "format_int",
        &[OperandType::Number, OperandType::Number],
        OperandType::String,
        format_int,
    ));
    m.insert(BuiltinDescriptor::pure("indexof", STR2, OperandType::Number, indexof));
    m.insert(BuiltinDescriptor::pure("lower", STR, OperandType::String, lower));
    m.insert(BuiltinDescriptor::pure(
        "replace",
        &[OperandType::String, OperandType::String, OperandType::String],
        OperandType::String,
        replace,
    ));
    m.insert(BuiltinDescriptor::pure("split", STR2, OperandType::Array, split));
    m.insert(BuiltinDescriptor::pure(
        "sprintf",
        &[OperandType::String, OperandType::Array],
        OperandType::String,
        sprintf,
    ));
    m.insert(BuiltinDescriptor::pure("startswith", STR2, OperandType::Boolean, startswith));
    m.insert(BuiltinDescriptor::pure(
        "substring",
        &[OperandType::String, OperandType::Number, OperandType::Number],
        OperandType::String,
        substring,
    ));
    m.insert(BuiltinDescriptor::pure("trim", STR2, OperandType::String, trim));
    m.insert(BuiltinDescriptor::pure("trim_space", STR, OperandType::String, trim_space));
    m.insert(BuiltinDescriptor::pure("upper", STR, OperandType::String, upper));
}

fn concat(args: &[Term]) -> Result<Option<Term>> {
    let name = "concat";
    ensure_args_count(name, args, 2)?;
    let delimiter = ensure_string(name, &args[0])?;
    let collection = ensure_string_collection(name, &args[1])?;
    Ok(Some(Term::from(collection.join(&delimiter))))
}

fn contains(args: &[Term]) -> Result<Option<Term>> {
    let name = "contains";
    ensure_args_count(name, args, 2)?;
    let s1 = ensure_string(name, &args[0])?;
    let s2 = ensure_string(name, &args[1])?;
    Ok(Some(Term::Bool(s1.contains(s2.as_ref()))))
}

fn endswith(args: &[Term]) -> Result<Option<Term>> {
    let name = "endswith";
    ensure_args_count(name, args, 2)?;
    let s1 = ensure_string(name, &args[0])?;
    let s2 = ensure_string(name, &args[1])?;
    Ok(Some(Term::Bool(s1.ends_with(s2.as_ref()))))
}

fn startswith(args: &[Term]) -> Result<Option<Term>> {
    let name = "startswith";
    ensure_args_count(name, args, 2)?;
    let s1 = ensure_string(name, &args[0])?;
    let s2 = ensure_string(name, &args[1])?;
    Ok(Some(Term::Bool(s1.starts_with(s2.as_ref()))))
}

fn format_int(args: &[Term]) -> Result<Option<Term>> {
    let name = "format_int";
    ensure_args_count(name, args, 2)?;
    let n = ensure_numeric(name, &args[0])?;
    let radix = match ensure_integer(name, &args[1])? {
        b @ (2 | 8 | 10 | 16) => b as u32,
        b => bail!("`{name}` base must be one of 2, 8, 10, 16. Got {b}"),
    };
    match n.floor().format_radix(radix) {
        Some(s) => Ok(Some(Term::from(s))),
        None => bail!("`{name}` cannot format `{n}`"),
    }
}

/// Index counted in characters, -1 if absent.
fn indexof(args: &[Term]) -> Result<Option<Term>> {
    let name = "indexof";
    ensure_args_count(name, args, 2)?;
    let s = ensure_string(name, &args[0])?;
    let needle = ensure_string(name, &args[1])?;
    Ok(Some(match s.find(needle.as_ref()) {
        Some(byte_pos) => Term::from(s[..byte_pos].chars().count()),
        None => Term::from(-1i64),
    }))
}

fn lower(args: &[Term]) -> Result<Option<Term>> {
    ensure_args_count("lower", args, 1)?;
    Ok(Some(Term::from(ensure_string("lower", &args[0])?.to_lowercase())))
}

fn upper(args: &[Term]) -> Result<Option<Term>> {
    ensure_args_count("upper", args, 1)?;
    Ok(Some(Term::from(ensure_string("upper", &args[0])?.to_uppercase())))
}

fn replace(args: &[Term]) -> Result<Option<Term>> {
    let name = "replace";
    ensure_args_count(name, args, 3)?;
    let s = ensure_string(name, &args[0])?;
    let old = ensure_string(name, &args[1])?;
    let new = ensure_string(name, &args[2])?;
    Ok(Some(Term::from(s.replace(old.as_ref(), &new))))
}

fn split(args: &[Term]) -> Result<Option<Term>> {
    let name = "split";
    ensure_args_count(name, args, 2)?;
    let s = ensure_string(name, &args[0])?;
    let delimiter = ensure_string(name, &args[1])?;
    let parts: Vec<Term> = match delimiter.is_empty() {
        true => s.chars().map(|c| Term::from(c.to_string())).collect(),
        false => s.split(delimiter.as_ref()).map(Term::from).collect(),
    };
    Ok(Some(Term::from(parts)))
}

/// Characters `[start, start + length)`. A negative length runs to the end of the string.
fn substring(args: &[Term]) -> Result<Option<Term>> {
    let name = "substring";
    ensure_args_count(name, args, 3)?;
    let s = ensure_string(name, &args[0])?;
    let start = ensure_integer(name, &args[1])?;
    let length = ensure_integer(name, &args[2])?;

    let Ok(start) = usize::try_from(start) else {
        bail!("`{name}` negative offset {start}");
    };
    let chars = s.chars().skip(start);
    let result: String = match usize::try_from(length) {
        Ok(length) => chars.take(length).collect(),
        Err(_) => chars.collect(),
    };
    Ok(Some(Term::from(result)))
}

fn trim(args: &[Term]) -> Result<Option<Term>> {
    let name = "trim";
    ensure_args_count(name, args, 2)?;
    let s = ensure_string(name, &args[0])?;
    let cutset = ensure_string(name, &args[1])?;
    Ok(Some(Term::from(s.trim_matches(|c| cutset.contains(c)))))
}

fn trim_space(args: &[Term]) -> Result<Option<Term>> {
    ensure_args_count("trim_space", args, 1)?;
    Ok(Some(Term::from(ensure_string("trim_space", &args[0])?.trim())))
}

struct Directive {
    left_align: bool,
    zero_pad: bool,
    plus: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

impl Directive {
    fn pad(&self, s: String) -> String {
        let len = s.chars().count();
        let Some(width) = self.width.filter(|w| *w > len) else {
            return s;
        };
        let fill = width - len;
        if self.left_align {
            s + &" ".repeat(fill)
        } else if self.zero_pad {
            match s.strip_prefix('-') {
                Some(rest) => format!("-{}{rest}", "0".repeat(fill)),
                None => format!("{}{s}", "0".repeat(fill)),
            }
        } else {
            " ".repeat(fill) + &s
        }
    }
}

fn format_value(verb: char, directive: &Directive, arg: &Term) -> String {
    let sign = |n: &Number, s: String| match directive.plus && *n >= Number::from(0u64) {
        true => format!("+{s}"),
        false => s,
    };
    match (verb, arg) {
        ('s' | 'v', Term::String(s)) => s.to_string(),
        ('v', _) => arg.to_string(),
        ('q', Term::String(_)) => arg.to_string(),
        ('t', Term::Bool(b)) => b.to_string(),
        ('d', Term::Number(n)) if n.is_integer() => sign(n, n.format_decimal()),
        ('f' | 'e' | 'g', Term::Number(n)) => {
            let prec = directive.precision.unwrap_or(6);
            let s = match verb {
                'f' => format!("{:.prec$}", n.as_f64()),
                'e' => format!("{:.prec$e}", n.as_f64()),
                _ => match directive.precision {
                    Some(p) => format!("{:.p$}", n.as_f64()),
                    None => n.format_decimal(),
                },
            };
            sign(n, s)
        }
        ('x' | 'X' | 'o' | 'b', Term::Number(n)) if n.is_integer() => {
            let radix = match verb {
                'o' => 8,
                'b' => 2,
                _ => 16,
            };
            let s = n.format_radix(radix).unwrap_or_default();
            match verb {
                'X' => s.to_uppercase(),
                _ => s,
            }
        }
        ('x' | 'X', Term::String(s)) => {
            let hex: String = s.bytes().map(|b| format!("{b:02x}")).collect();
            match verb {
                'X' => hex.to_uppercase(),
                _ => hex,
            }
        }
        _ => format!("%!{verb}({}={arg})", arg.type_name()),
    }
}

fn sprintf(args: &[Term]) -> Result<Option<Term>> {
    let name = "sprintf";
    ensure_args_count(name, args, 2)?;
    let fmt = ensure_string(name, &args[0])?;
    let operands = ensure_array(name, &args[1])?;
    let mut operands = operands.iter();

    let mut out = String::new();
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut directive = Directive {
            left_align: false,
            zero_pad: false,
            plus: false,
            width: None,
            precision: None,
        };
        while let Some(&f) = chars.peek() {
            match f {
                '-' => directive.left_align = true,
                '0' => directive.zero_pad = true,
                '+' => directive.plus = true,
                _ => break,
            }
            chars.next();
        }
        let number = |chars: &mut std::iter::Peekable<std::str::Chars<'_>>| {
            let mut n: Option<usize> = None;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                n = Some(n.unwrap_or(0).saturating_mul(10).saturating_add(d as usize));
                chars.next();
            }
            n
        };
        directive.width = number(&mut chars);
        if chars.peek() == Some(&'.') {
            chars.next();
            directive.precision = Some(number(&mut chars).unwrap_or(0));
        }

        match chars.next() {
            Some('%') => out.push('%'),
            Some(verb) => match operands.next() {
                Some(arg) => out.push_str(&directive.pad(format_value(verb, &directive, arg))),
                None => out.push_str(&format!("%!{verb}(MISSING)")),
            },
            None => out.push_str("%!(NOVERB)"),
        }
    }

    let extra: Vec<String> = operands.map(|a| format!("{}={a}", a.type_name())).collect();
    if !extra.is_empty() {
        out.push_str(&format!("%!(EXTRA {})", extra.join(", ")));
    }
    Ok(Some(Term::from(out)))
}
