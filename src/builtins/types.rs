// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::utils::ensure_args_count;
use crate::builtins::{BuiltinDescriptor, OperandType, RegistryBuilder};
use crate::term::Term;

use anyhow::Result;

const ANY: &[OperandType] = &[OperandType::Any];

pub fn register(m: &mut RegistryBuilder) {
    m.insert(BuiltinDescriptor::pure("is_array", ANY, OperandType::Boolean, is_array));
    m.insert(BuiltinDescriptor::pure("is_boolean", ANY, OperandType::Boolean, is_boolean));
    m.insert(BuiltinDescriptor::pure("is_null", ANY, OperandType::Boolean, is_null));
    m.insert(BuiltinDescriptor::pure("is_number", ANY, OperandType::Boolean, is_number));
    m.insert(BuiltinDescriptor::pure("is_object", ANY, OperandType::Boolean, is_object));
    m.insert(BuiltinDescriptor::pure("is_set", ANY, OperandType::Boolean, is_set));
    m.insert(BuiltinDescriptor::pure("is_string", ANY, OperandType::Boolean, is_string));
    m.insert(BuiltinDescriptor::pure("type_name", ANY, OperandType::String, type_name));
}

fn is_array(args: &[Term]) -> Result<Option<Term>> {
    ensure_args_count("is_array", args, 1)?;
    Ok(Some(Term::Bool(matches!(&args[0], Term::Array(_)))))
}

fn is_boolean(args: &[Term]) -> Result<Option<Term>> {
    ensure_args_count("is_boolean", args, 1)?;
    Ok(Some(Term::Bool(matches!(&args[0], Term::Bool(_)))))
}

fn is_null(args: &[Term]) -> Result<Option<Term>> {
    ensure_args_count("is_null", args, 1)?;
    Ok(Some(Term::Bool(matches!(&args[0], Term::Null))))
}

fn is_number(args: &[Term]) -> Result<Option<Term>> {
    ensure_args_count("is_number", args, 1)?;
    Ok(Some(Term::Bool(matches!(&args[0], Term::Number(_)))))
}

fn is_object(args: &[Term]) -> Result<Option<Term>> {
    ensure_args_count("is_object", args, 1)?;
    Ok(Some(Term::Bool(matches!(&args[0], Term::Object(_)))))
}

fn is_set(args: &[Term]) -> Result<Option<Term>> {
    ensure_args_count("is_set", args, 1)?;
    Ok(Some(Term::Bool(matches!(&args[0], Term::Set(_)))))
}

fn is_string(args: &[Term]) -> Result<Option<Term>> {
    ensure_args_count("is_string", args, 1)?;
    Ok(Some(Term::Bool(matches!(&args[0], Term::String(_)))))
}

pub fn type_name(args: &[Term]) -> Result<Option<Term>> {
    ensure_args_count("type_name", args, 1)?;
    Ok(Some(Term::from(args[0].type_name())))
}
