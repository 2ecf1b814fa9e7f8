// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins::{BuiltinContext, BuiltinDescriptor, OperandType, RegistryBuilder};
use crate::term::Term;

use anyhow::Result;

pub(crate) const UNDEFINED_OPERAND: &str = "<undefined>";

pub fn register(m: &mut RegistryBuilder) {
    m.insert(
        BuiltinDescriptor::contextual("print", &[], OperandType::Boolean, print)
            .variadic()
            .lenient(),
    );
}

// The evaluator substitutes `<undefined>` for operands without a value, so print always sees
// every operand.
fn print(ctx: &BuiltinContext<'_>, args: &[Term]) -> Result<Option<Term>> {
    let msg: Vec<String> = args
        .iter()
        .map(|a| match a {
            Term::String(s) => s.to_string(),
            _ => a.to_string(),
        })
        .collect();

    ctx.printer.print(&msg.join(" "));
    Ok(Some(Term::Bool(true)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::BufferedPrinter;

    #[test]
    fn print_joins_operands() {
        let printer = BufferedPrinter::new();
        let ctx = BuiltinContext {
            name: "print",
            time_ns: 0,
            depth: 0,
            tracer: None,
            printer: &printer,
        };
        print(
            &ctx,
            &[
                Term::from("x ="),
                Term::from_json_str(r#"{"a": "b"}"#).unwrap(),
                Term::from(UNDEFINED_OPERAND),
            ],
        )
        .unwrap();
        assert_eq!(printer.lines(), vec![r#"x = {"a": "b"} <undefined>"#]);
    }
}
