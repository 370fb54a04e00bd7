//! Front end: source text to a module's top level function.
//!
//! The grammar is small and line oriented:
//!
//! ```text
//! func add(a, b)
//!   return a + b
//! end
//!
//! class Point
//!   var x, y
//!   func init(self, x, y)
//!     self.x = x
//!     self.y = y
//!   end
//! end
//! ```
//!
//! Operators are method sends on their left operand, methods take the receiver as an explicit
//! first parameter. Names assigned inside a function are its locals, every other name is a
//! global of the defining module.
use std::io::Read;

use thiserror::Error;

use crate::{Error, Machine, ObjRef};

mod ast;
mod codegen;
mod lexer;
mod parser;
mod token;

pub use ast::*;
pub(crate) use codegen::CodeGen;
pub use lexer::Lexer;
pub use parser::Parser;
pub use token::{Pos, Span, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at {span}")]
pub struct CompileError {
    pub message: String,
    pub span: Span,
}

impl CompileError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

/// Parses a whole source.
pub fn parse(reader: impl Read) -> Result<Vec<Stmt>, CompileError> {
    Parser::new(Lexer::new(reader)).parse_program()
}

/// Compiles `reader` into `module`'s top level function and returns it.
///
/// `file` names the source in errors and backtraces. `module` must be reachable from a root.
pub fn compile(
    machine: &mut Machine,
    module: ObjRef,
    reader: impl Read,
    file: &str,
) -> Result<ObjRef, Error> {
    let program = parse(reader).map_err(|error| Error::Compile {
        file: file.to_owned(),
        error,
    })?;

    let _region = machine.no_collect();
    let body = CodeGen::new(machine, module, file).module_body(file, &program);
    machine.set_module_body(module, body);
    log::debug!("compiled {file}: {} top level statements", program.len());
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FaultKind, Value};

    fn parse_str(source: &str) -> Result<Vec<Stmt>, CompileError> {
        parse(source.as_bytes())
    }

    #[test]
    fn operators_become_sends() {
        let program = parse_str("1 + 2 * 3").unwrap();
        let StmtKind::Expr(expr) = &program[0].kind else {
            panic!("expected an expression statement");
        };
        let ExprKind::Send {
            selector, args, ..
        } = &expr.kind
        else {
            panic!("expected a send, got {expr:?}");
        };
        assert_eq!(selector, "+");
        assert!(matches!(&args[0].kind, ExprKind::Send { selector, .. } if selector == "*"));
    }

    #[test]
    fn not_equal_negates_equality() {
        let program = parse_str("a != b").unwrap();
        let StmtKind::Expr(expr) = &program[0].kind else {
            panic!("expected an expression statement");
        };
        let ExprKind::Not(inner) = &expr.kind else {
            panic!("expected not");
        };
        assert!(matches!(&inner.kind, ExprKind::Send { selector, .. } if selector == "=="));
    }

    #[test]
    fn negative_literals_fold() {
        let program = parse_str("x = -5").unwrap();
        assert!(matches!(
            &program[0].kind,
            StmtKind::Assign { value: Expr { kind: ExprKind::Integer(-5), .. }, .. }
        ));
    }

    #[test]
    fn functions_classes_and_control_flow() {
        let source = "\
func f(a, b)
  if a < b
    return a
  elif a == b
    return 0
  else
    return b
  end
end
class Point < Object
  var x, y
  func init(self, x)
    self.x = x
  end
end
while false
  x = 1
end
";
        let program = parse_str(source).unwrap();
        assert_eq!(program.len(), 3);
        let StmtKind::Func(func) = &program[0].kind else {
            panic!("expected a function");
        };
        assert_eq!(func.params, vec!["a", "b"]);
        let StmtKind::Class(class) = &program[1].kind else {
            panic!("expected a class");
        };
        assert_eq!(class.attributes, vec!["x", "y"]);
        assert_eq!(class.methods[0].name, "init");
        assert!(class.super_class.is_some());
        assert!(matches!(program[2].kind, StmtKind::While { .. }));
    }

    #[test]
    fn keywords_name_members_after_a_dot() {
        let program = parse_str("x.class()").unwrap();
        let StmtKind::Expr(expr) = &program[0].kind else {
            panic!("expected an expression statement");
        };
        assert!(matches!(&expr.kind, ExprKind::Send { selector, .. } if selector == "class"));
        assert!(parse_str("x.while = 1").is_ok());
        assert_eq!(
            parse_str("x.+").unwrap_err().message,
            "expected a name, found `+'"
        );
    }

    #[test]
    fn errors_carry_spans() {
        let error = parse_str("x = (1 +").unwrap_err();
        assert!(error.message.starts_with("expected an expression"), "{error}");
        assert_eq!(error.span.start.line, 1);

        let error = parse_str("1 = 2").unwrap_err();
        assert_eq!(error.message, "cannot assign to this expression");
        assert_eq!(error.span.to_string(), "1:1-1:2");

        let error = parse_str("x = \"open").unwrap_err();
        assert_eq!(error.message, "unterminated string");
    }

    #[test]
    fn statements_need_separators() {
        let error = parse_str("a b").unwrap_err();
        assert_eq!(error.message, "expected end of statement, found identifier");
        assert!(parse_str("a; b\n\nc").is_ok());
    }

    #[test]
    fn compile_error_message_names_file_and_span() {
        let mut machine = Machine::new();
        let module = machine.new_module(Some("broken"));
        machine.push(Value::from_object(module));
        let error = compile(&mut machine, module, "x = )".as_bytes(), "broken.ow").unwrap_err();
        assert_eq!(error.kind(), FaultKind::Compile);
        assert_eq!(
            error.to_string(),
            "broken.ow : 1:5-1:6 : expected an expression, found `)'"
        );
    }

    #[test]
    fn compiled_module_body_returns_last_expression() {
        let mut machine = Machine::new();
        let module = machine.new_module(Some("main"));
        machine.push(Value::from_object(module));
        let body = compile(&mut machine, module, "x = 40\nx + 2".as_bytes(), "<test>").unwrap();
        let result = machine.call_value(Value::from_object(body), &[]).unwrap();
        assert_eq!(result.as_small_int(), Some(42));
    }
}
