//! Sandboxed arithmetic evaluator.
//!
//! Expressions are parsed into an arena AST over a closed grammar: numeric
//! literals, `+ - * / % **`, parentheses, and calls to `abs`, `max`, `min`,
//! `round` and `sum`. List literals are accepted only as call arguments.
//! Anything else (identifiers, attribute access, subscripts, strings,
//! assignments) is rejected while parsing, before any evaluation happens. The
//! interpreter only walks the tree; it has no name lookup of any kind.

mod eval;
mod lexer;
mod parser;

pub use eval::Value;
pub use parser::{Ast, BinaryOp, Function, Node, NodeId, UnaryOp};

use serde::{Deserialize, Serialize};

/// Errors raised while parsing or evaluating an expression
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("invalid syntax at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("{0} is not allowed")]
    Disallowed(String),

    #[error("expression is longer than {0} characters")]
    TooLong(usize),

    #[error("expression nests deeper than {0} levels")]
    TooDeep(usize),

    #[error("{0}")]
    ZeroDivision(&'static str),

    #[error("numeric result out of range")]
    Overflow,

    #[error("{0}")]
    Type(String),
}

impl EvalError {
    /// True when the expression falls outside the accepted grammar, as opposed to
    /// failing while it was evaluated
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Syntax { .. } | Self::Disallowed(_) | Self::TooLong(_) | Self::TooDeep(_)
        )
    }

    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }
}

/// Bounds applied to every expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxLimits {
    #[serde(default = "default_max_expression_len")]
    pub max_expression_len: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_expression_len() -> usize {
    1024
}

fn default_max_depth() -> usize {
    64
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_expression_len: default_max_expression_len(),
            max_depth: default_max_depth(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sandbox {
    limits: SandboxLimits,
}

impl Sandbox {
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }

    /// Parse an expression without evaluating it
    pub fn parse(&self, expression: &str) -> Result<Ast, EvalError> {
        if expression.chars().count() > self.limits.max_expression_len {
            return Err(EvalError::TooLong(self.limits.max_expression_len));
        }
        parser::Parser::new(expression, self.limits.max_depth).parse()
    }

    /// Parse and evaluate an expression
    pub fn evaluate(&self, expression: &str) -> Result<Value, EvalError> {
        let ast = self.parse(expression)?;
        eval::evaluate(&ast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &str) -> Result<String, EvalError> {
        Sandbox::default().evaluate(expr).map(|v| v.to_string())
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("2 + 3 * 4").unwrap(), "14");
        assert_eq!(eval("(2 + 3) * 4").unwrap(), "20");
        assert_eq!(eval("10 - 4 - 3").unwrap(), "3");
        assert_eq!(eval("7 / 2").unwrap(), "3.5");
        assert_eq!(eval("4 / 2").unwrap(), "2.0");
        assert_eq!(eval("0.1 + 0.2").unwrap(), "0.30000000000000004");
        assert_eq!(eval("1.5e3").unwrap(), "1500.0");
        assert_eq!(eval(".5 * 4").unwrap(), "2.0");
        assert_eq!(eval("10.0 ** 16").unwrap(), "1e+16");
        assert_eq!(eval("1 / 100000").unwrap(), "1e-05");
    }

    #[test]
    fn test_power_and_unary() {
        assert_eq!(eval("2 ** 10").unwrap(), "1024");
        assert_eq!(eval("2 ** 3 ** 2").unwrap(), "512");
        assert_eq!(eval("-2 ** 2").unwrap(), "-4");
        assert_eq!(eval("2 ** -1").unwrap(), "0.5");
        assert_eq!(eval("--3").unwrap(), "3");
        assert_eq!(eval("+-3").unwrap(), "-3");
    }

    #[test]
    fn test_floored_modulo() {
        assert_eq!(eval("7 % 3").unwrap(), "1");
        assert_eq!(eval("-7 % 3").unwrap(), "2");
        assert_eq!(eval("7 % -3").unwrap(), "-2");
        assert_eq!(eval("7.5 % 2").unwrap(), "1.5");
    }

    #[test]
    fn test_functions() {
        assert_eq!(eval("abs(-5)").unwrap(), "5");
        assert_eq!(eval("abs(-2.5)").unwrap(), "2.5");
        assert_eq!(eval("max(1, 7, 3)").unwrap(), "7");
        assert_eq!(eval("min([4, 2.5, 9])").unwrap(), "2.5");
        assert_eq!(eval("sum([1, 2, 3])").unwrap(), "6");
        assert_eq!(eval("sum([1, 2], 10)").unwrap(), "13");
        assert_eq!(eval("sum([])").unwrap(), "0");
        assert_eq!(eval("round(2.5)").unwrap(), "2");
        assert_eq!(eval("round(3.5)").unwrap(), "4");
        assert_eq!(eval("round(3.14159, 2)").unwrap(), "3.14");
        assert_eq!(eval("round(1250, -2)").unwrap(), "1200");
        assert_eq!(eval("max(abs(-3), sum([1, 1]))").unwrap(), "3");
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(eval("1/0").unwrap_err(), EvalError::ZeroDivision("division by zero"));
        assert!(eval("1 % 0").unwrap_err().to_string().contains("by zero"));
        assert!(eval("0 ** -1").unwrap_err().to_string().contains("zero"));
        assert!(!eval("1/0").unwrap_err().is_rejection());
    }

    #[test]
    fn test_rejects_identifiers_and_host_access() {
        for expr in [
            "__import__('os')",
            "__import__",
            "x + 1",
            "open('/etc/passwd')",
            "().__class__.__bases__[0]",
            "abs.__self__",
            "(1).real",
            "[1, 2][0]",
            "'abc'",
            "a = 1",
            "1; 2",
            "lambda: 1",
            "abs",
            "print(1)",
        ] {
            let err = eval(expr).unwrap_err();
            assert!(err.is_rejection(), "{expr:?} should be rejected, got {err:?}");
        }
    }

    #[test]
    fn test_rejection_messages() {
        assert_eq!(
            eval("__import__('os')").unwrap_err().to_string(),
            "name '__import__' is not allowed"
        );
        assert_eq!(eval("(1).real").unwrap_err().to_string(), "attribute access is not allowed");
    }

    #[test]
    fn test_malformed_expressions() {
        for expr in ["", "   ", "1 +", "(1 + 2", "1 2", "max(1,", "abs()", "2 ** "] {
            assert!(eval(expr).is_err(), "{expr:?} should fail");
        }
        assert!(eval("abs(1, 2)").unwrap_err().to_string().contains("argument"));
        assert!(eval("max(1)").is_err());
        assert!(eval("max([])").unwrap_err().to_string().contains("empty"));
        assert!(eval("sum(1, 2)").is_err());
        assert!(eval("[1, 2]").unwrap_err().is_rejection());
        assert!(eval("[1] + 1").is_err());
    }

    #[test]
    fn test_overflow() {
        assert_eq!(eval("9223372036854775807 + 1").unwrap_err(), EvalError::Overflow);
        assert_eq!(eval("10 ** 100").unwrap_err(), EvalError::Overflow);
        assert_eq!(eval("10.0 ** 400").unwrap_err(), EvalError::Overflow);
        assert!(eval("99999999999999999999").is_err());
    }

    #[test]
    fn test_limits() {
        let sandbox = Sandbox::new(SandboxLimits {
            max_expression_len: 10,
            max_depth: 4,
        });
        assert_eq!(sandbox.evaluate("1 + 1 + 1 + 1").unwrap_err(), EvalError::TooLong(10));
        assert_eq!(sandbox.evaluate("((((1))))").unwrap_err(), EvalError::TooDeep(4));
        assert_eq!(sandbox.evaluate("((1))").unwrap().to_string(), "1");

        let deep = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        assert!(Sandbox::default().evaluate(&deep).unwrap_err().is_rejection());
    }
}
