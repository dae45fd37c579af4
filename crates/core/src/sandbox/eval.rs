// Tree-walking interpreter for parsed sandbox expressions

use super::parser::{Ast, BinaryOp, Function, Node, NodeId, UnaryOp};
use super::EvalError;
use std::cmp::Ordering;

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    List(Vec<Value>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::List(_) => "list",
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            Value::List(_) => None,
        }
    }

    fn is_zero(&self) -> bool {
        match self {
            Value::Int(n) => *n == 0,
            Value::Float(x) => *x == 0.0,
            Value::List(_) => false,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Shortest round-trip digits, positional between 1e-4 and 1e16 and
/// `1e+16` / `1e-05` style outside that range
fn format_float(x: f64) -> String {
    if x == 0.0 {
        return if x.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let scientific = format!("{:e}", x);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return scientific;
    };

    if !(-4..16).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}e{}{:02}", mantissa, sign, exponent.abs());
    }

    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    let body = if exponent < 0 {
        format!("0.{}{}", "0".repeat((-exponent - 1) as usize), digits)
    } else {
        let whole = exponent as usize + 1;
        if digits.len() <= whole {
            format!("{}{}.0", digits, "0".repeat(whole - digits.len()))
        } else {
            format!("{}.{}", &digits[..whole], &digits[whole..])
        }
    };
    format!("{}{}", sign, body)
}

pub(crate) fn evaluate(ast: &Ast) -> Result<Value, EvalError> {
    eval_node(ast, ast.root())
}

fn eval_node(ast: &Ast, id: NodeId) -> Result<Value, EvalError> {
    match ast.node(id) {
        Node::Int(n) => Ok(Value::Int(*n)),
        Node::Float(x) => finite(*x),
        Node::List(items) => items
            .iter()
            .map(|item| eval_node(ast, *item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Node::Unary { op, operand } => {
            let value = eval_node(ast, *operand)?;
            unary(*op, value)
        }
        Node::Binary { op, lhs, rhs } => {
            let lhs = eval_node(ast, *lhs)?;
            let rhs = eval_node(ast, *rhs)?;
            binary(*op, lhs, rhs)
        }
        Node::Call { function, args } => {
            let args = args
                .iter()
                .map(|arg| eval_node(ast, *arg))
                .collect::<Result<Vec<_>, _>>()?;
            call(*function, args)
        }
    }
}

fn finite(x: f64) -> Result<Value, EvalError> {
    if x.is_finite() {
        Ok(Value::Float(x))
    } else {
        Err(EvalError::Overflow)
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, EvalError> {
    match (op, value) {
        (UnaryOp::Plus, v @ (Value::Int(_) | Value::Float(_))) => Ok(v),
        (UnaryOp::Neg, Value::Int(n)) => n.checked_neg().map(Value::Int).ok_or(EvalError::Overflow),
        (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (op, v) => {
            let symbol = if op == UnaryOp::Neg { "-" } else { "+" };
            Err(EvalError::Type(format!(
                "bad operand type for unary {}: '{}'",
                symbol,
                v.type_name()
            )))
        }
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    let operand_error = |lhs: &Value, rhs: &Value| {
        EvalError::Type(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            lhs.type_name(),
            rhs.type_name()
        ))
    };

    let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) else {
        return Err(operand_error(&lhs, &rhs));
    };

    match (op, &lhs, &rhs) {
        (BinaryOp::Div, _, r) if r.is_zero() => Err(EvalError::ZeroDivision("division by zero")),
        (BinaryOp::Mod, _, r) if r.is_zero() => Err(EvalError::ZeroDivision("modulo by zero")),
        (BinaryOp::Div, _, _) => finite(a / b),

        (BinaryOp::Add, Value::Int(x), Value::Int(y)) => x.checked_add(*y).map(Value::Int).ok_or(EvalError::Overflow),
        (BinaryOp::Sub, Value::Int(x), Value::Int(y)) => x.checked_sub(*y).map(Value::Int).ok_or(EvalError::Overflow),
        (BinaryOp::Mul, Value::Int(x), Value::Int(y)) => x.checked_mul(*y).map(Value::Int).ok_or(EvalError::Overflow),
        (BinaryOp::Mod, Value::Int(x), Value::Int(y)) => {
            let r = x.checked_rem(*y).ok_or(EvalError::Overflow)?;
            // Floored modulo: the result takes the sign of the divisor
            if r != 0 && (r < 0) != (*y < 0) {
                Ok(Value::Int(r + y))
            } else {
                Ok(Value::Int(r))
            }
        }
        (BinaryOp::Pow, Value::Int(x), Value::Int(y)) => int_pow(*x, *y),

        (BinaryOp::Add, _, _) => finite(a + b),
        (BinaryOp::Sub, _, _) => finite(a - b),
        (BinaryOp::Mul, _, _) => finite(a * b),
        (BinaryOp::Mod, _, _) => {
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) {
                finite(r + b)
            } else {
                finite(r)
            }
        }
        (BinaryOp::Pow, _, _) => float_pow(a, b),
    }
}

fn int_pow(base: i64, exponent: i64) -> Result<Value, EvalError> {
    if exponent < 0 {
        return float_pow(base as f64, exponent as f64);
    }
    let exponent = u32::try_from(exponent).map_err(|_| EvalError::Overflow)?;
    base.checked_pow(exponent).map(Value::Int).ok_or(EvalError::Overflow)
}

fn float_pow(base: f64, exponent: f64) -> Result<Value, EvalError> {
    if base == 0.0 && exponent < 0.0 {
        return Err(EvalError::ZeroDivision("zero cannot be raised to a negative power"));
    }
    if base < 0.0 && exponent.fract() != 0.0 {
        return Err(EvalError::Type(
            "negative number cannot be raised to a fractional power".to_string(),
        ));
    }
    finite(base.powf(exponent))
}

fn call(function: Function, args: Vec<Value>) -> Result<Value, EvalError> {
    match function {
        Function::Abs => {
            let [value] = exact_args::<1>(function, args)?;
            match value {
                Value::Int(n) => n.checked_abs().map(Value::Int).ok_or(EvalError::Overflow),
                Value::Float(x) => Ok(Value::Float(x.abs())),
                Value::List(_) => Err(EvalError::Type("bad operand type for abs(): 'list'".to_string())),
            }
        }
        Function::Max => extreme(function, args, Ordering::Greater),
        Function::Min => extreme(function, args, Ordering::Less),
        Function::Round => round(args),
        Function::Sum => sum(args),
    }
}

fn exact_args<const N: usize>(function: Function, args: Vec<Value>) -> Result<[Value; N], EvalError> {
    let given = args.len();
    args.try_into().map_err(|_| {
        EvalError::Type(format!(
            "{}() takes exactly {} argument{} ({} given)",
            function.name(),
            N,
            if N == 1 { "" } else { "s" },
            given
        ))
    })
}

/// `max`/`min` over either a single list argument or two or more numbers
fn extreme(function: Function, mut args: Vec<Value>, wanted: Ordering) -> Result<Value, EvalError> {
    let items = match args.len() {
        0 => {
            return Err(EvalError::Type(format!(
                "{}() expected at least 1 argument, got 0",
                function.name()
            )))
        }
        1 => match args.remove(0) {
            Value::List(items) => items,
            other => {
                return Err(EvalError::Type(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                )))
            }
        },
        _ => args,
    };

    let mut best: Option<(Value, f64)> = None;
    for item in items {
        let Some(x) = item.as_f64() else {
            return Err(EvalError::Type(format!(
                "{}() arguments must be numbers, not '{}'",
                function.name(),
                item.type_name()
            )));
        };
        let replace = match &best {
            None => true,
            Some((_, current)) => x.partial_cmp(current) == Some(wanted),
        };
        if replace {
            best = Some((item, x));
        }
    }

    best.map(|(value, _)| value)
        .ok_or_else(|| EvalError::Type(format!("{}() arg is an empty sequence", function.name())))
}

fn round(args: Vec<Value>) -> Result<Value, EvalError> {
    let (value, digits) = match args.len() {
        1 => {
            let [value] = exact_args::<1>(Function::Round, args)?;
            (value, None)
        }
        2 => {
            let [value, digits] = exact_args::<2>(Function::Round, args)?;
            match digits {
                Value::Int(n) => (value, Some(n)),
                other => {
                    return Err(EvalError::Type(format!(
                        "'{}' object cannot be interpreted as an integer",
                        other.type_name()
                    )))
                }
            }
        }
        n => {
            return Err(EvalError::Type(format!(
                "round() takes at most 2 arguments ({} given)",
                n
            )))
        }
    };

    match (value, digits) {
        (Value::Int(n), None) => Ok(Value::Int(n)),
        (Value::Int(n), Some(d)) if d >= 0 => Ok(Value::Int(n)),
        (Value::Int(n), Some(d)) => round_int(n, d.unsigned_abs()),
        (Value::Float(x), None) => {
            let r = x.round_ties_even();
            if r >= i64::MIN as f64 && r < i64::MAX as f64 {
                Ok(Value::Int(r as i64))
            } else {
                Err(EvalError::Overflow)
            }
        }
        (Value::Float(x), Some(d)) => {
            let factor = 10f64.powi(d.clamp(-400, 400) as i32);
            let scaled = x * factor;
            if !scaled.is_finite() || !factor.is_finite() || factor == 0.0 {
                // Too many digits to make a difference, or too few to keep any
                return if d > 0 { Ok(Value::Float(x)) } else { Ok(Value::Float(0.0)) };
            }
            finite(scaled.round_ties_even() / factor)
        }
        (Value::List(_), _) => Err(EvalError::Type(
            "type list doesn't define __round__ method".to_string(),
        )),
    }
}

/// Round an integer to a multiple of 10^places, ties to even
fn round_int(n: i64, places: u64) -> Result<Value, EvalError> {
    let Some(step) = u32::try_from(places).ok().and_then(|p| 10i64.checked_pow(p)) else {
        return Ok(Value::Int(0));
    };
    let quotient = n.div_euclid(step);
    let remainder = n.rem_euclid(step);
    let rounded = match (remainder * 2).cmp(&step) {
        Ordering::Greater => quotient + 1,
        Ordering::Equal if quotient % 2 != 0 => quotient + 1,
        _ => quotient,
    };
    rounded.checked_mul(step).map(Value::Int).ok_or(EvalError::Overflow)
}

fn sum(mut args: Vec<Value>) -> Result<Value, EvalError> {
    let start = match args.len() {
        1 => Value::Int(0),
        2 => args.pop().unwrap_or(Value::Int(0)),
        n => {
            return Err(EvalError::Type(format!(
                "sum() takes 1 or 2 arguments ({} given)",
                n
            )))
        }
    };

    let items = match args.remove(0) {
        Value::List(items) => items,
        other => {
            return Err(EvalError::Type(format!(
                "'{}' object is not iterable",
                other.type_name()
            )))
        }
    };

    items.into_iter().try_fold(start, |acc, item| binary(BinaryOp::Add, acc, item))
}
