//! Tree-walking evaluator with Python arithmetic semantics.
//!
//! Integers are 128-bit and never wrap: overflow is an error. `/` always
//! produces a float, `//` and `%` round toward negative infinity, and
//! `int ** non-negative int` stays an integer.

use std::cmp::Ordering;

use ledgerops_store::{Map, Value};

use crate::ast::{BinaryOp, BoolOp, CompareOp, Expr, UnaryOp};
use crate::error::{FormulaError, Result};
use crate::parser::parse_formula;
use crate::rng::FormulaRng;

/// Names a formula may call.
pub const FUNCTIONS: [&str; 8] = ["int", "str", "float", "rand", "randint", "choice", "ceil", "len"];

/// Upper bound on strings and lists built by repetition.
const MAX_REPEAT_LEN: usize = 1 << 24;

pub struct Evaluator<'r> {
    rng: &'r mut FormulaRng,
}

impl<'r> Evaluator<'r> {
    pub fn new(rng: &'r mut FormulaRng) -> Self {
        Self { rng }
    }

    /// Parse and evaluate `text`.
    pub fn evaluate(&mut self, text: &str) -> Result<Value> {
        let expr = parse_formula(text)?;
        self.eval(&expr)
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Name(name) => Err(FormulaError::UnknownIdentifier(name.clone())),
            Expr::List(elems) => elems
                .iter()
                .map(|e| self.eval(e))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            Expr::Dict(entries) => {
                let mut map = Map::new();
                for (k, v) in entries {
                    let key = match self.eval(k)? {
                        Value::Str(s) => s,
                        other => other.to_string(),
                    };
                    let value = self.eval(v)?;
                    map.insert(key, value);
                }
                Ok(Value::Map(map))
            }
            Expr::Unary(op, operand) => {
                let v = self.eval(operand)?;
                unary(*op, v)
            }
            Expr::Binary(op, lhs, rhs) => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                binary(*op, l, r)
            }
            Expr::Compare(first, rest) => {
                let mut left = self.eval(first)?;
                for (op, rhs) in rest {
                    let right = self.eval(rhs)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::Bool(op, lhs, rhs) => {
                let l = self.eval(lhs)?;
                match (op, l.truthy()) {
                    (BoolOp::And, false) | (BoolOp::Or, true) => Ok(l),
                    _ => self.eval(rhs),
                }
            }
            Expr::IfElse { test, body, orelse } => {
                if self.eval(test)?.truthy() {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::Index(target, index) => {
                let t = self.eval(target)?;
                let i = self.eval(index)?;
                subscript(&t, &i)
            }
            Expr::Call(callee, args) => {
                let Expr::Name(name) = callee.as_ref() else {
                    return Err(FormulaError::Type("only named functions can be called".to_string()));
                };
                if !FUNCTIONS.contains(&name.as_str()) {
                    return Err(FormulaError::UnknownIdentifier(name.clone()));
                }
                let args = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<Result<Vec<_>>>()?;
                self.call(name, args)
            }
        }
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        match name {
            "int" => match args.as_slice() {
                [v] => to_int(v),
                [Value::Str(s), Value::Int(base)] => int_with_base(s, *base),
                _ => Err(arity("int", "takes 1 or 2 arguments", args.len())),
            },
            "str" => match args.as_slice() {
                [] => Ok(Value::from("")),
                [v] => Ok(Value::Str(v.to_string())),
                _ => Err(arity("str", "takes at most 1 argument", args.len())),
            },
            "float" => match args.as_slice() {
                [] => Ok(Value::Float(0.0)),
                [v] => to_float(v).map(Value::Float),
                _ => Err(arity("float", "takes at most 1 argument", args.len())),
            },
            "rand" => match args.as_slice() {
                [] => Ok(Value::Float(self.rng.uniform())),
                _ => Err(arity("rand", "takes no arguments", args.len())),
            },
            "randint" => {
                let (low, high) = match args.as_slice() {
                    [high] => (0, int_arg("randint", high)?),
                    [low, high] => (int_arg("randint", low)?, int_arg("randint", high)?),
                    _ => return Err(arity("randint", "takes 1 or 2 arguments", args.len())),
                };
                if low >= high {
                    return Err(FormulaError::Argument {
                        function: "randint",
                        message: format!("requires low < high (got {low} and {high})"),
                    });
                }
                Ok(Value::Int(self.rng.below(low, high)))
            }
            "choice" => match args.as_slice() {
                [seq] => self.choice(seq),
                _ => Err(arity("choice", "takes exactly 1 argument", args.len())),
            },
            "ceil" => match args.as_slice() {
                [v] => ceil(v),
                _ => Err(arity("ceil", "takes exactly 1 argument", args.len())),
            },
            "len" => match args.as_slice() {
                [v] => len(v),
                _ => Err(arity("len", "takes exactly 1 argument", args.len())),
            },
            other => Err(FormulaError::UnknownIdentifier(other.to_string())),
        }
    }

    fn choice(&mut self, seq: &Value) -> Result<Value> {
        let empty = || FormulaError::Argument {
            function: "choice",
            message: "cannot choose from an empty sequence".to_string(),
        };
        match seq {
            Value::List(items) if items.is_empty() => Err(empty()),
            Value::List(items) => Ok(items[self.rng.position(items.len())].clone()),
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                if chars.is_empty() {
                    return Err(empty());
                }
                Ok(Value::Str(chars[self.rng.position(chars.len())].to_string()))
            }
            Value::Int(n) if *n > 0 => Ok(Value::Int(self.rng.below(0, *n))),
            Value::Int(_) => Err(FormulaError::Argument {
                function: "choice",
                message: "requires a positive integer".to_string(),
            }),
            other => Err(FormulaError::Type(format!(
                "choice() expects a sequence, got {}",
                other.kind()
            ))),
        }
    }
}

fn arity(function: &'static str, rule: &str, given: usize) -> FormulaError {
    FormulaError::Argument {
        function,
        message: format!("{rule} ({given} given)"),
    }
}

fn int_arg(function: &'static str, v: &Value) -> Result<i128> {
    match v {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(i128::from(*b)),
        other => Err(FormulaError::Argument {
            function,
            message: format!("expects integers, got {}", other.kind()),
        }),
    }
}

// ============================================================================
// Numbers
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i128),
    Float(f64),
}

impl Num {
    fn of(v: &Value) -> Option<Num> {
        match v {
            Value::Bool(b) => Some(Num::Int(i128::from(*b))),
            Value::Int(i) => Some(Num::Int(*i)),
            Value::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

fn float_to_int(f: f64) -> Result<i128> {
    if !f.is_finite() {
        return Err(FormulaError::Type(format!(
            "cannot convert float {} to integer",
            ledgerops_store::value::format_float(f)
        )));
    }
    let t = f.trunc();
    if t < i128::MIN as f64 || t >= i128::MAX as f64 {
        return Err(FormulaError::Overflow("int"));
    }
    Ok(t as i128)
}

fn to_int(v: &Value) -> Result<Value> {
    match v {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Bool(b) => Ok(Value::Int(i128::from(*b))),
        Value::Float(f) => float_to_int(*f).map(Value::Int),
        Value::Str(s) => s
            .trim()
            .replace('_', "")
            .parse::<i128>()
            .map(Value::Int)
            .map_err(|_| FormulaError::Argument {
                function: "int",
                message: format!("invalid literal for base 10: {}", v.repr()),
            }),
        other => Err(FormulaError::Type(format!(
            "int() argument must be a string or a number, not {}",
            other.kind()
        ))),
    }
}

fn int_with_base(s: &str, base: i128) -> Result<Value> {
    let radix = u32::try_from(base)
        .ok()
        .filter(|b| (2..=36).contains(b))
        .ok_or_else(|| FormulaError::Argument {
            function: "int",
            message: format!("base must be between 2 and 36, got {base}"),
        })?;
    let trimmed = s.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let digits = match radix {
        16 => digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")).unwrap_or(digits),
        8 => digits.strip_prefix("0o").or_else(|| digits.strip_prefix("0O")).unwrap_or(digits),
        2 => digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")).unwrap_or(digits),
        _ => digits,
    };
    let magnitude = i128::from_str_radix(&digits.replace('_', ""), radix).map_err(|_| {
        FormulaError::Argument {
            function: "int",
            message: format!("invalid literal for base {radix}: '{s}'"),
        }
    })?;
    Ok(Value::Int(if negative { -magnitude } else { magnitude }))
}

fn to_float(v: &Value) -> Result<f64> {
    match v {
        Value::Str(s) => s
            .trim()
            .replace('_', "")
            .parse::<f64>()
            .map_err(|_| FormulaError::Argument {
                function: "float",
                message: format!("could not convert string to float: {}", v.repr()),
            }),
        other => Num::of(other).map(Num::as_f64).ok_or_else(|| {
            FormulaError::Type(format!(
                "float() argument must be a string or a number, not {}",
                other.kind()
            ))
        }),
    }
}

fn ceil(v: &Value) -> Result<Value> {
    match Num::of(v) {
        Some(Num::Int(i)) => Ok(Value::Int(i)),
        Some(Num::Float(f)) => float_to_int(f.ceil()).map(Value::Int),
        None => Err(FormulaError::Type(format!(
            "ceil() expects a number, got {}",
            v.kind()
        ))),
    }
}

fn len(v: &Value) -> Result<Value> {
    let n = match v {
        Value::Str(s) => s.chars().count(),
        Value::Bytes(b) => b.len(),
        Value::List(items) => items.len(),
        Value::Map(m) => m.len(),
        other => {
            return Err(FormulaError::Type(format!(
                "object of type {} has no len()",
                other.kind()
            )))
        }
    };
    Ok(Value::Int(n as i128))
}

// ============================================================================
// Operators
// ============================================================================

fn unary(op: UnaryOp, v: Value) -> Result<Value> {
    match (op, Num::of(&v)) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!v.truthy())),
        (UnaryOp::Neg, Some(Num::Int(i))) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or(FormulaError::Overflow("-")),
        (UnaryOp::Neg, Some(Num::Float(f))) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Some(Num::Int(i))) => Ok(Value::Int(i)),
        (UnaryOp::Pos, Some(Num::Float(f))) => Ok(Value::Float(f)),
        (_, None) => Err(FormulaError::Type(format!(
            "bad operand type for unary {}: {}",
            if op == UnaryOp::Neg { "-" } else { "+" },
            v.kind()
        ))),
    }
}

fn repeat<T: Clone>(items: &[T], count: i128, op: &'static str) -> Result<Vec<T>> {
    let count = usize::try_from(count.max(0)).map_err(|_| FormulaError::Overflow(op))?;
    match items.len().checked_mul(count) {
        Some(total) if total <= MAX_REPEAT_LEN => {
            Ok((0..count).flat_map(|_| items.iter().cloned()).collect())
        }
        _ => Err(FormulaError::Overflow(op)),
    }
}

fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value> {
    match (op, &l, &r) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => return Ok(Value::Str(format!("{a}{b}"))),
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            return Ok(Value::List(a.iter().chain(b).cloned().collect()))
        }
        (BinaryOp::Add, Value::Bytes(a), Value::Bytes(b)) => {
            return Ok(Value::Bytes(a.iter().chain(b).copied().collect()))
        }
        (BinaryOp::Mul, Value::Str(s), Value::Int(n)) | (BinaryOp::Mul, Value::Int(n), Value::Str(s)) => {
            let chars: Vec<char> = s.chars().collect();
            return Ok(Value::Str(repeat(&chars, *n, "*")?.into_iter().collect()));
        }
        (BinaryOp::Mul, Value::List(items), Value::Int(n))
        | (BinaryOp::Mul, Value::Int(n), Value::List(items)) => {
            return Ok(Value::List(repeat(items, *n, "*")?))
        }
        _ => {}
    }
    match (Num::of(&l), Num::of(&r)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => int_op(op, a, b),
        (Some(a), Some(b)) => float_op(op, a.as_f64(), b.as_f64()),
        _ => Err(FormulaError::OperandTypes {
            op: op.symbol(),
            left: l.kind(),
            right: r.kind(),
        }),
    }
}

fn int_op(op: BinaryOp, a: i128, b: i128) -> Result<Value> {
    let overflow = || FormulaError::Overflow(op.symbol());
    let result = match op {
        BinaryOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinaryOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinaryOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinaryOp::Div => {
            if b == 0 {
                return Err(FormulaError::DivisionByZero);
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinaryOp::FloorDiv => {
            if b == 0 {
                return Err(FormulaError::DivisionByZero);
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) {
                q - 1
            } else {
                q
            }
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(FormulaError::DivisionByZero);
            }
            let m = a.checked_rem(b).ok_or_else(overflow)?;
            if m != 0 && ((m < 0) != (b < 0)) {
                m + b
            } else {
                m
            }
        }
        BinaryOp::Pow => {
            if b < 0 {
                return float_op(op, a as f64, b as f64);
            }
            match a {
                0 => i128::from(b == 0),
                1 => 1,
                -1 => {
                    if b % 2 == 0 {
                        1
                    } else {
                        -1
                    }
                }
                _ => u32::try_from(b)
                    .ok()
                    .and_then(|e| a.checked_pow(e))
                    .ok_or_else(overflow)?,
            }
        }
    };
    Ok(Value::Int(result))
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> Result<Value> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            a / b
        }
        BinaryOp::FloorDiv => {
            if b == 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            (a / b).floor()
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            let m = a % b;
            if m != 0.0 && ((m < 0.0) != (b < 0.0)) {
                m + b
            } else {
                m
            }
        }
        BinaryOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            if a < 0.0 && b.fract() != 0.0 {
                return Err(FormulaError::Type(
                    "negative number cannot be raised to a fractional power".to_string(),
                ));
            }
            let p = a.powf(b);
            if p.is_infinite() && a.is_finite() && b.is_finite() {
                return Err(FormulaError::Overflow("**"));
            }
            p
        }
    };
    Ok(Value::Float(result))
}

// ============================================================================
// Comparisons
// ============================================================================

fn values_equal(a: &Value, b: &Value) -> bool {
    match (Num::of(a), Num::of(b)) {
        (Some(Num::Int(x)), Some(Num::Int(y))) => return x == y,
        (Some(x), Some(y)) => return x.as_f64() == y.as_f64(),
        _ => {}
    }
    match (a, b) {
        (Value::List(xs), Value::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Map(xs), Value::Map(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).map_or(false, |y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// `None` when the values are unordered (NaN).
fn ordering(op: CompareOp, a: &Value, b: &Value) -> Result<Option<Ordering>> {
    match (Num::of(a), Num::of(b)) {
        (Some(Num::Int(x)), Some(Num::Int(y))) => return Ok(Some(x.cmp(&y))),
        (Some(x), Some(y)) => return Ok(x.as_f64().partial_cmp(&y.as_f64())),
        _ => {}
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(Some(x.cmp(y))),
        (Value::Bytes(x), Value::Bytes(y)) => Ok(Some(x.cmp(y))),
        (Value::List(xs), Value::List(ys)) => {
            for (x, y) in xs.iter().zip(ys) {
                if !values_equal(x, y) {
                    return ordering(op, x, y);
                }
            }
            Ok(Some(xs.len().cmp(&ys.len())))
        }
        _ => Err(FormulaError::Type(format!(
            "'{}' not supported between {} and {}",
            op.symbol(),
            a.kind(),
            b.kind()
        ))),
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool> {
    match (container, item) {
        (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::List(items), _) => Ok(items.iter().any(|x| values_equal(x, item))),
        (Value::Map(m), Value::Str(key)) => Ok(m.contains_key(key)),
        (Value::Map(_), _) => Ok(false),
        _ => Err(FormulaError::Type(format!(
            "'in' requires a string, list or map on the right, got {}",
            container.kind()
        ))),
    }
}

fn compare(op: CompareOp, a: &Value, b: &Value) -> Result<bool> {
    Ok(match op {
        CompareOp::Eq => values_equal(a, b),
        CompareOp::NotEq => !values_equal(a, b),
        CompareOp::In => contains(b, a)?,
        CompareOp::NotIn => !contains(b, a)?,
        CompareOp::Lt => ordering(op, a, b)? == Some(Ordering::Less),
        CompareOp::LtE => matches!(ordering(op, a, b)?, Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => ordering(op, a, b)? == Some(Ordering::Greater),
        CompareOp::GtE => matches!(
            ordering(op, a, b)?,
            Some(Ordering::Greater | Ordering::Equal)
        ),
    })
}

// ============================================================================
// Indexing
// ============================================================================

fn position(index: i128, len: usize, what: &str) -> Result<usize> {
    let len_i = len as i128;
    let resolved = if index < 0 { index + len_i } else { index };
    if (0..len_i).contains(&resolved) {
        Ok(resolved as usize)
    } else {
        Err(FormulaError::Index(format!("{what} index {index} out of range")))
    }
}

fn subscript(target: &Value, index: &Value) -> Result<Value> {
    match (target, index) {
        (Value::List(items), _) => {
            let i = int_arg_index(index)?;
            Ok(items[position(i, items.len(), "list")?].clone())
        }
        (Value::Str(s), _) => {
            let i = int_arg_index(index)?;
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::Str(chars[position(i, chars.len(), "string")?].to_string()))
        }
        (Value::Bytes(b), _) => {
            let i = int_arg_index(index)?;
            Ok(Value::Int(i128::from(b[position(i, b.len(), "bytes")?])))
        }
        (Value::Map(m), key) => {
            let key = match key {
                Value::Str(s) => s.clone(),
                other => other.to_string(),
            };
            m.get(&key)
                .cloned()
                .ok_or_else(|| FormulaError::Index(format!("key '{key}' not found")))
        }
        (other, _) => Err(FormulaError::Type(format!(
            "{} object is not subscriptable",
            other.kind()
        ))),
    }
}

fn int_arg_index(index: &Value) -> Result<i128> {
    match index {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(i128::from(*b)),
        other => Err(FormulaError::Type(format!(
            "indices must be integers, not {}",
            other.kind()
        ))),
    }
}

/// Evaluate `text` with a throwaway generator seeded from entropy.
pub fn evaluate(text: &str) -> Result<Value> {
    let mut rng = FormulaRng::from_entropy();
    Evaluator::new(&mut rng).evaluate(text)
}
