//! Named task functions.
//!
//! Code cannot travel between processes, so a submitted task names its
//! function and every worker resolves that name against the
//! [`FunctionRegistry`] it was started with.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Number, Value};

use crate::data::TaskFailure;

/// Thread-safe task function over positional JSON arguments.
pub type TaskFn = Arc<dyn Fn(&[Value]) -> Result<Value, TaskFailure> + Send + Sync>;

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, TaskFn>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` under `name`, replacing any previous function of that name.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Value, TaskFailure> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(function = %name, "registered task function");
        self.functions.insert(name, Arc::new(f));
        self
    }

    pub fn get(&self, name: &str) -> Option<TaskFn> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Arithmetic and plumbing functions every worker binary ships with.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register("identity", |args| {
                arity(args, 1)?;
                Ok(args[0].clone())
            })
            .register("add", |args| binary(args, Num::checked_add))
            .register("sub", |args| binary(args, Num::checked_sub))
            .register("mul", |args| binary(args, Num::checked_mul))
            .register("div", |args| {
                arity(args, 2)?;
                let (a, b) = (number(&args[0])?.as_f64(), number(&args[1])?.as_f64());
                if b == 0.0 {
                    return Err(TaskFailure::new("DivisionByZero", "division by zero"));
                }
                float_value(a / b)
            })
            .register("neg", |args| {
                arity(args, 1)?;
                match number(&args[0])? {
                    Num::Int(i) => i
                        .checked_neg()
                        .map(Value::from)
                        .ok_or_else(|| TaskFailure::new("Overflow", "integer overflow")),
                    Num::Float(f) => float_value(-f),
                }
            })
            .register("inc", |args| {
                arity(args, 1)?;
                number(&args[0])?.checked_add(Num::Int(1))?.into_value()
            })
            .register("sum", |args| {
                let items = match args {
                    [Value::Array(items)] => items.as_slice(),
                    _ => args,
                };
                items
                    .iter()
                    .try_fold(Num::Int(0), |acc, v| acc.checked_add(number(v)?))?
                    .into_value()
            });
        registry
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

// ── Numeric helpers for the builtins ─────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    fn int_op(
        self,
        other: Self,
        int: fn(i64, i64) -> Option<i64>,
        float: fn(f64, f64) -> f64,
    ) -> Result<Self, TaskFailure> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => int(a, b)
                .map(Self::Int)
                .ok_or_else(|| TaskFailure::new("Overflow", "integer overflow")),
            (a, b) => Ok(Self::Float(float(a.as_f64(), b.as_f64()))),
        }
    }

    fn checked_add(self, other: Self) -> Result<Self, TaskFailure> {
        self.int_op(other, i64::checked_add, |a, b| a + b)
    }

    fn checked_sub(self, other: Self) -> Result<Self, TaskFailure> {
        self.int_op(other, i64::checked_sub, |a, b| a - b)
    }

    fn checked_mul(self, other: Self) -> Result<Self, TaskFailure> {
        self.int_op(other, i64::checked_mul, |a, b| a * b)
    }

    fn into_value(self) -> Result<Value, TaskFailure> {
        match self {
            Self::Int(i) => Ok(Value::from(i)),
            Self::Float(f) => float_value(f),
        }
    }
}

fn arity(args: &[Value], expected: usize) -> Result<(), TaskFailure> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(TaskFailure::type_error(format!(
            "expected {expected} arguments, got {}",
            args.len()
        )))
    }
}

fn number(v: &Value) -> Result<Num, TaskFailure> {
    if let Some(i) = v.as_i64() {
        return Ok(Num::Int(i));
    }
    v.as_f64()
        .map(Num::Float)
        .ok_or_else(|| TaskFailure::type_error(format!("expected a number, got {v}")))
}

fn float_value(f: f64) -> Result<Value, TaskFailure> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| TaskFailure::new("ArithmeticError", format!("non-finite result {f}")))
}

fn binary(
    args: &[Value],
    op: fn(Num, Num) -> Result<Num, TaskFailure>,
) -> Result<Value, TaskFailure> {
    arity(args, 2)?;
    op(number(&args[0])?, number(&args[1])?)?.into_value()
}
