//! Values carried by parameters and the conversions between value types
//!
//! A [`Value`] is a closed sum over the supported kinds. Converting a value
//! to a [`ValueType`] goes through one table per target type, each of which
//! matches every source variant, so no pair of types falls through silently.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Absolute tolerance used when comparing floating point components.
pub const FLOAT_TOLERANCE: f64 = 1e-6;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("cannot convert {from} to {to}")]
    TypeMismatch { from: ValueType, to: ValueType },
    #[error("unknown value type: {0}")]
    UnknownType(String),
}

/// Declared type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Char,
    String,
    Vec2f,
    Vec3f,
    Vec4f,
    List,
}

impl ValueType {
    pub const ALL: [ValueType; 9] = [
        ValueType::Bool,
        ValueType::Int,
        ValueType::Float,
        ValueType::Char,
        ValueType::String,
        ValueType::Vec2f,
        ValueType::Vec3f,
        ValueType::Vec4f,
        ValueType::List,
    ];

    /// Value a parameter of this type holds when no default is given
    pub fn default_value(self) -> Value {
        match self {
            ValueType::Bool => Value::Bool(false),
            ValueType::Int => Value::Int(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::Char => Value::Char(0),
            ValueType::String => Value::String(String::new()),
            ValueType::Vec2f => Value::Vec2f([0.0; 2]),
            ValueType::Vec3f => Value::Vec3f([0.0; 3]),
            ValueType::Vec4f => Value::Vec4f([0.0; 4]),
            ValueType::List => Value::List(Vec::new()),
        }
    }

    /// Number of components of a vector type
    pub fn arity(self) -> Option<usize> {
        match self {
            ValueType::Vec2f => Some(2),
            ValueType::Vec3f => Some(3),
            ValueType::Vec4f => Some(4),
            _ => None,
        }
    }

    /// Whether numeric bounds apply to values of this type
    pub fn is_bounded_kind(self) -> bool {
        matches!(
            self,
            ValueType::Int
                | ValueType::Float
                | ValueType::Char
                | ValueType::Vec2f
                | ValueType::Vec3f
                | ValueType::Vec4f
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Char => "char",
            ValueType::String => "string",
            ValueType::Vec2f => "vec2f",
            ValueType::Vec3f => "vec3f",
            ValueType::Vec4f => "vec4f",
            ValueType::List => "list",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ValueType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValueError::UnknownType(s.to_string()))
    }
}

/// A parameter value
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Float(f64),
    /// A single byte
    Char(u8),
    String(String),
    Vec2f([f64; 2]),
    Vec3f([f64; 3]),
    Vec4f([f64; 4]),
    List(Vec<Value>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Char(_) => ValueType::Char,
            Value::String(_) => ValueType::String,
            Value::Vec2f(_) => ValueType::Vec2f,
            Value::Vec3f(_) => ValueType::Vec3f,
            Value::Vec4f(_) => ValueType::Vec4f,
            Value::List(_) => ValueType::List,
        }
    }

    /// Convert this value to `target`.
    ///
    /// Numeric kinds convert into each other (Float to Int truncates). A
    /// string converts to a char only when it is exactly one byte long;
    /// any other length yields the null byte. Vector targets accept a
    /// vector or list of the same arity and nothing else. A list target
    /// accepts anything.
    pub fn convert(self, target: ValueType) -> Result<Value, ValueError> {
        let from = self.value_type();
        if from == target {
            return Ok(self);
        }

        let converted = match target {
            ValueType::Bool => self.to_bool().map(Value::Bool),
            ValueType::Int => self.to_int().map(Value::Int),
            ValueType::Float => self.to_float().map(Value::Float),
            ValueType::Char => self.to_char().map(Value::Char),
            ValueType::String => self.to_text().map(Value::String),
            ValueType::Vec2f => self.to_array::<2>().map(Value::Vec2f),
            ValueType::Vec3f => self.to_array::<3>().map(Value::Vec3f),
            ValueType::Vec4f => self.to_array::<4>().map(Value::Vec4f),
            ValueType::List => Some(Value::List(self.into_list())),
        };

        converted.ok_or(ValueError::TypeMismatch { from, to: target })
    }

    fn to_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Float(f) => Some(*f != 0.0),
            Value::Char(c) => Some(*c != 0),
            Value::String(s) => match s.trim() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            Value::Vec2f(_) | Value::Vec3f(_) | Value::Vec4f(_) => None,
            Value::List(items) => single(items).and_then(Value::to_bool),
        }
    }

    fn to_int(&self) -> Option<i32> {
        match self {
            Value::Bool(b) => Some(i32::from(*b)),
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i32),
            Value::Char(c) => Some(i32::from(*c)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i32>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|f| f as i32))
            }
            Value::Vec2f(_) | Value::Vec3f(_) | Value::Vec4f(_) => None,
            Value::List(items) => single(items).and_then(Value::to_int),
        }
    }

    fn to_float(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(f64::from(*i)),
            Value::Float(f) => Some(*f),
            Value::Char(c) => Some(f64::from(*c)),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Vec2f(_) | Value::Vec3f(_) | Value::Vec4f(_) => None,
            Value::List(items) => single(items).and_then(Value::to_float),
        }
    }

    fn to_char(&self) -> Option<u8> {
        match self {
            Value::Bool(b) => Some(u8::from(*b)),
            Value::Int(i) => u8::try_from(*i).ok(),
            Value::Float(f) => (f.is_finite() && (0.0..256.0).contains(f)).then(|| *f as u8),
            Value::Char(c) => Some(*c),
            // multi-byte input is not a char: it becomes the null byte
            Value::String(s) => match s.as_bytes() {
                [byte] => Some(*byte),
                _ => Some(0),
            },
            Value::Vec2f(_) | Value::Vec3f(_) | Value::Vec4f(_) => None,
            Value::List(items) => single(items).and_then(Value::to_char),
        }
    }

    fn to_text(&self) -> Option<String> {
        match self {
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Char(c) => Some(char::from(*c).to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Vec2f(_) | Value::Vec3f(_) | Value::Vec4f(_) => None,
            Value::List(items) => single(items).and_then(Value::to_text),
        }
    }

    fn to_array<const N: usize>(&self) -> Option<[f64; N]> {
        let components: Vec<f64> = match self {
            Value::Vec2f(v) => v.to_vec(),
            Value::Vec3f(v) => v.to_vec(),
            Value::Vec4f(v) => v.to_vec(),
            Value::List(items) => items
                .iter()
                .map(Value::to_float)
                .collect::<Option<Vec<_>>>()?,
            Value::Bool(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::Char(_)
            | Value::String(_) => return None,
        };
        components.try_into().ok()
    }

    fn into_list(self) -> Vec<Value> {
        match self {
            Value::List(items) => items,
            Value::Vec2f(v) => v.iter().copied().map(Value::Float).collect(),
            Value::Vec3f(v) => v.iter().copied().map(Value::Float).collect(),
            Value::Vec4f(v) => v.iter().copied().map(Value::Float).collect(),
            scalar => vec![scalar],
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<char> {
        match self {
            Value::Char(c) => Some(char::from(*c)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Floating point components of a vector value
    pub fn components(&self) -> Option<&[f64]> {
        match self {
            Value::Vec2f(v) => Some(v),
            Value::Vec3f(v) => Some(v),
            Value::Vec4f(v) => Some(v),
            _ => None,
        }
    }
}

fn single(items: &[Value]) -> Option<&Value> {
    match items {
        [item] => Some(item),
        _ => None,
    }
}

/// Compare two floats with [`FLOAT_TOLERANCE`], scaled for large magnitudes
pub fn approx_eq(a: f64, b: f64) -> bool {
    if a == b {
        return true;
    }
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= FLOAT_TOLERANCE * scale
}

fn components_eq(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| approx_eq(*x, *y))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => approx_eq(*a, *b),
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Vec2f(a), Value::Vec2f(b)) => components_eq(a, b),
            (Value::Vec3f(a), Value::Vec3f(b)) => components_eq(a, b),
            (Value::Vec4f(a), Value::Vec4f(b)) => components_eq(a, b),
            (Value::List(a), Value::List(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: impl Iterator<Item = String>) -> fmt::Result {
            let items: Vec<String> = items.collect();
            write!(f, "[{}]", items.join(", "))
        }

        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Char(c) => write!(f, "{:?}", char::from(*c)),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Vec2f(v) => join(f, v.iter().map(|c| c.to_string())),
            Value::Vec3f(v) => join(f, v.iter().map(|c| c.to_string())),
            Value::Vec4f(v) => join(f, v.iter().map(|c| c.to_string())),
            Value::List(items) => join(f, items.iter().map(|v| v.to_string())),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

/// Chars outside the single-byte range become the null byte
impl From<char> for Value {
    fn from(v: char) -> Self {
        Value::Char(u8::try_from(u32::from(v)).unwrap_or(0))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<[f64; 2]> for Value {
    fn from(v: [f64; 2]) -> Self {
        Value::Vec2f(v)
    }
}

impl From<[f64; 3]> for Value {
    fn from(v: [f64; 3]) -> Self {
        Value::Vec3f(v)
    }
}

impl From<[f64; 4]> for Value {
    fn from(v: [f64; 4]) -> Self {
        Value::Vec4f(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}
