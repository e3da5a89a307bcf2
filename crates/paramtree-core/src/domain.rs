//! Parameter domains and bound handling

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::Value;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("domain minimum {min} is greater than maximum {max}")]
    InvalidBounds { min: f64, max: f64 },
    #[error("domain bound is not a number")]
    NotANumber,
}

/// What happens to a numeric component that falls outside the domain bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundingMode {
    /// Bounds are advertised but not enforced
    Free,
    /// Clamp to both bounds
    #[default]
    Clip,
    /// Clamp to the minimum only
    Low,
    /// Clamp to the maximum only
    High,
    /// Wrap around into `[min, max)`
    Wrap,
    /// Reflect back into `[min, max]`
    Fold,
}

impl BoundingMode {
    /// OSCQuery `CLIPMODE` keyword
    pub fn as_str(self) -> &'static str {
        match self {
            BoundingMode::Free => "none",
            BoundingMode::Clip => "both",
            BoundingMode::Low => "low",
            BoundingMode::High => "high",
            BoundingMode::Wrap => "wrap",
            BoundingMode::Fold => "fold",
        }
    }
}

/// Validity constraint attached to a parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Domain {
    /// Numeric bounds, applied to every numeric component
    Bounds { min: Option<f64>, max: Option<f64> },
    /// Accepted values; advisory only, never enforced on writes
    Values(Vec<Value>),
}

impl Domain {
    /// Bounds with both sides set
    pub fn range(min: impl Into<f64>, max: impl Into<f64>) -> Result<Self, DomainError> {
        Self::bounds(Some(min.into()), Some(max.into()))
    }

    /// Bounds where either side may be open
    pub fn bounds(min: Option<f64>, max: Option<f64>) -> Result<Self, DomainError> {
        if min.is_some_and(f64::is_nan) || max.is_some_and(f64::is_nan) {
            return Err(DomainError::NotANumber);
        }
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(DomainError::InvalidBounds { min, max });
            }
        }
        Ok(Domain::Bounds { min, max })
    }

    /// Enumerated set of accepted values
    pub fn enumeration<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Domain::Values(values.into_iter().map(Into::into).collect())
    }

    pub fn min(&self) -> Option<f64> {
        match self {
            Domain::Bounds { min, .. } => *min,
            Domain::Values(_) => None,
        }
    }

    pub fn max(&self) -> Option<f64> {
        match self {
            Domain::Bounds { max, .. } => *max,
            Domain::Values(_) => None,
        }
    }

    /// Enumerated values, empty for numeric bounds
    pub fn values(&self) -> &[Value] {
        match self {
            Domain::Bounds { .. } => &[],
            Domain::Values(values) => values,
        }
    }

    /// Whether `value` lies inside the domain. Used for reporting only.
    pub fn contains(&self, value: &Value) -> bool {
        match self {
            Domain::Bounds { min, max } => {
                let inside = |x: f64| min.map_or(true, |lo| x >= lo) && max.map_or(true, |hi| x <= hi);
                match value {
                    Value::Int(i) => inside(f64::from(*i)),
                    Value::Float(f) => inside(*f),
                    Value::Char(c) => inside(f64::from(*c)),
                    other => other.components().map_or(true, |c| c.iter().all(|x| inside(*x))),
                }
            }
            Domain::Values(values) => values.is_empty() || values.contains(value),
        }
    }

    /// Bring `value` into the domain according to `mode`.
    ///
    /// Vector components are bounded independently. Values without numeric
    /// components, and every value under an enumerated domain, pass through
    /// unchanged.
    pub fn apply(&self, mode: BoundingMode, value: Value) -> Value {
        let (min, max) = match self {
            Domain::Bounds { min, max } => (*min, *max),
            Domain::Values(_) => return value,
        };
        let bound = |x: f64| bound_component(x, min, max, mode);

        match value {
            Value::Int(i) => Value::Int(bound(f64::from(i)) as i32),
            Value::Float(f) => Value::Float(bound(f)),
            Value::Char(c) => Value::Char(bound(f64::from(c)) as u8),
            Value::Vec2f(v) => Value::Vec2f(v.map(bound)),
            Value::Vec3f(v) => Value::Vec3f(v.map(bound)),
            Value::Vec4f(v) => Value::Vec4f(v.map(bound)),
            other @ (Value::Bool(_) | Value::String(_) | Value::List(_)) => other,
        }
    }
}

fn bound_component(x: f64, min: Option<f64>, max: Option<f64>, mode: BoundingMode) -> f64 {
    let clip_low = |x: f64| min.map_or(x, |lo| x.max(lo));
    let clip_high = |x: f64| max.map_or(x, |hi| x.min(hi));

    match mode {
        BoundingMode::Free => x,
        BoundingMode::Clip => clip_high(clip_low(x)),
        BoundingMode::Low => clip_low(x),
        BoundingMode::High => clip_high(x),
        BoundingMode::Wrap | BoundingMode::Fold => match (min, max) {
            (Some(lo), Some(hi)) if hi > lo => {
                if (lo..=hi).contains(&x) {
                    return x;
                }
                let range = hi - lo;
                if mode == BoundingMode::Wrap {
                    lo + (x - lo).rem_euclid(range)
                } else {
                    let offset = (x - lo).rem_euclid(2.0 * range);
                    lo + if offset > range { 2.0 * range - offset } else { offset }
                }
            }
            // wrapping needs a closed, non-empty interval
            _ => clip_high(clip_low(x)),
        },
    }
}
