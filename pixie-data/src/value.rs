use std::fmt;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// A single decoded scalar.
///
/// `Uint128` is the one surprising mapping: the wire type is an unsigned
/// 128-bit integer, but this library renders it as a [`Uuid`] built from
/// its high/low 64-bit halves, which is how the server actually uses the
/// type (process/container identifiers) in practice.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int64(i64),
    Uuid(Uuid),
    Float64(f64),
    String(String),
    Time(DateTime<Utc>),
    Duration(Duration),
}

impl Value {
    /// Builds the `Uuid` rendering of a `UINT128` value from its high and
    /// low 64-bit halves, matching [`Uuid::from_u64_pair`]'s byte layout.
    pub fn uint128(high: u64, low: u64) -> Value {
        Value::Uuid(Uuid::from_u64_pair(high, low))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Value::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Time(t) => write!(f, "{}", t.to_rfc3339()),
            Value::Duration(d) => write!(f, "{}ns", d.num_nanoseconds().unwrap_or(i64::MAX)),
        }
    }
}
