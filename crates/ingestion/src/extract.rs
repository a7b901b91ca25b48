//! Ordered field extractors
//!
//! Producers have used several names for the same logical field over time.
//! Each logical field is resolved through an explicit priority chain; the
//! first alias holding a non-null value wins, even if that value later fails
//! coercion.

use serde_json::Value;

/// Location of a field inside a payload object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPath {
    /// Top-level key
    Top(&'static str),
    /// `outer.inner`
    Nested(&'static str, &'static str),
}

impl FieldPath {
    /// Value at this path; JSON `null` counts as absent
    pub fn lookup<'a>(&self, payload: &'a Value) -> Option<&'a Value> {
        let value = match self {
            Self::Top(key) => payload.get(key),
            Self::Nested(outer, inner) => payload.get(outer).and_then(|o| o.get(inner)),
        };
        value.filter(|v| !v.is_null())
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Top(key) => f.write_str(key),
            Self::Nested(outer, inner) => write!(f, "{outer}.{inner}"),
        }
    }
}

/// Latitude aliases, highest priority first
pub const LATITUDE_CHAIN: &[FieldPath] = &[
    FieldPath::Top("latitude"),
    FieldPath::Top("lat"),
    FieldPath::Top("y"),
    FieldPath::Nested("position", "lat"),
];

/// Longitude aliases, highest priority first
pub const LONGITUDE_CHAIN: &[FieldPath] = &[
    FieldPath::Top("longitude"),
    FieldPath::Top("lng"),
    FieldPath::Top("x"),
    FieldPath::Nested("position", "lng"),
];

/// Timestamp aliases
pub const TIMESTAMP_CHAIN: &[FieldPath] = &[FieldPath::Top("timestamp"), FieldPath::Top("ts")];

/// First defined value along `chain`, with the alias it came from
pub fn first_defined<'a>(payload: &'a Value, chain: &[FieldPath]) -> Option<(FieldPath, &'a Value)> {
    chain
        .iter()
        .find_map(|path| path.lookup(payload).map(|value| (*path, value)))
}

/// Numeric coercion: JSON numbers and numeric strings. Non-finite results
/// are `None`.
pub fn coerce_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<f64>().ok()?
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Why a coordinate could not be resolved
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateError {
    /// No alias present
    Missing,
    /// First present alias is not a finite number
    NotFinite { field: FieldPath, value: Value },
}

impl std::fmt::Display for CoordinateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => f.write_str("missing"),
            Self::NotFinite { field, value } => write!(f, "'{field}' is not a finite number ({value})"),
        }
    }
}

/// Resolve a coordinate through its alias chain
pub fn resolve_coordinate(payload: &Value, chain: &[FieldPath]) -> Result<f64, CoordinateError> {
    let (field, value) = first_defined(payload, chain).ok_or(CoordinateError::Missing)?;
    coerce_f64(value).ok_or_else(|| CoordinateError::NotFinite {
        field,
        value: value.clone(),
    })
}

/// Optional numeric field; absent or non-numeric yields `None`
pub fn optional_f64(payload: &Value, key: &str) -> Option<f64> {
    payload.get(key).and_then(coerce_f64)
}

/// Optional textual field. Numbers and booleans are rendered as text so ids
/// like `"id": 42` survive.
pub fn optional_string(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
