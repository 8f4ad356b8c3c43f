//! Scalar cell values carried by [`Record`](crate::record::Record)s.
//!
//! [`Value`] is a closed tagged union. It serializes as plain JSON so that
//! records, checkpoints, and dead-letter artifacts stay human-readable;
//! dates and datetimes render as ISO-8601 strings.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Format used when rendering [`Value::DateTime`].
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Format used when rendering [`Value::Date`].
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Value {
    /// Short lowercase name of the variant, used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True for `Null` and for the empty string.
    #[must_use]
    pub fn is_null_or_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) => s.is_empty(),
            _ => false,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the value. Strings are parsed; anything else is `None`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    /// Temporal view of the value. Dates map to midnight; strings are parsed
    /// as ISO-8601.
    #[must_use]
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Date(d) => Some(d.and_time(NaiveTime::MIN)),
            Self::DateTime(dt) => Some(*dt),
            Self::String(s) => parse_iso_date(s)
                .map(|d| d.and_time(NaiveTime::MIN))
                .or_else(|| parse_iso_datetime(s)),
            _ => None,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    /// Order two tracking-column values.
    ///
    /// The comparison is picked from the runtime types: numeric when both
    /// sides are numbers, chronological when both sides are temporal (or
    /// strings that parse as ISO-8601), lexicographic on the rendered text
    /// otherwise. Returns `None` when either side is null or a float is NaN.
    #[must_use]
    pub fn compare_tracking(&self, other: &Self) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => return Some(a.cmp(b)),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                return a.as_f64()?.partial_cmp(&b.as_f64()?);
            }
            _ => {}
        }
        if let (Some(a), Some(b)) = (self.as_datetime(), other.as_datetime()) {
            return Some(a.cmp(&b));
        }
        Some(self.to_string().cmp(&other.to_string()))
    }

    /// Loose equality used for list membership: numbers compare numerically
    /// across `Int`/`Float`, everything else structurally.
    #[must_use]
    pub fn loosely_equals(&self, other: &Self) -> bool {
        if self.is_numeric() && other.is_numeric() {
            return self.as_f64() == other.as_f64();
        }
        self == other
    }
}

/// Parse a strict `YYYY-MM-DD` date.
#[must_use]
pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    if s.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

/// Parse an ISO-8601 datetime: RFC 3339 (normalized to UTC) or a naive
/// `T`/space separated timestamp with optional fractional seconds.
#[must_use]
pub fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
            Self::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Self::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
        }
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::String(s),
            nested @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Self::String(nested.to_string())
            }
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(i) => Self::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Self::Null, Self::Number),
            Value::String(_) | Value::Date(_) | Value::DateTime(_) => Self::String(value.to_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Self::Float(_) => serializer.serialize_none(),
            Self::String(s) => serializer.serialize_str(s),
            Self::Date(_) | Self::DateTime(_) => serializer.collect_str(self),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("2024-01-02T03:04:05", true)]
    #[case("2024-01-02 03:04:05.123", true)]
    #[case("2024-01-02T03:04:05+02:00", true)]
    #[case("2024-01-02T03:04", true)]
    #[case("2024-01-02", false)]
    #[case("yesterday", false)]
    fn iso_datetime_parsing(#[case] input: &str, #[case] parses: bool) {
        assert_eq!(parse_iso_datetime(input).is_some(), parses, "input: {input}");
    }

    #[test]
    fn offset_datetimes_normalize_to_utc() {
        let dt = parse_iso_datetime("2024-01-02T03:04:05+02:00").unwrap();
        assert_eq!(dt.to_string(), "2024-01-02 01:04:05");
    }

    #[test]
    fn numeric_tracking_compare_crosses_int_and_float() {
        assert_eq!(Value::Int(2).compare_tracking(&Value::Float(2.5)), Some(Ordering::Less));
        assert_eq!(Value::Int(10).compare_tracking(&Value::Int(9)), Some(Ordering::Greater));
    }

    #[test]
    fn temporal_tracking_compare_parses_iso_strings() {
        let a = Value::from("2024-01-02T00:00:00Z");
        let b = Value::from("2024-01-10");
        assert_eq!(a.compare_tracking(&b), Some(Ordering::Less));

        let d = Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(d.compare_tracking(&Value::from("2024-02-29 23:59:59")), Some(Ordering::Greater));
    }

    #[test]
    fn string_tracking_compare_is_lexicographic() {
        assert_eq!(Value::from("b").compare_tracking(&Value::from("a")), Some(Ordering::Greater));
        // Lexicographic, not numeric, when the sides are strings.
        assert_eq!(Value::from("10").compare_tracking(&Value::from("9")), Some(Ordering::Less));
    }

    #[test]
    fn null_never_compares() {
        assert_eq!(Value::Null.compare_tracking(&Value::Int(1)), None);
    }

    #[test]
    fn json_numbers_prefer_int() {
        let v: Value = serde_json::from_str("42").unwrap();
        assert_eq!(v, Value::Int(42));
        let v: Value = serde_json::from_str("4.5").unwrap();
        assert_eq!(v, Value::Float(4.5));
    }

    #[test]
    fn temporal_values_serialize_as_iso_strings() {
        let dt = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap().and_hms_opt(7, 8, 9).unwrap();
        let json = serde_json::to_string(&Value::DateTime(dt)).unwrap();
        assert_eq!(json, "\"2024-05-06T07:08:09\"");
        let json = serde_json::to_string(&Value::Date(dt.date())).unwrap();
        assert_eq!(json, "\"2024-05-06\"");
    }

    #[test]
    fn empty_string_counts_as_null_or_empty() {
        assert!(Value::from("").is_null_or_empty());
        assert!(!Value::from(" ").is_null_or_empty());
        assert!(!Value::Int(0).is_null_or_empty());
    }

    #[test]
    fn loose_equality_matches_numbers_across_variants() {
        assert!(Value::Int(1).loosely_equals(&Value::Float(1.0)));
        assert!(!Value::Int(1).loosely_equals(&Value::from("1")));
    }
}
