//! Dynamic payload values carried in function arguments, results and hook data.
//!
//! [`Value`] is the runtime's own tree type; the codec converts it to and
//! from `serde_json::Value` at the edge so nothing else in the crate depends
//! on the text encoding.
//!
//! # Integers
//!
//! JSON numbers that fit in an `i64` decode as [`Value::Signed`]; positive
//! numbers above `i64::MAX` decode as [`Value::Unsigned`]. Equality treats a
//! signed and an unsigned value denoting the same number as equal, so a
//! value built from a `u64` still compares equal after a round trip.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Function call arguments: a mapping from argument name to value.
pub type Arguments = BTreeMap<String, Value>;

/// A dynamically typed payload value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absence of a value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Signed(i64),
    /// Unsigned 64-bit integer.
    Unsigned(u64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered list.
    List(Vec<Value>),
    /// Mapping with unique keys.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Convert a parsed JSON tree into a `Value`.
    pub fn from_json(raw: serde_json::Value) -> Self {
        match raw {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Signed(i)
                } else if let Some(u) = n.as_u64() {
                    Self::Unsigned(u)
                } else {
                    // serde_json numbers are always one of i64, u64 or f64
                    n.as_f64().map_or(Self::Null, Self::Float)
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert this value into a JSON tree.
    ///
    /// Non-finite floats have no JSON representation and become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Signed(i) => serde_json::Value::from(*i),
            Self::Unsigned(u) => serde_json::Value::from(*u),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Build a value from any serializable Rust type.
    pub fn from_serialize<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        serde_json::to_value(value).map(Self::from_json)
    }

    /// Deserialize this value into a Rust type.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.to_json())
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true for [`Value::Bool`].
    pub fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    /// Returns true for any numeric variant.
    pub fn is_number(&self) -> bool {
        matches!(self, Self::Signed(_) | Self::Unsigned(_) | Self::Float(_))
    }

    /// Returns true for [`Value::String`].
    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// Returns true for [`Value::List`].
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Returns true for [`Value::Map`].
    pub fn is_map(&self) -> bool {
        matches!(self, Self::Map(_))
    }

    /// The boolean, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer as `i64`, if it is an integer that fits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Signed(i) => Some(*i),
            Self::Unsigned(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    /// The integer as `u64`, if it is a non-negative integer.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Signed(i) => u64::try_from(*i).ok(),
            Self::Unsigned(u) => Some(*u),
            _ => None,
        }
    }

    /// The number as `f64`. Integers are widened, possibly losing precision.
    #[allow(clippy::cast_precision_loss, reason = "documented widening")]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Signed(i) => Some(*i as f64),
            Self::Unsigned(u) => Some(*u as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The string slice, if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The items, if this is a `List`.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// The entries, if this is a `Map`.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key in a `Map`. Returns `None` for other variants.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Signed(a), Self::Signed(b)) => a == b,
            (Self::Unsigned(a), Self::Unsigned(b)) => a == b,
            (Self::Signed(a), Self::Unsigned(b)) | (Self::Unsigned(b), Self::Signed(a)) => {
                u64::try_from(*a).is_ok_and(|a| a == *b)
            }
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(raw: serde_json::Value) -> Self {
        Self::from_json(raw)
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        value.to_json()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Signed(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Signed(i)
    }
}

impl From<u32> for Value {
    fn from(u: u32) -> Self {
        Self::Unsigned(u64::from(u))
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Self::Unsigned(u)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::Map(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_integers_classified_by_sign_and_magnitude() {
        assert!(matches!(Value::from_json(json!(5)), Value::Signed(5)));
        assert!(matches!(Value::from_json(json!(-5)), Value::Signed(-5)));
        assert!(matches!(
            Value::from_json(json!(u64::MAX)),
            Value::Unsigned(u64::MAX)
        ));
        assert!(matches!(Value::from_json(json!(1.5)), Value::Float(f) if f == 1.5));
    }

    #[test]
    fn test_nested_tree_round_trip() {
        let raw = json!({
            "name": "juno",
            "tags": ["a", "b"],
            "nested": {"enabled": true, "ratio": 0.25, "none": null},
            "big": u64::MAX,
            "neg": -42
        });
        let value = Value::from_json(raw.clone());
        assert_eq!(value.to_json(), raw);
    }

    #[test]
    fn test_signed_equals_unsigned_of_same_number() {
        assert_eq!(Value::Signed(7), Value::Unsigned(7));
        assert_eq!(Value::Unsigned(7), Value::Signed(7));
        assert_ne!(Value::Signed(-1), Value::Unsigned(u64::MAX));
        assert_ne!(Value::Signed(1), Value::Float(1.0));
    }

    #[test]
    fn test_unsigned_survives_json_round_trip() {
        let value = Value::from(3u64);
        assert_eq!(Value::from_json(value.to_json()), value);
    }

    #[test]
    fn test_non_finite_float_encodes_as_null() {
        assert_eq!(Value::Float(f64::NAN).to_json(), serde_json::Value::Null);
        assert_eq!(Value::Float(f64::INFINITY).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn test_accessors() {
        let value = Value::from_json(json!({"n": 3, "s": "x", "l": [1], "b": false}));
        assert!(value.is_map());
        assert_eq!(value.get("n").and_then(Value::as_i64), Some(3));
        assert_eq!(value.get("n").and_then(Value::as_u64), Some(3));
        assert_eq!(value.get("n").and_then(Value::as_f64), Some(3.0));
        assert_eq!(value.get("s").and_then(Value::as_str), Some("x"));
        assert_eq!(value.get("l").and_then(Value::as_list).map(<[Value]>::len), Some(1));
        assert_eq!(value.get("b").and_then(Value::as_bool), Some(false));
        assert!(value.get("missing").is_none());
        assert!(Value::Signed(-1).as_u64().is_none());
        assert!(Value::Null.is_null());
    }

    #[test]
    fn test_typed_conversion() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Point {
            x: i64,
            y: i64,
        }

        let value = Value::from_serialize(&Point { x: 1, y: -2 }).unwrap();
        assert_eq!(value.get("y"), Some(&Value::Signed(-2)));
        let back: Point = value.deserialize_into().unwrap();
        assert_eq!(back, Point { x: 1, y: -2 });
    }

    #[test]
    fn test_from_impls() {
        assert_eq!(Value::from("a"), Value::String("a".into()));
        assert_eq!(Value::from(vec![1i64, 2]), Value::List(vec![Value::Signed(1), Value::Signed(2)]));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(true), Value::Bool(true));
    }
}
