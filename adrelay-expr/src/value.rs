//! Runtime value type the expression evaluator operates on. Modeled on
//! the rules engine's `Value` (penserai-acteon's
//! `crates/rules/rules/src/engine/value.rs`): a small, serde-friendly
//! tagged union with JSON as its only input format.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Self::Float(f)
                } else {
                    Self::Null
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(arr) => {
                Self::List(arr.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(obj) => {
                Self::Map(obj.into_iter().map(|(k, v)| (k, Self::from_json(v))).collect())
            }
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// String value for building downstream URLs/bodies: `Null` becomes
    /// `None`, everything else stringifies the way the adapters expect
    /// (numbers without quotes, strings verbatim).
    #[must_use]
    pub fn as_display(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(n) => Some(n.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::String(s) => Some(s.clone()),
            Self::List(_) | Self::Map(_) => Some(format!("{self:?}")),
        }
    }

    /// Field access used by dotted-path lookups (`udm.ad.ad_id`).
    /// Non-map values and missing keys both resolve to `Null`, matching
    /// `_get_path`'s original "just return None" behavior rather than
    /// erroring.
    #[must_use]
    pub fn field(&self, name: &str) -> Self {
        match self {
            Self::Map(m) => m.get(name).cloned().unwrap_or(Self::Null),
            _ => Self::Null,
        }
    }

    /// Walk a dot-separated path (e.g. `ad.ad_id`) from this value.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Self {
        if path.is_empty() {
            return Self::Null;
        }
        let mut cur = self.clone();
        for part in path.split('.') {
            if part.is_empty() {
                continue;
            }
            cur = cur.field(part);
            if cur.is_null() {
                return Self::Null;
            }
        }
        cur
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_path_walks_nested_map() {
        let json = serde_json::json!({"ad": {"ad_id": "67576"}});
        let v = Value::from_json(json);
        assert_eq!(v.get_path("ad.ad_id"), Value::String("67576".into()));
        assert_eq!(v.get_path("ad.missing"), Value::Null);
        assert_eq!(v.get_path("nope.nope"), Value::Null);
    }
}
