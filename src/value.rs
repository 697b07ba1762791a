//! Parameter value model shared by raw file trees and resolved instances.
//!
//! A [`ConfigValue`] is either a scalar, a list, or a table of further values.
//! Tables only occur in raw trees parsed from files; resolved instances hold
//! scalars and lists exclusively. `Null` can only come from a JSON document
//! and never survives reconciliation.

use serde::ser::{Serialize, Serializer};
use std::collections::BTreeMap;

/// A single configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<ConfigValue>),
    Table(BTreeMap<String, ConfigValue>),
    /// JSON `null`; invalid for every declared field type.
    Null,
}

impl ConfigValue {
    /// Human-readable kind name, used in coercion diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigValue::Str(_) => "string",
            ConfigValue::Int(_) => "integer",
            ConfigValue::Float(_) => "float",
            ConfigValue::Bool(_) => "boolean",
            ConfigValue::List(_) => "list",
            ConfigValue::Table(_) => "table",
            ConfigValue::Null => "null",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::List(xs) => Some(xs),
            _ => None,
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::Str(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::Str(s)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Int(i)
    }
}

impl From<f64> for ConfigValue {
    fn from(f: f64) -> Self {
        ConfigValue::Float(f)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<toml::Value> for ConfigValue {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => ConfigValue::Str(s),
            toml::Value::Integer(i) => ConfigValue::Int(i),
            toml::Value::Float(f) => ConfigValue::Float(f),
            toml::Value::Boolean(b) => ConfigValue::Bool(b),
            // Datetimes carry no dedicated field type; keep their text form.
            toml::Value::Datetime(d) => ConfigValue::Str(d.to_string()),
            toml::Value::Array(xs) => ConfigValue::List(xs.into_iter().map(Into::into).collect()),
            toml::Value::Table(t) => {
                ConfigValue::Table(t.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<serde_json::Value> for ConfigValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ConfigValue::Null,
            serde_json::Value::Bool(b) => ConfigValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ConfigValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    ConfigValue::Float(f)
                } else {
                    ConfigValue::Null
                }
            }
            serde_json::Value::String(s) => ConfigValue::Str(s),
            serde_json::Value::Array(xs) => {
                ConfigValue::List(xs.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(m) => {
                ConfigValue::Table(m.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl Serialize for ConfigValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ConfigValue::Str(s) => serializer.serialize_str(s),
            ConfigValue::Int(i) => serializer.serialize_i64(*i),
            ConfigValue::Float(f) => serializer.serialize_f64(*f),
            ConfigValue::Bool(b) => serializer.serialize_bool(*b),
            ConfigValue::List(xs) => xs.serialize(serializer),
            ConfigValue::Table(t) => t.serialize(serializer),
            ConfigValue::Null => serializer.serialize_unit(),
        }
    }
}
