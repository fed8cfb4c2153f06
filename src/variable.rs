//! Variable declarations and type coercion.
//!
//! All conversions between raw values (supplied on the command line, read from
//! var files, typed at a prompt or produced by rendering) and a variable's
//! declared type go through [`VariableType::convert`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Synthetic entry exposing the current config, options and dependency.
pub const THIS_KEY: &str = "this";
/// Synthetic entry holding the root config's variable declarations.
pub const ROOT_CONFIG_VARS_KEY: &str = "root_config_vars";
/// Synthetic entry holding the root config's dependency declarations.
pub const ROOT_CONFIG_DEPS_KEY: &str = "root_config_deps";
/// The current `for_each` element.
pub const EACH_KEY: &str = "__each__";

const NAMESPACE_SEPARATOR: char = '.';

/// The closed set of variable types a manifest may declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    #[default]
    String,
    Int,
    Float,
    Bool,
    List,
    Map,
    Enum,
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VariableType::String => "string",
            VariableType::Int => "int",
            VariableType::Float => "float",
            VariableType::Bool => "bool",
            VariableType::List => "list",
            VariableType::Map => "map",
            VariableType::Enum => "enum",
        };
        f.write_str(name)
    }
}

/// A variable declared in a manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub var_type: VariableType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<Value>,
    /// Name of another variable whose resolved value this one adopts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Variable {
    pub fn new<S: Into<String>>(name: S, var_type: VariableType) -> Self {
        Self { name: name.into(), var_type, ..Default::default() }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_reference<S: Into<String>>(mut self, reference: S) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_options(mut self, options: Vec<Value>) -> Self {
        self.options = options;
        self
    }

    /// Coerces `value` to this variable's declared type.
    pub fn convert(&self, value: Value) -> Result<Value> {
        self.var_type.convert(&self.name, value, &self.options)
    }

    /// Checks the per-type invariants a manifest must satisfy.
    pub fn validate(&self) -> Result<()> {
        match (self.var_type, self.options.is_empty()) {
            (VariableType::Enum, true) => Err(Error::config(format!(
                "Variable '{}' is an enum but declares no options",
                self.name
            ))),
            (VariableType::Enum, false) => Ok(()),
            (other, false) => Err(Error::config(format!(
                "Variable '{}' has type '{other}' and must not declare options",
                self.name
            ))),
            (_, true) => Ok(()),
        }
    }
}

impl VariableType {
    /// Converts a raw value to this type.
    ///
    /// Strings are parsed for non-string types (`"42"` becomes `42` for an int,
    /// `"[a, b]"` becomes a list). `null` passes through unchanged so that a
    /// variable without a value can still be rendered under a lenient
    /// missing-key policy.
    pub fn convert(&self, name: &str, value: Value, options: &[Value]) -> Result<Value> {
        if value.is_null() {
            return Ok(value);
        }

        let invalid = |value: &Value| Error::InvalidVariableValue {
            variable: name.to_string(),
            value: display_value(value),
            expected: self.to_string(),
        };

        match self {
            VariableType::String => match value {
                Value::String(_) => Ok(value),
                Value::Bool(_) | Value::Number(_) => Ok(Value::String(display_value(&value))),
                other => Err(invalid(&other)),
            },
            VariableType::Int => match &value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value),
                Value::Number(n) => match n.as_f64() {
                    Some(f) if f.fract() == 0.0 => Ok(Value::from(f as i64)),
                    _ => Err(invalid(&value)),
                },
                Value::String(s) => {
                    s.trim().parse::<i64>().map(Value::from).map_err(|_| invalid(&value))
                }
                _ => Err(invalid(&value)),
            },
            VariableType::Float => match &value {
                Value::Number(n) => n.as_f64().map(Value::from).ok_or_else(|| invalid(&value)),
                Value::String(s) => {
                    s.trim().parse::<f64>().map(Value::from).map_err(|_| invalid(&value))
                }
                _ => Err(invalid(&value)),
            },
            VariableType::Bool => match &value {
                Value::Bool(_) => Ok(value),
                Value::String(s) => parse_bool(s.trim()).map(Value::Bool).ok_or_else(|| invalid(&value)),
                _ => Err(invalid(&value)),
            },
            VariableType::List => match value {
                Value::Array(_) => Ok(value),
                Value::String(ref s) => match parse_structured(s) {
                    Some(parsed @ Value::Array(_)) => Ok(parsed),
                    _ => Err(invalid(&value)),
                },
                other => Err(invalid(&other)),
            },
            VariableType::Map => match value {
                Value::Object(_) => Ok(value),
                Value::String(ref s) => match parse_structured(s) {
                    Some(parsed @ Value::Object(_)) => Ok(parsed),
                    _ => Err(invalid(&value)),
                },
                other => Err(invalid(&other)),
            },
            VariableType::Enum => {
                let candidate = match &value {
                    Value::Array(_) | Value::Object(_) => return Err(invalid(&value)),
                    other => display_value(other),
                };
                options
                    .iter()
                    .find(|option| display_value(option) == candidate)
                    .cloned()
                    .ok_or_else(|| Error::InvalidVariableValue {
                        variable: name.to_string(),
                        value: candidate,
                        expected: format!(
                            "one of [{}]",
                            options.iter().map(display_value).collect::<Vec<_>>().join(", ")
                        ),
                    })
            }
        }
    }
}

/// Accepts the same spellings as Go's `strconv.ParseBool`.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

fn parse_structured(s: &str) -> Option<Value> {
    serde_yaml::from_str::<Value>(s).ok()
}

/// Formats a value the way it appears in rendered output: strings unquoted,
/// everything else as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `"<dependency>.<variable>"`.
pub fn namespaced(dependency: &str, variable: &str) -> String {
    format!("{dependency}{NAMESPACE_SEPARATOR}{variable}")
}

/// Splits a key at its first separator into `(dependency, rest)`.
pub fn split_namespace(key: &str) -> Option<(&str, &str)> {
    key.split_once(NAMESPACE_SEPARATOR)
}

pub fn is_namespaced(key: &str) -> bool {
    key.contains(NAMESPACE_SEPARATOR)
}

/// Whether `key` is one of the entries the pipeline injects itself.
pub fn is_synthetic(key: &str) -> bool {
    matches!(key, THIS_KEY | ROOT_CONFIG_VARS_KEY | ROOT_CONFIG_DEPS_KEY | EACH_KEY)
}
