//! Caller-supplied variable values.
//!
//! Values come from three places, lowest precedence first: `STENCIL_<NAME>`
//! environment variables, `--var NAME=VALUE` arguments and `--var-file` files.
//! Values from the first two are kept as raw strings; the declared type of the
//! variable they are assigned to decides how they are parsed.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde_json::Value;
use std::path::Path;

/// Prefix of environment variables that supply values.
pub const ENV_PREFIX: &str = "STENCIL_";

pub type SuppliedValues = IndexMap<String, Value>;

/// Parses a raw value the way it would appear in a YAML document.
///
/// `42` becomes a number, `[a, b]` a list and `true` a bool. The empty string
/// stays an empty string, and text that is not valid YAML or that contains
/// template syntax is kept verbatim.
pub fn parse_value(raw: &str) -> Value {
    if raw.is_empty() || raw.contains("{{") || raw.contains("{%") {
        return Value::String(raw.to_string());
    }
    serde_yaml::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Parses one `NAME=VALUE` assignment. The value is kept verbatim.
pub fn parse_var(assignment: &str) -> Result<(String, Value)> {
    match assignment.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), Value::String(value.to_string())))
        }
        _ => Err(Error::ParseError(format!(
            "Invalid variable assignment '{assignment}'; expected NAME=VALUE"
        ))),
    }
}

pub fn parse_vars<S: AsRef<str>>(assignments: &[S]) -> Result<SuppliedValues> {
    assignments.iter().map(|a| parse_var(a.as_ref())).collect()
}

/// Reads a var file. Files ending in `.json` are parsed as JSON, anything else
/// as YAML. The top level must be a mapping; an empty file supplies nothing.
pub fn parse_var_file<P: AsRef<Path>>(path: P) -> Result<SuppliedValues> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(SuppliedValues::new());
    }

    let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let value: Value = if is_json {
        serde_json::from_str(&content).map_err(|e| {
            Error::ParseError(format!("Failed to parse var file '{}': {e}", path.display()))
        })?
    } else {
        serde_yaml::from_str(&content).map_err(|e| {
            Error::ParseError(format!("Failed to parse var file '{}': {e}", path.display()))
        })?
    };

    match value {
        Value::Null => Ok(SuppliedValues::new()),
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(Error::ParseError(format!(
            "Var file '{}' must contain a mapping of variable names to values, found: {other}",
            path.display()
        ))),
    }
}

/// Picks `STENCIL_<NAME>` entries out of an environment listing.
pub fn vars_from_env<I>(env: I) -> SuppliedValues
where
    I: IntoIterator<Item = (String, String)>,
{
    env.into_iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(ENV_PREFIX)
                .filter(|name| !name.is_empty())
                .map(|name| (name.to_string(), Value::String(value)))
        })
        .collect()
}

