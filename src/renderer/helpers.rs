//! Filters and functions available to every template.

use super::RenderSettings;
use crate::logger::Logger;
use cruet::Inflector;
use minijinja::value::Rest;
use minijinja::{Environment, Error, ErrorKind, State, Value};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

/// Returned by `shell` when shell execution is disabled.
pub const SHELL_DISABLED_PLACEHOLDER: &str = "replace-me";

const ENV_ARG_PREFIX: &str = "ENV:";

/// Largest list `num_range` will build.
pub const MAX_RANGE_LEN: usize = 100_000;

pub(super) fn register(env: &mut Environment<'static>, settings: &RenderSettings, logger: Logger) {
    env.add_filter("dasherize", dasherize);
    env.add_filter("snake_case", snake_case);
    env.add_filter("camel_case", camel_case);
    env.add_filter("camel_case_lower", camel_case_lower);
    env.add_filter("pascal_case", camel_case);
    env.add_filter("replace_one", replace_one);
    env.add_filter("trim_prefix", trim_prefix);
    env.add_filter("trim_suffix", trim_suffix);
    env.add_filter("to_yaml", to_yaml);

    env.add_function("plus", |a: Value, b: Value| binary(a, b, |x, y| Ok(x + y)));
    env.add_function("minus", |a: Value, b: Value| binary(a, b, |x, y| Ok(x - y)));
    env.add_function("times", |a: Value, b: Value| binary(a, b, |x, y| Ok(x * y)));
    env.add_function("divide", |a: Value, b: Value| {
        binary(a, b, |x, y| {
            if y == 0.0 {
                Err(invalid("division by zero"))
            } else {
                Ok(x / y)
            }
        })
    });
    env.add_function("round_int", |v: Value| to_number(&v).map(|n| Value::from(n.round() as i64)));
    env.add_function("ceil_int", |v: Value| to_number(&v).map(|n| Value::from(n.ceil() as i64)));
    env.add_function("floor_int", |v: Value| to_number(&v).map(|n| Value::from(n.floor() as i64)));
    env.add_function("num_range", num_range);
    env.add_function("keys_sorted", keys_sorted);
    env.add_function("env", env_or);

    let template_folder = absolute(&settings.template_folder);
    let output_folder = absolute(&settings.output_folder);
    let disable_shell = settings.disable_shell;

    let folder = template_folder.clone();
    env.add_function("template_folder", move || folder.display().to_string());
    let folder = output_folder.clone();
    env.add_function("output_folder", move || folder.display().to_string());

    let folder = template_folder.clone();
    env.add_function("path_exists", move |state: &State, path: String| {
        resolve(state, &folder, &path).exists()
    });

    let folder = template_folder.clone();
    env.add_function("snippet", move |state: &State, path: String, name: Option<String>| {
        let path = resolve(state, &folder, &path);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| invalid(format!("cannot read '{}': {e}", path.display())))?;
        match name {
            Some(name) => extract_snippet(&content, &name),
            None => Ok(content),
        }
    });

    let folder = template_folder.clone();
    env.add_function("render_file", move |state: &State, path: String, vars: Option<Value>| {
        let path = resolve(state, &folder, &path);
        let source = std::fs::read_to_string(&path)
            .map_err(|e| invalid(format!("cannot read '{}': {e}", path.display())))?;
        let name = path.display().to_string();
        state.env().render_named_str(&name, &source, vars.unwrap_or_default())
    });

    env.add_function("template_is_defined", |state: &State, name: String| {
        state.env().get_template(&name).is_ok()
    });

    let folder = template_folder;
    env.add_function("shell", move |state: &State, args: Rest<String>| {
        if disable_shell {
            logger.info(format!(
                "Shell helpers are disabled; returning '{SHELL_DISABLED_PLACEHOLDER}' instead of running {:?}",
                args.0
            ));
            return Ok(SHELL_DISABLED_PLACEHOLDER.to_string());
        }
        let dir = template_dir(state, &folder);
        run_shell(&dir, &args.0)
    });
}

fn invalid<S: Into<std::borrow::Cow<'static, str>>>(message: S) -> Error {
    Error::new(ErrorKind::InvalidOperation, message)
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Directory of the template being rendered, falling back to the template folder
/// for strings that do not come from a file.
fn template_dir(state: &State, template_folder: &Path) -> PathBuf {
    let name = Path::new(state.name());
    match name.parent() {
        Some(parent) if name.is_absolute() => parent.to_path_buf(),
        _ => template_folder.to_path_buf(),
    }
}

fn resolve(state: &State, template_folder: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        template_dir(state, template_folder).join(path)
    }
}

fn dasherize(value: String) -> String {
    value.to_kebab_case()
}

fn snake_case(value: String) -> String {
    value.to_snake_case()
}

fn camel_case(value: String) -> String {
    value.to_pascal_case()
}

fn camel_case_lower(value: String) -> String {
    value.to_camel_case()
}

fn replace_one(value: String, old: String, new: String) -> String {
    value.replacen(&old, &new, 1)
}

fn trim_prefix(value: String, prefix: String) -> String {
    value.strip_prefix(prefix.as_str()).unwrap_or(&value).to_string()
}

fn trim_suffix(value: String, suffix: String) -> String {
    value.strip_suffix(suffix.as_str()).unwrap_or(&value).to_string()
}

fn to_yaml(value: Value) -> Result<String, Error> {
    serde_yaml::to_string(&value).map_err(|e| invalid(format!("cannot serialize to YAML: {e}")))
}

/// Reads a number out of a numeric value or a numeric-looking string.
fn to_number(value: &Value) -> Result<f64, Error> {
    if let Some(s) = value.as_str() {
        return s
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(format!("'{s}' is not a number")));
    }
    f64::try_from(value.clone()).map_err(|_| invalid(format!("'{value}' is not a number")))
}

/// Integral results come back as integers so they print without a decimal point.
fn from_number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

fn binary<F>(a: Value, b: Value, op: F) -> Result<Value, Error>
where
    F: Fn(f64, f64) -> Result<f64, Error>,
{
    op(to_number(&a)?, to_number(&b)?).map(from_number)
}

fn num_range(start: i64, end: i64, step: Option<i64>) -> Result<Vec<i64>, Error> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(invalid("num_range step must not be zero"));
    }
    let mut out = Vec::new();
    let mut current = Some(start);
    while let Some(value) = current.filter(|&v| (step > 0 && v < end) || (step < 0 && v > end)) {
        if out.len() == MAX_RANGE_LEN {
            return Err(invalid(format!("num_range would produce more than {MAX_RANGE_LEN} items")));
        }
        out.push(value);
        current = value.checked_add(step);
    }
    Ok(out)
}

fn keys_sorted(value: Value) -> Result<Vec<String>, Error> {
    if value.kind() != minijinja::value::ValueKind::Map {
        return Err(invalid(format!("keys_sorted expects a map, got {}", value.kind())));
    }
    let mut keys: Vec<String> = value
        .try_iter()?
        .map(|key| key.as_str().map(str::to_string).unwrap_or_else(|| key.to_string()))
        .collect();
    keys.sort();
    Ok(keys)
}

fn env_or(name: String, fallback: Option<String>) -> String {
    match std::env::var(&name) {
        Ok(value) if !value.is_empty() => value,
        _ => fallback.unwrap_or_default(),
    }
}

fn snippet_marker() -> Option<&'static Regex> {
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"stencil-snippet:\s*(\S+)").ok()).as_ref()
}

/// Returns the lines between the two `stencil-snippet: <name>` marker lines.
pub fn extract_snippet(content: &str, name: &str) -> Result<String, Error> {
    let mut lines = Vec::new();
    let mut inside = false;
    for line in content.lines() {
        let is_marker = snippet_marker()
            .and_then(|marker| marker.captures(line))
            .and_then(|c| c.get(1))
            .is_some_and(|m| m.as_str() == name);
        if is_marker {
            if inside {
                return Ok(lines.join("\n"));
            }
            inside = true;
        } else if inside {
            lines.push(line);
        }
    }
    if inside {
        Err(invalid(format!("snippet '{name}' is not terminated")))
    } else {
        Err(invalid(format!("snippet '{name}' not found")))
    }
}

/// Splits `ENV:KEY=VALUE` arguments from the command line.
fn split_env_args(raw: &[String]) -> (Vec<String>, Vec<(String, String)>) {
    let mut args = Vec::new();
    let mut envs = Vec::new();
    for arg in raw {
        match arg.strip_prefix(ENV_ARG_PREFIX).and_then(|kv| kv.split_once('=')) {
            Some((key, value)) => envs.push((key.to_string(), value.to_string())),
            None => args.push(arg.clone()),
        }
    }
    (args, envs)
}

fn run_shell(dir: &Path, raw: &[String]) -> Result<String, Error> {
    let (args, envs) = split_env_args(raw);
    let Some((program, rest)) = args.split_first() else {
        return Err(invalid("shell requires a command"));
    };

    let output = Command::new(program)
        .args(rest)
        .envs(envs)
        .current_dir(dir)
        .output()
        .map_err(|e| invalid(format!("failed to run '{program}': {e}")))?;

    if !output.status.success() {
        return Err(invalid(format!(
            "'{}' exited with {}: {}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let trimmed = stdout.strip_suffix('\n').unwrap_or(&stdout);
    Ok(trimmed.strip_suffix('\r').unwrap_or(trimmed).to_string())
}
