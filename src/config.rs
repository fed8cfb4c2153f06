//! Configuration handling for stencil templates.
//! Loads the manifest of a template tree, validates it against a JSON schema and
//! deserializes it into typed structs.

use crate::error::{Error, Result};
use crate::logger::Logger;
use crate::options::MissingConfigAction;
use crate::variable::Variable;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Supported configuration file names, in lookup order.
pub const CONFIG_FILES: [&str; 3] = ["stencil.yml", "stencil.yaml", "stencil.json"];

/// The parsed manifest of one template tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub hooks: Hooks,
    /// Globs naming files registered as named templates.
    #[serde(default)]
    pub partials: Vec<String>,
    #[serde(default)]
    pub skip_files: Vec<SkipFile>,
    #[serde(default)]
    pub engines: Vec<EngineRule>,
}

/// A nested template this tree depends on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(rename = "template-url")]
    pub template_url: String,
    #[serde(rename = "output-folder")]
    pub output_folder: String,
    #[serde(rename = "dont-inherit-variables", default)]
    pub dont_inherit_variables: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_each: Option<ForEach>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_each_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<Variable>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub var_files: Vec<String>,
}

/// Iteration source of a dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ForEach {
    /// A literal list of items.
    List(Vec<Value>),
    /// A template expression that renders to a list.
    Expression(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hooks {
    #[serde(default)]
    pub before: Vec<Hook>,
    #[serde(default)]
    pub after: Vec<Hook>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hook {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: IndexMap<String, String>,
    /// Working directory, relative to the template folder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<String>,
}

/// A conditional exclusion rule. Exactly one of `path` and `not_path` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkipFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_path: Option<String>,
    #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Rendering dialect of a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateEngine {
    #[default]
    Jinja,
    Expression,
}

impl std::str::FromStr for TemplateEngine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "jinja" => Ok(TemplateEngine::Jinja),
            "expression" => Ok(TemplateEngine::Expression),
            other => Err(Error::InvalidTemplateEngine(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineRule {
    pub path: String,
    pub template_engine: TemplateEngine,
}

const SCHEMA: &str = r##"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "type": "object",
  "properties": {
    "variables": { "type": "array", "items": { "$ref": "#/$defs/variable" } },
    "dependencies": {
      "type": "array",
      "items": {
        "type": "object",
        "required": ["name", "template-url", "output-folder"],
        "properties": {
          "name": { "type": "string", "minLength": 1 },
          "template-url": { "type": "string", "minLength": 1 },
          "output-folder": { "type": "string", "minLength": 1 },
          "dont-inherit-variables": { "type": "boolean" },
          "skip": { "type": "string" },
          "for_each": { "type": ["array", "string"] },
          "for_each_reference": { "type": "string" },
          "variables": { "type": "array", "items": { "$ref": "#/$defs/variable" } },
          "var_files": { "type": "array", "items": { "type": "string" } }
        }
      }
    },
    "hooks": {
      "type": "object",
      "properties": {
        "before": { "type": "array", "items": { "$ref": "#/$defs/hook" } },
        "after": { "type": "array", "items": { "$ref": "#/$defs/hook" } }
      }
    },
    "partials": { "type": "array", "items": { "type": "string" } },
    "skip_files": {
      "type": "array",
      "items": {
        "type": "object",
        "properties": {
          "path": { "type": "string" },
          "not_path": { "type": "string" },
          "if": { "type": "string" }
        }
      }
    },
    "engines": {
      "type": "array",
      "items": {
        "type": "object",
        "required": ["path", "template_engine"],
        "properties": {
          "path": { "type": "string" },
          "template_engine": { "type": "string" }
        }
      }
    }
  },
  "$defs": {
    "variable": {
      "type": "object",
      "required": ["name"],
      "properties": {
        "name": { "type": "string", "minLength": 1 },
        "description": { "type": "string" },
        "type": { "enum": ["string", "int", "float", "bool", "list", "map", "enum"] },
        "options": { "type": "array" },
        "reference": { "type": "string" }
      }
    },
    "hook": {
      "type": "object",
      "required": ["command"],
      "properties": {
        "command": { "type": "string" },
        "args": { "type": "array", "items": { "type": "string" } },
        "env": { "type": "object", "additionalProperties": { "type": "string" } },
        "dir": { "type": "string" },
        "skip": { "type": "string" }
      }
    }
  }
}"##;

/// Returns the path of the first manifest file present in `template_dir`.
pub fn find_config_file<P: AsRef<Path>>(template_dir: P) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|file| template_dir.as_ref().join(file))
        .find(|path| path.is_file())
}

/// Loads the manifest of a template tree.
///
/// # Arguments
/// * `template_dir` - Local root of the template tree
/// * `template_url` - Location the tree was loaded from, used for error hints
/// * `missing_config_action` - Whether a missing manifest is an error
/// * `logger` - Logger of the unit being loaded
///
/// # Returns
/// * `Result<Config>` - The parsed config, or an empty one if the manifest is
///   missing and `missing_config_action` is `ignore`
pub fn load_config<P: AsRef<Path>>(
    template_dir: P,
    template_url: &str,
    missing_config_action: MissingConfigAction,
    logger: &Logger,
) -> Result<Config> {
    let template_dir = template_dir.as_ref();
    match find_config_file(template_dir) {
        Some(config_path) => {
            logger.debug(format!("Loading configuration from {}", config_path.display()));
            let content = std::fs::read_to_string(&config_path)?;
            parse_config(&content)
        }
        None if missing_config_action == MissingConfigAction::Ignore => {
            logger.debug(format!(
                "No configuration found in {} and missing-config-action is 'ignore'; no variables will be available",
                template_dir.display()
            ));
            Ok(Config::default())
        }
        None => Err(Error::MissingConfig {
            path: template_dir.display().to_string(),
            hint: missing_config_hint(template_url),
        }),
    }
}

/// A template URL that looks like a git source without being one is usually a typo.
fn missing_config_hint(template_url: &str) -> String {
    let looks_remote = template_url.contains("github.com")
        || template_url.contains("gitlab.com")
        || template_url.contains("bitbucket.org")
        || template_url.ends_with(".git")
        || template_url.contains(".git//");
    if looks_remote && !template_url.contains("://") && !template_url.starts_with("git@") {
        format!(
            ". '{template_url}' looks like a git URL; did you misspell it? Git sources need a scheme such as 'https://' or 'git::'"
        )
    } else if looks_remote {
        format!(". Check that '{template_url}' points at the right repository, ref and sub-directory")
    } else {
        String::new()
    }
}

/// Parses and validates manifest content.
///
/// The content is tried as JSON first and falls back to YAML. An empty
/// document yields an empty config.
///
/// # Errors
/// * `Error::ConfigError` if the content is malformed or violates the schema
/// * `Error::InvalidTemplateEngine` for an unknown engine id
/// * `Error::DuplicateVariable` / `Error::DuplicateDependency` for repeated names
pub fn parse_config(content: &str) -> Result<Config> {
    if content.trim().is_empty() {
        return Ok(Config::default());
    }
    let raw: Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(_) => serde_yaml::from_str(content)
            .map_err(|e| Error::config(format!("Invalid configuration format: {e}")))?,
    };
    if raw.is_null() {
        return Ok(Config::default());
    }

    validate_schema(&raw)?;
    check_engines(&raw)?;

    let config: Config = serde_json::from_value(raw)
        .map_err(|e| Error::config(format!("Invalid schema: {e}")))?;
    config.validate()?;
    Ok(config)
}

fn validate_schema(raw: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(SCHEMA)
        .map_err(|e| Error::config(format!("Invalid built-in schema: {e}")))?;
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| Error::config(format!("Invalid built-in schema: {e}")))?;

    let messages: Vec<String> = validator.iter_errors(raw).map(|e| e.to_string()).collect();
    if messages.is_empty() {
        Ok(())
    } else {
        Err(Error::config(format!("Invalid configuration: {}", messages.join("; "))))
    }
}

fn check_engines(raw: &Value) -> Result<()> {
    let engines = raw.get("engines").and_then(Value::as_array).into_iter().flatten();
    for engine in engines {
        if let Some(id) = engine.get("template_engine").and_then(Value::as_str) {
            id.parse::<TemplateEngine>()?;
        }
    }
    Ok(())
}

impl Config {
    /// Checks the invariants the schema cannot express.
    pub fn validate(&self) -> Result<()> {
        check_variable_names(&self.variables)?;
        for variable in &self.variables {
            variable.validate()?;
        }

        let mut seen = HashSet::new();
        for dependency in &self.dependencies {
            if !seen.insert(dependency.name.as_str()) {
                return Err(Error::DuplicateDependency(dependency.name.clone()));
            }
            dependency.validate()?;
        }

        for rule in &self.skip_files {
            if rule.path.is_some() == rule.not_path.is_some() {
                return Err(Error::config(
                    "Each skip_files entry must set exactly one of 'path' and 'not_path'",
                ));
            }
        }
        Ok(())
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn dependency(&self, name: &str) -> Option<&Dependency> {
        self.dependencies.iter().find(|d| d.name == name)
    }
}

impl Dependency {
    pub fn validate(&self) -> Result<()> {
        if self.name.contains('.') {
            return Err(Error::config(format!(
                "Dependency name '{}' must not contain '.', it is used to namespace variables",
                self.name
            )));
        }
        if self.for_each.is_some() && self.for_each_reference.is_some() {
            return Err(Error::config(format!(
                "Dependency '{}' sets both 'for_each' and 'for_each_reference'",
                self.name
            )));
        }
        check_variable_names(&self.variables)?;
        for variable in &self.variables {
            variable.validate()?;
        }
        Ok(())
    }
}

fn check_variable_names(variables: &[Variable]) -> Result<()> {
    let mut seen = HashSet::new();
    for variable in variables {
        if !seen.insert(variable.name.as_str()) {
            return Err(Error::DuplicateVariable(variable.name.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_hint() {
        assert!(missing_config_hint("./local/template").is_empty());
        assert!(missing_config_hint("github.com/acme/templates.git").contains("misspell"));
        assert!(missing_config_hint("https://github.com/acme/templates.git")
            .contains("right repository"));
    }

    #[test]
    fn test_schema_compiles() {
        let schema: Value = serde_json::from_str(SCHEMA).unwrap();
        assert!(jsonschema::validator_for(&schema).is_ok());
    }
}
