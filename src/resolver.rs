//! Variable resolution.
//!
//! Every declared variable gets a value from the first source that has one:
//! a supplied value, a reference to another variable, the declared default
//! (non-interactive runs) or the user. Once every value is known, a render
//! pass expands template syntax inside the values against the complete set.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logger::Logger;
use crate::parser::parse_value;
use crate::prompt::{PromptRequest, PromptResponse, Prompter};
use crate::renderer::{MiniJinjaRenderer, Vars};
use crate::variable::{display_value, is_namespaced, namespaced, Variable, VariableType};
use indexmap::IndexMap;
use serde_json::Value;

/// Longest reference chain followed before assuming a cycle.
pub const MAX_REFERENCE_DEPTH: usize = 20;

/// Every variable a unit resolves: its own, plus each dependency's variables
/// under their namespaced names.
pub fn declared_variables(config: &Config) -> Vec<Variable> {
    let mut all = config.variables.clone();
    for dependency in &config.dependencies {
        for variable in &dependency.variables {
            let mut variable = variable.clone();
            variable.name = namespaced(&dependency.name, &variable.name);
            variable.reference = variable.reference.map(|r| {
                if dependency.variables.iter().any(|v| v.name == r) {
                    namespaced(&dependency.name, &r)
                } else {
                    r
                }
            });
            all.push(variable);
        }
    }
    all
}

fn has_template_syntax(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.contains("{{") || s.contains("{%"))
}

pub struct Resolver<'a> {
    prompter: &'a dyn Prompter,
    logger: &'a Logger,
    non_interactive: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(prompter: &'a dyn Prompter, logger: &'a Logger, non_interactive: bool) -> Self {
        Self { prompter, logger, non_interactive }
    }

    /// Obtains a value for every variable in `declared`.
    ///
    /// `vars` holds the supplied values and synthetic entries on entry; the
    /// returned set adds one entry per declared variable. Values that still
    /// contain template syntax are kept raw until [`Resolver::render_variables`].
    pub fn resolve(&self, declared: &[Variable], mut vars: Vars) -> Result<Vars> {
        let by_name: IndexMap<&str, &Variable> =
            declared.iter().map(|v| (v.name.as_str(), v)).collect();

        for variable in declared {
            let value = self.value_for(variable, &by_name, &mut vars, 0)?;
            vars.insert(variable.name.clone(), value);
        }
        Ok(vars)
    }

    fn value_for(
        &self,
        variable: &Variable,
        declared: &IndexMap<&str, &Variable>,
        vars: &mut Vars,
        depth: usize,
    ) -> Result<Value> {
        if depth > MAX_REFERENCE_DEPTH {
            return Err(Error::CyclicalReference {
                variable: variable.name.clone(),
                reference: variable.reference.clone().unwrap_or_default(),
            });
        }

        if let Some(value) = vars.get(&variable.name) {
            self.logger.trace(format!("Using supplied value for '{}'", variable.name));
            return convert_early(variable, value.clone());
        }

        if let Some(reference) = &variable.reference {
            if let Some(value) = vars.get(reference) {
                return convert_early(variable, value.clone());
            }
            let target = declared.get(reference.as_str()).ok_or_else(|| Error::MissingReference {
                variable: variable.name.clone(),
                reference: reference.clone(),
            })?;
            let value = self.value_for(target, declared, vars, depth + 1)?;
            vars.insert(target.name.clone(), value.clone());
            return convert_early(variable, value);
        }

        let value = self.acquire(variable)?;
        convert_early(variable, value)
    }

    fn acquire(&self, variable: &Variable) -> Result<Value> {
        if self.non_interactive {
            return match &variable.default {
                Some(default) => {
                    self.logger.trace(format!("Using default value for '{}'", variable.name));
                    Ok(default.clone())
                }
                None => Err(Error::MissingVariable(variable.name.clone())),
            };
        }
        self.prompt(variable)
    }

    fn prompt(&self, variable: &Variable) -> Result<Value> {
        let mut invalid_attempts = Vec::new();
        loop {
            let request = PromptRequest {
                variable,
                display_name: &variable.name,
                default: variable.default.as_ref(),
                invalid_attempts: &invalid_attempts,
            };
            let answer = match self.prompter.prompt_variable(&request)? {
                PromptResponse::Abort => return Err(Error::Aborted),
                PromptResponse::Value(answer) => answer,
            };

            if answer.is_empty() {
                match &variable.default {
                    Some(default) => return Ok(default.clone()),
                    None => {
                        invalid_attempts.push(format!("a {} value is required", variable.var_type));
                        continue;
                    }
                }
            }

            let raw = match variable.var_type {
                VariableType::String | VariableType::Enum => Value::String(answer),
                _ => parse_value(&answer),
            };
            match convert_early(variable, raw) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    self.logger.debug(format!("Rejected value for '{}': {e}", variable.name));
                    invalid_attempts.push(e.to_string());
                }
            }
        }
    }

    /// Renders every non-namespaced declared variable against the complete set.
    ///
    /// All values are rendered against the same snapshot, so the result does
    /// not depend on declaration order. Values are converted to their declared
    /// type after rendering. Namespaced variables are rendered later, when the
    /// dependency that owns them is processed.
    pub fn render_variables(
        &self,
        renderer: &MiniJinjaRenderer,
        declared: &[Variable],
        vars: Vars,
    ) -> Result<Vars> {
        let name = renderer.config_name();
        let mut rendered = vars.clone();
        for variable in declared.iter().filter(|v| !is_namespaced(&v.name)) {
            let Some(value) = vars.get(&variable.name) else {
                continue;
            };
            let value = renderer.render_value(&name, value, &vars)?;
            rendered.insert(variable.name.clone(), variable.convert(value)?);
        }
        Ok(rendered)
    }
}

/// Converts a value as soon as it is obtained, unless it still needs rendering.
fn convert_early(variable: &Variable, value: Value) -> Result<Value> {
    if has_template_syntax(&value) {
        Ok(value)
    } else {
        variable.convert(value)
    }
}

/// Formats a resolved set for debug logs.
pub fn describe(vars: &Vars) -> String {
    vars.iter()
        .filter(|(k, _)| !crate::variable::is_synthetic(k))
        .map(|(k, v)| format!("{k}={}", display_value(v)))
        .collect::<Vec<_>>()
        .join(", ")
}
