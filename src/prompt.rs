//! Interactive value acquisition.
//!
//! The pipeline never talks to the terminal directly; it goes through a
//! [`Prompter`]. The binary uses [`DialoguerPrompter`], tests use scripted ones.

use crate::error::{Error, Result};
use crate::variable::{display_value, Variable, VariableType};
use dialoguer::{Confirm, Input, Select};
use serde_json::Value;
use std::sync::Mutex;

/// What the resolver knows when it has to ask for a value.
#[derive(Debug)]
pub struct PromptRequest<'a> {
    pub variable: &'a Variable,
    /// Name as seen by the user, namespaced when asked on behalf of a dependency.
    pub display_name: &'a str,
    /// Default, already rendered.
    pub default: Option<&'a Value>,
    /// Reasons earlier answers were rejected, oldest first.
    pub invalid_attempts: &'a [String],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptResponse {
    Value(String),
    Abort,
}

pub trait Prompter: Send + Sync {
    /// Asks for the raw value of one variable.
    fn prompt_variable(&self, request: &PromptRequest<'_>) -> Result<PromptResponse>;

    /// Asks a yes/no question.
    fn confirm(&self, message: &str, default: bool) -> Result<bool>;
}

/// Terminal prompter built on `dialoguer`.
#[derive(Debug, Default)]
pub struct DialoguerPrompter;

impl DialoguerPrompter {
    pub fn new() -> Self {
        Self
    }
}

fn map_dialoguer_error(err: dialoguer::Error) -> Error {
    match err {
        dialoguer::Error::IO(e) if e.kind() == std::io::ErrorKind::Interrupted => Error::Aborted,
        other => Error::PromptError(other.to_string()),
    }
}

impl Prompter for DialoguerPrompter {
    fn prompt_variable(&self, request: &PromptRequest<'_>) -> Result<PromptResponse> {
        let variable = request.variable;
        for reason in request.invalid_attempts.iter().rev().take(1) {
            eprintln!("Invalid value: {reason}");
        }

        let mut prompt = request.display_name.to_string();
        if !variable.description.is_empty() {
            prompt = format!("{prompt} ({})", variable.description);
        }

        let answer = match variable.var_type {
            VariableType::Enum => {
                let items: Vec<String> = variable.options.iter().map(display_value).collect();
                let default_index = request
                    .default
                    .map(display_value)
                    .and_then(|d| items.iter().position(|item| *item == d))
                    .unwrap_or(0);
                let selection = Select::new()
                    .with_prompt(prompt)
                    .default(default_index)
                    .items(&items)
                    .interact_opt()
                    .map_err(map_dialoguer_error)?;
                match selection {
                    Some(index) => items[index].clone(),
                    None => return Ok(PromptResponse::Abort),
                }
            }
            VariableType::Bool => {
                let default = request
                    .default
                    .and_then(|d| match d {
                        Value::Bool(b) => Some(*b),
                        Value::String(s) => crate::variable::parse_bool(s),
                        _ => None,
                    })
                    .unwrap_or(false);
                let answer = Confirm::new()
                    .with_prompt(prompt)
                    .default(default)
                    .interact_opt()
                    .map_err(map_dialoguer_error)?;
                match answer {
                    Some(b) => b.to_string(),
                    None => return Ok(PromptResponse::Abort),
                }
            }
            _ => {
                if let Some(default) = request.default {
                    prompt = format!("{prompt} [default: {}]", display_value(default));
                }
                Input::<String>::new()
                    .with_prompt(prompt)
                    .allow_empty(true)
                    .interact_text()
                    .map_err(map_dialoguer_error)?
            }
        };

        Ok(PromptResponse::Value(answer))
    }

    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        Confirm::new()
            .with_prompt(message)
            .default(default)
            .interact()
            .map_err(map_dialoguer_error)
    }
}

/// Serializes access to an inner prompter so that concurrently running units
/// never interleave their questions on the terminal.
pub struct SerializedPrompter<P> {
    inner: Mutex<P>,
}

impl<P: Prompter> SerializedPrompter<P> {
    pub fn new(inner: P) -> Self {
        Self { inner: Mutex::new(inner) }
    }
}

impl<P: Prompter> Prompter for SerializedPrompter<P> {
    fn prompt_variable(&self, request: &PromptRequest<'_>) -> Result<PromptResponse> {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.prompt_variable(request)
    }

    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.confirm(message, default)
    }
}
