//! Run configuration shared by every unit of a generation run.

use clap::ValueEnum;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// What a template does when it looks up a key that is not in the variable set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MissingKeyAction {
    /// Fail the render.
    #[default]
    Error,
    /// Substitute the `<no value>` marker.
    Invalid,
    /// Substitute an empty value.
    Zero,
}

impl fmt::Display for MissingKeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MissingKeyAction::Error => "error",
            MissingKeyAction::Invalid => "invalid",
            MissingKeyAction::Zero => "zero",
        };
        f.write_str(name)
    }
}

/// What happens when a template tree has no manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MissingConfigAction {
    #[default]
    Exit,
    Ignore,
}

impl fmt::Display for MissingConfigAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingConfigAction::Exit => f.write_str("exit"),
            MissingConfigAction::Ignore => f.write_str("ignore"),
        }
    }
}

/// Options for one unit of generation.
///
/// The root unit gets these from the command line. Each dependency gets a clone
/// with its own template location, output location and variable set; the parent's
/// copy is never modified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    /// Template location: local path, `file://` URL or git source.
    pub template_url: String,
    pub output_folder: PathBuf,
    pub non_interactive: bool,
    /// Caller-supplied values, already merged from every source.
    pub vars: IndexMap<String, serde_json::Value>,
    /// Files whose values are merged over `vars` when the unit starts.
    pub var_files: Vec<PathBuf>,
    pub missing_key_action: MissingKeyAction,
    pub missing_config_action: MissingConfigAction,
    pub disable_hooks: bool,
    pub disable_shell: bool,
    pub disable_dependency_prompt: bool,
    /// Run sibling dependencies and `for_each` items on the worker pool.
    pub parallel: bool,
    /// Worker pool size; `0` uses the available parallelism.
    pub max_workers: usize,
}

impl RunOptions {
    pub fn new<S: Into<String>, P: Into<PathBuf>>(template_url: S, output_folder: P) -> Self {
        Self {
            template_url: template_url.into(),
            output_folder: output_folder.into(),
            non_interactive: false,
            vars: IndexMap::new(),
            var_files: Vec::new(),
            missing_key_action: MissingKeyAction::default(),
            missing_config_action: MissingConfigAction::default(),
            disable_hooks: false,
            disable_shell: false,
            disable_dependency_prompt: false,
            parallel: false,
            max_workers: 0,
        }
    }

    pub fn with_var<K: Into<String>>(mut self, key: K, value: serde_json::Value) -> Self {
        self.vars.insert(key.into(), value);
        self
    }

    pub fn non_interactive(mut self, non_interactive: bool) -> Self {
        self.non_interactive = non_interactive;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn missing_key_action(mut self, action: MissingKeyAction) -> Self {
        self.missing_key_action = action;
        self
    }

    pub fn missing_config_action(mut self, action: MissingConfigAction) -> Self {
        self.missing_config_action = action;
        self
    }
}
