//! Error handling for stencil.
//! Defines the crate-wide error type and result alias used by every pipeline stage.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Custom error types for stencil operations.
///
/// Variants are grouped the way failures surface to the user: configuration problems,
/// variable resolution problems, rendering problems, I/O, template acquisition and the
/// context wrappers that record which dependency or iteration a failure came from.
#[derive(Error, Debug)]
pub enum Error {
    /// Represents errors that occur during file system operations.
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// Represents errors that occur while walking a template tree.
    #[error("Failed to walk template directory: {0}")]
    WalkError(#[from] walkdir::Error),

    /// Malformed or self-contradictory manifest.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The template tree has no manifest and missing configs are not ignored.
    #[error(
        "Could not find a stencil config in '{path}' and missing-config-action is set to 'exit'{hint}"
    )]
    MissingConfig { path: String, hint: String },

    #[error("Found a duplicate dependency name: '{0}'. All dependency names must be unique")]
    DuplicateDependency(String),

    #[error("Found a duplicate variable name: '{0}'. All variable names must be unique")]
    DuplicateVariable(String),

    #[error("'{0}' is not a valid template engine. Must be one of: jinja, expression")]
    InvalidTemplateEngine(String),

    /// No supplied value, no default and prompting is not allowed.
    #[error(
        "Variable '{0}' does not have a default, no value was supplied and non-interactive mode is set, so the user cannot be prompted for a value"
    )]
    MissingVariable(String),

    #[error("Variable '{variable}' references unknown variable '{reference}'")]
    MissingReference { variable: String, reference: String },

    #[error("Variable '{variable}' seems to have a cyclical reference with variable '{reference}'")]
    CyclicalReference { variable: String, reference: String },

    /// A supplied or rendered value could not be coerced to the declared type.
    #[error("Value '{value}' is not a valid value for variable '{variable}' (expected {expected})")]
    InvalidVariableValue {
        variable: String,
        value: String,
        expected: String,
    },

    /// The user aborted an interactive prompt.
    #[error("Aborted by user")]
    Aborted,

    #[error("Prompt error: {0}")]
    PromptError(String),

    /// Represents errors raised by the template engine.
    #[error("Failed to render '{path}'")]
    RenderError {
        path: String,
        #[source]
        source: minijinja::Error,
    },

    /// Fixed-point rendering did not converge.
    #[error(
        "Rendering '{path}' did not reach a fixed point after {iterations} passes; this is most likely a cyclic variable reference. Last output: {content}"
    )]
    InfiniteLoopSuspected {
        path: String,
        iterations: usize,
        content: String,
    },

    #[error("Invalid glob pattern '{pattern}'")]
    GlobError {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// Represents errors that occur during hook execution.
    #[error("Hook execution error: {0}")]
    HookError(String),

    #[error("Failed to parse value: {0}")]
    ParseError(String),

    #[error("Template source '{0}' does not exist. Did you misspell the path?")]
    TemplateDoesNotExist(String),

    #[error("Git error: {0}")]
    Git2Error(#[from] git2::Error),

    /// A dependency failed; `source` holds the underlying cause.
    #[error("Dependency '{name}' failed")]
    DependencyError {
        name: String,
        #[source]
        source: Box<Error>,
    },

    /// A single `for_each` iteration of a dependency failed.
    #[error("Dependency '{dependency}' failed for item '{item}'")]
    IterationError {
        dependency: String,
        item: String,
        #[source]
        source: Box<Error>,
    },

    /// Several independent units failed in the same batch.
    #[error("{} units failed:\n{}", .0.len(), format_all(.0))]
    MultipleErrors(Vec<Error>),
}

/// Convenience type alias for Results with stencil's Error as the error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::ConfigError(message.into())
    }

    pub fn render<P: Into<PathBuf>>(path: P, source: minijinja::Error) -> Self {
        Error::RenderError { path: path.into().display().to_string(), source }
    }

    /// Folds the failures of one batch into a single error.
    ///
    /// Returns `None` when the batch succeeded.
    pub fn aggregate(mut errors: Vec<Error>) -> Option<Error> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Error::MultipleErrors(errors)),
        }
    }

    /// Walks the source chain down to the deepest cause.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::DependencyError { source, .. } | Error::IterationError { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }
}

/// Renders each error with its full context chain, one per line.
fn format_all(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|err| {
            let mut line = format!("  - {err}");
            let mut source = std::error::Error::source(err);
            while let Some(cause) = source {
                line.push_str(&format!(": {cause}"));
                source = std::error::Error::source(cause);
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}
