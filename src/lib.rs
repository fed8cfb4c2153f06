//! stencil is a project scaffolding generator.
//! It renders a template tree into an output folder, resolving typed variables
//! declared in the template's config and recursively generating the nested
//! templates the config depends on.

/// Command-line interface module for the stencil application
pub mod cli;

/// Configuration handling for stencil templates
/// Supports JSON and YAML formats (stencil.yml, stencil.yaml, stencil.json)
pub mod config;

/// Dependency planning, variable namespacing and dispatch
pub mod dependency;

/// Error types and handling for the stencil application
pub mod error;

/// The recursive generation pipeline
pub mod generator;

/// Before and after hook execution
pub mod hooks;

/// Template acquisition from local paths and git repositories
pub mod loader;

pub mod logger;

/// Run-wide record of written files
pub mod manifest;

pub mod options;

/// Caller-supplied values from arguments, var files and the environment
pub mod parser;

/// Per-file processing of one template tree
pub mod processor;

/// User input and interaction handling
pub mod prompt;

/// Template rendering to a fixed point
pub mod renderer;

/// Variable resolution
pub mod resolver;

/// Skip rules and engine overrides
pub mod selector;

/// Variable declarations and type coercion
pub mod variable;
