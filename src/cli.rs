//! Command-line interface implementation for stencil.
//! Provides argument parsing and help text formatting using clap.

use crate::error::Result;
use crate::options::{MissingConfigAction, MissingKeyAction, RunOptions};
use crate::parser::{parse_vars, vars_from_env};
use clap::{error::ErrorKind, CommandFactory, Parser};
use std::path::PathBuf;

/// Command-line arguments structure for stencil.
#[derive(Parser, Debug)]
#[command(author, version, about = "stencil: project scaffolding with nested template dependencies", long_about = None)]
pub struct Args {
    /// Path to the template directory, file:// URL or git repository URL.
    /// Git sources accept a `//sub/dir` suffix and a `?ref=<rev>` qualifier
    #[arg(value_name = "TEMPLATE")]
    pub template: String,

    /// Directory where the generated project will be created
    #[arg(value_name = "OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Variable value as NAME=VALUE. Use <dependency>.<name> to target a dependency.
    /// Can be repeated
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub vars: Vec<String>,

    /// YAML or JSON file of variable values. Can be repeated
    #[arg(long = "var-file", value_name = "FILE")]
    pub var_files: Vec<PathBuf>,

    /// Never prompt; use defaults for variables without a supplied value
    #[arg(long)]
    pub non_interactive: bool,

    /// What to do when a template references a variable that is not defined
    #[arg(long, value_enum, default_value_t = MissingKeyAction::Error)]
    pub missing_key_action: MissingKeyAction,

    /// What to do when a template has no stencil config
    #[arg(long, value_enum, default_value_t = MissingConfigAction::Exit)]
    pub missing_config_action: MissingConfigAction,

    /// Do not run before/after hooks
    #[arg(long)]
    pub disable_hooks: bool,

    /// Make the `shell` helper return a placeholder instead of running commands
    #[arg(long)]
    pub disable_shell: bool,

    /// Process dependencies without asking for confirmation
    #[arg(long)]
    pub disable_dependency_prompt: bool,

    /// Generate sibling dependencies and for_each items concurrently
    #[arg(long)]
    pub parallel: bool,

    /// Worker count for --parallel. Defaults to the available parallelism
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub max_workers: usize,

    /// Write the list of generated files to this JSON file
    #[arg(long, value_name = "FILE")]
    pub manifest_file: Option<PathBuf>,

    /// Write into an existing output directory
    #[arg(short, long)]
    pub force: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Builds the run options. `env` supplies `STENCIL_*` values, which
    /// `--var` assignments override; var files are merged when the run starts.
    pub fn to_options<I>(&self, env: I) -> Result<RunOptions>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut vars = vars_from_env(env);
        vars.extend(parse_vars(&self.vars)?);

        Ok(RunOptions {
            template_url: self.template.clone(),
            output_folder: self.output_dir.clone(),
            non_interactive: self.non_interactive,
            vars,
            var_files: self.var_files.clone(),
            missing_key_action: self.missing_key_action,
            missing_config_action: self.missing_config_action,
            disable_hooks: self.disable_hooks,
            disable_shell: self.disable_shell,
            disable_dependency_prompt: self.disable_dependency_prompt,
            parallel: self.parallel,
            max_workers: self.max_workers,
        })
    }
}

/// Parses command line arguments and returns the Args structure.
///
/// # Returns
/// * `Args` - Parsed command line arguments
///
/// # Exits
/// * With status code 1 if required arguments are missing
/// * With clap's default error handling for other argument errors
pub fn get_args() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            if e.kind() == ErrorKind::MissingRequiredArgument {
                let _ = Args::command()
                    .help_template(
                        r#"{about-section}
{usage-heading} {usage}

{all-args}
{after-help}
"#,
                    )
                    .print_help();
                std::process::exit(1);
            } else {
                e.exit();
            }
        }
    }
}
