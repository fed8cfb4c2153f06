//! Before and after hooks.
//! Each hook is a command declared in the manifest, rendered against the
//! unit's variables and run with `std::process::Command`.

use crate::config::Hook;
use crate::error::{Error, Result};
use crate::logger::Logger;
use crate::prompt::Prompter;
use crate::renderer::{MiniJinjaRenderer, TemplateRenderer, Vars};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// A hook with every field rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedHook {
    pub command: String,
    pub args: Vec<String>,
    pub env: IndexMap<String, String>,
    pub dir: PathBuf,
}

impl RenderedHook {
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs the hooks of one stage of one unit.
pub struct HookRunner<'a> {
    pub renderer: &'a MiniJinjaRenderer,
    pub vars: &'a Vars,
    pub prompter: &'a dyn Prompter,
    pub logger: &'a Logger,
    pub non_interactive: bool,
    pub disabled: bool,
}

impl HookRunner<'_> {
    /// Renders every field of `hook`. A relative `dir` is resolved against
    /// `template_folder`, which is also the default.
    pub fn render_hook(&self, hook: &Hook, template_folder: &Path) -> Result<RenderedHook> {
        let name = self.renderer.config_name();
        let render = |s: &str| self.renderer.render_to_fixed_point(&name, s, self.vars);

        let mut env = IndexMap::new();
        for (key, value) in &hook.env {
            env.insert(render(key)?, render(value)?);
        }
        let dir = match &hook.dir {
            Some(dir) => template_folder.join(render(dir)?),
            None => template_folder.to_path_buf(),
        };

        Ok(RenderedHook {
            command: render(&hook.command)?,
            args: hook.args.iter().map(|a| render(a)).collect::<Result<_>>()?,
            env,
            dir,
        })
    }

    /// Runs `hooks` in order. `stage` names the stage in logs and prompts.
    pub fn run(&self, stage: &str, hooks: &[Hook], template_folder: &Path) -> Result<()> {
        if hooks.is_empty() {
            return Ok(());
        }
        if self.disabled {
            self.logger.info(format!("Hooks are disabled, skipping {} {stage} hook(s)", hooks.len()));
            return Ok(());
        }

        let name = self.renderer.config_name();
        let mut answers: HashMap<String, bool> = HashMap::new();
        for hook in hooks {
            if let Some(skip) = &hook.skip {
                if self.renderer.evaluate_condition(&name, skip, self.vars)? {
                    self.logger.info(format!("Skipping {stage} hook '{}'", hook.command));
                    continue;
                }
            }

            let rendered = self.render_hook(hook, template_folder)?;
            let command_line = rendered.command_line();
            let confirmed = match answers.get(&command_line) {
                Some(answer) => *answer,
                None if self.non_interactive => true,
                None => {
                    let answer = self.prompter.confirm(
                        &format!("Run {stage} hook '{command_line}'?"),
                        true,
                    )?;
                    answers.insert(command_line.clone(), answer);
                    answer
                }
            };
            if !confirmed {
                self.logger.info(format!("Not running {stage} hook '{command_line}'"));
                continue;
            }

            run_hook(&rendered, self.logger)?;
        }
        Ok(())
    }
}

/// Runs a rendered hook with inherited stdio.
///
/// # Errors
/// * `Error::HookError` if the command cannot be started or exits unsuccessfully
pub fn run_hook(hook: &RenderedHook, logger: &Logger) -> Result<()> {
    logger.info(format!("Running hook '{}' in {}", hook.command_line(), hook.dir.display()));

    let status = Command::new(&hook.command)
        .args(&hook.args)
        .envs(&hook.env)
        .current_dir(&hook.dir)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| Error::HookError(format!("Failed to run '{}': {e}", hook.command_line())))?;

    if !status.success() {
        return Err(Error::HookError(format!(
            "Hook '{}' failed with status: {status}",
            hook.command_line()
        )));
    }
    Ok(())
}
