//! Dependency processing.
//!
//! A dependency is another template tree generated as part of the current one.
//! Processing a batch of dependencies happens in two phases. Planning runs on
//! the calling thread: it evaluates `skip` conditions, asks for confirmation
//! and expands `for_each` into one [`Invocation`] per item. Dispatch then runs
//! every invocation, either in order or on the worker pool, and wraps each
//! failure with the dependency name and iteration item it came from.

use crate::config::{Dependency, ForEach};
use crate::error::{Error, Result};
use crate::loader::resolve_location;
use crate::logger::Logger;
use crate::options::RunOptions;
use crate::parser::{parse_value, parse_var_file};
use crate::prompt::Prompter;
use crate::renderer::{MiniJinjaRenderer, TemplateRenderer, Vars};
use crate::variable::{
    display_value, is_namespaced, is_synthetic, namespaced, split_namespace, EACH_KEY,
};
use rayon::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// One run of a dependency: a single `for_each` item, or the whole
/// dependency when it does not iterate.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub dependency: Dependency,
    pub item: Option<Value>,
    pub logger: Logger,
}

impl Invocation {
    /// Attaches the identity of this invocation to a failure.
    pub fn wrap(&self, error: Error) -> Error {
        match &self.item {
            Some(item) => Error::IterationError {
                dependency: self.dependency.name.clone(),
                item: display_value(item),
                source: Box::new(error),
            },
            None => Error::DependencyError {
                name: self.dependency.name.clone(),
                source: Box::new(error),
            },
        }
    }
}

/// The state of the unit that declares a batch of dependencies.
pub struct DependencyContext<'a> {
    pub renderer: &'a MiniJinjaRenderer,
    /// Options of the declaring unit; `vars` holds its supplied values.
    pub options: &'a RunOptions,
    pub template_folder: &'a Path,
    /// Fully resolved variables of the declaring unit.
    pub vars: &'a Vars,
    pub prompter: &'a dyn Prompter,
    pub logger: &'a Logger,
}

impl DependencyContext<'_> {
    fn config_name(&self) -> String {
        self.renderer.config_name()
    }

    /// Whether `dependency` should run at all.
    ///
    /// A `skip` condition rendering to `"true"` omits it. Interactive runs ask
    /// for confirmation unless dependency prompts are disabled.
    pub fn should_process(&self, dependency: &Dependency) -> Result<bool> {
        if let Some(skip) = &dependency.skip {
            let skipped = self.renderer.evaluate_condition(&self.config_name(), skip, self.vars)?;
            self.logger.debug(format!(
                "Skip condition for dependency '{}' evaluated to {skipped}",
                dependency.name
            ));
            if skipped {
                return Ok(false);
            }
        }

        if self.options.non_interactive || self.options.disable_dependency_prompt {
            return Ok(true);
        }
        self.prompter.confirm(&format!("Process dependency '{}'?", dependency.name), true)
    }

    /// Items a dependency iterates over, or `None` if it runs once.
    pub fn iteration_items(&self, dependency: &Dependency) -> Result<Option<Vec<Value>>> {
        let name = self.config_name();

        if let Some(reference) = &dependency.for_each_reference {
            let variable = self.renderer.render_to_fixed_point(&name, reference, self.vars)?;
            let value = self.vars.get(variable.trim()).ok_or_else(|| Error::MissingReference {
                variable: format!("{}.for_each_reference", dependency.name),
                reference: variable.clone(),
            })?;
            return as_items(dependency, value.clone()).map(Some);
        }

        match &dependency.for_each {
            None => Ok(None),
            Some(ForEach::List(items)) => {
                let items = items
                    .iter()
                    .map(|item| self.renderer.render_value(&name, item, self.vars))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Some(items))
            }
            Some(ForEach::Expression(expression)) => {
                let rendered = self.renderer.render_to_fixed_point(&name, expression, self.vars)?;
                as_items(dependency, parse_value(&rendered)).map(Some)
            }
        }
    }

    /// Turns the declared dependencies into the invocations to dispatch.
    pub fn plan(&self, dependencies: &[Dependency]) -> Result<Vec<Invocation>> {
        let mut invocations = Vec::new();
        for dependency in dependencies {
            if !self.should_process(dependency)? {
                self.logger.info(format!("Skipping dependency '{}'", dependency.name));
                continue;
            }
            match self.iteration_items(dependency)? {
                None => invocations.push(Invocation {
                    dependency: dependency.clone(),
                    item: None,
                    logger: self.logger.child(&dependency.name, None),
                }),
                Some(items) => {
                    if items.is_empty() {
                        self.logger.info(format!(
                            "Dependency '{}' has nothing to iterate over",
                            dependency.name
                        ));
                    }
                    for item in items {
                        let logger = self.logger.child(&dependency.name, Some(&display_value(&item)));
                        invocations.push(Invocation {
                            dependency: dependency.clone(),
                            item: Some(item),
                            logger,
                        });
                    }
                }
            }
        }
        Ok(invocations)
    }

    /// The declaring unit's variables as seen by one invocation.
    pub fn iteration_vars(&self, item: Option<&Value>) -> Vars {
        let mut vars = self.vars.clone();
        if let Some(item) = item {
            vars.insert(EACH_KEY.to_string(), item.clone());
        }
        vars
    }

    /// Computes the values handed to a dependency as its supplied values.
    ///
    /// Lowest precedence first:
    /// 1. the declaring unit's own variables, unless `dont-inherit-variables` is set
    /// 2. the dependency's variables declared in this config, rendered against
    ///    the current iteration
    /// 3. values from the dependency's `var_files`
    /// 4. supplied values without the dependency's prefix, unless
    ///    `dont-inherit-variables` is set or the dependency declares the name
    /// 5. supplied `<dependency>.<name>` values, with the prefix stripped
    ///
    /// `__each__` is always forwarded.
    pub fn clone_variables(&self, dependency: &Dependency, iteration_vars: &Vars) -> Result<Vars> {
        let name = self.config_name();
        let inherit = !dependency.dont_inherit_variables;
        let mut vars = Vars::new();

        if inherit {
            for (key, value) in iteration_vars {
                if !is_namespaced(key) && !is_synthetic(key) {
                    vars.insert(key.clone(), value.clone());
                }
            }
        }
        if let Some(item) = iteration_vars.get(EACH_KEY) {
            vars.insert(EACH_KEY.to_string(), item.clone());
        }

        let mut file_vars = Vars::new();
        for var_file in &dependency.var_files {
            let rendered = self.renderer.render_to_fixed_point(&name, var_file, iteration_vars)?;
            file_vars.extend(parse_var_file(self.template_folder.join(rendered))?);
        }

        let mut current = iteration_vars.clone();
        current.extend(file_vars.clone());
        for variable in &dependency.variables {
            let Some(value) = iteration_vars.get(&namespaced(&dependency.name, &variable.name)) else {
                continue;
            };
            let value = self.renderer.render_value(&name, value, &current)?;
            let value = variable.convert(value)?;
            current.insert(variable.name.clone(), value.clone());
            vars.insert(variable.name.clone(), value);
        }

        vars.extend(file_vars);

        let supplied = &self.options.vars;
        if inherit {
            for (key, value) in supplied {
                let owned_by_dependency = split_namespace(key)
                    .is_some_and(|(prefix, _)| prefix == dependency.name)
                    || dependency.variables.iter().any(|v| v.name == *key);
                if !owned_by_dependency && !is_synthetic(key) {
                    vars.insert(key.clone(), value.clone());
                }
            }
        }
        for (key, value) in supplied {
            if let Some((prefix, rest)) = split_namespace(key) {
                if prefix == dependency.name {
                    vars.insert(rest.to_string(), value.clone());
                }
            }
        }

        Ok(vars)
    }

    /// Builds the options of the unit that generates one invocation.
    ///
    /// The template location and output folder are rendered against the
    /// iteration's variables. Relative template paths resolve against the
    /// declaring template folder, relative output folders against the declaring
    /// output folder.
    pub fn clone_options(&self, invocation: &Invocation) -> Result<RunOptions> {
        let name = self.config_name();
        let dependency = &invocation.dependency;
        let iteration_vars = self.iteration_vars(invocation.item.as_ref());

        let template_url =
            self.renderer.render_to_fixed_point(&name, &dependency.template_url, &iteration_vars)?;
        let output_folder =
            self.renderer.render_to_fixed_point(&name, &dependency.output_folder, &iteration_vars)?;
        let output_folder = PathBuf::from(output_folder);
        let output_folder = if output_folder.is_absolute() {
            output_folder
        } else {
            self.options.output_folder.join(output_folder)
        };

        let mut options = self.options.clone();
        options.template_url = resolve_location(self.template_folder, &template_url);
        options.output_folder = output_folder;
        options.vars = self.clone_variables(dependency, &iteration_vars)?;
        options.var_files = Vec::new();
        Ok(options)
    }
}

fn as_items(dependency: &Dependency, value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::String(s) => match parse_value(&s) {
            Value::Array(items) => Ok(items),
            _ => Err(Error::config(format!(
                "Iteration source of dependency '{}' must be a list, got '{s}'",
                dependency.name
            ))),
        },
        other => Err(Error::config(format!(
            "Iteration source of dependency '{}' must be a list, got '{other}'",
            dependency.name
        ))),
    }
}

/// Runs every invocation with `run`.
///
/// Without a pool, invocations run in order and the first failure stops the
/// batch. With a pool, every invocation runs and all failures are reported.
pub fn dispatch<F>(invocations: &[Invocation], pool: Option<&rayon::ThreadPool>, run: F) -> Result<()>
where
    F: Fn(&Invocation) -> Result<()> + Sync,
{
    match pool {
        None => {
            for invocation in invocations {
                run(invocation).map_err(|e| invocation.wrap(e))?;
            }
            Ok(())
        }
        Some(pool) => {
            let errors: Vec<Error> = pool.install(|| {
                invocations
                    .par_iter()
                    .filter_map(|invocation| run(invocation).err().map(|e| invocation.wrap(e)))
                    .collect()
            });
            match Error::aggregate(errors) {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }
    }
}
