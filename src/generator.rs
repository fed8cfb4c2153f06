//! The generation pipeline.
//!
//! A unit is one template tree generated into one output folder. Processing a
//! unit loads its template and config, resolves its variables, runs its hooks,
//! recurses into its dependencies and finally writes its own files. The root
//! template is the first unit; every dependency invocation is another.

use crate::config::{load_config, Config, Dependency};
use crate::dependency::{dispatch, DependencyContext};
use crate::error::{Error, Result};
use crate::hooks::HookRunner;
use crate::loader::load_template;
use crate::logger::Logger;
use crate::manifest::{GeneratedFile, OutputManifest};
use crate::options::RunOptions;
use crate::parser::parse_var_file;
use crate::processor::Processor;
use crate::prompt::Prompter;
use crate::renderer::{MiniJinjaRenderer, RenderSettings, Vars};
use crate::resolver::{declared_variables, describe, Resolver};
use crate::selector::{select_engines, select_skips};
use crate::variable::{ROOT_CONFIG_DEPS_KEY, ROOT_CONFIG_VARS_KEY, THIS_KEY};
use indexmap::IndexMap;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Worker count used when none is configured.
pub fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// What templates see under `this`.
#[derive(Serialize)]
struct ThisUnit<'a> {
    config: &'a Config,
    options: &'a RunOptions,
    current_dep: Option<&'a Dependency>,
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| Error::ParseError(e.to_string()))
}

/// Drives a whole run. Owns the run-wide state shared by every unit.
pub struct Generator {
    prompter: Arc<dyn Prompter>,
    manifest: Arc<OutputManifest>,
    logger: Logger,
    pool: Option<rayon::ThreadPool>,
}

impl Generator {
    /// Prepares a run for `options`. The worker pool is only built when
    /// `options.parallel` is set.
    pub fn new(options: &RunOptions, prompter: Arc<dyn Prompter>, logger: Logger) -> Result<Self> {
        let pool = if options.parallel {
            let workers = match options.max_workers {
                0 => default_workers(),
                n => n,
            };
            logger.debug(format!("Running dependencies on {workers} worker(s)"));
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("stencil-worker-{i}"))
                .build()
                .map_err(|e| Error::config(format!("Failed to start worker pool: {e}")))?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            prompter,
            manifest: Arc::new(OutputManifest::new(&options.output_folder)),
            logger,
            pool,
        })
    }

    pub fn manifest(&self) -> &OutputManifest {
        &self.manifest
    }

    /// Generates the root template and every dependency beneath it.
    ///
    /// Returns the files written, in write order. On failure, files written
    /// before the failure stay on disk and in [`Generator::manifest`].
    pub fn run(&self, options: &RunOptions) -> Result<Vec<GeneratedFile>> {
        self.process_unit(options.clone(), None, None, &self.logger)?;
        Ok(self.manifest.files())
    }

    fn process_unit(
        &self,
        mut options: RunOptions,
        current_dep: Option<&Dependency>,
        root_config: Option<Arc<Config>>,
        logger: &Logger,
    ) -> Result<()> {
        let template = load_template(&options.template_url, logger)?;
        let template_folder = template.root();
        logger.info(format!(
            "Processing templates in {} and writing to {}",
            template_folder.display(),
            options.output_folder.display()
        ));

        let config =
            load_config(template_folder, &options.template_url, options.missing_config_action, logger)?;
        let root_config = root_config.unwrap_or_else(|| Arc::new(config.clone()));

        for var_file in std::mem::take(&mut options.var_files) {
            options.vars.extend(parse_var_file(var_file)?);
        }

        let vars = self.synthetic_vars(&options, &config, &root_config, current_dep)?;
        let declared = declared_variables(&config);
        let mut renderer = MiniJinjaRenderer::with_logger(
            RenderSettings::from_options(template_folder, &options),
            logger.clone(),
        );
        let resolver = Resolver::new(self.prompter.as_ref(), logger, options.non_interactive);
        let vars = resolver.resolve(&declared, vars)?;
        let vars = resolver.render_variables(&renderer, &declared, vars)?;
        logger.debug(format!("Resolved variables: {}", describe(&vars)));

        std::fs::create_dir_all(&options.output_folder)?;

        self.hooks(&renderer, &vars, &options, logger)
            .run("before", &config.hooks.before, template_folder)?;

        self.process_dependencies(&renderer, &options, template_folder, &vars, &config, &root_config, logger)?;

        renderer.add_partials(&config.partials, &vars)?;
        let skips = select_skips(&config.skip_files, &renderer, &vars, template_folder)?;
        let engines = select_engines(&config.engines, &renderer, &vars, template_folder)?;
        Processor::new(
            &renderer,
            &vars,
            template_folder,
            &options.output_folder,
            &skips,
            &engines,
            &self.manifest,
            logger,
        )
        .process_all()?;

        self.hooks(&renderer, &vars, &options, logger)
            .run("after", &config.hooks.after, template_folder)?;
        Ok(())
    }

    /// Supplied values plus the entries the pipeline injects itself.
    fn synthetic_vars(
        &self,
        options: &RunOptions,
        config: &Config,
        root_config: &Config,
        current_dep: Option<&Dependency>,
    ) -> Result<Vars> {
        let mut vars = options.vars.clone();
        vars.insert(
            THIS_KEY.to_string(),
            to_json(&ThisUnit { config, options, current_dep })?,
        );

        let root_vars: IndexMap<&str, _> =
            root_config.variables.iter().map(|v| (v.name.as_str(), v)).collect();
        vars.insert(ROOT_CONFIG_VARS_KEY.to_string(), to_json(&root_vars)?);

        let root_deps: IndexMap<&str, _> =
            root_config.dependencies.iter().map(|d| (d.name.as_str(), d)).collect();
        vars.insert(ROOT_CONFIG_DEPS_KEY.to_string(), to_json(&root_deps)?);
        Ok(vars)
    }

    fn hooks<'a>(
        &'a self,
        renderer: &'a MiniJinjaRenderer,
        vars: &'a Vars,
        options: &RunOptions,
        logger: &'a Logger,
    ) -> HookRunner<'a> {
        HookRunner {
            renderer,
            vars,
            prompter: self.prompter.as_ref(),
            logger,
            non_interactive: options.non_interactive,
            disabled: options.disable_hooks,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn process_dependencies(
        &self,
        renderer: &MiniJinjaRenderer,
        options: &RunOptions,
        template_folder: &Path,
        vars: &Vars,
        config: &Config,
        root_config: &Arc<Config>,
        logger: &Logger,
    ) -> Result<()> {
        if config.dependencies.is_empty() {
            return Ok(());
        }

        let context = DependencyContext {
            renderer,
            options,
            template_folder,
            vars,
            prompter: self.prompter.as_ref(),
            logger,
        };
        let invocations = context.plan(&config.dependencies)?;

        dispatch(&invocations, self.pool.as_ref(), |invocation| {
            let child = context.clone_options(invocation)?;
            invocation.logger.info(format!(
                "Processing dependency '{}' from {} into {}",
                invocation.dependency.name,
                child.template_url,
                child.output_folder.display()
            ));
            self.process_unit(
                child,
                Some(&invocation.dependency),
                Some(Arc::clone(root_config)),
                &invocation.logger,
            )
        })
    }
}

/// Runs the template described by `options` and returns the files written.
pub fn generate(
    options: &RunOptions,
    prompter: Arc<dyn Prompter>,
    logger: Logger,
) -> Result<Vec<GeneratedFile>> {
    Generator::new(options, prompter, logger)?.run(options)
}
