//! Template renderer for stencil.
//! Wraps a MiniJinja environment configured with the run's missing-key policy,
//! the helper set and the unit's partials, and renders text to a fixed point.

mod expression;
mod helpers;

use crate::error::{Error, Result};
use crate::logger::Logger;
use crate::options::{MissingKeyAction, RunOptions};
use crate::selector::expand_glob;
use indexmap::IndexMap;
use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use std::path::{Path, PathBuf};

/// Upper bound on re-render passes before a template is assumed to loop.
pub const MAX_RENDER_ATTEMPTS: usize = 15;

/// Marker printed for a missing key under `missing-key-action=invalid`.
pub const NO_VALUE_MARKER: &str = "<no value>";

/// A resolved variable set as handed to the renderer.
pub type Vars = IndexMap<String, serde_json::Value>;

/// Trait for template rendering engines.
pub trait TemplateRenderer {
    /// Renders `template` once. `name` identifies the source for helpers and errors.
    fn render(&self, name: &str, template: &str, vars: &Vars) -> Result<String>;

    /// Renders `template` repeatedly until the output stops changing.
    fn render_to_fixed_point(&self, name: &str, template: &str, vars: &Vars) -> Result<String>;
}

/// Per-unit settings the helpers depend on.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub template_folder: PathBuf,
    pub output_folder: PathBuf,
    pub missing_key_action: MissingKeyAction,
    pub disable_shell: bool,
}

impl RenderSettings {
    pub fn from_options<P: Into<PathBuf>>(template_folder: P, options: &RunOptions) -> Self {
        Self {
            template_folder: template_folder.into(),
            output_folder: options.output_folder.clone(),
            missing_key_action: options.missing_key_action,
            disable_shell: options.disable_shell,
        }
    }
}

/// MiniJinja-based template rendering engine.
pub struct MiniJinjaRenderer {
    env: Environment<'static>,
    settings: RenderSettings,
    logger: Logger,
}

impl MiniJinjaRenderer {
    pub fn new(settings: RenderSettings) -> Self {
        Self::with_logger(settings, Logger::noop())
    }

    /// Creates a renderer whose helpers and partial loading log to `logger`.
    pub fn with_logger(settings: RenderSettings, logger: Logger) -> Self {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);

        match settings.missing_key_action {
            MissingKeyAction::Error => env.set_undefined_behavior(UndefinedBehavior::Strict),
            MissingKeyAction::Zero => env.set_undefined_behavior(UndefinedBehavior::Chainable),
            MissingKeyAction::Invalid => {
                env.set_undefined_behavior(UndefinedBehavior::Chainable);
                env.set_formatter(|out, state, value| {
                    if value.is_undefined() {
                        out.write_str(NO_VALUE_MARKER).map_err(|_| {
                            minijinja::Error::new(
                                minijinja::ErrorKind::WriteFailure,
                                "failed to write output",
                            )
                        })
                    } else {
                        minijinja::escape_formatter(out, state, value)
                    }
                });
            }
        }

        helpers::register(&mut env, &settings, logger.clone());
        Self { env, settings, logger }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Registers every file matched by `patterns` as a named template.
    ///
    /// Patterns are rendered first and resolved against the template folder.
    /// Each file is registered under its file name, so templates can pull it in
    /// with `{% include "name" %}` or `{% import "name" as m %}`.
    pub fn add_partials(&mut self, patterns: &[String], vars: &Vars) -> Result<()> {
        let config_name = self.config_name();
        for pattern in patterns {
            let pattern = self.render_to_fixed_point(&config_name, pattern, vars)?;
            for path in expand_glob(&self.settings.template_folder, &pattern)? {
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let source = std::fs::read_to_string(&path)?;
                self.logger.debug(format!("Registering partial '{}' from {}", name, path.display()));
                self.env
                    .add_template_owned(name.to_string(), source)
                    .map_err(|e| Error::render(&path, e))?;
            }
        }
        Ok(())
    }

    /// Name used when rendering strings that come from the manifest.
    pub fn config_name(&self) -> String {
        self.settings.template_folder.join("stencil.yml").display().to_string()
    }

    /// Whether `name` has been registered as a partial.
    pub fn is_defined(&self, name: &str) -> bool {
        self.env.get_template(name).is_ok()
    }

    fn context(vars: &Vars) -> minijinja::Value {
        minijinja::Value::from_serialize(vars)
    }

    fn render_with(&self, name: &str, template: &str, ctx: &minijinja::Value) -> Result<String> {
        self.env.render_named_str(name, template, ctx).map_err(|e| Error::render(name, e))
    }

    fn fixed_point_with(
        &self,
        name: &str,
        template: &str,
        ctx: &minijinja::Value,
    ) -> Result<String> {
        let mut current = template.to_string();
        for _ in 0..MAX_RENDER_ATTEMPTS {
            let rendered = self.render_with(name, &current, ctx)?;
            if rendered == current {
                return Ok(rendered);
            }
            current = rendered;
        }
        Err(Error::InfiniteLoopSuspected {
            path: name.to_string(),
            iterations: MAX_RENDER_ATTEMPTS,
            content: current,
        })
    }

    /// Renders every string inside `value` to a fixed point, including map keys.
    pub fn render_value(
        &self,
        name: &str,
        value: &serde_json::Value,
        vars: &Vars,
    ) -> Result<serde_json::Value> {
        let ctx = Self::context(vars);
        self.render_value_with(name, value, &ctx)
    }

    fn render_value_with(
        &self,
        name: &str,
        value: &serde_json::Value,
        ctx: &minijinja::Value,
    ) -> Result<serde_json::Value> {
        use serde_json::Value;
        match value {
            Value::String(s) => Ok(Value::String(self.fixed_point_with(name, s, ctx)?)),
            Value::Array(items) => items
                .iter()
                .map(|item| self.render_value_with(name, item, ctx))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut rendered = serde_json::Map::new();
                for (key, item) in map {
                    rendered.insert(
                        self.fixed_point_with(name, key, ctx)?,
                        self.render_value_with(name, item, ctx)?,
                    );
                }
                Ok(Value::Object(rendered))
            }
            other => Ok(other.clone()),
        }
    }

    /// Renders a condition and reports whether it came out as exactly `"true"`.
    pub fn evaluate_condition(&self, name: &str, condition: &str, vars: &Vars) -> Result<bool> {
        Ok(self.render_to_fixed_point(name, condition, vars)? == "true")
    }

    /// Evaluates a file written for the `expression` engine.
    ///
    /// The file holds a single expression evaluated against `vars` (the
    /// resolved set without the `this` entry), `template_folder` and
    /// `output_folder`. The result is written out as pretty-printed JSON.
    pub fn render_expression(&self, path: &Path, source: &str, vars: &Vars) -> Result<String> {
        expression::evaluate(&self.env, &self.settings, path, source, vars)
    }
}

impl TemplateRenderer for MiniJinjaRenderer {
    fn render(&self, name: &str, template: &str, vars: &Vars) -> Result<String> {
        self.render_with(name, template, &Self::context(vars))
    }

    fn render_to_fixed_point(&self, name: &str, template: &str, vars: &Vars) -> Result<String> {
        self.fixed_point_with(name, template, &Self::context(vars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn renderer(action: MissingKeyAction) -> MiniJinjaRenderer {
        MiniJinjaRenderer::new(RenderSettings {
            template_folder: PathBuf::from("/tmp/template"),
            output_folder: PathBuf::from("/tmp/output"),
            missing_key_action: action,
            disable_shell: true,
        })
    }

    #[test]
    fn test_keeps_trailing_newline_and_html() {
        let r = renderer(MissingKeyAction::Error);
        let mut vars = Vars::new();
        vars.insert("tag".into(), json!("<b>"));
        assert_eq!(r.render("index.html", "{{ tag }}\n", &vars).unwrap(), "<b>\n");
    }

    #[test]
    fn test_render_value_renders_keys() {
        let r = renderer(MissingKeyAction::Error);
        let mut vars = Vars::new();
        vars.insert("k".into(), json!("name"));
        let value = json!({"{{ k }}": ["{{ k }}-1", 2]});
        assert_eq!(r.render_value("t", &value, &vars).unwrap(), json!({"name": ["name-1", 2]}));
    }
}
