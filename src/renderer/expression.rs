//! The `expression` engine: a file holding one MiniJinja expression whose
//! value becomes the file's content as JSON.

use super::{RenderSettings, Vars};
use crate::error::{Error, Result};
use crate::variable::THIS_KEY;
use minijinja::Environment;
use std::path::Path;

pub(super) fn evaluate(
    env: &Environment<'static>,
    settings: &RenderSettings,
    path: &Path,
    source: &str,
    vars: &Vars,
) -> Result<String> {
    let vars: Vars = vars
        .iter()
        .filter(|(key, _)| key.as_str() != THIS_KEY)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let ctx = minijinja::context! {
        vars => minijinja::Value::from_serialize(&vars),
        template_folder => settings.template_folder.display().to_string(),
        output_folder => settings.output_folder.display().to_string(),
    };

    let expr = env.compile_expression(source.trim()).map_err(|e| Error::render(path, e))?;
    let value = expr.eval(ctx).map_err(|e| Error::render(path, e))?;

    let mut json = serde_json::to_string_pretty(&value)
        .map_err(|e| Error::ParseError(format!("{}: {e}", path.display())))?;
    json.push('\n');
    Ok(json)
}
