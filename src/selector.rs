//! Path selection: which files to skip and which engine renders each file.
//!
//! Globs are expanded against the template tree up front, so the decisions
//! below are plain set lookups on canonical paths (relative to the template
//! root, `/`-separated).

use crate::config::{EngineRule, SkipFile, TemplateEngine};
use crate::error::{Error, Result};
use crate::renderer::{MiniJinjaRenderer, TemplateRenderer, Vars};
use globset::GlobBuilder;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipKind {
    /// Skip the matched paths.
    Path,
    /// Skip everything except the matched paths.
    NotPath,
}

/// A skip rule with its glob expanded and its condition evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedSkip {
    pub kind: SkipKind,
    pub paths: BTreeSet<String>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEngine {
    pub paths: BTreeSet<String>,
    pub engine: TemplateEngine,
}

fn has_glob_meta(component: &str) -> bool {
    component.contains(['*', '?', '[', '{'])
}

/// Joins the components of a relative path with `/`.
pub fn canonical(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Expands `pattern` relative to `base` into the matching paths, sorted.
///
/// The leading components without glob syntax select the directory to walk,
/// so patterns may point outside `base` (`../shared/*.txt`). A pattern
/// without glob syntax matches itself if it exists. `*` does not cross `/`;
/// `**` does.
pub fn expand_glob(base: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let normalized = pattern.replace('\\', "/");
    let components: Vec<&str> = normalized.split('/').filter(|c| !c.is_empty()).collect();
    let literal_len = components.iter().take_while(|c| !has_glob_meta(c)).count();

    let root = components[..literal_len].iter().fold(base.to_path_buf(), |p, c| p.join(c));
    if literal_len == components.len() {
        return Ok(if root.exists() { vec![root] } else { Vec::new() });
    }

    let rest = components[literal_len..].join("/");
    let matcher = GlobBuilder::new(&rest)
        .literal_separator(true)
        .build()
        .map_err(|source| Error::GlobError { pattern: pattern.to_string(), source })?
        .compile_matcher();

    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut matches = Vec::new();
    for entry in WalkDir::new(&root).min_depth(1) {
        let entry = entry?;
        if let Ok(relative) = entry.path().strip_prefix(&root) {
            if matcher.is_match(canonical(relative)) {
                matches.push(entry.path().to_path_buf());
            }
        }
    }
    matches.sort();
    Ok(matches)
}

/// Expands `pattern` into canonical paths relative to `template_root`.
/// Matches outside the template tree are dropped.
fn expand_relative(template_root: &Path, pattern: &str) -> Result<BTreeSet<String>> {
    Ok(expand_glob(template_root, pattern)?
        .iter()
        .filter_map(|p| p.strip_prefix(template_root).ok().map(canonical))
        .filter(|p| !p.is_empty())
        .collect())
}

/// Renders, expands and evaluates every skip rule.
pub fn select_skips(
    rules: &[SkipFile],
    renderer: &MiniJinjaRenderer,
    vars: &Vars,
    template_root: &Path,
) -> Result<Vec<ProcessedSkip>> {
    let name = renderer.config_name();
    rules
        .iter()
        .map(|rule| {
            let (kind, pattern) = match (&rule.path, &rule.not_path) {
                (Some(path), None) => (SkipKind::Path, path),
                (None, Some(not_path)) => (SkipKind::NotPath, not_path),
                _ => {
                    return Err(Error::config(
                        "Each skip_files entry must set exactly one of 'path' and 'not_path'",
                    ))
                }
            };
            let pattern = renderer.render_to_fixed_point(&name, pattern, vars)?;
            let active = match &rule.condition {
                Some(condition) => renderer.evaluate_condition(&name, condition, vars)?,
                None => true,
            };
            Ok(ProcessedSkip { kind, paths: expand_relative(template_root, &pattern)?, active })
        })
        .collect()
}

/// Renders and expands every engine override, keeping declaration order.
pub fn select_engines(
    rules: &[EngineRule],
    renderer: &MiniJinjaRenderer,
    vars: &Vars,
    template_root: &Path,
) -> Result<Vec<ProcessedEngine>> {
    let name = renderer.config_name();
    rules
        .iter()
        .map(|rule| {
            let pattern = renderer.render_to_fixed_point(&name, &rule.path, vars)?;
            Ok(ProcessedEngine {
                paths: expand_relative(template_root, &pattern)?,
                engine: rule.template_engine,
            })
        })
        .collect()
}

fn covered_by(path: &str, paths: &BTreeSet<String>) -> bool {
    if paths.contains(path) {
        return true;
    }
    // a matched directory keeps its subtree, and the directories leading to a
    // match are kept so the match stays reachable
    let as_dir = format!("{path}/");
    paths.iter().any(|p| p.starts_with(&as_dir) || path.starts_with(&format!("{p}/")))
}

/// Decides whether the file or directory at `path` (canonical, relative to the
/// template root) is excluded.
pub fn should_skip(path: &str, skips: &[ProcessedSkip]) -> bool {
    let skipped = skips
        .iter()
        .filter(|s| s.active && s.kind == SkipKind::Path)
        .any(|s| s.paths.contains(path));
    if skipped {
        return true;
    }

    let mut keeps = skips.iter().filter(|s| s.active && s.kind == SkipKind::NotPath).peekable();
    keeps.peek().is_some() && !keeps.any(|s| covered_by(path, &s.paths))
}

/// First matching engine override, or the default engine.
pub fn engine_for(path: &str, engines: &[ProcessedEngine]) -> TemplateEngine {
    engines
        .iter()
        .find(|e| e.paths.contains(path))
        .map(|e| e.engine)
        .unwrap_or_default()
}
