//! File processing for one template tree.
//! Walks the tree, applies skip rules, renders paths and contents, and writes
//! the results into the unit's output folder.

use crate::config::{TemplateEngine, CONFIG_FILES};
use crate::error::{Error, Result};
use crate::logger::Logger;
use crate::manifest::OutputManifest;
use crate::renderer::{MiniJinjaRenderer, TemplateRenderer, Vars};
use crate::selector::{canonical, engine_for, should_skip, ProcessedEngine, ProcessedSkip};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Suffix stripped from the output name of `expression` engine files.
pub const EXPRESSION_SUFFIX: &str = ".expr";

/// Number of leading bytes inspected when sniffing for binary content.
const SNIFF_LEN: usize = 8 * 1024;

/// Ensures the output directory is safe to write to.
///
/// # Errors
/// * `Error::ConfigError` if the directory exists and `force` is false
pub fn ensure_output_dir<P: AsRef<Path>>(output_dir: P, force: bool) -> Result<PathBuf> {
    let output_dir = output_dir.as_ref();
    if output_dir.exists() && !force {
        return Err(Error::config(format!(
            "Output directory '{}' already exists. Use --force to write into it",
            output_dir.display()
        )));
    }
    Ok(output_dir.to_path_buf())
}

/// A rendered path is usable if it is non-empty, relative and has no empty segments.
pub fn is_rendered_path_valid<S: AsRef<str>>(path: S) -> bool {
    let path = path.as_ref();
    !path.trim().is_empty() && path.split('/').all(|segment| !segment.is_empty())
}

/// Whether `content` is copied verbatim instead of rendered.
///
/// Empty files, files with a NUL byte near the start and files that are not
/// valid UTF-8 count as binary.
pub fn is_binary(content: &[u8]) -> bool {
    content.is_empty()
        || content[..content.len().min(SNIFF_LEN)].contains(&0)
        || std::str::from_utf8(content).is_err()
}

/// Decodes `%XX` escapes so file names can carry characters the file system
/// rejects (`%7C` for `|`). Malformed escapes are left untouched.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| input.to_string())
}

/// Writes `content` through a temporary file in the destination directory,
/// so a failure never leaves a partial file behind.
fn write_atomic(target: &Path, content: &[u8], permissions: Option<fs::Permissions>) -> Result<()> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(content)?;
    if let Some(permissions) = permissions {
        fs::set_permissions(tmp.path(), permissions)?;
    }
    tmp.persist(target).map_err(|e| Error::IoError(e.error))?;
    Ok(())
}

/// Renders and writes the files of one template tree.
pub struct Processor<'a> {
    renderer: &'a MiniJinjaRenderer,
    vars: &'a Vars,
    template_root: &'a Path,
    output_root: &'a Path,
    skips: &'a [ProcessedSkip],
    engines: &'a [ProcessedEngine],
    manifest: &'a OutputManifest,
    logger: &'a Logger,
}

impl<'a> Processor<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        renderer: &'a MiniJinjaRenderer,
        vars: &'a Vars,
        template_root: &'a Path,
        output_root: &'a Path,
        skips: &'a [ProcessedSkip],
        engines: &'a [ProcessedEngine],
        manifest: &'a OutputManifest,
        logger: &'a Logger,
    ) -> Self {
        Self { renderer, vars, template_root, output_root, skips, engines, manifest, logger }
    }

    fn is_manifest_file(relative: &str) -> bool {
        CONFIG_FILES.contains(&relative)
    }

    /// Processes every entry of the template tree.
    pub fn process_all(&self) -> Result<()> {
        let mut walker = WalkDir::new(self.template_root).min_depth(1).sort_by_file_name().into_iter();
        while let Some(entry) = walker.next() {
            let entry = entry?;
            let is_dir = entry.file_type().is_dir();
            let relative = match entry.path().strip_prefix(self.template_root) {
                Ok(relative) => canonical(relative),
                Err(_) => continue,
            };

            if Self::is_manifest_file(&relative) || (is_dir && relative == ".git") {
                if is_dir {
                    walker.skip_current_dir();
                }
                continue;
            }

            if should_skip(&relative, self.skips) {
                self.logger.debug(format!("Skipping '{relative}'"));
                if is_dir {
                    walker.skip_current_dir();
                }
                continue;
            }

            if self.process_entry(entry.path(), &relative, is_dir)?.is_none() && is_dir {
                walker.skip_current_dir();
            }
        }
        Ok(())
    }

    /// Processes one entry and returns the path it was written to, or `None`
    /// if its rendered path was empty or malformed.
    pub fn process_entry(&self, source: &Path, relative: &str, is_dir: bool) -> Result<Option<PathBuf>> {
        let name = source.display().to_string();
        let decoded = percent_decode(relative);
        let rendered = self.renderer.render_to_fixed_point(&name, &decoded, self.vars)?;
        if !is_rendered_path_valid(&rendered) {
            self.logger.debug(format!("Skipping '{relative}': rendered path '{rendered}' is not valid"));
            return Ok(None);
        }

        if is_dir {
            let target = self.output_root.join(&rendered);
            fs::create_dir_all(&target)?;
            return Ok(Some(target));
        }

        let permissions = fs::metadata(source).ok().map(|m| m.permissions());
        let target = match engine_for(relative, self.engines) {
            TemplateEngine::Expression => {
                let target_name = rendered.strip_suffix(EXPRESSION_SUFFIX).unwrap_or(&rendered);
                let target = self.output_root.join(target_name);
                let text = fs::read_to_string(source)?;
                let output = self.renderer.render_expression(source, &text, self.vars)?;
                write_atomic(&target, output.as_bytes(), permissions)?;
                target
            }
            TemplateEngine::Jinja => {
                let target = self.output_root.join(&rendered);
                let bytes = fs::read(source)?;
                if is_binary(&bytes) {
                    self.logger.trace(format!("Copying '{relative}'"));
                    write_atomic(&target, &bytes, permissions)?;
                } else {
                    let text = String::from_utf8_lossy(&bytes);
                    let output = self.renderer.render(&name, &text, self.vars)?;
                    self.logger.trace(format!("Writing '{}'", target.display()));
                    write_atomic(&target, output.as_bytes(), permissions)?;
                }
                target
            }
        };

        self.manifest.record(&target);
        Ok(Some(target))
    }
}
