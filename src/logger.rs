//! Logging handle threaded through the generation pipeline.
//!
//! Every pipeline stage receives a [`Logger`] instead of reaching for a global.
//! The handle carries the scope of the unit being generated (for example
//! `root/docs[a]`) and forwards to the `log` facade, so the binary's
//! `env_logger` setup decides what is actually printed.

use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Logger {
    scope: Arc<str>,
    enabled: bool,
}

impl Default for Logger {
    fn default() -> Self {
        Self { scope: Arc::from("root"), enabled: false }
    }
}

impl Logger {
    /// Creates an enabled logger rooted at the top-level template.
    pub fn new() -> Self {
        Self { scope: Arc::from("root"), enabled: true }
    }

    /// A logger that drops everything. Same as `Logger::default()`.
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Derives a logger for a nested dependency, optionally for one `for_each` item.
    pub fn child(&self, name: &str, item: Option<&str>) -> Self {
        let scope = match item {
            Some(item) => format!("{}/{}[{}]", self.scope, name, item),
            None => format!("{}/{}", self.scope, name),
        };
        Self { scope: Arc::from(scope), enabled: self.enabled }
    }

    pub fn trace(&self, message: impl AsRef<str>) {
        if self.enabled {
            log::trace!("[{}] {}", self.scope, message.as_ref());
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        if self.enabled {
            log::debug!("[{}] {}", self.scope, message.as_ref());
        }
    }

    pub fn info(&self, message: impl AsRef<str>) {
        if self.enabled {
            log::info!("[{}] {}", self.scope, message.as_ref());
        }
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        if self.enabled {
            log::warn!("[{}] {}", self.scope, message.as_ref());
        }
    }
}

/// Initializes the process-wide `env_logger` backend.
pub fn init_logger(verbose: bool) {
    env_logger::Builder::new()
        .filter_level(if verbose { log::LevelFilter::Trace } else { log::LevelFilter::Off })
        .init();
}
