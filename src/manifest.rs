//! Run-wide record of the files written during generation.

use crate::error::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// One written file, relative to the root output folder with `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedFile {
    pub path: String,
}

/// Append-only log shared by every unit of a run.
#[derive(Debug)]
pub struct OutputManifest {
    root: PathBuf,
    files: Mutex<Vec<GeneratedFile>>,
}

impl OutputManifest {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            root: std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf()),
            files: Mutex::new(Vec::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Appends `path`. Paths outside the root output folder are kept absolute.
    pub fn record<P: AsRef<Path>>(&self, path: P) {
        let path = path.as_ref();
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let entry = match absolute.strip_prefix(&self.root) {
            Ok(relative) => crate::selector::canonical(relative),
            Err(_) => absolute.display().to_string(),
        };
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(GeneratedFile { path: entry });
    }

    /// Snapshot of the entries recorded so far, in append order.
    pub fn files(&self) -> Vec<GeneratedFile> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the manifest as a JSON document.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        #[derive(Serialize)]
        struct Document<'a> {
            output_folder: String,
            files: &'a [GeneratedFile],
        }

        let files = self.files();
        let document = Document { output_folder: self.root.display().to_string(), files: &files };
        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| Error::ParseError(format!("Failed to serialize manifest: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
