#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use stencil::error::Result;
use stencil::options::{MissingKeyAction, RunOptions};
use stencil::prompt::{PromptRequest, PromptResponse, Prompter};
use stencil::renderer::{MiniJinjaRenderer, RenderSettings};

/// Answers prompts from a fixed script and records what was asked.
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<PromptResponse>>,
    confirmations: Mutex<VecDeque<bool>>,
    pub asked: Mutex<Vec<String>>,
    pub invalid_attempts: Mutex<Vec<Vec<String>>>,
    pub confirm_messages: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(
                answers.iter().map(|a| PromptResponse::Value(a.to_string())).collect(),
            ),
            ..Default::default()
        }
    }

    pub fn with_responses(responses: Vec<PromptResponse>) -> Self {
        Self { answers: Mutex::new(responses.into()), ..Default::default() }
    }

    pub fn with_confirmations(confirmations: &[bool]) -> Self {
        Self {
            confirmations: Mutex::new(confirmations.iter().copied().collect()),
            ..Default::default()
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }

    pub fn confirm_messages(&self) -> Vec<String> {
        self.confirm_messages.lock().unwrap().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn prompt_variable(&self, request: &PromptRequest<'_>) -> Result<PromptResponse> {
        self.asked.lock().unwrap().push(request.display_name.to_string());
        self.invalid_attempts.lock().unwrap().push(request.invalid_attempts.to_vec());
        Ok(self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PromptResponse::Abort))
    }

    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        self.confirm_messages.lock().unwrap().push(message.to_string());
        Ok(self.confirmations.lock().unwrap().pop_front().unwrap_or(default))
    }
}

/// Writes `files` (relative path, content) under `root`.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (path, content) in files {
        let path = root.join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}

pub fn read(path: impl AsRef<Path>) -> String {
    std::fs::read_to_string(path).unwrap()
}

/// Non-interactive options for generating `template` into `output`.
pub fn options(template: &Path, output: &Path) -> RunOptions {
    RunOptions::new(template.display().to_string(), output).non_interactive(true)
}

pub fn renderer(template_folder: &Path, action: MissingKeyAction) -> MiniJinjaRenderer {
    MiniJinjaRenderer::new(RenderSettings {
        template_folder: template_folder.to_path_buf(),
        output_folder: PathBuf::from("/tmp/stencil-output"),
        missing_key_action: action,
        disable_shell: true,
    })
}
