use crate::events::StreamEvent;
use crate::models::{GeneratedFile, PreviewFile, UpdateRequest};
use std::collections::HashMap;

/// What a client keeps between requests: the generated files keyed by path,
/// the prompt and platform they came from.
#[derive(Debug, Default)]
pub struct SessionState {
    pub files: HashMap<String, GeneratedFile>,
    pub last_prompt: String,
    pub platform_tag: String,
    pub initialized: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starting a new generation is the only thing that clears the file set.
    pub fn begin_generation(&mut self, prompt: &str, platform_tag: &str) {
        self.files.clear();
        self.last_prompt = prompt.to_string();
        self.platform_tag = platform_tag.to_string();
        self.initialized = true;
    }

    /// Folds one received event into the state. `code` and `update` replace
    /// whatever was stored for the path.
    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Code {
                path,
                code,
                language,
            }
            | StreamEvent::Update {
                path,
                code,
                language,
            } => {
                self.files.insert(
                    path.clone(),
                    GeneratedFile {
                        path: path.clone(),
                        code: code.clone(),
                        language: *language,
                    },
                );
            }
            StreamEvent::Start { .. }
            | StreamEvent::Progress { .. }
            | StreamEvent::Analysis { .. }
            | StreamEvent::Structure { .. }
            | StreamEvent::Error { .. }
            | StreamEvent::Complete => {}
        }
    }

    /// Builds the follow-up request and remembers `new_prompt` as the latest.
    pub fn update_request(&mut self, new_prompt: &str) -> UpdateRequest {
        let previous = std::mem::replace(&mut self.last_prompt, new_prompt.to_string());
        UpdateRequest {
            user_prompt: new_prompt.to_string(),
            previous_prompt: previous,
            platform_tag: self.platform_tag.clone(),
            files: self.files.clone(),
        }
    }

    pub fn preview_files(&self) -> Vec<PreviewFile> {
        let mut files: Vec<_> = self
            .files
            .values()
            .map(|f| PreviewFile {
                path: f.path.clone(),
                content: f.code.clone(),
            })
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }
}
