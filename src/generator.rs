use crate::error::GenerationError;
use crate::llm::CompletionClient;
use crate::models::FileDescriptor;
use crate::platform::Platform;
use crate::prompts::{file_prompt, FilePromptInput};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

lazy_static! {
    static ref OPENING_FENCE: Regex = Regex::new(r"^```[^\n]*\n").unwrap();
    static ref CLOSING_FENCE: Regex = Regex::new(r"\n?```\s*$").unwrap();
}

/// What a file's prompt needs beyond the file itself.
pub struct GenerationContext<'a> {
    pub user_prompt: &'a str,
    pub platform: Platform,
    pub analysis: Option<&'a str>,
    pub existing_code: Option<&'a str>,
}

/// Requests the source of exactly one file. Returns the trimmed model text.
pub async fn generate_file_code(
    client: &dyn CompletionClient,
    file: &FileDescriptor,
    ctx: &GenerationContext<'_>,
) -> Result<String, GenerationError> {
    let prompt = file_prompt(&FilePromptInput {
        user_prompt: ctx.user_prompt,
        platform: ctx.platform,
        path: &file.path,
        purpose: &file.purpose,
        analysis: ctx.analysis,
        existing_code: ctx.existing_code,
    });
    debug!("Requesting code for {}", file.path);
    let text = client.complete(&prompt).await?;
    Ok(text.trim().to_string())
}

/// Removes a surrounding Markdown code fence, if any. Idempotent.
pub fn strip_code_fences(code: &str) -> String {
    let trimmed = code.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let without_open = OPENING_FENCE.replace(trimmed, "");
    CLOSING_FENCE.replace(&without_open, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{Reply, ScriptedClient};

    fn descriptor(path: &str) -> FileDescriptor {
        FileDescriptor {
            path: path.to_string(),
            purpose: "styles".to_string(),
        }
    }

    #[tokio::test]
    async fn returns_trimmed_text_and_sends_context() {
        let client = ScriptedClient::texts(["\n  body { margin: 0; }  \n"]);
        let ctx = GenerationContext {
            user_prompt: "todo app",
            platform: Platform::None,
            analysis: Some("Minimal todo list"),
            existing_code: None,
        };
        let code = generate_file_code(&client, &descriptor("root/src/style.css"), &ctx)
            .await
            .unwrap();

        assert_eq!(code, "body { margin: 0; }");
        let prompt = &client.prompts()[0];
        assert!(prompt.contains("root/src/style.css"));
        assert!(prompt.contains("Minimal todo list"));
    }

    #[tokio::test]
    async fn failures_surface_as_completion_errors() {
        let client = ScriptedClient::new(vec![Reply::Fail(500)]);
        let ctx = GenerationContext {
            user_prompt: "x",
            platform: Platform::React,
            analysis: None,
            existing_code: None,
        };
        let err = generate_file_code(&client, &descriptor("root/src/App.js"), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Completion(_)));
    }

    #[test]
    fn strips_fences_idempotently() {
        let fenced = "```css\nbody { margin: 0; }\n```";
        let once = strip_code_fences(fenced);
        assert_eq!(once, "body { margin: 0; }");
        assert_eq!(strip_code_fences(&once), once);
        assert_eq!(strip_code_fences("```\nlet a = 1;\n```\n"), "let a = 1;");
        assert_eq!(strip_code_fences("plain text"), "plain text");
    }
}
