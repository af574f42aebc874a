//! Prompt templates sent to the completion endpoint.

use crate::file_system::relative_path;
use crate::models::DirectoryNode;
use crate::platform::Platform;
use lazy_static::lazy_static;
use std::collections::HashMap;

type Template = fn(&str) -> String;

lazy_static! {
    /// Per-file instructions for static sites, keyed by path below the root.
    static ref STATIC_SITE_TEMPLATES: HashMap<&'static str, Template> = {
        let mut m: HashMap<&'static str, Template> = HashMap::new();
        m.insert("src/index.html", static_html);
        m.insert("src/style.css", static_css);
        m.insert("src/script.js", static_js);
        m
    };
}

fn static_html(prompt: &str) -> String {
    format!(
        "Create an HTML file that:\n\
         1. Includes Tailwind CSS via CDN\n\
         2. Has proper meta tags and viewport settings\n\
         3. Links to style.css and script.js\n\
         4. Uses Tailwind classes for styling\n\
         5. Follows this prompt: {prompt}\n\n\
         Return ONLY the HTML code."
    )
}

fn static_css(prompt: &str) -> String {
    format!(
        "Create a CSS file that:\n\
         1. Only includes styles that can't be achieved with Tailwind\n\
         2. Keeps custom CSS minimal since we're using Tailwind\n\
         3. Follows this prompt: {prompt}\n\n\
         Return ONLY the CSS code."
    )
}

fn static_js(prompt: &str) -> String {
    format!(
        "Create a JavaScript file that:\n\
         1. Uses modern JavaScript (ES6+)\n\
         2. Handles all interactive functionality\n\
         3. Follows this prompt: {prompt}\n\n\
         Return ONLY the JavaScript code."
    )
}

pub fn structure_prompt(user_prompt: &str, platform: Platform, baseline: &DirectoryNode) -> String {
    let skeleton = serde_json::to_string_pretty(baseline).unwrap_or_else(|_| "{}".to_string());
    format!(
        "You are a project structure generator.\n\
         Create a {platform} project structure for: {user_prompt}\n\n\
         Use this exact format for your response, no other text:\n\
         {{\n  \"analysis\": \"Brief analysis of the project requirements\",\n  \"structure\": {skeleton}\n}}\n\n\
         Modify the structure object above to match the project requirements.\n\
         Every file node needs a \"purpose\" explaining what it contains.\n\
         Keep the JSON format exactly as shown, with no additional text or markdown.\n\
         The response must be valid JSON.",
        platform = platform.describe(),
    )
}

pub struct FilePromptInput<'a> {
    pub user_prompt: &'a str,
    pub platform: Platform,
    pub path: &'a str,
    pub purpose: &'a str,
    pub analysis: Option<&'a str>,
    pub existing_code: Option<&'a str>,
}

pub fn file_prompt(input: &FilePromptInput<'_>) -> String {
    let mut prompt = match input.existing_code {
        Some(code) => update_instructions(input, code),
        None => generation_instructions(input),
    };
    if let Some(analysis) = input.analysis.filter(|a| !a.trim().is_empty()) {
        prompt.push_str("\n\nProject analysis for context:\n");
        prompt.push_str(analysis);
    }
    prompt
}

fn generation_instructions(input: &FilePromptInput<'_>) -> String {
    let specific = match input.platform {
        Platform::None => STATIC_SITE_TEMPLATES
            .get(relative_path(input.path))
            .map(|template| template(input.user_prompt)),
        _ => None,
    };
    let body = specific.unwrap_or_else(|| {
        format!(
            "Generate code for a {} project: {}\nReturn ONLY the complete, working code for this file.",
            input.platform.describe(),
            input.user_prompt
        )
    });
    let purpose = if input.purpose.trim().is_empty() {
        String::new()
    } else {
        format!("\nPurpose: {}", input.purpose)
    };
    format!("File: {}{}\n\n{}", input.path, purpose, body)
}

fn update_instructions(input: &FilePromptInput<'_>, code: &str) -> String {
    format!(
        "Update this code based on: {prompt}\n\
         File: {path}\n\
         Project type: {platform}\n\n\
         Current code:\n{code}\n\n\
         Important:\n\
         1. Return ONLY the updated code\n\
         2. Maintain the same file structure\n\
         3. Keep existing imports/exports\n\
         4. For CSS, use existing class names",
        prompt = input.user_prompt,
        path = input.path,
        platform = input.platform.describe(),
    )
}

pub fn change_analysis_prompt(
    new_prompt: &str,
    previous_prompt: &str,
    platform: Platform,
    paths: &[&str],
) -> String {
    format!(
        "Previous task: {previous_prompt}\n\
         New request: {new_prompt}\n\
         Project type: {platform}\n\n\
         Available files in the project:\n{files}\n\n\
         Important: Only return paths from the above list that need to be modified.\n\
         Do not suggest new files that don't exist.\n\
         Return only the exact file paths, one per line.",
        platform = platform.describe(),
        files = paths.join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(platform: Platform, path: &'a str) -> FilePromptInput<'a> {
        FilePromptInput {
            user_prompt: "todo app",
            platform,
            path,
            purpose: "entry",
            analysis: Some("A small todo list."),
            existing_code: None,
        }
    }

    #[test]
    fn static_site_files_use_specialised_templates() {
        let html = file_prompt(&input(Platform::None, "root/src/index.html"));
        assert!(html.contains("Includes Tailwind CSS via CDN"));
        assert!(html.contains("todo app"));
        assert!(html.contains("A small todo list."));

        let css = file_prompt(&input(Platform::None, "root/src/style.css"));
        assert!(css.contains("Return ONLY the CSS code."));
    }

    #[test]
    fn other_files_use_generic_template() {
        let prompt = file_prompt(&input(Platform::React, "root/src/index.html"));
        assert!(!prompt.contains("Tailwind CSS via CDN"));
        assert!(prompt.contains("React project: todo app"));
        assert!(prompt.contains("Purpose: entry"));
    }

    #[test]
    fn existing_code_switches_to_update_instructions() {
        let mut i = input(Platform::None, "root/src/style.css");
        i.existing_code = Some("body { color: black; }");
        let prompt = file_prompt(&i);
        assert!(prompt.starts_with("Update this code based on: todo app"));
        assert!(prompt.contains("body { color: black; }"));
    }

    #[test]
    fn structure_prompt_embeds_baseline() {
        let prompt = structure_prompt("todo app", Platform::None, &Platform::None.baseline());
        assert!(prompt.contains("\"style.css\""));
        assert!(prompt.contains("\"analysis\""));
    }

    #[test]
    fn change_prompt_lists_every_path() {
        let prompt = change_analysis_prompt(
            "add dark mode",
            "todo app",
            Platform::None,
            &["src/style.css", "src/script.js"],
        );
        assert!(prompt.contains("src/style.css\nsrc/script.js"));
        assert!(prompt.contains("Previous task: todo app"));
    }
}
