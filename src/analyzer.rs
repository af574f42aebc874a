use crate::error::GenerationError;
use crate::llm::CompletionClient;
use crate::platform::Platform;
use crate::prompts::change_analysis_prompt;
use log::{debug, info};
use std::collections::HashSet;

/// Asks the model which existing files a new request touches. Paths the model
/// invents are dropped; the result only ever names files in `current_paths`.
pub async fn analyze_changes(
    client: &dyn CompletionClient,
    new_prompt: &str,
    previous_prompt: &str,
    platform: Platform,
    current_paths: &HashSet<String>,
) -> Result<Vec<String>, GenerationError> {
    let mut listed: Vec<&str> = current_paths.iter().map(String::as_str).collect();
    listed.sort_unstable();

    let prompt = change_analysis_prompt(new_prompt, previous_prompt, platform, &listed);
    let raw = client.complete(&prompt).await?;

    let paths = filter_existing(&raw, current_paths);
    info!(
        "Change analysis selected {} of {} files",
        paths.len(),
        current_paths.len()
    );
    Ok(paths)
}

/// One path per line; bullets and backticks are tolerated, repeats collapse.
pub fn filter_existing(raw: &str, current_paths: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.lines()
        .map(clean_line)
        .filter(|line| !line.is_empty())
        .filter(|line| {
            let known = current_paths.contains(*line);
            if !known {
                debug!("Ignoring unknown path from change analysis: {}", line);
            }
            known
        })
        .filter(|line| seen.insert(*line))
        .map(String::from)
        .collect()
}

fn clean_line(line: &str) -> &str {
    let line = line.trim();
    let line = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .unwrap_or(line);
    line.trim().trim_matches('`').trim()
}
