use crate::error::GenerationError;
use crate::llm::CompletionClient;
use crate::models::{DirectoryNode, ProjectPlan};
use crate::normalizer::normalize;
use crate::platform::Platform;
use crate::prompts::structure_prompt;
use log::{debug, info};
use serde_json::Value;

const DEFAULT_ANALYSIS: &str = "Project structure generated successfully";

/// Asks the model for a project layout and merges it over the platform baseline.
pub async fn plan_structure(
    client: &dyn CompletionClient,
    user_prompt: &str,
    platform: Platform,
) -> Result<ProjectPlan, GenerationError> {
    let baseline = platform.baseline();
    let prompt = structure_prompt(user_prompt, platform, &baseline);

    let raw = client.complete(&prompt).await?;
    debug!("Structure response: {} chars", raw.len());

    let response = normalize(&raw)?;
    let structure = response
        .get("structure")
        .filter(|s| s.is_object())
        .ok_or_else(|| {
            GenerationError::InvalidStructure("response has no \"structure\" object".to_string())
        })?;
    let proposed = DirectoryNode::from_value(structure).unwrap_or_else(|| {
        // A nameless root still contributes its children.
        DirectoryNode::Directory {
            name: String::new(),
            children: children_of(structure),
        }
    });

    let analysis = response
        .get("analysis")
        .and_then(Value::as_str)
        .filter(|a| !a.trim().is_empty())
        .unwrap_or(DEFAULT_ANALYSIS)
        .to_string();

    let tree = merge_with_baseline(baseline, proposed)?;
    info!("Planned {} project structure", platform);
    Ok(ProjectPlan { analysis, tree })
}

fn children_of(value: &Value) -> Vec<DirectoryNode> {
    value
        .get("children")
        .and_then(Value::as_array)
        .map(|nodes| nodes.iter().filter_map(DirectoryNode::from_value).collect())
        .unwrap_or_default()
}

/// Baseline top-level children first, then the proposed ones. Nothing is
/// de-duplicated, so a model echoing the baseline yields repeated entries.
pub fn merge_with_baseline(
    baseline: DirectoryNode,
    proposed: DirectoryNode,
) -> Result<DirectoryNode, GenerationError> {
    let (proposed_name, proposed_children) = match proposed {
        DirectoryNode::Directory { name, children } => (name, children),
        DirectoryNode::File { name, .. } => {
            return Err(GenerationError::InvalidStructure(format!(
                "root node {:?} is a file, expected a directory",
                name
            )))
        }
    };
    let (baseline_name, mut children) = match baseline {
        DirectoryNode::Directory { name, children } => (name, children),
        DirectoryNode::File { name, .. } => (name, Vec::new()),
    };
    children.extend(proposed_children);

    let name = if proposed_name.is_empty() {
        baseline_name
    } else {
        proposed_name
    };
    Ok(DirectoryNode::Directory { name, children })
}
