use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One node of a proposed project tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DirectoryNode {
    File {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default)]
        purpose: String,
    },
    Directory {
        name: String,
        #[serde(default)]
        children: Vec<DirectoryNode>,
    },
}

impl DirectoryNode {
    pub fn file(name: &str, purpose: &str) -> Self {
        DirectoryNode::File {
            name: name.to_string(),
            path: None,
            purpose: purpose.to_string(),
        }
    }

    pub fn dir(name: &str, children: Vec<DirectoryNode>) -> Self {
        DirectoryNode::Directory {
            name: name.to_string(),
            children,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            DirectoryNode::File { name, .. } | DirectoryNode::Directory { name, .. } => name,
        }
    }

    /// Decodes a node from model output, which rarely follows the schema
    /// exactly. A node is a directory when it says so or carries a `children`
    /// array; anything else with a name is a file. Nameless nodes are dropped.
    pub fn from_value(value: &Value) -> Option<Self> {
        let name = match value.get("name").and_then(Value::as_str).map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                warn!("Skipping structure node without a name: {}", value);
                return None;
            }
        };
        let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
        let children = value.get("children").and_then(Value::as_array);

        if kind.eq_ignore_ascii_case("directory") || (kind != "file" && children.is_some()) {
            let children = children
                .map(|nodes| nodes.iter().filter_map(DirectoryNode::from_value).collect())
                .unwrap_or_default();
            Some(DirectoryNode::Directory { name, children })
        } else {
            Some(DirectoryNode::File {
                name,
                path: value.get("path").and_then(Value::as_str).map(String::from),
                purpose: value
                    .get("purpose")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
        }
    }
}

/// The analysis and merged tree produced once per generation session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectPlan {
    pub analysis: String,
    pub tree: DirectoryNode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub path: String,
    pub purpose: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Javascript,
    Jsx,
    Typescript,
    Tsx,
    Css,
    Html,
    Json,
    Markdown,
    #[default]
    Plaintext,
}

impl Language {
    pub fn from_path(path: &str) -> Self {
        let ext = path.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
        match ext.as_str() {
            "js" => Language::Javascript,
            "jsx" => Language::Jsx,
            "ts" => Language::Typescript,
            "tsx" => Language::Tsx,
            "css" => Language::Css,
            "html" => Language::Html,
            "json" => Language::Json,
            "md" => Language::Markdown,
            _ => Language::Plaintext,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedFile {
    #[serde(default)]
    pub path: String,
    pub code: String,
    #[serde(default)]
    pub language: Language,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(alias = "techName", default = "default_platform")]
    pub platform_tag: String,
    #[serde(alias = "prompt")]
    pub user_prompt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    #[serde(alias = "prompt")]
    pub user_prompt: String,
    #[serde(default)]
    pub previous_prompt: String,
    #[serde(alias = "projectType", default = "default_platform")]
    pub platform_tag: String,
    #[serde(default)]
    pub files: HashMap<String, GeneratedFile>,
}

fn default_platform() -> String {
    "none".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewFile {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    #[serde(alias = "platformTag", default = "default_platform")]
    pub framework: String,
    pub files: Vec<PreviewFile>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub workspace_id: String,
    pub preview_url: String,
}
