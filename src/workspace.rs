//! Ephemeral on-disk workspaces that back the live preview.

use crate::error::WorkspaceError;
use crate::file_system::resolve_within;
use crate::generator::strip_code_fences;
use crate::models::PreviewFile;
use crate::platform::Platform;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use regex::Regex;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs as tokio_fs;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const PREVIEW_ROUTE: &str = "/preview";
const ENTRY_FILE: &str = "index.html";

#[derive(Debug, Clone)]
struct WorkspaceMeta {
    path: PathBuf,
    platform: Platform,
    entry: String,
    created: DateTime<Utc>,
}

/// Owns every live preview workspace. Creation, lookup, removal and the
/// periodic sweep all go through the same lock.
pub struct WorkspaceManager {
    root: PathBuf,
    retention: Duration,
    workspaces: Mutex<HashMap<String, WorkspaceMeta>>,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>, retention: Duration) -> Result<Self, WorkspaceError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            retention,
            workspaces: Mutex::new(HashMap::new()),
        })
    }

    pub async fn create_workspace(
        &self,
        files: &[PreviewFile],
        platform: Platform,
    ) -> Result<String, WorkspaceError> {
        let id = Uuid::new_v4().to_string();
        let path = self.root.join(&id);
        info!("Creating {} preview workspace {} with {} files", platform, id, files.len());

        match populate(&path, files, platform).await {
            Ok(entry) => {
                self.workspaces.lock().await.insert(
                    id.clone(),
                    WorkspaceMeta {
                        path,
                        platform,
                        entry,
                        created: Utc::now(),
                    },
                );
                Ok(id)
            }
            Err(e) => {
                warn!("Workspace {} creation failed: {}", id, e);
                if let Err(cleanup_err) = tokio_fs::remove_dir_all(&path).await {
                    debug!("Nothing to remove for {}: {}", id, cleanup_err);
                }
                Err(e)
            }
        }
    }

    pub async fn get_preview_url(&self, id: &str) -> Result<String, WorkspaceError> {
        let workspaces = self.workspaces.lock().await;
        let meta = workspaces
            .get(id)
            .ok_or_else(|| WorkspaceError::NotFound(id.to_string()))?;
        debug!("Preview for {} ({}) served from {}", id, meta.platform, meta.path.display());
        Ok(format!("{}/{}/{}", PREVIEW_ROUTE, id, meta.entry))
    }

    /// Removes a workspace. Unknown ids are a no-op.
    pub async fn cleanup(&self, id: &str) -> Result<(), WorkspaceError> {
        let removed = self.workspaces.lock().await.remove(id);
        if let Some(meta) = removed {
            info!("Removing preview workspace {}", id);
            remove_dir(&meta.path).await?;
        }
        Ok(())
    }

    pub async fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now()).await
    }

    async fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let retention = chrono::Duration::from_std(self.retention)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        let expired: Vec<(String, WorkspaceMeta)> = {
            let mut workspaces = self.workspaces.lock().await;
            let ids: Vec<String> = workspaces
                .iter()
                .filter(|(_, meta)| now.signed_duration_since(meta.created) > retention)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| workspaces.remove(&id).map(|meta| (id, meta)))
                .collect()
        };

        for (id, meta) in &expired {
            if let Err(e) = remove_dir(&meta.path).await {
                warn!("Failed to remove expired workspace {}: {}", id, e);
            }
        }
        if !expired.is_empty() {
            info!("Swept {} expired preview workspaces", expired.len());
        }
        expired.len()
    }

    pub fn spawn_sweeper(self: Arc<Self>, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep_expired().await;
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
            debug!("Preview sweeper stopped");
        })
    }
}

async fn remove_dir(path: &Path) -> Result<(), WorkspaceError> {
    match tokio_fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Writes every file and returns the entry path, relative to the workspace.
async fn populate(
    dir: &Path,
    files: &[PreviewFile],
    platform: Platform,
) -> Result<String, WorkspaceError> {
    tokio_fs::create_dir_all(dir).await?;

    for file in files {
        let target = resolve_within(dir, &file.path).map_err(|e| {
            warn!("{}", e);
            WorkspaceError::InvalidPath(file.path.clone())
        })?;
        if let Some(parent) = target.parent() {
            tokio_fs::create_dir_all(parent).await?;
        }
        debug!("Writing preview file {}", file.path);
        tokio_fs::write(&target, strip_code_fences(&file.content)).await?;
    }

    match platform {
        Platform::None => {
            let page = synthesize_standalone(files)?;
            tokio_fs::write(dir.join(ENTRY_FILE), page).await?;
            Ok(ENTRY_FILE.to_string())
        }
        _ => {
            let manifest = serde_json::to_string_pretty(&preview_manifest(platform))?;
            tokio_fs::write(dir.join("package.json"), manifest).await?;
            Ok(files
                .iter()
                .find(|f| is_html(&f.path))
                .map(|f| f.path.trim_start_matches('/').to_string())
                .unwrap_or_else(|| ENTRY_FILE.to_string()))
        }
    }
}

fn preview_manifest(platform: Platform) -> serde_json::Value {
    let (start, dependencies, dev_dependencies) = match platform {
        Platform::React => (
            "react-scripts start",
            json!({ "react": "^18.2.0", "react-dom": "^18.2.0", "react-scripts": "5.0.1" }),
            json!({ "@babel/plugin-proposal-private-property-in-object": "^7.21.11" }),
        ),
        Platform::Vue => (
            "vite",
            json!({ "vue": "^3.3.0", "@vitejs/plugin-vue": "^4.5.0" }),
            json!({ "vite": "^5.0.0" }),
        ),
        Platform::None | Platform::Angular | Platform::Next => ("vite", json!({}), json!({})),
    };
    json!({
        "name": "preview-project",
        "version": "1.0.0",
        "private": true,
        "scripts": { "start": start },
        "dependencies": dependencies,
        "devDependencies": dev_dependencies,
    })
}

fn extension(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

fn is_html(path: &str) -> bool {
    matches!(extension(path).as_str(), "html" | "htm")
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Builds a single self-contained page for a static site: the one HTML file
/// with the stylesheet and script inlined, so it renders inside a sandbox.
pub fn synthesize_standalone(files: &[PreviewFile]) -> Result<String, WorkspaceError> {
    let pages: Vec<&PreviewFile> = files.iter().filter(|f| is_html(&f.path)).collect();
    let page = match pages.as_slice() {
        [] => return Err(WorkspaceError::MissingEntry),
        [page] => *page,
        many => return Err(WorkspaceError::AmbiguousEntry(many.len())),
    };
    let mut html = strip_code_fences(&page.content);

    let styles: Vec<_> = files.iter().filter(|f| extension(&f.path) == "css").collect();
    let scripts: Vec<_> = files.iter().filter(|f| extension(&f.path) == "js").collect();
    if styles.len() > 1 || scripts.len() > 1 {
        warn!(
            "Preview inlines one stylesheet and one script; found {} and {}",
            styles.len(),
            scripts.len()
        );
    }

    if let Some(css) = styles.first() {
        html = remove_tags(&html, &format!(r#"<link\b[^>]*href=["'][^"']*{}["'][^>]*>"#, regex::escape(file_name(&css.path))));
        let block = format!("<style>\n{}\n</style>\n", strip_code_fences(&css.content));
        html = insert_before(&html, "</head>", &block, true);
    }
    if let Some(js) = scripts.first() {
        html = remove_tags(&html, &format!(r#"<script\b[^>]*src=["'][^"']*{}["'][^>]*>\s*</script>"#, regex::escape(file_name(&js.path))));
        let block = format!("<script>\n{}\n</script>\n", strip_code_fences(&js.content));
        html = insert_before(&html, "</body>", &block, false);
    }
    Ok(html)
}

fn remove_tags(html: &str, pattern: &str) -> String {
    match Regex::new(&format!("(?i){}", pattern)) {
        Ok(re) => re.replace_all(html, "").into_owned(),
        Err(e) => {
            warn!("Could not build tag pattern: {}", e);
            html.to_string()
        }
    }
}

/// Inserts `block` before the closing tag; without one, prepends or appends.
fn insert_before(html: &str, closing_tag: &str, block: &str, prepend_if_missing: bool) -> String {
    match html.to_ascii_lowercase().rfind(closing_tag) {
        Some(at) => format!("{}{}{}", &html[..at], block, &html[at..]),
        None if prepend_if_missing => format!("{}{}", block, html),
        None => format!("{}{}", html, block),
    }
}
