use crate::analyzer::analyze_changes;
use crate::config::GenerationLimits;
use crate::error::GenerationError;
use crate::events::StreamEvent;
use crate::file_system::{flatten, group_of};
use crate::generator::{generate_file_code, strip_code_fences, GenerationContext};
use crate::llm::CompletionClient;
use crate::models::{FileDescriptor, GenerateRequest, Language, UpdateRequest};
use crate::planner::plan_structure;
use crate::platform::Platform;
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const NO_FILES_MESSAGE: &str = "No valid files found to implement the requested changes. \
                                Please check if you need to create new files first.";

/// Where a session's events go. Emission waits for channel capacity so the
/// client sees every event in order; a dropped receiver cancels the session.
pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<StreamEvent>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    pub async fn emit(&self, event: StreamEvent) -> Result<(), GenerationError> {
        debug!("Emitting {} event", event.kind());
        if self.tx.send(event).await.is_err() {
            self.cancel.cancel();
            return Err(GenerationError::Disconnected);
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), GenerationError> {
        if self.tx.is_closed() {
            self.cancel.cancel();
            Err(GenerationError::Disconnected)
        } else if self.cancel.is_cancelled() {
            Err(GenerationError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the client is gone or the session was cancelled.
    async fn stopped(&self) -> GenerationError {
        tokio::select! {
            _ = self.tx.closed() => {
                self.cancel.cancel();
                GenerationError::Disconnected
            }
            _ = self.cancel.cancelled() => GenerationError::Cancelled,
        }
    }
}

/// Drives the initial-generation and update state machines. Files are
/// generated one at a time; the only suspension points are completion calls
/// and event emission.
pub struct Orchestrator {
    client: Arc<dyn CompletionClient>,
    limits: GenerationLimits,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn CompletionClient>, limits: GenerationLimits) -> Self {
        Self { client, limits }
    }

    pub async fn run_generation(&self, request: &GenerateRequest, sink: &EventSink) {
        info!(
            "Starting {} project generation: {:?}",
            request.platform_tag, request.user_prompt
        );
        let started = Instant::now();
        let outcome = self.bounded(sink, self.generate(request, sink)).await;
        finish("Project generation", outcome, sink, started).await;
    }

    pub async fn run_update(&self, request: &UpdateRequest, sink: &EventSink) {
        info!(
            "Starting project update over {} files: {:?} -> {:?}",
            request.files.len(),
            request.previous_prompt,
            request.user_prompt
        );
        let started = Instant::now();
        let outcome = self.bounded(sink, self.update(request, sink)).await;
        finish("Project update", outcome, sink, started).await;
    }

    async fn bounded<F>(&self, sink: &EventSink, work: F) -> Result<(), GenerationError>
    where
        F: Future<Output = Result<(), GenerationError>>,
    {
        let timeout = self.limits.session_timeout;
        tokio::select! {
            outcome = work => outcome,
            reason = sink.stopped() => Err(reason),
            _ = tokio::time::sleep(timeout) => Err(GenerationError::TimedOut(timeout)),
        }
    }

    async fn generate(
        &self,
        request: &GenerateRequest,
        sink: &EventSink,
    ) -> Result<(), GenerationError> {
        let platform = Platform::from_tag(&request.platform_tag);
        sink.emit(StreamEvent::Start {
            message: format!("Starting new {} project generation...", platform),
        })
        .await?;
        sink.emit(StreamEvent::progress(
            "Analyzing requirements and creating project structure...",
        ))
        .await?;

        let plan = plan_structure(self.client.as_ref(), &request.user_prompt, platform).await?;
        let mut files = flatten(&plan.tree);
        let skipped = files.len().saturating_sub(self.limits.max_files);
        files.truncate(self.limits.max_files);

        sink.emit(StreamEvent::Structure {
            analysis: plan.analysis.clone(),
            files: files.clone(),
            tree: plan.tree,
        })
        .await?;
        if skipped > 0 {
            warn!("Plan exceeds the {} file limit; skipping {} files", self.limits.max_files, skipped);
            sink.emit(StreamEvent::progress(format!(
                "The plan lists more than {} files; the remaining {} will not be generated.",
                self.limits.max_files, skipped
            )))
            .await?;
        }
        sink.emit(StreamEvent::progress(
            "Project structure created. Generating code for each file...",
        ))
        .await?;

        let ctx = GenerationContext {
            user_prompt: &request.user_prompt,
            platform,
            analysis: Some(&plan.analysis),
            existing_code: None,
        };
        let mut current_group: Option<&str> = None;
        let mut failed = 0usize;
        for (index, file) in files.iter().enumerate() {
            sink.ensure_active()?;

            let group = group_of(&file.path).unwrap_or(file.path.as_str());
            if current_group != Some(group) {
                current_group = Some(group);
                sink.emit(StreamEvent::progress(format!("Generating {} files...", group)))
                    .await?;
            }

            debug!("Generating {} ({}/{})", file.path, index + 1, files.len());
            match generate_file_code(self.client.as_ref(), file, &ctx).await {
                Ok(code) => {
                    sink.emit(StreamEvent::Code {
                        path: file.path.clone(),
                        code: strip_code_fences(&code),
                        language: Language::from_path(&file.path),
                    })
                    .await?
                }
                Err(e) => {
                    warn!("Failed to generate code for {}: {}", file.path, e);
                    failed += 1;
                    sink.emit(StreamEvent::file_error(
                        &file.path,
                        format!("Failed to generate code for {}: {}", file.path, e),
                    ))
                    .await?
                }
            }
        }

        let summary = if failed == 0 {
            "All files generated successfully! Your project is ready.".to_string()
        } else {
            format!("Generation finished; {} of {} files failed.", failed, files.len())
        };
        sink.emit(StreamEvent::progress(summary)).await?;
        sink.emit(StreamEvent::Complete).await
    }

    async fn update(
        &self,
        request: &UpdateRequest,
        sink: &EventSink,
    ) -> Result<(), GenerationError> {
        let platform = Platform::from_tag(&request.platform_tag);
        let current: HashSet<String> = request.files.keys().cloned().collect();

        let targets = analyze_changes(
            self.client.as_ref(),
            &request.user_prompt,
            &request.previous_prompt,
            platform,
            &current,
        )
        .await?;

        if targets.is_empty() {
            info!("No existing files matched the requested changes");
            return sink
                .emit(StreamEvent::Analysis {
                    message: NO_FILES_MESSAGE.to_string(),
                })
                .await;
        }
        sink.emit(StreamEvent::Analysis {
            message: format!("Analysis complete: {} files will be updated", targets.len()),
        })
        .await?;

        for path in targets {
            sink.ensure_active()?;
            let Some(stored) = request.files.get(&path) else {
                continue;
            };

            let descriptor = FileDescriptor {
                path,
                purpose: String::new(),
            };
            let ctx = GenerationContext {
                user_prompt: &request.user_prompt,
                platform,
                analysis: None,
                existing_code: Some(&stored.code),
            };
            match generate_file_code(self.client.as_ref(), &descriptor, &ctx).await {
                Ok(raw) => {
                    let code = strip_code_fences(&raw);
                    if code == stored.code {
                        debug!("No changes needed in {}", descriptor.path);
                        continue;
                    }
                    let language = Language::from_path(&descriptor.path);
                    sink.emit(StreamEvent::Update {
                        path: descriptor.path,
                        code,
                        language,
                    })
                    .await?;
                }
                Err(e) => {
                    warn!("Failed to update {}: {}", descriptor.path, e);
                    sink.emit(StreamEvent::file_error(
                        &descriptor.path,
                        format!("Failed to update code for {}: {}", descriptor.path, e),
                    ))
                    .await?;
                }
            }
        }

        sink.emit(StreamEvent::Complete).await
    }
}

async fn finish(
    label: &str,
    outcome: Result<(), GenerationError>,
    sink: &EventSink,
    started: Instant,
) {
    match outcome {
        Ok(()) => info!("{} finished in {:.2?}", label, started.elapsed()),
        Err(GenerationError::Disconnected) => {
            warn!("{} abandoned after {:.2?}: client disconnected", label, started.elapsed())
        }
        Err(e) => {
            error!("{} failed after {:.2?}: {}", label, started.elapsed(), e);
            // The client may already be gone; nothing else to do then.
            let _ = sink
                .emit(StreamEvent::error(format!("{} failed: {}", label, e)))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{Reply, ScriptedClient};
    use crate::models::GeneratedFile;
    use std::collections::HashMap;
    use std::time::Duration;

    const EMPTY_STATIC_PLAN: &str =
        r#"{"analysis": "A todo list", "structure": {"name": "root", "type": "directory", "children": []}}"#;

    fn orchestrator(client: ScriptedClient) -> (Orchestrator, Arc<ScriptedClient>) {
        orchestrator_with(client, GenerationLimits::default())
    }

    fn orchestrator_with(
        client: ScriptedClient,
        limits: GenerationLimits,
    ) -> (Orchestrator, Arc<ScriptedClient>) {
        let client = Arc::new(client);
        (Orchestrator::new(client.clone(), limits), client)
    }

    async fn collect<F, Fut>(run: F) -> Vec<StreamEvent>
    where
        F: FnOnce(EventSink) -> Fut,
        Fut: Future<Output = ()>,
    {
        let (tx, mut rx) = mpsc::channel(256);
        run(EventSink::new(tx, CancellationToken::new())).await;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn generate_request(prompt: &str) -> GenerateRequest {
        GenerateRequest {
            platform_tag: "none".to_string(),
            user_prompt: prompt.to_string(),
        }
    }

    fn kinds(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(StreamEvent::kind).collect()
    }

    fn position(events: &[StreamEvent], kind: &str) -> usize {
        events.iter().position(|e| e.kind() == kind).unwrap()
    }

    #[tokio::test]
    async fn static_site_generation_streams_structure_then_code() {
        let (orch, client) = orchestrator(ScriptedClient::texts([
            EMPTY_STATIC_PLAN,
            "<!DOCTYPE html><html></html>",
            "```css\nbody {}\n```",
            "console.log('todo');",
        ]));
        let request = generate_request("todo app");
        let events = collect(|sink| async move { orch.run_generation(&request, &sink).await }).await;

        let structure = &events[position(&events, "structure")];
        let StreamEvent::Structure { files, .. } = structure else {
            unreachable!()
        };
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["root/src/index.html", "root/src/style.css", "root/src/script.js"]
        );

        assert_eq!(kinds(&events)[0], "start");
        assert!(position(&events, "structure") < position(&events, "code"));
        assert_eq!(events.last(), Some(&StreamEvent::Complete));

        let code: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Code { path, code, language } => Some((path.as_str(), code.as_str(), *language)),
                _ => None,
            })
            .collect();
        assert_eq!(code.len(), 3);
        assert_eq!(code[1], ("root/src/style.css", "body {}", Language::Css));
        assert!(client.prompts()[1].contains("Includes Tailwind CSS via CDN"));
    }

    #[tokio::test]
    async fn progress_is_reported_once_per_group() {
        let plan = r#"{"analysis": "x", "structure": {"name": "root", "children": [
            {"name": "public", "type": "directory", "children": [{"name": "a.html", "type": "file"}]}
        ]}}"#;
        let (orch, _) = orchestrator(ScriptedClient::texts([plan, "1", "2", "3", "4"]));
        let request = generate_request("site");
        let events = collect(|sink| async move { orch.run_generation(&request, &sink).await }).await;

        let groups: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Progress { message } if message.starts_with("Generating ") => {
                    Some(message.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(groups, vec!["Generating src files...", "Generating public files..."]);
    }

    #[tokio::test]
    async fn one_failed_file_does_not_stop_the_rest() {
        let (orch, _) = orchestrator(ScriptedClient::new(vec![
            Reply::Text(EMPTY_STATIC_PLAN.to_string()),
            Reply::Text("<html></html>".to_string()),
            Reply::Text("body {}".to_string()),
            Reply::Fail(500),
        ]));
        let request = generate_request("todo app");
        let events = collect(|sink| async move { orch.run_generation(&request, &sink).await }).await;

        let errors: Vec<_> = events.iter().filter(|e| e.kind() == "error").collect();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0],
            StreamEvent::Error { path: Some(p), .. } if p == "root/src/script.js"
        ));
        assert_eq!(events.iter().filter(|e| e.kind() == "code").count(), 2);
        assert_eq!(events.last(), Some(&StreamEvent::Complete));
    }

    #[tokio::test]
    async fn failed_file_in_the_middle_keeps_later_files() {
        let (orch, _) = orchestrator(ScriptedClient::new(vec![
            Reply::Text(EMPTY_STATIC_PLAN.to_string()),
            Reply::Text("<html></html>".to_string()),
            Reply::Fail(503),
            Reply::Text("let x = 1;".to_string()),
        ]));
        let request = generate_request("todo app");
        let events = collect(|sink| async move { orch.run_generation(&request, &sink).await }).await;

        let error_at = position(&events, "error");
        let last_code = events.iter().rposition(|e| e.kind() == "code").unwrap();
        assert!(error_at < last_code);
        assert_eq!(events.last(), Some(&StreamEvent::Complete));
    }

    #[tokio::test]
    async fn malformed_structure_aborts_before_any_code() {
        let (orch, client) = orchestrator(ScriptedClient::texts(["Sorry, I can't do that."]));
        let request = generate_request("todo app");
        let events = collect(|sink| async move { orch.run_generation(&request, &sink).await }).await;

        assert_eq!(kinds(&events), vec!["start", "progress", "error"]);
        let StreamEvent::Error { message, path } = events.last().unwrap() else {
            unreachable!()
        };
        assert!(path.is_none());
        assert!(message.contains("could not parse"));
        assert_eq!(client.prompts().len(), 1);
    }

    #[tokio::test]
    async fn transport_failure_is_a_session_error() {
        let (orch, _) = orchestrator(ScriptedClient::new(vec![Reply::Fail(401)]));
        let request = generate_request("todo app");
        let events = collect(|sink| async move { orch.run_generation(&request, &sink).await }).await;
        assert_eq!(events.last().map(StreamEvent::kind), Some("error"));
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn file_cap_truncates_the_plan() {
        let limits = GenerationLimits {
            max_files: 2,
            ..GenerationLimits::default()
        };
        let (orch, client) =
            orchestrator_with(ScriptedClient::texts([EMPTY_STATIC_PLAN, "a", "b"]), limits);
        let request = generate_request("todo app");
        let events = collect(|sink| async move { orch.run_generation(&request, &sink).await }).await;

        assert_eq!(events.iter().filter(|e| e.kind() == "code").count(), 2);
        assert_eq!(client.prompts().len(), 3);
        assert_eq!(events.last(), Some(&StreamEvent::Complete));
    }

    #[tokio::test]
    async fn session_timeout_ends_with_error() {
        struct Stalled;
        #[async_trait::async_trait]
        impl CompletionClient for Stalled {
            async fn complete(&self, _: &str) -> Result<String, crate::error::CompletionError> {
                futures::future::pending().await
            }
        }

        let limits = GenerationLimits {
            session_timeout: Duration::from_millis(20),
            ..GenerationLimits::default()
        };
        let orch = Orchestrator::new(Arc::new(Stalled), limits);
        let request = generate_request("todo app");
        let events = collect(|sink| async move { orch.run_generation(&request, &sink).await }).await;

        let StreamEvent::Error { message, .. } = events.last().unwrap() else {
            panic!("expected a terminal error, got {:?}", events.last())
        };
        assert!(message.contains("timed out"));
    }

    #[tokio::test]
    async fn dropped_receiver_stops_generation() {
        let (orch, client) = orchestrator(ScriptedClient::texts([EMPTY_STATIC_PLAN, "a", "b", "c"]));
        let request = generate_request("todo app");
        let (tx, rx) = mpsc::channel(256);
        drop(rx);
        let cancel = CancellationToken::new();
        orch.run_generation(&request, &EventSink::new(tx, cancel.clone())).await;

        assert!(cancel.is_cancelled());
        assert!(client.prompts().is_empty());
    }

    /// Answers the plan, then blocks on every file request.
    #[derive(Default)]
    struct StallsAfterPlan {
        calls: std::sync::atomic::AtomicUsize,
        blocked: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl CompletionClient for StallsAfterPlan {
        async fn complete(&self, _: &str) -> Result<String, crate::error::CompletionError> {
            let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call == 0 {
                return Ok(EMPTY_STATIC_PLAN.to_string());
            }
            self.blocked.notify_one();
            futures::future::pending().await
        }
    }

    #[tokio::test]
    async fn disconnect_during_a_completion_call_aborts_the_session() {
        let client = Arc::new(StallsAfterPlan::default());
        let orch = Orchestrator::new(client.clone(), GenerationLimits::default());
        let request = generate_request("todo app");
        let (tx, mut rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();
        let sink = EventSink::new(tx, cancel.clone());

        let disconnect = async {
            client.blocked.notified().await;
            let mut seen = Vec::new();
            while let Ok(event) = rx.try_recv() {
                seen.push(event.kind());
            }
            drop(rx);
            seen
        };
        let (_, seen) = tokio::time::timeout(
            Duration::from_secs(5),
            async { tokio::join!(orch.run_generation(&request, &sink), disconnect) },
        )
        .await
        .expect("session should stop once the client is gone");

        assert!(seen.contains(&"structure"));
        assert!(cancel.is_cancelled());
        assert_eq!(client.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    fn stored(files: &[(&str, &str)]) -> HashMap<String, GeneratedFile> {
        files
            .iter()
            .map(|(path, code)| {
                (
                    path.to_string(),
                    GeneratedFile {
                        path: path.to_string(),
                        code: code.to_string(),
                        language: Language::from_path(path),
                    },
                )
            })
            .collect()
    }

    fn update_request(files: HashMap<String, GeneratedFile>) -> UpdateRequest {
        UpdateRequest {
            user_prompt: "add dark mode".to_string(),
            previous_prompt: "todo app".to_string(),
            platform_tag: "none".to_string(),
            files,
        }
    }

    #[tokio::test]
    async fn update_regenerates_only_existing_selected_files() {
        let (orch, client) = orchestrator(ScriptedClient::texts([
            "src/style.css\nsrc/missing.js\n",
            "body { background: #111; }",
        ]));
        let request = update_request(stored(&[
            ("src/style.css", "body { background: #fff; }"),
            ("src/script.js", "console.log(1);"),
        ]));
        let events = collect(|sink| async move { orch.run_update(&request, &sink).await }).await;

        assert_eq!(kinds(&events), vec!["analysis", "update", "complete"]);
        assert_eq!(
            events[1],
            StreamEvent::Update {
                path: "src/style.css".to_string(),
                code: "body { background: #111; }".to_string(),
                language: Language::Css,
            }
        );
        assert!(client.prompts()[1].contains("body { background: #fff; }"));
    }

    #[tokio::test]
    async fn unchanged_code_emits_no_update() {
        let (orch, _) = orchestrator(ScriptedClient::texts([
            "src/style.css\nsrc/script.js",
            "```css\nbody {}\n```",
            "console.log(2);",
        ]));
        let request = update_request(stored(&[
            ("src/style.css", "body {}"),
            ("src/script.js", "console.log(1);"),
        ]));
        let events = collect(|sink| async move { orch.run_update(&request, &sink).await }).await;

        let updated: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Update { path, .. } => Some(path.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(updated, vec!["src/script.js"]);
        assert_eq!(events.last(), Some(&StreamEvent::Complete));
    }

    #[tokio::test]
    async fn no_matching_files_ends_with_analysis() {
        let (orch, client) = orchestrator(ScriptedClient::texts(["src/new-feature.js"]));
        let request = update_request(stored(&[("src/style.css", "body {}")]));
        let events = collect(|sink| async move { orch.run_update(&request, &sink).await }).await;

        assert_eq!(
            events,
            vec![StreamEvent::Analysis {
                message: NO_FILES_MESSAGE.to_string()
            }]
        );
        assert_eq!(client.prompts().len(), 1);
    }

    #[tokio::test]
    async fn failed_update_is_file_scoped() {
        let (orch, _) = orchestrator(ScriptedClient::new(vec![
            Reply::Text("a.css\nb.js".to_string()),
            Reply::Fail(500),
            Reply::Text("let b = 2;".to_string()),
        ]));
        let request = update_request(stored(&[("a.css", "a {}"), ("b.js", "let b = 1;")]));
        let events = collect(|sink| async move { orch.run_update(&request, &sink).await }).await;

        assert_eq!(kinds(&events), vec!["analysis", "error", "update", "complete"]);
    }

    #[tokio::test]
    async fn analyzer_failure_is_a_session_error() {
        let (orch, _) = orchestrator(ScriptedClient::new(vec![Reply::Fail(500)]));
        let request = update_request(stored(&[("a.css", "a {}")]));
        let events = collect(|sink| async move { orch.run_update(&request, &sink).await }).await;

        assert_eq!(kinds(&events), vec!["error"]);
        assert!(events[0].is_terminal());
    }
}
