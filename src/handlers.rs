use crate::error::WorkspaceError;
use crate::events::{encode_frame, StreamEvent};
use crate::models::{GenerateRequest, PreviewRequest, PreviewResponse, UpdateRequest};
use crate::orchestrator::{EventSink, Orchestrator};
use crate::platform::Platform;
use crate::workspace::WorkspaceManager;
use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::http::header;
use actix_web::{delete, get, post, routes, web, HttpRequest, HttpResponse};
use futures::StreamExt;
use log::{debug, info, warn};
use rust_embed::RustEmbed;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

const EVENT_BUFFER: usize = 32;

#[derive(RustEmbed)]
#[folder = "public/"]
struct Asset;

/// Shared by every worker.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub workspaces: Arc<WorkspaceManager>,
    pub shutdown: CancellationToken,
}

#[get("/api/connect")]
pub async fn connect() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "message": "Connection successful" }))
}

#[routes]
#[post("/api/generate-project")]
#[post("/api/generate")]
pub async fn generate_project(
    state: web::Data<AppState>,
    req: web::Json<GenerateRequest>,
) -> HttpResponse {
    let request = req.into_inner();
    info!("Received generation request for platform '{}'", request.platform_tag);
    let orchestrator = state.orchestrator.clone();
    event_stream(&state.shutdown, move |sink| async move {
        orchestrator.run_generation(&request, &sink).await;
    })
}

#[post("/api/update-code")]
pub async fn update_code(state: web::Data<AppState>, req: web::Json<UpdateRequest>) -> HttpResponse {
    let request = req.into_inner();
    info!("Received update request covering {} files", request.files.len());
    let orchestrator = state.orchestrator.clone();
    event_stream(&state.shutdown, move |sink| async move {
        orchestrator.run_update(&request, &sink).await;
    })
}

/// Runs `session` on its own task and streams whatever it emits. The sink is
/// dropped with the task, which ends the response body.
fn event_stream<F, Fut>(shutdown: &CancellationToken, session: F) -> HttpResponse
where
    F: FnOnce(EventSink) -> Fut,
    Fut: std::future::Future<Output = ()> + 'static,
{
    let (tx, rx) = mpsc::channel::<StreamEvent>(EVENT_BUFFER);
    let sink = EventSink::new(tx, shutdown.child_token());
    actix_rt::spawn(session(sink));

    let body = ReceiverStream::new(rx).map(|event| encode_frame(&event));
    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(body)
}

#[post("/api/preview")]
pub async fn create_preview(
    state: web::Data<AppState>,
    req: web::Json<PreviewRequest>,
) -> Result<HttpResponse, WorkspaceError> {
    let platform = Platform::from_tag(&req.framework);
    info!("Received preview request: {} files for {}", req.files.len(), platform);
    let workspace_id = state.workspaces.create_workspace(&req.files, platform).await?;
    let preview_url = state.workspaces.get_preview_url(&workspace_id).await?;
    Ok(HttpResponse::Ok().json(PreviewResponse {
        workspace_id,
        preview_url,
    }))
}

#[get("/api/preview/{id}")]
pub async fn get_preview(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> Result<HttpResponse, WorkspaceError> {
    let workspace_id = id.into_inner();
    let preview_url = state.workspaces.get_preview_url(&workspace_id).await?;
    Ok(HttpResponse::Ok().json(PreviewResponse {
        workspace_id,
        preview_url,
    }))
}

#[delete("/api/preview/{id}")]
pub async fn delete_preview(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> Result<HttpResponse, WorkspaceError> {
    state.workspaces.cleanup(&id).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

pub async fn static_handler(req: HttpRequest) -> HttpResponse {
    let path = req.path().trim_start_matches('/');
    let path = if path.is_empty() { "index.html" } else { path };
    debug!("Serving static asset: {}", path);

    match Asset::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            HttpResponse::Ok()
                .content_type(mime.as_ref())
                .body(content.data.into_owned())
        }
        None => HttpResponse::NotFound().body("404 Not Found"),
    }
}

/// Rejected request bodies get the same JSON error shape as every other failure.
fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let message = err.to_string();
    warn!("Rejected request body: {}", message);
    let response = HttpResponse::BadRequest().json(json!({ "success": false, "error": message }));
    InternalError::from_response(err, response).into()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .service(connect)
        .service(generate_project)
        .service(update_code)
        .service(create_preview)
        .service(get_preview)
        .service(delete_preview);
}
