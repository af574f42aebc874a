use actix_cors::Cors;
use actix_files::Files;
use actix_web::http::header;
use actix_web::{middleware, web, App, HttpServer};
use log::{error, info, warn};
use rustls::ServerConfig;
use rustls_pemfile::{certs, pkcs8_private_keys};
use scaffolder::config::Config;
use scaffolder::handlers::{self, static_handler, AppState};
use scaffolder::llm::{CompletionClient, GeminiClient, RetryingClient};
use scaffolder::orchestrator::Orchestrator;
use scaffolder::workspace::{WorkspaceManager, PREVIEW_ROUTE};
use std::env;
use std::fs::File as FsFile;
use std::io::{self, BufReader};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn load_tls_config(cert_path: &str, key_path: &str) -> io::Result<ServerConfig> {
    let cert_file = &mut BufReader::new(FsFile::open(cert_path)?);
    let key_file = &mut BufReader::new(FsFile::open(key_path)?);
    let cert_chain = certs(cert_file).collect::<Result<Vec<_>, _>>()?;
    let mut keys = pkcs8_private_keys(key_file).collect::<Result<Vec<_>, _>>()?;

    if keys.is_empty() {
        return Err(io::Error::new(io::ErrorKind::Other, "No private keys found in key file"));
    }

    ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, keys.remove(0).into())
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    // Override with RUST_LOG, e.g. `RUST_LOG=scaffolder=debug`.
    env::set_var("RUST_LOG", env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()));
    env_logger::init();

    let config = Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    if config.llm.api_key.is_none() {
        warn!("GEMINI_API_KEY is not set; generation requests will fail.");
    }

    let gemini = GeminiClient::new(&config.llm).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    let client: Arc<dyn CompletionClient> = Arc::new(RetryingClient::new(
        gemini,
        config.llm.max_attempts,
        config.llm.retry_backoff,
    ));
    let orchestrator = Arc::new(Orchestrator::new(client, config.limits.clone()));

    let workspaces = Arc::new(
        WorkspaceManager::new(&config.preview.root_dir, config.preview.retention)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?,
    );
    let shutdown = CancellationToken::new();
    let sweeper = workspaces
        .clone()
        .spawn_sweeper(config.preview.sweep_interval, shutdown.clone());

    let state = web::Data::new(AppState {
        orchestrator,
        workspaces: workspaces.clone(),
        shutdown: shutdown.clone(),
    });
    let preview_dir = config.preview.root_dir.clone();

    let addr = format!("0.0.0.0:{}", config.port);
    info!("Server running at http://{}", addr);
    info!("Serving previews from {}", preview_dir.display());

    let mut http_server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "DELETE"])
            .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE, header::CACHE_CONTROL])
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(handlers::configure)
            .service(Files::new(PREVIEW_ROUTE, &preview_dir).index_file("index.html"))
            .default_service(web::to(static_handler))
    });

    match (&config.cert_path, &config.key_path) {
        (Some(cert_path), Some(key_path))
            if Path::new(cert_path).exists() && Path::new(key_path).exists() =>
        {
            info!("Attempting to start HTTPS server...");
            let tls = load_tls_config(cert_path, key_path)?;
            info!("Successfully configured TLS. Binding to https://{}", addr);
            http_server = http_server.bind_rustls_0_23(&addr, tls)?;
        }
        (Some(_), Some(_)) => {
            warn!("CERT_PATH or KEY_PATH points to a non-existent file. Starting without HTTPS.");
            http_server = http_server.bind(&addr)?;
        }
        _ => {
            info!("No CERT_PATH or KEY_PATH found in env. Starting plain HTTP server.");
            http_server = http_server.bind(&addr)?;
        }
    }

    let result = http_server.run().await;

    info!("Server stopped; cancelling in-flight sessions.");
    shutdown.cancel();
    if let Err(e) = sweeper.await {
        error!("Preview sweeper ended abnormally: {}", e);
    }
    result
}
