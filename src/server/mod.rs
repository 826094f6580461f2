//! HTTP front end: POST a manifest, get the reports back as JSON.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::sync::Notify;

use crate::error::{KubesecError, Result};
use crate::intoto;
use crate::rules::{Report, Ruleset};

/// Where `GET` requests are sent.
pub const HOMEPAGE: &str = "https://kubesec.io";

/// File name recorded in reports for manifests posted over HTTP.
pub const REQUEST_FILE_NAME: &str = "API";

const FORM_PREFIX: &[u8] = b"file=";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Upper bound on draining in-flight requests after a shutdown signal.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
struct AppState {
    ruleset: Arc<Ruleset>,
}

#[derive(Debug, Default, Deserialize)]
struct ScanParams {
    #[serde(rename = "in-toto", default)]
    in_toto: Option<String>,
}

impl ScanParams {
    fn wants_link(&self) -> bool {
        self.in_toto.as_deref().is_some_and(|v| !v.is_empty())
    }
}

/// Build the routes around a shared ruleset.
pub fn router(ruleset: Arc<Ruleset>) -> Router {
    Router::new()
        .route("/", get(redirect_home).post(scan))
        .route("/scan", get(redirect_home).post(scan))
        .route("/healthz", get(healthz))
        .with_state(AppState { ruleset })
}

/// Serve until Ctrl-C or SIGTERM, then drain for at most the configured
/// shutdown timeout.
pub async fn serve(config: ServerConfig, ruleset: Ruleset) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| KubesecError::Server(format!("unable to bind {addr}: {e}")))?;
    tracing::info!(port = config.port, "starting HTTP server");

    let signalled = Arc::new(Notify::new());
    let notify = Arc::clone(&signalled);
    let server = axum::serve(listener, router(Arc::new(ruleset)))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            notify.notify_one();
        })
        .into_future();

    tokio::select! {
        result = server => {
            result.map_err(|e| KubesecError::Server(e.to_string()))?;
            tracing::info!("HTTP server stopped");
        }
        _ = async {
            signalled.notified().await;
            tokio::time::sleep(config.shutdown_timeout).await;
        } => {
            tracing::error!(timeout = ?config.shutdown_timeout, "HTTP server graceful shutdown timed out");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "unable to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

async fn redirect_home() -> Redirect {
    Redirect::to(HOMEPAGE)
}

async fn healthz() -> &'static str {
    "OK\n"
}

fn strip_form_prefix(body: &[u8]) -> &[u8] {
    body.strip_prefix(FORM_PREFIX).unwrap_or(body)
}

fn bad_request(message: impl std::fmt::Display) -> Response {
    (StatusCode::BAD_REQUEST, format!("{message}\n")).into_response()
}

fn pretty_json<T: serde::Serialize>(payload: &T) -> Response {
    match serde_json::to_string_pretty(payload) {
        Ok(mut body) => {
            body.push('\n');
            ([(header::CONTENT_TYPE, "application/json")], body).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "unable to serialize response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn scan(State(state): State<AppState>, Query(params): Query<ScanParams>, body: Bytes) -> Response {
    let manifest = strip_form_prefix(&body).to_vec();
    let ruleset = Arc::clone(&state.ruleset);

    // schema lookups may block on the network
    let scanned = tokio::task::spawn_blocking(move || {
        let reports = ruleset.run(REQUEST_FILE_NAME, &manifest);
        (reports, manifest)
    })
    .await;

    let (reports, manifest) = match scanned {
        Ok(done) => done,
        Err(e) => {
            tracing::error!(error = %e, "scan task failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let reports: Vec<Report> = match reports {
        Ok(reports) => reports,
        Err(e) => return bad_request(e),
    };

    if !params.wants_link() {
        return pretty_json(&reports);
    }
    match intoto::generate_link(REQUEST_FILE_NAME, &reports, &manifest) {
        Ok(link) => pretty_json(&serde_json::json!({ "reports": reports, "link": link })),
        Err(e) => {
            tracing::error!(error = %e, "unable to generate in-toto link");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
