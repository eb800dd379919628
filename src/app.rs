use crate::classifier::{classify, Verdict};
use crate::collector::WindowCollector;
use crate::config::Config;
use crate::github::{AuthorAssociation, GitHubClient, InteractionsApi, Submission, EVENT_HEADER};
use crate::policy::EscalationPolicy;
use crate::signature::{verify_signature, SIGNATURE_HEADER};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

const MAX_BODY_BYTES: usize = 1024 * 1024; // 1MB safety cap
const DELIVERY_HEADER: &str = "x-github-delivery";

#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<WindowCollector<Submission>>,
    pub signing_secret: String,
    pub ignored_associations: Arc<Vec<AuthorAssociation>>,
}

impl AppState {
    /// Wires a fresh collector to an escalation policy backed by `api`.
    pub fn new(config: &Config, api: Arc<dyn InteractionsApi>) -> Self {
        let collector: Arc<WindowCollector<Submission>> =
            Arc::new(WindowCollector::with_default_windows());
        collector.subscribe(Arc::new(EscalationPolicy::new(api)));
        Self {
            collector,
            signing_secret: config.webhook_secret.clone(),
            ignored_associations: Arc::new(config.ignored_associations.clone()),
        }
    }
}

pub async fn run_server(config: Config) -> Result<()> {
    let api: Arc<dyn InteractionsApi> = Arc::new(GitHubClient::new(
        &config.github_api_url,
        &config.github_token,
        config.github_timeout,
    )?);
    let state = AppState::new(&config, api);
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to start webserver on port {}", config.port))?;
    info!("Listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    if content_type != Some("application/json") {
        warn!("Rejecting request: unsupported content-type {:?}", content_type);
        return (
            StatusCode::BAD_REQUEST,
            "Content-Type must be \"application/json\"",
        )
            .into_response();
    }

    let supplied = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if !verify_signature(&state.signing_secret, &body, supplied) {
        warn!("Webhook signature verification failed");
        return StatusCode::FORBIDDEN.into_response();
    }

    let event = header_str(&headers, EVENT_HEADER);
    let delivery = header_str(&headers, DELIVERY_HEADER);
    match process_delivery(&state, event, &body) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!(event, delivery, "/webhook error: {:?}", err);
            // The caller is authenticated at this point.
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{:?}", err)).into_response()
        }
    }
}

fn process_delivery(state: &AppState, event: &str, body: &[u8]) -> Result<()> {
    let payload: serde_json::Value =
        serde_json::from_slice(body).context("Invalid JSON body")?;

    match classify(event, &payload, &state.ignored_associations)? {
        Verdict::Admit(item) => {
            info!(
                event,
                number = item.number,
                association = %item.author_association,
                "Counting '{}' {}",
                item.title,
                item.html_url
            );
            state.collector.add_item(item);
        }
        Verdict::Skip(reason) => {
            debug!(event, "Skipping delivery: {}", reason);
        }
    }
    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
