//! Local HTTP API in front of the hub session.

use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::warn;

use hmip_device_state::render;
use hmip_hub_connection::{Outbound, SessionState};
use hmip_hub_control::{CommandDispatcher, CommandError};

/// Shared state of the HTTP handlers.
pub struct HttpState<O> {
    pub dispatcher: Arc<CommandDispatcher<O>>,
    pub session: watch::Receiver<SessionState>,
    pub credentials: Option<Arc<Credentials>>,
}

impl<O> Clone for HttpState<O> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            session: self.session.clone(),
            credentials: self.credentials.clone(),
        }
    }
}

/// Basic auth credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    fn matches(&self, headers: &HeaderMap) -> bool {
        let Some(encoded) = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Basic "))
        else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        match decoded.split_once(':') {
            Some((user, pass)) => user == self.username && pass == self.password,
            None => false,
        }
    }
}

/// Builds the router. `/health` stays reachable without credentials.
pub fn router<O: Outbound + 'static>(state: HttpState<O>) -> Router {
    let protected = Router::new()
        .route("/hmipSwitch", get(switch::<O>))
        .route("/devices", get(devices_json::<O>))
        .route("/devices/html", get(devices_html::<O>))
        .route("/refresh", post(refresh::<O>))
        .route("/status", get(status::<O>))
        .route_layer(middleware::from_fn_with_state(state.clone(), basic_auth::<O>));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn basic_auth<O: Outbound + 'static>(
    State(state): State<HttpState<O>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(creds) = &state.credentials else {
        return next.run(request).await;
    };
    if creds.matches(request.headers()) {
        return next.run(request).await;
    }
    warn!(path = %request.uri().path(), "unauthorized HTTP request");
    let mut response = (StatusCode::UNAUTHORIZED, "authentication required").into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"hmip-bridge\""),
    );
    response
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    connected: bool,
    state: &'static str,
    has_snapshot: bool,
    version: &'static str,
}

async fn status<O: Outbound + 'static>(State(state): State<HttpState<O>>) -> impl IntoResponse {
    let session = *state.session.borrow();
    Json(StatusResponse {
        connected: state.dispatcher.is_connected(),
        state: session.label(),
        has_snapshot: state.dispatcher.snapshot().is_some(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize)]
struct SwitchQuery {
    device: Option<String>,
    on: Option<String>,
    #[serde(default)]
    channel: u32,
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn command_error(e: CommandError) -> Response {
    match e {
        CommandError::NotConnected => error(StatusCode::SERVICE_UNAVAILABLE, "not connected to hub"),
        other => error(StatusCode::BAD_GATEWAY, &other.to_string()),
    }
}

async fn switch<O: Outbound + 'static>(
    State(state): State<HttpState<O>>,
    Query(query): Query<SwitchQuery>,
) -> Response {
    if !state.dispatcher.is_connected() {
        return error(StatusCode::SERVICE_UNAVAILABLE, "not connected to hub");
    }

    let device = query.device.as_deref().map(str::trim).unwrap_or_default();
    let on = match query.on.as_deref() {
        Some("true") => true,
        Some("false") => false,
        _ => return error(StatusCode::BAD_REQUEST, "invalid parameters"),
    };
    if device.is_empty() {
        return error(StatusCode::BAD_REQUEST, "invalid parameters");
    }

    match state.dispatcher.set_switch(device, on, query.channel) {
        Ok(id) => Json(json!({
            "status": format!("command sent to {device}: {}", if on { "ON" } else { "OFF" }),
            "id": id,
        }))
        .into_response(),
        Err(e) => command_error(e),
    }
}

async fn devices_json<O: Outbound + 'static>(State(state): State<HttpState<O>>) -> Response {
    match state.dispatcher.snapshot() {
        Some(snapshot) => Json(snapshot.as_ref()).into_response(),
        None => error(StatusCode::NOT_FOUND, "no device state received yet"),
    }
}

async fn devices_html<O: Outbound + 'static>(State(state): State<HttpState<O>>) -> Html<String> {
    Html(render::device_table(state.dispatcher.snapshot().as_deref()))
}

async fn refresh<O: Outbound + 'static>(State(state): State<HttpState<O>>) -> Response {
    match state.dispatcher.request_system_state() {
        Ok(id) => (StatusCode::ACCEPTED, Json(json!({ "id": id }))).into_response(),
        Err(e) => command_error(e),
    }
}
