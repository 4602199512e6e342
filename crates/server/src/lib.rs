use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    routing::post,
    Json, Router,
};
use dealdesk_engine::{theme, Event, HostTransport, ViewModel};
use dealdesk_protocol::{HostMessage, ThemeColors};
use serde::Deserialize;
use std::fmt;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

pub mod config;
pub mod runtime;

#[cfg(test)]
mod tests;

pub use config::OverlayConfig;
pub use runtime::{OverlayHandle, RuntimeGone};

#[derive(Clone)]
pub struct AppState {
    pub overlay: OverlayHandle,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/state", get(view_state))
        .route("/message", post(host_message))
        .route("/ui/select", post(ui_select))
        .route("/ui/amount", post(ui_amount))
        .route("/ui/sell", post(ui_sell))
        .route("/ui/close", post(ui_close))
        .route("/ui/theme", post(ui_theme))
        .with_state(Arc::new(state))
        // The host and the panel shell both live on this machine.
        .layer(middleware::from_fn(ip_allowlist))
        .layer(local_only_cors())
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unavailable,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            ApiError::Unavailable => f.write_str("overlay runtime unavailable"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<RuntimeGone> for ApiError {
    fn from(_: RuntimeGone) -> Self {
        ApiError::Unavailable
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = serde_json::json!({
            "success": false,
            "error": self.to_string()
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Json<ViewModel>, ApiError>;

async fn health() -> &'static str {
    "ok"
}

async fn view_state(State(state): State<Arc<AppState>>) -> Json<ViewModel> {
    Json(state.overlay.view())
}

/// Host push channel. Unknown actions are accepted and ignored.
async fn host_message(
    State(state): State<Arc<AppState>>,
    Json(msg): Json<HostMessage>,
) -> ApiResult {
    match Event::from_host(msg) {
        Some(event) => Ok(Json(state.overlay.dispatch(event).await?)),
        None => {
            debug!("ignoring unknown host action");
            Ok(Json(state.overlay.view()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SelectInput {
    #[serde(default)]
    name: String,
}

async fn ui_select(
    State(state): State<Arc<AppState>>,
    Json(input): Json<SelectInput>,
) -> ApiResult {
    let view = state
        .overlay
        .dispatch(Event::UserSelectedItem { name: input.name })
        .await?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
struct AmountInput {
    #[serde(default)]
    value: Option<i64>,
    #[serde(default)]
    delta: Option<i64>,
}

async fn ui_amount(
    State(state): State<Arc<AppState>>,
    Json(input): Json<AmountInput>,
) -> ApiResult {
    let event = match (input.value, input.delta) {
        (Some(value), _) => Event::UserChangedAmount { value },
        (None, Some(delta)) => Event::UserSteppedAmount { delta },
        (None, None) => {
            return Err(ApiError::BadRequest(
                "expected `value` or `delta`".to_string(),
            ))
        }
    };
    Ok(Json(state.overlay.dispatch(event).await?))
}

async fn ui_sell(State(state): State<Arc<AppState>>) -> ApiResult {
    Ok(Json(state.overlay.dispatch(Event::UserRequestedSell).await?))
}

async fn ui_close(State(state): State<Arc<AppState>>) -> ApiResult {
    Ok(Json(state.overlay.dispatch(Event::UserRequestedClose).await?))
}

#[derive(Debug, Deserialize)]
struct ThemeInput {
    #[serde(default)]
    colors: Option<ThemeColors>,
    #[serde(default)]
    preset: Option<String>,
}

async fn ui_theme(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ThemeInput>,
) -> ApiResult {
    let colors = match (input.colors, input.preset) {
        (Some(colors), _) => colors,
        (None, Some(name)) => theme::preset(&name)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown preset: {name}")))?,
        (None, None) => {
            return Err(ApiError::BadRequest(
                "expected `colors` or `preset`".to_string(),
            ))
        }
    };
    Ok(Json(
        state
            .overlay
            .dispatch(Event::UserSavedColors { colors })
            .await?,
    ))
}

/// Start the runtime against the configured host and serve until ctrl-c.
pub async fn serve(config: OverlayConfig) -> anyhow::Result<()> {
    let transport = config.transport().context("build host transport")?;
    info!(host = %transport.base_url(), "host transport ready");

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("bind {}", config.bind))?;
    let overlay = runtime::spawn(transport, &config);
    serve_listener(listener, AppState { overlay }, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}

pub async fn serve_listener(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<SocketAddr> {
    let app = build_router(state);
    let addr = listener.local_addr()?;
    info!(%addr, "overlay surface listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(addr)
}

/// Spawn an overlay for any transport; used by embedders and tests.
pub fn spawn_overlay<T: HostTransport>(transport: T, config: &OverlayConfig) -> AppState {
    AppState {
        overlay: runtime::spawn(transport, config),
    }
}

async fn ip_allowlist(
    axum::extract::ConnectInfo(peer): axum::extract::ConnectInfo<SocketAddr>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    if is_allowed_peer_ip(peer.ip()) {
        return next.run(req).await;
    }
    (StatusCode::FORBIDDEN, "forbidden").into_response()
}

fn is_allowed_peer_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map_or(v6.is_loopback(), |v4| v4.is_loopback()),
        IpAddr::V4(v4) => v4.is_loopback(),
    }
}

fn local_only_cors() -> CorsLayer {
    use axum::http::header;
    use axum::http::HeaderValue;
    use axum::http::Method;

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _req| {
            is_allowed_local_origin(origin)
        }))
}

fn is_allowed_local_origin(origin: &axum::http::HeaderValue) -> bool {
    let Ok(s) = origin.to_str() else {
        return false;
    };

    // In-game browser origins.
    if s == "nui://game" || is_cfx_nui_origin(s) {
        return true;
    }

    is_http_origin_for_host(s, "localhost") || is_http_origin_for_host(s, "127.0.0.1")
}

fn is_cfx_nui_origin(origin: &str) -> bool {
    origin
        .strip_prefix("https://cfx-nui-")
        .is_some_and(|name| !name.is_empty() && !name.contains(['/', ':']))
}

fn is_http_origin_for_host(origin: &str, host: &str) -> bool {
    for scheme in ["http://", "https://"] {
        if let Some(rest) = origin.strip_prefix(scheme) {
            if let Some(after) = rest.strip_prefix(host) {
                // Origin is just scheme://host[:port]
                return after.is_empty() || after.starts_with(':');
            }
        }
    }
    false
}
