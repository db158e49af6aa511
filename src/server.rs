//! HTTP API server: axum router and request handlers.
//!
//! The server runs on the tokio async runtime while the bulb lives on a
//! plain `std::thread` (see `runtime`). Handlers never touch the bulb
//! directly: commands go over an `mpsc` channel and the resulting snapshot
//! comes back on a `oneshot`. Reads use the latest snapshot from a `watch`
//! channel.
//!
//! ## Rust concepts
//! - `async fn` and `.await` for non-blocking I/O
//! - axum extractors: `State`, `Json`, `WebSocketUpgrade`
//! - `tokio::select!` to wait on a socket and a channel at once
//! - `tower-http` middleware for CORS and request tracing

use crate::bulb::StateSnapshot;
use crate::runtime::{BulbCommand, CommandRequest};
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::Value;
use std::sync::mpsc::Sender;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// ── App State ────────────────────────────────────────────────────────

/// Shared application state, passed to every handler via axum's `State` extractor.
///
/// Rust concept: CLONE for channels
/// Both fields are channel handles. Cloning one just adds another handle to
/// the same channel, which is what axum does for every request.
#[derive(Clone)]
pub struct AppState {
    /// Channel to send commands to the controller thread
    pub commands: Sender<CommandRequest>,
    /// Latest snapshot published by the controller thread
    pub snapshots: watch::Receiver<StateSnapshot>,
}

// ── OpenAPI Documentation ────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    paths(
        get_status,
        post_toggle_power,
        post_brightness,
        post_reset,
        post_auto_cycle_start,
        post_auto_cycle_stop,
    ),
    components(schemas(
        StateSnapshot,
        crate::bulb::Transition,
        BrightnessRequest,
    )),
    tags(
        (name = "bulb", description = "Bulb control endpoints"),
        (name = "system", description = "System status endpoints"),
    ),
    info(
        title = "Light Bulb Simulator API",
        version = env!("CARGO_PKG_VERSION"),
        description = "HTTP API for a simulated dimmable light bulb"
    )
)]
pub struct ApiDoc;

// ── Request types ────────────────────────────────────────────────────

#[derive(Deserialize, utoipa::ToSchema)]
pub struct BrightnessRequest {
    /// Brightness percentage. Values outside 10-100 are clamped; numeric
    /// strings and decimals are accepted; anything else leaves the bulb as is.
    #[serde(default)]
    #[schema(value_type = i64, example = 75, minimum = 10, maximum = 100)]
    pub value: Value,
}

/// Pull the brightness out of a request body.
///
/// `{"value": 75}` is the documented shape, but a bare `75` or `"75"` is
/// taken as the value itself.
pub fn brightness_input(body: &Value) -> &Value {
    static MISSING: Value = Value::Null;
    match body {
        Value::Object(fields) => fields.get("value").unwrap_or(&MISSING),
        other => other,
    }
}

/// Turn whatever the page sent into an integer brightness, if possible.
pub fn coerce_brightness(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(round_finite)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(round_finite))
        }
        _ => None,
    }
}

fn round_finite(value: f64) -> Option<i64> {
    // `as` saturates at the i64 bounds, which the controller clamps anyway
    value.is_finite().then(|| value.round() as i64)
}

// ── Router ───────────────────────────────────────────────────────────

/// Build the axum router with all API endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(
            SwaggerUi::new("/docs")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
                .config(utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"]).validator_url("none")),
        )
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/power/toggle", post(post_toggle_power))
        .route("/api/v1/brightness", post(post_brightness))
        .route("/api/v1/reset", post(post_reset))
        .route("/api/v1/auto-cycle/start", post(post_auto_cycle_start))
        .route("/api/v1/auto-cycle/stop", post(post_auto_cycle_stop))
        .route("/api/v1/stream", get(ws_stream))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

type ApiResult = Result<Json<StateSnapshot>, (StatusCode, String)>;

/// Send a command to the controller thread and wait for its snapshot.
async fn dispatch(state: &AppState, command: BulbCommand) -> ApiResult {
    let (request, reply) = CommandRequest::new(command);
    state.commands.send(request).map_err(|_| controller_gone())?;
    let snapshot = reply.await.map_err(|_| controller_gone())?;
    Ok(Json(snapshot))
}

fn controller_gone() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Bulb controller gone".to_string(),
    )
}

// ── Handlers ─────────────────────────────────────────────────────────

/// GET /api/v1/status — return the latest snapshot
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "system",
    responses(
        (status = 200, description = "Current bulb state", body = StateSnapshot)
    )
)]
async fn get_status(State(state): State<AppState>) -> Json<StateSnapshot> {
    let snapshot = *state.snapshots.borrow();
    Json(snapshot)
}

/// POST /api/v1/power/toggle — flip the power switch
#[utoipa::path(
    post,
    path = "/api/v1/power/toggle",
    tag = "bulb",
    responses(
        (status = 200, description = "Power toggled", body = StateSnapshot),
        (status = 500, description = "Controller not running")
    )
)]
async fn post_toggle_power(State(state): State<AppState>) -> ApiResult {
    dispatch(&state, BulbCommand::TogglePower).await
}

/// POST /api/v1/brightness — set brightness (clamped to 10-100)
#[utoipa::path(
    post,
    path = "/api/v1/brightness",
    tag = "bulb",
    request_body = BrightnessRequest,
    responses(
        (status = 200, description = "Brightness applied (or ignored if unusable)", body = StateSnapshot),
        (status = 500, description = "Controller not running")
    )
)]
async fn post_brightness(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult {
    let input = brightness_input(&body);
    match coerce_brightness(input) {
        Some(value) => dispatch(&state, BulbCommand::SetBrightness(value)).await,
        None => {
            tracing::debug!("Ignoring non-numeric brightness: {}", input);
            Ok(Json(*state.snapshots.borrow()))
        }
    }
}

/// POST /api/v1/reset — back to defaults, stops auto-cycle
#[utoipa::path(
    post,
    path = "/api/v1/reset",
    tag = "bulb",
    responses(
        (status = 200, description = "Bulb reset", body = StateSnapshot),
        (status = 500, description = "Controller not running")
    )
)]
async fn post_reset(State(state): State<AppState>) -> ApiResult {
    dispatch(&state, BulbCommand::Reset).await
}

/// POST /api/v1/auto-cycle/start — begin sweeping brightness
#[utoipa::path(
    post,
    path = "/api/v1/auto-cycle/start",
    tag = "bulb",
    responses(
        (status = 200, description = "Auto-cycle running", body = StateSnapshot),
        (status = 500, description = "Controller not running")
    )
)]
async fn post_auto_cycle_start(State(state): State<AppState>) -> ApiResult {
    dispatch(&state, BulbCommand::StartAutoCycle).await
}

/// POST /api/v1/auto-cycle/stop — stop sweeping (no-op if not running)
#[utoipa::path(
    post,
    path = "/api/v1/auto-cycle/stop",
    tag = "bulb",
    responses(
        (status = 200, description = "Auto-cycle stopped", body = StateSnapshot),
        (status = 500, description = "Controller not running")
    )
)]
async fn post_auto_cycle_stop(State(state): State<AppState>) -> ApiResult {
    dispatch(&state, BulbCommand::StopAutoCycle).await
}

// ── WebSocket streaming ─────────────────────────────────────────────

/// GET /api/v1/stream — WebSocket endpoint streaming snapshots as JSON.
///
/// Sends the current snapshot on connect, then one text message per state
/// change. Incoming messages are ignored. The stream ends when the client
/// disconnects or the controller shuts down.
async fn ws_stream(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_stream_socket(socket, state))
}

async fn handle_stream_socket(mut socket: WebSocket, state: AppState) {
    tracing::info!("WebSocket stream client connected");

    let mut snapshots = state.snapshots.clone();
    let mut sent: u64 = 0;

    let current = *snapshots.borrow_and_update();
    if send_snapshot(&mut socket, &current).await {
        sent += 1;

        loop {
            tokio::select! {
                incoming = socket.recv() => match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket receive error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {} // Ignore text/binary, ping/pong handled by axum
                },
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        tracing::info!("Controller stopped, closing WebSocket");
                        break;
                    }
                    let snapshot = *snapshots.borrow_and_update();
                    if !send_snapshot(&mut socket, &snapshot).await {
                        break;
                    }
                    sent += 1;
                }
            }
        }
    }

    tracing::info!(
        "WebSocket stream client disconnected ({} snapshots sent)",
        sent
    );
}

/// Returns false once the socket can no longer be written to.
async fn send_snapshot(socket: &mut WebSocket, snapshot: &StateSnapshot) -> bool {
    let json = match serde_json::to_string(snapshot) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!("Failed to encode snapshot: {}", e);
            return true;
        }
    };
    socket.send(Message::Text(json.into())).await.is_ok()
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BulbConfig;
    use crate::bulb::BulbController;
    use crate::persistence::MemoryStore;
    use crate::runtime::{ControllerHandle, spawn_controller};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn start() -> (ControllerHandle, AppState) {
        let handle = spawn_controller(
            BulbController::default(),
            Box::new(MemoryStore::new()),
            BulbConfig::default(),
        )
        .unwrap();
        let state = AppState {
            commands: handle.commands.clone(),
            snapshots: handle.snapshots.clone(),
        };
        (handle, state)
    }

    async fn post_body(state: &AppState, body: Value) -> StateSnapshot {
        let Json(snapshot) = post_brightness(State(state.clone()), Json(body))
            .await
            .unwrap();
        snapshot
    }

    async fn set_brightness(state: &AppState, value: Value) -> StateSnapshot {
        post_body(state, json!({ "value": value })).await
    }

    #[rstest]
    #[case(json!(75), Some(75))]
    #[case(json!(-20), Some(-20))]
    #[case(json!(42.6), Some(43))]
    #[case(json!("35"), Some(35))]
    #[case(json!(" 12.4 "), Some(12))]
    #[case(json!(1e300), Some(i64::MAX))]
    #[case(json!("bright"), None)]
    #[case(json!(true), None)]
    #[case(json!(null), None)]
    #[case(json!([50]), None)]
    fn test_coerce_brightness(#[case] input: Value, #[case] expected: Option<i64>) {
        assert_eq!(coerce_brightness(&input), expected);
    }

    #[test]
    fn openapi_lists_every_command() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for path in [
            "/api/v1/status",
            "/api/v1/power/toggle",
            "/api/v1/brightness",
            "/api/v1/reset",
            "/api/v1/auto-cycle/start",
            "/api/v1/auto-cycle/stop",
        ] {
            assert!(paths.contains(&path), "missing {path}");
        }
    }

    #[test]
    fn snapshot_json_uses_camel_case() {
        let value = serde_json::to_value(BulbController::default().snapshot()).unwrap();
        assert_eq!(
            value,
            json!({
                "isOn": false,
                "brightness": 50,
                "runtimeSeconds": 0,
                "totalEnergyWattHours": 0.0,
                "powerDrawWatts": 0.0,
                "temperatureF": 72,
                "autoCycleActive": false,
                "revision": 0,
            })
        );
    }

    #[tokio::test]
    async fn toggle_returns_new_snapshot_and_updates_status() {
        let (handle, state) = start();

        let Json(toggled) = post_toggle_power(State(state.clone())).await.unwrap();
        assert!(toggled.is_on);
        assert_eq!(toggled.power_draw_watts, 7.0);

        let Json(status) = get_status(State(state.clone())).await;
        assert!(status.is_on);
        assert_eq!(status.brightness, toggled.brightness);

        drop(state);
        handle.shutdown();
    }

    #[tokio::test]
    async fn brightness_input_is_coerced_and_clamped() {
        let (handle, state) = start();

        assert_eq!(set_brightness(&state, json!(250)).await.brightness, 100);
        assert_eq!(set_brightness(&state, json!("20")).await.brightness, 20);

        let before = *state.snapshots.borrow();
        let ignored = set_brightness(&state, json!("very bright")).await;
        assert_eq!(ignored, before);

        drop(state);
        handle.shutdown();
    }

    #[rstest]
    #[case(json!({ "value": 60 }), json!(60))]
    #[case(json!({ "level": 60 }), json!(null))]
    #[case(json!(60), json!(60))]
    #[case(json!("bright"), json!("bright"))]
    fn test_brightness_input(#[case] body: Value, #[case] expected: Value) {
        assert_eq!(brightness_input(&body), &expected);
    }

    #[tokio::test]
    async fn bare_brightness_bodies_are_accepted() {
        let (handle, state) = start();

        assert_eq!(post_body(&state, json!(75)).await.brightness, 75);
        assert_eq!(post_body(&state, json!("40")).await.brightness, 40);

        let before = *state.snapshots.borrow();
        assert_eq!(post_body(&state, json!("bright")).await, before);
        assert_eq!(post_body(&state, json!([1, 2])).await, before);

        drop(state);
        handle.shutdown();
    }

    #[tokio::test]
    async fn reset_and_auto_cycle_endpoints() {
        let (handle, state) = start();

        let Json(started) = post_auto_cycle_start(State(state.clone())).await.unwrap();
        assert!(started.auto_cycle_active);

        let Json(reset) = post_reset(State(state.clone())).await.unwrap();
        assert!(!reset.auto_cycle_active);
        assert!(!reset.is_on);
        assert_eq!(reset.brightness, 50);

        // nothing running any more, so this changes nothing
        let Json(stopped) = post_auto_cycle_stop(State(state.clone())).await.unwrap();
        assert_eq!(stopped.revision, reset.revision);

        drop(state);
        handle.shutdown();
    }

    #[tokio::test]
    async fn commands_fail_once_controller_is_gone() {
        let (handle, state) = start();
        handle.shutdown();

        let err = post_toggle_power(State(state)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
