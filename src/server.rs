use crate::device::{DeviceClient, ServoAxis};
use crate::error::ApiError;
use crate::monitor::NoiseMonitor;
use axum::body::Body;
use axum::extract::{Form, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::warn;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

const INDEX_HTML: &str = include_str!("../static/index.html");
const INCIDENTS_HTML: &str = include_str!("../static/incidents.html");
const LOGIN_HTML: &str = include_str!("../static/login.html");

const SESSION_COOKIE: &str = "sid";

/// How many log entries the incidents API returns.
const INCIDENT_LIMIT: u32 = 100;

/// Shared state available to all handlers.
///
/// Cheap to clone: everything is behind an `Arc` or already shares its
/// internals.
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<NoiseMonitor>,
    pub device: DeviceClient,
    pub sessions: Arc<Sessions>,
    pub credentials: Arc<Credentials>,
}

pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// In-memory session tokens. Lost on restart, which just means users
/// log in again.
#[derive(Default)]
pub struct Sessions(Mutex<HashSet<String>>);

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    fn create(&self) -> String {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        self.0.lock().unwrap().insert(token.clone());
        token
    }

    fn remove(&self, token: &str) {
        self.0.lock().unwrap().remove(token);
    }

    fn contains(&self, token: &str) -> bool {
        self.0.lock().unwrap().contains(token)
    }
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

fn logged_in(state: &AppState, headers: &HeaderMap) -> bool {
    session_token(headers)
        .map(|token| state.sessions.contains(&token))
        .unwrap_or(false)
}

/// Auth gate for the JSON APIs: 403 instead of a page redirect.
fn require_login(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    if logged_in(state, headers) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/incidents", get(incidents_page))
        .route("/login", get(login_page).post(login_submit))
        .route("/logout", get(logout))
        .route("/video_feed_snapshot", get(video_feed_snapshot))
        .route("/video_feed", get(video_feed))
        .route("/api/camera_status", get(camera_status))
        .route("/api/noise", get(current_noise))
        .route("/api/incidents", get(incidents))
        .route("/api/threshold", get(threshold_get).post(threshold_set))
        .route("/servo_x", post(servo_x))
        .route("/servo_y", post(servo_y))
        .route("/buzzer", post(buzzer_control))
        .with_state(state)
}

// ----------------- Pages & session -----------------

async fn index_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !logged_in(&state, &headers) {
        return Redirect::to("/login").into_response();
    }
    Html(INDEX_HTML).into_response()
}

async fn incidents_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !logged_in(&state, &headers) {
        return Redirect::to("/login").into_response();
    }
    Html(INCIDENTS_HTML).into_response()
}

async fn login_page() -> Html<&'static str> {
    Html(LOGIN_HTML)
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login_submit(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Response {
    if form.username == state.credentials.username && form.password == state.credentials.password {
        let token = state.sessions.create();
        let cookie = format!("{}={}; HttpOnly; Path=/", SESSION_COOKIE, token);
        ([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response()
    } else {
        Redirect::to("/login?error=1").into_response()
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        state.sessions.remove(&token);
    }
    let cookie = format!("{}=; Max-Age=0; HttpOnly; Path=/", SESSION_COOKIE);
    ([(header::SET_COOKIE, cookie)], Redirect::to("/login")).into_response()
}

// ----------------- Camera proxying -----------------

async fn video_feed_snapshot(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !logged_in(&state, &headers) {
        return Redirect::to("/login").into_response();
    }

    match state.device.snapshot().await {
        Ok(frame) => ([(header::CONTENT_TYPE, "image/jpeg")], frame).into_response(),
        Err(e) => {
            warn!("Snapshot failed: {}", e);
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

async fn video_feed(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !logged_in(&state, &headers) {
        return Redirect::to("/login").into_response();
    }

    match state.device.stream().await {
        Ok(upstream) => {
            let content_type = upstream
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("multipart/x-mixed-replace; boundary=frame")
                .to_string();

            (
                [(header::CONTENT_TYPE, content_type)],
                Body::from_stream(upstream.bytes_stream()),
            )
                .into_response()
        }
        Err(e) => {
            warn!("Stream proxy failed: {}", e);
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

async fn camera_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_login(&state, &headers)?;
    Ok(Json(json!({"connected": state.device.is_connected().await})))
}

// ----------------- Monitor APIs -----------------

async fn current_noise(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_login(&state, &headers)?;
    Ok(Json(json!({"noise": state.monitor.current()})))
}

async fn incidents(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_login(&state, &headers)?;
    let logs = state.monitor.logs(INCIDENT_LIMIT)?;
    Ok(Json(logs).into_response())
}

async fn threshold_get(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_login(&state, &headers)?;
    Ok(Json(json!({"threshold": state.monitor.threshold()})))
}

async fn threshold_set(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    require_login(&state, &headers)?;

    let value = body
        .get("threshold")
        .and_then(numeric)
        .ok_or_else(|| ApiError::BadRequest("Missing threshold".to_string()))?;

    state
        .monitor
        .set_threshold(value)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    Ok(Json(json!({"ok": true, "threshold": value})))
}

/// Accept a number or a numeric string, like the dashboard has always sent.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ----------------- Device controls -----------------

async fn servo_x(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    set_servo(state, headers, body, ServoAxis::X).await
}

async fn servo_y(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    set_servo(state, headers, body, ServoAxis::Y).await
}

async fn set_servo(
    state: AppState,
    headers: HeaderMap,
    body: Value,
    axis: ServoAxis,
) -> Result<Json<Value>, ApiError> {
    require_login(&state, &headers)?;

    let angle = body
        .get("angle")
        .and_then(Value::as_i64)
        .unwrap_or(90)
        .clamp(0, 180) as u8;

    state.device.set_servo(axis, angle).await?;
    Ok(Json(json!({"ok": true, "angle": angle})))
}

async fn buzzer_control(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    require_login(&state, &headers)?;

    let on = body.get("on").and_then(Value::as_i64).unwrap_or(0) != 0;
    state.device.set_buzzer(on).await?;
    Ok(Json(json!({"ok": true, "action": on as u8})))
}
