//! Control API
//!
//! Endpoints:
//! - GET  /accounts        - provisioned accounts with phone and state
//! - POST /export-members  - list a group's members through one account
//! - POST /start           - start a campaign
//! - POST /stop            - stop the running campaign (idempotent)
//! - POST /restart         - stop and reset stats, logs and cooldowns
//! - GET  /stats           - counters of the current campaign
//! - GET  /member-logs     - resolved targets, oldest first (alias: /logs)
//! - GET  /flood-waits     - live cooldowns
//! - POST /retry           - one-shot invite outside the campaign
//! - GET  /health          - pool and campaign summary
//! - GET  /metrics         - Prometheus text format
//!
//! Malformed bodies are answered with 400 and
//! `{"error": {"type": "validation_error", "message": ...}}`. Requests the
//! scheduler turns down (already running, unknown account, no eligible
//! account) are answered 200 in the endpoint's usual body shape.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{MatchedPath, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use invite_pool::{Controller, StartRequest};
use metrics_exporter_prometheus::PrometheusHandle;
use provider::{ExportFilters, TargetId};
use serde::Deserialize;
use serde_json::json;
use tracing::{Instrument, info_span};

use crate::error::{ApiError, rejection};

/// Shared state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
    pub prometheus: PrometheusHandle,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(controller: Arc<Controller>, prometheus: PrometheusHandle) -> Self {
        Self {
            controller,
            prometheus,
            started_at: Instant::now(),
        }
    }
}

/// Build the router with all routes and shared state.
///
/// `max_connections` caps concurrently handled requests.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/accounts", get(list_accounts))
        .route("/export-members", post(export_members))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/restart", post(restart))
        .route("/stats", get(stats))
        .route("/member-logs", get(logs))
        .route("/logs", get(logs))
        .route("/flood-waits", get(flood_waits))
        .route("/retry", post(retry))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(axum::middleware::from_fn(track_requests))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Per-request span with a request id, plus request metrics.
async fn track_requests(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let span = info_span!("request", %request_id, %method, %path);

    let response = next.run(request).instrument(span).await;
    crate::metrics::record_request(
        response.status().as_u16(),
        &method,
        &path,
        started.elapsed().as_secs_f64(),
    );
    response
}

fn validation(rejection: JsonRejection) -> ApiError {
    ApiError::Validation(rejection.body_text())
}

fn message(status: StatusCode, text: impl Into<String>) -> Response {
    (status, Json(json!({ "message": text.into() }))).into_response()
}

fn non_empty(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::Validation(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}

/// Strip `@` and surrounding whitespace from usernames; drop blanks.
fn normalize_targets(targets: Vec<TargetId>) -> Vec<TargetId> {
    targets
        .into_iter()
        .filter_map(|t| match t {
            TargetId::Username(name) => {
                let t = TargetId::username(&name);
                (t != TargetId::Username(String::new())).then_some(t)
            }
            id => Some(id),
        })
        .collect()
}

/// GET /accounts
async fn list_accounts(State(state): State<AppState>) -> impl IntoResponse {
    let accounts: Vec<serde_json::Value> = state
        .controller
        .accounts()
        .await
        .iter()
        .map(|a| {
            json!({
                "name": a.label,
                "phone": a.phone,
                "status": a.state.label(),
            })
        })
        .collect();
    Json(accounts)
}

#[derive(Deserialize)]
struct ExportBody {
    account: String,
    group: String,
    #[serde(flatten)]
    filters: ExportFilters,
}

/// POST /export-members
async fn export_members(
    State(state): State<AppState>,
    payload: Result<Json<ExportBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload.map_err(validation)?;
    let account = non_empty("account", &body.account)?;
    let group = non_empty("group", &body.group)?;

    match state
        .controller
        .export_members(&account, &group, &body.filters)
        .await
    {
        Ok(ids) => Ok(Json(json!({ "success": true, "ids": ids })).into_response()),
        Err(e) => {
            let error = rejection(e)?;
            Ok(Json(json!({ "success": false, "error": error })).into_response())
        }
    }
}

#[derive(Deserialize)]
struct StartBody {
    group: String,
    #[serde(default, alias = "targets")]
    usernames: Vec<TargetId>,
    #[serde(default)]
    accounts: Vec<String>,
}

/// POST /start
async fn start(
    State(state): State<AppState>,
    payload: Result<Json<StartBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload.map_err(validation)?;
    let group = non_empty("group", &body.group)?;
    let request = StartRequest {
        group,
        targets: normalize_targets(body.usernames),
        accounts: body.accounts,
    };

    match state.controller.start(request).await {
        Ok(summary) => Ok(message(StatusCode::OK, summary.message())),
        Err(e) => Ok(message(StatusCode::OK, rejection(e)?)),
    }
}

/// POST /stop
async fn stop(State(state): State<AppState>) -> Response {
    state.controller.stop().await;
    message(StatusCode::OK, "Stopped")
}

/// POST /restart
async fn restart(State(state): State<AppState>) -> Response {
    state.controller.restart().await;
    message(StatusCode::OK, "Restarted")
}

/// GET /stats
async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.stats().await)
}

/// GET /member-logs, GET /logs
async fn logs(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.logs().await)
}

/// GET /flood-waits
async fn flood_waits(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.flood_waits().await)
}

#[derive(Deserialize)]
struct RetryBody {
    username: TargetId,
    group: String,
}

/// POST /retry
async fn retry(
    State(state): State<AppState>,
    payload: Result<Json<RetryBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload.map_err(validation)?;
    let group = non_empty("group", &body.group)?;
    let Some(target) = normalize_targets(vec![body.username]).pop() else {
        return Err(ApiError::Validation("username must not be empty".into()));
    };

    match state.controller.retry(&target, &group).await {
        Ok(account) => Ok(message(
            StatusCode::OK,
            format!("Invited {target} using {account}"),
        )),
        Err(e) => Ok(Json(json!({ "error": rejection(e)? })).into_response()),
    }
}

/// GET /health - 200 while at least one account is usable, 503 otherwise.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = state.controller.health().await;
    let campaign = state.controller.status().await;
    body["campaign"] = serde_json::to_value(&campaign).unwrap_or_default();
    body["uptime_seconds"] = json!(state.started_at.elapsed().as_secs());

    let status_code = if body["status"] == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status_code, Json(body))
}

/// GET /metrics - Prometheus text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use invite_pool::{Account, ControllerConfig};
    use provider::{
        AccountConnector, ConnectError, InvitationProvider, InviteOutcome, Participant,
    };
    use serde_json::Value;
    use std::future::Future;
    use std::pin::Pin;
    use tower::ServiceExt;

    /// Bridge stand-in: invites succeed except for a few magic usernames.
    struct StubBridge;

    impl AccountConnector for StubBridge {
        fn connect<'a>(
            &'a self,
            _account: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<(), ConnectError>> + Send + 'a>> {
            Box::pin(async { Ok(()) })
        }
    }

    impl InvitationProvider for StubBridge {
        fn id(&self) -> &str {
            "stub"
        }

        fn list_participants<'a>(
            &'a self,
            _account: &'a str,
            _group: &'a str,
        ) -> Pin<Box<dyn Future<Output = provider::Result<Vec<Participant>>> + Send + 'a>>
        {
            Box::pin(async {
                Ok(vec![
                    Participant {
                        id: 1,
                        username: Some("alice".into()),
                        last_online: None,
                        has_photo: true,
                    },
                    Participant {
                        id: 2,
                        username: None,
                        last_online: None,
                        has_photo: false,
                    },
                ])
            })
        }

        fn ensure_joined<'a>(
            &'a self,
            _account: &'a str,
            _group: &'a str,
        ) -> Pin<Box<dyn Future<Output = InviteOutcome> + Send + 'a>> {
            Box::pin(async { InviteOutcome::Success })
        }

        fn invite<'a>(
            &'a self,
            _account: &'a str,
            _group: &'a str,
            target: &'a TargetId,
        ) -> Pin<Box<dyn Future<Output = InviteOutcome> + Send + 'a>> {
            Box::pin(async move {
                match target.to_string().as_str() {
                    "flood" => InviteOutcome::RateLimited { wait_secs: 60 },
                    "private" => InviteOutcome::PermanentRejection {
                        reason: "USER_PRIVACY_RESTRICTED".into(),
                    },
                    _ => InviteOutcome::Success,
                }
            })
        }
    }

    fn test_state() -> AppState {
        let bridge = Arc::new(StubBridge);
        let controller = Controller::new(
            vec![
                Account::new(1, "account1", "+15550001"),
                Account::new(2, "account2", "+15550002"),
            ],
            bridge.clone(),
            bridge,
            ControllerConfig::default(),
        );
        let (_, prometheus) = crate::metrics::isolated_recorder();
        AppState::new(Arc::new(controller), prometheus)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if body.is_some() {
            request = request.header("content-type", "application/json");
        }
        let request = request
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn accounts_lists_name_and_phone() {
        let app = build_router(test_state(), 16);
        let (status, json) = send(&app, "GET", "/accounts", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["name"], "account1");
        assert_eq!(json[0]["phone"], "+15550001");
        assert_eq!(json[1]["status"], "active");
    }

    #[tokio::test]
    async fn start_then_start_again_is_rejected() {
        let state = test_state();
        let app = build_router(state.clone(), 16);
        let body = r#"{"group":"dest","usernames":["@bob"," carol ",""],"accounts":["account1","account2"]}"#;

        let (status, json) = send(&app, "POST", "/start", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Started with 2 accounts, delay 30s");
        assert_eq!(state.controller.status().await.total, 2);

        let (status, json) = send(&app, "POST", "/start", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Already running");
    }

    #[tokio::test]
    async fn start_accepts_targets_alias() {
        let state = test_state();
        let app = build_router(state.clone(), 16);
        let body = r#"{"group":"dest","targets":["a",42],"accounts":["account1"]}"#;
        let (status, _) = send(&app, "POST", "/start", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.controller.status().await.total, 2);
    }

    #[tokio::test]
    async fn start_rejections_carry_messages() {
        let app = build_router(test_state(), 16);

        let (status, json) = send(
            &app,
            "POST",
            "/start",
            Some(r#"{"group":"dest","usernames":["a"],"accounts":[]}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "No accounts selected");

        let (status, json) = send(
            &app,
            "POST",
            "/start",
            Some(r#"{"group":"dest","usernames":["a"],"accounts":["ghost"]}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["message"].as_str().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn malformed_requests_are_validation_errors() {
        let app = build_router(test_state(), 16);
        let cases = [
            ("/start", "not json"),
            ("/start", r#"{"usernames":["a"],"accounts":["account1"]}"#),
            ("/start", r#"{"group":"  ","accounts":["account1"]}"#),
            ("/retry", r#"{"group":"dest"}"#),
            ("/retry", r#"{"username":"bob","group":""}"#),
            ("/export-members", r#"{"account":"account1"}"#),
        ];
        for (uri, body) in cases {
            let (status, json) = send(&app, "POST", uri, Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri} {body}");
            assert_eq!(json["error"]["type"], "validation_error", "{uri} {body}");
        }
    }

    #[tokio::test]
    async fn stop_and_restart_are_idempotent() {
        let app = build_router(test_state(), 16);
        for _ in 0..2 {
            let (status, json) = send(&app, "POST", "/stop", None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["message"], "Stopped");
        }
        for _ in 0..2 {
            let (_, json) = send(&app, "POST", "/restart", None).await;
            assert_eq!(json["message"], "Restarted");
        }
    }

    #[tokio::test]
    async fn stats_and_logs_follow_campaign_progress() {
        let state = test_state();
        let app = build_router(state.clone(), 16);

        let (_, json) = send(&app, "GET", "/stats", None).await;
        assert_eq!(json, json!({"success": 0, "fail": 0, "skipped": 0}));

        state
            .controller
            .install(StartRequest {
                group: "dest".into(),
                targets: vec![TargetId::username("bob"), TargetId::username("private")],
                accounts: vec!["account1".into(), "account2".into()],
            })
            .await
            .unwrap();
        state.controller.tick().await;
        state.controller.tick().await;

        let (_, json) = send(&app, "GET", "/stats", None).await;
        assert_eq!(json, json!({"success": 1, "fail": 0, "skipped": 1}));

        let (_, member_logs) = send(&app, "GET", "/member-logs", None).await;
        let (_, logs) = send(&app, "GET", "/logs", None).await;
        assert_eq!(member_logs[0]["username"], "bob");
        assert_eq!(member_logs[0]["status"], "success");
        assert_eq!(member_logs[1]["status"], "skipped");
        assert_eq!(member_logs[1]["error"], "USER_PRIVACY_RESTRICTED");
        assert_eq!(member_logs, logs);
    }

    #[tokio::test]
    async fn retry_reports_success_and_rate_limits() {
        let app = build_router(test_state(), 16);

        let (status, json) = send(
            &app,
            "POST",
            "/retry",
            Some(r#"{"username":"@bob","group":"dest"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Invited bob using account1");

        let (status, json) = send(
            &app,
            "POST",
            "/retry",
            Some(r#"{"username":"flood","group":"dest"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["error"].as_str().unwrap().contains("account2"));

        let (_, waits) = send(&app, "GET", "/flood-waits", None).await;
        assert_eq!(waits[0]["username"], "flood");
        assert_eq!(waits[0]["account"], "account2");
        assert_eq!(waits[0]["remainingSec"], 60);
        assert!(waits[0]["endTime"].is_string());

        let (status, health) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "degraded");
    }

    #[tokio::test]
    async fn export_members_applies_filters() {
        let app = build_router(test_state(), 16);

        let (status, json) = send(
            &app,
            "POST",
            "/export-members",
            Some(r#"{"account":"account1","group":"source"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({"success": true, "ids": ["alice", 2]}));

        let (_, json) = send(
            &app,
            "POST",
            "/export-members",
            Some(r#"{"account":"account1","group":"source","filterMembers":"username"}"#),
        )
        .await;
        assert_eq!(json["ids"], json!(["alice"]));

        let (status, json) = send(
            &app,
            "POST",
            "/export-members",
            Some(r#"{"account":"ghost","group":"source"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn retry_without_active_account_answers_with_error_body() {
        let app = build_router(test_state(), 16);
        for name in ["flood", "flood"] {
            let body = format!(r#"{{"username":"{name}","group":"dest"}}"#);
            send(&app, "POST", "/retry", Some(&body)).await;
        }

        let (status, json) = send(
            &app,
            "POST",
            "/retry",
            Some(r#"{"username":"bob","group":"dest"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(
            json["error"]
                .as_str()
                .unwrap()
                .starts_with("no eligible account")
        );
    }

    #[tokio::test]
    async fn health_reports_pool_and_campaign() {
        let app = build_router(test_state(), 16);
        let (status, json) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["accounts_total"], 2);
        assert_eq!(json["campaign"]["state"], "idle");
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_text() {
        let app = build_router(test_state(), 16);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()["content-type"]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = build_router(test_state(), 16);
        let (status, _) = send(&app, "GET", "/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
