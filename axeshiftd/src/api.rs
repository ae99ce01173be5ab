//! HTTP API for the fleet daemon.
//!
//! Provides REST endpoints for:
//! - Health check
//! - Status (period, orchestrator state, per-device view, totals, recent events)
//! - Prometheus metrics
//! - Device restart

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use axeshift_domain::Period;
use axeshift_exec::DevicePort;
use axeshift_store::SnapshotStore;

use crate::error::DaemonError;
use crate::event_bus::EventRecord;
use crate::fleet::DeviceView;
use crate::orchestrator::{Orchestrator, OrchestratorState};
use crate::status::FleetTotals;

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState<P: DevicePort + 'static, S: SnapshotStore + 'static> {
    pub orchestrator: Arc<Orchestrator<P, S>>,
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub period: Option<Period>,
    pub state: OrchestratorState,
    pub totals: FleetTotals,
    pub devices: Vec<DeviceView>,
    /// Newest first
    pub recent_events: Vec<EventRecord>,
}

/// Events included in a status response.
const STATUS_EVENTS: usize = 20;

/// Response after a restart was accepted.
#[derive(Debug, Serialize, Deserialize)]
pub struct RestartResponse {
    pub device: String,
    pub restarted: bool,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router<P, S>(state: Arc<ApiState<P, S>>) -> Router
where
    P: DevicePort + 'static,
    S: SnapshotStore + 'static,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .route("/devices/:name/restart", post(restart_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Fleet status as of the last completed round.
async fn status_handler<P, S>(State(state): State<Arc<ApiState<P, S>>>) -> Json<StatusResponse>
where
    P: DevicePort + 'static,
    S: SnapshotStore + 'static,
{
    let orchestrator = &state.orchestrator;
    let devices = orchestrator.fleet().view();

    Json(StatusResponse {
        period: orchestrator.current_period(),
        state: orchestrator.state(),
        totals: FleetTotals::from_view(&devices),
        devices,
        recent_events: orchestrator.events().recent(STATUS_EVENTS),
    })
}

/// Prometheus text exposition.
async fn metrics_handler<P, S>(
    State(state): State<Arc<ApiState<P, S>>>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)>
where
    P: DevicePort + 'static,
    S: SnapshotStore + 'static,
{
    let body = state
        .orchestrator
        .metrics()
        .render()
        .map_err(to_error_response)?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

/// Restart one device.
async fn restart_handler<P, S>(
    State(state): State<Arc<ApiState<P, S>>>,
    Path(name): Path<String>,
) -> Result<Json<RestartResponse>, (StatusCode, Json<ErrorResponse>)>
where
    P: DevicePort + 'static,
    S: SnapshotStore + 'static,
{
    state
        .orchestrator
        .restart_device(&name)
        .await
        .map_err(to_error_response)?;

    Ok(Json(RestartResponse {
        device: name,
        restarted: true,
    }))
}

// =============================================================================
// Helpers
// =============================================================================

fn to_error_response(error: DaemonError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &error {
        DaemonError::DeviceNotFound(_) => StatusCode::NOT_FOUND,
        DaemonError::DeviceBusy(_) => StatusCode::CONFLICT,
        DaemonError::Exec(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use axeshift_domain::{Device, DeviceId, Settings};
    use axeshift_engine::FixedClock;
    use axeshift_exec::StubDevicePort;
    use axeshift_store::MemorySnapshotStore;

    use crate::config::ControlConfig;
    use crate::fleet::Fleet;

    struct TestApp {
        port: Arc<StubDevicePort>,
        orchestrator: Arc<Orchestrator<StubDevicePort, MemorySnapshotStore>>,
    }

    impl TestApp {
        fn router(&self) -> Router {
            create_router(Arc::new(ApiState {
                orchestrator: self.orchestrator.clone(),
            }))
        }
    }

    fn create_test_app() -> TestApp {
        let port = Arc::new(StubDevicePort::new());
        let mut devices = Vec::new();
        for name in ["bitaxe1", "bitaxe2"] {
            let address = format!("http://{}.local", name);
            port.add_device(&address, Settings::from_raw(1150, 450).unwrap());
            devices.push(Device::new(DeviceId::new(name).unwrap(), address, true));
        }

        let orchestrator = Orchestrator::new(
            ControlConfig::test(),
            Arc::new(Fleet::new(devices)),
            port.clone(),
            Arc::new(MemorySnapshotStore::new()),
            Arc::new(FixedClock::at(12, 0)),
        )
        .unwrap();

        TestApp {
            port,
            orchestrator: Arc::new(orchestrator),
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_test_app();

        let response = app
            .router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "healthy");
    }

    #[tokio::test]
    async fn test_status_endpoint_after_discovery() {
        let app = create_test_app();
        app.port.set_offline("http://bitaxe2.local", true);
        app.orchestrator.discover().await;

        let response = app
            .router()
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let status = body_json(response).await;
        assert_eq!(status["state"], "discovering");
        assert!(status["period"].is_null());
        assert_eq!(status["totals"]["online"], 1);
        assert_eq!(status["totals"]["total"], 2);
        assert_eq!(status["devices"][0]["name"], "bitaxe1");
        assert_eq!(status["devices"][1]["online"], false);
    }

    #[tokio::test]
    async fn test_status_lists_recent_events() {
        let app = create_test_app();
        app.orchestrator.discover().await;
        app.orchestrator.switch_period(None, Period::Night).await;
        app.orchestrator.restart_device("bitaxe2").await.unwrap();

        let response = app
            .router()
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = body_json(response).await;
        let events = status["recent_events"].as_array().unwrap();
        assert_eq!(events[0]["kind"], "device_restarted");
        assert_eq!(events[0]["device"], "bitaxe2");
        assert!(events
            .iter()
            .any(|e| e["kind"] == "period_switched" && e["detail"] == "none -> night"));
        assert!(events.iter().any(|e| e["kind"] == "settings_applied"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = create_test_app();
        app.orchestrator.discover().await;

        let response = app
            .router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("axeshift_device_online{device=\"bitaxe1\"} 1"));
    }

    #[tokio::test]
    async fn test_restart_endpoint() {
        let app = create_test_app();

        let response = app
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/devices/bitaxe1/restart")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(app.port.restart_count("http://bitaxe1.local"), 1);
        let restart: RestartResponse =
            serde_json::from_value(body_json(response).await).unwrap();
        assert!(restart.restarted);
    }

    #[tokio::test]
    async fn test_restart_unknown_device_is_404() {
        let app = create_test_app();

        let response = app
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/devices/missing/restart")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_restart_busy_device_is_409() {
        let app = create_test_app();
        let slot = app.orchestrator.fleet().get("bitaxe1").unwrap();
        let _held = slot.lock().await;

        let response = app
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/devices/bitaxe1/restart")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_restart_unreachable_device_is_502() {
        let app = create_test_app();
        app.port.set_offline("http://bitaxe2.local", true);

        let response = app
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/devices/bitaxe2/restart")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
