//! REST API Server for the Financial Agent
//!
//! Exposes the query pipeline via HTTP endpoints

use axum::{extract::State, http::StatusCode, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::{question_fingerprint, FinancialAgent};
use crate::error::OrchestrationError;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueryRequest {
    pub question: String,
    /// Include routing details and per-tool results in the response.
    #[serde(default)]
    pub include_report: bool,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<FinancialAgent>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Status Endpoints
/// =============================

async fn status(State(state): State<ApiState>) -> Json<ApiResponse> {
    Json(ApiResponse::success(state.agent.status()))
}

async fn list_tools(State(state): State<ApiState>) -> Json<ApiResponse> {
    Json(ApiResponse::success(state.agent.list_tools()))
}

/// =============================
/// Query Endpoint
/// =============================

async fn run_query(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!(fingerprint = %question_fingerprint(&req.question), "Received query request");

    match state.agent.query_with_report(&req.question).await {
        Ok(report) => {
            let mut data = serde_json::json!({
                "query_id": report.query_id,
                "answer": report.answer,
                "selected_tools": report.decision.selected,
                "routing_strategy": report.decision.strategy,
                "elapsed_ms": report.elapsed_ms,
            });
            if req.include_report {
                data["results"] = serde_json::json!(report.results);
                data["reasoning_trace"] = serde_json::json!(report.reasoning_trace);
                data["phases"] = serde_json::json!(report.phases);
            }
            (StatusCode::OK, Json(ApiResponse::success(data)))
        }
        Err(e @ OrchestrationError::EmptyRegistry) => {
            warn!(error = %e, "Query rejected");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::error(e.to_string())),
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("Query failed: {}", e))),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(agent: Arc<FinancialAgent>) -> Router {
    let state = ApiState { agent };

    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/tools", get(list_tools))
        .route("/api/query", post(run_query))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    agent: Arc<FinancialAgent>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(agent);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::models::ToolOutput;
    use crate::tools::{FnTool, ToolRegistry};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn agent(with_tool: bool) -> Arc<FinancialAgent> {
        let mut registry = ToolRegistry::new();
        if with_tool {
            registry
                .register(Arc::new(FnTool::new(
                    "quotes",
                    "Equity share price lookup",
                    |_| Ok(ToolOutput::text("ACME trades at 12.50")),
                )))
                .unwrap();
        }
        Arc::new(FinancialAgent::new(
            AgentConfig::default(),
            Arc::new(registry),
            None,
        ))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn query_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/query")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = create_router(agent(true))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_query_endpoint() {
        let response = create_router(agent(true))
            .oneshot(query_request(serde_json::json!({
                "question": "share price",
                "include_report": true
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["answer"], "ACME trades at 12.50");
        assert_eq!(body["data"]["selected_tools"][0], "quotes");
        assert_eq!(body["data"]["routing_strategy"], "keyword");
        assert_eq!(body["data"]["phases"][5], "done");
    }

    #[tokio::test]
    async fn test_empty_registry_is_service_unavailable() {
        let response = create_router(agent(false))
            .oneshot(query_request(serde_json::json!({ "question": "share price" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn test_status_and_tools() {
        let router = create_router(agent(true));

        let status = router
            .clone()
            .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(status).await;
        assert_eq!(body["data"]["total_tools"], 1);
        assert_eq!(body["data"]["ready"], true);

        let tools = router
            .oneshot(Request::builder().uri("/api/tools").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(tools).await;
        assert_eq!(body["data"][0]["name"], "quotes");
    }
}
