use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use idlemine_common::{MineError, StartedJobs};

use crate::state::AppState;

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

/// Orchestration failure rendered as the JSON error envelope.
pub struct ApiError(pub MineError);

impl From<MineError> for ApiError {
    fn from(e: MineError) -> Self {
        Self(e)
    }
}

pub fn status_for(e: &MineError) -> StatusCode {
    match e {
        MineError::Input(_) | MineError::InvalidUsage(_) => StatusCode::BAD_REQUEST,
        MineError::Conflict { .. } | MineError::NoOp(_) => StatusCode::CONFLICT,
        MineError::NotFound(_) => StatusCode::NOT_FOUND,
        MineError::ExecTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        MineError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
        MineError::Shutdown => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn details_for(e: &MineError) -> Option<serde_json::Value> {
    match e {
        MineError::Conflict { track, job_id } => Some(json!({"track": track, "job_id": job_id})),
        MineError::Exec { class, output, .. } if !output.is_empty() => {
            Some(json!({"command": class.to_string(), "output": output}))
        }
        MineError::PartialFailure { gpu_job, source } => Some(json!({
            "gpu_job": gpu_job,
            "cause": source.to_string(),
        })),
        MineError::StopFailed { failures } => Some(json!({
            "failures": failures
                .iter()
                .map(|(track, e)| json!({"track": track, "error": e.to_string()}))
                .collect::<Vec<_>>(),
        })),
        _ => None,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let request_id = format!("req_{}", Uuid::new_v4());
        if status.is_server_error() {
            error!(%request_id, code = self.0.code(), error = %self.0, "request failed");
        } else {
            info!(%request_id, code = self.0.code(), error = %self.0, "request rejected");
        }
        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.0.code().to_string(),
                message: self.0.to_string(),
                request_id,
                details: details_for(&self.0),
            },
        };
        (status, Json(body)).into_response()
    }
}

fn internal(message: &str) -> Response {
    let body = ErrorResponse {
        error: ErrorDetail {
            code: "internal".to_string(),
            message: message.to_string(),
            request_id: format!("req_{}", Uuid::new_v4()),
            details: None,
        },
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct StartForm {
    #[serde(rename = "walletId", default)]
    pub wallet_id: String,
    #[serde(default)]
    pub usage: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/status", get(status))
        .route("/health", get(health))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Orchestration runs on its own task so a dropped connection cannot abandon a
/// half-submitted session.
pub async fn start(State(st): State<AppState>, Form(form): Form<StartForm>) -> Response {
    let orchestrator = st.orchestrator.clone();
    let task =
        tokio::spawn(async move { orchestrator.start(&form.wallet_id, &form.usage).await });
    match task.await {
        Ok(Ok(jobs)) => (StatusCode::OK, Json::<StartedJobs>(jobs)).into_response(),
        Ok(Err(e)) => ApiError(e).into_response(),
        Err(e) => {
            error!(error = %e, "start task panicked");
            internal("start task failed")
        }
    }
}

pub async fn stop(State(st): State<AppState>) -> Response {
    let orchestrator = st.orchestrator.clone();
    match tokio::spawn(async move { orchestrator.stop().await }).await {
        Ok(Ok(())) => Json(json!({"status": "stopped"})).into_response(),
        Ok(Err(e)) => ApiError(e).into_response(),
        Err(e) => {
            error!(error = %e, "stop task panicked");
            internal("stop task failed")
        }
    }
}

pub async fn status(State(st): State<AppState>) -> impl IntoResponse {
    Json(st.orchestrator.status().await)
}

/// Scheduler reachability, checked as the admin user.
pub async fn health(State(st): State<AppState>) -> Response {
    match st.orchestrator.health().await {
        Ok(()) => Json(json!({"status": "ok"})).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

pub async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use idlemine_common::{AlgorithmTable, CommandClass, JobHandle, Result, Track};
    use idlemine_scheduler::{
        CommandRunner, FixedAlgorithm, JobTemplates, Orchestrator, OrchestratorConfig, Slurm,
    };

    use super::*;

    /// Answers every command with empty output: nothing queued, nothing listed.
    struct EmptyCluster;

    #[async_trait]
    impl CommandRunner for EmptyCluster {
        async fn run(&self, _as_user: &str, _command: &str, _class: CommandClass) -> Result<String> {
            Ok(String::new())
        }
    }

    /// Reports job 77 under every queried name.
    struct BusyCluster;

    #[async_trait]
    impl CommandRunner for BusyCluster {
        async fn run(&self, _as_user: &str, command: &str, _class: CommandClass) -> Result<String> {
            if command.starts_with("squeue --name") {
                Ok("77\n".to_string())
            } else {
                Ok(String::new())
            }
        }
    }

    async fn serve() -> String {
        serve_with(Arc::new(EmptyCluster)).await
    }

    async fn serve_with(runner: Arc<dyn CommandRunner>) -> String {
        let orchestrator = Orchestrator::new(
            Slurm::new(runner, "admin"),
            Arc::new(FixedAlgorithm("kawpow".to_string())),
            AlgorithmTable::default(),
            JobTemplates::default(),
            OrchestratorConfig {
                settle_delay: Duration::from_millis(1),
                ..OrchestratorConfig::default()
            },
        );
        let app = router(AppState {
            orchestrator: Arc::new(orchestrator),
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn post_form(url: &str, body: &'static str) -> (StatusCode, serde_json::Value) {
        let resp = reqwest::Client::new()
            .post(url)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .unwrap();
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
        let value = serde_json::from_str(&resp.text().await.unwrap()).unwrap();
        (status, value)
    }

    #[test]
    fn error_statuses() {
        let cases = [
            (MineError::Input("x".into()), StatusCode::BAD_REQUEST),
            (MineError::InvalidUsage("x".into()), StatusCode::BAD_REQUEST),
            (MineError::Conflict { track: Track::Gpu, job_id: 7 }, StatusCode::CONFLICT),
            (MineError::NoOp("x".into()), StatusCode::CONFLICT),
            (MineError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                MineError::ExecTimeout { class: CommandClass::Health, after: Duration::from_secs(5) },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (MineError::UpstreamUnavailable("x".into()), StatusCode::BAD_GATEWAY),
            (MineError::Shutdown, StatusCode::SERVICE_UNAVAILABLE),
            (MineError::Template("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(status_for(&err), expected, "{err:?}");
        }
    }

    #[test]
    fn partial_failure_details_carry_gpu_job() {
        let err = MineError::PartialFailure {
            gpu_job: JobHandle::new("4242"),
            source: Box::new(MineError::Exec {
                class: CommandClass::Submit,
                message: "exit status: 1".into(),
                output: String::new(),
            }),
        };
        let details = details_for(&err).unwrap();
        assert_eq!(details["gpu_job"], "4242");
        assert!(details["cause"].as_str().unwrap().contains("submit"));
    }

    #[tokio::test]
    async fn bad_usage_is_rejected() {
        let base = serve().await;
        let (status, body) = post_form(&format!("{base}/start"), "walletId=abc&usage=lots").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_input");
        assert!(body["error"]["request_id"].as_str().unwrap().starts_with("req_"));
    }

    #[tokio::test]
    async fn running_jobs_win_over_bad_usage() {
        let base = serve_with(Arc::new(BusyCluster)).await;
        let (status, body) = post_form(&format!("{base}/start"), "walletId=abc&usage=lots").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "conflict");
        assert_eq!(body["error"]["details"]["job_id"], 77);
        assert_eq!(body["error"]["details"]["track"], "gpu");
    }

    #[tokio::test]
    async fn missing_wallet_is_rejected() {
        let base = serve().await;
        let (status, body) = post_form(&format!("{base}/start"), "usage=0.5").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_input");
    }

    #[tokio::test]
    async fn empty_node_listing_is_server_error() {
        let base = serve().await;
        let (status, body) = post_form(&format!("{base}/start"), "walletId=abc&usage=0.5").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "parse_failed");
    }

    #[tokio::test]
    async fn stop_and_status_when_idle() {
        let base = serve().await;
        let (status, body) = post_form(&format!("{base}/stop"), "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "stopped");

        let body: serde_json::Value = serde_json::from_str(
            &reqwest::get(format!("{base}/status")).await.unwrap().text().await.unwrap(),
        )
        .unwrap();
        assert_eq!(body, json!({"running": false}));

        let resp = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
    }
}
