use crate::config::ServerConfig;
use crate::data::{SchedulingInput, SchedulingOutput};
use crate::jobs::{JobRegistry, JobSnapshot};
use crate::solver;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::info;
use serde::Serialize;
use tower::limit::ConcurrencyLimitLayer;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    jobs: JobRegistry,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobCreated {
    job_id: Uuid,
}

async fn solve_handler(
    Json(input): Json<SchedulingInput>,
) -> Result<Json<SchedulingOutput>, (StatusCode, String)> {
    let result = tokio::task::spawn_blocking(move || solver::solve(&input))
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("solver task failed: {}", e),
            )
        })?;
    match result {
        Ok(output) => Ok(Json(output)),
        Err(e) => Err((StatusCode::BAD_REQUEST, e.to_string())),
    }
}

async fn start_job_handler(
    State(state): State<AppState>,
    Json(input): Json<SchedulingInput>,
) -> (StatusCode, Json<JobCreated>) {
    let job_id = state.jobs.start(input);
    (StatusCode::ACCEPTED, Json(JobCreated { job_id }))
}

async fn job_status_handler(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobSnapshot>, (StatusCode, String)> {
    state
        .jobs
        .snapshot(job_id)
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown job {}", job_id)))
}

async fn cancel_job_handler(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.jobs.cancel(job_id) {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err((StatusCode::NOT_FOUND, format!("unknown job {}", job_id)))
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

pub fn router(config: &ServerConfig) -> Router {
    Router::new()
        .route(
            "/v1/timetable/solve",
            post(solve_handler).layer(ConcurrencyLimitLayer::new(config.max_concurrent_solves)),
        )
        .route("/v1/timetable/jobs", post(start_job_handler))
        .route(
            "/v1/timetable/jobs/:job_id",
            get(job_status_handler).delete(cancel_job_handler),
        )
        .route("/health", get(health_handler))
        .with_state(AppState {
            jobs: JobRegistry::from_config(config),
        })
}

pub async fn run_server(config: ServerConfig) -> std::io::Result<()> {
    let app = router(&config);
    let listener = tokio::net::TcpListener::bind(config.bind).await?;

    info!("Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> Router {
        router(&ServerConfig::default())
    }

    fn payload(generations: usize) -> Value {
        json!({
            "classes": [{"id": 1, "name": "4A", "dailyLessons": 5}],
            "workload": [
                {"teacherId": 1, "subjectId": 10, "classId": 1, "hours": 5},
                {"teacherId": 2, "subjectId": 20, "classId": 1, "hours": 2}
            ],
            "capabilities": [{"teacherId": 1, "subjectIds": [10]}],
            "optimizer": {"populationSize": 10, "generations": generations, "seed": 99}
        })
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(value) => Body::from(value.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn test_solve_endpoint() {
        let (status, body) = send(app(), "POST", "/v1/timetable/solve", Some(payload(15))).await;
        assert_eq!(status, StatusCode::OK);

        let output: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(output["schedule"]["entries"].as_array().unwrap().len(), 5);
        assert_eq!(output["warnings"].as_array().unwrap().len(), 1);
        assert_eq!(output["generationsRun"], 15);
        let fitness = output["schedule"]["fitnessScore"].as_u64().unwrap();
        assert!(fitness <= 1000);
    }

    #[tokio::test]
    async fn test_solve_rejects_invalid_config() {
        let mut body = payload(5);
        body["optimizer"]["mutationRate"] = json!(2.0);
        let (status, message) = send(app(), "POST", "/v1/timetable/solve", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8(message).unwrap().contains("mutationRate"));
    }

    #[tokio::test]
    async fn test_job_lifecycle() {
        let app = app();
        let (status, body) = send(app.clone(), "POST", "/v1/timetable/jobs", Some(payload(10))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let created: Value = serde_json::from_slice(&body).unwrap();
        let job_id = created["jobId"].as_str().unwrap().to_string();
        let uri = format!("/v1/timetable/jobs/{}", job_id);

        let mut last = Value::Null;
        for _ in 0..500 {
            let (status, body) = send(app.clone(), "GET", &uri, None).await;
            assert_eq!(status, StatusCode::OK);
            last = serde_json::from_slice(&body).unwrap();
            if last["status"] != "solving" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(last["status"], "completed");
        assert_eq!(last["result"]["schedule"]["entries"].as_array().unwrap().len(), 5);

        let (status, _) = send(app.clone(), "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let uri = format!("/v1/timetable/jobs/{}", Uuid::new_v4());
        let (status, _) = send(app(), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(app(), "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
