//! HTTP front end.
//!
//! Routes:
//! - `GET /` serves the form
//! - `POST /generate` takes the flat form and answers with an HTML page
//! - `POST /api/v1/generate` takes the JSON submission and answers with JSON
//! - `GET /health`
//!
//! Both generate routes return the files as soon as they are rendered and
//! hand backup and usage logging to a detached task.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::delivery::{self, GenerateResponse};
use crate::error::{Error, Result, ValidationError};
use crate::intake::{self, GenerationRequest, SubmissionForm};
use crate::pipeline::Generator;

/// Largest accepted form body, in bytes.
const MAX_FORM_BYTES: u64 = 64 * 1024;

/// Largest accepted JSON body, in bytes.
const MAX_JSON_BYTES: u64 = 512 * 1024;

/// Message shown when a validated request still cannot be rendered.
const RENDER_FAILED: &str = "The network file could not be generated from this request.";

/// Standard API error response.
#[derive(Debug, Serialize)]
pub struct ApiError {
    /// Human-readable message.
    pub error: String,
    /// Machine-readable code.
    pub code: String,
    /// Offending field, for validation errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

// =============================================================================
// Routes
// =============================================================================

/// Build the complete route tree.
pub fn routes(
    generator: Arc<Generator>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let index = warp::path::end()
        .and(warp::get())
        .map(|| warp::reply::html(delivery::form_page()));

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({"status": "ok"})));

    let form = warp::path("generate")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_FORM_BYTES))
        .and(warp::body::form())
        .and(with_generator(generator.clone()))
        .and_then(handle_form);

    let api = warp::path("api")
        .and(warp::path("v1"))
        .and(warp::path("generate"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_JSON_BYTES))
        .and(warp::body::json())
        .and(with_generator(generator))
        .and_then(handle_api);

    index
        .or(health)
        .or(form)
        .or(api)
        .recover(handle_rejection)
}

/// Serve `routes` on `addr` until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn serve(generator: Arc<Generator>, addr: SocketAddr) -> Result<()> {
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
    };
    let (bound, server) = warp::serve(routes(generator))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .map_err(|e| Error::Bind {
            addr: addr.to_string(),
            message: e.to_string(),
        })?;

    info!(addr = %bound, "listening");
    server.await;
    info!("server stopped");
    Ok(())
}

// =============================================================================
// Filters
// =============================================================================

fn with_generator(
    generator: Arc<Generator>,
) -> impl Filter<Extract = (Arc<Generator>,), Error = Infallible> + Clone {
    warp::any().map(move || generator.clone())
}

// =============================================================================
// Handlers
// =============================================================================

async fn handle_form(
    fields: HashMap<String, String>,
    generator: Arc<Generator>,
) -> std::result::Result<warp::reply::Response, Infallible> {
    let request = match intake::from_form_fields(&fields) {
        Ok(request) => request,
        Err(e) => {
            info!(field = %e.field, "rejected form submission");
            return Ok(html(
                StatusCode::BAD_REQUEST,
                delivery::error_page(&e.message, Some(&e.field)),
            ));
        }
    };

    match generator.prepare(&request).await {
        Ok(artifact) => {
            let page = delivery::result_page(&artifact);
            generator.spawn_record(request, artifact, Utc::now());
            Ok(html(StatusCode::OK, page))
        }
        Err(e) => {
            warn!(field = %e.field, error = %e, "render failed");
            Ok(html(
                StatusCode::INTERNAL_SERVER_ERROR,
                delivery::error_page(RENDER_FAILED, None),
            ))
        }
    }
}

async fn handle_api(
    body: SubmissionForm,
    generator: Arc<Generator>,
) -> std::result::Result<warp::reply::Response, Infallible> {
    let request: GenerationRequest = match intake::from_submission(&body) {
        Ok(request) => request,
        Err(e) => {
            info!(field = %e.field, "rejected API submission");
            return Ok(validation_response(&e));
        }
    };

    match generator.prepare(&request).await {
        Ok(artifact) => {
            let response = GenerateResponse::from_artifact(&artifact);
            generator.spawn_record(request, artifact, Utc::now());
            Ok(warp::reply::with_status(warp::reply::json(&response), StatusCode::OK).into_response())
        }
        Err(e) => {
            warn!(field = %e.field, error = %e, "render failed");
            Ok(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "render_error",
                RENDER_FAILED,
            ))
        }
    }
}

/// Turn warp rejections into the same JSON error bodies the handlers use.
async fn handle_rejection(err: Rejection) -> std::result::Result<warp::reply::Response, Infallible> {
    if err.is_not_found() {
        return Ok(error_response(StatusCode::NOT_FOUND, "not_found", "Not found"));
    }

    let response = if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        info!(error = %e, "rejected malformed body");
        let body = ApiError {
            error: format!("Invalid request body: {e}"),
            code: "validation_error".to_string(),
            field: Some("body".to_string()),
        };
        warp::reply::with_status(warp::reply::json(&body), StatusCode::BAD_REQUEST).into_response()
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            "Request payload too large",
        )
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        error_response(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "unsupported_media_type",
            "Unsupported media type",
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            "Method not allowed",
        )
    } else {
        warn!(rejection = ?err, "unhandled rejection");
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Internal server error",
        )
    };
    Ok(response)
}

// =============================================================================
// Helpers
// =============================================================================

fn html(status: StatusCode, page: String) -> warp::reply::Response {
    warp::reply::with_status(warp::reply::html(page), status).into_response()
}

fn error_response(status: StatusCode, code: &str, message: &str) -> warp::reply::Response {
    let body = ApiError {
        error: message.to_string(),
        code: code.to_string(),
        field: None,
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

fn validation_response(err: &ValidationError) -> warp::reply::Response {
    let body = ApiError {
        error: err.to_string(),
        code: "validation_error".to_string(),
        field: Some(err.field.clone()),
    };
    warp::reply::with_status(warp::reply::json(&body), StatusCode::BAD_REQUEST).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::{DisabledSink, StorageSink};
    use crate::geocode::{DisabledGeocoder, Geocoder, Site};
    use crate::pipeline::testing::{FixedGeocoder, MemoryLog, MemoryStorage, RejectingStorage};
    use crate::usage::{LogSink, UsageStatus};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn generator(
        geocoder: Arc<dyn Geocoder>,
        storage: Arc<dyn StorageSink>,
        log: Arc<dyn LogSink>,
    ) -> Arc<Generator> {
        Arc::new(Generator::new(geocoder, storage, log, Duration::from_secs(5)))
    }

    fn offline() -> Arc<Generator> {
        Arc::new(Generator::offline())
    }

    fn scenario_json() -> serde_json::Value {
        serde_json::json!({
            "email": "planner@example.com",
            "intersections": [{"name": "Intersection A", "lanes": 4, "cycle_length": 90}]
        })
    }

    /// Wait for the detached side-effect task to log `count` rows.
    async fn wait_for_rows(log: &MemoryLog, count: usize) {
        for _ in 0..200 {
            if log.entries.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("usage log never reached {count} rows");
    }

    #[tokio::test]
    async fn test_health() {
        let resp = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&routes(offline()))
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body, serde_json::json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_index_serves_form() {
        let resp = warp::test::request()
            .method("GET")
            .path("/")
            .reply(&routes(offline()))
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body = String::from_utf8(resp.body().to_vec()).unwrap();
        assert!(body.contains("<form method=\"post\" action=\"/generate\">"));
    }

    #[tokio::test]
    async fn test_api_generate_scenario() {
        let storage = Arc::new(MemoryStorage::default());
        let log = Arc::new(MemoryLog::default());
        let routes = routes(generator(Arc::new(DisabledGeocoder), storage.clone(), log.clone()));

        let resp = warp::test::request()
            .method("POST")
            .path("/api/v1/generate")
            .json(&scenario_json())
            .reply(&routes)
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: GenerateResponse = serde_json::from_slice(resp.body()).unwrap();
        let names: Vec<&str> = body.files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, ["synchro_intersection_a.txt", "synchro_intersection_a.csv"]);
        assert!(body.files[0].content.contains("Cycle Length\t1\t90"));
        assert!(body.files[1].content.contains("Intersection A,1,"));

        wait_for_rows(&log, 1).await;
        assert_eq!(storage.files.lock().unwrap().len(), 2);
        assert_eq!(log.entries.lock().unwrap()[0].status, UsageStatus::Success);
    }

    #[tokio::test]
    async fn test_api_backup_auth_failure_still_delivers() {
        let storage = Arc::new(RejectingStorage::default());
        let log = Arc::new(MemoryLog::default());
        let routes = routes(generator(Arc::new(DisabledGeocoder), storage.clone(), log.clone()));

        let resp = warp::test::request()
            .method("POST")
            .path("/api/v1/generate")
            .json(&scenario_json())
            .reply(&routes)
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: GenerateResponse = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body.files.len(), 2);

        wait_for_rows(&log, 1).await;
        let entries = log.entries.lock().unwrap();
        assert_eq!(entries[0].status, UsageStatus::BackupFailed);
        assert_eq!(entries[0].backup_link, None);
    }

    #[tokio::test]
    async fn test_api_missing_field() {
        let resp = warp::test::request()
            .method("POST")
            .path("/api/v1/generate")
            .json(&serde_json::json!({
                "intersections": [{"name": "Intersection A", "lanes": 4}]
            }))
            .reply(&routes(offline()))
            .await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["code"], "validation_error");
        assert_eq!(body["field"], "intersections[0].cycle_length");
        assert!(body.get("files").is_none());
    }

    #[tokio::test]
    async fn test_api_wrong_field_type() {
        let resp = warp::test::request()
            .method("POST")
            .path("/api/v1/generate")
            .json(&serde_json::json!({
                "intersections": [{"name": "Intersection A", "lanes": "four", "cycle_length": 90}]
            }))
            .reply(&routes(offline()))
            .await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["code"], "validation_error");
        assert_eq!(body["field"], "body");
        assert!(body["error"].as_str().unwrap().contains("invalid type"));
    }

    #[tokio::test]
    async fn test_api_malformed_json() {
        let resp = warp::test::request()
            .method("POST")
            .path("/api/v1/generate")
            .header("content-type", "application/json")
            .body("{not json")
            .reply(&routes(offline()))
            .await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["code"], "validation_error");
    }

    #[tokio::test]
    async fn test_api_render_error() {
        let site = |lat: f64| Site {
            lat,
            lon: -83.0,
            address: String::new(),
        };
        let geocoder = FixedGeocoder(vec![("A", site(42.0)), ("B", site(f64::INFINITY))]);
        let log = Arc::new(MemoryLog::default());
        let routes = routes(generator(
            Arc::new(geocoder),
            Arc::new(MemoryStorage::default()),
            log.clone(),
        ));

        let resp = warp::test::request()
            .method("POST")
            .path("/api/v1/generate")
            .json(&serde_json::json!({
                "intersections": [
                    {"name": "A", "lanes": 2, "cycle_length": 60},
                    {"name": "B", "lanes": 2, "cycle_length": 60}
                ]
            }))
            .reply(&routes)
            .await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["code"], "render_error");
        assert!(body.get("field").is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(log.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_form_generate() {
        let resp = warp::test::request()
            .method("POST")
            .path("/generate")
            .header("content-type", "application/x-www-form-urlencoded")
            .body("name=Intersection+A&lanes=4&cycle_length=90&twltl=on")
            .reply(&routes(offline()))
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body = String::from_utf8(resp.body().to_vec()).unwrap();
        assert!(body.contains("download=\"synchro_intersection_a.txt\""));
        assert!(body.contains("download=\"synchro_intersection_a.csv\""));
    }

    #[tokio::test]
    async fn test_form_negative_lanes() {
        let resp = warp::test::request()
            .method("POST")
            .path("/generate")
            .header("content-type", "application/x-www-form-urlencoded")
            .body("name=Intersection+A&lanes=-1&cycle_length=90")
            .reply(&routes(offline()))
            .await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = String::from_utf8(resp.body().to_vec()).unwrap();
        assert!(body.contains("<code>lanes</code>"));
        assert!(!body.contains("download="));
    }

    #[tokio::test]
    async fn test_disabled_sinks_do_not_block() {
        let routes = routes(generator(
            Arc::new(DisabledGeocoder),
            Arc::new(DisabledSink::BACKUP),
            Arc::new(DisabledSink::USAGE_LOG),
        ));
        let resp = warp::test::request()
            .method("POST")
            .path("/api/v1/generate")
            .json(&scenario_json())
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let resp = warp::test::request()
            .method("GET")
            .path("/nope")
            .reply(&routes(offline()))
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
