//! Intersection geocoding.
//!
//! Places intersections on real coordinates when the name can be resolved.
//! Lookups are best-effort: the pipeline treats any error as "no site" and
//! the renderer falls back to a fixed grid.

use serde::Deserialize;
use thiserror::Error;

/// Errors from a geocoding lookup.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("geocoder returned status {0}")]
    Status(u16),
}

/// A resolved intersection position.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Address the service matched.
    pub address: String,
}

/// Resolves free-text intersection names to sites.
#[async_trait::async_trait]
pub trait Geocoder: Send + Sync + std::fmt::Debug {
    /// Look up `query`. `Ok(None)` means the service found no candidate.
    ///
    /// # Errors
    ///
    /// Returns an error if the service cannot be reached or answers badly.
    async fn locate(&self, query: &str) -> Result<Option<Site>, GeocodeError>;
}

/// Geocoder that never resolves anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGeocoder;

#[async_trait::async_trait]
impl Geocoder for DisabledGeocoder {
    async fn locate(&self, _query: &str) -> Result<Option<Site>, GeocodeError> {
        Ok(None)
    }
}

/// ArcGIS World Geocoding `findAddressCandidates` client.
#[derive(Debug, Clone)]
pub struct ArcGisGeocoder {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct CandidatesResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    address: String,
    location: CandidateLocation,
}

#[derive(Deserialize)]
struct CandidateLocation {
    x: f64,
    y: f64,
}

impl ArcGisGeocoder {
    /// Create a client for `endpoint`.
    #[must_use]
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait::async_trait]
impl Geocoder for ArcGisGeocoder {
    async fn locate(&self, query: &str) -> Result<Option<Site>, GeocodeError> {
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[("f", "json"), ("singleLine", query), ("maxLocations", "1")])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(GeocodeError::Status(resp.status().as_u16()));
        }

        let body: CandidatesResponse = resp.json().await?;
        Ok(body.candidates.into_iter().next().map(|c| Site {
            lat: c.location.y,
            lon: c.location.x,
            address: c.address,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google;
    use std::collections::HashMap;
    use std::time::Duration;
    use warp::Filter;

    fn client(base: &str) -> ArcGisGeocoder {
        ArcGisGeocoder::new(
            google::http_client(Duration::from_secs(5)).unwrap(),
            format!("{base}/findAddressCandidates"),
        )
    }

    #[tokio::test]
    async fn test_disabled_geocoder() {
        let site = DisabledGeocoder.locate("Main St and Oak Ave").await.unwrap();
        assert!(site.is_none());
    }

    #[tokio::test]
    async fn test_arcgis_first_candidate() {
        let routes = warp::path("findAddressCandidates")
            .and(warp::query::<HashMap<String, String>>())
            .map(|q: HashMap<String, String>| {
                assert_eq!(q.get("f").map(String::as_str), Some("json"));
                assert_eq!(q.get("maxLocations").map(String::as_str), Some("1"));
                assert_eq!(
                    q.get("singleLine").map(String::as_str),
                    Some("Haggerty Road and 10 Mile Road, Novi, Michigan")
                );
                warp::reply::json(&serde_json::json!({
                    "candidates": [{
                        "address": "Haggerty Rd & 10 Mile Rd, Novi, Michigan",
                        "location": {"x": -83.4347, "y": 42.4707},
                        "score": 100
                    }]
                }))
            });
        let base = google::fake::serve(routes);

        let site = client(&base)
            .locate("Haggerty Road and 10 Mile Road, Novi, Michigan")
            .await
            .unwrap()
            .unwrap();
        assert!((site.lat - 42.4707).abs() < f64::EPSILON);
        assert!((site.lon + 83.4347).abs() < f64::EPSILON);
        assert!(site.address.contains("Novi"));
    }

    #[tokio::test]
    async fn test_arcgis_no_candidates() {
        let routes = warp::path("findAddressCandidates")
            .map(|| warp::reply::json(&serde_json::json!({"candidates": []})));
        let base = google::fake::serve(routes);

        assert!(client(&base).locate("Intersection A").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_arcgis_error_status() {
        let routes = warp::path("findAddressCandidates")
            .map(|| warp::reply::with_status("down", warp::http::StatusCode::BAD_GATEWAY));
        let base = google::fake::serve(routes);

        let err = client(&base).locate("Intersection A").await.unwrap_err();
        assert!(matches!(err, GeocodeError::Status(502)));
    }
}
