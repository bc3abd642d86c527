// HTTP access to the Perth transit API with a fixed-timeout, bounded-retry policy
//
// API Endpoints:
// - Nearby stations: {base}/train_stations?near={lat},{lng}
// - Nearby bus stops: {base}/bus_stops?near={lat},{lng}
// - Station services: {base}/train_stations/{identifier}
// - Bus stop services: {base}/bus_stops/{identifier}

use crate::pbt_models::{ApiEnvelope, Location, PBTError, Result, StopIdentifier, StopNetwork};
use lazy_static::lazy_static;
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::time::Duration;

lazy_static! {
    static ref SEGMENT_BASE: Url = Url::parse("http://localhost/").expect("valid base url");
}

/// Status and body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// Anything that can answer a GET for a path relative to the API base.
pub trait TransitApi {
    async fn get(&self, path: &str) -> Result<HttpReply>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    Near {
        network: StopNetwork,
        location: Location,
    },
    Services {
        network: StopNetwork,
        identifier: StopIdentifier,
    },
}

impl Endpoint {
    pub fn near(network: StopNetwork, location: Location) -> Self {
        Endpoint::Near { network, location }
    }

    /// Service lookup, routed to bus stops or train stations by identifier.
    pub fn services(identifier: StopIdentifier) -> Self {
        Endpoint::Services {
            network: StopNetwork::for_identifier(&identifier),
            identifier,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Endpoint::Near { network, location } => {
                format!("/{}?near={},{}", network.path(), location.lat, location.lng)
            }
            Endpoint::Services { network, identifier } => {
                format!("/{}/{}", network.path(), encode_segment(&identifier.to_string()))
            }
        }
    }
}

/// Percent-encode one path segment, so `/`, `?` and `#` in a station code
/// cannot change which resource is requested.
fn encode_segment(segment: &str) -> String {
    let mut url = SEGMENT_BASE.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(segment);
    }
    url.path().trim_start_matches('/').to_string()
}

// ============================================================================
// reqwest-backed API
// ============================================================================

pub struct HttpTransitApi {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransitApi {
    pub const DEFAULT_BASE_URL: &'static str = "http://api.perthtransit.com/1";

    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PBTError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpTransitApi {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }
}

impl TransitApi for HttpTransitApi {
    async fn get(&self, path: &str) -> Result<HttpReply> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("GET {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                PBTError::Timeout(self.timeout)
            } else {
                PBTError::NetworkError(format!("Failed to fetch {}: {}", url, e))
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| PBTError::NetworkError(format!("Failed to read response: {}", e)))?;

        Ok(HttpReply { status, body })
    }
}

// ============================================================================
// Fetch-Retry Controller
// ============================================================================

/// Retry policy for one call site: immediate retries, hard per-attempt timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRetry {
    pub retries: u32,
    pub timeout: Duration,
}

impl FetchRetry {
    pub const DEFAULT_RETRIES: u32 = 3;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(retries: u32, timeout: Duration) -> Self {
        FetchRetry { retries, timeout }
    }

    /// GET `endpoint` until it answers 200/304 with a body, or the retry
    /// budget runs out. The JSON `response` field is decoded into `T`.
    ///
    /// A body that arrives but does not decode is not retried.
    pub async fn fetch<A: TransitApi, T: DeserializeOwned>(&self, api: &A, endpoint: &Endpoint) -> Result<T> {
        let path = endpoint.path();
        let mut attempts_remaining = self.retries;
        let mut attempts = 0;

        let body = loop {
            attempts += 1;
            match self.attempt(api, &path).await {
                Ok(body) => break body,
                Err(e) if attempts_remaining > 0 => {
                    log::warn!("{} failed ({}), {} retries left", path, e, attempts_remaining);
                    attempts_remaining -= 1;
                }
                Err(e) => {
                    log::error!("{} failed ({}), giving up after {} attempts", path, e, attempts);
                    return Err(PBTError::RetriesExhausted { endpoint: path, attempts });
                }
            }
        };

        let envelope: ApiEnvelope<T> = serde_json::from_str(&body)
            .map_err(|e| PBTError::ParseError(format!("Invalid JSON from {}: {}", path, e)))?;

        log::info!("{} answered after {} attempt(s)", path, attempts);
        Ok(envelope.response)
    }

    async fn attempt<A: TransitApi>(&self, api: &A, path: &str) -> Result<String> {
        let reply = tokio::time::timeout(self.timeout, api.get(path))
            .await
            .map_err(|_| PBTError::Timeout(self.timeout))??;

        if reply.status != 200 && reply.status != 304 {
            return Err(PBTError::HttpStatus(reply.status));
        }
        if reply.body.is_empty() {
            return Err(PBTError::EmptyBody);
        }
        Ok(reply.body)
    }
}

impl Default for FetchRetry {
    fn default() -> Self {
        FetchRetry::new(Self::DEFAULT_RETRIES, Self::DEFAULT_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pbt_models::{ServiceListing, StopInfo};
    use crate::pbt_testing::{ScriptedApi, ScriptedReply};

    const STOPS_JSON: &str = r#"{"response": [
        {"identifier": 10001, "name": "Hay St Before Barrack St", "lat": -31.95, "lng": 115.86, "stop_number": "10001"}
    ]}"#;

    fn perth() -> Location {
        Location { lat: -31.9505, lng: 115.8605 }
    }

    #[test]
    fn test_endpoint_paths() {
        assert_eq!(
            Endpoint::near(StopNetwork::TrainStations, perth()).path(),
            "/train_stations?near=-31.9505,115.8605"
        );
        assert_eq!(
            Endpoint::services(StopIdentifier::Number(15832)).path(),
            "/bus_stops/15832"
        );
        assert_eq!(
            Endpoint::services(StopIdentifier::Code("perth".into())).path(),
            "/train_stations/perth"
        );
        assert_eq!(
            Endpoint::services(StopIdentifier::Number(100_000)).path(),
            "/train_stations/100000"
        );
    }

    #[test]
    fn test_station_code_stays_in_one_segment() {
        assert_eq!(
            Endpoint::services(StopIdentifier::Code("a/b?c#d".into())).path(),
            "/train_stations/a%2Fb%3Fc%23d"
        );
        assert_eq!(
            Endpoint::services(StopIdentifier::Code("mt lawley".into())).path(),
            "/train_stations/mt%20lawley"
        );
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let api = ScriptedApi::new(vec![ScriptedReply::ok(STOPS_JSON)]);
        let stops: Vec<StopInfo> = FetchRetry::default()
            .fetch(&api, &Endpoint::near(StopNetwork::BusStops, perth()))
            .await
            .unwrap();
        assert_eq!(stops.len(), 1);
        assert_eq!(api.calls(), vec!["/bus_stops?near=-31.9505,115.8605".to_string()]);
    }

    #[tokio::test]
    async fn test_not_modified_counts_as_success() {
        let api = ScriptedApi::new(vec![ScriptedReply::status(304, STOPS_JSON)]);
        let stops: Vec<StopInfo> = FetchRetry::default()
            .fetch(&api, &Endpoint::near(StopNetwork::BusStops, perth()))
            .await
            .unwrap();
        assert_eq!(stops.len(), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_failures() {
        let api = ScriptedApi::new(vec![
            ScriptedReply::status(500, "oops"),
            ScriptedReply::ok(""),
            ScriptedReply::fail("connection reset"),
            ScriptedReply::ok(r#"{"response": {"name": "Perth", "times": []}}"#),
        ]);
        let listing: ServiceListing = FetchRetry::new(3, Duration::from_secs(5))
            .fetch(&api, &Endpoint::services(StopIdentifier::Code("perth".into())))
            .await
            .unwrap();
        assert_eq!(listing.name, "Perth");
        assert_eq!(api.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_retry_exhaustion() {
        for retries in [0, 1, 3] {
            let api = ScriptedApi::new(
                (0..=retries + 2).map(|_| ScriptedReply::status(503, "")).collect(),
            );
            let result: Result<Vec<StopInfo>> = FetchRetry::new(retries, Duration::from_secs(5))
                .fetch(&api, &Endpoint::near(StopNetwork::BusStops, perth()))
                .await;

            match result {
                Err(PBTError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, retries + 1),
                other => panic!("expected exhaustion, got {:?}", other),
            }
            assert_eq!(api.calls().len() as u32, retries + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let api = ScriptedApi::new(vec![
            ScriptedReply::delayed(Duration::from_secs(30), ScriptedReply::ok(STOPS_JSON)),
            ScriptedReply::ok(STOPS_JSON),
        ]);
        let started = tokio::time::Instant::now();
        let stops: Vec<StopInfo> = FetchRetry::new(1, Duration::from_secs(5))
            .fetch(&api, &Endpoint::near(StopNetwork::BusStops, perth()))
            .await
            .unwrap();

        assert_eq!(stops.len(), 1);
        assert_eq!(api.calls().len(), 2);
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_bad_json_is_not_retried() {
        let api = ScriptedApi::new(vec![ScriptedReply::ok("<html>"), ScriptedReply::ok(STOPS_JSON)]);
        let result: Result<Vec<StopInfo>> = FetchRetry::default()
            .fetch(&api, &Endpoint::near(StopNetwork::BusStops, perth()))
            .await;
        assert!(matches!(result, Err(PBTError::ParseError(_))));
        assert_eq!(api.calls().len(), 1);
    }
}
