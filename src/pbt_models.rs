// Data model for the Perth Bus Times client
//
// Wire types mirror the Perth transit API (http://api.perthtransit.com/1):
// - GET /{train_stations|bus_stops}?near=lat,lng -> {"response": [StopInfo, ...]}
// - GET /bus_stops/{id}                           -> {"response": ServiceListing}
// - GET /train_stations/{id}                      -> {"response": ServiceListing}
//
// Identifiers come back as numbers for bus stops and short codes ("perth")
// for train stations, so both shapes are folded into StopIdentifier.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Locations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    /// Build a location, rejecting coordinates outside [-90, 90] x [-180, 180].
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(PBTError::LocationUnavailable(format!(
                "coordinates out of range: {}, {}",
                lat, lng
            )));
        }
        Ok(Location { lat, lng })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

// ============================================================================
// Identifiers and classification
// ============================================================================

/// Stop or station identifier as sent by the API or the display surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StopIdentifier {
    Number(u32),
    Code(String),
}

impl StopIdentifier {
    /// Identifier used by records that do not point at a stop.
    pub const NONE: StopIdentifier = StopIdentifier::Number(0);

    pub fn as_number(&self) -> Option<u32> {
        match self {
            StopIdentifier::Number(n) => Some(*n),
            StopIdentifier::Code(_) => None,
        }
    }

    /// True for identifiers the bus stop service endpoint answers for.
    pub fn is_bus_stop_number(&self) -> bool {
        matches!(self.as_number(), Some(1..=99_999))
    }
}

impl FromStr for StopIdentifier {
    type Err = PBTError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PBTError::ParseError("empty stop identifier".to_string()));
        }
        Ok(match s.parse::<u32>() {
            Ok(n) => StopIdentifier::Number(n),
            Err(_) => StopIdentifier::Code(s.to_string()),
        })
    }
}

impl fmt::Display for StopIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopIdentifier::Number(n) => write!(f, "{}", n),
            StopIdentifier::Code(code) => write!(f, "{}", code),
        }
    }
}

impl<'de> Deserialize<'de> for StopIdentifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Number(n) => Ok(n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(StopIdentifier::Number)
                .unwrap_or_else(|| StopIdentifier::Code(n.to_string()))),
            serde_json::Value::String(s) => s.parse().map_err(de::Error::custom),
            other => Err(de::Error::custom(format!("invalid stop identifier: {}", other))),
        }
    }
}

/// What kind of place a stop identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopKind {
    BusStop,
    /// Individual platform of a train station; only the station is shown.
    Platform,
    Ferry,
    TrainStation,
}

impl StopKind {
    pub fn classify(identifier: &StopIdentifier) -> StopKind {
        match identifier.as_number() {
            Some(1..=89_999) => StopKind::BusStop,
            Some(90_000..=99_997) => StopKind::Platform,
            Some(99_998..=99_999) => StopKind::Ferry,
            _ => StopKind::TrainStation,
        }
    }

    pub fn is_displayed(self) -> bool {
        self != StopKind::Platform
    }
}

/// Stop collections the API can search by proximity or look up by identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopNetwork {
    TrainStations,
    BusStops,
}

impl StopNetwork {
    pub fn path(self) -> &'static str {
        match self {
            StopNetwork::TrainStations => "train_stations",
            StopNetwork::BusStops => "bus_stops",
        }
    }

    /// Which collection answers service lookups for an identifier.
    pub fn for_identifier(identifier: &StopIdentifier) -> StopNetwork {
        if identifier.is_bus_stop_number() {
            StopNetwork::BusStops
        } else {
            StopNetwork::TrainStations
        }
    }
}

// ============================================================================
// API payloads
// ============================================================================

/// Every API reply wraps its payload in a top-level `response` field.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub response: T,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StopInfo {
    pub identifier: StopIdentifier,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default, deserialize_with = "string_or_number")]
    pub stop_number: Option<String>,
}

impl StopInfo {
    pub fn location(&self) -> Location {
        Location { lat: self.lat, lng: self.lng }
    }

    pub fn kind(&self) -> StopKind {
        StopKind::classify(&self.identifier)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrainService {
    pub time: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub platform: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub line: String,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub cars: Option<u32>,
    #[serde(default)]
    pub on_time: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BusService {
    pub time: String,
    #[serde(deserialize_with = "required_string_or_number")]
    pub route: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub destination: String,
}

/// One scheduled departure. Bus entries are the ones carrying a non-null `route`.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEntry {
    Train(TrainService),
    Bus(BusService),
}

impl ServiceEntry {
    pub fn time(&self) -> &str {
        match self {
            ServiceEntry::Train(t) => &t.time,
            ServiceEntry::Bus(b) => &b.time,
        }
    }
}

impl<'de> Deserialize<'de> for ServiceEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        if value.get("route").is_some_and(|route| !route.is_null()) {
            BusService::deserialize(value)
                .map(ServiceEntry::Bus)
                .map_err(de::Error::custom)
        } else {
            TrainService::deserialize(value)
                .map(ServiceEntry::Train)
                .map_err(de::Error::custom)
        }
    }
}

/// Upcoming services for one stop or station.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceListing {
    #[serde(default)]
    pub identifier: Option<StopIdentifier>,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub stop_number: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default, deserialize_with = "skip_bad_entries")]
    pub times: Vec<ServiceEntry>,
}

/// Decode departures one at a time, dropping (and logging) any that do not fit
/// either shape so the rest of the listing still reaches the watch.
fn skip_bad_entries<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<ServiceEntry>, D::Error> {
    let values = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values
        .into_iter()
        .filter_map(|value| match ServiceEntry::deserialize(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping service entry: {}", e);
                None
            }
        })
        .collect())
}

fn string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) if s.is_empty() => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s)),
        serde_json::Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(de::Error::custom(format!("expected string or number, got {}", other))),
    }
}

/// Missing, null and numeric values all become a (possibly empty) string.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(string_or_number(deserializer)?.unwrap_or_default())
}

fn required_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    string_or_number(deserializer)?.ok_or_else(|| de::Error::custom("missing value"))
}

// ============================================================================
// Display records
// ============================================================================

/// Leading marker understood by the watch app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    /// Section heading, e.g. "Bus stops" or a stop number
    Header,
    /// Progress and error text, e.g. "Locating", "No comms"
    Status,
    /// Placeholders and service rows
    Info,
}

impl Icon {
    pub fn code(self) -> char {
        match self {
            Icon::Header => '!',
            Icon::Status => '$',
            Icon::Info => ' ',
        }
    }
}

/// One bounded-size message for the display surface.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayRecord {
    pub identifier: StopIdentifier,
    pub title: String,
    pub subtitle: String,
    pub icon: Option<Icon>,
}

impl DisplayRecord {
    pub const TITLE_MAX: usize = 20;
    pub const SUBTITLE_MAX: usize = 30;

    /// Text-only record (status, heading or placeholder).
    pub fn text(icon: Icon, title: impl Into<String>) -> Self {
        DisplayRecord {
            identifier: StopIdentifier::NONE,
            title: title.into(),
            subtitle: String::new(),
            icon: Some(icon),
        }
    }

    pub fn new(
        identifier: StopIdentifier,
        title: impl Into<String>,
        subtitle: impl Into<String>,
        icon: Option<Icon>,
    ) -> Self {
        DisplayRecord {
            identifier,
            title: title.into(),
            subtitle: subtitle.into(),
            icon,
        }
    }

    /// Cut title and subtitle down to what the watch can hold.
    pub fn truncated(mut self) -> Self {
        truncate_chars(&mut self.title, Self::TITLE_MAX);
        truncate_chars(&mut self.subtitle, Self::SUBTITLE_MAX);
        self
    }
}

impl fmt::Display for DisplayRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.icon.map(Icon::code).unwrap_or(' ');
        if self.subtitle.is_empty() {
            write!(f, "{}{}", code, self.title)
        } else {
            write!(f, "{}{} | {}", code, self.title, self.subtitle)
        }
    }
}

/// Character-count truncation; never splits a UTF-8 sequence.
pub fn truncate_chars(s: &mut String, max: usize) {
    if let Some((idx, _)) = s.char_indices().nth(max) {
        s.truncate(idx);
    }
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum PBTError {
    NetworkError(String),
    HttpStatus(u16),
    EmptyBody,
    Timeout(Duration),
    ParseError(String),
    RetriesExhausted { endpoint: String, attempts: u32 },
    LocationUnavailable(String),
    TransportError(String),
}

impl fmt::Display for PBTError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PBTError::NetworkError(e) => write!(f, "Network error: {}", e),
            PBTError::HttpStatus(status) => write!(f, "API returned status {}", status),
            PBTError::EmptyBody => write!(f, "API returned an empty body"),
            PBTError::Timeout(d) => write!(f, "Timed out after {:?}", d),
            PBTError::ParseError(e) => write!(f, "Parse error: {}", e),
            PBTError::RetriesExhausted { endpoint, attempts } => {
                write!(f, "Gave up on {} after {} attempts", endpoint, attempts)
            }
            PBTError::LocationUnavailable(e) => write!(f, "Location unavailable: {}", e),
            PBTError::TransportError(e) => write!(f, "Transport error: {}", e),
        }
    }
}

impl std::error::Error for PBTError {}

pub type Result<T> = std::result::Result<T, PBTError>;
