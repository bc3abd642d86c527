// Command line and environment configuration
//
// Every option can also come from the environment (or a .env file):
//   PBT_API_BASE, PBT_LAT, PBT_LNG, PBT_RETRIES, PBT_BUS_STOPS_ONLY, ...

use crate::pbt_controllers::{PositionOptions, SessionSettings};
use crate::pbt_fetch::{FetchRetry, HttpTransitApi};
use crate::pbt_models::{Location, Result, StopIdentifier};
use clap::Parser;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "pbt", version, about = "Perth Bus Times: nearby stops and next departures")]
pub struct Config {
    /// Base URL of the Perth transit API
    #[arg(long, env = "PBT_API_BASE", default_value = HttpTransitApi::DEFAULT_BASE_URL)]
    pub api_base: String,

    /// Latitude reported by the location source
    #[arg(long, env = "PBT_LAT", allow_negative_numbers = true, requires = "lng")]
    pub lat: Option<f64>,

    /// Longitude reported by the location source
    #[arg(long, env = "PBT_LNG", allow_negative_numbers = true, requires = "lat")]
    pub lng: Option<f64>,

    /// Retries after a failed request (0 means a single attempt)
    #[arg(long, env = "PBT_RETRIES", default_value_t = FetchRetry::DEFAULT_RETRIES)]
    pub retries: u32,

    #[arg(long, env = "PBT_STOPS_TIMEOUT_SECS", default_value_t = 5)]
    pub stops_timeout_secs: u64,

    #[arg(long, env = "PBT_SERVICES_TIMEOUT_SECS", default_value_t = 5)]
    pub services_timeout_secs: u64,

    #[arg(long, env = "PBT_LOCATION_TIMEOUT_SECS", default_value_t = 60)]
    pub location_timeout_secs: u64,

    #[arg(long, env = "PBT_LOCATION_MAX_AGE_SECS", default_value_t = 60)]
    pub location_max_age_secs: u64,

    /// Only search for bus stops
    #[arg(long, env = "PBT_BUS_STOPS_ONLY")]
    pub bus_stops_only: bool,

    /// Show minutes until departure next to each service time
    #[arg(long, env = "PBT_COUNTDOWN")]
    pub countdown: bool,

    /// Stop or station to list services for; repeatable. Read from stdin when absent.
    #[arg(long = "stop", value_name = "ID")]
    pub stops: Vec<StopIdentifier>,
}

impl Config {
    /// Reject coordinates no location source could produce.
    pub fn validate(&self) -> Result<()> {
        self.location().map(|_| ())
    }

    pub fn location(&self) -> Result<Option<Location>> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Location::new(lat, lng).map(Some),
            _ => Ok(None),
        }
    }

    /// Longest any single HTTP exchange may take.
    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.stops_timeout_secs.max(self.services_timeout_secs))
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            position: PositionOptions {
                high_accuracy: true,
                timeout: Duration::from_secs(self.location_timeout_secs),
                max_age: Duration::from_secs(self.location_max_age_secs),
            },
            stops_fetch: FetchRetry::new(self.retries, Duration::from_secs(self.stops_timeout_secs)),
            services_fetch: FetchRetry::new(self.retries, Duration::from_secs(self.services_timeout_secs)),
            bus_stops_only: self.bus_stops_only,
            countdown: self.countdown,
            ..SessionSettings::default()
        }
    }
}
