// Views for the Perth Bus Times client
//
// Turns API payloads into the short title/subtitle records the watch shows.
// Stops and services keep the order the API returned them in.

use crate::pbt_geocalcs::GeoCalcs;
use crate::pbt_models::{
    DisplayRecord, Icon, Location, Result, ServiceEntry, ServiceListing, StopIdentifier, StopInfo,
    StopNetwork,
};
use crate::pbt_queue::Transport;
use chrono::{DateTime, TimeZone, Timelike};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SERVICE_TIME: Regex = Regex::new(r"^(\d{1,2}):(\d{2})").expect("valid time pattern");
}

pub struct PBTViews;

impl PBTViews {
    pub const LOCATING: &'static str = "Locating";
    pub const FINDING_STOPS: &'static str = "Finding stops";
    pub const FINDING_SERVICES: &'static str = "Finding services";
    pub const NO_LOCATION: &'static str = "No location";
    pub const NO_COMMS: &'static str = "No comms";
    pub const NO_STOPS_NEARBY: &'static str = "No stops nearby";
    pub const NO_SERVICES: &'static str = "No services";

    const HALF_DAY: i32 = 720;
    const FULL_DAY: i32 = 1440;
    const MAX_OFFSET: i32 = 999;

    // ========================================================================
    // Status records
    // ========================================================================

    pub fn status(text: &str) -> DisplayRecord {
        DisplayRecord::text(Icon::Status, text)
    }

    pub fn no_comms() -> DisplayRecord {
        Self::status(Self::NO_COMMS)
    }

    pub fn heading(network: StopNetwork) -> DisplayRecord {
        let text = match network {
            StopNetwork::TrainStations => "Train stations",
            StopNetwork::BusStops => "Bus stops",
        };
        DisplayRecord::text(Icon::Header, text)
    }

    // ========================================================================
    // Stop listings
    // ========================================================================

    /// Records for one proximity search: a heading, then one record per
    /// displayable stop, or a placeholder when nothing is left.
    pub fn stop_listing(network: StopNetwork, origin: &Location, stops: &[StopInfo]) -> Vec<DisplayRecord> {
        let mut records = vec![Self::heading(network)];

        let before = records.len();
        records.extend(
            stops
                .iter()
                .filter(|stop| stop.kind().is_displayed())
                .map(|stop| Self::stop_record(origin, stop)),
        );

        if records.len() == before {
            records.push(DisplayRecord::text(Icon::Info, Self::NO_STOPS_NEARBY));
        }

        log::debug!(
            "{} {} returned, {} shown",
            stops.len(),
            network.path(),
            records.len() - before
        );
        records
    }

    /// "[stop_number ]distance compass" over the abbreviated stop name.
    pub fn stop_record(origin: &Location, stop: &StopInfo) -> DisplayRecord {
        let target = stop.location();
        let distance = Self::format_distance(GeoCalcs::surface_distance(origin, &target));
        let compass = GeoCalcs::compass_label(GeoCalcs::initial_bearing(origin, &target));

        let title = match &stop.stop_number {
            Some(number) => format!("{} {} {}", number, distance, compass),
            None => format!("{} {}", distance, compass),
        };

        DisplayRecord::new(
            stop.identifier.clone(),
            title,
            Self::abbreviate_stop_name(&stop.name),
            None,
        )
    }

    /// Whole metres to the nearest 10 m under a kilometre, else kilometres to 0.1.
    pub fn format_distance(km: f64) -> String {
        let metres = (km * 1000.0).floor();
        if metres < 1000.0 {
            format!("{}m", ((metres / 10.0).round() * 10.0) as i64)
        } else {
            format!("{}km", (metres / 100.0).round() / 10.0)
        }
    }

    pub fn abbreviate_stop_name(name: &str) -> String {
        name.replace(" Before ", " b ").replace(" After ", " a ")
    }

    // ========================================================================
    // Service listings
    // ========================================================================

    /// Records for one stop or station: a heading, then one record per
    /// departure. `now_minute` enables the "+N" countdown after each time.
    pub fn service_listing(listing: &ServiceListing, now_minute: Option<u16>) -> Vec<DisplayRecord> {
        let heading = listing
            .stop_number
            .as_deref()
            .unwrap_or(listing.name.as_str());
        let mut records = vec![DisplayRecord::text(Icon::Header, heading)];

        for entry in &listing.times {
            records.push(Self::service_record(entry, now_minute));
        }

        if listing.times.is_empty() {
            records.push(DisplayRecord::text(Icon::Info, Self::NO_SERVICES));
        }
        records
    }

    pub fn service_record(entry: &ServiceEntry, now_minute: Option<u16>) -> DisplayRecord {
        let time = match now_minute {
            Some(now) => Self::annotate_time(entry.time(), now),
            None => entry.time().to_string(),
        };

        let (title, subtitle) = match entry {
            ServiceEntry::Train(train) => {
                let line = match &train.pattern {
                    Some(pattern) if !pattern.is_empty() => format!("{}({})", train.line, pattern),
                    _ => train.line.clone(),
                };
                let title = match &train.platform {
                    Some(platform) => format!("{} P{}", time, platform),
                    None => time,
                };
                let mut subtitle = format!("{} {}", Self::abbreviate_status(&train.status), line);
                if let Some(cars) = train.cars {
                    subtitle.push_str(&format!(" {}car", cars));
                }
                (title, subtitle.trim().to_string())
            }
            ServiceEntry::Bus(bus) => (format!("{} {}", time, bus.route), bus.destination.clone()),
        };

        DisplayRecord::new(StopIdentifier::NONE, title, subtitle, Some(Icon::Info))
    }

    pub fn abbreviate_status(status: &str) -> String {
        status
            .replace(" min", "m")
            .replace(" delay", " dly")
            .replace("On Time", "On time")
    }

    // ========================================================================
    // Countdown annotation
    // ========================================================================

    pub fn minute_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> u16 {
        (now.hour() * 60 + now.minute()) as u16
    }

    /// Minute of day for an "HH:MM" service time.
    pub fn parse_service_time(time: &str) -> Option<u16> {
        let caps = SERVICE_TIME.captures(time.trim())?;
        let hours: u16 = caps[1].parse().ok()?;
        let minutes: u16 = caps[2].parse().ok()?;
        if hours > 23 || minutes > 59 {
            return None;
        }
        Some(hours * 60 + minutes)
    }

    /// Signed minutes from `now` until `service`, both minutes of day.
    ///
    /// A gap of more than half a day is taken to cross midnight. Capped at ±999.
    pub fn countdown_minutes(service: u16, now: u16) -> i32 {
        let mut service = service as i32;
        let mut now = now as i32;

        if service > now + Self::HALF_DAY {
            now += Self::FULL_DAY;
        }
        if now > service + Self::HALF_DAY {
            service += Self::FULL_DAY;
        }

        (service - now).clamp(-Self::MAX_OFFSET, Self::MAX_OFFSET)
    }

    /// "12:34" -> "12:34 +4"; times that do not parse are left alone.
    pub fn annotate_time(time: &str, now: u16) -> String {
        match Self::parse_service_time(time) {
            Some(service) => format!("{} {:+}", time, Self::countdown_minutes(service, now)),
            None => time.to_string(),
        }
    }
}

/// Display surface that prints each record on its own line.
#[derive(Debug, Default)]
pub struct ConsoleTransport;

impl Transport for ConsoleTransport {
    async fn send(&mut self, record: &DisplayRecord) -> Result<()> {
        println!("{}", record);
        Ok(())
    }
}
