// Controllers for the Perth Bus Times client
//
// A session reacts to two triggers from the watch:
// - Ready: locate the phone, list nearby train stations then bus stops
// - ServiceRequest: list the next departures at one stop or station
//
// Only one sequence runs at a time. A new trigger abandons whatever the
// current sequence was doing and starts from an empty queue.

use crate::pbt_fetch::{Endpoint, FetchRetry, TransitApi};
use crate::pbt_models::{Location, PBTError, Result, ServiceListing, StopIdentifier, StopInfo, StopNetwork};
use crate::pbt_queue::{DeliveryPump, MessageQueue, Transport};
use crate::pbt_views::PBTViews;
use chrono::Utc;
use chrono_tz::Australia::Perth;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

// ============================================================================
// Location source
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest cached fix the provider may hand back
    pub max_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        PositionOptions {
            high_accuracy: true,
            timeout: Duration::from_secs(60),
            max_age: Duration::from_secs(60),
        }
    }
}

pub trait Geolocator {
    async fn current_position(&mut self, options: &PositionOptions) -> Result<Location>;
}

/// Location source backed by configured coordinates.
#[derive(Debug, Clone, Default)]
pub struct FixedGeolocator {
    location: Option<Location>,
}

impl FixedGeolocator {
    pub fn new(location: Option<Location>) -> Self {
        FixedGeolocator { location }
    }
}

impl Geolocator for FixedGeolocator {
    async fn current_position(&mut self, _options: &PositionOptions) -> Result<Location> {
        self.location
            .ok_or_else(|| PBTError::LocationUnavailable("no coordinates configured".to_string()))
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    Ready,
    ServiceRequest(StopIdentifier),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub ready_delay: Duration,
    pub position: PositionOptions,
    pub stops_fetch: FetchRetry,
    pub services_fetch: FetchRetry,
    /// Skip the train station search and list bus stops only
    pub bus_stops_only: bool,
    /// Append "+N" minutes-to-departure to service times
    pub countdown: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            ready_delay: Duration::from_millis(10),
            position: PositionOptions::default(),
            stops_fetch: FetchRetry::default(),
            services_fetch: FetchRetry::default(),
            bus_stops_only: false,
            countdown: false,
        }
    }
}

pub struct PBTControllers<A, G, T> {
    api: A,
    geolocator: G,
    transport: T,
    settings: SessionSettings,
    queue: MessageQueue,
    pump: DeliveryPump,
}

impl<A: TransitApi, G: Geolocator, T: Transport> PBTControllers<A, G, T> {
    pub fn new(api: A, geolocator: G, transport: T, settings: SessionSettings) -> Self {
        PBTControllers {
            api,
            geolocator,
            transport,
            settings,
            queue: MessageQueue::new(),
            pump: DeliveryPump::new(),
        }
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[cfg(test)]
    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    /// Serve triggers until the channel closes. A trigger arriving while a
    /// sequence is still running cancels that sequence.
    pub async fn run(&mut self, mut triggers: UnboundedReceiver<Trigger>) {
        let mut next = triggers.recv().await;
        while let Some(trigger) = next.take() {
            next = self.run_until_superseded(trigger, &mut triggers).await;
        }
        log::info!("Trigger source closed, session finished");
    }

    async fn run_until_superseded(
        &mut self,
        trigger: Trigger,
        triggers: &mut UnboundedReceiver<Trigger>,
    ) -> Option<Trigger> {
        let mut open = true;
        {
            let sequence = self.handle(trigger);
            tokio::pin!(sequence);

            loop {
                tokio::select! {
                    _ = &mut sequence => break,
                    incoming = triggers.recv(), if open => match incoming {
                        Some(newer) => {
                            log::info!("{:?} arrived, abandoning current sequence", newer);
                            return Some(newer);
                        }
                        None => open = false,
                    },
                }
            }
        }

        if open { triggers.recv().await } else { None }
    }

    /// Run one trigger's sequence to completion. Always ends Idle.
    pub async fn handle(&mut self, trigger: Trigger) {
        log::debug!("Handling {:?}", trigger);
        let outcome = match trigger {
            Trigger::Ready => self.list_stops_nearby().await,
            Trigger::ServiceRequest(identifier) => self.list_services(identifier).await,
        };

        if let Err(e) = outcome {
            log::warn!("Sequence ended early: {}", e);
        }
    }

    async fn list_stops_nearby(&mut self) -> Result<()> {
        tokio::time::sleep(self.settings.ready_delay).await;
        self.send_status(PBTViews::LOCATING).await?;

        let options = self.settings.position;
        let position = match tokio::time::timeout(
            options.timeout,
            self.geolocator.current_position(&options),
        )
        .await
        {
            Ok(Ok(position)) => position,
            Ok(Err(e)) => {
                log::warn!("{}", e);
                return self.send_status(PBTViews::NO_LOCATION).await;
            }
            Err(_) => {
                log::warn!("No position fix within {:?}", options.timeout);
                return self.send_status(PBTViews::NO_LOCATION).await;
            }
        };
        log::info!("Position fix at {}", position);

        self.send_status(PBTViews::FINDING_STOPS).await?;
        // Batches below only land while no newer clear has happened
        let generation = self.queue.clear();

        let networks: &[StopNetwork] = if self.settings.bus_stops_only {
            &[StopNetwork::BusStops]
        } else {
            &[StopNetwork::TrainStations, StopNetwork::BusStops]
        };

        for &network in networks {
            let endpoint = Endpoint::near(network, position);
            match self
                .settings
                .stops_fetch
                .fetch::<_, Vec<StopInfo>>(&self.api, &endpoint)
                .await
            {
                Ok(stops) => {
                    self.queue
                        .extend(generation, PBTViews::stop_listing(network, &position, &stops));
                }
                Err(e) => {
                    log::error!("Stop search failed: {}", e);
                    self.queue.push(generation, PBTViews::no_comms());
                    break;
                }
            }
        }

        self.drain().await
    }

    async fn list_services(&mut self, identifier: StopIdentifier) -> Result<()> {
        self.send_status(PBTViews::FINDING_SERVICES).await?;
        let generation = self.queue.clear();

        let endpoint = Endpoint::services(identifier);
        let records = match self
            .settings
            .services_fetch
            .fetch::<_, ServiceListing>(&self.api, &endpoint)
            .await
        {
            Ok(listing) => {
                log::info!("{} services at {}", listing.times.len(), endpoint.path());
                PBTViews::service_listing(&listing, self.now_minute())
            }
            Err(e) => {
                log::error!("Service lookup failed: {}", e);
                vec![PBTViews::no_comms()]
            }
        };
        self.queue.extend(generation, records);

        self.drain().await
    }

    async fn send_status(&mut self, text: &str) -> Result<()> {
        log::info!("{}", text);
        self.transport.send(&PBTViews::status(text).truncated()).await
    }

    async fn drain(&mut self) -> Result<()> {
        self.pump.drain(&mut self.queue, &mut self.transport).await?;
        Ok(())
    }

    fn now_minute(&self) -> Option<u16> {
        self.settings
            .countdown
            .then(|| PBTViews::minute_of_day(&Utc::now().with_timezone(&Perth)))
    }
}
