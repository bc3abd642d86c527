// Test doubles for the API, the watch link and the location source

use crate::pbt_controllers::{Geolocator, PositionOptions};
use crate::pbt_fetch::{HttpReply, TransitApi};
use crate::pbt_models::{DisplayRecord, Location, PBTError, Result};
use crate::pbt_queue::Transport;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Reply(HttpReply),
    Fail(String),
    Delayed(Duration, Box<ScriptedReply>),
}

impl ScriptedReply {
    pub fn ok(body: &str) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: &str) -> Self {
        ScriptedReply::Reply(HttpReply {
            status,
            body: body.to_string(),
        })
    }

    pub fn fail(reason: &str) -> Self {
        ScriptedReply::Fail(reason.to_string())
    }

    pub fn delayed(delay: Duration, reply: ScriptedReply) -> Self {
        ScriptedReply::Delayed(delay, Box::new(reply))
    }
}

/// Answers requests from a fixed script, in order, and records the paths asked for.
#[derive(Debug, Default)]
pub struct ScriptedApi {
    replies: RefCell<VecDeque<ScriptedReply>>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedApi {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        ScriptedApi {
            replies: RefCell::new(replies.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl TransitApi for ScriptedApi {
    async fn get(&self, path: &str) -> Result<HttpReply> {
        self.calls.borrow_mut().push(path.to_string());
        let mut next = self.replies.borrow_mut().pop_front();

        loop {
            match next {
                Some(ScriptedReply::Reply(reply)) => return Ok(reply),
                Some(ScriptedReply::Fail(reason)) => return Err(PBTError::NetworkError(reason)),
                Some(ScriptedReply::Delayed(delay, reply)) => {
                    tokio::time::sleep(delay).await;
                    next = Some(*reply);
                }
                None => return Err(PBTError::NetworkError("script exhausted".to_string())),
            }
        }
    }
}

/// Keeps every acknowledged record.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub sent: Vec<DisplayRecord>,
    fail_after: Option<usize>,
    delay: Option<Duration>,
}

impl RecordingTransport {
    pub fn failing_after(count: usize) -> Self {
        RecordingTransport {
            fail_after: Some(count),
            ..Default::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        RecordingTransport {
            delay: Some(delay),
            ..Default::default()
        }
    }

    /// Rendered records, e.g. "$Locating" or " 19:00 P7 | On time Midland 4car"
    pub fn lines(&self) -> Vec<String> {
        self.sent.iter().map(|r| r.to_string()).collect()
    }
}

impl Transport for RecordingTransport {
    async fn send(&mut self, record: &DisplayRecord) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_after == Some(self.sent.len()) {
            return Err(PBTError::TransportError("nack".to_string()));
        }
        self.sent.push(record.clone());
        Ok(())
    }
}

/// Never answers within any reasonable timeout.
pub struct SilentGeolocator;

impl Geolocator for SilentGeolocator {
    async fn current_position(&mut self, _options: &PositionOptions) -> Result<Location> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(PBTError::LocationUnavailable("no fix".to_string()))
    }
}
