//! Control-surface meter polling
//!
//! Requests `GET_METERS` on a fixed cadence, runs peak hold on both sides
//! and publishes the result on a watch channel for displays.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::meter::{MeterReading, FLOOR_DB};
use super::peak_hold::PeakHold;
use crate::bus::{ControlBus, Query};

/// What a meter display shows
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterDisplay {
    pub input: f32,
    pub output: f32,
    pub input_peak: f32,
    pub output_peak: f32,
    /// Whether the last poll reached a ready processor
    pub connected: bool,
}

impl Default for MeterDisplay {
    fn default() -> Self {
        Self {
            input: FLOOR_DB,
            output: FLOOR_DB,
            input_peak: FLOOR_DB,
            output_peak: FLOOR_DB,
            connected: false,
        }
    }
}

pub struct MeterPoller {
    bus: ControlBus,
    interval: Duration,
    input_peak: PeakHold,
    output_peak: PeakHold,
    tx: watch::Sender<MeterDisplay>,
}

impl MeterPoller {
    pub fn new(
        bus: ControlBus,
        interval: Duration,
        peak_hold: Duration,
    ) -> (Self, watch::Receiver<MeterDisplay>) {
        let (tx, rx) = watch::channel(MeterDisplay::default());
        let poller = Self {
            bus,
            interval,
            input_peak: PeakHold::new(peak_hold),
            output_peak: PeakHold::new(peak_hold),
            tx,
        };
        (poller, rx)
    }

    /// One request/response round trip, stamped at `now`
    pub async fn poll_once(&mut self, now: Instant) -> MeterDisplay {
        let response = self.bus.request(Query::GetMeters).await;
        let reading = match (response.success, response.meters) {
            (true, Some(meters)) => meters,
            _ => MeterReading::floor(),
        };

        let display = MeterDisplay {
            input: reading.input,
            output: reading.output,
            input_peak: self.input_peak.update(reading.input, now),
            output_peak: self.output_peak.update(reading.output, now),
            connected: response.success,
        };
        self.tx.send_replace(display);
        display
    }

    /// Poll until every display receiver is dropped
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if self.tx.is_closed() {
                break;
            }
            self.poll_once(Instant::now()).await;
        }
        debug!("Meter poller stopped");
    }
}
