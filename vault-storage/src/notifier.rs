// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use core_types::{Address, ContentAddress};
use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const BYTES_PER_MIB: f64 = (1u64 << 20) as f64;
const CHANNEL_CAPACITY: usize = 256;

/// Announcement of a newly stored object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEvent {
    pub address: Address,
    pub content_address: ContentAddress,
    pub date: DateTime<Utc>,
    pub size_bytes: u64,
    /// Tokens per hour at one token per MiB per settlement period.
    pub hourly_cost: f64,
}

/// Fire-and-forget fan-out of upload events plus a bounded history of the latest ones.
pub struct UploadNotifier {
    sender: broadcast::Sender<UploadEvent>,
    recent: Mutex<VecDeque<UploadEvent>>,
    history: usize,
    period_hours: f64,
}

impl UploadNotifier {
    pub fn new(history: usize, period_hours: f64) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let history = history.max(1);
        Self {
            sender,
            recent: Mutex::new(VecDeque::with_capacity(history)),
            history,
            period_hours,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.sender.subscribe()
    }

    pub fn event(
        &self,
        address: Address,
        content_address: ContentAddress,
        date: DateTime<Utc>,
        size_bytes: u64,
    ) -> UploadEvent {
        UploadEvent {
            address,
            content_address,
            date,
            size_bytes,
            hourly_cost: hourly_cost(size_bytes, self.period_hours),
        }
    }

    /// Records and broadcasts `event`. Never waits on subscribers.
    pub fn publish(&self, event: UploadEvent) {
        {
            let mut recent = self.recent.lock();
            if recent.len() == self.history {
                recent.pop_front();
            }
            recent.push_back(event.clone());
        }
        match self.sender.send(event) {
            Ok(receivers) => debug!("upload event delivered to {} subscribers", receivers),
            Err(_) => debug!("upload event recorded with no subscribers"),
        }
    }

    /// Latest events, oldest first.
    pub fn recent(&self) -> Vec<UploadEvent> {
        self.recent.lock().iter().cloned().collect()
    }
}

pub fn hourly_cost(size_bytes: u64, period_hours: f64) -> f64 {
    if period_hours <= 0.0 {
        return 0.0;
    }
    size_bytes as f64 / BYTES_PER_MIB / period_hours
}
