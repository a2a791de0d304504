//! Event bus for Spark-World
//!
//! Keeps a bounded history of tick reports and broadcasts each new report to
//! subscribers (narrative and persistence collaborators).

use sparkworld_types::event::{TickEvent, TickReport};
use sparkworld_types::ids::{AgentId, TickId};
use std::collections::{HashMap, VecDeque};
use tokio::sync::broadcast;

/// Capacity of the broadcast channel, in reports
const CHANNEL_CAPACITY: usize = 64;

/// Event bus for publishing and subscribing to tick reports
pub struct EventBus {
    /// Recent reports, oldest first
    history: VecDeque<TickReport>,
    /// Reports retained
    capacity: usize,
    /// Broadcast channel for real-time report distribution
    sender: broadcast::Sender<TickReport>,
    /// Event counters by kind
    event_counts: HashMap<&'static str, u64>,
    /// Events published, lifetime
    total_events: u64,
}

impl EventBus {
    /// Create a new event bus retaining `capacity` reports
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            sender,
            event_counts: HashMap::new(),
            total_events: 0,
        }
    }

    /// Publish a finished report
    pub fn publish(&mut self, report: TickReport) {
        for event in &report.events {
            *self.event_counts.entry(event.kind()).or_insert(0) += 1;
        }
        self.total_events += report.events.len() as u64;

        // Broadcast (ignore errors if no receivers)
        let _ = self.sender.send(report.clone());

        if self.capacity == 0 {
            return;
        }
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(report);
    }

    /// Subscribe to reports (returns a receiver)
    pub fn subscribe(&self) -> broadcast::Receiver<TickReport> {
        self.sender.subscribe()
    }

    /// Retained report for a tick
    pub fn report(&self, tick: TickId) -> Option<&TickReport> {
        self.history.iter().find(|r| r.tick == tick)
    }

    /// Most recent report
    pub fn latest(&self) -> Option<&TickReport> {
        self.history.back()
    }

    /// Retained events involving an agent, oldest first
    pub fn agent_events(&self, agent: &AgentId) -> Vec<&TickEvent> {
        self.history
            .iter()
            .flat_map(|r| r.events.iter())
            .filter(|e| e.involves(agent))
            .collect()
    }

    /// Get event counts by kind
    pub fn event_counts(&self) -> &HashMap<&'static str, u64> {
        &self.event_counts
    }

    /// Get statistics
    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            total_events: self.total_events,
            retained_reports: self.history.len(),
            subscriber_count: self.sender.receiver_count(),
            events_by_kind: self.event_counts.clone(),
        }
    }
}

/// Event bus statistics
#[derive(Clone, Debug)]
pub struct EventBusStats {
    /// Total events published
    pub total_events: u64,
    /// Reports currently retained
    pub retained_reports: usize,
    /// Number of active subscribers
    pub subscriber_count: usize,
    /// Events by kind
    pub events_by_kind: HashMap<&'static str, u64>,
}
