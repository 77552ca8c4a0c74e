//! Relay statistics.
//!
//! Relaxed atomic counters, summarized in the log when the relay shuts down.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters shared by every connection of a relay.
#[derive(Debug, Default)]
pub struct RelayStats {
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    messages_received: AtomicU64,
    /// One per subscribed recipient, a message fanned out to 99 members counts 99 times.
    /// Frames a lagging recipient skips are not subtracted.
    messages_relayed: AtomicU64,
    protocol_errors: AtomicU64,
    heartbeat_timeouts: AtomicU64,
}

/// Point in time copy of [RelayStats].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub messages_received: u64,
    pub messages_relayed: u64,
    pub protocol_errors: u64,
    pub heartbeat_timeouts: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_messages_relayed(&self, recipients: usize) {
        self.messages_relayed
            .fetch_add(recipients as u64, Ordering::Relaxed);
    }

    pub fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_heartbeat_timeout(&self) {
        self.heartbeat_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Connections which are currently open.
    pub fn active_connections(&self) -> u64 {
        let snapshot = self.snapshot();

        snapshot
            .connections_opened
            .saturating_sub(snapshot.connections_closed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_relayed: self.messages_relayed.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            heartbeat_timeouts: self.heartbeat_timeouts.load(Ordering::Relaxed),
        }
    }
}
