//! Service counters.
//!
//! Atomic counters updated from logic and I/O threads alike. Instances are
//! owned by a [`Runtime`](crate::runtime::Runtime) or a standalone service
//! and shared through `Arc`; there is no process-global collector.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Metrics {
    /// Inbound blocks accepted onto a service queue
    pub blocks_received: AtomicU64,
    /// Packets successfully decoded by a protocol stack
    pub packets_decoded: AtomicU64,
    /// Frames rejected by a protocol layer
    pub decode_errors: AtomicU64,
    /// Packets encoded and queued for the I/O side
    pub packets_sent: AtomicU64,
    /// Raw inbound bytes
    pub bytes_received: AtomicU64,
    /// Encoded outbound bytes
    pub bytes_sent: AtomicU64,
    /// Completed update ticks
    pub ticks: AtomicU64,
    /// Ticks that found no work
    pub idle_ticks: AtomicU64,
    /// Timer callbacks fired
    pub timers_fired: AtomicU64,
    /// Facade callbacks that failed or panicked
    pub facade_errors: AtomicU64,
    /// Sampler copies dropped because the sampler queue was full
    pub sampler_dropped: AtomicU64,
    /// Connections closed because of a fatal protocol error
    pub sessions_dropped: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            blocks_received: AtomicU64::new(0),
            packets_decoded: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            idle_ticks: AtomicU64::new(0),
            timers_fired: AtomicU64::new(0),
            facade_errors: AtomicU64::new(0),
            sampler_dropped: AtomicU64::new(0),
            sessions_dropped: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn block_received(&self, byte_count: usize) {
        self.blocks_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(byte_count as u64, Ordering::Relaxed);
    }

    pub fn packet_decoded(&self) {
        self.packets_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_sent(&self, byte_count: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent
            .fetch_add(byte_count as u64, Ordering::Relaxed);
    }

    pub fn tick(&self, idle: bool) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        if idle {
            self.idle_ticks.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn timer_fired(&self) {
        self.timers_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn facade_error(&self) {
        self.facade_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sampler_drop(&self) {
        self.sampler_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_dropped(&self) {
        self.sessions_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            blocks_received: self.blocks_received.load(Ordering::Relaxed),
            packets_decoded: self.packets_decoded.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            idle_ticks: self.idle_ticks.load(Ordering::Relaxed),
            timers_fired: self.timers_fired.load(Ordering::Relaxed),
            facade_errors: self.facade_errors.load(Ordering::Relaxed),
            sampler_dropped: self.sampler_dropped.load(Ordering::Relaxed),
            sessions_dropped: self.sessions_dropped.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn log_metrics(&self, service: &str) {
        let s = self.snapshot();
        info!(
            service,
            blocks_received = s.blocks_received,
            packets_decoded = s.packets_decoded,
            decode_errors = s.decode_errors,
            packets_sent = s.packets_sent,
            bytes_received = s.bytes_received,
            bytes_sent = s.bytes_sent,
            ticks = s.ticks,
            idle_ticks = s.idle_ticks,
            timers_fired = s.timers_fired,
            facade_errors = s.facade_errors,
            sampler_dropped = s.sampler_dropped,
            sessions_dropped = s.sessions_dropped,
            uptime_seconds = s.uptime_seconds,
            "Service metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub blocks_received: u64,
    pub packets_decoded: u64,
    pub decode_errors: u64,
    pub packets_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub ticks: u64,
    pub idle_ticks: u64,
    pub timers_fired: u64,
    pub facade_errors: u64,
    pub sampler_dropped: u64,
    pub sessions_dropped: u64,
    pub uptime_seconds: u64,
}

/// Logs the elapsed time of a scope at debug level when dropped.
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!(
            operation = self.operation,
            duration_us = self.start.elapsed().as_micros() as u64,
            "Operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let m = Metrics::new();
        m.block_received(10);
        m.block_received(5);
        m.packet_sent(7);
        m.tick(true);
        m.tick(false);
        let s = m.snapshot();
        assert_eq!(s.blocks_received, 2);
        assert_eq!(s.bytes_received, 15);
        assert_eq!(s.packets_sent, 1);
        assert_eq!(s.bytes_sent, 7);
        assert_eq!(s.ticks, 2);
        assert_eq!(s.idle_ticks, 1);
    }

    #[test]
    fn test_scope_timer_records_operation() {
        let timer = Timer::start("unit");
        assert_eq!(timer.operation, "unit");
        assert!(timer.start.elapsed() < std::time::Duration::from_secs(5));
    }
}
