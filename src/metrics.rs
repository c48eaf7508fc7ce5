//! Lightweight global metrics for QuiverSpill.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - Pages (создание/удаление page-файлов)
//! - Queue (offer/poll)
//! - Bridge (drain passes, подписки)
//! - Diagnostics (ошибки, ушедшие в процессный sink)

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

// ----- Pages -----
static PAGES_CREATED: AtomicU64 = AtomicU64::new(0);
static PAGES_DELETED: AtomicU64 = AtomicU64::new(0);

// ----- Queue -----
static RECORDS_OFFERED: AtomicU64 = AtomicU64::new(0);
static BYTES_OFFERED: AtomicU64 = AtomicU64::new(0);
static RECORDS_POLLED: AtomicU64 = AtomicU64::new(0);
static BYTES_POLLED: AtomicU64 = AtomicU64::new(0);

// ----- Bridge -----
static DRAIN_PASSES: AtomicU64 = AtomicU64::new(0);
static SUBSCRIPTIONS_STARTED: AtomicU64 = AtomicU64::new(0);
static SUBSCRIPTIONS_TERMINATED: AtomicU64 = AtomicU64::new(0);

// ----- Diagnostics -----
static UNDELIVERABLE_ERRORS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    // Pages
    pub pages_created: u64,
    pub pages_deleted: u64,

    // Queue
    pub records_offered: u64,
    pub bytes_offered: u64,
    pub records_polled: u64,
    pub bytes_polled: u64,

    // Bridge
    pub drain_passes: u64,
    pub subscriptions_started: u64,
    pub subscriptions_terminated: u64,

    // Diagnostics
    pub undeliverable_errors: u64,
}

impl MetricsSnapshot {
    /// Page files created but not yet deleted (process-wide).
    pub fn pages_live(&self) -> u64 {
        self.pages_created.saturating_sub(self.pages_deleted)
    }

    /// Records offered but not yet polled (process-wide).
    pub fn backlog_records(&self) -> u64 {
        self.records_offered.saturating_sub(self.records_polled)
    }

    pub fn avg_record_bytes(&self) -> f64 {
        if self.records_offered == 0 {
            0.0
        } else {
            self.bytes_offered as f64 / self.records_offered as f64
        }
    }
}

// ----- Recorders (Pages) -----
pub fn record_page_created() {
    PAGES_CREATED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_page_deleted() {
    PAGES_DELETED.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Queue) -----
pub fn record_offer(payload_len: usize) {
    RECORDS_OFFERED.fetch_add(1, Ordering::Relaxed);
    BYTES_OFFERED.fetch_add(payload_len as u64, Ordering::Relaxed);
}

pub fn record_poll(payload_len: usize) {
    RECORDS_POLLED.fetch_add(1, Ordering::Relaxed);
    BYTES_POLLED.fetch_add(payload_len as u64, Ordering::Relaxed);
}

// ----- Recorders (Bridge) -----
pub fn record_drain_pass() {
    DRAIN_PASSES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_subscription_started() {
    SUBSCRIPTIONS_STARTED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_subscription_terminated() {
    SUBSCRIPTIONS_TERMINATED.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Diagnostics) -----
pub fn record_undeliverable_error() {
    UNDELIVERABLE_ERRORS.fetch_add(1, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        pages_created: PAGES_CREATED.load(Ordering::Relaxed),
        pages_deleted: PAGES_DELETED.load(Ordering::Relaxed),

        records_offered: RECORDS_OFFERED.load(Ordering::Relaxed),
        bytes_offered: BYTES_OFFERED.load(Ordering::Relaxed),
        records_polled: RECORDS_POLLED.load(Ordering::Relaxed),
        bytes_polled: BYTES_POLLED.load(Ordering::Relaxed),

        drain_passes: DRAIN_PASSES.load(Ordering::Relaxed),
        subscriptions_started: SUBSCRIPTIONS_STARTED.load(Ordering::Relaxed),
        subscriptions_terminated: SUBSCRIPTIONS_TERMINATED.load(Ordering::Relaxed),

        undeliverable_errors: UNDELIVERABLE_ERRORS.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    PAGES_CREATED.store(0, Ordering::Relaxed);
    PAGES_DELETED.store(0, Ordering::Relaxed);

    RECORDS_OFFERED.store(0, Ordering::Relaxed);
    BYTES_OFFERED.store(0, Ordering::Relaxed);
    RECORDS_POLLED.store(0, Ordering::Relaxed);
    BYTES_POLLED.store(0, Ordering::Relaxed);

    DRAIN_PASSES.store(0, Ordering::Relaxed);
    SUBSCRIPTIONS_STARTED.store(0, Ordering::Relaxed);
    SUBSCRIPTIONS_TERMINATED.store(0, Ordering::Relaxed);

    UNDELIVERABLE_ERRORS.store(0, Ordering::Relaxed);
}
