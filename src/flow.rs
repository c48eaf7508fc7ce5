//! flow — протоколы потоков, которые связывает мост.
//!
//! Два вида источников:
//! - demand-based: `Publisher` → `Subscriber`, управление через `Subscription`
//!   (`request(n)` / `cancel()`);
//! - push-only: `ObservableSource` → `Observer`, управление только `Disposable::dispose()`.
//!
//! Downstream моста всегда demand-based: мост сам является `Subscription` для
//! своего `Subscriber`.
//!
//! Плюс арифметика demand: счётчик насыщается в `UNBOUNDED`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Demand sentinel meaning "no limit".
pub const UNBOUNDED: u64 = u64::MAX;

pub trait Subscription: Send + Sync {
    /// Authorize `n` more items (`n > 0`; `UNBOUNDED` lifts the limit).
    fn request(&self, n: u64);
    fn cancel(&self);
}

pub trait Subscriber<T>: Send + Sync {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>);
    fn on_next(&self, item: T);
    fn on_error(&self, err: anyhow::Error);
    fn on_complete(&self);
}

pub trait Publisher<T>: Send + Sync {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>);
}

pub trait Disposable: Send + Sync {
    fn dispose(&self);
    fn is_disposed(&self) -> bool;
}

pub trait Observer<T>: Send + Sync {
    fn on_subscribe(&self, d: Arc<dyn Disposable>);
    fn on_next(&self, item: T);
    fn on_error(&self, err: anyhow::Error);
    fn on_complete(&self);
}

pub trait ObservableSource<T>: Send + Sync {
    fn subscribe(&self, observer: Arc<dyn Observer<T>>);
}

/// Subscription that ignores everything (handed out before an immediate error).
#[derive(Debug, Default)]
pub struct EmptySubscription;

impl Subscription for EmptySubscription {
    fn request(&self, _n: u64) {}
    fn cancel(&self) {}
}

/// Flag-only disposable.
#[derive(Debug, Default)]
pub struct BooleanDisposable {
    disposed: AtomicBool,
}

impl BooleanDisposable {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Disposable for BooleanDisposable {
    fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

// -------------------- demand arithmetic --------------------

/// Saturating add in demand space.
#[inline]
fn add_cap(a: u64, b: u64) -> u64 {
    a.saturating_add(b)
}

/// Atomically add `n` to the demand counter. Returns the previous value.
pub fn add_demand(requested: &AtomicU64, n: u64) -> u64 {
    match requested.fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
        if cur == UNBOUNDED {
            None
        } else {
            Some(add_cap(cur, n))
        }
    }) {
        Ok(prev) => prev,
        Err(prev) => prev,
    }
}

/// Atomically subtract `n` delivered items. Unbounded demand stays unbounded.
/// Returns the new value.
pub fn produced(requested: &AtomicU64, n: u64) -> u64 {
    match requested.fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
        if cur == UNBOUNDED {
            None
        } else {
            Some(cur.saturating_sub(n))
        }
    }) {
        Ok(prev) => prev.saturating_sub(n),
        Err(_) => UNBOUNDED,
    }
}
