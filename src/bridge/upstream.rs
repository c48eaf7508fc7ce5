//! bridge/upstream — адаптеры источников к мосту.
//!
//! - FlowableUpstream   — demand-based источник (`Publisher`): каждый downstream
//!   `request(n)` пробрасывается наверх без изменений.
//! - ObservableUpstream — push-only источник (`ObservableSource`): demand наверх
//!   не идёт, разницу темпов поглощает PagedQueue.
//!
//! Оба варианта сводят on_next/on_error/on_complete к offer/fail/complete моста.

use anyhow::anyhow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use super::drain::Bridge;
use crate::diag;
use crate::flow::{Disposable, Observer, Subscriber, Subscription};

pub(crate) enum Upstream {
    Demand(Arc<dyn Subscription>),
    Push(Arc<dyn Disposable>),
}

impl Upstream {
    fn cancel(&self) {
        match self {
            Upstream::Demand(s) => s.cancel(),
            Upstream::Push(d) => d.dispose(),
        }
    }
}

/// Link to the producer: set once on subscribe, cancelled at most once.
#[derive(Default)]
pub(crate) struct UpstreamLink {
    slot: OnceLock<Upstream>,
    cancelled: AtomicBool,
}

impl UpstreamLink {
    /// Store the upstream handle. A second handle is refused and returned.
    pub(crate) fn set(&self, up: Upstream) -> Result<(), Upstream> {
        self.slot.set(up)?;
        // отмена могла прийти раньше on_subscribe
        if self.cancelled.load(Ordering::Acquire) {
            if let Some(u) = self.slot.get() {
                u.cancel();
            }
        }
        Ok(())
    }

    /// Forward demand (demand-based sources only).
    pub(crate) fn request(&self, n: u64) {
        if let Some(Upstream::Demand(s)) = self.slot.get() {
            s.request(n);
        }
    }

    /// Tell the producer to stop. Idempotent.
    pub(crate) fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(u) = self.slot.get() {
            u.cancel();
        }
    }
}

pub(crate) struct FlowableUpstream<T: Send + 'static>(pub(crate) Arc<Bridge<T>>);

impl<T: Send + 'static> Subscriber<T> for FlowableUpstream<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if let Err(dup) = self.0.attach(Upstream::Demand(subscription)) {
            dup.cancel();
            diag::on_error(anyhow!("upstream subscription already set"));
        }
    }

    fn on_next(&self, item: T) {
        self.0.on_item(item);
    }

    fn on_error(&self, err: anyhow::Error) {
        self.0.on_source_error(err);
    }

    fn on_complete(&self) {
        self.0.on_source_complete();
    }
}

pub(crate) struct ObservableUpstream<T: Send + 'static>(pub(crate) Arc<Bridge<T>>);

impl<T: Send + 'static> Observer<T> for ObservableUpstream<T> {
    fn on_subscribe(&self, d: Arc<dyn Disposable>) {
        if let Err(dup) = self.0.attach(Upstream::Push(d)) {
            dup.cancel();
            diag::on_error(anyhow!("upstream disposable already set"));
        }
    }

    fn on_next(&self, item: T) {
        self.0.on_item(item);
    }

    fn on_error(&self, err: anyhow::Error) {
        self.0.on_source_error(err);
    }

    fn on_complete(&self) {
        self.0.on_source_complete();
    }
}
