//! bridge/drain — drain state machine между источником и consumer'ом.
//!
//! Входы (с потока источника и с потока consumer'а, возможно одновременно):
//! item / complete / error / request(n) / cancel. Каждый вход делает
//! `wip.fetch_add(1)`; только тот, кто сдвинул wip с нуля, ставит drain-задачу
//! на worker. Остальные лишь гарантируют, что их вход увидит текущий или
//! следующий проход (trampoline). Блокировок на горячем пути нет.
//!
//! Всё чтение очереди, decode и вызовы on_next/on_error/on_complete идут
//! только с worker-потока. Закрытие очереди — тоже только отсюда: поток,
//! читающий page-файлы, их же и удаляет.

use anyhow::anyhow;
use log::{debug, trace};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::state::{Terminal, TerminalState};
use super::upstream::{Upstream, UpstreamLink};
use crate::codec::Codec;
use crate::diag;
use crate::flow::{add_demand, produced, Subscriber, Subscription};
use crate::metrics::{record_drain_pass, record_subscription_started, record_subscription_terminated};
use crate::queue::PagedQueue;
use crate::worker::Worker;

pub(crate) struct Bridge<T: Send + 'static> {
    me: Weak<Bridge<T>>,
    child: Arc<dyn Subscriber<T>>,
    queue: PagedQueue,
    codec: Arc<dyn Codec<T>>,
    worker: Arc<dyn Worker>,
    upstream: UpstreamLink,
    requested: AtomicU64,
    wip: AtomicU64,
    state: TerminalState,
    released: AtomicBool,
}

impl<T: Send + 'static> Bridge<T> {
    pub(crate) fn new(
        child: Arc<dyn Subscriber<T>>,
        queue: PagedQueue,
        codec: Arc<dyn Codec<T>>,
        worker: Arc<dyn Worker>,
    ) -> Arc<Self> {
        record_subscription_started();
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            child,
            queue,
            codec,
            worker,
            upstream: UpstreamLink::default(),
            requested: AtomicU64::new(0),
            wip: AtomicU64::new(0),
            state: TerminalState::default(),
            released: AtomicBool::new(false),
        })
    }

    // -------------------- producer side --------------------

    /// Store the upstream handle and expose the bridge to the consumer.
    pub(crate) fn attach(&self, up: Upstream) -> Result<(), Upstream> {
        self.upstream.set(up)?;
        if let Some(me) = self.me.upgrade() {
            self.child.on_subscribe(me);
        }
        Ok(())
    }

    pub(crate) fn on_item(&self, item: T) {
        if self.state.load() != Terminal::Running {
            trace!("item after terminal state dropped");
            return;
        }
        let res = self
            .codec
            .encode(&item)
            .and_then(|bytes| self.queue.offer(&bytes));
        match res {
            Ok(()) => self.schedule_drain(),
            Err(e) => {
                // источник не знает об ошибке: останавливаем его сразу
                self.upstream.cancel();
                self.on_source_error(e);
            }
        }
    }

    pub(crate) fn on_source_error(&self, err: anyhow::Error) {
        match self.state.fail(err) {
            Ok(()) => self.schedule_drain(),
            Err(late) => diag::on_error(late),
        }
    }

    pub(crate) fn on_source_complete(&self) {
        if self.state.complete() {
            self.schedule_drain();
        }
    }

    // -------------------- drain --------------------

    fn schedule_drain(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) == 0 {
            if let Some(me) = self.me.upgrade() {
                self.worker.schedule(Box::new(move || me.drain()));
            }
        }
    }

    fn drain(&self) {
        let mut missed = 1u64;
        loop {
            record_drain_pass();
            // отмену проверяем до demand: закрыть очередь нужно и при нулевом request
            if self.state.load() == Terminal::Cancelled {
                self.release();
                return;
            }

            let r = self.requested.load(Ordering::Acquire);
            let mut e = 0u64;
            while e != r {
                let is_done = match self.state.load() {
                    Terminal::Cancelled => {
                        self.release();
                        return;
                    }
                    Terminal::Terminated => return,
                    Terminal::Failed => {
                        // ошибка важнее backlog'а: оставшиеся элементы не доставляются
                        let err = self
                            .state
                            .take_error()
                            .unwrap_or_else(|| anyhow!("source failed"));
                        self.release();
                        self.child.on_error(err);
                        return;
                    }
                    Terminal::Completed => true,
                    Terminal::Running => false,
                };

                let next = self
                    .queue
                    .poll()
                    .and_then(|rec| rec.map(|b| self.codec.decode(&b)).transpose());
                match next {
                    Ok(Some(item)) => {
                        self.child.on_next(item);
                        e += 1;
                    }
                    Ok(None) if is_done => {
                        self.release();
                        self.child.on_complete();
                        return;
                    }
                    Ok(None) => break,
                    Err(err) => {
                        let was_cancelled = self.state.load() == Terminal::Cancelled;
                        self.release();
                        if was_cancelled {
                            diag::on_error(err);
                        } else {
                            self.child.on_error(err);
                        }
                        return;
                    }
                }
            }

            if e > 0 {
                produced(&self.requested, e);
            }
            missed = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
            if missed == 0 {
                return;
            }
        }
    }

    /// Final teardown, exactly once: stop the producer, delete page files,
    /// dispose the worker.
    fn release(&self) {
        let prev = self.state.terminate();
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if prev == Terminal::Cancelled {
            if let Some(e) = self.state.take_error() {
                debug!("source failure discarded after cancel: {:#}", e);
            }
        }
        self.upstream.cancel();
        if let Err(e) = self.queue.close() {
            diag::on_error(e.context("close paged queue"));
        }
        self.worker.dispose();
        record_subscription_terminated();
        debug!("bridge released (was {:?})", prev);
    }
}

impl<T: Send + 'static> Subscription for Bridge<T> {
    fn request(&self, n: u64) {
        if n == 0 {
            diag::on_error(anyhow!("request(n) called with n == 0; n must be positive"));
            return;
        }
        add_demand(&self.requested, n);
        if matches!(self.state.load(), Terminal::Running | Terminal::Completed) {
            self.upstream.request(n);
        }
        self.schedule_drain();
    }

    fn cancel(&self) {
        if self.state.cancel() {
            self.upstream.cancel();
            // очередь закрывается на worker-потоке
            self.schedule_drain();
        }
    }
}
