//! bridge — оператор "buffer to file": быстрый источник → PagedQueue → медленный consumer.
//!
//! Разделение:
//! - drain.rs    — Bridge: trampoline drain-цикл, учёт demand, терминальные сигналы.
//! - state.rs    — терминальное состояние одним атомарным тегом.
//! - upstream.rs — адаптеры demand-based / push-only источников.
//!
//! На каждую подписку создаются своя PagedQueue, свой worker и свой Bridge.
//!
//! Пример:
//!   let op = BufferToFile::from_publisher(source, BufferOptions::builder().build()?, Utf8Codec);
//!   op.subscribe(consumer);

mod drain;
mod state;
mod upstream;

pub use state::Terminal;

use std::sync::Arc;

use crate::codec::Codec;
use crate::config::BufferOptions;
use crate::flow::{EmptySubscription, ObservableSource, Publisher, Subscriber};
use crate::queue::PagedQueue;

use drain::Bridge;
use upstream::{FlowableUpstream, ObservableUpstream};

enum Source<T> {
    Flowable(Arc<dyn Publisher<T>>),
    Observable(Arc<dyn ObservableSource<T>>),
}

impl<T> Clone for Source<T> {
    fn clone(&self) -> Self {
        match self {
            Source::Flowable(p) => Source::Flowable(p.clone()),
            Source::Observable(o) => Source::Observable(o.clone()),
        }
    }
}

/// Publisher that buffers its source to disk and replays it on demand.
pub struct BufferToFile<T> {
    source: Source<T>,
    options: BufferOptions,
    codec: Arc<dyn Codec<T>>,
}

impl<T> Clone for BufferToFile<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            options: self.options.clone(),
            codec: self.codec.clone(),
        }
    }
}

impl<T: Send + 'static> BufferToFile<T> {
    /// Demand-based source: downstream requests are forwarded upstream.
    pub fn from_publisher<C>(source: Arc<dyn Publisher<T>>, options: BufferOptions, codec: C) -> Self
    where
        C: Codec<T> + 'static,
    {
        Self {
            source: Source::Flowable(source),
            options,
            codec: Arc::new(codec),
        }
    }

    /// Push-only source: the queue absorbs the whole rate mismatch.
    pub fn from_observable<C>(
        source: Arc<dyn ObservableSource<T>>,
        options: BufferOptions,
        codec: C,
    ) -> Self
    where
        C: Codec<T> + 'static,
    {
        Self {
            source: Source::Observable(source),
            options,
            codec: Arc::new(codec),
        }
    }

    pub fn options(&self) -> &BufferOptions {
        &self.options
    }
}

impl<T: Send + 'static> Publisher<T> for BufferToFile<T> {
    fn subscribe(&self, child: Arc<dyn Subscriber<T>>) {
        let queue = match PagedQueue::new(
            self.options.file_factory(),
            self.options.page_size_bytes(),
        ) {
            Ok(q) => q,
            Err(e) => {
                child.on_subscribe(Arc::new(EmptySubscription));
                child.on_error(e.context("create paged queue"));
                return;
            }
        };
        let worker = match self.options.scheduler().create_worker() {
            Ok(w) => w,
            Err(e) => {
                drop(queue);
                child.on_subscribe(Arc::new(EmptySubscription));
                child.on_error(e.context("create drain worker"));
                return;
            }
        };

        let bridge = Bridge::new(child, queue, self.codec.clone(), worker);
        match &self.source {
            Source::Flowable(p) => p.subscribe(Arc::new(FlowableUpstream(bridge))),
            Source::Observable(o) => o.subscribe(Arc::new(ObservableUpstream(bridge))),
        }
    }
}
