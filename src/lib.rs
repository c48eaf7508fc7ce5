#![allow(non_snake_case)]

// Базовые модули
pub mod config;
pub mod metrics;
pub mod diag;

// Хранилище: page-файлы и очередь поверх них
pub mod page;   // src/page/{mod,record,factory}.rs
pub mod queue;  // src/queue.rs

// Протоколы потоков, codec, исполнители
pub mod flow;
pub mod codec;
pub mod worker;
pub mod source; // итераторные источники для CLI/тестов

// Оператор buffer-to-file (drain state machine + адаптеры источников)
pub mod bridge; // src/bridge/{mod,drain,state,upstream}.rs

// Удобные реэкспорты
pub use bridge::BufferToFile;
pub use codec::{BytesCodec, Codec, JsonCodec, Utf8Codec};
pub use config::{BufferOptions, BufferOptionsBuilder, SpillConfig};
pub use flow::{
    Disposable, ObservableSource, Observer, Publisher, Subscriber, Subscription, UNBOUNDED,
};
pub use page::{DirPageFactory, PageFactory, PageFile};
pub use queue::PagedQueue;
pub use source::{IterObservable, IterPublisher};
pub use worker::{Scheduler, ThreadScheduler, TrampolineScheduler, Worker};
