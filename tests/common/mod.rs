// tests/common — общие фикстуры интеграционных тестов.
//
// - unique_root / page_files: временные каталоги и подсчёт page-файлов в них;
// - TestSubscriber: записывает все сигналы, умеет ждать терминального события;
// - ManualPush / ManualPublisher: источники, которыми тест управляет вручную;
// - CountingScheduler: считает dispose() у выданных worker'ов.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use QuiverSpill::flow::BooleanDisposable;
use QuiverSpill::worker::Task;
use QuiverSpill::{
    BufferOptions, Codec, DirPageFactory, Disposable, ObservableSource, Observer, Publisher,
    Scheduler, Subscriber, Subscription, Worker,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let root = std::env::temp_dir().join(format!("qspilltest-{prefix}-{pid}-{t}-{id}"));
    std::fs::create_dir_all(&root).expect("create test dir");
    root
}

/// Page files (*.qpg) currently present in `dir`.
pub fn page_files(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Ok(rd) = std::fs::read_dir(dir) {
        for e in rd.flatten() {
            let p = e.path();
            if p.extension().and_then(|s| s.to_str()) == Some("qpg") {
                out.push(p);
            }
        }
    }
    out
}

pub fn options(dir: &Path, page_size: usize, scheduler: Arc<dyn Scheduler>) -> BufferOptions {
    BufferOptions::builder()
        .page_size_bytes(page_size)
        .file_factory(Arc::new(DirPageFactory::new(dir).with_prefix("t")))
        .scheduler(scheduler)
        .build()
        .expect("options")
}

// -------------------- TestSubscriber --------------------

struct Events<T> {
    items: Vec<T>,
    errors: Vec<String>,
    completions: usize,
}

pub struct TestSubscriber<T> {
    initial_request: u64,
    events: Mutex<Events<T>>,
    cv: Condvar,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
    cancel_after: Option<usize>,
}

impl<T: Clone + Send + 'static> TestSubscriber<T> {
    /// `initial_request == 0` means no request on subscribe.
    pub fn new(initial_request: u64) -> Arc<Self> {
        Arc::new(Self {
            initial_request,
            events: Mutex::new(Events {
                items: Vec::new(),
                errors: Vec::new(),
                completions: 0,
            }),
            cv: Condvar::new(),
            subscription: Mutex::new(None),
            cancel_after: None,
        })
    }

    /// Cancels from inside on_next once `n` items have arrived.
    pub fn cancelling_after(initial_request: u64, n: usize) -> Arc<Self> {
        Arc::new(Self {
            initial_request,
            events: Mutex::new(Events {
                items: Vec::new(),
                errors: Vec::new(),
                completions: 0,
            }),
            cv: Condvar::new(),
            subscription: Mutex::new(None),
            cancel_after: Some(n),
        })
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.lock().unwrap().is_some()
    }

    pub fn request(&self, n: u64) {
        let s = self.subscription.lock().unwrap().clone();
        s.expect("subscribed").request(n);
    }

    pub fn cancel(&self) {
        let s = self.subscription.lock().unwrap().clone();
        s.expect("subscribed").cancel();
    }

    pub fn items(&self) -> Vec<T> {
        self.events.lock().unwrap().items.clone()
    }

    pub fn item_count(&self) -> usize {
        self.events.lock().unwrap().items.len()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events.lock().unwrap().errors.clone()
    }

    pub fn completions(&self) -> usize {
        self.events.lock().unwrap().completions
    }

    pub fn is_terminated(&self) -> bool {
        let g = self.events.lock().unwrap();
        g.completions > 0 || !g.errors.is_empty()
    }

    /// Wait for on_complete/on_error. Returns false on timeout.
    pub fn await_terminal(&self, timeout: Duration) -> bool {
        let g = self.events.lock().unwrap();
        let (g, _) = self
            .cv
            .wait_timeout_while(g, timeout, |e| e.completions == 0 && e.errors.is_empty())
            .unwrap();
        g.completions > 0 || !g.errors.is_empty()
    }

    /// Wait until at least `n` items arrived. Returns false on timeout.
    pub fn await_items(&self, n: usize, timeout: Duration) -> bool {
        let g = self.events.lock().unwrap();
        let (g, _) = self
            .cv
            .wait_timeout_while(g, timeout, |e| e.items.len() < n)
            .unwrap();
        g.items.len() >= n
    }
}

impl<T: Clone + Send + 'static> Subscriber<T> for TestSubscriber<T> {
    fn on_subscribe(&self, s: Arc<dyn Subscription>) {
        *self.subscription.lock().unwrap() = Some(s.clone());
        if self.initial_request > 0 {
            s.request(self.initial_request);
        }
    }

    fn on_next(&self, item: T) {
        let n = {
            let mut g = self.events.lock().unwrap();
            g.items.push(item);
            g.items.len()
        };
        self.cv.notify_all();
        if self.cancel_after == Some(n) {
            self.cancel();
        }
    }

    fn on_error(&self, err: anyhow::Error) {
        self.events.lock().unwrap().errors.push(format!("{:#}", err));
        self.cv.notify_all();
    }

    fn on_complete(&self) {
        self.events.lock().unwrap().completions += 1;
        self.cv.notify_all();
    }
}

// -------------------- ManualPush (push-only) --------------------

pub struct ManualPush<T> {
    observer: Mutex<Option<Arc<dyn Observer<T>>>>,
    disposable: Arc<BooleanDisposable>,
}

impl<T: Send + 'static> ManualPush<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            observer: Mutex::new(None),
            disposable: Arc::new(BooleanDisposable::new()),
        })
    }

    fn obs(&self) -> Arc<dyn Observer<T>> {
        self.observer.lock().unwrap().clone().expect("subscribed")
    }

    pub fn emit(&self, v: T) {
        self.obs().on_next(v);
    }

    pub fn error(&self, msg: &str) {
        self.obs().on_error(anyhow!("{}", msg));
    }

    pub fn complete(&self) {
        self.obs().on_complete();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposable.is_disposed()
    }
}

impl<T: Send + 'static> ObservableSource<T> for ManualPush<T> {
    fn subscribe(&self, observer: Arc<dyn Observer<T>>) {
        *self.observer.lock().unwrap() = Some(observer.clone());
        observer.on_subscribe(self.disposable.clone());
    }
}

// -------------------- ManualPublisher (demand-based) --------------------

#[derive(Default)]
pub struct UpstreamRecorder {
    pub requests: Mutex<Vec<u64>>,
    pub cancelled: AtomicBool,
}

impl Subscription for UpstreamRecorder {
    fn request(&self, n: u64) {
        self.requests.lock().unwrap().push(n);
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

pub struct ManualPublisher<T> {
    subscriber: Mutex<Option<Arc<dyn Subscriber<T>>>>,
    pub recorder: Arc<UpstreamRecorder>,
}

impl<T: Send + 'static> ManualPublisher<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscriber: Mutex::new(None),
            recorder: Arc::new(UpstreamRecorder::default()),
        })
    }

    fn sub(&self) -> Arc<dyn Subscriber<T>> {
        self.subscriber.lock().unwrap().clone().expect("subscribed")
    }

    pub fn emit(&self, v: T) {
        self.sub().on_next(v);
    }

    pub fn error(&self, msg: &str) {
        self.sub().on_error(anyhow!("{}", msg));
    }

    pub fn complete(&self) {
        self.sub().on_complete();
    }

    /// Calls on_subscribe a second time (protocol violation).
    pub fn resubscribe(&self, extra: Arc<dyn Subscription>) {
        self.sub().on_subscribe(extra);
    }

    pub fn requests(&self) -> Vec<u64> {
        self.recorder.requests.lock().unwrap().clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.recorder.cancelled.load(Ordering::Acquire)
    }
}

impl<T: Send + 'static> Publisher<T> for ManualPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        *self.subscriber.lock().unwrap() = Some(subscriber.clone());
        subscriber.on_subscribe(self.recorder.clone());
    }
}

// -------------------- CountingScheduler --------------------

pub struct CountingScheduler {
    inner: Arc<dyn Scheduler>,
    pub workers: AtomicUsize,
    pub disposals: Arc<AtomicUsize>,
}

impl CountingScheduler {
    pub fn new(inner: Arc<dyn Scheduler>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            workers: AtomicUsize::new(0),
            disposals: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::Acquire)
    }
}

impl Scheduler for CountingScheduler {
    fn create_worker(&self) -> Result<Arc<dyn Worker>> {
        self.workers.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(CountingWorker {
            inner: self.inner.create_worker()?,
            disposals: self.disposals.clone(),
        }))
    }
}

struct CountingWorker {
    inner: Arc<dyn Worker>,
    disposals: Arc<AtomicUsize>,
}

impl Worker for CountingWorker {
    fn schedule(&self, task: Task) {
        self.inner.schedule(task);
    }

    fn dispose(&self) {
        self.disposals.fetch_add(1, Ordering::AcqRel);
        self.inner.dispose();
    }

    fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }
}

// -------------------- codecs --------------------

/// u64 as 8 LE bytes; decoding `poison` fails.
pub struct U64Codec {
    pub poison: Option<u64>,
}

impl Codec<u64> for U64Codec {
    fn encode(&self, item: &u64) -> Result<Vec<u8>> {
        Ok(item.to_le_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<u64> {
        let arr: [u8; 8] = bytes
            .try_into()
            .map_err(|_| anyhow!("bad u64 record: {} bytes", bytes.len()))?;
        let v = u64::from_le_bytes(arr);
        if self.poison == Some(v) {
            return Err(anyhow!("poisoned record {}", v));
        }
        Ok(v)
    }
}

/// Encoding fails for `poison`.
pub struct FailingEncodeCodec {
    pub poison: u64,
}

impl Codec<u64> for FailingEncodeCodec {
    fn encode(&self, item: &u64) -> Result<Vec<u8>> {
        if *item == self.poison {
            return Err(anyhow!("cannot encode {}", item));
        }
        Ok(item.to_le_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<u64> {
        U64Codec { poison: None }.decode(bytes)
    }
}
