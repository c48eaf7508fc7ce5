//! source — простые источники поверх итераторов (CLI, тесты, примеры).
//!
//! - IterPublisher  — demand-based: выдаёт ровно столько, сколько запрошено,
//!   синхронно на потоке, вызвавшем request().
//! - IterObservable — push-only: выдаёт всё без оглядки на demand, на потоке
//!   подписчика или на отдельном потоке (`on_thread`), пока не dispose().

use anyhow::anyhow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::flow::{
    add_demand, produced, BooleanDisposable, Disposable, ObservableSource, Observer, Publisher,
    Subscriber, Subscription,
};

type IterFactory<T> = Arc<dyn Fn() -> Box<dyn Iterator<Item = T> + Send> + Send + Sync>;

pub struct IterPublisher<T> {
    factory: IterFactory<T>,
}

impl<T: Send + 'static> IterPublisher<T> {
    pub fn new<F, I>(f: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self {
            factory: Arc::new(move || {
                Box::new(f().into_iter()) as Box<dyn Iterator<Item = T> + Send>
            }),
        }
    }
}

impl<T: Send + 'static> Publisher<T> for IterPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let sub = Arc::new(IterSubscription {
            iter: Mutex::new((self.factory)()),
            child: Mutex::new(Some(subscriber.clone())),
            requested: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
        });
        subscriber.on_subscribe(sub);
    }
}

struct IterSubscription<T> {
    iter: Mutex<Box<dyn Iterator<Item = T> + Send>>,
    // отдаём ссылку на подписчика при cancel/завершении, чтобы разорвать цикл Arc'ов
    child: Mutex<Option<Arc<dyn Subscriber<T>>>>,
    requested: AtomicU64,
    cancelled: AtomicBool,
}

impl<T: Send + 'static> IterSubscription<T> {
    fn emit_loop(&self) {
        let child = match self.child.lock().unwrap().clone() {
            Some(c) => c,
            None => return,
        };
        let mut e = 0u64;
        loop {
            let r = self.requested.load(Ordering::Acquire);
            while e != r {
                if self.cancelled.load(Ordering::Acquire) {
                    return;
                }
                let next = self.iter.lock().unwrap().next();
                match next {
                    Some(v) => {
                        child.on_next(v);
                        e += 1;
                    }
                    None => {
                        self.cancelled.store(true, Ordering::Release);
                        self.child.lock().unwrap().take();
                        child.on_complete();
                        return;
                    }
                }
            }
            if produced(&self.requested, e) == 0 {
                return;
            }
            e = 0;
        }
    }
}

impl<T: Send + 'static> Subscription for IterSubscription<T> {
    fn request(&self, n: u64) {
        if n == 0 {
            crate::diag::on_error(anyhow!("request(0) on iterator source"));
            return;
        }
        // эмитит только тот, кто поднял demand с нуля
        if add_demand(&self.requested, n) == 0 {
            self.emit_loop();
        }
    }

    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.child.lock().unwrap().take();
        }
    }
}

pub struct IterObservable<T> {
    factory: IterFactory<T>,
    on_thread: bool,
}

impl<T: Send + 'static> IterObservable<T> {
    pub fn new<F, I>(f: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self {
            factory: Arc::new(move || {
                Box::new(f().into_iter()) as Box<dyn Iterator<Item = T> + Send>
            }),
            on_thread: false,
        }
    }

    /// Emit from a freshly spawned thread instead of the subscribing one.
    pub fn on_thread(mut self, on: bool) -> Self {
        self.on_thread = on;
        self
    }
}

impl<T: Send + 'static> ObservableSource<T> for IterObservable<T> {
    fn subscribe(&self, observer: Arc<dyn Observer<T>>) {
        let d = Arc::new(BooleanDisposable::new());
        observer.on_subscribe(d.clone());
        let iter = (self.factory)();
        let fallback = observer.clone();
        let run = move || {
            for v in iter {
                if d.is_disposed() {
                    return;
                }
                observer.on_next(v);
            }
            if !d.is_disposed() {
                observer.on_complete();
            }
        };
        if self.on_thread {
            let spawned = std::thread::Builder::new()
                .name("qspill-source".to_string())
                .spawn(run);
            if let Err(e) = spawned {
                fallback.on_error(anyhow!("spawn source thread: {}", e));
            }
        } else {
            drop(fallback);
            run();
        }
    }
}
