//! worker — однопоточные исполнители задач для drain-цикла.
//!
//! `Scheduler::create_worker()` выдаёт отдельный `Worker` на каждую подписку.
//! Worker исполняет задачи строго по одной, в порядке FIFO. После `dispose()`
//! новые задачи отбрасываются, а уже поставленные — не исполняются.
//!
//! Реализации:
//! - ThreadScheduler     — отдельный именованный OS-поток на worker (mpsc-канал).
//! - TrampolineScheduler — задачи исполняются на вызывающем потоке; вложенные
//!   schedule() из задачи ставятся в очередь, рекурсии нет. Удобно в тестах.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Worker: Send + Sync {
    fn schedule(&self, task: Task);
    fn dispose(&self);
    fn is_disposed(&self) -> bool;
}

pub trait Scheduler: Send + Sync {
    fn create_worker(&self) -> Result<Arc<dyn Worker>>;
}

// -------------------- ThreadScheduler --------------------

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub struct ThreadScheduler {
    name: String,
}

impl ThreadScheduler {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into() }
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new("qspill-drain")
    }
}

impl Scheduler for ThreadScheduler {
    fn create_worker(&self) -> Result<Arc<dyn Worker>> {
        Ok(Arc::new(ThreadWorker::spawn(&self.name)?))
    }
}

pub struct ThreadWorker {
    tx: Mutex<Option<Sender<Task>>>,
    disposed: Arc<AtomicBool>,
}

impl ThreadWorker {
    pub fn spawn(name: &str) -> Result<Self> {
        let (tx, rx) = channel::<Task>();
        let disposed = Arc::new(AtomicBool::new(false));
        let flag = disposed.clone();
        let id = NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed);
        let thread_name = format!("{}-{}", name, id);
        std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                // выходим, когда все Sender'ы закрыты или worker disposed
                while let Ok(task) = rx.recv() {
                    if flag.load(Ordering::Acquire) {
                        break;
                    }
                    task();
                    if flag.load(Ordering::Acquire) {
                        break;
                    }
                }
                debug!("worker thread exit");
            })
            .with_context(|| format!("spawn worker thread {}", thread_name))?;
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            disposed,
        })
    }
}

impl Worker for ThreadWorker {
    fn schedule(&self, task: Task) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let g = self.tx.lock().unwrap();
        if let Some(tx) = g.as_ref() {
            if tx.send(task).is_err() {
                warn!("schedule on a stopped worker thread");
            }
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        // закрываем канал: поток доработает текущую задачу и выйдет
        drop(self.tx.lock().unwrap().take());
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Drop for ThreadWorker {
    fn drop(&mut self) {
        self.dispose();
    }
}

// -------------------- TrampolineScheduler --------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct TrampolineScheduler;

impl Scheduler for TrampolineScheduler {
    fn create_worker(&self) -> Result<Arc<dyn Worker>> {
        Ok(Arc::new(TrampolineWorker::default()))
    }
}

#[derive(Default)]
pub struct TrampolineWorker {
    queue: Mutex<VecDeque<Task>>,
    running: AtomicBool,
    disposed: AtomicBool,
}

impl Worker for TrampolineWorker {
    fn schedule(&self, task: Task) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        self.queue.lock().unwrap().push_back(task);
        // только первый вход крутит очередь; вложенные вызовы лишь добавляют задачи
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        loop {
            let next = self.queue.lock().unwrap().pop_front();
            match next {
                Some(t) if !self.disposed.load(Ordering::Acquire) => t(),
                Some(_) => continue,
                None => {
                    self.running.store(false, Ordering::Release);
                    // задача могла прийти между pop_front и store(false)
                    if self.queue.lock().unwrap().is_empty()
                        || self.running.swap(true, Ordering::AcqRel)
                    {
                        return;
                    }
                }
            }
        }
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.queue.lock().unwrap().clear();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}
