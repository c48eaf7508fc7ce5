//! queue — PagedQueue: неограниченная FIFO-очередь закодированных элементов
//! поверх цепочки page-файлов.
//!
//! Контракт доступа (обеспечивается вызывающим кодом, не очередью):
//! - ровно один писатель (`offer`) и ровно один читатель (`poll`/`close`);
//! - писатель и читатель берут разные mutex'ы (tail / head), поэтому `offer`
//!   никогда не ждёт `poll` и наоборот;
//! - registry-mutex берётся только при создании/удалении страниц и на close.
//!
//! Страница, прочитанная до конца и запечатанная (есть преемник), удаляется
//! сразу; остальные удаляются на `close`.

use anyhow::{anyhow, Result};
use log::{debug, trace, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::metrics::{record_offer, record_poll};
use crate::page::{record_len, Page, PageFactory};

struct Tail {
    page: Arc<Page>,
}

struct Head {
    page: Arc<Page>,
    pos: u64,
}

#[derive(Default)]
struct Registry {
    live: VecDeque<Arc<Page>>,
    closed: bool,
}

pub struct PagedQueue {
    factory: Arc<dyn PageFactory>,
    page_size: u64,
    tail: Mutex<Tail>,
    head: Mutex<Head>,
    registry: Mutex<Registry>,
    closed: AtomicBool,
    next_page_id: AtomicU64,
}

impl PagedQueue {
    /// Create the queue and its first (empty) page.
    pub fn new(factory: Arc<dyn PageFactory>, page_size_bytes: usize) -> Result<Self> {
        if page_size_bytes == 0 {
            return Err(anyhow!("page_size_bytes must be > 0"));
        }
        let first = Arc::new(Page::open(0, factory.new_page_file()?)?);
        let mut registry = Registry::default();
        registry.live.push_back(first.clone());
        Ok(Self {
            factory,
            page_size: page_size_bytes as u64,
            tail: Mutex::new(Tail {
                page: first.clone(),
            }),
            head: Mutex::new(Head {
                page: first,
                pos: 0,
            }),
            registry: Mutex::new(registry),
            closed: AtomicBool::new(false),
            next_page_id: AtomicU64::new(1),
        })
    }

    pub fn page_size_bytes(&self) -> usize {
        self.page_size as usize
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Page files currently on disk.
    pub fn live_pages(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .live
            .len()
    }

    /// Append one encoded item (writer side). No-op after `close`.
    pub fn offer(&self, bytes: &[u8]) -> Result<()> {
        if self.is_closed() {
            trace!("offer after close ignored ({} B)", bytes.len());
            return Ok(());
        }
        let rec_len = record_len(bytes.len());
        let mut tail = self
            .tail
            .lock()
            .map_err(|_| anyhow!("paged queue tail poisoned"))?;

        if !tail.page.has_room(rec_len, self.page_size) {
            let next = match self.new_page()? {
                Some(p) => p,
                None => return Ok(()), // closed meanwhile
            };
            debug!(
                "page {} sealed at {} B, rollover to page {}",
                tail.page.id(),
                tail.page.written(),
                next.id()
            );
            tail.page.seal(next.clone());
            tail.page = next;
        }

        match tail.page.append(bytes) {
            Ok(_) => {
                record_offer(bytes.len());
                Ok(())
            }
            Err(_) if self.is_closed() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Next item in FIFO order, or None if nothing is available right now
    /// (reader side). Always None after `close`.
    pub fn poll(&self) -> Result<Option<Vec<u8>>> {
        if self.is_closed() {
            return Ok(None);
        }
        let mut head = self
            .head
            .lock()
            .map_err(|_| anyhow!("paged queue head poisoned"))?;
        loop {
            let rec = match head.page.read_at(head.pos) {
                Ok(r) => r,
                Err(_) if self.is_closed() => return Ok(None),
                Err(e) => return Err(e),
            };
            if let Some((payload, n)) = rec {
                head.pos += n;
                record_poll(payload.len());
                return Ok(Some(payload));
            }
            if !head.page.is_sealed() {
                return Ok(None);
            }
            // sealed: последняя запись могла быть опубликована между read_at и is_sealed
            if head.pos < head.page.written() {
                continue;
            }
            let next = head
                .page
                .next()
                .cloned()
                .ok_or_else(|| anyhow!("page {} sealed without successor", head.page.id()))?;
            let done = std::mem::replace(&mut head.page, next);
            head.pos = 0;
            self.retire(&done)?;
        }
    }

    /// Delete every remaining page file and mark the queue closed. Idempotent.
    /// All pages are attempted; the first deletion error is returned.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let pages: Vec<Arc<Page>> = {
            // файлы удаляем и при отравленном registry
            let mut reg = self.registry.lock().unwrap_or_else(|p| p.into_inner());
            reg.closed = true;
            reg.live.drain(..).collect()
        };
        let mut first_err = None;
        for p in pages {
            if let Err(e) = p.delete() {
                warn!("close: {:#}", e);
                first_err.get_or_insert(e);
            }
        }
        debug!("paged queue closed");
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn new_page(&self) -> Result<Option<Arc<Page>>> {
        let id = self.next_page_id.fetch_add(1, Ordering::Relaxed);
        let page = Arc::new(Page::open(id, self.factory.new_page_file()?)?);
        let mut reg = match self.registry.lock() {
            Ok(g) => g,
            Err(_) => {
                let _ = page.delete();
                return Err(anyhow!("paged queue registry poisoned"));
            }
        };
        if reg.closed {
            drop(reg);
            page.delete()?;
            return Ok(None);
        }
        reg.live.push_back(page.clone());
        Ok(Some(page))
    }

    fn retire(&self, page: &Arc<Page>) -> Result<()> {
        {
            let mut reg = self
                .registry
                .lock()
                .map_err(|_| anyhow!("paged queue registry poisoned"))?;
            if let Some(i) = reg.live.iter().position(|p| p.id() == page.id()) {
                reg.live.remove(i);
            }
        }
        page.delete()?;
        Ok(())
    }
}

impl Drop for PagedQueue {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("paged queue drop: {:#}", e);
        }
    }
}

impl std::fmt::Debug for PagedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedQueue")
            .field("page_size", &self.page_size)
            .field("closed", &self.is_closed())
            .finish()
    }
}
