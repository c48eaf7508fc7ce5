//! page — один сегмент spill-очереди: файл с подряд записанными records.
//!
//! Страница пишется один раз (writer-handle, только append), читается один раз
//! (отдельный reader-handle с собственной позицией), затем удаляется.
//!
//! Публикация между потоками:
//! - writer дописывает запись целиком и только потом делает `written.fetch_add(Release)`;
//! - reader читает не дальше `written.load(Acquire)`;
//! - при rollover writer сначала ставит `next`, затем `sealed.store(Release)`.
//!   Reader, увидев `sealed`, перечитывает `written` и лишь потом переходит на `next`.
//!
//! Разделение по подмодулям:
//! - record.rs  — формат записи [len u32][crc32c u32][payload].
//! - factory.rs — PageFactory (новый пустой файл на каждую страницу).

pub mod factory;
pub mod record;

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::metrics::{record_page_created, record_page_deleted};

pub use factory::{DirPageFactory, PageFactory, PageFile, PAGE_FILE_EXT};
pub use record::{record_len, REC_HDR_SIZE};

pub struct Page {
    id: u64,
    path: PathBuf,
    writer: Mutex<Option<File>>,
    reader: Mutex<Option<File>>,
    written: AtomicU64,
    sealed: AtomicBool,
    next: OnceLock<Arc<Page>>,
    deleted: AtomicBool,
}

impl Page {
    /// Wrap a fresh page file. Opens a second, read-only handle so that the
    /// reader's file position is independent of the writer's.
    pub fn open(id: u64, pf: PageFile) -> Result<Self> {
        let PageFile { path, file } = pf;
        let reader = match OpenOptions::new().read(true).open(&path) {
            Ok(r) => r,
            Err(e) => {
                drop(file);
                let _ = std::fs::remove_file(&path);
                return Err(e).with_context(|| format!("open page reader {}", path.display()));
            }
        };
        record_page_created();
        debug!("page {} created: {}", id, path.display());
        Ok(Self {
            id,
            path,
            writer: Mutex::new(Some(file)),
            reader: Mutex::new(Some(reader)),
            written: AtomicU64::new(0),
            sealed: AtomicBool::new(false),
            next: OnceLock::new(),
            deleted: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes published to the reader.
    #[inline]
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    /// Может ли страница принять запись длиной `rec_len` при soft-ceiling `capacity`.
    /// Пустая страница принимает запись любого размера.
    #[inline]
    pub fn has_room(&self, rec_len: u64, capacity: u64) -> bool {
        let w = self.written.load(Ordering::Relaxed);
        w == 0 || w.saturating_add(rec_len) <= capacity
    }

    /// Append one record (writer side only). Returns bytes written.
    pub fn append(&self, payload: &[u8]) -> Result<u64> {
        let mut guard = self
            .writer
            .lock()
            .map_err(|_| anyhow!("page {} writer handle poisoned", self.id))?;
        let f = guard
            .as_mut()
            .ok_or_else(|| anyhow!("page {} is deleted", self.path.display()))?;
        // хвост после неудачной записи перезаписывается
        f.seek(SeekFrom::Start(self.written.load(Ordering::Relaxed)))?;
        let n = record::write_record(f, payload)
            .with_context(|| format!("append to page {}", self.path.display()))?;
        self.written.fetch_add(n, Ordering::Release);
        Ok(n)
    }

    /// Read the record at `pos` if the writer has published it.
    /// Returns (payload, record length on disk).
    pub fn read_at(&self, pos: u64) -> Result<Option<(Vec<u8>, u64)>> {
        let avail = self.written.load(Ordering::Acquire);
        if pos >= avail {
            return Ok(None);
        }
        let mut guard = self
            .reader
            .lock()
            .map_err(|_| anyhow!("page {} reader handle poisoned", self.id))?;
        let f = guard
            .as_mut()
            .ok_or_else(|| anyhow!("page {} is deleted", self.path.display()))?;
        f.seek(SeekFrom::Start(pos))?;
        let rec = record::read_record(f, avail - pos)
            .with_context(|| format!("read page {} at {}", self.path.display(), pos))?;
        Ok(Some(rec))
    }

    /// Link the successor and seal this page (writer side, once).
    pub fn seal(&self, next: Arc<Page>) {
        if self.next.set(next).is_err() {
            warn!("page {} sealed twice", self.id);
        }
        self.sealed.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    pub fn next(&self) -> Option<&Arc<Page>> {
        self.next.get()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Close both handles and remove the file. Idempotent: returns Ok(false)
    /// if the page was already deleted.
    pub fn delete(&self) -> Result<bool> {
        if self.deleted.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        // handles закрываем и после panic в чужом потоке
        drop(self.writer.lock().unwrap_or_else(|p| p.into_inner()).take());
        drop(self.reader.lock().unwrap_or_else(|p| p.into_inner()).take());
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("remove page {}", self.path.display()))
            }
        }
        record_page_deleted();
        debug!("page {} deleted: {}", self.id, self.path.display());
        Ok(true)
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("written", &self.written.load(Ordering::Relaxed))
            .field("sealed", &self.sealed.load(Ordering::Relaxed))
            .field("deleted", &self.deleted.load(Ordering::Relaxed))
            .finish()
    }
}
