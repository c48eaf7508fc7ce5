//! page/factory — источник новых page-файлов.
//!
//! Каждый вызов `new_page_file` обязан вернуть свежий, пустой файл с
//! уникальным именем. Удалением файла дальше владеет PagedQueue.

use anyhow::{anyhow, Context, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::SpillConfig;

/// Расширение page-файлов.
pub const PAGE_FILE_EXT: &str = "qpg";

/// Свежесозданный page-файл: путь + открытый на запись handle.
#[derive(Debug)]
pub struct PageFile {
    pub path: PathBuf,
    pub file: File,
}

/// Factory of backing files, one per page.
pub trait PageFactory: Send + Sync {
    fn new_page_file(&self) -> Result<PageFile>;
}

impl<F> PageFactory for F
where
    F: Fn() -> Result<PageFile> + Send + Sync,
{
    fn new_page_file(&self) -> Result<PageFile> {
        self()
    }
}

static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Creates page files in a directory:
/// `<dir>/<prefix>-<pid>-<nanos>-<seq>-<rand>.qpg`.
#[derive(Debug, Clone)]
pub struct DirPageFactory {
    dir: PathBuf,
    prefix: String,
    min_free_bytes: u64,
}

impl DirPageFactory {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            prefix: "bufferToFile".to_string(),
            min_free_bytes: 0,
        }
    }

    /// Factory over the system temp dir.
    pub fn temp() -> Self {
        Self::new(std::env::temp_dir())
    }

    pub fn from_config(cfg: &SpillConfig) -> Self {
        let dir = cfg
            .spill_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        Self {
            dir,
            prefix: cfg.file_prefix.clone(),
            min_free_bytes: cfg.min_free_bytes,
        }
    }

    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Refuse to create a page when the filesystem has less free space (0 disables).
    pub fn with_min_free_bytes(mut self, bytes: u64) -> Self {
        self.min_free_bytes = bytes;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn next_path(&self) -> PathBuf {
        use rand::RngCore;
        let pid = std::process::id();
        let t = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
        let salt = rand::thread_rng().next_u32();
        self.dir.join(format!(
            "{}-{}-{}-{}-{:08x}.{}",
            self.prefix, pid, t, seq, salt, PAGE_FILE_EXT
        ))
    }

    fn check_free_space(&self) -> Result<()> {
        if self.min_free_bytes == 0 {
            return Ok(());
        }
        let avail = fs2::available_space(&self.dir)
            .with_context(|| format!("available_space {}", self.dir.display()))?;
        if avail < self.min_free_bytes {
            return Err(anyhow!(
                "not enough free space in {}: {} B available, {} B required",
                self.dir.display(),
                avail,
                self.min_free_bytes
            ));
        }
        Ok(())
    }
}

impl Default for DirPageFactory {
    fn default() -> Self {
        Self::temp()
    }
}

impl PageFactory for DirPageFactory {
    fn new_page_file(&self) -> Result<PageFile> {
        self.check_free_space()?;
        let path = self.next_path();
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("create page file {}", path.display()))?;
        Ok(PageFile { path, file })
    }
}
