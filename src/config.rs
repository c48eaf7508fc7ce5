//! Centralized configuration and builder for QuiverSpill.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - SpillConfig::from_env() reads QS_* env vars on top of the defaults.
//! - BufferOptionsBuilder turns a SpillConfig into runtime collaborators
//!   (page factory + scheduler) consumed by BufferToFile.
//!
//! Defaults:
//! - page_size_bytes = 20 MiB (soft ceiling per page file)
//! - spill_dir = None (system temp dir)
//! - file_prefix = "bufferToFile"
//! - min_free_bytes = 0 (free space check disabled)
//! - worker_thread_name = "qspill-drain"
//!   All of the above can be overridden via ENV or builder.

use anyhow::{anyhow, Result};
use std::fmt;
use std::sync::Arc;

use crate::page::{DirPageFactory, PageFactory};
use crate::worker::{Scheduler, ThreadScheduler};

pub const DEFAULT_PAGE_SIZE_BYTES: usize = 20 * 1024 * 1024;

/// Static configuration (no runtime collaborators).
#[derive(Clone, Debug)]
pub struct SpillConfig {
    /// Soft ceiling of one page file in bytes.
    /// Env: QS_PAGE_SIZE_BYTES (default 20 MiB)
    pub page_size_bytes: usize,

    /// Directory for page files. None → std::env::temp_dir().
    /// Env: QS_SPILL_DIR
    pub spill_dir: Option<String>,

    /// Page file name prefix.
    /// Env: QS_FILE_PREFIX (default "bufferToFile")
    pub file_prefix: String,

    /// Refuse to create a page if the filesystem has less free space (0 disables).
    /// Env: QS_MIN_FREE_BYTES (default 0)
    pub min_free_bytes: u64,

    /// Name prefix of dedicated drain threads.
    /// Env: QS_WORKER_NAME (default "qspill-drain")
    pub worker_thread_name: String,
}

impl Default for SpillConfig {
    fn default() -> Self {
        Self {
            page_size_bytes: DEFAULT_PAGE_SIZE_BYTES,
            spill_dir: None,
            file_prefix: "bufferToFile".to_string(),
            min_free_bytes: 0,
            worker_thread_name: "qspill-drain".to_string(),
        }
    }
}

impl SpillConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("QS_PAGE_SIZE_BYTES") {
            if let Ok(n) = v.trim().parse::<usize>() {
                if n > 0 {
                    cfg.page_size_bytes = n;
                }
            }
        }

        if let Ok(v) = std::env::var("QS_SPILL_DIR") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.spill_dir = Some(s.to_string());
            }
        }

        if let Ok(v) = std::env::var("QS_FILE_PREFIX") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.file_prefix = s.to_string();
            }
        }

        if let Ok(v) = std::env::var("QS_MIN_FREE_BYTES") {
            if let Ok(n) = v.trim().parse::<u64>() {
                cfg.min_free_bytes = n;
            }
        }

        if let Ok(v) = std::env::var("QS_WORKER_NAME") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.worker_thread_name = s.to_string();
            }
        }

        cfg
    }

    pub fn with_page_size_bytes(mut self, bytes: usize) -> Self {
        self.page_size_bytes = bytes;
        self
    }

    pub fn with_spill_dir<S: Into<String>>(mut self, dir: Option<S>) -> Self {
        self.spill_dir = dir.map(Into::into);
        self
    }

    pub fn with_file_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn with_min_free_bytes(mut self, bytes: u64) -> Self {
        self.min_free_bytes = bytes;
        self
    }

    pub fn with_worker_thread_name<S: Into<String>>(mut self, name: S) -> Self {
        self.worker_thread_name = name.into();
        self
    }
}

impl fmt::Display for SpillConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SpillConfig {{ \
             page_size_bytes: {}, \
             spill_dir: {}, \
             file_prefix: {}, \
             min_free_bytes: {}, \
             worker_thread_name: {} \
             }}",
            self.page_size_bytes,
            self.spill_dir
                .as_deref()
                .unwrap_or("default(temp_dir)"),
            self.file_prefix,
            self.min_free_bytes,
            self.worker_thread_name,
        )
    }
}

/// Runtime options of one BufferToFile operator.
#[derive(Clone)]
pub struct BufferOptions {
    page_size_bytes: usize,
    file_factory: Arc<dyn PageFactory>,
    scheduler: Arc<dyn Scheduler>,
}

impl BufferOptions {
    /// Builder seeded from env (`SpillConfig::from_env`).
    pub fn builder() -> BufferOptionsBuilder {
        BufferOptionsBuilder::new()
    }

    pub fn page_size_bytes(&self) -> usize {
        self.page_size_bytes
    }

    pub fn file_factory(&self) -> Arc<dyn PageFactory> {
        self.file_factory.clone()
    }

    pub fn scheduler(&self) -> Arc<dyn Scheduler> {
        self.scheduler.clone()
    }
}

impl fmt::Debug for BufferOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferOptions")
            .field("page_size_bytes", &self.page_size_bytes)
            .finish_non_exhaustive()
    }
}

pub struct BufferOptionsBuilder {
    cfg: SpillConfig,
    file_factory: Option<Arc<dyn PageFactory>>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl Default for BufferOptionsBuilder {
    fn default() -> Self {
        Self::with_config(SpillConfig::from_env())
    }
}

impl BufferOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self::with_config(SpillConfig::default())
    }

    pub fn with_config(cfg: SpillConfig) -> Self {
        Self {
            cfg,
            file_factory: None,
            scheduler: None,
        }
    }

    pub fn page_size_bytes(mut self, bytes: usize) -> Self {
        self.cfg.page_size_bytes = bytes;
        self
    }

    pub fn spill_dir<S: Into<String>>(mut self, dir: S) -> Self {
        self.cfg.spill_dir = Some(dir.into());
        self
    }

    pub fn file_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.cfg.file_prefix = prefix.into();
        self
    }

    pub fn min_free_bytes(mut self, bytes: u64) -> Self {
        self.cfg.min_free_bytes = bytes;
        self
    }

    /// Custom page factory (overrides spill_dir / file_prefix / min_free_bytes).
    pub fn file_factory(mut self, f: Arc<dyn PageFactory>) -> Self {
        self.file_factory = Some(f);
        self
    }

    /// Custom scheduler (default: one dedicated thread per subscription).
    pub fn scheduler(mut self, s: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(s);
        self
    }

    pub fn config(&self) -> &SpillConfig {
        &self.cfg
    }

    /// Finish the builder and obtain the options.
    pub fn build(self) -> Result<BufferOptions> {
        if self.cfg.page_size_bytes == 0 {
            return Err(anyhow!("page_size_bytes must be > 0"));
        }
        let file_factory = match self.file_factory {
            Some(f) => f,
            None => Arc::new(DirPageFactory::from_config(&self.cfg)),
        };
        let scheduler = match self.scheduler {
            Some(s) => s,
            None => Arc::new(ThreadScheduler::new(self.cfg.worker_thread_name.clone())),
        };
        Ok(BufferOptions {
            page_size_bytes: self.cfg.page_size_bytes,
            file_factory,
            scheduler,
        })
    }
}
