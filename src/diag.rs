//! Process-wide sink for errors that cannot be delivered to a consumer.
//!
//! Куда попадают:
//! - ошибки teardown'а после уже начатой отмены (consumer попросил остановиться);
//! - поздние сигналы источника после терминального состояния;
//! - нарушения протокола (request(0), повторный on_subscribe).
//!
//! По умолчанию ошибка пишется в лог на уровне error. Хук можно заменить
//! (например, в тестах) через `set_error_hook`.

use log::error;
use std::sync::{Arc, RwLock};

use crate::metrics::record_undeliverable_error;

pub type ErrorHook = Arc<dyn Fn(&anyhow::Error) + Send + Sync + 'static>;

static HOOK: RwLock<Option<ErrorHook>> = RwLock::new(None);

/// Install a process-wide hook. Returns the previous one.
pub fn set_error_hook<F>(f: F) -> Option<ErrorHook>
where
    F: Fn(&anyhow::Error) + Send + Sync + 'static,
{
    let mut g = HOOK.write().unwrap_or_else(|p| p.into_inner());
    g.replace(Arc::new(f))
}

/// Restore the default (log-only) behavior.
pub fn reset_error_hook() -> Option<ErrorHook> {
    let mut g = HOOK.write().unwrap_or_else(|p| p.into_inner());
    g.take()
}

/// Route an undeliverable error to the hook (or the log).
pub fn on_error(err: anyhow::Error) {
    record_undeliverable_error();
    let hook = HOOK.read().unwrap_or_else(|p| p.into_inner()).clone();
    match hook {
        // вызываем вне lock'а: хук может сам трогать diag
        Some(h) => h(&err),
        None => error!("undeliverable error: {:#}", err),
    }
}
