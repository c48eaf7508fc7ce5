//! bridge/state — терминальное состояние моста одним атомарным тегом.
//!
//! Переходы:
//! - Running   → Completed (источник завершился, backlog ещё может быть в очереди)
//! - Running   → Failed    (ошибка записана в слот до публикации тега)
//! - Running | Completed | Failed → Cancelled
//! - любое     → Terminated (только drain-поток, после терминального сигнала)
//!
//! Failed, Cancelled и Terminated необратимы.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Terminal {
    Running = 0,
    Completed = 1,
    Failed = 2,
    Cancelled = 3,
    Terminated = 4,
}

impl Terminal {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Terminal::Running,
            1 => Terminal::Completed,
            2 => Terminal::Failed,
            3 => Terminal::Cancelled,
            _ => Terminal::Terminated,
        }
    }
}

#[derive(Debug)]
pub struct TerminalState {
    tag: AtomicU8,
    error: Mutex<Option<anyhow::Error>>,
}

impl Default for TerminalState {
    fn default() -> Self {
        Self {
            tag: AtomicU8::new(Terminal::Running as u8),
            error: Mutex::new(None),
        }
    }
}

impl TerminalState {
    #[inline]
    pub fn load(&self) -> Terminal {
        Terminal::from_u8(self.tag.load(Ordering::Acquire))
    }

    /// Running → Completed.
    pub fn complete(&self) -> bool {
        self.cas(Terminal::Running, Terminal::Completed)
    }

    /// Running → Failed(err). Hands the error back if the transition is refused.
    pub fn fail(&self, err: anyhow::Error) -> Result<(), anyhow::Error> {
        let mut slot = self.error.lock().unwrap();
        if self.load() != Terminal::Running {
            return Err(err);
        }
        *slot = Some(err);
        if self.cas(Terminal::Running, Terminal::Failed) {
            Ok(())
        } else {
            // cancel успел раньше
            Err(slot.take().unwrap_or_else(|| anyhow::anyhow!("failure lost")))
        }
    }

    /// {Running, Completed, Failed} → Cancelled. False if already cancelled or terminated.
    pub fn cancel(&self) -> bool {
        self.tag
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                match Terminal::from_u8(v) {
                    Terminal::Running | Terminal::Completed | Terminal::Failed => {
                        Some(Terminal::Cancelled as u8)
                    }
                    Terminal::Cancelled | Terminal::Terminated => None,
                }
            })
            .is_ok()
    }

    /// Move to Terminated, returning the previous state.
    pub fn terminate(&self) -> Terminal {
        Terminal::from_u8(self.tag.swap(Terminal::Terminated as u8, Ordering::AcqRel))
    }

    pub fn take_error(&self) -> Option<anyhow::Error> {
        self.error.lock().unwrap().take()
    }

    fn cas(&self, from: Terminal, to: Terminal) -> bool {
        self.tag
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn failure_is_one_way() {
        let s = TerminalState::default();
        assert!(s.fail(anyhow!("boom")).is_ok());
        assert_eq!(s.load(), Terminal::Failed);
        assert!(!s.complete());
        let late = s.fail(anyhow!("late")).unwrap_err();
        assert_eq!(late.to_string(), "late");
        assert_eq!(s.take_error().unwrap().to_string(), "boom");
    }

    #[test]
    fn cancel_beats_completed_and_failed() {
        let s = TerminalState::default();
        assert!(s.complete());
        assert!(s.cancel());
        assert!(!s.cancel());
        assert_eq!(s.load(), Terminal::Cancelled);
        assert!(s.fail(anyhow!("x")).is_err());

        let f = TerminalState::default();
        f.fail(anyhow!("boom")).unwrap();
        assert!(f.cancel());
        assert_eq!(f.load(), Terminal::Cancelled);
    }

    #[test]
    fn terminated_ignores_cancel() {
        let s = TerminalState::default();
        assert_eq!(s.terminate(), Terminal::Running);
        assert!(!s.cancel());
        assert!(!s.complete());
        assert_eq!(s.load(), Terminal::Terminated);
    }
}
