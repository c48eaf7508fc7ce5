mod common;

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use anyhow::{anyhow, Result};

use common::{options, page_files, unique_root, ManualPublisher, ManualPush, TestSubscriber, U64Codec, UpstreamRecorder};
use QuiverSpill::{diag, BufferToFile, Codec, Publisher, TrampolineScheduler, UNBOUNDED};

// хук глобальный: тесты этого файла идут строго по одному
static SERIAL: Mutex<()> = Mutex::new(());

struct Captured {
    msgs: Arc<Mutex<Vec<String>>>,
    _guard: MutexGuard<'static, ()>,
}

impl Captured {
    fn install() -> Self {
        let guard = SERIAL.lock().unwrap_or_else(|p| p.into_inner());
        let msgs = Arc::new(Mutex::new(Vec::new()));
        let sink = msgs.clone();
        diag::set_error_hook(move |e| sink.lock().unwrap().push(format!("{:#}", e)));
        Self {
            msgs,
            _guard: guard,
        }
    }

    fn messages(&self) -> Vec<String> {
        self.msgs.lock().unwrap().clone()
    }
}

impl Drop for Captured {
    fn drop(&mut self) {
        diag::reset_error_hook();
    }
}

#[test]
fn request_zero_is_reported_and_ignored() -> Result<()> {
    let cap = Captured::install();
    let root = unique_root("req0");
    let src = ManualPublisher::<u64>::new();
    let op = BufferToFile::from_publisher(src.clone(), options(&root, 64, Arc::new(TrampolineScheduler)), U64Codec { poison: None });
    let sub = TestSubscriber::new(0);
    op.subscribe(sub.clone());

    sub.request(0);
    let msgs = cap.messages();
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].contains("n == 0"));
    assert!(src.requests().is_empty(), "request(0) must not reach upstream");
    assert!(sub.errors().is_empty(), "consumer is not failed");

    // подписка продолжает работать
    sub.request(1);
    src.emit(5);
    assert_eq!(sub.items(), vec![5]);
    Ok(())
}

#[test]
fn late_error_after_cancel_goes_to_sink() -> Result<()> {
    let cap = Captured::install();
    let root = unique_root("late-cancel");
    let src = ManualPush::<u64>::new();
    let op = BufferToFile::from_observable(src.clone(), options(&root, 64, Arc::new(TrampolineScheduler)), U64Codec { poison: None });
    let sub = TestSubscriber::new(0);
    op.subscribe(sub.clone());

    sub.cancel();
    src.error("producer blew up");
    assert_eq!(cap.messages(), vec!["producer blew up".to_string()]);
    assert!(sub.errors().is_empty());
    Ok(())
}

#[test]
fn late_error_after_completion_goes_to_sink() -> Result<()> {
    let cap = Captured::install();
    let root = unique_root("late-done");
    let src = ManualPush::<u64>::new();
    let op = BufferToFile::from_observable(src.clone(), options(&root, 64, Arc::new(TrampolineScheduler)), U64Codec { poison: None });
    let sub = TestSubscriber::new(UNBOUNDED);
    op.subscribe(sub.clone());

    src.complete();
    assert_eq!(sub.completions(), 1);
    src.error("too late");
    assert_eq!(cap.messages(), vec!["too late".to_string()]);
    assert!(sub.errors().is_empty());
    Ok(())
}

/// Cancels the subscriber from inside `decode` of `poison`, then fails.
struct CancellingCodec {
    poison: u64,
    sub: Arc<OnceLock<Arc<TestSubscriber<u64>>>>,
}

impl Codec<u64> for CancellingCodec {
    fn encode(&self, item: &u64) -> Result<Vec<u8>> {
        Ok(item.to_le_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<u64> {
        let v = U64Codec { poison: None }.decode(bytes)?;
        if v == self.poison {
            if let Some(s) = self.sub.get() {
                s.cancel();
            }
            return Err(anyhow!("decode during cancel"));
        }
        Ok(v)
    }
}

#[test]
fn decode_failure_during_cancel_goes_to_sink() -> Result<()> {
    let cap = Captured::install();
    let root = unique_root("decode-cancel");
    let slot = Arc::new(OnceLock::new());
    let codec = CancellingCodec {
        poison: 2,
        sub: slot.clone(),
    };
    let src = ManualPush::<u64>::new();
    let op = BufferToFile::from_observable(src.clone(), options(&root, 64, Arc::new(TrampolineScheduler)), codec);
    let sub = TestSubscriber::new(0);
    let _ = slot.set(sub.clone());
    op.subscribe(sub.clone());

    src.emit(1);
    src.emit(2);
    src.emit(3);
    sub.request(5);

    assert_eq!(sub.items(), vec![1]);
    assert!(sub.errors().is_empty(), "consumer already cancelled");
    assert_eq!(sub.completions(), 0);
    assert_eq!(cap.messages(), vec!["decode during cancel".to_string()]);
    assert!(src.is_disposed());
    assert!(page_files(&root).is_empty());
    Ok(())
}

#[test]
fn duplicate_upstream_subscription_is_cancelled() -> Result<()> {
    let cap = Captured::install();
    let root = unique_root("dup-sub");
    let src = ManualPublisher::<u64>::new();
    let op = BufferToFile::from_publisher(src.clone(), options(&root, 64, Arc::new(TrampolineScheduler)), U64Codec { poison: None });
    let sub = TestSubscriber::new(0);
    op.subscribe(sub.clone());

    let extra = Arc::new(UpstreamRecorder::default());
    src.resubscribe(extra.clone());
    assert!(extra.cancelled.load(std::sync::atomic::Ordering::Acquire));
    assert!(!src.is_cancelled(), "first subscription stays live");
    let msgs = cap.messages();
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].contains("already set"));

    // demand по-прежнему идёт в первую подписку
    sub.request(2);
    assert_eq!(src.requests(), vec![2]);
    assert!(extra.requests.lock().unwrap().is_empty());
    Ok(())
}

#[test]
fn hook_can_be_replaced_and_reset() {
    let cap = Captured::install();
    diag::on_error(anyhow::anyhow!("first"));

    let other = Arc::new(Mutex::new(0usize));
    let o = other.clone();
    let prev = diag::set_error_hook(move |_| *o.lock().unwrap() += 1);
    assert!(prev.is_some());
    diag::on_error(anyhow::anyhow!("second"));

    assert_eq!(cap.messages(), vec!["first".to_string()]);
    assert_eq!(*other.lock().unwrap(), 1);

    assert!(diag::reset_error_hook().is_some());
    // без хука — только лог
    diag::on_error(anyhow::anyhow!("third"));
    assert_eq!(*other.lock().unwrap(), 1);
}
