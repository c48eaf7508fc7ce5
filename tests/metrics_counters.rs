mod common;

use std::sync::Arc;

use anyhow::Result;

use common::{options, page_files, unique_root, ManualPush, TestSubscriber, U64Codec};
use QuiverSpill::metrics;
use QuiverSpill::{BufferToFile, Publisher, TrampolineScheduler, UNBOUNDED};

// единственный тест в этом бинаре: счётчики глобальные
#[test]
fn counters_follow_a_full_run() -> Result<()> {
    metrics::reset();

    let root = unique_root("metrics");
    let src = ManualPush::<u64>::new();
    let op = BufferToFile::from_observable(src.clone(), options(&root, 64, Arc::new(TrampolineScheduler)), U64Codec { poison: None });
    let sub = TestSubscriber::new(0);
    op.subscribe(sub.clone());

    for i in 0..12u64 {
        src.emit(i);
    }
    let mid = metrics::snapshot();
    assert_eq!(mid.records_offered, 12);
    assert_eq!(mid.bytes_offered, 12 * 8);
    assert_eq!(mid.records_polled, 0);
    assert_eq!(mid.backlog_records(), 12);
    // 16 байт на запись, по 4 на страницу
    assert_eq!(mid.pages_created, 3);
    assert_eq!(mid.pages_live(), 3);
    assert_eq!(mid.subscriptions_started, 1);
    assert_eq!(mid.subscriptions_terminated, 0);
    assert!((mid.avg_record_bytes() - 8.0).abs() < f64::EPSILON);

    src.complete();
    sub.request(UNBOUNDED);
    assert_eq!(sub.completions(), 1);

    let end = metrics::snapshot();
    assert_eq!(end.records_polled, 12);
    assert_eq!(end.bytes_polled, 12 * 8);
    assert_eq!(end.backlog_records(), 0);
    assert_eq!(end.pages_deleted, end.pages_created);
    assert_eq!(end.subscriptions_terminated, 1);
    assert!(end.drain_passes >= 1);
    assert_eq!(end.undeliverable_errors, 0);
    assert!(page_files(&root).is_empty());

    // JSON-представление для CLI
    let v = serde_json::to_value(&end)?;
    assert_eq!(v["records_polled"], 12);

    metrics::reset();
    assert_eq!(metrics::snapshot().records_offered, 0);
    Ok(())
}
