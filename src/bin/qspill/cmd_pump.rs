use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use QuiverSpill::config::{BufferOptionsBuilder, SpillConfig};
use QuiverSpill::metrics;
use QuiverSpill::{
    BufferToFile, BytesCodec, IterObservable, IterPublisher, Publisher, Subscriber, Subscription,
};

pub struct PumpArgs {
    pub items: u64,
    pub item_size: usize,
    pub page_size: usize,
    pub dir: Option<PathBuf>,
    pub request_batch: u64,
    pub consumer_delay_us: u64,
    pub push: bool,
    pub json: bool,
}

enum Outcome {
    Completed,
    Failed(anyhow::Error),
}

/// Медленный consumer: проверяет порядок, запрашивает пачками.
struct PumpConsumer {
    batch: u64,
    delay: Duration,
    received: AtomicU64,
    out_of_order: AtomicU64,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
    done: Mutex<Option<Sender<Outcome>>>,
}

impl PumpConsumer {
    fn finish(&self, o: Outcome) {
        // разрываем цикл consumer <-> bridge
        self.subscription.lock().unwrap().take();
        if let Some(tx) = self.done.lock().unwrap().take() {
            let _ = tx.send(o);
        }
    }
}

impl Subscriber<Vec<u8>> for PumpConsumer {
    fn on_subscribe(&self, s: Arc<dyn Subscription>) {
        *self.subscription.lock().unwrap() = Some(s.clone());
        s.request(self.batch);
    }

    fn on_next(&self, item: Vec<u8>) {
        let n = self.received.fetch_add(1, Ordering::Relaxed);
        if item.len() < 8 || LittleEndian::read_u64(&item[..8]) != n {
            self.out_of_order.fetch_add(1, Ordering::Relaxed);
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if (n + 1) % self.batch == 0 {
            let s = self.subscription.lock().unwrap().clone();
            if let Some(s) = s {
                s.request(self.batch);
            }
        }
    }

    fn on_error(&self, err: anyhow::Error) {
        self.finish(Outcome::Failed(err));
    }

    fn on_complete(&self) {
        self.finish(Outcome::Completed);
    }
}

fn make_item(seq: u64, size: usize) -> Vec<u8> {
    let mut v = vec![(seq & 0xFF) as u8; size];
    LittleEndian::write_u64(&mut v[..8], seq);
    v
}

pub fn exec(args: PumpArgs) -> Result<()> {
    if args.item_size < 8 {
        return Err(anyhow!("--item-size must be >= 8"));
    }
    if args.request_batch == 0 {
        return Err(anyhow!("--request-batch must be > 0"));
    }

    let mut cfg = SpillConfig::from_env().with_page_size_bytes(args.page_size);
    if let Some(d) = &args.dir {
        std::fs::create_dir_all(d)?;
        cfg = cfg.with_spill_dir(Some(d.display().to_string()));
    }
    let options = BufferOptionsBuilder::with_config(cfg).build()?;

    let (items, size) = (args.items, args.item_size);
    let op = if args.push {
        let src = IterObservable::new(move || (0..items).map(move |i| make_item(i, size)))
            .on_thread(true);
        BufferToFile::from_observable(Arc::new(src), options, BytesCodec)
    } else {
        let src = IterPublisher::new(move || (0..items).map(move |i| make_item(i, size)));
        BufferToFile::from_publisher(Arc::new(src), options, BytesCodec)
    };

    let (tx, rx) = channel();
    let consumer = Arc::new(PumpConsumer {
        batch: args.request_batch,
        delay: Duration::from_micros(args.consumer_delay_us),
        received: AtomicU64::new(0),
        out_of_order: AtomicU64::new(0),
        subscription: Mutex::new(None),
        done: Mutex::new(Some(tx)),
    });

    metrics::reset();
    let started = Instant::now();
    op.subscribe(consumer.clone());
    let outcome = rx
        .recv()
        .map_err(|_| anyhow!("bridge terminated without a signal"))?;
    let elapsed = started.elapsed();

    let received = consumer.received.load(Ordering::Relaxed);
    let out_of_order = consumer.out_of_order.load(Ordering::Relaxed);
    let ms = metrics::snapshot();
    let (status, error) = match &outcome {
        Outcome::Completed => ("completed", None),
        Outcome::Failed(e) => ("failed", Some(format!("{:#}", e))),
    };

    if args.json {
        let v = json!({
            "status": status,
            "error": error,
            "items": items,
            "received": received,
            "out_of_order": out_of_order,
            "elapsed_ms": elapsed.as_millis() as u64,
            "push": args.push,
            "metrics": ms,
        });
        println!("{}", serde_json::to_string(&v)?);
    } else {
        println!("status:        {}", status);
        if let Some(e) = &error {
            println!("error:         {}", e);
        }
        println!("items:         {} produced, {} received", items, received);
        println!("out_of_order:  {}", out_of_order);
        println!("elapsed:       {:.3}s", elapsed.as_secs_f64());
        println!(
            "pages:         {} created, {} deleted",
            ms.pages_created, ms.pages_deleted
        );
        println!(
            "bytes:         {} offered, {} polled",
            ms.bytes_offered, ms.bytes_polled
        );
        println!("drain passes:  {}", ms.drain_passes);
    }

    match outcome {
        Outcome::Completed if out_of_order == 0 && received == items => Ok(()),
        Outcome::Completed => Err(anyhow!(
            "order check failed: received={} out_of_order={}",
            received,
            out_of_order
        )),
        Outcome::Failed(e) => Err(e),
    }
}
