use anyhow::Result;
use serde_json::json;

use QuiverSpill::config::SpillConfig;

pub fn exec(json_out: bool) -> Result<()> {
    let cfg = SpillConfig::from_env();
    if json_out {
        let v = json!({
            "page_size_bytes": cfg.page_size_bytes,
            "spill_dir": cfg.spill_dir,
            "file_prefix": cfg.file_prefix,
            "min_free_bytes": cfg.min_free_bytes,
            "worker_thread_name": cfg.worker_thread_name,
        });
        println!("{}", serde_json::to_string(&v)?);
    } else {
        println!("{}", cfg);
    }
    Ok(())
}
