use anyhow::Result;
use env_logger::{Builder, Env};
use log::error;

mod cli;
mod cmd_config;
mod cmd_pump;

fn init_logger() {
    // Уровень берём из RUST_LOG, иначе дефолт — info.
    // Пример: RUST_LOG=debug ./qspill pump --items 100000
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Pump {
            items,
            item_size,
            page_size,
            dir,
            request_batch,
            consumer_delay_us,
            push,
            json,
        } => cmd_pump::exec(cmd_pump::PumpArgs {
            items,
            item_size,
            page_size,
            dir,
            request_batch,
            consumer_delay_us,
            push,
            json,
        }),

        cli::Cmd::Config { json } => cmd_config::exec(json),
    }
}
