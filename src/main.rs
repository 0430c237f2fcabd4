mod assembler;
mod cli;
mod error;
mod model;
mod orchestrator;
mod portal;
mod selector;
mod settings;
mod text_summary;

use anyhow::Result;
use clap::Parser;

/// Logs go to stderr; `RUST_LOG` overrides the `-v` level.
fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .parse_default_env()
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_logger(args.verbose);
    let is_json = args.json;

    match cli::run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if is_json {
                // Keep stdout machine-readable in JSON mode.
                println!("{}", serde_json::json!({ "error": format!("{e:#}") }));
                std::process::exit(1);
            } else {
                Err(e)
            }
        }
    }
}
