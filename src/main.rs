// src/main.rs

use watchcmd::config::load_from_path;
use watchcmd::{cli, logging, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("watchcmd error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();

    // Only for the log level; the full load and validation happens in `run`.
    let config_level = load_from_path(&args.config)
        .ok()
        .and_then(|raw| raw.driver.log_level);

    logging::init_logging(args.log_level, config_level.as_deref())?;
    run(args).await
}
