// src/main.rs

use nprsched::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(summary) if summary.is_clean() => {}
        Ok(summary) => {
            eprintln!(
                "nprsched: {} thread(s) finished with errors",
                summary.errors.len()
            );
            std::process::exit(2);
        }
        Err(err) => {
            eprintln!("nprsched error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<nprsched::engine::RunSummary> {
    let args = cli::parse();
    let log_control = logging::init_logging(args.log_level)?;
    Ok(run(args, Some(log_control)).await?)
}
