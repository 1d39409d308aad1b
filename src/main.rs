use anyhow::Result;
use clap::Parser;
use pero_processing_client::cli;
use tracing::error;

fn main() -> Result<()> {
    let args = cli::Args::parse();

    // Until logging is up, stderr is the only place an error can go.
    let cfg = match cli::load_config(&args) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::exit(1);
        }
    };
    let guard = match cli::init_logging(&args, &cfg) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = cli::dispatch(&args, cfg) {
        error!("{:#}", err);
        // Flush the file writer before exiting.
        drop(guard);
        std::process::exit(1);
    }
    Ok(())
}
