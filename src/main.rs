use anyhow::Result;
use clap::Parser;
use finess_matcher::cli::{self, Cli};
use finess_matcher::logging::init_logging;
use finess_matcher::util::envfile::load_dotenv_if_present;

fn main() -> Result<()> {
    // .env first so FINESS_MATCHER_TRACING and RUST_LOG can come from it
    let dotenv = load_dotenv_if_present();
    init_logging();
    if let Err(e) = dotenv {
        log::warn!("ignoring .env: {e:#}");
    }

    let cli = Cli::parse();
    if let Err(e) = cli::run(&cli) {
        log::error!("{e:#}");
        return Err(e);
    }
    Ok(())
}
