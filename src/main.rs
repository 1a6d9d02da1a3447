use clap::Parser;

use sentinel_exporter::cli::Cli;
use sentinel_exporter::{exporter_main, logging};

#[tokio::main]
async fn main() -> sentinel_exporter::Result<()> {
    let cli = Cli::parse();
    let config = cli.into_config()?;

    logging::init_logging(&config.loglevel, &config.logfile)?;

    exporter_main::start_exporter(config).await
}
