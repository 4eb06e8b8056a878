use clap::Parser;
use label_sam_server::app::App;
use label_sam_server::config::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Interactive SAM segmentation server
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON config file, defaults to ./config.json when present
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::new()?,
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    App::new(config).run().await
}
