use clap::Parser;
use color_eyre::Result;
use dashdata::config::Config;
use dashdata::{DataService, HttpTransport};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dashdata")]
#[command(about = "Fetch dashboard data sources and print their response envelopes")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./dashdata.yaml or $XDG_CONFIG_HOME/dashdata/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Base URL for relative endpoints (overrides config and DASHDATA_BASE_URL)
  #[arg(short, long)]
  base_url: Option<String>,

  /// Only validate the selected sources, without fetching
  #[arg(long)]
  validate: bool,

  /// Names of the sources to fetch (default: all)
  sources: Vec<String>,
}

/// Log to stderr so stdout stays clean JSON. Filter with DASHDATA_LOG.
fn init_tracing() -> WorkerGuard {
  let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
  let filter = EnvFilter::try_from_env("DASHDATA_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .init();

  guard
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  let _log_guard = init_tracing();

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Override base URL if specified on command line
  let config = if let Some(base_url) = args.base_url {
    Config {
      base_url: Some(base_url),
      ..config
    }
  } else {
    config
  };

  let descriptors = config.descriptors(&args.sources)?;
  let transport = HttpTransport::new(config.base_url.as_deref())?;
  let service = DataService::new(Arc::new(transport));

  let output = if args.validate {
    let results: BTreeMap<_, _> = descriptors
      .iter()
      .map(|(name, descriptor)| (name.clone(), service.validate_data_source(descriptor)))
      .collect();
    serde_json::to_string_pretty(&results)?
  } else {
    tracing::info!(count = descriptors.len(), "fetching data sources");
    let service = &service;
    let envelopes = futures::future::join_all(
      descriptors
        .iter()
        .map(|(name, descriptor)| async move { (name.clone(), service.fetch_data(descriptor).await) }),
    )
    .await;
    let results: BTreeMap<_, _> = envelopes.into_iter().collect();
    serde_json::to_string_pretty(&results)?
  };

  println!("{}", output);

  Ok(())
}
