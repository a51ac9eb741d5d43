use poller::{PollService, PollSettings};
use postwatch_core::{load_accounts, AppConfig, CoreError, ErrorReporter};
use scrape_client::{ScrapeConfig, TimelineScraper};
use search_client::{SearchApiClient, SearchConfig};
use std::path::PathBuf;
use std::sync::Arc;
use storage::{BatchWriter, HttpImageFetcher, MediaDownloader};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "POSTWATCH_CONFIG";
const DEFAULT_CONFIG: &str = "postwatch.toml";
const DEFAULT_LOG_FILTER: &str =
    "postwatch=info,poller=info,search_client=info,scrape_client=info,storage=info";

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    tracing::info!("Starting postwatch");

    let service = build_service().map_err(|e| {
        ErrorReporter::new().report_error(&e);
        e
    })?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, finishing current work");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => tracing::error!("Failed to install Ctrl-C handler: {}", e),
        }
    });

    service.run(shutdown_rx).await;
    tracing::info!("Bot stopped by user. Exiting gracefully");
    Ok(())
}

fn build_service() -> Result<PollService, CoreError> {
    let config_path = std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = AppConfig::load(&config_path)?;

    let accounts = load_accounts(&config.accounts_file)?;
    let names: Vec<&str> = accounts.iter().map(|account| account.as_str()).collect();
    tracing::info!("Accounts to track: {:?}", names);

    let bearer_token = config.bearer_token()?;
    let primary = SearchApiClient::new(SearchConfig::from_app_config(&config, bearer_token))?;
    let fallback = TimelineScraper::new(ScrapeConfig::from_app_config(&config))?;
    let images = HttpImageFetcher::new(config.request_timeout(), &config.user_agent)?;

    let downloader = MediaDownloader::new(
        Arc::new(images),
        config.output_dir.clone(),
        config.download_concurrency,
    );
    let batch_writer = BatchWriter::new(config.output_dir.clone());

    Ok(PollService::new(
        PollSettings::from_app_config(&config),
        accounts,
        Arc::new(primary),
        Arc::new(fallback),
        downloader,
        batch_writer,
    ))
}
