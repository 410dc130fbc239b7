use std::process::ExitCode;
use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;

use ttp_scheduler::alerts::{message, Notifier, Severity};
use ttp_scheduler::api;
use ttp_scheduler::cli::Cli;
use ttp_scheduler::config::Config;
use ttp_scheduler::db;
use ttp_scheduler::error::{AppError, StoreError};
use ttp_scheduler::locations::LocationDirectory;
use ttp_scheduler::logging::init_logging;
use ttp_scheduler::metrics::AppMetrics;
use ttp_scheduler::repository::SqliteDedupStore;
use ttp_scheduler::scheduler::Scheduler;
use ttp_scheduler::services::ttp::TtpClient;
use ttp_scheduler::store::DedupStore;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = Config::load(
        cli.config.as_deref(),
        &cli.overrides(),
        Local::now().date_naive(),
    )?;
    tracing::debug!("Resolved config: {:?}", config);

    let notifier = Notifier::from_urls(&config.notification_urls, reqwest::Client::new())?;

    if cli.test_notifications {
        let report = notifier.send(message::TEST_MESSAGE, Severity::Info).await?;
        tracing::info!(
            delivered = report.delivered,
            failed = report.failures.len(),
            "Test notification sent"
        );
        return Ok(());
    }

    let pool = match db::create_pool(&config.database_url()).await {
        Ok(pool) => pool,
        Err(err) => {
            let err = StoreError::from(err);
            // Best effort: the store is unusable, tell the user why we stop.
            if let Err(notify_err) = notifier.send(&message::fatal(&err), Severity::Error).await {
                tracing::warn!("Could not report startup failure: {}", notify_err);
            }
            return Err(err.into());
        }
    };
    let store = Arc::new(SqliteDedupStore::new(pool));

    if cli.reset_history {
        let removed = store.clear().await?;
        tracing::info!(removed, "Notification history cleared");
        return Ok(());
    }

    if let Some(limit) = cli.history {
        for record in store.list_recent(limit).await? {
            println!("{}  {}", record.notified_at, record.key);
        }
        return Ok(());
    }

    let directory = match &config.locations_file {
        Some(path) => LocationDirectory::load(path)?,
        None => LocationDirectory::new(),
    };
    let fetcher = Arc::new(TtpClient::new(config.api_base_url.clone())?);
    let metrics = Arc::new(AppMetrics::new()?);
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received, shutting down");
                cancel.cancel();
            }
        });
    }

    let metrics_addr = config.metrics_addr;
    let mut scheduler = Scheduler::new(
        config,
        fetcher,
        store,
        notifier,
        metrics.clone(),
        cancel.clone(),
    )
    .with_directory(directory);

    let server = metrics_addr.map(|addr| {
        let router = api::create_router(metrics.clone(), scheduler.status());
        tokio::spawn(api::serve(addr, router, cancel.clone()))
    });

    let result = scheduler.run().await;

    // Stop the status server along with the loop.
    cancel.cancel();
    if let Some(handle) = server {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!("Status server failed: {}", err),
            Err(err) => tracing::error!("Status server task panicked: {}", err),
        }
    }

    result.map(|summary| {
        tracing::info!(
            cycles = summary.cycles,
            new_slots = summary.new_slots,
            "Scheduler finished"
        );
    })
}
