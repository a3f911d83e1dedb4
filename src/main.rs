//! product-ingest command line
//!
//! ```bash
//! product-ingest run --site sites/acme.json --pages feeds/acme.jsonl \
//!                    --site sites/shop.json --pages feeds/shop.jsonl
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use product_ingest::domain::services::{Alerter, ImageStore};
use product_ingest::domain::site::SiteSchema;
use product_ingest::domain::value_objects::JobId;
use product_ingest::infrastructure::logging::{init_logging_with_config, log_system_info};
use product_ingest::infrastructure::{
    AppConfig, FsMarkerStore, HttpImageStore, HttpRemoteStore, LogAlerter, LogImageStore,
    NetworkContext, ScrapydJobStatus, WebhookAlerter,
};
use product_ingest::pipeline::feed::read_pages;
use product_ingest::pipeline::{Collaborators, RunOptions, RunSummary, SiteRun};

#[derive(Debug, Parser)]
#[command(name = "product-ingest", version, about = "Site-configured product ingest pipeline")]
struct Cli {
    /// Config file; `product-ingest.*` in the working directory when omitted
    #[arg(short, long, env = "PRODUCT_INGEST_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process one page feed per site, all sites concurrently
    Run {
        /// Site configuration (JSON), repeatable
        #[arg(long = "site", required = true)]
        sites: Vec<PathBuf>,

        /// JSON-lines page feed, paired with --site by position
        #[arg(long = "pages", required = true)]
        pages: Vec<PathBuf>,

        /// Job id for every run; overrides the configured one
        #[arg(long, env = "PRODUCT_INGEST_JOB_ID")]
        job_id: Option<String>,
    },
    /// Compile site configurations and report problems
    Check {
        #[arg(long = "site", required = true)]
        sites: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Check { sites } => {
            for path in &sites {
                let schema = SiteSchema::from_json_file(path)
                    .with_context(|| format!("Invalid site configuration {}", path.display()))?;
                println!(
                    "{}: {} ({} attributes)",
                    path.display(),
                    schema.merchant_name,
                    schema.attributes.len()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            sites,
            pages,
            job_id,
        } => {
            if sites.len() != pages.len() {
                bail!(
                    "Every --site needs a --pages feed ({} sites, {} feeds)",
                    sites.len(),
                    pages.len()
                );
            }
            let config = AppConfig::load(cli.config.as_deref())?;
            init_logging_with_config(&config.logging)?;
            log_system_info();

            let job_id = job_id
                .or_else(|| config.job_id.clone())
                .map_or_else(JobId::generate, JobId::new);
            run_sites(&config, sites.into_iter().zip(pages).collect(), job_id).await
        }
    }
}

fn collaborators(config: &AppConfig) -> Result<Collaborators> {
    let network = NetworkContext::new(&config.remote_store)?;

    let alerter: Arc<dyn Alerter> = match &config.alerting.webhook_url {
        Some(url) => Arc::new(WebhookAlerter::new(&network, url.clone())),
        None => Arc::new(LogAlerter),
    };
    let images: Arc<dyn ImageStore> = match &config.images.endpoint {
        Some(url) => Arc::new(HttpImageStore::new(&network, url.clone())),
        None => Arc::new(LogImageStore),
    };

    Ok(Collaborators {
        store: Arc::new(HttpRemoteStore::new(&network, &config.remote_store)?),
        jobs: Arc::new(ScrapydJobStatus::new(&network, &config.job_status)?),
        markers: Arc::new(FsMarkerStore::new(config.markers.dir.clone())),
        alerter,
        images,
        sink_backend: None,
    })
}

async fn run_sites(
    config: &AppConfig,
    pairs: Vec<(PathBuf, PathBuf)>,
    job_id: JobId,
) -> Result<ExitCode> {
    let collaborators = collaborators(config)?;
    let options = RunOptions {
        sink: config.sink.clone(),
        controller: config.controller_settings(),
        image_workers: config.images.workers,
        image_queue_capacity: config.images.queue_capacity,
    };

    // Ctrl-C stops reading feeds; every run still flushes and closes with status error.
    let stop = CancellationToken::new();
    let signal_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing runs");
            signal_stop.cancel();
        }
    });

    let mut runs = JoinSet::new();
    for (site, feed) in pairs {
        let schema = Arc::new(
            SiteSchema::from_json_file(&site)
                .with_context(|| format!("Invalid site configuration {}", site.display()))?,
        );
        runs.spawn(run_site(
            schema,
            feed,
            job_id.clone(),
            collaborators.clone(),
            options.clone(),
            stop.clone(),
        ));
    }

    let mut failed = false;
    while let Some(joined) = runs.join_next().await {
        match joined {
            Ok(Ok(summary)) => println!("{}", serde_json::to_string(&summary)?),
            Ok(Err(e)) => {
                error!("Site run failed: {e:#}");
                failed = true;
            }
            Err(e) => {
                error!("Site run panicked: {e}");
                failed = true;
            }
        }
    }
    info!("All site runs finished");
    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

async fn run_site(
    schema: Arc<SiteSchema>,
    feed: PathBuf,
    job_id: JobId,
    collaborators: Collaborators,
    options: RunOptions,
    stop: CancellationToken,
) -> Result<RunSummary> {
    let merchant = schema.merchant_name.clone();
    let pages = read_pages(&feed)
        .await
        .with_context(|| format!("Cannot open page feed {}", feed.display()))?;
    let mut pages = std::pin::pin!(pages);

    let mut run = SiteRun::start(schema, job_id, collaborators, options).await?;
    loop {
        let page = tokio::select! {
            () = stop.cancelled() => {
                // 중단된 실행은 정리(삭제) 없이 ERROR 로 종료
                return Ok(run.abort("interrupted").await);
            }
            page = pages.next() => page,
        };
        let Some(page) = page else { break };
        if let Err(e) = run.process(&page).await {
            // 설정 오류: 이미 받은 항목은 저장하고 종료
            error!("Aborting run for {merchant}: {e}");
            run.abort(&e.to_string()).await;
            return Err(e.into());
        }
    }
    Ok(run.finish().await)
}
