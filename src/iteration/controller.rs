//! # Iteration Lifecycle Controller
//!
//! Brackets a site run:
//! - `on_run_start` detects a live or killed previous iteration and registers
//!   the new one (snapshotting the remote product count)
//! - `on_run_end` decides on cleanup, persists closing stats and alerts
//! - `on_run_abort` closes an interrupted run with status error, touching
//!   neither the catalogue nor the first-run marker
//!
//! Remote failures are logged and counted; nothing here aborts a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::run_state::{IterationStatus, RunState};
use crate::domain::services::{
    Alerter, IterationInfo, JobStatusProvider, MarkerStore, RemoteStore, Severity,
};
use crate::iteration::deletion::{
    DeletionDecision, DeletionInputs, DeletionOutcome, DEFAULT_DELETION_THRESHOLD,
};

/// Share of the starting db count that may carry a zero price before it is
/// logged as an error, in percent.
pub const DEFAULT_ZERO_PRICE_ALERT_PERCENT: f64 = 30.0;

const STATS_TIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S:%6f";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerSettings {
    /// Job-service project the crawl jobs belong to.
    pub project: String,
    pub default_deletion_threshold: f64,
    pub zero_price_alert_percent: f64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            project: "product_ingest".into(),
            default_deletion_threshold: DEFAULT_DELETION_THRESHOLD,
            zero_price_alert_percent: DEFAULT_ZERO_PRICE_ALERT_PERCENT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStart {
    /// A new iteration was registered.
    Started { recovered_killed: bool },
    /// Another instance is still crawling this merchant.
    ShutDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PriorIteration {
    Settled,
    Alive,
    Killed,
}

/// Counters and timings written with the finished iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosingStats {
    pub item_scraped_count: u64,
    pub survived_crawled_products: u64,
    pub out_stock_items_count: u64,
    pub in_stock_items_count: u64,
    pub invalid_items_count: u64,
    pub zero_price_items_count: u64,
    pub manufacturer_populated_items_count: u64,
    pub manufacturer_empty_items_count: u64,
    pub model_populated_items_count: u64,
    pub duplicate_items_count: u64,
    pub integrity_defect_count: u64,
    pub missing_images_count: u64,
    pub db_count_at_start: u64,
    pub start_time: String,
    pub finish_time: String,
    pub iteration_duration: f64,
    pub scraped_few_items: bool,
    #[serde(rename = "log_count/ERROR")]
    pub error_count: u64,
}

impl ClosingStats {
    pub fn from_run(run: &RunState, scraped_few_items: bool) -> Self {
        let finished = run.finished_at.unwrap_or_else(Utc::now);
        let c = &run.counters;
        Self {
            item_scraped_count: c.scraped,
            survived_crawled_products: c.survived,
            out_stock_items_count: c.out_of_stock,
            in_stock_items_count: c.in_stock,
            invalid_items_count: c.invalid,
            zero_price_items_count: c.zero_price,
            manufacturer_populated_items_count: c.manufacturer_populated,
            manufacturer_empty_items_count: c.manufacturer_empty,
            model_populated_items_count: c.model_populated,
            duplicate_items_count: c.duplicates,
            integrity_defect_count: c.integrity_defects,
            missing_images_count: c.missing_images,
            db_count_at_start: run.db_count_at_start,
            start_time: format_time(run.started_at),
            finish_time: format_time(finished),
            iteration_duration: run.duration_hours(),
            scraped_few_items,
            error_count: c.errors,
        }
    }

    /// One `key: value` per line, wrapped in braces.
    pub fn render(&self) -> String {
        let Ok(Value::Object(fields)) = serde_json::to_value(self) else {
            return String::from("{}");
        };
        let lines: Vec<String> = fields.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        format!("{{{}}}", lines.join("\n"))
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format(STATS_TIME_FORMAT).to_string()
}

/// What `on_run_end` did.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    pub deletion: DeletionOutcome,
    pub scraped_few_items: bool,
    pub stats: Option<ClosingStats>,
    /// Zero-price share exceeded `zero_price_alert_percent`.
    pub zero_price_exceeded: bool,
    pub alerts: Vec<String>,
}

impl IterationReport {
    fn skipped() -> Self {
        Self {
            deletion: DeletionOutcome::Skipped,
            scraped_few_items: false,
            stats: None,
            zero_price_exceeded: false,
            alerts: Vec::new(),
        }
    }
}

pub struct IterationController {
    store: Arc<dyn RemoteStore>,
    jobs: Arc<dyn JobStatusProvider>,
    markers: Arc<dyn MarkerStore>,
    alerter: Arc<dyn Alerter>,
    settings: ControllerSettings,
}

impl IterationController {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        jobs: Arc<dyn JobStatusProvider>,
        markers: Arc<dyn MarkerStore>,
        alerter: Arc<dyn Alerter>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            store,
            jobs,
            markers,
            alerter,
            settings,
        }
    }

    pub async fn on_run_start(&self, run: &mut RunState) -> RunStart {
        info!("Starting run for merchant {}", run.merchant_name);

        let latest = match self.store.latest_iteration(&run.merchant_key).await {
            Ok(latest) => latest,
            Err(e) => {
                error!("Could not fetch the latest iteration: {e}");
                run.record_error();
                None
            }
        };

        let prior = self.classify(latest.as_ref(), run).await;
        info!("The last iteration status is {prior:?}");

        let recovered_killed = match prior {
            PriorIteration::Alive => {
                warn!(
                    "An instance for merchant {} is already running, shutting down",
                    run.merchant_name
                );
                run.shut_down();
                return RunStart::ShutDown;
            }
            PriorIteration::Killed => {
                info!("The last iteration was killed, closing it with status error");
                if let Err(e) = self
                    .store
                    .end_iteration(&run.merchant_key, IterationStatus::Error, None)
                    .await
                {
                    error!("Could not close the killed iteration: {e}");
                    run.record_error();
                }
                true
            }
            PriorIteration::Settled => false,
        };

        self.start_iteration(run).await;
        RunStart::Started { recovered_killed }
    }

    async fn classify(&self, latest: Option<&IterationInfo>, run: &mut RunState) -> PriorIteration {
        let Some(info) = latest.filter(|info| info.status == IterationStatus::Crawling) else {
            return PriorIteration::Settled;
        };
        // Without a job id liveness cannot be checked.
        let Some(job_id) = info.job_id.as_deref().filter(|id| !id.trim().is_empty()) else {
            return PriorIteration::Alive;
        };

        match self.jobs.status(&self.settings.project, job_id).await {
            Ok(state) if state.is_alive() => PriorIteration::Alive,
            Ok(state) => {
                info!("Job {job_id} of the crawling iteration is {state:?}");
                PriorIteration::Killed
            }
            Err(e) => {
                error!("Could not resolve status of job {job_id}: {e}");
                run.record_error();
                PriorIteration::Alive
            }
        }
    }

    async fn start_iteration(&self, run: &mut RunState) {
        run.db_count_at_start = match self.store.product_count(&run.merchant_key).await {
            Ok(count) => count,
            Err(e) => {
                error!("Could not fetch the product count: {e}");
                run.record_error();
                0
            }
        };
        info!("Current crawled products db count is {}", run.db_count_at_start);

        if let Err(e) = self.store.new_iteration(&run.merchant_key, &run.job_id).await {
            error!("Could not register the new iteration: {e}");
            run.record_error();
        }
        run.status = IterationStatus::Crawling;
        run.started_at = Utc::now();
    }

    pub async fn on_run_end(&self, run: &mut RunState) -> IterationReport {
        if run.is_shut_down() {
            return IterationReport::skipped();
        }
        run.finished_at = Some(Utc::now());

        let threshold = run
            .deletion_threshold
            .unwrap_or(self.settings.default_deletion_threshold);
        info!("Deletion threshold is {threshold}");

        let zero_price_exceeded = self.check_zero_prices(run);

        let marker_exists = match self.markers.exists(&run.merchant_key).await {
            Ok(exists) => exists,
            Err(e) => {
                error!("Could not read the first-run marker: {e}");
                run.record_error();
                true
            }
        };

        let inputs = DeletionInputs {
            db_count_at_start: run.db_count_at_start,
            survived: run.counters.survived,
            scraped: run.counters.scraped,
            threshold_percent: threshold,
            marker_exists,
        };
        info!(
            "{} previously known products were not seen in this iteration",
            inputs.missing()
        );
        let decision = inputs.decide();
        self.apply(&decision, run).await;

        let stats = self
            .close(run, IterationStatus::Finished, decision.scraped_few_items)
            .await;
        let alerts = self.alert(run, &stats).await;
        IterationReport {
            deletion: decision.outcome,
            scraped_few_items: decision.scraped_few_items,
            stats: Some(stats),
            zero_price_exceeded,
            alerts,
        }
    }

    /// Closes the iteration of a run that stopped before its feed was
    /// exhausted. No deletion decision is taken and the first-run marker is
    /// left alone.
    pub async fn on_run_abort(&self, run: &mut RunState, reason: &str) -> IterationReport {
        if run.is_shut_down() {
            return IterationReport::skipped();
        }
        run.finished_at = Some(Utc::now());
        warn!("Run aborted ({reason}), closing the iteration with status error");

        let stats = self.close(run, IterationStatus::Error, false).await;
        let message = format!("[{}] Run aborted: {reason}", run.alert_label());
        self.alerter.notify(&message, Severity::Error).await;

        let mut alerts = vec![message];
        alerts.extend(self.alert(run, &stats).await);
        IterationReport {
            deletion: DeletionOutcome::Aborted,
            scraped_few_items: false,
            stats: Some(stats),
            zero_price_exceeded: false,
            alerts,
        }
    }

    async fn close(
        &self,
        run: &mut RunState,
        status: IterationStatus,
        scraped_few_items: bool,
    ) -> ClosingStats {
        run.status = status;
        let stats = ClosingStats::from_run(run, scraped_few_items);
        match serde_json::to_value(&stats) {
            Ok(payload) => {
                if let Err(e) = self
                    .store
                    .end_iteration(&run.merchant_key, status, Some(payload))
                    .await
                {
                    error!("Could not close the iteration: {e}");
                    run.record_error();
                }
            }
            Err(e) => {
                error!("Could not serialize closing stats: {e}");
                run.record_error();
            }
        }
        stats
    }

    /// Logged only; the share is measured against the starting db count.
    fn check_zero_prices(&self, run: &RunState) -> bool {
        // No baseline on a first run.
        if run.db_count_at_start == 0 {
            return false;
        }
        let percent = run.counters.zero_price as f64 * 100.0 / run.db_count_at_start as f64;
        if percent <= self.settings.zero_price_alert_percent {
            return false;
        }
        error!(
            "More than {} percent ({percent:.2}) of products have 0 price",
            self.settings.zero_price_alert_percent
        );
        true
    }

    async fn apply(&self, decision: &DeletionDecision, run: &mut RunState) {
        match decision.outcome {
            DeletionOutcome::Cleanup { write_marker } => {
                info!("Cleaning up products not seen in job {}", run.job_id);
                if let Err(e) = self
                    .store
                    .clean_crawled_products(&run.merchant_key, &run.job_id)
                    .await
                {
                    error!("Cleanup of unseen products failed: {e}");
                    run.record_error();
                }
                if write_marker {
                    if let Err(e) = self.markers.create(&run.merchant_key).await {
                        error!("Could not write the first-run marker: {e}");
                        run.record_error();
                    }
                }
            }
            DeletionOutcome::ThresholdExceeded { missing_percent } => info!(
                "Won't cleanup unseen products, {missing_percent:.2}% exceeds the threshold"
            ),
            DeletionOutcome::NothingScraped => info!("Nothing scraped, skipping cleanup"),
            DeletionOutcome::NothingMissing
            | DeletionOutcome::Skipped
            | DeletionOutcome::Aborted => {}
        }
    }

    async fn alert(&self, run: &RunState, stats: &ClosingStats) -> Vec<String> {
        let label = run.alert_label();
        let mut alerts = Vec::new();

        if stats.scraped_few_items {
            let message = format!("[{label}] Scraped few items: {}", stats.item_scraped_count);
            self.alerter.notify(&message, Severity::Warning).await;
            alerts.push(message);
        }
        if stats.error_count > 0 {
            let message = format!(
                "[{label}] {} errors detected. here's the stats\n{}",
                stats.error_count,
                stats.render()
            );
            info!("{message}");
            self.alerter.notify(&message, Severity::Error).await;
            alerts.push(message);
        }
        alerts
    }
}
