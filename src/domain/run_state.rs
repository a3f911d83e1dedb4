//! Per-site, per-iteration run bookkeeping
//!
//! A `RunState` is owned by the site run and passed by reference to every
//! stage. There are no process-wide counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::domain::site::SiteSchema;
use crate::domain::value_objects::JobId;

/// Remote iteration status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IterationStatus {
    #[serde(alias = "CRAWLING")]
    Crawling,
    #[serde(alias = "FINISHED")]
    Finished,
    #[serde(alias = "ERROR")]
    Error,
}

/// Item counters accumulated during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    /// Items handed to the sink.
    pub scraped: u64,
    /// Items the store reported as already present.
    pub survived: u64,
    pub invalid: u64,
    pub out_of_stock: u64,
    pub in_stock: u64,
    pub zero_price: u64,
    pub manufacturer_populated: u64,
    pub manufacturer_empty: u64,
    pub model_populated: u64,
    pub duplicates: u64,
    pub integrity_defects: u64,
    pub missing_images: u64,
    /// Events the pipeline logged at error severity.
    pub errors: u64,
}

#[derive(Debug)]
pub struct RunState {
    pub merchant_key: String,
    pub merchant_name: String,
    pub country: String,
    pub job_id: JobId,
    pub status: IterationStatus,
    pub counters: RunCounters,
    pub db_count_at_start: u64,
    pub deletion_threshold: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    shutdown: CancellationToken,
}

impl RunState {
    pub fn new(schema: &SiteSchema, job_id: JobId) -> Self {
        Self {
            merchant_key: schema.merchant_key.clone(),
            merchant_name: schema.merchant_name.clone(),
            country: schema.country.clone(),
            job_id,
            status: IterationStatus::Crawling,
            counters: RunCounters::default(),
            db_count_at_start: 0,
            deletion_threshold: schema.deletion_threshold,
            started_at: Utc::now(),
            finished_at: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Another instance owns this merchant; everything after this rejects.
    pub fn shut_down(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn record_error(&mut self) {
        self.counters.errors += 1;
    }

    /// `<COUNTRY>-<merchant>` prefix used in alerts.
    pub fn alert_label(&self) -> String {
        format!("{}-{}", self.country.to_uppercase(), self.merchant_name)
    }

    /// Wall time of the run in hours, rounded to two decimals.
    pub fn duration_hours(&self) -> f64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        let seconds = (end - self.started_at).num_milliseconds() as f64 / 1000.0;
        (seconds / 3600.0 * 100.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::site::SiteSchema;

    fn schema() -> SiteSchema {
        SiteSchema::from_json_str(r#"{"merchant_name": "acme", "country": "ae", "attributes": []}"#)
            .unwrap()
    }

    #[test]
    fn shutdown_is_sticky() {
        let run = RunState::new(&schema(), JobId::new("job-1"));
        assert!(!run.is_shut_down());
        run.shut_down();
        run.shut_down();
        assert!(run.is_shut_down());
    }

    #[test]
    fn duration_is_rounded_hours() {
        let mut run = RunState::new(&schema(), JobId::new("job-1"));
        run.finished_at = Some(run.started_at + chrono::Duration::minutes(90));
        assert!((run.duration_hours() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn iteration_status_accepts_both_cases() {
        let upper: IterationStatus = serde_json::from_str(r#""CRAWLING""#).unwrap();
        let lower: IterationStatus = serde_json::from_str(r#""finished""#).unwrap();
        assert_eq!(upper, IterationStatus::Crawling);
        assert_eq!(lower, IterationStatus::Finished);
        assert_eq!(serde_json::to_string(&IterationStatus::Error).unwrap(), r#""error""#);
    }
}
