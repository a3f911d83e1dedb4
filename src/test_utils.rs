//! Test utilities for product-ingest
//!
//! In-memory fakes of every collaborator trait, so unit and integration tests
//! can drive full site runs without a network or filesystem.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::item::keys;
use crate::domain::run_state::IterationStatus;
use crate::domain::services::{
    Alerter, ImageJob, ImageStore, IterationInfo, JobState, JobStatusProvider, MarkerStore,
    RemoteStore, Severity, StoreReceipt,
};
use crate::domain::value_objects::JobId;
use crate::error::RemoteError;
use crate::pipeline::sink::{SinkBackend, WriteReceipt};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unavailable(call: &str) -> RemoteError {
    RemoteError::http(503, "store unavailable", call)
}

#[derive(Debug, Default)]
struct StoreState {
    latest: Option<IterationInfo>,
    count: u64,
    known: HashSet<String>,
    added: Vec<Value>,
    ended: Vec<IterationStatus>,
    started_jobs: Vec<String>,
    cleaned_jobs: Vec<String>,
    last_stats: Option<Value>,
    deleted_out_of_stock: Vec<String>,
    failing: bool,
}

/// Remote store kept in memory. Products whose `remote_id` is known are
/// reported as already present.
#[derive(Debug, Default)]
pub struct InMemoryRemoteStore {
    state: Mutex<StoreState>,
}

impl InMemoryRemoteStore {
    pub fn with_known_products<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::default();
        {
            let mut state = lock(&store.state);
            state.known = ids.into_iter().map(Into::into).collect();
            state.count = state.known.len() as u64;
        }
        store
    }

    pub fn set_latest(&self, info: IterationInfo) {
        lock(&self.state).latest = Some(info);
    }

    pub fn set_count(&self, count: u64) {
        lock(&self.state).count = count;
    }

    /// Every call fails with a 503 from now on.
    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }

    pub fn added(&self) -> Vec<Value> {
        lock(&self.state).added.clone()
    }

    pub fn ended(&self) -> Vec<IterationStatus> {
        lock(&self.state).ended.clone()
    }

    pub fn started_jobs(&self) -> Vec<String> {
        lock(&self.state).started_jobs.clone()
    }

    pub fn cleaned_jobs(&self) -> Vec<String> {
        lock(&self.state).cleaned_jobs.clone()
    }

    pub fn last_stats(&self) -> Option<Value> {
        lock(&self.state).last_stats.clone()
    }

    pub fn deleted_out_of_stock(&self) -> Vec<String> {
        lock(&self.state).deleted_out_of_stock.clone()
    }

    fn guard(&self, call: &str) -> Result<MutexGuard<'_, StoreState>, RemoteError> {
        let state = lock(&self.state);
        if state.failing {
            return Err(unavailable(call));
        }
        Ok(state)
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn product_count(&self, _merchant: &str) -> Result<u64, RemoteError> {
        Ok(self.guard("count")?.count)
    }

    async fn new_iteration(&self, _merchant: &str, job_id: &JobId) -> Result<(), RemoteError> {
        let mut state = self.guard("new_crawl_iteration")?;
        state.started_jobs.push(job_id.as_str().to_string());
        state.latest = Some(IterationInfo {
            status: IterationStatus::Crawling,
            job_id: Some(job_id.as_str().to_string()),
        });
        Ok(())
    }

    async fn end_iteration(
        &self,
        _merchant: &str,
        status: IterationStatus,
        stats: Option<Value>,
    ) -> Result<(), RemoteError> {
        let mut state = self.guard("end_crawl_iteration")?;
        state.ended.push(status);
        if stats.is_some() {
            state.last_stats = stats;
        }
        if let Some(latest) = state.latest.as_mut() {
            latest.status = status;
        }
        Ok(())
    }

    async fn latest_iteration(&self, _merchant: &str) -> Result<Option<IterationInfo>, RemoteError> {
        Ok(self.guard("get_latest_iteration")?.latest.clone())
    }

    async fn add_crawled_product(
        &self,
        _merchant: &str,
        product: &Value,
    ) -> Result<StoreReceipt, RemoteError> {
        let mut state = self.guard("add_crawled_product")?;
        let already_in_db = product[keys::REMOTE_ID]
            .as_str()
            .is_some_and(|id| state.known.contains(id));
        state.added.push(product.clone());
        Ok(StoreReceipt { already_in_db })
    }

    async fn clean_crawled_products(&self, _merchant: &str, job_id: &JobId) -> Result<(), RemoteError> {
        self.guard("clean_crawled_products")?
            .cleaned_jobs
            .push(job_id.as_str().to_string());
        Ok(())
    }

    async fn delete_out_of_stock(&self, _merchant: &str, remote_id: &str) -> Result<(), RemoteError> {
        self.guard("delete_out_of_stock")?
            .deleted_out_of_stock
            .push(remote_id.to_string());
        Ok(())
    }
}

/// Job service that reports the same state for every job.
#[derive(Debug, Clone, Copy)]
pub struct FixedJobStatus(pub JobState);

#[async_trait]
impl JobStatusProvider for FixedJobStatus {
    async fn status(&self, _project: &str, _job_id: &str) -> Result<JobState, RemoteError> {
        Ok(self.0)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryMarkerStore {
    merchants: Mutex<HashSet<String>>,
}

impl InMemoryMarkerStore {
    pub fn insert(&self, merchant: &str) {
        lock(&self.merchants).insert(merchant.to_string());
    }

    pub fn contains(&self, merchant: &str) -> bool {
        lock(&self.merchants).contains(merchant)
    }
}

#[async_trait]
impl MarkerStore for InMemoryMarkerStore {
    async fn exists(&self, merchant: &str) -> Result<bool, RemoteError> {
        Ok(self.contains(merchant))
    }

    async fn create(&self, merchant: &str) -> Result<(), RemoteError> {
        self.insert(merchant);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingAlerter {
    messages: Mutex<Vec<(String, Severity)>>,
}

impl RecordingAlerter {
    pub fn messages(&self) -> Vec<(String, Severity)> {
        lock(&self.messages).clone()
    }
}

#[async_trait]
impl Alerter for RecordingAlerter {
    async fn notify(&self, message: &str, severity: Severity) {
        lock(&self.messages).push((message.to_string(), severity));
    }
}

/// Sink backend that keeps every batch it receives.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    batches: Mutex<Vec<Vec<Value>>>,
    known: HashSet<String>,
}

impl RecordingBackend {
    pub fn with_known<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            batches: Mutex::default(),
            known: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn batches(&self) -> Vec<Vec<Value>> {
        lock(&self.batches).clone()
    }

    /// `remote_id` of every record, batch by batch.
    pub fn batch_ids(&self) -> Vec<Vec<String>> {
        lock(&self.batches)
            .iter()
            .map(|batch| {
                batch
                    .iter()
                    .map(|record| record[keys::REMOTE_ID].as_str().unwrap_or_default().to_string())
                    .collect()
            })
            .collect()
    }
}

#[async_trait]
impl SinkBackend for RecordingBackend {
    async fn write(&self, _collection: &str, records: Vec<Value>) -> Result<WriteReceipt, RemoteError> {
        let already_present = records
            .iter()
            .filter(|record| {
                record[keys::REMOTE_ID]
                    .as_str()
                    .is_some_and(|id| self.known.contains(id))
            })
            .count() as u64;
        let written = records.len() as u64;
        lock(&self.batches).push(records);
        Ok(WriteReceipt {
            written,
            already_present,
            failed: 0,
        })
    }
}

#[derive(Debug, Default)]
pub struct RecordingImageStore {
    persisted: Mutex<Vec<ImageJob>>,
    failing: bool,
}

impl RecordingImageStore {
    pub fn failing() -> Self {
        Self {
            persisted: Mutex::default(),
            failing: true,
        }
    }

    pub fn persisted(&self) -> Vec<ImageJob> {
        lock(&self.persisted).clone()
    }
}

#[async_trait]
impl ImageStore for RecordingImageStore {
    async fn persist(&self, job: &ImageJob) -> Result<(), RemoteError> {
        if self.failing {
            return Err(RemoteError::http(500, "image service down", "images"));
        }
        lock(&self.persisted).push(job.clone());
        Ok(())
    }
}
