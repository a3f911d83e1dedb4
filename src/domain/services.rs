//! Collaborator interfaces
//!
//! The pipeline talks to everything outside the process through these traits.
//! Implementations live in `infrastructure`; in-memory fakes in `test_utils`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::run_state::IterationStatus;
use crate::domain::value_objects::JobId;
use crate::error::RemoteError;

/// Latest iteration as reported by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationInfo {
    pub status: IterationStatus,
    #[serde(default, alias = "kipp_job")]
    pub job_id: Option<String>,
}

/// Outcome of storing one crawled product.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreReceipt {
    pub already_in_db: bool,
}

/// The remote product store and iteration registry.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn product_count(&self, merchant: &str) -> Result<u64, RemoteError>;

    async fn new_iteration(&self, merchant: &str, job_id: &JobId) -> Result<(), RemoteError>;

    async fn end_iteration(
        &self,
        merchant: &str,
        status: IterationStatus,
        stats: Option<Value>,
    ) -> Result<(), RemoteError>;

    async fn latest_iteration(&self, merchant: &str) -> Result<Option<IterationInfo>, RemoteError>;

    async fn add_crawled_product(
        &self,
        merchant: &str,
        product: &Value,
    ) -> Result<StoreReceipt, RemoteError>;

    async fn clean_crawled_products(&self, merchant: &str, job_id: &JobId) -> Result<(), RemoteError>;

    async fn delete_out_of_stock(&self, merchant: &str, remote_id: &str) -> Result<(), RemoteError>;
}

/// Job state in the job service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Running,
    Pending,
    Finished,
    Unknown,
}

impl JobState {
    pub fn is_alive(self) -> bool {
        matches!(self, Self::Running | Self::Pending)
    }
}

#[async_trait]
pub trait JobStatusProvider: Send + Sync {
    async fn status(&self, project: &str, job_id: &str) -> Result<JobState, RemoteError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Fire-and-forget notifications.
#[async_trait]
pub trait Alerter: Send + Sync {
    async fn notify(&self, message: &str, severity: Severity);
}

/// Durable record of a merchant's first completed iteration.
#[async_trait]
pub trait MarkerStore: Send + Sync {
    async fn exists(&self, merchant: &str) -> Result<bool, RemoteError>;
    async fn create(&self, merchant: &str) -> Result<(), RemoteError>;
}

/// One accepted item's images, handed off for persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageJob {
    pub merchant: String,
    pub remote_id: String,
    pub image_urls: Vec<String>,
}

/// Slow image persistence, driven from a worker pool.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn persist(&self, job: &ImageJob) -> Result<(), RemoteError>;
}
