//! # Persistence Sink
//!
//! Serializes accepted items, attaches merchant context and hands them to a
//! [`SinkBackend`], either one at a time or in batches of `buffer_size`.
//! Only [`PersistenceSink::shutdown`] sends a partial batch.
//!
//! With a `unique_key` the sink writes unbuffered and refuses a record whose
//! key value was already written in this run.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::item::{keys, Item};
use crate::domain::run_state::RunState;
use crate::domain::services::RemoteStore;
use crate::error::{ConfigError, RemoteError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub collection: String,
    pub unique_key: Option<String>,
    pub buffer_size: Option<usize>,
    pub append_timestamp: bool,
}

impl SinkConfig {
    /// Buffering and unique-key enforcement cannot be combined.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let (Some(_), Some(unique_key)) = (self.buffer_size, &self.unique_key) {
            return Err(ConfigError::ConflictingSink {
                unique_key: unique_key.clone(),
            });
        }
        if self.buffer_size == Some(0) {
            return Err(ConfigError::invalid_value("sink.buffer_size", "must be at least 1"));
        }
        Ok(())
    }
}

/// Result of writing one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReceipt {
    pub written: u64,
    /// Records the store already knew from an earlier iteration.
    pub already_present: u64,
    pub failed: u64,
}

/// Where serialized items end up.
#[async_trait]
pub trait SinkBackend: Send + Sync {
    async fn write(&self, collection: &str, records: Vec<Value>) -> Result<WriteReceipt, RemoteError>;
}

/// Posts every record to the remote store's `add_crawled_product`.
pub struct RemoteStoreBackend {
    store: Arc<dyn RemoteStore>,
    merchant: String,
}

impl RemoteStoreBackend {
    pub fn new(store: Arc<dyn RemoteStore>, merchant: impl Into<String>) -> Self {
        Self {
            store,
            merchant: merchant.into(),
        }
    }
}

#[async_trait]
impl SinkBackend for RemoteStoreBackend {
    async fn write(&self, _collection: &str, records: Vec<Value>) -> Result<WriteReceipt, RemoteError> {
        let mut receipt = WriteReceipt::default();
        for record in &records {
            match self.store.add_crawled_product(&self.merchant, record).await {
                Ok(stored) => {
                    receipt.written += 1;
                    if stored.already_in_db {
                        receipt.already_present += 1;
                    }
                }
                Err(e) => {
                    warn!("Failed to store product {}: {e}", record[keys::REMOTE_ID]);
                    receipt.failed += 1;
                }
            }
        }
        Ok(receipt)
    }
}

pub struct PersistenceSink {
    config: SinkConfig,
    backend: Arc<dyn SinkBackend>,
    merchant_name: String,
    job_id: String,
    buffer: Vec<Value>,
    written_keys: HashSet<String>,
    batches_sent: u64,
}

impl PersistenceSink {
    pub fn new(
        config: SinkConfig,
        backend: Arc<dyn SinkBackend>,
        merchant_name: impl Into<String>,
        job_id: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let capacity = config.buffer_size.unwrap_or(0);
        Ok(Self {
            config,
            backend,
            merchant_name: merchant_name.into(),
            job_id: job_id.into(),
            buffer: Vec::with_capacity(capacity),
            written_keys: HashSet::new(),
            batches_sent: 0,
        })
    }

    pub async fn submit(&mut self, item: Item, run: &mut RunState) {
        let record = self.serialize(item);
        if !self.claim_unique_key(&record) {
            run.record_error();
            return;
        }
        run.counters.scraped += 1;

        let Some(limit) = self.config.buffer_size else {
            self.send(vec![record], run).await;
            return;
        };

        self.buffer.push(record);
        if self.buffer.len() >= limit {
            let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(limit));
            self.send(batch, run).await;
        }
    }

    /// Flushes the remainder of the buffer, if any.
    pub async fn shutdown(&mut self, run: &mut RunState) {
        if self.buffer.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.buffer);
        info!("Flushing {} buffered items on shutdown", batch.len());
        self.send(batch, run).await;
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn batches_sent(&self) -> u64 {
        self.batches_sent
    }

    /// `false` when the record repeats a unique key value already written.
    /// Records without the key are always written.
    fn claim_unique_key(&mut self, record: &Value) -> bool {
        let Some(key) = &self.config.unique_key else {
            return true;
        };
        let value = match record.get(key) {
            None | Some(Value::Null) => return true,
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
        };
        if self.written_keys.insert(value.clone()) {
            return true;
        }
        error!(
            "Duplicate {key} '{value}' refused by unique key on {}",
            self.config.collection
        );
        false
    }

    fn serialize(&self, item: Item) -> Value {
        let mut record = serde_json::to_value(item).unwrap_or_else(|_| json!({}));
        if let Value::Object(fields) = &mut record {
            fields.insert(keys::MERCHANT_NAME.into(), Value::String(self.merchant_name.clone()));
            fields.insert(keys::JOB_ID.into(), Value::String(self.job_id.clone()));
            if self.config.append_timestamp {
                fields.insert("ingest_meta".into(), json!({ "ts": Utc::now().to_rfc3339() }));
            }
        }
        record
    }

    async fn send(&mut self, batch: Vec<Value>, run: &mut RunState) {
        let size = batch.len();
        self.batches_sent += 1;
        match self.backend.write(&self.config.collection, batch).await {
            Ok(receipt) => {
                run.counters.survived += receipt.already_present;
                debug!(
                    "Stored {} item(s) in {} ({} already present)",
                    receipt.written, self.config.collection, receipt.already_present
                );
                if receipt.failed > 0 {
                    error!("{} of {size} item(s) could not be stored", receipt.failed);
                    run.record_error();
                }
            }
            Err(e) => {
                error!("Failed to store batch of {size} item(s): {e}");
                run.record_error();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::site::SiteSchema;
    use crate::domain::value_objects::JobId;
    use crate::test_utils::RecordingBackend;

    fn run() -> RunState {
        let schema =
            SiteSchema::from_json_str(r#"{"merchant_name": "acme", "attributes": []}"#).unwrap();
        RunState::new(&schema, JobId::new("job-7"))
    }

    fn item(id: &str) -> Item {
        let mut item = Item::new();
        item.set("remote_id", id);
        item
    }

    fn buffered(size: usize) -> SinkConfig {
        SinkConfig {
            collection: "items".into(),
            buffer_size: Some(size),
            ..SinkConfig::default()
        }
    }

    #[tokio::test]
    async fn buffer_flushes_only_when_full_and_on_shutdown() {
        let backend = Arc::new(RecordingBackend::default());
        let mut sink = PersistenceSink::new(buffered(3), backend.clone(), "acme", "job-7").unwrap();
        let mut run = run();

        sink.submit(item("1"), &mut run).await;
        sink.submit(item("2"), &mut run).await;
        assert!(backend.batches().is_empty());

        sink.submit(item("3"), &mut run).await;
        assert_eq!(backend.batch_ids(), vec![vec!["1", "2", "3"]]);

        sink.submit(item("4"), &mut run).await;
        assert_eq!(sink.buffered(), 1);

        sink.shutdown(&mut run).await;
        assert_eq!(backend.batch_ids(), vec![vec!["1", "2", "3"], vec!["4"]]);
        assert_eq!(run.counters.scraped, 4);
    }

    #[tokio::test]
    async fn unbuffered_sink_attaches_merchant_context() {
        let backend = Arc::new(RecordingBackend::default());
        let config = SinkConfig {
            collection: "items".into(),
            append_timestamp: true,
            ..SinkConfig::default()
        };
        let mut sink = PersistenceSink::new(config, backend.clone(), "acme", "job-7").unwrap();
        let mut run = run();

        sink.submit(item("1"), &mut run).await;
        let batches = backend.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0]["merchant_name"], "acme");
        assert_eq!(batches[0][0]["job_id"], "job-7");
        assert!(batches[0][0]["ingest_meta"]["ts"].is_string());

        sink.shutdown(&mut run).await;
        assert_eq!(backend.batches().len(), 1);
    }

    #[tokio::test]
    async fn unique_key_refuses_repeated_values() {
        let backend = Arc::new(RecordingBackend::default());
        let config = SinkConfig {
            collection: "items".into(),
            unique_key: Some("url".into()),
            ..SinkConfig::default()
        };
        let mut sink = PersistenceSink::new(config, backend.clone(), "acme", "job-7").unwrap();
        let mut run = run();

        for (id, url) in [("1", "http://x.com/a"), ("2", "http://x.com/b"), ("3", "http://x.com/a")] {
            let mut record = item(id);
            record.set("url", url);
            sink.submit(record, &mut run).await;
        }
        // no key value, never refused
        sink.submit(item("4"), &mut run).await;
        sink.submit(item("5"), &mut run).await;

        assert_eq!(
            backend.batch_ids(),
            vec![vec!["1"], vec!["2"], vec!["4"], vec!["5"]]
        );
        assert_eq!(run.counters.scraped, 4);
        assert_eq!(run.counters.errors, 1);
    }

    #[test]
    fn buffering_with_unique_key_is_rejected() {
        let config = SinkConfig {
            unique_key: Some("remote_id".into()),
            ..buffered(10)
        };
        let backend = Arc::new(RecordingBackend::default());
        assert!(matches!(
            PersistenceSink::new(config, backend, "acme", "job"),
            Err(ConfigError::ConflictingSink { .. })
        ));
    }
}
