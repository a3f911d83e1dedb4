//! # Image Dispatcher
//!
//! Bounded pool of tokio workers feeding an [`ImageStore`]. Item processing
//! only waits on channel back-pressure; persistence failures are logged and
//! counted, never propagated.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};

use crate::domain::services::{ImageJob, ImageStore};

/// 이미지 워커 풀 통계
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDispatchStats {
    pub submitted: u64,
    pub persisted: u64,
    pub failed: u64,
    pub average_duration: Duration,
}

pub struct ImageDispatcher {
    sender: Option<mpsc::Sender<ImageJob>>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<RwLock<ImageDispatchStats>>,
}

impl ImageDispatcher {
    pub fn new(store: Arc<dyn ImageStore>, workers: usize, queue_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let stats = Arc::new(RwLock::new(ImageDispatchStats::default()));

        let workers = (0..workers.max(1))
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let store = Arc::clone(&store);
                let stats = Arc::clone(&stats);
                tokio::spawn(
                    async move {
                        loop {
                            // 다음 작업 대기 (채널이 닫히면 종료)
                            let next = receiver.lock().await.recv().await;
                            let Some(job) = next else { break };
                            let started = Instant::now();
                            let result = store.persist(&job).await;
                            record(&stats, started.elapsed(), result.is_ok()).await;
                            if let Err(e) = result {
                                warn!("Image persistence failed for {}: {e}", job.remote_id);
                            }
                        }
                        debug!("Image worker {worker_id} stopped");
                    }
                    .in_current_span(),
                )
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
            stats,
        }
    }

    /// Queues a job, waiting only while the queue is full.
    pub async fn dispatch(&self, job: ImageJob) {
        let Some(sender) = &self.sender else {
            warn!("Image dispatcher already drained, dropping {}", job.remote_id);
            return;
        };
        self.stats.write().await.submitted += 1;
        if sender.send(job).await.is_err() {
            warn!("Image workers are gone, job dropped");
        }
    }

    /// Closes the queue and waits for every queued job to finish.
    pub async fn drain(&mut self) -> ImageDispatchStats {
        self.sender.take();
        for result in join_all(self.workers.drain(..)).await {
            if let Err(e) = result {
                warn!("Image worker panicked: {e}");
            }
        }
        self.stats().await
    }

    pub async fn stats(&self) -> ImageDispatchStats {
        self.stats.read().await.clone()
    }
}

async fn record(stats: &RwLock<ImageDispatchStats>, duration: Duration, ok: bool) {
    let mut stats = stats.write().await;
    let done = stats.persisted + stats.failed;
    if ok {
        stats.persisted += 1;
    } else {
        stats.failed += 1;
    }
    // 평균 처리 시간 (누적 평균)
    let count = u32::try_from(done + 1).unwrap_or(u32::MAX);
    let previous = u32::try_from(done).unwrap_or(u32::MAX);
    stats.average_duration = (stats.average_duration * previous + duration) / count;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingImageStore;

    fn job(id: &str) -> ImageJob {
        ImageJob {
            merchant: "acme".into(),
            remote_id: id.into(),
            image_urls: vec![format!("http://x.com/{id}.jpg")],
        }
    }

    #[tokio::test]
    async fn drain_waits_for_all_jobs() {
        let store = Arc::new(RecordingImageStore::default());
        let mut dispatcher = ImageDispatcher::new(store.clone(), 3, 2);
        for id in 0..10 {
            dispatcher.dispatch(job(&id.to_string())).await;
        }
        let stats = dispatcher.drain().await;

        assert_eq!(stats.submitted, 10);
        assert_eq!(stats.persisted, 10);
        assert_eq!(store.persisted().len(), 10);
    }

    #[tokio::test]
    async fn failures_are_counted_not_propagated() {
        let store = Arc::new(RecordingImageStore::failing());
        let mut dispatcher = ImageDispatcher::new(store, 1, 1);
        dispatcher.dispatch(job("1")).await;
        let stats = dispatcher.drain().await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.persisted, 0);
    }
}
