//! # Site Run
//!
//! One iteration over one merchant: registers the iteration, pushes every
//! page through assemble → merge → validate → de-duplicate → persist, and
//! closes the iteration. The [`RunState`] lives here and nowhere else.

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::domain::item::{keys, Item};
use crate::domain::run_state::RunState;
use crate::domain::services::{
    Alerter, ImageJob, ImageStore, JobStatusProvider, MarkerStore, RemoteStore,
};
use crate::domain::site::SiteSchema;
use crate::domain::value_objects::JobId;
use crate::error::{PipelineError, Rejection};
use crate::extraction::assembler::{ItemAssembler, ProductPage};
use crate::extraction::localization;
use crate::infrastructure::config::defaults;
use crate::iteration::controller::{ControllerSettings, IterationController, RunStart};
use crate::iteration::deletion::DeletionOutcome;
use crate::pipeline::duplicates::DuplicateFilter;
use crate::pipeline::image_dispatch::ImageDispatcher;
use crate::pipeline::sink::{PersistenceSink, RemoteStoreBackend, SinkBackend, SinkConfig};
use crate::pipeline::validity::{ValidityGate, Verdict};

/// Everything outside the process a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn RemoteStore>,
    pub jobs: Arc<dyn JobStatusProvider>,
    pub markers: Arc<dyn MarkerStore>,
    pub alerter: Arc<dyn Alerter>,
    pub images: Arc<dyn ImageStore>,
    /// Defaults to posting every item to the remote store.
    pub sink_backend: Option<Arc<dyn SinkBackend>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    pub sink: SinkConfig,
    pub controller: ControllerSettings,
    pub image_workers: usize,
    pub image_queue_capacity: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            sink: SinkConfig {
                collection: defaults::SINK_COLLECTION.into(),
                ..SinkConfig::default()
            },
            controller: ControllerSettings::default(),
            image_workers: defaults::IMAGE_WORKERS,
            image_queue_capacity: defaults::IMAGE_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Accepted,
    Rejected(Rejection),
}

/// User-visible result of a site run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub merchant: String,
    pub job_id: String,
    pub accepted: u64,
    pub rejected: u64,
    pub duplicates: u64,
    pub invalid: u64,
    pub errors: u64,
    pub duration_hours: f64,
    pub deletion: DeletionOutcome,
    pub shut_down: bool,
}

pub struct SiteRun {
    schema: Arc<SiteSchema>,
    run: RunState,
    controller: IterationController,
    gate: ValidityGate,
    duplicates: DuplicateFilter,
    sink: PersistenceSink,
    images: ImageDispatcher,
    span: Span,
    accepted: u64,
    rejected: u64,
}

impl SiteRun {
    /// Builds the stages and registers the iteration.
    ///
    /// When another instance is still crawling the merchant the run is shut
    /// down right away; every page then rejects with [`Rejection::RunClosed`].
    pub async fn start(
        schema: Arc<SiteSchema>,
        job_id: JobId,
        collaborators: Collaborators,
        options: RunOptions,
    ) -> Result<Self, PipelineError> {
        let span = info_span!("site_run", merchant = %schema.merchant_name, job = %job_id);
        let backend = collaborators.sink_backend.clone().unwrap_or_else(|| {
            Arc::new(RemoteStoreBackend::new(
                Arc::clone(&collaborators.store),
                schema.merchant_key.clone(),
            ))
        });
        let sink = PersistenceSink::new(
            options.sink,
            backend,
            schema.merchant_name.clone(),
            job_id.as_str(),
        )?;

        let mut run = RunState::new(&schema, job_id);
        let controller = IterationController::new(
            Arc::clone(&collaborators.store),
            collaborators.jobs,
            collaborators.markers,
            collaborators.alerter,
            options.controller,
        );

        let start = controller
            .on_run_start(&mut run)
            .instrument(span.clone())
            .await;

        let images = {
            let _entered = span.enter();
            ImageDispatcher::new(
                collaborators.images,
                options.image_workers,
                options.image_queue_capacity,
            )
        };

        if let RunStart::Started { recovered_killed } = start {
            span.in_scope(|| {
                info!(recovered_killed, "Iteration registered");
            });
        }

        Ok(Self {
            gate: ValidityGate::new(collaborators.store, schema.delete_out_of_stock),
            schema,
            run,
            controller,
            duplicates: DuplicateFilter::new(),
            sink,
            images,
            span,
            accepted: 0,
            rejected: 0,
        })
    }

    pub fn state(&self) -> &RunState {
        &self.run
    }

    pub fn is_shut_down(&self) -> bool {
        self.run.is_shut_down()
    }

    /// Runs one page through every stage.
    ///
    /// Only a broken site configuration surfaces as an error; everything
    /// else is a counted [`PageOutcome::Rejected`].
    pub async fn process(&mut self, page: &ProductPage) -> Result<PageOutcome, PipelineError> {
        let span = self.span.clone();
        let outcome = self.process_page(page).instrument(span).await?;
        match &outcome {
            PageOutcome::Accepted => self.accepted += 1,
            PageOutcome::Rejected(_) => self.rejected += 1,
        }
        Ok(outcome)
    }

    /// Processes a stream of pages in order, stopping at the first fatal error.
    pub async fn process_all<S>(&mut self, pages: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = ProductPage>,
    {
        let mut pages = std::pin::pin!(pages);
        while let Some(page) = pages.next().await {
            self.process(&page).await?;
        }
        Ok(())
    }

    async fn process_page(&mut self, page: &ProductPage) -> Result<PageOutcome, PipelineError> {
        let assembler = ItemAssembler::new(&self.schema);
        let mut item = match assembler.assemble_page(page, &mut self.run) {
            Ok(item) => item,
            Err(rejection) => {
                if rejection.is_assembly_failure() {
                    self.run.counters.invalid += 1;
                }
                debug!(url = page.primary.url(), "Page rejected: {rejection}");
                return Ok(PageOutcome::Rejected(rejection));
            }
        };

        localization::merge(&mut item);

        if let Verdict::Reject(rejection) = self.gate.check(&item, &mut self.run).await? {
            return Ok(PageOutcome::Rejected(rejection));
        }

        if let Err(rejection) = self.duplicates.check(&item) {
            match rejection {
                Rejection::Duplicate(_) => self.run.counters.duplicates += 1,
                _ => {
                    self.run.counters.integrity_defects += 1;
                    self.run.record_error();
                }
            }
            return Ok(PageOutcome::Rejected(rejection));
        }

        let images = image_job(&item, &self.run.merchant_key);
        self.sink.submit(item, &mut self.run).await;
        if let Some(job) = images {
            self.images.dispatch(job).await;
        }
        Ok(PageOutcome::Accepted)
    }

    /// Flushes the sink, drains image work and closes the iteration.
    ///
    /// Only call this once the feed is exhausted: the deletion decision
    /// treats every product not seen so far as gone.
    pub async fn finish(mut self) -> RunSummary {
        let span = self.span.clone();
        async move {
            self.drain().await;
            let report = self.controller.on_run_end(&mut self.run).await;
            self.summary(report.deletion)
        }
        .instrument(span)
        .await
    }

    /// Ends the run before its feed is exhausted. Accepted items are still
    /// flushed and image work drained; the iteration closes with status
    /// error and no product is cleaned up.
    pub async fn abort(mut self, reason: &str) -> RunSummary {
        let span = self.span.clone();
        async move {
            self.drain().await;
            let report = self.controller.on_run_abort(&mut self.run, reason).await;
            self.summary(report.deletion)
        }
        .instrument(span)
        .await
    }

    async fn drain(&mut self) {
        self.sink.shutdown(&mut self.run).await;
        let images = self.images.drain().await;
        if images.failed > 0 {
            warn!(
                "{} of {} image job(s) failed",
                images.failed, images.submitted
            );
        }
    }

    fn summary(&self, deletion: DeletionOutcome) -> RunSummary {
        let summary = RunSummary {
            merchant: self.run.merchant_name.clone(),
            job_id: self.run.job_id.to_string(),
            accepted: self.accepted,
            rejected: self.rejected,
            duplicates: self.run.counters.duplicates,
            invalid: self.run.counters.invalid,
            errors: self.run.counters.errors,
            duration_hours: self.run.duration_hours(),
            deletion,
            shut_down: self.run.is_shut_down(),
        };
        info!(
            accepted = summary.accepted,
            rejected = summary.rejected,
            "Run finished in {} hour(s) ({:?})",
            summary.duration_hours,
            summary.deletion
        );
        summary
    }
}

fn image_job(item: &Item, merchant: &str) -> Option<ImageJob> {
    let image_urls = item.get(keys::IMAGE_URLS)?.populated_texts();
    if image_urls.is_empty() {
        return None;
    }
    Some(ImageJob {
        merchant: merchant.to_string(),
        remote_id: item.text(keys::REMOTE_ID).unwrap_or_default().to_string(),
        image_urls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::services::JobState;
    use crate::extraction::document::HtmlDocument;
    use crate::test_utils::{
        FixedJobStatus, InMemoryMarkerStore, InMemoryRemoteStore, RecordingAlerter,
        RecordingImageStore,
    };

    const SITE: &str = r##"{
        "merchant_name": "acme",
        "country": "eg",
        "urls": ["http://acme.test/"],
        "attributes": [
            {"name": "title", "selector": {"css": "h1::text"}, "required": true},
            {"name": "price", "selector": {"css": ".price::text"}, "required": true},
            {"name": "category", "selector": {"css": ".crumb::text"}, "required": true},
            {"name": "remote_id", "selector": {"css": "#sku::text"}, "required": true},
            {"name": "main_image", "selector": {"css": "img.main::attr(src)"}},
            {"name": "stock_status", "selector": {"css": ".stock::text"}, "required": true,
             "instock_values": ["In stock"]}
        ]
    }"##;

    fn page(sku: &str, stock: &str) -> ProductPage {
        let body = format!(
            r#"<h1>Phone {sku}</h1><span class="price">1,299.00</span>
               <a class="crumb">Phones</a><span id="sku">{sku}</span>
               <img class="main" src="http://acme.test/{sku}.jpg"><p class="stock">{stock}</p>"#
        );
        ProductPage::new(HtmlDocument::new(format!("http://acme.test/p/{sku}"), body))
    }

    fn collaborators(
        store: &Arc<InMemoryRemoteStore>,
        images: &Arc<RecordingImageStore>,
    ) -> Collaborators {
        Collaborators {
            store: store.clone(),
            jobs: Arc::new(FixedJobStatus(JobState::Finished)),
            markers: Arc::new(InMemoryMarkerStore::default()),
            alerter: Arc::new(RecordingAlerter::default()),
            images: images.clone(),
            sink_backend: None,
        }
    }

    #[tokio::test]
    async fn pages_flow_through_every_stage() {
        let store = Arc::new(InMemoryRemoteStore::default());
        let images = Arc::new(RecordingImageStore::default());
        let schema = Arc::new(SiteSchema::from_json_str(SITE).unwrap());
        let mut run = SiteRun::start(
            schema,
            JobId::new("job-1"),
            collaborators(&store, &images),
            RunOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(run.process(&page("A1", "In stock")).await.unwrap(), PageOutcome::Accepted);
        assert_eq!(
            run.process(&page("A1", "In stock")).await.unwrap(),
            PageOutcome::Rejected(Rejection::Duplicate("A1".into()))
        );
        assert!(matches!(
            run.process(&page("B2", "Sold out")).await.unwrap(),
            PageOutcome::Rejected(Rejection::UnresolvedStock(_))
        ));

        let summary = run.finish().await;
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.invalid, 1);
        assert!(!summary.shut_down);

        let added = store.added();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0]["price_en"], "1299.00");
        assert_eq!(added[0]["title_ar"], "Phone A1");
        assert_eq!(images.persisted().len(), 1);
        assert_eq!(store.ended().len(), 1);
    }
}
