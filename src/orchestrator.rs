//! Fans per-record sync work out across the concurrency queue and
//! aggregates the run report.

use crate::config::WorkerConfig;
use crate::records::{RecordPage, SyncRecord, SyncResponse};
use crate::report::{SyncReport, SyncResult};
use crate::store::RecordStore;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use syncline_client::{ApiClient, RequestOptions};
use syncline_core::SyncError;
use syncline_queue::SyncQueue;
use tokio::time::Instant;

pub struct Orchestrator {
    client: ApiClient,
    queue: SyncQueue,
    store: Arc<dyn RecordStore>,
    page_size: u32,
    fetch_timeout: Duration,
    sync_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        client: ApiClient,
        queue: SyncQueue,
        store: Arc<dyn RecordStore>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            client,
            queue,
            store,
            page_size: config.page_size,
            fetch_timeout: config.fetch_timeout(),
            sync_timeout: config.sync_timeout(),
        }
    }

    /// Fetches the full collection, syncs every record through the queue,
    /// and returns the aggregate report. Pagination failures propagate;
    /// per-record failures are captured into results.
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let started_at = Utc::now();
        tracing::info!("starting sync run");

        let records = self.fetch_all_records().await?;
        let total = records.len();
        tracing::info!(total, "record collection fetched");

        let results = Arc::new(Mutex::new(Vec::with_capacity(total)));
        let mut handles = Vec::with_capacity(total);
        for record in records {
            let client = self.client.clone();
            let store = Arc::clone(&self.store);
            let results = Arc::clone(&results);
            let timeout = self.sync_timeout;
            handles.push(self.queue.submit(
                async move { sync_record(client, store, record, timeout, results).await },
                0,
            ));
        }

        // Per-record failures are already in the results; the handles only
        // gate completion.
        for handle in handles {
            let _ = handle.await;
        }

        let finished_at = Utc::now();
        let results = std::mem::take(&mut *results.lock().unwrap());
        let report = SyncReport::new(started_at, finished_at, total, results);

        tracing::info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            retries = report.retries,
            "sync run finished"
        );
        for (record_id, error) in report.failures() {
            tracing::error!(record_id, error, "record failed to sync");
        }

        Ok(report)
    }

    /// Sequential pagination from page 1 until `has_more` turns false.
    async fn fetch_all_records(&self) -> Result<Vec<SyncRecord>, SyncError> {
        let mut records = Vec::new();
        let mut page = 1u32;
        loop {
            let path = format!("/api/records?page={page}&per_page={}", self.page_size);
            let response: RecordPage = self
                .client
                .get(
                    &path,
                    RequestOptions::new()
                        .timeout(self.fetch_timeout)
                        .context(format!("fetch records page {page}")),
                )
                .await?;

            tracing::debug!(
                page,
                count = response.data.len(),
                total = response.pagination.total,
                "fetched records page"
            );
            records.extend(response.data);

            if !response.pagination.has_more {
                break;
            }
            page += 1;
        }
        Ok(records)
    }
}

/// The per-record task body. Emits exactly one [`SyncResult`]; errors are
/// captured into it and returned only so the queue can count the failure.
async fn sync_record(
    client: ApiClient,
    store: Arc<dyn RecordStore>,
    record: SyncRecord,
    timeout: Duration,
    results: Arc<Mutex<Vec<SyncResult>>>,
) -> Result<(), SyncError> {
    let retries = Arc::new(AtomicUsize::new(0));
    let started = Instant::now();
    let record_id = record.id.clone();

    let outcome = sync_one(&client, store.as_ref(), &record, timeout, &retries).await;

    let wall = started.elapsed();
    let retries = retries.load(Ordering::SeqCst);
    match outcome {
        Ok(()) => {
            tracing::debug!(record_id = %record_id, retries, "record synced");
            results
                .lock()
                .unwrap()
                .push(SyncResult::succeeded(record_id, retries, wall));
            Ok(())
        }
        Err(err) => {
            tracing::error!(
                record_id = %record_id,
                error = %err,
                kind = err.kind(),
                retries,
                "record sync failed"
            );
            results
                .lock()
                .unwrap()
                .push(SyncResult::failed(record_id, &err, retries, wall));
            Err(err)
        }
    }
}

async fn sync_one(
    client: &ApiClient,
    store: &dyn RecordStore,
    record: &SyncRecord,
    timeout: Duration,
    retries: &Arc<AtomicUsize>,
) -> Result<(), SyncError> {
    let response: SyncResponse = client
        .post(
            &format!("/api/records/{}/sync", record.id),
            Some(serde_json::json!({})),
            RequestOptions::new()
                .timeout(timeout)
                .context(format!("sync record {}", record.id))
                .count_retries_into(Arc::clone(retries)),
        )
        .await?;

    if !response.success {
        return Err(SyncError::Validation {
            message: response
                .message
                .unwrap_or_else(|| "sync endpoint reported failure".to_string()),
        });
    }

    store.save(record).await
}
