use crate::model::attendance::PhotoSlot;
use crate::repo::attendance::AttendanceStore;
use crate::upload::dispatcher::PhotoUploadJob;
use crate::upload::photo::object_key;
use crate::upload::storage::ObjectStorage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Single consumer of the upload queue.
///
/// Per job: claim the slot (`UPLOADING`), transfer under a bounded time
/// budget, then reconcile `COMPLETED` or `FAILED` onto the record. Every
/// failure is terminal-local: logged, recorded as status where possible,
/// never requeued and never propagated to the request path.
pub struct UploadWorker {
    store: Arc<dyn AttendanceStore>,
    storage: Arc<dyn ObjectStorage>,
    transfer_timeout: Duration,
}

impl UploadWorker {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        storage: Arc<dyn ObjectStorage>,
        transfer_timeout: Duration,
    ) -> Self {
        Self {
            store,
            storage,
            transfer_timeout,
        }
    }

    pub async fn run(self, mut jobs: mpsc::Receiver<PhotoUploadJob>) {
        info!("Upload worker started");
        while let Some(job) = jobs.recv().await {
            self.process(job).await;
        }
        info!("Upload worker stopped");
    }

    async fn process(&self, job: PhotoUploadJob) {
        let record_id = job.record_id;
        let slot = job.slot;
        info!(
            record_id,
            staff_id = job.staff_id,
            slot = slot.as_str(),
            "Starting background photo upload"
        );

        // Claim the job. If the status write fails the record is left as-is
        // (typically still PENDING) and the failure is visible in logs only.
        if let Err(e) = self.store.mark_slot_uploading(record_id, slot).await {
            error!(
                record_id,
                slot = slot.as_str(),
                error = %e,
                "Failed to mark slot UPLOADING, aborting job"
            );
            return;
        }

        let key = object_key(
            job.staff_id,
            chrono::Utc::now(),
            &job.filename,
            &job.content_type,
        );
        let transfer = self.storage.store(&key, &job.content_type, &job.bytes);

        match timeout(self.transfer_timeout, transfer).await {
            Ok(Ok(stored_key)) => {
                let url = self.storage.object_url(&stored_key);
                match self
                    .store
                    .complete_slot_upload(record_id, slot, &stored_key, &url)
                    .await
                {
                    Ok(()) => info!(
                        record_id,
                        slot = slot.as_str(),
                        key = %stored_key,
                        "Photo upload completed"
                    ),
                    Err(e) => error!(
                        record_id,
                        slot = slot.as_str(),
                        error = %e,
                        "Transfer succeeded but COMPLETED status write failed"
                    ),
                }
            }
            Ok(Err(e)) => {
                warn!(
                    record_id,
                    slot = slot.as_str(),
                    error = %e,
                    "Photo transfer failed"
                );
                self.record_failure(record_id, slot).await;
            }
            Err(_) => {
                warn!(
                    record_id,
                    slot = slot.as_str(),
                    timeout_secs = self.transfer_timeout.as_secs(),
                    "Photo transfer timed out"
                );
                self.record_failure(record_id, slot).await;
            }
        }
    }

    async fn record_failure(&self, record_id: u64, slot: PhotoSlot) {
        if let Err(e) = self.store.fail_slot_upload(record_id, slot).await {
            error!(
                record_id,
                slot = slot.as_str(),
                error = %e,
                "Failed to record FAILED status"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attendance::UploadStatus;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemoryStore {
        slots: Mutex<HashMap<(u64, PhotoSlot), (UploadStatus, Option<String>, Option<String>)>>,
        fail_uploading_write: bool,
        fail_failed_write: bool,
    }

    impl MemoryStore {
        fn slot(&self, record_id: u64, slot: PhotoSlot) -> Option<(UploadStatus, Option<String>, Option<String>)> {
            self.slots.lock().unwrap().get(&(record_id, slot)).cloned()
        }
    }

    #[async_trait]
    impl AttendanceStore for MemoryStore {
        async fn mark_slot_uploading(
            &self,
            record_id: u64,
            slot: PhotoSlot,
        ) -> anyhow::Result<()> {
            if self.fail_uploading_write {
                anyhow::bail!("status write refused");
            }
            self.slots
                .lock()
                .unwrap()
                .insert((record_id, slot), (UploadStatus::Uploading, None, None));
            Ok(())
        }

        async fn complete_slot_upload(
            &self,
            record_id: u64,
            slot: PhotoSlot,
            key: &str,
            url: &str,
        ) -> anyhow::Result<()> {
            self.slots.lock().unwrap().insert(
                (record_id, slot),
                (
                    UploadStatus::Completed,
                    Some(key.to_string()),
                    Some(url.to_string()),
                ),
            );
            Ok(())
        }

        async fn fail_slot_upload(&self, record_id: u64, slot: PhotoSlot) -> anyhow::Result<()> {
            if self.fail_failed_write {
                anyhow::bail!("status write refused");
            }
            self.slots
                .lock()
                .unwrap()
                .insert((record_id, slot), (UploadStatus::Failed, None, None));
            Ok(())
        }
    }

    struct MockStorage {
        fail: bool,
        delay: Option<Duration>,
        store_calls: AtomicUsize,
    }

    impl MockStorage {
        fn ok() -> Self {
            Self {
                fail: false,
                delay: None,
                store_calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                delay: None,
                store_calls: AtomicUsize::new(0),
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                fail: false,
                delay: Some(delay),
                store_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ObjectStorage for MockStorage {
        async fn store(
            &self,
            key: &str,
            _content_type: &str,
            _data: &[u8],
        ) -> anyhow::Result<String> {
            self.store_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                anyhow::bail!("transient network fault");
            }
            Ok(key.to_string())
        }

        fn object_url(&self, key: &str) -> String {
            format!("http://files.test/{}", key)
        }

        fn signed_url(&self, key: &str, _ttl_secs: u64) -> String {
            format!("http://files.test/{}?sig=test", key)
        }

        async fn delete(&self, _key: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn job(slot: PhotoSlot) -> PhotoUploadJob {
        PhotoUploadJob {
            record_id: 11,
            staff_id: 42,
            bytes: vec![0u8; 8],
            filename: "selfie.jpg".into(),
            content_type: "image/jpeg".into(),
            slot,
        }
    }

    fn worker(
        store: Arc<MemoryStore>,
        storage: Arc<MockStorage>,
        transfer_timeout: Duration,
    ) -> UploadWorker {
        UploadWorker::new(store, storage, transfer_timeout)
    }

    #[tokio::test]
    async fn successful_upload_completes_with_key_and_url() {
        let store = Arc::new(MemoryStore::default());
        let storage = Arc::new(MockStorage::ok());
        worker(store.clone(), storage, Duration::from_secs(5))
            .process(job(PhotoSlot::ClockIn))
            .await;

        let (status, key, url) = store.slot(11, PhotoSlot::ClockIn).unwrap();
        assert_eq!(status, UploadStatus::Completed);
        let key = key.unwrap();
        assert!(key.starts_with("42/"));
        assert_eq!(url.unwrap(), format!("http://files.test/{}", key));
    }

    #[tokio::test]
    async fn transfer_failure_records_failed_with_null_fields() {
        let store = Arc::new(MemoryStore::default());
        let storage = Arc::new(MockStorage::failing());
        worker(store.clone(), storage, Duration::from_secs(5))
            .process(job(PhotoSlot::ClockOut))
            .await;

        let (status, key, url) = store.slot(11, PhotoSlot::ClockOut).unwrap();
        assert_eq!(status, UploadStatus::Failed);
        assert!(key.is_none());
        assert!(url.is_none());
    }

    #[tokio::test]
    async fn transfer_timeout_records_failed() {
        let store = Arc::new(MemoryStore::default());
        let storage = Arc::new(MockStorage::slow(Duration::from_millis(200)));
        worker(store.clone(), storage, Duration::from_millis(10))
            .process(job(PhotoSlot::ClockIn))
            .await;

        let (status, _, _) = store.slot(11, PhotoSlot::ClockIn).unwrap();
        assert_eq!(status, UploadStatus::Failed);
    }

    #[tokio::test]
    async fn uploading_write_failure_aborts_before_transfer() {
        let store = Arc::new(MemoryStore {
            fail_uploading_write: true,
            ..Default::default()
        });
        let storage = Arc::new(MockStorage::ok());
        worker(store.clone(), storage.clone(), Duration::from_secs(5))
            .process(job(PhotoSlot::ClockIn))
            .await;

        assert_eq!(storage.store_calls.load(Ordering::SeqCst), 0);
        assert!(store.slot(11, PhotoSlot::ClockIn).is_none());
    }

    #[tokio::test]
    async fn failed_status_write_failure_is_swallowed() {
        let store = Arc::new(MemoryStore {
            fail_failed_write: true,
            ..Default::default()
        });
        let storage = Arc::new(MockStorage::failing());
        // Must not panic or propagate; slot is left in its claimed state.
        worker(store.clone(), storage, Duration::from_secs(5))
            .process(job(PhotoSlot::ClockIn))
            .await;

        let (status, _, _) = store.slot(11, PhotoSlot::ClockIn).unwrap();
        assert_eq!(status, UploadStatus::Uploading);
    }

    #[tokio::test]
    async fn slots_transition_independently() {
        let store = Arc::new(MemoryStore::default());
        let worker = UploadWorker::new(
            store.clone(),
            Arc::new(MockStorage::ok()),
            Duration::from_secs(5),
        );
        worker.process(job(PhotoSlot::ClockIn)).await;

        let failing = UploadWorker::new(
            store.clone(),
            Arc::new(MockStorage::failing()),
            Duration::from_secs(5),
        );
        failing.process(job(PhotoSlot::ClockOut)).await;

        let (a, _, _) = store.slot(11, PhotoSlot::ClockIn).unwrap();
        let (b, _, _) = store.slot(11, PhotoSlot::ClockOut).unwrap();
        assert_eq!(a, UploadStatus::Completed);
        assert_eq!(b, UploadStatus::Failed);
    }
}
