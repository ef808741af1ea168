use crate::model::attendance::PhotoSlot;
use tokio::sync::mpsc;
use tracing::error;

/// One asynchronous unit of work: transfer a photo to object storage and
/// reconcile the slot status back onto the record.
pub struct PhotoUploadJob {
    pub record_id: u64,
    pub staff_id: u64,
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: String,
    pub slot: PhotoSlot,
}

/// Sender half of the single-consumer upload queue.
///
/// Dispatch is fire-and-forget: the HTTP handler returns before the upload
/// outcome is known, and a dropped job (full or closed queue) is only
/// observable through logs and the record's still-PENDING status.
#[derive(Clone)]
pub struct UploadDispatcher {
    tx: mpsc::Sender<PhotoUploadJob>,
}

impl UploadDispatcher {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PhotoUploadJob>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn dispatch(&self, job: PhotoUploadJob) {
        use mpsc::error::TrySendError;

        match self.tx.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                error!(
                    record_id = job.record_id,
                    slot = job.slot.as_str(),
                    "Upload queue full, dropping photo upload job"
                );
            }
            Err(TrySendError::Closed(job)) => {
                error!(
                    record_id = job.record_id,
                    slot = job.slot.as_str(),
                    "Upload worker gone, dropping photo upload job"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(record_id: u64) -> PhotoUploadJob {
        PhotoUploadJob {
            record_id,
            staff_id: 1,
            bytes: vec![0u8; 4],
            filename: "a.jpg".into(),
            content_type: "image/jpeg".into(),
            slot: PhotoSlot::ClockIn,
        }
    }

    #[tokio::test]
    async fn dispatch_delivers_to_single_consumer() {
        let (dispatcher, mut rx) = UploadDispatcher::channel(4);
        dispatcher.dispatch(job(7));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.record_id, 7);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (dispatcher, mut rx) = UploadDispatcher::channel(1);
        dispatcher.dispatch(job(1));
        dispatcher.dispatch(job(2)); // dropped, queue is full

        assert_eq!(rx.try_recv().unwrap().record_id, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_receiver_does_not_panic() {
        let (dispatcher, rx) = UploadDispatcher::channel(1);
        drop(rx);
        dispatcher.dispatch(job(1));
    }
}
