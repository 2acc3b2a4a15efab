//! Snapshot capture jobs. A job rasterizes an owned clone of the page on a
//! worker thread; the renderer polls it once per animation frame.

use std::thread;

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use page::Page;
use snapshot::{CaptureRequest, Snapshot};

enum CaptureJob {
    Threaded { receiver: Receiver<Snapshot> },
    Ready(Box<Snapshot>),
}

/// At most one capture in flight.
#[derive(Default)]
pub(crate) struct CaptureSlot {
    job: Option<CaptureJob>,
}

impl CaptureSlot {
    pub fn is_in_flight(&self) -> bool {
        self.job.is_some()
    }

    /// Starts a capture over a clone of `page`; the caller's page is never
    /// touched. Returns false, doing nothing, when one is already in flight.
    pub fn begin(&mut self, page: &Page, request: CaptureRequest) -> bool {
        if self.job.is_some() {
            tracing::debug!("capture already in flight");
            return false;
        }
        let (sender, receiver) = bounded(1);
        let spawned = thread::Builder::new()
            .name("snapshot-capture".into())
            .spawn({
                let request = request.clone();
                let mut worker_page = page.clone();
                move || {
                    let snapshot = snapshot::capture(&mut worker_page, &request);
                    let _ = sender.send(snapshot);
                }
            });
        self.job = Some(match spawned {
            Ok(_) => CaptureJob::Threaded { receiver },
            Err(err) => {
                // The failed spawn dropped the worker's clone.
                tracing::warn!(error = %err, "failed to spawn capture thread; capturing inline");
                let mut inline_page = page.clone();
                CaptureJob::Ready(Box::new(snapshot::capture(&mut inline_page, &request)))
            }
        });
        true
    }

    /// Takes the finished snapshot, if any, without blocking.
    pub fn poll(&mut self) -> Option<Snapshot> {
        match self.job.take()? {
            CaptureJob::Ready(snapshot) => Some(*snapshot),
            CaptureJob::Threaded { receiver } => match receiver.try_recv() {
                Ok(snapshot) => Some(snapshot),
                Err(TryRecvError::Empty) => {
                    self.job = Some(CaptureJob::Threaded { receiver });
                    None
                }
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!("capture thread exited without a snapshot");
                    None
                }
            },
        }
    }

    /// Parks a job whose result the caller delivers by hand.
    #[cfg(test)]
    pub fn hold(&mut self) -> crossbeam_channel::Sender<Snapshot> {
        let (sender, receiver) = bounded(1);
        self.job = Some(CaptureJob::Threaded { receiver });
        sender
    }

    /// Blocks until the in-flight capture finishes.
    pub fn wait(&mut self) -> Option<Snapshot> {
        match self.job.take()? {
            CaptureJob::Ready(snapshot) => Some(*snapshot),
            CaptureJob::Threaded { receiver } => match receiver.recv() {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    tracing::warn!(error = %err, "capture thread exited without a snapshot");
                    None
                }
            },
        }
    }
}
