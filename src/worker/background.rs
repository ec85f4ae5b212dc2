//! Work that outlives the response it was started for.
//!
//! Revalidation writes and cache trims are spawned here so the page gets its
//! response first; `settle` waits for whatever is still running.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::warn;

use super::lock::mutex_lock;

const SOURCE: &str = "worker::background";

#[derive(Clone, Default)]
pub struct BackgroundTasks {
    handles: Arc<Mutex<Vec<(&'static str, JoinHandle<()>)>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, label: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let mut handles = mutex_lock(&self.handles, SOURCE, "spawn");
        handles.retain(|(_, handle)| !handle.is_finished());
        handles.push((label, handle));
    }

    /// Number of tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        let mut handles = mutex_lock(&self.handles, SOURCE, "pending");
        handles.retain(|(_, handle)| !handle.is_finished());
        handles.len()
    }

    /// Wait until every spawned task, including ones spawned meanwhile, has finished.
    pub async fn settle(&self) {
        loop {
            let batch = std::mem::take(&mut *mutex_lock(&self.handles, SOURCE, "settle"));
            if batch.is_empty() {
                return;
            }
            for (label, handle) in batch {
                if let Err(err) = handle.await {
                    warn!(task = label, error = %err, "background task did not complete");
                }
            }
        }
    }
}
