//! Bounded FIFO of job ids shared by the submitters and the worker pool.

use super::state::JobId;
use crate::error::{CleanserError, Result};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct QueueInner {
    pending: VecDeque<JobId>,
    closed: bool,
}

#[derive(Debug)]
pub struct JobQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    capacity: usize,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            notify: Notify::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    /// Enqueue without waiting. A full or closed queue rejects the id.
    pub fn push(&self, id: JobId) -> Result<()> {
        {
            let mut inner = self.lock();
            if inner.closed {
                return Err(CleanserError::Other("job queue is shut down".to_owned()));
            }
            if inner.pending.len() >= self.capacity {
                return Err(CleanserError::QueueFull {
                    capacity: self.capacity,
                });
            }
            inner.pending.push_back(id);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Remove a job that no worker has taken yet.
    pub fn withdraw(&self, id: JobId) -> bool {
        let mut inner = self.lock();
        match inner.pending.iter().position(|pending| *pending == id) {
            Some(pos) => inner.pending.remove(pos).is_some(),
            None => false,
        }
    }

    /// Next id in submission order. `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<JobId> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a push or close in between is not lost
            notified.as_mut().enable();
            {
                let mut inner = self.lock();
                if let Some(id) = inner.pending.pop_front() {
                    return Some(id);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Stop accepting jobs and wake every idle worker.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }
}
