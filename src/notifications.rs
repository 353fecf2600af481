#![allow(dead_code)]
//! Notification sink for finished uploads.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{info, warn};

use crate::upload::{UploadNotification, UploadOutcome};

/// Receives exactly one event per upload whose outcome is committed.
pub trait NotificationSink {
    fn notify(&mut self, notification: &UploadNotification);
}

/// In-memory history of recent upload notifications.
///
/// Cheap to clone; clones share the same history. Oldest entries are dropped
/// once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct NotificationLog {
    inner: Arc<RwLock<VecDeque<UploadNotification>>>,
    capacity: usize,
}

impl NotificationLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, notification: UploadNotification) {
        let mut history = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        while history.len() >= self.capacity {
            history.pop_front();
        }
        history.push_back(notification);
    }

    /// Up to `limit` notifications, newest first.
    pub fn recent(&self, limit: usize) -> Vec<UploadNotification> {
        let history = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        history.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationSink for NotificationLog {
    fn notify(&mut self, notification: &UploadNotification) {
        match notification.outcome {
            UploadOutcome::Completed => info!(
                "Upload successful: {} has been uploaded and is being processed",
                notification.file_name
            ),
            UploadOutcome::Error => warn!(
                "Upload failed: {} ({})",
                notification.file_name, notification.task_id
            ),
        }
        self.push(notification.clone());
    }
}
