//! Progress reporting for scans and exports. Front ends implement
//! [`ProgressSink`] to surface status; the engine never blocks on it.

use serde::Serialize;

use crate::error::ExportError;
use crate::model::DetectionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Detection,
    Export,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Checkpoint {
    pub phase: Phase,
    pub step: &'static str,
    pub percent: u8,
}

impl Checkpoint {
    #[must_use]
    pub const fn new(phase: Phase, step: &'static str, percent: u8) -> Self {
        Self {
            phase,
            step,
            percent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

/// Short human-readable message for the host to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    #[must_use]
    pub fn scan_summary(result: &DetectionResult) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: result.summary(),
        }
    }

    #[must_use]
    pub fn export_succeeded(file_name: &str, bytes: usize) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: format!("exported {file_name} ({})", format_size(bytes)),
        }
    }

    #[must_use]
    pub fn export_failed(error: &ExportError) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: format!("export failed: {error}"),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: usize) -> String {
    const KIB: f64 = 1024.0;
    let value = bytes as f64;
    if value < KIB {
        format!("{bytes} B")
    } else if value < KIB * KIB {
        format!("{:.1} KB", value / KIB)
    } else {
        format!("{:.1} MB", value / (KIB * KIB))
    }
}

pub trait ProgressSink {
    fn checkpoint(&mut self, checkpoint: Checkpoint);

    fn notify(&mut self, _notification: &Notification) {}
}

/// Discards everything.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn checkpoint(&mut self, _checkpoint: Checkpoint) {}
}

impl<F> ProgressSink for F
where
    F: FnMut(Checkpoint),
{
    fn checkpoint(&mut self, checkpoint: Checkpoint) {
        self(checkpoint);
    }
}

/// Keeps every checkpoint and notification, in arrival order.
#[derive(Debug, Default)]
pub struct ProgressLog {
    pub checkpoints: Vec<Checkpoint>,
    pub notifications: Vec<Notification>,
}

impl ProgressLog {
    #[must_use]
    pub fn percents(&self) -> Vec<u8> {
        self.checkpoints
            .iter()
            .map(|checkpoint| checkpoint.percent)
            .collect()
    }
}

impl ProgressSink for ProgressLog {
    fn checkpoint(&mut self, checkpoint: Checkpoint) {
        self.checkpoints.push(checkpoint);
    }

    fn notify(&mut self, notification: &Notification) {
        self.notifications.push(notification.clone());
    }
}
