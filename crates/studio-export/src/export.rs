//! Export pipeline: validate, build documents, serialize, deliver.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ExportConfiguration, ExportFormat};
use crate::detect::select_tables;
use crate::document::DocumentBuilder;
use crate::error::ExportError;
use crate::model::{DetectionResult, TabularBlock};
use crate::progress::{Checkpoint, Notification, Phase, ProgressSink};
use crate::serialize::{ExportArtifact, FileNamer, serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryTarget {
    Download,
    Clipboard,
    Scheduled,
}

/// Where a finished artifact goes. Delivery starts only once the whole
/// artifact exists.
pub trait Delivery {
    fn target(&self) -> DeliveryTarget;

    /// File names already present at the destination.
    fn existing_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn deliver(&mut self, artifact: &ExportArtifact) -> Result<(), ExportError>;
}

/// Keeps artifacts in memory. The worker answers requests from here.
#[derive(Debug)]
pub struct MemoryDelivery {
    target: DeliveryTarget,
    pub artifacts: Vec<ExportArtifact>,
}

impl MemoryDelivery {
    #[must_use]
    pub fn new(target: DeliveryTarget) -> Self {
        Self {
            target,
            artifacts: Vec::new(),
        }
    }

    /// Download for file formats, clipboard for the preview format.
    #[must_use]
    pub fn for_format(format: ExportFormat) -> Self {
        Self::new(match format {
            ExportFormat::Clipboard => DeliveryTarget::Clipboard,
            _ => DeliveryTarget::Download,
        })
    }

    #[must_use]
    pub fn into_artifact(self) -> Option<ExportArtifact> {
        self.artifacts.into_iter().next_back()
    }
}

impl Delivery for MemoryDelivery {
    fn target(&self) -> DeliveryTarget {
        self.target
    }

    fn existing_names(&self) -> Vec<String> {
        self.artifacts
            .iter()
            .map(|artifact| artifact.file_name.clone())
            .collect()
    }

    fn deliver(&mut self, artifact: &ExportArtifact) -> Result<(), ExportError> {
        self.artifacts.push(artifact.clone());
        Ok(())
    }
}

/// Writes artifacts into a directory, creating it on first use.
#[derive(Debug)]
pub struct DirectoryDelivery {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectoryDelivery {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Vec::new(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl Delivery for DirectoryDelivery {
    fn target(&self) -> DeliveryTarget {
        DeliveryTarget::Download
    }

    fn existing_names(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        entries
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect()
    }

    fn deliver(&mut self, artifact: &ExportArtifact) -> Result<(), ExportError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(&artifact.file_name);
        fs::write(&path, &artifact.bytes)?;
        debug!(path = %path.display(), bytes = artifact.bytes.len(), "artifact written");
        self.written.push(path);
        Ok(())
    }
}

/// Scheduled and emailed exports are accepted in configuration but have no
/// delivery mechanism.
#[derive(Debug, Default)]
pub struct ScheduledDelivery;

impl Delivery for ScheduledDelivery {
    fn target(&self) -> DeliveryTarget {
        DeliveryTarget::Scheduled
    }

    fn deliver(&mut self, _artifact: &ExportArtifact) -> Result<(), ExportError> {
        Err(scheduled_unsupported())
    }
}

fn scheduled_unsupported() -> ExportError {
    ExportError::Unsupported("scheduled export delivery is not implemented".to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    pub file_name: String,
    pub format: ExportFormat,
    pub bytes: usize,
    pub documents: usize,
    pub rows: usize,
    pub notification: Notification,
}

fn check_target(config: &ExportConfiguration, target: DeliveryTarget) -> Result<(), ExportError> {
    match (config.format, target) {
        (_, DeliveryTarget::Scheduled) => Err(scheduled_unsupported()),
        (ExportFormat::Clipboard, DeliveryTarget::Download) => Err(ExportError::InvalidOption(
            "clipboard output can only be delivered to the clipboard".to_string(),
        )),
        (format, DeliveryTarget::Clipboard) if format != ExportFormat::Clipboard => {
            Err(ExportError::InvalidOption(format!(
                "{format} output cannot be delivered to the clipboard"
            )))
        }
        _ => Ok(()),
    }
}

fn step(progress: &mut dyn ProgressSink, name: &'static str, percent: u8) {
    progress.checkpoint(Checkpoint::new(Phase::Export, name, percent));
}

fn run(
    selection: &[&TabularBlock],
    config: &ExportConfiguration,
    delivery: &mut dyn Delivery,
    progress: &mut dyn ProgressSink,
    now: DateTime<Utc>,
) -> Result<ExportReport, ExportError> {
    if selection.is_empty() {
        return Err(ExportError::EmptySelection);
    }
    config.validate()?;
    check_target(config, delivery.target())?;
    if config.password_placeholder.is_some() {
        warn!("password protection is accepted but not applied");
    }
    if config.schedule.as_ref().is_some_and(|schedule| schedule.enabled) {
        warn!("schedule settings are accepted but nothing runs on a schedule");
    }
    step(progress, "validate", 10);

    let set = DocumentBuilder::new(config, now).build(selection)?;
    debug!(documents = set.documents.len(), rows = set.total_rows(), "documents built");
    step(progress, "build", 35);

    let mut namer = FileNamer::new(config, now).with_taken(delivery.existing_names());
    let artifact = serialize(&set, config, &mut namer)?;
    step(progress, "serialize", 70);

    delivery.deliver(&artifact)?;
    step(progress, "deliver", 90);

    let notification = Notification::export_succeeded(&artifact.file_name, artifact.bytes.len());
    step(progress, "done", 100);
    Ok(ExportReport {
        file_name: artifact.file_name,
        format: config.format,
        bytes: artifact.bytes.len(),
        documents: set.documents.len(),
        rows: artifact.row_count,
        notification,
    })
}

/// Runs one export job with `now` as the generation time. A failure at
/// any step aborts the job before anything is delivered; nothing is retried.
pub fn export_at(
    selection: &[&TabularBlock],
    config: &ExportConfiguration,
    delivery: &mut dyn Delivery,
    progress: &mut dyn ProgressSink,
    now: DateTime<Utc>,
) -> Result<ExportReport, ExportError> {
    match run(selection, config, delivery, progress, now) {
        Ok(report) => {
            info!(
                file = %report.file_name,
                format = %report.format,
                bytes = report.bytes,
                rows = report.rows,
                "export finished"
            );
            progress.notify(&report.notification);
            Ok(report)
        }
        Err(error) => {
            warn!(%error, "export failed");
            progress.notify(&Notification::export_failed(&error));
            Err(error)
        }
    }
}

pub fn export(
    selection: &[&TabularBlock],
    config: &ExportConfiguration,
    delivery: &mut dyn Delivery,
    progress: &mut dyn ProgressSink,
) -> Result<ExportReport, ExportError> {
    export_at(selection, config, delivery, progress, Utc::now())
}

/// Resolves `ids` against `result` and exports them in that order.
pub fn export_selected(
    result: &DetectionResult,
    ids: &[String],
    config: &ExportConfiguration,
    delivery: &mut dyn Delivery,
    progress: &mut dyn ProgressSink,
) -> Result<ExportReport, ExportError> {
    let selection = match select_tables(result, ids) {
        Ok(selection) => selection,
        Err(error) => {
            progress.notify(&Notification::export_failed(&error));
            return Err(error);
        }
    };
    export(&selection, config, delivery, progress)
}
