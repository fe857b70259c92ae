//! Detects tables, metrics, charts and rankings in a rendered page snapshot
//! and exports the selected tables as workbook, CSV, JSON, PDF, zip or
//! markdown.

mod charts;
mod classify;
pub mod config;
mod dedup;
pub mod detect;
pub mod document;
pub mod error;
pub mod export;
mod header;
pub mod matcher;
mod metrics;
pub mod model;
pub mod progress;
mod rankings;
mod scan;
pub mod serialize;
pub mod snapshot;
mod tables;
pub mod value;
pub mod warning;

pub use config::{ExportConfiguration, ExportFormat, NumberLocale, ScanOptions};
pub use detect::{DetectionSession, SessionState, detect, select_tables};
pub use document::{CanonicalDocument, CellValue, DocumentBuilder, DocumentSet, preview};
pub use error::{ExportError, ExtractionFault};
pub use export::{
    Delivery, DeliveryTarget, DirectoryDelivery, ExportReport, MemoryDelivery, ScheduledDelivery,
    export, export_at, export_selected,
};
pub use matcher::{RegisteredTarget, TargetKind, TargetRegistry};
pub use model::{
    Category, ChartRecord, DetectionResult, MetricRecord, RankingRecord, TableKind, TabularBlock,
};
pub use progress::{Checkpoint, Notification, NullProgress, ProgressLog, ProgressSink};
pub use serialize::{ExportArtifact, FileNamer};
pub use snapshot::{Snapshot, SnapshotNode, SnapshotSource};
pub use warning::{ScanWarning, WarningCode};

/// Scans a snapshot and exports the chosen table ids in one call.
pub fn scan_and_export(
    snapshot: &Snapshot,
    options: &ScanOptions,
    registry: Option<&TargetRegistry>,
    ids: &[String],
    config: &ExportConfiguration,
    delivery: &mut dyn Delivery,
    progress: &mut dyn ProgressSink,
) -> Result<(DetectionResult, ExportReport), ExportError> {
    let result = detect(snapshot, options, registry, progress);
    let report = export_selected(&result, ids, config, delivery, progress)?;
    Ok((result, report))
}
