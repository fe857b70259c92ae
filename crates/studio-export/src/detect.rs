//! Detection orchestrator: runs the four extractors over one snapshot and
//! owns the result of the latest scan.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::charts::locate_charts;
use crate::config::ScanOptions;
use crate::error::{ExportError, ExtractionFault};
use crate::matcher::TargetRegistry;
use crate::metrics::extract_metrics;
use crate::model::{DetectionResult, TabularBlock};
use crate::progress::{Checkpoint, Notification, Phase, ProgressSink};
use crate::rankings::extract_rankings;
use crate::scan::ScanContext;
use crate::snapshot::{Snapshot, SnapshotSource};
use crate::tables::extract_tables;
use crate::warning::{ScanWarning, WarningCode};
use crate::{charts, metrics, rankings, tables};

/// One stage of a scan. A stage either fills its list in `result` or fails
/// as a whole; a failure never stops the stages after it.
pub(crate) trait Extractor {
    fn stage(&self) -> &'static str;

    fn run(
        &self,
        ctx: &ScanContext<'_>,
        result: &mut DetectionResult,
    ) -> Result<(), ExtractionFault>;
}

struct Tables;
struct Metrics;
struct Charts;
struct Rankings;

impl Extractor for Tables {
    fn stage(&self) -> &'static str {
        tables::STAGE
    }

    fn run(
        &self,
        ctx: &ScanContext<'_>,
        result: &mut DetectionResult,
    ) -> Result<(), ExtractionFault> {
        result.tables = extract_tables(ctx, &mut result.warnings);
        Ok(())
    }
}

impl Extractor for Metrics {
    fn stage(&self) -> &'static str {
        metrics::STAGE
    }

    fn run(
        &self,
        ctx: &ScanContext<'_>,
        result: &mut DetectionResult,
    ) -> Result<(), ExtractionFault> {
        result.metrics = extract_metrics(ctx, &mut result.warnings);
        Ok(())
    }
}

impl Extractor for Charts {
    fn stage(&self) -> &'static str {
        charts::STAGE
    }

    fn run(
        &self,
        ctx: &ScanContext<'_>,
        result: &mut DetectionResult,
    ) -> Result<(), ExtractionFault> {
        result.charts = locate_charts(ctx, &mut result.warnings);
        Ok(())
    }
}

impl Extractor for Rankings {
    fn stage(&self) -> &'static str {
        rankings::STAGE
    }

    fn run(
        &self,
        ctx: &ScanContext<'_>,
        result: &mut DetectionResult,
    ) -> Result<(), ExtractionFault> {
        result.rankings = extract_rankings(ctx, &mut result.warnings);
        Ok(())
    }
}

const STAGES: [&dyn Extractor; 4] = [&Tables, &Metrics, &Charts, &Rankings];

pub(crate) fn run_stages(
    stages: &[&dyn Extractor],
    ctx: &ScanContext<'_>,
    progress: &mut dyn ProgressSink,
) -> DetectionResult {
    let mut result = DetectionResult::empty(Utc::now());
    let total = stages.len().max(1);

    for (index, stage) in stages.iter().enumerate() {
        debug!(stage = stage.stage(), "stage started");
        if let Err(fault) = stage.run(ctx, &mut result) {
            warn!(stage = stage.stage(), %fault, "stage failed; continuing");
            result.warnings.push(
                ScanWarning::new(WarningCode::StageFailed, fault.to_string())
                    .with_stage(stage.stage())
                    .with_location(fault.location),
            );
        }
        let percent = u8::try_from((index + 1) * 100 / total).unwrap_or(100);
        progress.checkpoint(Checkpoint::new(Phase::Detection, stage.stage(), percent));
    }

    result
}

/// Scans one snapshot: tables, metrics, charts, then rankings. Never fails;
/// faults show up as warnings on the result.
pub fn detect(
    snapshot: &Snapshot,
    options: &ScanOptions,
    registry: Option<&TargetRegistry>,
    progress: &mut dyn ProgressSink,
) -> DetectionResult {
    let ctx = ScanContext {
        snapshot,
        options,
        registry,
    };
    let result = run_stages(&STAGES, &ctx, progress);
    info!(
        nodes = snapshot.len(),
        warnings = result.warnings.len(),
        "{}",
        result.summary()
    );
    result
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    Succeeded,
    Failed,
}

/// Holds the latest [`DetectionResult`]. A rescan replaces it; nothing is
/// merged across scans.
#[derive(Debug)]
pub struct DetectionSession {
    options: ScanOptions,
    registry: Option<TargetRegistry>,
    state: SessionState,
    result: Option<DetectionResult>,
}

impl DetectionSession {
    #[must_use]
    pub fn new(options: ScanOptions, registry: Option<TargetRegistry>) -> Self {
        Self {
            options,
            registry,
            state: SessionState::Idle,
            result: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn result(&self) -> Option<&DetectionResult> {
        self.result.as_ref()
    }

    pub fn scan(
        &mut self,
        source: &impl SnapshotSource,
        progress: &mut dyn ProgressSink,
    ) -> Result<&DetectionResult, ExportError> {
        if self.state == SessionState::Scanning {
            return Err(ExportError::ScanInProgress);
        }
        self.state = SessionState::Scanning;
        self.result = None;

        let snapshot = match source.snapshot() {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(%error, "scan failed");
                self.state = SessionState::Failed;
                return Err(error);
            }
        };

        let result = detect(snapshot, &self.options, self.registry.as_ref(), progress);
        progress.notify(&Notification::scan_summary(&result));
        self.state = SessionState::Succeeded;
        let result: &DetectionResult = self.result.insert(result);
        Ok(result)
    }

    /// Resolves selected ids against the current result, in the given order.
    pub fn select(&self, ids: &[String]) -> Result<Vec<&TabularBlock>, ExportError> {
        match (&self.result, ids.first()) {
            (Some(result), _) => select_tables(result, ids),
            (None, Some(id)) => Err(ExportError::UnknownBlock(id.clone())),
            (None, None) => Ok(Vec::new()),
        }
    }
}

/// Looks up each id in `result`; the first unknown id is an error.
pub fn select_tables<'a>(
    result: &'a DetectionResult,
    ids: &[String],
) -> Result<Vec<&'a TabularBlock>, ExportError> {
    ids.iter()
        .map(|id| {
            result
                .table(id)
                .ok_or_else(|| ExportError::UnknownBlock(id.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{DetectionSession, Extractor, SessionState, run_stages};
    use crate::config::ScanOptions;
    use crate::error::{ExportError, ExtractionFault};
    use crate::model::DetectionResult;
    use crate::progress::{NullProgress, ProgressLog};
    use crate::scan::ScanContext;
    use crate::snapshot::{Snapshot, SnapshotNode};
    use crate::warning::{ScanWarning, WarningCode};

    struct Broken;
    struct Counting;

    impl Extractor for Broken {
        fn stage(&self) -> &'static str {
            "broken"
        }

        fn run(
            &self,
            _: &ScanContext<'_>,
            _: &mut DetectionResult,
        ) -> Result<(), ExtractionFault> {
            Err(ExtractionFault::new("broken", "body", "matcher exploded"))
        }
    }

    impl Extractor for Counting {
        fn stage(&self) -> &'static str {
            "counting"
        }

        fn run(
            &self,
            ctx: &ScanContext<'_>,
            result: &mut DetectionResult,
        ) -> Result<(), ExtractionFault> {
            result.warnings.push(ScanWarning::new(
                WarningCode::ExtractionFault,
                format!("saw {} nodes", ctx.snapshot.len()),
            ));
            Ok(())
        }
    }

    fn kpi_page() -> Snapshot {
        Snapshot::from_tree(
            SnapshotNode::element("body").bbox(0.0, 0.0, 800.0, 600.0).child(
                SnapshotNode::element("div")
                    .class("metric")
                    .bbox(0.0, 0.0, 100.0, 50.0)
                    .child(SnapshotNode::element("span").text("Members"))
                    .child(SnapshotNode::element("span").text("1,204")),
            ),
        )
    }

    #[test]
    fn a_failing_stage_does_not_stop_later_stages() {
        let snapshot = kpi_page();
        let options = ScanOptions::default();
        let ctx = ScanContext {
            snapshot: &snapshot,
            options: &options,
            registry: None,
        };
        let mut progress = ProgressLog::default();
        let result = run_stages(&[&Broken, &Counting], &ctx, &mut progress);

        assert_eq!(result.warnings.len(), 2);
        assert_eq!(result.warnings[0].code, WarningCode::StageFailed);
        assert_eq!(result.warnings[1].message, "saw 4 nodes");
        assert_eq!(progress.percents(), vec![50, 100]);
    }

    #[test]
    fn session_walks_the_state_machine() {
        let mut session = DetectionSession::new(ScanOptions::default(), None);
        assert_eq!(session.state(), SessionState::Idle);

        let mut progress = ProgressLog::default();
        let result = session.scan(&kpi_page(), &mut progress).unwrap();
        assert_eq!(result.metrics.len(), 1);
        assert_eq!(session.state(), SessionState::Succeeded);
        assert_eq!(progress.percents(), vec![25, 50, 75, 100]);
        assert_eq!(
            progress.notifications[0].message,
            "found 0 tables, 1 metrics, 0 charts, 0 rankings"
        );

        let missing: Option<Snapshot> = None;
        assert!(matches!(
            session.scan(&missing, &mut NullProgress),
            Err(ExportError::SnapshotUnavailable(_))
        ));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.result().is_none());
    }

    #[test]
    fn selecting_an_unknown_id_fails() {
        let mut session = DetectionSession::new(ScanOptions::default(), None);
        session.scan(&kpi_page(), &mut NullProgress).unwrap();
        assert!(session.select(&[]).unwrap().is_empty());
        assert!(matches!(
            session.select(&["table-9".to_string()]),
            Err(ExportError::UnknownBlock(id)) if id == "table-9"
        ));
    }
}
