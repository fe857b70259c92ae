use tracing::debug;

use crate::config::ScanOptions;
use crate::matcher::{DetectionTier, MatcherSet, NAME_MARKER, TARGET_ID, TargetKind, TargetRegistry};
use crate::snapshot::{NodeRef, Snapshot};
use crate::warning::{ScanWarning, WarningCode};

/// Everything one extractor stage reads.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScanContext<'a> {
    pub snapshot: &'a Snapshot,
    pub options: &'a ScanOptions,
    pub registry: Option<&'a TargetRegistry>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate<'a> {
    pub node: NodeRef<'a>,
    pub tier: DetectionTier,
    pub matched_by: &'static str,
}

impl<'a> ScanContext<'a> {
    /// Runs the matchers in priority order. A match is dropped when it is
    /// invisible, lies inside a region an earlier match already claimed, or
    /// wraps such a region.
    pub fn candidates(
        &self,
        set: &MatcherSet,
        kind: TargetKind,
        stage: &'static str,
        warnings: &mut Vec<ScanWarning>,
    ) -> Vec<Candidate<'a>> {
        self.report_missing_targets(kind, stage, warnings);

        let mut accepted: Vec<Candidate<'a>> = Vec::new();
        for matcher in &set.matchers {
            for node in matcher.find(self.snapshot.nodes()) {
                if self.options.require_visible && !node.is_visible() {
                    debug!(stage, matcher = matcher.label, "skipping invisible candidate");
                    continue;
                }
                if accepted.iter().any(|claimed| {
                    node.is_within(claimed.node.id()) || claimed.node.is_within(node.id())
                }) {
                    debug!(stage, matcher = matcher.label, "skipping overlapping candidate");
                    continue;
                }
                accepted.push(Candidate {
                    node,
                    tier: matcher.tier,
                    matched_by: matcher.label,
                });
            }
        }
        accepted
    }

    fn report_missing_targets(
        &self,
        kind: TargetKind,
        stage: &'static str,
        warnings: &mut Vec<ScanWarning>,
    ) {
        let Some(registry) = self.registry else {
            return;
        };
        for target in registry.of_kind(kind) {
            let present = self.snapshot.nodes().any(|node| {
                node.attr("id") == Some(target.id.as_str())
                    || node.attr(TARGET_ID) == Some(target.id.as_str())
            });
            if !present {
                warnings.push(
                    ScanWarning::new(
                        WarningCode::RegisteredTargetMissing,
                        format!("registered target '{}' is not on the page", target.id),
                    )
                    .with_stage(stage),
                );
            }
        }
    }

    /// Registry name, then the name marker, then the accessible label.
    pub fn explicit_name(&self, kind: TargetKind, node: NodeRef<'_>) -> Option<String> {
        self.registry
            .and_then(|registry| registry.name_for(kind, node))
            .or_else(|| node.attr(NAME_MARKER))
            .or_else(|| node.attr("aria-label"))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ToString::to_string)
    }
}
