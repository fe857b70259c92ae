use crate::matcher::{MatcherSet, NAME_MARKER, TargetKind};
use crate::model::{ChartKind, ChartRecord};
use crate::scan::{Candidate, ScanContext};
use crate::warning::ScanWarning;

pub(crate) const STAGE: &str = "charts";

fn chart_kind(candidate: &Candidate<'_>) -> ChartKind {
    match candidate.node.tag() {
        "canvas" => ChartKind::Canvas,
        "svg" => ChartKind::Vector,
        _ => ChartKind::Container,
    }
}

/// Heading inside the card, then the nearest heading before it, then the
/// accessible label. Registry and name markers beat all three.
fn chart_name(ctx: &ScanContext<'_>, candidate: &Candidate<'_>) -> Option<String> {
    let node = candidate.node;
    let registered = ctx
        .registry
        .and_then(|registry| registry.name_for(TargetKind::Chart, node))
        .or_else(|| node.attr(NAME_MARKER))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string);
    registered
        .or_else(|| {
            node.descendants()
                .find(|child| child.is_heading())
                .map(|heading| heading.text())
                .filter(|text| !text.is_empty())
        })
        .or_else(|| node.nearest_heading())
        .or_else(|| ctx.explicit_name(TargetKind::Chart, node))
}

/// Location and size only; pixels are captured by the host at export time.
pub(crate) fn locate_charts(
    ctx: &ScanContext<'_>,
    warnings: &mut Vec<ScanWarning>,
) -> Vec<ChartRecord> {
    let matchers = MatcherSet::charts(ctx.registry);
    ctx.candidates(&matchers, TargetKind::Chart, STAGE, warnings)
        .iter()
        .enumerate()
        .map(|(index, candidate)| ChartRecord {
            id: format!("chart-{}", index + 1),
            name: chart_name(ctx, candidate).unwrap_or_else(|| format!("Chart {}", index + 1)),
            kind: chart_kind(candidate),
            bounding_box: candidate.node.bbox().unwrap_or_default(),
            confidence: candidate.tier.confidence(),
            source_location: candidate.node.source_location(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::locate_charts;
    use crate::config::ScanOptions;
    use crate::model::{ChartKind, ChartRecord};
    use crate::scan::ScanContext;
    use crate::snapshot::{Snapshot, SnapshotNode};

    fn locate(root: SnapshotNode) -> Vec<ChartRecord> {
        let snapshot = Snapshot::from_tree(root);
        let options = ScanOptions::default();
        let ctx = ScanContext {
            snapshot: &snapshot,
            options: &options,
            registry: None,
        };
        locate_charts(&ctx, &mut Vec::new())
    }

    #[test]
    fn container_claims_its_canvas() {
        let charts = locate(
            SnapshotNode::element("body").bbox(0.0, 0.0, 800.0, 600.0).child(
                SnapshotNode::element("div")
                    .class("chart-container")
                    .bbox(0.0, 0.0, 400.0, 300.0)
                    .child(SnapshotNode::element("h3").text("Weekly attendance"))
                    .child(SnapshotNode::element("canvas").bbox(0.0, 30.0, 400.0, 270.0)),
            ),
        );
        assert_eq!(charts.len(), 1);
        assert_eq!(charts[0].kind, ChartKind::Container);
        assert_eq!(charts[0].name, "Weekly attendance");
        assert!((charts[0].bounding_box.width - 400.0).abs() < f64::EPSILON);
    }

    #[test]
    fn small_graphics_are_ignored_and_names_fall_back() {
        let charts = locate(
            SnapshotNode::element("body")
                .bbox(0.0, 0.0, 800.0, 600.0)
                .child(SnapshotNode::element("svg").class("icon").bbox(0.0, 0.0, 16.0, 16.0))
                .child(SnapshotNode::element("svg").bbox(0.0, 20.0, 300.0, 200.0)),
        );
        assert_eq!(charts.len(), 1);
        assert_eq!(charts[0].kind, ChartKind::Vector);
        assert_eq!(charts[0].name, "Chart 1");
    }
}
