use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::matcher::{
    METRIC_LABEL_MARKER, METRIC_TREND_MARKER, METRIC_VALUE_MARKER, MatcherSet, TargetKind,
};
use crate::model::{MetricRecord, Trend};
use crate::scan::{Candidate, ScanContext};
use crate::snapshot::NodeRef;
use crate::value::parse_value;
use crate::warning::ScanWarning;

pub(crate) const STAGE: &str = "metrics";

static VALUE_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^|-)(value|number|amount|figure)$")
        .expect("hardcoded metric value class regex is valid")
});
static LABEL_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^|-)(label|title|name|caption)$")
        .expect("hardcoded metric label class regex is valid")
});
static TREND_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^|-)(trend|delta|change)$")
        .expect("hardcoded metric trend class regex is valid")
});

fn marked<'a>(node: NodeRef<'a>, marker: &str) -> Option<NodeRef<'a>> {
    node.descendants().find(|child| child.has_attr(marker))
}

fn by_class<'a>(node: NodeRef<'a>, pattern: &Regex) -> Option<NodeRef<'a>> {
    node.descendants()
        .find(|child| child.classes().any(|class| pattern.is_match(class)))
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

/// Sign glyphs decide the direction; anything else is stable.
pub(crate) fn parse_trend(text: &str) -> Trend {
    let text = text.trim();
    let lowered = text.to_ascii_lowercase();
    if lowered == "up" || text.starts_with('+') || text.contains(['▲', '↑']) {
        Trend::Up
    } else if lowered == "down"
        || text.starts_with(['-', '\u{2212}'])
        || text.contains(['▼', '↓'])
    {
        Trend::Down
    } else {
        Trend::Stable
    }
}

fn resolve_value<'a>(node: NodeRef<'a>, ctx: &ScanContext<'_>) -> Option<NodeRef<'a>> {
    marked(node, METRIC_VALUE_MARKER)
        .or_else(|| by_class(node, &VALUE_CLASS_RE))
        .or_else(|| {
            node.text_leaves().find(|leaf| {
                parse_value(leaf.own_text(), None, &ctx.options.locale)
                    .kind
                    .is_numeric()
            })
        })
}

fn resolve_label(node: NodeRef<'_>, value: NodeRef<'_>) -> Option<String> {
    marked(node, METRIC_LABEL_MARKER)
        .or_else(|| by_class(node, &LABEL_CLASS_RE))
        .map(|label| label.text())
        .and_then(non_empty)
        .or_else(|| {
            node.text_leaves()
                .find(|leaf| !leaf.is_within(value.id()) && !value.is_within(leaf.id()))
                .map(|leaf| leaf.text())
        })
        .or_else(|| node.nearest_heading())
}

fn resolve_trend(node: NodeRef<'_>) -> Option<Trend> {
    let trend = marked(node, METRIC_TREND_MARKER).or_else(|| by_class(node, &TREND_CLASS_RE))?;
    let marker = trend
        .attr(METRIC_TREND_MARKER)
        .filter(|value| !value.trim().is_empty());
    Some(parse_trend(marker.map_or_else(|| trend.text(), str::to_string).as_str()))
}

fn extract_metric(candidate: &Candidate<'_>, ctx: &ScanContext<'_>) -> Option<MetricRecord> {
    let node = candidate.node;
    let value = resolve_value(node, ctx)?;
    let raw_text = non_empty(value.text())?;
    let label = resolve_label(node, value)?;

    let parsed = parse_value(&raw_text, Some(&label), &ctx.options.locale);
    Some(MetricRecord {
        id: String::new(),
        label,
        raw_text,
        normalized_value: parsed.value,
        format: parsed.kind,
        unit: parsed.unit,
        trend: resolve_trend(node),
        confidence: candidate.tier.confidence(),
        source_location: node.source_location(),
    })
}

pub(crate) fn extract_metrics(
    ctx: &ScanContext<'_>,
    warnings: &mut Vec<ScanWarning>,
) -> Vec<MetricRecord> {
    let matchers = MatcherSet::metrics(ctx.registry);
    let mut metrics = Vec::new();
    for candidate in ctx.candidates(&matchers, TargetKind::Metric, STAGE, warnings) {
        match extract_metric(&candidate, ctx) {
            Some(mut metric) => {
                metric.id = format!("metric-{}", metrics.len() + 1);
                metrics.push(metric);
            }
            None => debug!(
                location = %candidate.node.source_location(),
                "metric candidate lacks a value or label"
            ),
        }
    }
    metrics
}

#[cfg(test)]
mod tests {
    use super::{extract_metrics, parse_trend};
    use crate::config::ScanOptions;
    use crate::model::{MetricRecord, Trend};
    use crate::scan::ScanContext;
    use crate::snapshot::{Snapshot, SnapshotNode};
    use crate::value::{NormalizedValue, ValueKind};

    fn extract(root: SnapshotNode) -> Vec<MetricRecord> {
        let snapshot = Snapshot::from_tree(root);
        let options = ScanOptions::default();
        let ctx = ScanContext {
            snapshot: &snapshot,
            options: &options,
            registry: None,
        };
        extract_metrics(&ctx, &mut Vec::new())
    }

    #[test]
    fn marker_sub_nodes_win() {
        let metrics = extract(
            SnapshotNode::element("body").bbox(0.0, 0.0, 800.0, 600.0).child(
                SnapshotNode::element("div")
                    .attr("data-export-metric", "")
                    .bbox(0.0, 0.0, 200.0, 80.0)
                    .child(
                        SnapshotNode::element("span")
                            .attr("data-metric-label", "")
                            .text("Revenue"),
                    )
                    .child(
                        SnapshotNode::element("strong")
                            .attr("data-metric-value", "")
                            .text("$12,400"),
                    )
                    .child(
                        SnapshotNode::element("small")
                            .attr("data-metric-trend", "")
                            .text("+4.2%"),
                    ),
            ),
        );
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].label, "Revenue");
        assert_eq!(metrics[0].format, ValueKind::Currency);
        assert_eq!(metrics[0].normalized_value, NormalizedValue::Number(12_400.0));
        assert_eq!(metrics[0].unit.as_deref(), Some("$"));
        assert_eq!(metrics[0].trend, Some(Trend::Up));
    }

    #[test]
    fn heuristic_card_finds_value_and_label() {
        let metrics = extract(
            SnapshotNode::element("body").bbox(0.0, 0.0, 800.0, 600.0).child(
                SnapshotNode::element("div")
                    .class("kpi-card")
                    .bbox(0.0, 0.0, 200.0, 80.0)
                    .child(SnapshotNode::element("p").text("Fill rate"))
                    .child(SnapshotNode::element("p").text("82.5%")),
            ),
        );
        assert_eq!(metrics[0].id, "metric-1");
        assert_eq!(metrics[0].label, "Fill rate");
        assert_eq!(metrics[0].format, ValueKind::Percentage);
        assert_eq!(metrics[0].normalized_value, NormalizedValue::Number(82.5));
        assert_eq!(metrics[0].trend, None);
    }

    #[test]
    fn trend_glyphs() {
        assert_eq!(parse_trend("▲ 3"), Trend::Up);
        assert_eq!(parse_trend("−2%"), Trend::Down);
        assert_eq!(parse_trend("down"), Trend::Down);
        assert_eq!(parse_trend("0%"), Trend::Stable);
    }
}
