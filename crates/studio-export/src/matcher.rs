//! Ordered, typed predicates the extractors run against a snapshot.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::snapshot::NodeRef;

pub const TABLE_MARKER: &str = "data-export-table";
pub const HEADER_MARKER: &str = "data-export-header";
pub const NAME_MARKER: &str = "data-export-name";
pub const KIND_MARKER: &str = "data-export-kind";
pub const TARGET_ID: &str = "data-export-id";
pub const METRIC_MARKER: &str = "data-export-metric";
pub const METRIC_VALUE_MARKER: &str = "data-metric-value";
pub const METRIC_LABEL_MARKER: &str = "data-metric-label";
pub const METRIC_TREND_MARKER: &str = "data-metric-trend";
pub const CHART_MARKER: &str = "data-export-chart";
pub const RANKING_MARKER: &str = "data-export-ranking";
pub const RANK_MARKER: &str = "data-rank";
pub const RANK_NAME_MARKER: &str = "data-rank-name";
pub const RANK_VALUE_MARKER: &str = "data-rank-value";

static TABLE_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(data-?table|table-(container|wrapper|responsive)|data-?grid|report-table)$")
        .expect("hardcoded table class regex is valid")
});
static LIST_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(data-?list|list-table|stats?-list)$")
        .expect("hardcoded list class regex is valid")
});
static METRIC_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(kpi|metric|stat)(-?(card|tile|widget|box))?$")
        .expect("hardcoded metric class regex is valid")
});
static CHART_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(chart|graph|plot)(-?(container|wrapper|card))?$|^recharts-wrapper$")
        .expect("hardcoded chart class regex is valid")
});
static RANKING_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(leaderboard|ranking|rank-list|top-?\d*-?list)$")
        .expect("hardcoded ranking class regex is valid")
});

/// How a candidate was found. Confidence depends only on the tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionTier {
    Registry,
    Marker,
    Structural,
    Heuristic,
}

impl DetectionTier {
    #[must_use]
    pub const fn confidence(self) -> f32 {
        match self {
            Self::Registry => 0.98,
            Self::Marker => 0.92,
            Self::Structural => 0.80,
            Self::Heuristic => 0.60,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Predicate {
    Tag(&'static str),
    Role(&'static str),
    HasAttribute(&'static str),
    AttributeEquals(&'static str, String),
    IdIn(Vec<String>),
    ClassMatches(&'static LazyLock<Regex>),
    MinSize { width: f64, height: f64 },
    AllOf(Vec<Predicate>),
    AnyOf(Vec<Predicate>),
}

impl Predicate {
    #[must_use]
    pub fn matches(&self, node: NodeRef<'_>) -> bool {
        match self {
            Self::Tag(tag) => node.tag() == *tag,
            Self::Role(role) => node.role() == Some(*role),
            Self::HasAttribute(name) => node.has_attr(name),
            Self::AttributeEquals(name, value) => node.attr(name) == Some(value.as_str()),
            Self::IdIn(ids) => [node.attr("id"), node.attr(TARGET_ID)]
                .into_iter()
                .flatten()
                .any(|id| ids.iter().any(|candidate| candidate == id)),
            Self::ClassMatches(pattern) => node.classes().any(|class| pattern.is_match(class)),
            Self::MinSize { width, height } => node
                .bbox()
                .is_some_and(|bbox| bbox.width >= *width && bbox.height >= *height),
            Self::AllOf(predicates) => predicates.iter().all(|predicate| predicate.matches(node)),
            Self::AnyOf(predicates) => predicates.iter().any(|predicate| predicate.matches(node)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PatternMatcher {
    pub label: &'static str,
    pub tier: DetectionTier,
    pub predicate: Predicate,
}

impl PatternMatcher {
    #[must_use]
    pub fn new(label: &'static str, tier: DetectionTier, predicate: Predicate) -> Self {
        Self {
            label,
            tier,
            predicate,
        }
    }

    /// Candidates in document order. Zero matches is a normal outcome.
    pub fn find<'a>(&self, nodes: impl Iterator<Item = NodeRef<'a>>) -> Vec<NodeRef<'a>> {
        nodes.filter(|node| self.predicate.matches(*node)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Table,
    Metric,
    Chart,
    Ranking,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredTarget {
    pub id: String,
    pub kind: TargetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Known export targets the caller vouches for. Passed per scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRegistry {
    #[serde(default)]
    pub targets: Vec<RegisteredTarget>,
}

impl TargetRegistry {
    #[must_use]
    pub fn new(targets: Vec<RegisteredTarget>) -> Self {
        Self { targets }
    }

    pub fn of_kind(&self, kind: TargetKind) -> impl Iterator<Item = &RegisteredTarget> {
        self.targets.iter().filter(move |target| target.kind == kind)
    }

    /// Registered display name for a node, if it is a registered target.
    #[must_use]
    pub fn name_for(&self, kind: TargetKind, node: NodeRef<'_>) -> Option<&str> {
        let ids = [node.attr("id"), node.attr(TARGET_ID)];
        self.of_kind(kind)
            .find(|target| ids.iter().flatten().any(|id| *id == target.id))
            .and_then(|target| target.name.as_deref())
    }

    fn matcher(&self, kind: TargetKind) -> Option<PatternMatcher> {
        let ids = self
            .of_kind(kind)
            .map(|target| target.id.clone())
            .collect::<Vec<_>>();
        (!ids.is_empty()).then(|| {
            PatternMatcher::new("registry", DetectionTier::Registry, Predicate::IdIn(ids))
        })
    }
}

/// Fixed priority list for one extractor.
#[derive(Debug, Clone)]
pub struct MatcherSet {
    pub matchers: Vec<PatternMatcher>,
}

impl MatcherSet {
    fn with_registry(
        registry: Option<&TargetRegistry>,
        kind: TargetKind,
        rest: Vec<PatternMatcher>,
    ) -> Self {
        let mut matchers = Vec::with_capacity(rest.len() + 1);
        matchers.extend(registry.and_then(|registry| registry.matcher(kind)));
        matchers.extend(rest);
        Self { matchers }
    }

    #[must_use]
    pub fn tables(registry: Option<&TargetRegistry>) -> Self {
        Self::with_registry(
            registry,
            TargetKind::Table,
            vec![
                PatternMatcher::new(
                    "table-marker",
                    DetectionTier::Marker,
                    Predicate::HasAttribute(TABLE_MARKER),
                ),
                PatternMatcher::new(
                    "table-tag",
                    DetectionTier::Structural,
                    Predicate::Tag("table"),
                ),
                PatternMatcher::new(
                    "table-role",
                    DetectionTier::Structural,
                    Predicate::AnyOf(vec![
                        Predicate::Role("table"),
                        Predicate::Role("grid"),
                        Predicate::Role("treegrid"),
                    ]),
                ),
                PatternMatcher::new(
                    "table-class",
                    DetectionTier::Heuristic,
                    Predicate::ClassMatches(&TABLE_CLASS_RE),
                ),
                PatternMatcher::new(
                    "list-class",
                    DetectionTier::Heuristic,
                    Predicate::AllOf(vec![
                        Predicate::AnyOf(vec![Predicate::Tag("ul"), Predicate::Tag("ol")]),
                        Predicate::ClassMatches(&LIST_CLASS_RE),
                    ]),
                ),
            ],
        )
    }

    #[must_use]
    pub fn metrics(registry: Option<&TargetRegistry>) -> Self {
        Self::with_registry(
            registry,
            TargetKind::Metric,
            vec![
                PatternMatcher::new(
                    "metric-marker",
                    DetectionTier::Marker,
                    Predicate::HasAttribute(METRIC_MARKER),
                ),
                PatternMatcher::new(
                    "metric-class",
                    DetectionTier::Heuristic,
                    Predicate::ClassMatches(&METRIC_CLASS_RE),
                ),
            ],
        )
    }

    /// Containers run before bare canvas/svg so the graphic inside a matched
    /// container is skipped as nested.
    #[must_use]
    pub fn charts(registry: Option<&TargetRegistry>) -> Self {
        let min_size = || Predicate::MinSize {
            width: 48.0,
            height: 48.0,
        };
        Self::with_registry(
            registry,
            TargetKind::Chart,
            vec![
                PatternMatcher::new(
                    "chart-marker",
                    DetectionTier::Marker,
                    Predicate::HasAttribute(CHART_MARKER),
                ),
                PatternMatcher::new(
                    "chart-class",
                    DetectionTier::Heuristic,
                    Predicate::ClassMatches(&CHART_CLASS_RE),
                ),
                PatternMatcher::new(
                    "canvas",
                    DetectionTier::Structural,
                    Predicate::AllOf(vec![Predicate::Tag("canvas"), min_size()]),
                ),
                PatternMatcher::new(
                    "svg",
                    DetectionTier::Structural,
                    Predicate::AllOf(vec![Predicate::Tag("svg"), min_size()]),
                ),
            ],
        )
    }

    #[must_use]
    pub fn rankings(registry: Option<&TargetRegistry>) -> Self {
        Self::with_registry(
            registry,
            TargetKind::Ranking,
            vec![
                PatternMatcher::new(
                    "ranking-marker",
                    DetectionTier::Marker,
                    Predicate::HasAttribute(RANKING_MARKER),
                ),
                PatternMatcher::new(
                    "ranking-class",
                    DetectionTier::Heuristic,
                    Predicate::ClassMatches(&RANKING_CLASS_RE),
                ),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{DetectionTier, MatcherSet, RegisteredTarget, TargetKind, TargetRegistry};
    use crate::snapshot::{Snapshot, SnapshotNode};

    #[test]
    fn tiers_order_confidence() {
        assert!(DetectionTier::Registry.confidence() > DetectionTier::Marker.confidence());
        assert!(DetectionTier::Marker.confidence() > DetectionTier::Structural.confidence());
        assert!(DetectionTier::Structural.confidence() > DetectionTier::Heuristic.confidence());
    }

    #[test]
    fn registry_matcher_runs_first() {
        let registry = TargetRegistry::new(vec![RegisteredTarget {
            id: "sales".to_string(),
            kind: TargetKind::Table,
            name: Some("Sales".to_string()),
        }]);
        let set = MatcherSet::tables(Some(&registry));
        assert_eq!(set.matchers[0].tier, DetectionTier::Registry);
        assert_eq!(MatcherSet::tables(None).matchers[0].label, "table-marker");
    }

    #[test]
    fn class_heuristics_match_whole_class_names() {
        let snapshot = Snapshot::from_tree(
            SnapshotNode::element("body")
                .child(SnapshotNode::element("div").class("card table-container"))
                .child(SnapshotNode::element("div").class("tablet-layout"))
                .child(SnapshotNode::element("div").class("kpi-card")),
        );
        let tables = MatcherSet::tables(None);
        let heuristic = tables
            .matchers
            .iter()
            .find(|matcher| matcher.label == "table-class")
            .expect("heuristic matcher");
        assert_eq!(heuristic.find(snapshot.nodes()).len(), 1);

        let metrics = MatcherSet::metrics(None);
        assert_eq!(metrics.matchers[1].find(snapshot.nodes()).len(), 1);
    }
}
