use std::sync::LazyLock;

use regex::Regex;

use crate::matcher::{MatcherSet, RANK_MARKER, RANK_NAME_MARKER, RANK_VALUE_MARKER, TargetKind};
use crate::model::{RankingItem, RankingRecord};
use crate::scan::{Candidate, ScanContext};
use crate::snapshot::NodeRef;
use crate::warning::ScanWarning;

pub(crate) const STAGE: &str = "rankings";

/// `#1 Kemps Corner 1,204` or `1. Kemps Corner 1,204` -> rank, name,
/// trailing value. A bare leading number belongs to the name.
static ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:#(\d{1,4})[.):]?|(\d{1,4})[.):])\s+)?(.*?)(?:\s+([-+]?[₹$€£¥]?\d[\d.,']*\s?%?))?$",
    )
    .expect("hardcoded ranking item regex is valid")
});

fn marked_text(item: NodeRef<'_>, marker: &str) -> Option<String> {
    let node = if item.has_attr(marker) {
        Some(item)
    } else {
        item.descendants().find(|child| child.has_attr(marker))
    }?;
    let text = node
        .attr(marker)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| node.text(), ToString::to_string);
    (!text.is_empty()).then_some(text)
}

/// Non-heading children of the container, looking through a single
/// wrapping list.
fn ranking_items(container: NodeRef<'_>) -> Vec<NodeRef<'_>> {
    let children = container
        .children()
        .filter(|child| !child.is_heading())
        .collect::<Vec<_>>();
    match children.as_slice() {
        [only] if matches!(only.tag(), "ul" | "ol") => only.children().collect(),
        _ => children,
    }
}

fn ranking_item(item: NodeRef<'_>, position: usize) -> Option<RankingItem> {
    let flat = item.text();
    let captures = ITEM_RE.captures(&flat);
    let capture = |index: usize| {
        captures
            .as_ref()
            .and_then(|captures| captures.get(index))
            .map(|found| found.as_str().trim().to_string())
            .filter(|text| !text.is_empty())
    };

    let rank = marked_text(item, RANK_MARKER)
        .and_then(|rank| rank.trim_start_matches('#').parse::<u32>().ok())
        .or_else(|| {
            capture(1)
                .or_else(|| capture(2))
                .and_then(|rank| rank.parse().ok())
        })
        .unwrap_or_else(|| u32::try_from(position + 1).unwrap_or(u32::MAX));
    let name = marked_text(item, RANK_NAME_MARKER).or_else(|| capture(3))?;
    let value = marked_text(item, RANK_VALUE_MARKER)
        .or_else(|| capture(4))
        .unwrap_or_default();

    Some(RankingItem { rank, name, value })
}

fn extract_ranking(
    ctx: &ScanContext<'_>,
    candidate: &Candidate<'_>,
    index: usize,
) -> Option<RankingRecord> {
    let node = candidate.node;
    let items = ranking_items(node)
        .into_iter()
        .enumerate()
        .filter_map(|(position, item)| ranking_item(item, position))
        .collect::<Vec<_>>();
    if items.is_empty() {
        return None;
    }

    let name = ctx
        .explicit_name(TargetKind::Ranking, node)
        .or_else(|| {
            node.children()
                .find(|child| child.is_heading())
                .map(|heading| heading.text())
        })
        .or_else(|| node.nearest_heading())
        .unwrap_or_else(|| format!("Ranking {index}"));

    Some(RankingRecord {
        id: format!("ranking-{index}"),
        name,
        items,
        confidence: candidate.tier.confidence(),
        source_location: node.source_location(),
    })
}

pub(crate) fn extract_rankings(
    ctx: &ScanContext<'_>,
    warnings: &mut Vec<ScanWarning>,
) -> Vec<RankingRecord> {
    let matchers = MatcherSet::rankings(ctx.registry);
    let mut rankings = Vec::new();
    for candidate in ctx.candidates(&matchers, TargetKind::Ranking, STAGE, warnings) {
        if let Some(ranking) = extract_ranking(ctx, &candidate, rankings.len() + 1) {
            rankings.push(ranking);
        }
    }
    rankings
}

#[cfg(test)]
mod tests {
    use super::extract_rankings;
    use crate::config::ScanOptions;
    use crate::model::{RankingItem, RankingRecord};
    use crate::scan::ScanContext;
    use crate::snapshot::{Snapshot, SnapshotNode};

    fn extract(root: SnapshotNode) -> Vec<RankingRecord> {
        let snapshot = Snapshot::from_tree(root);
        let options = ScanOptions::default();
        let ctx = ScanContext {
            snapshot: &snapshot,
            options: &options,
            registry: None,
        };
        extract_rankings(&ctx, &mut Vec::new())
    }

    fn item(rank: u32, name: &str, value: &str) -> RankingItem {
        RankingItem {
            rank,
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn parses_flat_leaderboard_items() {
        let rankings = extract(
            SnapshotNode::element("body").bbox(0.0, 0.0, 800.0, 600.0).child(
                SnapshotNode::element("div")
                    .class("leaderboard")
                    .bbox(0.0, 0.0, 300.0, 200.0)
                    .child(SnapshotNode::element("h3").text("Top trainers"))
                    .child(SnapshotNode::element("div").text("1. Asha Rao 98%"))
                    .child(SnapshotNode::element("div").text("2. Vik Shah 91%"))
                    .child(SnapshotNode::element("div").text("Mira Patel")),
            ),
        );
        assert_eq!(rankings.len(), 1);
        assert_eq!(rankings[0].name, "Top trainers");
        assert_eq!(
            rankings[0].items,
            vec![
                item(1, "Asha Rao", "98%"),
                item(2, "Vik Shah", "91%"),
                item(3, "Mira Patel", "")
            ]
        );
    }

    #[test]
    fn heading_then_list_yields_one_item_per_entry() {
        let rankings = extract(
            SnapshotNode::element("body").bbox(0.0, 0.0, 800.0, 600.0).child(
                SnapshotNode::element("div")
                    .class("leaderboard")
                    .bbox(0.0, 0.0, 300.0, 200.0)
                    .child(SnapshotNode::element("h3").text("Top trainers"))
                    .child(
                        SnapshotNode::element("ol")
                            .child(SnapshotNode::element("li").text("Asha Rao 98%"))
                            .child(SnapshotNode::element("li").text("Vik Shah 91%"))
                            .child(SnapshotNode::element("li").text("Mira Patel 88%")),
                    ),
            ),
        );
        assert_eq!(rankings[0].name, "Top trainers");
        assert_eq!(
            rankings[0].items,
            vec![
                item(1, "Asha Rao", "98%"),
                item(2, "Vik Shah", "91%"),
                item(3, "Mira Patel", "88%")
            ]
        );
    }

    #[test]
    fn leading_numbers_without_rank_punctuation_stay_in_the_name() {
        let rankings = extract(
            SnapshotNode::element("body").bbox(0.0, 0.0, 800.0, 600.0).child(
                SnapshotNode::element("ul")
                    .class("ranking")
                    .bbox(0.0, 0.0, 300.0, 200.0)
                    .child(SnapshotNode::element("li").text("24 Fitness Studio"))
                    .child(SnapshotNode::element("li").text("#5 Powai 1,410"))
                    .child(SnapshotNode::element("li").text("7) Juhu")),
            ),
        );
        assert_eq!(
            rankings[0].items,
            vec![
                item(1, "24 Fitness Studio", ""),
                item(5, "Powai", "1,410"),
                item(7, "Juhu", "")
            ]
        );
    }

    #[test]
    fn markers_override_positions() {
        let entry = |rank: &str, name: &str, value: &str| {
            SnapshotNode::element("li")
                .attr("data-rank", rank)
                .child(SnapshotNode::element("span").attr("data-rank-name", "").text(name))
                .child(SnapshotNode::element("span").attr("data-rank-value", "").text(value))
        };
        let rankings = extract(
            SnapshotNode::element("body").bbox(0.0, 0.0, 800.0, 600.0).child(
                SnapshotNode::element("section")
                    .attr("data-export-ranking", "")
                    .attr("aria-label", "Studios by revenue")
                    .bbox(0.0, 0.0, 300.0, 200.0)
                    .child(
                        SnapshotNode::element("ol")
                            .child(entry("3", "Bandra", "$1,200"))
                            .child(entry("7", "Kemps", "$900")),
                    ),
            ),
        );
        assert_eq!(rankings[0].name, "Studios by revenue");
        assert_eq!(
            rankings[0].items,
            vec![item(3, "Bandra", "$1,200"), item(7, "Kemps", "$900")]
        );
    }
}
