use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::classify::{classify_category, classify_kind, complexity, parse_kind_marker};
use crate::config::ScanOptions;
use crate::dedup::dedup_blocks;
use crate::error::ExtractionFault;
use crate::header::{RowCandidate, resolve_headers, synthetic_header};
use crate::matcher::{HEADER_MARKER, KIND_MARKER, MatcherSet, TargetKind};
use crate::model::TabularBlock;
use crate::scan::{Candidate, ScanContext};
use crate::snapshot::NodeRef;
use crate::value::{ValueKind, majority_kind, parse_value};
use crate::warning::{ScanWarning, WarningCode};

pub(crate) const STAGE: &str = "tables";

const CELL_ROLES: &[&str] = &["cell", "gridcell", "columnheader", "rowheader"];

fn is_row(node: NodeRef<'_>) -> bool {
    node.tag() == "tr" || node.role() == Some("row")
}

fn is_cell(node: NodeRef<'_>) -> bool {
    matches!(node.tag(), "td" | "th") || node.role().is_some_and(|role| CELL_ROLES.contains(&role))
}

fn is_header_cell(node: NodeRef<'_>) -> bool {
    node.tag() == "th" || node.role() == Some("columnheader")
}

/// `tr`/`row` descendants when there are any, `li` items for lists, and
/// plain element children otherwise.
fn discover_rows(container: NodeRef<'_>) -> Vec<NodeRef<'_>> {
    let rows = container.descendants().filter(|node| is_row(*node)).collect::<Vec<_>>();
    if !rows.is_empty() {
        return rows;
    }
    if matches!(container.tag(), "ul" | "ol") {
        return container.children().filter(|node| node.tag() == "li").collect();
    }
    container.children().collect()
}

fn row_cells(row: NodeRef<'_>) -> Vec<NodeRef<'_>> {
    let cells = row.children().filter(|node| is_cell(*node)).collect::<Vec<_>>();
    if !cells.is_empty() {
        return cells;
    }
    let children = row.children().collect::<Vec<_>>();
    if children.is_empty() { vec![row] } else { children }
}

fn in_thead(row: NodeRef<'_>, container: NodeRef<'_>) -> bool {
    row.ancestors()
        .take_while(|node| node.id() != container.id())
        .any(|node| node.tag() == "thead")
}

fn candidate_row(row: NodeRef<'_>, container: NodeRef<'_>) -> RowCandidate {
    let cells = row_cells(row);
    let texts = cells.iter().map(NodeRef::text).collect::<Vec<_>>();
    let mut filled = cells
        .iter()
        .zip(&texts)
        .filter(|(_, text)| !text.is_empty())
        .peekable();
    let header_cells = filled.peek().is_some() && filled.all(|(cell, _)| is_header_cell(*cell));

    RowCandidate {
        cells: texts,
        marked_header: row.has_attr(HEADER_MARKER) || in_thead(row, container),
        header_cells,
    }
}

fn block_name(
    ctx: &ScanContext<'_>,
    node: NodeRef<'_>,
    headers: &[String],
    category_label: &str,
) -> String {
    if let Some(name) = ctx.explicit_name(TargetKind::Table, node) {
        return name;
    }
    let caption = node
        .children()
        .find(|child| child.tag() == "caption")
        .map(|caption| caption.text())
        .filter(|text| !text.is_empty());
    if let Some(name) = caption.or_else(|| node.nearest_heading()) {
        return name;
    }
    let preview = headers.iter().take(3).cloned().collect::<Vec<_>>().join(", ");
    format!("{category_label} Data ({preview})")
}

/// Majority-vote type per column over the first `type_sample_size` rows,
/// plus the unit tag of numeric columns.
fn column_metadata(
    headers: &[String],
    data: &[Vec<String>],
    options: &ScanOptions,
) -> (BTreeMap<String, ValueKind>, BTreeMap<String, String>) {
    let locale = &options.locale;
    let sample = options.type_sample_size;
    let mut data_types = BTreeMap::new();
    let mut units = BTreeMap::new();
    for (column, header) in headers.iter().enumerate() {
        let samples = || data.iter().take(sample).map(|row| row[column].as_str());
        let kind = majority_kind(samples(), Some(header), locale);
        if kind.is_numeric() {
            let unit = samples()
                .map(|cell| parse_value(cell, Some(header), locale))
                .find(|parsed| parsed.kind == kind && parsed.unit.is_some())
                .and_then(|parsed| parsed.unit);
            if let Some(unit) = unit {
                units.insert(header.clone(), unit);
            }
        }
        data_types.insert(header.clone(), kind);
    }

    (data_types, units)
}

fn extract_block(
    ctx: &ScanContext<'_>,
    candidate: &Candidate<'_>,
    warnings: &mut Vec<ScanWarning>,
) -> Result<Option<TabularBlock>, ExtractionFault> {
    let node = candidate.node;
    let location = node.source_location();
    let rows = discover_rows(node)
        .into_iter()
        .map(|row| candidate_row(row, node))
        .collect::<Vec<_>>();

    let widest = rows.iter().map(|row| row.cells.len()).max().unwrap_or(0);
    if widest > ctx.options.max_columns {
        return Err(ExtractionFault::new(
            STAGE,
            location,
            format!("{widest} columns exceed the limit of {}", ctx.options.max_columns),
        ));
    }

    let resolved = resolve_headers(&rows);
    let mut headers = resolved.headers;
    let mut columns = resolved.columns;
    let mut header_width = resolved
        .header_row
        .map_or(widest, |index| rows[index].cells.len());

    let cap = ctx.options.max_rows_per_block;
    let mut data = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        if Some(index) == resolved.header_row || row.is_blank() {
            continue;
        }
        if data.len() == cap {
            warnings.push(
                ScanWarning::new(
                    WarningCode::RowCapReached,
                    format!("table truncated at {cap} rows"),
                )
                .with_stage(STAGE)
                .with_location(location.clone()),
            );
            warn!(location = %location, cap, "row cap reached");
            break;
        }

        while row.cells.len() > header_width {
            let mut label = synthetic_header(header_width);
            while headers.contains(&label) {
                label.push('\'');
            }
            headers.push(label);
            columns.push(header_width);
            header_width += 1;
        }
        data.push(
            columns
                .iter()
                .map(|&column| row.cells.get(column).cloned().unwrap_or_default())
                .collect::<Vec<_>>(),
        );
    }

    let width = headers.len();
    for row in &mut data {
        row.resize(width, String::new());
    }

    if headers.is_empty() || data.is_empty() {
        debug!(location = %location, "candidate has no data rows");
        return Ok(None);
    }

    let (data_types, units) = column_metadata(&headers, &data, ctx.options);

    let category = classify_category(&headers);
    let kind = node
        .attr(KIND_MARKER)
        .and_then(parse_kind_marker)
        .unwrap_or_else(|| {
            let hints = [node.attr("class"), node.attr("id")]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>();
            classify_kind(&headers, &hints, data.len())
        });

    Ok(Some(TabularBlock {
        id: String::new(),
        name: block_name(ctx, node, &headers, category.label()),
        category,
        kind,
        confidence: candidate.tier.confidence(),
        complexity: complexity(data.len(), width),
        row_count: data.len(),
        column_count: width,
        data_types,
        units,
        source_location: location,
        matched_by: candidate.matched_by.to_string(),
        headers,
        rows: data,
    }))
}

/// Every table-like region on the page, deduplicated, with ids `table-1..`
/// in document discovery order.
pub(crate) fn extract_tables(
    ctx: &ScanContext<'_>,
    warnings: &mut Vec<ScanWarning>,
) -> Vec<TabularBlock> {
    let matchers = MatcherSet::tables(ctx.registry);
    let mut blocks = Vec::new();
    for candidate in ctx.candidates(&matchers, TargetKind::Table, STAGE, warnings) {
        match extract_block(ctx, &candidate, warnings) {
            Ok(Some(block)) => blocks.push(block),
            Ok(None) => {}
            Err(fault) => {
                warn!(%fault, "skipping table");
                warnings.push(fault.into());
            }
        }
    }

    let mut blocks = dedup_blocks(blocks);
    for (index, block) in blocks.iter_mut().enumerate() {
        block.id = format!("table-{}", index + 1);
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::extract_tables;
    use crate::config::ScanOptions;
    use crate::model::{Category, TabularBlock};
    use crate::scan::ScanContext;
    use crate::snapshot::{Snapshot, SnapshotNode};
    use crate::value::ValueKind;
    use crate::warning::{ScanWarning, WarningCode};

    fn cell(tag: &str, text: &str) -> SnapshotNode {
        SnapshotNode::element(tag).text(text)
    }

    fn row(tag: &str, cells: &[&str]) -> SnapshotNode {
        SnapshotNode::element("tr").children(cells.iter().map(|text| cell(tag, text)))
    }

    fn page(table: SnapshotNode) -> Snapshot {
        Snapshot::from_tree(
            SnapshotNode::element("body")
                .bbox(0.0, 0.0, 1200.0, 900.0)
                .child(SnapshotNode::element("h2").text("Studio revenue"))
                .child(table),
        )
    }

    fn scan(snapshot: &Snapshot, options: &ScanOptions) -> (Vec<TabularBlock>, Vec<ScanWarning>) {
        let ctx = ScanContext {
            snapshot,
            options,
            registry: None,
        };
        let mut warnings = Vec::new();
        let tables = extract_tables(&ctx, &mut warnings);
        (tables, warnings)
    }

    #[test]
    fn extracts_typed_table_with_heading_name() {
        let table = SnapshotNode::element("table")
            .bbox(0.0, 40.0, 600.0, 200.0)
            .child(SnapshotNode::element("thead").child(row("th", &["Name", "Revenue", "Date"])))
            .child(
                SnapshotNode::element("tbody")
                    .child(row("td", &["Kemps", "$1,200.50", "2024-05-01"]))
                    .child(row("td", &["Bandra", "$980", "2024-05-02"]))
                    .child(row("td", &["", "", ""])),
            );
        let (tables, warnings) = scan(&page(table), &ScanOptions::default());

        assert!(warnings.is_empty());
        assert_eq!(tables.len(), 1);
        let block = &tables[0];
        assert_eq!(block.id, "table-1");
        assert_eq!(block.name, "Studio revenue");
        assert_eq!(block.category, Category::Financial);
        assert_eq!(block.row_count, 2);
        assert_eq!(block.data_types["Revenue"], ValueKind::Currency);
        assert_eq!(block.data_types["Date"], ValueKind::Date);
        assert_eq!(block.units["Revenue"], "$");
    }

    #[test]
    fn extra_cells_become_additional_columns() {
        let table = SnapshotNode::element("table")
            .bbox(0.0, 40.0, 600.0, 200.0)
            .child(row("th", &["Studio", "Members"]))
            .child(row("td", &["Kemps", "120", "note"]));
        let (tables, _) = scan(&page(table), &ScanOptions::default());
        assert_eq!(tables[0].headers, vec!["Studio", "Members", "Column 3"]);
        assert_eq!(tables[0].rows[0], vec!["Kemps", "120", "note"]);
    }

    #[test]
    fn hidden_tables_are_skipped_unless_visibility_is_off() {
        let table = SnapshotNode::element("table")
            .child(row("th", &["Studio"]))
            .child(row("td", &["Kemps"]));
        let snapshot = page(table);
        assert!(scan(&snapshot, &ScanOptions::default()).0.is_empty());

        let options = ScanOptions {
            require_visible: false,
            ..ScanOptions::default()
        };
        assert_eq!(scan(&snapshot, &options).0.len(), 1);
    }

    #[test]
    fn row_cap_truncates_with_warning() {
        let mut table = SnapshotNode::element("table")
            .bbox(0.0, 40.0, 600.0, 200.0)
            .child(row("th", &["Studio"]));
        for index in 0..5 {
            table = table.child(row("td", &[&format!("studio {index}")]));
        }
        let options = ScanOptions {
            max_rows_per_block: 3,
            ..ScanOptions::default()
        };
        let (tables, warnings) = scan(&page(table), &options);
        assert_eq!(tables[0].row_count, 3);
        assert_eq!(warnings[0].code, WarningCode::RowCapReached);
    }

    #[test]
    fn over_wide_blocks_are_faults() {
        let table = SnapshotNode::element("table")
            .bbox(0.0, 40.0, 600.0, 200.0)
            .child(row("th", &["A", "B", "C"]))
            .child(row("td", &["1", "2", "3"]));
        let options = ScanOptions {
            max_columns: 2,
            ..ScanOptions::default()
        };
        let (tables, warnings) = scan(&page(table), &options);
        assert!(tables.is_empty());
        assert_eq!(warnings[0].code, WarningCode::ExtractionFault);
        assert_eq!(warnings[0].stage, Some("tables"));
    }
}
