//! Canonical documents: the sheet-shaped form every serializer consumes.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ExportConfiguration, ExportFormat, NumberLocale};
use crate::error::ExportError;
use crate::model::TabularBlock;
use crate::value::{NormalizedValue, ValueKind, parse_value};

pub const BUNDLE_SHEET_NAME: &str = "Combined Export";
pub const BUNDLE_SOURCE_HEADER: &str = "Source Table";
pub const SUMMARY_SHEET_NAME: &str = "Summary";

const FORBIDDEN_SHEET_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

/// One typed cell. Numeric kinds hold the parsed number, dates hold ISO
/// text, units live in [`CanonicalDocument::column_units`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
}

impl CellValue {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Converts one raw block cell under its column's detected kind. A cell
    /// that does not fit the column type keeps its text.
    #[must_use]
    pub fn from_raw(raw: &str, kind: ValueKind, header: &str, locale: &NumberLocale) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        if kind == ValueKind::Text {
            return Self::Text(trimmed.to_string());
        }
        let parsed = parse_value(trimmed, Some(header), locale);
        match parsed.value {
            NormalizedValue::Number(number) if parsed.kind.is_numeric() && kind.is_numeric() => {
                Self::Number(number)
            }
            NormalizedValue::Text(text) if parsed.kind == ValueKind::Date => Self::Text(text),
            _ => Self::Text(trimmed.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Number(number) => write!(f, "{number}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
}

impl MetadataEntry {
    fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalDocument {
    pub sheet_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_row: Option<Vec<String>>,
    pub rows: Vec<Vec<CellValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_preamble: Option<Vec<MetadataEntry>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub column_units: BTreeMap<String, String>,
}

impl CanonicalDocument {
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.header_row.as_ref().map_or_else(
            || self.rows.iter().map(Vec::len).max().unwrap_or(0),
            Vec::len,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub id: String,
    pub name: String,
    pub row_count: usize,
    pub column_count: usize,
    pub source_location: String,
}

/// What went into an export, independent of how it is laid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportManifest {
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub blocks: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSet {
    pub documents: Vec<CanonicalDocument>,
    pub manifest: ExportManifest,
}

impl DocumentSet {
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.documents.iter().map(CanonicalDocument::row_count).sum()
    }
}

/// Replaces characters spreadsheets reject and trims stray quotes.
#[must_use]
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned = name
        .chars()
        .map(|ch| {
            if FORBIDDEN_SHEET_CHARS.contains(&ch) || ch.is_control() {
                '-'
            } else {
                ch
            }
        })
        .collect::<String>();
    let cleaned = cleaned.trim().trim_matches('\'').trim();
    if cleaned.is_empty() {
        "Sheet".to_string()
    } else {
        cleaned.to_string()
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect::<String>().trim_end().to_string()
}

/// Hands out sheet names unique within one export, compared
/// case-insensitively, each at most `limit` characters.
#[derive(Debug)]
struct SheetNames {
    limit: usize,
    taken: HashSet<String>,
}

impl SheetNames {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            taken: HashSet::new(),
        }
    }

    fn reserve(&mut self, name: &str) {
        self.taken.insert(name.to_lowercase());
    }

    fn claim(&mut self, name: &str) -> String {
        let base = sanitize_sheet_name(name);
        let mut candidate = truncate_chars(&base, self.limit);
        let mut counter = 2;
        while self.taken.contains(&candidate.to_lowercase()) {
            let suffix = format!(" ({counter})");
            let room = self.limit.saturating_sub(suffix.chars().count());
            candidate = format!("{}{suffix}", truncate_chars(&base, room));
            counter += 1;
        }
        self.reserve(&candidate);
        candidate
    }
}

fn convert_rows(block: &TabularBlock, locale: &NumberLocale) -> Vec<Vec<CellValue>> {
    let kinds = (0..block.headers.len())
        .map(|column| block.column_kind(column))
        .collect::<Vec<_>>();
    block
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .zip(kinds.iter().zip(&block.headers))
                .map(|(cell, (kind, header))| CellValue::from_raw(cell, *kind, header, locale))
                .collect()
        })
        .collect()
}

/// Builds canonical documents for one export.
pub struct DocumentBuilder<'a> {
    config: &'a ExportConfiguration,
    generated_at: DateTime<Utc>,
}

impl<'a> DocumentBuilder<'a> {
    #[must_use]
    pub fn new(config: &'a ExportConfiguration, generated_at: DateTime<Utc>) -> Self {
        Self {
            config,
            generated_at,
        }
    }

    /// One document per block (or one combined document in bundle mode),
    /// split at `maxRowsPerSheet` when splitting is on.
    pub fn build(&self, blocks: &[&TabularBlock]) -> Result<DocumentSet, ExportError> {
        if blocks.is_empty() {
            return Err(ExportError::EmptySelection);
        }

        let manifest = ExportManifest {
            generated_at: self.generated_at,
            source: self.config.source.clone(),
            blocks: blocks
                .iter()
                .map(|block| ManifestEntry {
                    id: block.id.clone(),
                    name: block.name.clone(),
                    row_count: block.row_count,
                    column_count: block.column_count,
                    source_location: block.source_location.clone(),
                })
                .collect(),
        };

        let drafts = if self.config.bundle {
            vec![self.bundle(blocks)]
        } else {
            blocks.iter().map(|block| self.single(block)).collect()
        };

        let mut names = SheetNames::new(self.config.format.sheet_name_limit());
        if self.config.format == ExportFormat::Workbook && self.config.include_metadata {
            names.reserve(SUMMARY_SHEET_NAME);
        }

        let mut documents = Vec::new();
        for draft in drafts {
            let parts = self.split(draft.rows);
            let numbered = parts.len() > 1;
            for (index, rows) in parts.into_iter().enumerate() {
                let name = if numbered {
                    format!("{} ({})", draft.name, index + 1)
                } else {
                    draft.name.clone()
                };
                documents.push(CanonicalDocument {
                    sheet_name: names.claim(&name),
                    header_row: self.config.include_headers.then(|| draft.headers.clone()),
                    metadata_preamble: self
                        .config
                        .include_metadata
                        .then(|| self.preamble(&draft.sources, &draft.units, rows.len())),
                    rows,
                    column_units: draft.units.clone(),
                });
            }
        }

        Ok(DocumentSet {
            documents,
            manifest,
        })
    }

    fn single(&self, block: &TabularBlock) -> Draft {
        Draft {
            name: block.name.clone(),
            headers: block.headers.clone(),
            rows: convert_rows(block, &self.config.locale),
            units: block.units.clone(),
            sources: vec![(block.name.clone(), block.source_location.clone())],
        }
    }

    /// `Source Table` then the union of headers in first-seen order.
    fn bundle(&self, blocks: &[&TabularBlock]) -> Draft {
        let mut headers = vec![BUNDLE_SOURCE_HEADER.to_string()];
        let mut units = BTreeMap::new();
        for block in blocks {
            for header in &block.headers {
                if !headers.contains(header) {
                    headers.push(header.clone());
                }
            }
            for (header, unit) in &block.units {
                units.entry(header.clone()).or_insert_with(|| unit.clone());
            }
        }

        let mut rows = Vec::new();
        for block in blocks {
            let positions = block
                .headers
                .iter()
                .map(|header| headers.iter().position(|candidate| candidate == header))
                .collect::<Vec<_>>();
            for converted in convert_rows(block, &self.config.locale) {
                let mut row = vec![CellValue::Empty; headers.len()];
                row[0] = CellValue::Text(block.name.clone());
                for (cell, position) in converted.into_iter().zip(&positions) {
                    if let Some(position) = position {
                        row[*position] = cell;
                    }
                }
                rows.push(row);
            }
        }

        Draft {
            name: BUNDLE_SHEET_NAME.to_string(),
            headers,
            rows,
            units,
            sources: blocks
                .iter()
                .map(|block| (block.name.clone(), block.source_location.clone()))
                .collect(),
        }
    }

    fn split(&self, rows: Vec<Vec<CellValue>>) -> Vec<Vec<Vec<CellValue>>> {
        let limit = self.config.max_rows_per_sheet;
        if !self.config.split_large_files || rows.len() <= limit {
            return vec![rows];
        }
        let mut parts = Vec::with_capacity(rows.len().div_ceil(limit));
        let mut rows = rows.into_iter().peekable();
        while rows.peek().is_some() {
            parts.push(rows.by_ref().take(limit).collect());
        }
        parts
    }

    fn preamble(
        &self,
        sources: &[(String, String)],
        units: &BTreeMap<String, String>,
        row_count: usize,
    ) -> Vec<MetadataEntry> {
        let mut entries = vec![MetadataEntry::new(
            "Generated At",
            self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        )];
        let source = self.config.source.clone().unwrap_or_else(|| {
            sources
                .iter()
                .map(|(_, location)| location.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        });
        entries.push(MetadataEntry::new("Source", source));
        for (name, _) in sources {
            entries.push(MetadataEntry::new("Table", name.clone()));
        }
        entries.push(MetadataEntry::new("Rows", row_count.to_string()));
        for (header, unit) in units {
            entries.push(MetadataEntry::new(format!("Unit: {header}"), unit.clone()));
        }
        entries
    }
}

struct Draft {
    name: String,
    headers: Vec<String>,
    rows: Vec<Vec<CellValue>>,
    units: BTreeMap<String, String>,
    sources: Vec<(String, String)>,
}

/// First `limit` rows of one document, for clipboard-style output.
#[derive(Debug, Clone, Copy)]
pub struct Preview<'a> {
    pub document: &'a CanonicalDocument,
    pub rows: &'a [Vec<CellValue>],
    pub omitted: usize,
}

#[must_use]
pub fn preview(documents: &[CanonicalDocument], limit: usize) -> Vec<Preview<'_>> {
    documents
        .iter()
        .map(|document| {
            let shown = document.rows.len().min(limit);
            Preview {
                document,
                rows: &document.rows[..shown],
                omitted: document.rows.len() - shown,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::{CellValue, DocumentBuilder, preview, sanitize_sheet_name};
    use crate::config::{ExportConfiguration, ExportFormat, NumberLocale};
    use crate::error::ExportError;
    use crate::model::{Category, Complexity, TableKind, TabularBlock};
    use crate::value::ValueKind;

    fn block(id: &str, name: &str, headers: &[&str], rows: &[&[&str]]) -> TabularBlock {
        let headers = headers.iter().map(ToString::to_string).collect::<Vec<_>>();
        let rows = rows
            .iter()
            .map(|row| row.iter().map(ToString::to_string).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        let mut data_types = BTreeMap::new();
        let mut units = BTreeMap::new();
        for header in &headers {
            let kind = if header == "Revenue" {
                units.insert(header.clone(), "$".to_string());
                ValueKind::Currency
            } else {
                ValueKind::Text
            };
            data_types.insert(header.clone(), kind);
        }
        TabularBlock {
            id: id.to_string(),
            name: name.to_string(),
            row_count: rows.len(),
            column_count: headers.len(),
            headers,
            rows,
            category: Category::Financial,
            kind: TableKind::Summary,
            confidence: 0.8,
            complexity: Complexity::Simple,
            data_types,
            units,
            source_location: format!("body > table#{id}"),
            matched_by: "table-tag".to_string(),
        }
    }

    fn at_noon() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn converts_cells_by_column_kind() {
        let sales = block(
            "t1",
            "Sales",
            &["Studio", "Revenue"],
            &[&["Kemps", "$1,200.50"], &["Bandra", "n/a"], &["", ""]],
        );
        let config = ExportConfiguration::default();
        let set = DocumentBuilder::new(&config, at_noon()).build(&[&sales]).unwrap();
        let document = &set.documents[0];
        assert_eq!(
            document.header_row.as_deref(),
            Some(&["Studio".to_string(), "Revenue".to_string()][..])
        );
        assert_eq!(
            document.rows[0],
            vec![CellValue::Text("Kemps".into()), CellValue::Number(1200.5)]
        );
        assert_eq!(document.rows[1][1], CellValue::Text("n/a".into()));
        assert_eq!(document.rows[2], vec![CellValue::Empty, CellValue::Empty]);
        assert_eq!(document.column_units["Revenue"], "$");
        assert_eq!(document.metadata_preamble, None);
    }

    #[test]
    fn overflowing_numbers_keep_their_text() {
        let huge = format!("1{}", "0".repeat(400));
        let locale = NumberLocale::default();
        let cell = CellValue::from_raw(&huge, ValueKind::Number, "Members", &locale);
        assert_eq!(cell, CellValue::Text(huge.clone()));

        let row = vec![CellValue::Text("Kemps".into()), cell];
        let json = serde_json::to_string(&row).expect("row should encode");
        let parsed: Vec<CellValue> = serde_json::from_str(&json).expect("row should decode");
        assert_eq!(parsed, row);
    }

    #[test]
    fn empty_selection_is_rejected() {
        let config = ExportConfiguration::default();
        assert!(matches!(
            DocumentBuilder::new(&config, at_noon()).build(&[]),
            Err(ExportError::EmptySelection)
        ));
    }

    #[test]
    fn sheet_names_are_truncated_and_unique() {
        let long = "Quarterly revenue by studio and trainer";
        let first = block("t1", long, &["Studio"], &[&["Kemps"]]);
        let second = block("t2", long, &["Studio"], &[&["Bandra"]]);
        let config = ExportConfiguration {
            include_metadata: true,
            ..ExportConfiguration::with_format(ExportFormat::Workbook)
        };
        let set = DocumentBuilder::new(&config, at_noon()).build(&[&first, &second]).unwrap();
        let names = set.documents.iter().map(|doc| doc.sheet_name.as_str()).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["Quarterly revenue by studio and", "Quarterly revenue by studio (2)"]
        );
        assert!(names.iter().all(|name| name.chars().count() <= 31));
        assert_eq!(sanitize_sheet_name("P/L [2024]"), "P-L -2024-");
    }

    #[test]
    fn bundle_unions_headers_behind_source_column() {
        let sales = block("t1", "Sales", &["Studio", "Revenue"], &[&["Kemps", "$10"]]);
        let staff = block("t2", "Staff", &["Studio", "Trainer"], &[&["Bandra", "Asha"]]);
        let config = ExportConfiguration {
            bundle: true,
            include_metadata: true,
            ..ExportConfiguration::default()
        };
        let set = DocumentBuilder::new(&config, at_noon()).build(&[&sales, &staff]).unwrap();
        assert_eq!(set.documents.len(), 1);
        let document = &set.documents[0];
        assert_eq!(document.sheet_name, "Combined Export");
        assert_eq!(
            document.header_row.clone().unwrap(),
            vec!["Source Table", "Studio", "Revenue", "Trainer"]
        );
        assert_eq!(
            document.rows[1],
            vec![
                CellValue::Text("Staff".into()),
                CellValue::Text("Bandra".into()),
                CellValue::Empty,
                CellValue::Text("Asha".into()),
            ]
        );
        let preamble = document.metadata_preamble.as_ref().unwrap();
        assert_eq!(preamble[0].value, "2024-05-01T12:00:00Z");
        assert!(preamble.iter().any(|entry| entry.key == "Table" && entry.value == "Staff"));
        assert_eq!(set.manifest.blocks.len(), 2);
    }

    #[test]
    fn split_parts_are_numbered() {
        let rows = (0..5).map(|index| vec![index.to_string()]).collect::<Vec<_>>();
        let rows = rows.iter().map(|row| [row[0].as_str()]).collect::<Vec<_>>();
        let rows = rows.iter().map(|row| &row[..]).collect::<Vec<_>>();
        let members = block("t1", "Members", &["Id"], &rows);
        let config = ExportConfiguration {
            split_large_files: true,
            max_rows_per_sheet: 2,
            ..ExportConfiguration::with_format(ExportFormat::Csv)
        };
        let set = DocumentBuilder::new(&config, at_noon()).build(&[&members]).unwrap();
        let shape = set
            .documents
            .iter()
            .map(|doc| (doc.sheet_name.as_str(), doc.row_count()))
            .collect::<Vec<_>>();
        assert_eq!(shape, vec![("Members (1)", 2), ("Members (2)", 2), ("Members (3)", 1)]);
        assert_eq!(set.total_rows(), 5);
    }

    #[test]
    fn preview_counts_omitted_rows() {
        let members = block("t1", "Members", &["Id"], &[&["1"], &["2"], &["3"]]);
        let config = ExportConfiguration::default();
        let set = DocumentBuilder::new(&config, at_noon()).build(&[&members]).unwrap();
        let previews = preview(&set.documents, 2);
        assert_eq!(previews[0].rows.len(), 2);
        assert_eq!(previews[0].omitted, 1);
    }

    #[test]
    fn date_cells_normalize_to_iso() {
        let locale = NumberLocale::default();
        assert_eq!(
            CellValue::from_raw("May 3, 2024", ValueKind::Date, "Date", &locale),
            CellValue::Text("2024-05-03".into())
        );
        assert_eq!(CellValue::Number(1200.0).to_string(), "1200");
    }
}
