//! Clipboard output: a capped markdown preview, never a full export.

use std::fmt::Write as _;

use crate::config::{ExportConfiguration, ExportFormat};
use crate::document::{CellValue, DocumentSet, Preview, preview};
use crate::error::ExportError;
use crate::header::synthetic_header;
use crate::serialize::{Encoded, Serializer};

fn escape_cell(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('|', "\\|")
        .replace(['\r', '\n'], " ")
}

fn header_labels(preview: &Preview<'_>) -> Vec<String> {
    let document = preview.document;
    match &document.header_row {
        Some(header) => header
            .iter()
            .map(|label| match document.column_units.get(label) {
                Some(unit) => format!("{label} ({unit})"),
                None => label.clone(),
            })
            .collect(),
        None => (0..document.column_count()).map(synthetic_header).collect(),
    }
}

fn write_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    out.push('|');
    for cell in cells {
        out.push(' ');
        out.push_str(&escape_cell(cell));
        out.push_str(" |");
    }
    out.push('\n');
}

/// Renders each document as a GitHub-flavored markdown table, at most
/// `limit` rows apiece.
#[must_use]
pub fn render_markdown(set: &DocumentSet, limit: usize) -> (String, usize) {
    let mut out = String::new();
    let mut shown = 0;
    for (index, preview) in preview(&set.documents, limit).iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "### {}\n", escape_cell(&preview.document.sheet_name));

        let labels = header_labels(preview);
        let width = labels.len().max(1);
        write_row(&mut out, labels.iter().map(String::as_str));
        write_row(&mut out, std::iter::repeat_n("---", width));
        for row in preview.rows {
            let cells = (0..width)
                .map(|column| row.get(column).map(CellValue::to_string).unwrap_or_default())
                .collect::<Vec<_>>();
            write_row(&mut out, cells.iter().map(String::as_str));
        }
        shown += preview.rows.len();

        if preview.omitted > 0 {
            let _ = writeln!(out, "\n_+{} more rows_", preview.omitted);
        }
    }
    (out, shown)
}

pub struct MarkdownSerializer;

impl Serializer for MarkdownSerializer {
    fn name(&self) -> &'static str {
        "clipboard"
    }

    fn encode(
        &self,
        set: &DocumentSet,
        config: &ExportConfiguration,
        _stem: &str,
    ) -> Result<Encoded, ExportError> {
        let (text, shown) = render_markdown(set, config.preview_rows);
        Ok(Encoded::new(ExportFormat::Clipboard, text.into_bytes(), shown))
    }
}
