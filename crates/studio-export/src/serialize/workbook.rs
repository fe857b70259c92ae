//! XLSX output assembled from SpreadsheetML parts.

use std::fmt::Write as _;

use chrono::SecondsFormat;
use quick_xml::escape::escape;

use crate::config::{ExportConfiguration, ExportFormat, ResolvedColors};
use crate::document::{CanonicalDocument, CellValue, DocumentSet, SUMMARY_SHEET_NAME};
use crate::error::ExportError;
use crate::serialize::archive::{ZipBuilder, wrap_single};
use crate::serialize::{Encoded, Serializer};

/// Rows per worksheet, header included.
pub const MAX_SHEET_ROWS: usize = 1_048_576;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

const STYLE_HEADER: u8 = 1;
const STYLE_LABEL: u8 = 2;

/// `0` -> `A`, `26` -> `AA`.
pub(crate) fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        let remainder = u8::try_from(index % 26).unwrap_or(0);
        name.push(char::from(b'A' + remainder));
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.iter().rev().collect()
}

#[derive(Debug, Clone, Copy)]
enum Cell<'a> {
    Text(&'a str),
    Number(f64),
}

struct SheetWriter {
    xml: String,
    row: usize,
}

impl SheetWriter {
    fn new(frozen_header: bool) -> Self {
        let mut xml = format!(r#"{XML_HEADER}<worksheet xmlns="{MAIN_NS}" xmlns:r="{REL_NS}">"#);
        if frozen_header {
            xml.push_str(
                r#"<sheetViews><sheetView workbookViewId="0"><pane ySplit="1" topLeftCell="A2" activePane="bottomLeft" state="frozen"/></sheetView></sheetViews>"#,
            );
        }
        xml.push_str("<sheetData>");
        Self { xml, row: 0 }
    }

    fn push_row<'a>(&mut self, cells: impl IntoIterator<Item = Option<Cell<'a>>>, style: u8) {
        self.row += 1;
        let row = self.row;
        let _ = write!(self.xml, r#"<row r="{row}">"#);
        for (column, cell) in cells.into_iter().enumerate() {
            let Some(cell) = cell else { continue };
            let reference = format!("{}{row}", column_name(column));
            let style = if style == 0 {
                String::new()
            } else {
                format!(r#" s="{style}""#)
            };
            match cell {
                Cell::Number(number) if number.is_finite() => {
                    let _ = write!(self.xml, r#"<c r="{reference}"{style}><v>{number}</v></c>"#);
                }
                Cell::Number(number) => self.inline(&reference, &style, &number.to_string()),
                Cell::Text(text) => self.inline(&reference, &style, text),
            }
        }
        self.xml.push_str("</row>");
    }

    fn inline(&mut self, reference: &str, style: &str, text: &str) {
        let _ = write!(
            self.xml,
            r#"<c r="{reference}" t="inlineStr"{style}><is><t xml:space="preserve">{}</t></is></c>"#,
            escape(text)
        );
    }

    fn finish(mut self, watermark: Option<&str>) -> String {
        self.xml.push_str("</sheetData>");
        if let Some(text) = watermark {
            let _ = write!(
                self.xml,
                "<headerFooter><oddHeader>&amp;C{}</oddHeader></headerFooter>",
                escape(text)
            );
        }
        self.xml.push_str("</worksheet>");
        self.xml
    }
}

fn cell(value: &CellValue) -> Option<Cell<'_>> {
    match value {
        CellValue::Empty => None,
        CellValue::Number(number) => Some(Cell::Number(*number)),
        CellValue::Text(text) => Some(Cell::Text(text)),
    }
}

fn document_sheet(
    document: &CanonicalDocument,
    watermark: Option<&str>,
) -> Result<String, ExportError> {
    let header_rows = usize::from(document.header_row.is_some());
    if document.row_count() + header_rows > MAX_SHEET_ROWS {
        return Err(ExportError::serialization(
            "workbook",
            format!(
                "sheet '{}' holds {} rows; a worksheet fits {MAX_SHEET_ROWS}. Enable splitLargeFiles",
                document.sheet_name,
                document.row_count()
            ),
        ));
    }

    let mut sheet = SheetWriter::new(document.header_row.is_some());
    if let Some(header) = &document.header_row {
        sheet.push_row(header.iter().map(|label| Some(Cell::Text(label))), STYLE_HEADER);
    }
    for row in &document.rows {
        sheet.push_row(row.iter().map(cell), 0);
    }
    Ok(sheet.finish(watermark))
}

/// Generation details, the manifest and every unit tag.
fn summary_sheet(set: &DocumentSet, watermark: Option<&str>) -> String {
    let manifest = &set.manifest;
    let generated = manifest
        .generated_at
        .to_rfc3339_opts(SecondsFormat::Secs, true);
    let source = manifest.source.clone().unwrap_or_else(|| {
        manifest
            .blocks
            .iter()
            .map(|block| block.source_location.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    });

    let mut sheet = SheetWriter::new(false);
    for (key, value) in [("Generated At", generated.as_str()), ("Source", source.as_str())] {
        sheet.push_row([Some(Cell::Text(key)), Some(Cell::Text(value))], STYLE_LABEL);
    }
    sheet.push_row([], 0);

    sheet.push_row(
        ["Sheet", "Rows", "Columns"].map(|label| Some(Cell::Text(label))),
        STYLE_HEADER,
    );
    for document in &set.documents {
        #[allow(clippy::cast_precision_loss)]
        sheet.push_row(
            [
                Some(Cell::Text(&document.sheet_name)),
                Some(Cell::Number(document.row_count() as f64)),
                Some(Cell::Number(document.column_count() as f64)),
            ],
            0,
        );
    }

    let units = set
        .documents
        .iter()
        .flat_map(|document| {
            document
                .column_units
                .iter()
                .map(move |(header, unit)| (document.sheet_name.as_str(), header, unit))
        })
        .collect::<Vec<_>>();
    if !units.is_empty() {
        sheet.push_row([], 0);
        sheet.push_row(
            ["Sheet", "Column", "Unit"].map(|label| Some(Cell::Text(label))),
            STYLE_HEADER,
        );
        for (sheet_name, header, unit) in units {
            sheet.push_row(
                [
                    Some(Cell::Text(sheet_name)),
                    Some(Cell::Text(header)),
                    Some(Cell::Text(unit)),
                ],
                0,
            );
        }
    }
    sheet.finish(watermark)
}

fn styles(config: &ExportConfiguration, colors: ResolvedColors) -> String {
    let fonts = &config.styling.fonts;
    let family = escape(&fonts.family);
    let size = fonts.size;
    let text = colors.text.to_hex();
    let header = colors.header.to_hex();
    format!(
        r#"{XML_HEADER}<styleSheet xmlns="{MAIN_NS}"><fonts count="3"><font><sz val="{size}"/><color rgb="FF{text}"/><name val="{family}"/></font><font><b/><sz val="{size}"/><color rgb="FFFFFFFF"/><name val="{family}"/></font><font><b/><sz val="{size}"/><color rgb="FF{text}"/><name val="{family}"/></font></fonts><fills count="3"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill><fill><patternFill patternType="solid"><fgColor rgb="FF{header}"/><bgColor indexed="64"/></patternFill></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="3"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="2" borderId="0" xfId="0" applyFont="1" applyFill="1"/><xf numFmtId="0" fontId="2" fillId="0" borderId="0" xfId="0" applyFont="1"/></cellXfs></styleSheet>"#
    )
}

fn content_types(sheets: usize) -> String {
    let mut xml = format!(
        r#"{XML_HEADER}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#
    );
    for index in 1..=sheets {
        let _ = write!(
            xml,
            r#"<Override PartName="/xl/worksheets/sheet{index}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        );
    }
    xml.push_str("</Types>");
    xml
}

fn workbook_xml(names: &[&str]) -> String {
    let mut xml = format!(r#"{XML_HEADER}<workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheets>"#);
    for (index, name) in names.iter().enumerate() {
        let id = index + 1;
        let _ = write!(
            xml,
            r#"<sheet name="{}" sheetId="{id}" r:id="rId{id}"/>"#,
            escape(*name)
        );
    }
    xml.push_str("</sheets></workbook>");
    xml
}

fn workbook_rels(sheets: usize) -> String {
    let mut xml = format!(r#"{XML_HEADER}<Relationships xmlns="{PKG_REL_NS}">"#);
    for id in 1..=sheets {
        let _ = write!(
            xml,
            r#"<Relationship Id="rId{id}" Type="{REL_NS}/worksheet" Target="worksheets/sheet{id}.xml"/>"#
        );
    }
    let _ = write!(
        xml,
        r#"<Relationship Id="rId{}" Type="{REL_NS}/styles" Target="styles.xml"/></Relationships>"#,
        sheets + 1
    );
    xml
}

fn root_rels() -> String {
    format!(
        r#"{XML_HEADER}<Relationships xmlns="{PKG_REL_NS}"><Relationship Id="rId1" Type="{REL_NS}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
    )
}

pub struct WorkbookSerializer;

impl Serializer for WorkbookSerializer {
    fn name(&self) -> &'static str {
        "workbook"
    }

    /// One sheet per document. With metadata on, a leading `Summary` sheet
    /// carries the preamble instead of each data sheet.
    fn encode(
        &self,
        set: &DocumentSet,
        config: &ExportConfiguration,
        stem: &str,
    ) -> Result<Encoded, ExportError> {
        let colors = config.styling.resolved_colors()?;
        let watermark = config.watermark_text();

        let mut names = Vec::new();
        let mut sheets = Vec::new();
        if config.include_metadata {
            names.push(SUMMARY_SHEET_NAME);
            sheets.push(summary_sheet(set, watermark));
        }
        for document in &set.documents {
            names.push(document.sheet_name.as_str());
            sheets.push(document_sheet(document, watermark)?);
        }

        let mut zip = ZipBuilder::new();
        zip.add("[Content_Types].xml", content_types(sheets.len()).as_bytes())?;
        zip.add("_rels/.rels", root_rels().as_bytes())?;
        zip.add("xl/workbook.xml", workbook_xml(&names).as_bytes())?;
        zip.add("xl/_rels/workbook.xml.rels", workbook_rels(sheets.len()).as_bytes())?;
        zip.add("xl/styles.xml", styles(config, colors).as_bytes())?;
        for (index, sheet) in sheets.iter().enumerate() {
            zip.add(&format!("xl/worksheets/sheet{}.xml", index + 1), sheet.as_bytes())?;
        }

        let encoded = Encoded::new(ExportFormat::Workbook, zip.finish()?, set.total_rows());
        if config.compression {
            wrap_single(&format!("{stem}.xlsx"), encoded)
        } else {
            Ok(encoded)
        }
    }
}
