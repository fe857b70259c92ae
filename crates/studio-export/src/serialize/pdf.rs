//! Paginated PDF tables drawn with the standard Type 1 fonts.

use chrono::SecondsFormat;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

use crate::config::{ExportConfiguration, ExportFormat, ResolvedColors, Rgb};
use crate::document::{CanonicalDocument, DocumentSet};
use crate::error::ExportError;
use crate::serialize::archive::wrap_single;
use crate::serialize::{Encoded, Serializer};

const A4: (f32, f32) = (595.0, 842.0);
const MARGIN: f32 = 40.0;
const FOOTER_BAND: f32 = 24.0;
const CELL_PADDING: f32 = 3.0;
const TITLE_SIZE: f32 = 16.0;
/// Wider tables switch to landscape unless the caller decides.
const LANDSCAPE_COLUMNS: usize = 6;
const DEFAULT_TITLE: &str = "Studio Export";

const REGULAR: &str = "F1";
const BOLD: &str = "F2";

/// Base font names plus the average glyph width as a fraction of the size.
fn base_fonts(family: &str) -> (&'static str, &'static str, f32) {
    let family = family.to_ascii_lowercase();
    if family.contains("courier") || family.contains("mono") {
        ("Courier", "Courier-Bold", 0.6)
    } else if family.contains("times") || (family.contains("serif") && !family.contains("sans")) {
        ("Times-Roman", "Times-Bold", 0.48)
    } else {
        ("Helvetica", "Helvetica-Bold", 0.52)
    }
}

/// Text for the standard fonts under `WinAnsiEncoding`. Characters outside
/// that code page become `?`.
pub(crate) fn win_ansi(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\u{20}'..='\u{7e}' => out.push(u8::try_from(ch).unwrap_or(b'?')),
            '\u{a0}'..='\u{ff}' => out.push(u8::try_from(u32::from(ch)).unwrap_or(b'?')),
            '€' => out.push(0x80),
            '…' => out.push(0x85),
            '‘' => out.push(0x91),
            '’' => out.push(0x92),
            '“' => out.push(0x93),
            '”' => out.push(0x94),
            '•' => out.push(0x95),
            '–' => out.push(0x96),
            '—' => out.push(0x97),
            '−' => out.push(b'-'),
            '₹' => out.extend_from_slice(b"Rs"),
            '\t' | '\n' | '\r' => out.push(b' '),
            _ => out.push(b'?'),
        }
    }
    out
}

fn color_op(operator: &str, color: Rgb) -> Operation {
    let [r, g, b] = color.unit();
    Operation::new(operator, vec![r.into(), g.into(), b.into()])
}

/// Cuts `text` to `max_chars`, marking the cut with an ellipsis.
fn fit(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut cut = text.chars().take(max_chars - 1).collect::<String>();
    cut.push('…');
    cut
}

struct Canvas {
    width: f32,
    height: f32,
    font_size: f32,
    glyph_width: f32,
    colors: ResolvedColors,
    rows_per_page: usize,
    pages: Vec<Vec<Operation>>,
    ops: Vec<Operation>,
    y: f32,
    rows_on_page: usize,
}

impl Canvas {
    fn row_height(&self) -> f32 {
        self.font_size * 1.8
    }

    fn bottom(&self) -> f32 {
        MARGIN + FOOTER_BAND
    }

    fn text(&mut self, font: &str, size: f32, x: f32, y: f32, color: Rgb, text: &str) {
        self.ops.extend([
            color_op("rg", color),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.into(), size.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![Object::string_literal(win_ansi(text))]),
            Operation::new("ET", vec![]),
        ]);
    }

    fn fill(&mut self, color: Rgb, x: f32, y: f32, width: f32, height: f32) {
        self.ops.extend([
            color_op("rg", color),
            Operation::new("re", vec![x.into(), y.into(), width.into(), height.into()]),
            Operation::new("f", vec![]),
        ]);
    }

    fn new_page(&mut self) {
        let finished = std::mem::take(&mut self.ops);
        self.pages.push(finished);
        self.y = self.height - MARGIN;
        self.rows_on_page = 0;
    }

    /// Starts a new page unless `needed` points still fit.
    fn ensure(&mut self, needed: f32) -> bool {
        if self.y - needed < self.bottom() && !self.ops.is_empty() {
            self.new_page();
            return true;
        }
        false
    }

    fn line(&mut self, font: &str, size: f32, text: &str) {
        self.ensure(size * 1.5);
        self.y -= size * 1.5;
        let color = self.colors.text;
        self.text(font, size, MARGIN, self.y + size * 0.3, color, text);
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn max_chars(&self, column_width: f32) -> usize {
        let room = (column_width - 2.0 * CELL_PADDING).max(0.0);
        (room / (self.font_size * self.glyph_width)).floor() as usize
    }

    fn table_row(&mut self, cells: &[String], column_width: f32, header: bool, shade: bool) {
        let height = self.row_height();
        self.y -= height;
        let usable = self.width - 2.0 * MARGIN;
        if header {
            self.fill(self.colors.header, MARGIN, self.y, usable, height);
        } else if shade {
            self.fill(self.colors.accent, MARGIN, self.y, usable, height);
        }
        let (font, color) = if header {
            (BOLD, Rgb(0xFF, 0xFF, 0xFF))
        } else {
            (REGULAR, self.colors.text)
        };
        let max_chars = self.max_chars(column_width);
        let baseline = self.y + (height - self.font_size) / 2.0 + self.font_size * 0.2;
        for (index, cell) in cells.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let x = MARGIN + column_width * index as f32 + CELL_PADDING;
            self.text(font, self.font_size, x, baseline, color, &fit(cell, max_chars));
        }
    }

    fn table(&mut self, document: &CanonicalDocument) {
        let columns = document.column_count().max(1);
        #[allow(clippy::cast_precision_loss)]
        let column_width = (self.width - 2.0 * MARGIN) / columns as f32;
        let header = document.header_row.clone();
        let height = self.row_height();

        if self.ensure(height * 2.0) {
            self.line(BOLD, self.font_size + 3.0, &format!("{} (continued)", document.sheet_name));
        }
        if let Some(labels) = &header {
            self.table_row(labels, column_width, true, false);
        }
        for (index, row) in document.rows.iter().enumerate() {
            let page_full = self.rows_on_page >= self.rows_per_page;
            if page_full || self.y - height < self.bottom() {
                self.new_page();
                if let Some(labels) = &header {
                    self.table_row(labels, column_width, true, false);
                }
            }
            let cells = (0..columns)
                .map(|column| row.get(column).map(ToString::to_string).unwrap_or_default())
                .collect::<Vec<_>>();
            self.table_row(&cells, column_width, false, index % 2 == 1);
            self.rows_on_page += 1;
        }
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.ops.is_empty() || self.pages.is_empty() {
            self.new_page();
        }
        self.pages
    }
}

fn watermark_ops(text: &str, width: f32, height: f32) -> Vec<Operation> {
    let size = 54.0_f32;
    let (sin, cos) = std::f32::consts::FRAC_PI_4.sin_cos();
    #[allow(clippy::cast_precision_loss)]
    let half_run = text.chars().count() as f32 * size * 0.26;
    let x = width / 2.0 - half_run * cos;
    let y = height / 2.0 - half_run * sin;
    vec![
        Operation::new("q", vec![]),
        Operation::new("rg", vec![0.88_f32.into(), 0.88_f32.into(), 0.88_f32.into()]),
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![BOLD.into(), size.into()]),
        Operation::new(
            "Tm",
            vec![cos.into(), sin.into(), (-sin).into(), cos.into(), x.into(), y.into()],
        ),
        Operation::new("Tj", vec![Object::string_literal(win_ansi(text))]),
        Operation::new("ET", vec![]),
        Operation::new("Q", vec![]),
    ]
}

fn footer_ops(page: usize, total: usize, width: f32, font_size: f32, color: Rgb) -> Vec<Operation> {
    let label = format!("Page {page} of {total}");
    let size = (font_size - 1.0).max(6.0);
    vec![
        color_op("rg", color),
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![REGULAR.into(), size.into()]),
        Operation::new("Td", vec![(width - MARGIN - 60.0).into(), (MARGIN / 2.0 + 4.0).into()]),
        Operation::new("Tj", vec![Object::string_literal(win_ansi(&label))]),
        Operation::new("ET", vec![]),
    ]
}

fn landscape(set: &DocumentSet, config: &ExportConfiguration) -> bool {
    config.pdf.landscape.unwrap_or_else(|| {
        set.documents
            .iter()
            .any(|document| document.column_count() > LANDSCAPE_COLUMNS)
    })
}

fn layout(
    set: &DocumentSet,
    config: &ExportConfiguration,
) -> Result<(Vec<Vec<Operation>>, (f32, f32)), ExportError> {
    let (width, height) = if landscape(set, config) { (A4.1, A4.0) } else { A4 };
    let (_, _, glyph_width) = base_fonts(&config.styling.fonts.family);
    let mut canvas = Canvas {
        width,
        height,
        font_size: config.styling.fonts.size,
        glyph_width,
        colors: config.styling.resolved_colors()?,
        rows_per_page: config.pdf.rows_per_page.max(1),
        pages: Vec::new(),
        ops: Vec::new(),
        y: height - MARGIN,
        rows_on_page: 0,
    };

    let title = config.custom_file_name.as_deref().unwrap_or(DEFAULT_TITLE);
    canvas.line(BOLD, TITLE_SIZE, title);
    let generated = set
        .manifest
        .generated_at
        .to_rfc3339_opts(SecondsFormat::Secs, true);
    canvas.line(REGULAR, canvas.font_size, &format!("Generated {generated}"));
    if let Some(source) = &set.manifest.source {
        canvas.line(REGULAR, canvas.font_size, &format!("Source: {source}"));
    }
    canvas.line(
        REGULAR,
        canvas.font_size,
        &format!("{} tables, {} rows", set.documents.len(), set.total_rows()),
    );

    for document in &set.documents {
        canvas.y -= canvas.font_size;
        let heading = canvas.font_size + 3.0;
        canvas.ensure(heading * 1.5 + canvas.row_height() * 2.0);
        canvas.line(BOLD, heading, &document.sheet_name);
        for entry in document.metadata_preamble.iter().flatten() {
            canvas.line(REGULAR, canvas.font_size, &format!("{}: {}", entry.key, entry.value));
        }
        canvas.table(document);
    }

    Ok((canvas.finish(), (width, height)))
}

/// Renders every document into one PDF, returning the page count alongside
/// the bytes.
pub(crate) fn render_pdf(
    set: &DocumentSet,
    config: &ExportConfiguration,
) -> Result<(Vec<u8>, usize), ExportError> {
    let (pages, (width, height)) = layout(set, config)?;
    let colors = config.styling.resolved_colors()?;
    let (regular, bold, _) = base_fonts(&config.styling.fonts.family);
    let watermark = config.watermark_text();

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => regular,
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => bold,
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            REGULAR => regular_id,
            BOLD => bold_id,
        },
    });

    let total = pages.len();
    let mut page_ids = Vec::with_capacity(total);
    for (index, body) in pages.into_iter().enumerate() {
        let mut operations =
            watermark.map_or_else(Vec::new, |text| watermark_ops(text, width, height));
        operations.extend(body);
        operations.extend(footer_ops(
            index + 1,
            total,
            width,
            config.styling.fonts.size,
            colors.text,
        ));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        page_ids.push(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        }));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| (*id).into()).collect::<Vec<Object>>(),
            "Count" => i64::try_from(total).unwrap_or(i64::MAX),
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let title = config.custom_file_name.as_deref().unwrap_or(DEFAULT_TITLE);
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(win_ansi(title)),
        "Producer" => Object::string_literal("studio-export"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok((bytes, total))
}

pub struct PdfSerializer;

impl Serializer for PdfSerializer {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn encode(
        &self,
        set: &DocumentSet,
        config: &ExportConfiguration,
        stem: &str,
    ) -> Result<Encoded, ExportError> {
        let (bytes, _) = render_pdf(set, config)?;
        let encoded = Encoded::new(ExportFormat::Pdf, bytes, set.total_rows());
        if config.compression {
            wrap_single(&format!("{stem}.pdf"), encoded)
        } else {
            Ok(encoded)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use std::io::{Cursor, Read};

    use chrono::{TimeZone, Utc};

    use super::{PdfSerializer, fit, render_pdf, win_ansi};
    use crate::config::{ExportConfiguration, ExportFormat, PdfOptions, Watermark};
    use crate::document::{CanonicalDocument, CellValue, DocumentSet, ExportManifest};
    use crate::serialize::Serializer;

    fn set(rows: usize, columns: usize) -> DocumentSet {
        DocumentSet {
            documents: vec![CanonicalDocument {
                sheet_name: "Attendance".to_string(),
                header_row: Some((1..=columns).map(|index| format!("Col {index}")).collect()),
                rows: (0..rows)
                    .map(|row| (0..columns).map(|_| CellValue::Text(format!("r{row}"))).collect())
                    .collect(),
                metadata_preamble: None,
                column_units: BTreeMap::new(),
            }],
            manifest: ExportManifest {
                generated_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
                source: Some("dashboard".to_string()),
                blocks: Vec::new(),
            },
        }
    }

    #[test]
    fn encodes_latin_text() {
        assert_eq!(
            win_ansi("€5 – café"),
            vec![0x80, b'5', b' ', 0x96, b' ', b'c', b'a', b'f', 0xE9]
        );
        assert_eq!(win_ansi("₹9"), b"Rs9".to_vec());
        assert_eq!(win_ansi("日"), b"?".to_vec());
    }

    #[test]
    fn long_cells_are_cut_with_an_ellipsis() {
        assert_eq!(fit("Kemps Corner", 20), "Kemps Corner");
        assert_eq!(fit("Kemps Corner", 6), "Kemps…");
        assert_eq!(fit("Kemps", 0), "");
    }

    #[test]
    fn rows_per_page_forces_page_breaks() {
        let config = ExportConfiguration {
            pdf: PdfOptions {
                rows_per_page: 10,
                landscape: None,
            },
            watermark: Some(Watermark {
                enabled: true,
                text: "DRAFT".to_string(),
            }),
            ..ExportConfiguration::with_format(ExportFormat::Pdf)
        };
        let (bytes, pages) = render_pdf(&set(25, 3), &config).unwrap();
        assert_eq!(pages, 3);
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let parsed = lopdf::Document::load_mem(&bytes).unwrap();
        assert_eq!(parsed.get_pages().len(), 3);
    }

    #[test]
    fn compression_wraps_the_pdf_in_a_zip() {
        let config = ExportConfiguration {
            compression: true,
            ..ExportConfiguration::with_format(ExportFormat::Pdf)
        };
        let encoded = PdfSerializer.encode(&set(3, 2), &config, "attendance").unwrap();
        assert_eq!(encoded.extension, "zip");
        assert_eq!(encoded.rows, 3);

        let mut archive = zip::ZipArchive::new(Cursor::new(encoded.bytes)).unwrap();
        let mut entry = archive.by_name("attendance.pdf").unwrap();
        let mut pdf = Vec::new();
        entry.read_to_end(&mut pdf).unwrap();
        assert!(pdf.starts_with(b"%PDF-1.5"));
    }

    #[test]
    fn empty_documents_still_render_one_page() {
        let (_, pages) = render_pdf(&set(0, 2), &ExportConfiguration::default()).unwrap();
        assert_eq!(pages, 1);
    }
}
