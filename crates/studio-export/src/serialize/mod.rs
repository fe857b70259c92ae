//! Format serializers. Each one turns a [`DocumentSet`] into the bytes of
//! exactly one file; naming the file is left to [`FileNamer`].

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::config::{ExportConfiguration, ExportFormat, sanitize_file_stem};
use crate::document::DocumentSet;
use crate::error::ExportError;

pub mod archive;
pub mod delimited;
pub mod json;
pub mod markdown;
pub mod pdf;
pub mod workbook;

pub const DEFAULT_FILE_BASE: &str = "studio-export";

/// Output of one serializer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
    pub mime_type: &'static str,
    /// Data rows actually present in `bytes`.
    pub rows: usize,
}

impl Encoded {
    #[must_use]
    pub fn new(format: ExportFormat, bytes: Vec<u8>, rows: usize) -> Self {
        Self {
            bytes,
            extension: format.extension(),
            mime_type: format.mime_type(),
            rows,
        }
    }
}

/// A finished, named file ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub mime_type: &'static str,
    pub format: ExportFormat,
    pub bytes: Vec<u8>,
    pub row_count: usize,
}

pub trait Serializer {
    fn name(&self) -> &'static str;

    /// `stem` names inner entries when the output is a container.
    fn encode(
        &self,
        set: &DocumentSet,
        config: &ExportConfiguration,
        stem: &str,
    ) -> Result<Encoded, ExportError>;
}

#[must_use]
pub fn serializer_for(format: ExportFormat) -> &'static dyn Serializer {
    match format {
        ExportFormat::Workbook => &workbook::WorkbookSerializer,
        ExportFormat::Csv => &delimited::CsvSerializer,
        ExportFormat::Json => &json::JsonSerializer,
        ExportFormat::Pdf => &pdf::PdfSerializer,
        ExportFormat::Archive => &archive::ArchiveSerializer,
        ExportFormat::Clipboard => &markdown::MarkdownSerializer,
    }
}

/// Runs the configured serializer. Any lower-level failure comes back as
/// [`ExportError::Serialization`].
pub fn serialize(
    set: &DocumentSet,
    config: &ExportConfiguration,
    namer: &mut FileNamer,
) -> Result<ExportArtifact, ExportError> {
    let serializer = serializer_for(config.format);
    let encoded = serializer
        .encode(set, config, &namer.stem())
        .map_err(|error| match error {
            ExportError::Serialization { .. } => error,
            other => ExportError::serialization(serializer.name(), other),
        })?;
    Ok(ExportArtifact {
        file_name: namer.claim(encoded.extension),
        mime_type: encoded.mime_type,
        format: config.format,
        bytes: encoded.bytes,
        row_count: encoded.rows,
    })
}

/// Produces `<base>-<YYYY-MM-DD>.<ext>` names, breaking collisions with the
/// time of day and then a counter.
#[derive(Debug, Clone)]
pub struct FileNamer {
    base: String,
    at: DateTime<Utc>,
    taken: HashSet<String>,
}

impl FileNamer {
    #[must_use]
    pub fn new(config: &ExportConfiguration, at: DateTime<Utc>) -> Self {
        let base = config
            .custom_file_name
            .as_deref()
            .map(sanitize_file_stem)
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| DEFAULT_FILE_BASE.to_string());
        Self {
            base,
            at,
            taken: HashSet::new(),
        }
    }

    /// Marks names that already exist at the destination.
    #[must_use]
    pub fn with_taken(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.taken.extend(names);
        self
    }

    #[must_use]
    pub fn stem(&self) -> String {
        format!("{}-{}", self.base, self.at.format("%Y-%m-%d"))
    }

    pub fn claim(&mut self, extension: &str) -> String {
        let stem = self.stem();
        let mut name = format!("{stem}.{extension}");
        if self.taken.contains(&name) {
            let stamped = format!("{stem}-{}", self.at.format("%H%M%S"));
            name = format!("{stamped}.{extension}");
            let mut counter = 2;
            while self.taken.contains(&name) {
                name = format!("{stamped}-{counter}.{extension}");
                counter += 1;
            }
        }
        self.taken.insert(name.clone());
        name
    }
}
