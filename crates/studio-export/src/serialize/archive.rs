use std::collections::HashSet;
use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::{ExportConfiguration, ExportFormat, sanitize_file_stem};
use crate::document::DocumentSet;
use crate::error::ExportError;
use crate::serialize::delimited::document_csv;
use crate::serialize::{Encoded, Serializer};

pub const MANIFEST_ENTRY: &str = "manifest.json";

/// In-memory zip container with unique entry names.
pub(crate) struct ZipBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    names: HashSet<String>,
}

impl ZipBuilder {
    pub(crate) fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
            names: HashSet::new(),
        }
    }

    /// Adds one entry and returns the name it was stored under.
    pub(crate) fn add(&mut self, name: &str, bytes: &[u8]) -> Result<String, ExportError> {
        let name = self.unique(name);
        self.writer.start_file(name.as_str(), self.options)?;
        self.writer.write_all(bytes)?;
        Ok(name)
    }

    fn unique(&mut self, name: &str) -> String {
        let (stem, extension) = name
            .rsplit_once('.')
            .map_or((name, None), |(stem, extension)| (stem, Some(extension)));
        let mut candidate = name.to_string();
        let mut counter = 2;
        while self.names.contains(&candidate.to_lowercase()) {
            candidate = match extension {
                Some(extension) => format!("{stem}-{counter}.{extension}"),
                None => format!("{stem}-{counter}"),
            };
            counter += 1;
        }
        self.names.insert(candidate.to_lowercase());
        candidate
    }

    pub(crate) fn finish(self) -> Result<Vec<u8>, ExportError> {
        Ok(self.writer.finish()?.into_inner())
    }
}

fn entry_stem(sheet_name: &str) -> String {
    let stem = sanitize_file_stem(sheet_name);
    if stem.is_empty() {
        "sheet".to_string()
    } else {
        stem
    }
}

/// One CSV entry per document, plus the manifest when metadata is on.
pub(crate) fn csv_archive(
    set: &DocumentSet,
    config: &ExportConfiguration,
) -> Result<Encoded, ExportError> {
    let mut zip = ZipBuilder::new();
    for document in &set.documents {
        let bytes = document_csv(document)?;
        zip.add(&format!("{}.csv", entry_stem(&document.sheet_name)), &bytes)?;
    }
    if config.include_metadata {
        zip.add(MANIFEST_ENTRY, &serde_json::to_vec_pretty(&set.manifest)?)?;
    }
    Ok(Encoded::new(
        ExportFormat::Archive,
        zip.finish()?,
        set.total_rows(),
    ))
}

/// Wraps a single already-encoded file.
pub(crate) fn wrap_single(entry: &str, encoded: Encoded) -> Result<Encoded, ExportError> {
    let mut zip = ZipBuilder::new();
    zip.add(entry, &encoded.bytes)?;
    Ok(Encoded::new(ExportFormat::Archive, zip.finish()?, encoded.rows))
}

pub struct ArchiveSerializer;

impl Serializer for ArchiveSerializer {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn encode(
        &self,
        set: &DocumentSet,
        config: &ExportConfiguration,
        _stem: &str,
    ) -> Result<Encoded, ExportError> {
        csv_archive(set, config)
    }
}
