use csv::{Writer, WriterBuilder};

use crate::config::{ExportConfiguration, ExportFormat};
use crate::document::{CanonicalDocument, DocumentSet};
use crate::error::ExportError;
use crate::serialize::archive::csv_archive;
use crate::serialize::{Encoded, Serializer};

fn into_bytes(writer: Writer<Vec<u8>>) -> Result<Vec<u8>, ExportError> {
    writer
        .into_inner()
        .map_err(|error| ExportError::Csv(error.into_error().into()))
}

/// One document as CSV: `# key,value` preamble lines and a blank line when
/// metadata is present, then the header row and data rows.
pub(crate) fn document_csv(document: &CanonicalDocument) -> Result<Vec<u8>, ExportError> {
    let mut bytes = Vec::new();
    if let Some(preamble) = &document.metadata_preamble {
        let mut writer = WriterBuilder::new().flexible(true).from_writer(bytes);
        for entry in preamble {
            writer.write_record([format!("# {}", entry.key).as_str(), entry.value.as_str()])?;
        }
        writer.flush()?;
        bytes = into_bytes(writer)?;
        bytes.push(b'\n');
    }

    let mut writer = WriterBuilder::new().flexible(true).from_writer(bytes);
    if let Some(header) = &document.header_row {
        writer.write_record(header)?;
    }
    for row in &document.rows {
        writer.write_record(row.iter().map(ToString::to_string))?;
    }
    writer.flush()?;
    into_bytes(writer)
}

pub struct CsvSerializer;

impl Serializer for CsvSerializer {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn encode(
        &self,
        set: &DocumentSet,
        config: &ExportConfiguration,
        _stem: &str,
    ) -> Result<Encoded, ExportError> {
        match set.documents.as_slice() {
            [document] if !config.compression => Ok(Encoded::new(
                ExportFormat::Csv,
                document_csv(document)?,
                document.row_count(),
            )),
            _ => csv_archive(set, config),
        }
    }
}
