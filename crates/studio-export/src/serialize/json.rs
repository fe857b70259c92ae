use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{ExportConfiguration, ExportFormat};
use crate::document::{CanonicalDocument, CellValue, DocumentSet, ExportManifest, MetadataEntry};
use crate::error::ExportError;
use crate::serialize::archive::wrap_single;
use crate::serialize::{Encoded, Serializer};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonExport<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a ExportManifest>,
    tables: Vec<JsonTable<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonTable<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<&'a [String]>,
    rows: &'a [Vec<CellValue>],
    row_count: usize,
    column_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    units: Option<&'a BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preamble: Option<&'a [MetadataEntry]>,
}

impl<'a> From<&'a CanonicalDocument> for JsonTable<'a> {
    fn from(document: &'a CanonicalDocument) -> Self {
        Self {
            name: &document.sheet_name,
            headers: document.header_row.as_deref(),
            rows: &document.rows,
            row_count: document.row_count(),
            column_count: document.column_count(),
            units: (!document.column_units.is_empty()).then_some(&document.column_units),
            preamble: document.metadata_preamble.as_deref(),
        }
    }
}

pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(
        &self,
        set: &DocumentSet,
        config: &ExportConfiguration,
        stem: &str,
    ) -> Result<Encoded, ExportError> {
        let export = JsonExport {
            metadata: config.include_metadata.then_some(&set.manifest),
            tables: set.documents.iter().map(JsonTable::from).collect(),
        };
        let encoded = Encoded::new(
            ExportFormat::Json,
            serde_json::to_vec_pretty(&export)?,
            set.total_rows(),
        );
        if config.compression {
            wrap_single(&format!("{stem}.json"), encoded)
        } else {
            Ok(encoded)
        }
    }
}
