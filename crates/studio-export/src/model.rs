use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::snapshot::BoundingBox;
use crate::value::{NormalizedValue, ValueKind};
use crate::warning::ScanWarning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Financial,
    Performance,
    Behavior,
    Analysis,
    Operational,
}

impl Category {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Financial => "Financial",
            Self::Performance => "Performance",
            Self::Behavior => "Behavior",
            Self::Analysis => "Analysis",
            Self::Operational => "Operational",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TableKind {
    MonthOnMonth,
    YearOnYear,
    Performance,
    Analytics,
    Summary,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabularBlock {
    pub id: String,
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub category: Category,
    pub kind: TableKind,
    pub confidence: f32,
    pub complexity: Complexity,
    pub row_count: usize,
    pub column_count: usize,
    pub data_types: BTreeMap<String, ValueKind>,
    /// Per-column unit tag (`$`, `%`, ...) for numeric columns.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub units: BTreeMap<String, String>,
    pub source_location: String,
    pub matched_by: String,
}

impl TabularBlock {
    #[must_use]
    pub fn column_kind(&self, column: usize) -> ValueKind {
        self.headers
            .get(column)
            .and_then(|header| self.data_types.get(header))
            .copied()
            .unwrap_or(ValueKind::Text)
    }

    /// Identity used to collapse duplicate detections of one region.
    #[must_use]
    pub fn signature(&self) -> String {
        crate::dedup::signature(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    pub id: String,
    pub label: String,
    pub raw_text: String,
    pub normalized_value: NormalizedValue,
    pub format: ValueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<Trend>,
    pub confidence: f32,
    pub source_location: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Canvas,
    Vector,
    Container,
}

/// Where a chart sits on the page. Pixels are captured by the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRecord {
    pub id: String,
    pub name: String,
    pub kind: ChartKind,
    pub bounding_box: BoundingBox,
    pub confidence: f32,
    pub source_location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingItem {
    pub rank: u32,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingRecord {
    pub id: String,
    pub name: String,
    pub items: Vec<RankingItem>,
    pub confidence: f32,
    pub source_location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub scanned_at: DateTime<Utc>,
    pub tables: Vec<TabularBlock>,
    pub metrics: Vec<MetricRecord>,
    pub charts: Vec<ChartRecord>,
    pub rankings: Vec<RankingRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ScanWarning>,
}

impl DetectionResult {
    #[must_use]
    pub fn empty(scanned_at: DateTime<Utc>) -> Self {
        Self {
            scanned_at,
            tables: Vec::new(),
            metrics: Vec::new(),
            charts: Vec::new(),
            rankings: Vec::new(),
            warnings: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
            && self.metrics.is_empty()
            && self.charts.is_empty()
            && self.rankings.is_empty()
    }

    #[must_use]
    pub fn table(&self, id: &str) -> Option<&TabularBlock> {
        self.tables.iter().find(|table| table.id == id)
    }

    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "found {} tables, {} metrics, {} charts, {} rankings",
            self.tables.len(),
            self.metrics.len(),
            self.charts.len(),
            self.rankings.len()
        )
    }
}
