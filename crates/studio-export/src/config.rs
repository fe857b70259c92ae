use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ExportError;

pub const DEFAULT_MAX_ROWS_PER_SHEET: usize = 100_000;
pub const DEFAULT_MAX_ROWS_PER_BLOCK: usize = 10_000;
pub const DEFAULT_MAX_COLUMNS: usize = 256;
pub const DEFAULT_PREVIEW_ROWS: usize = 20;
pub const DEFAULT_PDF_ROWS_PER_PAGE: usize = 40;

/// Decimal and thousands separators used when reading numeric cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberLocale {
    pub decimal_separator: char,
    pub thousands_separator: char,
}

impl Default for NumberLocale {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            thousands_separator: ',',
        }
    }
}

impl FromStr for NumberLocale {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (decimal_separator, thousands_separator) =
            match value.trim().to_ascii_lowercase().as_str() {
                "en" | "us" | "uk" | "in" => ('.', ','),
                "eu" | "de" | "es" | "it" | "nl" => (',', '.'),
                "ch" => ('.', '\''),
                "fr" => (',', ' '),
                other => return Err(format!("unknown number locale: '{other}'")),
            };
        Ok(Self {
            decimal_separator,
            thousands_separator,
        })
    }
}

impl NumberLocale {
    pub fn validate(&self) -> Result<(), ExportError> {
        if self.decimal_separator == self.thousands_separator {
            return Err(ExportError::InvalidOption(
                "decimal and thousands separators must differ".to_string(),
            ));
        }
        if self.decimal_separator.is_ascii_digit() || self.thousands_separator.is_ascii_digit() {
            return Err(ExportError::InvalidOption(
                "separators cannot be digits".to_string(),
            ));
        }
        Ok(())
    }
}

/// Knobs for one detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanOptions {
    pub require_visible: bool,
    pub max_rows_per_block: usize,
    pub max_columns: usize,
    pub type_sample_size: usize,
    pub locale: NumberLocale,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            require_visible: true,
            max_rows_per_block: DEFAULT_MAX_ROWS_PER_BLOCK,
            max_columns: DEFAULT_MAX_COLUMNS,
            type_sample_size: 200,
            locale: NumberLocale::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExportFormat {
    #[default]
    Workbook,
    Csv,
    Json,
    Pdf,
    Archive,
    Clipboard,
}

impl ExportFormat {
    pub const ALL: [Self; 6] = [
        Self::Workbook,
        Self::Csv,
        Self::Json,
        Self::Pdf,
        Self::Archive,
        Self::Clipboard,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Workbook => "workbook",
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Pdf => "pdf",
            Self::Archive => "archive",
            Self::Clipboard => "clipboard",
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Workbook => "xlsx",
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Pdf => "pdf",
            Self::Archive => "zip",
            Self::Clipboard => "md",
        }
    }

    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Workbook => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Csv => "text/csv; charset=utf-8",
            Self::Json => "application/json",
            Self::Pdf => "application/pdf",
            Self::Archive => "application/zip",
            Self::Clipboard => "text/plain; charset=utf-8",
        }
    }

    /// Longest sheet or section name the format accepts.
    #[must_use]
    pub const fn sheet_name_limit(self) -> usize {
        match self {
            Self::Workbook => 31,
            _ => 100,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "xlsx" | "workbook" | "excel" => Ok(Self::Workbook),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "pdf" => Ok(Self::Pdf),
            "zip" | "archive" => Ok(Self::Archive),
            "clipboard" | "markdown" | "md" => Ok(Self::Clipboard),
            other => Err(format!("unknown export format: '{other}'")),
        }
    }
}

impl Serialize for ExportFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ExportFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }

    /// Components scaled to 0..=1 for PDF color operators.
    #[must_use]
    pub fn unit(self) -> [f32; 3] {
        [
            f32::from(self.0) / 255.0,
            f32::from(self.1) / 255.0,
            f32::from(self.2) / 255.0,
        ]
    }
}

impl FromStr for Rgb {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let hex = value.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(format!("invalid color '{value}', expected #rrggbb"));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|error| error.to_string())
        };
        Ok(Self(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    Brand,
}

impl Theme {
    const fn palette(self) -> (Rgb, Rgb, Rgb) {
        match self {
            Self::Light => (Rgb(0x1F, 0x4E, 0x79), Rgb(0xDD, 0xEB, 0xF7), Rgb(0x1A, 0x1A, 0x1A)),
            Self::Dark => (Rgb(0x2D, 0x2D, 0x2D), Rgb(0x44, 0x44, 0x44), Rgb(0x10, 0x10, 0x10)),
            Self::Brand => (Rgb(0xC2, 0x18, 0x5B), Rgb(0xF8, 0xBB, 0xD0), Rgb(0x21, 0x21, 0x21)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColorOverrides {
    pub header: Option<String>,
    pub accent: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FontSettings {
    pub family: String,
    pub size: f32,
}

impl Default for FontSettings {
    fn default() -> Self {
        Self {
            family: "Helvetica".to_string(),
            size: 9.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Styling {
    pub theme: Theme,
    pub colors: ColorOverrides,
    pub fonts: FontSettings,
}

/// Colors after theme defaults and overrides are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedColors {
    pub header: Rgb,
    pub accent: Rgb,
    pub text: Rgb,
}

impl Styling {
    pub fn resolved_colors(&self) -> Result<ResolvedColors, ExportError> {
        let (header, accent, text) = self.theme.palette();
        let pick = |value: Option<&String>, fallback: Rgb| {
            value.map_or(Ok(fallback), |raw| {
                raw.parse::<Rgb>().map_err(ExportError::InvalidOption)
            })
        };
        Ok(ResolvedColors {
            header: pick(self.colors.header.as_ref(), header)?,
            accent: pick(self.colors.accent.as_ref(), accent)?,
            text: pick(self.colors.text.as_ref(), text)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Watermark {
    pub enabled: bool,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PdfOptions {
    pub rows_per_page: usize,
    pub landscape: Option<bool>,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            rows_per_page: DEFAULT_PDF_ROWS_PER_PAGE,
            landscape: None,
        }
    }
}

/// Accepted so hosts can round-trip their settings; nothing delivers on a
/// schedule yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleSettings {
    pub enabled: bool,
    pub cron: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportConfiguration {
    pub format: ExportFormat,
    pub include_headers: bool,
    pub include_metadata: bool,
    pub compression: bool,
    pub split_large_files: bool,
    pub max_rows_per_sheet: usize,
    pub custom_file_name: Option<String>,
    pub styling: Styling,
    pub watermark: Option<Watermark>,
    /// Stored verbatim; output files are not encrypted.
    pub password_placeholder: Option<String>,
    pub schedule: Option<ScheduleSettings>,
    pub bundle: bool,
    pub preview_rows: usize,
    pub locale: NumberLocale,
    pub pdf: PdfOptions,
    pub source: Option<String>,
}

impl Default for ExportConfiguration {
    fn default() -> Self {
        Self {
            format: ExportFormat::default(),
            include_headers: true,
            include_metadata: false,
            compression: false,
            split_large_files: false,
            max_rows_per_sheet: DEFAULT_MAX_ROWS_PER_SHEET,
            custom_file_name: None,
            styling: Styling::default(),
            watermark: None,
            password_placeholder: None,
            schedule: None,
            bundle: false,
            preview_rows: DEFAULT_PREVIEW_ROWS,
            locale: NumberLocale::default(),
            pdf: PdfOptions::default(),
            source: None,
        }
    }
}

impl ExportConfiguration {
    #[must_use]
    pub fn with_format(format: ExportFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ExportError> {
        if self.max_rows_per_sheet == 0 {
            return Err(ExportError::InvalidOption(
                "maxRowsPerSheet must be at least 1".to_string(),
            ));
        }
        if self.preview_rows == 0 {
            return Err(ExportError::InvalidOption(
                "previewRows must be at least 1".to_string(),
            ));
        }
        if self.pdf.rows_per_page == 0 {
            return Err(ExportError::InvalidOption(
                "pdf.rowsPerPage must be at least 1".to_string(),
            ));
        }
        if let Some(name) = &self.custom_file_name {
            if sanitize_file_stem(name).is_empty() {
                return Err(ExportError::InvalidOption(format!(
                    "customFileName '{name}' has no usable characters"
                )));
            }
        }
        if let Some(watermark) = &self.watermark {
            if watermark.enabled && watermark.text.trim().is_empty() {
                return Err(ExportError::InvalidOption(
                    "watermark is enabled but has no text".to_string(),
                ));
            }
        }
        if !(4.0..=48.0).contains(&self.styling.fonts.size) {
            return Err(ExportError::InvalidOption(format!(
                "font size {} is outside 4..=48",
                self.styling.fonts.size
            )));
        }
        self.locale.validate()?;
        self.styling.resolved_colors()?;
        Ok(())
    }

    #[must_use]
    pub fn watermark_text(&self) -> Option<&str> {
        self.watermark
            .as_ref()
            .filter(|watermark| watermark.enabled)
            .map(|watermark| watermark.text.trim())
            .filter(|text| !text.is_empty())
    }
}

/// Keeps letters, digits, `-` and `_`; other runs collapse to one `-`.
#[must_use]
pub fn sanitize_file_stem(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        if ch.is_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::{ExportConfiguration, ExportFormat, NumberLocale, Rgb, Theme, sanitize_file_stem};

    #[test]
    fn parses_format_aliases() {
        assert_eq!("XLSX".parse::<ExportFormat>(), Ok(ExportFormat::Workbook));
        assert_eq!("zip".parse::<ExportFormat>(), Ok(ExportFormat::Archive));
        assert_eq!("md".parse::<ExportFormat>(), Ok(ExportFormat::Clipboard));
        let err = "docx".parse::<ExportFormat>().expect_err("unknown format should fail");
        assert!(err.contains("unknown export format"));
    }

    #[test]
    fn deserializes_partial_configuration_with_defaults() {
        let config: ExportConfiguration = serde_json::from_str(
            r##"{"format":"csv","includeMetadata":true,"styling":{"theme":"brand","colors":{"header":"#112233"}}}"##,
        )
        .expect("configuration should parse");
        assert_eq!(config.format, ExportFormat::Csv);
        assert!(config.include_headers);
        assert!(config.include_metadata);
        assert_eq!(config.max_rows_per_sheet, 100_000);
        assert_eq!(config.styling.theme, Theme::Brand);
        let colors = config.styling.resolved_colors().expect("colors should resolve");
        assert_eq!(colors.header, Rgb(0x11, 0x22, 0x33));
    }

    #[test]
    fn rejects_invalid_configuration() {
        let zero_rows = ExportConfiguration {
            max_rows_per_sheet: 0,
            ..ExportConfiguration::default()
        };
        assert!(zero_rows.validate().is_err());

        let mut bad_color = ExportConfiguration::default();
        bad_color.styling.colors.header = Some("teal".to_string());
        assert!(bad_color.validate().is_err());

        let bad_name = ExportConfiguration {
            custom_file_name: Some("///".to_string()),
            ..ExportConfiguration::default()
        };
        assert!(bad_name.validate().is_err());
    }

    #[test]
    fn parses_locale_presets() {
        let eu = "eu".parse::<NumberLocale>().expect("eu should parse");
        assert_eq!(eu.decimal_separator, ',');
        assert!("xx".parse::<NumberLocale>().is_err());
    }

    #[test]
    fn sanitizes_file_stems() {
        assert_eq!(sanitize_file_stem("  Q3 Revenue / Studio A "), "Q3-Revenue-Studio-A");
        assert_eq!(sanitize_file_stem("***"), "");
    }
}
