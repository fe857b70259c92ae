use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::config::NumberLocale;

/// Declaration order is classification priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Currency,
    Percentage,
    Number,
    Date,
    Text,
}

impl ValueKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Currency => "currency",
            Self::Percentage => "percentage",
            Self::Number => "number",
            Self::Date => "date",
            Self::Text => "text",
        }
    }

    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Currency | Self::Percentage | Self::Number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NormalizedValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedValue {
    pub kind: ValueKind,
    pub value: NormalizedValue,
    pub unit: Option<String>,
}

impl ParsedValue {
    fn text(raw: &str) -> Self {
        Self {
            kind: ValueKind::Text,
            value: NormalizedValue::Text(raw.trim().to_string()),
            unit: None,
        }
    }
}

const CURRENCY_GLYPHS: &[&str] = &["₹", "$", "€", "£", "¥"];
const CURRENCY_CODES: &[(&str, &str)] = &[
    ("INR", "₹"),
    ("Rs.", "₹"),
    ("Rs", "₹"),
    ("USD", "$"),
    ("EUR", "€"),
    ("GBP", "£"),
];
const CURRENCY_HINTS: &[&str] = &["price", "revenue", "cost", "amount"];
const DATE_HINTS: &[&str] = &["date", "time", "created", "updated"];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%m/%d/%Y", "%d-%m-%Y", "%d.%m.%Y", "%b %d, %Y",
    "%B %d, %Y", "%d %b %Y", "%d %B %Y",
];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];
const MONTH_FORMATS: &[&str] = &["%d %b %Y", "%d %B %Y", "%d %Y-%m"];

fn hint_matches(header: Option<&str>, keywords: &[&str]) -> bool {
    header.is_some_and(|header| {
        let lowered = header.to_lowercase();
        keywords.iter().any(|keyword| lowered.contains(keyword))
    })
}

fn currency_unit(text: &str) -> Option<&'static str> {
    if let Some(glyph) = CURRENCY_GLYPHS.iter().copied().find(|glyph| text.contains(glyph)) {
        return Some(glyph);
    }
    CURRENCY_CODES.iter().find_map(|(code, glyph)| {
        let trimmed = text.trim();
        (trimmed.starts_with(code) || trimmed.ends_with(code)).then_some(*glyph)
    })
}

fn strip_currency(text: &str) -> String {
    let mut out = text.to_string();
    for glyph in CURRENCY_GLYPHS {
        out = out.replace(glyph, "");
    }
    for (code, _) in CURRENCY_CODES {
        let trimmed = out.trim();
        if let Some(rest) = trimmed.strip_prefix(code) {
            out = rest.to_string();
        } else if let Some(rest) = trimmed.strip_suffix(code) {
            out = rest.to_string();
        }
    }
    out
}

/// Parses a bare number under the given separator convention. Thousands
/// groups must be three digits wide, so `"1,5"` is not a number under `en`.
#[must_use]
pub fn parse_number(text: &str, locale: &NumberLocale) -> Option<f64> {
    let mut body = text
        .trim()
        .replace(['\u{a0}', '\u{202f}'], " ")
        .replace('\u{2212}', "-");
    let mut negative = false;
    if body.starts_with('(') && body.ends_with(')') && body.len() > 2 {
        negative = true;
        body = body[1..body.len() - 1].to_string();
    }
    if locale.thousands_separator != ' ' {
        body.retain(|ch| !ch.is_whitespace());
    }

    let body = body.trim();
    let (sign, digits) = match body.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", body.strip_prefix('+').unwrap_or(body)),
    };
    if digits.is_empty() {
        return None;
    }

    let (integer, fraction) = match digits.split_once(locale.decimal_separator) {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (digits, None),
    };

    let groups = integer.split(locale.thousands_separator).collect::<Vec<_>>();
    let grouped_ok = groups.len() == 1
        || (!groups[0].is_empty()
            && groups[0].len() <= 3
            && groups[1..].iter().all(|group| group.len() == 3));
    if !grouped_ok {
        return None;
    }

    let integer = groups.concat();
    let all_digits = |part: &str| part.chars().all(|ch| ch.is_ascii_digit());
    if !all_digits(&integer) || !fraction.is_none_or(all_digits) {
        return None;
    }
    if integer.is_empty() && fraction.is_none_or(str::is_empty) {
        return None;
    }

    let canonical = match fraction {
        Some(fraction) if !fraction.is_empty() => format!("{sign}{integer}.{fraction}"),
        _ => format!("{sign}{integer}"),
    };
    let canonical = if canonical.starts_with('.') || canonical.starts_with("-.") {
        canonical.replacen('.', "0.", 1)
    } else {
        canonical
    };
    let value = canonical
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())?;
    Some(if negative { -value } else { value })
}

#[must_use]
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
    {
        return Some(date);
    }
    if let Some(datetime) = DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
    {
        return Some(datetime.date());
    }
    if let Ok(datetime) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(datetime.date_naive());
    }
    // Month-only labels such as "Jan 2024" or "2024-01" resolve to the 1st.
    let with_day = format!("1 {trimmed}");
    MONTH_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&with_day, format).ok())
}

/// Classifies one raw cell. Numeric kinds require the stripped text to
/// parse; otherwise the cell falls through to the next rule.
#[must_use]
pub fn parse_value(raw: &str, header_hint: Option<&str>, locale: &NumberLocale) -> ParsedValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ParsedValue::text("");
    }

    let glyph = currency_unit(trimmed);
    let hinted_currency = hint_matches(header_hint, CURRENCY_HINTS);
    if glyph.is_some() || hinted_currency {
        let stripped = strip_currency(trimmed);
        if !stripped.contains('%') {
            if let Some(number) = parse_number(&stripped, locale) {
                return ParsedValue {
                    kind: ValueKind::Currency,
                    value: NormalizedValue::Number(number),
                    unit: Some(glyph.unwrap_or("currency").to_string()),
                };
            }
        }
    }

    if trimmed.contains('%') {
        if let Some(number) = parse_number(&trimmed.replace('%', ""), locale) {
            return ParsedValue {
                kind: ValueKind::Percentage,
                value: NormalizedValue::Number(number),
                unit: Some("%".to_string()),
            };
        }
    }

    if let Some(number) = parse_number(trimmed, locale) {
        return ParsedValue {
            kind: ValueKind::Number,
            value: NormalizedValue::Number(number),
            unit: None,
        };
    }

    if hint_matches(header_hint, DATE_HINTS) {
        if let Some(date) = parse_date(trimmed) {
            return ParsedValue {
                kind: ValueKind::Date,
                value: NormalizedValue::Text(date.format("%Y-%m-%d").to_string()),
                unit: None,
            };
        }
    }

    ParsedValue::text(trimmed)
}

/// Majority vote over the non-empty samples of one column. Ties go to the
/// higher-priority kind; a column with no samples is text.
pub fn majority_kind<'a>(
    samples: impl IntoIterator<Item = &'a str>,
    header: Option<&str>,
    locale: &NumberLocale,
) -> ValueKind {
    let mut counts = [0_usize; 5];
    for sample in samples {
        if sample.trim().is_empty() {
            continue;
        }
        let kind = parse_value(sample, header, locale).kind;
        counts[kind as usize] += 1;
    }

    let mut best = ValueKind::Text;
    let mut best_count = 0;
    for kind in [
        ValueKind::Currency,
        ValueKind::Percentage,
        ValueKind::Number,
        ValueKind::Date,
        ValueKind::Text,
    ] {
        if counts[kind as usize] > best_count {
            best = kind;
            best_count = counts[kind as usize];
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::{NormalizedValue, ValueKind, majority_kind, parse_number, parse_value};
    use crate::config::NumberLocale;

    fn en() -> NumberLocale {
        NumberLocale::default()
    }

    #[test]
    fn classifies_by_priority() {
        let locale = en();
        assert_eq!(parse_value("$1,200.50", None, &locale).kind, ValueKind::Currency);
        assert_eq!(parse_value("1200", Some("Revenue"), &locale).kind, ValueKind::Currency);
        assert_eq!(parse_value("64.5%", None, &locale).kind, ValueKind::Percentage);
        assert_eq!(parse_value("1,204", None, &locale).kind, ValueKind::Number);
        assert_eq!(parse_value("2024-03-01", Some("Date"), &locale).kind, ValueKind::Date);
        assert_eq!(parse_value("2024-03-01", Some("Label"), &locale).kind, ValueKind::Text);
        assert_eq!(parse_value("Spin Class", None, &locale).kind, ValueKind::Text);
    }

    #[test]
    fn empty_cell_is_empty_text() {
        let parsed = parse_value("   ", Some("Revenue"), &en());
        assert_eq!(parsed.kind, ValueKind::Text);
        assert_eq!(parsed.value, NormalizedValue::Text(String::new()));
    }

    #[test]
    fn normalizes_currency_and_records_unit() {
        let parsed = parse_value("₹ 45,000", None, &en());
        assert_eq!(parsed.value, NormalizedValue::Number(45_000.0));
        assert_eq!(parsed.unit.as_deref(), Some("₹"));

        let negative = parse_value("($1,250)", None, &en());
        assert_eq!(negative.value, NormalizedValue::Number(-1250.0));
    }

    #[test]
    fn locale_controls_separators() {
        let eu = "eu".parse::<NumberLocale>().unwrap();
        assert_eq!(parse_number("1.234,5", &eu), Some(1234.5));
        assert_eq!(parse_number("1,5", &eu), Some(1.5));
        assert_eq!(parse_number("1,5", &en()), None);
        assert_eq!(parse_number("12,345,678.9", &en()), Some(12_345_678.9));
        assert_eq!(parse_number("-.5", &en()), Some(-0.5));
        assert_eq!(parse_number("abc", &en()), None);
        assert_eq!(parse_number("-", &en()), None);
    }

    #[test]
    fn overflowing_digits_are_not_numbers() {
        let huge = format!("1{}", "0".repeat(400));
        assert_eq!(parse_number(&huge, &en()), None);
        assert_eq!(parse_value(&huge, Some("Members"), &en()).kind, ValueKind::Text);
    }

    #[test]
    fn month_labels_parse_as_dates() {
        let parsed = parse_value("Jan 2024", Some("Created"), &en());
        assert_eq!(parsed.kind, ValueKind::Date);
        assert_eq!(parsed.value, NormalizedValue::Text("2024-01-01".to_string()));
    }

    #[test]
    fn majority_vote_ignores_empty_cells() {
        let kind = majority_kind(["$10", "", "$12", "n/a"], Some("Fee"), &en());
        assert_eq!(kind, ValueKind::Currency);
        assert_eq!(majority_kind(["", " "], None, &en()), ValueKind::Text);
    }
}
