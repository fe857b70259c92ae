use crate::model::{Category, Complexity, TableKind};

const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Financial,
        &[
            "revenue", "sales", "price", "cost", "amount", "income", "profit", "payment",
            "discount", "paid", "spend", "ltv", "arpu", "tax", "fee",
        ],
    ),
    (
        Category::Performance,
        &[
            "performance", "conversion", "attendance", "fill", "utilization", "occupancy",
            "retention", "target", "score", "achievement",
        ],
    ),
    (
        Category::Behavior,
        &[
            "visit", "check-in", "checkin", "frequency", "churn", "session", "booking",
            "cancellation", "no-show", "engagement", "late",
        ],
    ),
    (
        Category::Analysis,
        &[
            "trend", "analysis", "comparison", "variance", "change", "forecast", "average",
            "ratio", "growth",
        ],
    ),
    (
        Category::Operational,
        &[
            "location", "studio", "trainer", "instructor", "class", "schedule", "capacity",
            "staff", "room",
        ],
    ),
];

const MONTH_ON_MONTH: &[&str] = &["mom", "monthly", "month"];
const YEAR_ON_YEAR: &[&str] = &["yoy", "yearly", "annual", "year"];
const PERFORMANCE: &[&str] = &["performance", "kpi", "target", "achievement"];
const ANALYTICS: &[&str] = &["analytics", "analysis", "trend", "breakdown", "distribution"];

const SUMMARY_ROW_LIMIT: usize = 10;

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}

/// Counts headers mentioning each category's vocabulary. Ties go to the
/// earlier category; no hits means operational.
pub(crate) fn classify_category(headers: &[String]) -> Category {
    let mut best = Category::Operational;
    let mut best_score = 0;
    for (category, keywords) in CATEGORY_KEYWORDS {
        let score = headers
            .iter()
            .filter(|header| {
                let header = header.to_lowercase();
                keywords.iter().any(|keyword| header.contains(keyword))
            })
            .count();
        if score > best_score {
            best = *category;
            best_score = score;
        }
    }
    best
}

pub(crate) fn parse_kind_marker(value: &str) -> Option<TableKind> {
    match value.trim().to_ascii_lowercase().as_str() {
        "month-on-month" | "mom" => Some(TableKind::MonthOnMonth),
        "year-on-year" | "yoy" => Some(TableKind::YearOnYear),
        "performance" => Some(TableKind::Performance),
        "analytics" => Some(TableKind::Analytics),
        "summary" => Some(TableKind::Summary),
        _ => None,
    }
}

/// Keyword match over header words and container hints (class, id).
pub(crate) fn classify_kind(headers: &[String], hints: &[&str], row_count: usize) -> TableKind {
    let vocabulary = headers
        .iter()
        .map(String::as_str)
        .chain(hints.iter().copied())
        .flat_map(words)
        .collect::<Vec<_>>();
    let mentions = |keywords: &[&str]| {
        vocabulary
            .iter()
            .any(|word| keywords.iter().any(|keyword| word.as_str() == *keyword))
    };

    if mentions(MONTH_ON_MONTH) {
        TableKind::MonthOnMonth
    } else if mentions(YEAR_ON_YEAR) {
        TableKind::YearOnYear
    } else if mentions(PERFORMANCE) {
        TableKind::Performance
    } else if mentions(ANALYTICS) {
        TableKind::Analytics
    } else if row_count < SUMMARY_ROW_LIMIT {
        TableKind::Summary
    } else {
        TableKind::Unknown
    }
}

pub(crate) fn complexity(row_count: usize, column_count: usize) -> Complexity {
    if row_count > 100 || column_count > 10 {
        Complexity::Complex
    } else if row_count > 20 || column_count > 5 {
        Complexity::Moderate
    } else {
        Complexity::Simple
    }
}
