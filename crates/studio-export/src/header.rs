#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RowCandidate {
    pub cells: Vec<String>,
    /// Row carries the explicit header marker or sits in a `thead`.
    pub marked_header: bool,
    /// Every non-empty cell is a `th` / `columnheader`.
    pub header_cells: bool,
}

impl RowCandidate {
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|cell| cell.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeaderSource {
    Marker,
    HeaderCells,
    FirstRow,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedHeaders {
    pub headers: Vec<String>,
    pub source: HeaderSource,
    /// Index into the candidate rows consumed as the header row.
    pub header_row: Option<usize>,
    /// Source column for each retained header, after duplicate suppression.
    pub columns: Vec<usize>,
}

pub(crate) fn synthetic_header(index: usize) -> String {
    format!("Column {}", index + 1)
}

/// Marker row, then header-cell row, then first row, then `Column N`.
/// Blank rows never win a step.
pub(crate) fn resolve_headers(rows: &[RowCandidate]) -> ResolvedHeaders {
    let pick = |predicate: &dyn Fn(&RowCandidate) -> bool| {
        rows.iter()
            .position(|row| !row.is_blank() && predicate(row))
    };

    let found = pick(&|row| row.marked_header)
        .map(|index| (index, HeaderSource::Marker))
        .or_else(|| pick(&|row| row.header_cells).map(|index| (index, HeaderSource::HeaderCells)))
        .or_else(|| pick(&|_| true).map(|index| (index, HeaderSource::FirstRow)));

    let Some((index, source)) = found else {
        let width = rows.iter().map(|row| row.cells.len()).max().unwrap_or(0);
        return ResolvedHeaders {
            headers: (0..width).map(synthetic_header).collect(),
            source: HeaderSource::Synthetic,
            header_row: None,
            columns: (0..width).collect(),
        };
    };

    let mut headers = Vec::new();
    let mut columns = Vec::new();
    for (column, cell) in rows[index].cells.iter().enumerate() {
        let text = cell.trim();
        let label = if text.is_empty() {
            synthetic_header(column)
        } else {
            text.to_string()
        };
        if headers.contains(&label) {
            continue;
        }
        headers.push(label);
        columns.push(column);
    }

    ResolvedHeaders {
        headers,
        source,
        header_row: Some(index),
        columns,
    }
}

#[cfg(test)]
mod tests {
    use super::{HeaderSource, RowCandidate, resolve_headers};

    fn row(cells: &[&str]) -> RowCandidate {
        RowCandidate {
            cells: cells.iter().map(ToString::to_string).collect(),
            ..RowCandidate::default()
        }
    }

    #[test]
    fn explicit_marker_beats_header_cells() {
        let mut header_cells = row(&["A", "B"]);
        header_cells.header_cells = true;
        let mut marked = row(&["Name", "Visits"]);
        marked.marked_header = true;

        let resolved = resolve_headers(&[header_cells, marked, row(&["x", "1"])]);
        assert_eq!(resolved.headers, vec!["Name", "Visits"]);
        assert_eq!(resolved.source, HeaderSource::Marker);
        assert_eq!(resolved.header_row, Some(1));
    }

    #[test]
    fn falls_back_to_first_non_blank_row() {
        let resolved = resolve_headers(&[row(&["", ""]), row(&["Studio", "Members"])]);
        assert_eq!(resolved.source, HeaderSource::FirstRow);
        assert_eq!(resolved.header_row, Some(1));
    }

    #[test]
    fn synthesizes_when_every_row_is_blank() {
        let resolved = resolve_headers(&[row(&["", "", ""])]);
        assert_eq!(resolved.headers, vec!["Column 1", "Column 2", "Column 3"]);
        assert_eq!(resolved.header_row, None);
    }

    #[test]
    fn suppresses_duplicate_header_text() {
        let resolved = resolve_headers(&[row(&["Month", "Total", "Total", ""])]);
        assert_eq!(resolved.headers, vec!["Month", "Total", "Column 4"]);
        assert_eq!(resolved.columns, vec![0, 1, 3]);
    }
}
