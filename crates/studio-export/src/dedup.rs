use std::collections::HashMap;

use crate::model::TabularBlock;

const SIGNATURE_ROWS: usize = 3;
const FIELD_SEPARATOR: &str = "\u{1f}";
const RECORD_SEPARATOR: char = '\u{1e}';

/// Headers plus the first three rows, joined with control separators so
/// cell text cannot fake a boundary.
pub(crate) fn signature(block: &TabularBlock) -> String {
    let mut signature = block.headers.join(FIELD_SEPARATOR);
    for row in block.rows.iter().take(SIGNATURE_ROWS) {
        signature.push(RECORD_SEPARATOR);
        signature.push_str(&row.join(FIELD_SEPARATOR));
    }
    signature
}

/// Collapses blocks with equal signatures. The survivor is the most
/// confident one; it takes the slot of the first occurrence.
pub(crate) fn dedup_blocks(blocks: Vec<TabularBlock>) -> Vec<TabularBlock> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<TabularBlock> = Vec::with_capacity(blocks.len());

    for block in blocks {
        let key = signature(&block);
        match seen.get(&key) {
            Some(&slot) => {
                if block.confidence > kept[slot].confidence {
                    kept[slot] = block;
                }
            }
            None => {
                seen.insert(key, kept.len());
                kept.push(block);
            }
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{dedup_blocks, signature};
    use crate::model::{Category, Complexity, TableKind, TabularBlock};

    fn block(matched_by: &str, confidence: f32, rows: &[&[&str]]) -> TabularBlock {
        let rows = rows
            .iter()
            .map(|row| row.iter().map(ToString::to_string).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        TabularBlock {
            id: String::new(),
            name: "Sales".to_string(),
            headers: vec!["Studio".to_string(), "Sales".to_string()],
            row_count: rows.len(),
            rows,
            category: Category::Financial,
            kind: TableKind::Summary,
            confidence,
            complexity: Complexity::Simple,
            column_count: 2,
            data_types: BTreeMap::new(),
            units: BTreeMap::new(),
            source_location: "body > table".to_string(),
            matched_by: matched_by.to_string(),
        }
    }

    #[test]
    fn keeps_the_most_confident_duplicate_in_first_position() {
        let rows: &[&[&str]] = &[&["Kemps", "10"], &["Bandra", "12"]];
        let blocks = vec![
            block("table-class", 0.60, rows),
            block("other", 0.80, &[&["Andheri", "3"]]),
            block("table-tag", 0.80, rows),
        ];
        let kept = dedup_blocks(blocks);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].matched_by, "table-tag");
        assert_eq!(kept[1].matched_by, "other");
    }

    #[test]
    fn signature_ignores_rows_past_the_third() {
        let short = block("a", 0.8, &[&["1", "2"], &["3", "4"], &["5", "6"]]);
        let long = block("b", 0.8, &[&["1", "2"], &["3", "4"], &["5", "6"], &["7", "8"]]);
        assert_eq!(signature(&short), signature(&long));
        assert_ne!(
            signature(&block("c", 0.8, &[&["1", "23"]])),
            signature(&block("d", 0.8, &[&["12", "3"]]))
        );
    }
}
