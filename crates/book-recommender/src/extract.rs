/// Highlight extraction.
///
/// A record's highlight column is a single blob containing zero or more
/// quoted passages. Extraction finds every span delimited by a pair of
/// double-quote-family characters (straight `"` or the curly variants),
/// non-greedy, and trims each span. Opening and closing characters do not
/// have to be the same sub-style, so `"...”` and `“..."` both match.
/// A blob with no quoted span at all is treated as one highlight.
use regex::Regex;

use crate::model::{Record, Unit, UnitKey};

/// Split a raw highlight blob into individually addressable quotations.
///
/// Empty or whitespace-only input yields an empty sequence; input without
/// any quoted span yields the whole trimmed blob as a single element.
pub fn parse_highlights(blob: &str) -> Vec<String> {
    let quoted = Regex::new(r#"["“](.*?)["”]"#).expect("valid regex");
    let spans: Vec<String> = quoted
        .captures_iter(blob)
        .map(|caps| caps[1].trim().to_string())
        .collect();
    if !spans.is_empty() {
        return spans;
    }
    let whole = blob.trim();
    if whole.is_empty() {
        Vec::new()
    } else {
        vec![whole.to_string()]
    }
}

/// Decompose each record's highlight blob into units keyed by
/// `{record_index, unit_index}`.
pub fn build_highlight_units(records: &[Record]) -> Vec<Unit> {
    let mut units = Vec::new();
    for (record_index, record) in records.iter().enumerate() {
        for (unit_index, text) in parse_highlights(&record.text).into_iter().enumerate() {
            units.push(Unit {
                key: UnitKey {
                    record: record_index,
                    unit: unit_index,
                },
                text,
                record_id: record.id.clone(),
                record_title: record.title.clone(),
                record_author: record.author.clone(),
            });
        }
    }
    units
}

/// One unit per record: the synopsis is ranked whole.
pub fn build_synopsis_units(records: &[Record]) -> Vec<Unit> {
    records
        .iter()
        .enumerate()
        .map(|(record_index, record)| Unit {
            key: UnitKey {
                record: record_index,
                unit: 0,
            },
            text: record.text.clone(),
            record_id: record.id.clone(),
            record_title: record.title.clone(),
            record_author: record.author.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, title: &str, text: &str) -> Record {
        Record {
            id: id.to_string(),
            title: title.to_string(),
            author: "Author".to_string(),
            text: text.to_string(),
            category: "Habits".to_string(),
        }
    }

    #[test]
    fn extracts_straight_quoted_spans() {
        let spans = parse_highlights(r#"intro "first insight" filler "second insight" end"#);
        assert_eq!(spans, vec!["first insight", "second insight"]);
    }

    #[test]
    fn extracts_curly_quoted_spans() {
        let spans = parse_highlights("“habit loops compound” and “identity drives behaviour”");
        assert_eq!(
            spans,
            vec!["habit loops compound", "identity drives behaviour"]
        );
    }

    #[test]
    fn mixed_quote_styles_pair_up() {
        let spans = parse_highlights("\u{201C}start small\" then \"show up daily\u{201D}");
        assert_eq!(spans, vec!["start small", "show up daily"]);
    }

    #[test]
    fn unquoted_blob_is_one_highlight() {
        let spans = parse_highlights("  a single unquoted thought  ");
        assert_eq!(spans, vec!["a single unquoted thought"]);
    }

    #[test]
    fn already_extracted_quotation_is_idempotent() {
        let spans = parse_highlights("\" small steps win \"");
        assert_eq!(spans, vec!["small steps win"]);
        let again = parse_highlights(&spans[0]);
        assert_eq!(again, vec!["small steps win"]);
    }

    #[test]
    fn empty_blob_yields_nothing() {
        assert!(parse_highlights("").is_empty());
        assert!(parse_highlights("   \n  ").is_empty());
    }

    #[test]
    fn interior_whitespace_is_trimmed() {
        let spans = parse_highlights("\"  padded quote\t\"");
        assert_eq!(spans, vec!["padded quote"]);
    }

    #[test]
    fn highlight_units_carry_record_backrefs() {
        let records = vec![
            record("1", "Atomic Habits", r#""one" "two""#),
            record("2", "Deep Work", "no quotes here"),
        ];
        let units = build_highlight_units(&records);
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].key, UnitKey { record: 0, unit: 0 });
        assert_eq!(units[1].key, UnitKey { record: 0, unit: 1 });
        assert_eq!(units[1].text, "two");
        assert_eq!(units[2].key, UnitKey { record: 1, unit: 0 });
        assert_eq!(units[2].text, "no quotes here");
        assert_eq!(units[2].record_title, "Deep Work");
        assert_eq!(units[2].record_id, "2");
    }

    #[test]
    fn synopsis_units_are_one_per_record() {
        let records = vec![
            record("1", "Atomic Habits", "a synopsis"),
            record("2", "Deep Work", "another synopsis"),
        ];
        let units = build_synopsis_units(&records);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].key, UnitKey { record: 0, unit: 0 });
        assert_eq!(units[1].key, UnitKey { record: 1, unit: 0 });
        assert_eq!(units[1].text, "another synopsis");
    }
}
