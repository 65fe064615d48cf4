//! Decoding of passage records returned by the vector store and the
//! lexical index.
//!
//! Both services store the same attributes, but older records carry
//! `section_path` as a single `" > "`-joined string instead of an array.

use anyhow::Result;
use serde_json::Value;

use docs_assistant_core::models::{Passage, SECTION_SEPARATOR};

/// Normalize a `section_path` attribute to its list form.
pub fn section_path(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => s
            .split(SECTION_SEPARATOR)
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn string_field(record: &Value, key: &str) -> String {
    record
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Build a [`Passage`] from a record's attributes.
///
/// `text` is required; other missing attributes decode as empty.
pub fn passage_from_record(id: &str, record: &Value) -> Result<Passage> {
    let text = record
        .get("text")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("record {} has no text", id))?;

    let code_blocks = record
        .get("code_blocks")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(Passage {
        id: id.to_string(),
        text: text.to_string(),
        url: string_field(record, "url"),
        title: string_field(record, "title"),
        section_path: section_path(record.get("section_path")),
        version: string_field(record, "version"),
        code_blocks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_section_path_string_and_array() {
        assert_eq!(
            section_path(Some(&json!("Commands > Store"))),
            vec!["Commands", "Store"]
        );
        assert_eq!(
            section_path(Some(&json!(["Commands", "Store"]))),
            vec!["Commands", "Store"]
        );
        assert!(section_path(Some(&json!(""))).is_empty());
        assert!(section_path(None).is_empty());
    }

    #[test]
    fn test_passage_from_record() {
        let record = json!({
            "text": "Store saves cues.",
            "url": "https://docs.example/store",
            "title": "Store",
            "section_path": "Commands > Store",
            "version": "2.3",
            "code_blocks": ["Store Cue 1"]
        });
        let p = passage_from_record("p1", &record).unwrap();
        assert_eq!(p.id, "p1");
        assert_eq!(p.section(), "Commands > Store");
        assert_eq!(p.code_blocks, vec!["Store Cue 1"]);
    }

    #[test]
    fn test_record_without_text_is_error() {
        assert!(passage_from_record("p1", &json!({"title": "Store"})).is_err());
    }
}
