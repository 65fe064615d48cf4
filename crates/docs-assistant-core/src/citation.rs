//! Citation extraction: binding `[n]` markers in generated text to the
//! passages the model was shown.
//!
//! Each distinct marker number is cited once. Numbers outside
//! `1..=passages.len()` do not name a real passage and are dropped without
//! error. Citations are returned sorted by ascending id.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::{Candidate, Citation};

/// Maximum characters of passage text in a citation snippet.
pub const CITATION_SNIPPET_CHARS: usize = 200;

const ELLIPSIS: &str = "...";

fn marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("valid citation regex"))
}

/// Truncate `text` to `max_chars` characters, appending `...` when cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], ELLIPSIS),
        None => text.to_string(),
    }
}

/// The distinct marker numbers referenced in `text`, ascending.
///
/// Numbers too large to represent are ignored.
pub fn cited_numbers(text: &str) -> BTreeSet<usize> {
    marker_pattern()
        .captures_iter(text)
        .filter_map(|cap| cap[1].parse::<usize>().ok())
        .collect()
}

/// Build the citation for the passage at 1-based position `id`.
pub fn citation_for(id: usize, passage: &Candidate) -> Citation {
    Citation {
        id,
        url: passage.passage.url.clone(),
        title: passage.passage.title.clone(),
        section: passage.passage.section(),
        snippet: truncate_with_ellipsis(&passage.passage.text, CITATION_SNIPPET_CHARS),
    }
}

/// Citations for every passage in order, numbered from 1.
///
/// Used by the low-confidence fallback, where there is no generated text
/// to parse.
pub fn citations_for(passages: &[Candidate]) -> Vec<Citation> {
    passages
        .iter()
        .enumerate()
        .map(|(i, p)| citation_for(i + 1, p))
        .collect()
}

/// Extract citations from a complete generated answer.
///
/// `passages` must be in the order they were presented to the model.
pub fn extract_citations(answer: &str, passages: &[Candidate]) -> Vec<Citation> {
    cited_numbers(answer)
        .into_iter()
        .filter(|n| (1..=passages.len()).contains(n))
        .map(|n| citation_for(n, &passages[n - 1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Passage, RetrievalSource};

    fn passages(n: usize) -> Vec<Candidate> {
        (1..=n)
            .map(|i| Candidate {
                passage: Passage {
                    id: format!("p{}", i),
                    text: format!("Passage number {}.", i),
                    url: format!("https://docs.example/{}", i),
                    title: format!("Title {}", i),
                    section_path: vec!["Cues".to_string(), format!("Part {}", i)],
                    version: "2.3".to_string(),
                    code_blocks: Vec::new(),
                },
                score: 0.8,
                source: RetrievalSource::Vector,
                rerank_score: None,
            })
            .collect()
    }

    #[test]
    fn test_out_of_range_markers_dropped() {
        let answer = "Use Store [1]. Cues can be merged [5]. See also [2].";
        let citations = extract_citations(answer, &passages(3));
        let ids: Vec<usize> = citations.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(citations[1].url, "https://docs.example/2");
        assert_eq!(citations[1].section, "Cues > Part 2");
    }

    #[test]
    fn test_repeated_markers_cited_once() {
        let answer = "[2] and again [2], then [1][2].";
        let ids: Vec<usize> = extract_citations(answer, &passages(3))
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_zero_and_non_numeric_ignored() {
        let answer = "[0] [a] [ 1] [-1] [99999999999999999999999999]";
        assert!(extract_citations(answer, &passages(3)).is_empty());
    }

    #[test]
    fn test_no_markers_is_empty_not_error() {
        assert!(extract_citations("No citations here.", &passages(2)).is_empty());
        assert!(extract_citations("[1]", &[]).is_empty());
    }

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("short", 10), "short");
        assert_eq!(truncate_with_ellipsis("exactly10!", 10), "exactly10!");
        assert_eq!(truncate_with_ellipsis("abcdefghijk", 10), "abcdefghij...");
        // Multi-byte characters are counted as characters, not bytes.
        assert_eq!(truncate_with_ellipsis("äöüß", 2), "äö...");
    }

    #[test]
    fn test_citation_snippet_is_bounded() {
        let mut ps = passages(1);
        ps[0].passage.text = "x".repeat(500);
        let c = citation_for(1, &ps[0]);
        assert_eq!(c.snippet.chars().count(), CITATION_SNIPPET_CHARS + 3);
        assert!(c.snippet.ends_with("..."));
    }

    #[test]
    fn test_citations_for_numbers_from_one() {
        let ids: Vec<usize> = citations_for(&passages(4)).iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }
}
