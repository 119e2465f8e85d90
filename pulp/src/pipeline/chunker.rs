//! Structure-aware document chunking
//!
//! Text is split on blank lines into sections. A section whose first line
//! starts with `#` is a header: it labels everything after it until the next
//! header, and its remaining lines (if any) are ordinary content. Sections are
//! packed greedily into chunks no larger than the bound, except that a single
//! oversized section is kept whole.

use tracing::debug;

/// Default chunk bound in characters (roughly 375 tokens)
pub const DEFAULT_CHUNK_SIZE: usize = 1500;

const SECTION_SEPARATOR: &str = "\n\n";

/// One piece of the document, in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: usize,
    pub content: String,
    /// Header in effect when this chunk started (empty before the first header)
    pub section: String,
    pub position: usize,
}

/// Split `content` into chunks of at most `max_chars` characters
///
/// A bound of zero means [`DEFAULT_CHUNK_SIZE`].
pub fn chunk_document(content: &str, max_chars: usize) -> Vec<Chunk> {
    let max_chars = if max_chars == 0 { DEFAULT_CHUNK_SIZE } else { max_chars };
    debug!(content_len = content.len(), %max_chars, "chunk_document: called");

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;
    let mut current_label = String::new();
    let mut section_label = String::new();

    for raw in content.split(SECTION_SEPARATOR) {
        let mut section = raw.trim();
        if section.is_empty() {
            continue;
        }

        if section.starts_with('#') {
            let (header, rest) = section.split_once('\n').unwrap_or((section, ""));
            section_label = header.trim_start_matches(['#', ' ']).trim_end().to_string();
            section = rest.trim();
            if section.is_empty() {
                continue;
            }
        }

        let section_chars = section.chars().count();
        if !current.is_empty() && current_chars + section_chars + SECTION_SEPARATOR.len() > max_chars {
            push_chunk(&mut chunks, std::mem::take(&mut current), &current_label);
            current_chars = 0;
        }

        if current.is_empty() {
            current_label = section_label.clone();
        } else {
            current.push_str(SECTION_SEPARATOR);
            current_chars += SECTION_SEPARATOR.len();
        }
        current.push_str(section);
        current_chars += section_chars;
    }

    if !current.is_empty() {
        push_chunk(&mut chunks, current, &current_label);
    }

    debug!(chunk_count = chunks.len(), "chunk_document: done");
    chunks
}

fn push_chunk(chunks: &mut Vec<Chunk>, content: String, label: &str) {
    let id = chunks.len();
    chunks.push(Chunk {
        id,
        content,
        section: label.to_string(),
        position: id,
    });
}

/// Rough token estimate: four characters per token
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_and_blank_input() {
        assert!(chunk_document("", 100).is_empty());
        assert!(chunk_document("  \n\n \n\n", 100).is_empty());
    }

    #[test]
    fn test_headers_label_content() {
        let chunks = chunk_document("# A\nAlpha fact.\n\n# B\nBeta fact.", 10_000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Alpha fact.\n\nBeta fact.");
        assert_eq!(chunks[0].section, "A");
    }

    #[test]
    fn test_header_only_section_contributes_nothing() {
        let chunks = chunk_document("## Intro\n\nBody text.", 10_000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Body text.");
        assert_eq!(chunks[0].section, "Intro");
    }

    #[test]
    fn test_splits_at_bound() {
        let text = "aaaa\n\nbbbb\n\ncccc";
        // 4 + 2 + 4 = 10 fits, adding another 6 does not
        let chunks = chunk_document(text, 10);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "aaaa\n\nbbbb");
        assert_eq!(chunks[1].content, "cccc");
        assert_eq!(chunks[1].id, 1);
        assert_eq!(chunks[1].position, 1);
    }

    #[test]
    fn test_oversized_section_is_not_split() {
        let big = "x".repeat(50);
        let chunks = chunk_document(&format!("small\n\n{}\n\ntail", big), 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].content, big);
    }

    #[test]
    fn test_label_is_section_where_chunk_started() {
        let text = "# One\naaaaaaaa\n\n# Two\nbbbbbbbb";
        let chunks = chunk_document(text, 10);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].section, "One");
        assert_eq!(chunks[1].section, "Two");
    }

    #[test]
    fn test_zero_bound_uses_default() {
        let para = "word ".repeat(100);
        let text = vec![para.trim(); 5].join("\n\n");
        // Two 499-char paragraphs fit in 1500, a third does not
        let chunks = chunk_document(&text, 0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks, chunk_document(&text, DEFAULT_CHUNK_SIZE));
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let text = "éééé\n\néééé";
        assert_eq!(chunk_document(text, 10).len(), 1);
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens("ééé"), 0);
    }

    /// Non-blank content sections in order, with header lines consumed
    fn expected_sections(text: &str) -> Vec<String> {
        text.split("\n\n")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| {
                if s.starts_with('#') {
                    let rest = s.split_once('\n').map(|(_, r)| r.trim()).unwrap_or("");
                    (!rest.is_empty()).then(|| rest.to_string())
                } else {
                    Some(s.to_string())
                }
            })
            .collect()
    }

    fn doc_strategy() -> impl Strategy<Value = String> {
        let section = prop_oneof![
            "[a-z ]{0,40}",
            "#{1,3} [A-Z][a-z]{0,8}",
            "# [A-Z][a-z]{0,8}\n[a-z ]{1,30}",
        ];
        prop::collection::vec(section, 0..12).prop_map(|s| s.join("\n\n"))
    }

    proptest! {
        #[test]
        fn prop_chunking_is_deterministic(text in doc_strategy(), bound in 0usize..200) {
            prop_assert_eq!(chunk_document(&text, bound), chunk_document(&text, bound));
        }

        #[test]
        fn prop_chunks_reconstruct_content(text in doc_strategy(), bound in 1usize..200) {
            let chunks = chunk_document(&text, bound);
            let rebuilt: Vec<String> = chunks
                .iter()
                .flat_map(|c| c.content.split("\n\n").map(str::to_string).collect::<Vec<_>>())
                .collect();
            prop_assert_eq!(rebuilt, expected_sections(&text));
        }

        #[test]
        fn prop_chunks_respect_bound_unless_single_section(text in doc_strategy(), bound in 1usize..200) {
            for chunk in chunk_document(&text, bound) {
                let sections = chunk.content.split("\n\n").count();
                prop_assert!(sections == 1 || chunk.content.chars().count() <= bound);
            }
        }

        #[test]
        fn prop_ids_are_sequential(text in doc_strategy(), bound in 1usize..200) {
            for (i, chunk) in chunk_document(&text, bound).iter().enumerate() {
                prop_assert_eq!(chunk.id, i);
                prop_assert_eq!(chunk.position, i);
            }
        }
    }
}
