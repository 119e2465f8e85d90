//! Folding per-chunk extractions into one deduplicated corpus

use std::collections::HashSet;

use tracing::debug;

use super::extractor::Extraction;

/// Everything the writer gets to see about a document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedCorpus {
    pub key_points: Vec<String>,
    pub entities: Vec<String>,
    pub facts: Vec<String>,
    pub summaries: Vec<String>,
    /// Words across key points and summaries
    pub word_count: usize,
}

/// Ordered list with case-insensitive, trim-normalized dedup
#[derive(Default)]
struct DedupList {
    seen: HashSet<String>,
    items: Vec<String>,
}

impl DedupList {
    fn push(&mut self, item: &str) {
        let item = item.trim();
        if item.is_empty() {
            return;
        }
        if self.seen.insert(item.to_lowercase()) {
            self.items.push(item.to_string());
        }
    }
}

/// Merge extractions in the order given; first occurrence wins
pub fn aggregate(extractions: &[Extraction]) -> AggregatedCorpus {
    debug!(extraction_count = extractions.len(), "aggregate: called");
    let mut key_points = DedupList::default();
    let mut entities = DedupList::default();
    let mut facts = DedupList::default();
    let mut summaries = Vec::new();

    for ext in extractions {
        ext.key_points.iter().for_each(|k| key_points.push(k));
        ext.entities.iter().for_each(|e| entities.push(e));
        ext.facts.iter().for_each(|f| facts.push(f));
        if !ext.summary.trim().is_empty() {
            summaries.push(ext.summary.clone());
        }
    }

    let word_count = key_points
        .items
        .iter()
        .chain(summaries.iter())
        .map(|s| s.split_whitespace().count())
        .sum();

    AggregatedCorpus {
        key_points: key_points.items,
        entities: entities.items,
        facts: facts.items,
        summaries,
        word_count,
    }
}

impl AggregatedCorpus {
    pub fn is_empty(&self) -> bool {
        self.key_points.is_empty() && self.entities.is_empty() && self.facts.is_empty() && self.summaries.is_empty()
    }

    /// Plain-text view handed to the writer
    ///
    /// Sections appear in a fixed order and are left out when empty.
    pub fn render(&self) -> String {
        let mut out = String::new();

        for (heading, items) in [
            ("SECTION SUMMARIES:", &self.summaries),
            ("KEY POINTS:", &self.key_points),
            ("FACTS:", &self.facts),
        ] {
            if items.is_empty() {
                continue;
            }
            out.push_str(heading);
            out.push('\n');
            for item in items {
                out.push_str("- ");
                out.push_str(item);
                out.push('\n');
            }
            out.push('\n');
        }

        if !self.entities.is_empty() {
            out.push_str("KEY ENTITIES: ");
            out.push_str(&self.entities.join(", "));
            out.push('\n');
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ext(chunk_id: usize, key_points: &[&str], entities: &[&str], facts: &[&str], summary: &str) -> Extraction {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        Extraction {
            chunk_id,
            key_points: owned(key_points),
            entities: owned(entities),
            facts: owned(facts),
            summary: summary.to_string(),
        }
    }

    #[test]
    fn test_dedup_is_case_and_whitespace_insensitive() {
        let corpus = aggregate(&[
            ext(0, &["Revenue grew 10%"], &[], &[], ""),
            ext(1, &["revenue grew 10%  "], &[], &[], ""),
        ]);
        assert_eq!(corpus.key_points, vec!["Revenue grew 10%"]);
    }

    #[test]
    fn test_categories_dedup_independently() {
        let corpus = aggregate(&[ext(0, &["Acme"], &["Acme", " acme "], &["Acme"], "")]);
        assert_eq!(corpus.key_points, vec!["Acme"]);
        assert_eq!(corpus.entities, vec!["Acme"]);
        assert_eq!(corpus.facts, vec!["Acme"]);
    }

    #[test]
    fn test_blank_entries_and_summaries_skipped() {
        let corpus = aggregate(&[ext(0, &["", "  "], &[""], &[], "   "), ext(1, &[], &[], &[], "Real summary.")]);
        assert!(corpus.key_points.is_empty());
        assert!(corpus.entities.is_empty());
        assert_eq!(corpus.summaries, vec!["Real summary."]);
    }

    #[test]
    fn test_word_count_covers_key_points_and_summaries() {
        let corpus = aggregate(&[ext(0, &["one two"], &["not counted"], &["nor this"], "three four five")]);
        assert_eq!(corpus.word_count, 5);
    }

    #[test]
    fn test_empty_input_is_empty_corpus() {
        let corpus = aggregate(&[]);
        assert!(corpus.is_empty());
        assert_eq!(corpus.render(), "");
    }

    #[test]
    fn test_render_layout() {
        let corpus = aggregate(&[ext(0, &["kp1", "kp2"], &["Acme", "Bob"], &["f1"], "sum1")]);
        let expected = "SECTION SUMMARIES:\n- sum1\n\nKEY POINTS:\n- kp1\n- kp2\n\nFACTS:\n- f1\n\nKEY ENTITIES: Acme, Bob\n";
        assert_eq!(corpus.render(), expected);
    }

    #[test]
    fn test_render_omits_empty_sections() {
        let corpus = aggregate(&[ext(0, &["only point"], &[], &[], "")]);
        assert_eq!(corpus.render(), "KEY POINTS:\n- only point\n\n");
    }

    fn normalized(items: &[String]) -> HashSet<String> {
        items.iter().map(|s| s.trim().to_lowercase()).collect()
    }

    proptest! {
        #[test]
        fn prop_retained_set_is_order_insensitive(
            points in prop::collection::vec("[A-Ca-c ]{0,6}", 0..20)
        ) {
            let forward: Vec<Extraction> = points
                .iter()
                .enumerate()
                .map(|(i, p)| ext(i, &[p.as_str()], &[], &[], ""))
                .collect();
            let mut backward = forward.clone();
            backward.reverse();

            let a = aggregate(&forward);
            let b = aggregate(&backward);
            prop_assert_eq!(normalized(&a.key_points), normalized(&b.key_points));
            prop_assert_eq!(a.key_points.len(), b.key_points.len());
        }

        #[test]
        fn prop_no_case_insensitive_duplicates(
            points in prop::collection::vec("[A-Ca-c ]{0,6}", 0..20)
        ) {
            let refs: Vec<&str> = points.iter().map(String::as_str).collect();
            let corpus = aggregate(&[ext(0, &refs, &refs, &refs, "")]);
            for list in [&corpus.key_points, &corpus.entities, &corpus.facts] {
                prop_assert_eq!(normalized(list).len(), list.len());
            }
        }
    }
}
