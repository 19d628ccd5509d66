//! Person-aware query classification.
//!
//! Embedding models handle proper nouns poorly, so queries that mention a
//! person get a BM25-specific variant containing only the detected name
//! tokens, and the orchestrator boosts the BM25 list during fusion.
//!
//! The stopword table is data, not code: the built-in set covers common
//! English words, meeting vocabulary, tech acronyms, and month/weekday
//! names, and deployments extend it through `[search] extra_stopwords`.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Words never treated as person names, lowercased.
const DEFAULT_STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "were", "been", "be", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "must", "shall", "can", "need",
    "dare", "ought", "used", "what", "who", "which", "when", "where", "why", "how", "all", "each",
    "every", "both", "few", "more", "most", "other", "some", "such", "no", "nor", "not", "only",
    "own", "same", "so", "than", "too", "very", "just", "also", "now", "here", "there", "then",
    "once", "about", "after", "before", "between", "into", "through", "during", "above", "below",
    // Meeting vocabulary
    "meeting", "meetings", "one-on-one", "1:1", "prep", "prepare", "notes", "summary", "action",
    "items", "discussion", "talked", "discussed", "said", "mentioned", "topic", "topics",
    "project", "team", "work", "update", "weekly", "daily", "monthly", "review", "feedback",
    "performance", "highlights", "overview", "report", "analysis",
    // Tech acronyms that show up capitalized
    "api", "ui", "ux", "sql", "aws", "gcp", "pr", "ci", "cd",
    // Month names
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december", "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep",
    "sept", "oct", "nov", "dec",
    // Weekday names
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday", "mon", "tue",
    "wed", "thu", "fri", "sat", "sun",
];

fn intent_res() -> &'static Vec<Regex> {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"\b1:1\b",
            r"\bone[- ]on[- ]one\b",
            r"\bmeeting with\b",
            r"\bprep for\b",
            r"\bprepare for\b",
            r"\bcatch up with\b",
            r"\bsync with\b",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

/// What the classifier learned about a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryProfile {
    /// Candidate person names, in query order, deduplicated.
    pub people: Vec<String>,
    pub person_intent: bool,
    /// Name-only query to use for BM25 in place of the full query.
    pub bm25_query: Option<String>,
}

pub struct QueryClassifier {
    stopwords: HashSet<String>,
}

impl QueryClassifier {
    pub fn new(extra_stopwords: &[String]) -> Self {
        let mut stopwords: HashSet<String> =
            DEFAULT_STOPWORDS.iter().map(|w| w.to_string()).collect();
        stopwords.extend(extra_stopwords.iter().map(|w| w.to_lowercase()));
        Self { stopwords }
    }

    /// Candidate person tokens: capitalized, not all-caps (acronyms), not a
    /// stopword. A sentence-initial token additionally must look name-shaped
    /// (at most 15 chars, digit-free).
    pub fn detect_people(&self, query: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut people = Vec::new();

        for (i, word) in query.split_whitespace().enumerate() {
            let clean: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
            if clean.is_empty() {
                continue;
            }

            let first_upper = clean.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);
            let all_upper = clean.chars().all(|c| !c.is_alphabetic() || c.is_uppercase());
            if !first_upper || all_upper {
                continue;
            }
            if self.stopwords.contains(&clean.to_lowercase()) {
                continue;
            }
            if i == 0 && (clean.chars().count() > 15 || clean.chars().any(|c| c.is_ascii_digit())) {
                continue;
            }

            if seen.insert(clean.clone()) {
                people.push(clean);
            }
        }

        people
    }

    pub fn person_intent(&self, query: &str) -> bool {
        let lower = query.to_lowercase();
        if intent_res().iter().any(|re| re.is_match(&lower)) {
            return true;
        }
        !self.detect_people(query).is_empty()
    }

    pub fn classify(&self, query: &str) -> QueryProfile {
        let people = self.detect_people(query);
        let lower = query.to_lowercase();
        let person_intent =
            !people.is_empty() || intent_res().iter().any(|re| re.is_match(&lower));

        let bm25_query = if person_intent && !people.is_empty() {
            Some(people.join(" "))
        } else {
            None
        };

        QueryProfile {
            people,
            person_intent,
            bm25_query,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> QueryClassifier {
        QueryClassifier::new(&[])
    }

    #[test]
    fn detects_name_after_intent_phrase() {
        let profile = classifier().classify("one-on-one with Nikhil");
        assert!(profile.person_intent);
        assert_eq!(profile.people, vec!["Nikhil"]);
        assert_eq!(profile.bm25_query.as_deref(), Some("Nikhil"));
    }

    #[test]
    fn acronyms_are_not_names() {
        let c = classifier();
        assert!(c.detect_people("API design review").is_empty());
        assert!(c.detect_people("migrating to AWS").is_empty());
    }

    #[test]
    fn common_words_are_not_names() {
        let c = classifier();
        assert!(c.detect_people("Meeting notes from the Weekly review").is_empty());
        assert!(c.detect_people("January highlights").is_empty());
    }

    #[test]
    fn sentence_initial_name_requires_shape() {
        let c = classifier();
        // Short, digit-free leading token passes the shape check.
        assert_eq!(c.detect_people("Priya feedback discussion"), vec!["Priya"]);
        // Overlong leading token does not.
        assert!(c
            .detect_people("Antidisestablishmentarian topics")
            .is_empty());
        assert!(c.detect_people("Q32026 planning").is_empty());
    }

    #[test]
    fn intent_without_names() {
        let c = classifier();
        let profile = c.classify("prep for my 1:1 tomorrow");
        assert!(profile.person_intent);
        assert!(profile.people.is_empty());
        assert!(profile.bm25_query.is_none());
    }

    #[test]
    fn no_intent_for_plain_topics() {
        let profile = classifier().classify("database migration plan");
        assert!(!profile.person_intent);
        assert!(profile.bm25_query.is_none());
    }

    #[test]
    fn multiple_names_joined_in_order() {
        let profile = classifier().classify("sync with Nikhil and Arnab");
        assert_eq!(profile.bm25_query.as_deref(), Some("Nikhil Arnab"));
    }

    #[test]
    fn extra_stopwords_extend_the_table() {
        let c = QueryClassifier::new(&["Kanban".to_string()]);
        assert!(c.detect_people("our Kanban board").is_empty());
    }

    #[test]
    fn punctuation_stripped_before_checks() {
        let profile = classifier().classify("meeting with Nikhil, about rollout");
        assert_eq!(profile.people, vec!["Nikhil"]);
    }
}
