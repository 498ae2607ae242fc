//! Medicine candidate finder.
//!
//! Five strategies run in priority order over the transcript. A later
//! strategy never re-adds a vocabulary entry an earlier one found. The last
//! resort only runs when nothing else matched: the word after a label
//! ("Rx:", "Tab", "take"), else the first long capitalized word.
//!
//! Matching works on an ASCII-lowercased copy of the text so byte offsets
//! stay valid in the original.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::fuzzy::best_match;
use super::types::{MatchStrategy, MedicineCandidate};
use super::vocabulary::{capitalize_words, Vocabulary};
use crate::config::MatchThresholds;

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z]+").unwrap());

/// Words ending in a drug-nomenclature suffix.
static SUFFIX_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b([a-z]{2,}(?:statin|cillin|azole|pril|sartan|olol|ilol|mycin|micin|oxacin|cycline|dipine|tidine|vir|zepam|zolam|triptan|profen|formin|gliptin|glitazone|lukast|semide|thiazide|oxetine|pramine|sone|solone|mab|nib|ine|in|ol|ide|ate|one))\b",
    )
    .unwrap()
});

/// A prescription label followed by the word it introduces. Repeated labels
/// ("Rx: Tab. X") are consumed together. Generic labels ("medicine",
/// "take") need a colon or dash so running prose does not match.
static LABELLED_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:(?:\b(?:rx|tablets?|tabs?|capsules?|caps?)\b|\br/)[\s.:/-]*|\b(?:medicine|medication|drug|med|name|prescribed|prescribe|take)\s*[:-][\s.:/-]*)+([a-z]{3,})\b",
    )
    .unwrap()
});

/// Words a label is often followed by that are never a medicine name.
const LABEL_SKIP_WORDS: &[&str] = &[
    "the", "for", "take", "with", "food", "water", "daily", "twice", "once", "oral", "patient",
    "doctor", "date", "name", "tab", "tabs", "tablet", "tablets", "cap", "caps", "capsule",
    "capsules", "medicine", "medication", "drug",
];

static CAPITALIZED_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][A-Za-z]+\b").unwrap());

/// Endings specific enough to drug names that an unverified hit is still
/// worth reporting. The generic endings (-ine, -in, -ol, ...) need a
/// vocabulary match.
const DRUG_CLASS_SUFFIXES: &[&str] = &[
    "statin", "cillin", "azole", "pril", "sartan", "olol", "ilol", "mycin", "micin",
    "oxacin", "cycline", "dipine", "tidine", "vir", "zepam", "zolam", "triptan",
    "profen", "formin", "gliptin", "glitazone", "lukast", "semide", "thiazide",
    "oxetine", "pramine", "mab", "nib",
];

/// Find every medicine named in `text`, ordered by position.
pub fn find_candidates(
    text: &str,
    vocabulary: &Vocabulary,
    thresholds: &MatchThresholds,
) -> Vec<MedicineCandidate> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let lower = text.to_ascii_lowercase();
    let mut found = CandidateSet::default();

    find_exact(&lower, vocabulary, &mut found);
    find_space_collapsed(&lower, vocabulary, &mut found);
    find_fuzzy_tokens(text, vocabulary, thresholds, &mut found);
    find_suffix_words(text, vocabulary, thresholds, &mut found);
    if found.is_empty() {
        find_labelled_word(text, vocabulary, thresholds, &mut found);
    }
    if found.is_empty() {
        find_capitalized_word(text, vocabulary, thresholds, &mut found);
    }

    let mut candidates = found.into_vec();
    candidates.sort_by_key(|c| c.position);

    debug!(
        count = candidates.len(),
        names = ?candidates.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        "Medicine candidates found"
    );
    candidates
}

// ── 1. exact substring ────────────────────────────────────

fn find_exact(lower: &str, vocabulary: &Vocabulary, found: &mut CandidateSet) {
    for (idx, entry) in vocabulary.medicines().iter().enumerate() {
        if let Some(pos) = lower.find(entry.as_str()) {
            found.push_entry(idx, vocabulary, pos, MatchStrategy::Exact);
        }
    }
}

// ── 2. whitespace-collapsed ───────────────────────────────

fn find_space_collapsed(lower: &str, vocabulary: &Vocabulary, found: &mut CandidateSet) {
    // Collapsed byte index -> original byte index
    let mut collapsed = String::with_capacity(lower.len());
    let mut offsets = Vec::with_capacity(lower.len());
    for (pos, ch) in lower.char_indices() {
        if ch.is_whitespace() {
            continue;
        }
        collapsed.push(ch);
        offsets.extend(std::iter::repeat(pos).take(ch.len_utf8()));
    }

    for (idx, entry) in vocabulary.collapsed().iter().enumerate() {
        if found.has_entry(idx) || entry.is_empty() {
            continue;
        }
        if let Some(at) = collapsed.find(entry.as_str()) {
            if let Some(&pos) = offsets.get(at) {
                found.push_entry(idx, vocabulary, pos, MatchStrategy::SpaceCollapsed);
            }
        }
    }
}

// ── 3. fuzzy words and word pairs ─────────────────────────

fn find_fuzzy_tokens(
    text: &str,
    vocabulary: &Vocabulary,
    thresholds: &MatchThresholds,
    found: &mut CandidateSet,
) {
    let words: Vec<(usize, usize)> = WORD.find_iter(text).map(|m| (m.start(), m.end())).collect();

    let mut probes: Vec<(usize, String)> = Vec::new();
    for (i, &(start, end)) in words.iter().enumerate() {
        let word = &text[start..end];
        if word.len() >= thresholds.min_token_len {
            probes.push((start, word.to_string()));
        }
        if let Some(&(next_start, next_end)) = words.get(i + 1) {
            let gap = &text[end..next_start];
            if !gap.is_empty() && gap.chars().all(char::is_whitespace) {
                let next = &text[next_start..next_end];
                probes.push((start, format!("{word}{next}")));
                probes.push((start, format!("{word} {next}")));
            }
        }
    }

    let entries = vocabulary.medicines();
    for (pos, probe) in probes {
        if let Some((idx, score)) =
            best_match(&probe, entries.iter().map(String::as_str), thresholds.token)
        {
            // Best entry already claimed: this word is that medicine, not another
            if found.has_entry(idx) {
                continue;
            }
            debug!(probe = %probe, score, "Fuzzy token match");
            found.push_entry(idx, vocabulary, pos, MatchStrategy::FuzzyToken);
        }
    }
}

// ── 4. drug-name suffixes ─────────────────────────────────

fn find_suffix_words(
    text: &str,
    vocabulary: &Vocabulary,
    thresholds: &MatchThresholds,
    found: &mut CandidateSet,
) {
    let entries = vocabulary.medicines();
    for m in SUFFIX_WORD.find_iter(text) {
        let word = m.as_str();
        if vocabulary.is_suffix_denied(word) || vocabulary.is_boilerplate(word) {
            continue;
        }

        match best_match(word, entries.iter().map(String::as_str), thresholds.suffix) {
            Some((idx, _)) if found.has_entry(idx) => {}
            Some((idx, _)) => {
                found.push_entry(idx, vocabulary, m.start(), MatchStrategy::SuffixHeuristic);
            }
            None if has_drug_class_suffix(word) => {
                found.push_unverified(word, m.start(), MatchStrategy::SuffixHeuristic);
            }
            None => {}
        }
    }
}

fn has_drug_class_suffix(word: &str) -> bool {
    let lower = word.to_ascii_lowercase();
    // A bare suffix ("statin" in "Ator va statin") is a fragment, not a name
    DRUG_CLASS_SUFFIXES
        .iter()
        .any(|s| lower.len() >= s.len() + 3 && lower.ends_with(s))
}

// ── 5. last resort: labelled or capitalized word ──────────

fn find_labelled_word(
    text: &str,
    vocabulary: &Vocabulary,
    thresholds: &MatchThresholds,
    found: &mut CandidateSet,
) {
    let first = LABELLED_WORD
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find(|m| {
            let word = m.as_str();
            !LABEL_SKIP_WORDS.contains(&word.to_ascii_lowercase().as_str())
                && !vocabulary.is_boilerplate(word)
                && !vocabulary.is_suffix_denied(word)
        });

    if let Some(m) = first {
        push_last_resort(
            m.as_str(),
            m.start(),
            vocabulary,
            thresholds,
            MatchStrategy::LabelAnchored,
            found,
        );
    }
}

fn find_capitalized_word(
    text: &str,
    vocabulary: &Vocabulary,
    thresholds: &MatchThresholds,
    found: &mut CandidateSet,
) {
    let first = CAPITALIZED_WORD.find_iter(text).find(|m| {
        let word = m.as_str();
        word.chars().count() >= thresholds.min_capitalized_len
            && !vocabulary.is_boilerplate(word)
            && !vocabulary.is_suffix_denied(word)
    });

    if let Some(m) = first {
        push_last_resort(
            m.as_str(),
            m.start(),
            vocabulary,
            thresholds,
            MatchStrategy::CapitalizedWord,
            found,
        );
    }
}

/// Vocabulary spelling when the word is close to an entry, else the word.
fn push_last_resort(
    word: &str,
    position: usize,
    vocabulary: &Vocabulary,
    thresholds: &MatchThresholds,
    strategy: MatchStrategy,
    found: &mut CandidateSet,
) {
    let entries = vocabulary.medicines();
    match best_match(word, entries.iter().map(String::as_str), thresholds.token) {
        Some((idx, _)) => found.push_entry(idx, vocabulary, position, strategy),
        None => found.push_unverified(word, position, strategy),
    }
}

// ── accumulator ───────────────────────────────────────────

/// Candidates found so far, de-duplicated by vocabulary entry and by
/// case-insensitive name.
#[derive(Default)]
struct CandidateSet {
    candidates: Vec<MedicineCandidate>,
    entries: HashSet<usize>,
    names: HashSet<String>,
}

impl CandidateSet {
    fn has_entry(&self, idx: usize) -> bool {
        self.entries.contains(&idx)
    }

    fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    fn push_entry(
        &mut self,
        idx: usize,
        vocabulary: &Vocabulary,
        position: usize,
        strategy: MatchStrategy,
    ) {
        let Some(name) = vocabulary.display_name(idx) else {
            return;
        };
        if !self.entries.insert(idx) || !self.names.insert(name.to_lowercase()) {
            return;
        }
        self.candidates.push(MedicineCandidate {
            name,
            position,
            strategy,
            verified: true,
        });
    }

    fn push_unverified(&mut self, word: &str, position: usize, strategy: MatchStrategy) {
        let name = capitalize_words(word);
        if !self.names.insert(name.to_lowercase()) {
            return;
        }
        self.candidates.push(MedicineCandidate {
            name,
            position,
            strategy,
            verified: false,
        });
    }

    fn into_vec(self) -> Vec<MedicineCandidate> {
        self.candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(text: &str) -> Vec<MedicineCandidate> {
        find_candidates(text, &Vocabulary::default(), &MatchThresholds::default())
    }

    fn names(candidates: &[MedicineCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn empty_text_has_no_candidates() {
        assert!(find("").is_empty());
        assert!(find("   \n ").is_empty());
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        let c = find("Take AMOXICILLIN 500mg twice daily for 7 days oral");
        assert_eq!(names(&c), vec!["Amoxicillin"]);
        assert_eq!(c[0].strategy, MatchStrategy::Exact);
        assert_eq!(c[0].position, 5);
        assert!(c[0].verified);
    }

    #[test]
    fn split_name_found_by_collapsing_spaces() {
        let c = find("Met formin 850 mg twice daily");
        assert_eq!(names(&c), vec!["Metformin"]);
        assert_eq!(c[0].strategy, MatchStrategy::SpaceCollapsed);
        assert_eq!(c[0].position, 0);
    }

    #[test]
    fn collapsed_position_maps_back_to_original() {
        let text = "Rx:  Ator va statin 20mg";
        let c = find(text);
        assert_eq!(names(&c), vec!["Atorvastatin"]);
        assert_eq!(&text[c[0].position..c[0].position + 4], "Ator");
    }

    #[test]
    fn garbled_name_found_by_fuzzy_token() {
        let c = find("Arnoxicillin 250mg three times daily");
        assert_eq!(names(&c), vec!["Amoxicillin"]);
        assert_eq!(c[0].strategy, MatchStrategy::FuzzyToken);
    }

    #[test]
    fn exact_and_fuzzy_names_both_returned() {
        let c = find("Amoxicillin 500mg twice daily. Metfornin 850mg once daily");
        assert_eq!(names(&c), vec!["Amoxicillin", "Metformin"]);
        assert_eq!(c[0].strategy, MatchStrategy::Exact);
        assert_eq!(c[1].strategy, MatchStrategy::FuzzyToken);
    }

    #[test]
    fn unknown_drug_class_suffix_reported_unverified() {
        let c = find("Tab Oseltamivir 75mg twice daily");
        assert_eq!(names(&c), vec!["Oseltamivir"]);
        assert_eq!(c[0].strategy, MatchStrategy::SuffixHeuristic);
        assert!(!c[0].verified);
    }

    #[test]
    fn suffix_word_corrected_at_looser_threshold() {
        // 0.7 similarity: below the token threshold, above the suffix one
        let c = find("Anladlpine 5mg once daily");
        assert_eq!(names(&c), vec!["Amlodipine"]);
        assert_eq!(c[0].strategy, MatchStrategy::SuffixHeuristic);
        assert!(c[0].verified);
    }

    #[test]
    fn suffix_denylist_blocks_common_words() {
        let c = find("routine medicine review");
        assert!(c.is_empty(), "got {:?}", names(&c));
    }

    #[test]
    fn generic_suffix_without_vocabulary_match_ignored() {
        // "Martin" ends in -in but is nowhere near a vocabulary entry
        let c = find("Dr Martin, Zolpidem 10mg at bedtime");
        assert_eq!(names(&c), vec!["Zolpidem"]);
    }

    #[test]
    fn capitalized_word_is_last_resort() {
        let c = find("Patient: John\nPrescription\nKetorolac 10mg");
        assert_eq!(names(&c), vec!["Ketorolac"]);
        assert_eq!(c[0].strategy, MatchStrategy::CapitalizedWord);
        assert!(!c[0].verified);
    }

    #[test]
    fn labelled_word_preferred_over_capitalized() {
        let c = find("Dr Hartley\nRx: Tab. Zentrix 10mg od");
        assert_eq!(names(&c), vec!["Zentrix"]);
        assert_eq!(c[0].strategy, MatchStrategy::LabelAnchored);
        assert!(!c[0].verified);
    }

    #[test]
    fn labelled_word_found_in_lowercase_text() {
        let c = find("rx zentrix 10 mg once daily");
        assert_eq!(names(&c), vec!["Zentrix"]);
        assert_eq!(c[0].position, 3);
    }

    #[test]
    fn label_followed_by_filler_is_skipped() {
        let c = find("medicine: take with food");
        assert!(c.is_empty(), "got {:?}", names(&c));
    }

    #[test]
    fn capitalized_word_skipped_when_vocabulary_matched() {
        let c = find("Ketorolac and Aspirin");
        assert_eq!(names(&c), vec!["Aspirin"]);
    }

    #[test]
    fn boilerplate_only_text_yields_nothing() {
        assert!(find("Patient Doctor Hospital Signature").is_empty());
    }

    #[test]
    fn repeated_name_reported_once() {
        let c = find("Aspirin 75mg. aspirin daily. ASPIRIN");
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].position, 0);
    }

    #[test]
    fn output_is_ordered_by_position() {
        let c = find("Zolpidem 10mg at night, then Aspirin 75mg daily");
        assert_eq!(names(&c), vec!["Zolpidem", "Aspirin"]);
    }

    #[test]
    fn deterministic_across_runs() {
        let text = "Metfornin 500mg, Amoxicilin 250mg, Lisinopril 10mg";
        assert_eq!(find(text), find(text));
    }

    #[test]
    fn custom_vocabulary_is_honoured() {
        let vocab = Vocabulary::new(["ketorolac"]);
        let c = find_candidates("ketorolac 10 mg", &vocab, &MatchThresholds::default());
        assert_eq!(names(&c), vec!["Ketorolac"]);
        assert_eq!(c[0].strategy, MatchStrategy::Exact);
    }
}
