//! Medicine vocabulary and the word lists that keep boilerplate out of
//! candidate matching.
//!
//! The vocabulary is configuration, not code: callers can pass their own
//! formulary. [`Vocabulary::default`] carries a built-in list of common
//! outpatient medicines.

use std::collections::HashSet;

/// Built-in medicine names (lowercase, generic names).
pub const DEFAULT_MEDICINES: &[&str] = &[
    "aspirin", "metformin", "amoxicillin", "lisinopril", "ibuprofen", "atorvastatin",
    "omeprazole", "amlodipine", "metoprolol", "losartan", "simvastatin", "levothyroxine",
    "azithromycin", "hydrochlorothiazide", "gabapentin", "sertraline", "tramadol",
    "acetaminophen", "paracetamol", "ciprofloxacin", "prednisone", "cetirizine",
    "montelukast", "pantoprazole", "ranitidine", "diclofenac", "naproxen",
    "clopidogrel", "warfarin", "insulin", "glimepiride", "pioglitazone",
    "rosuvastatin", "telmisartan", "enalapril", "furosemide", "spironolactone",
    "doxycycline", "cephalexin", "clindamycin", "fluconazole", "acyclovir",
    "salbutamol", "albuterol", "budesonide", "fluticasone", "prednisolone",
    "hydroxychloroquine", "esomeprazole", "rabeprazole", "domperidone",
    "ondansetron", "metoclopramide", "loperamide", "bisoprolol", "carvedilol",
    "valsartan", "ramipril", "diltiazem", "nifedipine", "ceftriaxone",
    "levofloxacin", "moxifloxacin", "clarithromycin", "erythromycin",
    "phenytoin", "carbamazepine", "valproate", "levetiracetam", "topiramate",
    "duloxetine", "venlafaxine", "escitalopram", "fluoxetine", "paroxetine",
    "alprazolam", "lorazepam", "diazepam", "clonazepam", "zolpidem",
];

/// Capitalized words that appear on every prescription form and are never
/// medicine names.
pub const DEFAULT_BOILERPLATE: &[&str] = &[
    "patient", "doctor", "hospital", "clinic", "medical", "prescription",
    "pharmacy", "address", "phone", "email", "date", "signature", "name",
    "license", "number", "registration", "diagnosis", "history", "weight",
    "gender", "female", "male", "years", "refill", "refills", "dispense",
    "instructions", "morning", "evening", "night", "after", "before", "meals",
    "tablet", "tablets", "capsule", "capsules", "daily", "twice", "times",
    "every", "hours", "days", "weeks", "months", "total", "quantity", "street",
    "road", "city", "state", "consultant", "physician", "surgeon", "specialist",
    "department", "private", "limited", "center", "centre", "health", "care",
    "healthcare", "follow", "review", "advice", "notes", "sunday", "monday",
    "tuesday", "wednesday", "thursday", "friday", "saturday", "january",
    "february", "march", "april", "june", "july", "august", "september",
    "october", "november", "december",
];

/// Common English words that happen to end in a drug-nomenclature suffix.
pub const DEFAULT_SUFFIX_DENYLIST: &[&str] = &[
    "medicine", "routine", "online", "machine", "examine", "determine",
    "urine", "vaccine", "cuisine", "engine", "imagine", "discipline",
    "protein", "within", "again", "begin", "certain", "maintain", "obtain",
    "contain", "explain", "remain",
    "alcohol", "control", "protocol", "patrol", "cholesterol",
    "someone", "everyone", "anyone", "phone", "alone", "done", "none",
    "inside", "outside", "provide", "decide", "beside", "guide", "aside",
    "separate", "immediate", "appropriate", "certificate", "duplicate",
    "private", "estimate", "moderate", "adequate",
    "cabin", "margin", "origin", "violin", "latin",
];

/// A medicine formulary plus the denylists used by the candidate finder.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    /// Lowercase, trimmed, de-duplicated, in caller order.
    medicines: Vec<String>,
    /// Same entries with all whitespace removed.
    collapsed: Vec<String>,
    boilerplate: HashSet<String>,
    suffix_denylist: HashSet<String>,
}

impl Vocabulary {
    /// Build from medicine names with the default denylists.
    /// Blank names are ignored and duplicates collapse case-insensitively.
    pub fn new<I, S>(medicines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let medicines: Vec<String> = medicines
            .into_iter()
            .map(|m| m.as_ref().trim().to_lowercase())
            .filter(|m| !m.is_empty() && seen.insert(m.clone()))
            .collect();
        let collapsed = medicines
            .iter()
            .map(|m| m.chars().filter(|c| !c.is_whitespace()).collect())
            .collect();

        Self {
            medicines,
            collapsed,
            boilerplate: to_set(DEFAULT_BOILERPLATE),
            suffix_denylist: to_set(DEFAULT_SUFFIX_DENYLIST),
        }
    }

    /// Replace the boilerplate denylist.
    pub fn with_boilerplate<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.boilerplate = to_set(words);
        self
    }

    /// Extend the suffix denylist.
    pub fn with_suffix_denylist<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.suffix_denylist.extend(to_set(words));
        self
    }

    pub fn medicines(&self) -> &[String] {
        &self.medicines
    }

    pub(crate) fn collapsed(&self) -> &[String] {
        &self.collapsed
    }

    pub fn len(&self) -> usize {
        self.medicines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.medicines.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        let lower = name.trim().to_lowercase();
        self.medicines.iter().any(|m| *m == lower)
    }

    pub fn is_boilerplate(&self, word: &str) -> bool {
        self.boilerplate.contains(&word.to_lowercase())
    }

    pub fn is_suffix_denied(&self, word: &str) -> bool {
        self.suffix_denylist.contains(&word.to_lowercase())
    }

    /// Display form of entry `idx`: first letter of each word upper-cased.
    pub fn display_name(&self, idx: usize) -> Option<String> {
        self.medicines.get(idx).map(|m| capitalize_words(m))
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new(DEFAULT_MEDICINES.iter().copied())
    }
}

fn to_set<I, S>(words: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    words
        .into_iter()
        .map(|w| w.as_ref().trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// "insulin glargine" -> "Insulin Glargine", "AMOXICILLIN" -> "Amoxicillin".
pub fn capitalize_words(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_vocabulary_has_common_medicines() {
        let vocab = Vocabulary::default();
        assert!(vocab.contains("Metformin"));
        assert!(vocab.contains("amoxicillin"));
        assert!(!vocab.contains("patient"));
        assert_eq!(vocab.len(), DEFAULT_MEDICINES.len());
    }

    #[test]
    fn custom_vocabulary_normalizes_and_dedups() {
        let vocab = Vocabulary::new(["  Aspirin ", "ASPIRIN", "", "Insulin Glargine"]);
        assert_eq!(vocab.medicines(), &["aspirin", "insulin glargine"]);
        assert_eq!(vocab.collapsed()[1], "insulinglargine");
    }

    #[test]
    fn display_name_capitalizes_each_word() {
        let vocab = Vocabulary::new(["insulin glargine"]);
        assert_eq!(vocab.display_name(0).as_deref(), Some("Insulin Glargine"));
        assert_eq!(vocab.display_name(5), None);
    }

    #[test]
    fn boilerplate_is_case_insensitive() {
        let vocab = Vocabulary::default();
        assert!(vocab.is_boilerplate("Prescription"));
        assert!(vocab.is_boilerplate("PATIENT"));
        assert!(!vocab.is_boilerplate("Zolpidem"));
    }

    #[test]
    fn boilerplate_can_be_replaced() {
        let vocab = Vocabulary::default().with_boilerplate(["Ward"]);
        assert!(vocab.is_boilerplate("ward"));
        assert!(!vocab.is_boilerplate("patient"));
    }

    #[test]
    fn suffix_denylist_extends() {
        let vocab = Vocabulary::default().with_suffix_denylist(["Robin"]);
        assert!(vocab.is_suffix_denied("medicine"));
        assert!(vocab.is_suffix_denied("robin"));
    }

    #[test]
    fn capitalize_handles_upper_input() {
        assert_eq!(capitalize_words("AMOXICILLIN"), "Amoxicillin");
    }
}
