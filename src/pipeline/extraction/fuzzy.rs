//! Normalized string similarity for OCR-garbled medicine names.
//!
//! Similarity is `1 - levenshtein / max_len`, in 0.0..=1.0. Comparisons are
//! case-insensitive; callers pass lowercase vocabulary entries.

/// Normalized similarity between two strings (case-insensitive).
pub fn similarity(a: &str, b: &str) -> f32 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - edit_distance(&a, &b) as f32 / longest as f32
}

/// Best vocabulary entry for `word` at or above `threshold`.
///
/// Returns the entry index and its similarity. Ties keep the earlier entry,
/// so results follow vocabulary order.
pub fn best_match<'a, I>(word: &str, entries: I, threshold: f32) -> Option<(usize, f32)>
where
    I: IntoIterator<Item = &'a str>,
{
    let lower = word.to_lowercase();
    let word_len = lower.chars().count();
    let mut best: Option<(usize, f32)> = None;

    for (idx, entry) in entries.into_iter().enumerate() {
        // Length filter: a length gap alone can push the ratio under threshold
        let entry_len = entry.chars().count();
        let longest = word_len.max(entry_len);
        if longest == 0 {
            continue;
        }
        let ceiling = 1.0 - word_len.abs_diff(entry_len) as f32 / longest as f32;
        if ceiling < threshold {
            continue;
        }

        let score = similarity(&lower, entry);
        if score >= threshold && best.map_or(true, |(_, s)| score > s) {
            best = Some((idx, score));
        }
    }

    best
}

/// Compute Levenshtein edit distance between two strings.
pub fn edit_distance(a: &str, b: &str) -> u32 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let m = a_chars.len();
    let n = b_chars.len();

    if m == 0 { return n as u32; }
    if n == 0 { return m as u32; }

    let mut prev: Vec<u32> = (0..=n as u32).collect();
    let mut curr = vec![0u32; n + 1];

    for (i, &a_ch) in a_chars.iter().enumerate() {
        curr[0] = (i + 1) as u32;
        for (j, &b_ch) in b_chars.iter().enumerate() {
            let cost = if a_ch == b_ch { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1)
                .min(curr[j] + 1)
                .min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}
