/// Sanitize raw OCR output before scoring and matching.
/// Strips control characters (Tesseract ends pages with a form feed) and
/// stray glyph noise, keeps prescription punctuation, drops blank lines.
pub fn sanitize_ocr_text(raw: &str) -> String {
    expand_glyphs(raw)
        .chars()
        .filter(|c| {
            c.is_alphanumeric()
                || *c == ' '
                || *c == '\n'
                || *c == '\t'
                || matches!(
                    c,
                    '.' | ','
                        | ';'
                        | ':'
                        | '-'
                        | '/'
                        | '('
                        | ')'
                        | '+'
                        | '%'
                        | '#'
                        | '&'
                        | '\''
                        | '*'
                        | 'µ'
                )
        })
        .collect::<String>()
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ligatures and look-alikes Tesseract emits on scanned print.
fn expand_glyphs(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\u{FB00}' => out.push_str("ff"),
            '\u{FB01}' => out.push_str("fi"),
            '\u{FB02}' => out.push_str("fl"),
            '\u{FB03}' => out.push_str("ffi"),
            '\u{FB04}' => out.push_str("ffl"),
            '\u{2018}' | '\u{2019}' | '`' => out.push('\''),
            '\u{2013}' | '\u{2014}' => out.push('-'),
            '\u{00D7}' => out.push('x'),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_form_feed_and_controls() {
        let raw = "Amoxicillin 500mg\x0c\x00\x01";
        assert_eq!(sanitize_ocr_text(raw), "Amoxicillin 500mg");
    }

    #[test]
    fn preserves_prescription_punctuation() {
        let raw = "Tab. Metformin 500 mg, 1-0-1 (after food) 0.5%";
        let clean = sanitize_ocr_text(raw);
        assert_eq!(clean, raw);
    }

    #[test]
    fn collapses_blank_lines_and_inner_spaces() {
        let raw = "Line   one\n\n\n  Line two  \n\n";
        assert_eq!(sanitize_ocr_text(raw), "Line one\nLine two");
    }

    #[test]
    fn drops_glyph_noise() {
        let raw = "~~ Aspirin | 75mg ^^";
        assert_eq!(sanitize_ocr_text(raw), "Aspirin 75mg");
    }

    #[test]
    fn normalizes_lookalike_punctuation() {
        assert_eq!(sanitize_ocr_text("1\u{2013}0\u{2013}1"), "1-0-1");
        assert_eq!(sanitize_ocr_text("2 \u{00D7} day"), "2 x day");
    }

    #[test]
    fn ligatures_expand_to_letter_pairs() {
        assert_eq!(sanitize_ocr_text("Ce\u{FB01}xime"), "Cefixime");
        assert_eq!(sanitize_ocr_text("\u{FB02}uconazole"), "fluconazole");
        assert_eq!(sanitize_ocr_text("e\u{FB03}cacy"), "efficacy");
    }

    #[test]
    fn keeps_micro_sign() {
        assert!(sanitize_ocr_text("250 µg daily").contains("µg"));
    }

    #[test]
    fn empty_input_returns_empty() {
        assert_eq!(sanitize_ocr_text(""), "");
        assert_eq!(sanitize_ocr_text("\x0c"), "");
    }
}
