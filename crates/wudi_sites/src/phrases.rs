//! Magic-string ban/classification detection (spec.md §9: "keep as
//! constants grouped by site; provide a single helper that tests a body
//! against a list of phrases"). Each adapter module owns its own phrase
//! constants and calls [`body_contains_any`] rather than repeating the scan.

/// True if `body` contains any of `phrases` as a literal substring.
pub fn body_contains_any(body: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| body.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_any_phrase_present() {
        assert!(body_contains_any("prefix-needle-suffix", &["missing", "needle"]));
    }

    #[test]
    fn reports_false_when_none_match() {
        assert!(!body_contains_any("nothing here", &["a", "b"]));
    }
}
