/// A phone number line counts as valid input if it is non-empty once
/// trimmed and contains only digits, spaces, and the few punctuation marks
/// real export files sprinkle in (`+`, `-`, `(`, `)`).
pub fn is_plausible_phone_number(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')'))
        && trimmed.chars().any(|c| c.is_ascii_digit())
}
