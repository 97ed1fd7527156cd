//! Transcript canonicalization shared by every matcher and parser.

/// Punctuation that survives normalization.
const KEPT_PUNCTUATION: &[char] = &['.', ',', ':', '/', '-', '(', ')'];

/// Lowercase, fold `ё` to `е`, replace disallowed characters with spaces and
/// collapse whitespace runs.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.trim().chars().flat_map(char::to_lowercase) {
        let c = if c == 'ё' { 'е' } else { c };
        if is_word_char(c) || c.is_whitespace() || KEPT_PUNCTUATION.contains(&c) {
            out.push(c);
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_and_collapse() {
        assert_eq!(normalize_text("  Hello   World  "), "hello world");
        assert_eq!(normalize_text("Hey,\tthere!"), "hey, there");
    }

    #[test]
    fn test_yo_folding() {
        assert_eq!(normalize_text("Ёлка ЕЩЁ"), "елка еще");
    }

    #[test]
    fn test_disallowed_characters() {
        assert_eq!(normalize_text("2 + 2 = ?"), "2 2");
        assert_eq!(normalize_text("open \"notes\""), "open notes");
        assert_eq!(normalize_text("10:30 (a/b) x-y"), "10:30 (a/b) x-y");
    }

    #[test]
    fn test_empty() {
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text("  !!! "), "");
    }

    #[test]
    fn test_idempotent() {
        let once = normalize_text("Поставь  ТАЙМЕР на 5 минут!!");
        assert_eq!(normalize_text(&once), once);
    }
}
