use crate::normalize::normalize_text;

/// Wake phrase detection over normalized transcript text.
///
/// The configured value may hold several phrases separated by `|`, `,` or `;`.
#[derive(Debug, Clone, Default)]
pub struct WakePhrases {
    phrases: Vec<String>,
}

impl WakePhrases {
    pub fn new(list: &str) -> Self {
        let phrases = list
            .split(['|', ',', ';'])
            .map(normalize_text)
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Check if normalized text contains any wake phrase, return the text after it if matched
    pub fn detect<'a>(&self, text: &'a str) -> Option<&'a str> {
        self.phrases.iter().find_map(|phrase| {
            text.find(phrase.as_str())
                .map(|pos| trim_separators(&text[pos + phrase.len()..]))
        })
    }

    /// Remove a leading wake phrase, if any
    pub fn strip_prefix<'a>(&self, text: &'a str) -> &'a str {
        self.phrases
            .iter()
            .find_map(|phrase| text.strip_prefix(phrase.as_str()))
            .map(trim_separators)
            .unwrap_or(text)
    }

    /// Remove a leading wake phrase from text as written, leaving the rest untouched
    pub fn strip_raw_prefix<'a>(&self, text: &'a str) -> &'a str {
        let text = text.trim();
        self.phrases
            .iter()
            .find_map(|phrase| strip_words(text, phrase))
            .map(trim_separators)
            .unwrap_or(text)
    }
}

/// Match the words of a normalized `phrase` at the start of unnormalized text
fn strip_words<'a>(text: &'a str, phrase: &str) -> Option<&'a str> {
    let mut rest = text;
    for word in phrase.split_whitespace() {
        rest = rest.trim_start_matches(|c: char| !c.is_alphanumeric());
        let end = rest
            .find(|c: char| !c.is_alphanumeric() && c != '_')
            .unwrap_or(rest.len());
        if normalize_text(&rest[..end]) != word {
            return None;
        }
        rest = &rest[end..];
    }
    Some(rest)
}

fn trim_separators(rest: &str) -> &str {
    rest.trim_start_matches([',', '!', '.', ' ']).trim_end()
}
