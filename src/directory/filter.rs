//! Text scrubbing applied to users with parental control enabled.

use std::collections::HashSet;

/// Substitution applied to message text before delivery.
pub trait ContentFilter: Send + Sync {
    fn filter(&self, text: &str) -> String;
}

const DEFAULT_WORDS: &[&str] = &["damn", "hell", "crap", "bloody"];

/// [`ContentFilter`] that masks listed words with asterisks.
///
/// Words are maximal runs of alphanumeric characters and are matched without
/// regard to case.
#[derive(Clone, Debug)]
pub struct WordListFilter {
    words: HashSet<String>,
}

impl WordListFilter {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|word| word.as_ref().to_lowercase())
                .collect(),
        }
    }
}

impl Default for WordListFilter {
    fn default() -> Self { Self::new(DEFAULT_WORDS) }
}

impl ContentFilter for WordListFilter {
    fn filter(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut word = String::new();
        let flush = |word: &mut String, out: &mut String| {
            if self.words.contains(&word.to_lowercase()) {
                out.extend(std::iter::repeat_n('*', word.chars().count()));
            } else {
                out.push_str(word);
            }
            word.clear();
        };
        for ch in text.chars() {
            if ch.is_alphanumeric() {
                word.push(ch);
            } else {
                flush(&mut word, &mut out);
                out.push(ch);
            }
        }
        flush(&mut word, &mut out);
        out
    }
}
