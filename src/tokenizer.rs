use std::collections::HashMap;
use std::sync::Arc;

use kwtag_types::{Language, Token};
use unicode_segmentation::UnicodeSegmentation;

/// Segments text into tokens, keeping whitespace and punctuation as flagged tokens.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<Token>;
}

/// Splits on Unicode word boundaries (UAX #29).
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeTokenizer;

impl Tokenizer for UnicodeTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        text.split_word_bounds()
            .enumerate()
            .map(|(index, piece)| Token {
                text: piece.to_string(),
                index,
                is_punct: piece
                    .chars()
                    .all(|c| !c.is_alphanumeric() && !c.is_whitespace()),
                is_space: piece.chars().all(char::is_whitespace),
            })
            .collect()
    }
}

/// Tokenizer per supported language.
#[derive(Clone)]
pub struct Tokenizers {
    by_language: HashMap<Language, Arc<dyn Tokenizer>>,
}

impl Tokenizers {
    pub fn empty() -> Self {
        Self {
            by_language: HashMap::new(),
        }
    }

    /// [`UnicodeTokenizer`] for every supported language.
    pub fn unicode() -> Self {
        Language::ALL
            .into_iter()
            .fold(Self::empty(), |set, lang| set.with(lang, Arc::new(UnicodeTokenizer)))
    }

    pub fn with(mut self, language: Language, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.by_language.insert(language, tokenizer);
        self
    }

    pub fn get(&self, language: Language) -> Option<Arc<dyn Tokenizer>> {
        self.by_language.get(&language).cloned()
    }
}

impl Default for Tokenizers {
    fn default() -> Self {
        Self::unicode()
    }
}
