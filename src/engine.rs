use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use kwtag_dict::DictionaryStore;
use kwtag_types::{Language, Provenance, Span, Tag, TaggingResult, Token, UnsupportedLanguage};
use thiserror::Error;
use tokio::task::{self, JoinError};
use tracing::{debug, info};

use crate::classifier::Classifier;
use crate::resolver::{PhraseMatcher, resolve};
use crate::tokenizer::{Tokenizer, Tokenizers};

#[derive(Debug, Error)]
pub enum TagError {
    #[error(transparent)]
    UnsupportedLanguage(#[from] UnsupportedLanguage),
    #[error("no tokenizer configured for language {0}")]
    TokenizerUnavailable(Language),
    #[error("building the dictionary matcher failed: {0}")]
    Build(#[from] JoinError),
}

/// Tags keywords with dictionary matches first and the classifier as fallback.
///
/// Matchers are built once per language on first use and shared afterwards.
/// A language that was not warmed up is built on the blocking pool by the
/// first request that needs it, so file reads never stall a runtime worker.
pub struct TaggingEngine {
    store: Arc<DictionaryStore>,
    tokenizers: Tokenizers,
    classifier: Arc<dyn Classifier>,
    matchers: DashMap<Language, Arc<PhraseMatcher>>,
}

impl TaggingEngine {
    pub fn new(
        store: Arc<DictionaryStore>,
        tokenizers: Tokenizers,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            store,
            tokenizers,
            classifier,
            matchers: DashMap::new(),
        }
    }

    pub fn store(&self) -> &DictionaryStore {
        &self.store
    }

    /// Whether the matcher for `language` has been built.
    pub fn is_warm(&self, language: Language) -> bool {
        self.matchers.contains_key(&language)
    }

    /// Build the dictionary and matcher for `language` ahead of the first request.
    /// Returns the number of phrases the matcher knows.
    pub fn warm_up(&self, language: Language) -> Result<usize, TagError> {
        let tokenizer = self.tokenizer(language)?;
        Ok(self.matcher(language, tokenizer.as_ref()).len())
    }

    pub async fn tag(&self, keyword: &str, language: &str) -> Result<TaggingResult, TagError> {
        let language: Language = language.parse()?;
        self.tag_language(keyword, language).await
    }

    pub async fn tag_language(
        &self,
        keyword: &str,
        language: Language,
    ) -> Result<TaggingResult, TagError> {
        let tokenizer = self.tokenizer(language)?;
        let cached = self.matchers.get(&language).map(|hit| Arc::clone(hit.value()));
        let matcher = match cached {
            Some(matcher) => matcher,
            None => self.build_off_runtime(language, Arc::clone(&tokenizer)).await?,
        };
        let tokens = tokenizer.tokenize(keyword);
        let resolution = resolve(&tokens, &matcher);

        let mut result = TaggingResult::new(keyword);

        // Emission order is fixed for compatibility with existing batch consumers:
        // every dictionary span first, then the leftover tokens left to right. The
        // output is therefore not in keyword order when a leftover precedes a span.
        for span in &resolution.spans {
            result.push(span_text(&tokens, span), Some(span.tag), Provenance::Dictionary);
        }

        let mut verdicts: HashMap<String, Option<Tag>> = HashMap::new();
        for &pos in &resolution.uncovered {
            let text = tokens[pos].text.to_lowercase();
            let tag = match verdicts.get(&text) {
                Some(tag) => *tag,
                None => {
                    let tag = self.classifier.classify(&text, keyword).await;
                    verdicts.insert(text.clone(), tag);
                    tag
                }
            };
            let provenance = match tag {
                Some(_) => Provenance::Classifier,
                None => Provenance::Unresolved,
            };
            result.push(text, tag, provenance);
        }

        debug!(
            "tagged {keyword:?} ({language}): {} spans, {} leftovers",
            resolution.spans.len(),
            resolution.uncovered.len()
        );
        Ok(result)
    }

    fn tokenizer(&self, language: Language) -> Result<Arc<dyn Tokenizer>, TagError> {
        self.tokenizers
            .get(language)
            .ok_or(TagError::TokenizerUnavailable(language))
    }

    async fn build_off_runtime(
        &self,
        language: Language,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Result<Arc<PhraseMatcher>, TagError> {
        let store = Arc::clone(&self.store);
        let built = task::spawn_blocking(move || {
            let dictionary = store.load(language);
            PhraseMatcher::build(&dictionary, tokenizer.as_ref())
        })
        .await?;
        // Concurrent first requests may each build one; the first insert wins.
        let entry = self.matchers.entry(language).or_insert_with(|| {
            info!("{language} matcher ready with {} phrases", built.len());
            Arc::new(built)
        });
        Ok(Arc::clone(entry.value()))
    }

    fn matcher(&self, language: Language, tokenizer: &dyn Tokenizer) -> Arc<PhraseMatcher> {
        if let Some(hit) = self.matchers.get(&language) {
            return Arc::clone(hit.value());
        }
        let entry = self.matchers.entry(language).or_insert_with(|| {
            let dictionary = self.store.load(language);
            let matcher = PhraseMatcher::build(&dictionary, tokenizer);
            info!("{language} matcher ready with {} phrases", matcher.len());
            Arc::new(matcher)
        });
        Arc::clone(entry.value())
    }
}

/// Keyword text covered by `span`, inner whitespace included, lowercased.
fn span_text(tokens: &[Token], span: &Span) -> String {
    tokens[span.range()]
        .iter()
        .map(|t| t.text.as_str())
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct CountingClassifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Classifier for CountingClassifier {
        async fn classify(&self, term: &str, _context: &str) -> Option<Tag> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (term == "neon").then_some(Tag::Color)
        }
    }

    #[tokio::test]
    async fn repeated_leftovers_are_classified_once() {
        let tempdir = tempfile::tempdir().unwrap();
        let classifier = Arc::new(CountingClassifier {
            calls: AtomicUsize::new(0),
        });
        let engine = TaggingEngine::new(
            Arc::new(DictionaryStore::new(tempdir.path())),
            Tokenizers::default(),
            classifier.clone(),
        );

        let result = engine.tag("neon cap NEON", "en").await.unwrap();
        assert_eq!(result.tokens, vec!["neon", "cap", "neon"]);
        assert_eq!(result.tag_summary[&Tag::Color], vec!["neon", "neon"]);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_tokenizer_is_an_error() {
        let tempdir = tempfile::tempdir().unwrap();
        let engine = TaggingEngine::new(
            Arc::new(DictionaryStore::new(tempdir.path())),
            Tokenizers::empty(),
            Arc::new(crate::classifier::NoClassifier),
        );
        let err = engine.tag("vest", "de").await.unwrap_err();
        assert!(matches!(err, TagError::TokenizerUnavailable(Language::De)));
        assert!(engine.warm_up(Language::De).is_err());
    }

    #[tokio::test]
    async fn first_request_builds_matcher_once() {
        let tempdir = tempfile::tempdir().unwrap();
        let brands = tempdir.path().join("en_brands.txt");
        std::fs::write(&brands, "salomon\n").unwrap();
        let engine = TaggingEngine::new(
            Arc::new(DictionaryStore::new(tempdir.path())),
            Tokenizers::default(),
            Arc::new(crate::classifier::NoClassifier),
        );
        assert!(!engine.is_warm(Language::En));

        let first = engine.tag("salomon vest", "en").await.unwrap();
        assert_eq!(first.tagged_tokens[0].tags, vec![Tag::Brand]);
        assert!(engine.is_warm(Language::En));

        std::fs::remove_file(&brands).unwrap();
        let second = engine.tag("salomon vest", "en").await.unwrap();
        assert_eq!(second, first);
    }

    #[test]
    fn span_text_keeps_inner_whitespace() {
        let tokens = crate::tokenizer::UnicodeTokenizer.tokenize("Trail  Running");
        let span = Span {
            start: 0,
            end: 3,
            tag: Tag::Product,
        };
        assert_eq!(span_text(&tokens, &span), "trail  running");
    }
}
