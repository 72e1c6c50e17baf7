use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use kwtag_dict::{DictionaryStore, FeedbackBatch, FeedbackLoop};
use kwtag_types::{Language, Provenance, Tag};

use kwtagger::classifier::{Classifier, NoClassifier};
use kwtagger::engine::{TagError, TaggingEngine};
use kwtagger::tokenizer::{Tokenizer, Tokenizers, UnicodeTokenizer};

struct FixedClassifier(HashMap<&'static str, Tag>);

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, term: &str, _context: &str) -> Option<Tag> {
        self.0.get(term).copied()
    }
}

fn engine(dir: &Path, classifier: Arc<dyn Classifier>) -> TaggingEngine {
    TaggingEngine::new(
        Arc::new(DictionaryStore::new(dir)),
        Tokenizers::default(),
        classifier,
    )
}

fn outdoor_dictionaries() -> tempfile::TempDir {
    let tempdir = tempfile::tempdir().unwrap();
    fs::write(tempdir.path().join("en_brands.txt"), "salomon\n").unwrap();
    fs::write(tempdir.path().join("en_sizes.txt"), "15l\n").unwrap();
    fs::write(tempdir.path().join("en_products.txt"), "trail running vest\n").unwrap();
    tempdir
}

#[tokio::test]
async fn dictionary_hits_and_unknown_tokens_without_classifier() {
    let dir = outdoor_dictionaries();
    let engine = engine(dir.path(), Arc::new(NoClassifier));

    let result = engine.tag("running vest salomon 15l", "en").await.unwrap();
    assert_eq!(result.tokens, vec!["salomon", "15l", "running", "vest"]);

    let by_token: HashMap<_, _> = result
        .tagged_tokens
        .iter()
        .map(|t| (t.token.as_str(), t))
        .collect();
    assert_eq!(by_token["salomon"].tags, vec![Tag::Brand]);
    assert_eq!(by_token["salomon"].confidence, 0.99);
    assert_eq!(by_token["15l"].tags, vec![Tag::Size]);
    assert_eq!(by_token["15l"].confidence, 0.99);
    assert!(by_token["running"].tags.is_empty());
    assert_eq!(by_token["running"].confidence, 0.50);
    assert!(by_token["vest"].tags.is_empty());
    assert_eq!(by_token["vest"].confidence, 0.50);
}

#[tokio::test]
async fn unsupported_language_returns_no_result() {
    let dir = outdoor_dictionaries();
    let engine = engine(dir.path(), Arc::new(NoClassifier));
    let err = engine.tag("running vest", "xx").await.unwrap_err();
    assert!(matches!(err, TagError::UnsupportedLanguage(_)));
}

#[tokio::test]
async fn confidence_encodes_provenance() {
    let dir = outdoor_dictionaries();
    let classifier = FixedClassifier(HashMap::from([("women", Tag::Audience)]));
    let engine = engine(dir.path(), Arc::new(classifier));

    let result = engine
        .tag("Trail Running Vest women, Salomon!", "en")
        .await
        .unwrap();
    assert_eq!(result.tokens, vec!["trail running vest", "salomon", "women"]);
    let provenance: Vec<_> = result
        .tagged_tokens
        .iter()
        .map(|t| t.provenance().unwrap())
        .collect();
    assert_eq!(
        provenance,
        vec![
            Provenance::Dictionary,
            Provenance::Dictionary,
            Provenance::Classifier
        ]
    );
    for token in &result.tagged_tokens {
        match token.provenance() {
            Some(Provenance::Unresolved) => assert!(token.tags.is_empty()),
            Some(_) => assert_eq!(token.tags.len(), 1),
            None => panic!("unexpected confidence {}", token.confidence),
        }
    }
    assert_eq!(
        result.tag_summary.keys().copied().collect::<Vec<_>>(),
        vec![Tag::Product, Tag::Brand, Tag::Audience]
    );
}

#[tokio::test]
async fn emits_one_token_per_content_token_for_single_word_terms() {
    let dir = outdoor_dictionaries();
    let engine = engine(dir.path(), Arc::new(NoClassifier));
    for keyword in ["", "  ", "salomon", "15l, blue - salomon!!", "a b c d e"] {
        let result = engine.tag(keyword, "en").await.unwrap();
        let content = UnicodeTokenizer
            .tokenize(keyword)
            .iter()
            .filter(|t| t.is_content())
            .count();
        assert_eq!(result.tokens.len(), content, "keyword {keyword:?}");
        assert_eq!(result.tagged_tokens.len(), content);
    }
}

#[tokio::test]
async fn classifier_discoveries_feed_back_into_dictionary() {
    let dir = outdoor_dictionaries();
    let classifier = FixedClassifier(HashMap::from([("trailrunner", Tag::Brand)]));
    let first = engine(dir.path(), Arc::new(classifier));

    let result = first.tag("trailrunner vest 15l", "en").await.unwrap();
    let discovered = result
        .tagged_tokens
        .iter()
        .find(|t| t.token == "trailrunner")
        .unwrap();
    assert_eq!(discovered.confidence, 0.80);

    let batch = FeedbackBatch::from_results([(Language::En, result)]);
    let feedback = FeedbackLoop::new(dir.path());
    let report = feedback.promote(&batch);
    assert_eq!(report.terms_added, 1);
    let brands = fs::read_to_string(dir.path().join("en_brands.txt")).unwrap();
    assert_eq!(brands, "salomon\ntrailrunner\n");

    assert_eq!(feedback.promote(&batch).terms_added, 0);
    assert_eq!(
        fs::read_to_string(dir.path().join("en_brands.txt")).unwrap(),
        brands
    );

    // The running engine keeps its snapshot; a new one sees the grown dictionary.
    let stale = first.tag("trailrunner", "en").await.unwrap();
    assert_eq!(stale.tagged_tokens[0].confidence, 0.80);
    let fresh = engine(dir.path(), Arc::new(NoClassifier));
    let reloaded = fresh.tag("trailrunner", "en").await.unwrap();
    assert_eq!(reloaded.tagged_tokens[0].tags, vec![Tag::Brand]);
    assert_eq!(reloaded.tagged_tokens[0].confidence, 0.99);
}

#[tokio::test]
async fn concurrent_requests_share_language_resources() {
    let dir = outdoor_dictionaries();
    let engine = Arc::new(engine(dir.path(), Arc::new(NoClassifier)));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine.tag("salomon 15l", "en").await.unwrap()
        }));
    }
    for handle in handles {
        let result = handle.await.unwrap();
        assert_eq!(result.tokens, vec!["salomon", "15l"]);
    }
    assert!(engine.store().is_loaded(Language::En));
    assert!(!engine.store().is_loaded(Language::Ja));
}

#[tokio::test]
async fn japanese_keywords_match_katakana_terms() {
    let tempdir = tempfile::tempdir().unwrap();
    fs::write(tempdir.path().join("ja_brands.txt"), "サロモン\n").unwrap();
    fs::write(tempdir.path().join("ja_products.txt"), "ランニングベスト\n").unwrap();
    let engine = engine(tempdir.path(), Arc::new(NoClassifier));

    let result = engine.tag("ランニングベスト サロモン 15l", "ja").await.unwrap();
    assert_eq!(result.tokens, vec!["ランニングベスト", "サロモン", "15l"]);
    assert_eq!(result.tagged_tokens[2].confidence, 0.50);
}
