pub mod classifier;
pub mod engine;
pub mod handlers;
pub mod logging;
pub mod resolver;
pub mod tokenizer;

pub use classifier::{
    ChatClassifier, Classifier, ClassifierConfig, NoClassifier, Verdict, build_classifier,
    parse_verdict,
};
pub use engine::{TagError, TaggingEngine};
pub use handlers::{AppState, KeywordRequest, router};
pub use resolver::{PhraseMatcher, Resolution, filter_spans, resolve};
pub use tokenizer::{Tokenizer, Tokenizers, UnicodeTokenizer};
