//! Per-language term dictionaries backed by flat text files.
//!
//! Each `(language, tag)` pair owns one file named `{language}_{file_id}.txt`
//! holding one lowercase term per line. [`DictionaryStore`] loads every file of a
//! language once and caches the result for the life of the process;
//! [`FeedbackLoop`] grows those files offline by appending terms that the
//! classifier discovered, never rewriting existing lines.
//!
//! # Example
//! ```no_run
//! use kwtag_dict::{DictionaryStore, FeedbackBatch, FeedbackLoop};
//! use kwtag_types::{Language, Tag};
//!
//! let store = DictionaryStore::new("dictionaries");
//! let en = store.load(Language::En);
//! println!("{} en terms, salomon -> {:?}", en.len(), en.tag_of("Salomon"));
//! assert!(en.terms(Tag::Brand).iter().all(|t| t.to_lowercase() == *t));
//!
//! let batch = FeedbackBatch::read("batch_results.json")?;
//! let report = FeedbackLoop::new("dictionaries").promote(&batch);
//! println!("{} terms added to {} files", report.terms_added, report.files_updated);
//! # Ok::<(), kwtag_dict::FeedbackError>(())
//! ```

pub mod feedback;
pub mod store;

pub use feedback::{
    AnnotatedResult, FeedbackBatch, FeedbackError, FeedbackLoop, FeedbackRecord, FeedbackToken,
    PromotionReport,
};
pub use store::{Dictionary, DictionaryStore, normalize_term, term_list_path};
