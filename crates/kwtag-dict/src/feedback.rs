//! Offline promotion of classifier-discovered terms into the dictionaries.
//!
//! A [`FeedbackBatch`] is a JSON array of tagging results, each annotated with
//! the `language_code` it was produced for. Every token carrying the classifier
//! confidence is a candidate; candidates are grouped per `(language, tag)` and
//! only terms missing from the corresponding file are appended. Running the
//! same batch twice leaves the files untouched the second time.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use kwtag_types::{CLASSIFIER_CONFIDENCE, Language, Tag, TaggingResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::store::{normalize_term, term_list_path};

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("failed to read feedback batch {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse feedback batch: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One prior tagging result as found in a batch file. Every field is optional
/// so that a single malformed record can be skipped instead of failing the batch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackRecord {
    #[serde(default)]
    pub language_code: Option<String>,
    #[serde(default)]
    pub original_keyword: Option<String>,
    #[serde(default)]
    pub tagged_tokens: Vec<FeedbackToken>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackToken {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct FeedbackBatch {
    pub records: Vec<FeedbackRecord>,
}

/// A tagging result plus the language it was produced for; the on-disk shape
/// of a batch entry.
#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedResult {
    #[serde(flatten)]
    pub result: TaggingResult,
    pub language_code: Language,
}

impl FeedbackBatch {
    pub fn parse(bytes: &[u8]) -> Result<Self, FeedbackError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self, FeedbackError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| FeedbackError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&bytes)
    }

    /// Build a batch from in-process results.
    pub fn from_results<I>(results: I) -> Self
    where
        I: IntoIterator<Item = (Language, TaggingResult)>,
    {
        let records = results
            .into_iter()
            .map(|(language, result)| FeedbackRecord {
                language_code: Some(language.code().to_string()),
                original_keyword: Some(result.original_keyword),
                tagged_tokens: result
                    .tagged_tokens
                    .into_iter()
                    .map(|t| FeedbackToken {
                        token: Some(t.token),
                        tags: t.tags.iter().map(|tag| tag.label().to_string()).collect(),
                        confidence: Some(t.confidence),
                    })
                    .collect(),
            })
            .collect();
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PromotionReport {
    pub files_updated: usize,
    pub terms_added: usize,
    /// Tokens in the batch that carried the classifier confidence.
    pub classifier_tokens: usize,
    /// Records or tokens ignored because of missing or invalid fields.
    pub skipped: usize,
}

/// Appends new terms to the dictionary files under `dir`.
///
/// The read-compare-append sequence for each file runs under a per-path lock,
/// so concurrent `promote` calls on one instance cannot duplicate a term.
pub struct FeedbackLoop {
    dir: PathBuf,
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl FeedbackLoop {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: DashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn promote(&self, batch: &FeedbackBatch) -> PromotionReport {
        let mut report = PromotionReport::default();
        let discovered = collect_discoveries(batch, &mut report);
        if report.classifier_tokens == 0 {
            info!("batch holds no classifier-tagged tokens");
        }

        for ((language, tag), terms) in discovered {
            let path = term_list_path(&self.dir, language, tag);
            match self.append_new_terms(&path, &terms) {
                Ok(0) => {}
                Ok(added) => {
                    info!("added {added} new terms to {}", path.display());
                    report.files_updated += 1;
                    report.terms_added += added;
                }
                Err(err) => error!("skipping {}: {err}", path.display()),
            }
        }

        info!(
            "feedback run: {} files updated, {} terms added",
            report.files_updated, report.terms_added
        );
        report
    }

    fn append_new_terms(&self, path: &Path, terms: &BTreeSet<String>) -> io::Result<usize> {
        let lock = self.lock_for(path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let existing = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err),
        };
        let known: HashSet<String> = existing.lines().filter_map(normalize_term).collect();
        let fresh: Vec<&str> = terms
            .iter()
            .filter(|term| !known.contains(*term))
            .map(String::as_str)
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }

        let mut out = String::new();
        if !existing.is_empty() && !existing.ends_with('\n') {
            out.push('\n');
        }
        for term in &fresh {
            out.push_str(term);
            out.push('\n');
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(out.as_bytes())?;
        file.flush()?;
        Ok(fresh.len())
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(path.to_path_buf()).or_default().value())
    }
}

fn collect_discoveries(
    batch: &FeedbackBatch,
    report: &mut PromotionReport,
) -> BTreeMap<(Language, Tag), BTreeSet<String>> {
    let mut discovered: BTreeMap<(Language, Tag), BTreeSet<String>> = BTreeMap::new();

    for (idx, record) in batch.records.iter().enumerate() {
        let Some(code) = record.language_code.as_deref() else {
            warn!("skipping record {idx}: missing language_code");
            report.skipped += 1;
            continue;
        };
        let language: Language = match code.parse() {
            Ok(language) => language,
            Err(err) => {
                warn!("skipping record {idx}: {err}");
                report.skipped += 1;
                continue;
            }
        };

        for token in &record.tagged_tokens {
            if token.confidence != Some(CLASSIFIER_CONFIDENCE) {
                continue;
            }
            report.classifier_tokens += 1;

            let Some(term) = token.token.as_deref().and_then(normalize_term) else {
                warn!("skipping token in record {idx}: missing text");
                report.skipped += 1;
                continue;
            };
            let Some(tag) = token.tags.first().and_then(|label| Tag::from_label(label)) else {
                warn!("skipping {term:?} in record {idx}: tags {:?} hold no known tag", token.tags);
                report.skipped += 1;
                continue;
            };
            discovered.entry((language, tag)).or_default().insert(term);
        }
    }

    discovered
}
