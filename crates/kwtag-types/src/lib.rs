//! Closed vocabularies and result types shared by the keyword tagger.
//!
//! A keyword is split into [`Token`]s, dictionary matches become [`Span`]s, and
//! every emitted unit is a [`TaggedToken`] whose confidence encodes where its
//! tag came from ([`Provenance`]). A [`TaggingResult`] bundles those units with
//! an insertion-ordered `Tag -> terms` summary.
//!
//! ```rust
//! use kwtag_types::{Language, Provenance, Tag, TaggingResult};
//!
//! let lang: Language = "en".parse().unwrap();
//! assert_eq!(lang.code(), "en");
//! assert_eq!(Tag::from_file_id("selling_points"), Some(Tag::SellingPoint));
//!
//! let mut result = TaggingResult::new("salomon vest");
//! result.push("salomon", Some(Tag::Brand), Provenance::Dictionary);
//! result.push("vest", None, Provenance::Unresolved);
//! assert_eq!(result.tag_summary[&Tag::Brand], vec!["salomon".to_string()]);
//! ```

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of variants in [`Tag`].
pub const TAG_COUNT: usize = 8;

pub const DICTIONARY_CONFIDENCE: f64 = 0.99;
pub const CLASSIFIER_CONFIDENCE: f64 = 0.80;
pub const UNRESOLVED_CONFIDENCE: f64 = 0.50;

/// Semantic category of a keyword term.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Brand,
    Product,
    Audience,
    Scene,
    Color,
    Size,
    SellingPoint,
    Attribute,
}

impl Tag {
    /// All tags in precedence order. Earlier tags win dictionary collisions.
    pub const ALL: [Tag; TAG_COUNT] = [
        Tag::Brand,
        Tag::Product,
        Tag::Audience,
        Tag::Scene,
        Tag::Color,
        Tag::Size,
        Tag::SellingPoint,
        Tag::Attribute,
    ];

    /// Wire label, as used in API responses and feedback batches.
    pub fn label(self) -> &'static str {
        match self {
            Tag::Brand => "brand",
            Tag::Product => "product",
            Tag::Audience => "audience",
            Tag::Scene => "scene",
            Tag::Color => "color",
            Tag::Size => "size",
            Tag::SellingPoint => "selling_point",
            Tag::Attribute => "attribute",
        }
    }

    /// Identifier used in dictionary file names (`{language}_{file_id}.txt`).
    pub fn file_id(self) -> &'static str {
        match self {
            Tag::Brand => "brands",
            Tag::Product => "products",
            Tag::Audience => "people",
            Tag::Scene => "scene",
            Tag::Color => "colors",
            Tag::Size => "sizes",
            Tag::SellingPoint => "selling_points",
            Tag::Attribute => "attributes",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.label() == raw)
    }

    pub fn from_file_id(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.file_id() == raw)
    }

    /// Position of the tag in [`Tag::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A language with a configured tokenizer and dictionary namespace.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ja,
    De,
    Fr,
    En,
    Es,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::Ja,
        Language::De,
        Language::Fr,
        Language::En,
        Language::Es,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Language::Ja => "ja",
            Language::De => "de",
            Language::Fr => "fr",
            Language::En => "en",
            Language::Es => "es",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|lang| lang.code() == raw)
            .ok_or_else(|| UnsupportedLanguage(raw.to_string()))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unsupported language: {0:?}")]
pub struct UnsupportedLanguage(pub String);

/// Where a tag assignment came from. Each tier maps to exactly one confidence.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Provenance {
    Dictionary,
    Classifier,
    Unresolved,
}

impl Provenance {
    pub fn confidence(self) -> f64 {
        match self {
            Provenance::Dictionary => DICTIONARY_CONFIDENCE,
            Provenance::Classifier => CLASSIFIER_CONFIDENCE,
            Provenance::Unresolved => UNRESOLVED_CONFIDENCE,
        }
    }

    /// Exact inverse of [`Provenance::confidence`]; any other score is `None`.
    pub fn from_confidence(score: f64) -> Option<Self> {
        [
            Provenance::Dictionary,
            Provenance::Classifier,
            Provenance::Unresolved,
        ]
        .into_iter()
        .find(|p| p.confidence() == score)
    }
}

/// A unit produced by a tokenizer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Token {
    pub text: String,
    /// Position in the token sequence; the token occupies `[index, index + 1)`.
    pub index: usize,
    pub is_punct: bool,
    pub is_space: bool,
}

impl Token {
    /// Tokens that are neither punctuation nor whitespace.
    pub fn is_content(&self) -> bool {
        !self.is_punct && !self.is_space
    }
}

/// Contiguous token run `[start, end)` matched to a dictionary tag.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub tag: Tag,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaggedToken {
    pub token: String,
    pub tags: Vec<Tag>,
    pub confidence: f64,
}

impl TaggedToken {
    pub fn new(token: impl Into<String>, tag: Option<Tag>, provenance: Provenance) -> Self {
        Self {
            token: token.into(),
            tags: tag.into_iter().collect(),
            confidence: provenance.confidence(),
        }
    }

    pub fn provenance(&self) -> Option<Provenance> {
        Provenance::from_confidence(self.confidence)
    }
}

/// Output of tagging one keyword.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaggingResult {
    pub original_keyword: String,
    pub tokens: Vec<String>,
    pub tagged_tokens: Vec<TaggedToken>,
    /// Terms per tag in emission order; duplicates are kept.
    pub tag_summary: IndexMap<Tag, Vec<String>>,
}

impl TaggingResult {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            original_keyword: keyword.into(),
            tokens: Vec::new(),
            tagged_tokens: Vec::new(),
            tag_summary: IndexMap::new(),
        }
    }

    /// Append one emitted unit, keeping `tokens`, `tagged_tokens` and the summary in step.
    pub fn push(&mut self, text: impl Into<String>, tag: Option<Tag>, provenance: Provenance) {
        let text = text.into();
        if let Some(tag) = tag {
            self.tag_summary.entry(tag).or_default().push(text.clone());
        }
        self.tokens.push(text.clone());
        self.tagged_tokens.push(TaggedToken::new(text, tag, provenance));
    }
}
