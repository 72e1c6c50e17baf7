use std::collections::HashMap;

use bitvec::prelude::*;
use kwtag_dict::Dictionary;
use kwtag_types::{Span, Tag, Token};

use crate::tokenizer::Tokenizer;

type BitSet = BitVec<usize, Lsb0>;

/// Case-insensitive phrase lookup over token sequences.
///
/// Each dictionary term is tokenized with the language's tokenizer; its
/// lowercased non-space tokens joined by a single space form the lookup key.
/// Keywords are keyed the same way, so whitespace inside a phrase never
/// affects matching.
#[derive(Debug, Clone, Default)]
pub struct PhraseMatcher {
    phrases: HashMap<String, Tag>,
    max_tokens: usize,
}

/// Accepted spans plus the content tokens no span covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Non-overlapping spans sorted by start index.
    pub spans: Vec<Span>,
    /// Ascending indices of uncovered tokens that are neither punctuation nor space.
    pub uncovered: Vec<usize>,
}

impl PhraseMatcher {
    pub fn build(dictionary: &Dictionary, tokenizer: &dyn Tokenizer) -> Self {
        let mut phrases: HashMap<String, Tag> = HashMap::with_capacity(dictionary.len());
        let mut max_tokens = 0;
        for (term, tag) in dictionary.entries() {
            let parts: Vec<String> = tokenizer
                .tokenize(term)
                .into_iter()
                .filter(|t| !t.is_space)
                .map(|t| t.text.to_lowercase())
                .collect();
            if parts.is_empty() {
                continue;
            }
            max_tokens = max_tokens.max(parts.len());
            // Distinct terms can share a key ("t-shirt", "t - shirt").
            phrases
                .entry(parts.join(" "))
                .and_modify(|existing| *existing = (*existing).min(tag))
                .or_insert(tag);
        }
        Self {
            phrases,
            max_tokens,
        }
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// Every token run matching a phrase, at every length. Runs start and end
    /// on non-space tokens; results may overlap.
    pub fn find_all(&self, tokens: &[Token]) -> Vec<Span> {
        let mut spans = Vec::new();
        if self.is_empty() {
            return spans;
        }

        let lowered: Vec<String> = tokens.iter().map(|t| t.text.to_lowercase()).collect();
        let positions: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.is_space)
            .map(|(pos, _)| pos)
            .collect();

        for (i, &start) in positions.iter().enumerate() {
            let mut key = String::new();
            for &pos in positions[i..].iter().take(self.max_tokens) {
                if !key.is_empty() {
                    key.push(' ');
                }
                key.push_str(&lowered[pos]);
                if let Some(&tag) = self.phrases.get(&key) {
                    spans.push(Span {
                        start,
                        end: pos + 1,
                        tag,
                    });
                }
            }
        }
        spans
    }
}

/// Match `tokens` against `matcher` and keep a leftmost-longest covering.
pub fn resolve(tokens: &[Token], matcher: &PhraseMatcher) -> Resolution {
    let spans = filter_spans(matcher.find_all(tokens), tokens);

    let mut covered: BitSet = bitvec![usize, Lsb0; 0; tokens.len()];
    for span in &spans {
        covered[span.range()].fill(true);
    }
    let uncovered = tokens
        .iter()
        .enumerate()
        .filter(|(pos, token)| !covered[*pos] && token.is_content())
        .map(|(pos, _)| pos)
        .collect();

    Resolution { spans, uncovered }
}

/// Drop overlapping candidates: longer spans win, equal lengths go to the
/// earlier start, and a span touching any accepted token is discarded.
///
/// Length counts the non-space tokens a span covers, so the whitespace
/// between words never makes a phrase longer than a hyphenated one.
pub fn filter_spans(candidates: Vec<Span>, tokens: &[Token]) -> Vec<Span> {
    let token_count = tokens.len();
    let mut ranked: Vec<(usize, Span)> = candidates
        .into_iter()
        .filter(|span| !span.is_empty() && span.end <= token_count)
        .map(|span| (word_count(tokens, &span), span))
        .collect();
    ranked.sort_by(|(a_len, a), (b_len, b)| b_len.cmp(a_len).then(a.start.cmp(&b.start)));

    let mut taken: BitSet = bitvec![usize, Lsb0; 0; token_count];
    let mut accepted = Vec::new();
    for (_, span) in ranked {
        if taken[span.range()].any() {
            continue;
        }
        taken[span.range()].fill(true);
        accepted.push(span);
    }

    accepted.sort_by_key(|span| span.start);
    accepted
}

fn word_count(tokens: &[Token], span: &Span) -> usize {
    tokens[span.range()].iter().filter(|t| !t.is_space).count()
}
