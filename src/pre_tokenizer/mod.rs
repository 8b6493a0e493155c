//! Coarse segmentation ahead of the subword model.

pub mod byte_level;

use crate::normalizer::{is_punctuation, is_whitespace, NormalizedString};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// The SentencePiece meta-space marker.
pub const METASPACE: char = '▁';

/// How normalized text is cut into segments before subword splitting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PreTokenizer {
    /// Split on whitespace and isolate every punctuation character.
    Bert,
    /// Split on whitespace only.
    Whitespace,
    /// GPT-2 pattern split, then every byte replaced by its printable surrogate.
    ByteLevel { add_prefix_space: bool },
    /// Spaces become [`METASPACE`]; the whole text is a single segment.
    Metaspace { add_prefix_space: bool },
}

impl PreTokenizer {
    /// Cuts `text` into segments, each aligned to the original input.
    pub fn pre_tokenize(&self, text: &NormalizedString) -> Vec<NormalizedString> {
        match *self {
            Self::Bert => split_words(text, true),
            Self::Whitespace => split_words(text, false),
            Self::ByteLevel { add_prefix_space } => {
                let mut text = text.clone();
                if add_prefix_space && !text.as_str().starts_with(is_whitespace) {
                    text.prepend(' ');
                }
                split_gpt2(text.as_str())
                    .into_iter()
                    .map(|(start, end)| text.slice(start..end).map_bytes(byte_level::byte_to_char))
                    .collect()
            }
            Self::Metaspace { add_prefix_space } => {
                if text.is_empty() {
                    return vec![];
                }
                let mut text = text.clone();
                text.map_chars(|c| Some(if c == ' ' { METASPACE } else { c }));
                if add_prefix_space && !text.as_str().starts_with(METASPACE) {
                    text.prepend(METASPACE);
                }
                vec![text]
            }
        }
    }

    /// Segment strings of an already normalized text.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.pre_tokenize(&NormalizedString::new(text, 0))
            .into_iter()
            .map(|s| s.as_str().to_string())
            .collect()
    }
}

fn split_words(text: &NormalizedString, isolate_punctuation: bool) -> Vec<NormalizedString> {
    let s = text.as_str();
    let mut ans = Vec::new();
    let mut word_start = None;
    for (i, c) in s.char_indices() {
        if is_whitespace(c) {
            if let Some(start) = word_start.take() {
                ans.push(text.slice(start..i));
            }
        } else if isolate_punctuation && is_punctuation(c) {
            if let Some(start) = word_start.take() {
                ans.push(text.slice(start..i));
            }
            ans.push(text.slice(i..i + c.len_utf8()));
        } else if word_start.is_none() {
            word_start = Some(i);
        }
    }
    if let Some(start) = word_start {
        ans.push(text.slice(start..s.len()));
    }
    ans
}

/// GPT-2 split pattern without its trailing-whitespace lookahead, which
/// `regex` does not support; [`split_gpt2`] restores that rule by hand.
static GPT2_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+").unwrap()
});

/// Byte ranges of the GPT-2 segments of `text`.
///
/// A whitespace run followed by more text gives up its last character, so the
/// following word keeps its leading space (`\s+(?!\S)` in the original pattern).
fn split_gpt2(text: &str) -> Vec<(usize, usize)> {
    let mut ans = Vec::new();
    let mut pos = 0;
    while let Some(m) = GPT2_PATTERN.find_at(text, pos) {
        let (start, mut end) = (m.start(), m.end());
        let matched = m.as_str();
        if end < text.len() && matched.chars().all(char::is_whitespace) {
            if let Some((last, _)) = matched.char_indices().last() {
                if last > 0 {
                    end = start + last;
                }
            }
        }
        ans.push((start, end));
        pos = end;
    }
    ans
}
