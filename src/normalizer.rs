//! Text normalization with byte-exact offset tracking.
//!
//! Normalization changes lengths (NFD splits `é` into two code points,
//! lowercasing `İ` yields two characters, control characters disappear), so a
//! [`NormalizedString`] keeps, for every byte of the normalized text, the span
//! of original bytes it came from. Later stages slice and rewrite the string
//! and still report offsets into the caller's input.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{iter, ops::Range, sync::LazyLock};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// A string under normalization, aligned byte by byte to its source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedString {
    normalized: String,
    /// Original byte span of each normalized byte.
    alignments: Vec<(usize, usize)>,
    /// Original position used for spans of an empty string.
    origin: usize,
}

impl NormalizedString {
    /// Wraps `text`, whose first byte sits at `origin` in the caller's input.
    pub fn new(text: &str, origin: usize) -> Self {
        let mut alignments = Vec::with_capacity(text.len());
        for (i, c) in text.char_indices() {
            let span = (origin + i, origin + i + c.len_utf8());
            alignments.extend(std::iter::repeat(span).take(c.len_utf8()));
        }
        Self {
            normalized: text.to_string(),
            alignments,
            origin,
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.normalized.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    /// Original byte span covered by `range` of the normalized text.
    pub fn original_span(&self, range: Range<usize>) -> (usize, usize) {
        if range.start >= range.end {
            let at = match self.alignments.get(range.start) {
                Some(&(start, _)) => start,
                None => self.alignments.last().map_or(self.origin, |&(_, end)| end),
            };
            return (at, at);
        }
        let start = self.alignments[range.start].0;
        let end = self.alignments[range.end - 1].1;
        (start, end.max(start))
    }

    /// A sub-string keeping its alignment to the original text.
    pub fn slice(&self, range: Range<usize>) -> Self {
        let (origin, _) = self.original_span(range.clone());
        Self {
            normalized: self.normalized[range.clone()].to_string(),
            alignments: self.alignments[range].to_vec(),
            origin,
        }
    }

    /// Rewrites every character; produced characters inherit the source span.
    pub fn map_chars<F, I>(&mut self, mut f: F)
    where
        F: FnMut(char) -> I,
        I: IntoIterator<Item = char>,
    {
        self.rewrite(|s| f(s.chars().next().unwrap_or('\0')), |_, _| false)
    }

    /// Rewrites clusters made of one base character and its combining marks.
    /// Every produced character is aligned to the whole cluster.
    pub fn map_clusters<F, I>(&mut self, f: F)
    where
        F: FnMut(&str) -> I,
        I: IntoIterator<Item = char>,
    {
        self.rewrite(f, |_, c| is_combining_mark(c))
    }

    /// Rewrites runs of characters that `joins` keeps together. `joins` sees
    /// the run so far and the next character.
    fn rewrite<F, I, J>(&mut self, mut f: F, joins: J)
    where
        F: FnMut(&str) -> I,
        I: IntoIterator<Item = char>,
        J: Fn(&str, char) -> bool,
    {
        let text = std::mem::take(&mut self.normalized);
        let old = std::mem::take(&mut self.alignments);
        let mut normalized = String::with_capacity(text.len());
        let mut alignments = Vec::with_capacity(old.len());

        let mut start = 0;
        while start < text.len() {
            let mut end = start + text[start..].chars().next().map_or(1, char::len_utf8);
            while let Some(c) = text[end..].chars().next() {
                if !joins(&text[start..end], c) {
                    break;
                }
                end += c.len_utf8();
            }
            let span = (old[start].0, old[end - 1].1);
            for c in f(&text[start..end]) {
                normalized.push(c);
                alignments.extend(std::iter::repeat(span).take(c.len_utf8()));
            }
            start = end;
        }

        self.normalized = normalized;
        self.alignments = alignments;
    }

    /// Replaces every byte with one character, each aligned like its byte.
    pub fn map_bytes(&self, f: impl Fn(u8) -> char) -> Self {
        let mut normalized = String::with_capacity(self.normalized.len() * 2);
        let mut alignments = Vec::with_capacity(self.alignments.len() * 2);
        for (&b, &span) in self.normalized.as_bytes().iter().zip(&self.alignments) {
            let c = f(b);
            normalized.push(c);
            alignments.extend(std::iter::repeat(span).take(c.len_utf8()));
        }
        Self {
            normalized,
            alignments,
            origin: self.origin,
        }
    }

    /// Inserts `c` in front of the text, aligned to an empty span at the start.
    pub fn prepend(&mut self, c: char) {
        let at = self.alignments.first().map_or(self.origin, |&(start, _)| start);
        self.normalized.insert(0, c);
        self.alignments
            .splice(0..0, std::iter::repeat((at, at)).take(c.len_utf8()));
    }

    /// Drops leading and trailing whitespace and folds inner runs to one space.
    pub fn collapse_whitespace(&mut self) {
        let mut pending = false;
        let mut seen = false;
        let text = std::mem::take(&mut self.normalized);
        let old = std::mem::take(&mut self.alignments);
        let mut pending_span = (0, 0);
        for (i, c) in text.char_indices() {
            if c.is_whitespace() {
                if seen && !pending {
                    pending = true;
                    pending_span = old[i];
                }
                continue;
            }
            if pending {
                self.normalized.push(' ');
                self.alignments.push(pending_span);
                pending = false;
            }
            seen = true;
            self.normalized.push(c);
            self.alignments.extend_from_slice(&old[i..i + c.len_utf8()]);
        }
    }
}

/// Normalization steps, applied in a fixed order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Normalizer {
    /// Unicode compatibility composition (SentencePiece models).
    pub nfkc: bool,
    /// Canonical decomposition followed by removal of combining marks.
    pub strip_accents: bool,
    pub lowercase: bool,
    /// Drop control characters and map every whitespace character to a space.
    pub clean_text: bool,
    /// Surround CJK ideographs with spaces so they split into their own words.
    pub handle_cjk: bool,
    /// Trim and fold whitespace runs to a single space.
    pub collapse_whitespace: bool,
}

impl Normalizer {
    /// BERT-style normalization.
    pub fn bert(lowercase: bool, strip_accents: bool) -> Self {
        Self {
            strip_accents,
            lowercase,
            clean_text: true,
            handle_cjk: true,
            ..Self::default()
        }
    }

    /// SentencePiece-style normalization.
    pub fn sentencepiece(lowercase: bool, strip_accents: bool) -> Self {
        Self {
            nfkc: true,
            strip_accents,
            lowercase,
            clean_text: true,
            collapse_whitespace: true,
            ..Self::default()
        }
    }

    /// Normalizes `text` and returns the plain result.
    pub fn normalize(&self, text: &str) -> String {
        let mut s = NormalizedString::new(text, 0);
        self.normalize_str(&mut s);
        s.normalized
    }

    /// Normalizes in place, keeping offsets.
    pub fn normalize_str(&self, s: &mut NormalizedString) {
        if self.nfkc {
            s.rewrite(|run| run.nfkc().collect::<Vec<_>>(), composes_with);
        }
        if self.strip_accents {
            s.map_clusters(|cluster| {
                cluster
                    .nfd()
                    .filter(|&c| !is_combining_mark(c))
                    .collect::<Vec<_>>()
            });
        }
        if self.lowercase {
            s.map_chars(char::to_lowercase);
        }
        if self.clean_text {
            s.map_chars(|c| match c {
                c if is_whitespace(c) => Some(' '),
                c if c == '\0' || c == '\u{fffd}' || is_control(c) => None,
                c => Some(c),
            });
        }
        if self.handle_cjk {
            s.map_chars(|c| {
                if is_cjk(c) {
                    vec![' ', c, ' ']
                } else {
                    vec![c]
                }
            });
        }
        if self.collapse_whitespace {
            s.collapse_whitespace();
        }
    }
}

/// Whether NFKC of `run` followed by `c` differs from normalizing them apart,
/// as for combining marks or conjoining Hangul jamo.
fn composes_with(run: &str, c: char) -> bool {
    if is_combining_mark(c) {
        return true;
    }
    let joined = run.chars().chain(iter::once(c)).nfkc();
    !Iterator::eq(joined, run.nfkc().chain(iter::once(c).nfkc()))
}

pub(crate) fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r') || c.is_whitespace()
}

fn is_control(c: char) -> bool {
    static FORMAT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\p{Cc}\p{Cf}]$").unwrap());
    if matches!(c, '\t' | '\n' | '\r') {
        return false;
    }
    let mut buf = [0u8; 4];
    c.is_control() || FORMAT.is_match(c.encode_utf8(&mut buf))
}

/// ASCII symbols count as punctuation, as do all Unicode `P*` characters.
pub(crate) fn is_punctuation(c: char) -> bool {
    static PUNCT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\p{P}$").unwrap());
    if c.is_ascii() {
        return c.is_ascii_punctuation();
    }
    let mut buf = [0u8; 4];
    PUNCT.is_match(c.encode_utf8(&mut buf))
}

pub(crate) fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF
        | 0x3400..=0x4DBF
        | 0x20000..=0x2A6DF
        | 0x2A700..=0x2B73F
        | 0x2B740..=0x2B81F
        | 0x2B820..=0x2CEAF
        | 0xF900..=0xFAFF
        | 0x2F800..=0x2FA1F)
}
