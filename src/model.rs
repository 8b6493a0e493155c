use crate::{utok, Bpe, Mask, Method, Unigram, Vocab, WordPiece};
use std::ops::Range;

/// A vocabulary piece found in a segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Piece {
    pub id: utok,
    /// Byte range inside the segment.
    pub range: Range<usize>,
    pub mask: Mask,
}

impl Piece {
    #[inline]
    pub(crate) fn new(id: utok, range: Range<usize>, mask: Mask) -> Self {
        Self { id, range, mask }
    }
}

/// The subword model of a tokenizer, fixed at construction.
#[derive(Clone, Debug)]
pub enum Model {
    WordPiece(WordPiece),
    Bpe(Bpe),
    Unigram(Unigram),
}

impl Method for Model {
    #[inline]
    fn vocab(&self) -> &Vocab {
        match self {
            Self::WordPiece(m) => m.vocab(),
            Self::Bpe(m) => m.vocab(),
            Self::Unigram(m) => m.vocab(),
        }
    }

    #[inline]
    fn encode(&self, segment: &str) -> Vec<Piece> {
        match self {
            Self::WordPiece(m) => m.encode(segment),
            Self::Bpe(m) => m.encode(segment),
            Self::Unigram(m) => m.encode(segment),
        }
    }
}

impl From<WordPiece> for Model {
    fn from(m: WordPiece) -> Self {
        Self::WordPiece(m)
    }
}

impl From<Bpe> for Model {
    fn from(m: Bpe) -> Self {
        Self::Bpe(m)
    }
}

impl From<Unigram> for Model {
    fn from(m: Unigram) -> Self {
        Self::Unigram(m)
    }
}

/// Spells `segment[range]` with byte tokens, if the vocabulary has all of them.
pub(crate) fn byte_fallback(
    vocab: &Vocab,
    segment: &str,
    range: Range<usize>,
    first: bool,
    out: &mut Vec<Piece>,
) -> bool {
    let bytes = &segment.as_bytes()[range.clone()];
    let Some(ids) = bytes
        .iter()
        .map(|&b| vocab.byte_token(b))
        .collect::<Option<Vec<_>>>()
    else {
        return false;
    };
    for (i, id) in ids.into_iter().enumerate() {
        let at = range.start + i;
        let mask = if first && i == 0 {
            Mask::None
        } else {
            Mask::Continuation
        };
        out.push(Piece::new(id, at..at + 1, mask));
    }
    true
}
