//! Encode outputs: tokens with offsets, and the assembled [`Encoding`].

use crate::utok;
use serde::{Deserialize, Serialize};

/// Half-open byte span `[begin, end)` into the text a token came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Offset {
    pub begin: usize,
    pub end: usize,
}

impl Offset {
    #[inline]
    pub const fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.begin
    }
}

impl From<(usize, usize)> for Offset {
    #[inline]
    fn from((begin, end): (usize, usize)) -> Self {
        Self { begin, end }
    }
}

/// What kind of token sits at a position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mask {
    /// Starts a word, or is a whole word.
    #[default]
    None,
    /// Continues the previous token's word (no whitespace in between).
    Continuation,
    /// A special token, either recognized in the input or inserted by a template.
    Special,
    /// Out of vocabulary; decodes to the unknown token.
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Vocabulary spelling of the token.
    pub value: String,
    pub offset: Offset,
    pub mask: Mask,
}

impl Token {
    #[inline]
    pub fn is_continuation(&self) -> bool {
        self.mask == Mask::Continuation
    }

    #[inline]
    pub fn is_special(&self) -> bool {
        self.mask == Mask::Special
    }
}

/// One encoded input text before special tokens are added.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sequence {
    pub ids: Vec<utok>,
    pub tokens: Vec<Token>,
}

impl Sequence {
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub(crate) fn push(&mut self, id: utok, token: Token) {
        self.ids.push(id);
        self.tokens.push(token);
    }

    /// Drops the last `n` tokens and returns their ids.
    pub(crate) fn truncate_tail(&mut self, n: usize) -> Vec<utok> {
        let keep = self.ids.len().saturating_sub(n);
        self.tokens.truncate(keep);
        self.ids.split_off(keep)
    }
}

/// The result of encoding one text or a pair of texts.
///
/// All per-position vectors have the same length as `ids`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encoding {
    pub ids: Vec<utok>,
    pub tokens: Vec<Token>,
    /// Segment id of each position (e.g. 0 for sentence A, 1 for sentence B).
    pub type_ids: Vec<u32>,
    /// `true` where a template inserted a special token.
    pub special_tokens_mask: Vec<bool>,
    /// Which input sequence each position belongs to; `None` for inserted tokens.
    pub sequence_ids: Vec<Option<usize>>,
    /// 1 for real tokens, 0 for padding.
    pub attention_mask: Vec<u32>,
    /// Ids removed by truncation, preceded by `stride` ids of retained context.
    pub overflowing_tokens: Vec<utok>,
    pub num_truncated_tokens: usize,
}

impl Encoding {
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn offsets(&self) -> impl Iterator<Item = Offset> + '_ {
        self.tokens.iter().map(|t| t.offset)
    }

    pub(crate) fn push(
        &mut self,
        id: utok,
        token: Token,
        type_id: u32,
        special: bool,
        sequence: Option<usize>,
    ) {
        self.ids.push(id);
        self.tokens.push(token);
        self.type_ids.push(type_id);
        self.special_tokens_mask.push(special);
        self.sequence_ids.push(sequence);
        self.attention_mask.push(1);
    }

    /// Right-pads to `len` positions with `pad`; longer encodings are left alone.
    pub fn pad(&mut self, len: usize, pad: utok, pad_token: &str) {
        while self.ids.len() < len {
            self.ids.push(pad);
            self.tokens.push(Token {
                value: pad_token.to_string(),
                offset: Offset::default(),
                mask: Mask::Special,
            });
            self.type_ids.push(0);
            self.special_tokens_mask.push(true);
            self.sequence_ids.push(None);
            self.attention_mask.push(0);
        }
    }
}
