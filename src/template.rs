//! Special-token layouts and truncation.

use crate::{
    encoding::{Encoding, Mask, Offset, Sequence, Token},
    utok, Error, Result, TruncationStrategy, Vocab,
};
use tracing::trace;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TemplatePiece {
    Special { id: utok, token: String, type_id: u32 },
    /// The `index`-th input sequence.
    Sequence { index: usize, type_id: u32 },
}

/// Where special tokens go around one sequence, and around a pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    single: Vec<TemplatePiece>,
    pair: Vec<TemplatePiece>,
}

/// Per-call encode options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodeOptions {
    pub add_special_tokens: bool,
    /// Maximum length including special tokens; `None` for unbounded.
    pub max_len: Option<usize>,
    pub strategy: TruncationStrategy,
    pub stride: usize,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            add_special_tokens: true,
            max_len: None,
            strategy: TruncationStrategy::LongestFirst,
            stride: 0,
        }
    }
}

const A: TemplatePiece = TemplatePiece::Sequence {
    index: 0,
    type_id: 0,
};
const B: TemplatePiece = TemplatePiece::Sequence {
    index: 1,
    type_id: 1,
};

impl Template {
    pub fn new(single: Vec<TemplatePiece>, pair: Vec<TemplatePiece>) -> Self {
        Self { single, pair }
    }

    /// Sequences only: `A` and `A B`.
    pub fn none() -> Self {
        Self::new(vec![A], vec![A, B])
    }

    /// `[CLS] A [SEP]` and `[CLS] A [SEP] B [SEP]`.
    pub fn bert(vocab: &Vocab, cls: &str, sep: &str) -> Result<Self> {
        let cls = special(vocab, cls, 0)?;
        let (sep0, sep1) = (special(vocab, sep, 0)?, special(vocab, sep, 1)?);
        Ok(Self::new(
            vec![cls.clone(), A, sep0.clone()],
            vec![cls, A, sep0, B, sep1],
        ))
    }

    /// `<s> A </s>` and `<s> A </s> </s> B </s>`.
    pub fn roberta(vocab: &Vocab, cls: &str, sep: &str) -> Result<Self> {
        let cls = special(vocab, cls, 0)?;
        let (sep0, sep1) = (special(vocab, sep, 0)?, special(vocab, sep, 1)?);
        Ok(Self::new(
            vec![cls.clone(), A, sep0.clone()],
            vec![cls, A, sep0, sep1.clone(), B, sep1],
        ))
    }

    /// `A <sep> <cls>` and `A <sep> B <sep> <cls>`; `<cls>` has type id 2.
    pub fn xlnet(vocab: &Vocab, sep: &str, cls: &str) -> Result<Self> {
        let cls = special(vocab, cls, 2)?;
        let (sep0, sep1) = (special(vocab, sep, 0)?, special(vocab, sep, 1)?);
        Ok(Self::new(
            vec![A, sep0.clone(), cls.clone()],
            vec![A, sep0, B, sep1, cls],
        ))
    }

    /// `A </s>` and `A </s> B </s>`.
    pub fn t5(vocab: &Vocab, eos: &str) -> Result<Self> {
        let (eos0, eos1) = (special(vocab, eos, 0)?, special(vocab, eos, 1)?);
        Ok(Self::new(vec![A, eos0.clone()], vec![A, eos0, B, eos1]))
    }

    /// Number of special tokens the layout adds.
    pub fn added_tokens(&self, pair: bool) -> usize {
        self.layout(pair)
            .iter()
            .filter(|p| matches!(p, TemplatePiece::Special { .. }))
            .count()
    }

    /// Ids of the special tokens either layout inserts.
    pub fn special_ids(&self) -> impl Iterator<Item = utok> + '_ {
        self.single.iter().chain(&self.pair).filter_map(|p| match p {
            TemplatePiece::Special { id, .. } => Some(*id),
            TemplatePiece::Sequence { .. } => None,
        })
    }

    #[inline]
    fn layout(&self, pair: bool) -> &[TemplatePiece] {
        if pair {
            &self.pair
        } else {
            &self.single
        }
    }

    /// Truncates the sequences to fit `options.max_len`, then lays them out.
    pub fn apply(
        &self,
        a: Sequence,
        b: Option<Sequence>,
        options: &EncodeOptions,
    ) -> Result<Encoding> {
        let (mut a, mut b) = (a, b);
        let pair = b.is_some();
        let added = if options.add_special_tokens {
            self.added_tokens(pair)
        } else {
            0
        };
        let len = a.len() + b.as_ref().map_or(0, Sequence::len) + added;

        let mut overflowing_tokens = Vec::new();
        let mut num_truncated_tokens = 0;
        if let Some(max) = options.max_len.filter(|&max| len > max) {
            num_truncated_tokens = len - max;
            overflowing_tokens = truncate(&mut a, b.as_mut(), num_truncated_tokens, options)
                .ok_or(Error::InputTooLong { len, max })?;
            trace!(len, max, removed = num_truncated_tokens, "truncated");
        }

        let mut sequences = [Some(a), b];
        let without_specials = [A, B];
        let layout = if options.add_special_tokens {
            self.layout(pair)
        } else if pair {
            &without_specials[..]
        } else {
            &without_specials[..1]
        };

        let mut encoding = Encoding::default();
        for piece in layout {
            match piece {
                TemplatePiece::Special { id, token, type_id } => {
                    let token = Token {
                        value: token.clone(),
                        offset: Offset::default(),
                        mask: Mask::Special,
                    };
                    encoding.push(*id, token, *type_id, true, None);
                }
                &TemplatePiece::Sequence { index, type_id } => {
                    let Some(seq) = sequences.get_mut(index).and_then(Option::take) else {
                        continue;
                    };
                    for (id, token) in seq.ids.into_iter().zip(seq.tokens) {
                        encoding.push(id, token, type_id, false, Some(index));
                    }
                }
            }
        }
        encoding.overflowing_tokens = overflowing_tokens;
        encoding.num_truncated_tokens = num_truncated_tokens;
        Ok(encoding)
    }
}

fn special(vocab: &Vocab, token: &str, type_id: u32) -> Result<TemplatePiece> {
    let id = vocab
        .get(token)
        .ok_or_else(|| Error::MissingSpecialToken(token.to_string()))?;
    Ok(TemplatePiece::Special {
        id,
        token: token.to_string(),
        type_id,
    })
}

/// Removes `n` ids following the strategy; `None` when the strategy cannot
/// remove that many. Returns the overflowing ids.
fn truncate(
    a: &mut Sequence,
    b: Option<&mut Sequence>,
    n: usize,
    options: &EncodeOptions,
) -> Option<Vec<utok>> {
    let stride = options.stride;
    match options.strategy {
        TruncationStrategy::DoNotTruncate => None,
        TruncationStrategy::OnlyFirst => (n <= a.len()).then(|| cut(a, n, stride)),
        TruncationStrategy::OnlySecond => b
            .filter(|b| n <= b.len())
            .map(|b| cut(b, n, stride)),
        TruncationStrategy::LongestFirst => {
            let (la, lb) = (a.len(), b.as_ref().map_or(0, |b| b.len()));
            if n > la + lb {
                return None;
            }
            // 每次从当前较长的序列移除一个
            let (mut from_a, mut from_b) = (0, 0);
            for _ in 0..n {
                if b.is_none() || la - from_a > lb - from_b {
                    from_a += 1;
                } else {
                    from_b += 1;
                }
            }
            let mut overflow = cut(a, from_a, stride);
            if let Some(b) = b {
                overflow.extend(cut(b, from_b, stride));
            }
            Some(overflow)
        }
    }
}

/// Drops `n` trailing ids, returning them preceded by up to `stride` kept ids.
fn cut(seq: &mut Sequence, n: usize, stride: usize) -> Vec<utok> {
    if n == 0 {
        return Vec::new();
    }
    let removed = seq.truncate_tail(n);
    let kept = seq.ids.len();
    let mut overflow = seq.ids[kept.saturating_sub(stride)..].to_vec();
    overflow.extend(removed);
    overflow
}
