//! Unigram language model segmentation (SentencePiece).
//!
//! Each piece carries a log-probability score; a segment splits into the
//! sequence of pieces with the highest total score (Viterbi over byte
//! positions at character boundaries).

use crate::{
    model::{byte_fallback, Piece},
    pre_tokenizer::METASPACE,
    utok, Error, Mask, Method, Result, Vocab,
};
use patricia_tree::PatriciaMap;
use std::fmt;
use tracing::debug;

/// Score given to an unknown character is this much below the lowest piece score.
const UNK_PENALTY: f64 = 10.;

#[derive(Clone)]
pub struct Unigram {
    vocab: Vocab,
    scores: Box<[f32]>,
    /// 可匹配片段的前缀树
    trie: PatriciaMap<utok>,
    min_score: f32,
    byte_fallback: bool,
    fuse_unk: bool,
}

#[derive(Clone, Copy)]
struct Node {
    score: f64,
    start: usize,
    /// `None` for an unknown character
    id: Option<utok>,
}

impl Unigram {
    /// Builds the model; only pieces for which `matchable` holds take part in
    /// segmentation (control, unknown and byte pieces do not).
    pub fn new(vocab: Vocab, scores: Vec<f32>, matchable: impl Fn(utok) -> bool) -> Result<Self> {
        if scores.len() != vocab.len() {
            return Err(Error::MalformedModel(format!(
                "{} scores for {} pieces",
                scores.len(),
                vocab.len()
            )));
        }
        let mut trie = PatriciaMap::new();
        let mut min_score = f32::INFINITY;
        for (id, piece) in vocab.iter() {
            if piece.is_empty() || !matchable(id) {
                continue;
            }
            trie.insert(piece, id);
            min_score = min_score.min(scores[id as usize]);
        }
        if !min_score.is_finite() {
            min_score = 0.;
        }
        debug!(
            vocab_size = vocab.len(),
            matchable = trie.len(),
            min_score,
            "unigram model built"
        );
        Ok(Self {
            vocab,
            scores: scores.into(),
            trie,
            min_score,
            byte_fallback: false,
            fuse_unk: true,
        })
    }

    /// Spell unknown characters with `<0xNN>` pieces when the vocabulary has them.
    pub fn with_byte_fallback(mut self, byte_fallback: bool) -> Self {
        self.byte_fallback = byte_fallback && self.vocab.has_byte_tokens();
        self
    }

    /// Whether consecutive unknown characters become a single unknown token.
    pub fn with_fuse_unk(mut self, fuse_unk: bool) -> Self {
        self.fuse_unk = fuse_unk;
        self
    }

    #[inline]
    pub fn score(&self, id: utok) -> Option<f32> {
        self.scores.get(id as usize).copied()
    }

    /// Best segmentation as `(start, end, id)` triples.
    fn viterbi(&self, segment: &str) -> Vec<(usize, usize, Option<utok>)> {
        let n = segment.len();
        let mut best: Vec<Option<Node>> = vec![None; n + 1];
        best[0] = Some(Node {
            score: 0.,
            start: 0,
            id: None,
        });
        let unk_score = self.min_score as f64 - UNK_PENALTY;

        fn relax(best: &mut [Option<Node>], end: usize, node: Node) {
            // 分数相同时保留先找到的切分
            if best[end].map_or(true, |b| node.score > b.score) {
                best[end] = Some(node);
            }
        }

        for (pos, c) in segment.char_indices() {
            let Some(Node { score: base, .. }) = best[pos] else {
                continue;
            };
            let char_len = c.len_utf8();
            let mut has_single = false;
            for (key, &id) in self.trie.common_prefixes(&segment[pos..]) {
                let len = key.len();
                if len == 0 {
                    continue;
                }
                has_single |= len == char_len;
                let node = Node {
                    score: base + self.scores[id as usize] as f64,
                    start: pos,
                    id: Some(id),
                };
                relax(&mut best, pos + len, node);
            }
            if !has_single {
                let node = Node {
                    score: base + unk_score,
                    start: pos,
                    id: None,
                };
                relax(&mut best, pos + char_len, node);
            }
        }

        let mut ans = Vec::new();
        let mut end = n;
        while end > 0 {
            let Some(node) = best[end] else {
                // 每个字符都有未知候选，最优路径必然可达
                unreachable!("no segmentation reaches byte {end}")
            };
            ans.push((node.start, end, node.id));
            end = node.start;
        }
        ans.reverse();
        ans
    }
}

impl fmt::Debug for Unigram {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Unigram")
            .field("vocab_size", &self.vocab.len())
            .field("matchable", &self.trie.len())
            .field("min_score", &self.min_score)
            .field("byte_fallback", &self.byte_fallback)
            .field("fuse_unk", &self.fuse_unk)
            .finish()
    }
}

impl Method for Unigram {
    #[inline]
    fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    fn encode(&self, segment: &str) -> Vec<Piece> {
        let starts_word =
            |start: usize| start == 0 || segment[start..].starts_with(METASPACE);

        let mut pieces: Vec<Piece> = Vec::new();
        for (start, end, id) in self.viterbi(segment) {
            let first = starts_word(start);
            match id {
                Some(id) => {
                    let mask = if first {
                        Mask::None
                    } else {
                        Mask::Continuation
                    };
                    pieces.push(Piece::new(id, start..end, mask));
                }
                None => {
                    if self.byte_fallback
                        && byte_fallback(&self.vocab, segment, start..end, first, &mut pieces)
                    {
                        continue;
                    }
                    match pieces.last_mut() {
                        Some(last)
                            if self.fuse_unk
                                && last.mask == Mask::Unknown
                                && last.range.end == start =>
                        {
                            last.range.end = end
                        }
                        _ => pieces.push(Piece::new(self.vocab.unk_id(), start..end, Mask::Unknown)),
                    }
                }
            }
        }
        pieces
    }
}
