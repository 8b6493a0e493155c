//! WordPiece: greedy longest-prefix matching over two tries.
//!
//! The first piece of a word is matched against every vocabulary entry; each
//! following piece against the entries carrying the continuation prefix
//! (`##` for BERT), stored with that prefix removed. A longest-common-prefix
//! query on a trie is exactly "try the longest candidate first".

use crate::{model::Piece, utok, Mask, Method, Result, Vocab};
use patricia_tree::PatriciaMap;
use std::{fmt, path::Path};
use tracing::debug;

pub const CONTINUATION_PREFIX: &str = "##";

/// Words longer than this many characters encode as a single unknown token.
pub const MAX_INPUT_CHARS_PER_WORD: usize = 100;

#[derive(Clone)]
pub struct WordPiece {
    vocab: Vocab,
    /// 词首片段的前缀树
    starts: PatriciaMap<utok>,
    /// 后续片段的前缀树，键不含续接前缀
    continuations: PatriciaMap<utok>,
    prefix: String,
    max_input_chars_per_word: usize,
}

impl WordPiece {
    pub fn new(vocab: Vocab) -> Self {
        Self::with_prefix(vocab, CONTINUATION_PREFIX, MAX_INPUT_CHARS_PER_WORD)
    }

    pub fn with_prefix(vocab: Vocab, prefix: &str, max_input_chars_per_word: usize) -> Self {
        let mut starts = PatriciaMap::new();
        let mut continuations = PatriciaMap::new();
        for (id, token) in vocab.iter() {
            if token.is_empty() {
                continue;
            }
            starts.insert(token, id);
            if let Some(rest) = token.strip_prefix(prefix).filter(|rest| !rest.is_empty()) {
                continuations.insert(rest, id);
            }
        }
        debug!(
            vocab_size = vocab.len(),
            continuations = continuations.len(),
            "WordPiece model built"
        );
        Self {
            vocab,
            starts,
            continuations,
            prefix: prefix.to_string(),
            max_input_chars_per_word,
        }
    }

    /// Reads a one-token-per-line or JSON vocabulary file.
    pub fn from_file(path: impl AsRef<Path>, unk: &str) -> Result<Self> {
        Vocab::from_file(path, unk).map(Self::new)
    }

    /// Reads a vocabulary from text already in memory.
    pub fn from_vocab_txt(txt: &str, unk: &str) -> Result<Self> {
        Vocab::from_txt(txt, unk).map(Self::new)
    }

    #[inline]
    pub fn continuation_prefix(&self) -> &str {
        &self.prefix
    }

    fn unknown(&self, word: &str) -> Vec<Piece> {
        vec![Piece::new(self.vocab.unk_id(), 0..word.len(), Mask::Unknown)]
    }
}

impl fmt::Debug for WordPiece {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("WordPiece")
            .field("vocab_size", &self.vocab.len())
            .field("prefix", &self.prefix)
            .field("max_input_chars_per_word", &self.max_input_chars_per_word)
            .finish()
    }
}

impl Method for WordPiece {
    #[inline]
    fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    fn encode(&self, word: &str) -> Vec<Piece> {
        if word.is_empty() {
            return vec![];
        }
        if word.chars().nth(self.max_input_chars_per_word).is_some() {
            return self.unknown(word);
        }

        let mut pieces = Vec::new();
        let mut pos = 0;
        while pos < word.len() {
            let trie = if pos == 0 {
                &self.starts
            } else {
                &self.continuations
            };
            match trie.get_longest_common_prefix(&word[pos..]) {
                Some((key, &id)) if !key.is_empty() => {
                    let end = pos + key.len();
                    let mask = if pos == 0 {
                        Mask::None
                    } else {
                        Mask::Continuation
                    };
                    pieces.push(Piece::new(id, pos..end, mask));
                    pos = end;
                }
                // 任何位置无法匹配，整个词记为 <unk>
                _ => return self.unknown(word),
            }
        }
        pieces
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(tokens: &[&str]) -> WordPiece {
        let txt = tokens.join("\n");
        WordPiece::from_vocab_txt(&txt, "[UNK]").unwrap()
    }

    fn tokens(m: &WordPiece, word: &str) -> Vec<String> {
        m.encode(word)
            .into_iter()
            .map(|p| m.vocab().lookup_token(p.id).unwrap().to_string())
            .collect()
    }

    #[test]
    fn whole_word_wins() {
        let m = model(&["[UNK]", "un", "##able", "unable"]);
        assert_eq!(tokens(&m, "unable"), ["unable"]);
    }

    #[test]
    fn splits_into_continuations() {
        let m = model(&["[UNK]", "un", "##aff", "##able", "##ab"]);
        assert_eq!(tokens(&m, "unaffable"), ["un", "##aff", "##able"]);
        let pieces = m.encode("unaffable");
        assert_eq!(pieces[0].range, 0..2);
        assert_eq!(pieces[0].mask, Mask::None);
        assert_eq!(pieces[1].range, 2..5);
        assert_eq!(pieces[2].mask, Mask::Continuation);
    }

    #[test]
    fn unmatched_remainder_makes_the_word_unknown() {
        let m = model(&["[UNK]", "un", "##able"]);
        let pieces = m.encode("unxable");
        assert_eq!(pieces, [Piece::new(0, 0..7, Mask::Unknown)]);
    }

    #[test]
    fn continuation_needs_prefix() {
        // "able" 只能出现在词首
        let m = model(&["[UNK]", "un", "able"]);
        assert_eq!(tokens(&m, "unable"), ["[UNK]"]);
    }

    #[test]
    fn overlong_words_are_unknown() {
        let m = model(&["[UNK]", "a", "##a"]);
        assert_eq!(tokens(&m, &"a".repeat(100)).len(), 100);
        assert_eq!(tokens(&m, &"a".repeat(101)), ["[UNK]"]);
    }

    #[test]
    fn multibyte_pieces() {
        let m = model(&["[UNK]", "é", "##té"]);
        let pieces = m.encode("été");
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[1].range, 2..5);
    }
}
