mod algorithm;

use crate::{model::byte_fallback, model::Piece, utok, Error, Mask, Method, Result, Vocab};
use memchr::memchr;
use std::{collections::HashMap, fs, path::Path};
use tracing::{debug, warn};

/// How a segment's characters become symbols, and symbols become tokens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WordMode {
    /// Symbols are looked up as they are (byte-level GPT-2, SentencePiece BPE).
    Plain,
    /// The last character of a segment carries `suffix` (`</w>` in OpenAI GPT).
    EndOfWord { suffix: String },
    /// As `EndOfWord`, but in the vocabulary the suffix is dropped from the
    /// last piece and every other piece carries `continuation` (CTRL's `@@`).
    Continuation {
        end_of_word: String,
        continuation: String,
    },
}

impl WordMode {
    pub fn end_of_word(suffix: &str) -> Self {
        Self::EndOfWord {
            suffix: suffix.to_string(),
        }
    }

    pub fn ctrl() -> Self {
        Self::Continuation {
            end_of_word: "</w>".to_string(),
            continuation: "@@".to_string(),
        }
    }

    fn suffix(&self) -> Option<&str> {
        match self {
            Self::Plain => None,
            Self::EndOfWord { suffix } => Some(suffix),
            Self::Continuation { end_of_word, .. } => Some(end_of_word),
        }
    }
}

/// Byte-pair encoding driven by a merge-rank table.
#[derive(Clone, Debug)]
pub struct Bpe {
    vocab: Vocab,
    /// 不在词表中、但出现在合并规则里的符号，编号从词表大小开始
    extra: HashMap<String, u32>,
    extra_text: Vec<String>,
    /// (left, right) -> (rank, merged)
    merges: HashMap<(u32, u32), (u32, u32)>,
    mode: WordMode,
}

impl Bpe {
    /// Builds from a vocabulary and the text of a merges file: one
    /// `left right` pair per line, rank = line order, an optional
    /// `#version` header.
    pub fn from_merges(vocab: Vocab, merges: &str, mode: WordMode) -> Result<Self> {
        let mut bpe = Self::empty(vocab, mode);
        let mut rank = 0u32;
        for (i, line) in merges.lines().enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            if i == 0 && line.starts_with("#version") {
                debug!(header = line, "skipping merges header");
                continue;
            }
            let (left, right) = match memchr(b' ', line.as_bytes()) {
                Some(sp) => (&line[..sp], &line[sp + 1..]),
                None => ("", ""),
            };
            if left.is_empty() || right.is_empty() || right.contains(' ') {
                return Err(Error::MalformedMergeTable {
                    line: i + 1,
                    reason: format!("expected two symbols separated by one space, found {line:?}"),
                });
            }
            if bpe.add_merge(left, right, rank) {
                rank += 1;
            } else {
                warn!(line = i + 1, left, right, "duplicate merge ignored");
            }
        }
        debug!(
            vocab_size = bpe.vocab.len(),
            merges = bpe.merges.len(),
            extra_symbols = bpe.extra_text.len(),
            "BPE model built"
        );
        Ok(bpe)
    }

    /// Reads `vocab.json` (or `vocab.txt`) and `merges.txt`.
    pub fn from_files(
        vocab: impl AsRef<Path>,
        merges: impl AsRef<Path>,
        unk: &str,
        mode: WordMode,
    ) -> Result<Self> {
        let vocab = Vocab::from_file(vocab, unk)?;
        let merges = merges.as_ref();
        let text = fs::read_to_string(merges).map_err(|e| Error::file(merges, e))?;
        Self::from_merges(vocab, &text, mode)
    }

    /// Builds a SentencePiece-style BPE, where a piece's score orders its merges.
    ///
    /// Every split of a mergeable piece into two mergeable pieces becomes a merge
    /// rule, ranked by the merged piece's score (higher score merges first).
    pub fn from_scores(
        vocab: Vocab,
        scores: &[f32],
        mergeable: impl Fn(utok) -> bool,
    ) -> Result<Self> {
        if scores.len() != vocab.len() {
            return Err(Error::MalformedModel(format!(
                "{} scores for {} pieces",
                scores.len(),
                vocab.len()
            )));
        }
        let ranks = rank(scores);
        let mut merges = HashMap::new();
        for (id, piece) in vocab.iter() {
            if !mergeable(id) {
                continue;
            }
            for (k, _) in piece.char_indices().skip(1) {
                let (l, r) = piece.split_at(k);
                match (vocab.get(l), vocab.get(r)) {
                    (Some(l), Some(r)) if mergeable(l) && mergeable(r) => {
                        merges.entry((l, r)).or_insert((ranks[id as usize], id));
                    }
                    _ => {}
                }
            }
        }
        debug!(
            vocab_size = vocab.len(),
            merges = merges.len(),
            "score-ranked BPE model built"
        );
        Ok(Self {
            vocab,
            extra: HashMap::new(),
            extra_text: Vec::new(),
            merges,
            mode: WordMode::Plain,
        })
    }

    fn empty(vocab: Vocab, mode: WordMode) -> Self {
        Self {
            vocab,
            extra: HashMap::new(),
            extra_text: Vec::new(),
            merges: HashMap::new(),
            mode,
        }
    }

    /// Records `left + right`; `false` when the pair was already ranked.
    fn add_merge(&mut self, left: &str, right: &str, rank: u32) -> bool {
        let l = self.intern(left);
        let r = self.intern(right);
        if self.merges.contains_key(&(l, r)) {
            return false;
        }
        let merged = self.intern(&format!("{left}{right}"));
        self.merges.insert((l, r), (rank, merged));
        true
    }

    fn intern(&mut self, symbol: &str) -> u32 {
        if let Some(id) = self.symbol_id(symbol) {
            return id;
        }
        let id = (self.vocab.len() + self.extra_text.len()) as u32;
        self.extra.insert(symbol.to_string(), id);
        self.extra_text.push(symbol.to_string());
        id
    }

    /// symbol -> symbol id; vocabulary tokens keep their token id
    #[inline]
    fn symbol_id(&self, symbol: &str) -> Option<u32> {
        self.vocab
            .get(symbol)
            .or_else(|| self.extra.get(symbol).copied())
    }

    #[inline]
    fn symbol(&self, sym: u32) -> &str {
        match (sym as usize).checked_sub(self.vocab.len()) {
            None => self.vocab.token(sym),
            Some(i) => &self.extra_text[i],
        }
    }

    #[inline]
    pub fn mode(&self) -> &WordMode {
        &self.mode
    }

    /// Number of merge rules.
    #[inline]
    pub fn merges_len(&self) -> usize {
        self.merges.len()
    }

    /// Token id for a final symbol, given whether it ends the segment.
    /// `text` is the segment text the symbol covers.
    fn token_of(&self, sym: Option<u32>, text: &str, last: bool) -> Option<utok> {
        let owned;
        let text = match (sym, self.mode.suffix()) {
            (Some(sym), _) => match self.mode {
                WordMode::Continuation { .. } => self.symbol(sym),
                _ => return ((sym as usize) < self.vocab.len()).then_some(sym),
            },
            (None, Some(suffix)) if last => {
                owned = format!("{text}{suffix}");
                &owned
            }
            (None, _) => text,
        };
        match &self.mode {
            WordMode::Continuation {
                end_of_word,
                continuation,
            } => {
                if last {
                    self.vocab
                        .get(text.strip_suffix(end_of_word.as_str()).unwrap_or(text))
                } else {
                    self.vocab.get(&format!("{text}{continuation}"))
                }
            }
            _ => self.vocab.get(text),
        }
    }
}

impl Method for Bpe {
    #[inline]
    fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    fn encode(&self, segment: &str) -> Vec<Piece> {
        let mut state = self.begin_merge(segment);
        while state.merge() {}

        let symbols = state.into_iter().collect::<Vec<_>>();
        let n = symbols.len();
        let mut pieces = Vec::with_capacity(n);
        for (i, (sym, range)) in symbols.into_iter().enumerate() {
            let first = range.start == 0;
            let token = self.token_of(sym, &segment[range.clone()], i + 1 == n);
            match token {
                Some(id) => {
                    let mask = if first {
                        Mask::None
                    } else {
                        Mask::Continuation
                    };
                    pieces.push(Piece::new(id, range, mask));
                }
                None => {
                    if !byte_fallback(&self.vocab, segment, range.clone(), first, &mut pieces) {
                        pieces.push(Piece::new(self.vocab.unk_id(), range, Mask::Unknown));
                    }
                }
            }
        }
        pieces
    }
}

/// 对一组评分排序并重新赋权，转换为保持相同顺序的整型序列，评分越高排名越靠前
fn rank(scores: &[f32]) -> Vec<u32> {
    use std::{
        cmp::Ordering,
        collections::{BTreeMap, BTreeSet},
    };

    #[derive(PartialEq, Debug)]
    struct FloatOrd(f32);
    impl Eq for FloatOrd {}
    impl PartialOrd for FloatOrd {
        #[inline]
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }
    impl Ord for FloatOrd {
        #[inline]
        fn cmp(&self, other: &Self) -> Ordering {
            self.0.total_cmp(&other.0)
        }
    }

    let map = scores
        // 排序 + 去重
        .iter()
        .copied()
        .map(FloatOrd)
        .collect::<BTreeSet<_>>()
        // 重新赋权
        .into_iter()
        .rev()
        .enumerate()
        .map(|(i, f)| (f, i as u32))
        .collect::<BTreeMap<_, _>>();

    scores.iter().map(|f| map[&FloatOrd(*f)]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(tokens: &[&str]) -> Vocab {
        Vocab::new(tokens.iter().map(|t| t.to_string()), "<unk>").unwrap()
    }

    fn tokens(bpe: &Bpe, text: &str) -> Vec<String> {
        bpe.encode(text)
            .into_iter()
            .map(|p| bpe.vocab().lookup_token(p.id).unwrap().to_string())
            .collect()
    }

    #[test]
    fn lowest_rank_merges_first() {
        let v = vocab(&["<unk>", "a", "b", "c", "ab", "bc", "abc"]);
        let bpe = Bpe::from_merges(v, "a b\nab c\nb c\n", WordMode::Plain).unwrap();
        assert_eq!(tokens(&bpe, "abc"), ["abc"]);
        // "b c" 排在 "a b" 之后，不会抢先合并
        assert_eq!(tokens(&bpe, "abcbc"), ["abc", "bc"]);
    }

    #[test]
    fn rank_order_changes_result() {
        let v = vocab(&["<unk>", "a", "b", "c", "ab", "bc"]);
        let bpe = Bpe::from_merges(v, "b c\na b\n", WordMode::Plain).unwrap();
        assert_eq!(tokens(&bpe, "abc"), ["a", "bc"]);
    }

    #[test]
    fn ranges_cover_the_segment() {
        let v = vocab(&["<unk>", "h", "e", "l", "o", "he", "ll", "llo", "hello"]);
        let bpe = Bpe::from_merges(v, "#version: 0.2\nh e\nl l\nll o\nhe llo\n", WordMode::Plain)
            .unwrap();
        let pieces = bpe.encode("hellohe");
        assert_eq!(
            pieces.iter().map(|p| p.range.clone()).collect::<Vec<_>>(),
            [0..5, 5..7]
        );
        assert_eq!(pieces[1].mask, Mask::Continuation);
    }

    #[test]
    fn unknown_symbols_fall_back() {
        let v = vocab(&["<unk>", "a", "b"]);
        let bpe = Bpe::from_merges(v, "a b\n", WordMode::Plain).unwrap();
        // "ab" 不在词表中
        let pieces = bpe.encode("abx");
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].id, 0);
        assert_eq!(pieces[0].range, 0..2);
        assert_eq!(pieces[1].mask, Mask::Unknown);
    }

    #[test]
    fn end_of_word_suffix() {
        let v = vocab(&["<unk>", "l", "o</w>", "lo</w>", "lo", "o"]);
        let bpe = Bpe::from_merges(v, "l o</w>\n", WordMode::end_of_word("</w>")).unwrap();
        assert_eq!(tokens(&bpe, "lo"), ["lo</w>"]);
        assert_eq!(tokens(&bpe, "ol"), ["o", "<unk>"]);
    }

    #[test]
    fn ctrl_continuation() {
        let v = vocab(&["<unk>", "he@@", "llo", "h@@", "e@@"]);
        let merges = "h e\nl l\nll o</w>\n";
        let bpe = Bpe::from_merges(v, merges, WordMode::ctrl()).unwrap();
        assert_eq!(tokens(&bpe, "hello"), ["he@@", "llo"]);
    }

    #[test]
    fn malformed_merges() {
        let v = vocab(&["<unk>", "a"]);
        let err = Bpe::from_merges(v.clone(), "a b\nabc\n", WordMode::Plain).unwrap_err();
        assert!(matches!(err, Error::MalformedMergeTable { line: 2, .. }));
        let err = Bpe::from_merges(v, "a b c\n", WordMode::Plain).unwrap_err();
        assert!(matches!(err, Error::MalformedMergeTable { line: 1, .. }));
    }

    #[test]
    fn score_ranked_merges() {
        let v = vocab(&["<unk>", "▁", "a", "b", "ab", "▁ab", "▁a"]);
        let scores = [0.0, -1.0, -1.0, -1.0, -2.0, -3.0, -4.0];
        let bpe = Bpe::from_scores(v, &scores, |id| id != 0).unwrap();
        // "ab"(-2) 先于 "▁a"(-4)，随后 "▁"+"ab" 合并为 "▁ab"
        assert_eq!(tokens(&bpe, "▁ab"), ["▁ab"]);
        assert_eq!(tokens(&bpe, "▁ba"), ["▁", "b", "a"]);
    }

    #[test]
    fn equal_scores_merge_leftmost_first() {
        let v = vocab(&["<unk>", "a", "b", "ba", "ab"]);
        let scores = [0.0, -1.0, -1.0, -2.0, -2.0];
        let bpe = Bpe::from_scores(v, &scores, |id| id != 0).unwrap();
        // "ab" 与 "ba" 同分，左侧的合并优先
        assert_eq!(tokens(&bpe, "aba"), ["ab", "a"]);
        assert_eq!(tokens(&bpe, "bab"), ["ba", "b"]);
    }

    #[test]
    fn ranks_follow_scores() {
        assert_eq!(rank(&[-1.0, 0.0, -1.0, -5.5]), [1, 0, 1, 2]);
    }
}
