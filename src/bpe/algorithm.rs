use super::Bpe;
use std::{
    cmp::Ordering::{self, Equal},
    collections::BinaryHeap,
    fmt,
    ops::Range,
};

/// 未知字符或已被合并的位置
const NONE: u32 = u32::MAX;

pub(super) struct MergeState<'b, 't> {
    text: &'t str,
    bpe: &'b Bpe,
    marks: Vec<Mark>,
    merges: BinaryHeap<Merge>,
}

pub(super) struct IntoIter {
    marks: Vec<Mark>,
    i: usize,
}

pub(super) struct Iter<'a> {
    marks: &'a [Mark],
    i: usize,
}

impl Bpe {
    pub(super) fn begin_merge<'b, 't>(&'b self, text: &'t str) -> MergeState<'b, 't> {
        let mut marks = vec![Mark::DEAD; text.len()];
        let mut merges = BinaryHeap::new();

        let suffix = self.mode.suffix();
        let mut buf = String::new();
        let mut last = None;
        for (i, c) in text.char_indices() {
            let len = c.len_utf8();
            buf.clear();
            buf.push(c);
            // 词尾字符带上词尾标记
            if i + len == text.len() {
                if let Some(suffix) = suffix {
                    buf.push_str(suffix);
                }
            }
            let sym = self.symbol_id(&buf).unwrap_or(NONE);
            marks[i] = Mark {
                sym,
                len: len as _,
                back: last.map_or(0, |p| (i - p) as _),
            };
            if let Some(p) = last {
                if let Some(merge) = self.build_merge(p, marks[p].sym, sym) {
                    merges.push(merge);
                }
            }
            last = Some(i);
        }

        MergeState {
            text,
            bpe: self,
            marks,
            merges,
        }
    }

    fn build_merge(&self, pos: usize, left: u32, right: u32) -> Option<Merge> {
        if left == NONE || right == NONE {
            return None;
        }
        self.merges
            .get(&(left, right))
            .map(|&(rank, merged)| Merge {
                pos,
                pair: (left, right),
                merged,
                rank,
            })
    }
}

/// 以符号起始字节为下标的标记，其余字节为 DEAD
#[derive(Clone, Copy, Debug)]
struct Mark {
    sym: u32,
    /// bytes of text the symbol covers
    len: u32,
    /// distance back to the previous symbol's start, 0 for the first
    back: u32,
}

impl Mark {
    const DEAD: Self = Self {
        sym: NONE,
        len: 0,
        back: 0,
    };
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Merge {
    pos: usize,
    pair: (u32, u32),
    merged: u32,
    rank: u32,
}
impl Ord for Merge {
    fn cmp(&self, other: &Self) -> Ordering {
        // 比较顺序：rank -> pos -> merged -> pair
        match self.rank.cmp(&other.rank) {
            Equal => match self.pos.cmp(&other.pos) {
                Equal => match self.merged.cmp(&other.merged) {
                    Equal => self.pair.cmp(&other.pair),
                    other => other,
                },
                other => other,
            },
            other => other,
        }
        .reverse()
    }
}
impl PartialOrd for Merge {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl MergeState<'_, '_> {
    /// 尝试执行一次合并，返回是否成功执行了一次合并。
    pub fn merge(&mut self) -> bool {
        // 一次合并将涉及至多 4 个符号：
        //
        // t0 t1 t2 t3
        // -- -- -- --
        //      ↓
        // t0 merge t3
        // -- ----- --
        //
        // 成功的合并将至少消费合并队列中的 1 个项，
        // 同时至多向合并队列添加 2 个项。
        while let Some(Merge {
            pos: p1,
            pair: (t1, t2),
            merged,
            ..
        }) = self.merges.pop()
        {
            // 确认合并项有效性
            let m1 = self.marks[p1];
            if m1.sym != t1 {
                continue;
            }
            let p2 = p1 + m1.len as usize;
            let m2 = match self.marks.get(p2) {
                Some(m2) if m2.sym == t2 => *m2,
                _ => continue,
            };
            // 合并
            self.marks[p1].sym = merged;
            self.marks[p1].len += m2.len;
            self.marks[p2] = Mark::DEAD;

            // 创建 merge + t3 合并项
            let p3 = p2 + m2.len as usize;
            if let Some(m3) = self.marks.get_mut(p3) {
                m3.back = (p3 - p1) as _;
                let t3 = m3.sym;
                if let Some(merge) = self.bpe.build_merge(p1, merged, t3) {
                    self.merges.push(merge);
                }
            }
            // 创建 t0 + merge 合并项
            match m1.back as usize {
                0 => {}
                l0 => {
                    let p0 = p1 - l0;
                    let t0 = self.marks[p0].sym;
                    if let Some(merge) = self.bpe.build_merge(p0, t0, merged) {
                        self.merges.push(merge);
                    }
                }
            }
            return true;
        }
        false
    }

    #[inline]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            marks: &self.marks,
            i: 0,
        }
    }
}

impl IntoIterator for MergeState<'_, '_> {
    /// symbol (`None` for a character outside the symbol table) and its byte range
    type Item = (Option<u32>, Range<usize>);
    type IntoIter = IntoIter;
    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        Self::IntoIter {
            marks: self.marks,
            i: 0,
        }
    }
}

#[inline]
fn step(marks: &[Mark], i: &mut usize) -> Option<(Option<u32>, Range<usize>)> {
    let mark = marks.get(*i)?;
    let start = *i;
    *i += mark.len as usize;
    Some(((mark.sym != NONE).then_some(mark.sym), start..*i))
}

impl Iterator for IntoIter {
    type Item = (Option<u32>, Range<usize>);

    fn next(&mut self) -> Option<Self::Item> {
        step(&self.marks, &mut self.i)
    }
}

impl Iterator for Iter<'_> {
    type Item = (Option<u32>, Range<usize>);

    fn next(&mut self) -> Option<Self::Item> {
        step(self.marks, &mut self.i)
    }
}

impl fmt::Display for MergeState<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "---------------------------")?;
        writeln!(f, "text:")?;
        writeln!(f, "  {}", self.text)?;
        writeln!(f, "---------------------------")?;
        writeln!(f, "symbols:")?;
        for (sym, range) in self.iter() {
            match sym {
                Some(sym) => writeln!(f, "  {sym:>6}: {}", self.bpe.symbol(sym))?,
                None => writeln!(f, "  {:>6}: {:?}", "?", &self.text[range])?,
            }
        }
        writeln!(f, "---------------------------")?;
        writeln!(f, "merges:")?;
        let mut merges = self.merges.clone();
        while let Some(Merge { rank, merged, .. }) = merges.pop() {
            writeln!(f, "  {rank:>6} | {}", self.bpe.symbol(merged))?;
        }
        writeln!(f, "---------------------------")
    }
}

#[cfg(test)]
mod tests {
    use crate::{Bpe, Vocab, WordMode};

    fn bpe() -> Bpe {
        let vocab = Vocab::new(
            ["<unk>", "a", "b", "c", "ab", "abc"].map(String::from),
            "<unk>",
        )
        .unwrap();
        Bpe::from_merges(vocab, "a b\nab c\n", WordMode::Plain).unwrap()
    }

    #[test]
    fn merges_until_exhausted() {
        let bpe = bpe();
        let mut state = bpe.begin_merge("abxc");
        assert!(state.merge());
        // "ab" 与 "c" 之间隔着未知字符，无法继续合并
        assert!(!state.merge());
        let symbols = state.into_iter().collect::<Vec<_>>();
        assert_eq!(
            symbols,
            [(Some(4), 0..2), (None, 2..3), (Some(3), 3..4)]
        );
    }

    #[test]
    fn stale_merges_are_skipped() {
        let bpe = bpe();
        // 两个 "a b" 合并项与一个后续 "ab c"
        let mut state = bpe.begin_merge("ababc");
        let mut n = 0;
        while state.merge() {
            n += 1;
        }
        assert_eq!(n, 3);
        let ranges = state.iter().map(|(_, r)| r).collect::<Vec<_>>();
        assert_eq!(ranges, [0..2, 2..5]);
    }

    #[test]
    fn display_lists_state() {
        let bpe = bpe();
        let state = bpe.begin_merge("abc");
        let text = state.to_string();
        assert!(text.contains("text:\n  abc"));
        assert!(text.contains("merges:"));
        assert!(text.contains("| ab"));
    }
}
