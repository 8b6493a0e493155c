//! Tiny on-disk artifacts shared by the integration tests.

#![allow(dead_code)]

use polytok::{new_tokenizer, Scheme, Tokenizer, TokenizerConfig};
use std::{fs, path::Path};

pub const BERT_VOCAB: &[&str] = &[
    "[PAD]", "[UNK]", "[CLS]", "[SEP]", "[MASK]", "hello", "world", "the", "quick", "brown",
    "fox", "jumps", "over", "lazy", "dog", "un", "##aff", "##able", ",", ".", "!", "你", "好",
];

pub const BYTE_LEVEL_VOCAB: &[&str] = &[
    "<|endoftext|>", "<s>", "</s>", "<pad>", "<unk>", "<mask>", "h", "e", "l", "o", "Ġ", "w",
    "r", "d", "he", "ll", "llo", "hello", "Ġw", "or", "Ġwor", "ld", "Ġworld",
];

pub const BYTE_LEVEL_MERGES: &str = "#version: 0.2
h e
l l
ll o
he llo
Ġ w
o r
Ġw or
l d
Ġwor ld
";

pub const SPIECE: &[(&str, f32)] = &[
    ("<unk>", 0.),
    ("<s>", 0.),
    ("</s>", 0.),
    ("▁", -2.),
    ("▁hello", -3.),
    ("▁world", -3.),
    ("h", -5.),
    ("e", -5.),
    ("l", -5.),
    ("o", -5.),
    ("w", -5.),
    ("r", -5.),
    ("d", -5.),
];

pub fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

pub fn vocab_json(tokens: &[&str]) -> String {
    let map = tokens
        .iter()
        .enumerate()
        .map(|(i, t)| (t.to_string(), serde_json::Value::from(i)))
        .collect::<serde_json::Map<_, _>>();
    serde_json::Value::Object(map).to_string()
}

pub fn spiece_text(pieces: &[(&str, f32)]) -> String {
    pieces
        .iter()
        .map(|(p, s)| format!("{p}\t{s}\n"))
        .collect()
}

pub fn bert(config: TokenizerConfig) -> Tokenizer {
    let dir = tempfile::tempdir().unwrap();
    let vocab = write(dir.path(), "vocab.txt", &BERT_VOCAB.join("\n"));
    new_tokenizer(Scheme::Bert, vocab, None, config).unwrap()
}

pub fn byte_level(scheme: Scheme, config: TokenizerConfig) -> Tokenizer {
    let dir = tempfile::tempdir().unwrap();
    let vocab = write(dir.path(), "vocab.json", &vocab_json(BYTE_LEVEL_VOCAB));
    let merges = write(dir.path(), "merges.txt", BYTE_LEVEL_MERGES);
    new_tokenizer(scheme, vocab, Some(&merges), config).unwrap()
}

/// A SentencePiece text export of `pieces`, loaded as `scheme`.
pub fn sentencepiece(scheme: Scheme, pieces: &[(&str, f32)], config: TokenizerConfig) -> Tokenizer {
    let dir = tempfile::tempdir().unwrap();
    let model = write(dir.path(), "spiece.vocab", &spiece_text(pieces));
    new_tokenizer(scheme, model, None, config).unwrap()
}

/// Spellings of `ids`.
pub fn tokens(tokenizer: &Tokenizer, ids: &[u32]) -> Vec<String> {
    ids.iter()
        .map(|&id| tokenizer.id_to_token(id).unwrap().to_string())
        .collect()
}
