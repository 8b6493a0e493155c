//! Integration tests for the BPE schemes: GPT-2, RoBERTa, OpenAI GPT and CTRL.

mod common;

use common::{byte_level, tokens, vocab_json, write};
use polytok::{
    new_tokenizer, Bpe, Error, Method, Offset, Scheme, Tokenizer, TokenizerConfig, Vocab,
    WordMode,
};

/// Merges apply in rank order: `a b` then `ab c` gives `abc`.
#[test]
fn test_bpe_merge_ranks() {
    let vocab = Vocab::new(["<unk>", "a", "b", "c", "ab", "abc"].map(String::from), "<unk>").unwrap();
    let bpe = Bpe::from_merges(vocab, "a b\nab c\n", WordMode::Plain).unwrap();
    assert_eq!(bpe.merges_len(), 2);
    let tokenizer = Tokenizer::new(bpe, TokenizerConfig::default()).unwrap();
    let enc = tokenizer.encode("abc cab", false, None).unwrap();
    assert_eq!(tokens(&tokenizer, &enc.ids), ["abc", "c", "ab"]);
}

/// Byte-level BPE maps spaces to `Ġ` and back.
#[test]
fn test_gpt2_roundtrip() {
    let tokenizer = byte_level(Scheme::Gpt2, TokenizerConfig::default());
    let enc = tokenizer.encode("hello world", true, None).unwrap();
    assert_eq!(tokens(&tokenizer, &enc.ids), ["hello", "Ġworld"]);
    assert_eq!(
        enc.offsets().collect::<Vec<_>>(),
        [Offset::new(0, 5), Offset::new(5, 11)]
    );
    assert_eq!(tokenizer.decode(&enc.ids, true).unwrap(), "hello world");
}

/// Characters without a symbol become the unknown token.
#[test]
fn test_gpt2_unknown() {
    let tokenizer = byte_level(Scheme::Gpt2, TokenizerConfig::default());
    let enc = tokenizer.encode("hello!", false, None).unwrap();
    assert_eq!(tokens(&tokenizer, &enc.ids), ["hello", "<|endoftext|>"]);
    assert_eq!(enc.tokens[1].offset, Offset::new(5, 6));
}

/// The prefix space makes the first word look like any other.
#[test]
fn test_gpt2_prefix_space() {
    let tokenizer = byte_level(
        Scheme::Gpt2,
        TokenizerConfig {
            add_prefix_space: true,
            ..Default::default()
        },
    );
    let enc = tokenizer.encode("world", false, None).unwrap();
    assert_eq!(tokens(&tokenizer, &enc.ids), ["Ġworld"]);
    assert_eq!(enc.tokens[0].offset, Offset::new(0, 5));
}

/// RoBERTa wraps sequences in `<s>`/`</s>` and doubles the separator for pairs.
#[test]
fn test_roberta_template() {
    let tokenizer = byte_level(Scheme::Roberta, TokenizerConfig::default());
    let enc = tokenizer.encode("hello", true, None).unwrap();
    assert_eq!(tokens(&tokenizer, &enc.ids), ["<s>", "hello", "</s>"]);

    let enc = tokenizer.encode_pair("hello", " world", true, None).unwrap();
    assert_eq!(
        tokens(&tokenizer, &enc.ids),
        ["<s>", "hello", "</s>", "</s>", "Ġworld", "</s>"]
    );
    assert_eq!(enc.type_ids, [0, 0, 0, 1, 1, 1]);
    assert_eq!(tokenizer.decode(&enc.ids, true).unwrap(), "hello world");
}

/// OpenAI GPT marks word ends with `</w>` and always lowercases.
#[test]
fn test_openai_gpt_end_of_word() {
    let dir = tempfile::tempdir().unwrap();
    let vocab = write(
        dir.path(),
        "vocab.json",
        &vocab_json(&[
            "<unk>", "l", "o", "w", "e", "r</w>", "w</w>", "lo", "low", "low</w>", "er</w>",
            "lower</w>",
        ]),
    );
    let merges = write(dir.path(), "merges.txt", "l o\nlo w</w>\nlo w\ne r</w>\nlow er</w>\n");
    let tokenizer = new_tokenizer(
        Scheme::OpenAiGpt,
        &vocab,
        Some(&merges),
        TokenizerConfig::default(),
    )
    .unwrap();
    let enc = tokenizer.encode("Low LOWER", false, None).unwrap();
    assert_eq!(tokens(&tokenizer, &enc.ids), ["low</w>", "lower</w>"]);
    assert_eq!(tokenizer.decode(&enc.ids, false).unwrap(), "low lower");
}

/// CTRL spells non-final pieces with `@@`.
#[test]
fn test_ctrl_continuations() {
    let dir = tempfile::tempdir().unwrap();
    let vocab = write(dir.path(), "vocab.txt", "<unk>\nhel@@\nlo\nworld\n");
    let merges = write(
        dir.path(),
        "merges.txt",
        "h e\nhe l\nl o</w>\nw o\nwo r\nwor l\nworl d</w>\n",
    );
    let tokenizer =
        new_tokenizer(Scheme::Ctrl, &vocab, Some(&merges), TokenizerConfig::default()).unwrap();
    let enc = tokenizer.encode("hello world", false, None).unwrap();
    assert_eq!(tokens(&tokenizer, &enc.ids), ["hel@@", "lo", "world"]);
    assert_eq!(tokenizer.decode(&enc.ids, false).unwrap(), "hello world");
}

/// A merges line with one symbol is rejected with its line number.
#[test]
fn test_malformed_merges() {
    let dir = tempfile::tempdir().unwrap();
    let vocab = write(dir.path(), "vocab.json", &vocab_json(&["<|endoftext|>", "a", "b"]));
    let merges = write(dir.path(), "merges.txt", "#version: 0.2\na b\nab\n");
    let err = new_tokenizer(Scheme::Gpt2, &vocab, Some(&merges), TokenizerConfig::default())
        .unwrap_err();
    assert!(matches!(err, Error::MalformedMergeTable { line: 3, .. }));
}

/// Vocabulary ids in a JSON file must be contiguous.
#[test]
fn test_vocab_json_gap() {
    let dir = tempfile::tempdir().unwrap();
    let vocab = write(dir.path(), "vocab.json", r#"{"<|endoftext|>": 0, "a": 2}"#);
    let merges = write(dir.path(), "merges.txt", "");
    let err = new_tokenizer(Scheme::Gpt2, &vocab, Some(&merges), TokenizerConfig::default())
        .unwrap_err();
    assert!(matches!(err, Error::MalformedVocabulary(_)));
}

/// The model can be used without the pipeline.
#[test]
fn test_model_method() {
    let tokenizer = byte_level(Scheme::Gpt2, TokenizerConfig::default());
    let model = tokenizer.model();
    assert_eq!(model.vocab_size(), tokenizer.vocab_size());
    let pieces = model.encode("Ġworld");
    assert_eq!(pieces.len(), 1);
    assert_eq!(pieces[0].range, 0.."Ġworld".len());
}
