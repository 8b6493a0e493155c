//! Integration tests for the BERT (WordPiece) scheme.

mod common;

use common::{bert, tokens, write, BERT_VOCAB};
use polytok::{Error, Mask, Offset, Scheme, Tokenizer, TokenizerConfig, TruncationStrategy};

fn lowercase() -> TokenizerConfig {
    TokenizerConfig {
        lowercase: true,
        ..Default::default()
    }
}

/// Whole-word tokens decode back to the input.
#[test]
fn test_bert_hello_world_roundtrip() {
    let tokenizer = bert(TokenizerConfig::default());
    let enc = tokenizer.encode("hello world", true, None).unwrap();
    assert_eq!(tokens(&tokenizer, &enc.ids), ["[CLS]", "hello", "world", "[SEP]"]);
    assert_eq!(enc.special_tokens_mask, [true, false, false, true]);
    assert_eq!(tokenizer.decode(&enc.ids, true).unwrap(), "hello world");
}

/// Greedy longest-prefix splitting with `##` continuations.
#[test]
fn test_bert_subwords() {
    let tokenizer = bert(TokenizerConfig::default());
    let enc = tokenizer.encode("unaffable", false, None).unwrap();
    assert_eq!(tokens(&tokenizer, &enc.ids), ["un", "##aff", "##able"]);
    let masks = enc.tokens.iter().map(|t| t.mask).collect::<Vec<_>>();
    assert_eq!(masks, [Mask::None, Mask::Continuation, Mask::Continuation]);
    assert_eq!(tokenizer.decode(&enc.ids, true).unwrap(), "unaffable");
}

/// A 10-token sequence under max length 5 keeps 3 tokens plus `[CLS]` and `[SEP]`.
#[test]
fn test_bert_truncation() {
    let tokenizer = bert(TokenizerConfig::default());
    let text = "the quick brown fox jumps over the lazy dog.";
    assert_eq!(tokenizer.encode(text, false, None).unwrap().len(), 10);

    let enc = tokenizer.encode(text, true, Some(5)).unwrap();
    assert_eq!(enc.len(), 5);
    assert_eq!(
        tokens(&tokenizer, &enc.ids),
        ["[CLS]", "the", "quick", "brown", "[SEP]"]
    );
    assert_eq!(enc.sequence_ids.iter().filter(|s| s.is_some()).count(), 3);
    assert_eq!(enc.num_truncated_tokens, 7);
    assert_eq!(enc.overflowing_tokens.len(), 7);
}

/// Truncation can be turned into an error.
#[test]
fn test_bert_do_not_truncate() {
    let tokenizer = bert(TokenizerConfig {
        truncation: TruncationStrategy::DoNotTruncate,
        ..Default::default()
    });
    let err = tokenizer
        .encode("the quick brown fox", true, Some(4))
        .unwrap_err();
    assert!(matches!(err, Error::InputTooLong { len: 6, max: 4 }));
    assert!(!err.is_construction());
}

/// Pairs get segment ids and a second `[SEP]`.
#[test]
fn test_bert_pair() {
    let tokenizer = bert(TokenizerConfig::default());
    let enc = tokenizer.encode_pair("hello", "world", true, None).unwrap();
    assert_eq!(
        tokens(&tokenizer, &enc.ids),
        ["[CLS]", "hello", "[SEP]", "world", "[SEP]"]
    );
    assert_eq!(enc.type_ids, [0, 0, 0, 1, 1]);
    assert_eq!(enc.sequence_ids, [None, Some(0), None, Some(1), None]);
    // 偏移量相对各自的输入文本
    assert_eq!(enc.tokens[3].offset, Offset::new(0, 5));
}

/// Lowercasing strips accents, with offsets into the original text.
#[test]
fn test_bert_normalization_offsets() {
    let tokenizer = bert(lowercase());
    let enc = tokenizer.encode("HÉLLO  Wörld", false, None).unwrap();
    assert_eq!(tokens(&tokenizer, &enc.ids), ["hello", "world"]);
    let offsets = enc.offsets().collect::<Vec<_>>();
    assert_eq!(offsets, [Offset::new(0, 6), Offset::new(8, 14)]);
}

/// CJK ideographs are words of their own.
#[test]
fn test_bert_cjk() {
    let tokenizer = bert(TokenizerConfig::default());
    let enc = tokenizer.encode("你好", false, None).unwrap();
    assert_eq!(tokens(&tokenizer, &enc.ids), ["你", "好"]);
    assert_eq!(
        enc.offsets().collect::<Vec<_>>(),
        [Offset::new(0, 3), Offset::new(3, 6)]
    );
}

/// Unknown words become `[UNK]`; decoding them is lossy.
#[test]
fn test_bert_unknown() {
    let tokenizer = bert(TokenizerConfig::default());
    let enc = tokenizer.encode("hello xyz", false, None).unwrap();
    assert_eq!(enc.ids, [5, 1]);
    assert_eq!(enc.tokens[1].mask, Mask::Unknown);
    assert_eq!(enc.tokens[1].offset, Offset::new(6, 9));
    assert_eq!(tokenizer.decode(&enc.ids, false).unwrap(), "hello [UNK]");
}

/// Special tokens written in the text are kept whole.
#[test]
fn test_bert_special_tokens_in_text() {
    let tokenizer = bert(lowercase());
    let enc = tokenizer.encode("Hello [MASK]!", false, None).unwrap();
    assert_eq!(tokens(&tokenizer, &enc.ids), ["hello", "[MASK]", "!"]);
    assert_eq!(enc.tokens[1].mask, Mask::Special);
}

/// Decoding removes the spaces left before punctuation.
#[test]
fn test_bert_decode_clean_up() {
    let tokenizer = bert(lowercase());
    let enc = tokenizer.encode("Hello, world!", true, None).unwrap();
    assert_eq!(tokenizer.decode(&enc.ids, true).unwrap(), "hello, world!");

    let raw = bert(TokenizerConfig {
        lowercase: true,
        clean_up_tokenization_spaces: Some(false),
        ..Default::default()
    });
    assert_eq!(raw.decode(&enc.ids, true).unwrap(), "hello , world !");
}

/// Batches keep input order.
#[test]
fn test_bert_batch_order() {
    let tokenizer = bert(TokenizerConfig::default());
    let texts = [
        "hello",
        "the quick brown fox jumps over the lazy dog",
        "",
        "world hello",
        "unaffable fox",
    ];
    let batch = tokenizer.encode_batch(&texts, true, None).unwrap();
    assert_eq!(batch.len(), texts.len());
    for (text, enc) in texts.iter().zip(&batch) {
        assert_eq!(enc, &tokenizer.encode(text, true, None).unwrap());
    }

    let pairs = [("hello", "world"), ("dog", "the lazy dog")];
    let batch = tokenizer.encode_pair_batch(&pairs, true, None).unwrap();
    for ((a, b), enc) in pairs.iter().zip(&batch) {
        assert_eq!(enc, &tokenizer.encode_pair(a, b, true, None).unwrap());
    }

    let ids = batch.iter().map(|e| e.ids.clone()).collect::<Vec<_>>();
    let decoded = tokenizer.decode_batch(&ids, true).unwrap();
    assert_eq!(decoded, ["hello world", "dog the lazy dog"]);
}

/// Out-of-range ids are reported, not clamped.
#[test]
fn test_bert_out_of_range() {
    let tokenizer = bert(TokenizerConfig::default());
    let size = tokenizer.vocab_size();
    assert_eq!(size, BERT_VOCAB.len());
    assert!(matches!(
        tokenizer.decode(&[5, size as u32], true),
        Err(Error::OutOfRange { .. })
    ));
    assert!(tokenizer.id_to_token(size as u32).is_err());
    assert_eq!(tokenizer.token_to_id("missing"), 1);
}

/// Padding extends every per-position vector.
#[test]
fn test_bert_padding() {
    let tokenizer = bert(TokenizerConfig::default());
    let mut enc = tokenizer.encode("hello", true, None).unwrap();
    let (pad, pad_token) = tokenizer.pad_token().unwrap();
    enc.pad(6, pad, pad_token);
    assert_eq!(enc.ids, [2, 5, 3, 0, 0, 0]);
    assert_eq!(enc.attention_mask, [1, 1, 1, 0, 0, 0]);
    assert_eq!(enc.type_ids.len(), 6);
}

/// Options can come from a JSON file.
#[test]
fn test_bert_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let vocab = write(dir.path(), "vocab.txt", &BERT_VOCAB.join("\n"));
    let config = write(dir.path(), "config.json", r#"{"lowercase": true, "max_len": 3}"#);
    let tokenizer = Tokenizer::from_config_file(Scheme::Bert, &vocab, None, &config).unwrap();
    let enc = tokenizer.encode("HELLO WORLD", true, None).unwrap();
    assert_eq!(tokens(&tokenizer, &enc.ids), ["[CLS]", "hello", "[SEP]"]);
}

/// A vocabulary with a repeated line is rejected.
#[test]
fn test_bert_duplicate_vocab() {
    let dir = tempfile::tempdir().unwrap();
    let vocab = write(dir.path(), "vocab.txt", "[UNK]\n[CLS]\n[SEP]\nhello\nhello\n");
    let err = polytok::new_tokenizer(Scheme::Bert, vocab, None, TokenizerConfig::default())
        .unwrap_err();
    assert!(matches!(err, Error::MalformedVocabulary(_)));
    assert!(err.is_construction());
}
