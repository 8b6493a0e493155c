//! Multi-scheme subword tokenization.
//!
//! A [`Tokenizer`] runs text through a [`Normalizer`], a [`PreTokenizer`],
//! one of three subword models (WordPiece, BPE, Unigram) and a special-token
//! [`Template`], producing an [`Encoding`] with ids, offsets and masks.
//! [`Scheme`] presets reproduce the BERT, GPT-2, RoBERTa, OpenAI GPT, CTRL,
//! SentencePiece, ALBERT, T5, XLM-RoBERTa and XLNet conventions.

#![deny(warnings)]

mod bpe;
mod config;
mod decoder;
mod encoding;
mod error;
mod model;
mod normalizer;
mod pre_tokenizer;
mod presets;
mod sentencepiece;
mod template;
mod tokenizer;
mod unigram;
mod vocab;
mod wordpiece;

pub use bpe::{Bpe, WordMode};
pub use config::{SpecialTokensConfig, TokenizerConfig, TruncationStrategy};
pub use decoder::{clean_up_tokenization, Decoder};
pub use encoding::{Encoding, Mask, Offset, Sequence, Token};
pub use error::{Error, Result};
pub use model::{Model, Piece};
pub use normalizer::{NormalizedString, Normalizer};
pub use pre_tokenizer::{byte_level, PreTokenizer, METASPACE};
pub use presets::{new_tokenizer, Scheme};
pub use sentencepiece::{ModelType, PieceType, SentencePiece, SentencePieceModel};
pub use template::{EncodeOptions, Template, TemplatePiece};
pub use tokenizer::Tokenizer;
pub use unigram::Unigram;
pub use vocab::Vocab;
pub use wordpiece::WordPiece;

/// `utok` for token id.
#[allow(non_camel_case_types)]
pub type utok = u32;

/// A subword model: splits one pre-tokenized segment into vocabulary pieces.
pub trait Method {
    fn vocab(&self) -> &Vocab;
    /// Pieces of `segment`, with byte ranges relative to the segment.
    fn encode(&self, segment: &str) -> Vec<Piece>;

    #[inline]
    fn unk_token(&self) -> utok {
        self.vocab().unk_id()
    }
    #[inline]
    fn vocab_size(&self) -> usize {
        self.vocab().len()
    }
}

const fn as_byte_token(piece: &[u8]) -> Option<u8> {
    // 按结构分解并转换
    match piece {
        &[b'<', b'0', b'x', a, b, b'>'] if a.is_ascii_hexdigit() && b.is_ascii_hexdigit() => {
            // ascii 转数字
            #[inline(always)]
            const fn to_num(c: u8) -> u8 {
                match c {
                    b'0'..=b'9' => c - b'0',
                    b'a'..=b'f' => c - b'a' + 10,
                    b'A'..=b'F' => c - b'A' + 10,
                    _ => unreachable!(),
                }
            }

            Some(to_num(a) * 16 + to_num(b))
        }
        _ => None,
    }
}

#[test]
fn test_byte_token() {
    assert_eq!(as_byte_token(b"<0x0A>"), Some(10));
    assert_eq!(as_byte_token(b"<0xff>"), Some(255));
    assert_eq!(as_byte_token(b"<0xG0>"), None);
    assert_eq!(as_byte_token(b"0x41"), None);
}
