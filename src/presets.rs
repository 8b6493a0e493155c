//! Ready-made pipelines for the common tokenizer families.

use crate::{
    Bpe, Decoder, Error, Method, Normalizer, PreTokenizer, Result, SentencePieceModel,
    SpecialTokensConfig, Template, Tokenizer, TokenizerConfig, WordMode, WordPiece,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    /// WordPiece, `[CLS] A [SEP] B [SEP]`.
    Bert,
    /// BPE with `@@` continuations.
    Ctrl,
    /// Byte-level BPE.
    Gpt2,
    /// Byte-level BPE, `<s> A </s></s> B </s>`.
    Roberta,
    /// BPE with `</w>` word ends.
    #[serde(rename = "openai_gpt")]
    OpenAiGpt,
    /// A bare SentencePiece model.
    #[serde(rename = "sentencepiece")]
    SentencePiece,
    Albert,
    T5,
    /// SentencePiece with fairseq ids.
    XlmRoberta,
    #[serde(rename = "xlnet")]
    XlNet,
}

impl Scheme {
    pub const ALL: [Self; 10] = [
        Self::Bert,
        Self::Ctrl,
        Self::Gpt2,
        Self::Roberta,
        Self::OpenAiGpt,
        Self::SentencePiece,
        Self::Albert,
        Self::T5,
        Self::XlmRoberta,
        Self::XlNet,
    ];

    /// Whether the scheme reads a merges file next to its vocabulary.
    pub fn needs_merges(self) -> bool {
        matches!(
            self,
            Self::Ctrl | Self::Gpt2 | Self::Roberta | Self::OpenAiGpt
        )
    }

    /// Special-token spellings the scheme's published artifacts use.
    pub fn default_special_tokens(self) -> SpecialTokensConfig {
        fn s(token: &str) -> Option<String> {
            Some(token.to_string())
        }
        match self {
            Self::Bert => SpecialTokensConfig {
                unk: s("[UNK]"),
                pad: s("[PAD]"),
                cls: s("[CLS]"),
                sep: s("[SEP]"),
                mask: s("[MASK]"),
                ..Default::default()
            },
            Self::Ctrl | Self::OpenAiGpt => SpecialTokensConfig {
                unk: s("<unk>"),
                ..Default::default()
            },
            Self::Gpt2 => SpecialTokensConfig {
                unk: s("<|endoftext|>"),
                bos: s("<|endoftext|>"),
                eos: s("<|endoftext|>"),
                ..Default::default()
            },
            Self::Roberta | Self::XlmRoberta => SpecialTokensConfig {
                unk: s("<unk>"),
                pad: s("<pad>"),
                bos: s("<s>"),
                eos: s("</s>"),
                cls: s("<s>"),
                sep: s("</s>"),
                mask: s("<mask>"),
                ..Default::default()
            },
            Self::SentencePiece => SpecialTokensConfig {
                unk: s("<unk>"),
                bos: s("<s>"),
                eos: s("</s>"),
                ..Default::default()
            },
            Self::Albert => SpecialTokensConfig {
                unk: s("<unk>"),
                pad: s("<pad>"),
                cls: s("[CLS]"),
                sep: s("[SEP]"),
                mask: s("[MASK]"),
                ..Default::default()
            },
            Self::T5 => SpecialTokensConfig {
                unk: s("<unk>"),
                pad: s("<pad>"),
                eos: s("</s>"),
                ..Default::default()
            },
            Self::XlNet => SpecialTokensConfig {
                unk: s("<unk>"),
                pad: s("<pad>"),
                bos: s("<s>"),
                eos: s("</s>"),
                cls: s("<cls>"),
                sep: s("<sep>"),
                mask: s("<mask>"),
                ..Default::default()
            },
        }
    }
}

/// Builds `scheme`'s pipeline from its artifact files.
///
/// `vocab` is `vocab.txt`/`vocab.json` for WordPiece and BPE schemes and the
/// SentencePiece model for the others; `merges` is required by the BPE schemes.
pub fn new_tokenizer(
    scheme: Scheme,
    vocab: impl AsRef<Path>,
    merges: Option<&Path>,
    config: TokenizerConfig,
) -> Result<Tokenizer> {
    let vocab = vocab.as_ref();
    let special_tokens = config
        .special_tokens
        .clone()
        .or(scheme.default_special_tokens());
    let config = TokenizerConfig {
        special_tokens,
        ..config
    };
    info!(?scheme, vocab = %vocab.display(), "building tokenizer");

    let unk = required(scheme, &config.special_tokens.unk, "unk")?.to_string();
    let merges = || {
        merges.ok_or_else(|| Error::Config(format!("{scheme:?} needs a merges file")))
    };
    let lowercase = config.lowercase;

    match scheme {
        Scheme::Bert => {
            let model = WordPiece::from_file(vocab, &unk)?;
            let template = Template::bert(
                model.vocab(),
                required(scheme, &config.special_tokens.cls, "cls")?,
                required(scheme, &config.special_tokens.sep, "sep")?,
            )?;
            let normalizer = Normalizer::bert(lowercase, config.strip_accents());
            Ok(Tokenizer::new(model, config)?
                .with_normalizer(normalizer)
                .with_pre_tokenizer(PreTokenizer::Bert)
                .with_template(template))
        }
        Scheme::Ctrl => {
            let model = Bpe::from_files(vocab, merges()?, &unk, WordMode::ctrl())?;
            let normalizer = Normalizer {
                lowercase,
                ..Default::default()
            };
            Ok(Tokenizer::new(model, config)?
                .with_normalizer(normalizer)
                .with_pre_tokenizer(PreTokenizer::Whitespace))
        }
        Scheme::Gpt2 | Scheme::Roberta => {
            let model = Bpe::from_files(vocab, merges()?, &unk, WordMode::Plain)?;
            let template = match scheme {
                Scheme::Roberta => Template::roberta(
                    model.vocab(),
                    required(scheme, &config.special_tokens.cls, "cls")?,
                    required(scheme, &config.special_tokens.sep, "sep")?,
                )?,
                _ => Template::none(),
            };
            let pre_tokenizer = PreTokenizer::ByteLevel {
                add_prefix_space: config.add_prefix_space,
            };
            let normalizer = Normalizer {
                lowercase,
                ..Default::default()
            };
            Ok(Tokenizer::new(model, config)?
                .with_normalizer(normalizer)
                .with_pre_tokenizer(pre_tokenizer)
                .with_template(template))
        }
        Scheme::OpenAiGpt => {
            let model = Bpe::from_files(vocab, merges()?, &unk, WordMode::end_of_word("</w>"))?;
            // always lowercased
            let normalizer = Normalizer {
                lowercase: true,
                clean_text: true,
                ..Default::default()
            };
            Ok(Tokenizer::new(model, config)?
                .with_normalizer(normalizer)
                .with_pre_tokenizer(PreTokenizer::Bert))
        }
        Scheme::SentencePiece
        | Scheme::Albert
        | Scheme::T5
        | Scheme::XlmRoberta
        | Scheme::XlNet => {
            let mut sp = SentencePieceModel::from_file(vocab)?;
            if scheme == Scheme::XlmRoberta {
                sp = sp.with_fairseq_layout();
            }
            let strip_accents = match scheme {
                Scheme::Albert | Scheme::XlNet => config.strip_accents.unwrap_or(true),
                _ => config.strip_accents(),
            };
            let mut normalizer = Normalizer::sentencepiece(lowercase, strip_accents);
            normalizer.collapse_whitespace = sp.remove_extra_whitespaces;
            let add_prefix_space = sp.add_dummy_prefix;
            let model = sp.into_model()?;
            let vocab = model.vocab();
            let special = &config.special_tokens;
            let template = match scheme {
                Scheme::Albert => Template::bert(
                    vocab,
                    required(scheme, &special.cls, "cls")?,
                    required(scheme, &special.sep, "sep")?,
                )?,
                Scheme::T5 => Template::t5(vocab, required(scheme, &special.eos, "eos")?)?,
                Scheme::XlmRoberta => Template::roberta(
                    vocab,
                    required(scheme, &special.cls, "cls")?,
                    required(scheme, &special.sep, "sep")?,
                )?,
                Scheme::XlNet => Template::xlnet(
                    vocab,
                    required(scheme, &special.sep, "sep")?,
                    required(scheme, &special.cls, "cls")?,
                )?,
                _ => Template::none(),
            };
            Ok(Tokenizer::new(model, config)?
                .with_normalizer(normalizer)
                .with_pre_tokenizer(PreTokenizer::Metaspace { add_prefix_space })
                .with_template(template)
                .with_decoder(Decoder::Metaspace { add_prefix_space }))
        }
    }
}

fn required<'a>(scheme: Scheme, token: &'a Option<String>, role: &str) -> Result<&'a str> {
    token
        .as_deref()
        .ok_or_else(|| Error::Config(format!("{scheme:?} needs a {role} token")))
}

impl Tokenizer {
    /// [`new_tokenizer`] with options read from a JSON file.
    pub fn from_config_file(
        scheme: Scheme,
        vocab: impl AsRef<Path>,
        merges: Option<&Path>,
        config: impl AsRef<Path>,
    ) -> Result<Self> {
        new_tokenizer(scheme, vocab, merges, TokenizerConfig::from_json_file(config)?)
    }
}
