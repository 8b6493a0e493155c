//! SentencePiece model files: the binary `.model` protobuf and the
//! `piece<TAB>score` text export.

use crate::{as_byte_token, Bpe, Error, Model, Result, Unigram, Vocab};
use memchr::memchr;
use prost::Message;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::{debug, info};

/// Segmentation algorithm a SentencePiece model was trained with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelType {
    #[default]
    Unigram,
    Bpe,
    Word,
    Char,
}

impl ModelType {
    fn from_proto(v: i32) -> Result<Self> {
        match v {
            1 => Ok(Self::Unigram),
            2 => Ok(Self::Bpe),
            3 => Ok(Self::Word),
            4 => Ok(Self::Char),
            _ => Err(Error::MalformedModel(format!("unknown model type {v}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PieceType {
    #[default]
    Normal,
    Unknown,
    Control,
    UserDefined,
    Unused,
    Byte,
}

impl PieceType {
    fn from_proto(v: i32) -> Result<Self> {
        match v {
            1 => Ok(Self::Normal),
            2 => Ok(Self::Unknown),
            3 => Ok(Self::Control),
            4 => Ok(Self::UserDefined),
            5 => Ok(Self::Unused),
            6 => Ok(Self::Byte),
            _ => Err(Error::MalformedModel(format!("unknown piece type {v}"))),
        }
    }

    /// 可参与切分的片段
    #[inline]
    fn is_matchable(self) -> bool {
        matches!(self, Self::Normal | Self::UserDefined)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SentencePiece {
    pub piece: String,
    pub score: f32,
    pub kind: PieceType,
}

impl SentencePiece {
    fn new(piece: &str, score: f32, kind: PieceType) -> Self {
        Self {
            piece: piece.to_string(),
            score,
            kind,
        }
    }
}

/// The parts of a SentencePiece model needed to tokenize.
#[derive(Clone, Debug, PartialEq)]
pub struct SentencePieceModel {
    pub pieces: Vec<SentencePiece>,
    pub model_type: ModelType,
    pub byte_fallback: bool,
    /// Prepend `▁` to the input.
    pub add_dummy_prefix: bool,
    pub remove_extra_whitespaces: bool,
}

mod proto {
    //! The subset of `sentencepiece_model.proto` read here; other fields are skipped.

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ModelProto {
        #[prost(message, repeated, tag = "1")]
        pub pieces: Vec<Piece>,
        #[prost(message, optional, tag = "2")]
        pub trainer_spec: Option<TrainerSpec>,
        #[prost(message, optional, tag = "3")]
        pub normalizer_spec: Option<NormalizerSpec>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Piece {
        #[prost(string, optional, tag = "1")]
        pub piece: Option<String>,
        #[prost(float, optional, tag = "2")]
        pub score: Option<f32>,
        #[prost(int32, optional, tag = "3")]
        pub kind: Option<i32>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct TrainerSpec {
        #[prost(int32, optional, tag = "3")]
        pub model_type: Option<i32>,
        #[prost(bool, optional, tag = "35")]
        pub byte_fallback: Option<bool>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct NormalizerSpec {
        #[prost(bool, optional, tag = "3")]
        pub add_dummy_prefix: Option<bool>,
        #[prost(bool, optional, tag = "4")]
        pub remove_extra_whitespaces: Option<bool>,
    }
}

impl SentencePieceModel {
    /// Decodes a binary `.model` file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let model = proto::ModelProto::decode(bytes)
            .map_err(|e| Error::MalformedModel(format!("invalid model protobuf: {e}")))?;
        let pieces = model
            .pieces
            .into_iter()
            .map(|p| {
                Ok(SentencePiece {
                    piece: p.piece.unwrap_or_default(),
                    score: p.score.unwrap_or(0.),
                    kind: PieceType::from_proto(p.kind.unwrap_or(1))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let trainer = model.trainer_spec.unwrap_or_default();
        let normalizer = model.normalizer_spec.unwrap_or_default();
        Ok(Self {
            pieces,
            model_type: ModelType::from_proto(trainer.model_type.unwrap_or(1))?,
            byte_fallback: trainer.byte_fallback.unwrap_or(false),
            add_dummy_prefix: normalizer.add_dummy_prefix.unwrap_or(true),
            remove_extra_whitespaces: normalizer.remove_extra_whitespaces.unwrap_or(true),
        })
    }

    /// Parses the text export: one `piece<TAB>score` per line, in id order.
    /// Piece types are inferred from their spelling.
    pub fn from_vocab_text(text: &str, model_type: ModelType) -> Result<Self> {
        let mut pieces = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            let (piece, score) = match memchr(b'\t', line.as_bytes()) {
                Some(tab) => {
                    let score = line[tab + 1..].trim().parse::<f32>().map_err(|_| {
                        Error::MalformedVocabulary(format!(
                            "line {}: invalid score {:?}",
                            i + 1,
                            &line[tab + 1..]
                        ))
                    })?;
                    (&line[..tab], score)
                }
                None => (line, 0.),
            };
            let kind = match piece {
                "<unk>" => PieceType::Unknown,
                "<s>" | "</s>" | "<pad>" => PieceType::Control,
                _ if as_byte_token(piece.as_bytes()).is_some() => PieceType::Byte,
                _ => PieceType::Normal,
            };
            pieces.push(SentencePiece::new(piece, score, kind));
        }
        let byte_fallback = pieces.iter().any(|p| p.kind == PieceType::Byte);
        Ok(Self {
            pieces,
            model_type,
            byte_fallback,
            add_dummy_prefix: true,
            remove_extra_whitespaces: true,
        })
    }

    /// Reads a binary model, or a text export when the file does not start
    /// like a serialized `ModelProto`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| Error::file(path, e))?;
        // 0x0a: field 1 (pieces), length-delimited
        let model = if bytes.first() == Some(&0x0a) {
            Self::from_bytes(&bytes)?
        } else {
            let text = String::from_utf8(bytes)
                .map_err(|_| Error::MalformedModel(format!("{} is neither protobuf nor UTF-8", path.display())))?;
            Self::from_vocab_text(&text, ModelType::Unigram)?
        };
        info!(
            path = %path.display(),
            pieces = model.pieces.len(),
            model_type = ?model.model_type,
            "loaded SentencePiece model"
        );
        Ok(model)
    }

    /// Re-indexes the pieces the way fairseq dictionaries do (XLM-RoBERTa):
    /// `<s> <pad> </s> <unk>` take ids 0 to 3, the model's own pieces after its
    /// first three follow, and `<mask>` comes last.
    pub fn with_fairseq_layout(mut self) -> Self {
        let mut pieces = vec![
            SentencePiece::new("<s>", 0., PieceType::Control),
            SentencePiece::new("<pad>", 0., PieceType::Control),
            SentencePiece::new("</s>", 0., PieceType::Control),
            SentencePiece::new("<unk>", 0., PieceType::Unknown),
        ];
        pieces.extend(self.pieces.drain(..).skip(3));
        pieces.push(SentencePiece::new("<mask>", 0., PieceType::Control));
        self.pieces = pieces;
        self
    }

    /// Spelling of the unknown piece.
    pub fn unk_piece(&self) -> &str {
        self.pieces
            .iter()
            .find(|p| p.kind == PieceType::Unknown)
            .map_or("<unk>", |p| &p.piece)
    }

    pub fn vocab(&self) -> Result<Vocab> {
        Vocab::with_byte_hint(
            self.pieces
                .iter()
                .map(|p| (p.piece.clone(), p.kind == PieceType::Byte)),
            self.unk_piece(),
        )
    }

    /// Builds the subword model the file describes.
    pub fn into_model(self) -> Result<Model> {
        let vocab = self.vocab()?;
        let scores = self.pieces.iter().map(|p| p.score).collect::<Vec<_>>();
        let kinds = self.pieces.iter().map(|p| p.kind).collect::<Vec<_>>();
        let matchable = |id: u32| kinds[id as usize].is_matchable();
        debug!(model_type = ?self.model_type, byte_fallback = self.byte_fallback, "building SentencePiece model");
        match self.model_type {
            ModelType::Unigram => Ok(Unigram::new(vocab, scores, matchable)?
                .with_byte_fallback(self.byte_fallback)
                .into()),
            ModelType::Bpe => Ok(Bpe::from_scores(vocab, &scores, matchable)?.into()),
            ty @ (ModelType::Word | ModelType::Char) => Err(Error::MalformedModel(format!(
                "{ty:?} SentencePiece models are not supported"
            ))),
        }
    }
}
