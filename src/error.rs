//! Error types for tokenizer construction and per-call failures.

use std::{io, path::PathBuf};
use thiserror::Error;

/// Result type alias for tokenizer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or running a tokenizer.
///
/// Construction errors are fatal for the instance being built. The remaining
/// variants are reported per call and leave the shared tokenizer untouched.
/// An unknown token is never an error: it encodes to the vocabulary's unknown id.
#[derive(Error, Debug)]
pub enum Error {
    /// An artifact path could not be opened.
    #[error("file not found: {path}: {source}")]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The vocabulary has duplicate entries, gaps in its ids or no entries.
    #[error("malformed vocabulary: {0}")]
    MalformedVocabulary(String),

    /// A merge-table line could not be understood.
    #[error("malformed merge table at line {line}: {reason}")]
    MalformedMergeTable { line: usize, reason: String },

    /// A SentencePiece model blob could not be parsed.
    #[error("malformed sentencepiece model: {0}")]
    MalformedModel(String),

    /// A configured special token is absent from the vocabulary.
    #[error("special token {0:?} is not in the vocabulary")]
    MissingSpecialToken(String),

    /// The tokenizer configuration could not be read.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A token id outside `[0, size)`.
    #[error("token id {id} is out of range for a vocabulary of {size} tokens")]
    OutOfRange { id: u32, size: usize },

    /// The encoded input exceeds the maximum length and may not be truncated.
    #[error("input of {len} tokens exceeds the maximum length of {max}")]
    InputTooLong { len: usize, max: usize },
}

impl Error {
    /// Whether the error was raised while building a tokenizer.
    pub fn is_construction(&self) -> bool {
        !matches!(self, Self::OutOfRange { .. } | Self::InputTooLong { .. })
    }

    pub(crate) fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileNotFound {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Config(e.to_string())
    }
}
