//! Tokenizer options, loadable from JSON.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Which sequence gives up tokens when an encoding exceeds `max_len`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationStrategy {
    /// Remove from whichever sequence is currently longer, one token at a time.
    #[default]
    LongestFirst,
    OnlyFirst,
    OnlySecond,
    /// Fail with [`Error::InputTooLong`] instead of truncating.
    DoNotTruncate,
}

/// Spellings of the special tokens; unset entries take the scheme's defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpecialTokensConfig {
    pub unk: Option<String>,
    pub pad: Option<String>,
    pub bos: Option<String>,
    pub eos: Option<String>,
    pub sep: Option<String>,
    pub cls: Option<String>,
    pub mask: Option<String>,
    /// More tokens to recognize as atomic in raw input.
    pub additional: Vec<String>,
}

impl SpecialTokensConfig {
    /// Entries set here, falling back to `defaults`; additional tokens of both are kept.
    pub fn or(self, defaults: Self) -> Self {
        let mut additional = defaults.additional;
        for token in self.additional {
            if !additional.contains(&token) {
                additional.push(token);
            }
        }
        Self {
            unk: self.unk.or(defaults.unk),
            pad: self.pad.or(defaults.pad),
            bos: self.bos.or(defaults.bos),
            eos: self.eos.or(defaults.eos),
            sep: self.sep.or(defaults.sep),
            cls: self.cls.or(defaults.cls),
            mask: self.mask.or(defaults.mask),
            additional,
        }
    }

    /// Every configured spelling, named ones first.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        [
            &self.unk, &self.pad, &self.bos, &self.eos, &self.sep, &self.cls, &self.mask,
        ]
        .into_iter()
        .flatten()
        .chain(&self.additional)
        .map(String::as_str)
    }
}

/// Options shared by every scheme.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TokenizerConfig {
    pub lowercase: bool,
    /// `None` follows `lowercase`.
    pub strip_accents: Option<bool>,
    /// Default maximum encoding length, special tokens included.
    pub max_len: Option<usize>,
    pub truncation: TruncationStrategy,
    /// Retained ids repeated at the head of `overflowing_tokens`.
    pub stride: usize,
    /// Treat the input as if it started with a space (byte-level schemes).
    pub add_prefix_space: bool,
    /// `None` uses the decoder's own default.
    pub clean_up_tokenization_spaces: Option<bool>,
    pub special_tokens: SpecialTokensConfig,
}

impl TokenizerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| Error::file(path, e))?;
        Self::from_json_str(&json)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    #[inline]
    pub fn strip_accents(&self) -> bool {
        self.strip_accents.unwrap_or(self.lowercase)
    }
}
