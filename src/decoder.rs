//! Joining token spellings back into text.

use crate::{as_byte_token, pre_tokenizer::byte_level, METASPACE};
use serde::{Deserialize, Serialize};

/// How the spellings of a scheme's tokens are joined.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Decoder {
    /// Space-separated, with `prefix` pieces glued to the previous token.
    WordPiece { prefix: String },
    /// Concatenated, then surrogate characters mapped back to bytes.
    ByteLevel,
    /// Concatenated, `▁` read as a space and `<0xNN>` pieces as bytes.
    Metaspace { add_prefix_space: bool },
    /// Concatenated, `suffix` read as a word break.
    EndOfWord { suffix: String },
    /// Space-separated, `@@ ` glue removed.
    Ctrl,
}

impl Decoder {
    pub fn decode(&self, tokens: &[&str]) -> String {
        match self {
            Self::WordPiece { prefix } => tokens
                .join(" ")
                .replace(&format!(" {prefix}"), "")
                .trim()
                .to_string(),
            Self::ByteLevel => {
                let bytes = byte_level::decode_chars(&tokens.concat());
                String::from_utf8_lossy(&bytes).into_owned()
            }
            Self::Metaspace { add_prefix_space } => {
                let mut bytes = Vec::new();
                for token in tokens {
                    match as_byte_token(token.as_bytes()) {
                        Some(b) => bytes.push(b),
                        None => {
                            for c in token.chars() {
                                let c = if c == METASPACE { ' ' } else { c };
                                let mut buf = [0; 4];
                                bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                            }
                        }
                    }
                }
                let text = String::from_utf8_lossy(&bytes).into_owned();
                match text.strip_prefix(' ') {
                    Some(rest) if *add_prefix_space => rest.to_string(),
                    _ => text,
                }
            }
            Self::EndOfWord { suffix } => tokens
                .concat()
                .replace(suffix.as_str(), " ")
                .trim_end()
                .to_string(),
            Self::Ctrl => tokens.join(" ").replace("@@ ", "").trim().to_string(),
        }
    }

    /// Whether [`clean_up_tokenization`] applies unless configured otherwise.
    pub fn cleans_up_by_default(&self) -> bool {
        matches!(
            self,
            Self::WordPiece { .. } | Self::EndOfWord { .. } | Self::Ctrl
        )
    }
}

/// Removes the spaces space-joining decoders leave before punctuation and
/// English contractions.
pub fn clean_up_tokenization(text: String) -> String {
    text.replace(" .", ".")
        .replace(" !", "!")
        .replace(" ?", "?")
        .replace(" ,", ",")
        .replace(" ' ", "'")
        .replace(" n't", "n't")
        .replace(" 'm", "'m")
        .replace(" do not", " don't")
        .replace(" 's", "'s")
        .replace(" 've", "'ve")
        .replace(" 're", "'re")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wordpiece_glues_continuations() {
        let decoder = Decoder::WordPiece {
            prefix: "##".into(),
        };
        assert_eq!(decoder.decode(&["un", "##aff", "##able", "day"]), "unaffable day");
    }

    #[test]
    fn byte_level_restores_bytes() {
        let decoder = Decoder::ByteLevel;
        assert_eq!(decoder.decode(&["Hello", "Ġworld", "ĠcafÃ©"]), "Hello world café");
        // 不完整的 UTF-8 序列按有损方式解码
        assert_eq!(decoder.decode(&["Ã"]), "\u{fffd}");
    }

    #[test]
    fn metaspace_reads_bytes_and_spaces() {
        let decoder = Decoder::Metaspace {
            add_prefix_space: true,
        };
        assert_eq!(decoder.decode(&["▁Hello", "▁wor", "ld"]), "Hello world");
        assert_eq!(decoder.decode(&["▁", "<0xC3>", "<0xA9>", "t"]), "ét");
        let decoder = Decoder::Metaspace {
            add_prefix_space: false,
        };
        assert_eq!(decoder.decode(&["▁a"]), " a");
    }

    #[test]
    fn suffix_schemes() {
        let decoder = Decoder::EndOfWord {
            suffix: "</w>".into(),
        };
        assert_eq!(decoder.decode(&["hel", "lo</w>", "world</w>"]), "hello world");
        assert_eq!(Decoder::Ctrl.decode(&["hel@@", "lo", "world"]), "hello world");
    }

    #[test]
    fn clean_up_spaces() {
        assert_eq!(
            clean_up_tokenization("it 's fine , is n't it ?".into()),
            "it's fine, isn't it?"
        );
        assert!(Decoder::Ctrl.cleans_up_by_default());
        assert!(!Decoder::ByteLevel.cleans_up_by_default());
    }
}
