//! Vocabulary store shared by every subword model.
//!
//! A vocabulary is a dense, bijective table between token strings and ids
//! `0..N`. It is immutable once built, so a single instance can serve any
//! number of concurrent encode and decode calls.
//!
//! Besides ordinary tokens, SentencePiece vocabularies carry *byte tokens*
//! spelled `<0xNN>`. They live in the same id space but stand for one raw
//! byte rather than for their spelling, so they are indexed separately.

use crate::{as_byte_token, utok, Error, Result};
use serde::de::{Deserializer, MapAccess, Visitor};
use std::{collections::HashMap, fmt, fs, path::Path};

#[derive(Clone, Debug)]
pub struct Vocab {
    /// id -> token
    tokens: Box<[String]>,
    /// token -> id
    ids: HashMap<String, utok>,
    /// byte value -> byte token
    bytes: Box<[Option<utok>; 256]>,
    /// byte token -> byte value
    byte_values: HashMap<utok, u8>,
    /// token: <unk>
    unk: utok,
}

impl Vocab {
    /// Builds a vocabulary from tokens listed in id order.
    pub fn new(tokens: impl IntoIterator<Item = String>, unk: &str) -> Result<Self> {
        Self::build(tokens.into_iter().map(|t| (t, false)), unk)
    }

    /// Builds a vocabulary, marking which tokens are `<0xNN>` byte tokens.
    pub fn with_byte_hint(
        tokens: impl IntoIterator<Item = (String, bool)>,
        unk: &str,
    ) -> Result<Self> {
        Self::build(tokens, unk)
    }

    /// Parses a line-oriented vocabulary: one token per line, id = line number.
    pub fn from_txt(txt: &str, unk: &str) -> Result<Self> {
        let mut lines = txt.split('\n').collect::<Vec<_>>();
        if lines.last() == Some(&"") {
            lines.pop();
        }
        Self::new(
            lines
                .into_iter()
                .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string()),
            unk,
        )
    }

    /// Parses a JSON object mapping tokens to ids. Ids must cover `0..N` exactly.
    pub fn from_json(json: &str, unk: &str) -> Result<Self> {
        let mut de = serde_json::Deserializer::from_str(json);
        let entries = de
            .deserialize_map(EntriesVisitor)
            .map_err(|e| Error::MalformedVocabulary(e.to_string()))?;
        de.end()
            .map_err(|e| Error::MalformedVocabulary(e.to_string()))?;

        let mut slots = vec![None; entries.len()];
        for (token, id) in entries {
            let slot = slots.get_mut(id as usize).ok_or_else(|| {
                Error::MalformedVocabulary(format!(
                    "id {id} of {token:?} leaves a gap in the id range"
                ))
            })?;
            if let Some(prev) = slot.replace(token) {
                return Err(Error::MalformedVocabulary(format!(
                    "id {id} is assigned to both {prev:?} and another token"
                )));
            }
        }
        // 每个位置都被占用（上面已排除重复 id 和越界 id）
        Self::new(slots.into_iter().flatten(), unk)
    }

    /// Reads a vocabulary file, choosing JSON when the content is an object.
    pub fn from_file(path: impl AsRef<Path>, unk: &str) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::file(path, e))?;
        if text.trim_start().starts_with('{') {
            Self::from_json(&text, unk)
        } else {
            Self::from_txt(&text, unk)
        }
    }

    fn build(tokens: impl IntoIterator<Item = (String, bool)>, unk: &str) -> Result<Self> {
        let mut bytes = Box::new([None; 256]);
        let mut byte_values = HashMap::new();
        let mut ids = HashMap::new();
        let tokens = tokens
            .into_iter()
            .enumerate()
            .map(|(i, (token, is_byte))| {
                let id = i as utok;
                if is_byte {
                    let b = as_byte_token(token.as_bytes()).ok_or_else(|| {
                        Error::MalformedVocabulary(format!("{token:?} is not a valid byte token"))
                    })?;
                    bytes[b as usize] = Some(id);
                    byte_values.insert(id, b);
                }
                if ids.insert(token.clone(), id).is_some() {
                    return Err(Error::MalformedVocabulary(format!(
                        "token {token:?} appears more than once"
                    )));
                }
                Ok(token)
            })
            .collect::<Result<Box<[_]>>>()?;
        if tokens.is_empty() {
            return Err(Error::MalformedVocabulary("vocabulary is empty".into()));
        }
        let unk = *ids
            .get(unk)
            .ok_or_else(|| Error::MissingSpecialToken(unk.to_string()))?;
        Ok(Self {
            tokens,
            ids,
            bytes,
            byte_values,
            unk,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// token: <unk>
    #[inline]
    pub fn unk_id(&self) -> utok {
        self.unk
    }

    #[inline]
    pub fn unk_token(&self) -> &str {
        &self.tokens[self.unk as usize]
    }

    /// Exact lookup, `None` when the token is not in the vocabulary.
    #[inline]
    pub fn get(&self, token: &str) -> Option<utok> {
        self.ids.get(token).copied()
    }

    /// Lookup falling back to the unknown id.
    #[inline]
    pub fn lookup_id(&self, token: &str) -> utok {
        self.get(token).unwrap_or(self.unk)
    }

    /// id -> token, failing for ids outside the vocabulary.
    pub fn lookup_token(&self, id: utok) -> Result<&str> {
        self.tokens
            .get(id as usize)
            .map(String::as_str)
            .ok_or(Error::OutOfRange {
                id,
                size: self.tokens.len(),
            })
    }

    /// id -> token for ids produced by this vocabulary.
    #[inline(always)]
    pub(crate) fn token(&self, id: utok) -> &str {
        &self.tokens[id as usize]
    }

    #[inline]
    pub fn contains_id(&self, id: utok) -> bool {
        (id as usize) < self.tokens.len()
    }

    /// The byte token standing for `b`, if the vocabulary has one.
    #[inline]
    pub fn byte_token(&self, b: u8) -> Option<utok> {
        self.bytes[b as usize]
    }

    /// The raw byte a byte token stands for.
    #[inline]
    pub fn byte_value(&self, id: utok) -> Option<u8> {
        self.byte_values.get(&id).copied()
    }

    #[inline]
    pub fn has_byte_tokens(&self) -> bool {
        !self.byte_values.is_empty()
    }

    /// Tokens in id order.
    pub fn iter(&self) -> impl Iterator<Item = (utok, &str)> + '_ {
        self.tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (i as utok, t.as_str()))
    }
}

/// Collects JSON object entries in file order so duplicate keys stay visible.
struct EntriesVisitor;

impl<'de> Visitor<'de> for EntriesVisitor {
    type Value = Vec<(String, utok)>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map from token strings to ids")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some(entry) = map.next_entry::<String, utok>()? {
            entries.push(entry);
        }
        Ok(entries)
    }
}
