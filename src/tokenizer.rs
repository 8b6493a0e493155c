use crate::{
    encoding::{Encoding, Mask, Offset, Sequence, Token},
    utok, Bpe, Decoder, EncodeOptions, Error, Method, Model, NormalizedString, Normalizer,
    PreTokenizer, Result, Template, TokenizerConfig, WordMode,
};
use rayon::prelude::*;
use regex::Regex;
use std::{
    collections::{HashMap, HashSet},
    ops::Range,
};
use tracing::{debug, trace};

/// A complete tokenization pipeline: normalizer, pre-tokenizer, subword
/// model, special-token template and decoder.
///
/// Everything is fixed at construction; encoding and decoding take `&self`
/// and can run from any number of threads.
#[derive(Clone, Debug)]
pub struct Tokenizer {
    model: Model,
    normalizer: Normalizer,
    pre_tokenizer: PreTokenizer,
    template: Template,
    decoder: Decoder,
    config: TokenizerConfig,
    special: HashMap<String, utok>,
    special_ids: HashSet<utok>,
    special_regex: Option<Regex>,
}

impl Tokenizer {
    /// Wraps `model` with a pass-through pipeline; every special token the
    /// configuration names must be in the vocabulary.
    pub fn new(model: impl Into<Model>, config: TokenizerConfig) -> Result<Self> {
        let model = model.into();
        let decoder = default_decoder(&model);
        let mut tokenizer = Self {
            model,
            normalizer: Normalizer::default(),
            pre_tokenizer: PreTokenizer::Whitespace,
            template: Template::none(),
            decoder,
            special: HashMap::new(),
            special_ids: HashSet::new(),
            special_regex: None,
            config: TokenizerConfig::default(),
        };
        let unk = tokenizer.model.vocab().unk_token().to_string();
        let configured = config
            .special_tokens
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        tokenizer.extend_special([unk].into_iter().chain(configured))?;
        tokenizer.config = config;
        debug!(
            vocab_size = tokenizer.vocab_size(),
            special_tokens = tokenizer.special.len(),
            "tokenizer built"
        );
        Ok(tokenizer)
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_pre_tokenizer(mut self, pre_tokenizer: PreTokenizer) -> Self {
        self.pre_tokenizer = pre_tokenizer;
        self
    }

    /// Sets the layout; the tokens it inserts count as special when decoding.
    pub fn with_template(mut self, template: Template) -> Self {
        self.special_ids.extend(template.special_ids());
        self.template = template;
        self
    }

    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Registers more special tokens. Each must be a vocabulary entry; it is
    /// then matched verbatim in raw input and never split.
    pub fn extend_special(&mut self, tokens: impl IntoIterator<Item = String>) -> Result<()> {
        let mut any = false;
        for token in tokens {
            if token.is_empty() || self.special.contains_key(&token) {
                continue;
            }
            let id = self
                .model
                .vocab()
                .get(&token)
                .ok_or_else(|| Error::MissingSpecialToken(token.clone()))?;
            self.special.insert(token, id);
            self.special_ids.insert(id);
            any = true;
        }
        if any {
            self.special_regex = Some(build_pattern(self.special.keys())?);
        }
        Ok(())
    }

    #[inline]
    pub fn model(&self) -> &Model {
        &self.model
    }

    #[inline]
    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    #[inline]
    pub fn pre_tokenizer(&self) -> &PreTokenizer {
        &self.pre_tokenizer
    }

    #[inline]
    pub fn template(&self) -> &Template {
        &self.template
    }

    #[inline]
    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    #[inline]
    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    /// Id of a registered special token.
    #[inline]
    pub fn special_id(&self, token: &str) -> Option<utok> {
        self.special.get(token).copied()
    }

    #[inline]
    pub fn is_special(&self, id: utok) -> bool {
        self.special_ids.contains(&id)
    }

    /// The configured padding token and its id, for [`Encoding::pad`].
    pub fn pad_token(&self) -> Option<(utok, &str)> {
        let pad = self.config.special_tokens.pad.as_deref()?;
        Some((self.special_id(pad)?, pad))
    }

    /// Encode options from the configuration, with a per-call length cap.
    pub fn options(&self, add_special_tokens: bool, truncation_length: Option<usize>) -> EncodeOptions {
        EncodeOptions {
            add_special_tokens,
            max_len: truncation_length.or(self.config.max_len),
            strategy: self.config.truncation,
            stride: self.config.stride,
        }
    }

    pub fn encode(
        &self,
        text: &str,
        add_special_tokens: bool,
        truncation_length: Option<usize>,
    ) -> Result<Encoding> {
        self.encode_with(text, None, &self.options(add_special_tokens, truncation_length))
    }

    pub fn encode_pair(
        &self,
        a: &str,
        b: &str,
        add_special_tokens: bool,
        truncation_length: Option<usize>,
    ) -> Result<Encoding> {
        self.encode_with(a, Some(b), &self.options(add_special_tokens, truncation_length))
    }

    /// Encodes one text or a pair under explicit options.
    pub fn encode_with(&self, a: &str, b: Option<&str>, options: &EncodeOptions) -> Result<Encoding> {
        let a = self.encode_sequence(a);
        let b = b.map(|b| self.encode_sequence(b));
        self.template.apply(a, b, options)
    }

    /// Encodes texts in parallel; results follow input order.
    pub fn encode_batch<S>(
        &self,
        texts: &[S],
        add_special_tokens: bool,
        truncation_length: Option<usize>,
    ) -> Result<Vec<Encoding>>
    where
        S: AsRef<str> + Sync,
    {
        let options = self.options(add_special_tokens, truncation_length);
        texts
            .par_iter()
            .map(|text| self.encode_with(text.as_ref(), None, &options))
            .collect()
    }

    /// Encodes pairs in parallel; results follow input order.
    pub fn encode_pair_batch<A, B>(
        &self,
        pairs: &[(A, B)],
        add_special_tokens: bool,
        truncation_length: Option<usize>,
    ) -> Result<Vec<Encoding>>
    where
        A: AsRef<str> + Sync,
        B: AsRef<str> + Sync,
    {
        let options = self.options(add_special_tokens, truncation_length);
        pairs
            .par_iter()
            .map(|(a, b)| self.encode_with(a.as_ref(), Some(b.as_ref()), &options))
            .collect()
    }

    /// Token spellings of `text`, without template tokens.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.encode_sequence(text)
            .tokens
            .into_iter()
            .map(|t| t.value)
            .collect()
    }

    /// Text of `ids`. Unknown tokens decode to the unknown token's spelling,
    /// so the round trip is exact only when none were produced.
    pub fn decode(&self, ids: &[utok], skip_special_tokens: bool) -> Result<String> {
        let vocab = self.model.vocab();
        let mut tokens = Vec::with_capacity(ids.len());
        for &id in ids {
            let token = vocab.lookup_token(id)?;
            if !(skip_special_tokens && self.is_special(id)) {
                tokens.push(token);
            }
        }
        let text = self.decoder.decode(&tokens);
        let clean_up = self
            .config
            .clean_up_tokenization_spaces
            .unwrap_or_else(|| self.decoder.cleans_up_by_default());
        Ok(if clean_up {
            crate::clean_up_tokenization(text)
        } else {
            text
        })
    }

    /// Decodes id sequences in parallel; results follow input order.
    pub fn decode_batch<I>(&self, ids: &[I], skip_special_tokens: bool) -> Result<Vec<String>>
    where
        I: AsRef<[utok]> + Sync,
    {
        ids.par_iter()
            .map(|ids| self.decode(ids.as_ref(), skip_special_tokens))
            .collect()
    }

    /// Id of `token`; unknown spellings map to the unknown id.
    #[inline]
    pub fn token_to_id(&self, token: &str) -> utok {
        self.model.vocab().lookup_id(token)
    }

    #[inline]
    pub fn id_to_token(&self, id: utok) -> Result<&str> {
        self.model.vocab().lookup_token(id)
    }

    #[inline]
    pub fn vocab_size(&self) -> usize {
        self.model.vocab_size()
    }

    fn encode_sequence(&self, text: &str) -> Sequence {
        let mut seq = Sequence::default();
        let mut start = 0;
        if let Some(regex) = &self.special_regex {
            for m in regex.find_iter(text) {
                let Some(&id) = self.special.get(m.as_str()) else {
                    continue;
                };
                self.encode_chunk(text, start..m.start(), &mut seq);
                let token = Token {
                    value: m.as_str().to_string(),
                    offset: Offset::new(m.start(), m.end()),
                    mask: Mask::Special,
                };
                seq.push(id, token);
                start = m.end();
            }
        }
        self.encode_chunk(text, start..text.len(), &mut seq);
        trace!(len = text.len(), tokens = seq.len(), "encoded sequence");
        seq
    }

    fn encode_chunk(&self, text: &str, range: Range<usize>, seq: &mut Sequence) {
        if range.is_empty() {
            return;
        }
        let mut normalized = NormalizedString::new(&text[range.clone()], range.start);
        self.normalizer.normalize_str(&mut normalized);
        let vocab = self.model.vocab();
        for segment in self.pre_tokenizer.pre_tokenize(&normalized) {
            for piece in self.model.encode(segment.as_str()) {
                let (begin, end) = segment.original_span(piece.range);
                let token = Token {
                    value: vocab.token(piece.id).to_string(),
                    offset: Offset::new(begin, end),
                    mask: piece.mask,
                };
                seq.push(piece.id, token);
            }
        }
    }
}

/// The decoder matching a model's token spelling.
fn default_decoder(model: &Model) -> Decoder {
    match model {
        Model::WordPiece(m) => Decoder::WordPiece {
            prefix: m.continuation_prefix().to_string(),
        },
        Model::Bpe(m) => bpe_decoder(m),
        Model::Unigram(_) => Decoder::Metaspace {
            add_prefix_space: true,
        },
    }
}

fn bpe_decoder(bpe: &Bpe) -> Decoder {
    match bpe.mode() {
        WordMode::Plain => Decoder::ByteLevel,
        WordMode::EndOfWord { suffix } => Decoder::EndOfWord {
            suffix: suffix.clone(),
        },
        WordMode::Continuation { .. } => Decoder::Ctrl,
    }
}

/// 按长度降序排列，使较长的特殊词优先匹配
fn build_pattern<'a>(tokens: impl IntoIterator<Item = &'a String>) -> Result<Regex> {
    let mut tokens = tokens.into_iter().collect::<Vec<_>>();
    tokens.sort_unstable_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let pattern = tokens
        .into_iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&pattern).map_err(|e| Error::Config(format!("special token pattern: {e}")))
}
