//! Token counting over a fixed, named BPE encoding.

use std::fmt;
use std::str::FromStr;

use tiktoken_rs::CoreBPE;

use crate::error::{Error, Result};
use crate::history::Message;

/// Something that turns text into a token count.
///
/// Implementations must be deterministic and free of side effects.
pub trait TokenCounter: Send + Sync {
    /// Name of the encoding, for display.
    fn encoding_name(&self) -> &str;

    /// Number of tokens in `text`.
    fn count(&self, text: &str) -> u64;

    /// Number of tokens across the contents of `messages`.
    fn count_messages(&self, messages: &[Message]) -> u64 {
        messages
            .iter()
            .map(|m| self.count(m.content()))
            .fold(0u64, u64::saturating_add)
    }
}

/// Named BPE encodings bundled with `tiktoken-rs`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Encoding for gpt-3.5-turbo and gpt-4.
    #[default]
    Cl100kBase,
    /// Encoding for the codex and text-davinci-002/003 models.
    P50kBase,
    /// Encoding for the GPT-3 models.
    R50kBase,
}

impl Encoding {
    /// Returns the canonical name of the encoding.
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Cl100kBase => "cl100k_base",
            Encoding::P50kBase => "p50k_base",
            Encoding::R50kBase => "r50k_base",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cl100k_base" | "cl100k" => Ok(Encoding::Cl100kBase),
            "p50k_base" | "p50k" => Ok(Encoding::P50kBase),
            "r50k_base" | "r50k" | "gpt2" => Ok(Encoding::R50kBase),
            other => Err(Error::encoding_unavailable(
                other,
                "unknown encoding (expected cl100k_base, p50k_base, or r50k_base)",
            )),
        }
    }
}

/// Token counter backed by a `tiktoken-rs` BPE table.
pub struct Tokenizer {
    encoding: Encoding,
    bpe: CoreBPE,
}

impl Tokenizer {
    /// Loads the BPE table for `encoding`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EncodingUnavailable`] if the table cannot be built.
    pub fn load(encoding: Encoding) -> Result<Self> {
        let bpe = match encoding {
            Encoding::Cl100kBase => tiktoken_rs::cl100k_base(),
            Encoding::P50kBase => tiktoken_rs::p50k_base(),
            Encoding::R50kBase => tiktoken_rs::r50k_base(),
        }
        .map_err(|e| Error::encoding_unavailable(encoding.name(), e.to_string()))?;
        tracing::debug!(encoding = encoding.name(), "loaded token encoding");
        Ok(Self { encoding, bpe })
    }

    /// Returns the encoding this tokenizer was loaded with.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }
}

impl TokenCounter for Tokenizer {
    fn encoding_name(&self) -> &str {
        self.encoding.name()
    }

    fn count(&self, text: &str) -> u64 {
        // Special-token markers are counted as plain text.
        self.bpe.encode_ordinary(text).len() as u64
    }
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer")
            .field("encoding", &self.encoding)
            .finish()
    }
}
