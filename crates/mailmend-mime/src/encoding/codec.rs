//! Named text codecs.
//!
//! A [`CodecRegistry`] maps charset labels to [`TextCodec`] implementations.
//! It is an ordinary value: build one at startup and hand it to whatever
//! needs to resolve charset names. Labels not in the registry fall back to
//! the WHATWG encodings known to the `charset` crate.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use charset::Charset;

use super::utf7;
use crate::error::{Error, Result};

/// A charset that can convert between bytes and Unicode text.
pub trait TextCodec: Send + Sync {
    /// Decodes bytes in this charset.
    ///
    /// # Errors
    ///
    /// Returns an error if `input` is not valid in this charset.
    fn decode(&self, input: &[u8]) -> Result<String>;

    /// Encodes text in this charset.
    fn encode(&self, text: &str) -> Vec<u8>;
}

/// The UTF-7 codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf7;

impl TextCodec for Utf7 {
    fn decode(&self, input: &[u8]) -> Result<String> {
        utf7::decode_bytes(input)
    }

    fn encode(&self, text: &str) -> Vec<u8> {
        utf7::encode_bytes(text.as_bytes())
    }
}

/// Charset label to codec mapping.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn TextCodec>>,
}

impl CodecRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the codecs the `charset` crate lacks.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let utf7: Arc<dyn TextCodec> = Arc::new(Utf7);
        for label in ["utf-7", "utf7", "unicode-1-1-utf-7"] {
            registry.register_shared(label, Arc::clone(&utf7));
        }
        registry
    }

    /// Registers a codec under a label, replacing any previous entry.
    pub fn register(&mut self, label: &str, codec: impl TextCodec + 'static) {
        self.register_shared(label, Arc::new(codec));
    }

    fn register_shared(&mut self, label: &str, codec: Arc<dyn TextCodec>) {
        self.codecs.insert(normalize(label), codec);
    }

    /// Looks up a registered codec. Labels are case-insensitive.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&dyn TextCodec> {
        self.codecs.get(&normalize(label)).map(AsRef::as_ref)
    }

    /// Returns true if `label` names a registered or built-in charset.
    #[must_use]
    pub fn supports(&self, label: &str) -> bool {
        self.get(label).is_some()
            || Charset::for_label_no_replacement(label.trim().as_bytes()).is_some()
    }

    /// Decodes `input` in the charset named by `label`.
    ///
    /// Registered codecs take precedence. Built-in charsets decode lossily.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCharset`] if the label is not known, or the
    /// error of the registered codec.
    pub fn decode(&self, label: &str, input: &[u8]) -> Result<String> {
        if let Some(codec) = self.get(label) {
            return codec.decode(input);
        }
        let charset = Charset::for_label_no_replacement(label.trim().as_bytes())
            .ok_or_else(|| Error::UnknownCharset(label.to_string()))?;
        let (text, _) = charset.decode_without_bom_handling(input);
        Ok(text.into_owned())
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut labels: Vec<&str> = self.codecs.keys().map(String::as_str).collect();
        labels.sort_unstable();
        f.debug_struct("CodecRegistry")
            .field("labels", &labels)
            .finish()
    }
}

fn normalize(label: &str) -> String {
    label.trim().to_ascii_lowercase()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Upper;

    impl TextCodec for Upper {
        fn decode(&self, input: &[u8]) -> Result<String> {
            Ok(String::from_utf8_lossy(input).to_uppercase())
        }

        fn encode(&self, text: &str) -> Vec<u8> {
            text.to_lowercase().into_bytes()
        }
    }

    #[test]
    fn test_defaults_register_utf7() {
        let registry = CodecRegistry::with_defaults();
        for label in ["UTF-7", "utf7", " unicode-1-1-utf-7 "] {
            let codec = registry.get(label).unwrap();
            assert_eq!(codec.decode(b"+AKM-1").unwrap(), "£1");
        }
        assert!(CodecRegistry::new().get("utf-7").is_none());
    }

    #[test]
    fn test_decode_falls_back_to_charset() {
        let registry = CodecRegistry::with_defaults();
        assert_eq!(registry.decode("ISO-8859-1", b"caf\xE9").unwrap(), "café");
        assert_eq!(registry.decode("utf-8", "ok".as_bytes()).unwrap(), "ok");
        assert!(registry.supports("windows-1252"));
    }

    #[test]
    fn test_decode_unknown_charset() {
        let err = CodecRegistry::new().decode("x-klingon", b"abc").unwrap_err();
        assert!(matches!(err, Error::UnknownCharset(ref label) if label == "x-klingon"));
    }

    #[test]
    fn test_registered_codec_wins() {
        let mut registry = CodecRegistry::with_defaults();
        registry.register("UTF-8", Upper);
        assert_eq!(registry.decode("utf-8", b"shout").unwrap(), "SHOUT");
        assert_eq!(registry.get("utf-8").unwrap().encode("QUIET"), b"quiet");
    }

    #[test]
    fn test_utf7_codec_errors() {
        let registry = CodecRegistry::with_defaults();
        assert!(matches!(registry.decode("utf-7", b"a~b"), Err(Error::BadUtf7)));
    }

    #[test]
    fn test_debug_lists_labels() {
        let debug = format!("{:?}", CodecRegistry::with_defaults());
        assert!(debug.contains("\"utf7\""));
    }
}
