//! Protocol decoders.
//!
//! A decoder turns one raw chunk into a short human-readable gloss. Decoders
//! are stateless and see each chunk in isolation: there is no framing or
//! reassembly, so a command split across two reads is glossed as two chunks.
//!
//! New protocol families are added by implementing [`ProtocolDecoder`] and
//! registering it with a [`DecoderRegistry`]; the relay never needs to know.

mod hamlib;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

pub use hamlib::HamlibDecoder;

/// Maps a raw chunk to a semantic label for one protocol family.
pub trait ProtocolDecoder: Send + Sync {
    /// Family name used to select this decoder (e.g. `"hamlib"`).
    fn family(&self) -> &'static str;

    /// Gloss for `data`. Must never fail: undecodable input degrades to a
    /// descriptive label.
    fn decode(&self, data: &[u8]) -> String;
}

/// The `raw` family: no interpretation, always an empty gloss.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDecoder;

impl ProtocolDecoder for RawDecoder {
    fn family(&self) -> &'static str {
        "raw"
    }

    fn decode(&self, _data: &[u8]) -> String {
        String::new()
    }
}

/// Decoders keyed by family name.
#[derive(Clone)]
pub struct DecoderRegistry {
    decoders: HashMap<&'static str, Arc<dyn ProtocolDecoder>>,
}

impl DecoderRegistry {
    /// Registry with no decoders at all.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registry with the built-in families (`raw`, `hamlib`).
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(RawDecoder);
        registry.register(HamlibDecoder);
        registry
    }

    /// Add or replace the decoder for its family.
    pub fn register<D: ProtocolDecoder + 'static>(&mut self, decoder: D) {
        self.decoders.insert(decoder.family(), Arc::new(decoder));
    }

    /// Whether `family` has a registered decoder.
    pub fn supports(&self, family: &str) -> bool {
        self.decoders.contains_key(family)
    }

    /// Registered family names, sorted.
    pub fn families(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.decoders.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Gloss `data` with the decoder for `family`. Unknown families get an
    /// empty gloss, the same as `raw`.
    pub fn decode(&self, family: &str, data: &[u8]) -> String {
        self.decoders
            .get(family)
            .map(|d| d.decode(data))
            .unwrap_or_default()
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderRegistry")
            .field("families", &self.families())
            .finish()
    }
}

static BUILTINS: LazyLock<DecoderRegistry> = LazyLock::new(DecoderRegistry::with_builtins);

/// Gloss `data` using the built-in decoders.
pub fn decode(family: &str, data: &[u8]) -> String {
    BUILTINS.decode(family, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl ProtocolDecoder for Upper {
        fn family(&self) -> &'static str {
            "upper"
        }

        fn decode(&self, data: &[u8]) -> String {
            String::from_utf8_lossy(data).to_uppercase()
        }
    }

    #[test]
    fn raw_family_never_glosses() {
        assert_eq!(decode("raw", b"F 14074000"), "");
        assert_eq!(decode("raw", &[0xff, 0xfe]), "");
    }

    #[test]
    fn unknown_family_yields_empty_gloss() {
        assert_eq!(decode("modbus", b"F 14074000"), "");
    }

    #[test]
    fn builtins_are_supported() {
        let registry = DecoderRegistry::default();
        assert!(registry.supports("raw"));
        assert!(registry.supports("hamlib"));
        assert!(!registry.supports("modbus"));
        assert_eq!(registry.families(), vec!["hamlib", "raw"]);
    }

    #[test]
    fn registering_a_family_extends_the_registry() {
        let mut registry = DecoderRegistry::with_builtins();
        registry.register(Upper);
        assert!(registry.supports("upper"));
        assert_eq!(registry.decode("upper", b"get freq"), "GET FREQ");
        assert_eq!(registry.decode("hamlib", b"f"), "GET FREQ");
    }

    #[test]
    fn empty_registry_supports_nothing() {
        let registry = DecoderRegistry::empty();
        assert!(!registry.supports("raw"));
        assert_eq!(registry.decode("hamlib", b"f"), "");
    }
}
