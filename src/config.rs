use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Native structure layout revision of the linked library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
pub enum LayoutVersion {
    /// LSF 7.0: 128 host models, no host topology fields.
    #[serde(rename = "7.0")]
    #[value(name = "7.0")]
    Lsf70,
    /// LSF 7.0.6: 1026 host models, architectures and host topology.
    #[default]
    #[serde(rename = "7.0.6")]
    #[value(name = "7.0.6")]
    Lsf706,
}

impl LayoutVersion {
    /// Capacity of the fixed host model tables in `lsInfo`.
    pub fn max_models(self) -> usize {
        match self {
            LayoutVersion::Lsf70 => crate::decoder::sizes::MAX_MODELS_70,
            LayoutVersion::Lsf706 => crate::decoder::sizes::MAX_MODELS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LayoutVersion::Lsf70 => "7.0",
            LayoutVersion::Lsf706 => "7.0.6",
        }
    }
}

/// Limits and layout selection for one decoding session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub layout: LayoutVersion,
    /// Largest element count any single array may declare.
    pub max_elements: usize,
    /// Longest `char *` string followed before giving up.
    pub max_string_len: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            layout: LayoutVersion::default(),
            max_elements: 65_536,
            max_string_len: 65_536,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DecoderConfig::default();
        assert_eq!(config.layout, LayoutVersion::Lsf706);
        assert_eq!(config.max_elements, 65_536);
        assert_eq!(config.max_string_len, 65_536);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: DecoderConfig =
            serde_json::from_str(r#"{"layout": "7.0", "max_elements": 16}"#).unwrap();
        assert_eq!(config.layout, LayoutVersion::Lsf70);
        assert_eq!(config.max_elements, 16);
        assert_eq!(config.max_string_len, 65_536);
        assert_eq!(config.layout.max_models(), 128);
    }
}
