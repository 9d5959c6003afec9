use crate::error::{MarketContextError, Result};
use crate::events::DetectorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_HEADING: &str = "## Market Context";

/// Structural and lexical constraints every accepted draft must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleRules {
    pub heading: String,
    pub min_words: usize,
    pub max_words: usize,
    /// Body paragraphs, not counting the heading line.
    pub min_paragraphs: usize,
    pub max_paragraphs: usize,
    /// Every flagged event's move must be cited verbatim.
    pub require_event_citations: bool,
    /// Reject template leftovers such as "[insert figure]".
    pub reject_bracket_placeholders: bool,
}

impl Default for StyleRules {
    fn default() -> Self {
        Self {
            heading: DEFAULT_HEADING.to_string(),
            min_words: 150,
            max_words: 250,
            min_paragraphs: 2,
            max_paragraphs: 4,
            require_event_citations: true,
            reject_bracket_placeholders: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Transport-level retries, separate from the single repair cycle.
    pub max_transport_retries: u32,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.2,
            timeout_secs: 60,
            max_transport_retries: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub style: StyleRules,
    pub detector: DetectorConfig,
    pub generator: GeneratorSettings,
}

impl PipelineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `MCB_*` environment variables when present.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = env_parse::<usize>("MCB_PARA_MIN")? {
            config.style.min_paragraphs = v;
        }
        if let Some(v) = env_parse::<usize>("MCB_PARA_MAX")? {
            config.style.max_paragraphs = v;
        }
        if let Some(v) = env_parse::<f64>("MCB_Z_THRESHOLD")? {
            config.detector.threshold_sigma = v;
        }
        if let Some(v) = env_parse::<usize>("MCB_MAX_EVENTS")? {
            config.detector.max_events = Some(v);
        }
        if let Ok(model) = std::env::var("MCB_MODEL") {
            if !model.trim().is_empty() {
                config.generator.model = model.trim().to_string();
            }
        }
        if let Some(v) = env_parse::<u64>("MCB_TIMEOUT_SECS")? {
            config.generator.timeout_secs = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let style = &self.style;
        if style.heading.trim().is_empty() {
            return Err(MarketContextError::Config("heading must not be empty".into()));
        }
        if style.min_words == 0 || style.min_words > style.max_words {
            return Err(MarketContextError::Config(format!(
                "invalid word range [{}, {}]",
                style.min_words, style.max_words
            )));
        }
        if style.min_paragraphs == 0 || style.min_paragraphs > style.max_paragraphs {
            return Err(MarketContextError::Config(format!(
                "invalid paragraph range [{}, {}]",
                style.min_paragraphs, style.max_paragraphs
            )));
        }
        if !self.detector.threshold_sigma.is_finite() || self.detector.threshold_sigma <= 0.0 {
            return Err(MarketContextError::Config(format!(
                "threshold_sigma must be positive, got {}",
                self.detector.threshold_sigma
            )));
        }
        if self.generator.timeout_secs == 0 {
            return Err(MarketContextError::Config(
                "timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| MarketContextError::Config(format!("{} has invalid value '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.style.heading, "## Market Context");
        assert_eq!((config.style.min_words, config.style.max_words), (150, 250));
        assert_eq!(
            (config.style.min_paragraphs, config.style.max_paragraphs),
            (2, 4)
        );
        assert_eq!(config.detector.threshold_sigma, 1.5);
    }

    #[test]
    fn test_rejects_inverted_ranges() {
        let mut config = PipelineConfig::default();
        config.style.min_paragraphs = 5;
        assert!(matches!(
            config.validate(),
            Err(MarketContextError::Config(_))
        ));

        let mut config = PipelineConfig::default();
        config.detector.threshold_sigma = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "style": { "max_paragraphs": 3 } }"#).unwrap();
        assert_eq!(config.style.max_paragraphs, 3);
        assert_eq!(config.style.min_words, 150);
        assert_eq!(config.detector.max_events, Some(3));
    }

    #[test]
    fn test_from_json_file() {
        let path = std::env::temp_dir().join("mcb_config_test.json");
        std::fs::write(&path, r#"{ "detector": { "threshold_sigma": 2.0 } }"#).unwrap();
        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.detector.threshold_sigma, 2.0);
        let _ = std::fs::remove_file(&path);
    }
}
