//! Renderer configuration presets.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error loading a [`RendererConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid renderer config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration for a [`Renderer`](crate::Renderer).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Native node type created for the live root.
    pub root_type: String,
    /// Attribute holding the style token list.
    pub style_attribute: String,
    /// Attribute holding the state token list.
    pub state_attribute: String,
    /// Prefix marking event attributes (`onTap`).
    pub event_prefix: String,
    /// Attribute carrying the string of a text node.
    pub text_attribute: String,
    /// Whether every native mutation is traced.
    pub trace_mutations: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl RendererConfig {
    /// Standard configuration for general use.
    pub fn standard() -> Self {
        Self {
            root_type: "Window".to_string(),
            style_attribute: "style".to_string(),
            state_attribute: "state".to_string(),
            event_prefix: "on".to_string(),
            text_attribute: "content".to_string(),
            trace_mutations: false,
        }
    }

    /// Debug configuration tracing every native call.
    pub fn debug() -> Self {
        Self {
            trace_mutations: true,
            ..Self::standard()
        }
    }

    /// Testing configuration.
    pub fn testing() -> Self {
        Self {
            trace_mutations: true,
            ..Self::standard()
        }
    }

    /// Parse a TOML document; missing keys take their standard values.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Event name carried by an attribute, if it is shaped like `onX`.
    pub fn event_name(&self, attribute: &str) -> Option<String> {
        let rest = attribute.strip_prefix(self.event_prefix.as_str())?;
        if rest.is_empty() {
            return None;
        }
        Some(rest.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml() {
        let config = RendererConfig::from_toml(
            r#"
            root_type = "Screen"
            trace_mutations = true
            "#,
        )
        .unwrap();

        assert_eq!(config.root_type, "Screen");
        assert!(config.trace_mutations);
        assert_eq!(config.style_attribute, "style");
    }

    #[test]
    fn test_invalid_toml() {
        assert!(RendererConfig::from_toml("root_type = 3").is_err());
    }

    #[test]
    fn test_event_name() {
        let config = RendererConfig::standard();
        assert_eq!(config.event_name("onTap"), Some("tap".to_string()));
        assert_eq!(config.event_name("onlongpress"), Some("longpress".to_string()));
        assert_eq!(config.event_name("on"), None);
        assert_eq!(config.event_name("color"), None);
    }
}
