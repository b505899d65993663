use http::{HeaderName, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Engine configuration.
///
/// Every field has a default, so an empty YAML document is a valid configuration:
///
/// ```
/// use etch::EtchConfig;
///
/// let config = EtchConfig::from_yaml("retired_remap_status: 410").unwrap();
/// assert_eq!(config.retired_status, 203);
/// assert_eq!(config.retired_remap_status, 410);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EtchConfig {
    /// Upstream status meaning the resource was retired from the live board.
    pub retired_status: u16,
    /// Status the retired status is rewritten to for clients.
    pub retired_remap_status: u16,
    /// Header carrying the upstream status when it was rewritten.
    pub original_status_header: String,
    /// Serve the cached copy of a retired resource instead of the remapped status.
    pub serve_cached_when_retired: bool,
    /// Media types eligible for caching. Empty means any.
    pub cacheable_content_types: Vec<String>,
    /// Header reporting how a response was produced.
    pub cache_status_header: String,
    /// Per-subscriber event buffer.
    pub event_buffer: usize,
}

impl Default for EtchConfig {
    fn default() -> Self {
        Self {
            retired_status: 203,
            retired_remap_status: 402,
            original_status_header: "X-Original-Status-Code".to_owned(),
            serve_cached_when_retired: false,
            cacheable_content_types: vec!["text/plain".to_owned()],
            cache_status_header: "X-Cache-Status".to_owned(),
            event_buffer: 64,
        }
    }
}

impl EtchConfig {
    /// Parses and validates a YAML configuration.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_saphyr::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks field values, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Settings::try_from(self).map(|_| ())
    }
}

/// Validated configuration in the form the engine consumes.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) retired: StatusCode,
    pub(crate) retired_remap: StatusCode,
    pub(crate) original_status_header: HeaderName,
    pub(crate) serve_cached_when_retired: bool,
    pub(crate) cacheable_content_types: Vec<String>,
    pub(crate) cache_status_header: HeaderName,
    pub(crate) event_buffer: usize,
}

impl TryFrom<&EtchConfig> for Settings {
    type Error = ConfigError;

    fn try_from(config: &EtchConfig) -> Result<Self, Self::Error> {
        if config.event_buffer == 0 {
            return Err(ConfigError::Invalid {
                field: "event_buffer",
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(Self {
            retired: status(config.retired_status, "retired_status")?,
            retired_remap: status(config.retired_remap_status, "retired_remap_status")?,
            original_status_header: header(
                &config.original_status_header,
                "original_status_header",
            )?,
            serve_cached_when_retired: config.serve_cached_when_retired,
            cacheable_content_types: config
                .cacheable_content_types
                .iter()
                .map(|media| media.trim().to_ascii_lowercase())
                .collect(),
            cache_status_header: header(&config.cache_status_header, "cache_status_header")?,
            event_buffer: config.event_buffer,
        })
    }
}

fn status(code: u16, field: &'static str) -> Result<StatusCode, ConfigError> {
    StatusCode::from_u16(code).map_err(|e| ConfigError::Invalid {
        field,
        reason: e.to_string(),
    })
}

fn header(name: &str, field: &'static str) -> Result<HeaderName, ConfigError> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|e| ConfigError::Invalid {
        field,
        reason: e.to_string(),
    })
}
