use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::fallback::ContractMismatchPolicy;
use crate::{
    DEFAULT_EVENT_CAPACITY, DEFAULT_MESSAGE_PAGE_SIZE, DEFAULT_REVIEW_PAGE_SIZE,
    DEFAULT_THREAD_PAGE_SIZE, MAX_PAGE_SIZE,
};

const MAX_URL_LENGTH: usize = 2048;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("{field} must be between 1 and {max}, got {value}")]
    PageSizeOutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },

    #[error("event_capacity must be greater than zero")]
    ZeroEventCapacity,

    #[error("config is not valid JSON: {reason}")]
    InvalidJson { reason: String },
}

/// Settings handed over by the host shell, usually as JSON.
///
/// Only `base_url` is required; every other field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// API root including the version prefix, e.g. `https://api.example.com/v1/`.
    pub base_url: Url,
    #[serde(default = "default_thread_page_size")]
    pub thread_page_size: u32,
    #[serde(default = "default_message_page_size")]
    pub message_page_size: u32,
    #[serde(default = "default_review_page_size")]
    pub review_page_size: u32,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Mismatch rule for mutation chains (wishlist add, thread creation).
    #[serde(default)]
    pub mutation_fallback: ContractMismatchPolicy,
    /// Mismatch rule for read chains (listing detail routes, wishlist listing).
    #[serde(default = "default_read_fallback")]
    pub read_fallback: ContractMismatchPolicy,
}

fn default_thread_page_size() -> u32 {
    DEFAULT_THREAD_PAGE_SIZE
}

fn default_message_page_size() -> u32 {
    DEFAULT_MESSAGE_PAGE_SIZE
}

fn default_review_page_size() -> u32 {
    DEFAULT_REVIEW_PAGE_SIZE
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

fn default_read_fallback() -> ContractMismatchPolicy {
    ContractMismatchPolicy::default().with_decode_failures()
}

impl SyncConfig {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let parsed = Url::parse(base_url.trim()).map_err(|e| ConfigError::InvalidBaseUrl {
            url: truncate(base_url),
            reason: e.to_string(),
        })?;
        let config = Self {
            base_url: parsed,
            thread_page_size: DEFAULT_THREAD_PAGE_SIZE,
            message_page_size: DEFAULT_MESSAGE_PAGE_SIZE,
            review_page_size: DEFAULT_REVIEW_PAGE_SIZE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            mutation_fallback: ContractMismatchPolicy::default(),
            read_fallback: default_read_fallback(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::InvalidJson {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = &self.base_url;
        let invalid = |reason: &str| ConfigError::InvalidBaseUrl {
            url: truncate(url.as_str()),
            reason: reason.to_string(),
        };
        if url.as_str().len() > MAX_URL_LENGTH {
            return Err(invalid("URL is too long"));
        }
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host"));
        }
        if url.cannot_be_a_base() {
            return Err(invalid("URL cannot be used as a base"));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(invalid("credentials in URL are not allowed"));
        }

        for (field, value) in [
            ("thread_page_size", self.thread_page_size),
            ("message_page_size", self.message_page_size),
            ("review_page_size", self.review_page_size),
        ] {
            if !(1..=MAX_PAGE_SIZE).contains(&value) {
                return Err(ConfigError::PageSizeOutOfRange {
                    field,
                    value,
                    max: MAX_PAGE_SIZE,
                });
            }
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::ZeroEventCapacity);
        }
        Ok(())
    }

    /// `base_url` + path segments. Segments are percent-encoded individually.
    pub fn api_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        url.set_query(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Like [`api_url`](Self::api_url); `None` values are left out of the query.
    pub fn api_url_with_query(&self, segments: &[&str], query: &[(&str, Option<&str>)]) -> Url {
        let mut url = self.api_url(segments);
        let present: Vec<(&str, &str)> = query
            .iter()
            .filter_map(|(key, value)| value.map(|v| (*key, v)))
            .collect();
        if !present.is_empty() {
            url.query_pairs_mut().extend_pairs(present);
        }
        url
    }
}

fn truncate(url: &str) -> String {
    url.chars().take(100).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates() {
        assert!(SyncConfig::new("https://api.example.com/v1/").is_ok());
        assert!(matches!(
            SyncConfig::new("ftp://api.example.com"),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            SyncConfig::new("not a url"),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            SyncConfig::new("https://user:pw@api.example.com/"),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn test_page_size_bounds() {
        let mut config = SyncConfig::new("https://api.example.com/v1/").unwrap();
        config.message_page_size = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::PageSizeOutOfRange {
                field: "message_page_size",
                value: 0,
                max: MAX_PAGE_SIZE
            })
        );
        config.message_page_size = MAX_PAGE_SIZE + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_uses_defaults() {
        let config =
            SyncConfig::from_json(r#"{"base_url": "https://api.example.com/v1/", "thread_page_size": 10}"#)
                .unwrap();
        assert_eq!(config.thread_page_size, 10);
        assert_eq!(config.message_page_size, DEFAULT_MESSAGE_PAGE_SIZE);
        assert!(config.read_fallback.decode_failures);
        assert!(!config.mutation_fallback.decode_failures);
    }

    #[test]
    fn test_from_json_reports_syntax_errors() {
        assert!(matches!(
            SyncConfig::from_json(r#"{"base_url": "https://api.example.com/v1/""#),
            Err(ConfigError::InvalidJson { .. })
        ));
        assert!(matches!(
            SyncConfig::from_json(r#"{"base_url": "ftp://api.example.com/"}"#),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn test_api_url_building() {
        let config = SyncConfig::new("https://api.example.com/v1").unwrap();
        assert_eq!(
            config.api_url(&["inbox", "threads", "t 1", "messages"]).as_str(),
            "https://api.example.com/v1/inbox/threads/t%201/messages"
        );

        let config = SyncConfig::new("https://api.example.com/v1/").unwrap();
        let url = config.api_url_with_query(
            &["inbox", "threads"],
            &[("limit", Some("20")), ("cursor", None), ("mode", Some("host"))],
        );
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v1/inbox/threads?limit=20&mode=host"
        );
    }

    #[test]
    fn test_cursor_is_query_encoded() {
        let config = SyncConfig::new("https://api.example.com/v1/").unwrap();
        let url = config.api_url_with_query(&["x"], &[("cursor", Some("a+b=c&d"))]);
        let echoed: Vec<_> = url.query_pairs().collect();
        assert_eq!(echoed[0].1, "a+b=c&d");
    }
}
