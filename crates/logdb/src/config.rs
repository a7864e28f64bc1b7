//! Store identity and limits
//!
//! The `(name, type_tag, creator_tag)` triple is the store's wire identity:
//! every reader and writer that uses the same triple shares one store.

use logdb_storage::{FourCc, MAX_RECORD_SIZE};
use serde::{Deserialize, Serialize};

/// Default store name
pub const DEFAULT_NAME: &str = "DebugLog";

/// Default store type tag
pub const DEFAULT_TYPE_TAG: FourCc = FourCc::new(*b"DATA");

/// Default store creator tag
pub const DEFAULT_CREATOR_TAG: FourCc = FourCc::new(*b"LgDB");

/// App name recorded when the caller gives none
pub const UNKNOWN_APP: &str = "UnknownApp";

/// Longest app name a session keeps, in bytes
pub const DEFAULT_MAX_APP_NAME_LEN: usize = 31;

/// Configuration of a log store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database name
    pub name: String,
    /// Database type tag
    pub type_tag: FourCc,
    /// Database creator tag
    pub creator_tag: FourCc,
    /// Largest encoded record accepted by append
    pub max_record_size: usize,
    /// Session app names are truncated to this many bytes
    pub max_app_name_len: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            type_tag: DEFAULT_TYPE_TAG,
            creator_tag: DEFAULT_CREATOR_TAG,
            max_record_size: MAX_RECORD_SIZE,
            max_app_name_len: DEFAULT_MAX_APP_NAME_LEN,
        }
    }
}

impl StoreConfig {
    /// Identity used by the multi-app shared logger builds
    pub fn shared_logger() -> Self {
        Self {
            name: "AppLogsDB".to_string(),
            creator_tag: FourCc::new(*b"LgDb"),
            ..Default::default()
        }
    }

    /// Set the database name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the type tag
    pub fn with_type_tag(mut self, type_tag: FourCc) -> Self {
        self.type_tag = type_tag;
        self
    }

    /// Set the creator tag
    pub fn with_creator_tag(mut self, creator_tag: FourCc) -> Self {
        self.creator_tag = creator_tag;
        self
    }

    /// Set the record size limit (never above the storage limit)
    pub fn with_max_record_size(mut self, size: usize) -> Self {
        self.max_record_size = size.min(MAX_RECORD_SIZE);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_identity() {
        let config = StoreConfig::default();
        assert_eq!(config.name, "DebugLog");
        assert_eq!(config.type_tag.to_string(), "DATA");
        assert_eq!(config.creator_tag.to_string(), "LgDB");
        assert_eq!(config.max_record_size, MAX_RECORD_SIZE);
    }

    #[test]
    fn test_shared_logger_identity_differs() {
        let config = StoreConfig::shared_logger();
        assert_ne!(config, StoreConfig::default());
        assert_eq!(config.type_tag, DEFAULT_TYPE_TAG);
    }

    #[test]
    fn test_record_size_capped() {
        let config = StoreConfig::default().with_max_record_size(usize::MAX);
        assert_eq!(config.max_record_size, MAX_RECORD_SIZE);
    }

    #[test]
    fn test_serde_partial_config() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"name":"TestLog","creator_tag":"TsLg"}"#).unwrap();
        assert_eq!(config.name, "TestLog");
        assert_eq!(config.creator_tag, FourCc::new(*b"TsLg"));
        assert_eq!(config.type_tag, DEFAULT_TYPE_TAG);

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""type_tag":"DATA""#));
    }
}
