use crate::core::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Behavior switches of a [`TransactionManager`](super::TransactionManager)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionManagerConfig {
    /// Allow NESTED to create savepoints
    pub nested_transaction_allowed: bool,

    /// Reject joins whose isolation or read-only flag conflict with the
    /// running transaction
    pub validate_existing_transaction: bool,

    /// Timeout for definitions that do not set one
    pub default_timeout: Option<Duration>,
}

impl TransactionManagerConfig {
    pub fn new() -> Self {
        Self {
            nested_transaction_allowed: true,
            validate_existing_transaction: false,
            default_timeout: None,
        }
    }

    pub fn nested_transaction_allowed(mut self, allowed: bool) -> Self {
        self.nested_transaction_allowed = allowed;
        self
    }

    pub fn validate_existing_transaction(mut self, validate: bool) -> Self {
        self.validate_existing_transaction = validate;
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Parse from a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for TransactionManagerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransactionManagerConfig::default();
        assert!(config.nested_transaction_allowed);
        assert!(!config.validate_existing_transaction);
        assert_eq!(config.default_timeout, None);
    }

    #[test]
    fn test_from_json() {
        let config =
            TransactionManagerConfig::from_json(r#"{"nested_transaction_allowed": false}"#)
                .unwrap();
        assert!(!config.nested_transaction_allowed);
        assert!(!config.validate_existing_transaction);

        assert!(TransactionManagerConfig::from_json("{").is_err());
    }
}
