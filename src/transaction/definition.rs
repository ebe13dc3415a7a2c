// ============================================================================
// Transaction Definition
// ============================================================================
//
// What a caller asks for when it begins a logical transaction: how to relate
// to an already running physical transaction (propagation) plus the hints
// handed to the resource provider (isolation, read-only, timeout).
//
// ============================================================================

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a logical transaction relates to the physical transaction already
/// bound to the execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropagationMode {
    /// Join the current transaction, or start a new one if none exists
    #[default]
    Required,

    /// Always start a new physical transaction, suspending the current one
    RequiresNew,

    /// Run inside a savepoint of the current transaction, or start a new one
    Nested,

    /// Join the current transaction if there is one, otherwise run without
    Supports,

    /// Always run without a transaction, suspending the current one
    NotSupported,

    /// Join the current transaction; fail if there is none
    Mandatory,

    /// Run without a transaction; fail if there is one
    Never,
}

impl std::fmt::Display for PropagationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PropagationMode::Required => "REQUIRED",
            PropagationMode::RequiresNew => "REQUIRES_NEW",
            PropagationMode::Nested => "NESTED",
            PropagationMode::Supports => "SUPPORTS",
            PropagationMode::NotSupported => "NOT_SUPPORTED",
            PropagationMode::Mandatory => "MANDATORY",
            PropagationMode::Never => "NEVER",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for PropagationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "REQUIRED" => Ok(PropagationMode::Required),
            "REQUIRES_NEW" => Ok(PropagationMode::RequiresNew),
            "NESTED" => Ok(PropagationMode::Nested),
            "SUPPORTS" => Ok(PropagationMode::Supports),
            "NOT_SUPPORTED" => Ok(PropagationMode::NotSupported),
            "MANDATORY" => Ok(PropagationMode::Mandatory),
            "NEVER" => Ok(PropagationMode::Never),
            other => Err(format!("unknown propagation mode '{}'", other)),
        }
    }
}

/// Isolation level requested from the resource provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
    /// Use whatever the data source is configured with
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn is_default(&self) -> bool {
        matches!(self, IsolationLevel::Default)
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IsolationLevel::Default => "DEFAULT",
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        };
        write!(f, "{}", name)
    }
}

/// Options of one `begin` call
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransactionDefinition {
    pub propagation: PropagationMode,
    pub isolation: IsolationLevel,
    /// Hint only; enforced by the connection for new physical transactions
    pub read_only: bool,
    /// Delegated to the connection; `None` falls back to the manager default
    pub timeout: Option<Duration>,
    /// Name used in log output
    pub name: Option<String>,
}

impl TransactionDefinition {
    /// Create a definition with the given propagation and defaults otherwise
    pub fn new(propagation: PropagationMode) -> Self {
        Self {
            propagation,
            ..Self::default()
        }
    }

    pub fn required() -> Self {
        Self::new(PropagationMode::Required)
    }

    pub fn requires_new() -> Self {
        Self::new(PropagationMode::RequiresNew)
    }

    pub fn nested() -> Self {
        Self::new(PropagationMode::Nested)
    }

    /// Set the propagation mode
    pub fn propagation(mut self, propagation: PropagationMode) -> Self {
        self.propagation = propagation;
        self
    }

    /// Set the isolation level
    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    /// Mark the transaction read-only
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set the transaction timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the name shown in logs
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Name for log output
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}
