use crate::core::{Result, TxError};
use crate::transaction::IsolationLevel;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const URL_PREFIX: &str = "memtx:mem:";

/// Data source configuration
///
/// Similar to a JDBC URL plus pool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSourceConfig {
    /// In-memory database name; data sources with the same name share data
    pub database: String,

    /// Connection acquisition timeout
    pub connect_timeout: Duration,

    /// Maximum number of connections in pool
    pub max_connections: usize,

    /// Minimum number of connections in pool
    pub min_connections: usize,

    /// Connection idle timeout
    pub idle_timeout: Option<Duration>,

    /// Maximum connection lifetime
    pub max_lifetime: Option<Duration>,

    /// Isolation level used when a transaction asks for `Default`
    pub default_isolation: IsolationLevel,
}

impl DataSourceConfig {
    /// Create a new configuration for the named database
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            connect_timeout: Duration::from_secs(30),
            max_connections: 10,
            min_connections: 1,
            idle_timeout: Some(Duration::from_secs(600)), // 10 minutes
            max_lifetime: Some(Duration::from_secs(1800)), // 30 minutes
            default_isolation: IsolationLevel::ReadCommitted,
        }
    }

    /// Set the database name
    pub fn database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set minimum connections
    pub fn min_connections(mut self, min: usize) -> Self {
        self.min_connections = min;
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Set maximum lifetime
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    /// Set the isolation level applied for `IsolationLevel::Default`
    pub fn default_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.default_isolation = isolation;
        self
    }

    /// Parse from connection string
    ///
    /// Format: `memtx:mem:<database>[?key=value&...]` with the keys
    /// `max_connections`, `min_connections` and `connect_timeout_ms`.
    ///
    /// # Examples
    ///
    /// ```
    /// use memtx::DataSourceConfig;
    ///
    /// let config = DataSourceConfig::from_url("memtx:mem:testdb?max_connections=4").unwrap();
    /// assert_eq!(config.database, "testdb");
    /// assert_eq!(config.max_connections, 4);
    /// ```
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix(URL_PREFIX)
            .ok_or_else(|| TxError::Config(format!("URL must start with '{}'", URL_PREFIX)))?;

        let (database, query) = match rest.split_once('?') {
            Some((database, query)) => (database, Some(query)),
            None => (rest, None),
        };

        if database.is_empty() {
            return Err(TxError::Config("database name is missing".to_string()));
        }

        let mut config = Self::new(database);

        for pair in query.into_iter().flat_map(|q| q.split('&')).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| TxError::Config(format!("invalid parameter '{}'", pair)))?;

            let number = value
                .parse::<u64>()
                .map_err(|_| TxError::Config(format!("invalid value for '{}': {}", key, value)))?;

            match key {
                "max_connections" => config.max_connections = number as usize,
                "min_connections" => config.min_connections = number as usize,
                "connect_timeout_ms" => config.connect_timeout = Duration::from_millis(number),
                other => {
                    return Err(TxError::Config(format!("unknown parameter '{}'", other)));
                }
            }
        }

        Ok(config)
    }

    /// Convert to connection string
    pub fn to_url(&self) -> String {
        format!(
            "{}{}?max_connections={}&min_connections={}&connect_timeout_ms={}",
            URL_PREFIX,
            self.database,
            self.max_connections,
            self.min_connections,
            self.connect_timeout.as_millis()
        )
    }

    /// Parse from a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            TxError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.is_empty() {
            return Err(TxError::Config("database cannot be empty".to_string()));
        }

        if self.max_connections == 0 {
            return Err(TxError::Config("max_connections must be > 0".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(TxError::Config(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self::new("memtx")
    }
}
