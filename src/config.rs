//! Binding configuration, read once at `init`.
//!
//! Settings come from a YCSB-style property map (`graph.url`,
//! `graph.mode`, ...), from a TOML file, or are built in code.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::GraphBenchError;

/// Property prefix recognized by [`BindingConfig::from_properties`].
pub const PROPERTY_PREFIX: &str = "graph.";

/// Store location used when `graph.url` is not set.
pub const DEFAULT_URL: &str = "data/graphbench";
/// Node index holding record keys.
pub const DEFAULT_INDEX: &str = "node_index";
/// Property the record key is stored under.
pub const DEFAULT_KEY_FIELD: &str = "_id";

/// Connectivity and mutation strategy of a client, fixed at `init`.
///
/// Serialized through its string form, so TOML accepts the same spellings
/// as the property map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Mode {
    /// In-process engine, shared by every client of the process.
    Embedded,
    /// HTTP engine, one round trip per step inside a server-side transaction.
    Remote,
    /// HTTP engine, inserts sent as one atomic batch request.
    RemoteBatch,
}

impl Mode {
    /// Whether the store is reached over HTTP.
    pub fn is_remote(self) -> bool {
        !matches!(self, Mode::Embedded)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Embedded => "EMBEDDED",
            Mode::Remote => "REMOTE",
            Mode::RemoteBatch => "REMOTE_BATCH",
        })
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "EMBEDDED" => Ok(Mode::Embedded),
            "REMOTE" | "REST" => Ok(Mode::Remote),
            "REMOTE_BATCH" | "BATCH" => Ok(Mode::RemoteBatch),
            _ => Err(ConfigError::InvalidValue {
                key: "mode",
                value: value.to_string(),
            }),
        }
    }
}

/// How `scan` behaves for this binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScanPolicy {
    /// Index-ordered range query from the start key.
    #[default]
    IndexRange,
    /// Always answers "not implemented".
    Unsupported,
}

impl TryFrom<String> for Mode {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Mode> for String {
    fn from(mode: Mode) -> Self {
        mode.to_string()
    }
}

impl FromStr for ScanPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "index_range" | "range" => Ok(ScanPolicy::IndexRange),
            "unsupported" | "none" => Ok(ScanPolicy::Unsupported),
            _ => Err(ConfigError::InvalidValue {
                key: "scan",
                value: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for ScanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScanPolicy::IndexRange => "index_range",
            ScanPolicy::Unsupported => "unsupported",
        })
    }
}

impl TryFrom<String> for ScanPolicy {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScanPolicy> for String {
    fn from(scan: ScanPolicy) -> Self {
        scan.to_string()
    }
}

/// Everything a client needs to reach its backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Directory of the embedded store, or base URL of the remote engine.
    pub url: String,
    /// How the store is reached and mutated.
    pub mode: Mode,
    /// What `scan` does.
    pub scan: ScanPolicy,
    /// Name of the node index holding record keys.
    pub index: String,
    /// Property under which the record key is stored.
    pub key_field: String,
    /// Per-request timeout for the remote modes. `None` blocks until done.
    pub timeout_ms: Option<u64>,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            mode: Mode::Embedded,
            scan: ScanPolicy::IndexRange,
            index: DEFAULT_INDEX.to_string(),
            key_field: DEFAULT_KEY_FIELD.to_string(),
            timeout_ms: None,
        }
    }
}

impl BindingConfig {
    /// Embedded store rooted at `path`, defaults elsewhere.
    pub fn embedded(path: impl AsRef<Path>) -> Self {
        Self {
            url: path.as_ref().display().to_string(),
            ..Self::default()
        }
    }

    /// Remote engine at `url`, one request per step.
    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mode: Mode::Remote,
            ..Self::default()
        }
    }

    /// Remote engine at `url`, inserts batched.
    pub fn remote_batch(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mode: Mode::RemoteBatch,
            ..Self::default()
        }
    }

    /// Replaces the scan policy.
    pub fn with_scan(mut self, scan: ScanPolicy) -> Self {
        self.scan = scan;
        self
    }

    /// Sets the remote request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Remote request timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Store directory for the embedded mode.
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.url)
    }

    /// Builds a config from harness properties. Unknown keys are ignored,
    /// missing keys keep their defaults.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(url) = property(props, "url") {
            config.url = url.to_string();
        }
        if let Some(mode) = property(props, "mode") {
            config.mode = mode.parse()?;
        }
        if let Some(scan) = property(props, "scan") {
            config.scan = scan.parse()?;
        }
        if let Some(index) = property(props, "index") {
            config.index = index.to_string();
        }
        if let Some(key_field) = property(props, "key_field") {
            config.key_field = key_field.to_string();
        }
        if let Some(timeout) = property(props, "timeout_ms") {
            let millis = timeout.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "timeout_ms",
                value: timeout.to_string(),
            })?;
            config.timeout_ms = Some(millis);
        }
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a TOML document. Missing keys keep their
    /// defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|source| ConfigError::Parse { source })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads [`BindingConfig::from_toml_str`] input from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Rejects empty names and non-HTTP URLs in the remote modes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Missing { key: "url" });
        }
        if self.index.is_empty() {
            return Err(ConfigError::Missing { key: "index" });
        }
        if self.key_field.is_empty() {
            return Err(ConfigError::Missing { key: "key_field" });
        }
        if self.mode.is_remote()
            && !(self.url.starts_with("http://") || self.url.starts_with("https://"))
        {
            return Err(ConfigError::InvalidValue {
                key: "url",
                value: self.url.clone(),
            });
        }
        Ok(())
    }
}

fn property<'a>(props: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    props
        .get(&format!("{PROPERTY_PREFIX}{name}"))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

/// Why a binding config was rejected.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read binding config {path}: {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// The config file is not valid TOML for [`BindingConfig`].
    #[error("failed to parse binding config: {source}")]
    Parse {
        /// Parser error, with location.
        source: toml::de::Error,
    },
    /// A required setting is empty.
    #[error("'{key}' must be set")]
    Missing {
        /// Setting name, without the `graph.` prefix.
        key: &'static str,
    },
    /// A setting has a value outside its domain.
    #[error("'{value}' is not a valid {key}")]
    InvalidValue {
        /// Setting name, without the `graph.` prefix.
        key: &'static str,
        /// The rejected value.
        value: String,
    },
}

impl From<ConfigError> for GraphBenchError {
    fn from(err: ConfigError) -> Self {
        GraphBenchError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_are_embedded_with_range_scan() {
        let config = BindingConfig::from_properties(&HashMap::new()).unwrap();
        assert_eq!(config, BindingConfig::default());
        assert_eq!(config.mode, Mode::Embedded);
        assert_eq!(config.scan, ScanPolicy::IndexRange);
    }

    #[test]
    fn properties_override_defaults() {
        let config = BindingConfig::from_properties(&props(&[
            ("graph.url", "http://127.0.0.1:7474"),
            ("graph.mode", "batch"),
            ("graph.scan", "unsupported"),
            ("graph.index", "records"),
            ("graph.key_field", "ycsb_key"),
            ("graph.timeout_ms", "2500"),
        ]))
        .unwrap();
        assert_eq!(config.mode, Mode::RemoteBatch);
        assert_eq!(config.scan, ScanPolicy::Unsupported);
        assert_eq!(config.index, "records");
        assert_eq!(config.key_field, "ycsb_key");
        assert_eq!(config.timeout(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = BindingConfig::from_properties(&props(&[("graph.mode", "CASSANDRA")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "mode", .. }));
    }

    #[test]
    fn remote_mode_needs_http_url() {
        let err = BindingConfig::from_properties(&props(&[("graph.mode", "REMOTE")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "url", .. }));
    }

    #[test]
    fn toml_config_parses() {
        let config = BindingConfig::from_toml_str(
            r#"
            url = "http://localhost:7474"
            mode = "REMOTE"
            scan = "unsupported"
            "#,
        )
        .unwrap();
        assert_eq!(config.mode, Mode::Remote);
        assert_eq!(config.scan, ScanPolicy::Unsupported);
        assert_eq!(config.index, DEFAULT_INDEX);
    }

    #[test]
    fn toml_accepts_property_spellings() {
        let remote = BindingConfig::from_toml_str(
            r#"
            url = "http://localhost:7474"
            mode = "remote"
            scan = "range"
            "#,
        )
        .unwrap();
        assert_eq!(remote.mode, Mode::Remote);
        assert_eq!(remote.scan, ScanPolicy::IndexRange);

        let batch = BindingConfig::from_toml_str(
            r#"
            url = "http://localhost:7474"
            mode = "BATCH"
            scan = "none"
            "#,
        )
        .unwrap();
        assert_eq!(batch.mode, Mode::RemoteBatch);
        assert_eq!(batch.scan, ScanPolicy::Unsupported);

        let err = BindingConfig::from_toml_str(r#"mode = "gremlin""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn toml_round_trips_canonical_names() {
        let config = BindingConfig::remote_batch("http://localhost:7474")
            .with_scan(ScanPolicy::Unsupported);
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains(r#"mode = "REMOTE_BATCH""#));
        assert!(text.contains(r#"scan = "unsupported""#));
        assert_eq!(BindingConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn load_reads_a_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("binding.toml");
        fs::write(&path, "url = \"/tmp/store\"\nindex = \"records\"\n").unwrap();
        let config = BindingConfig::load(&path).unwrap();
        assert_eq!(config.url, "/tmp/store");
        assert_eq!(config.index, "records");
        assert_eq!(config.mode, Mode::Embedded);

        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            BindingConfig::load(&missing),
            Err(ConfigError::Read { path, .. }) if path == missing
        ));
    }
}
