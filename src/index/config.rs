//! Storage configuration.
//!
//! A storage is described by a small set of keys: its location, the journal
//! cache size, whether access control is enforced, the metadata schema, the
//! statistics blob encoding and how many commit statistics records are kept. The configuration can be built in code or
//! parsed from the flat string form:
//!
//! ```
//! use quarry::index::config::IndexConfig;
//!
//! let config: IndexConfig = "path='/tmp/idx';cache=512M;acl=true;metadata='doclen UINT16'"
//!     .parse()
//!     .unwrap();
//! assert!(config.acl);
//! assert_eq!(config.cache_size, 512 * 1024 * 1024);
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::index::metadata::MetaDataSchema;
use crate::statistics::blob::StatsProcKind;

const DEFAULT_CACHE_SIZE: u64 = 16 * 1024 * 1024;

const DEFAULT_STATISTICS_HISTORY: usize = 10_000;

fn default_cache_size() -> u64 {
    DEFAULT_CACHE_SIZE
}

fn default_statistics_history() -> usize {
    DEFAULT_STATISTICS_HISTORY
}

/// Configuration of one storage instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Storage directory. `None` keeps the storage in memory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Journal size in bytes after which a commit writes a checkpoint.
    #[serde(default = "default_cache_size")]
    pub cache_size: u64,

    /// Enforce document access control lists.
    #[serde(default)]
    pub acl: bool,

    /// Metadata table schema.
    #[serde(default)]
    pub metadata: MetaDataSchema,

    /// Statistics blob encoding.
    #[serde(default)]
    pub statsproc: StatsProcKind,

    /// Number of commit statistics records kept for delta requests.
    #[serde(default = "default_statistics_history")]
    pub statistics_history: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            path: None,
            cache_size: DEFAULT_CACHE_SIZE,
            acl: false,
            metadata: MetaDataSchema::default(),
            statsproc: StatsProcKind::default(),
            statistics_history: DEFAULT_STATISTICS_HISTORY,
        }
    }
}

impl IndexConfig {
    /// Create a new builder.
    pub fn builder() -> IndexConfigBuilder {
        IndexConfigBuilder::default()
    }

    /// In-memory storage with default settings.
    pub fn memory() -> Self {
        IndexConfig::default()
    }

    /// On-disk storage at `path` with default settings.
    pub fn at<P: AsRef<Path>>(path: P) -> Self {
        IndexConfig {
            path: Some(path.as_ref().to_path_buf()),
            ..Default::default()
        }
    }
}

/// Builder for [`IndexConfig`].
#[derive(Debug, Default)]
pub struct IndexConfigBuilder {
    config: IndexConfig,
}

impl IndexConfigBuilder {
    pub fn path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn cache_size(mut self, bytes: u64) -> Self {
        self.config.cache_size = bytes;
        self
    }

    pub fn acl(mut self, enabled: bool) -> Self {
        self.config.acl = enabled;
        self
    }

    pub fn metadata(mut self, schema: MetaDataSchema) -> Self {
        self.config.metadata = schema;
        self
    }

    pub fn statsproc(mut self, kind: StatsProcKind) -> Self {
        self.config.statsproc = kind;
        self
    }

    pub fn statistics_history(mut self, records: usize) -> Self {
        self.config.statistics_history = records;
        self
    }

    pub fn build(self) -> IndexConfig {
        self.config
    }
}

/// Parse a size with optional K/M/G suffix (binary multiples).
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim();
    let upper = s.to_ascii_uppercase();
    let digits = upper.strip_suffix('B').unwrap_or(&upper);
    let (number, factor) = match digits.chars().last() {
        Some('K') => (&digits[..digits.len() - 1], 1024u64),
        Some('M') => (&digits[..digits.len() - 1], 1024 * 1024),
        Some('G') => (&digits[..digits.len() - 1], 1024 * 1024 * 1024),
        _ => (digits, 1),
    };
    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| QuarryError::config(format!("malformed size '{s}'")))?;
    value
        .checked_mul(factor)
        .ok_or_else(|| QuarryError::config(format!("size '{s}' too large")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        other => Err(QuarryError::config(format!(
            "expected boolean for '{key}', got '{other}'"
        ))),
    }
}

/// Split `key=value;key='quoted;value'` into pairs.
fn split_pairs(s: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut chars = s.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ';') {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ';' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if chars.next() != Some('=') {
            return Err(QuarryError::config(format!(
                "expected '=' after key '{}'",
                key.trim()
            )));
        }
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        let mut value = String::new();
        match chars.peek().copied() {
            Some(quote @ ('\'' | '"')) => {
                chars.next();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == quote {
                        closed = true;
                        break;
                    }
                    value.push(c);
                }
                if !closed {
                    return Err(QuarryError::config(format!(
                        "unterminated quote in value of '{}'",
                        key.trim()
                    )));
                }
            }
            _ => {
                while let Some(&c) = chars.peek() {
                    if c == ';' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
                value = value.trim().to_string();
            }
        }
        pairs.push((key.trim().to_ascii_lowercase(), value));
    }
    Ok(pairs)
}

impl FromStr for IndexConfig {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self> {
        let mut config = IndexConfig::default();
        for (key, value) in split_pairs(s)? {
            match key.as_str() {
                "path" => config.path = Some(PathBuf::from(value)),
                "cache" | "cache_size" => config.cache_size = parse_size(&value)?,
                "acl" => config.acl = parse_bool(&key, &value)?,
                "metadata" => config.metadata = value.parse()?,
                "statsproc" => config.statsproc = value.parse()?,
                "history" | "statistics_history" => {
                    config.statistics_history = value.trim().parse().map_err(|_| {
                        QuarryError::config(format!("expected a record count for '{key}', got '{value}'"))
                    })?;
                }
                other => {
                    return Err(QuarryError::config(format!(
                        "unknown configuration key '{other}'"
                    )));
                }
            }
        }
        Ok(config)
    }
}

impl fmt::Display for IndexConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = &self.path {
            write!(f, "path='{}';", path.display())?;
        }
        write!(f, "cache={};acl={}", self.cache_size, self.acl)?;
        if !self.metadata.is_empty() {
            write!(f, ";metadata='{}'", self.metadata)?;
        }
        write!(f, ";statsproc={};history={}", self.statsproc, self.statistics_history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_string() {
        let config: IndexConfig =
            "path='/data/x';cache=512M;acl=yes;metadata='doclen UINT16, cross INT8';statsproc=compact;history=50"
                .parse()
                .unwrap();
        assert_eq!(config.path, Some(PathBuf::from("/data/x")));
        assert_eq!(config.cache_size, 512 * 1024 * 1024);
        assert!(config.acl);
        assert_eq!(config.metadata.columns().len(), 2);
        assert_eq!(config.statsproc, StatsProcKind::Compact);
        assert_eq!(config.statistics_history, 50);

        let reparsed: IndexConfig = config.to_string().parse().unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_config_errors() {
        assert!("colour=blue".parse::<IndexConfig>().is_err());
        assert!("cache=lots".parse::<IndexConfig>().is_err());
        assert!("acl=maybe".parse::<IndexConfig>().is_err());
        assert!("metadata='x UINT99'".parse::<IndexConfig>().is_err());
        assert!("path='/unterminated".parse::<IndexConfig>().is_err());
        assert!("statsproc=zip".parse::<IndexConfig>().is_err());
        assert!("history=-1".parse::<IndexConfig>().is_err());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("64k").unwrap(), 64 * 1024);
        assert_eq!(parse_size("2GB").unwrap(), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_builder_and_json() {
        let config = IndexConfig::builder()
            .path("/tmp/q")
            .acl(true)
            .metadata("doclen UINT16".parse().unwrap())
            .build();
        let json = serde_json::to_string(&config).unwrap();
        let back: IndexConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
