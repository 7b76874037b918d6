//! Configuration for cacheproxy
//!
//! Centralized configuration with deployment profiles and a builder.
//!
//! A profile file is TOML:
//!
//! ```toml
//! [connection]
//! host = "cache.internal"
//! port = 6379
//! credential = "s3cret"
//!
//! [profiles.production]
//! expiration = 2419200
//! prefix = "prod"
//!
//! [profiles.test]
//! max_chunk = 999
//! ```
//!
//! In a profile table `expiration = 0` and `max_chunk = 0` both mean
//! "unlimited".

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;

use crate::error::{CacheError, Result};
use crate::router::CommandRole;

/// Seconds in a day
const DAY: u64 = 24 * 60 * 60;

/// Default size above which values are compressed (in bytes)
pub const DEFAULT_COMPRESS_THRESHOLD: usize = 800;

/// Default zstd level
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Default store port
pub const DEFAULT_PORT: u16 = 6379;

/// Built-in deployment profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Long expiry, no chunking
    Production,

    /// Short expiry, small chunks so the chunk path gets exercised
    Test,
}

impl Profile {
    /// Look up a built-in profile by name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "production" | "prod" | "redis" => Some(Profile::Production),
            "test" => Some(Profile::Test),
            _ => None,
        }
    }
}

/// Main configuration for a cache proxy
#[derive(Debug, Clone)]
pub struct CacheConfig {
    // -------------------------------------------------------------------------
    // Value Policy
    // -------------------------------------------------------------------------
    /// Default time-to-live in seconds applied to writes (`None` = never expire)
    pub expiration: Option<u64>,

    /// Namespace prepended to every hashed key
    pub prefix: String,

    /// Largest physical record in bytes (`None` = never chunk)
    pub max_chunk: Option<usize>,

    /// Serialized values longer than this are compressed
    pub compress_threshold: usize,

    /// zstd compression level
    pub compression_level: i32,

    // -------------------------------------------------------------------------
    // Command Routing
    // -------------------------------------------------------------------------
    /// Commands whose first argument is a key to be hashed
    pub hash_commands: BTreeSet<String>,

    /// Command name aliases mapped to their role
    pub command_roles: BTreeMap<String, CommandRole>,

    // -------------------------------------------------------------------------
    // Connection
    // -------------------------------------------------------------------------
    pub connection: ConnectionConfig,
}

/// Where the remote store lives
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Password sent with AUTH after connecting
    #[serde(default)]
    pub credential: Option<String>,

    /// Logical database selected after connecting
    #[serde(default)]
    pub database: Option<u32>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            credential: None,
            database: None,
        }
    }
}

impl ConnectionConfig {
    /// `host:port` form used to open the socket
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::for_profile(Profile::Production)
    }
}

impl CacheConfig {
    /// Create a new config builder (starts from the production profile)
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// The preset for a built-in profile
    pub fn for_profile(profile: Profile) -> Self {
        let (expiration, prefix, max_chunk) = match profile {
            Profile::Production => (Some(28 * DAY), "prod", None),
            Profile::Test => (Some(2 * 60 * 60), "test", Some(999)),
        };

        Self {
            expiration,
            prefix: prefix.to_string(),
            max_chunk,
            compress_threshold: DEFAULT_COMPRESS_THRESHOLD,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            hash_commands: default_hash_commands(),
            command_roles: default_command_roles(),
            connection: ConnectionConfig::default(),
        }
    }

    /// Parse a profile file and select one profile from it
    ///
    /// A profile named like a built-in preset starts from that preset,
    /// any other name starts from production.
    pub fn from_toml_str(text: &str, profile: &str) -> Result<Self> {
        let file: ProfileFile = toml::from_str(text)?;

        let base = Profile::from_name(profile).unwrap_or(Profile::Production);
        let mut config = Self::for_profile(base);

        match file.profiles.get(profile) {
            Some(overrides) => overrides.apply(&mut config),
            None if Profile::from_name(profile).is_some() => {}
            None => {
                return Err(CacheError::Configuration(format!(
                    "profile '{}' not found",
                    profile
                )))
            }
        }

        if let Some(connection) = file.connection {
            config.connection = connection;
        }

        config.validate()?;
        Ok(config)
    }

    /// Read a profile file from disk
    pub fn load(path: &Path, profile: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text, profile)
    }

    /// Check the fields a proxy cannot run without
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(CacheError::Configuration("prefix must not be empty".into()));
        }
        if self.connection.host.is_empty() {
            return Err(CacheError::Configuration(
                "connection host must not be empty".into(),
            ));
        }
        if self.connection.port == 0 {
            return Err(CacheError::Configuration("connection port must not be 0".into()));
        }
        if self.max_chunk == Some(0) {
            return Err(CacheError::Configuration(
                "max_chunk must be positive (omit it to disable chunking)".into(),
            ));
        }

        let readers = self
            .command_roles
            .values()
            .filter(|role| **role == CommandRole::Read)
            .count();
        match readers {
            0 => Err(CacheError::Configuration(
                "command_roles needs a read command".into(),
            )),
            1 => Ok(()),
            n => Err(CacheError::Configuration(format!(
                "command_roles has {} read commands, expected one",
                n
            ))),
        }
    }
}

/// The commands that hash their key argument out of the box
pub fn default_hash_commands() -> BTreeSet<String> {
    ["set", "get", "del", "exists", "expire", "ttl", "persist", "expiretime"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// The role map for a Redis-compatible store
pub fn default_command_roles() -> BTreeMap<String, CommandRole> {
    BTreeMap::from([
        ("set".to_string(), CommandRole::Write),
        ("get".to_string(), CommandRole::Read),
        ("del".to_string(), CommandRole::Delete),
    ])
}

// =============================================================================
// Profile File
// =============================================================================

#[derive(Debug, Deserialize)]
struct ProfileFile {
    #[serde(default)]
    connection: Option<ConnectionConfig>,

    #[serde(default)]
    profiles: BTreeMap<String, ProfileOverrides>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileOverrides {
    expiration: Option<u64>,
    prefix: Option<String>,
    max_chunk: Option<usize>,
    compress_threshold: Option<usize>,
    compression_level: Option<i32>,
    hash_commands: Option<Vec<String>>,
    command_roles: Option<BTreeMap<String, CommandRole>>,
}

impl ProfileOverrides {
    fn apply(&self, config: &mut CacheConfig) {
        if let Some(secs) = self.expiration {
            config.expiration = (secs > 0).then_some(secs);
        }
        if let Some(prefix) = &self.prefix {
            config.prefix = prefix.clone();
        }
        if let Some(bytes) = self.max_chunk {
            config.max_chunk = (bytes > 0).then_some(bytes);
        }
        if let Some(threshold) = self.compress_threshold {
            config.compress_threshold = threshold;
        }
        if let Some(level) = self.compression_level {
            config.compression_level = level;
        }
        if let Some(commands) = &self.hash_commands {
            config.hash_commands = commands.iter().map(|c| c.to_ascii_lowercase()).collect();
        }
        if let Some(roles) = &self.command_roles {
            config.command_roles = roles
                .iter()
                .map(|(name, role)| (name.to_ascii_lowercase(), *role))
                .collect();
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for CacheConfig
#[derive(Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    /// Start from a built-in profile instead of production
    pub fn profile(mut self, profile: Profile) -> Self {
        let connection = self.config.connection.clone();
        self.config = CacheConfig::for_profile(profile);
        self.config.connection = connection;
        self
    }

    /// Set the default expiration in seconds (`None` = never expire)
    pub fn expiration(mut self, secs: Option<u64>) -> Self {
        self.config.expiration = secs;
        self
    }

    /// Set the key namespace
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = prefix.into();
        self
    }

    /// Set the largest physical record (`None` = never chunk)
    pub fn max_chunk(mut self, bytes: Option<usize>) -> Self {
        self.config.max_chunk = bytes;
        self
    }

    /// Set the compression threshold (in bytes)
    pub fn compress_threshold(mut self, bytes: usize) -> Self {
        self.config.compress_threshold = bytes;
        self
    }

    /// Set the zstd level
    pub fn compression_level(mut self, level: i32) -> Self {
        self.config.compression_level = level;
        self
    }

    /// Add a command whose key argument is hashed
    pub fn hash_command(mut self, name: impl Into<String>) -> Self {
        self.config
            .hash_commands
            .insert(name.into().to_ascii_lowercase());
        self
    }

    /// Map a command name to a role
    pub fn command_role(mut self, name: impl Into<String>, role: CommandRole) -> Self {
        self.config
            .command_roles
            .insert(name.into().to_ascii_lowercase(), role);
        self
    }

    /// Set the store host and port
    pub fn endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.connection.host = host.into();
        self.config.connection.port = port;
        self
    }

    /// Set the AUTH credential
    pub fn credential(mut self, credential: impl Into<String>) -> Self {
        self.config.connection.credential = Some(credential.into());
        self
    }

    /// Select a logical database after connecting
    pub fn database(mut self, database: u32) -> Self {
        self.config.connection.database = Some(database);
        self
    }

    pub fn build(self) -> CacheConfig {
        self.config
    }
}
