//! Config Tests
//!
//! Tests for built-in profiles, profile files and validation.

use std::io::Write;

use tempfile::NamedTempFile;

use cacheproxy::config::CacheConfig;
use cacheproxy::{CacheError, CommandRole, Profile};

const PROFILE_FILE: &str = r#"
[connection]
host = "cache.internal"
port = 6380
credential = "hunter2"
database = 3

[profiles.staging]
expiration = 3600
prefix = "staging"
max_chunk = 4096

[profiles.test]
compress_threshold = 100

[profiles.forever]
expiration = 0
max_chunk = 0

[profiles.aliases]
command_roles = { put = "write", fetch = "read", remove = "delete" }
hash_commands = ["PUT", "fetch", "remove", "ttl"]
"#;

// =============================================================================
// Built-in Profile Tests
// =============================================================================

#[test]
fn test_production_profile() {
    let config = CacheConfig::for_profile(Profile::Production);
    assert_eq!(config.expiration, Some(28 * 24 * 60 * 60));
    assert_eq!(config.prefix, "prod");
    assert_eq!(config.max_chunk, None);
    assert_eq!(config.connection.port, 6379);
    config.validate().unwrap();
}

#[test]
fn test_test_profile() {
    let config = CacheConfig::for_profile(Profile::Test);
    assert_eq!(config.expiration, Some(7200));
    assert_eq!(config.prefix, "test");
    assert_eq!(config.max_chunk, Some(999));
}

#[test]
fn test_profile_names() {
    assert_eq!(Profile::from_name("prod"), Some(Profile::Production));
    assert_eq!(Profile::from_name("Redis"), Some(Profile::Production));
    assert_eq!(Profile::from_name("TEST"), Some(Profile::Test));
    assert_eq!(Profile::from_name("staging"), None);
}

// =============================================================================
// Profile File Tests
// =============================================================================

#[test]
fn test_load_named_profile_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(PROFILE_FILE.as_bytes()).unwrap();

    let config = CacheConfig::load(file.path(), "staging").unwrap();
    assert_eq!(config.expiration, Some(3600));
    assert_eq!(config.prefix, "staging");
    assert_eq!(config.max_chunk, Some(4096));
    assert_eq!(config.connection.address(), "cache.internal:6380");
    assert_eq!(config.connection.credential.as_deref(), Some("hunter2"));
    assert_eq!(config.connection.database, Some(3));
}

#[test]
fn test_builtin_profile_overrides_apply_on_preset() {
    let config = CacheConfig::from_toml_str(PROFILE_FILE, "test").unwrap();
    assert_eq!(config.prefix, "test");
    assert_eq!(config.max_chunk, Some(999));
    assert_eq!(config.compress_threshold, 100);
}

#[test]
fn test_zero_means_unlimited() {
    let config = CacheConfig::from_toml_str(PROFILE_FILE, "forever").unwrap();
    assert_eq!(config.expiration, None);
    assert_eq!(config.max_chunk, None);
}

#[test]
fn test_command_aliases_from_file() {
    let config = CacheConfig::from_toml_str(PROFILE_FILE, "aliases").unwrap();
    assert_eq!(config.command_roles.get("put"), Some(&CommandRole::Write));
    assert_eq!(config.command_roles.get("fetch"), Some(&CommandRole::Read));
    assert!(config.hash_commands.contains("put"));
}

#[test]
fn test_unknown_profile_is_error() {
    let err = CacheConfig::from_toml_str(PROFILE_FILE, "nope").unwrap_err();
    assert!(matches!(err, CacheError::Configuration(_)));
}

#[test]
fn test_unknown_field_is_parse_error() {
    let text = "[profiles.bad]\nexpiry = 5\n";
    let err = CacheConfig::from_toml_str(text, "bad").unwrap_err();
    assert!(matches!(err, CacheError::TomlParse(_)));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = CacheConfig::load(&dir.path().join("absent.toml"), "prod").unwrap_err();
    assert!(matches!(err, CacheError::Io(_)));
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_two_read_commands_rejected() {
    let config = CacheConfig::builder()
        .command_role("fetch", CommandRole::Read)
        .build();
    assert!(matches!(
        config.validate(),
        Err(CacheError::Configuration(_))
    ));
}

#[test]
fn test_empty_prefix_rejected() {
    let config = CacheConfig::builder().prefix("").build();
    assert!(config.validate().is_err());
}

#[test]
fn test_builder_keeps_connection_across_profile() {
    let config = CacheConfig::builder()
        .endpoint("10.0.0.5", 7000)
        .credential("pw")
        .profile(Profile::Test)
        .expiration(Some(60))
        .build();
    assert_eq!(config.connection.address(), "10.0.0.5:7000");
    assert_eq!(config.connection.credential.as_deref(), Some("pw"));
    assert_eq!(config.prefix, "test");
    assert_eq!(config.expiration, Some(60));
}
