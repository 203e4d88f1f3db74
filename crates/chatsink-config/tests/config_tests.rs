// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Chatsink configuration system.

use chatsink_config::load_config_from_str;
use chatsink_config::validate_config;

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_sync_config() {
    let toml = r#"
[storage]
database_path = "/tmp/test.db"
wal_mode = false

[transaction]
timeout_ms = 2500

[retry]
max_attempts = 5
base_delay_ms = 100

[batching]
progress_every = 5

[[batching.tiers]]
min_total = 1000
batch_size = 100
max_concurrent = 2
timeout_ms = 30000

[[batching.tiers]]
min_total = 0
batch_size = 250
max_concurrent = 4
timeout_ms = 15000
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.storage.database_path, "/tmp/test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.transaction.timeout_ms, 2500);
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.base_delay_ms, 100);
    assert_eq!(config.batching.progress_every, 5);
    assert_eq!(config.batching.tiers.len(), 2);
    assert_eq!(config.batching.tiers[0].batch_size, 100);
    assert!(validate_config(&config).is_ok());
}

/// Unknown field in [retry] section is rejected at deserialization.
#[test]
fn unknown_field_produces_error() {
    let toml = r#"
[retry]
max_attemps = 3
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("max_attemps"),
        "error should mention unknown field or the bad key, got: {err_str}"
    );
}

/// Missing optional sections use defaults without error.
#[test]
fn missing_optional_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert!(config.storage.wal_mode);
    assert_eq!(config.transaction.timeout_ms, 5_000);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.base_delay_ms, 200);
    assert_eq!(config.batching.tiers.len(), 4);
    assert_eq!(config.batching.tiers[0].min_total, 10_000);
    assert_eq!(config.batching.tiers[3].min_total, 0);
    assert!(validate_config(&config).is_ok());
}

/// Environment variable overrides a TOML-provided value.
#[test]
fn env_var_overrides_toml_value() {
    use chatsink_config::SyncConfig;
    use figment::providers::{Format, Serialized, Toml};
    use figment::{Figment, Jail};

    Jail::expect_with(|jail| {
        jail.set_env("CHATSINK_RETRY_MAX_ATTEMPTS", "7");

        let config: SyncConfig = Figment::new()
            .merge(Serialized::defaults(SyncConfig::default()))
            .merge(Toml::string("[retry]\nmax_attempts = 2\n"))
            .merge(
                figment::providers::Env::prefixed("CHATSINK_")
                    .map(|key| key.as_str().replacen("retry_", "retry.", 1).into()),
            )
            .extract()?;

        assert_eq!(config.retry.max_attempts, 7);
        Ok(())
    });
}

/// A partial tier table fully replaces the default tiers.
#[test]
fn custom_tier_table_replaces_defaults() {
    let toml = r#"
[[batching.tiers]]
min_total = 0
batch_size = 50
max_concurrent = 1
timeout_ms = 10000
"#;

    let config = load_config_from_str(toml).expect("tier override should parse");
    assert_eq!(config.batching.tiers.len(), 1);
    assert_eq!(config.batching.tier_for(1_000_000).batch_size, 50);
    assert!(validate_config(&config).is_ok());
}
