// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./chatsink.toml` > `~/.config/chatsink/chatsink.toml`
//! > `/etc/chatsink/chatsink.toml` with environment variable overrides via
//! the `CHATSINK_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::SyncConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/chatsink/chatsink.toml` (system-wide)
/// 3. `~/.config/chatsink/chatsink.toml` (user XDG config)
/// 4. `./chatsink.toml` (local directory)
/// 5. `CHATSINK_*` environment variables
pub fn load_config() -> Result<SyncConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SyncConfig::default()))
        .merge(Toml::file("/etc/chatsink/chatsink.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("chatsink/chatsink.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("chatsink.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<SyncConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SyncConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<SyncConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SyncConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `CHATSINK_STORAGE_DATABASE_PATH` must
/// map to `storage.database_path`, not `storage.database.path`.
fn env_provider() -> Env {
    Env::prefixed("CHATSINK_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("storage_", "storage.", 1)
            .replacen("transaction_", "transaction.", 1)
            .replacen("retry_", "retry.", 1)
            .replacen("batching_", "batching.", 1);
        mapped.into()
    })
}
