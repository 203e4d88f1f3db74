// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Chatsink sync engine.
//!
//! Layered TOML loading via Figment with `CHATSINK_*` env overrides, plus
//! post-deserialization validation of the batch tier table.

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    BatchTier, BatchingConfig, RetryConfig, StorageConfig, SyncConfig, TransactionConfig,
};
pub use validation::validate_config;
