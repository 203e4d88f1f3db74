// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alias-to-canonical address lookup collaborator.

use async_trait::async_trait;

use crate::error::SyncError;

/// Maps the user part of a hidden-alias address to its canonical address.
///
/// Implemented by the protocol client, which owns the alias directory. The
/// resolver consults this only when the payload itself carries no alternate
/// address. A `None` result means no mapping is known; the resolver then
/// stores the normalized alias form unchanged.
#[async_trait]
pub trait AliasLookup: Send + Sync {
    async fn canonical_for_alias(&self, alias_user: &str) -> Result<Option<String>, SyncError>;
}

/// Lookup that knows no mappings. Useful for tests and for sources that
/// never emit alias-form addresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAliasLookup;

#[async_trait]
impl AliasLookup for NoAliasLookup {
    async fn canonical_for_alias(&self, _alias_user: &str) -> Result<Option<String>, SyncError> {
        Ok(None)
    }
}
