// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity resolution between the two addressing schemes.
//!
//! A logical contact may be addressed canonically (`user@s.whatsapp.net`)
//! or through the hidden alias scheme (`user@lid`). Storage identity is
//! always the canonical form; the resolver rewrites aliases using, in
//! order: an alternate-address field embedded in the payload, the injected
//! alias directory, or (when neither knows) the normalized alias unchanged.

use std::sync::Arc;

use serde_json::{Map, Value};

use chatsink_core::{AliasLookup, SyncError};

/// Server part of canonical user addresses.
pub const CANONICAL_SERVER: &str = "s.whatsapp.net";

/// Server part of the hidden alias scheme.
pub const ALIAS_SERVER: &str = "lid";

/// Legacy server spelling normalized to [`CANONICAL_SERVER`].
pub const LEGACY_SERVER: &str = "c.us";

/// Alternate-address field some payloads embed alongside an alias id.
pub const ALTERNATE_ADDRESS_FIELD: &str = "pnJid";

/// Normalize an address: strip the device suffix from the user part and
/// rewrite the legacy server spelling. Idempotent.
pub fn normalize_address(address: &str) -> String {
    let (user, server) = match address.split_once('@') {
        Some((user, server)) => (user, server),
        None => (address, CANONICAL_SERVER),
    };
    let user = user.split_once(':').map_or(user, |(user, _device)| user);
    let server = if server == LEGACY_SERVER {
        CANONICAL_SERVER
    } else {
        server
    };
    format!("{user}@{server}")
}

/// Whether an address is in the hidden alias scheme.
pub fn is_alias(address: &str) -> bool {
    address
        .rsplit_once('@')
        .is_some_and(|(_, server)| server == ALIAS_SERVER)
}

/// Rewrites alias-form addresses to the canonical storage identity.
///
/// Owns no persisted state; resolution is a pure function over the payload
/// hint and the injected [`AliasLookup`].
#[derive(Clone)]
pub struct IdentityResolver {
    lookup: Arc<dyn AliasLookup>,
}

impl IdentityResolver {
    pub fn new(lookup: Arc<dyn AliasLookup>) -> Self {
        Self { lookup }
    }

    /// Resolve an address to canonical form.
    ///
    /// Never returns an empty address: empty input is
    /// [`SyncError::Unresolvable`], a caller-level fatal condition.
    pub async fn resolve(
        &self,
        address: &str,
        hint: Option<&Map<String, Value>>,
    ) -> Result<String, SyncError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(SyncError::Unresolvable(address.to_string()));
        }

        let normalized = normalize_address(address);
        if !is_alias(&normalized) {
            return Ok(normalized);
        }

        if let Some(hint) = hint
            && let Some(alternate) = hint.get(ALTERNATE_ADDRESS_FIELD).and_then(Value::as_str)
            && !alternate.is_empty()
        {
            return Ok(normalize_address(alternate));
        }

        let alias_user = normalized.split('@').next().unwrap_or_default();
        if let Some(mapped) = self.lookup.canonical_for_alias(alias_user).await?
            && !mapped.is_empty()
        {
            return Ok(normalize_address(&mapped));
        }

        // No mapping known anywhere: store the normalized alias as-is.
        Ok(normalized)
    }
}
