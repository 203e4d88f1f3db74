// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pure merge functions for the message collection fields.
//!
//! Reactions and receipts are replace-by-author collections. The store reads
//! the current collection, applies one of these functions, and writes the
//! result back inside a single transaction; keeping the merge pure makes the
//! lost-update-sensitive part independently testable.

use serde_json::Value;

/// The author identity of a structural message key.
///
/// Own messages collapse to `"me"`; otherwise the participant (group
/// messages) or the conversation address identifies the author.
pub fn key_author(key: &Value) -> String {
    if key.get("fromMe").and_then(Value::as_bool) == Some(true) {
        return "me".to_string();
    }
    key.get("participant")
        .or_else(|| key.get("remoteJid"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Merge one reaction into an existing reaction list.
///
/// Any prior reaction from the same author is removed; the incoming reaction
/// is appended only when its text is non-empty, so an empty-text reaction
/// retracts the author's reaction entirely.
pub fn merge_reaction(existing: Vec<Value>, incoming: &Value) -> Vec<Value> {
    let author = key_author(incoming.get("key").unwrap_or(&Value::Null));
    let mut merged: Vec<Value> = existing
        .into_iter()
        .filter(|r| key_author(r.get("key").unwrap_or(&Value::Null)) != author)
        .collect();

    let has_text = incoming
        .get("text")
        .and_then(Value::as_str)
        .is_some_and(|t| !t.is_empty());
    if has_text {
        merged.push(incoming.clone());
    }
    merged
}

/// Merge one delivery/read receipt into an existing receipt list.
///
/// Receipts are keyed by `userJid`: an existing entry for the same user is
/// replaced in place, otherwise the receipt is appended.
pub fn merge_receipt(existing: Vec<Value>, incoming: &Value) -> Vec<Value> {
    let user = incoming
        .get("userJid")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mut merged = existing;
    if let Some(slot) = merged
        .iter_mut()
        .find(|r| r.get("userJid").and_then(Value::as_str) == Some(user))
    {
        *slot = incoming.clone();
    } else {
        merged.push(incoming.clone());
    }
    merged
}
