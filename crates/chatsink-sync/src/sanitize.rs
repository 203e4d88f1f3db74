// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payload sanitization: reduce the raw union to storage-safe JSON.
//!
//! Sanitization never fails. A field that cannot be made storage-safe is
//! dropped (or zeroed, for designated timestamp fields) so one bad field
//! never sinks the record. Fields outside the per-kind allowlist are removed
//! and reported back for diagnostic logging.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map, Number, Value};

use chatsink_core::{EntityKind, RawObject, RawValue};

const CHAT_FIELDS: &[&str] = &[
    "id",
    "pnJid",
    "conversationTimestamp",
    "unreadCount",
    "pinned",
    "archived",
    "name",
    "displayName",
    "readOnly",
    "ephemeralExpiration",
    "ephemeralSettingTimestamp",
    "muteEndTime",
    "markedAsUnread",
    "lastMessageRecvTimestamp",
    "createdAt",
    "createdBy",
    "description",
];

const CONTACT_FIELDS: &[&str] = &[
    "id",
    "pnJid",
    "name",
    "notify",
    "verifiedName",
    "imgUrl",
    "status",
];

const MESSAGE_FIELDS: &[&str] = &[
    "key",
    "message",
    "messageTimestamp",
    "participant",
    "pushName",
    "broadcast",
    "status",
    "messageStubType",
    "messageStubParameters",
    "labels",
    "reactions",
    "userReceipt",
    "mediaCiphertextSha256",
    "messageSecret",
];

const SESSION_FIELDS: &[&str] = &["id", "data"];

const MESSAGE_BINARY_FIELDS: &[&str] = &["mediaCiphertextSha256", "messageSecret"];

const CHAT_TIMESTAMP_FIELDS: &[&str] = &[
    "conversationTimestamp",
    "muteEndTime",
    "lastMessageRecvTimestamp",
    "ephemeralSettingTimestamp",
    "createdAt",
];

const MESSAGE_TIMESTAMP_FIELDS: &[&str] = &["messageTimestamp"];

/// The persisted field names for an entity kind. Anything else is filtered.
pub fn allowlist(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Session => SESSION_FIELDS,
        EntityKind::Chat => CHAT_FIELDS,
        EntityKind::Contact => CONTACT_FIELDS,
        EntityKind::Message => MESSAGE_FIELDS,
    }
}

/// Fields carried as native blobs into dedicated binary columns.
pub fn binary_fields(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Message => MESSAGE_BINARY_FIELDS,
        _ => &[],
    }
}

/// Fields coerced to integer timestamps; invalid values become zero.
pub fn timestamp_fields(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Chat => CHAT_TIMESTAMP_FIELDS,
        EntityKind::Message => MESSAGE_TIMESTAMP_FIELDS,
        _ => &[],
    }
}

/// A sanitized record: storage-safe JSON fields, extracted binary columns,
/// and the allowlist-filtered field names for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct CleanRecord {
    pub fields: Map<String, Value>,
    pub blobs: BTreeMap<String, Vec<u8>>,
    pub dropped: Vec<String>,
}

impl CleanRecord {
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

/// Sanitize one raw record for the given entity kind.
pub fn sanitize(raw: RawObject, kind: EntityKind) -> CleanRecord {
    let allow = allowlist(kind);
    let binary = binary_fields(kind);
    let stamps = timestamp_fields(kind);

    let mut record = CleanRecord::default();
    for (field, value) in raw {
        if !allow.contains(&field.as_str()) {
            record.dropped.push(field);
            continue;
        }
        if binary.contains(&field.as_str()) {
            // Undecodable binary degrades to absent, not an error.
            if let Some(bytes) = value_as_bytes(&value) {
                record.blobs.insert(field, bytes);
            }
            continue;
        }
        if stamps.contains(&field.as_str()) {
            record
                .fields
                .insert(field, Value::from(coerce_timestamp(&value)));
            continue;
        }
        // A key whose value reduces to nothing vanishes entirely.
        if let Some(clean) = clean_value(value) {
            record.fields.insert(field, clean);
        }
    }
    record
}

/// Reduce one raw value to storage-safe JSON, or nothing.
///
/// `Opaque` values and non-finite floats carry no data and return `None`;
/// containers are cleaned recursively with such members removed.
pub fn clean_value(raw: RawValue) -> Option<Value> {
    match raw {
        RawValue::Null => Some(Value::Null),
        RawValue::Bool(b) => Some(Value::Bool(b)),
        RawValue::Int(i) => Some(Value::Number(i.into())),
        RawValue::Uint(u) => Some(Value::Number(u.into())),
        RawValue::Float(f) => Number::from_f64(f).map(Value::Number),
        RawValue::Str(s) => Some(Value::String(s)),
        RawValue::Bytes(b) => Some(Value::String(BASE64.encode(b))),
        RawValue::Long {
            low,
            high,
            unsigned,
        } => Some(Value::Number(
            RawValue::long_to_i64(low, high, unsigned).into(),
        )),
        RawValue::Timestamp(secs) => chrono::DateTime::from_timestamp(secs, 0)
            .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())),
        RawValue::Opaque => None,
        RawValue::Array(items) => Some(Value::Array(
            items.into_iter().filter_map(clean_value).collect(),
        )),
        RawValue::Object(map) => {
            if let Some(bytes) = byte_object(&map) {
                return Some(Value::String(BASE64.encode(bytes)));
            }
            let mut out = Map::new();
            for (k, v) in map {
                if let Some(clean) = clean_value(v) {
                    out.insert(k, clean);
                }
            }
            Some(Value::Object(out))
        }
    }
}

/// Coerce a designated timestamp field to an integer; anything invalid
/// becomes zero rather than failing the record.
pub fn coerce_timestamp(raw: &RawValue) -> i64 {
    match raw {
        RawValue::Int(i) => *i,
        RawValue::Uint(u) => i64::try_from(*u).unwrap_or(0),
        RawValue::Float(f) if f.is_finite() => *f as i64,
        RawValue::Long {
            low,
            high,
            unsigned,
        } => RawValue::long_to_i64(*low, *high, *unsigned),
        RawValue::Timestamp(secs) => *secs,
        RawValue::Str(s) => s.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    }
}

/// Extract bytes for a dedicated binary column.
fn value_as_bytes(raw: &RawValue) -> Option<Vec<u8>> {
    match raw {
        RawValue::Bytes(b) => Some(b.clone()),
        RawValue::Object(map) => byte_object(map),
        RawValue::Str(s) => BASE64.decode(s).ok(),
        _ => None,
    }
}

/// Detect the byte-array-as-object encoding.
///
/// Accepts both the tagged form `{ type: "Buffer", data: ... }` (with the
/// data as an int list or numeric-keyed map) and a bare object whose keys
/// are a dense `"0".."n"` run of byte values.
fn byte_object(map: &RawObject) -> Option<Vec<u8>> {
    if let Some(RawValue::Str(tag)) = map.get("type")
        && tag == "Buffer"
        && let Some(data) = map.get("data")
    {
        return match data {
            RawValue::Array(items) => items.iter().map(raw_byte).collect(),
            RawValue::Object(inner) => numeric_keyed_bytes(inner),
            _ => None,
        };
    }
    numeric_keyed_bytes(map)
}

fn numeric_keyed_bytes(map: &RawObject) -> Option<Vec<u8>> {
    if map.is_empty() {
        return None;
    }
    // n distinct keys all parsing below n means the run is dense from zero.
    let mut bytes = vec![0u8; map.len()];
    for (key, value) in map {
        let index: usize = key.parse().ok()?;
        if index >= map.len() {
            return None;
        }
        bytes[index] = raw_byte(value)?;
    }
    Some(bytes)
}

fn raw_byte(value: &RawValue) -> Option<u8> {
    match value {
        RawValue::Int(i) => u8::try_from(*i).ok(),
        RawValue::Uint(u) => u8::try_from(*u).ok(),
        _ => None,
    }
}
