// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Chatsink sync engine.
//!
//! Provides the error taxonomy, persisted entity models, the raw payload
//! union delivered by the protocol bridge, domain events, and the trait
//! seams for injected collaborators. No I/O happens in this crate.

pub mod error;
pub mod events;
pub mod raw;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::SyncError;
pub use events::{MessageUpsertKind, SessionEvent};
pub use raw::{RawObject, RawValue};
pub use traits::AliasLookup;
pub use types::{Chat, Contact, EntityKind, MessageRecord, SessionRecord};
