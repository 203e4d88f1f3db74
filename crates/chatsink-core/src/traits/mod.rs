// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams for injected collaborators.

pub mod alias;

pub use alias::AliasLookup;
