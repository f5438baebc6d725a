// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! The MDIB store: a versioned descriptor/state tree with one writer lane
//! and lock-free snapshot readers.
//!
//! ## Surface
//!
//! - [`MdibStore::read_snapshot`] - O(1), returns an immutable
//!   handle-addressable view pinned to one MDIB version.
//! - [`MdibStore::begin_transaction`] - opens the single writer lane; the
//!   returned [`Transaction`] stages typed changes and commits them under
//!   exactly one MDIB version increment, or not at all.
//!
//! ## Versioning
//!
//! Every commit increments the MDIB version by one; every entity changed in
//! the commit has its own version incremented by one; untouched entities
//! keep theirs. Old snapshots stay valid until their last `Arc` drops -
//! commit never blocks readers.

mod document;
mod snapshot;
mod store;
mod transaction;

pub use document::{
    decode_mdib, encode_context_states_response, encode_get_mdib_response,
    encode_md_description_response, encode_md_state_response, encode_mdib, MdibDocument,
};
pub use snapshot::MdibSnapshot;
pub use store::{ApplyError, MdibError, MdibStore, RemoteDelta};
pub use transaction::{
    DescriptionDelta, StateChange, Transaction, TransactionError, TransactionReport, TxKind,
};

use std::fmt;

/// The version triple stamped on every snapshot and every report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdibVersionGroup {
    /// Monotonic counter, +1 per committed transaction.
    pub mdib_version: u64,
    /// Opaque identifier of this continuous life of the MDIB; changes only
    /// on a full reset (provider restart).
    pub sequence_id: String,
    /// Discriminates restarts that reuse a sequence id source.
    pub instance_id: u64,
}

/// A consumer-side continuity failure: the next report did not carry
/// `expected` as its MDIB version. Triggers a mirror rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionGap {
    pub expected: u64,
    pub got: u64,
}

impl fmt::Display for VersionGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MDIB version gap: expected {}, got {}", self.expected, self.got)
    }
}

impl std::error::Error for VersionGap {}
