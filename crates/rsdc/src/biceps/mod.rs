// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! BICEPS participant/message model and its XML binding.
//!
//! The in-memory model is a pair of tagged unions: [`Descriptor`] describes
//! what an entity *is* (one node in the containment tree), [`State`] carries
//! its runtime values. Both keep unknown extension elements verbatim so that
//! round-trip serialization is lossless.
//!
//! The closed type sets, attribute names, and wire spellings follow the
//! IEEE 11073-10207 participant model.

pub mod pm;
pub mod qname;
pub mod xml;

mod descriptor;
mod state;

pub use descriptor::{Descriptor, DescriptorBody, DescriptorKind, MetricQualities};
pub use state::{State, StateBody, StateClass};

/// Stable string identifier, unique within one MDIB.
pub type Handle = String;

/// Unknown extension elements preserved verbatim for lossless round-trips.
///
/// Each entry is the exact source text of one element (as sliced from the
/// input document on decode, or as written by the producer). Serializers
/// emit the raw text unchanged inside an `ext:Extension` holder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extensions(pub Vec<String>);

impl Extensions {
    /// True when no extension elements are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
