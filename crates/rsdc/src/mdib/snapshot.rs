// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Immutable, handle-addressable view of one MDIB version.

use super::MdibVersionGroup;
use crate::biceps::{Descriptor, Handle, State};
use std::collections::HashMap;
use std::sync::Arc;

/// One published MDIB version.
///
/// Entity records are individually `Arc`ed; a commit clones only the handle
/// maps, so outstanding snapshots share storage with their successors.
#[derive(Debug, Clone)]
pub struct MdibSnapshot {
    pub(crate) version: MdibVersionGroup,
    /// Handle of the root MDS, once present.
    pub(crate) root: Option<Handle>,
    pub(crate) descriptors: HashMap<Handle, Arc<Descriptor>>,
    /// Ordered containment lists, keyed by parent handle.
    pub(crate) children: HashMap<Handle, Vec<Handle>>,
    /// Single-state entities, keyed by descriptor handle.
    pub(crate) states: HashMap<Handle, Arc<State>>,
    /// Context (multi-state) instances, keyed by instance handle.
    pub(crate) context_states: HashMap<Handle, Arc<State>>,
    /// Instance handles per context descriptor, in creation order.
    pub(crate) context_index: HashMap<Handle, Vec<Handle>>,
}

impl MdibSnapshot {
    pub(crate) fn empty(version: MdibVersionGroup) -> Self {
        Self {
            version,
            root: None,
            descriptors: HashMap::new(),
            children: HashMap::new(),
            states: HashMap::new(),
            context_states: HashMap::new(),
            context_index: HashMap::new(),
        }
    }

    /// Version triple this view is pinned to.
    #[must_use]
    pub fn version_group(&self) -> &MdibVersionGroup {
        &self.version
    }

    /// MDIB version of this view.
    #[must_use]
    pub fn mdib_version(&self) -> u64 {
        self.version.mdib_version
    }

    /// Sequence id of this MDIB life.
    #[must_use]
    pub fn sequence_id(&self) -> &str {
        &self.version.sequence_id
    }

    /// Root MDS handle, if the tree is populated.
    #[must_use]
    pub fn root(&self) -> Option<&Handle> {
        self.root.as_ref()
    }

    /// Descriptor by handle.
    #[must_use]
    pub fn descriptor(&self, handle: &str) -> Option<&Arc<Descriptor>> {
        self.descriptors.get(handle)
    }

    /// Single-state entity by descriptor handle.
    #[must_use]
    pub fn state(&self, descriptor_handle: &str) -> Option<&Arc<State>> {
        self.states.get(descriptor_handle)
    }

    /// Context state by instance handle.
    #[must_use]
    pub fn context_state(&self, instance_handle: &str) -> Option<&Arc<State>> {
        self.context_states.get(instance_handle)
    }

    /// All context states of one context descriptor, in creation order.
    #[must_use]
    pub fn context_states_of(&self, descriptor_handle: &str) -> Vec<Arc<State>> {
        self.context_index
            .get(descriptor_handle)
            .map(|handles| {
                handles
                    .iter()
                    .filter_map(|h| self.context_states.get(h).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ordered child handles of a descriptor.
    #[must_use]
    pub fn children_of(&self, handle: &str) -> &[Handle] {
        self.children.get(handle).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Handles of `handle` and all its descendants, depth-first, parents
    /// before children.
    #[must_use]
    pub fn subtree_handles(&self, handle: &str) -> Vec<Handle> {
        let mut out = Vec::new();
        let mut stack = vec![handle.to_string()];
        while let Some(h) = stack.pop() {
            for child in self.children_of(&h).iter().rev() {
                stack.push(child.clone());
            }
            out.push(h);
        }
        out
    }

    /// All descriptors in containment order (root first); detached
    /// descriptors, which only occur transiently, are appended at the end.
    #[must_use]
    pub fn descriptors_in_tree_order(&self) -> Vec<Arc<Descriptor>> {
        let mut out = Vec::with_capacity(self.descriptors.len());
        if let Some(root) = &self.root {
            for h in self.subtree_handles(root) {
                if let Some(d) = self.descriptors.get(&h) {
                    out.push(Arc::clone(d));
                }
            }
        }
        if out.len() < self.descriptors.len() {
            let mut rest: Vec<_> = self
                .descriptors
                .values()
                .filter(|d| !out.iter().any(|o| o.handle == d.handle))
                .cloned()
                .collect();
            rest.sort_by(|a, b| a.handle.cmp(&b.handle));
            out.extend(rest);
        }
        out
    }

    /// All single states, in the containment order of their descriptors.
    #[must_use]
    pub fn states_in_tree_order(&self) -> Vec<Arc<State>> {
        self.descriptors_in_tree_order()
            .iter()
            .filter_map(|d| self.states.get(&d.handle).cloned())
            .collect()
    }

    /// All context states, grouped by descriptor in containment order.
    #[must_use]
    pub fn context_states_in_tree_order(&self) -> Vec<Arc<State>> {
        self.descriptors_in_tree_order()
            .iter()
            .flat_map(|d| self.context_states_of(&d.handle))
            .collect()
    }

    /// Number of descriptors in this view.
    #[must_use]
    pub fn descriptor_count(&self) -> usize {
        self.descriptors.len()
    }

    /// Operation descriptors targeting `handle`.
    #[must_use]
    pub fn operations_for_target(&self, handle: &str) -> Vec<Arc<Descriptor>> {
        self.descriptors
            .values()
            .filter(|d| d.operation_target().map(String::as_str) == Some(handle))
            .cloned()
            .collect()
    }
}
