// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Staged mutation of one MDIB version.
//!
//! A [`Transaction`] owns the writer lane for its lifetime (the store hands
//! out at most one at a time) and stages typed changes against the snapshot
//! that was current when it was opened. `commit` validates, assigns
//! versions, publishes the successor snapshot, and hands the delta to the
//! reporting pipeline. Dropping an uncommitted transaction discards every
//! staged change.

use super::snapshot::MdibSnapshot;
use super::store::{MdibStore, WriterState};
use super::MdibVersionGroup;
use crate::biceps::pm::{now_timestamp, ContextAssociation};
use crate::biceps::{Descriptor, Handle, State, StateBody, StateClass};
use parking_lot::MutexGuard;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The transaction kinds; each governs one report class, except
/// `DescriptorModification`, which governs the tree itself (and may touch
/// states of descriptors it creates or removes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxKind {
    DescriptorModification,
    MetricStates,
    AlertStates,
    ComponentStates,
    ContextStates,
    OperationalStates,
    RealTimeSamples,
}

impl TxKind {
    /// The state class this kind governs; `None` for descriptor modification.
    #[must_use]
    pub const fn governs(self) -> Option<StateClass> {
        match self {
            TxKind::DescriptorModification => None,
            TxKind::MetricStates => Some(StateClass::Metric),
            TxKind::AlertStates => Some(StateClass::Alert),
            TxKind::ComponentStates => Some(StateClass::Component),
            TxKind::ContextStates => Some(StateClass::Context),
            TxKind::OperationalStates => Some(StateClass::Operational),
            TxKind::RealTimeSamples => Some(StateClass::Waveform),
        }
    }
}

/// Why a transaction was rejected. Commit is all-or-nothing; a rejected
/// transaction leaves the MDIB untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// A staged change references a descriptor that does not exist.
    UnknownHandle(Handle),
    /// A staged add reuses a handle that is already present.
    HandleCollision(Handle),
    /// A staged state disagrees with its descriptor's type.
    TypeMismatch { handle: Handle, detail: String },
    /// A structural rule would be broken (two roots, cycle, kind misuse,
    /// multi-state under a single-state descriptor, ...).
    InvariantViolation(String),
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::UnknownHandle(h) => write!(f, "unknown handle \"{}\"", h),
            TransactionError::HandleCollision(h) => write!(f, "handle \"{}\" already present", h),
            TransactionError::TypeMismatch { handle, detail } => {
                write!(f, "type mismatch on \"{}\": {}", handle, detail)
            }
            TransactionError::InvariantViolation(detail) => {
                write!(f, "invariant violation: {}", detail)
            }
        }
    }
}

impl std::error::Error for TransactionError {}

/// Before/after pair of one state changed by a commit.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub before: Option<Arc<State>>,
    /// `None` when a context instance was removed with its descriptor.
    pub after: Option<Arc<State>>,
}

/// The tree delta of a description-modification commit. Parent handles
/// inside the descriptors carry the adjacency information a consumer needs
/// to replay the structural update.
#[derive(Debug, Clone, Default)]
pub struct DescriptionDelta {
    pub created: Vec<Arc<Descriptor>>,
    pub updated: Vec<Arc<Descriptor>>,
    pub removed: Vec<Arc<Descriptor>>,
    /// States written by the transaction plus states whose descriptor
    /// version was refreshed by a structural update.
    pub states: Vec<Arc<State>>,
    /// States that disappeared with their descriptors.
    pub removed_states: Vec<Arc<State>>,
}

/// What one commit changed; handed to the reporting pipeline.
#[derive(Debug, Clone)]
pub struct TransactionReport {
    pub kind: TxKind,
    pub version: MdibVersionGroup,
    pub states: Vec<StateChange>,
    pub description: Option<DescriptionDelta>,
}

enum StagedOp {
    /// Insert-or-update of a state (key = `State::key()`).
    WriteState(State),
    /// Removal of a context instance.
    RemoveContextState(Handle),
}

/// A staged, not yet committed batch of MDIB changes.
pub struct Transaction<'a> {
    pub(crate) store: &'a MdibStore,
    pub(crate) guard: MutexGuard<'a, WriterState>,
    pub(crate) base: Arc<MdibSnapshot>,
    kind: TxKind,
    state_ops: Vec<StagedOp>,
    /// Index into `state_ops` by state key; a re-staged key replaces the
    /// earlier op (last write wins within one transaction).
    state_index: HashMap<Handle, usize>,
    added_descriptors: Vec<Descriptor>,
    updated_descriptors: Vec<Descriptor>,
    removed_descriptors: Vec<Handle>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(
        store: &'a MdibStore,
        guard: MutexGuard<'a, WriterState>,
        base: Arc<MdibSnapshot>,
        kind: TxKind,
    ) -> Self {
        Self {
            store,
            guard,
            base,
            kind,
            state_ops: Vec::new(),
            state_index: HashMap::new(),
            added_descriptors: Vec::new(),
            updated_descriptors: Vec::new(),
            removed_descriptors: Vec::new(),
        }
    }

    /// Transaction kind.
    #[must_use]
    pub fn kind(&self) -> TxKind {
        self.kind
    }

    /// The snapshot this transaction was opened against.
    #[must_use]
    pub fn base(&self) -> &Arc<MdibSnapshot> {
        &self.base
    }

    fn effective_descriptor(&self, handle: &str) -> Option<Descriptor> {
        if self.removed_descriptors.iter().any(|h| h == handle) {
            return None;
        }
        if let Some(d) = self.updated_descriptors.iter().rev().find(|d| d.handle == handle) {
            return Some(d.clone());
        }
        if let Some(d) = self.added_descriptors.iter().rev().find(|d| d.handle == handle) {
            return Some(d.clone());
        }
        self.base.descriptor(handle).map(|d| (**d).clone())
    }

    fn stage_state_op(&mut self, key: Handle, op: StagedOp) {
        if let Some(&idx) = self.state_index.get(&key) {
            self.state_ops[idx] = op;
        } else {
            self.state_index.insert(key, self.state_ops.len());
            self.state_ops.push(op);
        }
    }

    /// Stage an insert-or-update of a state.
    ///
    /// Version counters on the staged record are ignored; commit assigns
    /// them. For context states a fresh instance handle creates a new
    /// instance, a known one updates it.
    ///
    /// # Errors
    ///
    /// `UnknownHandle` when no descriptor owns the state, `TypeMismatch`
    /// when the shapes disagree, `InvariantViolation` when the state class
    /// is not governed by this transaction's kind.
    pub fn write_state(&mut self, state: State) -> Result<(), TransactionError> {
        let descriptor = self
            .effective_descriptor(&state.descriptor_handle)
            .ok_or_else(|| TransactionError::UnknownHandle(state.descriptor_handle.clone()))?;

        let kind = descriptor.kind();
        if !state.body.compatible_with(kind) {
            return Err(TransactionError::TypeMismatch {
                handle: state.descriptor_handle.clone(),
                detail: format!("{:?} state on {:?} descriptor", state.body.class(), kind),
            });
        }
        if kind.is_multi_state() {
            if state.handle.is_none() {
                return Err(TransactionError::InvariantViolation(format!(
                    "context state for \"{}\" requires an instance handle",
                    state.descriptor_handle
                )));
            }
        } else if state.handle.is_some() {
            return Err(TransactionError::InvariantViolation(format!(
                "descriptor \"{}\" does not permit multi-state instances",
                state.descriptor_handle
            )));
        }

        match self.kind.governs() {
            Some(class) if class == state.body.class() => {}
            None => {
                // Description modification may only touch states of the
                // descriptors it creates or removes.
                let touched = self
                    .added_descriptors
                    .iter()
                    .any(|d| d.handle == state.descriptor_handle);
                if !touched {
                    return Err(TransactionError::InvariantViolation(format!(
                        "description modification may not write state of untouched \"{}\"",
                        state.descriptor_handle
                    )));
                }
            }
            Some(class) => {
                return Err(TransactionError::InvariantViolation(format!(
                    "{:?} transaction cannot write a {:?} state",
                    self.kind,
                    class
                )));
            }
        }

        self.stage_state_op(state.key().clone(), StagedOp::WriteState(state));
        Ok(())
    }

    /// Stage removal of one context instance.
    pub fn remove_context_state(&mut self, instance_handle: &str) -> Result<(), TransactionError> {
        if self.kind.governs() != Some(StateClass::Context) {
            return Err(TransactionError::InvariantViolation(format!(
                "{:?} transaction cannot remove context states",
                self.kind
            )));
        }
        if self.base.context_state(instance_handle).is_none() {
            return Err(TransactionError::UnknownHandle(instance_handle.to_string()));
        }
        self.stage_state_op(
            instance_handle.to_string(),
            StagedOp::RemoveContextState(instance_handle.to_string()),
        );
        Ok(())
    }

    fn require_description_kind(&self) -> Result<(), TransactionError> {
        if self.kind != TxKind::DescriptorModification {
            return Err(TransactionError::InvariantViolation(format!(
                "{:?} transaction cannot modify the description",
                self.kind
            )));
        }
        Ok(())
    }

    /// Stage insertion of a descriptor (and optionally its initial states
    /// via [`Transaction::write_state`]).
    pub fn add_descriptor(&mut self, descriptor: Descriptor) -> Result<(), TransactionError> {
        self.require_description_kind()?;
        if self.effective_descriptor(&descriptor.handle).is_some() {
            return Err(TransactionError::HandleCollision(descriptor.handle));
        }
        match &descriptor.parent {
            Some(parent) => {
                if self.effective_descriptor(parent).is_none() {
                    return Err(TransactionError::UnknownHandle(parent.clone()));
                }
            }
            None => {
                if !matches!(descriptor.body, crate::biceps::DescriptorBody::Mds) {
                    return Err(TransactionError::InvariantViolation(format!(
                        "non-MDS descriptor \"{}\" requires a parent",
                        descriptor.handle
                    )));
                }
                let root_alive = self
                    .base
                    .root()
                    .map(|r| !self.removed_descriptors.iter().any(|h| h == r))
                    .unwrap_or(false)
                    || self.added_descriptors.iter().any(|d| d.parent.is_none());
                if root_alive {
                    return Err(TransactionError::InvariantViolation(
                        "an MDS root is already present".to_string(),
                    ));
                }
            }
        }
        self.added_descriptors.push(descriptor);
        Ok(())
    }

    /// Stage replacement of a descriptor. A parent change is a structural
    /// update: commit also bumps the descriptor versions of every child.
    pub fn update_descriptor(&mut self, descriptor: Descriptor) -> Result<(), TransactionError> {
        self.require_description_kind()?;
        let old = self
            .base
            .descriptor(&descriptor.handle)
            .ok_or_else(|| TransactionError::UnknownHandle(descriptor.handle.clone()))?;
        if old.kind() != descriptor.kind() {
            return Err(TransactionError::TypeMismatch {
                handle: descriptor.handle.clone(),
                detail: format!("kind change {:?} -> {:?}", old.kind(), descriptor.kind()),
            });
        }
        if let Some(parent) = &descriptor.parent {
            if parent == &descriptor.handle {
                return Err(TransactionError::InvariantViolation(format!(
                    "descriptor \"{}\" cannot be its own parent",
                    descriptor.handle
                )));
            }
            // Re-parenting under the own subtree would create a cycle.
            if self.base.subtree_handles(&descriptor.handle).iter().any(|h| h == parent) {
                return Err(TransactionError::InvariantViolation(format!(
                    "re-parenting \"{}\" under its own subtree",
                    descriptor.handle
                )));
            }
            if self.effective_descriptor(parent).is_none() {
                return Err(TransactionError::UnknownHandle(parent.clone()));
            }
        }
        self.updated_descriptors.retain(|d| d.handle != descriptor.handle);
        self.updated_descriptors.push(descriptor);
        Ok(())
    }

    /// Stage removal of a descriptor, its descendants, and all their states.
    pub fn remove_descriptor(&mut self, handle: &str) -> Result<(), TransactionError> {
        self.require_description_kind()?;
        if self.base.descriptor(handle).is_none() {
            return Err(TransactionError::UnknownHandle(handle.to_string()));
        }
        if !self.removed_descriptors.iter().any(|h| h == handle) {
            self.removed_descriptors.push(handle.to_string());
        }
        Ok(())
    }

    /// Atomically apply every staged change under one new MDIB version.
    ///
    /// On error nothing is published and the MDIB stays at the base version.
    pub fn commit(self) -> Result<MdibVersionGroup, TransactionError> {
        let Transaction {
            store,
            mut guard,
            base,
            kind,
            state_ops,
            state_index: _,
            added_descriptors,
            updated_descriptors,
            removed_descriptors,
        } = self;

        if state_ops.is_empty()
            && added_descriptors.is_empty()
            && updated_descriptors.is_empty()
            && removed_descriptors.is_empty()
        {
            // Nothing staged: no version bump, no report.
            return Ok(base.version.clone());
        }

        let next_version = MdibVersionGroup {
            mdib_version: base.version.mdib_version + 1,
            sequence_id: base.version.sequence_id.clone(),
            instance_id: base.version.instance_id,
        };

        let mut snap = MdibSnapshot {
            version: next_version.clone(),
            root: base.root.clone(),
            descriptors: base.descriptors.clone(),
            children: base.children.clone(),
            states: base.states.clone(),
            context_states: base.context_states.clone(),
            context_index: base.context_index.clone(),
        };

        let mut delta = DescriptionDelta::default();
        let mut changes: Vec<StateChange> = Vec::new();
        // Version memory of entities removed by THIS commit; merged into the
        // writer state only when the commit succeeds.
        let mut removed_descriptor_mem: HashMap<Handle, u64> = HashMap::new();
        let mut removed_state_mem: HashMap<Handle, u64> = HashMap::new();

        // ---- structural removals (transitive) ----
        for handle in &removed_descriptors {
            for h in base.subtree_handles(handle) {
                let Some(d) = snap.descriptors.remove(&h) else { continue };
                removed_descriptor_mem.insert(h.clone(), d.version);
                if let Some(parent) = &d.parent {
                    if let Some(list) = snap.children.get_mut(parent) {
                        list.retain(|c| c != &h);
                    }
                }
                snap.children.remove(&h);
                if snap.root.as_deref() == Some(h.as_str()) {
                    snap.root = None;
                }
                if let Some(s) = snap.states.remove(&h) {
                    removed_state_mem.insert(h.clone(), s.state_version);
                    delta.removed_states.push(Arc::clone(&s));
                    changes.push(StateChange { before: Some(s), after: None });
                }
                if let Some(instances) = snap.context_index.remove(&h) {
                    for i in instances {
                        if let Some(s) = snap.context_states.remove(&i) {
                            removed_state_mem.insert(i.clone(), s.state_version);
                            delta.removed_states.push(Arc::clone(&s));
                            changes.push(StateChange { before: Some(s), after: None });
                        }
                    }
                }
                delta.removed.push(d);
            }
        }

        // ---- structural additions ----
        for mut d in added_descriptors {
            if snap.descriptors.contains_key(&d.handle) {
                return Err(TransactionError::HandleCollision(d.handle));
            }
            if let Some(remembered) = removed_descriptor_mem
                .get(&d.handle)
                .or_else(|| guard.removed_descriptor_versions.get(&d.handle))
            {
                d.version = remembered + 1;
            }
            let handle = d.handle.clone();
            match &d.parent {
                Some(parent) => {
                    if !snap.descriptors.contains_key(parent) {
                        return Err(TransactionError::UnknownHandle(parent.clone()));
                    }
                    snap.children.entry(parent.clone()).or_default().push(handle.clone());
                }
                None => {
                    if snap.root.is_some() {
                        return Err(TransactionError::InvariantViolation(
                            "an MDS root is already present".to_string(),
                        ));
                    }
                    snap.root = Some(handle.clone());
                }
            }
            let arc = Arc::new(d);
            snap.descriptors.insert(handle, Arc::clone(&arc));
            delta.created.push(arc);
        }

        // ---- structural updates ----
        for mut d in updated_descriptors {
            let old = snap
                .descriptors
                .get(&d.handle)
                .cloned()
                .ok_or_else(|| TransactionError::UnknownHandle(d.handle.clone()))?;
            d.version = old.version + 1;
            let structural = old.parent != d.parent;
            if structural {
                if let Some(old_parent) = &old.parent {
                    if let Some(list) = snap.children.get_mut(old_parent) {
                        list.retain(|c| c != &d.handle);
                    }
                }
                if let Some(new_parent) = &d.parent {
                    snap.children
                        .entry(new_parent.clone())
                        .or_default()
                        .push(d.handle.clone());
                }
            }
            let handle = d.handle.clone();
            let arc = Arc::new(d);
            snap.descriptors.insert(handle.clone(), Arc::clone(&arc));
            delta.updated.push(Arc::clone(&arc));
            refresh_state_descriptor_version(&mut snap, &handle, arc.version, &mut delta);

            if structural {
                // A structural change bumps every child's descriptor version;
                // their state versions are preserved.
                for child_handle in snap.children.get(&handle).cloned().unwrap_or_default() {
                    if let Some(child) = snap.descriptors.get(&child_handle).cloned() {
                        let mut bumped = (*child).clone();
                        bumped.version += 1;
                        let bumped = Arc::new(bumped);
                        snap.descriptors.insert(child_handle.clone(), Arc::clone(&bumped));
                        delta.updated.push(Arc::clone(&bumped));
                        refresh_state_descriptor_version(
                            &mut snap,
                            &child_handle,
                            bumped.version,
                            &mut delta,
                        );
                    }
                }
            }
        }

        // ---- state writes and context removals ----
        for op in state_ops {
            match op {
                StagedOp::WriteState(mut s) => {
                    let descriptor = snap
                        .descriptors
                        .get(&s.descriptor_handle)
                        .cloned()
                        .ok_or_else(|| TransactionError::UnknownHandle(s.descriptor_handle.clone()))?;
                    let key = s.key().clone();
                    let is_context = matches!(s.body, StateBody::Context { .. });
                    let old = if is_context {
                        snap.context_states.get(&key).cloned()
                    } else {
                        snap.states.get(&key).cloned()
                    };
                    s.state_version = match &old {
                        Some(o) => o.state_version + 1,
                        None => removed_state_mem
                            .get(&key)
                            .or_else(|| guard.removed_state_versions.get(&key))
                            .map(|v| v + 1)
                            .unwrap_or(0),
                    };
                    s.descriptor_version = descriptor.version;
                    if is_context {
                        apply_context_binding(
                            &mut s,
                            old.as_deref(),
                            next_version.mdib_version,
                        );
                    }
                    let arc = Arc::new(s);
                    if is_context {
                        if old.is_none() {
                            snap.context_index
                                .entry(arc.descriptor_handle.clone())
                                .or_default()
                                .push(key.clone());
                        }
                        snap.context_states.insert(key, Arc::clone(&arc));
                    } else {
                        snap.states.insert(key, Arc::clone(&arc));
                    }
                    if kind == TxKind::DescriptorModification {
                        delta.states.push(Arc::clone(&arc));
                    }
                    changes.push(StateChange { before: old, after: Some(arc) });
                }
                StagedOp::RemoveContextState(key) => {
                    let Some(old) = snap.context_states.remove(&key) else {
                        return Err(TransactionError::UnknownHandle(key));
                    };
                    if let Some(list) = snap.context_index.get_mut(&old.descriptor_handle) {
                        list.retain(|h| h != &key);
                    }
                    removed_state_mem.insert(key, old.state_version);
                    changes.push(StateChange { before: Some(old), after: None });
                }
            }
        }

        let report = TransactionReport {
            kind,
            version: next_version.clone(),
            states: changes,
            description: (kind == TxKind::DescriptorModification).then_some(delta),
        };

        guard.removed_descriptor_versions.extend(removed_descriptor_mem);
        guard.removed_state_versions.extend(removed_state_mem);
        store.publish(Arc::new(snap), report);
        drop(guard);
        Ok(next_version)
    }
}

/// Refresh `descriptor_version` on the states of a bumped descriptor,
/// preserving their state versions.
fn refresh_state_descriptor_version(
    snap: &mut MdibSnapshot,
    handle: &str,
    descriptor_version: u64,
    delta: &mut DescriptionDelta,
) {
    if let Some(s) = snap.states.get(handle).cloned() {
        let mut refreshed = (*s).clone();
        refreshed.descriptor_version = descriptor_version;
        let arc = Arc::new(refreshed);
        snap.states.insert(handle.to_string(), Arc::clone(&arc));
        delta.states.push(arc);
    }
    if let Some(instances) = snap.context_index.get(handle).cloned() {
        for i in instances {
            if let Some(s) = snap.context_states.get(&i).cloned() {
                let mut refreshed = (*s).clone();
                refreshed.descriptor_version = descriptor_version;
                let arc = Arc::new(refreshed);
                snap.context_states.insert(i, Arc::clone(&arc));
                delta.states.push(arc);
            }
        }
    }
}

/// Assign binding/unbinding versions on context association edges.
///
/// One association change per instance per transaction; the staging area
/// already collapses repeated writes to the same instance.
fn apply_context_binding(s: &mut State, old: Option<&State>, committing_version: u64) {
    let StateBody::Context {
        association,
        binding_mdib_version,
        unbinding_mdib_version,
        binding_start,
        binding_end,
        ..
    } = &mut s.body
    else {
        return;
    };
    let was_associated = matches!(
        old.map(|o| &o.body),
        Some(StateBody::Context { association: ContextAssociation::Associated, .. })
    );
    match association {
        ContextAssociation::Associated if !was_associated => {
            *binding_mdib_version = Some(committing_version);
            if binding_start.is_none() {
                *binding_start = Some(now_timestamp());
            }
        }
        ContextAssociation::Disassociated | ContextAssociation::NotAssociated
            if was_associated =>
        {
            if unbinding_mdib_version.is_none() {
                *unbinding_mdib_version = Some(committing_version);
            }
            if binding_end.is_none() {
                *binding_end = Some(now_timestamp());
            }
        }
        _ => {}
    }
}
