// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! The store: snapshot publication and the writer lane.

use super::document::{decode_mdib, encode_get_mdib_response, MdibDocument};
use super::snapshot::MdibSnapshot;
use super::transaction::{Transaction, TransactionError, TransactionReport, TxKind};
use super::{MdibVersionGroup, VersionGap};
use crate::biceps::xml::DecodeError;
use crate::biceps::{Descriptor, Handle, State, StateBody};
use arc_swap::ArcSwap;
use crossbeam::channel::Sender;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Versions of removed entities, so a reappearing handle resumes counting
/// instead of restarting at zero.
#[derive(Debug, Default)]
pub(crate) struct WriterState {
    pub(crate) removed_descriptor_versions: HashMap<Handle, u64>,
    pub(crate) removed_state_versions: HashMap<Handle, u64>,
}

/// Store construction / document errors.
#[derive(Debug)]
pub enum MdibError {
    Decode(DecodeError),
    Transaction(TransactionError),
}

impl fmt::Display for MdibError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MdibError::Decode(e) => write!(f, "MDIB document: {}", e),
            MdibError::Transaction(e) => write!(f, "MDIB seed: {}", e),
        }
    }
}

impl std::error::Error for MdibError {}

impl From<DecodeError> for MdibError {
    fn from(e: DecodeError) -> Self {
        MdibError::Decode(e)
    }
}

impl From<TransactionError> for MdibError {
    fn from(e: TransactionError) -> Self {
        MdibError::Transaction(e)
    }
}

/// Why a remote report could not be applied to a mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// The report does not continue the mirrored version sequence.
    Gap(VersionGap),
    /// The provider started a new MDIB life; the mirror is void.
    SequenceChanged { ours: String, theirs: String },
    /// The report contradicts the mirrored tree.
    Inconsistent(String),
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyError::Gap(g) => g.fmt(f),
            ApplyError::SequenceChanged { ours, theirs } => {
                write!(f, "sequence id changed: mirror has {}, report has {}", ours, theirs)
            }
            ApplyError::Inconsistent(detail) => write!(f, "inconsistent report: {}", detail),
        }
    }
}

impl std::error::Error for ApplyError {}

/// The wire-side delta of one remote commit, as carried by a report.
#[derive(Debug, Clone)]
pub enum RemoteDelta {
    /// State upserts (episodic/periodic/waveform reports).
    States(Vec<State>),
    /// Structural delta (description modification report).
    Description {
        created: Vec<Descriptor>,
        updated: Vec<Descriptor>,
        removed: Vec<Handle>,
        states: Vec<State>,
    },
}

/// The MDIB store.
///
/// Readers call [`MdibStore::read_snapshot`] (lock-free, O(1)); the single
/// writer lane is entered through [`MdibStore::begin_transaction`]. Commits
/// publish a successor snapshot through one atomic pointer swap and hand a
/// [`TransactionReport`] to the configured sink.
pub struct MdibStore {
    current: ArcSwap<MdibSnapshot>,
    writer: Mutex<WriterState>,
    report_sink: RwLock<Option<Sender<TransactionReport>>>,
}

impl MdibStore {
    /// Empty store at MDIB version 0 with a fresh sequence id.
    #[must_use]
    pub fn new() -> Self {
        let version = MdibVersionGroup {
            mdib_version: 0,
            sequence_id: format!("urn:uuid:{}", uuid::Uuid::new_v4()),
            instance_id: crate::biceps::pm::now_timestamp() / 1000,
        };
        Self {
            current: ArcSwap::from_pointee(MdibSnapshot::empty(version)),
            writer: Mutex::new(WriterState::default()),
            report_sink: RwLock::new(None),
        }
    }

    /// Build a store from a canonical MDIB document (seed). Loading the
    /// seed is itself the first transaction: the store ends up at MDIB
    /// version 1.
    pub fn from_document(xml: &str) -> Result<Self, MdibError> {
        let store = Self::new();
        let doc = decode_mdib(xml)?;
        store.seed(doc)?;
        Ok(store)
    }

    fn seed(&self, doc: MdibDocument) -> Result<(), MdibError> {
        let mut tx = self.begin_transaction(TxKind::DescriptorModification);
        for d in doc.descriptors {
            tx.add_descriptor(d)?;
        }
        for s in doc.states {
            tx.write_state(s)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Immutable view of the current MDIB version. O(1), never blocks.
    #[must_use]
    pub fn read_snapshot(&self) -> Arc<MdibSnapshot> {
        self.current.load_full()
    }

    /// Current version triple.
    #[must_use]
    pub fn version_group(&self) -> MdibVersionGroup {
        self.read_snapshot().version_group().clone()
    }

    /// Sequence id of this MDIB life.
    #[must_use]
    pub fn sequence_id(&self) -> String {
        self.read_snapshot().sequence_id().to_string()
    }

    /// Enter the writer lane. Blocks while another transaction is open;
    /// at most one transaction is in flight per store.
    pub fn begin_transaction(&self, kind: TxKind) -> Transaction<'_> {
        let guard = self.writer.lock();
        // The snapshot is read under the writer lock, so the base is always
        // the latest committed version.
        let base = self.read_snapshot();
        Transaction::new(self, guard, base, kind)
    }

    /// Register the reporting pipeline. Commits after this call hand their
    /// delta to `sink`; a dropped receiver is logged and ignored.
    pub fn set_report_sink(&self, sink: Sender<TransactionReport>) {
        *self.report_sink.write() = Some(sink);
    }

    pub(crate) fn publish(&self, snapshot: Arc<MdibSnapshot>, report: TransactionReport) {
        let version = snapshot.mdib_version();
        self.current.store(snapshot);
        log::debug!(
            "[store] committed mdib_version={} kind={:?} changes={}",
            version,
            report.kind,
            report.states.len()
        );
        if let Some(sink) = &*self.report_sink.read() {
            if sink.send(report).is_err() {
                log::debug!("[store] report sink disconnected, delta dropped");
            }
        }
    }

    /// Serialize the current snapshot as a GetMdibResponse body.
    #[must_use]
    pub fn export_document(&self) -> String {
        encode_get_mdib_response(&self.read_snapshot())
    }

    /// Replace the entire content from a canonical MDIB document, adopting
    /// its version triple verbatim. Used by consumer mirrors on (re)build;
    /// emits no report.
    pub fn reload_from_document(&self, xml: &str) -> Result<MdibVersionGroup, MdibError> {
        let doc = decode_mdib(xml)?;
        let mut guard = self.writer.lock();
        guard.removed_descriptor_versions.clear();
        guard.removed_state_versions.clear();
        let snap = build_snapshot(doc.version.clone(), &doc.descriptors, &doc.states)
            .map_err(MdibError::Transaction)?;
        self.current.store(Arc::new(snap));
        log::debug!(
            "[store] reloaded mirror at mdib_version={} sequence={}",
            doc.version.mdib_version,
            doc.version.sequence_id
        );
        Ok(doc.version)
    }

    /// Apply one remote report to a mirror, enforcing sequence continuity.
    ///
    /// The report's versions are adopted verbatim; this is the consumer-side
    /// counterpart of [`Transaction::commit`].
    pub fn apply_remote(
        &self,
        version: &MdibVersionGroup,
        delta: RemoteDelta,
    ) -> Result<(), ApplyError> {
        let guard = self.writer.lock();
        let base = self.read_snapshot();
        if base.sequence_id() != version.sequence_id {
            return Err(ApplyError::SequenceChanged {
                ours: base.sequence_id().to_string(),
                theirs: version.sequence_id.clone(),
            });
        }
        let expected = base.mdib_version() + 1;
        if version.mdib_version != expected {
            return Err(ApplyError::Gap(VersionGap { expected, got: version.mdib_version }));
        }

        let mut snap = (*base).clone();
        snap.version = version.clone();
        match delta {
            RemoteDelta::States(states) => {
                for s in states {
                    upsert_remote_state(&mut snap, s)?;
                }
            }
            RemoteDelta::Description { created, updated, removed, states } => {
                for handle in removed {
                    for h in base.subtree_handles(&handle) {
                        if let Some(d) = snap.descriptors.remove(&h) {
                            if let Some(parent) = &d.parent {
                                if let Some(list) = snap.children.get_mut(parent) {
                                    list.retain(|c| c != &h);
                                }
                            }
                            snap.children.remove(&h);
                            if snap.root.as_deref() == Some(h.as_str()) {
                                snap.root = None;
                            }
                            snap.states.remove(&h);
                            if let Some(instances) = snap.context_index.remove(&h) {
                                for i in instances {
                                    snap.context_states.remove(&i);
                                }
                            }
                        }
                    }
                }
                for d in created {
                    let handle = d.handle.clone();
                    if snap.descriptors.contains_key(&handle) {
                        return Err(ApplyError::Inconsistent(format!(
                            "created descriptor \"{}\" already mirrored",
                            handle
                        )));
                    }
                    match &d.parent {
                        Some(parent) => snap
                            .children
                            .entry(parent.clone())
                            .or_default()
                            .push(handle.clone()),
                        None => snap.root = Some(handle.clone()),
                    }
                    snap.descriptors.insert(handle, Arc::new(d));
                }
                for d in updated {
                    let handle = d.handle.clone();
                    let old = snap.descriptors.get(&handle).cloned().ok_or_else(|| {
                        ApplyError::Inconsistent(format!(
                            "updated descriptor \"{}\" not mirrored",
                            handle
                        ))
                    })?;
                    if old.parent != d.parent {
                        if let Some(op) = &old.parent {
                            if let Some(list) = snap.children.get_mut(op) {
                                list.retain(|c| c != &handle);
                            }
                        }
                        if let Some(np) = &d.parent {
                            snap.children.entry(np.clone()).or_default().push(handle.clone());
                        }
                    }
                    snap.descriptors.insert(handle, Arc::new(d));
                }
                for s in states {
                    upsert_remote_state(&mut snap, s)?;
                }
            }
        }
        self.current.store(Arc::new(snap));
        drop(guard);
        Ok(())
    }
}

impl Default for MdibStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MdibStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snap = self.read_snapshot();
        f.debug_struct("MdibStore")
            .field("mdib_version", &snap.mdib_version())
            .field("sequence_id", &snap.sequence_id())
            .field("descriptors", &snap.descriptor_count())
            .finish()
    }
}

fn upsert_remote_state(snap: &mut MdibSnapshot, s: State) -> Result<(), ApplyError> {
    if !snap.descriptors.contains_key(&s.descriptor_handle) {
        return Err(ApplyError::Inconsistent(format!(
            "state for unknown descriptor \"{}\"",
            s.descriptor_handle
        )));
    }
    let key = s.key().clone();
    if matches!(s.body, StateBody::Context { .. }) {
        if !snap.context_states.contains_key(&key) {
            snap.context_index
                .entry(s.descriptor_handle.clone())
                .or_default()
                .push(key.clone());
        }
        snap.context_states.insert(key, Arc::new(s));
    } else {
        snap.states.insert(key, Arc::new(s));
    }
    Ok(())
}

/// Build a snapshot wholesale from decoded document content.
fn build_snapshot(
    version: MdibVersionGroup,
    descriptors: &[Descriptor],
    states: &[State],
) -> Result<MdibSnapshot, TransactionError> {
    let mut snap = MdibSnapshot::empty(version);
    for d in descriptors {
        if snap.descriptors.contains_key(&d.handle) {
            return Err(TransactionError::HandleCollision(d.handle.clone()));
        }
        match &d.parent {
            Some(parent) => snap
                .children
                .entry(parent.clone())
                .or_default()
                .push(d.handle.clone()),
            None => {
                if snap.root.is_some() {
                    return Err(TransactionError::InvariantViolation(
                        "document contains two root descriptors".to_string(),
                    ));
                }
                snap.root = Some(d.handle.clone());
            }
        }
        snap.descriptors.insert(d.handle.clone(), Arc::new(d.clone()));
    }
    for s in states {
        if !snap.descriptors.contains_key(&s.descriptor_handle) {
            return Err(TransactionError::UnknownHandle(s.descriptor_handle.clone()));
        }
        let key = s.key().clone();
        if matches!(s.body, StateBody::Context { .. }) {
            snap.context_index
                .entry(s.descriptor_handle.clone())
                .or_default()
                .push(key.clone());
            snap.context_states.insert(key, Arc::new(s.clone()));
        } else {
            snap.states.insert(key, Arc::new(s.clone()));
        }
    }
    Ok(snap)
}
