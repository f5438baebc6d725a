// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! SCO runtime: the operation invocation queue.
//!
//! Parameter-bearing operations return a transaction id immediately and
//! complete on one worker thread; every transition is published as an
//! OperationInvokedReport. State mutation happens exclusively through the
//! store's transaction discipline - a handler that wants to change the MDIB
//! opens a transaction like any other writer.

use crate::biceps::pm::{
    InvocationError, InvocationState, MetricCategory, MetricValue, OperatingMode,
};
use crate::biceps::{DescriptorBody, Handle, State, StateBody};
use crate::mdib::{MdibStore, TxKind};
use crate::reporting::{OperationInvokedInfo, SubscriptionManager};
use crate::soap::SoapFault;
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Payload of one invocation request.
#[derive(Debug, Clone)]
pub enum OperationPayload {
    SetValue(f64),
    SetString(String),
    Activate(Vec<String>),
    SetContextState(Vec<State>),
    SetMetricState(Vec<State>),
    SetComponentState(Vec<State>),
    SetAlertState(Vec<State>),
}

/// One invocation request as received by the Set service.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub operation: Handle,
    pub payload: OperationPayload,
}

/// Handler outcome: the terminal invocation state (`Finished` or
/// `FinishedWithModification`), or the failure pair.
pub type OperationOutcome = Result<InvocationState, (InvocationError, String)>;

/// An operation handler. Runs on the SCO worker thread.
pub type OperationHandler =
    Arc<dyn Fn(&OperationRequest, &MdibStore) -> OperationOutcome + Send + Sync>;

struct Job {
    transaction_id: u64,
    request: OperationRequest,
}

/// The operation invocation runtime.
pub struct ScoRuntime {
    store: Arc<MdibStore>,
    subs: Arc<SubscriptionManager>,
    handlers: RwLock<HashMap<Handle, OperationHandler>>,
    queue_tx: Sender<Job>,
    cancelled: Arc<Mutex<HashSet<u64>>>,
    transaction_counter: AtomicU64,
    shutdown: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ScoRuntime {
    /// Start the worker and register the generic handlers for every
    /// operation descriptor present in the MDIB.
    #[must_use]
    pub fn start(store: Arc<MdibStore>, subs: Arc<SubscriptionManager>) -> Arc<Self> {
        let (queue_tx, queue_rx) = unbounded();
        let sco = Arc::new(Self {
            store,
            subs,
            handlers: RwLock::new(HashMap::new()),
            queue_tx,
            cancelled: Arc::new(Mutex::new(HashSet::new())),
            transaction_counter: AtomicU64::new(1),
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        });
        sco.register_defaults();
        let worker = {
            let sco = Arc::clone(&sco);
            thread::spawn(move || worker_loop(&sco, queue_rx))
        };
        *sco.worker.lock() = Some(worker);
        sco
    }

    /// Register (or replace) the handler of one operation.
    pub fn register(&self, operation: &str, handler: OperationHandler) {
        self.handlers.write().insert(operation.to_string(), handler);
    }

    /// Generic handlers for the operations the MDIB declares; hosts
    /// override per handle where device logic is needed.
    fn register_defaults(&self) {
        let snap = self.store.read_snapshot();
        for d in snap.descriptors_in_tree_order() {
            if d.operation_target().is_none() {
                continue;
            }
            match &d.body {
                DescriptorBody::SetValueOperation { .. } => {
                    self.register(&d.handle, Arc::new(set_value_handler));
                }
                DescriptorBody::SetStringOperation { .. } => {
                    self.register(&d.handle, Arc::new(set_string_handler));
                }
                _ => {
                    // Remaining operation kinds need device logic; without a
                    // host-registered handler they fail as unsupported.
                }
            }
        }
    }

    /// Accept an invocation: emit `Wait`, queue the job, return the
    /// transaction id.
    ///
    /// # Errors
    ///
    /// `InvalidHandle` fault when the MDIB declares no such operation.
    pub fn invoke(&self, request: OperationRequest) -> Result<u64, SoapFault> {
        let snap = self.store.read_snapshot();
        let descriptor = snap
            .descriptor(&request.operation)
            .ok_or_else(|| SoapFault::invalid_handle(&request.operation))?;
        if descriptor.operation_target().is_none() {
            return Err(SoapFault::invalid_handle(&request.operation));
        }
        let transaction_id = self.transaction_counter.fetch_add(1, Ordering::Relaxed);
        self.emit(transaction_id, &request.operation, InvocationState::Wait, None, None);
        if self.queue_tx.send(Job { transaction_id, request }).is_err() {
            return Err(SoapFault::receiver("operation queue unavailable"));
        }
        Ok(transaction_id)
    }

    /// Request cancellation of a queued invocation. A job already running
    /// completes normally; a still-queued one transitions to `Cancelled`
    /// without any state mutation.
    pub fn cancel(&self, transaction_id: u64) {
        self.cancelled.lock().insert(transaction_id);
    }

    /// Stop the worker.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn emit(
        &self,
        transaction_id: u64,
        operation: &str,
        state: InvocationState,
        error: Option<InvocationError>,
        error_message: Option<String>,
    ) {
        self.subs.emit_operation_invoked(
            self.store.version_group(),
            OperationInvokedInfo {
                transaction_id,
                operation_handle: operation.to_string(),
                invocation_state: state,
                error,
                error_message,
            },
        );
    }
}

fn worker_loop(sco: &Arc<ScoRuntime>, rx: Receiver<Job>) {
    loop {
        if sco.shutdown.load(Ordering::Relaxed) {
            break;
        }
        let job = match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(j) => j,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        let op = job.request.operation.clone();

        if sco.cancelled.lock().remove(&job.transaction_id) {
            sco.emit(job.transaction_id, &op, InvocationState::Cancelled, None, None);
            continue;
        }

        sco.emit(job.transaction_id, &op, InvocationState::Start, None, None);

        let handler = sco.handlers.read().get(&op).cloned();
        let outcome = match handler {
            Some(h) => h(&job.request, &sco.store),
            None => Err((
                InvocationError::Unspecified,
                format!("no handler registered for \"{}\"", op),
            )),
        };

        match outcome {
            Ok(final_state) => {
                log::debug!("[sco] tx {} on {} -> {:?}", job.transaction_id, op, final_state);
                sco.emit(job.transaction_id, &op, final_state, None, None);
            }
            Err((error, message)) => {
                log::debug!("[sco] tx {} on {} failed: {}", job.transaction_id, op, message);
                sco.emit(
                    job.transaction_id,
                    &op,
                    InvocationState::Failed,
                    Some(error),
                    Some(message),
                );
            }
        }
    }
}

fn operation_enabled(store: &MdibStore, operation: &str) -> bool {
    store
        .read_snapshot()
        .state(operation)
        .map(|s| match &s.body {
            StateBody::Operation { operating_mode } => *operating_mode == OperatingMode::Enabled,
            _ => false,
        })
        // No operation state in the MDIB means no restriction declared.
        .unwrap_or(true)
}

/// Generic SetValue: the target must be a numeric metric declared as a
/// settable category; anything else is an invalid-value failure.
fn set_value_handler(request: &OperationRequest, store: &MdibStore) -> OperationOutcome {
    let OperationPayload::SetValue(value) = &request.payload else {
        return Err((InvocationError::Other, "payload is not a numeric value".to_string()));
    };
    if !operation_enabled(store, &request.operation) {
        return Err((InvocationError::InvalidValue, "operation is disabled".to_string()));
    }
    let snap = store.read_snapshot();
    let target = snap
        .descriptor(&request.operation)
        .and_then(|op| op.operation_target().cloned())
        .and_then(|t| snap.descriptor(&t).cloned())
        .ok_or_else(|| (InvocationError::Unknown, "operation target missing".to_string()))?;

    let DescriptorBody::NumericMetric { qualities, technical_range, .. } = &target.body else {
        return Err((
            InvocationError::InvalidValue,
            format!("target \"{}\" is not a numeric metric", target.handle),
        ));
    };
    if !matches!(qualities.category, MetricCategory::Setting | MetricCategory::Presetting) {
        return Err((
            InvocationError::InvalidValue,
            format!("metric \"{}\" is not settable", target.handle),
        ));
    }
    if !technical_range.iter().all(|r| r.contains(*value)) {
        return Err((
            InvocationError::InvalidValue,
            format!("{} outside the technical range of \"{}\"", value, target.handle),
        ));
    }

    let current = snap
        .state(&target.handle)
        .ok_or_else(|| (InvocationError::Unknown, "target state missing".to_string()))?;
    let mut next = (**current).clone();
    match &mut next.body {
        StateBody::NumericMetric { value: v, .. } => {
            *v = Some(MetricValue::measured(*value));
        }
        _ => return Err((InvocationError::Unknown, "target state shape mismatch".to_string())),
    }

    let mut tx = store.begin_transaction(TxKind::MetricStates);
    tx.write_state(next).map_err(|e| (InvocationError::Other, e.to_string()))?;
    tx.commit().map_err(|e| (InvocationError::Other, e.to_string()))?;
    Ok(InvocationState::FinishedWithModification)
}

/// Generic SetString for string and enum-string metrics; enum targets
/// validate against the allowed value list.
fn set_string_handler(request: &OperationRequest, store: &MdibStore) -> OperationOutcome {
    let OperationPayload::SetString(value) = &request.payload else {
        return Err((InvocationError::Other, "payload is not a string".to_string()));
    };
    if !operation_enabled(store, &request.operation) {
        return Err((InvocationError::InvalidValue, "operation is disabled".to_string()));
    }
    let snap = store.read_snapshot();
    let target = snap
        .descriptor(&request.operation)
        .and_then(|op| op.operation_target().cloned())
        .and_then(|t| snap.descriptor(&t).cloned())
        .ok_or_else(|| (InvocationError::Unknown, "operation target missing".to_string()))?;

    let settable = match &target.body {
        DescriptorBody::StringMetric { qualities } => {
            matches!(qualities.category, MetricCategory::Setting | MetricCategory::Presetting)
        }
        DescriptorBody::EnumStringMetric { qualities, allowed_values } => {
            if !allowed_values.iter().any(|v| v == value) {
                return Err((
                    InvocationError::InvalidValue,
                    format!("\"{}\" is not an allowed value of \"{}\"", value, target.handle),
                ));
            }
            matches!(qualities.category, MetricCategory::Setting | MetricCategory::Presetting)
        }
        _ => false,
    };
    if !settable {
        return Err((
            InvocationError::InvalidValue,
            format!("metric \"{}\" is not settable", target.handle),
        ));
    }

    let current = snap
        .state(&target.handle)
        .ok_or_else(|| (InvocationError::Unknown, "target state missing".to_string()))?;
    let mut next = (**current).clone();
    match &mut next.body {
        StateBody::StringMetric { value: v, .. } | StateBody::EnumStringMetric { value: v, .. } => {
            *v = Some(crate::biceps::pm::StringMetricValue {
                value: Some(value.clone()),
                determination_time: Some(crate::biceps::pm::now_timestamp()),
                validity: crate::biceps::pm::Validity::Valid,
                generation_mode: crate::biceps::pm::GenerationMode::Real,
            });
        }
        _ => return Err((InvocationError::Unknown, "target state shape mismatch".to_string())),
    }

    let mut tx = store.begin_transaction(TxKind::MetricStates);
    tx.write_state(next).map_err(|e| (InvocationError::Other, e.to_string()))?;
    tx.commit().map_err(|e| (InvocationError::Other, e.to_string()))?;
    Ok(InvocationState::FinishedWithModification)
}
