// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Alert role: periodic alert-system self-check and presence aggregation.
//!
//! The worker thread stamps `LastSelfCheck`/`SelfCheckCount` on every
//! alert-system state at the configured interval. Presence aggregation
//! keeps the owning alert system's present-condition lists consistent in
//! the same transaction that flips a condition.

use crate::biceps::pm::now_timestamp;
use crate::biceps::{DescriptorKind, StateBody};
use crate::config::RuntimeConfig;
use crate::mdib::{MdibStore, TransactionError, TxKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub(crate) struct AlarmRole {
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl AlarmRole {
    pub(crate) fn start(store: Arc<MdibStore>, config: Arc<RuntimeConfig>) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker = {
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || self_check_loop(&store, &config, &shutdown))
        };
        Self { shutdown, worker: Some(worker) }
    }

    pub(crate) fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AlarmRole {
    fn drop(&mut self) {
        self.stop();
    }
}

fn self_check_loop(store: &MdibStore, config: &RuntimeConfig, shutdown: &AtomicBool) {
    let mut next_due = Instant::now() + config.get().self_check_interval;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        if Instant::now() < next_due {
            thread::sleep(Duration::from_millis(50));
            continue;
        }
        next_due = Instant::now() + config.get().self_check_interval;
        if let Err(e) = run_self_check(store) {
            log::debug!("[alarm] self check skipped: {}", e);
        }
    }
}

fn run_self_check(store: &MdibStore) -> Result<(), TransactionError> {
    let snap = store.read_snapshot();
    let systems: Vec<_> = snap
        .descriptors_in_tree_order()
        .into_iter()
        .filter(|d| d.kind() == DescriptorKind::AlertSystem)
        .collect();
    if systems.is_empty() {
        return Ok(());
    }
    let mut tx = store.begin_transaction(TxKind::AlertStates);
    let mut staged = 0;
    for system in systems {
        let Some(state) = snap.state(&system.handle) else { continue };
        let mut next = (**state).clone();
        if let StateBody::AlertSystem { last_self_check, self_check_count, .. } = &mut next.body {
            *last_self_check = Some(now_timestamp());
            *self_check_count += 1;
        } else {
            continue;
        }
        tx.write_state(next)?;
        staged += 1;
    }
    if staged > 0 {
        let version = tx.commit()?;
        log::debug!(
            "[alarm] self check committed for {} system(s) at mdib_version {}",
            staged,
            version.mdib_version
        );
    }
    Ok(())
}

/// Flip one alert condition's presence and re-aggregate the owning alert
/// system's present-condition lists in the same transaction.
pub fn set_alert_condition_presence(
    store: &MdibStore,
    condition_handle: &str,
    presence: bool,
) -> Result<(), TransactionError> {
    let snap = store.read_snapshot();
    let condition = snap
        .descriptor(condition_handle)
        .ok_or_else(|| TransactionError::UnknownHandle(condition_handle.to_string()))?;
    let is_condition = matches!(
        condition.kind(),
        DescriptorKind::AlertCondition | DescriptorKind::LimitAlertCondition
    );
    if !is_condition {
        return Err(TransactionError::TypeMismatch {
            handle: condition_handle.to_string(),
            detail: "not an alert condition".to_string(),
        });
    }
    let system_handle = condition
        .parent
        .clone()
        .ok_or_else(|| TransactionError::InvariantViolation("condition without parent".into()))?;

    let mut tx = store.begin_transaction(TxKind::AlertStates);

    let state = snap
        .state(condition_handle)
        .ok_or_else(|| TransactionError::UnknownHandle(condition_handle.to_string()))?;
    let mut next = (**state).clone();
    let kind = match &mut next.body {
        StateBody::AlertCondition { presence: p, determination_time, .. } => {
            *p = presence;
            *determination_time = Some(now_timestamp());
            condition.kind()
        }
        _ => {
            return Err(TransactionError::TypeMismatch {
                handle: condition_handle.to_string(),
                detail: "state is not an alert condition state".to_string(),
            })
        }
    };
    tx.write_state(next)?;

    // Aggregate presence over all conditions of the owning system, with the
    // staged change applied on top of the snapshot.
    if let Some(system_state) = snap.state(&system_handle) {
        let mut aggregated_phys = Vec::new();
        let mut aggregated_tech = Vec::new();
        for child in snap.children_of(&system_handle) {
            let Some(d) = snap.descriptor(child) else { continue };
            let child_kind = d.kind();
            if !matches!(
                child_kind,
                DescriptorKind::AlertCondition | DescriptorKind::LimitAlertCondition
            ) {
                continue;
            }
            let present = if child == condition_handle {
                presence
            } else {
                matches!(
                    snap.state(child).map(|s| &s.body),
                    Some(StateBody::AlertCondition { presence: true, .. })
                )
            };
            if present {
                let physiological = matches!(
                    snap.descriptor(child).map(|d| &d.body),
                    Some(
                        crate::biceps::DescriptorBody::AlertCondition {
                            kind: crate::biceps::pm::AlertConditionKind::Physiological,
                            ..
                        } | crate::biceps::DescriptorBody::LimitAlertCondition {
                            kind: crate::biceps::pm::AlertConditionKind::Physiological,
                            ..
                        }
                    )
                );
                if physiological {
                    aggregated_phys.push(child.clone());
                } else {
                    aggregated_tech.push(child.clone());
                }
            }
        }
        let mut next_system = (**system_state).clone();
        if let StateBody::AlertSystem {
            present_physiological_conditions,
            present_technical_conditions,
            ..
        } = &mut next_system.body
        {
            *present_physiological_conditions = aggregated_phys;
            *present_technical_conditions = aggregated_tech;
            tx.write_state(next_system)?;
        }
    }

    let version = tx.commit()?;
    log::debug!(
        "[alarm] condition {} presence={} ({:?}) committed at mdib_version {}",
        condition_handle,
        presence,
        kind,
        version.mdib_version
    );
    Ok(())
}
