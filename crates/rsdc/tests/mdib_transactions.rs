// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! MDIB store semantics: atomicity, version coupling, snapshot isolation,
//! rejection rules, structural modifications.

mod common;

use common::{numeric_metric_state, seed_store, set_metric_value};
use rsdc::biceps::pm::{ComponentActivation, ContextAssociation, OperatingMode};
use rsdc::biceps::{Descriptor, DescriptorBody, State, StateBody};
use rsdc::{TransactionError, TxKind};
use std::thread;

#[test]
fn commit_bumps_mdib_version_by_exactly_one() {
    let store = seed_store();
    assert_eq!(store.read_snapshot().mdib_version(), 1);
    let v2 = set_metric_value(&store, "nm0", 37.0);
    assert_eq!(v2, 2);
    let v3 = set_metric_value(&store, "nm0", 37.5);
    assert_eq!(v3, 3);
}

#[test]
fn changed_entity_versions_increment_unchanged_are_preserved() {
    let store = seed_store();
    let before = store.read_snapshot();
    set_metric_value(&store, "nm0", 37.0);
    let after = store.read_snapshot();

    let nm0_before = before.state("nm0").expect("nm0 state");
    let nm0_after = after.state("nm0").expect("nm0 state");
    assert_eq!(nm0_after.state_version, nm0_before.state_version + 1);
    assert_eq!(nm0_after.numeric_value(), Some(37.0));

    // Untouched entity keeps its version.
    let nset_before = before.state("nset0").expect("nset0 state");
    let nset_after = after.state("nset0").expect("nset0 state");
    assert_eq!(nset_after.state_version, nset_before.state_version);

    // Descriptors untouched by a state transaction keep theirs.
    assert_eq!(
        after.descriptor("nm0").expect("descriptor").version,
        before.descriptor("nm0").expect("descriptor").version
    );
}

#[test]
fn outstanding_snapshots_are_isolated_from_later_commits() {
    let store = seed_store();
    let pinned = store.read_snapshot();
    set_metric_value(&store, "nm0", 39.9);
    assert_eq!(pinned.state("nm0").expect("state").numeric_value(), Some(36.6));
    assert_eq!(pinned.mdib_version(), 1);
    assert_eq!(store.read_snapshot().state("nm0").expect("state").numeric_value(), Some(39.9));
}

#[test]
fn dropped_transaction_changes_nothing() {
    let store = seed_store();
    {
        let mut tx = store.begin_transaction(TxKind::MetricStates);
        tx.write_state(numeric_metric_state("nm0", 40.0)).expect("stages");
        // No commit.
    }
    let snap = store.read_snapshot();
    assert_eq!(snap.mdib_version(), 1);
    assert_eq!(snap.state("nm0").expect("state").numeric_value(), Some(36.6));
}

#[test]
fn empty_commit_does_not_bump_the_version() {
    let store = seed_store();
    let tx = store.begin_transaction(TxKind::MetricStates);
    let version = tx.commit().expect("empty commit is a no-op");
    assert_eq!(version.mdib_version, 1);
}

#[test]
fn unknown_handle_is_rejected() {
    let store = seed_store();
    let mut tx = store.begin_transaction(TxKind::MetricStates);
    let err = tx.write_state(numeric_metric_state("ghost", 1.0)).expect_err("rejected");
    assert_eq!(err, TransactionError::UnknownHandle("ghost".to_string()));
}

#[test]
fn type_mismatch_is_rejected() {
    let store = seed_store();
    let mut tx = store.begin_transaction(TxKind::OperationalStates);
    // An operation state aimed at a metric descriptor.
    let state = State::new("nm0", StateBody::Operation { operating_mode: OperatingMode::Enabled });
    match tx.write_state(state) {
        Err(TransactionError::TypeMismatch { handle, .. }) => assert_eq!(handle, "nm0"),
        other => panic!("expected TypeMismatch, got {:?}", other),
    }
}

#[test]
fn kind_discipline_is_enforced() {
    let store = seed_store();
    // Metric transaction cannot carry an alert state.
    let mut tx = store.begin_transaction(TxKind::MetricStates);
    let alert = {
        let snap = store.read_snapshot();
        (**snap.state("ac0").expect("ac0 state")).clone()
    };
    match tx.write_state(alert) {
        Err(TransactionError::InvariantViolation(_)) => {}
        other => panic!("expected InvariantViolation, got {:?}", other),
    }
}

#[test]
fn multi_state_requires_a_context_descriptor() {
    let store = seed_store();
    let mut tx = store.begin_transaction(TxKind::MetricStates);
    // Instance handle on a single-state descriptor.
    let mut bogus = numeric_metric_state("nm0", 1.0);
    bogus.handle = Some("nm0.extra".to_string());
    match tx.write_state(bogus) {
        Err(TransactionError::InvariantViolation(_)) => {}
        other => panic!("expected InvariantViolation, got {:?}", other),
    }
}

#[test]
fn second_mds_root_is_rejected() {
    let store = seed_store();
    let mut tx = store.begin_transaction(TxKind::DescriptorModification);
    let err = tx
        .add_descriptor(Descriptor::new("mds1", None, DescriptorBody::Mds))
        .expect_err("two roots rejected");
    assert!(matches!(err, TransactionError::InvariantViolation(_)));
}

#[test]
fn handle_collision_is_rejected() {
    let store = seed_store();
    let mut tx = store.begin_transaction(TxKind::DescriptorModification);
    let err = tx
        .add_descriptor(Descriptor::new("nm0", Some("ch0"), DescriptorBody::Channel))
        .expect_err("collision rejected");
    assert_eq!(err, TransactionError::HandleCollision("nm0".to_string()));
}

#[test]
fn descriptor_removal_is_transitive_and_drops_states() {
    let store = seed_store();
    let mut tx = store.begin_transaction(TxKind::DescriptorModification);
    tx.remove_descriptor("vmd0").expect("stages");
    let version = tx.commit().expect("commits");
    assert_eq!(version.mdib_version, 2);

    let snap = store.read_snapshot();
    for handle in ["vmd0", "ch0", "nm0", "nset0", "rtsa0"] {
        assert!(snap.descriptor(handle).is_none(), "{} should be gone", handle);
        assert!(snap.state(handle).is_none(), "{} state should be gone", handle);
    }
    // Siblings survive.
    assert!(snap.descriptor("as0").is_some());
    assert!(!snap.children_of("mds0").iter().any(|h| h == "vmd0"));
}

#[test]
fn reappearing_handle_resumes_its_version_counter() {
    let store = seed_store();
    let old_version = store.read_snapshot().descriptor("nm0").expect("descriptor").version;

    let mut tx = store.begin_transaction(TxKind::DescriptorModification);
    tx.remove_descriptor("nm0").expect("stages removal");
    tx.commit().expect("removal commits");

    let mut tx = store.begin_transaction(TxKind::DescriptorModification);
    tx.add_descriptor(Descriptor::new(
        "nm0",
        Some("ch0"),
        DescriptorBody::NumericMetric {
            qualities: rsdc::biceps::MetricQualities {
                unit: rsdc::biceps::pm::CodedValue::new("268192"),
                category: rsdc::biceps::pm::MetricCategory::Measurement,
                availability: rsdc::biceps::pm::MetricAvailability::Continuous,
                determination_period_ms: None,
            },
            resolution: 0.1,
            technical_range: Vec::new(),
        },
    ))
    .expect("stages re-add");
    tx.commit().expect("re-add commits");

    let reborn = store.read_snapshot().descriptor("nm0").expect("descriptor").version;
    assert_eq!(reborn, old_version + 1);
}

#[test]
fn reparenting_bumps_children_but_not_their_state_versions() {
    let store = seed_store();
    let before = store.read_snapshot();
    let ch0_version = before.descriptor("ch0").expect("ch0").version;
    let nm0_version = before.descriptor("nm0").expect("nm0").version;
    let nm0_state_version = before.state("nm0").expect("nm0 state").state_version;

    // Move ch0 from vmd0 directly under mds0: a structural update.
    let mut moved = (**before.descriptor("ch0").expect("ch0")).clone();
    moved.parent = Some("mds0".to_string());
    let mut tx = store.begin_transaction(TxKind::DescriptorModification);
    tx.update_descriptor(moved).expect("stages");
    tx.commit().expect("commits");

    let after = store.read_snapshot();
    assert_eq!(after.descriptor("ch0").expect("ch0").version, ch0_version + 1);
    assert_eq!(after.descriptor("nm0").expect("nm0").version, nm0_version + 1);
    let nm0_state = after.state("nm0").expect("nm0 state");
    assert_eq!(nm0_state.state_version, nm0_state_version, "state version preserved");
    assert_eq!(nm0_state.descriptor_version, nm0_version + 1, "descriptor version refreshed");
    assert!(after.children_of("mds0").iter().any(|h| h == "ch0"));
    assert!(!after.children_of("vmd0").iter().any(|h| h == "ch0"));
}

#[test]
fn reparenting_under_own_subtree_is_a_cycle() {
    let store = seed_store();
    let snap = store.read_snapshot();
    let mut moved = (**snap.descriptor("vmd0").expect("vmd0")).clone();
    moved.parent = Some("ch0".to_string());
    let mut tx = store.begin_transaction(TxKind::DescriptorModification);
    assert!(matches!(
        tx.update_descriptor(moved),
        Err(TransactionError::InvariantViolation(_))
    ));
}

#[test]
fn context_association_records_binding_versions() {
    let store = seed_store();

    let mut tx = store.begin_transaction(TxKind::ContextStates);
    tx.write_state(State::new_context(
        "lc0",
        "lc0.bedA",
        StateBody::Context {
            association: ContextAssociation::Associated,
            binding_mdib_version: None,
            unbinding_mdib_version: None,
            binding_start: None,
            binding_end: None,
            identifications: Vec::new(),
        },
    ))
    .expect("stages");
    let v_assoc = tx.commit().expect("commits").mdib_version;

    let snap = store.read_snapshot();
    let bound = snap.context_state("lc0.bedA").expect("instance present");
    match &bound.body {
        StateBody::Context { binding_mdib_version, binding_start, .. } => {
            assert_eq!(*binding_mdib_version, Some(v_assoc));
            assert!(binding_start.is_some());
        }
        other => panic!("unexpected body {:?}", other),
    }

    let mut next = (**bound).clone();
    if let StateBody::Context { association, .. } = &mut next.body {
        *association = ContextAssociation::Disassociated;
    }
    let mut tx = store.begin_transaction(TxKind::ContextStates);
    tx.write_state(next).expect("stages");
    let v_dis = tx.commit().expect("commits").mdib_version;

    let snap = store.read_snapshot();
    let unbound = snap.context_state("lc0.bedA").expect("instance present");
    match &unbound.body {
        StateBody::Context { unbinding_mdib_version, binding_end, .. } => {
            assert_eq!(*unbinding_mdib_version, Some(v_dis));
            assert!(binding_end.is_some());
        }
        other => panic!("unexpected body {:?}", other),
    }
}

#[test]
fn concurrent_readers_see_consistent_versions() {
    let store = seed_store();
    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = std::sync::Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for _ in 0..200 {
                let snap = store.read_snapshot();
                // A snapshot is internally consistent: the state exists at
                // the version the snapshot claims.
                let state = snap.state("nm0");
                if snap.mdib_version() >= 1 {
                    assert!(state.is_some());
                }
            }
        }));
    }
    for i in 0..50 {
        set_metric_value(&store, "nm0", 36.0 + f64::from(i));
    }
    for h in handles {
        h.join().expect("reader thread finishes");
    }
    assert_eq!(store.read_snapshot().mdib_version(), 51);
}

#[test]
fn description_tx_may_touch_states_of_created_descriptors_only() {
    let store = seed_store();
    let mut tx = store.begin_transaction(TxKind::DescriptorModification);
    tx.add_descriptor(Descriptor::new("bat0", Some("mds0"), DescriptorBody::Battery))
        .expect("stages descriptor");
    tx.write_state(State::new(
        "bat0",
        StateBody::Component {
            activation: ComponentActivation::On,
            operating_hours: Some(1),
            operating_cycles: None,
        },
    ))
    .expect("initial state of a created descriptor is allowed");

    // An untouched descriptor's state is off limits in this kind.
    let err = tx.write_state(numeric_metric_state("nm0", 1.0)).expect_err("rejected");
    assert!(matches!(err, TransactionError::InvariantViolation(_)));

    tx.commit().expect("commits");
    let snap = store.read_snapshot();
    assert!(snap.descriptor("bat0").is_some());
    assert!(snap.state("bat0").is_some());
}
