// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Provider/consumer scenarios over loopback HTTP (discovery bypassed;
//! the consumer connects straight to the service URL).

mod common;

use common::{seed_store, set_metric_value};
use rsdc::biceps::pm::{InvocationError, InvocationState};
use rsdc::biceps::StateBody;
use rsdc::consumer::{MirrorEvent, SdcConsumer};
use rsdc::{ReportAction, RuntimeConfig, SdcProvider, ThisDevice, ThisModel, TxKind};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn test_config() -> Arc<RuntimeConfig> {
    let config = Arc::new(RuntimeConfig::default());
    config.update(|c| {
        c.interface = Some(Ipv4Addr::LOCALHOST);
        // Keep the alert self-check quiet during scenario tests.
        c.self_check_interval = Duration::from_secs(3600);
    });
    config
}

fn start_provider(config: &Arc<RuntimeConfig>) -> SdcProvider {
    let provider = SdcProvider::builder("test-device")
        .with_store(seed_store())
        .with_config(Arc::clone(config))
        .with_model(ThisModel {
            manufacturer: "ACME Medical".to_string(),
            model_name: "Sim 1000".to_string(),
            ..ThisModel::default()
        })
        .with_device(ThisDevice {
            friendly_name: "Bench device".to_string(),
            ..ThisDevice::default()
        })
        .without_discovery()
        .build()
        .expect("provider builds");
    provider.start().expect("provider starts");
    provider
}

fn wait_for<F: FnMut() -> bool>(mut pred: F, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if pred() {
            return;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    panic!("timed out waiting for {}", what);
}

/// Scenario 1: GetMdib bootstrap.
#[test]
fn bootstrap_mirrors_the_seed() {
    let config = test_config();
    let provider = start_provider(&config);
    let consumer = SdcConsumer::connect_to_url(Arc::clone(&config), provider.service_url(), provider.epr())
        .expect("consumer connects");

    let mirror = consumer.mdib();
    assert_eq!(mirror.mdib_version(), 1);
    assert_eq!(mirror.sequence_id(), provider.snapshot().sequence_id());
    let nm0 = mirror.state("nm0").expect("nm0 mirrored");
    assert_eq!(nm0.state_version, 0);
    assert_eq!(nm0.numeric_value(), Some(36.6));
}

/// Scenario 2: a single metric update arrives as an episodic report.
#[test]
fn metric_update_flows_to_the_mirror() {
    let config = test_config();
    let provider = start_provider(&config);
    let consumer = SdcConsumer::connect_to_url(Arc::clone(&config), provider.service_url(), provider.epr())
        .expect("consumer connects");
    let events = consumer.events();
    consumer.subscribe(&[ReportAction::EpisodicMetricReport]).expect("subscribes");

    let committed = set_metric_value(&provider.mdib(), "nm0", 37.0);
    assert_eq!(committed, 2);

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        match events.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(MirrorEvent::Updated { version: 2, action }) => {
                assert_eq!(action, ReportAction::EpisodicMetricReport);
                break;
            }
            Ok(_) => continue,
            Err(e) => panic!("no update event: {}", e),
        }
    }
    let mirror = consumer.mdib();
    assert_eq!(mirror.mdib_version(), 2);
    let nm0 = mirror.state("nm0").expect("nm0 mirrored");
    assert_eq!(nm0.state_version, 1);
    assert_eq!(nm0.numeric_value(), Some(37.0));
}

/// Scenario 3: commits the consumer does not subscribe to open a version
/// gap; the mirror detects it, rebuilds, and resumes.
#[test]
fn version_gap_triggers_mirror_rebuild() {
    let config = test_config();
    let provider = start_provider(&config);
    let consumer = SdcConsumer::connect_to_url(Arc::clone(&config), provider.service_url(), provider.epr())
        .expect("consumer connects");
    let events = consumer.events();
    // Metric reports only: alert commits bump the version invisibly.
    consumer.subscribe(&[ReportAction::EpisodicMetricReport]).expect("subscribes");

    // Invisible commits (alert states), then a visible one.
    for presence in [true, false, true] {
        provider.set_alert_condition_presence("ac0", presence).expect("alert commit");
    }
    let committed = set_metric_value(&provider.mdib(), "nm0", 38.0);
    assert_eq!(committed, 5, "three invisible commits preceded");

    let mut resynced = false;
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        match events.recv_timeout(Duration::from_millis(250)) {
            Ok(MirrorEvent::Resynced { .. }) => {
                resynced = true;
                break;
            }
            Ok(_) | Err(_) => {
                if consumer.mdib().mdib_version() >= 5 {
                    // Rebuild may have happened before we subscribed to events.
                    resynced = true;
                    break;
                }
            }
        }
    }
    assert!(resynced, "gap must trigger a rebuild");
    wait_for(|| consumer.mdib().mdib_version() >= 5, "mirror catches up");
    assert_eq!(consumer.mdib().state("nm0").expect("nm0").numeric_value(), Some(38.0));
    // Sequence unchanged: same MDIB life.
    assert_eq!(consumer.mdib().sequence_id(), provider.snapshot().sequence_id());

    // The subscription keeps working after the rebuild.
    set_metric_value(&provider.mdib(), "nm0", 39.0);
    wait_for(
        || consumer.mdib().state("nm0").map(|s| s.numeric_value()) == Some(Some(39.0)),
        "post-rebuild report applies",
    );
}

/// Scenario 5: SetValue on a read-only metric fails asynchronously with
/// InvalidValue and does not bump the MDIB version.
#[test]
fn failed_set_value_reports_invalid_value() {
    let config = test_config();
    let provider = start_provider(&config);
    let consumer = SdcConsumer::connect_to_url(Arc::clone(&config), provider.service_url(), provider.epr())
        .expect("consumer connects");
    let events = consumer.events();
    consumer.subscribe(&[ReportAction::OperationInvokedReport]).expect("subscribes");

    let version_before = provider.snapshot().mdib_version();
    // op1 targets nm0, a Measurement: not settable.
    let tx_id = consumer.set_value("op1", 1.0).expect("immediate response with transaction id");

    let mut transitions = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        match events.recv_timeout(Duration::from_millis(250)) {
            Ok(MirrorEvent::OperationInvoked(info)) if info.transaction_id == tx_id => {
                transitions.push((info.invocation_state, info.error));
                if matches!(
                    info.invocation_state,
                    InvocationState::Failed
                        | InvocationState::Finished
                        | InvocationState::FinishedWithModification
                ) {
                    break;
                }
            }
            Ok(_) | Err(_) => continue,
        }
    }
    assert!(
        transitions.contains(&(InvocationState::Wait, None)),
        "Wait transition missing: {:?}",
        transitions
    );
    let last = transitions.last().expect("terminal transition");
    assert_eq!(last.0, InvocationState::Failed);
    assert_eq!(last.1, Some(InvocationError::InvalidValue));
    assert_eq!(provider.snapshot().mdib_version(), version_before, "no state mutation");
}

/// The settable sibling succeeds and mutates the MDIB.
#[test]
fn successful_set_value_modifies_the_metric() {
    let config = test_config();
    let provider = start_provider(&config);
    let consumer = SdcConsumer::connect_to_url(Arc::clone(&config), provider.service_url(), provider.epr())
        .expect("consumer connects");
    let events = consumer.events();
    consumer
        .subscribe(&[ReportAction::OperationInvokedReport, ReportAction::EpisodicMetricReport])
        .expect("subscribes");

    let tx_id = consumer.set_value("op2", 4.5).expect("accepted");

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut finished = false;
    while Instant::now() < deadline {
        match events.recv_timeout(Duration::from_millis(250)) {
            Ok(MirrorEvent::OperationInvoked(info))
                if info.transaction_id == tx_id
                    && info.invocation_state == InvocationState::FinishedWithModification =>
            {
                finished = true;
                break;
            }
            Ok(_) | Err(_) => continue,
        }
    }
    assert!(finished, "operation must finish with modification");
    wait_for(
        || consumer.mdib().state("nset0").map(|s| s.numeric_value()) == Some(Some(4.5)),
        "set value reaches the mirror",
    );

    // Out-of-range requests fail the technical range check.
    let tx_id = consumer.set_value("op2", 99.0).expect("accepted");
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        match events.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(MirrorEvent::OperationInvoked(info)) if info.transaction_id == tx_id => {
                if info.invocation_state == InvocationState::Failed {
                    assert_eq!(info.error, Some(InvocationError::InvalidValue));
                    break;
                }
            }
            Ok(_) => continue,
            Err(e) => panic!("no terminal transition: {}", e),
        }
    }
}

/// Scenario 6: removing a descriptor propagates to the mirror and empties
/// GetMdState for the handle.
#[test]
fn description_modification_removes_the_entity_everywhere() {
    let config = test_config();
    let provider = start_provider(&config);
    let consumer = SdcConsumer::connect_to_url(Arc::clone(&config), provider.service_url(), provider.epr())
        .expect("consumer connects");
    consumer
        .subscribe(&[ReportAction::DescriptionModificationReport])
        .expect("subscribes");

    let store = provider.mdib();
    let mut tx = store.begin_transaction(TxKind::DescriptorModification);
    tx.remove_descriptor("nm0").expect("stages removal");
    tx.commit().expect("commits");

    wait_for(|| consumer.mdib().descriptor("nm0").is_none(), "removal reaches the mirror");
    assert!(consumer.mdib().state("nm0").is_none(), "state removed with descriptor");

    let states = consumer.get_md_state(&["nm0"]).expect("GetMdState succeeds");
    assert!(states.is_empty(), "no states for a removed descriptor");
}

/// Alert presence aggregation happens in the same transaction.
#[test]
fn alert_presence_updates_the_owning_system_atomically() {
    let config = test_config();
    let provider = start_provider(&config);
    let before = provider.snapshot().mdib_version();

    provider.set_alert_condition_presence("ac0", true).expect("alert commit");

    let snap = provider.snapshot();
    assert_eq!(snap.mdib_version(), before + 1, "one transaction, one version");
    match &snap.state("ac0").expect("ac0 state").body {
        StateBody::AlertCondition { presence, .. } => assert!(*presence),
        other => panic!("unexpected body {:?}", other),
    }
    match &snap.state("as0").expect("as0 state").body {
        StateBody::AlertSystem { present_physiological_conditions, .. } => {
            assert_eq!(present_physiological_conditions, &vec!["ac0".to_string()]);
        }
        other => panic!("unexpected body {:?}", other),
    }

    provider.set_alert_condition_presence("ac0", false).expect("alert commit");
    match &provider.snapshot().state("as0").expect("as0 state").body {
        StateBody::AlertSystem { present_physiological_conditions, .. } => {
            assert!(present_physiological_conditions.is_empty());
        }
        other => panic!("unexpected body {:?}", other),
    }
}

/// Renew and GetStatus round-trip through the provider's eventing service.
#[test]
fn subscription_management_round_trip() {
    let config = test_config();
    let provider = start_provider(&config);
    let consumer = SdcConsumer::connect_to_url(Arc::clone(&config), provider.service_url(), provider.epr())
        .expect("consumer connects");
    consumer.subscribe(&[ReportAction::EpisodicMetricReport]).expect("subscribes");
    assert_eq!(provider.subscriptions().active_count(), 1);

    consumer.unsubscribe().expect("unsubscribe succeeds");
    wait_for(|| provider.subscriptions().active_count() == 0, "subscription removed");
}
