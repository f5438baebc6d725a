// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Shared fixtures: a small but complete ventilator-ish MDIB.
//!
//! Tree: mds0 -> { sc0 -> lc0, sco0 -> {op1, op2}, vmd0 -> ch0 ->
//! {nm0, nset0, rtsa0}, as0 -> ac0 }. `nm0` is a read-only measurement
//! (initial 36.6), `nset0` a settable value with technical range 0..10.

// Each integration test binary compiles its own copy; not every binary
// uses every helper.
#![allow(dead_code)]

use rsdc::biceps::pm::{
    AlertActivation, AlertConditionKind, AlertConditionPriority, CodedValue, ComponentActivation,
    MetricAvailability, MetricCategory, MetricValue, OperatingMode, Range,
};
use rsdc::biceps::{Descriptor, DescriptorBody, MetricQualities, State, StateBody};
use rsdc::{MdibStore, TxKind};
use std::sync::Arc;

fn qualities(category: MetricCategory) -> MetricQualities {
    MetricQualities {
        unit: CodedValue::new("268192"),
        category,
        availability: MetricAvailability::Continuous,
        determination_period_ms: None,
    }
}

pub fn numeric_metric_state(handle: &str, value: f64) -> State {
    State::new(
        handle,
        StateBody::NumericMetric {
            activation: ComponentActivation::On,
            value: Some(MetricValue::measured(value)),
            physiological_range: Vec::new(),
        },
    )
}

/// Build the fixture MDIB; the seeding commit leaves the store at MDIB
/// version 1 with every state at version 0.
pub fn seed_store() -> Arc<MdibStore> {
    let store = Arc::new(MdibStore::new());
    let mut tx = store.begin_transaction(TxKind::DescriptorModification);

    let descriptors = vec![
        Descriptor::new("mds0", None, DescriptorBody::Mds),
        Descriptor::new("sc0", Some("mds0"), DescriptorBody::SystemContext),
        Descriptor::new("lc0", Some("sc0"), DescriptorBody::LocationContext),
        Descriptor::new("sco0", Some("mds0"), DescriptorBody::Sco),
        Descriptor::new(
            "op1",
            Some("sco0"),
            DescriptorBody::SetValueOperation { target: "nm0".to_string() },
        ),
        Descriptor::new(
            "op2",
            Some("sco0"),
            DescriptorBody::SetValueOperation { target: "nset0".to_string() },
        ),
        Descriptor::new("vmd0", Some("mds0"), DescriptorBody::Vmd),
        Descriptor::new("ch0", Some("vmd0"), DescriptorBody::Channel),
        Descriptor::new(
            "nm0",
            Some("ch0"),
            DescriptorBody::NumericMetric {
                qualities: qualities(MetricCategory::Measurement),
                resolution: 0.1,
                technical_range: Vec::new(),
            },
        ),
        Descriptor::new(
            "nset0",
            Some("ch0"),
            DescriptorBody::NumericMetric {
                qualities: qualities(MetricCategory::Setting),
                resolution: 0.1,
                technical_range: vec![Range { lower: Some(0.0), upper: Some(10.0) }],
            },
        ),
        Descriptor::new(
            "rtsa0",
            Some("ch0"),
            DescriptorBody::RealTimeSampleArrayMetric {
                qualities: qualities(MetricCategory::Measurement),
                resolution: 0.01,
                sample_period_ms: 10,
            },
        ),
        Descriptor::new(
            "as0",
            Some("mds0"),
            DescriptorBody::AlertSystem {
                self_check_period_ms: Some(5000),
                max_physiological_parallel_alarms: None,
                max_technical_parallel_alarms: None,
            },
        ),
        Descriptor::new(
            "ac0",
            Some("as0"),
            DescriptorBody::AlertCondition {
                kind: AlertConditionKind::Physiological,
                priority: AlertConditionPriority::Medium,
                sources: vec!["nm0".to_string()],
            },
        ),
    ];
    for d in descriptors {
        tx.add_descriptor(d).expect("fixture descriptor is valid");
    }

    let states = vec![
        State::new(
            "mds0",
            StateBody::Component {
                activation: ComponentActivation::On,
                operating_hours: None,
                operating_cycles: None,
            },
        ),
        numeric_metric_state("nm0", 36.6),
        numeric_metric_state("nset0", 1.0),
        State::new("op1", StateBody::Operation { operating_mode: OperatingMode::Enabled }),
        State::new("op2", StateBody::Operation { operating_mode: OperatingMode::Enabled }),
        State::new(
            "as0",
            StateBody::AlertSystem {
                activation: AlertActivation::On,
                last_self_check: None,
                self_check_count: 0,
                present_physiological_conditions: Vec::new(),
                present_technical_conditions: Vec::new(),
                system_signal_activations: Vec::new(),
            },
        ),
        State::new(
            "ac0",
            StateBody::AlertCondition {
                activation: AlertActivation::On,
                presence: false,
                determination_time: None,
                actual_priority: None,
                limits: None,
            },
        ),
    ];
    for s in states {
        tx.write_state(s).expect("fixture state is valid");
    }

    let version = tx.commit().expect("fixture seed commits");
    assert_eq!(version.mdib_version, 1, "seed is the first transaction");
    store
}

/// Update `nm0`'s measured value in one MetricStates transaction.
pub fn set_metric_value(store: &MdibStore, handle: &str, value: f64) -> u64 {
    let snap = store.read_snapshot();
    let current = snap.state(handle).expect("metric state present");
    let mut next = (**current).clone();
    match &mut next.body {
        StateBody::NumericMetric { value: v, .. } => *v = Some(MetricValue::measured(value)),
        other => panic!("fixture handle {} is not a numeric metric: {:?}", handle, other),
    }
    let mut tx = store.begin_transaction(TxKind::MetricStates);
    tx.write_state(next).expect("metric update stages");
    tx.commit().expect("metric update commits").mdib_version
}
