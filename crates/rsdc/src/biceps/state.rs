// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! State model: the dynamic half of an MDIB entity.

use super::descriptor::DescriptorKind;
use super::pm::{
    AlertActivation, AlertConditionPriority, AlertSignalLocation, AlertSignalPresence,
    ComponentActivation, ContextAssociation, InstanceIdentifier, MetricValue, OperatingMode,
    Range, SampleArrayValue, StringMetricValue, SystemSignalActivation, Timestamp,
};
use super::{Extensions, Handle};

/// Report classes; each transaction kind governs exactly one (description
/// modification aside).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateClass {
    Metric,
    Waveform,
    Alert,
    Component,
    Operational,
    Context,
}

/// Runtime values of one entity, tagged by report class and concrete shape.
#[derive(Debug, Clone, PartialEq)]
pub enum StateBody {
    NumericMetric {
        activation: ComponentActivation,
        value: Option<MetricValue>,
        /// Currently active physiological ranges (limit monitoring).
        physiological_range: Vec<Range>,
    },
    StringMetric {
        activation: ComponentActivation,
        value: Option<StringMetricValue>,
    },
    EnumStringMetric {
        activation: ComponentActivation,
        value: Option<StringMetricValue>,
    },
    SampleArrayMetric {
        activation: ComponentActivation,
        samples: Option<SampleArrayValue>,
    },
    Component {
        activation: ComponentActivation,
        operating_hours: Option<u32>,
        operating_cycles: Option<u32>,
    },
    AlertSystem {
        activation: AlertActivation,
        last_self_check: Option<Timestamp>,
        self_check_count: u64,
        present_physiological_conditions: Vec<Handle>,
        present_technical_conditions: Vec<Handle>,
        system_signal_activations: Vec<SystemSignalActivation>,
    },
    AlertCondition {
        activation: AlertActivation,
        presence: bool,
        determination_time: Option<Timestamp>,
        actual_priority: Option<AlertConditionPriority>,
        /// Limit monitored by a limit alert condition; `None` for plain conditions.
        limits: Option<Range>,
    },
    AlertSignal {
        activation: AlertActivation,
        presence: AlertSignalPresence,
        location: AlertSignalLocation,
    },
    Operation {
        operating_mode: OperatingMode,
    },
    Context {
        association: ContextAssociation,
        binding_mdib_version: Option<u64>,
        unbinding_mdib_version: Option<u64>,
        binding_start: Option<Timestamp>,
        binding_end: Option<Timestamp>,
        identifications: Vec<InstanceIdentifier>,
    },
}

impl StateBody {
    /// Report class of this state shape.
    #[must_use]
    pub const fn class(&self) -> StateClass {
        match self {
            StateBody::NumericMetric { .. }
            | StateBody::StringMetric { .. }
            | StateBody::EnumStringMetric { .. } => StateClass::Metric,
            StateBody::SampleArrayMetric { .. } => StateClass::Waveform,
            StateBody::Component { .. } => StateClass::Component,
            StateBody::AlertSystem { .. }
            | StateBody::AlertCondition { .. }
            | StateBody::AlertSignal { .. } => StateClass::Alert,
            StateBody::Operation { .. } => StateClass::Operational,
            StateBody::Context { .. } => StateClass::Context,
        }
    }

    /// True when a state of this shape may accompany a descriptor of `kind`.
    ///
    /// Classes must agree, and within a class the concrete shapes must line
    /// up (a numeric metric descriptor cannot carry a string metric state).
    #[must_use]
    pub fn compatible_with(&self, kind: DescriptorKind) -> bool {
        if kind.state_class() != self.class() {
            return false;
        }
        match (self, kind) {
            (StateBody::NumericMetric { .. }, DescriptorKind::NumericMetric)
            | (StateBody::StringMetric { .. }, DescriptorKind::StringMetric)
            | (StateBody::EnumStringMetric { .. }, DescriptorKind::EnumStringMetric)
            | (StateBody::SampleArrayMetric { .. }, DescriptorKind::RealTimeSampleArrayMetric)
            | (StateBody::AlertSystem { .. }, DescriptorKind::AlertSystem)
            | (
                StateBody::AlertCondition { .. },
                DescriptorKind::AlertCondition | DescriptorKind::LimitAlertCondition,
            )
            | (StateBody::AlertSignal { .. }, DescriptorKind::AlertSignal) => true,
            (StateBody::Component { .. }, _) => true,
            (StateBody::Operation { .. }, _) => kind.is_operation(),
            (StateBody::Context { .. }, _) => kind.is_multi_state(),
            _ => false,
        }
    }
}

/// A versioned state record.
///
/// Single-state entities are keyed by `descriptor_handle`; context states
/// additionally carry their own instance `handle` (one descriptor, many
/// instances).
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub descriptor_handle: Handle,
    /// Instance handle; present exactly for context (multi-state) states.
    pub handle: Option<Handle>,
    /// State version counter, bumped by the committing transaction.
    pub state_version: u64,
    /// Version of the descriptor this state was produced against.
    pub descriptor_version: u64,
    pub body: StateBody,
    pub extensions: Extensions,
}

impl State {
    /// Construct a version-0 single-state record.
    #[must_use]
    pub fn new(descriptor_handle: &str, body: StateBody) -> Self {
        Self {
            descriptor_handle: descriptor_handle.to_string(),
            handle: None,
            state_version: 0,
            descriptor_version: 0,
            body,
            extensions: Extensions::default(),
        }
    }

    /// Construct a version-0 context (multi-state) record.
    #[must_use]
    pub fn new_context(descriptor_handle: &str, instance_handle: &str, body: StateBody) -> Self {
        Self {
            descriptor_handle: descriptor_handle.to_string(),
            handle: Some(instance_handle.to_string()),
            state_version: 0,
            descriptor_version: 0,
            body,
            extensions: Extensions::default(),
        }
    }

    /// The key this state is stored under: instance handle for context
    /// states, descriptor handle otherwise.
    #[must_use]
    pub fn key(&self) -> &Handle {
        self.handle.as_ref().unwrap_or(&self.descriptor_handle)
    }

    /// Numeric metric value shortcut, used throughout tests and role code.
    #[must_use]
    pub fn numeric_value(&self) -> Option<f64> {
        match &self.body {
            StateBody::NumericMetric { value, .. } => value.as_ref().and_then(|v| v.value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biceps::pm::MetricValue;

    fn numeric_state(handle: &str) -> State {
        State::new(
            handle,
            StateBody::NumericMetric {
                activation: ComponentActivation::On,
                value: Some(MetricValue::measured(36.6)),
                physiological_range: Vec::new(),
            },
        )
    }

    #[test]
    fn class_compatibility() {
        let s = numeric_state("nm0");
        assert!(s.body.compatible_with(DescriptorKind::NumericMetric));
        assert!(!s.body.compatible_with(DescriptorKind::StringMetric));
        assert!(!s.body.compatible_with(DescriptorKind::Mds));

        let ctx = State::new_context(
            "pc0",
            "pc0.inst1",
            StateBody::Context {
                association: ContextAssociation::Associated,
                binding_mdib_version: None,
                unbinding_mdib_version: None,
                binding_start: None,
                binding_end: None,
                identifications: Vec::new(),
            },
        );
        assert!(ctx.body.compatible_with(DescriptorKind::PatientContext));
        assert!(!ctx.body.compatible_with(DescriptorKind::SystemContext));
    }

    #[test]
    fn key_prefers_instance_handle() {
        let s = numeric_state("nm0");
        assert_eq!(s.key(), "nm0");
        let ctx = State::new_context(
            "lc0",
            "lc0.loc1",
            StateBody::Context {
                association: ContextAssociation::Associated,
                binding_mdib_version: None,
                unbinding_mdib_version: None,
                binding_start: None,
                binding_end: None,
                identifications: Vec::new(),
            },
        );
        assert_eq!(ctx.key(), "lc0.loc1");
    }

    #[test]
    fn numeric_value_shortcut() {
        assert_eq!(numeric_state("nm0").numeric_value(), Some(36.6));
        let op = State::new("op0", StateBody::Operation { operating_mode: OperatingMode::Enabled });
        assert_eq!(op.numeric_value(), None);
    }
}
