// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Descriptor model: the static half of an MDIB entity.

use super::pm::{
    AlertConditionKind, AlertConditionPriority, AlertSignalManifestation, CodedValue,
    MetricAvailability, MetricCategory, Range, SafetyClassification,
};
use super::state::StateClass;
use super::{Extensions, Handle};

/// Attributes shared by all metric descriptors.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricQualities {
    pub unit: CodedValue,
    pub category: MetricCategory,
    pub availability: MetricAvailability,
    /// Declared determination period in milliseconds, if periodic.
    pub determination_period_ms: Option<u64>,
}

/// The closed set of descriptor types, with their schema attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorBody {
    Mds,
    Vmd,
    Channel,
    Battery,
    Clock,
    Sco,
    SystemContext,
    PatientContext,
    LocationContext,
    EnsembleContext,
    WorkflowContext,
    MeansContext,
    OperatorContext,
    NumericMetric {
        qualities: MetricQualities,
        resolution: f64,
        technical_range: Vec<Range>,
    },
    StringMetric {
        qualities: MetricQualities,
    },
    EnumStringMetric {
        qualities: MetricQualities,
        allowed_values: Vec<String>,
    },
    RealTimeSampleArrayMetric {
        qualities: MetricQualities,
        resolution: f64,
        /// Time between two samples, in milliseconds.
        sample_period_ms: u64,
    },
    SetValueOperation {
        target: Handle,
    },
    SetStringOperation {
        target: Handle,
        max_length: Option<u64>,
    },
    ActivateOperation {
        target: Handle,
    },
    SetContextStateOperation {
        target: Handle,
    },
    SetMetricStateOperation {
        target: Handle,
        modifiable_data: Vec<String>,
    },
    SetComponentStateOperation {
        target: Handle,
        modifiable_data: Vec<String>,
    },
    SetAlertStateOperation {
        target: Handle,
        modifiable_data: Vec<String>,
    },
    AlertSystem {
        /// Declared self-check period in milliseconds.
        self_check_period_ms: Option<u64>,
        max_physiological_parallel_alarms: Option<u32>,
        max_technical_parallel_alarms: Option<u32>,
    },
    AlertCondition {
        kind: AlertConditionKind,
        priority: AlertConditionPriority,
        /// Handles of the metrics this condition observes.
        sources: Vec<Handle>,
    },
    LimitAlertCondition {
        kind: AlertConditionKind,
        priority: AlertConditionPriority,
        sources: Vec<Handle>,
        max_limits: Range,
        auto_limit_supported: bool,
    },
    AlertSignal {
        /// The condition this signal annunciates.
        condition_signaled: Option<Handle>,
        manifestation: AlertSignalManifestation,
        latching: bool,
        delegation_supported: bool,
    },
}

/// Flat tag mirroring [`DescriptorBody`], for matching and registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    Mds,
    Vmd,
    Channel,
    Battery,
    Clock,
    Sco,
    SystemContext,
    PatientContext,
    LocationContext,
    EnsembleContext,
    WorkflowContext,
    MeansContext,
    OperatorContext,
    NumericMetric,
    StringMetric,
    EnumStringMetric,
    RealTimeSampleArrayMetric,
    SetValueOperation,
    SetStringOperation,
    ActivateOperation,
    SetContextStateOperation,
    SetMetricStateOperation,
    SetComponentStateOperation,
    SetAlertStateOperation,
    AlertSystem,
    AlertCondition,
    LimitAlertCondition,
    AlertSignal,
}

impl DescriptorKind {
    /// XML element name of this descriptor in the canonical MDIB document.
    #[must_use]
    pub const fn element_name(self) -> &'static str {
        match self {
            DescriptorKind::Mds => "Mds",
            DescriptorKind::Vmd => "Vmd",
            DescriptorKind::Channel => "Channel",
            DescriptorKind::Battery => "Battery",
            DescriptorKind::Clock => "Clock",
            DescriptorKind::Sco => "Sco",
            DescriptorKind::SystemContext => "SystemContext",
            DescriptorKind::PatientContext => "PatientContext",
            DescriptorKind::LocationContext => "LocationContext",
            DescriptorKind::EnsembleContext => "EnsembleContext",
            DescriptorKind::WorkflowContext => "WorkflowContext",
            DescriptorKind::MeansContext => "MeansContext",
            DescriptorKind::OperatorContext => "OperatorContext",
            DescriptorKind::NumericMetric
            | DescriptorKind::StringMetric
            | DescriptorKind::EnumStringMetric
            | DescriptorKind::RealTimeSampleArrayMetric => "Metric",
            DescriptorKind::SetValueOperation
            | DescriptorKind::SetStringOperation
            | DescriptorKind::ActivateOperation
            | DescriptorKind::SetContextStateOperation
            | DescriptorKind::SetMetricStateOperation
            | DescriptorKind::SetComponentStateOperation
            | DescriptorKind::SetAlertStateOperation => "Operation",
            DescriptorKind::AlertSystem => "AlertSystem",
            DescriptorKind::AlertCondition | DescriptorKind::LimitAlertCondition => {
                "AlertCondition"
            }
            DescriptorKind::AlertSignal => "AlertSignal",
        }
    }

    /// `xsi:type` value distinguishing subtypes of `Metric`, `Operation`,
    /// and `AlertCondition` elements; `None` where the element name suffices.
    #[must_use]
    pub const fn xsi_type(self) -> Option<&'static str> {
        match self {
            DescriptorKind::NumericMetric => Some("pm:NumericMetricDescriptor"),
            DescriptorKind::StringMetric => Some("pm:StringMetricDescriptor"),
            DescriptorKind::EnumStringMetric => Some("pm:EnumStringMetricDescriptor"),
            DescriptorKind::RealTimeSampleArrayMetric => {
                Some("pm:RealTimeSampleArrayMetricDescriptor")
            }
            DescriptorKind::SetValueOperation => Some("pm:SetValueOperationDescriptor"),
            DescriptorKind::SetStringOperation => Some("pm:SetStringOperationDescriptor"),
            DescriptorKind::ActivateOperation => Some("pm:ActivateOperationDescriptor"),
            DescriptorKind::SetContextStateOperation => {
                Some("pm:SetContextStateOperationDescriptor")
            }
            DescriptorKind::SetMetricStateOperation => Some("pm:SetMetricStateOperationDescriptor"),
            DescriptorKind::SetComponentStateOperation => {
                Some("pm:SetComponentStateOperationDescriptor")
            }
            DescriptorKind::SetAlertStateOperation => Some("pm:SetAlertStateOperationDescriptor"),
            DescriptorKind::LimitAlertCondition => Some("pm:LimitAlertConditionDescriptor"),
            _ => None,
        }
    }

    /// Which state class a state for this descriptor must belong to.
    #[must_use]
    pub const fn state_class(self) -> StateClass {
        match self {
            DescriptorKind::NumericMetric
            | DescriptorKind::StringMetric
            | DescriptorKind::EnumStringMetric => StateClass::Metric,
            DescriptorKind::RealTimeSampleArrayMetric => StateClass::Waveform,
            DescriptorKind::AlertSystem
            | DescriptorKind::AlertCondition
            | DescriptorKind::LimitAlertCondition
            | DescriptorKind::AlertSignal => StateClass::Alert,
            DescriptorKind::SetValueOperation
            | DescriptorKind::SetStringOperation
            | DescriptorKind::ActivateOperation
            | DescriptorKind::SetContextStateOperation
            | DescriptorKind::SetMetricStateOperation
            | DescriptorKind::SetComponentStateOperation
            | DescriptorKind::SetAlertStateOperation => StateClass::Operational,
            DescriptorKind::PatientContext
            | DescriptorKind::LocationContext
            | DescriptorKind::EnsembleContext
            | DescriptorKind::WorkflowContext
            | DescriptorKind::MeansContext
            | DescriptorKind::OperatorContext => StateClass::Context,
            DescriptorKind::Mds
            | DescriptorKind::Vmd
            | DescriptorKind::Channel
            | DescriptorKind::Battery
            | DescriptorKind::Clock
            | DescriptorKind::Sco
            | DescriptorKind::SystemContext => StateClass::Component,
        }
    }

    /// Context descriptors own multi-state instances rather than one state.
    #[must_use]
    pub const fn is_multi_state(self) -> bool {
        matches!(self.state_class(), StateClass::Context)
    }

    /// True for the operation descriptor family.
    #[must_use]
    pub const fn is_operation(self) -> bool {
        matches!(self.state_class(), StateClass::Operational)
    }
}

/// One node of the MDIB containment tree.
///
/// Immutable per version: mutation happens by staging a modified clone in a
/// description-modification transaction, never in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub handle: Handle,
    /// Containment parent; `None` only for the root MDS.
    pub parent: Option<Handle>,
    /// Descriptor version counter, bumped by the committing transaction.
    pub version: u64,
    pub type_code: Option<CodedValue>,
    pub safety_classification: SafetyClassification,
    pub body: DescriptorBody,
    pub extensions: Extensions,
}

impl Descriptor {
    /// Construct a version-0 descriptor.
    #[must_use]
    pub fn new(handle: &str, parent: Option<&str>, body: DescriptorBody) -> Self {
        Self {
            handle: handle.to_string(),
            parent: parent.map(str::to_string),
            version: 0,
            type_code: None,
            safety_classification: SafetyClassification::default(),
            body,
            extensions: Extensions::default(),
        }
    }

    /// Flat kind tag of the body.
    #[must_use]
    pub fn kind(&self) -> DescriptorKind {
        match &self.body {
            DescriptorBody::Mds => DescriptorKind::Mds,
            DescriptorBody::Vmd => DescriptorKind::Vmd,
            DescriptorBody::Channel => DescriptorKind::Channel,
            DescriptorBody::Battery => DescriptorKind::Battery,
            DescriptorBody::Clock => DescriptorKind::Clock,
            DescriptorBody::Sco => DescriptorKind::Sco,
            DescriptorBody::SystemContext => DescriptorKind::SystemContext,
            DescriptorBody::PatientContext => DescriptorKind::PatientContext,
            DescriptorBody::LocationContext => DescriptorKind::LocationContext,
            DescriptorBody::EnsembleContext => DescriptorKind::EnsembleContext,
            DescriptorBody::WorkflowContext => DescriptorKind::WorkflowContext,
            DescriptorBody::MeansContext => DescriptorKind::MeansContext,
            DescriptorBody::OperatorContext => DescriptorKind::OperatorContext,
            DescriptorBody::NumericMetric { .. } => DescriptorKind::NumericMetric,
            DescriptorBody::StringMetric { .. } => DescriptorKind::StringMetric,
            DescriptorBody::EnumStringMetric { .. } => DescriptorKind::EnumStringMetric,
            DescriptorBody::RealTimeSampleArrayMetric { .. } => {
                DescriptorKind::RealTimeSampleArrayMetric
            }
            DescriptorBody::SetValueOperation { .. } => DescriptorKind::SetValueOperation,
            DescriptorBody::SetStringOperation { .. } => DescriptorKind::SetStringOperation,
            DescriptorBody::ActivateOperation { .. } => DescriptorKind::ActivateOperation,
            DescriptorBody::SetContextStateOperation { .. } => {
                DescriptorKind::SetContextStateOperation
            }
            DescriptorBody::SetMetricStateOperation { .. } => {
                DescriptorKind::SetMetricStateOperation
            }
            DescriptorBody::SetComponentStateOperation { .. } => {
                DescriptorKind::SetComponentStateOperation
            }
            DescriptorBody::SetAlertStateOperation { .. } => {
                DescriptorKind::SetAlertStateOperation
            }
            DescriptorBody::AlertSystem { .. } => DescriptorKind::AlertSystem,
            DescriptorBody::AlertCondition { .. } => DescriptorKind::AlertCondition,
            DescriptorBody::LimitAlertCondition { .. } => DescriptorKind::LimitAlertCondition,
            DescriptorBody::AlertSignal { .. } => DescriptorKind::AlertSignal,
        }
    }

    /// Operation target handle, for the operation descriptor family.
    #[must_use]
    pub fn operation_target(&self) -> Option<&Handle> {
        match &self.body {
            DescriptorBody::SetValueOperation { target }
            | DescriptorBody::SetStringOperation { target, .. }
            | DescriptorBody::ActivateOperation { target }
            | DescriptorBody::SetContextStateOperation { target }
            | DescriptorBody::SetMetricStateOperation { target, .. }
            | DescriptorBody::SetComponentStateOperation { target, .. }
            | DescriptorBody::SetAlertStateOperation { target, .. } => Some(target),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_state_class_mapping() {
        assert_eq!(DescriptorKind::NumericMetric.state_class(), StateClass::Metric);
        assert_eq!(
            DescriptorKind::RealTimeSampleArrayMetric.state_class(),
            StateClass::Waveform
        );
        assert_eq!(DescriptorKind::PatientContext.state_class(), StateClass::Context);
        assert!(DescriptorKind::PatientContext.is_multi_state());
        assert!(!DescriptorKind::Mds.is_multi_state());
        assert!(DescriptorKind::SetValueOperation.is_operation());
    }

    #[test]
    fn operation_target_extraction() {
        let d = Descriptor::new(
            "op1",
            Some("sco"),
            DescriptorBody::SetValueOperation { target: "nm0".into() },
        );
        assert_eq!(d.operation_target().map(String::as_str), Some("nm0"));
        let m = Descriptor::new("mds0", None, DescriptorBody::Mds);
        assert!(m.operation_target().is_none());
    }
}
