// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Serializers for descriptors and states.
//!
//! The canonical forms here mirror what [`super::decode`] accepts; the pair
//! is exercised by the round-trip tests in `tests/mdib_roundtrip.rs`.

use crate::biceps::pm::{
    CodedValue, InstanceIdentifier, MetricValue, Range, SampleArrayValue, StringMetricValue,
};
use crate::biceps::qname::Ns;
use crate::biceps::{Descriptor, DescriptorBody, Extensions, State, StateBody};

use super::writer::XmlWriter;

fn fmt_f64(v: f64) -> String {
    // Deterministic shortest representation; round-trips through f64::from_str.
    format!("{}", v)
}

fn write_extensions(w: &mut XmlWriter, ext: &Extensions) {
    if ext.is_empty() {
        return;
    }
    w.start(Ns::Ext, "Extension");
    for raw in &ext.0 {
        w.raw(raw);
    }
    w.end();
}

fn write_coded_value(w: &mut XmlWriter, local: &'static str, cv: &CodedValue) {
    w.start(Ns::Pm, local);
    w.attr("Code", &cv.code);
    if let Some(cs) = &cv.coding_system {
        w.attr("CodingSystem", cs);
    }
    if let Some(csv) = &cv.coding_system_version {
        w.attr("CodingSystemVersion", csv);
    }
    w.end();
}

fn write_range(w: &mut XmlWriter, local: &'static str, r: &Range) {
    w.start(Ns::Pm, local);
    if let Some(l) = r.lower {
        w.attr("Lower", &fmt_f64(l));
    }
    if let Some(u) = r.upper {
        w.attr("Upper", &fmt_f64(u));
    }
    w.end();
}

/// Write the opening tag, attributes, and non-descriptor children of one
/// descriptor. The caller nests child descriptors afterwards and closes the
/// element; flat serializations (reports) pass `include_parent = true` and
/// close immediately.
pub fn write_descriptor_open(w: &mut XmlWriter, d: &Descriptor, include_parent: bool) {
    let kind = d.kind();
    w.start(Ns::Pm, kind.element_name());
    if let Some(xsi) = kind.xsi_type() {
        w.attr_qualified(Ns::Xsi, "type", xsi);
    }
    w.attr("Handle", &d.handle);
    w.attr("DescriptorVersion", &d.version.to_string());
    w.attr("SafetyClassification", d.safety_classification.as_str());
    if include_parent {
        if let Some(parent) = &d.parent {
            w.attr("ParentHandle", parent);
        }
    }

    // Body attributes first (attributes must precede any child element).
    match &d.body {
        DescriptorBody::NumericMetric { qualities, resolution, .. } => {
            w.attr("Resolution", &fmt_f64(*resolution));
            w.attr("MetricCategory", qualities.category.as_str());
            w.attr("MetricAvailability", qualities.availability.as_str());
            if let Some(dp) = qualities.determination_period_ms {
                w.attr("DeterminationPeriod", &dp.to_string());
            }
        }
        DescriptorBody::StringMetric { qualities } | DescriptorBody::EnumStringMetric { qualities, .. } => {
            w.attr("MetricCategory", qualities.category.as_str());
            w.attr("MetricAvailability", qualities.availability.as_str());
            if let Some(dp) = qualities.determination_period_ms {
                w.attr("DeterminationPeriod", &dp.to_string());
            }
        }
        DescriptorBody::RealTimeSampleArrayMetric { qualities, resolution, sample_period_ms } => {
            w.attr("Resolution", &fmt_f64(*resolution));
            w.attr("SamplePeriod", &sample_period_ms.to_string());
            w.attr("MetricCategory", qualities.category.as_str());
            w.attr("MetricAvailability", qualities.availability.as_str());
            if let Some(dp) = qualities.determination_period_ms {
                w.attr("DeterminationPeriod", &dp.to_string());
            }
        }
        DescriptorBody::SetValueOperation { target }
        | DescriptorBody::ActivateOperation { target }
        | DescriptorBody::SetContextStateOperation { target } => {
            w.attr("OperationTarget", target);
        }
        DescriptorBody::SetStringOperation { target, max_length } => {
            w.attr("OperationTarget", target);
            if let Some(ml) = max_length {
                w.attr("MaxLength", &ml.to_string());
            }
        }
        DescriptorBody::SetMetricStateOperation { target, .. }
        | DescriptorBody::SetComponentStateOperation { target, .. }
        | DescriptorBody::SetAlertStateOperation { target, .. } => {
            w.attr("OperationTarget", target);
        }
        DescriptorBody::AlertSystem {
            self_check_period_ms,
            max_physiological_parallel_alarms,
            max_technical_parallel_alarms,
        } => {
            if let Some(p) = self_check_period_ms {
                w.attr("SelfCheckPeriod", &p.to_string());
            }
            if let Some(m) = max_physiological_parallel_alarms {
                w.attr("MaxPhysiologicalParallelAlarms", &m.to_string());
            }
            if let Some(m) = max_technical_parallel_alarms {
                w.attr("MaxTechnicalParallelAlarms", &m.to_string());
            }
        }
        DescriptorBody::AlertCondition { kind, priority, .. } => {
            w.attr("Kind", kind.as_str());
            w.attr("Priority", priority.as_str());
        }
        DescriptorBody::LimitAlertCondition { kind, priority, auto_limit_supported, .. } => {
            w.attr("Kind", kind.as_str());
            w.attr("Priority", priority.as_str());
            w.attr("AutoLimitSupported", if *auto_limit_supported { "true" } else { "false" });
        }
        DescriptorBody::AlertSignal {
            condition_signaled,
            manifestation,
            latching,
            delegation_supported,
        } => {
            if let Some(cond) = condition_signaled {
                w.attr("ConditionSignaled", cond);
            }
            w.attr("Manifestation", manifestation.as_str());
            w.attr("Latching", if *latching { "true" } else { "false" });
            w.attr(
                "SignalDelegationSupported",
                if *delegation_supported { "true" } else { "false" },
            );
        }
        _ => {}
    }

    write_extensions(w, &d.extensions);
    if let Some(tc) = &d.type_code {
        write_coded_value(w, "Type", tc);
    }

    // Body child elements.
    match &d.body {
        DescriptorBody::NumericMetric { qualities, technical_range, .. } => {
            write_coded_value(w, "Unit", &qualities.unit);
            for r in technical_range {
                write_range(w, "TechnicalRange", r);
            }
        }
        DescriptorBody::StringMetric { qualities } => {
            write_coded_value(w, "Unit", &qualities.unit);
        }
        DescriptorBody::EnumStringMetric { qualities, allowed_values } => {
            write_coded_value(w, "Unit", &qualities.unit);
            for v in allowed_values {
                w.start(Ns::Pm, "AllowedValue");
                w.leaf_text(Ns::Pm, "Value", v);
                w.end();
            }
        }
        DescriptorBody::RealTimeSampleArrayMetric { qualities, .. } => {
            write_coded_value(w, "Unit", &qualities.unit);
        }
        DescriptorBody::SetMetricStateOperation { modifiable_data, .. }
        | DescriptorBody::SetComponentStateOperation { modifiable_data, .. }
        | DescriptorBody::SetAlertStateOperation { modifiable_data, .. } => {
            for m in modifiable_data {
                w.leaf_text(Ns::Pm, "ModifiableData", m);
            }
        }
        DescriptorBody::AlertCondition { sources, .. } => {
            for s in sources {
                w.leaf_text(Ns::Pm, "Source", s);
            }
        }
        DescriptorBody::LimitAlertCondition { sources, max_limits, .. } => {
            for s in sources {
                w.leaf_text(Ns::Pm, "Source", s);
            }
            write_range(w, "MaxLimits", max_limits);
        }
        _ => {}
    }
}

fn write_metric_value(w: &mut XmlWriter, mv: &MetricValue) {
    w.start(Ns::Pm, "MetricValue");
    if let Some(v) = mv.value {
        w.attr("Value", &fmt_f64(v));
    }
    if let Some(t) = mv.determination_time {
        w.attr("DeterminationTime", &t.to_string());
    }
    w.attr("Validity", mv.validity.as_str());
    w.attr("Mode", mv.generation_mode.as_str());
    w.end();
}

fn write_string_metric_value(w: &mut XmlWriter, mv: &StringMetricValue) {
    w.start(Ns::Pm, "MetricValue");
    if let Some(v) = &mv.value {
        w.attr("Value", v);
    }
    if let Some(t) = mv.determination_time {
        w.attr("DeterminationTime", &t.to_string());
    }
    w.attr("Validity", mv.validity.as_str());
    w.attr("Mode", mv.generation_mode.as_str());
    w.end();
}

fn write_sample_array_value(w: &mut XmlWriter, sv: &SampleArrayValue) {
    w.start(Ns::Pm, "MetricValue");
    let joined =
        sv.samples.iter().map(|s| fmt_f64(*s)).collect::<Vec<_>>().join(" ");
    w.attr("Samples", &joined);
    if let Some(t) = sv.determination_time {
        w.attr("DeterminationTime", &t.to_string());
    }
    w.attr("Validity", sv.validity.as_str());
    w.attr("Mode", sv.generation_mode.as_str());
    w.end();
}

fn write_identification(w: &mut XmlWriter, id: &InstanceIdentifier) {
    w.start(Ns::Pm, "Identification");
    if let Some(root) = &id.root {
        w.attr("Root", root);
    }
    if let Some(ext) = &id.extension {
        w.attr("Extension", ext);
    }
    w.end();
}

/// `xsi:type` value for a state shape.
fn state_xsi_type(body: &StateBody) -> &'static str {
    match body {
        StateBody::NumericMetric { .. } => "pm:NumericMetricState",
        StateBody::StringMetric { .. } => "pm:StringMetricState",
        StateBody::EnumStringMetric { .. } => "pm:EnumStringMetricState",
        StateBody::SampleArrayMetric { .. } => "pm:RealTimeSampleArrayMetricState",
        StateBody::Component { .. } => "pm:ComponentState",
        StateBody::AlertSystem { .. } => "pm:AlertSystemState",
        StateBody::AlertCondition { limits: Some(_), .. } => "pm:LimitAlertConditionState",
        StateBody::AlertCondition { .. } => "pm:AlertConditionState",
        StateBody::AlertSignal { .. } => "pm:AlertSignalState",
        StateBody::Operation { .. } => "pm:OperationState",
        StateBody::Context { .. } => "pm:ContextState",
    }
}

/// Serialize one complete state element.
pub fn write_state(w: &mut XmlWriter, s: &State) {
    w.start(Ns::Pm, "State");
    w.attr_qualified(Ns::Xsi, "type", state_xsi_type(&s.body));
    w.attr("DescriptorHandle", &s.descriptor_handle);
    if let Some(h) = &s.handle {
        w.attr("Handle", h);
    }
    w.attr("StateVersion", &s.state_version.to_string());
    w.attr("DescriptorVersion", &s.descriptor_version.to_string());

    match &s.body {
        StateBody::NumericMetric { activation, .. }
        | StateBody::StringMetric { activation, .. }
        | StateBody::EnumStringMetric { activation, .. }
        | StateBody::SampleArrayMetric { activation, .. } => {
            w.attr("ActivationState", activation.as_str());
        }
        StateBody::Component { activation, operating_hours, operating_cycles } => {
            w.attr("ActivationState", activation.as_str());
            if let Some(h) = operating_hours {
                w.attr("OperatingHours", &h.to_string());
            }
            if let Some(c) = operating_cycles {
                w.attr("OperatingCycles", &c.to_string());
            }
        }
        StateBody::AlertSystem {
            activation,
            last_self_check,
            self_check_count,
            present_physiological_conditions,
            present_technical_conditions,
            ..
        } => {
            w.attr("ActivationState", activation.as_str());
            if let Some(t) = last_self_check {
                w.attr("LastSelfCheck", &t.to_string());
            }
            w.attr("SelfCheckCount", &self_check_count.to_string());
            if !present_physiological_conditions.is_empty() {
                w.attr(
                    "PresentPhysiologicalAlarmConditions",
                    &present_physiological_conditions.join(" "),
                );
            }
            if !present_technical_conditions.is_empty() {
                w.attr(
                    "PresentTechnologicalAlarmConditions",
                    &present_technical_conditions.join(" "),
                );
            }
        }
        StateBody::AlertCondition { activation, presence, determination_time, actual_priority, .. } => {
            w.attr("ActivationState", activation.as_str());
            w.attr("Presence", if *presence { "true" } else { "false" });
            if let Some(t) = determination_time {
                w.attr("DeterminationTime", &t.to_string());
            }
            if let Some(p) = actual_priority {
                w.attr("ActualPriority", p.as_str());
            }
        }
        StateBody::AlertSignal { activation, presence, location } => {
            w.attr("ActivationState", activation.as_str());
            w.attr("Presence", presence.as_str());
            w.attr("Location", location.as_str());
        }
        StateBody::Operation { operating_mode } => {
            w.attr("OperatingMode", operating_mode.as_str());
        }
        StateBody::Context {
            association,
            binding_mdib_version,
            unbinding_mdib_version,
            binding_start,
            binding_end,
            ..
        } => {
            w.attr("ContextAssociation", association.as_str());
            if let Some(v) = binding_mdib_version {
                w.attr("BindingMdibVersion", &v.to_string());
            }
            if let Some(v) = unbinding_mdib_version {
                w.attr("UnbindingMdibVersion", &v.to_string());
            }
            if let Some(t) = binding_start {
                w.attr("BindingStartTime", &t.to_string());
            }
            if let Some(t) = binding_end {
                w.attr("BindingEndTime", &t.to_string());
            }
        }
    }

    write_extensions(w, &s.extensions);

    match &s.body {
        StateBody::NumericMetric { value, physiological_range, .. } => {
            if let Some(mv) = value {
                write_metric_value(w, mv);
            }
            for r in physiological_range {
                write_range(w, "PhysiologicalRange", r);
            }
        }
        StateBody::StringMetric { value, .. } | StateBody::EnumStringMetric { value, .. } => {
            if let Some(mv) = value {
                write_string_metric_value(w, mv);
            }
        }
        StateBody::SampleArrayMetric { samples, .. } => {
            if let Some(sv) = samples {
                write_sample_array_value(w, sv);
            }
        }
        StateBody::AlertSystem { system_signal_activations, .. } => {
            for ssa in system_signal_activations {
                w.start(Ns::Pm, "SystemSignalActivation");
                w.attr("Manifestation", ssa.manifestation.as_str());
                w.attr("State", ssa.state.as_str());
                w.end();
            }
        }
        StateBody::AlertCondition { limits: Some(l), .. } => {
            write_range(w, "Limits", l);
        }
        StateBody::Context { identifications, .. } => {
            for id in identifications {
                write_identification(w, id);
            }
        }
        _ => {}
    }

    w.end();
}
