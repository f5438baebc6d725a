// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Parsers for descriptors and states.

use crate::biceps::pm::{
    AlertActivation, AlertConditionKind, AlertConditionPriority, AlertSignalLocation,
    AlertSignalManifestation, AlertSignalPresence, CodedValue, ComponentActivation,
    ContextAssociation, GenerationMode, InstanceIdentifier, MetricAvailability, MetricCategory,
    MetricValue, OperatingMode, Range, SafetyClassification, SampleArrayValue, StringMetricValue,
    SystemSignalActivation, Validity,
};
use crate::biceps::qname::{child, children, is, Ns};
use crate::biceps::{
    Descriptor, DescriptorBody, Extensions, MetricQualities, State, StateBody,
};

use super::{
    enum_attr, enum_attr_opt, enum_attr_or, parse_opt_attr, parse_req_attr, req_attr, violation,
    DecodeError,
};
use roxmltree::Node;

/// Element names that denote a descriptor in the containment tree.
const DESCRIPTOR_ELEMENTS: [&str; 16] = [
    "Mds",
    "Vmd",
    "Channel",
    "Battery",
    "Clock",
    "Sco",
    "SystemContext",
    "PatientContext",
    "LocationContext",
    "EnsembleContext",
    "WorkflowContext",
    "MeansContext",
    "OperatorContext",
    "Metric",
    "Operation",
    "AlertSystem",
];

/// True when `node` is a descriptor element (including alert children).
#[must_use]
pub fn is_descriptor_element(node: Node<'_, '_>) -> bool {
    if !node.is_element() || node.tag_name().namespace() != Some(Ns::Pm.uri()) {
        return false;
    }
    let name = node.tag_name().name();
    DESCRIPTOR_ELEMENTS.contains(&name) || name == "AlertCondition" || name == "AlertSignal"
}

/// Resolve the local part of an `xsi:type` value, honoring whatever prefix
/// the producer bound to the participant-model namespace.
fn xsi_type_local<'a>(node: Node<'a, '_>) -> Result<Option<&'a str>, DecodeError> {
    let Some(raw) = node.attribute((Ns::Xsi.uri(), "type")) else {
        return Ok(None);
    };
    let (prefix, local) = match raw.split_once(':') {
        Some((p, l)) => (Some(p), l),
        None => (None, raw),
    };
    let uri = node.lookup_namespace_uri(prefix);
    if uri != Some(Ns::Pm.uri()) {
        return Err(violation(node, format!("xsi:type \"{}\" is not a participant-model type", raw)));
    }
    Ok(Some(local))
}

fn extensions_from(node: Node<'_, '_>) -> Extensions {
    let Some(holder) = child(node, Ns::Ext, "Extension") else {
        return Extensions::default();
    };
    let source = node.document().input_text();
    let raw = holder
        .children()
        .filter(Node::is_element)
        .map(|c| source[c.range()].to_string())
        .collect();
    Extensions(raw)
}

fn coded_value_from(node: Node<'_, '_>) -> Result<CodedValue, DecodeError> {
    Ok(CodedValue {
        code: req_attr(node, "Code")?.to_string(),
        coding_system: node.attribute("CodingSystem").map(str::to_string),
        coding_system_version: node.attribute("CodingSystemVersion").map(str::to_string),
    })
}

fn range_from(node: Node<'_, '_>) -> Result<Range, DecodeError> {
    Ok(Range {
        lower: parse_opt_attr(node, "Lower")?,
        upper: parse_opt_attr(node, "Upper")?,
    })
}

fn bool_attr(node: Node<'_, '_>, name: &str, default: bool) -> Result<bool, DecodeError> {
    match node.attribute(name) {
        None => Ok(default),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => Err(violation(node, format!("attribute {}=\"{}\" is not a boolean", name, other))),
    }
}

fn unit_from(node: Node<'_, '_>) -> Result<CodedValue, DecodeError> {
    match child(node, Ns::Pm, "Unit") {
        Some(u) => coded_value_from(u),
        None => Err(violation(node, "metric descriptor without pm:Unit")),
    }
}

fn qualities_from(node: Node<'_, '_>) -> Result<MetricQualities, DecodeError> {
    Ok(MetricQualities {
        unit: unit_from(node)?,
        category: enum_attr(node, "MetricCategory", MetricCategory::parse_wire)?,
        availability: enum_attr(node, "MetricAvailability", MetricAvailability::parse_wire)?,
        determination_period_ms: parse_opt_attr(node, "DeterminationPeriod")?,
    })
}

fn sources_from(node: Node<'_, '_>) -> Vec<String> {
    children(node, Ns::Pm, "Source")
        .filter_map(|s| s.text())
        .map(|t| t.trim().to_string())
        .collect()
}

fn modifiable_from(node: Node<'_, '_>) -> Vec<String> {
    children(node, Ns::Pm, "ModifiableData")
        .filter_map(|s| s.text())
        .map(|t| t.trim().to_string())
        .collect()
}

fn descriptor_body_from(node: Node<'_, '_>) -> Result<DescriptorBody, DecodeError> {
    let name = node.tag_name().name();
    let body = match name {
        "Mds" => DescriptorBody::Mds,
        "Vmd" => DescriptorBody::Vmd,
        "Channel" => DescriptorBody::Channel,
        "Battery" => DescriptorBody::Battery,
        "Clock" => DescriptorBody::Clock,
        "Sco" => DescriptorBody::Sco,
        "SystemContext" => DescriptorBody::SystemContext,
        "PatientContext" => DescriptorBody::PatientContext,
        "LocationContext" => DescriptorBody::LocationContext,
        "EnsembleContext" => DescriptorBody::EnsembleContext,
        "WorkflowContext" => DescriptorBody::WorkflowContext,
        "MeansContext" => DescriptorBody::MeansContext,
        "OperatorContext" => DescriptorBody::OperatorContext,
        "AlertSystem" => DescriptorBody::AlertSystem {
            self_check_period_ms: parse_opt_attr(node, "SelfCheckPeriod")?,
            max_physiological_parallel_alarms: parse_opt_attr(
                node,
                "MaxPhysiologicalParallelAlarms",
            )?,
            max_technical_parallel_alarms: parse_opt_attr(node, "MaxTechnicalParallelAlarms")?,
        },
        "AlertCondition" => {
            let kind = enum_attr(node, "Kind", AlertConditionKind::parse_wire)?;
            let priority = enum_attr(node, "Priority", AlertConditionPriority::parse_wire)?;
            let sources = sources_from(node);
            match xsi_type_local(node)? {
                Some("LimitAlertConditionDescriptor") => {
                    let max_limits = match child(node, Ns::Pm, "MaxLimits") {
                        Some(l) => range_from(l)?,
                        None => Range::default(),
                    };
                    DescriptorBody::LimitAlertCondition {
                        kind,
                        priority,
                        sources,
                        max_limits,
                        auto_limit_supported: bool_attr(node, "AutoLimitSupported", false)?,
                    }
                }
                _ => DescriptorBody::AlertCondition { kind, priority, sources },
            }
        }
        "AlertSignal" => DescriptorBody::AlertSignal {
            condition_signaled: node.attribute("ConditionSignaled").map(str::to_string),
            manifestation: enum_attr(node, "Manifestation", AlertSignalManifestation::parse_wire)?,
            latching: bool_attr(node, "Latching", false)?,
            delegation_supported: bool_attr(node, "SignalDelegationSupported", false)?,
        },
        "Metric" => {
            let xsi = xsi_type_local(node)?
                .ok_or_else(|| violation(node, "pm:Metric without xsi:type"))?;
            match xsi {
                "NumericMetricDescriptor" => DescriptorBody::NumericMetric {
                    qualities: qualities_from(node)?,
                    resolution: parse_req_attr(node, "Resolution")?,
                    technical_range: children(node, Ns::Pm, "TechnicalRange")
                        .map(range_from)
                        .collect::<Result<_, _>>()?,
                },
                "StringMetricDescriptor" => {
                    DescriptorBody::StringMetric { qualities: qualities_from(node)? }
                }
                "EnumStringMetricDescriptor" => DescriptorBody::EnumStringMetric {
                    qualities: qualities_from(node)?,
                    allowed_values: children(node, Ns::Pm, "AllowedValue")
                        .filter_map(|av| child(av, Ns::Pm, "Value"))
                        .filter_map(|v| v.text())
                        .map(|t| t.trim().to_string())
                        .collect(),
                },
                "RealTimeSampleArrayMetricDescriptor" => {
                    DescriptorBody::RealTimeSampleArrayMetric {
                        qualities: qualities_from(node)?,
                        resolution: parse_req_attr(node, "Resolution")?,
                        sample_period_ms: parse_req_attr(node, "SamplePeriod")?,
                    }
                }
                other => {
                    return Err(violation(node, format!("unknown metric type \"{}\"", other)))
                }
            }
        }
        "Operation" => {
            let xsi = xsi_type_local(node)?
                .ok_or_else(|| violation(node, "pm:Operation without xsi:type"))?;
            let target = req_attr(node, "OperationTarget")?.to_string();
            match xsi {
                "SetValueOperationDescriptor" => DescriptorBody::SetValueOperation { target },
                "SetStringOperationDescriptor" => DescriptorBody::SetStringOperation {
                    target,
                    max_length: parse_opt_attr(node, "MaxLength")?,
                },
                "ActivateOperationDescriptor" => DescriptorBody::ActivateOperation { target },
                "SetContextStateOperationDescriptor" => {
                    DescriptorBody::SetContextStateOperation { target }
                }
                "SetMetricStateOperationDescriptor" => DescriptorBody::SetMetricStateOperation {
                    target,
                    modifiable_data: modifiable_from(node),
                },
                "SetComponentStateOperationDescriptor" => {
                    DescriptorBody::SetComponentStateOperation {
                        target,
                        modifiable_data: modifiable_from(node),
                    }
                }
                "SetAlertStateOperationDescriptor" => DescriptorBody::SetAlertStateOperation {
                    target,
                    modifiable_data: modifiable_from(node),
                },
                other => {
                    return Err(violation(node, format!("unknown operation type \"{}\"", other)))
                }
            }
        }
        other => return Err(violation(node, format!("unknown descriptor element \"{}\"", other))),
    };
    Ok(body)
}

/// Parse one descriptor element.
///
/// `parent` is the containment parent from the tree walk; an explicit
/// `ParentHandle` attribute (flat serializations) takes precedence.
pub fn descriptor_from_node(
    node: Node<'_, '_>,
    parent: Option<&str>,
) -> Result<Descriptor, DecodeError> {
    if node.tag_name().namespace() != Some(Ns::Pm.uri()) {
        return Err(violation(node, "descriptor element outside the participant-model namespace"));
    }
    let body = descriptor_body_from(node)?;
    Ok(Descriptor {
        handle: req_attr(node, "Handle")?.to_string(),
        parent: node
            .attribute("ParentHandle")
            .map(str::to_string)
            .or_else(|| parent.map(str::to_string)),
        version: parse_req_attr(node, "DescriptorVersion")?,
        type_code: match child(node, Ns::Pm, "Type") {
            Some(t) => Some(coded_value_from(t)?),
            None => None,
        },
        safety_classification: enum_attr_or(
            node,
            "SafetyClassification",
            SafetyClassification::parse_wire,
            SafetyClassification::Informational,
        )?,
        body,
        extensions: extensions_from(node),
    })
}

fn metric_value_from(node: Node<'_, '_>) -> Result<MetricValue, DecodeError> {
    Ok(MetricValue {
        value: parse_opt_attr(node, "Value")?,
        determination_time: parse_opt_attr(node, "DeterminationTime")?,
        validity: enum_attr_or(node, "Validity", Validity::parse_wire, Validity::Valid)?,
        generation_mode: enum_attr_or(node, "Mode", GenerationMode::parse_wire, GenerationMode::Real)?,
    })
}

fn string_metric_value_from(node: Node<'_, '_>) -> Result<StringMetricValue, DecodeError> {
    Ok(StringMetricValue {
        value: node.attribute("Value").map(str::to_string),
        determination_time: parse_opt_attr(node, "DeterminationTime")?,
        validity: enum_attr_or(node, "Validity", Validity::parse_wire, Validity::Valid)?,
        generation_mode: enum_attr_or(node, "Mode", GenerationMode::parse_wire, GenerationMode::Real)?,
    })
}

fn sample_array_value_from(node: Node<'_, '_>) -> Result<SampleArrayValue, DecodeError> {
    let raw = req_attr(node, "Samples")?;
    let samples = raw
        .split_ascii_whitespace()
        .map(|s| {
            s.parse::<f64>()
                .map_err(|_| violation(node, format!("sample \"{}\" is not a number", s)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SampleArrayValue {
        samples,
        determination_time: parse_opt_attr(node, "DeterminationTime")?,
        validity: enum_attr_or(node, "Validity", Validity::parse_wire, Validity::Valid)?,
        generation_mode: enum_attr_or(node, "Mode", GenerationMode::parse_wire, GenerationMode::Real)?,
    })
}

fn handle_list(node: Node<'_, '_>, name: &str) -> Vec<String> {
    node.attribute(name)
        .map(|raw| raw.split_ascii_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn state_body_from(node: Node<'_, '_>, xsi: &str) -> Result<StateBody, DecodeError> {
    let activation =
        || enum_attr_or(node, "ActivationState", ComponentActivation::parse_wire, ComponentActivation::On);
    let alert_activation =
        || enum_attr_or(node, "ActivationState", AlertActivation::parse_wire, AlertActivation::On);

    let body = match xsi {
        "NumericMetricState" => StateBody::NumericMetric {
            activation: activation()?,
            value: match child(node, Ns::Pm, "MetricValue") {
                Some(mv) => Some(metric_value_from(mv)?),
                None => None,
            },
            physiological_range: children(node, Ns::Pm, "PhysiologicalRange")
                .map(range_from)
                .collect::<Result<_, _>>()?,
        },
        "StringMetricState" => StateBody::StringMetric {
            activation: activation()?,
            value: match child(node, Ns::Pm, "MetricValue") {
                Some(mv) => Some(string_metric_value_from(mv)?),
                None => None,
            },
        },
        "EnumStringMetricState" => StateBody::EnumStringMetric {
            activation: activation()?,
            value: match child(node, Ns::Pm, "MetricValue") {
                Some(mv) => Some(string_metric_value_from(mv)?),
                None => None,
            },
        },
        "RealTimeSampleArrayMetricState" => StateBody::SampleArrayMetric {
            activation: activation()?,
            samples: match child(node, Ns::Pm, "MetricValue") {
                Some(mv) => Some(sample_array_value_from(mv)?),
                None => None,
            },
        },
        "ComponentState" => StateBody::Component {
            activation: activation()?,
            operating_hours: parse_opt_attr(node, "OperatingHours")?,
            operating_cycles: parse_opt_attr(node, "OperatingCycles")?,
        },
        "AlertSystemState" => StateBody::AlertSystem {
            activation: alert_activation()?,
            last_self_check: parse_opt_attr(node, "LastSelfCheck")?,
            self_check_count: parse_opt_attr(node, "SelfCheckCount")?.unwrap_or(0),
            present_physiological_conditions: handle_list(
                node,
                "PresentPhysiologicalAlarmConditions",
            ),
            present_technical_conditions: handle_list(node, "PresentTechnologicalAlarmConditions"),
            system_signal_activations: children(node, Ns::Pm, "SystemSignalActivation")
                .map(|ssa| {
                    Ok(SystemSignalActivation {
                        manifestation: enum_attr(
                            ssa,
                            "Manifestation",
                            AlertSignalManifestation::parse_wire,
                        )?,
                        state: enum_attr(ssa, "State", AlertActivation::parse_wire)?,
                    })
                })
                .collect::<Result<_, DecodeError>>()?,
        },
        "AlertConditionState" | "LimitAlertConditionState" => StateBody::AlertCondition {
            activation: alert_activation()?,
            presence: bool_attr(node, "Presence", false)?,
            determination_time: parse_opt_attr(node, "DeterminationTime")?,
            actual_priority: enum_attr_opt(node, "ActualPriority", AlertConditionPriority::parse_wire)?,
            limits: match child(node, Ns::Pm, "Limits") {
                Some(l) => Some(range_from(l)?),
                None if xsi == "LimitAlertConditionState" => Some(Range::default()),
                None => None,
            },
        },
        "AlertSignalState" => StateBody::AlertSignal {
            activation: alert_activation()?,
            presence: enum_attr_or(node, "Presence", AlertSignalPresence::parse_wire, AlertSignalPresence::Off)?,
            location: enum_attr_or(node, "Location", AlertSignalLocation::parse_wire, AlertSignalLocation::Local)?,
        },
        "OperationState" => StateBody::Operation {
            operating_mode: enum_attr(node, "OperatingMode", OperatingMode::parse_wire)?,
        },
        "ContextState" => StateBody::Context {
            association: enum_attr_or(
                node,
                "ContextAssociation",
                ContextAssociation::parse_wire,
                ContextAssociation::NotAssociated,
            )?,
            binding_mdib_version: parse_opt_attr(node, "BindingMdibVersion")?,
            unbinding_mdib_version: parse_opt_attr(node, "UnbindingMdibVersion")?,
            binding_start: parse_opt_attr(node, "BindingStartTime")?,
            binding_end: parse_opt_attr(node, "BindingEndTime")?,
            identifications: children(node, Ns::Pm, "Identification")
                .map(|id| {
                    Ok(InstanceIdentifier {
                        root: id.attribute("Root").map(str::to_string),
                        extension: id.attribute("Extension").map(str::to_string),
                    })
                })
                .collect::<Result<_, DecodeError>>()?,
        },
        other => return Err(violation(node, format!("unknown state type \"{}\"", other))),
    };
    Ok(body)
}

/// Parse one `pm:State` element.
pub fn state_from_node(node: Node<'_, '_>) -> Result<State, DecodeError> {
    if !is(node, Ns::Pm, "State") {
        return Err(violation(node, "expected pm:State"));
    }
    let xsi = xsi_type_local(node)?.ok_or_else(|| violation(node, "pm:State without xsi:type"))?;
    let body = state_body_from(node, xsi)?;
    let handle = node.attribute("Handle").map(str::to_string);
    if matches!(body, StateBody::Context { .. }) && handle.is_none() {
        return Err(violation(node, "context state without instance Handle"));
    }
    Ok(State {
        descriptor_handle: req_attr(node, "DescriptorHandle")?.to_string(),
        handle,
        state_version: parse_req_attr(node, "StateVersion")?,
        descriptor_version: parse_req_attr(node, "DescriptorVersion")?,
        body,
        extensions: extensions_from(node),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biceps::xml::{write_descriptor_open, write_state, XmlWriter};
    use crate::biceps::Descriptor;

    fn parse_one(xml: &str) -> roxmltree::Document<'_> {
        roxmltree::Document::parse(xml).expect("well-formed test document")
    }

    fn encode_descriptor(d: &Descriptor) -> String {
        let mut w = XmlWriter::new();
        w.root(Ns::Pm, "Wrapper");
        write_descriptor_open(&mut w, d, true);
        w.end();
        w.end();
        w.finish()
    }

    fn encode_state(s: &State) -> String {
        let mut w = XmlWriter::new();
        w.root(Ns::Pm, "Wrapper");
        write_state(&mut w, s);
        w.end();
        w.finish()
    }

    #[test]
    fn numeric_metric_descriptor_roundtrip() {
        let d = Descriptor {
            handle: "nm0".into(),
            parent: Some("ch0".into()),
            version: 2,
            type_code: Some(CodedValue::new("150021")),
            safety_classification: SafetyClassification::MedicalClassA,
            body: DescriptorBody::NumericMetric {
                qualities: MetricQualities {
                    unit: CodedValue::new("268192"),
                    category: MetricCategory::Measurement,
                    availability: MetricAvailability::Continuous,
                    determination_period_ms: Some(1000),
                },
                resolution: 0.1,
                technical_range: vec![Range { lower: Some(0.0), upper: Some(500.0) }],
            },
            extensions: Extensions::default(),
        };
        let xml = encode_descriptor(&d);
        let doc = parse_one(&xml);
        let node = doc
            .descendants()
            .find(|n| is_descriptor_element(*n))
            .expect("descriptor element present");
        let back = descriptor_from_node(node, None).expect("decodes");
        assert_eq!(back, d);
    }

    #[test]
    fn context_state_roundtrip() {
        let s = State {
            descriptor_handle: "lc0".into(),
            handle: Some("lc0.bed12".into()),
            state_version: 4,
            descriptor_version: 1,
            body: StateBody::Context {
                association: ContextAssociation::Associated,
                binding_mdib_version: Some(17),
                unbinding_mdib_version: None,
                binding_start: Some(1_700_000_000_000),
                binding_end: None,
                identifications: vec![InstanceIdentifier {
                    root: Some("1.2.3".into()),
                    extension: Some("bed12".into()),
                }],
            },
            extensions: Extensions::default(),
        };
        let xml = encode_state(&s);
        let doc = parse_one(&xml);
        let node = doc
            .descendants()
            .find(|n| is(*n, Ns::Pm, "State"))
            .expect("state element present");
        let back = state_from_node(node).expect("decodes");
        assert_eq!(back, s);
    }

    #[test]
    fn unknown_enum_literal_is_schema_violation() {
        let xml = format!(
            r#"<pm:State xmlns:pm="{pm}" xmlns:xsi="{xsi}" xsi:type="pm:OperationState" DescriptorHandle="op0" StateVersion="0" DescriptorVersion="0" OperatingMode="Sometimes"/>"#,
            pm = Ns::Pm.uri(),
            xsi = Ns::Xsi.uri(),
        );
        let doc = parse_one(&xml);
        let err = state_from_node(doc.root_element()).expect_err("bad literal rejected");
        match err {
            DecodeError::SchemaViolation { detail, .. } => {
                assert!(detail.contains("Sometimes"), "detail: {}", detail);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn extension_elements_survive_roundtrip() {
        let xml = format!(
            r#"<pm:State xmlns:pm="{pm}" xmlns:ext="{ext}" xmlns:xsi="{xsi}" xsi:type="pm:OperationState" DescriptorHandle="op0" StateVersion="0" DescriptorVersion="0" OperatingMode="En"><ext:Extension><v:Custom xmlns:v="urn:vendor" flag="1">payload</v:Custom></ext:Extension></pm:State>"#,
            pm = Ns::Pm.uri(),
            ext = Ns::Ext.uri(),
            xsi = Ns::Xsi.uri(),
        );
        let doc = parse_one(&xml);
        let s = state_from_node(doc.root_element()).expect("decodes");
        assert_eq!(s.extensions.0.len(), 1);
        assert!(s.extensions.0[0].contains("urn:vendor"));
        // Re-encode and decode again: the raw element must be byte-identical.
        let re = encode_state(&s);
        let doc2 = parse_one(&re);
        let s2 = doc2
            .descendants()
            .find(|n| is(*n, Ns::Pm, "State"))
            .map(state_from_node)
            .expect("state element present")
            .expect("decodes");
        assert_eq!(s2.extensions, s.extensions);
    }
}
