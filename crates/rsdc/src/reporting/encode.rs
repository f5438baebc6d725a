// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Report message bodies: serialization for the provider side, parsing for
//! the consumer side.

use super::{OperationInvokedInfo, ReportAction, ReportItem, ReportPayload};
use crate::biceps::pm::{InvocationError, InvocationState};
use crate::biceps::qname::{child, children, is, Ns};
use crate::biceps::xml::{
    descriptor_from_node, is_descriptor_element, state_from_node, write_descriptor_open,
    write_state, DecodeError, XmlWriter,
};
use crate::biceps::{Descriptor, Handle, State};
use crate::mdib::MdibVersionGroup;
use crate::soap::{encode_envelope, Headers};
use roxmltree::Node;

fn write_version_attrs(w: &mut XmlWriter, v: &MdibVersionGroup) {
    w.attr("MdibVersion", &v.mdib_version.to_string());
    w.attr("SequenceId", &v.sequence_id);
    w.attr("InstanceId", &v.instance_id.to_string());
}

fn write_invocation_info(w: &mut XmlWriter, info: &OperationInvokedInfo) {
    w.start(Ns::Msg, "ReportPart");
    w.attr("OperationHandleRef", &info.operation_handle);
    w.start(Ns::Msg, "InvocationInfo");
    w.attr("TransactionId", &info.transaction_id.to_string());
    w.attr("InvocationState", info.invocation_state.as_str());
    if let Some(error) = info.error {
        w.leaf_text(Ns::Msg, "InvocationError", error.as_str());
    }
    if let Some(msg) = &info.error_message {
        w.leaf_text(Ns::Msg, "InvocationErrorMessage", msg);
    }
    w.end();
    w.end();
}

/// Serialize one report item as a notification envelope addressed to
/// `notify_to`, tagged with the subscription identifier.
#[must_use]
pub fn encode_notification(item: &ReportItem, notify_to: &str, subscription_id: &str) -> String {
    let mut headers = Headers::request(item.action.uri(), notify_to);
    headers.reply_to = None;
    headers.identifier = Some(subscription_id.to_string());
    encode_envelope(&headers, |w| {
        w.start(Ns::Msg, item.action.element_name());
        write_version_attrs(w, &item.version);
        match &item.payload {
            ReportPayload::States(states) => {
                w.start(Ns::Msg, "ReportPart");
                for s in states {
                    write_state(w, s);
                }
                w.end();
            }
            ReportPayload::Description { created, updated, removed, states } => {
                if !created.is_empty() {
                    w.start(Ns::Msg, "ReportPart");
                    w.attr("ModificationType", "Crt");
                    for d in created {
                        write_descriptor_open(w, d, true);
                        w.end();
                    }
                    for s in states.iter().filter(|s| {
                        created.iter().any(|d| d.handle == s.descriptor_handle)
                    }) {
                        write_state(w, s);
                    }
                    w.end();
                }
                if !updated.is_empty() {
                    w.start(Ns::Msg, "ReportPart");
                    w.attr("ModificationType", "Upt");
                    for d in updated {
                        write_descriptor_open(w, d, true);
                        w.end();
                    }
                    for s in states.iter().filter(|s| {
                        updated.iter().any(|d| d.handle == s.descriptor_handle)
                    }) {
                        write_state(w, s);
                    }
                    w.end();
                }
                if !removed.is_empty() {
                    w.start(Ns::Msg, "ReportPart");
                    w.attr("ModificationType", "Del");
                    for d in removed {
                        write_descriptor_open(w, d, true);
                        w.end();
                    }
                    w.end();
                }
            }
            ReportPayload::OperationInvoked(info) => {
                write_invocation_info(w, info);
            }
            ReportPayload::SystemError(text) => {
                w.start(Ns::Msg, "ReportPart");
                w.leaf_text(Ns::Msg, "ErrorInfo", text);
                w.end();
            }
        }
        w.end();
    })
}

/// A report as decoded by the consumer.
#[derive(Debug, Clone)]
pub enum DecodedReport {
    States {
        action: ReportAction,
        version: MdibVersionGroup,
        states: Vec<State>,
    },
    Description {
        version: MdibVersionGroup,
        created: Vec<Descriptor>,
        updated: Vec<Descriptor>,
        removed: Vec<Handle>,
        states: Vec<State>,
    },
    OperationInvoked {
        version: MdibVersionGroup,
        info: OperationInvokedInfo,
    },
    SystemError {
        version: MdibVersionGroup,
        text: String,
    },
}

fn version_group_from(node: Node<'_, '_>) -> Result<MdibVersionGroup, DecodeError> {
    Ok(MdibVersionGroup {
        mdib_version: crate::biceps::xml::parse_opt_attr(node, "MdibVersion")?.unwrap_or(0),
        sequence_id: node.attribute("SequenceId").unwrap_or_default().to_string(),
        instance_id: crate::biceps::xml::parse_opt_attr(node, "InstanceId")?.unwrap_or(0),
    })
}

fn states_of_part(part: Node<'_, '_>) -> Result<Vec<State>, DecodeError> {
    children(part, Ns::Pm, "State").map(state_from_node).collect()
}

fn invocation_info_from(part: Node<'_, '_>) -> Result<OperationInvokedInfo, DecodeError> {
    let info = child(part, Ns::Msg, "InvocationInfo").ok_or_else(|| {
        DecodeError::SchemaViolation {
            xpath: crate::biceps::xml::xpath_of(part),
            detail: "missing msg:InvocationInfo".to_string(),
        }
    })?;
    let state_raw = info.attribute("InvocationState").unwrap_or_default();
    let invocation_state =
        InvocationState::parse_wire(state_raw).ok_or_else(|| DecodeError::SchemaViolation {
            xpath: crate::biceps::xml::xpath_of(info),
            detail: format!("unknown InvocationState \"{}\"", state_raw),
        })?;
    Ok(OperationInvokedInfo {
        transaction_id: info.attribute("TransactionId").and_then(|v| v.parse().ok()).unwrap_or(0),
        operation_handle: part.attribute("OperationHandleRef").unwrap_or_default().to_string(),
        invocation_state,
        error: child(info, Ns::Msg, "InvocationError")
            .and_then(|e| e.text())
            .and_then(|t| InvocationError::parse_wire(t.trim())),
        error_message: child(info, Ns::Msg, "InvocationErrorMessage")
            .and_then(|e| e.text())
            .map(|t| t.trim().to_string()),
    })
}

/// Parse a notification body (the element inside `s12:Body`).
pub fn decode_report(action_uri: &str, body: Node<'_, '_>) -> Result<DecodedReport, DecodeError> {
    let action = ReportAction::from_uri(action_uri).ok_or_else(|| DecodeError::SchemaViolation {
        xpath: "/".to_string(),
        detail: format!("unknown report action \"{}\"", action_uri),
    })?;
    if !is(body, Ns::Msg, action.element_name()) {
        return Err(DecodeError::SchemaViolation {
            xpath: crate::biceps::xml::xpath_of(body),
            detail: format!("expected msg:{}", action.element_name()),
        });
    }
    let version = version_group_from(body)?;

    match action {
        ReportAction::DescriptionModificationReport => {
            let mut created = Vec::new();
            let mut updated = Vec::new();
            let mut removed = Vec::new();
            let mut states = Vec::new();
            for part in children(body, Ns::Msg, "ReportPart") {
                let mtype = part.attribute("ModificationType").unwrap_or("Upt");
                for el in part.children().filter(|c| is_descriptor_element(*c)) {
                    let d = descriptor_from_node(el, None)?;
                    match mtype {
                        "Crt" => created.push(d),
                        "Del" => removed.push(d.handle),
                        _ => updated.push(d),
                    }
                }
                states.extend(states_of_part(part)?);
            }
            Ok(DecodedReport::Description { version, created, updated, removed, states })
        }
        ReportAction::OperationInvokedReport => {
            let part = child(body, Ns::Msg, "ReportPart").ok_or_else(|| {
                DecodeError::SchemaViolation {
                    xpath: crate::biceps::xml::xpath_of(body),
                    detail: "missing msg:ReportPart".to_string(),
                }
            })?;
            Ok(DecodedReport::OperationInvoked { version, info: invocation_info_from(part)? })
        }
        ReportAction::SystemErrorReport => {
            let text = child(body, Ns::Msg, "ReportPart")
                .and_then(|p| child(p, Ns::Msg, "ErrorInfo"))
                .and_then(|e| e.text())
                .map(|t| t.trim().to_string())
                .unwrap_or_default();
            Ok(DecodedReport::SystemError { version, text })
        }
        _ => {
            let mut states = Vec::new();
            for part in children(body, Ns::Msg, "ReportPart") {
                states.extend(states_of_part(part)?);
            }
            Ok(DecodedReport::States { action, version, states })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biceps::pm::{ComponentActivation, MetricValue};
    use crate::biceps::StateBody;
    use crate::soap::{body_element, decode_envelope};
    use std::sync::Arc;

    fn version() -> MdibVersionGroup {
        MdibVersionGroup {
            mdib_version: 7,
            sequence_id: "urn:uuid:seq".to_string(),
            instance_id: 5,
        }
    }

    fn metric_state(handle: &str, value: f64) -> State {
        let mut s = State::new(
            handle,
            StateBody::NumericMetric {
                activation: ComponentActivation::On,
                value: Some(MetricValue {
                    value: Some(value),
                    determination_time: Some(1_700_000_000_000),
                    ..MetricValue::measured(value)
                }),
                physiological_range: Vec::new(),
            },
        );
        s.state_version = 3;
        s
    }

    #[test]
    fn metric_report_roundtrip() {
        let item = ReportItem {
            action: ReportAction::EpisodicMetricReport,
            version: version(),
            payload: ReportPayload::States(vec![Arc::new(metric_state("nm0", 37.0))]),
        };
        let xml = encode_notification(&item, "http://consumer/notify", "urn:uuid:sub1");
        let msg = decode_envelope(&xml).expect("decodes");
        assert_eq!(msg.headers.identifier.as_deref(), Some("urn:uuid:sub1"));
        let doc = msg.document().expect("re-parses");
        let body = body_element(&doc).expect("report body");
        match decode_report(&msg.headers.action, body).expect("report decodes") {
            DecodedReport::States { action, version, states } => {
                assert_eq!(action, ReportAction::EpisodicMetricReport);
                assert_eq!(version.mdib_version, 7);
                assert_eq!(states.len(), 1);
                assert_eq!(states[0].numeric_value(), Some(37.0));
                assert_eq!(states[0].state_version, 3);
            }
            other => panic!("unexpected report {:?}", other),
        }
    }

    #[test]
    fn operation_invoked_roundtrip() {
        let info = OperationInvokedInfo {
            transaction_id: 42,
            operation_handle: "op1".to_string(),
            invocation_state: InvocationState::Failed,
            error: Some(InvocationError::InvalidValue),
            error_message: Some("value out of range".to_string()),
        };
        let item = ReportItem {
            action: ReportAction::OperationInvokedReport,
            version: version(),
            payload: ReportPayload::OperationInvoked(info.clone()),
        };
        let xml = encode_notification(&item, "http://consumer/notify", "urn:uuid:sub1");
        let msg = decode_envelope(&xml).expect("decodes");
        let doc = msg.document().expect("re-parses");
        let body = body_element(&doc).expect("report body");
        match decode_report(&msg.headers.action, body).expect("report decodes") {
            DecodedReport::OperationInvoked { info: back, .. } => assert_eq!(back, info),
            other => panic!("unexpected report {:?}", other),
        }
    }

    #[test]
    fn description_report_roundtrip() {
        use crate::biceps::{Descriptor, DescriptorBody};
        let removed = Descriptor::new("nm0", Some("ch0"), DescriptorBody::Mds);
        let item = ReportItem {
            action: ReportAction::DescriptionModificationReport,
            version: version(),
            payload: ReportPayload::Description {
                created: Vec::new(),
                updated: Vec::new(),
                removed: vec![Arc::new(removed)],
                states: Vec::new(),
            },
        };
        let xml = encode_notification(&item, "http://consumer/notify", "urn:uuid:sub1");
        let msg = decode_envelope(&xml).expect("decodes");
        let doc = msg.document().expect("re-parses");
        let body = body_element(&doc).expect("report body");
        match decode_report(&msg.headers.action, body).expect("report decodes") {
            DecodedReport::Description { removed, .. } => {
                assert_eq!(removed, vec!["nm0".to_string()]);
            }
            other => panic!("unexpected report {:?}", other),
        }
    }
}
