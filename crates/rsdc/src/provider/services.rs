// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Hosted services: one HTTP path, total dispatch over the SOAP action set.
//!
//! Every mutation request is funneled into the SCO queue and answered
//! immediately with a transaction id; reads serialize the current snapshot.
//! Unknown actions are answered with an ActionNotSupported fault.

use super::sco::{OperationPayload, OperationRequest, ScoRuntime};
use super::{ThisDevice, ThisModel};
use crate::biceps::qname::{child, children, is, Ns};
use crate::biceps::xml::{state_from_node, XmlWriter};
use crate::biceps::State;
use crate::mdib::{
    encode_context_states_response, encode_get_mdib_response, encode_md_description_response,
    encode_md_state_response, MdibStore, MdibVersionGroup,
};
use crate::reporting::{SubscriptionError, SubscriptionManager};
use crate::soap::{
    action, body_element, decode_envelope, encode_envelope, format_duration_iso,
    parse_duration_iso, Headers, Message, SoapError, SoapFault,
};
use crate::transport::{Handler, HttpRequest, HttpResponse};
use parking_lot::RwLock;
use roxmltree::Node;
use std::sync::Arc;

const SOAP_CONTENT_TYPE: &str = "application/soap+xml";

/// Shared context of the hosted services.
pub(crate) struct ServiceCtx {
    pub epr: String,
    /// Absolute URL of the service endpoint (known after the HTTP bind).
    pub service_url: RwLock<String>,
    pub store: Arc<MdibStore>,
    pub subs: Arc<SubscriptionManager>,
    pub sco: Arc<ScoRuntime>,
    pub model: ThisModel,
    pub device: ThisDevice,
}

/// Build the HTTP handler for the provider's service path.
pub(crate) fn soap_handler(ctx: Arc<ServiceCtx>) -> Handler {
    Arc::new(move |req: &HttpRequest| handle_http(&ctx, req))
}

fn handle_http(ctx: &ServiceCtx, req: &HttpRequest) -> HttpResponse {
    let Ok(text) = std::str::from_utf8(&req.body) else {
        return fault_response(&SoapFault::sender("request body is not UTF-8"), None);
    };
    let msg = match decode_envelope(text) {
        Ok(m) => m,
        Err(SoapError::Fault(f)) => return fault_response(&f, None),
        Err(SoapError::Decode(e)) => {
            log::debug!("[services] dropped undecodable request: {}", e);
            return fault_response(&SoapFault::sender(&e.to_string()), None);
        }
    };
    let relates = msg.headers.message_id.clone();
    match dispatch(ctx, &msg) {
        Ok(envelope) => HttpResponse::ok(SOAP_CONTENT_TYPE, envelope.into_bytes()),
        Err(fault) => fault_response(&fault, Some(&relates)),
    }
}

fn fault_response(fault: &SoapFault, relates_to: Option<&str>) -> HttpResponse {
    let envelope = fault.to_envelope(relates_to);
    let mut resp = HttpResponse::ok(SOAP_CONTENT_TYPE, envelope.into_bytes());
    resp.status = fault.http_status();
    resp.reason = "Fault".to_string();
    resp
}

fn dispatch(ctx: &ServiceCtx, msg: &Message) -> Result<String, SoapFault> {
    let doc = msg
        .document()
        .map_err(|e| SoapFault::sender(&e.to_string()))?;
    let body = body_element(&doc);

    match msg.headers.action.as_str() {
        action::GET_MDIB => Ok(respond(
            &msg.headers,
            action::GET_MDIB_RESPONSE,
            &encode_get_mdib_response(&ctx.store.read_snapshot()),
        )),
        action::GET_MD_DESCRIPTION => Ok(respond(
            &msg.headers,
            action::GET_MD_DESCRIPTION_RESPONSE,
            &encode_md_description_response(&ctx.store.read_snapshot()),
        )),
        action::GET_MD_STATE => {
            let handles: Vec<String> = body
                .map(|b| {
                    children(b, Ns::Msg, "HandleRef")
                        .filter_map(|h| h.text())
                        .map(|t| t.trim().to_string())
                        .collect()
                })
                .unwrap_or_default();
            Ok(respond(
                &msg.headers,
                action::GET_MD_STATE_RESPONSE,
                &encode_md_state_response(&ctx.store.read_snapshot(), &handles),
            ))
        }
        action::GET_CONTEXT_STATES => Ok(respond(
            &msg.headers,
            action::GET_CONTEXT_STATES_RESPONSE,
            &encode_context_states_response(&ctx.store.read_snapshot()),
        )),
        action::SET_VALUE => {
            let body = required_body(body)?;
            let op = operation_handle(body)?;
            let value: f64 = text_child(body, Ns::Msg, "RequestedNumericValue")
                .ok_or_else(|| SoapFault::sender("missing msg:RequestedNumericValue"))?
                .parse()
                .map_err(|_| SoapFault::sender("RequestedNumericValue is not a number"))?;
            self_invoke(ctx, msg, "SetValueResponse", action::SET_VALUE_RESPONSE, OperationRequest {
                operation: op,
                payload: OperationPayload::SetValue(value),
            })
        }
        action::SET_STRING => {
            let body = required_body(body)?;
            let op = operation_handle(body)?;
            let value = text_child(body, Ns::Msg, "RequestedStringValue")
                .ok_or_else(|| SoapFault::sender("missing msg:RequestedStringValue"))?;
            self_invoke(ctx, msg, "SetStringResponse", action::SET_STRING_RESPONSE, OperationRequest {
                operation: op,
                payload: OperationPayload::SetString(value),
            })
        }
        action::ACTIVATE => {
            let body = required_body(body)?;
            let op = operation_handle(body)?;
            let args = children(body, Ns::Msg, "Argument")
                .filter_map(|a| child(a, Ns::Msg, "ArgValue"))
                .filter_map(|v| v.text())
                .map(|t| t.trim().to_string())
                .collect();
            self_invoke(ctx, msg, "ActivateResponse", action::ACTIVATE_RESPONSE, OperationRequest {
                operation: op,
                payload: OperationPayload::Activate(args),
            })
        }
        action::SET_CONTEXT_STATE => {
            let body = required_body(body)?;
            let op = operation_handle(body)?;
            let states = proposed_states(body)?;
            self_invoke(
                ctx,
                msg,
                "SetContextStateResponse",
                action::SET_CONTEXT_STATE_RESPONSE,
                OperationRequest { operation: op, payload: OperationPayload::SetContextState(states) },
            )
        }
        action::SET_METRIC_STATE => {
            let body = required_body(body)?;
            let op = operation_handle(body)?;
            let states = proposed_states(body)?;
            self_invoke(
                ctx,
                msg,
                "SetMetricStateResponse",
                action::SET_METRIC_STATE_RESPONSE,
                OperationRequest { operation: op, payload: OperationPayload::SetMetricState(states) },
            )
        }
        action::SET_COMPONENT_STATE => {
            let body = required_body(body)?;
            let op = operation_handle(body)?;
            let states = proposed_states(body)?;
            self_invoke(
                ctx,
                msg,
                "SetComponentStateResponse",
                action::SET_COMPONENT_STATE_RESPONSE,
                OperationRequest {
                    operation: op,
                    payload: OperationPayload::SetComponentState(states),
                },
            )
        }
        action::SET_ALERT_STATE => {
            let body = required_body(body)?;
            let op = operation_handle(body)?;
            let states = proposed_states(body)?;
            self_invoke(
                ctx,
                msg,
                "SetAlertStateResponse",
                action::SET_ALERT_STATE_RESPONSE,
                OperationRequest { operation: op, payload: OperationPayload::SetAlertState(states) },
            )
        }
        action::WSE_SUBSCRIBE => handle_subscribe(ctx, msg, body),
        action::WSE_RENEW => handle_renew(ctx, msg, body),
        action::WSE_GET_STATUS => handle_get_status(ctx, msg),
        action::WSE_UNSUBSCRIBE => handle_unsubscribe(ctx, msg),
        action::WXF_GET => Ok(handle_get_metadata(ctx, msg)),
        other => Err(SoapFault::action_not_supported(other)),
    }
}

fn required_body<'a, 'input>(
    body: Option<Node<'a, 'input>>,
) -> Result<Node<'a, 'input>, SoapFault> {
    body.ok_or_else(|| SoapFault::sender("empty s12:Body"))
}

fn text_child(node: Node<'_, '_>, ns: Ns, local: &str) -> Option<String> {
    child(node, ns, local)
        .and_then(|c| c.text())
        .map(|t| t.trim().to_string())
}

fn operation_handle(body: Node<'_, '_>) -> Result<String, SoapFault> {
    text_child(body, Ns::Msg, "OperationHandleRef")
        .ok_or_else(|| SoapFault::sender("missing msg:OperationHandleRef"))
}

fn proposed_states(body: Node<'_, '_>) -> Result<Vec<State>, SoapFault> {
    let mut out = Vec::new();
    for node in body.descendants().filter(|n| is(*n, Ns::Pm, "State")) {
        out.push(state_from_node(node).map_err(|e| SoapFault::sender(&e.to_string()))?);
    }
    Ok(out)
}

fn respond(request: &Headers, response_action: &str, body_xml: &str) -> String {
    let headers = Headers::response(request, response_action);
    encode_envelope(&headers, |w| w.raw(body_xml))
}

fn write_version_attrs(w: &mut XmlWriter, v: &MdibVersionGroup) {
    w.attr("MdibVersion", &v.mdib_version.to_string());
    w.attr("SequenceId", &v.sequence_id);
    w.attr("InstanceId", &v.instance_id.to_string());
}

/// Queue the invocation and answer with `Wait` plus the transaction id.
fn self_invoke(
    ctx: &ServiceCtx,
    msg: &Message,
    response_element: &'static str,
    response_action: &str,
    request: OperationRequest,
) -> Result<String, SoapFault> {
    let transaction_id = ctx.sco.invoke(request)?;
    let version = ctx.store.version_group();
    let headers = Headers::response(&msg.headers, response_action);
    Ok(encode_envelope(&headers, |w| {
        w.start(Ns::Msg, response_element);
        write_version_attrs(w, &version);
        w.start(Ns::Msg, "InvocationInfo");
        w.attr("TransactionId", &transaction_id.to_string());
        w.attr("InvocationState", crate::biceps::pm::InvocationState::Wait.as_str());
        w.end();
        w.end();
    }))
}

fn subscription_fault(e: SubscriptionError) -> SoapFault {
    match e {
        SubscriptionError::FilterNotSupported(filter) => SoapFault {
            code: crate::soap::FaultCode::Sender,
            subcode: Some("FilterNotSupported".to_string()),
            reason: format!("cannot deliver \"{}\"", filter),
            detail: None,
        },
        SubscriptionError::Expired => SoapFault::invalid_state("subscription unknown or expired"),
        other => SoapFault::receiver(&other.to_string()),
    }
}

fn handle_subscribe(
    ctx: &ServiceCtx,
    msg: &Message,
    body: Option<Node<'_, '_>>,
) -> Result<String, SoapFault> {
    let body = required_body(body)?;
    let notify_to = child(body, Ns::Wse, "Delivery")
        .and_then(|d| child(d, Ns::Wse, "NotifyTo"))
        .and_then(|n| child(n, Ns::Wsa, "Address"))
        .and_then(|a| a.text())
        .map(str::trim)
        .ok_or_else(|| SoapFault::sender("missing wse:Delivery/wse:NotifyTo"))?;
    let end_to = child(body, Ns::Wse, "EndTo")
        .and_then(|n| child(n, Ns::Wsa, "Address"))
        .and_then(|a| a.text())
        .map(|t| t.trim().to_string());
    let expires = text_child(body, Ns::Wse, "Expires").and_then(|t| parse_duration_iso(&t));
    let filter: Vec<String> = text_child(body, Ns::Wse, "Filter")
        .map(|f| f.split_ascii_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    let grant = ctx
        .subs
        .subscribe(&filter, notify_to, end_to.as_deref(), expires)
        .map_err(subscription_fault)?;

    let manager_url = ctx.service_url.read().clone();
    let headers = Headers::response(&msg.headers, action::WSE_SUBSCRIBE_RESPONSE);
    Ok(encode_envelope(&headers, |w| {
        w.start(Ns::Wse, "SubscribeResponse");
        w.start(Ns::Wse, "SubscriptionManager");
        w.leaf_text(Ns::Wsa, "Address", &manager_url);
        w.start(Ns::Wsa, "ReferenceParameters");
        w.leaf_text(Ns::Wse, "Identifier", &grant.id);
        w.end();
        w.end();
        w.leaf_text(Ns::Wse, "Expires", &format_duration_iso(grant.expires));
        w.end();
    }))
}

fn subscription_id(msg: &Message) -> Result<String, SoapFault> {
    msg.headers
        .identifier
        .clone()
        .ok_or_else(|| SoapFault::sender("missing wse:Identifier"))
}

fn handle_renew(
    ctx: &ServiceCtx,
    msg: &Message,
    body: Option<Node<'_, '_>>,
) -> Result<String, SoapFault> {
    let id = subscription_id(msg)?;
    let requested = body
        .and_then(|b| text_child(b, Ns::Wse, "Expires"))
        .and_then(|t| parse_duration_iso(&t));
    let granted = ctx.subs.renew(&id, requested).map_err(subscription_fault)?;
    let headers = Headers::response(&msg.headers, action::WSE_RENEW_RESPONSE);
    Ok(encode_envelope(&headers, |w| {
        w.start(Ns::Wse, "RenewResponse");
        w.leaf_text(Ns::Wse, "Expires", &format_duration_iso(granted));
        w.end();
    }))
}

fn handle_get_status(ctx: &ServiceCtx, msg: &Message) -> Result<String, SoapFault> {
    let id = subscription_id(msg)?;
    let remaining = ctx.subs.status(&id).map_err(subscription_fault)?;
    let headers = Headers::response(&msg.headers, action::WSE_GET_STATUS_RESPONSE);
    Ok(encode_envelope(&headers, |w| {
        w.start(Ns::Wse, "GetStatusResponse");
        w.leaf_text(Ns::Wse, "Expires", &format_duration_iso(remaining));
        w.end();
    }))
}

fn handle_unsubscribe(ctx: &ServiceCtx, msg: &Message) -> Result<String, SoapFault> {
    let id = subscription_id(msg)?;
    ctx.subs.unsubscribe(&id).map_err(subscription_fault)?;
    let headers = Headers::response(&msg.headers, action::WSE_UNSUBSCRIBE_RESPONSE);
    Ok(encode_envelope(&headers, |w| {
        w.start(Ns::Wse, "UnsubscribeResponse");
        w.end();
    }))
}

fn handle_get_metadata(ctx: &ServiceCtx, msg: &Message) -> String {
    let headers = Headers::response(&msg.headers, action::WXF_GET_RESPONSE);
    let service_url = ctx.service_url.read().clone();
    encode_envelope(&headers, |w| {
        w.start(Ns::Mex, "Metadata");

        w.start(Ns::Mex, "MetadataSection");
        w.attr("Dialect", "http://docs.oasis-open.org/ws-dd/ns/dpws/2009/01/ThisModel");
        w.start(Ns::Dpws, "ThisModel");
        w.leaf_text(Ns::Dpws, "Manufacturer", &ctx.model.manufacturer);
        if !ctx.model.manufacturer_url.is_empty() {
            w.leaf_text(Ns::Dpws, "ManufacturerUrl", &ctx.model.manufacturer_url);
        }
        w.leaf_text(Ns::Dpws, "ModelName", &ctx.model.model_name);
        if !ctx.model.model_number.is_empty() {
            w.leaf_text(Ns::Dpws, "ModelNumber", &ctx.model.model_number);
        }
        if !ctx.model.model_url.is_empty() {
            w.leaf_text(Ns::Dpws, "ModelUrl", &ctx.model.model_url);
        }
        if !ctx.model.presentation_url.is_empty() {
            w.leaf_text(Ns::Dpws, "PresentationUrl", &ctx.model.presentation_url);
        }
        w.end();
        w.end();

        w.start(Ns::Mex, "MetadataSection");
        w.attr("Dialect", "http://docs.oasis-open.org/ws-dd/ns/dpws/2009/01/ThisDevice");
        w.start(Ns::Dpws, "ThisDevice");
        w.leaf_text(Ns::Dpws, "FriendlyName", &ctx.device.friendly_name);
        if !ctx.device.firmware_version.is_empty() {
            w.leaf_text(Ns::Dpws, "FirmwareVersion", &ctx.device.firmware_version);
        }
        if !ctx.device.serial_number.is_empty() {
            w.leaf_text(Ns::Dpws, "SerialNumber", &ctx.device.serial_number);
        }
        w.end();
        w.end();

        w.start(Ns::Mex, "MetadataSection");
        w.attr("Dialect", "http://docs.oasis-open.org/ws-dd/ns/dpws/2009/01/Relationship");
        w.start(Ns::Dpws, "Relationship");
        w.attr("Type", "http://docs.oasis-open.org/ws-dd/ns/dpws/2009/01/host");
        w.start(Ns::Dpws, "Host");
        w.start(Ns::Wsa, "EndpointReference");
        w.leaf_text(Ns::Wsa, "Address", &ctx.epr);
        w.end();
        w.end();
        w.start(Ns::Dpws, "Hosted");
        w.start(Ns::Wsa, "EndpointReference");
        w.leaf_text(Ns::Wsa, "Address", &service_url);
        w.end();
        w.leaf_text(Ns::Dpws, "ServiceId", "rsdc.sdc.service");
        w.end();
        w.end();
        w.end();

        w.end();
    })
}
