// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Envelope encode/decode with WS-Addressing headers.

use super::fault::SoapFault;
use super::SoapError;
use crate::biceps::qname::{child, is, Ns, WSA_ANONYMOUS};
use crate::biceps::xml::{DecodeError, XmlWriter};
use roxmltree::{Document, Node};

/// WS-Discovery AppSequence header (instance id + message number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppSequence {
    pub instance_id: u64,
    pub message_number: u64,
}

/// WS-Addressing headers of one message.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    pub action: String,
    pub message_id: String,
    pub to: Option<String>,
    pub relates_to: Option<String>,
    pub reply_to: Option<String>,
    /// WS-Eventing subscription identifier (management and notification
    /// messages).
    pub identifier: Option<String>,
    /// WS-Discovery AppSequence (multicast messages only).
    pub app_sequence: Option<AppSequence>,
}

impl Headers {
    /// Headers for a fresh request.
    #[must_use]
    pub fn request(action: &str, to: &str) -> Self {
        Self {
            action: action.to_string(),
            message_id: format!("urn:uuid:{}", uuid::Uuid::new_v4()),
            to: Some(to.to_string()),
            relates_to: None,
            reply_to: Some(WSA_ANONYMOUS.to_string()),
            identifier: None,
            app_sequence: None,
        }
    }

    /// Headers for a response correlated to `request`.
    #[must_use]
    pub fn response(request: &Headers, action: &str) -> Self {
        Self {
            action: action.to_string(),
            message_id: format!("urn:uuid:{}", uuid::Uuid::new_v4()),
            to: None,
            relates_to: Some(request.message_id.clone()),
            reply_to: None,
            identifier: None,
            app_sequence: None,
        }
    }
}

/// One decoded inbound message. `raw` keeps the full document so handlers
/// can re-parse the body with the envelope's namespace context intact.
#[derive(Debug, Clone)]
pub struct Message {
    pub headers: Headers,
    pub raw: String,
}

impl Message {
    /// Parse the retained document again (for body extraction).
    pub fn document(&self) -> Result<Document<'_>, DecodeError> {
        Document::parse(&self.raw).map_err(DecodeError::from)
    }
}

/// First element child of `s12:Body`.
#[must_use]
pub fn body_element<'a, 'input>(doc: &'a Document<'input>) -> Option<Node<'a, 'input>> {
    let envelope = doc.root_element();
    let body = child(envelope, Ns::S12, "Body")?;
    body.children().find(Node::is_element)
}

/// Serialize an envelope; `body` writes the content of `s12:Body`.
#[must_use]
pub fn encode_envelope(headers: &Headers, body: impl FnOnce(&mut XmlWriter)) -> String {
    let mut w = XmlWriter::new();
    w.root(Ns::S12, "Envelope");
    w.start(Ns::S12, "Header");
    w.leaf_text(Ns::Wsa, "Action", &headers.action);
    w.leaf_text(Ns::Wsa, "MessageID", &headers.message_id);
    if let Some(to) = &headers.to {
        w.leaf_text(Ns::Wsa, "To", to);
    }
    if let Some(relates) = &headers.relates_to {
        w.leaf_text(Ns::Wsa, "RelatesTo", relates);
    }
    if let Some(reply) = &headers.reply_to {
        w.start(Ns::Wsa, "ReplyTo");
        w.leaf_text(Ns::Wsa, "Address", reply);
        w.end();
    }
    if let Some(id) = &headers.identifier {
        w.leaf_text(Ns::Wse, "Identifier", id);
    }
    if let Some(seq) = &headers.app_sequence {
        w.start(Ns::Wsd, "AppSequence");
        w.attr("InstanceId", &seq.instance_id.to_string());
        w.attr("MessageNumber", &seq.message_number.to_string());
        w.end();
    }
    w.end(); // Header
    w.start(Ns::S12, "Body");
    body(&mut w);
    w.end(); // Body
    w.end(); // Envelope
    w.finish()
}

fn text_of(node: Node<'_, '_>) -> String {
    node.text().map(str::trim).unwrap_or_default().to_string()
}

fn header_is_known(node: Node<'_, '_>) -> bool {
    let ns = node.tag_name().namespace();
    let name = node.tag_name().name();
    match ns {
        Some(u) if u == Ns::Wsa.uri() => true,
        Some(u) if u == Ns::Wse.uri() => name == "Identifier",
        Some(u) if u == Ns::Wsd.uri() => name == "AppSequence",
        _ => false,
    }
}

fn must_understand(node: Node<'_, '_>) -> bool {
    matches!(node.attribute((Ns::S12.uri(), "mustUnderstand")), Some("true") | Some("1"))
}

/// Decode an inbound envelope.
///
/// # Errors
///
/// [`SoapError::Decode`] for malformed or non-SOAP-1.2 content;
/// [`SoapError::Fault`] (NotUnderstood) when a `mustUnderstand` header is
/// outside the understood set.
pub fn decode_envelope(xml: &str) -> Result<Message, SoapError> {
    let doc = Document::parse(xml).map_err(DecodeError::from)?;
    let envelope = doc.root_element();
    if !is(envelope, Ns::S12, "Envelope") {
        if envelope.tag_name().name() == "Envelope" {
            // An envelope in some other SOAP version namespace.
            return Err(SoapFault::version_mismatch().into());
        }
        return Err(SoapError::Decode(DecodeError::SchemaViolation {
            xpath: "/".to_string(),
            detail: "expected s12:Envelope".to_string(),
        }));
    }
    let header = child(envelope, Ns::S12, "Header").ok_or_else(|| {
        SoapError::Decode(DecodeError::SchemaViolation {
            xpath: "/Envelope".to_string(),
            detail: "missing s12:Header".to_string(),
        })
    })?;

    let mut headers = Headers::default();
    for h in header.children().filter(Node::is_element) {
        if !header_is_known(h) {
            if must_understand(h) {
                return Err(SoapFault::not_understood(h.tag_name().name()).into());
            }
            continue;
        }
        match (h.tag_name().namespace(), h.tag_name().name()) {
            (Some(u), "Action") if u == Ns::Wsa.uri() => headers.action = text_of(h),
            (Some(u), "MessageID") if u == Ns::Wsa.uri() => headers.message_id = text_of(h),
            (Some(u), "To") if u == Ns::Wsa.uri() => headers.to = Some(text_of(h)),
            (Some(u), "RelatesTo") if u == Ns::Wsa.uri() => headers.relates_to = Some(text_of(h)),
            (Some(u), "ReplyTo") if u == Ns::Wsa.uri() => {
                headers.reply_to = child(h, Ns::Wsa, "Address").map(text_of);
            }
            (Some(u), "Identifier") if u == Ns::Wse.uri() => headers.identifier = Some(text_of(h)),
            (Some(u), "AppSequence") if u == Ns::Wsd.uri() => {
                let instance_id = h
                    .attribute("InstanceId")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                let message_number = h
                    .attribute("MessageNumber")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                headers.app_sequence = Some(AppSequence { instance_id, message_number });
            }
            _ => {}
        }
    }

    if headers.action.is_empty() {
        return Err(SoapError::Decode(DecodeError::SchemaViolation {
            xpath: "/Envelope/Header".to_string(),
            detail: "missing wsa:Action".to_string(),
        }));
    }

    Ok(Message { headers, raw: xml.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::action;

    #[test]
    fn envelope_roundtrip() {
        let headers = Headers::request(action::GET_MDIB, "urn:uuid:target");
        let xml = encode_envelope(&headers, |w| {
            w.start(Ns::Msg, "GetMdib");
            w.end();
        });
        let msg = decode_envelope(&xml).expect("own envelope decodes");
        assert_eq!(msg.headers.action, action::GET_MDIB);
        assert_eq!(msg.headers.to.as_deref(), Some("urn:uuid:target"));
        assert_eq!(msg.headers.reply_to.as_deref(), Some(WSA_ANONYMOUS));
        let doc = msg.document().expect("raw re-parses");
        let body = body_element(&doc).expect("body element present");
        assert_eq!(body.tag_name().name(), "GetMdib");
    }

    #[test]
    fn unknown_must_understand_header_faults() {
        let xml = format!(
            r#"<s12:Envelope xmlns:s12="{s12}" xmlns:wsa="{wsa}"><s12:Header><wsa:Action>urn:a</wsa:Action><v:Vendor xmlns:v="urn:v" s12:mustUnderstand="true">x</v:Vendor></s12:Header><s12:Body/></s12:Envelope>"#,
            s12 = Ns::S12.uri(),
            wsa = Ns::Wsa.uri(),
        );
        match decode_envelope(&xml) {
            Err(SoapError::Fault(f)) => {
                assert_eq!(f.code, crate::soap::FaultCode::MustUnderstand);
            }
            other => panic!("expected NotUnderstood fault, got {:?}", other.map(|m| m.headers)),
        }
    }

    #[test]
    fn unknown_header_without_flag_is_ignored() {
        let xml = format!(
            r#"<s12:Envelope xmlns:s12="{s12}" xmlns:wsa="{wsa}"><s12:Header><wsa:Action>urn:a</wsa:Action><v:Vendor xmlns:v="urn:v">x</v:Vendor></s12:Header><s12:Body/></s12:Envelope>"#,
            s12 = Ns::S12.uri(),
            wsa = Ns::Wsa.uri(),
        );
        let msg = decode_envelope(&xml).expect("tolerated");
        assert_eq!(msg.headers.action, "urn:a");
    }

    #[test]
    fn app_sequence_roundtrip() {
        let mut headers = Headers::request(action::WSD_HELLO, crate::biceps::qname::WSD_TO);
        headers.app_sequence = Some(AppSequence { instance_id: 77, message_number: 3 });
        let xml = encode_envelope(&headers, |w| {
            w.start(Ns::Wsd, "Hello");
            w.end();
        });
        let msg = decode_envelope(&xml).expect("decodes");
        assert_eq!(
            msg.headers.app_sequence,
            Some(AppSequence { instance_id: 77, message_number: 3 })
        );
    }

    #[test]
    fn soap_11_envelope_is_version_mismatch() {
        let xml = r#"<Envelope xmlns="http://schemas.xmlsoap.org/soap/envelope/"><Header/><Body/></Envelope>"#;
        match decode_envelope(xml) {
            Err(SoapError::Fault(f)) => {
                assert_eq!(f.code, crate::soap::FaultCode::VersionMismatch);
            }
            other => panic!("expected VersionMismatch, got {:?}", other.map(|m| m.headers)),
        }
    }
}
