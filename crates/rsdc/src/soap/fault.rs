// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! SOAP 1.2 faults and the SDC sub-code taxonomy.

use super::action;
use super::envelope::{encode_envelope, Headers};
use crate::biceps::qname::{child, Ns};
use roxmltree::{Document, Node};
use std::fmt;

/// SOAP 1.2 fault codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    /// The sender's message was at fault.
    Sender,
    /// The receiver failed to process a valid message.
    Receiver,
    /// A mustUnderstand header was not understood.
    MustUnderstand,
    /// The envelope is not SOAP 1.2.
    VersionMismatch,
}

impl FaultCode {
    const fn wire(self) -> &'static str {
        match self {
            FaultCode::Sender => "s12:Sender",
            FaultCode::Receiver => "s12:Receiver",
            FaultCode::MustUnderstand => "s12:MustUnderstand",
            FaultCode::VersionMismatch => "s12:VersionMismatch",
        }
    }

    fn parse_wire(s: &str) -> Option<Self> {
        match s.rsplit(':').next() {
            Some("Sender") => Some(FaultCode::Sender),
            Some("Receiver") => Some(FaultCode::Receiver),
            Some("MustUnderstand") => Some(FaultCode::MustUnderstand),
            Some("VersionMismatch") => Some(FaultCode::VersionMismatch),
            _ => None,
        }
    }
}

/// A SOAP fault, optionally carrying an SDC sub-code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFault {
    pub code: FaultCode,
    /// SDC sub-code (`InvalidHandle`, `InvalidState`, `ActionNotSupported`,
    /// `OperationInvokedReportMissing`, ...).
    pub subcode: Option<String>,
    pub reason: String,
    pub detail: Option<String>,
}

impl SoapFault {
    #[must_use]
    pub fn sender(reason: &str) -> Self {
        Self { code: FaultCode::Sender, subcode: None, reason: reason.to_string(), detail: None }
    }

    #[must_use]
    pub fn receiver(reason: &str) -> Self {
        Self { code: FaultCode::Receiver, subcode: None, reason: reason.to_string(), detail: None }
    }

    #[must_use]
    pub fn not_understood(header: &str) -> Self {
        Self {
            code: FaultCode::MustUnderstand,
            subcode: None,
            reason: format!("header \"{}\" was not understood", header),
            detail: None,
        }
    }

    #[must_use]
    pub fn version_mismatch() -> Self {
        Self {
            code: FaultCode::VersionMismatch,
            subcode: None,
            reason: "only SOAP 1.2 envelopes are supported".to_string(),
            detail: None,
        }
    }

    #[must_use]
    pub fn action_not_supported(soap_action: &str) -> Self {
        Self {
            code: FaultCode::Sender,
            subcode: Some("ActionNotSupported".to_string()),
            reason: format!("action \"{}\" is not supported", soap_action),
            detail: None,
        }
    }

    #[must_use]
    pub fn invalid_handle(handle: &str) -> Self {
        Self {
            code: FaultCode::Sender,
            subcode: Some("InvalidHandle".to_string()),
            reason: format!("handle \"{}\" is unknown", handle),
            detail: None,
        }
    }

    #[must_use]
    pub fn invalid_state(reason: &str) -> Self {
        Self {
            code: FaultCode::Sender,
            subcode: Some("InvalidState".to_string()),
            reason: reason.to_string(),
            detail: None,
        }
    }

    /// Attach a detail string.
    #[must_use]
    pub fn with_detail(mut self, detail: &str) -> Self {
        self.detail = Some(detail.to_string());
        self
    }

    /// HTTP status a fault response travels with (SOAP 1.2 HTTP binding).
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self.code {
            FaultCode::Sender | FaultCode::MustUnderstand | FaultCode::VersionMismatch => 400,
            FaultCode::Receiver => 500,
        }
    }

    /// Serialize as a complete fault envelope correlated to `relates_to`.
    #[must_use]
    pub fn to_envelope(&self, relates_to: Option<&str>) -> String {
        let mut headers = Headers::request(action::SOAP_FAULT, "");
        headers.to = None;
        headers.reply_to = None;
        headers.relates_to = relates_to.map(str::to_string);
        encode_envelope(&headers, |w| {
            w.start(Ns::S12, "Fault");
            w.start(Ns::S12, "Code");
            w.leaf_text(Ns::S12, "Value", self.code.wire());
            if let Some(sub) = &self.subcode {
                w.start(Ns::S12, "Subcode");
                w.leaf_text(Ns::S12, "Value", sub);
                w.end();
            }
            w.end();
            w.start(Ns::S12, "Reason");
            w.start(Ns::S12, "Text");
            w.attr("xml:lang", "en");
            w.text(&self.reason);
            w.end();
            w.end();
            if let Some(detail) = &self.detail {
                w.start(Ns::S12, "Detail");
                w.text(detail);
                w.end();
            }
            w.end();
        })
    }

    /// Extract a fault from a decoded response body, if the body is one.
    #[must_use]
    pub fn from_body(doc: &Document<'_>) -> Option<SoapFault> {
        let envelope = doc.root_element();
        let body = child(envelope, Ns::S12, "Body")?;
        let fault = child(body, Ns::S12, "Fault")?;
        let code_el = child(fault, Ns::S12, "Code")?;
        let code = child(code_el, Ns::S12, "Value")
            .and_then(|v| v.text())
            .and_then(|t| FaultCode::parse_wire(t.trim()))?;
        let subcode = child(code_el, Ns::S12, "Subcode")
            .and_then(|s| child(s, Ns::S12, "Value"))
            .and_then(|v| v.text())
            .map(|t| t.trim().to_string());
        let reason = child(fault, Ns::S12, "Reason")
            .and_then(|r| child(r, Ns::S12, "Text"))
            .and_then(text_of)
            .unwrap_or_default();
        let detail = child(fault, Ns::S12, "Detail").and_then(text_of);
        Some(SoapFault { code, subcode, reason, detail })
    }
}

fn text_of(node: Node<'_, '_>) -> Option<String> {
    node.text().map(|t| t.trim().to_string())
}

impl fmt::Display for SoapFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subcode {
            Some(sub) => write!(f, "{:?}/{}: {}", self.code, sub, self.reason),
            None => write!(f, "{:?}: {}", self.code, self.reason),
        }
    }
}

impl std::error::Error for SoapFault {}
