// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! WS-Discovery payload encode/decode (Probe, ProbeMatches, Resolve,
//! ResolveMatches, Hello, Bye).
//!
//! Types and scopes travel as space-separated lists. Scope matching uses
//! the RFC 3986 prefix rule WS-Discovery defaults to.

use super::DiscoveredEndpoint;
use crate::biceps::qname::{child, children, Ns};
use crate::biceps::xml::{DecodeError, XmlWriter};
use crate::soap::{encode_envelope, Headers};
use roxmltree::Node;

/// Type and scope filters of a probe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeFilter {
    pub types: Vec<String>,
    pub scopes: Vec<String>,
}

impl ProbeFilter {
    /// Probe for DPWS medical devices (the SDC default).
    #[must_use]
    pub fn medical_device() -> Self {
        Self { types: vec!["dpws:Device".to_string()], scopes: Vec::new() }
    }
}

/// RFC 3986 prefix matching on scope URIs: equal, or a prefix ending at a
/// path-segment boundary.
#[must_use]
pub fn scope_matches(service_scope: &str, probe_scope: &str) -> bool {
    if service_scope == probe_scope {
        return true;
    }
    match service_scope.strip_prefix(probe_scope) {
        Some(rest) => probe_scope.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

/// True when a local service satisfies all filters of a probe.
#[must_use]
pub fn service_matches(service: &DiscoveredEndpoint, filter: &ProbeFilter) -> bool {
    let types_ok = filter.types.iter().all(|t| {
        let probe_local = t.rsplit(':').next().unwrap_or(t);
        service
            .types
            .iter()
            .any(|s| s.rsplit(':').next().unwrap_or(s) == probe_local)
    });
    let scopes_ok = filter
        .scopes
        .iter()
        .all(|p| service.scopes.iter().any(|s| scope_matches(s, p)));
    types_ok && scopes_ok
}

fn write_list(w: &mut XmlWriter, local: &'static str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    w.leaf_text(Ns::Wsd, local, &items.join(" "));
}

fn write_epr(w: &mut XmlWriter, epr: &str) {
    w.start(Ns::Wsa, "EndpointReference");
    w.leaf_text(Ns::Wsa, "Address", epr);
    w.end();
}

fn write_endpoint_body(w: &mut XmlWriter, ep: &DiscoveredEndpoint) {
    write_epr(w, &ep.epr);
    write_list(w, "Types", &ep.types);
    write_list(w, "Scopes", &ep.scopes);
    write_list(w, "XAddrs", &ep.xaddrs);
    w.leaf_text(Ns::Wsd, "MetadataVersion", &ep.metadata_version.to_string());
}

/// Serialize a Hello envelope.
#[must_use]
pub fn encode_hello(headers: &Headers, service: &DiscoveredEndpoint) -> String {
    encode_envelope(headers, |w| {
        w.start(Ns::Wsd, "Hello");
        write_endpoint_body(w, service);
        w.end();
    })
}

/// Serialize a Bye envelope.
#[must_use]
pub fn encode_bye(headers: &Headers, epr: &str) -> String {
    encode_envelope(headers, |w| {
        w.start(Ns::Wsd, "Bye");
        write_epr(w, epr);
        w.end();
    })
}

/// Serialize a Probe envelope.
#[must_use]
pub fn encode_probe(headers: &Headers, filter: &ProbeFilter) -> String {
    encode_envelope(headers, |w| {
        w.start(Ns::Wsd, "Probe");
        write_list(w, "Types", &filter.types);
        write_list(w, "Scopes", &filter.scopes);
        w.end();
    })
}

/// Serialize a ProbeMatches envelope.
#[must_use]
pub fn encode_probe_matches(headers: &Headers, matches: &[DiscoveredEndpoint]) -> String {
    encode_envelope(headers, |w| {
        w.start(Ns::Wsd, "ProbeMatches");
        for m in matches {
            w.start(Ns::Wsd, "ProbeMatch");
            write_endpoint_body(w, m);
            w.end();
        }
        w.end();
    })
}

/// Serialize a Resolve envelope.
#[must_use]
pub fn encode_resolve(headers: &Headers, epr: &str) -> String {
    encode_envelope(headers, |w| {
        w.start(Ns::Wsd, "Resolve");
        write_epr(w, epr);
        w.end();
    })
}

/// Serialize a ResolveMatches envelope.
#[must_use]
pub fn encode_resolve_matches(headers: &Headers, m: &DiscoveredEndpoint) -> String {
    encode_envelope(headers, |w| {
        w.start(Ns::Wsd, "ResolveMatches");
        w.start(Ns::Wsd, "ResolveMatch");
        write_endpoint_body(w, m);
        w.end();
        w.end();
    })
}

fn text_list(node: Node<'_, '_>, local: &str) -> Vec<String> {
    child(node, Ns::Wsd, local)
        .and_then(|n| n.text())
        .map(|t| t.split_ascii_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn epr_of(node: Node<'_, '_>) -> Result<String, DecodeError> {
    child(node, Ns::Wsa, "EndpointReference")
        .and_then(|e| child(e, Ns::Wsa, "Address"))
        .and_then(|a| a.text())
        .map(|t| t.trim().to_string())
        .ok_or_else(|| DecodeError::SchemaViolation {
            xpath: crate::biceps::xml::xpath_of(node),
            detail: "missing wsa:EndpointReference/wsa:Address".to_string(),
        })
}

/// Parse one ProbeMatch / ResolveMatch / Hello body element.
pub fn endpoint_from_node(node: Node<'_, '_>) -> Result<DiscoveredEndpoint, DecodeError> {
    Ok(DiscoveredEndpoint {
        epr: epr_of(node)?,
        types: text_list(node, "Types"),
        scopes: text_list(node, "Scopes"),
        xaddrs: text_list(node, "XAddrs"),
        metadata_version: child(node, Ns::Wsd, "MetadataVersion")
            .and_then(|n| n.text())
            .and_then(|t| t.trim().parse().ok())
            .unwrap_or(1),
    })
}

/// Parse a Probe body.
pub fn probe_from_node(node: Node<'_, '_>) -> ProbeFilter {
    ProbeFilter { types: text_list(node, "Types"), scopes: text_list(node, "Scopes") }
}

/// Parse all matches from a ProbeMatches body.
pub fn probe_matches_from_node(node: Node<'_, '_>) -> Vec<DiscoveredEndpoint> {
    children(node, Ns::Wsd, "ProbeMatch")
        .filter_map(|m| endpoint_from_node(m).ok())
        .collect()
}

/// Parse the match from a ResolveMatches body.
pub fn resolve_matches_from_node(node: Node<'_, '_>) -> Option<DiscoveredEndpoint> {
    child(node, Ns::Wsd, "ResolveMatch").and_then(|m| endpoint_from_node(m).ok())
}

/// Parse the endpoint reference from a Bye body.
pub fn bye_from_node(node: Node<'_, '_>) -> Option<String> {
    epr_of(node).ok()
}

/// Parse the endpoint reference from a Resolve body.
pub fn epr_from_node(node: Node<'_, '_>) -> Option<String> {
    epr_of(node).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::{action, body_element, decode_envelope};

    fn sample_endpoint() -> DiscoveredEndpoint {
        DiscoveredEndpoint {
            epr: "urn:uuid:11111111-2222-3333-4444-555555555555".to_string(),
            types: vec!["dpws:Device".to_string(), "mdpws:MedicalDevice".to_string()],
            scopes: vec!["sdc.ctxt.loc:/HOSP/CU2/BedSim".to_string()],
            xaddrs: vec!["http://192.168.0.7:6464/dev".to_string()],
            metadata_version: 3,
        }
    }

    #[test]
    fn hello_roundtrip() {
        let ep = sample_endpoint();
        let headers = Headers::request(action::WSD_HELLO, crate::biceps::qname::WSD_TO);
        let xml = encode_hello(&headers, &ep);
        let msg = decode_envelope(&xml).expect("decodes");
        let doc = msg.document().expect("re-parses");
        let body = body_element(&doc).expect("hello body");
        let back = endpoint_from_node(body).expect("endpoint decodes");
        assert_eq!(back, ep);
    }

    #[test]
    fn probe_match_filtering() {
        let ep = sample_endpoint();
        let mut filter = ProbeFilter::medical_device();
        assert!(service_matches(&ep, &filter));
        filter.scopes.push("sdc.ctxt.loc:/HOSP".to_string());
        assert!(service_matches(&ep, &filter));
        filter.scopes.push("sdc.ctxt.loc:/OTHER".to_string());
        assert!(!service_matches(&ep, &filter));
    }

    #[test]
    fn scope_prefix_needs_segment_boundary() {
        assert!(scope_matches("urn:x/a/b", "urn:x/a"));
        assert!(!scope_matches("urn:x/ab", "urn:x/a"));
        assert!(scope_matches("urn:x/a", "urn:x/a"));
    }

    #[test]
    fn probe_roundtrip() {
        let filter = ProbeFilter {
            types: vec!["dpws:Device".to_string()],
            scopes: vec!["urn:a".to_string(), "urn:b".to_string()],
        };
        let headers = Headers::request(action::WSD_PROBE, crate::biceps::qname::WSD_TO);
        let xml = encode_probe(&headers, &filter);
        let msg = decode_envelope(&xml).expect("decodes");
        let doc = msg.document().expect("re-parses");
        let body = body_element(&doc).expect("probe body");
        assert_eq!(probe_from_node(body), filter);
    }
}
