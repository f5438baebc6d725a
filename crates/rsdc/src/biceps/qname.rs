// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Fixed namespace table and qualified-name helpers.
//!
//! SDC messages draw from a closed set of namespaces. Prefixes are fixed at
//! serialization time (all declared on the document root); parsing matches on
//! (namespace URI, local name) only, so any prefix aliasing used by a peer is
//! accepted.

use roxmltree::Node;

/// The closed namespace set used by SDC payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ns {
    /// BICEPS participant model.
    Pm,
    /// BICEPS message model.
    Msg,
    /// BICEPS extension point.
    Ext,
    /// SOAP 1.2 envelope.
    S12,
    /// WS-Addressing 1.0.
    Wsa,
    /// WS-Discovery 1.1.
    Wsd,
    /// WS-Eventing.
    Wse,
    /// DPWS 1.1.
    Dpws,
    /// WS-MetadataExchange.
    Mex,
    /// XML Schema instance (xsi:type).
    Xsi,
}

impl Ns {
    /// Namespace URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Ns::Pm => "http://standards.ieee.org/downloads/11073/11073-10207-2017/participant",
            Ns::Msg => "http://standards.ieee.org/downloads/11073/11073-10207-2017/message",
            Ns::Ext => "http://standards.ieee.org/downloads/11073/11073-10207-2017/extension",
            Ns::S12 => "http://www.w3.org/2003/05/soap-envelope",
            Ns::Wsa => "http://www.w3.org/2005/08/addressing",
            Ns::Wsd => "http://docs.oasis-open.org/ws-dd/ns/discovery/2009/01",
            Ns::Wse => "http://schemas.xmlsoap.org/ws/2004/08/eventing",
            Ns::Dpws => "http://docs.oasis-open.org/ws-dd/ns/dpws/2009/01",
            Ns::Mex => "http://schemas.xmlsoap.org/ws/2004/09/mex",
            Ns::Xsi => "http://www.w3.org/2001/XMLSchema-instance",
        }
    }

    /// Canonical serialization prefix.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Ns::Pm => "pm",
            Ns::Msg => "msg",
            Ns::Ext => "ext",
            Ns::S12 => "s12",
            Ns::Wsa => "wsa",
            Ns::Wsd => "wsd",
            Ns::Wse => "wse",
            Ns::Dpws => "dpws",
            Ns::Mex => "mex",
            Ns::Xsi => "xsi",
        }
    }

    /// All namespaces, in root-declaration order.
    pub const ALL: [Ns; 10] = [
        Ns::Pm,
        Ns::Msg,
        Ns::Ext,
        Ns::S12,
        Ns::Wsa,
        Ns::Wsd,
        Ns::Wse,
        Ns::Dpws,
        Ns::Mex,
        Ns::Xsi,
    ];
}

/// WS-Addressing anonymous reply address.
pub const WSA_ANONYMOUS: &str = "http://www.w3.org/2005/08/addressing/anonymous";

/// `To` address of multicast WS-Discovery messages.
pub const WSD_TO: &str = "urn:docs-oasis-open-org:ws-dd:ns:discovery:2009:01";

/// DPWS device type announced and probed for by SDC participants.
pub const DPWS_DEVICE_TYPE: &str = "Device";

/// SDC medical device type (local name within [`Ns::Dpws`]-adjacent MDPWS ns).
pub const MDPWS_MEDICAL_DEVICE_TYPE: &str = "MedicalDevice";

/// True when `node` is an element with the given namespace and local name.
#[must_use]
pub fn is(node: Node<'_, '_>, ns: Ns, local: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local
        && node.tag_name().namespace() == Some(ns.uri())
}

/// First child element matching (ns, local).
#[must_use]
pub fn child<'a, 'input>(node: Node<'a, 'input>, ns: Ns, local: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| is(*c, ns, local))
}

/// All child elements matching (ns, local), in document order.
pub fn children<'a, 'input>(
    node: Node<'a, 'input>,
    ns: Ns,
    local: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a
where
    'input: 'a,
{
    node.children().filter(move |c| is(*c, ns, local))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for ns in Ns::ALL {
            assert!(seen.insert(ns.prefix()), "duplicate prefix {}", ns.prefix());
        }
    }

    #[test]
    fn child_matching_ignores_prefix_aliasing() {
        let xml = r#"<a xmlns:x="http://standards.ieee.org/downloads/11073/11073-10207-2017/participant"><x:Unit/></a>"#;
        let doc = roxmltree::Document::parse(xml).expect("well-formed");
        let root = doc.root_element();
        assert!(child(root, Ns::Pm, "Unit").is_some());
        assert!(child(root, Ns::Msg, "Unit").is_none());
    }
}
