// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! XML binding: decode via `roxmltree`, encode via [`XmlWriter`].
//!
//! Decoding is strict: a literal outside a schema enumeration, a missing
//! required attribute, or an unparsable number is a
//! [`DecodeError::SchemaViolation`] carrying the element path of the
//! offending node. Unknown elements inside an `ext:Extension` holder are
//! never errors; they are preserved verbatim.

mod decode;
mod encode;
mod writer;

pub use decode::{descriptor_from_node, is_descriptor_element, state_from_node};
pub use encode::{write_descriptor_open, write_state};
pub use writer::XmlWriter;

use roxmltree::Node;
use std::fmt;
use std::str::FromStr;

/// Decoding failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not well-formed XML.
    Malformed(String),
    /// Well-formed, but outside the schema.
    SchemaViolation { xpath: String, detail: String },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Malformed(detail) => write!(f, "malformed XML: {}", detail),
            DecodeError::SchemaViolation { xpath, detail } => {
                write!(f, "schema violation at {}: {}", xpath, detail)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<roxmltree::Error> for DecodeError {
    fn from(e: roxmltree::Error) -> Self {
        DecodeError::Malformed(e.to_string())
    }
}

/// Element path of `node` from the document root, `/` separated.
#[must_use]
pub fn xpath_of(node: Node<'_, '_>) -> String {
    let mut parts = Vec::new();
    let mut cur = Some(node);
    while let Some(n) = cur {
        if n.is_element() {
            parts.push(n.tag_name().name().to_string());
        }
        cur = n.parent();
    }
    parts.reverse();
    format!("/{}", parts.join("/"))
}

pub(crate) fn violation(node: Node<'_, '_>, detail: impl Into<String>) -> DecodeError {
    DecodeError::SchemaViolation { xpath: xpath_of(node), detail: detail.into() }
}

/// Required attribute, by unqualified name.
pub(crate) fn req_attr<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str, DecodeError> {
    node.attribute(name)
        .ok_or_else(|| violation(node, format!("missing attribute {}", name)))
}

/// Required attribute parsed with `FromStr`.
pub(crate) fn parse_req_attr<T: FromStr>(node: Node<'_, '_>, name: &str) -> Result<T, DecodeError> {
    let raw = req_attr(node, name)?;
    raw.parse::<T>()
        .map_err(|_| violation(node, format!("attribute {}=\"{}\" is out of range", name, raw)))
}

/// Optional attribute parsed with `FromStr`; absent attribute is `None`,
/// present-but-unparsable is an error.
pub(crate) fn parse_opt_attr<T: FromStr>(
    node: Node<'_, '_>,
    name: &str,
) -> Result<Option<T>, DecodeError> {
    match node.attribute(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| violation(node, format!("attribute {}=\"{}\" is out of range", name, raw))),
    }
}

/// Required enumeration attribute, decoded with the wire parser.
pub(crate) fn enum_attr<T>(
    node: Node<'_, '_>,
    name: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<T, DecodeError> {
    let raw = req_attr(node, name)?;
    parse(raw).ok_or_else(|| violation(node, format!("unknown {} literal \"{}\"", name, raw)))
}

/// Optional enumeration attribute with a schema default.
pub(crate) fn enum_attr_or<T>(
    node: Node<'_, '_>,
    name: &str,
    parse: fn(&str) -> Option<T>,
    default: T,
) -> Result<T, DecodeError> {
    match node.attribute(name) {
        None => Ok(default),
        Some(raw) => {
            parse(raw).ok_or_else(|| violation(node, format!("unknown {} literal \"{}\"", name, raw)))
        }
    }
}

/// Optional enumeration attribute.
pub(crate) fn enum_attr_opt<T>(
    node: Node<'_, '_>,
    name: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<Option<T>, DecodeError> {
    match node.attribute(name) {
        None => Ok(None),
        Some(raw) => parse(raw)
            .map(Some)
            .ok_or_else(|| violation(node, format!("unknown {} literal \"{}\"", name, raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xpath_walks_to_root() {
        let doc = roxmltree::Document::parse("<a><b><c/></b></a>").expect("well-formed");
        let c = doc.descendants().find(|n| n.has_tag_name("c")).expect("c present");
        assert_eq!(xpath_of(c), "/a/b/c");
    }

    #[test]
    fn missing_required_attribute_names_the_path() {
        let doc = roxmltree::Document::parse("<a><b/></a>").expect("well-formed");
        let b = doc.descendants().find(|n| n.has_tag_name("b")).expect("b present");
        let err = req_attr(b, "Handle").expect_err("attribute absent");
        match err {
            DecodeError::SchemaViolation { xpath, .. } => assert_eq!(xpath, "/a/b"),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
