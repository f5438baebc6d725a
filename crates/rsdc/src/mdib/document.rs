// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Canonical MDIB document: the GetMdibResponse body.
//!
//! ```text
//! <msg:GetMdibResponse MdibVersion SequenceId InstanceId>
//!   <msg:Mdib MdibVersion SequenceId InstanceId>
//!     <pm:MdDescription>   nested descriptor tree
//!     <pm:MdState>         flat state list (context states included)
//! ```
//!
//! `export -> import -> export` is byte-stable; the round-trip property is
//! exercised in `tests/mdib_roundtrip.rs`.

use super::snapshot::MdibSnapshot;
use super::MdibVersionGroup;
use crate::biceps::qname::{child, is, Ns};
use crate::biceps::xml::{
    descriptor_from_node, is_descriptor_element, state_from_node, write_descriptor_open,
    write_state, DecodeError, XmlWriter,
};
use crate::biceps::{Descriptor, State};
use roxmltree::Node;

/// Decoded content of a canonical MDIB document.
#[derive(Debug, Clone)]
pub struct MdibDocument {
    pub version: MdibVersionGroup,
    /// Containment order, parents before children, parent links resolved.
    pub descriptors: Vec<Descriptor>,
    pub states: Vec<State>,
}

fn write_version_attrs(w: &mut XmlWriter, v: &MdibVersionGroup) {
    w.attr("MdibVersion", &v.mdib_version.to_string());
    w.attr("SequenceId", &v.sequence_id);
    w.attr("InstanceId", &v.instance_id.to_string());
}

fn write_descriptor_tree(w: &mut XmlWriter, snap: &MdibSnapshot, handle: &str) {
    let Some(d) = snap.descriptor(handle) else { return };
    write_descriptor_open(w, d, false);
    for child_handle in snap.children_of(handle) {
        write_descriptor_tree(w, snap, child_handle);
    }
    w.end();
}

fn write_mdib_element(w: &mut XmlWriter, snap: &MdibSnapshot) {
    write_version_attrs(w, snap.version_group());

    w.start(Ns::Pm, "MdDescription");
    if let Some(root) = snap.root() {
        let root = root.clone();
        write_descriptor_tree(w, snap, &root);
    }
    w.end();

    w.start(Ns::Pm, "MdState");
    for s in snap.states_in_tree_order() {
        write_state(w, &s);
    }
    for s in snap.context_states_in_tree_order() {
        write_state(w, &s);
    }
    w.end();
}

/// Serialize a snapshot as a bare `msg:Mdib` document.
#[must_use]
pub fn encode_mdib(snap: &MdibSnapshot) -> String {
    let mut w = XmlWriter::with_declaration();
    w.root(Ns::Msg, "Mdib");
    write_mdib_element(&mut w, snap);
    w.end();
    w.finish()
}

/// Serialize a snapshot as a complete GetMdibResponse body.
#[must_use]
pub fn encode_get_mdib_response(snap: &MdibSnapshot) -> String {
    let mut w = XmlWriter::new();
    w.root(Ns::Msg, "GetMdibResponse");
    write_version_attrs(&mut w, snap.version_group());
    w.start(Ns::Msg, "Mdib");
    write_mdib_element(&mut w, snap);
    w.end();
    w.end();
    w.finish()
}

/// Serialize a GetMdDescriptionResponse body.
#[must_use]
pub fn encode_md_description_response(snap: &MdibSnapshot) -> String {
    let mut w = XmlWriter::new();
    w.root(Ns::Msg, "GetMdDescriptionResponse");
    write_version_attrs(&mut w, snap.version_group());
    w.start(Ns::Pm, "MdDescription");
    if let Some(root) = snap.root() {
        let root = root.clone();
        write_descriptor_tree(&mut w, snap, &root);
    }
    w.end();
    w.end();
    w.finish()
}

/// Serialize a GetMdStateResponse body. An empty `handles` filter selects
/// every state; otherwise only states of the named descriptors (context
/// instances included) are returned - unknown handles select nothing.
#[must_use]
pub fn encode_md_state_response(snap: &MdibSnapshot, handles: &[String]) -> String {
    let mut w = XmlWriter::new();
    w.root(Ns::Msg, "GetMdStateResponse");
    write_version_attrs(&mut w, snap.version_group());
    w.start(Ns::Pm, "MdState");
    let selected = |h: &str| handles.is_empty() || handles.iter().any(|f| f == h);
    for s in snap.states_in_tree_order() {
        if selected(&s.descriptor_handle) {
            write_state(&mut w, &s);
        }
    }
    for s in snap.context_states_in_tree_order() {
        if selected(&s.descriptor_handle) || s.handle.as_deref().map(selected).unwrap_or(false) {
            write_state(&mut w, &s);
        }
    }
    w.end();
    w.end();
    w.finish()
}

/// Serialize a GetContextStatesResponse body.
#[must_use]
pub fn encode_context_states_response(snap: &MdibSnapshot) -> String {
    let mut w = XmlWriter::new();
    w.root(Ns::Msg, "GetContextStatesResponse");
    write_version_attrs(&mut w, snap.version_group());
    for s in snap.context_states_in_tree_order() {
        write_state(&mut w, &s);
    }
    w.end();
    w.finish()
}

fn version_group_from(node: Node<'_, '_>) -> Result<MdibVersionGroup, DecodeError> {
    Ok(MdibVersionGroup {
        mdib_version: crate::biceps::xml::parse_opt_attr(node, "MdibVersion")?.unwrap_or(0),
        sequence_id: node.attribute("SequenceId").unwrap_or_default().to_string(),
        instance_id: crate::biceps::xml::parse_opt_attr(node, "InstanceId")?.unwrap_or(0),
    })
}

fn walk_descriptors(
    node: Node<'_, '_>,
    parent: Option<&str>,
    out: &mut Vec<Descriptor>,
) -> Result<(), DecodeError> {
    for c in node.children().filter(|c| is_descriptor_element(*c)) {
        let d = descriptor_from_node(c, parent)?;
        let handle = d.handle.clone();
        out.push(d);
        walk_descriptors(c, Some(&handle), out)?;
    }
    Ok(())
}

/// Parse a canonical MDIB document. Accepts either a bare `msg:Mdib` root
/// or a `msg:GetMdibResponse` wrapper.
pub fn decode_mdib(xml: &str) -> Result<MdibDocument, DecodeError> {
    let doc = roxmltree::Document::parse(xml)?;
    let root = doc.root_element();
    let mdib = if is(root, Ns::Msg, "Mdib") {
        root
    } else if let Some(m) = child(root, Ns::Msg, "Mdib") {
        m
    } else {
        return Err(DecodeError::SchemaViolation {
            xpath: "/".to_string(),
            detail: "expected msg:Mdib or a wrapper containing it".to_string(),
        });
    };

    let version = version_group_from(mdib)?;

    let mut descriptors = Vec::new();
    if let Some(desc) = child(mdib, Ns::Pm, "MdDescription") {
        walk_descriptors(desc, None, &mut descriptors)?;
    }

    let mut states = Vec::new();
    if let Some(md_state) = child(mdib, Ns::Pm, "MdState") {
        for s in md_state.children().filter(|c| is(*c, Ns::Pm, "State")) {
            states.push(state_from_node(s)?);
        }
    }

    Ok(MdibDocument { version, descriptors, states })
}
