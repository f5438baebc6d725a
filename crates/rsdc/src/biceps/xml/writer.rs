// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 rsdc contributors

//! Namespace-aware XML writer.
//!
//! Prefixes are fixed (see [`Ns`]); the full namespace set is declared once
//! on the root element so nested writers never emit xmlns attributes. The
//! writer produces no insignificant whitespace, which keeps output canonical
//! for byte-wise round-trip comparison.

use crate::biceps::qname::Ns;

/// Streaming XML writer over an owned buffer.
pub struct XmlWriter {
    buf: String,
    stack: Vec<(Ns, &'static str)>,
    /// An element start tag is emitted but not yet closed with `>`.
    open: bool,
}

impl XmlWriter {
    /// Empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self { buf: String::with_capacity(1024), stack: Vec::new(), open: false }
    }

    /// Writer starting with an XML declaration.
    #[must_use]
    pub fn with_declaration() -> Self {
        let mut w = Self::new();
        w.buf.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>");
        w
    }

    fn close_open_tag(&mut self) {
        if self.open {
            self.buf.push('>');
            self.open = false;
        }
    }

    /// Start the root element and declare the full namespace set on it.
    pub fn root(&mut self, ns: Ns, local: &'static str) {
        self.start(ns, local);
        for n in Ns::ALL {
            self.buf.push_str(" xmlns:");
            self.buf.push_str(n.prefix());
            self.buf.push_str("=\"");
            self.buf.push_str(n.uri());
            self.buf.push('"');
        }
    }

    /// Start a nested element.
    pub fn start(&mut self, ns: Ns, local: &'static str) {
        self.close_open_tag();
        self.buf.push('<');
        self.buf.push_str(ns.prefix());
        self.buf.push(':');
        self.buf.push_str(local);
        self.stack.push((ns, local));
        self.open = true;
    }

    /// Attribute on the currently open start tag.
    ///
    /// Must be called before any content is written into the element.
    pub fn attr(&mut self, name: &str, value: &str) {
        debug_assert!(self.open, "attr() after element content");
        self.buf.push(' ');
        self.buf.push_str(name);
        self.buf.push_str("=\"");
        escape_into(&mut self.buf, value, true);
        self.buf.push('"');
    }

    /// Attribute with a prefixed name (e.g. `xsi:type`).
    pub fn attr_qualified(&mut self, ns: Ns, name: &str, value: &str) {
        debug_assert!(self.open, "attr() after element content");
        self.buf.push(' ');
        self.buf.push_str(ns.prefix());
        self.buf.push(':');
        self.buf.push_str(name);
        self.buf.push_str("=\"");
        escape_into(&mut self.buf, value, true);
        self.buf.push('"');
    }

    /// Escaped character content.
    pub fn text(&mut self, s: &str) {
        self.close_open_tag();
        escape_into(&mut self.buf, s, false);
    }

    /// Verbatim markup (used for preserved extension elements).
    pub fn raw(&mut self, s: &str) {
        self.close_open_tag();
        self.buf.push_str(s);
    }

    /// Close the innermost element (self-closing when empty).
    pub fn end(&mut self) {
        debug_assert!(!self.stack.is_empty(), "end() without matching start()");
        let Some((ns, local)) = self.stack.pop() else {
            return;
        };
        if self.open {
            self.buf.push_str("/>");
            self.open = false;
        } else {
            self.buf.push_str("</");
            self.buf.push_str(ns.prefix());
            self.buf.push(':');
            self.buf.push_str(local);
            self.buf.push('>');
        }
    }

    /// Convenience: `<pfx:local>text</pfx:local>`.
    pub fn leaf_text(&mut self, ns: Ns, local: &'static str, text: &str) {
        self.start(ns, local);
        self.text(text);
        self.end();
    }

    /// Finish and return the document text.
    ///
    /// All elements must be closed.
    #[must_use]
    pub fn finish(self) -> String {
        debug_assert!(self.stack.is_empty(), "finish() with {} open elements", self.stack.len());
        self.buf
    }
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_into(buf: &mut String, s: &str, in_attr: bool) {
    for ch in s.chars() {
        match ch {
            '&' => buf.push_str("&amp;"),
            '<' => buf.push_str("&lt;"),
            '>' => buf.push_str("&gt;"),
            '"' if in_attr => buf.push_str("&quot;"),
            _ => buf.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_elements_and_self_closing() {
        let mut w = XmlWriter::new();
        w.start(Ns::Pm, "MdState");
        w.attr("StateVersion", "3");
        w.start(Ns::Pm, "State");
        w.attr("DescriptorHandle", "nm0");
        w.end();
        w.end();
        assert_eq!(
            w.finish(),
            r#"<pm:MdState StateVersion="3"><pm:State DescriptorHandle="nm0"/></pm:MdState>"#
        );
    }

    #[test]
    fn attribute_and_text_escaping() {
        let mut w = XmlWriter::new();
        w.start(Ns::Pm, "Type");
        w.attr("Code", "a<b&\"c\"");
        w.text("x < y & z");
        w.end();
        assert_eq!(
            w.finish(),
            r#"<pm:Type Code="a&lt;b&amp;&quot;c&quot;">x &lt; y &amp; z</pm:Type>"#
        );
    }

    #[test]
    fn root_declares_all_namespaces() {
        let mut w = XmlWriter::new();
        w.root(Ns::Msg, "Mdib");
        w.end();
        let out = w.finish();
        assert!(out.starts_with("<msg:Mdib xmlns:pm="));
        assert!(out.contains("xmlns:wsa=\"http://www.w3.org/2005/08/addressing\""));
        let parsed = roxmltree::Document::parse(&out).expect("writer output parses");
        assert_eq!(parsed.root_element().tag_name().name(), "Mdib");
    }
}
