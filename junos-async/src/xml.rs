//! Minimal element tree over quick-xml events.
//!
//! Junos replies carry arbitrary, RPC specific payloads, so they are read
//! into an [`XmlNode`] tree instead of typed structs. Namespace prefixes are
//! dropped from element and attribute names and namespace declarations are
//! not kept.
//!
//! Paths accepted by [`XmlNode::find`] and friends are a small XPath subset:
//! `a/b/c` walks children, a leading `//` searches all descendants for the
//! first step, `.` is the node itself, `*` any child, a trailing `@name`
//! selects an attribute, and a step may carry one `[child='value']`
//! predicate.
use crate::error::{JunosClientError, JunosClientResult};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> XmlNode {
        XmlNode {
            name: name.into(),
            ..XmlNode::default()
        }
    }

    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> XmlNode {
        XmlNode {
            name: name.into(),
            text: text.into(),
            ..XmlNode::default()
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> XmlNode {
        self.set_attribute(key, value);
        self
    }

    pub fn child(mut self, child: XmlNode) -> XmlNode {
        self.children.push(child);
        self
    }

    pub fn push(&mut self, child: XmlNode) {
        self.children.push(child);
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Parses a document and returns its root element.
    pub fn parse(xml: &str) -> JunosClientResult<XmlNode> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;
        loop {
            match reader.read_event()? {
                Event::Start(start) => stack.push(XmlNode::from_start(&start)?),
                Event::Empty(start) => {
                    let node = XmlNode::from_start(&start)?;
                    attach(&mut stack, &mut root, node);
                }
                Event::End(_) => {
                    if let Some(node) = stack.pop() {
                        attach(&mut stack, &mut root, node);
                    }
                }
                Event::Text(text) => {
                    if let Some(node) = stack.last_mut() {
                        node.text.push_str(&text.unescape()?);
                    }
                }
                Event::CData(data) => {
                    if let Some(node) = stack.last_mut() {
                        node.text
                            .push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        if !stack.is_empty() {
            return Err(JunosClientError::new(format!(
                "unexpected end of XML document inside <{}>",
                stack[stack.len() - 1].name
            )));
        }
        root.ok_or_else(|| JunosClientError::new("XML document has no root element".to_string()))
    }

    fn from_start(start: &BytesStart) -> JunosClientResult<XmlNode> {
        let mut node = XmlNode::new(String::from_utf8_lossy(start.local_name().as_ref()));
        for attribute in start.attributes() {
            let attribute = attribute.map_err(quick_xml::Error::from)?;
            let raw_key = attribute.key.as_ref();
            if raw_key == b"xmlns" || raw_key.starts_with(b"xmlns:") {
                continue;
            }
            let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
            let value = attribute.unescape_value()?.into_owned();
            node.attributes.push((key, value));
        }
        Ok(node)
    }

    pub fn find(&self, path: &str) -> Option<&XmlNode> {
        self.find_all(path).into_iter().next()
    }

    pub fn find_all(&self, path: &str) -> Vec<&XmlNode> {
        let (descendant, path) = match path.strip_prefix("//") {
            Some(rest) => (true, rest),
            None => (false, path),
        };
        let mut segments = split_segments(path).into_iter();
        let mut current = if descendant {
            let Some(first) = segments.next() else {
                return Vec::new();
            };
            let mut matches = Vec::new();
            self.collect_descendants(&Step::parse(first), &mut matches);
            matches
        } else {
            vec![self]
        };
        for segment in segments {
            let step = Step::parse(segment);
            current = current
                .into_iter()
                .flat_map(|node| step.apply(node))
                .collect();
        }
        current
    }

    /// Trimmed text of the first match, or an attribute value when the path
    /// ends in `@name`.
    pub fn findtext(&self, path: &str) -> Option<&str> {
        let (element_path, attribute) = match path.rsplit_once('/') {
            Some((head, last)) if last.starts_with('@') => (head, Some(&last[1..])),
            None if path.starts_with('@') => ("", Some(&path[1..])),
            _ => (path, None),
        };
        let node = self.find(element_path)?;
        match attribute {
            Some(attribute) => node.attribute(attribute),
            None => Some(node.text.trim()),
        }
    }

    fn collect_descendants<'a>(&'a self, step: &Step, out: &mut Vec<&'a XmlNode>) {
        for child in &self.children {
            if step.matches(child) {
                out.push(child);
            }
            child.collect_descendants(step, out);
        }
    }

    /// Concatenated text of this node and all of its descendants.
    pub fn text_content(&self) -> String {
        let mut text = self.text.clone();
        for child in &self.children {
            text.push_str(&child.text_content());
        }
        text
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write(&mut out, None, 0);
        out
    }

    pub fn to_pretty_xml(&self) -> String {
        let mut out = String::new();
        self.write(&mut out, Some(2), 0);
        out
    }

    fn write(&self, out: &mut String, indent: Option<usize>, depth: usize) {
        let pad = indent.map(|n| " ".repeat(n * depth)).unwrap_or_default();
        out.push_str(&pad);
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push_str(&format!(" {}=\"{}\"", key, escape(value.as_str())));
        }
        if self.children.is_empty() && self.text.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        out.push_str(&escape(self.text.as_str()));
        if !self.children.is_empty() {
            for child in &self.children {
                if indent.is_some() {
                    out.push('\n');
                }
                child.write(out, indent, depth + 1);
            }
            if indent.is_some() {
                out.push('\n');
                out.push_str(&pad);
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    /// Converts the tree into JSON keyed by the root element name.
    ///
    /// Text-only elements become strings, repeated siblings become arrays,
    /// attributes are stored as `@name` and text next to children as `#text`.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert(self.name.clone(), self.json_value());
        Value::Object(map)
    }

    fn json_value(&self) -> Value {
        let text = self.text.trim();
        if self.children.is_empty() && self.attributes.is_empty() {
            return Value::String(text.to_string());
        }
        let mut map = Map::new();
        for (key, value) in &self.attributes {
            map.insert(format!("@{}", key), Value::String(value.clone()));
        }
        if !text.is_empty() {
            map.insert("#text".to_string(), Value::String(text.to_string()));
        }
        for child in &self.children {
            let value = child.json_value();
            let merged = match map.remove(&child.name) {
                None => value,
                Some(Value::Array(mut items)) => {
                    items.push(value);
                    Value::Array(items)
                }
                Some(existing) => Value::Array(vec![existing, value]),
            };
            map.insert(child.name.clone(), merged);
        }
        Value::Object(map)
    }
}

/// Splits a path on `/` outside of `[...]` predicates.
fn split_segments(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (idx, c) in path.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '/' if depth == 0 => {
                segments.push(&path[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    segments.push(&path[start..]);
    segments.into_iter().filter(|s| !s.is_empty()).collect()
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

struct Step<'a> {
    name: &'a str,
    predicate: Option<(&'a str, &'a str)>,
}

impl<'a> Step<'a> {
    fn parse(segment: &'a str) -> Step<'a> {
        let Some((name, rest)) = segment.split_once('[') else {
            return Step {
                name: segment,
                predicate: None,
            };
        };
        let predicate = rest.strip_suffix(']').and_then(|body| {
            let (field, value) = body.split_once('=')?;
            let value = value.trim().trim_matches(|c| c == '\'' || c == '"');
            Some((field.trim(), value))
        });
        Step { name, predicate }
    }

    fn matches(&self, node: &XmlNode) -> bool {
        if self.name != "*" && node.name != self.name {
            return false;
        }
        match self.predicate {
            Some((field, value)) => node.findtext(field) == Some(value),
            None => true,
        }
    }

    fn apply<'n>(&self, node: &'n XmlNode) -> Vec<&'n XmlNode> {
        match self.name {
            "." => vec![node],
            _ => node.children.iter().filter(|c| self.matches(c)).collect(),
        }
    }
}
