use anyhow::{anyhow, Context};

use super::xml::{escape_attr, read_events, unescape_attr, write_events, XmlEvent};

/// Owned element tree over the lossless event stream of one package part.
///
/// Attribute values keep the raw (escaped) representation used by [`XmlEvent`]; use
/// [`XmlElement::attr`] / [`XmlElement::set_attr`] to work with decoded values.
#[derive(Clone, Debug, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    /// Comments, CDATA and processing instructions inside the root element.
    Other(XmlEvent),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

#[derive(Clone, Debug)]
pub struct XmlDocument {
    pub name: String,
    pub prolog: Vec<XmlEvent>,
    pub root: XmlElement,
    pub epilog: Vec<XmlEvent>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(p, _)| p)
    }

    pub fn attr(&self, key: &str) -> Option<String> {
        self.raw_attr(key).map(|v| unescape_attr(v).into_owned())
    }

    pub fn raw_attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: &str) {
        let raw = escape_attr(value);
        for (k, v) in self.attrs.iter_mut() {
            if k == key {
                *v = raw;
                return;
            }
        }
        self.attrs.push((key.to_string(), raw));
    }

    pub fn remove_attr(&mut self, key: &str) -> bool {
        let before = self.attrs.len();
        self.attrs.retain(|(k, _)| k != key);
        before != self.attrs.len()
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|e| e.name == name)
    }

    /// Index into `children` of the first element named `name`.
    pub fn child_index(&self, name: &str) -> Option<usize> {
        self.children
            .iter()
            .position(|c| matches!(c, XmlNode::Element(e) if e.name == name))
    }

    pub fn element_at(&self, index: usize) -> Option<&XmlElement> {
        match self.children.get(index) {
            Some(XmlNode::Element(e)) => Some(e),
            _ => None,
        }
    }

    pub fn element_at_mut(&mut self, index: usize) -> Option<&mut XmlElement> {
        match self.children.get_mut(index) {
            Some(XmlNode::Element(e)) => Some(e),
            _ => None,
        }
    }

    /// Returns the child named `name`, appending an empty one when missing.
    pub fn ensure_child(&mut self, name: &str) -> &mut XmlElement {
        let idx = match self.child_index(name) {
            Some(i) => i,
            None => {
                self.children.push(XmlNode::Element(XmlElement::new(name)));
                self.children.len() - 1
            }
        };
        match &mut self.children[idx] {
            XmlNode::Element(e) => e,
            _ => unreachable!("child_index only returns element positions"),
        }
    }

    /// Concatenated character data of this element's direct text children.
    pub fn own_text(&self) -> String {
        let mut out = String::new();
        for c in &self.children {
            match c {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Other(XmlEvent::CData { text }) => out.push_str(text),
                _ => {}
            }
        }
        out
    }

    /// Concatenated character data of all descendants.
    pub fn deep_text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Replaces all character data with a single text node.
    pub fn set_text(&mut self, text: &str) {
        self.children
            .retain(|c| !matches!(c, XmlNode::Text(_) | XmlNode::Other(XmlEvent::CData { .. })));
        if !text.is_empty() {
            self.children.push(XmlNode::Text(text.to_string()));
        }
    }

    pub fn count_descendants(&self, name: &str) -> usize {
        self.elements()
            .map(|e| usize::from(e.name == name) + e.count_descendants(name))
            .sum()
    }

    /// Depth-first pre-order visit of this element and all descendant elements.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a XmlElement)) {
        f(self);
        for e in self.elements() {
            e.visit(f);
        }
    }
}

fn collect_text(elem: &XmlElement, out: &mut String) {
    for c in &elem.children {
        match c {
            XmlNode::Text(t) => out.push_str(t),
            XmlNode::Other(XmlEvent::CData { text }) => out.push_str(text),
            XmlNode::Element(e) => collect_text(e, out),
            XmlNode::Other(_) => {}
        }
    }
}

pub fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name)
}

impl XmlDocument {
    pub fn parse(name: &str, bytes: &[u8]) -> anyhow::Result<Self> {
        let events = read_events(bytes).with_context(|| format!("parse xml: {name}"))?;
        Self::from_events(name, events)
    }

    /// Builds the tree from a flat event list; everything outside the root element is
    /// kept as prolog or epilog.
    pub fn from_events(part_name: &str, events: Vec<XmlEvent>) -> anyhow::Result<Self> {
        let mut prolog: Vec<XmlEvent> = Vec::new();
        let mut epilog: Vec<XmlEvent> = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        for ev in events {
            match ev {
                XmlEvent::Start { name, attrs } => {
                    if root.is_some() {
                        return Err(anyhow!("multiple root elements in {part_name}"));
                    }
                    stack.push(XmlElement {
                        name,
                        attrs,
                        children: Vec::new(),
                    });
                }
                XmlEvent::Empty { name, attrs } => {
                    let elem = XmlElement {
                        name,
                        attrs,
                        children: Vec::new(),
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(XmlNode::Element(elem)),
                        None if root.is_none() => root = Some(elem),
                        None => return Err(anyhow!("multiple root elements in {part_name}")),
                    }
                }
                XmlEvent::End { name } => {
                    let elem = stack
                        .pop()
                        .ok_or_else(|| anyhow!("unexpected </{name}> in {part_name}"))?;
                    if elem.name != name {
                        return Err(anyhow!(
                            "mismatched </{name}> (open <{}>) in {part_name}",
                            elem.name
                        ));
                    }
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(XmlNode::Element(elem)),
                        None => root = Some(elem),
                    }
                }
                XmlEvent::Text { text } => match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Text(text)),
                    // Whitespace between prolog/epilog nodes is kept verbatim.
                    None if root.is_none() => prolog.push(XmlEvent::Text { text }),
                    None => epilog.push(XmlEvent::Text { text }),
                },
                other => match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Other(other)),
                    None if root.is_none() => prolog.push(other),
                    None => epilog.push(other),
                },
            }
        }

        if let Some(open) = stack.last() {
            return Err(anyhow!("unclosed <{}> in {part_name}", open.name));
        }
        let root = root.ok_or_else(|| anyhow!("no root element in {part_name}"))?;
        Ok(Self {
            name: part_name.to_string(),
            prolog,
            root,
            epilog,
        })
    }

    pub fn events(&self) -> Vec<XmlEvent> {
        let mut events = self.prolog.clone();
        push_element_events(&self.root, &mut events);
        events.extend(self.epilog.iter().cloned());
        events
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        write_events(&self.events()).with_context(|| format!("serialize xml: {}", self.name))
    }

    /// Creates a standalone document with the usual `<?xml ... standalone="yes"?>` prolog.
    pub fn with_root(name: &str, root: XmlElement) -> Self {
        Self {
            name: name.to_string(),
            prolog: vec![XmlEvent::Decl {
                version: "1.0".to_string(),
                encoding: Some("UTF-8".to_string()),
                standalone: Some("yes".to_string()),
            }],
            root,
            epilog: Vec::new(),
        }
    }
}

fn push_element_events(elem: &XmlElement, out: &mut Vec<XmlEvent>) {
    if elem.children.is_empty() {
        out.push(XmlEvent::Empty {
            name: elem.name.clone(),
            attrs: elem.attrs.clone(),
        });
        return;
    }
    out.push(XmlEvent::Start {
        name: elem.name.clone(),
        attrs: elem.attrs.clone(),
    });
    for c in &elem.children {
        match c {
            XmlNode::Element(e) => push_element_events(e, out),
            XmlNode::Text(t) => out.push(XmlEvent::Text { text: t.clone() }),
            XmlNode::Other(ev) => out.push(ev.clone()),
        }
    }
    out.push(XmlEvent::End {
        name: elem.name.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::{XmlDocument, XmlElement};

    #[test]
    fn parse_and_write_keep_structure() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="urn:w"><w:body><w:p><w:r><w:t xml:space="preserve"> a &amp; b </w:t></w:r><!--c--></w:p><w:sectPr/></w:body></w:document>"#;
        let doc = XmlDocument::parse("word/document.xml", xml).expect("parse");
        assert_eq!(doc.root.name, "w:document");
        let out = String::from_utf8(doc.to_bytes().expect("write")).expect("utf8");
        assert_eq!(out.as_bytes(), &xml[..]);
    }

    #[test]
    fn rejects_mismatched_tags() {
        assert!(XmlDocument::parse("bad.xml", b"<a><b></a></b>").is_err());
        assert!(XmlDocument::parse("empty.xml", b"<?xml version=\"1.0\"?>").is_err());
    }

    #[test]
    fn attrs_are_decoded_and_encoded() {
        let mut e = XmlElement::new("w:alias").with_attr("w:val", "A & \"B\"");
        assert_eq!(e.raw_attr("w:val"), Some("A &amp; &quot;B&quot;"));
        assert_eq!(e.attr("w:val").as_deref(), Some("A & \"B\""));
        e.set_attr("w:val", "C");
        assert_eq!(e.attrs.len(), 1);
        assert!(e.remove_attr("w:val"));
        assert!(e.attrs.is_empty());
    }

    #[test]
    fn text_helpers() {
        let mut p = XmlElement::new("w:p")
            .with_child(XmlElement::new("w:r").with_child(XmlElement::new("w:t").with_text("ab")))
            .with_child(XmlElement::new("w:r").with_child(XmlElement::new("w:t").with_text("cd")));
        assert_eq!(p.deep_text(), "abcd");
        assert_eq!(p.count_descendants("w:t"), 2);
        p.ensure_child("w:pPr");
        assert_eq!(p.child_index("w:pPr"), Some(2));
        let t = p.child_mut("w:r").and_then(|r| r.child_mut("w:t")).expect("t");
        t.set_text("zz");
        assert_eq!(t.own_text(), "zz");
    }
}
