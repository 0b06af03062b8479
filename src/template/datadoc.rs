use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Context;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::docx::tree::{XmlDocument, XmlElement};

use super::sanitize::sanitize_xml_name;

/// Namespace of the companion data document and of every bound field's path.
pub const DATA_NAMESPACE: &str = "template-data";
pub const DATA_ROOT: &str = "root";
pub const MODIFICATION_DATE_ATTR: &str = "modification-date";

/// Ordered raw tag → element name mapping for one generation pass.
#[derive(Clone, Debug, Default)]
pub struct TagMap {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl TagMap {
    pub fn get(&self, raw: &str) -> Option<&str> {
        self.index.get(raw).map(|&i| self.entries[i].1.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(r, n)| (r.as_str(), n.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Maps each raw tag to a sanitized element name unique within this call.
///
/// Collisions get `_2`, `_3`, ... in encounter order; a repeated raw tag keeps the
/// name it was given first.
pub fn build_tag_map<S: AsRef<str>>(ordered_raw: &[S]) -> TagMap {
    let mut map = TagMap::default();
    let mut used: HashSet<String> = HashSet::new();
    for raw in ordered_raw {
        let raw = raw.as_ref();
        if map.index.contains_key(raw) {
            continue;
        }
        let base = sanitize_xml_name(raw);
        let mut name = base.clone();
        let mut i = 2usize;
        while !used.insert(name.clone()) {
            name = format!("{base}_{i}");
            i += 1;
        }
        map.index.insert(raw.to_string(), map.entries.len());
        map.entries.push((raw.to_string(), name));
    }
    map
}

#[derive(Clone, Debug, PartialEq)]
pub struct DataEntry {
    pub name: String,
    pub value: String,
    /// Decoded attribute values other than namespace declarations.
    pub attrs: Vec<(String, String)>,
}

impl DataEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            attrs: Vec::new(),
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// The companion data sheet: `<root xmlns="template-data">` with one element per tag.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataDocument {
    pub entries: Vec<DataEntry>,
}

pub fn build_data_document<S: AsRef<str>>(ordered_raw: &[S], tag_map: &TagMap) -> DataDocument {
    let entries = ordered_raw
        .iter()
        .filter_map(|raw| {
            let raw = raw.as_ref();
            tag_map
                .get(raw)
                .map(|name| DataEntry::new(name, format!("{{{raw}}}")))
        })
        .collect();
    DataDocument { entries }
}

impl DataDocument {
    pub fn value(&self, name: &str) -> Option<&str> {
        self.entry(name).map(|e| e.value.as_str())
    }

    pub fn entry(&self, name: &str) -> Option<&DataEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Sets the value of an existing element; returns false when `name` is unknown.
    pub fn set_value(&mut self, name: &str, value: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(e) => {
                e.value = value.to_string();
                true
            }
            None => false,
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read data sheet: {}", path.display()))?;
        Self::parse(&bytes).with_context(|| format!("parse data sheet: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)
            .with_context(|| format!("write data sheet: {}", path.display()))
    }

    /// Reads the root's direct children that live in the root's namespace.
    pub fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        let doc = XmlDocument::parse("data.xml", bytes)?;
        let root = &doc.root;
        let root_ns = namespace_of(root, None);
        let mut entries = Vec::new();
        for child in root.elements() {
            if namespace_of(child, Some(root)) != root_ns {
                continue;
            }
            let attrs = child
                .attrs
                .iter()
                .filter(|(k, _)| k != "xmlns" && !k.starts_with("xmlns:"))
                .map(|(k, _)| (k.clone(), child.attr(k).unwrap_or_default()))
                .collect();
            entries.push(DataEntry {
                name: child.local_name().to_string(),
                value: child.deep_text(),
                attrs,
            });
        }
        Ok(Self { entries })
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), Some("yes"))))
            .context("write data decl")?;
        let mut root = BytesStart::new(DATA_ROOT);
        root.push_attribute(("xmlns", DATA_NAMESPACE));
        w.write_event(Event::Start(root)).context("write data root")?;
        for e in &self.entries {
            let mut start = BytesStart::new(e.name.as_str());
            for (k, v) in &e.attrs {
                start.push_attribute((k.as_str(), v.as_str()));
            }
            if e.value.is_empty() {
                w.write_event(Event::Empty(start))
                    .with_context(|| format!("write data element: {}", e.name))?;
                continue;
            }
            w.write_event(Event::Start(start))
                .with_context(|| format!("write data element: {}", e.name))?;
            w.write_event(Event::Text(BytesText::new(&e.value)))
                .with_context(|| format!("write data value: {}", e.name))?;
            w.write_event(Event::End(BytesEnd::new(e.name.as_str())))
                .with_context(|| format!("write data element: {}", e.name))?;
        }
        w.write_event(Event::End(BytesEnd::new(DATA_ROOT)))
            .context("write data root")?;
        Ok(w.into_inner())
    }

    /// Union by element name, first occurrence wins. Kept elements without a
    /// `modification-date` attribute receive `stamp`.
    pub fn merge<I>(docs: I, stamp: &str) -> Self
    where
        I: IntoIterator<Item = DataDocument>,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut entries = Vec::new();
        for doc in docs {
            for mut e in doc.entries {
                if !seen.insert(e.name.clone()) {
                    continue;
                }
                if e.attr(MODIFICATION_DATE_ATTR).is_none() {
                    e.attrs
                        .push((MODIFICATION_DATE_ATTR.to_string(), stamp.to_string()));
                }
                entries.push(e);
            }
        }
        Self { entries }
    }
}

/// Namespace URI of `elem`, resolved against its own declarations and then `parent`'s.
fn namespace_of(elem: &XmlElement, parent: Option<&XmlElement>) -> Option<String> {
    let key = match elem.prefix() {
        Some(p) => format!("xmlns:{p}"),
        None => "xmlns".to_string(),
    };
    elem.attr(&key)
        .or_else(|| parent.and_then(|p| p.attr(&key)))
        .filter(|ns| !ns.is_empty())
}
