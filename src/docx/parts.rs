use anyhow::Context;
use uuid::Uuid;

use super::package::DocxPackage;
use super::tree::{XmlDocument, XmlElement, XmlNode};
use crate::template::DATA_NAMESPACE;

pub const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub const REL_HEADER: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header";
pub const REL_FOOTER: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer";
pub const REL_CUSTOM_XML: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/customXml";
pub const REL_CUSTOM_XML_PROPS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/customXmlProps";

const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
const DATASTORE_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/customXml";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const CT_CUSTOM_XML_PROPS: &str =
    "application/vnd.openxmlformats-officedocument.customXmlProperties+xml";
const CT_XML: &str = "application/xml";
const DEFAULT_MAIN_PART: &str = "word/document.xml";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

/// `word/document.xml` -> `word/_rels/document.xml.rels`; the package itself (`""`)
/// -> `_rels/.rels`.
pub fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolves a relationship target against the directory of its source part.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        return abs.to_string();
    }
    let mut segments: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').filter(|s| !s.is_empty()).collect(),
        None => Vec::new(),
    };
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Relationships of `source_part`; a missing `.rels` part means none.
pub fn read_relationships(pkg: &DocxPackage, source_part: &str) -> anyhow::Result<Vec<Relationship>> {
    let path = rels_path_for(source_part);
    if !pkg.contains(&path) {
        return Ok(Vec::new());
    }
    let doc = pkg.read_xml(&path)?;
    Ok(doc
        .root
        .elements()
        .filter(|e| e.local_name() == "Relationship")
        .map(|e| Relationship {
            id: e.attr("Id").unwrap_or_default(),
            rel_type: e.attr("Type").unwrap_or_default(),
            target: e.attr("Target").unwrap_or_default(),
            external: e
                .attr("TargetMode")
                .map(|m| m.eq_ignore_ascii_case("external"))
                .unwrap_or(false),
        })
        .collect())
}

/// Parts holding document text, in scan order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentParts {
    pub main: String,
    pub headers: Vec<String>,
    pub footers: Vec<String>,
}

impl ContentParts {
    pub fn discover(pkg: &DocxPackage) -> anyhow::Result<Self> {
        let main = read_relationships(pkg, "")?
            .into_iter()
            .find(|r| r.rel_type == REL_OFFICE_DOCUMENT && !r.external)
            .map(|r| resolve_target("", &r.target))
            .unwrap_or_else(|| DEFAULT_MAIN_PART.to_string());
        if !pkg.contains(&main) {
            anyhow::bail!("missing main document part: {main}");
        }

        let mut headers = Vec::new();
        let mut footers = Vec::new();
        for rel in read_relationships(pkg, &main)? {
            if rel.external {
                continue;
            }
            let target = resolve_target(&main, &rel.target);
            if !pkg.contains(&target) {
                continue;
            }
            match rel.rel_type.as_str() {
                REL_HEADER => headers.push(target),
                REL_FOOTER => footers.push(target),
                _ => {}
            }
        }
        Ok(Self {
            main,
            headers,
            footers,
        })
    }

    /// Main document, then headers, then footers.
    pub fn all(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.main.as_str())
            .chain(self.headers.iter().map(String::as_str))
            .chain(self.footers.iter().map(String::as_str))
    }
}

/// A custom XML data part attached to the main document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomXmlPart {
    pub item: String,
    pub props: Option<String>,
    pub rel_id: String,
}

/// Custom XML parts whose root is `root` in the `template-data` namespace.
pub fn find_data_parts(pkg: &DocxPackage, main: &str) -> anyhow::Result<Vec<CustomXmlPart>> {
    let mut found = Vec::new();
    for rel in read_relationships(pkg, main)? {
        if rel.rel_type != REL_CUSTOM_XML || rel.external {
            continue;
        }
        let item = resolve_target(main, &rel.target);
        let Some(entry) = pkg.entry(&item) else {
            continue;
        };
        let Ok(doc) = XmlDocument::parse(&item, &entry.data) else {
            continue;
        };
        if !is_data_root(&doc.root) {
            continue;
        }
        let props = read_relationships(pkg, &item)?
            .into_iter()
            .find(|r| r.rel_type == REL_CUSTOM_XML_PROPS && !r.external)
            .map(|r| resolve_target(&item, &r.target));
        found.push(CustomXmlPart {
            item,
            props,
            rel_id: rel.id,
        });
    }
    Ok(found)
}

fn is_data_root(root: &XmlElement) -> bool {
    let key = match root.prefix() {
        Some(p) => format!("xmlns:{p}"),
        None => "xmlns".to_string(),
    };
    root.local_name() == crate::template::datadoc::DATA_ROOT
        && root.attr(&key).as_deref() == Some(DATA_NAMESPACE)
}

/// Removes every attached `template-data` part with its properties part, its
/// relationships, the main document's relationship and content-type overrides.
pub fn remove_data_parts(pkg: &mut DocxPackage, main: &str) -> anyhow::Result<usize> {
    let parts = find_data_parts(pkg, main)?;
    if parts.is_empty() {
        return Ok(0);
    }
    let rel_ids: Vec<&str> = parts.iter().map(|p| p.rel_id.as_str()).collect();
    let rels_path = rels_path_for(main);
    let mut rels = pkg.read_xml(&rels_path)?;
    rels.root.children.retain(|c| match c {
        XmlNode::Element(e) => e
            .attr("Id")
            .map(|id| !rel_ids.contains(&id.as_str()))
            .unwrap_or(true),
        _ => true,
    });
    pkg.write_xml(&rels)?;

    let mut removed_names: Vec<String> = Vec::new();
    for p in &parts {
        pkg.remove_entry(&p.item);
        pkg.remove_entry(&rels_path_for(&p.item));
        removed_names.push(p.item.clone());
        if let Some(props) = &p.props {
            pkg.remove_entry(props);
            removed_names.push(props.clone());
        }
    }
    if pkg.contains(CONTENT_TYPES_PART) {
        let mut ct = pkg.read_xml(CONTENT_TYPES_PART)?;
        ct.root.children.retain(|c| match c {
            XmlNode::Element(e) if e.local_name() == "Override" => e
                .attr("PartName")
                .map(|n| !removed_names.iter().any(|r| n.trim_start_matches('/') == r))
                .unwrap_or(true),
            _ => true,
        });
        pkg.write_xml(&ct)?;
    }
    Ok(parts.len())
}

/// Adds `data` as a new custom XML part bound to the main document and returns its
/// `{GUID}` item id.
pub fn attach_data_part(pkg: &mut DocxPackage, main: &str, data: Vec<u8>) -> anyhow::Result<String> {
    let n = (1usize..)
        .find(|n| {
            !pkg.contains(&format!("customXml/item{n}.xml"))
                && !pkg.contains(&format!("customXml/itemProps{n}.xml"))
        })
        .unwrap_or(1);
    let item = format!("customXml/item{n}.xml");
    let props = format!("customXml/itemProps{n}.xml");
    let item_id = new_item_id();

    pkg.set_entry(&item, data);

    let props_root = XmlElement::new("ds:datastoreItem")
        .with_attr("ds:itemID", &item_id)
        .with_attr("xmlns:ds", DATASTORE_NS)
        .with_child(XmlElement::new("ds:schemaRefs"));
    pkg.write_xml(&XmlDocument::with_root(&props, props_root))?;

    let item_rels = XmlElement::new("Relationships")
        .with_attr("xmlns", RELS_NS)
        .with_child(relationship("rId1", REL_CUSTOM_XML_PROPS, &format!("itemProps{n}.xml")));
    pkg.write_xml(&XmlDocument::with_root(&rels_path_for(&item), item_rels))?;

    let rels_path = rels_path_for(main);
    let mut rels = if pkg.contains(&rels_path) {
        pkg.read_xml(&rels_path)?
    } else {
        XmlDocument::with_root(&rels_path, XmlElement::new("Relationships").with_attr("xmlns", RELS_NS))
    };
    let rel_id = next_rel_id(&rels.root);
    rels.root.children.push(XmlNode::Element(relationship(
        &rel_id,
        REL_CUSTOM_XML,
        &relative_target(main, &item),
    )));
    pkg.write_xml(&rels)?;

    register_content_types(pkg, &props)
        .with_context(|| format!("register content types: {props}"))?;
    Ok(item_id)
}

/// Drops previously attached data parts and attaches `data` in their place.
pub fn replace_data_part(pkg: &mut DocxPackage, main: &str, data: Vec<u8>) -> anyhow::Result<String> {
    remove_data_parts(pkg, main)?;
    attach_data_part(pkg, main, data)
}

/// Overwrites the first attached data part in place, attaching one when absent.
/// Returns the part name.
pub fn overwrite_data_part(pkg: &mut DocxPackage, main: &str, data: Vec<u8>) -> anyhow::Result<String> {
    if let Some(part) = find_data_parts(pkg, main)?.into_iter().next() {
        pkg.set_entry(&part.item, data);
        return Ok(part.item);
    }
    attach_data_part(pkg, main, data)?;
    find_data_parts(pkg, main)?
        .into_iter()
        .next()
        .map(|p| p.item)
        .context("attached data part not found")
}

fn register_content_types(pkg: &mut DocxPackage, props: &str) -> anyhow::Result<()> {
    let mut ct = if pkg.contains(CONTENT_TYPES_PART) {
        pkg.read_xml(CONTENT_TYPES_PART)?
    } else {
        XmlDocument::with_root(
            CONTENT_TYPES_PART,
            XmlElement::new("Types").with_attr("xmlns", CONTENT_TYPES_NS),
        )
    };
    let has_xml_default = ct.root.elements().any(|e| {
        e.local_name() == "Default"
            && e.attr("Extension")
                .map(|x| x.eq_ignore_ascii_case("xml"))
                .unwrap_or(false)
    });
    if !has_xml_default {
        let default = XmlElement::new("Default")
            .with_attr("Extension", "xml")
            .with_attr("ContentType", CT_XML);
        // Defaults come before overrides.
        let at = ct
            .root
            .children
            .iter()
            .position(|c| matches!(c, XmlNode::Element(e) if e.local_name() == "Override"))
            .unwrap_or(ct.root.children.len());
        ct.root
            .children
            .insert(at, XmlNode::Element(default));
    }
    let part_name = format!("/{props}");
    let has_override = ct.root.elements().any(|e| {
        e.local_name() == "Override" && e.attr("PartName").as_deref() == Some(part_name.as_str())
    });
    if !has_override {
        ct.root.children.push(XmlNode::Element(
            XmlElement::new("Override")
                .with_attr("PartName", &part_name)
                .with_attr("ContentType", CT_CUSTOM_XML_PROPS),
        ));
    }
    pkg.write_xml(&ct)
}

fn relationship(id: &str, rel_type: &str, target: &str) -> XmlElement {
    XmlElement::new("Relationship")
        .with_attr("Id", id)
        .with_attr("Type", rel_type)
        .with_attr("Target", target)
}

fn next_rel_id(rels_root: &XmlElement) -> String {
    let used: Vec<String> = rels_root.elements().filter_map(|e| e.attr("Id")).collect();
    (1usize..)
        .map(|n| format!("rId{n}"))
        .find(|id| !used.contains(id))
        .unwrap_or_else(|| format!("rId{}", used.len() + 1))
}

/// Target of `part` as seen from `source_part`, e.g. `../customXml/item1.xml`.
fn relative_target(source_part: &str, part: &str) -> String {
    let depth = source_part.matches('/').count();
    format!("{}{}", "../".repeat(depth), part)
}

fn new_item_id() -> String {
    format!("{{{}}}", Uuid::new_v4().to_string().to_uppercase())
}
