use crate::template::scan::TAG_RE;
use crate::template::xpath::{binding_prefix_mappings, binding_xpath};
use crate::template::{TagMap, DATA_NAMESPACE};

use super::runs::{
    build_run_map, locate_run_span, runs_covering, split_run_in_paragraph, text_element, RunSlice,
};
use super::tree::{XmlElement, XmlNode};

/// Replaces `{tag}` placeholders with locked, data-bound run-level content controls.
pub struct ContentControlBinder<'a> {
    tag_map: &'a TagMap,
    store_item_id: &'a str,
}

/// One placeholder occurrence in a paragraph's run text.
struct TagMatch {
    start: usize,
    len: usize,
    full: String,
    raw: String,
}

impl<'a> ContentControlBinder<'a> {
    pub fn new(tag_map: &'a TagMap, store_item_id: &'a str) -> Self {
        Self {
            tag_map,
            store_item_id,
        }
    }

    /// Binds every placeholder under `root` and returns the number of fields created.
    /// Paragraphs that already sit inside a `w:sdt` are left untouched; fields bound to
    /// an earlier data part are pointed at the current store item.
    pub fn bind_part(&self, root: &mut XmlElement) -> usize {
        self.bind_tree(root, false)
    }

    fn bind_tree(&self, elem: &mut XmlElement, in_sdt: bool) -> usize {
        let in_sdt = in_sdt || elem.name == "w:sdt";
        if elem.name == "w:sdt" {
            self.retarget(elem);
        }
        let mut bound = 0;
        for child in elem.elements_mut() {
            bound += self.bind_tree(child, in_sdt);
        }
        if elem.name == "w:p" && !in_sdt {
            bound += self.bind_paragraph(elem);
        }
        bound
    }

    fn retarget(&self, sdt: &mut XmlElement) {
        let Some(binding) = sdt
            .child_mut("w:sdtPr")
            .and_then(|pr| pr.child_mut("w:dataBinding"))
        else {
            return;
        };
        let ours = binding
            .attr("w:prefixMappings")
            .is_some_and(|m| m.contains(DATA_NAMESPACE));
        if ours {
            binding.set_attr("w:storeItemID", self.store_item_id);
        }
    }

    /// Binds the placeholders found in the paragraph's direct runs, last to first so
    /// that earlier offsets stay valid.
    pub fn bind_paragraph(&self, paragraph: &mut XmlElement) -> usize {
        let (_, text) = build_run_map(paragraph);
        let matches: Vec<TagMatch> = TAG_RE
            .captures_iter(&text)
            .filter_map(|c| {
                let whole = c.get(0)?;
                let raw = c.get(1)?.as_str().trim();
                if raw.is_empty() {
                    return None;
                }
                Some(TagMatch {
                    start: whole.start(),
                    len: whole.len(),
                    full: whole.as_str().to_string(),
                    raw: raw.to_string(),
                })
            })
            .collect();

        let mut bound = 0;
        for m in matches.iter().rev() {
            let Some(name) = self.tag_map.get(&m.raw) else {
                continue;
            };
            if self.bind_match(paragraph, m, name).is_some() {
                bound += 1;
            }
        }
        bound
    }

    fn bind_match(&self, paragraph: &mut XmlElement, m: &TagMatch, name: &str) -> Option<()> {
        let (slices, _) = build_run_map(paragraph);
        let span = locate_run_span(&slices, m.start, m.len)?;
        let last = &slices[span.last];
        if span.end_offset > 0 && span.end_offset < last.len() {
            split_run_in_paragraph(paragraph, last.child_index, 0, span.end_offset)?;
        }

        let (slices, _) = build_run_map(paragraph);
        let span = locate_run_span(&slices, m.start, m.len)?;
        let first = &slices[span.first];
        if span.start_offset > 0 && span.start_offset < first.len() {
            let rest = first.len() - span.start_offset;
            split_run_in_paragraph(paragraph, first.child_index, span.start_offset, rest)?;
        }

        let (mut slices, _) = build_run_map(paragraph);
        let mut covering = runs_covering(&slices, m.start, m.len);
        if covering.len() == 1 {
            let slice = &slices[covering[0]];
            if slice.text != m.full {
                let at = slice.text.find(&m.full)?;
                split_run_in_paragraph(paragraph, slice.child_index, at, m.full.len())?;
                slices = build_run_map(paragraph).0;
                covering = runs_covering(&slices, m.start, m.len);
            }
        }
        let exact: Vec<&RunSlice> = covering.iter().map(|&i| &slices[i]).collect();
        let anchor = exact.first()?.child_index;

        let style = paragraph
            .element_at(anchor)
            .and_then(|r| r.child("w:rPr"))
            .cloned();
        let field = self.bound_field(&m.raw, name, style);

        let mut remove: Vec<usize> = exact.iter().map(|s| s.child_index).collect();
        remove.sort_unstable();
        for idx in remove.into_iter().rev() {
            paragraph.children.remove(idx);
        }
        paragraph
            .children
            .insert(anchor, XmlNode::Element(field));
        Some(())
    }

    /// `w:sdt` wired to `/ns0:root/ns0:<name>` with one display run showing `{raw}`.
    fn bound_field(&self, raw: &str, name: &str, style: Option<XmlElement>) -> XmlElement {
        let props = XmlElement::new("w:sdtPr")
            .with_child(XmlElement::new("w:alias").with_attr("w:val", raw))
            .with_child(XmlElement::new("w:tag").with_attr("w:val", raw))
            .with_child(XmlElement::new("w:lock").with_attr("w:val", "sdtLocked"))
            .with_child(
                XmlElement::new("w:dataBinding")
                    .with_attr("w:prefixMappings", &binding_prefix_mappings())
                    .with_attr("w:xpath", &binding_xpath(name))
                    .with_attr("w:storeItemID", self.store_item_id),
            );

        let mut display = XmlElement::new("w:r");
        if let Some(rpr) = style {
            display.children.push(XmlNode::Element(rpr));
        }
        display
            .children
            .push(XmlNode::Element(text_element(&format!("{{{raw}}}"))));

        XmlElement::new("w:sdt")
            .with_child(props)
            .with_child(XmlElement::new("w:sdtContent").with_child(display))
    }
}
