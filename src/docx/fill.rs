use crate::template::xpath::final_step_local_name;
use crate::template::DataDocument;

use super::runs::text_element;
use super::tree::{XmlElement, XmlNode};

/// Writes data sheet values into every data-bound run-level field under `root`.
///
/// The value is looked up by the local name of the binding's final path step; names
/// missing from the sheet produce an empty value. Returns the number of fields written.
pub fn fill_bound_fields(root: &mut XmlElement, data: &DataDocument) -> usize {
    fill_tree(root, data, false)
}

fn fill_tree(elem: &mut XmlElement, data: &DataDocument, in_paragraph: bool) -> usize {
    let in_paragraph = in_paragraph || elem.name == "w:p";
    let mut filled = 0;
    for child in elem.elements_mut() {
        if in_paragraph && child.name == "w:sdt" && fill_field(child, data) {
            filled += 1;
        }
        filled += fill_tree(child, data, in_paragraph);
    }
    filled
}

fn fill_field(sdt: &mut XmlElement, data: &DataDocument) -> bool {
    let Some(xpath) = sdt
        .child("w:sdtPr")
        .and_then(|pr| pr.child("w:dataBinding"))
        .and_then(|b| b.attr("w:xpath"))
    else {
        return false;
    };
    let value = final_step_local_name(&xpath)
        .and_then(|name| data.value(name))
        .unwrap_or_default()
        .to_string();
    let end_style = sdt
        .child("w:sdtEndPr")
        .and_then(|e| e.child("w:rPr"))
        .cloned();

    let content = sdt.ensure_child("w:sdtContent");
    if content.child("w:r").is_none() {
        content.children.push(XmlNode::Element(XmlElement::new("w:r")));
    }
    if let Some(run) = content.child_mut("w:r") {
        if let Some(rpr) = end_style {
            adopt_style(run, rpr);
        }
        set_run_text(run, &value);
    }
    true
}

/// A display run without its own properties takes the field's end-of-content style.
fn adopt_style(run: &mut XmlElement, rpr: XmlElement) {
    if rpr.elements().next().is_none() {
        return;
    }
    match run.child_index("w:rPr") {
        Some(i) if run.element_at(i).is_some_and(|e| e.elements().next().is_none()) => {
            run.children[i] = XmlNode::Element(rpr);
        }
        Some(_) => {}
        None => run.children.insert(0, XmlNode::Element(rpr)),
    }
}

/// Puts `value` into the run's first `w:t` and drops any further ones.
fn set_run_text(run: &mut XmlElement, value: &str) {
    let Some(first) = run.child_index("w:t") else {
        run.children.push(XmlNode::Element(text_element(value)));
        return;
    };
    let mut seen = 0usize;
    run.children.retain(|c| match c {
        XmlNode::Element(e) if e.name == "w:t" => {
            seen += 1;
            seen == 1
        }
        _ => true,
    });
    if let Some(t) = run.element_at_mut(first) {
        t.set_attr("xml:space", "preserve");
        t.set_text(value);
    }
}
