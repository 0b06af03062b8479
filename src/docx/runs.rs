use super::tree::{XmlElement, XmlNode};

/// One direct `w:r` child of a paragraph with its place in the paragraph's run text.
///
/// Offsets are UTF-8 byte offsets and always sit on character boundaries. A slice is
/// only valid until the paragraph's children change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSlice {
    pub child_index: usize,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl RunSlice {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Concatenated text of a run's direct `w:t` children; `None` when it has none.
pub fn run_text(run: &XmlElement) -> Option<String> {
    let mut found = false;
    let mut out = String::new();
    for t in run.elements().filter(|e| e.name == "w:t") {
        found = true;
        out.push_str(&t.own_text());
    }
    found.then_some(out)
}

/// Slices for every direct run of `paragraph`, plus the concatenated run text.
pub fn build_run_map(paragraph: &XmlElement) -> (Vec<RunSlice>, String) {
    let mut slices = Vec::new();
    let mut text = String::new();
    for (child_index, node) in paragraph.children.iter().enumerate() {
        let XmlNode::Element(e) = node else {
            continue;
        };
        if e.name != "w:r" {
            continue;
        }
        let t = run_text(e).unwrap_or_default();
        let start = text.len();
        text.push_str(&t);
        slices.push(RunSlice {
            child_index,
            text: t,
            start,
            end: text.len(),
        });
    }
    (slices, text)
}

/// Runs holding the two ends of a span, with the ends relative to those runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSpan {
    pub first: usize,
    pub last: usize,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// Finds the runs (indices into `slices`) containing `start` and `start + len`.
///
/// A run contains an offset when `run.start <= offset <= run.end`, so an offset on
/// a boundary belongs to the earlier run. Missing ends fall back to the first and
/// last run respectively. `None` only for a paragraph without runs.
pub fn locate_run_span(slices: &[RunSlice], start: usize, len: usize) -> Option<RunSpan> {
    if slices.is_empty() {
        return None;
    }
    let end = start + len;
    let mut first: Option<(usize, usize)> = None;
    let mut last: Option<(usize, usize)> = None;
    for (i, s) in slices.iter().enumerate() {
        if first.is_none() && start >= s.start && start <= s.end {
            first = Some((i, start - s.start));
        }
        if end >= s.start && end <= s.end {
            last = Some((i, end - s.start));
            break;
        }
    }
    let (first, start_offset) = first.unwrap_or((0, 0));
    let (last, end_offset) = last.unwrap_or((slices.len() - 1, 0));
    Some(RunSpan {
        first,
        last,
        start_offset,
        end_offset,
    })
}

/// Indices into `slices` of the runs overlapping `[start, start + len)`.
pub fn runs_covering(slices: &[RunSlice], start: usize, len: usize) -> Vec<usize> {
    let end = start + len;
    slices
        .iter()
        .enumerate()
        .filter(|(_, s)| !(s.end <= start || s.start >= end))
        .map(|(i, _)| i)
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct SplitRun {
    pub left: Option<XmlElement>,
    pub mid: XmlElement,
    pub right: Option<XmlElement>,
}

enum Piece {
    Text(String),
    Node(XmlNode),
}

/// Splits a run into `[0, offset)`, `[offset, offset + len)` and the rest.
///
/// Every produced run copies the original's attributes and `w:rPr`; empty outer
/// slices are omitted. Other run content (tabs, breaks, markers) stays in order and
/// goes to the slice it sits in; content exactly on a boundary stays with the outer
/// slice when there is one. Returns `None`, without touching anything, when the run
/// has no text or the range is empty, out of bounds, or not on character boundaries.
pub fn split_run(run: &XmlElement, offset: usize, len: usize) -> Option<SplitRun> {
    let text = run_text(run)?;
    let end = offset.checked_add(len)?;
    if len == 0
        || end > text.len()
        || !text.is_char_boundary(offset)
        || !text.is_char_boundary(end)
    {
        return None;
    }
    let has_left = offset > 0;
    let has_right = end < text.len();
    let bounds = [(0, offset), (offset, end), (end, text.len())];

    let mut pieces: [Vec<Piece>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    let mut pos = 0usize;
    for node in &run.children {
        match node {
            XmlNode::Element(e) if e.name == "w:rPr" => {}
            XmlNode::Element(e) if e.name == "w:t" => {
                let t = e.own_text();
                let (t_lo, t_hi) = (pos, pos + t.len());
                for (k, (lo, hi)) in bounds.iter().enumerate() {
                    let a = t_lo.max(*lo);
                    let b = t_hi.min(*hi);
                    if a < b {
                        pieces[k].push(Piece::Text(t[a - t_lo..b - t_lo].to_string()));
                    }
                }
                pos = t_hi;
            }
            other => {
                let k = if pos < offset || (pos == offset && has_left) {
                    0
                } else if pos > end || (pos == end && has_right) {
                    2
                } else {
                    1
                };
                pieces[k].push(Piece::Node(other.clone()));
            }
        }
    }

    let style = run.child("w:rPr").cloned();
    let [left, mid, right] = pieces;
    Some(SplitRun {
        left: has_left.then(|| styled_run(run, style.as_ref(), left)),
        mid: styled_run(run, style.as_ref(), mid),
        right: has_right.then(|| styled_run(run, style.as_ref(), right)),
    })
}

fn styled_run(original: &XmlElement, style: Option<&XmlElement>, pieces: Vec<Piece>) -> XmlElement {
    let mut run = XmlElement {
        name: original.name.clone(),
        attrs: original.attrs.clone(),
        children: Vec::new(),
    };
    if let Some(rpr) = style {
        run.children.push(XmlNode::Element(rpr.clone()));
    }
    let mut pending = String::new();
    for p in pieces {
        match p {
            Piece::Text(t) => pending.push_str(&t),
            Piece::Node(n) => {
                flush_text(&mut run, &mut pending);
                run.children.push(n);
            }
        }
    }
    flush_text(&mut run, &mut pending);
    run
}

fn flush_text(run: &mut XmlElement, pending: &mut String) {
    if pending.is_empty() {
        return;
    }
    run.children
        .push(XmlNode::Element(text_element(&std::mem::take(pending))));
}

/// `<w:t xml:space="preserve">text</w:t>`
pub fn text_element(text: &str) -> XmlElement {
    XmlElement::new("w:t")
        .with_attr("xml:space", "preserve")
        .with_text(text)
}

/// Child indices of the runs produced by [`split_run_in_paragraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitIndices {
    pub left: Option<usize>,
    pub mid: usize,
    pub right: Option<usize>,
}

/// Splits the run at `paragraph.children[child_index]` in place: the produced runs
/// are inserted where the original was and the original is removed.
pub fn split_run_in_paragraph(
    paragraph: &mut XmlElement,
    child_index: usize,
    offset: usize,
    len: usize,
) -> Option<SplitIndices> {
    let run = paragraph.element_at(child_index).filter(|e| e.name == "w:r")?;
    let SplitRun { left, mid, right } = split_run(run, offset, len)?;

    let mut at = child_index;
    let mut produced: Vec<XmlNode> = Vec::with_capacity(3);
    let left_idx = left.map(|l| {
        produced.push(XmlNode::Element(l));
        at += 1;
        at - 1
    });
    let mid_idx = at;
    produced.push(XmlNode::Element(mid));
    let right_idx = right.map(|r| {
        produced.push(XmlNode::Element(r));
        mid_idx + 1
    });
    paragraph
        .children
        .splice(child_index..=child_index, produced);
    Some(SplitIndices {
        left: left_idx,
        mid: mid_idx,
        right: right_idx,
    })
}

#[cfg(test)]
mod tests {
    use super::{
        build_run_map, locate_run_span, run_text, runs_covering, split_run, split_run_in_paragraph,
        RunSpan,
    };
    use crate::docx::tree::{XmlElement, XmlNode};

    fn bold() -> XmlElement {
        XmlElement::new("w:rPr").with_child(XmlElement::new("w:b"))
    }

    fn run(text: &str) -> XmlElement {
        XmlElement::new("w:r")
            .with_attr("w:rsidR", "00A1")
            .with_child(bold())
            .with_child(XmlElement::new("w:t").with_text(text))
    }

    fn para(texts: &[&str]) -> XmlElement {
        texts
            .iter()
            .fold(XmlElement::new("w:p"), |p, t| p.with_child(run(t)))
    }

    fn texts(p: &XmlElement) -> Vec<String> {
        p.elements()
            .filter(|e| e.name == "w:r")
            .map(|r| run_text(r).unwrap_or_default())
            .collect()
    }

    #[test]
    fn split_keeps_style_and_text() {
        let r = run("prefix{TAG}suffix");
        let split = split_run(&r, 6, 5).expect("split");
        let parts = [split.left.as_ref(), Some(&split.mid), split.right.as_ref()];
        let got: Vec<String> = parts
            .iter()
            .map(|p| run_text(p.expect("slice")).expect("text"))
            .collect();
        assert_eq!(got, vec!["prefix", "{TAG}", "suffix"]);
        for p in parts.into_iter().flatten() {
            assert_eq!(p.child("w:rPr"), Some(&bold()));
            assert_eq!(p.attr("w:rsidR").as_deref(), Some("00A1"));
            assert_eq!(p.count_descendants("w:t"), 1);
            let t = p.child("w:t").expect("t");
            assert_eq!(t.attr("xml:space").as_deref(), Some("preserve"));
        }
    }

    #[test]
    fn empty_outer_slices_are_omitted() {
        let r = run("{TAG}rest");
        let split = split_run(&r, 0, 5).expect("split");
        assert!(split.left.is_none());
        assert_eq!(run_text(&split.mid).as_deref(), Some("{TAG}"));
        assert_eq!(split.right.as_ref().and_then(run_text).as_deref(), Some("rest"));

        let whole = split_run(&r, 0, 9).expect("split");
        assert!(whole.left.is_none() && whole.right.is_none());
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        let r = run("héllo");
        assert!(split_run(&r, 0, 0).is_none());
        assert!(split_run(&r, 2, 10).is_none());
        assert!(split_run(&r, 2, 1).is_none(), "inside a multi-byte char");
        assert!(split_run(&r, usize::MAX, 2).is_none());
        let no_text = XmlElement::new("w:r").with_child(XmlElement::new("w:tab"));
        assert!(split_run(&no_text, 0, 1).is_none());
    }

    #[test]
    fn multiple_text_nodes_and_markers_keep_order() {
        let r = XmlElement::new("w:r")
            .with_child(bold())
            .with_child(XmlElement::new("w:lastRenderedPageBreak"))
            .with_child(XmlElement::new("w:t").with_text("ab{"))
            .with_child(XmlElement::new("w:t").with_text("X}"))
            .with_child(XmlElement::new("w:tab"))
            .with_child(XmlElement::new("w:t").with_text("cd"));
        let split = split_run(&r, 2, 3).expect("split");
        let left = split.left.expect("left");
        let right = split.right.expect("right");
        let names = |e: &XmlElement| e.elements().map(|c| c.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&left), vec!["w:rPr", "w:lastRenderedPageBreak", "w:t"]);
        assert_eq!(names(&split.mid), vec!["w:rPr", "w:t"]);
        assert_eq!(names(&right), vec!["w:rPr", "w:tab", "w:t"]);
        assert_eq!(run_text(&left).as_deref(), Some("ab"));
        assert_eq!(run_text(&split.mid).as_deref(), Some("{X}"));
        assert_eq!(run_text(&right).as_deref(), Some("cd"));
    }

    #[test]
    fn locate_span_inside_and_across_runs() {
        let p = para(&["x {TA", "G} y"]);
        let (slices, text) = build_run_map(&p);
        assert_eq!(text, "x {TAG} y");
        let span = locate_run_span(&slices, 2, 5).expect("span");
        assert_eq!(
            span,
            RunSpan {
                first: 0,
                last: 1,
                start_offset: 2,
                end_offset: 2
            }
        );
        assert_eq!(runs_covering(&slices, 2, 5), vec![0, 1]);
    }

    #[test]
    fn locate_span_on_boundaries_prefers_earlier_run() {
        let p = para(&["ab", "{T}", "cd"]);
        let (slices, _) = build_run_map(&p);
        let span = locate_run_span(&slices, 2, 3).expect("span");
        assert_eq!((span.first, span.start_offset), (0, 2));
        assert_eq!((span.last, span.end_offset), (1, 3));
        assert_eq!(runs_covering(&slices, 2, 3), vec![1]);
    }

    #[test]
    fn locate_span_defaults() {
        assert!(locate_run_span(&[], 0, 1).is_none());
        let p = para(&["abc"]);
        let (slices, _) = build_run_map(&p);
        let span = locate_run_span(&slices, 10, 2).expect("span");
        assert_eq!(span, RunSpan { first: 0, last: 0, start_offset: 0, end_offset: 0 });
    }

    #[test]
    fn runs_without_text_take_no_room() {
        let p = XmlElement::new("w:p")
            .with_child(run("ab"))
            .with_child(XmlElement::new("w:bookmarkStart"))
            .with_child(XmlElement::new("w:r").with_child(XmlElement::new("w:br")))
            .with_child(run("cd"));
        let (slices, text) = build_run_map(&p);
        assert_eq!(text, "abcd");
        let idx: Vec<usize> = slices.iter().map(|s| s.child_index).collect();
        assert_eq!(idx, vec![0, 2, 3]);
        assert!(slices[1].is_empty());
        assert_eq!(slices[2].start, 2);
    }

    #[test]
    fn split_in_paragraph_splices_in_place() {
        let mut p = para(&["one ", "two {T} three", " four"]);
        let idx = split_run_in_paragraph(&mut p, 1, 4, 3).expect("split");
        assert_eq!(idx.left, Some(1));
        assert_eq!(idx.mid, 2);
        assert_eq!(idx.right, Some(3));
        assert_eq!(texts(&p), vec!["one ", "two ", "{T}", " three", " four"]);
        assert!(split_run_in_paragraph(&mut p, 9, 0, 1).is_none());
        p.children.insert(0, XmlNode::Element(XmlElement::new("w:pPr")));
        assert!(split_run_in_paragraph(&mut p, 0, 0, 1).is_none(), "not a run");
        assert_eq!(texts(&p).concat(), "one two {T} three four");
    }
}
