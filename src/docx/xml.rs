use std::borrow::Cow;

use anyhow::Context;
use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::Reader;

/// One lexical XML event; attribute values are kept exactly as written (still escaped).
#[derive(Clone, Debug, PartialEq)]
pub enum XmlEvent {
    Decl {
        version: String,
        encoding: Option<String>,
        standalone: Option<String>,
    },
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Empty {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text {
        text: String,
    },
    CData {
        text: String,
    },
    Comment {
        text: String,
    },
    PI {
        content: String,
    },
    DocType {
        text: String,
    },
}

impl XmlEvent {
    fn from_quick(ev: Event<'_>) -> anyhow::Result<Option<Self>> {
        let ev = match ev {
            Event::Eof => return Ok(None),
            Event::Decl(d) => Self::Decl {
                version: lossy(d.version().context("decl version")?),
                encoding: d.encoding().and_then(Result::ok).map(lossy),
                standalone: d.standalone().and_then(Result::ok).map(lossy),
            },
            Event::Start(s) => Self::Start {
                name: lossy(s.name().as_ref()),
                attrs: raw_attrs(&s)?,
            },
            Event::Empty(s) => Self::Empty {
                name: lossy(s.name().as_ref()),
                attrs: raw_attrs(&s)?,
            },
            Event::End(e) => Self::End {
                name: lossy(e.name().as_ref()),
            },
            Event::Text(t) => Self::Text {
                text: t.unescape().context("unescape text")?.into_owned(),
            },
            Event::CData(t) => Self::CData {
                text: lossy(t.into_inner()),
            },
            Event::Comment(t) => Self::Comment {
                text: lossy(t.into_inner()),
            },
            Event::PI(t) => Self::PI {
                content: format!("{}{}", lossy(t.target()), lossy(t.content())),
            },
            Event::DocType(t) => Self::DocType {
                text: lossy(t.into_inner()),
            },
        };
        Ok(Some(ev))
    }

    fn write_into(&self, out: &mut Vec<u8>) -> anyhow::Result<()> {
        match self {
            Self::Decl {
                version,
                encoding,
                standalone,
            } => {
                let decl = BytesDecl::new(version, encoding.as_deref(), standalone.as_deref());
                let mut w = quick_xml::Writer::new(Vec::new());
                w.write_event(Event::Decl(decl)).context("write decl")?;
                out.extend_from_slice(&w.into_inner());
            }
            Self::Start { name, attrs } => open_tag(out, name, attrs, false),
            Self::Empty { name, attrs } => open_tag(out, name, attrs, true),
            Self::End { name } => {
                out.extend_from_slice(b"</");
                out.extend_from_slice(name.as_bytes());
                out.push(b'>');
            }
            Self::Text { text } => escape_text(out, text),
            Self::CData { text } => wrap(out, "<![CDATA[", text, "]]>"),
            Self::Comment { text } => wrap(out, "<!--", text, "-->"),
            Self::PI { content } => wrap(out, "<?", content, "?>"),
            Self::DocType { text } => wrap(out, "<!DOCTYPE", text, ">"),
        }
        Ok(())
    }
}

/// Reads every event of `xml`; character data is unescaped, attributes are not.
pub fn read_events(xml: &[u8]) -> anyhow::Result<Vec<XmlEvent>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut events = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let ev = reader.read_event_into(&mut buf).with_context(|| {
            format!("read xml event at byte {}", reader.buffer_position())
        })?;
        match XmlEvent::from_quick(ev)? {
            Some(ev) => events.push(ev),
            None => break,
        }
    }
    Ok(events)
}

pub fn write_events<'a>(events: impl IntoIterator<Item = &'a XmlEvent>) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::new();
    for ev in events {
        ev.write_into(&mut out)?;
    }
    Ok(out)
}

fn raw_attrs(s: &BytesStart<'_>) -> anyhow::Result<Vec<(String, String)>> {
    s.attributes()
        .map(|a| {
            let a = a.context("attr")?;
            // Escaped form is kept: `&#13;&#10;` in VML attributes would otherwise be
            // normalised to spaces on write.
            Ok((lossy(a.key.as_ref()), lossy(a.value.as_ref())))
        })
        .collect()
}

fn open_tag(out: &mut Vec<u8>, name: &str, attrs: &[(String, String)], empty: bool) {
    out.push(b'<');
    out.extend_from_slice(name.as_bytes());
    for (k, v) in attrs {
        out.push(b' ');
        out.extend_from_slice(k.as_bytes());
        out.extend_from_slice(b"=\"");
        out.extend_from_slice(v.as_bytes());
        out.push(b'"');
    }
    let close: &[u8] = if empty { b"/>" } else { b">" };
    out.extend_from_slice(close);
}

fn escape_text(out: &mut Vec<u8>, text: &str) {
    let mut last = 0;
    for (i, ch) in text.char_indices() {
        let rep: &[u8] = match ch {
            '&' => b"&amp;",
            '<' => b"&lt;",
            '>' => b"&gt;",
            _ => continue,
        };
        out.extend_from_slice(&text.as_bytes()[last..i]);
        out.extend_from_slice(rep);
        last = i + 1;
    }
    out.extend_from_slice(&text.as_bytes()[last..]);
}

fn wrap(out: &mut Vec<u8>, open: &str, body: &str, close: &str) {
    out.extend_from_slice(open.as_bytes());
    out.extend_from_slice(body.as_bytes());
    out.extend_from_slice(close.as_bytes());
}

fn lossy(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

/// Escapes a plain value for storage in the raw attribute representation.
pub fn escape_attr(value: &str) -> String {
    escape(value).into_owned()
}

/// Decodes a raw attribute value; malformed references are returned verbatim.
pub fn unescape_attr(raw: &str) -> Cow<'_, str> {
    unescape(raw).unwrap_or(Cow::Borrowed(raw))
}

#[cfg(test)]
mod tests {
    use super::{escape_attr, read_events, unescape_attr, write_events, XmlEvent};

    #[test]
    fn attribute_character_references_survive() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?><root xmlns:o="urn:test" o:gfxdata="A&#xD;&#xA;B"/>"#;
        let events = read_events(xml).expect("read");
        let out = String::from_utf8(write_events(&events).expect("write")).expect("utf8");
        assert!(out.contains(r#"o:gfxdata="A&#xD;&#xA;B""#));
        assert!(!out.contains("&amp;#xD;"));
    }

    #[test]
    fn text_is_unescaped_on_read_and_escaped_on_write() {
        let xml = "<w:t>a &amp; b &lt; c ü</w:t>";
        let events = read_events(xml.as_bytes()).expect("read");
        assert!(matches!(&events[1], XmlEvent::Text { text } if text == "a & b < c ü"));
        let out = String::from_utf8(write_events(&events).expect("write")).expect("utf8");
        assert_eq!(out, "<w:t>a &amp; b &lt; c ü</w:t>");
    }

    #[test]
    fn comments_and_cdata_are_written_verbatim() {
        let xml = br#"<a><!-- note --><![CDATA[x < y]]></a>"#;
        let events = read_events(xml).expect("read");
        assert_eq!(write_events(&events).expect("write"), xml.to_vec());
    }

    #[test]
    fn attr_escape_round_trips() {
        let raw = escape_attr(r#"Name "quoted" & <more>"#);
        assert!(!raw.contains('"'));
        assert_eq!(unescape_attr(&raw), r#"Name "quoted" & <more>"#);
        assert_eq!(unescape_attr("broken &nope"), "broken &nope");
    }
}
