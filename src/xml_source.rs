//! Thin streaming layer over `quick_xml`'s namespace-aware reader (§4.3).
//!
//! [`HandlerStack`](crate::handler_stack::HandlerStack) only ever sees
//! start/end/text events carrying plain local names and resolved
//! namespace URIs; it never touches `quick_xml` types directly. That keeps
//! the state machine testable against hand-built events and isolates the
//! one place the parser crate's API surface actually matters.

use anyhow::Context as _;
use anyhow::Result;
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use std::io::BufRead;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    Start {
        name: String,
        namespace: Option<String>,
        attrs: Vec<Attr>,
    },
    /// A self-closing `<tag/>`, reported as a matched start/end pair so
    /// handler frames never special-case it.
    Empty {
        name: String,
        namespace: Option<String>,
        attrs: Vec<Attr>,
    },
    End {
        name: String,
    },
    Text(String),
    Eof,
}

pub struct XmlEventSource<R: BufRead> {
    reader: NsReader<R>,
    buf: Vec<u8>,
}

impl<R: BufRead> XmlEventSource<R> {
    pub fn new(inner: R) -> Self {
        let mut reader = NsReader::from_reader(inner);
        reader.config_mut().trim_text = true;
        XmlEventSource {
            reader,
            buf: Vec::new(),
        }
    }

    pub fn next_event(&mut self) -> Result<XmlEvent> {
        self.buf.clear();
        let (resolution, event) = self
            .reader
            .read_resolved_event_into(&mut self.buf)
            .context("reading next XML event")?;
        let namespace = match resolution {
            ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
            ResolveResult::Unbound | ResolveResult::Unknown(_) => None,
        };
        match event {
            Event::Start(start) => Ok(XmlEvent::Start {
                name: local_name(&start)?,
                namespace,
                attrs: read_attrs(&start)?,
            }),
            Event::Empty(start) => Ok(XmlEvent::Empty {
                name: local_name(&start)?,
                namespace,
                attrs: read_attrs(&start)?,
            }),
            Event::End(end) => Ok(XmlEvent::End {
                name: String::from_utf8_lossy(end.local_name().as_ref()).into_owned(),
            }),
            Event::Text(text) => {
                let decoded = text.unescape().context("decoding text content")?;
                Ok(XmlEvent::Text(decoded.into_owned()))
            }
            Event::CData(cdata) => {
                let bytes = cdata.into_inner();
                Ok(XmlEvent::Text(String::from_utf8_lossy(&bytes).into_owned()))
            }
            Event::Eof => Ok(XmlEvent::Eof),
            // Comments, PIs, doctype: irrelevant to the export format, skip
            // transparently by recursing for the next real event.
            _ => self.next_event(),
        }
    }
}

fn local_name(start: &quick_xml::events::BytesStart<'_>) -> Result<String> {
    Ok(String::from_utf8_lossy(start.local_name().as_ref()).into_owned())
}

fn read_attrs(start: &quick_xml::events::BytesStart<'_>) -> Result<Vec<Attr>> {
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.context("reading an element attribute")?;
        let name = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
        attrs.push(Attr { name, value });
    }
    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn events(xml: &str) -> Vec<XmlEvent> {
        let mut source = XmlEventSource::new(Cursor::new(xml.as_bytes().to_vec()));
        let mut out = Vec::new();
        loop {
            match source.next_event().unwrap() {
                XmlEvent::Eof => break,
                other => out.push(other),
            }
        }
        out
    }

    #[test]
    fn reads_start_text_end() {
        let out = events("<title>Dog</title>");
        assert_eq!(
            out,
            vec![
                XmlEvent::Start {
                    name: "title".to_string(),
                    namespace: None,
                    attrs: vec![],
                },
                XmlEvent::Text("Dog".to_string()),
                XmlEvent::End {
                    name: "title".to_string()
                },
            ]
        );
    }

    #[test]
    fn reports_self_closing_tags_as_empty() {
        let out = events("<redirect title=\"Cat\"/>");
        assert_eq!(
            out,
            vec![XmlEvent::Empty {
                name: "redirect".to_string(),
                namespace: None,
                attrs: vec![Attr {
                    name: "title".to_string(),
                    value: "Cat".to_string(),
                }],
            }]
        );
    }

    #[test]
    fn resolves_the_default_namespace() {
        let out = events(
            "<mediawiki xmlns=\"http://www.mediawiki.org/xml/export-0.10/\"><page/></mediawiki>",
        );
        let XmlEvent::Start { namespace, .. } = &out[0] else {
            panic!("expected a start event");
        };
        assert_eq!(
            namespace.as_deref(),
            Some("http://www.mediawiki.org/xml/export-0.10/")
        );
    }
}
