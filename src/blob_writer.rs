//! Pass 1 (§4.4, §5): stream the dump once, write a blob per revision and
//! upload, and populate the sidecar stores Pass 2 will read back by id.
//!
//! Grounded on the original's `BlobWriter` and `ParserHandler`: `<page>` and
//! everything beneath it is captured whole with
//! [`SubtreeCapture`](crate::capture::SubtreeCapture) rather than handled
//! tag-by-tag, since a page's revision list has no fixed shape worth
//! modeling as its own frame hierarchy. `<siteinfo>` gets the same
//! treatment so namespace and site metadata collection doesn't need its own
//! stack of frames either.

use crate::capture::Node;
use crate::capture::SubtreeCapture;
use crate::error::LevitationError;
use crate::fastimport::FastImportWriter;
use crate::handler_stack::Frame;
use crate::handler_stack::HandlerStack;
use crate::marks::BlobMark;
use crate::state::GlobalState;
use crate::store::AuthorId;
use crate::store::MetaStore;
use crate::store::RevisionMeta;
use crate::store::StringStore;
use crate::xml_source::Attr;
use crate::xml_source::XmlEvent;
use crate::xml_source::XmlEventSource;
use anyhow::Context as _;
use anyhow::Result;
use std::cell::RefCell;
use std::io::BufRead;
use std::io::Write;
use std::rc::Rc;

/// The only namespace URI this tool accepts for the document root (§4.3).
pub const EXPORT_NAMESPACE: &str = "http://www.mediawiki.org/xml/export-0.10/";

pub struct BlobWriterConfig {
    /// `--max`: stop after this many `<page>` elements, cleanly, via
    /// [`LevitationError::Cancelled`].
    pub max_pages: Option<u32>,
}

pub struct BlobWriterStores {
    pub revisions: MetaStore,
    pub uploads: MetaStore,
    pub comments: StringStore,
    pub users: StringStore,
    pub pages: StringStore,
    pub upload_comments: StringStore,
}

struct Shared<W: Write> {
    state: GlobalState,
    stores: BlobWriterStores,
    writer: FastImportWriter<W>,
    config: BlobWriterConfig,
    pages_imported: u32,
    next_upload_id: u64,
}

pub struct BlobWriter<W: Write> {
    shared: Rc<RefCell<Shared<W>>>,
}

impl<W: Write + 'static> BlobWriter<W> {
    pub fn new(writer: FastImportWriter<W>, stores: BlobWriterStores, config: BlobWriterConfig) -> Self {
        BlobWriter {
            shared: Rc::new(RefCell::new(Shared {
                state: GlobalState::default(),
                stores,
                writer,
                config,
                pages_imported: 0,
                next_upload_id: 0,
            })),
        }
    }

    /// Streams `source` to completion (or until `--max` cancels it), writing
    /// blobs as it goes, and returns the accumulated [`GlobalState`] plus the
    /// stores, for `main` to persist and hand to Pass 2.
    pub fn run(
        self,
        mut source: XmlEventSource<impl BufRead>,
    ) -> Result<(GlobalState, BlobWriterStores, FastImportWriter<W>)> {
        let root = MediawikiFrame {
            shared: self.shared.clone(),
        };
        let mut stack = HandlerStack::new(Box::new(root));
        let mut seen_first_event = false;
        loop {
            let event = source.next_event()?;
            if !seen_first_event {
                if let XmlEvent::Start { name, namespace, .. } = &event {
                    if name != "mediawiki" {
                        return Err(LevitationError::WrongRoot(name.clone()).into());
                    }
                    if namespace.as_deref() != Some(EXPORT_NAMESPACE) {
                        return Err(LevitationError::WrongNamespace(namespace.clone()).into());
                    }
                }
                seen_first_event = true;
            }
            if matches!(event, XmlEvent::Eof) {
                break;
            }
            match stack.dispatch(event) {
                Ok(()) => {}
                Err(e) if LevitationError::is_cancellation(&e) => break,
                Err(e) => return Err(e),
            }
        }
        drop(stack);
        let shared = Rc::try_unwrap(self.shared)
            .unwrap_or_else(|_| panic!("a frame outlived the parse loop, holding a stray handle"))
            .into_inner();
        Ok((shared.state, shared.stores, shared.writer))
    }
}

struct MediawikiFrame<W: Write> {
    shared: Rc<RefCell<Shared<W>>>,
}

impl<W: Write> Frame for MediawikiFrame<W> {
    fn child_frame(
        &mut self,
        name: &str,
        _namespace: Option<&str>,
        attrs: &[Attr],
    ) -> Result<Box<dyn Frame>> {
        match name {
            "siteinfo" => {
                let shared = self.shared.clone();
                Ok(Box::new(SubtreeCapture::new("siteinfo", attrs.to_vec(), move |node| {
                    process_siteinfo(&node, &shared)
                })))
            }
            "page" => {
                let shared = self.shared.clone();
                Ok(Box::new(SubtreeCapture::new("page", attrs.to_vec(), move |node| {
                    process_page(&node, &shared)
                })))
            }
            _ => Ok(Box::new(crate::handler_stack::NullFrame)),
        }
    }
}

fn process_siteinfo<W: Write>(node: &Node, shared: &Rc<RefCell<Shared<W>>>) -> Result<()> {
    let mut shared = shared.borrow_mut();
    if let Some(base) = node.find("base") {
        shared.state.domain = crate::state::domain_from_base_url(&base.text_content()?);
    }
    if let Some(namespaces) = node.find("namespaces") {
        if let Node::Element { children, .. } = namespaces {
            for child in children {
                if child.element_name() != Some("namespace") {
                    continue;
                }
                let key: i32 = child
                    .attr("key")
                    .context("namespace element missing key attribute")?
                    .parse()
                    .context("namespace key was not an integer")?;
                let name = child.text_content().unwrap_or_default();
                shared.state.insert_namespace(key, name);
            }
        }
    }
    Ok(())
}

fn process_page<W: Write>(node: &Node, shared: &Rc<RefCell<Shared<W>>>) -> Result<()> {
    {
        let shared_ref = shared.borrow();
        if let Some(max) = shared_ref.config.max_pages {
            if shared_ref.pages_imported >= max {
                return Err(LevitationError::Cancelled.into());
            }
        }
    }

    let page_id: u32 = node
        .find("id")
        .context("<page> missing <id>")?
        .text_content()?
        .trim()
        .parse()
        .context("page id was not an integer")?;
    let raw_title = node
        .find("title")
        .context("<page> missing <title>")?
        .text_content()?;
    let (ns_id, title) = set_title(&raw_title, shared);

    {
        let mut shared = shared.borrow_mut();
        shared.stores.pages.write(page_id as u64, title.clone(), ns_id as u32)?;
        shared.state.max_page_id = shared.state.max_page_id.max(page_id);
    }

    if let Node::Element { children, .. } = node {
        for child in children {
            match child.element_name() {
                Some("revision") => process_revision(child, page_id, shared)?,
                Some("upload") => process_upload(child, page_id, shared)?,
                _ => {}
            }
        }
    }

    shared.borrow_mut().pages_imported += 1;
    Ok(())
}

/// Splits a page title on its first `:` and assigns it to that namespace if
/// the prefix names one; otherwise the whole title belongs to the main
/// namespace. The `<page><ns>` element is deliberately not consulted — the
/// export format derives a page's namespace from its title, the same way
/// `setTitle` in the original did, not from a separately stated id (§4.5).
fn set_title<W: Write>(raw_title: &str, shared: &Rc<RefCell<Shared<W>>>) -> (i32, String) {
    let shared = shared.borrow();
    match raw_title.split_once(':') {
        Some((prefix, rest)) => match shared.state.namespace_id(prefix) {
            Some(ns_id) if ns_id != 0 => (ns_id, rest.to_string()),
            _ => (0, raw_title.to_string()),
        },
        None => (0, raw_title.to_string()),
    }
}

struct ParsedContributor {
    author: AuthorId,
    is_ip: bool,
    is_deleted: bool,
    user_id: Option<u32>,
    username: Option<String>,
}

fn parse_contributor(node: &Node) -> Result<ParsedContributor> {
    if node.attr("deleted").is_some() {
        return Ok(ParsedContributor {
            author: AuthorId::default(),
            is_ip: false,
            is_deleted: true,
            user_id: None,
            username: None,
        });
    }
    if let Some(ip_node) = node.find("ip") {
        let ip_text = ip_node.text_content()?;
        let addr = ip_text
            .trim()
            .parse()
            .map_err(|_| LevitationError::BadIpAddress(ip_text.clone()))?;
        return Ok(ParsedContributor {
            author: AuthorId::from_ip(addr),
            is_ip: true,
            is_deleted: false,
            user_id: None,
            username: None,
        });
    }
    let user_id: u32 = node
        .find("id")
        .context("<contributor> missing both <ip> and <id>")?
        .text_content()?
        .trim()
        .parse()
        .context("contributor id was not an integer")?;
    let username = node
        .find("username")
        .map(Node::text_content)
        .transpose()?;
    Ok(ParsedContributor {
        author: AuthorId::from_user_id(user_id),
        is_ip: false,
        is_deleted: false,
        user_id: Some(user_id),
        username,
    })
}

fn parse_epoch(timestamp: &str) -> Result<u32> {
    let parsed = chrono::DateTime::parse_from_rfc3339(timestamp.trim())
        .map_err(|_| LevitationError::BadTimestamp(timestamp.to_string()))?;
    u32::try_from(parsed.timestamp()).map_err(|_| LevitationError::BadTimestamp(timestamp.to_string()).into())
}

fn process_revision<W: Write>(node: &Node, page_id: u32, shared: &Rc<RefCell<Shared<W>>>) -> Result<()> {
    let rev_id: u32 = node
        .find("id")
        .context("<revision> missing <id>")?
        .text_content()?
        .trim()
        .parse()
        .context("revision id was not an integer")?;
    let timestamp = node
        .find("timestamp")
        .context("<revision> missing <timestamp>")?
        .text_content()?;
    let epoch = parse_epoch(&timestamp)?;
    let minor = node.has_child("minor");
    let comment = node.find("comment").map(Node::text_content).transpose()?;
    let contributor = parse_contributor(
        node.find("contributor")
            .context("<revision> missing <contributor>")?,
    )?;
    let text = node
        .find("text")
        .map(Node::text_content)
        .transpose()?
        .unwrap_or_default();

    let mut shared = shared.borrow_mut();
    shared.state.max_rev_id = shared.state.max_rev_id.max(rev_id);
    if let (Some(user_id), Some(username)) = (contributor.user_id, &contributor.username) {
        if !username.is_empty() {
            shared.stores.users.write(user_id as u64, username.clone(), 0)?;
        }
    }
    if let Some(comment) = &comment {
        if !comment.is_empty() {
            shared.stores.comments.write(rev_id as u64, comment.clone(), 0)?;
        }
    }
    shared.stores.revisions.write(
        rev_id as u64,
        &RevisionMeta {
            rev_id,
            epoch,
            page_id,
            author: contributor.author,
            minor,
            is_ip: contributor.is_ip,
            is_deleted: contributor.is_deleted,
            is_upload: false,
        },
    )?;
    shared.writer.blob(BlobMark::for_revision(rev_id), text.as_bytes())?;
    Ok(())
}

fn decode_contents(node: &Node) -> Result<Vec<u8>> {
    let encoding = node.attr("encoding").map(str::to_string);
    let text = node.text_content()?;
    match encoding.as_deref() {
        Some("base64") => {
            use base64::Engine as _;
            base64::engine::general_purpose::STANDARD
                .decode(text.replace(['\n', '\r', ' '], ""))
                .context("decoding base64 upload contents")
        }
        _ => Ok(text.into_bytes()),
    }
}

fn process_upload<W: Write>(node: &Node, page_id: u32, shared: &Rc<RefCell<Shared<W>>>) -> Result<()> {
    let timestamp = node
        .find("timestamp")
        .context("<upload> missing <timestamp>")?
        .text_content()?;
    let epoch = parse_epoch(&timestamp)?;
    let comment = node.find("comment").map(Node::text_content).transpose()?;
    let contributor = parse_contributor(
        node.find("contributor")
            .context("<upload> missing <contributor>")?,
    )?;
    let contents = node
        .find("contents")
        .map(decode_contents)
        .transpose()?
        .unwrap_or_default();

    let mut shared = shared.borrow_mut();
    let upload_id = shared.next_upload_id;
    shared.next_upload_id += 1;
    shared.state.max_upload_id = shared.state.max_upload_id.max(upload_id);
    if let (Some(user_id), Some(username)) = (contributor.user_id, &contributor.username) {
        if !username.is_empty() {
            shared.stores.users.write(user_id as u64, username.clone(), 0)?;
        }
    }
    if let Some(comment) = &comment {
        if !comment.is_empty() {
            shared.stores.upload_comments.write(upload_id, comment.clone(), 0)?;
        }
    }
    shared.stores.uploads.write(
        upload_id,
        &RevisionMeta {
            rev_id: (upload_id + 1) as u32,
            epoch,
            page_id,
            author: contributor.author,
            minor: false,
            is_ip: contributor.is_ip,
            is_deleted: contributor.is_deleted,
            is_upload: true,
        },
    )?;
    shared.writer.blob(BlobMark::for_upload(upload_id), &contents)?;
    Ok(())
}
