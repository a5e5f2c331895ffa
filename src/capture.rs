//! Materializes an XML subtree into an in-memory tree (§4.3, §9), grounded
//! on the original's `Capture` class.
//!
//! `<revision>` and `<upload>` subtrees are small and irregular enough
//! (optional `<minor/>`, optional `<comment>`, one of several content
//! models) that driving them through dedicated [`Frame`] types per tag
//! would just reimplement a DOM one field at a time. Instead a single
//! [`SubtreeCapture`] frame takes over the whole subtree, builds a [`Node`]
//! tree, and hands it back to the frame that requested the capture once the
//! subtree's end tag closes.

use crate::error::LevitationError;
use crate::handler_stack::Frame;
use crate::xml_source::Attr;
use anyhow::Result;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element {
        name: String,
        attrs: Vec<Attr>,
        children: Vec<Node>,
    },
    Text(String),
}

impl Node {
    /// Concatenated text of a leaf element like `<timestamp>2020-01-01T00:00:00Z</timestamp>`.
    /// Errors if the element has element children rather than only text.
    pub fn text_content(&self) -> Result<String> {
        match self {
            Node::Text(t) => Ok(t.clone()),
            Node::Element { name, children, .. } => {
                let mut out = String::new();
                for child in children {
                    match child {
                        Node::Text(t) => out.push_str(t),
                        Node::Element { .. } => {
                            return Err(LevitationError::UnexpectedElementChild(name.clone()).into());
                        }
                    }
                }
                Ok(out)
            }
        }
    }

    pub fn find(&self, name: &str) -> Option<&Node> {
        match self {
            Node::Element { children, .. } => children.iter().find(|c| c.element_name() == Some(name)),
            Node::Text(_) => None,
        }
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn element_name(&self) -> Option<&str> {
        match self {
            Node::Element { name, .. } => Some(name.as_str()),
            Node::Text(_) => None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        match self {
            Node::Element { attrs, .. } => attrs
                .iter()
                .find(|a| a.name == name)
                .map(|a| a.value.as_str()),
            Node::Text(_) => None,
        }
    }
}

struct CaptureState {
    root_name: String,
    root_attrs: Vec<Attr>,
    children: Vec<Node>,
}

/// The frame pushed for the captured subtree's own start tag. Owns the
/// shared state; when popped, it assembles the final [`Node`] and delivers
/// it through `on_done`.
pub struct SubtreeCapture {
    state: Rc<RefCell<CaptureState>>,
    on_done: Box<dyn FnOnce(Node) -> Result<()>>,
}

impl SubtreeCapture {
    pub fn new(
        name: impl Into<String>,
        attrs: Vec<Attr>,
        on_done: impl FnOnce(Node) -> Result<()> + 'static,
    ) -> Self {
        SubtreeCapture {
            state: Rc::new(RefCell::new(CaptureState {
                root_name: name.into(),
                root_attrs: attrs,
                children: Vec::new(),
            })),
            on_done: Box::new(on_done),
        }
    }
}

impl Frame for SubtreeCapture {
    fn child_frame(
        &mut self,
        name: &str,
        _namespace: Option<&str>,
        attrs: &[Attr],
    ) -> Result<Box<dyn Frame>> {
        Ok(Box::new(CaptureChild {
            parent: self.state.clone(),
            name: name.to_string(),
            attrs: attrs.to_vec(),
            children: Rc::new(RefCell::new(Vec::new())),
        }))
    }

    fn on_text(&mut self, text: &str) -> Result<()> {
        self.state
            .borrow_mut()
            .children
            .push(Node::Text(text.to_string()));
        Ok(())
    }

    fn on_end(&mut self) -> Result<()> {
        let state = self.state.borrow_mut();
        let node = Node::Element {
            name: state.root_name.clone(),
            attrs: state.root_attrs.clone(),
            children: state.children.clone(),
        };
        drop(state);
        let on_done = std::mem::replace(&mut self.on_done, Box::new(|_| Ok(())));
        on_done(node)
    }
}

/// A descendant of the captured subtree. Appends its own finished [`Node`]
/// to whichever parent node (the capture root or another `CaptureChild`)
/// opened it.
struct CaptureChild {
    parent: Rc<RefCell<CaptureState>>,
    name: String,
    attrs: Vec<Attr>,
    children: Rc<RefCell<Vec<Node>>>,
}

impl Frame for CaptureChild {
    fn child_frame(
        &mut self,
        name: &str,
        _namespace: Option<&str>,
        attrs: &[Attr],
    ) -> Result<Box<dyn Frame>> {
        // A grandchild appends into *this* node's children, not the root's;
        // reuse CaptureChild recursively with `children` standing in for
        // the parent slot.
        Ok(Box::new(NestedCaptureChild {
            parent_children: self.children.clone(),
            name: name.to_string(),
            attrs: attrs.to_vec(),
            children: Rc::new(RefCell::new(Vec::new())),
        }))
    }

    fn on_text(&mut self, text: &str) -> Result<()> {
        self.children
            .borrow_mut()
            .push(Node::Text(text.to_string()));
        Ok(())
    }

    fn on_end(&mut self) -> Result<()> {
        self.parent.borrow_mut().children.push(Node::Element {
            name: self.name.clone(),
            attrs: self.attrs.clone(),
            children: self.children.borrow().clone(),
        });
        Ok(())
    }
}

struct NestedCaptureChild {
    parent_children: Rc<RefCell<Vec<Node>>>,
    name: String,
    attrs: Vec<Attr>,
    children: Rc<RefCell<Vec<Node>>>,
}

impl Frame for NestedCaptureChild {
    fn child_frame(
        &mut self,
        name: &str,
        _namespace: Option<&str>,
        attrs: &[Attr],
    ) -> Result<Box<dyn Frame>> {
        Ok(Box::new(NestedCaptureChild {
            parent_children: self.children.clone(),
            name: name.to_string(),
            attrs: attrs.to_vec(),
            children: Rc::new(RefCell::new(Vec::new())),
        }))
    }

    fn on_text(&mut self, text: &str) -> Result<()> {
        self.children
            .borrow_mut()
            .push(Node::Text(text.to_string()));
        Ok(())
    }

    fn on_end(&mut self) -> Result<()> {
        self.parent_children.borrow_mut().push(Node::Element {
            name: self.name.clone(),
            attrs: self.attrs.clone(),
            children: self.children.borrow().clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler_stack::HandlerStack;
    use crate::xml_source::XmlEvent;

    fn start(name: &str) -> XmlEvent {
        XmlEvent::Start {
            name: name.to_string(),
            namespace: None,
            attrs: vec![],
        }
    }

    fn end(name: &str) -> XmlEvent {
        XmlEvent::End {
            name: name.to_string(),
        }
    }

    #[test]
    fn captures_a_nested_subtree_into_a_node_tree() {
        let captured = Rc::new(RefCell::new(None));
        let captured_for_closure = captured.clone();
        let root = SubtreeCapture::new("revision", vec![], move |node| {
            *captured_for_closure.borrow_mut() = Some(node);
            Ok(())
        });
        let mut stack = HandlerStack::new(Box::new(root));
        stack.dispatch(start("revision")).unwrap();
        stack.dispatch(start("id")).unwrap();
        stack.dispatch(XmlEvent::Text("7".to_string())).unwrap();
        stack.dispatch(end("id")).unwrap();
        stack.dispatch(start("minor")).unwrap();
        stack.dispatch(end("minor")).unwrap();
        stack.dispatch(start("text")).unwrap();
        stack
            .dispatch(XmlEvent::Text("hello".to_string()))
            .unwrap();
        stack.dispatch(end("text")).unwrap();
        stack.dispatch(end("revision")).unwrap();

        let node = captured.borrow().clone().unwrap();
        assert_eq!(node.element_name(), Some("revision"));
        assert!(node.has_child("minor"));
        assert_eq!(node.find("id").unwrap().text_content().unwrap(), "7");
        assert_eq!(
            node.find("text").unwrap().text_content().unwrap(),
            "hello"
        );
    }
}
