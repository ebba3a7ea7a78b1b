//! XML codec for the canonical tree.
//!
//! Decoding groups an element's children by tag: a tag seen once maps to its
//! node, a repeated tag to a sequence in document order. Text that is only
//! whitespace is dropped so indentation never turns a scalar into a composite.
//! Encoding is the dual; attribute and child emission order carries no meaning
//! except within a repeated tag.

use indexmap::IndexMap;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::debug;
use virtdoc_common::{Composite, Node, OneOrMany, VirtDocError};

/// Converts between document text and canonical trees
#[derive(Debug, Clone, Default)]
pub struct DocumentCodec {
    indent: Option<usize>,
}

impl DocumentCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indent nested elements by `indent` spaces; `None` writes compact output.
    pub fn with_indent(mut self, indent: Option<usize>) -> Self {
        self.indent = indent;
        self
    }

    /// Encode `node` as a document whose root element is `element_name`
    pub fn encode(&self, node: &Node, element_name: &str) -> Result<String, VirtDocError> {
        let mut writer = match self.indent {
            Some(width) if width > 0 => Writer::new_with_indent(Vec::new(), b' ', width),
            _ => Writer::new(Vec::new()),
        };

        write_element(&mut writer, element_name, node)?;

        let bytes = writer.into_inner();
        debug!("Encoded <{}> into {} bytes", element_name, bytes.len());
        String::from_utf8(bytes).map_err(|e| VirtDocError::Serialization(e.to_string()))
    }

    /// Decode a document into its canonical tree
    pub fn decode(&self, text: &str) -> Result<Node, VirtDocError> {
        self.decode_element(text).map(|(_, node)| node)
    }

    /// Decode a document, also returning the root element's tag
    pub fn decode_element(&self, text: &str) -> Result<(String, Node), VirtDocError> {
        let mut reader = Reader::from_str(text);
        let mut stack: Vec<PendingElement> = Vec::new();
        let mut root: Option<(String, Node)> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| VirtDocError::malformed(e.to_string(), reader.buffer_position() as u64))?;

            match event {
                Event::Start(start) => {
                    ensure_single_root(&stack, &root, &reader)?;
                    stack.push(PendingElement::open(&start, &reader)?);
                }
                Event::Empty(start) => {
                    ensure_single_root(&stack, &root, &reader)?;
                    let element = PendingElement::open(&start, &reader)?;
                    close_element(element, &mut stack, &mut root);
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| {
                        VirtDocError::malformed("unexpected closing tag", reader.buffer_position() as u64)
                    })?;
                    close_element(element, &mut stack, &mut root);
                }
                Event::Text(content) => {
                    let content = content
                        .unescape()
                        .map_err(|e| VirtDocError::malformed(e.to_string(), reader.buffer_position() as u64))?;
                    append_text(&mut stack, &content, &reader)?;
                }
                Event::CData(content) => {
                    let content = std::str::from_utf8(&content)
                        .map_err(|e| VirtDocError::malformed(e.to_string(), reader.buffer_position() as u64))?
                        .to_string();
                    append_text(&mut stack, &content, &reader)?;
                }
                Event::Eof => break,
                // Declarations, comments, processing instructions and doctypes carry no data
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(VirtDocError::malformed(
                format!("unclosed element <{}>", open.tag),
                reader.buffer_position() as u64,
            ));
        }

        let (tag, node) =
            root.ok_or_else(|| VirtDocError::malformed("no root element", reader.buffer_position() as u64))?;
        debug!("Decoded <{}> from {} bytes", tag, text.len());
        Ok((tag, node))
    }
}

/// Encode with compact output
pub fn encode(node: &Node, element_name: &str) -> Result<String, VirtDocError> {
    DocumentCodec::new().encode(node, element_name)
}

/// Decode a document into its canonical tree
pub fn decode(text: &str) -> Result<Node, VirtDocError> {
    DocumentCodec::new().decode(text)
}

fn write_element(writer: &mut Writer<Vec<u8>>, name: &str, node: &Node) -> Result<(), VirtDocError> {
    check_name(name)?;

    match node {
        Node::Scalar(text) if text.is_empty() => write_event(writer, Event::Empty(BytesStart::new(name))),
        Node::Scalar(text) => {
            write_event(writer, Event::Start(BytesStart::new(name)))?;
            write_event(writer, Event::Text(BytesText::new(text)))?;
            write_event(writer, Event::End(BytesEnd::new(name)))
        }
        Node::Flag(_) => write_event(writer, Event::Empty(BytesStart::new(name))),
        Node::Composite(composite) => write_composite(writer, name, composite),
    }
}

fn write_composite(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    composite: &Composite,
) -> Result<(), VirtDocError> {
    let mut start = BytesStart::new(name);
    for (attr, value) in &composite.attributes {
        check_name(attr)?;
        start.push_attribute((attr.as_str(), value.as_str()));
    }

    let has_children = composite
        .children
        .values()
        .any(|value| value.iter().any(is_emitted));
    if composite.text.is_none() && !has_children {
        return write_event(writer, Event::Empty(start));
    }

    write_event(writer, Event::Start(start))?;
    if let Some(text) = &composite.text {
        write_event(writer, Event::Text(BytesText::new(text)))?;
    }
    for (tag, value) in &composite.children {
        for child in value.iter().filter(|child| is_emitted(child)) {
            write_element(writer, tag, child)?;
        }
    }
    write_event(writer, Event::End(BytesEnd::new(name)))
}

/// `false` flags produce no element
fn is_emitted(node: &Node) -> bool {
    !matches!(node, Node::Flag(false))
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), VirtDocError> {
    writer
        .write_event(event)
        .map_err(|e| VirtDocError::Serialization(e.to_string()))
}

/// XML `Name` production, without the namespace well-formedness rules
fn check_name(name: &str) -> Result<(), VirtDocError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == ':' => {
            chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.'))
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(VirtDocError::InvalidName(name.to_string()))
    }
}

/// Element whose closing tag has not been read yet
struct PendingElement {
    tag: String,
    attributes: IndexMap<String, String>,
    text: String,
    children: IndexMap<String, Vec<Node>>,
}

impl PendingElement {
    fn open(start: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<Self, VirtDocError> {
        let position = reader.buffer_position() as u64;
        let tag = utf8(start.name().as_ref(), position)?;

        let mut attributes = IndexMap::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| VirtDocError::malformed(e.to_string(), position))?;
            let key = utf8(attr.key.as_ref(), position)?;
            let value = attr
                .unescape_value()
                .map_err(|e| VirtDocError::malformed(e.to_string(), position))?;
            attributes.insert(key, value.into_owned());
        }

        Ok(Self {
            tag,
            attributes,
            text: String::new(),
            children: IndexMap::new(),
        })
    }

    fn build(self) -> (String, Node) {
        let text = self.text.trim();

        if self.attributes.is_empty() && self.children.is_empty() {
            let node = if text.is_empty() {
                Node::Composite(Composite::default())
            } else {
                Node::Scalar(text.to_string())
            };
            return (self.tag, node);
        }

        let children = self
            .children
            .into_iter()
            .map(|(tag, mut nodes)| {
                let value = if nodes.len() == 1 {
                    OneOrMany::One(nodes.remove(0))
                } else {
                    OneOrMany::Many(nodes)
                };
                (tag, value)
            })
            .collect();

        let composite = Composite {
            attributes: self.attributes,
            text: (!text.is_empty()).then(|| text.to_string()),
            children,
        };
        (self.tag, Node::Composite(composite))
    }
}

fn close_element(
    element: PendingElement,
    stack: &mut [PendingElement],
    root: &mut Option<(String, Node)>,
) {
    let (tag, node) = element.build();
    match stack.last_mut() {
        Some(parent) => parent.children.entry(tag).or_default().push(node),
        None => *root = Some((tag, node)),
    }
}

fn ensure_single_root(
    stack: &[PendingElement],
    root: &Option<(String, Node)>,
    reader: &Reader<&[u8]>,
) -> Result<(), VirtDocError> {
    if stack.is_empty() && root.is_some() {
        return Err(VirtDocError::malformed(
            "multiple root elements",
            reader.buffer_position() as u64,
        ));
    }
    Ok(())
}

fn append_text(
    stack: &mut [PendingElement],
    content: &str,
    reader: &Reader<&[u8]>,
) -> Result<(), VirtDocError> {
    match stack.last_mut() {
        Some(open) => open.text.push_str(content),
        None if content.trim().is_empty() => {}
        None => {
            return Err(VirtDocError::malformed(
                "text outside of the root element",
                reader.buffer_position() as u64,
            ))
        }
    }
    Ok(())
}

fn utf8(bytes: &[u8], position: u64) -> Result<String, VirtDocError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| VirtDocError::malformed(e.to_string(), position))
}
