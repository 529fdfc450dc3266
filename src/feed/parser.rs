use quick_xml::encoding::Decoder;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use std::sync::Arc;
use thiserror::Error;

use super::node::{NamespaceScope, Node};

/// SEC-003: Default nesting limit. Conversions over the tree recurse, so
/// a hostile document must not be able to nest arbitrarily deep.
const MAX_DEPTH: usize = 256;

/// Bound to the `xml` prefix without any declaration.
const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Errors that can occur while building a document tree.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The input is not well-formed enough to yield any element.
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { position: u64, message: String },
    /// Strict mode: an attribute is malformed or undecodable.
    #[error("Malformed attribute on <{element}>: {message}")]
    Attribute { element: String, message: String },
    /// Strict mode: an element uses a prefix that no ancestor declares.
    #[error("Undeclared namespace prefix '{prefix}' on <{element}>")]
    UnboundPrefix { prefix: String, element: String },
    /// The input holds no element at all.
    #[error("Document has no root element")]
    NoRoot,
    /// SEC-003: Nesting depth exceeds the configured limit.
    #[error("XML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),
}

/// Parser settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Tolerate mismatched end tags, bad attributes, unknown entities,
    /// undeclared prefixes and truncated input, keeping whatever tree was
    /// built.
    pub lenient: bool,
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            lenient: true,
            max_depth: MAX_DEPTH,
        }
    }
}

/// A parsed XML document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Node,
}

impl Document {
    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn into_root(self) -> Node {
        self.root
    }

    /// Namespace URIs declared on the root element.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.root.declared_namespaces().map(|(_, uri)| uri)
    }

    pub fn declares_namespace(&self, uri: &str) -> bool {
        self.namespaces().any(|declared| declared == uri)
    }
}

/// Parses raw feed bytes into a [`Document`].
///
/// Text, names and attribute values are decoded from the encoding named in
/// the XML declaration (or a BOM), UTF-8 otherwise. Only the first root
/// element is kept. Comments, processing instructions and the doctype are
/// dropped; entity declarations are never expanded (see SEC-002 in
/// `Cargo.toml`).
///
/// In lenient mode an element whose prefix is not declared anywhere in
/// scope is kept as a plain tag named `prefix:local`.
///
/// # Errors
///
/// - [`ParseError::Syntax`] on malformed input (strict mode), or when
///   lenient mode could not recover a single element
/// - [`ParseError::NoRoot`] when the input contains no element
/// - [`ParseError::MaxDepthExceeded`] when nesting exceeds `max_depth`
pub fn parse_document(bytes: &[u8], options: &ParseOptions) -> Result<Document, ParseError> {
    let mut reader = Reader::from_reader(bytes);
    {
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = !options.lenient;
    }

    let mut builder = TreeBuilder::default();

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                let position = reader.error_position();
                if options.lenient && builder.has_content() {
                    tracing::debug!(position = position, error = %e, "Recovering from malformed XML");
                    break;
                }
                return Err(ParseError::Syntax {
                    position,
                    message: e.to_string(),
                });
            }
        };
        // Follows the XML declaration once it has been read
        let decoder = reader.decoder();

        match event {
            Event::Start(e) => {
                if builder.depth() >= options.max_depth {
                    return Err(ParseError::MaxDepthExceeded(options.max_depth));
                }
                let node = open_element(&e, builder.scope(), decoder, options.lenient)?;
                builder.push(node);
            }
            Event::Empty(e) => {
                if builder.depth() >= options.max_depth {
                    return Err(ParseError::MaxDepthExceeded(options.max_depth));
                }
                let node = open_element(&e, builder.scope(), decoder, options.lenient)?;
                builder.attach(node);
            }
            Event::End(_) => builder.close(),
            Event::Text(e) => {
                let raw = decode(&e, decoder);
                let text = unescape_text(&raw, options.lenient).map_err(|message| {
                    ParseError::Syntax {
                        position: reader.buffer_position(),
                        message,
                    }
                })?;
                builder.append_text(&text);
            }
            Event::CData(e) => builder.append_text(&decode(&e, decoder)),
            Event::Eof => break,
            _ => {}
        }
    }

    if builder.depth() > 0 {
        if !options.lenient {
            return Err(ParseError::Syntax {
                position: reader.buffer_position(),
                message: "unexpected end of document".to_string(),
            });
        }
        tracing::debug!(open = builder.depth(), "Closing unterminated elements");
    }

    builder.finish().ok_or(ParseError::NoRoot)
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Node>,
    root: Option<Node>,
}

impl TreeBuilder {
    fn depth(&self) -> usize {
        self.stack.len()
    }

    fn has_content(&self) -> bool {
        self.root.is_some() || !self.stack.is_empty()
    }

    fn scope(&self) -> Option<&NamespaceScope> {
        self.stack.last().map(|n| &n.scope)
    }

    fn push(&mut self, node: Node) {
        self.stack.push(node);
    }

    fn close(&mut self) {
        if let Some(node) = self.stack.pop() {
            self.attach(node);
        }
    }

    fn attach(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None if self.root.is_none() => self.root = Some(node),
            None => tracing::debug!(element = %node.qualified_name(), "Ignoring element after root"),
        }
    }

    fn append_text(&mut self, text: &str) {
        if let Some(current) = self.stack.last_mut() {
            current.text.push_str(text);
        }
    }

    fn finish(mut self) -> Option<Document> {
        while !self.stack.is_empty() {
            self.close();
        }
        self.root.map(|root| Document { root })
    }
}

/// Decodes document bytes, falling back to lossy UTF-8 for byte runs the
/// declared encoding rejects.
fn decode(bytes: &[u8], decoder: Decoder) -> String {
    match decoder.decode(bytes) {
        Ok(text) => text.into_owned(),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn unescape_text(raw: &str, lenient: bool) -> Result<String, String> {
    if lenient {
        Ok(unescape_lenient(raw))
    } else {
        unescape(raw).map(Cow::into_owned).map_err(|e| e.to_string())
    }
}

/// Resolves each `&...;` reference on its own. References that do not
/// resolve, and bare ampersands, are kept verbatim.
fn unescape_lenient(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        match tail[1..].find(|c: char| c == ';' || c == '&').map(|i| i + 1) {
            Some(end) if tail.as_bytes()[end] == b';' => {
                let reference = &tail[..=end];
                match unescape(reference) {
                    Ok(resolved) => out.push_str(&resolved),
                    Err(_) => out.push_str(reference),
                }
                rest = &tail[end + 1..];
            }
            Some(_) => {
                out.push('&');
                rest = &tail[1..];
            }
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

/// Builds an element, splitting `xmlns` declarations from attributes and
/// resolving its namespace against the inherited scope.
fn open_element(
    e: &BytesStart<'_>,
    parent_scope: Option<&NamespaceScope>,
    decoder: Decoder,
    lenient: bool,
) -> Result<Node, ParseError> {
    let qname = e.name();
    let mut node = Node::new(decode(qname.local_name().as_ref(), decoder));
    node.prefix = qname.prefix().map(|p| decode(p.as_ref(), decoder));

    let mut attributes = e.attributes();
    attributes.with_checks(!lenient);
    for attr in attributes {
        let attr = match attr {
            Ok(attr) => attr,
            Err(err) if lenient => {
                tracing::debug!(element = %node.name, error = %err, "Skipping malformed attribute");
                continue;
            }
            Err(err) => {
                return Err(ParseError::Attribute {
                    element: node.qualified_name(),
                    message: err.to_string(),
                })
            }
        };
        let key = decode(attr.key.as_ref(), decoder);
        let value = unescape_text(&decode(&attr.value, decoder), lenient).map_err(|message| {
            ParseError::Attribute {
                element: node.qualified_name(),
                message,
            }
        })?;

        if key == "xmlns" {
            node.declarations.push((String::new(), value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            node.declarations.push((prefix.to_string(), value));
        } else {
            node.attributes.push((key, value));
        }
    }

    node.scope = match parent_scope {
        Some(parent) if node.declarations.is_empty() => Arc::clone(parent),
        parent => {
            let mut scope = parent.map(|p| p.to_vec()).unwrap_or_default();
            for (prefix, uri) in &node.declarations {
                match scope.iter_mut().find(|(bound, _)| bound == prefix) {
                    Some(binding) => binding.1 = uri.clone(),
                    None => scope.push((prefix.clone(), uri.clone())),
                }
            }
            Arc::new(scope)
        }
    };

    let namespace = match node.prefix.as_deref() {
        Some("xml") => Some(XML_NAMESPACE.to_string()),
        wanted => {
            let wanted = wanted.unwrap_or("");
            node.scope
                .iter()
                .find(|(prefix, _)| prefix == wanted)
                .map(|(_, uri)| uri.clone())
                .filter(|uri| !uri.is_empty())
        }
    };

    if namespace.is_none() {
        if let Some(prefix) = node.prefix.take() {
            if !lenient {
                return Err(ParseError::UnboundPrefix {
                    prefix,
                    element: node.name,
                });
            }
            tracing::debug!(prefix = %prefix, element = %node.name, "Keeping undeclared prefix in tag name");
            node.name = format!("{prefix}:{}", node.name);
        }
    }
    node.namespace = namespace;

    Ok(node)
}
