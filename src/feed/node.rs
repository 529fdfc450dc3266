use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// In-scope namespace bindings as `(prefix, uri)` pairs in declaration order.
///
/// The empty prefix is the default namespace. Shared between an element and
/// every descendant that declares nothing new.
pub(crate) type NamespaceScope = Arc<Vec<(String, String)>>;

/// One element of a parsed feed document.
///
/// Elements written with a prefix (`<dc:date>`) keep it in [`prefix`](Node::prefix)
/// and are reachable only through their namespace. Everything else,
/// including the synthetic tags added during normalization, is a *plain*
/// child and is what [`child`](Node::child), [`children`](Node::children)
/// and [`to_mapping`](Node::to_mapping) see.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) prefix: Option<String>,
    pub(crate) namespace: Option<String>,
    pub(crate) attributes: Vec<(String, String)>,
    pub(crate) declarations: Vec<(String, String)>,
    pub(crate) children: Vec<Node>,
    pub(crate) text: String,
    pub(crate) scope: NamespaceScope,
}

impl Node {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: None,
            namespace: None,
            attributes: Vec::new(),
            declarations: Vec::new(),
            children: Vec::new(),
            text: String::new(),
            scope: NamespaceScope::default(),
        }
    }

    /// Local name, or the full synthetic name (`dc:date`) for flattened tags.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name as written in the document.
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Resolved namespace URI, if the element is in one.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// The element's own text and CDATA content, unmodified.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Namespaces declared on this element itself.
    pub fn declared_namespaces(&self) -> impl Iterator<Item = (&str, &str)> {
        self.declarations
            .iter()
            .map(|(prefix, uri)| (prefix.as_str(), uri.as_str()))
    }

    /// Namespaces in scope here, inherited ones included.
    pub fn namespaces(&self) -> impl Iterator<Item = (&str, &str)> {
        self.scope
            .iter()
            .map(|(prefix, uri)| (prefix.as_str(), uri.as_str()))
    }

    /// Plain children in document order.
    pub fn children(&self) -> impl Iterator<Item = &Node> {
        self.children.iter().filter(|c| c.prefix.is_none())
    }

    /// Direct children in namespace `uri`, prefixed or not.
    pub fn children_in<'a>(&'a self, uri: &'a str) -> impl Iterator<Item = &'a Node> {
        self.children
            .iter()
            .filter(move |c| c.namespace.as_deref() == Some(uri))
    }

    /// Every plain child called `name`.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> {
        self.children().filter(move |c| c.name == name)
    }

    /// First plain child called `name`.
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children().find(|c| c.name == name)
    }

    /// Text of the first plain child called `name`.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(Node::text)
    }

    /// The derived `timestamp` tag of a normalized item or entry.
    pub fn timestamp(&self) -> Option<i64> {
        self.child_text("timestamp")?.parse().ok()
    }

    pub fn has_children(&self) -> bool {
        self.children().next().is_some()
    }

    /// Replaces the first plain child named like `node`, or appends it.
    pub(crate) fn upsert_child(&mut self, node: Node) {
        match self
            .children
            .iter_mut()
            .find(|c| c.prefix.is_none() && c.name == node.name)
        {
            Some(existing) => *existing = node,
            None => self.children.push(node),
        }
    }

    /// Converts the subtree into nested JSON values.
    ///
    /// A node without plain children becomes its text. Otherwise the result
    /// is an object keyed by child name in first-occurrence order; names
    /// that occur more than once map to an array of their converted
    /// children in document order.
    pub fn to_mapping(&self) -> Value {
        if !self.has_children() {
            return Value::String(self.text.clone());
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for child in self.children() {
            *counts.entry(child.name.as_str()).or_default() += 1;
        }

        let mut map = Map::new();
        for child in self.children() {
            let converted = child.to_mapping();
            if counts[child.name.as_str()] == 1 {
                map.insert(child.name.clone(), converted);
            } else if let Value::Array(list) = map
                .entry(child.name.clone())
                .or_insert_with(|| Value::Array(Vec::new()))
            {
                list.push(converted);
            }
        }

        Value::Object(map)
    }
}
