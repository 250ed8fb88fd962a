//! Public document model produced by the tokenizer and read by every pass.

use std::fmt;

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

use crate::error::RigidError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
/// 1-based source location of a node's first token.
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Scalar,
    Sequence,
    Mapping,
    Alias,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
/// Presentation style of a node in the source text.
pub enum Style {
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
    /// Block sequence or mapping.
    Block,
    /// `[...]` or `{...}` collection.
    Flow,
}

impl Style {
    pub fn is_quoted(self) -> bool {
        matches!(self, Style::SingleQuoted | Style::DoubleQuoted)
    }
}

/// Handle of a node inside its [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub style: Style,
    /// Scalar text after unquoting/folding; the anchor name for aliases.
    pub value: String,
    /// Explicit tag text such as `!!str`.
    pub tag: Option<String>,
    /// Anchor defined on this node.
    pub anchor: Option<String>,
    /// Anchored node an alias refers to.
    pub alias: Option<NodeId>,
    pub position: Position,
    /// Sequence items, or mapping keys and values interleaved.
    pub children: Vec<NodeId>,
}

impl Node {
    pub(crate) fn scalar(value: impl Into<String>, style: Style, position: Position) -> Self {
        Self {
            kind: NodeKind::Scalar,
            style,
            value: value.into(),
            tag: None,
            anchor: None,
            alias: None,
            position,
            children: Vec::new(),
        }
    }

    pub(crate) fn collection(kind: NodeKind, style: Style, position: Position) -> Self {
        Self {
            kind,
            style,
            value: String::new(),
            tag: None,
            anchor: None,
            alias: None,
            position,
            children: Vec::new(),
        }
    }

    /// Plain scalar with no text (`key:` or `- `).
    pub fn is_empty_scalar(&self) -> bool {
        self.kind == NodeKind::Scalar
            && self.style == Style::Plain
            && self.tag.is_none()
            && self.value.is_empty()
    }

    /// Plain scalar spelled like any YAML null (`null`, `Null`, `~`, ...).
    pub fn is_null_like(&self) -> bool {
        self.kind == NodeKind::Scalar
            && self.style == Style::Plain
            && (self.value == "~" || self.value.eq_ignore_ascii_case("null"))
    }

    /// Value the decoder treats as null: empty or any null spelling.
    pub fn is_null(&self) -> bool {
        self.is_empty_scalar() || (self.is_null_like() && self.tag.is_none())
    }

    /// `<<` key of a mapping.
    pub fn is_merge_key(&self) -> bool {
        self.kind == NodeKind::Scalar && self.style == Style::Plain && self.value == "<<"
    }
}

#[derive(Debug, Clone)]
/// Single parsed YAML document.
pub struct Document {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: NodeId,
}

impl Document {
    pub fn root(&self) -> NodeRef<'_> {
        self.get(self.root)
    }

    pub fn get(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef { doc: self, id }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Parses YAML text into a document.
    pub fn parse(source: &str) -> Result<Self, RigidError> {
        crate::mini_yaml::parse_document(source)
    }
}

/// Borrowed view of one node and the document it lives in.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    doc: &'a Document,
    id: NodeId,
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn node(&self) -> &'a Node {
        &self.doc.nodes[self.id.0]
    }

    pub fn kind(&self) -> NodeKind {
        self.node().kind
    }

    pub fn style(&self) -> Style {
        self.node().style
    }

    pub fn value(&self) -> &'a str {
        &self.node().value
    }

    pub fn position(&self) -> Position {
        self.node().position
    }

    /// Follows an alias to its anchored node; other nodes map to themselves.
    pub fn resolve(self) -> NodeRef<'a> {
        match self.node().alias {
            Some(target) => self.doc.get(target),
            None => self,
        }
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let doc = self.doc;
        self.node().children.iter().map(move |id| doc.get(*id))
    }

    /// Key/value pairs of a mapping node, in document order.
    pub fn entries(&self) -> Vec<(NodeRef<'a>, NodeRef<'a>)> {
        let children = &self.node().children;
        children
            .chunks(2)
            .filter(|pair| pair.len() == 2)
            .map(|pair| (self.doc.get(pair[0]), self.doc.get(pair[1])))
            .collect()
    }

    /// Value of the mapping entry whose key text is `key`.
    pub fn lookup(&self, key: &str) -> Option<NodeRef<'a>> {
        if self.kind() != NodeKind::Mapping {
            return None;
        }
        self.entries()
            .into_iter()
            .find(|(k, _)| k.resolve().value() == key)
            .map(|(_, v)| v)
    }

    /// Key node of the mapping entry whose key text is `key`.
    pub fn lookup_key(&self, key: &str) -> Option<NodeRef<'a>> {
        if self.kind() != NodeKind::Mapping {
            return None;
        }
        self.entries()
            .into_iter()
            .find(|(k, _)| k.resolve().value() == key)
            .map(|(k, _)| k)
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("node", self.node())
            .finish()
    }
}

impl Serialize for NodeRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let node = self.node();
        let mut state = serializer.serialize_struct("Node", 6)?;
        state.serialize_field("kind", &node.kind)?;
        state.serialize_field("style", &node.style)?;
        state.serialize_field("position", &node.position)?;
        state.serialize_field("tag", &node.tag)?;
        state.serialize_field("anchor", &node.anchor)?;
        match node.kind {
            NodeKind::Scalar | NodeKind::Alias => state.serialize_field("value", &node.value)?,
            NodeKind::Sequence | NodeKind::Mapping => {
                let children: Vec<NodeRef<'_>> = self.children().collect();
                state.serialize_field("children", &children)?
            }
        }
        state.end()
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.root().serialize(serializer)
    }
}
