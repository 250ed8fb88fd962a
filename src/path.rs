//! Field paths and the rule-namespace to document-location correlator.

use std::fmt;

use crate::ast::{NodeKind, NodeRef, Position};
use crate::shape::{Kind, TypeShape};

/// Human-readable location of a value inside the target type,
/// e.g. `Config.servers[0].tags[primary]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn root(type_name: &str) -> Self {
        Self(type_name.to_string())
    }

    pub fn field(&self, name: &str) -> Self {
        Self(format!("{}.{name}", self.0))
    }

    pub fn index(&self, index: usize) -> Self {
        Self(format!("{}[{index}]", self.0))
    }

    pub fn key(&self, key: &str) -> Self {
        Self(format!("{}[{key}]", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Document location a rule namespace resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Deepest node found along the namespace and the yaml name in scope.
    Node { position: Position, yaml: String },
    /// The namespace crosses an ignored field, which has no document node.
    Ignored,
}

/// Walks a `Root.field.sub` namespace through the record shapes and the
/// mapping nodes below `root`.
///
/// Embedded fields are followed without descending into the document.
/// When a key is missing the enclosing node is reported together with the
/// missing field's yaml name.
pub fn locate(shape: &TypeShape, namespace: &str, root: NodeRef<'_>) -> Location {
    let mut segments = namespace.split('.');
    // Leading segment is the root type name.
    segments.next();

    let mut current_shape = shape.clone();
    let mut current_node = root;
    let mut yaml = String::new();

    for segment in segments {
        let record = current_shape.deref_option();
        let Some(field) = record.fields().iter().find(|f| f.name == segment) else {
            break;
        };
        if field.is_ignored() {
            return Location::Ignored;
        }
        if field.embedded {
            current_shape = field.shape();
            continue;
        }

        yaml = field.yaml_name().to_string();
        let mapping = current_node.resolve();
        if mapping.kind() != NodeKind::Mapping {
            break;
        }
        match mapping.lookup(&yaml) {
            Some(value) => {
                current_node = value;
                current_shape = field.shape();
            }
            None => break,
        }
        if !matches!(current_shape.deref_option().kind(), Kind::Record(_)) {
            break;
        }
    }

    Location::Node {
        position: current_node.position(),
        yaml,
    }
}
