//! Document value checks run before decoding.
//!
//! The document is walked in lockstep with the target shape. Every
//! violation is reported with the node position, the yaml name in scope
//! and the field path.

use std::collections::HashMap;

use crate::ast::{NodeKind, NodeRef, Position};
use crate::error::{ErrorKind, RigidError};
use crate::path::FieldPath;
use crate::shape::{Capability, Kind, TypeShape};

#[derive(Debug, Default)]
struct AnchorRecord {
    defined_at: Option<Position>,
    used: bool,
}

/// Anchor bookkeeping for one document.
#[derive(Debug, Default)]
struct Anchors {
    records: HashMap<String, AnchorRecord>,
    /// Anchor names in the order they were first defined.
    order: Vec<String>,
}

impl Anchors {
    fn define(&mut self, name: &str, node: NodeRef<'_>) -> Result<(), RigidError> {
        let position = node.position();
        let record = self.records.entry(name.to_string()).or_default();
        if let Some(previous) = record.defined_at {
            let (first, second) = if previous < position {
                (previous, position)
            } else {
                (position, previous)
            };
            let kind = ErrorKind::YamlAnchorRedefined;
            return Err(RigidError::new(
                kind,
                format!("at {second}: redefined anchor {name:?} at {first}: {kind}"),
            ));
        }
        if node.node().is_empty_scalar() {
            let kind = ErrorKind::YamlAnchorNoValue;
            return Err(RigidError::new(
                kind,
                format!("at {position}: anchor {name:?}: {kind}"),
            ));
        }
        record.defined_at = Some(position);
        self.order.push(name.to_string());
        Ok(())
    }

    /// An alias may be visited before the anchor it refers to.
    fn mark_used(&mut self, name: &str) {
        self.records.entry(name.to_string()).or_default().used = true;
    }

    fn check_node(&mut self, node: NodeRef<'_>) -> Result<(), RigidError> {
        if let Some(anchor) = &node.node().anchor {
            self.define(anchor, node)?;
        }
        if node.kind() == NodeKind::Alias {
            self.mark_used(node.value());
        }
        Ok(())
    }

    fn check_unused(&self) -> Result<(), RigidError> {
        for name in &self.order {
            let Some(record) = self.records.get(name) else {
                continue;
            };
            if let (Some(position), false) = (record.defined_at, record.used) {
                let kind = ErrorKind::YamlAnchorUnused;
                return Err(RigidError::new(
                    kind,
                    format!("at {position}: anchor {name:?}: {kind}"),
                ));
            }
        }
        Ok(())
    }
}

/// Shape-driven value validator.
#[derive(Debug, Default)]
pub(crate) struct DocumentValidator {
    strict_presence: bool,
    anchors: Anchors,
}

impl DocumentValidator {
    pub(crate) fn new(strict_presence: bool) -> Self {
        Self {
            strict_presence,
            anchors: Anchors::default(),
        }
    }

    /// Validates `node` as a value of `shape`.
    pub(crate) fn validate(
        &mut self,
        yaml: &str,
        path: &FieldPath,
        shape: &TypeShape,
        node: NodeRef<'_>,
    ) -> Result<(), RigidError> {
        if let Err((kind, reason)) = check_literal(shape, node) {
            return Err(RigidError::at_node_detail(
                kind,
                node.position(),
                yaml,
                path.as_str(),
                reason,
            ));
        }
        self.anchors.check_node(node)?;

        let target = shape.deref_option();
        if (shape.has(Capability::TextDecode) || target.has(Capability::TextDecode))
            && node.resolve().kind() != NodeKind::Scalar
        {
            let kind = ErrorKind::YamlNonStrOnTextDecoder;
            return Err(RigidError::new(
                kind,
                format!("at {}: {kind}: {}", node.position(), shape.name()),
            ));
        }

        // Aliased content was validated where its anchor is defined.
        if node.kind() == NodeKind::Alias {
            return Ok(());
        }
        if matches!(shape.kind(), Kind::Option(_)) && node.node().is_null() {
            return Ok(());
        }
        self.descend(yaml, path, &target, node)
    }

    /// Checks that every defined anchor was referenced.
    pub(crate) fn finish(&self) -> Result<(), RigidError> {
        self.anchors.check_unused()
    }

    fn descend(
        &mut self,
        yaml: &str,
        path: &FieldPath,
        shape: &TypeShape,
        node: NodeRef<'_>,
    ) -> Result<(), RigidError> {
        if node.kind() == NodeKind::Mapping {
            reject_merge_keys(node)?;
        }
        if shape.decodes_itself() {
            return Ok(());
        }

        match shape.kind() {
            Kind::Record(fields) => {
                for field in fields.iter().filter(|f| f.is_document_field()) {
                    let field_path = path.field(field.name);
                    if field.embedded {
                        self.descend("", &field_path, &field.shape(), node)?;
                        continue;
                    }
                    let name = field.yaml_name();
                    match node.lookup(name) {
                        Some(content) => self.validate(name, &field_path, &field.shape(), content)?,
                        None if self.strict_presence => {
                            let kind = ErrorKind::YamlMissingField;
                            return Err(RigidError::new(
                                kind,
                                format!("at {field_path} (as {name:?}): {kind}"),
                            ));
                        }
                        None => {}
                    }
                }
            }
            Kind::Seq(elem) | Kind::Array(elem, _) if node.kind() == NodeKind::Sequence => {
                let elem = elem();
                for (index, item) in node.children().enumerate() {
                    if item.node().is_empty_scalar() {
                        return Err(RigidError::at_node(
                            ErrorKind::YamlEmptyArrayItem,
                            item.position(),
                            yaml,
                            path.as_str(),
                        ));
                    }
                    self.validate(yaml, &path.index(index), &elem, item)?;
                }
            }
            Kind::Map(key_shape, value_shape) if node.kind() == NodeKind::Mapping => {
                let (key_shape, value_shape) = (key_shape(), value_shape());
                for (key, value) in node.entries() {
                    let entry_path = path.key(key.resolve().value());
                    self.validate(yaml, &entry_path, &key_shape, key)?;
                    self.validate(yaml, &entry_path, &value_shape, value)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn reject_merge_keys(node: NodeRef<'_>) -> Result<(), RigidError> {
    for (key, _) in node.entries() {
        if key.node().is_merge_key() {
            let kind = ErrorKind::YamlMergeKey;
            return Err(RigidError::new(
                kind,
                format!("at {}: {kind}", key.position()),
            ));
        }
    }
    Ok(())
}

/// Tag, null and bool literal rules for a single node.
fn check_literal(shape: &TypeShape, node: NodeRef<'_>) -> Result<(), (ErrorKind, String)> {
    let fail = |kind: ErrorKind| Err((kind, kind.to_string()));
    let raw = node.node();

    if let Some(tag) = &raw.tag {
        let kind = ErrorKind::YamlTagUsed;
        return Err((kind, format!("tag {tag:?}: {kind}")));
    }
    if raw.is_null_like() {
        if raw.value != "null" {
            return fail(ErrorKind::YamlBadNullLiteral);
        }
        if !shape.kind().is_nullable() {
            return fail(ErrorKind::YamlNullOnNonNullable);
        }
        return Ok(());
    }
    if matches!(shape.deref_option().kind(), Kind::Bool)
        && raw.kind == NodeKind::Scalar
        && !matches!(raw.value.as_str(), "true" | "false" | "")
    {
        return fail(ErrorKind::YamlBadBoolLiteral);
    }
    Ok(())
}

/// Applies the restrictions that hold for any target type: no tags, no
/// merge keys, canonical nulls, anchor hygiene and no empty sequence items.
pub fn check_document(root: NodeRef<'_>) -> Result<(), RigidError> {
    let mut anchors = Anchors::default();
    lint(&mut anchors, &FieldPath::root("$"), root)?;
    anchors.check_unused()
}

fn lint(anchors: &mut Anchors, path: &FieldPath, node: NodeRef<'_>) -> Result<(), RigidError> {
    let raw = node.node();
    if let Some(tag) = &raw.tag {
        let kind = ErrorKind::YamlTagUsed;
        return Err(RigidError::at_node_detail(
            kind,
            node.position(),
            "",
            path.as_str(),
            format!("tag {tag:?}: {kind}"),
        ));
    }
    if raw.is_null_like() && raw.value != "null" {
        return Err(RigidError::at_node(
            ErrorKind::YamlBadNullLiteral,
            node.position(),
            "",
            path.as_str(),
        ));
    }
    anchors.check_node(node)?;

    match node.kind() {
        NodeKind::Mapping => {
            reject_merge_keys(node)?;
            for (key, value) in node.entries() {
                lint(anchors, path, key)?;
                lint(anchors, &path.field(key.resolve().value()), value)?;
            }
        }
        NodeKind::Sequence => {
            for (index, item) in node.children().enumerate() {
                if item.node().is_empty_scalar() {
                    return Err(RigidError::at_node(
                        ErrorKind::YamlEmptyArrayItem,
                        item.position(),
                        "",
                        path.as_str(),
                    ));
                }
                lint(anchors, &path.index(index), item)?;
            }
        }
        NodeKind::Scalar | NodeKind::Alias => {}
    }
    Ok(())
}
