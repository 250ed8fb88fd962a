//! Invocation of custom [`Validate`](crate::Validate) implementations.

use crate::ast::{NodeKind, NodeRef};
use crate::decode::canonical_key;
use crate::error::{ErrorKind, RigidError};
use crate::path::FieldPath;
use crate::reflect::{Reflect, ValueRef};
use crate::shape::{Kind, TypeShape};

/// Calls `validate` on every value implementing it, parents before
/// children, and fails on the first error.
///
/// `node` is the document node the value was decoded from; without it the
/// error carries only the field path.
pub(crate) fn invoke_validators(
    path: &FieldPath,
    shape: &TypeShape,
    value: &dyn Reflect,
    node: Option<NodeRef<'_>>,
) -> Result<(), RigidError> {
    if let Some(validator) = value.as_validator() {
        if let Err(err) = validator.validate() {
            let kind = ErrorKind::Validation;
            let message = match node {
                Some(node) => format!("at {}: at {path}: {kind}: {err}", node.position()),
                None => format!("at {path}: {kind}: {err}"),
            };
            return Err(RigidError::new(kind, message).with_source(err));
        }
    }

    let node = node.map(NodeRef::resolve);
    if shape.decodes_itself() {
        return Ok(());
    }

    match (shape.kind(), value.reflect()) {
        (Kind::Option(inner), ValueRef::Option(Some(inner_value))) => {
            invoke_validators(path, &inner(), inner_value, node)?;
        }
        (Kind::Record(fields), ValueRef::Record(values)) => {
            for (field, field_value) in fields.iter().zip(values) {
                if !field.exported {
                    continue;
                }
                let field_node = match node {
                    Some(_) if field.is_ignored() => None,
                    Some(node) if field.embedded => Some(node),
                    Some(node) => node.lookup(field.yaml_name()),
                    None => None,
                };
                invoke_validators(&path.field(field.name), &field.shape(), field_value, field_node)?;
            }
        }
        (Kind::Seq(elem) | Kind::Array(elem, _), ValueRef::Seq(items)) => {
            let elem = elem();
            let children: Vec<NodeRef<'_>> = node
                .filter(|node| node.kind() == NodeKind::Sequence)
                .map(|node| node.children().collect())
                .unwrap_or_default();
            for (index, item) in items.into_iter().enumerate() {
                invoke_validators(&path.index(index), &elem, item, children.get(index).copied())?;
            }
        }
        (Kind::Map(key_shape, value_shape), ValueRef::Map(entries)) => {
            let (key_shape, value_shape) = (key_shape(), value_shape());
            let node_entries = node
                .filter(|node| node.kind() == NodeKind::Mapping)
                .map(|node| node.entries())
                .unwrap_or_default();

            let mut entries: Vec<(String, &dyn Reflect, &dyn Reflect)> = entries
                .into_iter()
                .map(|(key, value)| (key.reflect().display().unwrap_or_default(), key, value))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            for (display, key, value) in entries {
                let entry = node_entries.iter().find(|(key_node, _)| {
                    canonical_key(&key_shape, *key_node).as_deref() == Some(display.as_str())
                });
                invoke_validators(path, &key_shape, key, entry.map(|(key_node, _)| *key_node))?;
                invoke_validators(
                    &path.key(&display),
                    &value_shape,
                    value,
                    entry.map(|(_, value_node)| *value_node),
                )?;
            }
        }
        _ => {}
    }
    Ok(())
}
