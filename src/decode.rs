//! Decoding of a validated document into a reflected target value.

use std::collections::HashSet;

use crate::ast::{NodeKind, NodeRef, Style};
use crate::duration::{format_duration, parse_duration};
use crate::error::RigidError;
use crate::path::FieldPath;
use crate::reflect::{Reflect, ValueMut};
use crate::shape::{Capability, FieldShape, Kind, TypeShape};

/// Decodes `node` into `target`, rejecting document keys unknown to the
/// target records.
pub(crate) fn decode_value(
    path: &FieldPath,
    shape: &TypeShape,
    node: NodeRef<'_>,
    target: &mut dyn Reflect,
) -> Result<(), RigidError> {
    let node = node.resolve();

    if let Kind::Option(inner) = shape.kind() {
        let ValueMut::Option(slot) = target.reflect_mut() else {
            return Ok(());
        };
        if node.node().is_null() {
            slot.clear();
            return Ok(());
        }
        return decode_value(path, &inner(), node, slot.get_or_insert_default());
    }

    if node.node().is_null() {
        match target.reflect_mut() {
            ValueMut::Seq(slot) if slot.fixed_len().is_none() => slot.reset(0),
            ValueMut::Map(slot) => slot.clear(),
            _ => {}
        }
        return Ok(());
    }

    if shape.has(Capability::NodeDecode) {
        if let Some(decoder) = target.as_node_decoder() {
            decoder.decode_node(node).map_err(|err| {
                RigidError::malformed(node.position(), format!("{path}: {err}")).with_source(err)
            })?;
        }
        return Ok(());
    }

    if shape.has(Capability::TextDecode) {
        expect_kind(path, shape, node, NodeKind::Scalar)?;
        if let Some(decoder) = target.as_text_decoder() {
            decoder.decode_text(node.value()).map_err(|err| {
                RigidError::malformed(
                    node.position(),
                    format!("{path}: cannot decode {:?} into {}: {err}", node.value(), shape.name()),
                )
                .with_source(err)
            })?;
        }
        return Ok(());
    }

    let mismatch = || cannot_decode(path, shape, node);
    match target.reflect_mut() {
        ValueMut::Bool(v) => {
            *v = match plain_scalar(node) {
                Some("true") => true,
                Some("false") => false,
                _ => return Err(mismatch()),
            }
        }
        ValueMut::I8(v) => *v = integer(node).ok_or_else(mismatch)?,
        ValueMut::I16(v) => *v = integer(node).ok_or_else(mismatch)?,
        ValueMut::I32(v) => *v = integer(node).ok_or_else(mismatch)?,
        ValueMut::I64(v) => *v = integer(node).ok_or_else(mismatch)?,
        ValueMut::U8(v) => *v = integer(node).ok_or_else(mismatch)?,
        ValueMut::U16(v) => *v = integer(node).ok_or_else(mismatch)?,
        ValueMut::U32(v) => *v = integer(node).ok_or_else(mismatch)?,
        ValueMut::U64(v) => *v = integer(node).ok_or_else(mismatch)?,
        ValueMut::F32(v) => {
            let value = float(node).ok_or_else(mismatch)?;
            if value.is_finite() && (value as f32).is_infinite() {
                return Err(mismatch());
            }
            *v = value as f32;
        }
        ValueMut::F64(v) => *v = float(node).ok_or_else(mismatch)?,
        ValueMut::Str(v) => {
            expect_kind(path, shape, node, NodeKind::Scalar)?;
            *v = node.value().to_string();
        }
        ValueMut::Duration(v) => {
            expect_kind(path, shape, node, NodeKind::Scalar)?;
            *v = parse_duration(node.value()).map_err(|err| {
                RigidError::malformed(node.position(), format!("{path}: {err}"))
            })?;
        }
        ValueMut::Seq(slot) => {
            let (Kind::Seq(elem) | Kind::Array(elem, _)) = shape.kind() else {
                return Ok(());
            };
            expect_kind(path, shape, node, NodeKind::Sequence)?;
            let items: Vec<NodeRef<'_>> = node.children().collect();
            match slot.fixed_len() {
                Some(len) if len != items.len() => {
                    return Err(RigidError::malformed(
                        node.position(),
                        format!(
                            "{path}: invalid array: want {len} elements but got {}",
                            items.len()
                        ),
                    ));
                }
                Some(_) => {}
                None => slot.reset(items.len()),
            }
            let elem = elem();
            for (index, item) in items.into_iter().enumerate() {
                if let Some(value) = slot.item_mut(index) {
                    decode_value(&path.index(index), &elem, item, value)?;
                }
            }
        }
        ValueMut::Map(slot) => {
            let Kind::Map(key_shape, value_shape) = shape.kind() else {
                return Ok(());
            };
            expect_kind(path, shape, node, NodeKind::Mapping)?;
            let (key_shape, value_shape) = (key_shape(), value_shape());
            slot.clear();
            for (key, value) in node.entries() {
                let entry_path = path.key(key.resolve().value());
                let before = slot.len();
                slot.insert_with(&mut |key_target: &mut dyn Reflect, value_target: &mut dyn Reflect| {
                    decode_value(path, &key_shape, key, key_target)?;
                    decode_value(&entry_path, &value_shape, value, value_target)
                })?;
                if slot.len() == before {
                    return Err(RigidError::malformed(
                        key.position(),
                        format!(
                            "{path}: mapping key {:?} already defined",
                            key.resolve().value()
                        ),
                    ));
                }
            }
        }
        ValueMut::Record(values) => {
            expect_kind(path, shape, node, NodeKind::Mapping)?;
            reject_unknown_keys(shape, node)?;
            decode_fields(path, shape.fields(), node, values)?;
        }
        // Options were unwrapped above.
        ValueMut::Option(_) | ValueMut::Opaque => {}
    }
    Ok(())
}

/// Text `node` would display as once decoded into a scalar of `shape`, so
/// that `0x10` and `16` name the same `u16` key.
pub(crate) fn canonical_key(shape: &TypeShape, node: NodeRef<'_>) -> Option<String> {
    let node = node.resolve();
    Some(match shape.kind() {
        Kind::Option(inner) => return canonical_key(&inner(), node),
        Kind::Bool => match plain_scalar(node)? {
            text @ ("true" | "false") => text.to_string(),
            _ => return None,
        },
        Kind::I8 => integer::<i8>(node)?.to_string(),
        Kind::I16 => integer::<i16>(node)?.to_string(),
        Kind::I32 => integer::<i32>(node)?.to_string(),
        Kind::I64 => integer::<i64>(node)?.to_string(),
        Kind::U8 => integer::<u8>(node)?.to_string(),
        Kind::U16 => integer::<u16>(node)?.to_string(),
        Kind::U32 => integer::<u32>(node)?.to_string(),
        Kind::U64 => integer::<u64>(node)?.to_string(),
        Kind::F32 => (float(node)? as f32).to_string(),
        Kind::F64 => float(node)?.to_string(),
        Kind::Duration => format_duration(parse_duration(node.value()).ok()?),
        _ => node.value().to_string(),
    })
}

fn decode_fields(
    path: &FieldPath,
    fields: &[FieldShape],
    node: NodeRef<'_>,
    values: Vec<&mut dyn Reflect>,
) -> Result<(), RigidError> {
    for (field, value) in fields.iter().zip(values) {
        if !field.is_document_field() {
            continue;
        }
        let field_path = path.field(field.name);
        let field_shape = field.shape();
        if field.embedded {
            if let ValueMut::Record(inner) = value.reflect_mut() {
                decode_fields(&field_path, field_shape.fields(), node, inner)?;
            }
            continue;
        }
        if let Some(content) = node.lookup(field.yaml_name()) {
            decode_value(&field_path, &field_shape, content, value)?;
        }
    }
    Ok(())
}

fn reject_unknown_keys(shape: &TypeShape, node: NodeRef<'_>) -> Result<(), RigidError> {
    let mut known = HashSet::new();
    collect_known_keys(shape.fields(), &mut known);
    for (key, _) in node.entries() {
        let name = key.resolve().value();
        if !known.contains(name) {
            return Err(RigidError::malformed(
                key.position(),
                format!("field {name:?} not found in type {}", shape.name()),
            ));
        }
    }
    Ok(())
}

fn collect_known_keys(fields: &[FieldShape], known: &mut HashSet<&'static str>) {
    for field in fields.iter().filter(|f| f.is_document_field()) {
        if field.embedded {
            collect_known_keys(field.shape().fields(), known);
        } else {
            known.insert(field.yaml_name());
        }
    }
}

fn expect_kind(
    path: &FieldPath,
    shape: &TypeShape,
    node: NodeRef<'_>,
    kind: NodeKind,
) -> Result<(), RigidError> {
    if node.kind() == kind {
        Ok(())
    } else {
        Err(cannot_decode(path, shape, node))
    }
}

fn cannot_decode(path: &FieldPath, shape: &TypeShape, node: NodeRef<'_>) -> RigidError {
    let found = match node.kind() {
        NodeKind::Scalar => format!("{:?}", node.value()),
        NodeKind::Sequence => "sequence".to_string(),
        NodeKind::Mapping => "mapping".to_string(),
        NodeKind::Alias => "alias".to_string(),
    };
    RigidError::malformed(
        node.position(),
        format!("{path}: cannot decode {found} into {}", shape.name()),
    )
}

/// Text of a plain scalar; numbers and booleans must not be quoted.
fn plain_scalar<'a>(node: NodeRef<'a>) -> Option<&'a str> {
    (node.kind() == NodeKind::Scalar && node.style() == Style::Plain).then(|| node.value())
}

/// Parses decimal, `0x`, `0o` and `0b` integers with an optional sign and
/// narrows them to the target width.
fn integer<T: TryFrom<i128>>(node: NodeRef<'_>) -> Option<T> {
    parse_integer(plain_scalar(node)?).and_then(|value| T::try_from(value).ok())
}

fn parse_integer(text: &str) -> Option<i128> {
    let (negative, digits) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let (radix, digits) = if let Some(rest) = digits.strip_prefix("0x") {
        (16, rest)
    } else if let Some(rest) = digits.strip_prefix("0o") {
        (8, rest)
    } else if let Some(rest) = digits.strip_prefix("0b") {
        (2, rest)
    } else {
        (10, digits)
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let magnitude = i128::from_str_radix(digits, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

fn float(node: NodeRef<'_>) -> Option<f64> {
    parse_float(plain_scalar(node)?)
}

fn parse_float(text: &str) -> Option<f64> {
    match text {
        ".inf" | ".Inf" | ".INF" | "+.inf" | "+.Inf" | "+.INF" => return Some(f64::INFINITY),
        "-.inf" | "-.Inf" | "-.INF" => return Some(f64::NEG_INFINITY),
        ".nan" | ".NaN" | ".NAN" => return Some(f64::NAN),
        _ => {}
    }
    if let Some(value) = parse_integer(text) {
        return Some(value as f64);
    }
    let unsigned = text.trim_start_matches(['+', '-']);
    let starts_numeric = unsigned
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || c == '.');
    if !starts_numeric || unsigned.contains(|c: char| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return None;
    }
    text.parse().ok()
}
