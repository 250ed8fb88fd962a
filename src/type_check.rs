//! Static validation of target type shapes.
//!
//! Runs without any document. The first violation found, depth-first in
//! field declaration order, is returned with the dotted field path.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::RwLock;
use regex::Regex;
use tracing::trace;

use crate::error::{ErrorKind, RigidError};
use crate::reflect::Reflect;
use crate::rules::compile_rules;
use crate::shape::{Capability, FieldShape, Kind, TypeShape};

type CachedOutcome = Option<(ErrorKind, String)>;

fn shape_cache() -> &'static RwLock<HashMap<TypeId, CachedOutcome>> {
    static CACHE: OnceLock<RwLock<HashMap<TypeId, CachedOutcome>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

fn env_var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z_][A-Z0-9_]*$").expect("valid regex"))
}

/// Validates the shape of `T`, memoizing the outcome per type.
pub fn validate_type<T: Reflect>() -> Result<(), RigidError> {
    let id = TypeId::of::<T>();
    if let Some(cached) = shape_cache().read().get(&id) {
        trace!(type_name = std::any::type_name::<T>(), "type shape cache hit");
        return match cached {
            None => Ok(()),
            Some((kind, message)) => Err(RigidError::new(*kind, message.clone())),
        };
    }

    let result = check_root(&T::shape());
    let outcome = result
        .as_ref()
        .err()
        .map(|err| (err.kind(), err.message().to_string()));
    shape_cache().write().entry(id).or_insert(outcome);
    result
}

/// Uncached shape validation of a root record.
pub fn check_root(shape: &TypeShape) -> Result<(), RigidError> {
    if !matches!(shape.kind(), Kind::Record(_)) || shape.decodes_itself() {
        return Err(RigidError::at_path(ErrorKind::TypeIllegalRoot, shape.name()));
    }
    let mut walker = ShapeWalker::default();
    walker.traverse(shape.name(), shape, false)
}

#[derive(Default)]
struct ShapeWalker {
    /// Records being traversed, with the indirection depth they were entered at.
    stack: Vec<(TypeId, usize)>,
    indirections: usize,
}

impl ShapeWalker {
    fn traverse(&mut self, path: &str, shape: &TypeShape, behind_nullable: bool) -> Result<(), RigidError> {
        if shape.decodes_itself() {
            return check_decoder_fields(path, shape);
        }

        match shape.kind() {
            Kind::Record(fields) => self.record(path, shape, fields, behind_nullable),
            Kind::Function | Kind::Channel | Kind::RawPointer | Kind::Any | Kind::Opaque => Err(
                RigidError::at_path_detail(ErrorKind::TypeUnsupported, path, shape.name()),
            ),
            Kind::PlatformInt => Err(RigidError::at_path_detail(
                ErrorKind::TypeUnsupported,
                path,
                "isize, use integer type with specified width, such as i8, i16, i32 or i64 instead of isize",
            )),
            Kind::PlatformUint => Err(RigidError::at_path_detail(
                ErrorKind::TypeUnsupported,
                path,
                "usize, use unsigned integer type with specified width, such as u8, u16, u32 or u64 instead of usize",
            )),
            Kind::Option(inner) => {
                let inner = inner();
                if matches!(inner.kind(), Kind::Option(_) | Kind::Seq(_) | Kind::Map(..)) {
                    return Err(RigidError::at_path_detail(
                        ErrorKind::TypeUnsupportedOption,
                        path,
                        shape.name(),
                    ));
                }
                self.indirect(|walker| walker.traverse(path, &inner, true))
            }
            Kind::Seq(elem) => {
                let elem = elem();
                self.indirect(|walker| walker.traverse(path, &elem, true))
            }
            Kind::Array(elem, _) => self.traverse(path, &elem(), behind_nullable),
            Kind::Map(key, value) => {
                let (key, value) = (key(), value());
                self.indirect(|walker| {
                    walker.traverse(&format!("{path}[key]"), &key, true)?;
                    walker.traverse(&format!("{path}[value]"), &value, true)
                })
            }
            _ => Ok(()),
        }
    }

    fn indirect(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<(), RigidError>,
    ) -> Result<(), RigidError> {
        self.indirections += 1;
        let result = f(self);
        self.indirections -= 1;
        result
    }

    fn record(
        &mut self,
        path: &str,
        shape: &TypeShape,
        fields: &[FieldShape],
        behind_nullable: bool,
    ) -> Result<(), RigidError> {
        let id = shape.type_id();
        if let Some((_, entered_at)) = self.stack.iter().find(|(t, _)| *t == id) {
            if *entered_at == self.indirections {
                return Err(RigidError::at_path(ErrorKind::TypeRecursive, path));
            }
            // Already being checked; reached again through Option, Vec or a map.
            return Ok(());
        }

        self.stack.push((id, self.indirections));
        let result = self.record_fields(path, fields, behind_nullable);
        self.stack.pop();
        result
    }

    fn record_fields(
        &mut self,
        path: &str,
        fields: &[FieldShape],
        behind_nullable: bool,
    ) -> Result<(), RigidError> {
        let mut exported_fields = 0usize;
        let mut yaml_names: HashMap<&str, String> = HashMap::new();

        for field in fields {
            let field_path = format!("{path}.{}", field.name);
            let yaml_name = field.yaml_name();
            let ignored = field.is_ignored();

            if ignored && field.yaml != Some("-") {
                return Err(RigidError::at_path(ErrorKind::TypeIgnoredTagMismatch, &field_path));
            }
            if !ignored {
                let inline = field.is_inline();
                if field.exported && field.embedded && (!yaml_name.is_empty() || !inline) {
                    return Err(RigidError::at_path(ErrorKind::YamlInlineOpt, &field_path));
                }
                if field.exported && !field.embedded && inline {
                    return Err(RigidError::at_path(ErrorKind::YamlInlineNonEmbedded, &field_path));
                }
                if yaml_name.is_empty() && field.exported && !field.embedded {
                    return Err(RigidError::at_path(ErrorKind::TypeMissingYamlTag, &field_path));
                }
                if !yaml_name.is_empty() && !field.exported {
                    return Err(RigidError::at_path(ErrorKind::YamlTagOnUnexported, &field_path));
                }
            }

            if behind_nullable && field.env.is_some() {
                return Err(RigidError::at_path(ErrorKind::TypeEnvTagInContainer, &field_path));
            }
            check_env_field(&field_path, field)?;

            if let Some(rules) = field.rules {
                compile_rules(rules, &field.shape()).map_err(|err| {
                    RigidError::at_path_detail(ErrorKind::TypeInvalidRuleTag, &field_path, err)
                })?;
            }

            if !field.is_document_field() {
                continue;
            }
            exported_fields += 1;

            if field.embedded {
                let embedded = field.shape();
                if !matches!(embedded.kind(), Kind::Record(_)) || embedded.decodes_itself() {
                    return Err(RigidError::at_path_detail(
                        ErrorKind::TypeUnsupported,
                        &field_path,
                        format!("{}: embedded fields must be records", embedded.name()),
                    ));
                }
            }

            // Embedded fields have no name of their own.
            if !yaml_name.is_empty() {
                if let Some(previous) = yaml_names.get(yaml_name) {
                    return Err(RigidError::new(
                        ErrorKind::YamlTagRedefined,
                        format!(
                            "at {field_path}: yaml tag {yaml_name:?} previously defined on field {previous}: {}",
                            ErrorKind::YamlTagRedefined
                        ),
                    ));
                }
                yaml_names.insert(yaml_name, field_path.clone());
            }

            self.traverse(&field_path, &field.shape(), behind_nullable)?;
        }

        if exported_fields < 1 {
            return Err(RigidError::at_path(ErrorKind::TypeNoExportedFields, path));
        }
        Ok(())
    }
}

fn check_env_field(path: &str, field: &FieldShape) -> Result<(), RigidError> {
    let Some(var) = field.env else {
        return Ok(());
    };
    if !field.exported {
        return Err(RigidError::at_path(ErrorKind::TypeEnvTagOnUnexported, path));
    }
    if !env_var_regex().is_match(var) {
        return Err(RigidError::at_path(ErrorKind::TypeInvalidEnvTag, path));
    }

    let shape = field.shape();
    let target = shape.deref_option();
    if shape.has(Capability::NodeDecode) || target.has(Capability::NodeDecode) {
        return Err(RigidError::at_path_detail(
            ErrorKind::TypeEnvOnNodeDecoder,
            path,
            shape.name(),
        ));
    }
    if shape.kind().is_primitive()
        || (matches!(shape.kind(), Kind::Option(_)) && target.kind().is_primitive())
        || shape.has(Capability::TextDecode)
        || target.has(Capability::TextDecode)
    {
        return Ok(());
    }
    Err(RigidError::at_path_detail(
        ErrorKind::TypeEnvOnUnsupportedType,
        path,
        shape.name(),
    ))
}

/// Types decoding themselves must not declare tags on their own fields.
fn check_decoder_fields(path: &str, shape: &TypeShape) -> Result<(), RigidError> {
    let capability = if shape.has(Capability::TextDecode) {
        "TextDecode"
    } else {
        "NodeDecode"
    };
    for field in shape.fields() {
        let yaml_name = field.yaml_name();
        if !yaml_name.is_empty() && yaml_name != "-" {
            return Err(RigidError::at_path_detail(
                ErrorKind::TypeTagOnDecoder,
                path,
                format!("{} implements {capability} but field contains tag \"yaml\" ({yaml_name:?})", shape.name()),
            ));
        }
        if let Some(var) = field.env.filter(|var| !var.is_empty()) {
            return Err(RigidError::at_path_detail(
                ErrorKind::TypeTagOnDecoder,
                path,
                format!("{} implements {capability} but field contains tag \"env\" ({var:?})", shape.name()),
            ));
        }
    }
    Ok(())
}
