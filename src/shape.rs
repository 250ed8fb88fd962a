//! Static descriptions of reflectable target types.
//!
//! A [`TypeShape`] is fully determined by the Rust type it describes. Child
//! shapes are referenced through `fn() -> TypeShape` pointers so that
//! self-referential types can be described without infinite expansion.

use std::any::TypeId;
use std::fmt;

use crate::reflect::Reflect;

/// Lazily evaluated child shape.
pub type ShapeFn = fn() -> TypeShape;

/// Optional behavior a type opts into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// The type checks its own invariants after decoding.
    Validate,
    /// The type decodes itself from a scalar's text.
    TextDecode,
    /// The type decodes itself from a document node.
    NodeDecode,
}

#[derive(Clone)]
pub enum Kind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Str,
    Duration,
    /// `isize`
    PlatformInt,
    /// `usize`
    PlatformUint,
    /// Dynamically typed values such as `serde_json::Value`.
    Any,
    Function,
    Channel,
    RawPointer,
    /// Nullable indirection (`Option<T>`).
    Option(ShapeFn),
    Seq(ShapeFn),
    Array(ShapeFn, usize),
    Map(ShapeFn, ShapeFn),
    Record(Vec<FieldShape>),
    /// Leaf only meaningful together with a decode capability.
    Opaque,
}

impl Kind {
    /// Kinds an env override can be parsed into directly.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Kind::Bool
                | Kind::I8
                | Kind::I16
                | Kind::I32
                | Kind::I64
                | Kind::U8
                | Kind::U16
                | Kind::U32
                | Kind::U64
                | Kind::F32
                | Kind::F64
                | Kind::Str
                | Kind::Duration
        )
    }

    /// Kinds that accept the `null` literal.
    pub fn is_nullable(&self) -> bool {
        matches!(self, Kind::Option(_) | Kind::Seq(_) | Kind::Map(..))
    }
}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Option(inner) => f.debug_tuple("Option").field(&inner().name()).finish(),
            Kind::Seq(elem) => f.debug_tuple("Seq").field(&elem().name()).finish(),
            Kind::Array(elem, len) => f.debug_tuple("Array").field(&elem().name()).field(len).finish(),
            Kind::Map(key, value) => f
                .debug_tuple("Map")
                .field(&key().name())
                .field(&value().name())
                .finish(),
            Kind::Record(fields) => f.debug_tuple("Record").field(fields).finish(),
            other => f.write_str(match other {
                Kind::Bool => "Bool",
                Kind::I8 => "I8",
                Kind::I16 => "I16",
                Kind::I32 => "I32",
                Kind::I64 => "I64",
                Kind::U8 => "U8",
                Kind::U16 => "U16",
                Kind::U32 => "U32",
                Kind::U64 => "U64",
                Kind::F32 => "F32",
                Kind::F64 => "F64",
                Kind::Str => "Str",
                Kind::Duration => "Duration",
                Kind::PlatformInt => "PlatformInt",
                Kind::PlatformUint => "PlatformUint",
                Kind::Any => "Any",
                Kind::Function => "Function",
                Kind::Channel => "Channel",
                Kind::RawPointer => "RawPointer",
                _ => "Opaque",
            }),
        }
    }
}

#[derive(Clone, Debug)]
/// Structural description of one Rust type.
pub struct TypeShape {
    name: String,
    type_id: TypeId,
    kind: Kind,
    capabilities: Vec<Capability>,
}

impl TypeShape {
    pub fn new<T: 'static>(name: impl Into<String>, kind: Kind) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::of::<T>(),
            kind,
            capabilities: Vec::new(),
        }
    }

    pub fn record<T: 'static>(name: impl Into<String>, fields: Vec<FieldShape>) -> Self {
        Self::new::<T>(name, Kind::Record(fields))
    }

    pub fn opaque<T: 'static>(name: impl Into<String>) -> Self {
        Self::new::<T>(name, Kind::Opaque)
    }

    /// Adds a capability to the shape.
    pub fn with(mut self, capability: Capability) -> Self {
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
        self
    }

    /// Re-labels an inner shape as a distinct named type with no capabilities.
    pub fn renamed<T: 'static>(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self.type_id = TypeId::of::<T>();
        self.capabilities.clear();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Decoding is delegated to the type itself.
    pub fn decodes_itself(&self) -> bool {
        self.has(Capability::TextDecode) || self.has(Capability::NodeDecode)
    }

    /// Inner shape of an `Option`, or the shape itself.
    pub fn deref_option(&self) -> TypeShape {
        match &self.kind {
            Kind::Option(inner) => inner(),
            _ => self.clone(),
        }
    }

    /// Fields of a record shape; empty for every other kind.
    pub fn fields(&self) -> &[FieldShape] {
        match &self.kind {
            Kind::Record(fields) => fields,
            _ => &[],
        }
    }
}

/// One field of a record, with its tags.
#[derive(Clone)]
pub struct FieldShape {
    pub name: &'static str,
    pub exported: bool,
    pub embedded: bool,
    /// Raw yaml tag: `name`, `name,opt`, `,inline` or `-`.
    pub yaml: Option<&'static str>,
    pub env: Option<&'static str>,
    /// Comma-separated rule tag, see [`crate::rules`].
    pub rules: Option<&'static str>,
    shape: ShapeFn,
}

impl FieldShape {
    pub fn new<T: Reflect>(name: &'static str, exported: bool) -> Self {
        Self {
            name,
            exported,
            embedded: false,
            yaml: None,
            env: None,
            rules: None,
            shape: T::shape,
        }
    }

    pub fn yaml(mut self, tag: &'static str) -> Self {
        self.yaml = Some(tag);
        self
    }

    pub fn env(mut self, var: &'static str) -> Self {
        self.env = Some(var);
        self
    }

    pub fn validate(mut self, rules: &'static str) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Marks the field as embedded; its fields are read from the parent mapping.
    pub fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }

    pub fn shape(&self) -> TypeShape {
        (self.shape)()
    }

    /// Key name part of the yaml tag.
    pub fn yaml_name(&self) -> &'static str {
        self.yaml
            .map(|tag| tag.split(',').next().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn is_inline(&self) -> bool {
        self.yaml
            .map(|tag| tag.split(',').skip(1).any(|option| option == "inline"))
            .unwrap_or(false)
    }

    /// Excluded from the document and from presence checks.
    pub fn is_ignored(&self) -> bool {
        self.yaml_name() == "-"
    }

    /// Field participates in the document: exported and not ignored.
    pub fn is_document_field(&self) -> bool {
        self.exported && !self.is_ignored()
    }
}

impl fmt::Debug for FieldShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldShape")
            .field("name", &self.name)
            .field("exported", &self.exported)
            .field("embedded", &self.embedded)
            .field("yaml", &self.yaml)
            .field("env", &self.env)
            .field("rules", &self.rules)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_tag_options_are_split_from_the_name() {
        let field = FieldShape::new::<String>("base", true).yaml(",inline").embedded();
        assert_eq!(field.yaml_name(), "");
        assert!(field.is_inline());
        assert!(!field.is_ignored());

        let field = FieldShape::new::<String>("skip", true).yaml("-");
        assert!(field.is_ignored());
        assert!(!field.is_document_field());
    }

    #[test]
    fn option_shapes_deref_to_their_inner_shape() {
        let shape = <Option<u16> as Reflect>::shape();
        assert!(shape.kind().is_nullable());
        assert!(matches!(shape.deref_option().kind(), Kind::U16));
        assert_eq!(shape.name(), "Option<u16>");
    }
}
