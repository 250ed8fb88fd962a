//! Reflection trait implemented by every loadable type.
//!
//! [`Reflect`] gives the engine what runtime introspection would: a static
//! [`TypeShape`], a read-only [`ValueRef`] view and a mutable [`ValueMut`]
//! view. Records are usually declared through [`record!`](crate::record).

use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use crate::ast::NodeRef;
use crate::duration::format_duration;
use crate::error::{BoxError, RigidError};
use crate::shape::{Capability, Kind, TypeShape};

/// Custom post-decode invariant check.
pub trait Validate {
    fn validate(&self) -> Result<(), BoxError>;
}

/// Decoding from the text of a scalar node or an env override.
pub trait TextDecode {
    fn decode_text(&mut self, text: &str) -> Result<(), BoxError>;
}

/// Decoding from a raw document node.
pub trait NodeDecode {
    fn decode_node(&mut self, node: NodeRef<'_>) -> Result<(), BoxError>;
}

pub trait Reflect: 'static {
    fn shape() -> TypeShape
    where
        Self: Sized;

    fn reflect(&self) -> ValueRef<'_>;

    fn reflect_mut(&mut self) -> ValueMut<'_>;

    fn as_validator(&self) -> Option<&dyn Validate> {
        None
    }

    fn as_text_decoder(&mut self) -> Option<&mut dyn TextDecode> {
        None
    }

    fn as_node_decoder(&mut self) -> Option<&mut dyn NodeDecode> {
        None
    }

    /// Zero value check used by the `required` rule.
    fn is_zero(&self) -> bool {
        self.reflect().is_zero()
    }
}

/// Read-only view of a value.
pub enum ValueRef<'a> {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(&'a str),
    Duration(Duration),
    Option(Option<&'a dyn Reflect>),
    /// `Vec` items or fixed array elements.
    Seq(Vec<&'a dyn Reflect>),
    Map(Vec<(&'a dyn Reflect, &'a dyn Reflect)>),
    /// Field values in declaration order.
    Record(Vec<&'a dyn Reflect>),
    Opaque,
}

impl ValueRef<'_> {
    pub fn is_zero(&self) -> bool {
        match self {
            ValueRef::Bool(v) => !v,
            ValueRef::I8(v) => *v == 0,
            ValueRef::I16(v) => *v == 0,
            ValueRef::I32(v) => *v == 0,
            ValueRef::I64(v) => *v == 0,
            ValueRef::U8(v) => *v == 0,
            ValueRef::U16(v) => *v == 0,
            ValueRef::U32(v) => *v == 0,
            ValueRef::U64(v) => *v == 0,
            ValueRef::F32(v) => *v == 0.0,
            ValueRef::F64(v) => *v == 0.0,
            ValueRef::Str(v) => v.is_empty(),
            ValueRef::Duration(v) => v.is_zero(),
            ValueRef::Option(v) => v.is_none(),
            ValueRef::Seq(items) => items.is_empty(),
            ValueRef::Map(entries) => entries.is_empty(),
            ValueRef::Record(fields) => fields.iter().all(|field| field.is_zero()),
            ValueRef::Opaque => false,
        }
    }

    /// Text of a scalar value as it would appear in a document.
    pub fn display(&self) -> Option<String> {
        Some(match self {
            ValueRef::Bool(v) => v.to_string(),
            ValueRef::I8(v) => v.to_string(),
            ValueRef::I16(v) => v.to_string(),
            ValueRef::I32(v) => v.to_string(),
            ValueRef::I64(v) => v.to_string(),
            ValueRef::U8(v) => v.to_string(),
            ValueRef::U16(v) => v.to_string(),
            ValueRef::U32(v) => v.to_string(),
            ValueRef::U64(v) => v.to_string(),
            ValueRef::F32(v) => v.to_string(),
            ValueRef::F64(v) => v.to_string(),
            ValueRef::Str(v) => v.to_string(),
            ValueRef::Duration(v) => format_duration(*v),
            ValueRef::Option(Some(inner)) => return inner.reflect().display(),
            _ => return None,
        })
    }
}

/// Mutable view of a value.
pub enum ValueMut<'a> {
    Bool(&'a mut bool),
    I8(&'a mut i8),
    I16(&'a mut i16),
    I32(&'a mut i32),
    I64(&'a mut i64),
    U8(&'a mut u8),
    U16(&'a mut u16),
    U32(&'a mut u32),
    U64(&'a mut u64),
    F32(&'a mut f32),
    F64(&'a mut f64),
    Str(&'a mut String),
    Duration(&'a mut Duration),
    Option(&'a mut dyn OptionSlot),
    Seq(&'a mut dyn SeqSlot),
    Map(&'a mut dyn MapSlot),
    Record(Vec<&'a mut dyn Reflect>),
    Opaque,
}

pub trait OptionSlot {
    fn is_some(&self) -> bool;
    fn clear(&mut self);
    fn get_or_insert_default(&mut self) -> &mut dyn Reflect;
    fn get_mut(&mut self) -> Option<&mut dyn Reflect>;
}

impl<T: Reflect + Default> OptionSlot for Option<T> {
    fn is_some(&self) -> bool {
        Option::is_some(self)
    }

    fn clear(&mut self) {
        *self = None;
    }

    fn get_or_insert_default(&mut self) -> &mut dyn Reflect {
        self.get_or_insert_with(T::default)
    }

    fn get_mut(&mut self) -> Option<&mut dyn Reflect> {
        self.as_mut().map(|value| value as &mut dyn Reflect)
    }
}

pub trait SeqSlot {
    /// Length of a fixed array; `None` for growable sequences.
    fn fixed_len(&self) -> Option<usize>;
    fn len(&self) -> usize;
    /// Resizes a growable sequence to `len` default items.
    fn reset(&mut self, len: usize);
    fn item_mut(&mut self, index: usize) -> Option<&mut dyn Reflect>;
}

impl<T: Reflect + Default> SeqSlot for Vec<T> {
    fn fixed_len(&self) -> Option<usize> {
        None
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn reset(&mut self, len: usize) {
        self.clear();
        self.resize_with(len, T::default);
    }

    fn item_mut(&mut self, index: usize) -> Option<&mut dyn Reflect> {
        self.get_mut(index).map(|value| value as &mut dyn Reflect)
    }
}

impl<T: Reflect + Default, const N: usize> SeqSlot for [T; N] {
    fn fixed_len(&self) -> Option<usize> {
        Some(N)
    }

    fn len(&self) -> usize {
        N
    }

    fn reset(&mut self, _len: usize) {}

    fn item_mut(&mut self, index: usize) -> Option<&mut dyn Reflect> {
        self.get_mut(index).map(|value| value as &mut dyn Reflect)
    }
}

/// Callback filling a fresh key and value.
pub type FillEntry<'f> =
    dyn FnMut(&mut dyn Reflect, &mut dyn Reflect) -> Result<(), RigidError> + 'f;

pub trait MapSlot {
    fn clear(&mut self);
    fn len(&self) -> usize;
    /// Inserts a default key and value after `fill` populated them.
    fn insert_with(&mut self, fill: &mut FillEntry<'_>) -> Result<(), RigidError>;
    fn entries_mut(&mut self) -> Vec<(&dyn Reflect, &mut dyn Reflect)>;
}

impl<K, V, S> MapSlot for HashMap<K, V, S>
where
    K: Reflect + Default + Eq + Hash,
    V: Reflect + Default,
    S: BuildHasher + Default + 'static,
{
    fn clear(&mut self) {
        HashMap::clear(self);
    }

    fn len(&self) -> usize {
        HashMap::len(self)
    }

    fn insert_with(&mut self, fill: &mut FillEntry<'_>) -> Result<(), RigidError> {
        let mut key = K::default();
        let mut value = V::default();
        fill(&mut key, &mut value)?;
        self.insert(key, value);
        Ok(())
    }

    fn entries_mut(&mut self) -> Vec<(&dyn Reflect, &mut dyn Reflect)> {
        self.iter_mut()
            .map(|(k, v)| (k as &dyn Reflect, v as &mut dyn Reflect))
            .collect()
    }
}

impl<K, V> MapSlot for BTreeMap<K, V>
where
    K: Reflect + Default + Ord,
    V: Reflect + Default,
{
    fn clear(&mut self) {
        BTreeMap::clear(self);
    }

    fn len(&self) -> usize {
        BTreeMap::len(self)
    }

    fn insert_with(&mut self, fill: &mut FillEntry<'_>) -> Result<(), RigidError> {
        let mut key = K::default();
        let mut value = V::default();
        fill(&mut key, &mut value)?;
        self.insert(key, value);
        Ok(())
    }

    fn entries_mut(&mut self) -> Vec<(&dyn Reflect, &mut dyn Reflect)> {
        self.iter_mut()
            .map(|(k, v)| (k as &dyn Reflect, v as &mut dyn Reflect))
            .collect()
    }
}

macro_rules! reflect_primitive {
    ($($ty:ty => $kind:ident, $name:literal;)*) => {
        $(
            impl Reflect for $ty {
                fn shape() -> TypeShape {
                    TypeShape::new::<Self>($name, Kind::$kind)
                }

                fn reflect(&self) -> ValueRef<'_> {
                    ValueRef::$kind(*self)
                }

                fn reflect_mut(&mut self) -> ValueMut<'_> {
                    ValueMut::$kind(self)
                }
            }
        )*
    };
}

reflect_primitive! {
    bool => Bool, "bool";
    i8 => I8, "i8";
    i16 => I16, "i16";
    i32 => I32, "i32";
    i64 => I64, "i64";
    u8 => U8, "u8";
    u16 => U16, "u16";
    u32 => U32, "u32";
    u64 => U64, "u64";
    f32 => F32, "f32";
    f64 => F64, "f64";
    Duration => Duration, "Duration";
}

impl Reflect for String {
    fn shape() -> TypeShape {
        TypeShape::new::<Self>("String", Kind::Str)
    }

    fn reflect(&self) -> ValueRef<'_> {
        ValueRef::Str(self)
    }

    fn reflect_mut(&mut self) -> ValueMut<'_> {
        ValueMut::Str(self)
    }
}

/// Types the shape validator rejects; they reflect as opaque leaves.
macro_rules! reflect_unsupported {
    ($($ty:ty => $kind:ident, $name:expr;)*) => {
        $(
            impl Reflect for $ty {
                fn shape() -> TypeShape {
                    TypeShape::new::<Self>($name, Kind::$kind)
                }

                fn reflect(&self) -> ValueRef<'_> {
                    ValueRef::Opaque
                }

                fn reflect_mut(&mut self) -> ValueMut<'_> {
                    ValueMut::Opaque
                }
            }
        )*
    };
}

reflect_unsupported! {
    isize => PlatformInt, "isize";
    usize => PlatformUint, "usize";
    serde_json::Value => Any, "serde_json::Value";
}

impl<T: 'static> Reflect for mpsc::Sender<T> {
    fn shape() -> TypeShape {
        TypeShape::new::<Self>("mpsc::Sender", Kind::Channel)
    }

    fn reflect(&self) -> ValueRef<'_> {
        ValueRef::Opaque
    }

    fn reflect_mut(&mut self) -> ValueMut<'_> {
        ValueMut::Opaque
    }
}

impl<T: 'static> Reflect for mpsc::Receiver<T> {
    fn shape() -> TypeShape {
        TypeShape::new::<Self>("mpsc::Receiver", Kind::Channel)
    }

    fn reflect(&self) -> ValueRef<'_> {
        ValueRef::Opaque
    }

    fn reflect_mut(&mut self) -> ValueMut<'_> {
        ValueMut::Opaque
    }
}

impl<T: ?Sized + 'static> Reflect for *const T {
    fn shape() -> TypeShape {
        TypeShape::new::<Self>("*const T", Kind::RawPointer)
    }

    fn reflect(&self) -> ValueRef<'_> {
        ValueRef::Opaque
    }

    fn reflect_mut(&mut self) -> ValueMut<'_> {
        ValueMut::Opaque
    }
}

impl<T: ?Sized + 'static> Reflect for *mut T {
    fn shape() -> TypeShape {
        TypeShape::new::<Self>("*mut T", Kind::RawPointer)
    }

    fn reflect(&self) -> ValueRef<'_> {
        ValueRef::Opaque
    }

    fn reflect_mut(&mut self) -> ValueMut<'_> {
        ValueMut::Opaque
    }
}

macro_rules! reflect_fn_pointer {
    ($($arg:ident),*) => {
        impl<R: 'static, $($arg: 'static),*> Reflect for fn($($arg),*) -> R {
            fn shape() -> TypeShape {
                TypeShape::new::<Self>("fn", Kind::Function)
            }

            fn reflect(&self) -> ValueRef<'_> {
                ValueRef::Opaque
            }

            fn reflect_mut(&mut self) -> ValueMut<'_> {
                ValueMut::Opaque
            }
        }
    };
}

reflect_fn_pointer!();
reflect_fn_pointer!(A);
reflect_fn_pointer!(A, B);

impl<T: Reflect + Default> Reflect for Option<T> {
    fn shape() -> TypeShape {
        TypeShape::new::<Self>(format!("Option<{}>", T::shape().name()), Kind::Option(T::shape))
    }

    fn reflect(&self) -> ValueRef<'_> {
        ValueRef::Option(self.as_ref().map(|value| value as &dyn Reflect))
    }

    fn reflect_mut(&mut self) -> ValueMut<'_> {
        ValueMut::Option(self)
    }
}

/// Boxes are transparent: they reflect exactly like their content.
impl<T: Reflect> Reflect for Box<T> {
    fn shape() -> TypeShape {
        T::shape()
    }

    fn reflect(&self) -> ValueRef<'_> {
        (**self).reflect()
    }

    fn reflect_mut(&mut self) -> ValueMut<'_> {
        (**self).reflect_mut()
    }

    fn as_validator(&self) -> Option<&dyn Validate> {
        (**self).as_validator()
    }

    fn as_text_decoder(&mut self) -> Option<&mut dyn TextDecode> {
        (**self).as_text_decoder()
    }

    fn as_node_decoder(&mut self) -> Option<&mut dyn NodeDecode> {
        (**self).as_node_decoder()
    }

    fn is_zero(&self) -> bool {
        (**self).is_zero()
    }
}

impl<T: Reflect + Default> Reflect for Vec<T> {
    fn shape() -> TypeShape {
        TypeShape::new::<Self>(format!("Vec<{}>", T::shape().name()), Kind::Seq(T::shape))
    }

    fn reflect(&self) -> ValueRef<'_> {
        ValueRef::Seq(self.iter().map(|value| value as &dyn Reflect).collect())
    }

    fn reflect_mut(&mut self) -> ValueMut<'_> {
        ValueMut::Seq(self)
    }
}

impl<T: Reflect + Default, const N: usize> Reflect for [T; N] {
    fn shape() -> TypeShape {
        TypeShape::new::<Self>(
            format!("[{}; {N}]", T::shape().name()),
            Kind::Array(T::shape, N),
        )
    }

    fn reflect(&self) -> ValueRef<'_> {
        ValueRef::Seq(self.iter().map(|value| value as &dyn Reflect).collect())
    }

    fn reflect_mut(&mut self) -> ValueMut<'_> {
        ValueMut::Seq(self)
    }

    fn is_zero(&self) -> bool {
        self.iter().all(Reflect::is_zero)
    }
}

impl<K, V, S> Reflect for HashMap<K, V, S>
where
    K: Reflect + Default + Eq + Hash,
    V: Reflect + Default,
    S: BuildHasher + Default + 'static,
{
    fn shape() -> TypeShape {
        TypeShape::new::<Self>(
            format!("HashMap<{}, {}>", K::shape().name(), V::shape().name()),
            Kind::Map(K::shape, V::shape),
        )
    }

    fn reflect(&self) -> ValueRef<'_> {
        ValueRef::Map(
            self.iter()
                .map(|(k, v)| (k as &dyn Reflect, v as &dyn Reflect))
                .collect(),
        )
    }

    fn reflect_mut(&mut self) -> ValueMut<'_> {
        ValueMut::Map(self)
    }
}

impl<K, V> Reflect for BTreeMap<K, V>
where
    K: Reflect + Default + Ord,
    V: Reflect + Default,
{
    fn shape() -> TypeShape {
        TypeShape::new::<Self>(
            format!("BTreeMap<{}, {}>", K::shape().name(), V::shape().name()),
            Kind::Map(K::shape, V::shape),
        )
    }

    fn reflect(&self) -> ValueRef<'_> {
        ValueRef::Map(
            self.iter()
                .map(|(k, v)| (k as &dyn Reflect, v as &dyn Reflect))
                .collect(),
        )
    }

    fn reflect_mut(&mut self) -> ValueMut<'_> {
        ValueMut::Map(self)
    }
}

impl Reflect for PathBuf {
    fn shape() -> TypeShape {
        TypeShape::opaque::<Self>("PathBuf").with(Capability::TextDecode)
    }

    fn reflect(&self) -> ValueRef<'_> {
        ValueRef::Opaque
    }

    fn reflect_mut(&mut self) -> ValueMut<'_> {
        ValueMut::Opaque
    }

    fn as_text_decoder(&mut self) -> Option<&mut dyn TextDecode> {
        Some(self)
    }

    fn is_zero(&self) -> bool {
        self.as_os_str().is_empty()
    }
}

impl TextDecode for PathBuf {
    fn decode_text(&mut self, text: &str) -> Result<(), BoxError> {
        *self = PathBuf::from(text);
        Ok(())
    }
}

#[cfg(feature = "chrono")]
mod chrono_impls {
    use chrono::{DateTime, NaiveDate, Utc};

    use super::*;

    impl Reflect for DateTime<Utc> {
        fn shape() -> TypeShape {
            TypeShape::opaque::<Self>("DateTime<Utc>").with(Capability::TextDecode)
        }

        fn reflect(&self) -> ValueRef<'_> {
            ValueRef::Opaque
        }

        fn reflect_mut(&mut self) -> ValueMut<'_> {
            ValueMut::Opaque
        }

        fn as_text_decoder(&mut self) -> Option<&mut dyn TextDecode> {
            Some(self)
        }

        fn is_zero(&self) -> bool {
            *self == DateTime::<Utc>::default()
        }
    }

    /// RFC 3339 timestamps.
    impl TextDecode for DateTime<Utc> {
        fn decode_text(&mut self, text: &str) -> Result<(), BoxError> {
            *self = DateTime::parse_from_rfc3339(text)?.with_timezone(&Utc);
            Ok(())
        }
    }

    impl Reflect for NaiveDate {
        fn shape() -> TypeShape {
            TypeShape::opaque::<Self>("NaiveDate").with(Capability::TextDecode)
        }

        fn reflect(&self) -> ValueRef<'_> {
            ValueRef::Opaque
        }

        fn reflect_mut(&mut self) -> ValueMut<'_> {
            ValueMut::Opaque
        }

        fn as_text_decoder(&mut self) -> Option<&mut dyn TextDecode> {
            Some(self)
        }

        fn is_zero(&self) -> bool {
            *self == NaiveDate::default()
        }
    }

    /// `YYYY-MM-DD` dates.
    impl TextDecode for NaiveDate {
        fn decode_text(&mut self, text: &str) -> Result<(), BoxError> {
            *self = NaiveDate::parse_from_str(text, "%Y-%m-%d")?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_slot_allocates_and_clears() {
        let mut value: Option<u8> = None;
        let slot: &mut dyn OptionSlot = &mut value;
        if let ValueMut::U8(v) = slot.get_or_insert_default().reflect_mut() {
            *v = 7;
        }
        assert_eq!(value, Some(7));
        OptionSlot::clear(&mut value);
        assert_eq!(value, None);
    }

    #[test]
    fn zero_values() {
        assert!(0u32.is_zero());
        assert!(String::new().is_zero());
        assert!(!Some(0u8).is_zero());
        assert!([0u8; 3].is_zero());
        assert!(!vec![1u8].is_zero());
    }

    #[test]
    fn scalar_display_matches_document_text() {
        assert_eq!(true.reflect().display().as_deref(), Some("true"));
        assert_eq!((-5i16).reflect().display().as_deref(), Some("-5"));
        assert_eq!(
            Duration::from_secs(90).reflect().display().as_deref(),
            Some("1m30s")
        );
        assert!(vec![1u8].reflect().display().is_none());
    }
}
