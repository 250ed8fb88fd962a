//! Strict loader for a restricted YAML subset.
//!
//! Target types describe themselves through [`Reflect`], usually declared
//! with the [`record!`] and [`newtype!`] macros. Loading rejects
//! unsupported type shapes before any document is read, enforces document
//! restrictions with precise locations, applies environment overrides and
//! finally runs custom [`Validate`] implementations and `validate` rule
//! tags.

pub mod ast;
mod decode;
pub mod duration;
pub mod env;
pub mod error;
mod invoke;
mod macros;
pub mod mini_yaml;
pub mod path;
pub mod reflect;
pub mod rules;
pub mod shape;
pub mod type_check;
pub mod validate;

use std::fmt;
use std::path::Path;

use tracing::debug;

pub use ast::{Document, NodeId, NodeKind, NodeRef, Position, Style};
pub use duration::{format_duration, parse_duration};
pub use env::{EnvProvider, MapEnvProvider, ProcessEnvProvider};
pub use error::{BoxError, ErrorKind, RigidError};
pub use reflect::{NodeDecode, Reflect, TextDecode, Validate, ValueMut, ValueRef};
pub use shape::{Capability, FieldShape, Kind, TypeShape};
pub use type_check::validate_type;

use decode::decode_value;
use env::apply_overrides;
use invoke::invoke_validators;
use path::FieldPath;
use validate::DocumentValidator;

/// Behavior flags for [`load_with`] and [`load_file_with`].
#[derive(Clone, Copy)]
pub struct LoadOptions<'a> {
    strict_presence: bool,
    env: &'a dyn EnvProvider,
}

impl Default for LoadOptions<'_> {
    fn default() -> Self {
        Self {
            strict_presence: false,
            env: &ProcessEnvProvider,
        }
    }
}

impl<'a> LoadOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes record fields missing from the document a fatal error.
    pub fn strict_presence(mut self, enabled: bool) -> Self {
        self.strict_presence = enabled;
        self
    }

    /// Replaces the process environment as the source of env overrides.
    pub fn env_provider(mut self, env: &'a dyn EnvProvider) -> Self {
        self.env = env;
        self
    }
}

impl fmt::Debug for LoadOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("strict_presence", &self.strict_presence)
            .finish_non_exhaustive()
    }
}

/// Loads `source` into `target` with default options.
pub fn load<T: Reflect>(source: impl AsRef<[u8]>, target: &mut T) -> Result<(), RigidError> {
    load_with(source, target, &LoadOptions::default())
}

/// Loads `source` into `target`.
///
/// On error `target` may be partially written and must not be used.
pub fn load_with<T: Reflect>(
    source: impl AsRef<[u8]>,
    target: &mut T,
    options: &LoadOptions<'_>,
) -> Result<(), RigidError> {
    validate_type::<T>()?;

    let source = source.as_ref();
    if source.is_empty() {
        return Err(RigidError::new(
            ErrorKind::YamlEmptyFile,
            ErrorKind::YamlEmptyFile.to_string(),
        ));
    }

    let text = std::str::from_utf8(source).map_err(|err| invalid_utf8(source, err))?;
    let document = Document::parse(text)?;
    let shape = T::shape();
    let root = FieldPath::root(shape.name());
    debug!(
        type_name = shape.name(),
        nodes = document.node_count(),
        strict_presence = options.strict_presence,
        "loading document"
    );

    let mut values = DocumentValidator::new(options.strict_presence);
    values.validate("", &root, &shape, document.root())?;
    values.finish()?;

    decode_value(&root, &shape, document.root(), target)?;
    apply_overrides(&root, None, &shape, target, options.env)?;
    invoke_validators(&root, &shape, &*target, Some(document.root()))?;
    rules::enforce(&*target, Some(document.root()))?;

    debug!(type_name = shape.name(), "document loaded");
    Ok(())
}

/// Reads the file at `path` and loads it with default options.
pub fn load_file<T: Reflect>(path: impl AsRef<Path>, target: &mut T) -> Result<(), RigidError> {
    load_file_with(path, target, &LoadOptions::default())
}

/// Reads the file at `path` and loads it into `target`.
pub fn load_file_with<T: Reflect>(
    path: impl AsRef<Path>,
    target: &mut T,
    options: &LoadOptions<'_>,
) -> Result<(), RigidError> {
    let path = path.as_ref();
    let source = std::fs::read(path).map_err(|err| {
        let kind = ErrorKind::Io;
        RigidError::new(
            kind,
            format!("{kind} {:?}: {err}", path.display().to_string()),
        )
        .with_source(Box::new(err))
    })?;
    load_with(source, target, options)
}

/// Validates an in-memory value: type shape, rule tags, then custom
/// [`Validate`] implementations. Errors carry field paths only.
pub fn validate<T: Reflect>(value: &T) -> Result<(), RigidError> {
    validate_type::<T>()?;
    let shape = T::shape();
    rules::enforce(value, None)?;
    invoke_validators(&FieldPath::root(shape.name()), &shape, value, None)
}

fn invalid_utf8(source: &[u8], err: std::str::Utf8Error) -> RigidError {
    let valid = &source[..err.valid_up_to()];
    let line = valid.iter().filter(|b| **b == b'\n').count() + 1;
    let line_start = valid
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |index| index + 1);
    let column = String::from_utf8_lossy(&valid[line_start..]).chars().count() + 1;
    RigidError::malformed(Position::new(line, column), "invalid UTF-8")
}
