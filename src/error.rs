//! Error definitions for every `rigid_yaml` loading stage.

use std::fmt;

use thiserror::Error;

use crate::ast::Position;

/// Boxed error returned by user capability implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Stable sentinel identifying the cause of a [`RigidError`].
///
/// The `Display` text of every kind is embedded in the message of the
/// errors carrying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    /// A custom [`Validate`](crate::Validate) implementation failed.
    #[error("validation")]
    Validation,
    /// A field violates its `validate` rule tag.
    #[error("violates validation rule")]
    ValidationRule,

    #[error("multi-document YAML files are not supported")]
    YamlMultidoc,
    #[error("empty file")]
    YamlEmptyFile,
    /// Tokenizer or decoder failure.
    #[error("malformed YAML")]
    YamlMalformed,
    #[error("inline yaml on non-embedded field")]
    YamlInlineNonEmbedded,
    #[error("use `yaml = \",inline\"` for embedded fields")]
    YamlInlineOpt,
    #[error("yaml tag on unexported field")]
    YamlTagOnUnexported,
    #[error("a yaml tag must be unique")]
    YamlTagRedefined,
    #[error("yaml anchors must be unique throughout the whole document")]
    YamlAnchorRedefined,
    #[error("yaml anchors must be referenced at least once")]
    YamlAnchorUnused,
    #[error("don't use anchors with implicit null value")]
    YamlAnchorNoValue,
    /// Only reported when strict presence is enabled.
    #[error("missing field in config file")]
    YamlMissingField,
    #[error(
        "must be either false or true, other variants of boolean literals of YAML are not supported"
    )]
    YamlBadBoolLiteral,
    #[error("avoid using YAML tags")]
    YamlTagUsed,
    #[error("cannot assign null to non-nullable type")]
    YamlNullOnNonNullable,
    #[error("must be null, any other variants of null are not supported")]
    YamlBadNullLiteral,
    #[error("value must be a string because the target type decodes from text")]
    YamlNonStrOnTextDecoder,
    #[error("avoid using YAML merge keys")]
    YamlMergeKey,
    #[error("avoid empty items in arrays as those will not be appended to the target Vec")]
    YamlEmptyArrayItem,

    #[error("recursive type")]
    TypeRecursive,
    #[error("root type must be a record and must not decode itself from text or nodes")]
    TypeIllegalRoot,
    #[error("missing yaml tag")]
    TypeMissingYamlTag,
    #[error("env tag on unexported field")]
    TypeEnvTagOnUnexported,
    #[error("types decoding themselves must not declare yaml or env tags on their fields")]
    TypeTagOnDecoder,
    #[error("env var on node decoder implementation")]
    TypeEnvOnNodeDecoder,
    #[error("no exported fields")]
    TypeNoExportedFields,
    #[error("invalid env tag: must match the POSIX env var regexp: ^[A-Z_][A-Z0-9_]*$")]
    TypeInvalidEnvTag,
    #[error("env var on unsupported type")]
    TypeEnvOnUnsupportedType,
    #[error("env tag behind Option, Vec, array, or map is not allowed")]
    TypeEnvTagInContainer,
    #[error("unsupported type")]
    TypeUnsupported,
    #[error("unsupported Option type")]
    TypeUnsupportedOption,
    #[error("the ignore marker \"-\" must not carry a name or options")]
    TypeIgnoredTagMismatch,
    #[error("invalid validate tag")]
    TypeInvalidRuleTag,

    #[error("invalid env var")]
    EnvInvalidVar,
    /// Reading the source file failed.
    #[error("reading file")]
    Io,
}

/// Single error value returned by every public entry point.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RigidError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl RigidError {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn with_source(mut self, source: BoxError) -> Self {
        self.source = Some(source);
        self
    }

    /// `at <path>: <kind>`
    pub(crate) fn at_path(kind: ErrorKind, path: &str) -> Self {
        Self::new(kind, format!("at {path}: {kind}"))
    }

    /// `at <path>: <kind>: <detail>`
    pub(crate) fn at_path_detail(kind: ErrorKind, path: &str, detail: impl fmt::Display) -> Self {
        Self::new(kind, format!("at {path}: {kind}: {detail}"))
    }

    /// `at <line>:<col>: "<yaml>" (<path>): <kind>`, or without the yaml
    /// name at the document root.
    pub(crate) fn at_node(kind: ErrorKind, position: Position, yaml: &str, path: &str) -> Self {
        Self::at_node_detail(kind, position, yaml, path, kind)
    }

    /// Like [`RigidError::at_node`] with `reason` in place of the bare sentinel.
    pub(crate) fn at_node_detail(
        kind: ErrorKind,
        position: Position,
        yaml: &str,
        path: &str,
        reason: impl fmt::Display,
    ) -> Self {
        let message = if yaml.is_empty() {
            format!("at {position}: {path}: {reason}")
        } else {
            format!("at {position}: \"{yaml}\" ({path}): {reason}")
        };
        Self::new(kind, message)
    }

    /// Tokenizer or decoder failure at a document position.
    pub(crate) fn malformed(position: Position, detail: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::YamlMalformed,
            format!("{}: at {position}: {detail}", ErrorKind::YamlMalformed),
        )
    }

    /// Stable sentinel of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns `true` when this error carries `kind`.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Human-readable message, identical to the `Display` output.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl PartialEq<ErrorKind> for RigidError {
    fn eq(&self, other: &ErrorKind) -> bool {
        self.kind == *other
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("inner failure")]
    struct Inner;

    #[test]
    fn node_errors_include_yaml_name_and_path() {
        let err = RigidError::at_node(
            ErrorKind::YamlNullOnNonNullable,
            Position::new(2, 6),
            "str",
            "Config.str",
        );
        assert_eq!(
            err.to_string(),
            "at 2:6: \"str\" (Config.str): cannot assign null to non-nullable type"
        );
        assert!(err.is(ErrorKind::YamlNullOnNonNullable));
        assert_eq!(err, ErrorKind::YamlNullOnNonNullable);
    }

    #[test]
    fn root_node_errors_omit_yaml_name() {
        let err = RigidError::at_node(ErrorKind::YamlTagUsed, Position::new(1, 1), "", "Config");
        assert_eq!(err.to_string(), "at 1:1: Config: avoid using YAML tags");
    }

    #[test]
    fn boxed_sources_can_be_downcast() {
        let err = RigidError::new(ErrorKind::Validation, "validation").with_source(Box::new(Inner));
        let source = err.source().expect("source");
        assert!(source.downcast_ref::<Inner>().is_some());
    }
}
