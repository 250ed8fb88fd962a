//! Field-level validation rules declared through `validate = "..."` tags.
//!
//! A tag is a comma-separated list such as `required,min=1,max=64` or
//! `oneof=debug info warn`. Rules are compiled against the field's shape
//! so that tags that cannot apply are rejected before any value exists.

use std::time::Duration;

use thiserror::Error;

use crate::ast::NodeRef;
use crate::duration::parse_duration;
use crate::error::{ErrorKind, RigidError};
use crate::path::{locate, Location};
use crate::reflect::{Reflect, ValueRef};
use crate::shape::{Kind, TypeShape};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleTagError {
    #[error("empty rule in {0:?}")]
    Empty(String),
    #[error("unknown rule {0:?}")]
    Unknown(String),
    #[error("rule {0:?} requires a parameter")]
    MissingParam(String),
    #[error("rule {0:?} takes no parameter")]
    UnexpectedParam(String),
    #[error("rule {rule:?} does not apply to {type_name}")]
    NotApplicable { rule: String, type_name: String },
    #[error("rule {rule:?} has invalid parameter {param:?}")]
    InvalidParam { rule: String, param: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Required,
    OmitEmpty,
    Min,
    Max,
    Len,
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    OneOf,
}

impl Op {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "required" => Op::Required,
            "omitempty" => Op::OmitEmpty,
            "min" => Op::Min,
            "max" => Op::Max,
            "len" => Op::Len,
            "eq" => Op::Eq,
            "ne" => Op::Ne,
            "gt" => Op::Gt,
            "gte" => Op::Gte,
            "lt" => Op::Lt,
            "lte" => Op::Lte,
            "oneof" => Op::OneOf,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Op::Required => "required",
            Op::OmitEmpty => "omitempty",
            Op::Min => "min",
            Op::Max => "max",
            Op::Len => "len",
            Op::Eq => "eq",
            Op::Ne => "ne",
            Op::Gt => "gt",
            Op::Gte => "gte",
            Op::Lt => "lt",
            Op::Lte => "lte",
            Op::OneOf => "oneof",
        }
    }

    fn takes_param(self) -> bool {
        !matches!(self, Op::Required | Op::OmitEmpty)
    }

    fn compare<T: PartialOrd>(self, actual: T, expected: T) -> bool {
        match self {
            Op::Min | Op::Gte => actual >= expected,
            Op::Max | Op::Lte => actual <= expected,
            Op::Gt => actual > expected,
            Op::Lt => actual < expected,
            Op::Len | Op::Eq => actual == expected,
            Op::Ne => actual != expected,
            Op::Required | Op::OmitEmpty | Op::OneOf => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    None,
    Number(f64),
    Count(usize),
    Duration(Duration),
    Text(String),
    Bool(bool),
    Words(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    op: Op,
    operand: Operand,
}

impl Rule {
    pub fn name(&self) -> &'static str {
        self.op.name()
    }
}

#[derive(Clone, Copy)]
enum Category {
    Number,
    Count,
    Duration,
    Text,
    Bool,
    Words,
}

/// How a parameterized rule measures a value of `kind`.
fn category(kind: &Kind, op: Op) -> Option<Category> {
    let numeric = matches!(
        kind,
        Kind::I8
            | Kind::I16
            | Kind::I32
            | Kind::I64
            | Kind::U8
            | Kind::U16
            | Kind::U32
            | Kind::U64
            | Kind::F32
            | Kind::F64
    );
    match (kind, op) {
        (_, Op::OneOf) if numeric || matches!(kind, Kind::Str) => Some(Category::Words),
        (_, Op::OneOf) => None,
        _ if numeric => Some(Category::Number),
        (Kind::Str, Op::Eq | Op::Ne) => Some(Category::Text),
        (Kind::Str | Kind::Seq(_) | Kind::Array(..) | Kind::Map(..), _) => Some(Category::Count),
        (Kind::Duration, _) => Some(Category::Duration),
        (Kind::Bool, Op::Eq | Op::Ne) => Some(Category::Bool),
        _ => None,
    }
}

/// Parses a rule tag and checks every rule applies to `shape`.
pub fn compile_rules(tag: &str, shape: &TypeShape) -> Result<Vec<Rule>, RuleTagError> {
    let target = shape.deref_option();
    let mut rules = Vec::new();
    for part in tag.split(',').map(str::trim) {
        if part.is_empty() {
            return Err(RuleTagError::Empty(tag.to_string()));
        }
        let (name, param) = match part.split_once('=') {
            Some((name, param)) => (name, Some(param)),
            None => (part, None),
        };
        let op = Op::parse(name).ok_or_else(|| RuleTagError::Unknown(name.to_string()))?;

        let operand = match (op.takes_param(), param) {
            (false, None) => Operand::None,
            (false, Some(_)) => return Err(RuleTagError::UnexpectedParam(name.to_string())),
            (true, None) => return Err(RuleTagError::MissingParam(name.to_string())),
            (true, Some(param)) => {
                let category =
                    category(target.kind(), op).ok_or_else(|| RuleTagError::NotApplicable {
                        rule: name.to_string(),
                        type_name: shape.name().to_string(),
                    })?;
                parse_operand(category, name, param)?
            }
        };
        rules.push(Rule { op, operand });
    }
    Ok(rules)
}

fn parse_operand(category: Category, rule: &str, param: &str) -> Result<Operand, RuleTagError> {
    let invalid = || RuleTagError::InvalidParam {
        rule: rule.to_string(),
        param: param.to_string(),
    };
    Ok(match category {
        Category::Number => Operand::Number(param.parse().map_err(|_| invalid())?),
        Category::Count => Operand::Count(param.parse().map_err(|_| invalid())?),
        Category::Duration => Operand::Duration(parse_duration(param).map_err(|_| invalid())?),
        Category::Text => Operand::Text(param.to_string()),
        Category::Bool => match param {
            "true" => Operand::Bool(true),
            "false" => Operand::Bool(false),
            _ => return Err(invalid()),
        },
        Category::Words => {
            let words: Vec<String> = param.split_whitespace().map(str::to_string).collect();
            if words.is_empty() {
                return Err(invalid());
            }
            Operand::Words(words)
        }
    })
}

fn as_number(view: &ValueRef<'_>) -> Option<f64> {
    Some(match view {
        ValueRef::I8(v) => f64::from(*v),
        ValueRef::I16(v) => f64::from(*v),
        ValueRef::I32(v) => f64::from(*v),
        ValueRef::I64(v) => *v as f64,
        ValueRef::U8(v) => f64::from(*v),
        ValueRef::U16(v) => f64::from(*v),
        ValueRef::U32(v) => f64::from(*v),
        ValueRef::U64(v) => *v as f64,
        ValueRef::F32(v) => f64::from(*v),
        ValueRef::F64(v) => *v,
        _ => return None,
    })
}

fn as_count(view: &ValueRef<'_>) -> Option<usize> {
    match view {
        ValueRef::Str(s) => Some(s.chars().count()),
        ValueRef::Seq(items) => Some(items.len()),
        ValueRef::Map(entries) => Some(entries.len()),
        _ => None,
    }
}

/// Returns `true` when a parameterized rule holds for `value`.
/// Absent optional values satisfy every rule but `required`.
fn holds(rule: &Rule, value: &dyn Reflect) -> bool {
    let view = match value.reflect() {
        ValueRef::Option(None) => return true,
        ValueRef::Option(Some(inner)) => inner.reflect(),
        view => view,
    };
    let op = rule.op;
    match (&rule.operand, &view) {
        (Operand::None, _) => true,
        (Operand::Number(expected), _) => as_number(&view).is_some_and(|v| op.compare(v, *expected)),
        (Operand::Count(expected), _) => as_count(&view).is_some_and(|v| op.compare(v, *expected)),
        (Operand::Duration(expected), ValueRef::Duration(v)) => op.compare(*v, *expected),
        (Operand::Text(expected), ValueRef::Str(v)) => op.compare(*v, expected.as_str()),
        (Operand::Bool(expected), ValueRef::Bool(v)) => op.compare(*v, *expected),
        (Operand::Words(words), _) => view
            .display()
            .is_some_and(|text| words.iter().any(|word| *word == text)),
        _ => false,
    }
}

/// First rule `value` violates, if any.
fn first_violation(rules: &[Rule], value: &dyn Reflect) -> Option<&'static str> {
    let zero = value.is_zero();
    if zero && rules.iter().any(|rule| rule.op == Op::OmitEmpty) {
        return None;
    }
    rules.iter().find_map(|rule| match rule.op {
        Op::OmitEmpty => None,
        Op::Required => zero.then(|| rule.name()),
        _ => (!holds(rule, value)).then(|| rule.name()),
    })
}

/// A field violating one of its rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// `Root.field.sub`, built from Rust field names.
    pub namespace: String,
    pub rule: &'static str,
}

/// Checks the rules of every exported field, depth-first in declaration
/// order, descending into records and optional records.
pub fn check(shape: &TypeShape, value: &dyn Reflect) -> Result<Option<Violation>, RigidError> {
    check_record(shape, value, shape.name())
}

fn check_record(
    shape: &TypeShape,
    value: &dyn Reflect,
    namespace: &str,
) -> Result<Option<Violation>, RigidError> {
    let ValueRef::Record(values) = value.reflect() else {
        return Ok(None);
    };
    for (field, field_value) in shape.fields().iter().zip(values) {
        if !field.exported {
            continue;
        }
        let namespace = format!("{namespace}.{}", field.name);
        let field_shape = field.shape();

        if let Some(tag) = field.rules {
            let rules = compile_rules(tag, &field_shape).map_err(|err| {
                RigidError::at_path_detail(ErrorKind::TypeInvalidRuleTag, &namespace, err)
            })?;
            if let Some(rule) = first_violation(&rules, field_value) {
                return Ok(Some(Violation { namespace, rule }));
            }
        }

        let target = field_shape.deref_option();
        if !matches!(target.kind(), Kind::Record(_)) || target.decodes_itself() {
            continue;
        }
        let inner = match field_value.reflect() {
            ValueRef::Option(inner) => inner,
            ValueRef::Record(_) => Some(field_value),
            _ => None,
        };
        if let Some(inner) = inner {
            if let Some(violation) = check_record(&target, inner, &namespace)? {
                return Ok(Some(violation));
            }
        }
    }
    Ok(None)
}

/// Runs the rule engine over `value` and reports the first violation,
/// located in the document when one is given.
pub(crate) fn enforce<T: Reflect>(value: &T, root: Option<NodeRef<'_>>) -> Result<(), RigidError> {
    let shape = T::shape();
    let Some(violation) = check(&shape, value)? else {
        return Ok(());
    };
    let kind = ErrorKind::ValidationRule;
    let location = root.map(|root| locate(&shape, &violation.namespace, root));
    let message = match location {
        Some(Location::Node { position, yaml }) => {
            format!("at {position}: {yaml:?} {kind}: {:?}", violation.rule)
        }
        Some(Location::Ignored) | None => {
            format!("at {}: {kind}: {:?}", violation.namespace, violation.rule)
        }
    };
    Err(RigidError::new(kind, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    record! {
        #[derive(Default)]
        struct Limits {
            pub level: Option<u8> => { yaml = "level", validate = "lte=3" },
        }
    }

    record! {
        #[derive(Default)]
        struct Service {
            pub name: String => { yaml = "name", validate = "required,max=8" },
            pub mode: String => { yaml = "mode", validate = "omitempty,oneof=fast slow" },
            pub tags: Vec<String> => { yaml = "tags", validate = "min=1" },
            pub timeout: Duration => { yaml = "timeout", validate = "gte=1s" },
            pub limits: Option<Limits> => { yaml = "limits" },
        }
    }

    fn service() -> Service {
        Service {
            name: "api".to_string(),
            mode: String::new(),
            tags: vec!["a".to_string()],
            timeout: Duration::from_secs(5),
            limits: None,
        }
    }

    fn violation(value: &Service) -> Option<Violation> {
        check(&Service::shape(), value).unwrap()
    }

    #[test]
    fn valid_values_pass() {
        assert_eq!(violation(&service()), None);
    }

    #[test]
    fn required_rejects_zero_values() {
        let value = Service {
            name: String::new(),
            ..service()
        };
        assert_eq!(
            violation(&value),
            Some(Violation {
                namespace: "Service.name".to_string(),
                rule: "required"
            })
        );
    }

    #[test]
    fn strings_compare_character_counts() {
        let value = Service {
            name: "ünïcödé!".to_string(),
            ..service()
        };
        assert_eq!(violation(&value), None);
        let value = Service {
            name: "far-too-long".to_string(),
            ..service()
        };
        assert_eq!(violation(&value).map(|v| v.rule), Some("max"));
    }

    #[test]
    fn omitempty_skips_zero_values_only() {
        let value = Service {
            mode: "medium".to_string(),
            ..service()
        };
        assert_eq!(violation(&value).map(|v| v.rule), Some("oneof"));
    }

    #[test]
    fn durations_and_collections() {
        let value = Service {
            tags: Vec::new(),
            ..service()
        };
        assert_eq!(violation(&value).map(|v| v.rule), Some("min"));
        let value = Service {
            timeout: Duration::from_millis(10),
            ..service()
        };
        assert_eq!(violation(&value).map(|v| v.rule), Some("gte"));
    }

    #[test]
    fn descends_into_optional_records() {
        let value = Service {
            limits: Some(Limits { level: Some(4) }),
            ..service()
        };
        assert_eq!(
            violation(&value),
            Some(Violation {
                namespace: "Service.limits.level".to_string(),
                rule: "lte"
            })
        );
        let value = Service {
            limits: Some(Limits { level: None }),
            ..service()
        };
        assert_eq!(violation(&value), None);
    }

    #[test]
    fn rejects_inapplicable_tags() {
        let shape = <bool as Reflect>::shape();
        assert_eq!(
            compile_rules("min=1", &shape),
            Err(RuleTagError::NotApplicable {
                rule: "min".to_string(),
                type_name: "bool".to_string()
            })
        );
        let shape = <u8 as Reflect>::shape();
        assert!(matches!(
            compile_rules("max=big", &shape),
            Err(RuleTagError::InvalidParam { .. })
        ));
        assert_eq!(
            compile_rules("required,", &shape),
            Err(RuleTagError::Empty("required,".to_string()))
        );
        assert_eq!(
            compile_rules("between=1", &shape),
            Err(RuleTagError::Unknown("between".to_string()))
        );
    }
}
