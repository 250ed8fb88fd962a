//! Environment variable overrides applied to decoded values.

use std::collections::HashMap;
use std::error::Error;
use std::str::FromStr;

use tracing::debug;

use crate::duration::parse_duration;
use crate::error::{BoxError, ErrorKind, RigidError};
use crate::path::FieldPath;
use crate::reflect::{Reflect, ValueMut};
use crate::shape::{Capability, Kind, TypeShape};

/// Source for environment variable lookups.
pub trait EnvProvider {
    /// Returns the environment value for `key`, if available.
    fn get(&self, key: &str) -> Option<String>;
}

/// [`EnvProvider`] implementation backed by process environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvProvider;

impl EnvProvider for ProcessEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// [`EnvProvider`] implementation backed by a caller-provided map.
#[derive(Debug, Clone, Default)]
pub struct MapEnvProvider {
    values: HashMap<String, String>,
}

impl MapEnvProvider {
    /// Creates a new map-backed provider.
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnvProvider {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl EnvProvider for MapEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Overwrites every field declaring an env var that is set in `env`.
///
/// Unset variables leave the decoded value untouched.
pub(crate) fn apply_overrides(
    path: &FieldPath,
    var: Option<&str>,
    shape: &TypeShape,
    target: &mut dyn Reflect,
    env: &dyn EnvProvider,
) -> Result<(), RigidError> {
    let raw = var.and_then(|var| env.get(var).map(|raw| (var, raw)));

    if let Kind::Option(inner) = shape.kind() {
        let inner = inner();
        let ValueMut::Option(slot) = target.reflect_mut() else {
            return Ok(());
        };
        return match raw {
            Some((_, raw)) if raw == "null" => {
                slot.clear();
                Ok(())
            }
            Some((var, raw)) => {
                let value = slot.get_or_insert_default();
                apply_leaf(path, var, &raw, &inner, value)
            }
            None => match slot.get_mut() {
                Some(value) => apply_overrides(path, None, &inner, value, env),
                None => Ok(()),
            },
        };
    }

    if let Some((var, raw)) = raw {
        return apply_leaf(path, var, &raw, shape, target);
    }

    match shape.kind() {
        Kind::Record(fields) if !shape.decodes_itself() => {
            let ValueMut::Record(values) = target.reflect_mut() else {
                return Ok(());
            };
            for (field, value) in fields.iter().zip(values) {
                if !field.exported {
                    continue;
                }
                apply_overrides(&path.field(field.name), field.env, &field.shape(), value, env)?;
            }
            Ok(())
        }
        Kind::Array(elem, _) => {
            let elem = elem();
            let ValueMut::Seq(slot) = target.reflect_mut() else {
                return Ok(());
            };
            for index in 0..slot.len() {
                if let Some(item) = slot.item_mut(index) {
                    apply_overrides(&path.index(index), None, &elem, item, env)?;
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn apply_leaf(
    path: &FieldPath,
    var: &str,
    raw: &str,
    shape: &TypeShape,
    target: &mut dyn Reflect,
) -> Result<(), RigidError> {
    let invalid = |detail: Option<BoxError>| invalid_var(path, var, shape.name(), detail);

    if shape.has(Capability::TextDecode) {
        if let Some(decoder) = target.as_text_decoder() {
            decoder.decode_text(raw).map_err(|err| invalid(Some(err)))?;
        }
    } else {
        match target.reflect_mut() {
            ValueMut::Bool(v) => match raw {
                "true" => *v = true,
                "false" => *v = false,
                _ => return Err(invalid(None)),
            },
            ValueMut::I8(v) => *v = parse(raw).map_err(|err| invalid(Some(err)))?,
            ValueMut::I16(v) => *v = parse(raw).map_err(|err| invalid(Some(err)))?,
            ValueMut::I32(v) => *v = parse(raw).map_err(|err| invalid(Some(err)))?,
            ValueMut::I64(v) => *v = parse(raw).map_err(|err| invalid(Some(err)))?,
            ValueMut::U8(v) => *v = parse(raw).map_err(|err| invalid(Some(err)))?,
            ValueMut::U16(v) => *v = parse(raw).map_err(|err| invalid(Some(err)))?,
            ValueMut::U32(v) => *v = parse(raw).map_err(|err| invalid(Some(err)))?,
            ValueMut::U64(v) => *v = parse(raw).map_err(|err| invalid(Some(err)))?,
            ValueMut::F32(v) => {
                let parsed: f32 = parse(raw).map_err(|err| invalid(Some(err)))?;
                *v = finite_or_literal(parsed, raw).map_err(|err| invalid(Some(err)))?;
            }
            ValueMut::F64(v) => {
                let parsed: f64 = parse(raw).map_err(|err| invalid(Some(err)))?;
                *v = finite_or_literal(parsed, raw).map_err(|err| invalid(Some(err)))?;
            }
            ValueMut::Str(v) => *v = raw.to_string(),
            ValueMut::Duration(v) => {
                *v = parse_duration(raw).map_err(|err| invalid(Some(Box::new(err) as BoxError)))?
            }
            _ => return Ok(()),
        }
    }

    debug!(var, path = %path, "applied environment override");
    Ok(())
}

fn parse<T>(raw: &str) -> Result<T, BoxError>
where
    T: FromStr,
    T::Err: Error + Send + Sync + 'static,
{
    raw.parse::<T>().map_err(|err| Box::new(err) as BoxError)
}

#[derive(Debug, thiserror::Error)]
#[error("value out of range")]
struct OutOfRange;

/// Rejects overflow to infinity unless infinity was spelled out.
fn finite_or_literal<F: Into<f64> + Copy>(value: F, raw: &str) -> Result<F, BoxError> {
    let spelled = raw.trim_start_matches(['+', '-']).to_ascii_lowercase();
    if value.into().is_infinite() && spelled != "inf" && spelled != "infinity" {
        return Err(Box::new(OutOfRange));
    }
    Ok(value)
}

fn invalid_var(path: &FieldPath, var: &str, type_name: &str, detail: Option<BoxError>) -> RigidError {
    let kind = ErrorKind::EnvInvalidVar;
    match detail {
        Some(err) => RigidError::new(
            kind,
            format!("at {path}: {kind} {var}: expected {type_name}: {err}"),
        )
        .with_source(err),
        None => RigidError::new(kind, format!("at {path}: {kind} {var}: expected {type_name}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::record;

    record! {
        #[derive(Debug, Default, PartialEq)]
        struct Tuning {
            pub level: i8 => { yaml = "level", env = "TUNING_LEVEL" },
        }
    }

    record! {
        #[derive(Debug, Default, PartialEq)]
        struct Settings {
            pub name: String => { yaml = "name", env = "NAME" },
            pub port: u16 => { yaml = "port", env = "PORT" },
            pub ratio: f32 => { yaml = "ratio", env = "RATIO" },
            pub debug: bool => { yaml = "debug", env = "DEBUG" },
            pub timeout: Duration => { yaml = "timeout", env = "TIMEOUT" },
            pub limit: Option<u32> => { yaml = "limit", env = "LIMIT" },
            pub tuning: Option<Tuning> => { yaml = "tuning" },
            pub secret: String => { yaml = "-", env = "SECRET" },
        }
    }

    fn apply(settings: &mut Settings, vars: &[(&str, &str)]) -> Result<(), RigidError> {
        let env: MapEnvProvider = vars.iter().copied().collect();
        apply_overrides(
            &FieldPath::root("Settings"),
            None,
            &Settings::shape(),
            settings,
            &env,
        )
    }

    #[test]
    fn overrides_primitives_at_declared_width() {
        let mut settings = Settings::default();
        apply(
            &mut settings,
            &[
                ("NAME", "svc"),
                ("PORT", "8080"),
                ("RATIO", "0.5"),
                ("DEBUG", "true"),
                ("TIMEOUT", "1m30s"),
                ("SECRET", "hidden"),
            ],
        )
        .unwrap();
        assert_eq!(settings.name, "svc");
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.ratio, 0.5);
        assert!(settings.debug);
        assert_eq!(settings.timeout, Duration::from_secs(90));
        assert_eq!(settings.secret, "hidden");
    }

    #[test]
    fn unset_variables_keep_decoded_values() {
        let mut settings = Settings {
            port: 9,
            ..Settings::default()
        };
        apply(&mut settings, &[]).unwrap();
        assert_eq!(settings.port, 9);
    }

    #[test]
    fn out_of_range_integers_name_the_variable() {
        let mut settings = Settings::default();
        let err = apply(&mut settings, &[("PORT", "70000")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EnvInvalidVar);
        assert!(err
            .to_string()
            .starts_with("at Settings.port: invalid env var PORT: expected u16: "));
    }

    #[test]
    fn float_overflow_is_rejected() {
        let mut settings = Settings::default();
        let err = apply(&mut settings, &[("RATIO", "1e39")]).unwrap_err();
        assert!(err.to_string().ends_with("expected f32: value out of range"));
        apply(&mut settings, &[("RATIO", "-inf")]).unwrap();
        assert_eq!(settings.ratio, f32::NEG_INFINITY);
    }

    #[test]
    fn bools_accept_only_canonical_literals() {
        let mut settings = Settings::default();
        let err = apply(&mut settings, &[("DEBUG", "yes")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "at Settings.debug: invalid env var DEBUG: expected bool"
        );
    }

    #[test]
    fn optional_fields_allocate_and_clear() {
        let mut settings = Settings::default();
        apply(&mut settings, &[("LIMIT", "5")]).unwrap();
        assert_eq!(settings.limit, Some(5));
        apply(&mut settings, &[("LIMIT", "null")]).unwrap();
        assert_eq!(settings.limit, None);
    }

    #[test]
    fn descends_into_present_optional_records_only() {
        let mut settings = Settings::default();
        apply(&mut settings, &[("TUNING_LEVEL", "-3")]).unwrap();
        assert_eq!(settings.tuning, None);

        settings.tuning = Some(Tuning::default());
        apply(&mut settings, &[("TUNING_LEVEL", "-3")]).unwrap();
        assert_eq!(settings.tuning, Some(Tuning { level: -3 }));
    }
}
