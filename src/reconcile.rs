//! Schema reconciliation: merge a parsed file tree with declared defaults.
//!
//! Reconciliation walks the declared sections and fields, coercing raw values
//! to their declared types and filling gaps from defaults. Undeclared
//! sections and fields in the file are dropped without error; config files
//! may carry keys a newer or older schema does not know about.
//!
//! The output is a [`ResolvedContainer`]: deeply immutable by construction,
//! its values reachable only through accessors.

use crate::format::RawTable;
use crate::schema::{ContainerSchema, FieldType, Role, SectionSchema};
use crate::value::ConfigValue;
use crate::{Error, Result};
use serde::Serialize;
use serde::ser::Serializer;
use std::collections::BTreeMap;
use tracing::debug;

/// One resolved section: field name to typed value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResolvedSection {
    fields: BTreeMap<String, ConfigValue>,
}

impl ResolvedSection {
    pub fn get(&self, field: &str) -> Option<&ConfigValue> {
        self.fields.get(field)
    }

    pub fn str_value(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(ConfigValue::as_str)
    }

    pub fn int_value(&self, field: &str) -> Option<i64> {
        self.fields.get(field).and_then(ConfigValue::as_int)
    }

    pub fn float_value(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(ConfigValue::as_float)
    }

    pub fn bool_value(&self, field: &str) -> Option<bool> {
        self.fields.get(field).and_then(ConfigValue::as_bool)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// A fully resolved, immutable container instance.
///
/// Serializes as a plain map of sections, so writing it back out produces a
/// file the reconciler accepts again.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedContainer {
    name: String,
    role: Role,
    sections: BTreeMap<String, ResolvedSection>,
}

impl ResolvedContainer {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn section(&self, name: &str) -> Option<&ResolvedSection> {
        self.sections.get(name)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }
}

impl Serialize for ResolvedContainer {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.sections.serialize(serializer)
    }
}

/// Reconcile a raw file tree against `schema`, producing a resolved instance.
///
/// The tree may come from an empty file (empty mapping); resolution then runs
/// entirely from defaults.
pub fn reconcile(schema: &ContainerSchema, tree: &RawTable) -> Result<ResolvedContainer> {
    let mut sections = BTreeMap::new();
    for section in schema.sections() {
        let resolved = match tree.get(section.name()) {
            Some(ConfigValue::Table(raw)) => reconcile_section(section, raw)?,
            Some(other) => {
                return Err(Error::TypeCoercion {
                    path: section.name().to_string(),
                    expected: "section table".into(),
                    received: other.kind().into(),
                });
            }
            None => section_from_defaults(section)?,
        };
        sections.insert(section.name().to_string(), resolved);
    }
    for key in tree.keys() {
        if schema.section_named(key).is_none() {
            debug!(container = schema.name(), section = %key, "ignoring undeclared entry");
        }
    }
    Ok(ResolvedContainer {
        name: schema.name().to_string(),
        role: schema.role(),
        sections,
    })
}

fn reconcile_section(
    section: &SectionSchema,
    raw: &BTreeMap<String, ConfigValue>,
) -> Result<ResolvedSection> {
    let mut fields = BTreeMap::new();
    for field in section.fields() {
        let path = field_path(section.name(), field.name());
        let value = match raw.get(field.name()) {
            Some(value) => coerce(value.clone(), field.field_type(), &path)?,
            None => match field.default() {
                Some(default) => {
                    debug!(field = %path, "initialized with default value");
                    default.clone()
                }
                None => return Err(Error::MissingField { path }),
            },
        };
        fields.insert(field.name().to_string(), value);
    }
    for key in raw.keys() {
        if section.field_named(key).is_none() {
            debug!(field = %field_path(section.name(), key), "ignoring undeclared entry");
        }
    }
    Ok(ResolvedSection { fields })
}

/// Resolve a section that is absent from the file. Succeeds only if every
/// field has a default.
fn section_from_defaults(section: &SectionSchema) -> Result<ResolvedSection> {
    let mut fields = BTreeMap::new();
    for field in section.fields() {
        let Some(default) = field.default() else {
            return Err(Error::MissingSection {
                section: section.name().to_string(),
            });
        };
        debug!(field = %field_path(section.name(), field.name()), "initialized with default value");
        fields.insert(field.name().to_string(), default.clone());
    }
    Ok(ResolvedSection { fields })
}

fn field_path(section: &str, field: &str) -> String {
    format!("{section}.{field}")
}

/// Coerce `value` into the declared `target` type.
///
/// The supported pairs form an explicit table; conversion is best-effort and
/// lossless where possible. Already-typed values pass through unchanged, so
/// coercion is idempotent. Unsupported pairs fall through to
/// [`Error::TypeCoercion`].
pub(crate) fn coerce(value: ConfigValue, target: &FieldType, path: &str) -> Result<ConfigValue> {
    use ConfigValue::{Bool, Float, Int, List, Str};

    let coerced = match (target, value) {
        (FieldType::Str, Str(s)) => Str(s),
        (FieldType::Str, Bool(b)) => Str(b.to_string()),
        (FieldType::Str, Int(i)) => Str(i.to_string()),
        (FieldType::Str, Float(f)) => Str(f.to_string()),

        (FieldType::Int, Int(i)) => Int(i),
        (FieldType::Int, Str(s)) => match s.trim().parse::<i64>() {
            Ok(i) => Int(i),
            Err(_) => return Err(coercion_error(path, target, &format!("string \"{s}\""))),
        },
        // Whole-number floats convert losslessly; anything fractional does not.
        (FieldType::Int, Float(f))
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 =>
        {
            Int(f as i64)
        }

        (FieldType::Float, Float(f)) => Float(f),
        (FieldType::Float, Int(i)) => Float(i as f64),
        (FieldType::Float, Str(s)) => match s.trim().parse::<f64>() {
            Ok(f) => Float(f),
            Err(_) => return Err(coercion_error(path, target, &format!("string \"{s}\""))),
        },

        (FieldType::Bool, Bool(b)) => Bool(b),
        (FieldType::Bool, Str(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Bool(true),
            "false" => Bool(false),
            _ => return Err(coercion_error(path, target, &format!("string \"{s}\""))),
        },

        (FieldType::List(elem), List(xs)) => List(
            xs.into_iter()
                .enumerate()
                .map(|(i, x)| coerce(x, elem, &format!("{path}[{i}]")))
                .collect::<Result<_>>()?,
        ),

        (_, other) => return Err(coercion_error(path, target, other.kind())),
    };
    Ok(coerced)
}

fn coercion_error(path: &str, expected: &FieldType, received: &str) -> Error {
    Error::TypeCoercion {
        path: path.to_string(),
        expected: expected.to_string(),
        received: received.to_string(),
    }
}

/// Produce a new instance with `changes` applied, each value coerced to its
/// declared type. Changes naming undeclared sections or fields fail with
/// [`Error::UnknownField`].
pub fn apply_changes(
    schema: &ContainerSchema,
    current: &ResolvedContainer,
    changes: &[(&str, &str, ConfigValue)],
) -> Result<ResolvedContainer> {
    let mut sections = current.sections.clone();
    for (section_name, field_name, value) in changes {
        let path = field_path(section_name, field_name);
        let field = schema
            .section_named(section_name)
            .and_then(|s| s.field_named(field_name))
            .ok_or_else(|| Error::UnknownField { path: path.clone() })?;
        let coerced = coerce(value.clone(), field.field_type(), &path)?;
        let section = sections
            .get_mut(*section_name)
            .ok_or_else(|| Error::UnknownField { path: path.clone() })?;
        section.fields.insert(field_name.to_string(), coerced);
    }
    Ok(ResolvedContainer {
        name: current.name.clone(),
        role: current.role,
        sections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSchema;
    use crate::test_utils::example_config;

    fn tree_from_toml(text: &str) -> RawTable {
        crate::format::decode(crate::format::FileFormat::Toml, text, None).unwrap()
    }

    // ==================== Reconciliation Tests ====================

    #[test]
    fn test_all_defaults_from_empty_tree() {
        let resolved = reconcile(&example_config(), &RawTable::new()).unwrap();
        let section = resolved.section("section1").unwrap();
        assert_eq!(section.str_value("field1"), Some("field1"));
        assert_eq!(section.int_value("field2"), Some(2));
    }

    #[test]
    fn test_file_value_overrides_default() {
        let tree = tree_from_toml("[section1]\nfield1 = \"custom\"\n");
        let resolved = reconcile(&example_config(), &tree).unwrap();
        let section = resolved.section("section1").unwrap();
        assert_eq!(section.str_value("field1"), Some("custom"));
        assert_eq!(section.int_value("field2"), Some(2));
    }

    #[test]
    fn test_missing_required_field_names_full_path() {
        let schema = ContainerSchema::new("ReqConfig", Role::Config).section(
            SectionSchema::new("section1").field(FieldSchema::required("field1", FieldType::Str)),
        );
        let err = reconcile(&schema, &tree_from_toml("[section1]\nother = 1\n")).unwrap_err();
        assert!(matches!(err, Error::MissingField { path } if path == "section1.field1"));
    }

    #[test]
    fn test_missing_section_without_full_defaults_fails() {
        let schema = ContainerSchema::new("ReqConfig", Role::Config).section(
            SectionSchema::new("required").field(FieldSchema::required("f", FieldType::Int)),
        );
        let err = reconcile(&schema, &RawTable::new()).unwrap_err();
        assert!(matches!(err, Error::MissingSection { section } if section == "required"));
    }

    #[test]
    fn test_extra_sections_and_fields_are_ignored() {
        let tree = tree_from_toml(
            "[section1]\nfield1 = \"a\"\nunknown = 9\n[unknown_section]\nx = true\n",
        );
        let resolved = reconcile(&example_config(), &tree).unwrap();
        assert_eq!(resolved.section_names().count(), 1);
        let section = resolved.section("section1").unwrap();
        assert_eq!(section.field_names().count(), 2);
    }

    #[test]
    fn test_section_that_is_not_a_table_fails() {
        let tree = tree_from_toml("section1 = 5\n");
        let err = reconcile(&example_config(), &tree).unwrap_err();
        assert!(matches!(err, Error::TypeCoercion { path, .. } if path == "section1"));
    }

    // ==================== Coercion Tests ====================

    #[test]
    fn test_coerce_numeric_string_to_int() {
        let tree = tree_from_toml("[section1]\nfield2 = \"22\"\n");
        let resolved = reconcile(&example_config(), &tree).unwrap();
        assert_eq!(resolved.section("section1").unwrap().int_value("field2"), Some(22));
    }

    #[test]
    fn test_coerce_bool_to_string() {
        let tree = tree_from_toml("[section1]\nfield1 = true\n");
        let resolved = reconcile(&example_config(), &tree).unwrap();
        assert_eq!(
            resolved.section("section1").unwrap().str_value("field1"),
            Some("true")
        );
    }

    #[test]
    fn test_coerce_is_idempotent_on_typed_values() {
        let cases = [
            (ConfigValue::Str("x".into()), FieldType::Str),
            (ConfigValue::Int(5), FieldType::Int),
            (ConfigValue::Float(0.5), FieldType::Float),
            (ConfigValue::Bool(true), FieldType::Bool),
            (
                ConfigValue::List(vec![ConfigValue::Int(1)]),
                FieldType::List(Box::new(FieldType::Int)),
            ),
        ];
        for (value, target) in cases {
            assert_eq!(coerce(value.clone(), &target, "p").unwrap(), value);
        }
    }

    #[test]
    fn test_coerce_whole_float_to_int() {
        assert_eq!(
            coerce(ConfigValue::Float(4.0), &FieldType::Int, "p").unwrap(),
            ConfigValue::Int(4)
        );
        assert!(coerce(ConfigValue::Float(4.5), &FieldType::Int, "p").is_err());
    }

    #[test]
    fn test_coerce_int_to_float_and_string_parsing() {
        assert_eq!(
            coerce(ConfigValue::Int(4), &FieldType::Float, "p").unwrap(),
            ConfigValue::Float(4.0)
        );
        assert_eq!(
            coerce(ConfigValue::Str(" 1.5 ".into()), &FieldType::Float, "p").unwrap(),
            ConfigValue::Float(1.5)
        );
        assert_eq!(
            coerce(ConfigValue::Str("TRUE".into()), &FieldType::Bool, "p").unwrap(),
            ConfigValue::Bool(true)
        );
    }

    #[test]
    fn test_coerce_list_elements_with_indexed_paths() {
        let target = FieldType::List(Box::new(FieldType::Int));
        let ok = coerce(
            ConfigValue::List(vec![ConfigValue::Str("1".into()), ConfigValue::Int(2)]),
            &target,
            "s.xs",
        )
        .unwrap();
        assert_eq!(ok, ConfigValue::List(vec![ConfigValue::Int(1), ConfigValue::Int(2)]));

        let err = coerce(
            ConfigValue::List(vec![ConfigValue::Int(1), ConfigValue::Bool(true)]),
            &target,
            "s.xs",
        )
        .unwrap_err();
        assert!(matches!(err, Error::TypeCoercion { path, .. } if path == "s.xs[1]"));
    }

    #[test]
    fn test_unsupported_pairs_fall_through() {
        let err = coerce(ConfigValue::Null, &FieldType::Str, "s.f").unwrap_err();
        assert!(matches!(
            err,
            Error::TypeCoercion { received, .. } if received == "null"
        ));
        assert!(coerce(ConfigValue::Bool(true), &FieldType::Int, "p").is_err());
        assert!(
            coerce(
                ConfigValue::Table(std::collections::BTreeMap::new()),
                &FieldType::Str,
                "p"
            )
            .is_err()
        );
    }

    #[test]
    fn test_coercion_error_carries_expected_and_received() {
        let err = coerce(ConfigValue::Str("abc".into()), &FieldType::Int, "s.n").unwrap_err();
        let Error::TypeCoercion {
            path,
            expected,
            received,
        } = err
        else {
            panic!("expected coercion error");
        };
        assert_eq!(path, "s.n");
        assert_eq!(expected, "int");
        assert!(received.contains("abc"));
    }

    // ==================== Change Application Tests ====================

    #[test]
    fn test_apply_changes_coerces_and_replaces() {
        let schema = example_config();
        let current = reconcile(&schema, &RawTable::new()).unwrap();
        let updated = apply_changes(
            &schema,
            &current,
            &[("section1", "field2", ConfigValue::Str("7".into()))],
        )
        .unwrap();
        assert_eq!(updated.section("section1").unwrap().int_value("field2"), Some(7));
        // the original instance is untouched
        assert_eq!(current.section("section1").unwrap().int_value("field2"), Some(2));
    }

    #[test]
    fn test_apply_changes_rejects_unknown_field() {
        let schema = example_config();
        let current = reconcile(&schema, &RawTable::new()).unwrap();
        let err = apply_changes(&schema, &current, &[("section1", "nope", ConfigValue::Int(1))])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownField { path } if path == "section1.nope"));
    }

    // ==================== Serialization Tests ====================

    #[test]
    fn test_resolved_container_serializes_as_plain_sections() {
        let resolved = reconcile(&example_config(), &RawTable::new()).unwrap();
        let json = serde_json::to_value(&resolved).unwrap();
        assert_eq!(json["section1"]["field1"], serde_json::json!("field1"));
        assert_eq!(json["section1"]["field2"], serde_json::json!(2));
    }
}
