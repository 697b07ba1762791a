//! Declarative schemas for parameter containers.
//!
//! A [`ContainerSchema`] describes the full structure of one configuration or
//! settings file: named sections, each holding typed fields with optional
//! defaults. Schemas are plain values built by composition; nothing is derived
//! from Rust types by reflection.
//!
//! Within a section, fields without defaults must be declared before fields
//! with defaults. [`ContainerSchema::validate`] enforces this along with name
//! uniqueness and default/type agreement.

use crate::format::FileFormat;
use crate::paths;
use crate::value::ConfigValue;
use crate::{Error, Result};
use std::path::PathBuf;

/// Usage convention for a container: configuration (read-only intent, TOML
/// default) or settings (updatable, JSON default).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Config,
    Settings,
}

impl Role {
    /// The naming token stripped from container names when deriving folders.
    pub fn token(&self) -> &'static str {
        match self {
            Role::Config => "Config",
            Role::Settings => "Settings",
        }
    }

    /// Default file format for this role.
    pub fn default_format(&self) -> FileFormat {
        match self {
            Role::Config => FileFormat::Toml,
            Role::Settings => FileFormat::Json,
        }
    }

    /// Default file name for this role, e.g. `config.toml` or `settings.json`.
    pub fn default_filename(&self) -> String {
        format!(
            "{}.{}",
            self.token().to_lowercase(),
            self.default_format().extension()
        )
    }
}

/// Declared type of a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Str,
    Int,
    Float,
    Bool,
    List(Box<FieldType>),
}

impl FieldType {
    /// Whether `value` already has exactly this type (no coercion considered).
    pub fn matches(&self, value: &ConfigValue) -> bool {
        match (self, value) {
            (FieldType::Str, ConfigValue::Str(_)) => true,
            (FieldType::Int, ConfigValue::Int(_)) => true,
            (FieldType::Float, ConfigValue::Float(_)) => true,
            (FieldType::Bool, ConfigValue::Bool(_)) => true,
            (FieldType::List(elem), ConfigValue::List(xs)) => {
                xs.iter().all(|x| elem.matches(x))
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Str => write!(f, "str"),
            FieldType::Int => write!(f, "int"),
            FieldType::Float => write!(f, "float"),
            FieldType::Bool => write!(f, "bool"),
            FieldType::List(elem) => write!(f, "list<{}>", elem),
        }
    }
}

/// A named, typed field with an optional default value.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    name: String,
    field_type: FieldType,
    default: Option<ConfigValue>,
}

impl FieldSchema {
    /// A field that must be present in the parameter file.
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            default: None,
        }
    }

    /// A field that falls back to `default` when absent from the file.
    pub fn defaulted(
        name: impl Into<String>,
        field_type: FieldType,
        default: impl Into<ConfigValue>,
    ) -> Self {
        Self {
            name: name.into(),
            field_type,
            default: Some(default.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn default(&self) -> Option<&ConfigValue> {
        self.default.as_ref()
    }
}

/// A named group of fields, mapping to one TOML table / JSON object level.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionSchema {
    name: String,
    fields: Vec<FieldSchema>,
}

impl SectionSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field declaration.
    pub fn field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    pub fn field_named(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// How the default file path for a container is obtained.
#[derive(Debug, Clone, PartialEq)]
enum PathPolicy {
    /// Derive `~/.{folder}/{role filename}` from the container name.
    Derived,
    /// Always use this path.
    Fixed(PathBuf),
    /// No default path; an explicit path must be supplied to load.
    NoDefault,
}

/// Root schema describing a full configuration or settings file.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSchema {
    name: String,
    role: Role,
    sections: Vec<SectionSchema>,
    foldername: Option<String>,
    path_policy: PathPolicy,
}

impl ContainerSchema {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
            sections: Vec::new(),
            foldername: None,
            path_policy: PathPolicy::Derived,
        }
    }

    /// Append a section declaration.
    pub fn section(mut self, section: SectionSchema) -> Self {
        self.sections.push(section);
        self
    }

    /// Override the derived folder name (the `.{name}` part of the default
    /// path).
    pub fn with_foldername(mut self, foldername: impl Into<String>) -> Self {
        self.foldername = Some(foldername.into());
        self
    }

    /// Pin the default file path instead of deriving it.
    pub fn with_fixed_filepath(mut self, path: impl Into<PathBuf>) -> Self {
        self.path_policy = PathPolicy::Fixed(path.into());
        self
    }

    /// Declare that this container has no default path at all. Loading then
    /// requires an explicit path.
    pub fn without_default_filepath(mut self) -> Self {
        self.path_policy = PathPolicy::NoDefault;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn sections(&self) -> &[SectionSchema] {
        &self.sections
    }

    pub fn section_named(&self, name: &str) -> Option<&SectionSchema> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Folder name for the default path: the container name with the role
    /// token removed, an underscore before each interior capital, lowercased,
    /// with a leading dot. A container named exactly after its role token
    /// derives `.config` / `.settings`.
    pub fn default_foldername(&self) -> String {
        if let Some(ref folder) = self.foldername {
            return folder.clone();
        }
        paths::derive_foldername(&self.name, self.role.token())
    }

    /// Default file name for this container, per role.
    pub fn default_filename(&self) -> String {
        self.role.default_filename()
    }

    /// Fully qualified default path, e.g. `~/.an_example/config.toml`, or
    /// `None` when the container declares no default path (or no home
    /// directory is known).
    pub fn default_filepath(&self) -> Option<PathBuf> {
        match &self.path_policy {
            PathPolicy::Derived => dirs::home_dir()
                .map(|home| home.join(self.default_foldername()).join(self.default_filename())),
            PathPolicy::Fixed(path) => Some(path.clone()),
            PathPolicy::NoDefault => None,
        }
    }

    /// Check structural invariants of the schema itself.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidSchema("container name is empty".into()));
        }
        let mut seen_sections = std::collections::HashSet::new();
        for section in &self.sections {
            if section.name.is_empty() {
                return Err(Error::InvalidSchema(format!(
                    "container '{}' has a section with an empty name",
                    self.name
                )));
            }
            if !seen_sections.insert(section.name.as_str()) {
                return Err(Error::InvalidSchema(format!(
                    "duplicate section '{}'",
                    section.name
                )));
            }
            self.validate_section(section)?;
        }
        Ok(())
    }

    fn validate_section(&self, section: &SectionSchema) -> Result<()> {
        let mut seen_fields = std::collections::HashSet::new();
        let mut saw_default = false;
        for field in &section.fields {
            if field.name.is_empty() {
                return Err(Error::InvalidSchema(format!(
                    "section '{}' has a field with an empty name",
                    section.name
                )));
            }
            if !seen_fields.insert(field.name.as_str()) {
                return Err(Error::InvalidSchema(format!(
                    "duplicate field '{}.{}'",
                    section.name, field.name
                )));
            }
            match field.default() {
                Some(default) => {
                    saw_default = true;
                    if !field.field_type.matches(default) {
                        return Err(Error::InvalidSchema(format!(
                            "default for '{}.{}' is {}, declared type is {}",
                            section.name,
                            field.name,
                            default.kind(),
                            field.field_type
                        )));
                    }
                }
                None => {
                    if saw_default {
                        return Err(Error::InvalidSchema(format!(
                            "required field '{}.{}' declared after a defaulted field",
                            section.name, field.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
