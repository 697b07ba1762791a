//! Ballast - typed, immutable application configuration and settings.
//!
//! This library binds TOML and JSON parameter files to immutable, validated
//! container values described by explicit schemas:
//!
//! - [`schema`] declares containers, sections, and typed fields with defaults
//! - [`paths`] resolves and validates parameter file locations
//! - [`format`] dispatches decode/encode by file extension
//! - [`reconcile`] merges file content with declared defaults and coerces types
//! - [`registry`] caches one resolved instance per container
//!
//! # Example
//!
//! ```no_run
//! use ballast::{ContainerSchema, FieldSchema, FieldType, Registry, Role, SectionSchema};
//!
//! let schema = ContainerSchema::new("AnExampleConfig", Role::Config).section(
//!     SectionSchema::new("section1")
//!         .field(FieldSchema::defaulted("field1", FieldType::Str, "field1"))
//!         .field(FieldSchema::defaulted("field2", FieldType::Int, 2)),
//! );
//!
//! let registry = Registry::new();
//! let config = registry.get(&schema)?;
//! assert_eq!(config.section("section1").unwrap().int_value("field2"), Some(2));
//! # Ok::<(), ballast::Error>(())
//! ```

pub mod format;
pub mod paths;
pub mod reconcile;
pub mod registry;
pub mod schema;
pub mod value;

pub use format::{FileFormat, RawTable};
pub use reconcile::{ResolvedContainer, ResolvedSection, reconcile};
pub use registry::{LoadOptions, Registry};
pub use schema::{ContainerSchema, FieldSchema, FieldType, Role, SectionSchema};
pub use value::ConfigValue;

/// Library-level error type for Ballast operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("path '{path}' is not valid for this platform: {reason}")]
    PathValidation { path: String, reason: String },

    #[error("no file path for container '{container}': no default path and none supplied")]
    MissingPath { container: String },

    #[error("unsupported parameter file extension '{extension}' (expected toml or json)")]
    UnsupportedFormat { extension: String },

    #[error("no parameter file at '{path}' and container '{container}' has fields without defaults")]
    MissingFile { path: String, container: String },

    #[error("required section '{section}' is missing and has fields without defaults")]
    MissingSection { section: String },

    #[error("required field '{path}' is missing and has no default")]
    MissingField { path: String },

    #[error("cannot coerce {received} to {expected} for '{path}'")]
    TypeCoercion {
        path: String,
        expected: String,
        received: String,
    },

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("unknown field '{path}' for this container")]
    UnknownField { path: String },

    #[error("container '{container}' has not been loaded")]
    NotLoaded { container: String },

    #[error("container '{container}' is config-role; writes require a settings-role container")]
    ReadOnlyRole { container: String },
}

/// Result type alias for Ballast operations.
pub type Result<T> = std::result::Result<T, Error>;
