//! File format dispatch and parameter file I/O.
//!
//! The format is chosen by file extension alone, case-insensitively matching
//! exactly `toml` and `json`. Decoding produces a raw tree of
//! [`ConfigValue`]s; encoding writes a resolved container back out in the
//! same shape.
//!
//! TOML files may name further files under a top-level `__include__` key
//! (a string or list of strings); their tables are merged over the including
//! file's content.

use crate::paths::validate_path;
use crate::reconcile::ResolvedContainer;
use crate::value::ConfigValue;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Root mapping of a parsed parameter file: section name to raw value.
pub type RawTable = BTreeMap<String, ConfigValue>;

/// Key naming additional TOML files to merge into the root table.
pub const INCLUDE_KEY: &str = "__include__";

/// File formats supported for parameter files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Toml,
    Json,
}

impl FileFormat {
    /// Select the format from a path's extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(OsStr::to_str)
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "toml" => Ok(FileFormat::Toml),
            "json" => Ok(FileFormat::Json),
            _ => Err(Error::UnsupportedFormat { extension }),
        }
    }

    /// Canonical file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Toml => "toml",
            FileFormat::Json => "json",
        }
    }
}

/// Read and decode the parameter file at `path` into a raw tree.
pub fn read_tree(path: &Path) -> Result<RawTable> {
    let format = FileFormat::from_path(path)?;
    let text = fs::read_to_string(path)?;
    decode(format, &text, Some(path))
}

/// Decode `text` in the given format. `origin` anchors relative TOML include
/// paths; an empty document decodes to an empty tree.
pub fn decode(format: FileFormat, text: &str, origin: Option<&Path>) -> Result<RawTable> {
    match format {
        FileFormat::Toml => {
            let table: toml::Table = text.parse()?;
            let mut tree: RawTable = table.into_iter().map(|(k, v)| (k, v.into())).collect();
            merge_includes(&mut tree, origin)?;
            Ok(tree)
        }
        FileFormat::Json => {
            if text.trim().is_empty() {
                return Ok(RawTable::new());
            }
            let value: serde_json::Value = serde_json::from_str(text)?;
            match ConfigValue::from(value) {
                ConfigValue::Table(tree) => Ok(tree),
                other => Err(Error::TypeCoercion {
                    path: "(root)".into(),
                    expected: "table".into(),
                    received: other.kind().into(),
                }),
            }
        }
    }
}

/// Merge any `__include__` files into `tree`. Included values override the
/// including file's values; a missing include file is skipped with a warning.
fn merge_includes(tree: &mut RawTable, origin: Option<&Path>) -> Result<()> {
    let Some(directive) = tree.remove(INCLUDE_KEY) else {
        return Ok(());
    };
    let entries: Vec<String> = match directive {
        ConfigValue::Str(s) => vec![s],
        ConfigValue::List(xs) => xs
            .into_iter()
            .map(|x| match x {
                ConfigValue::Str(s) => Ok(s),
                other => Err(Error::PathValidation {
                    path: format!("({})", other.kind()),
                    reason: format!("{INCLUDE_KEY} entries must be strings"),
                }),
            })
            .collect::<Result<_>>()?,
        other => {
            return Err(Error::PathValidation {
                path: format!("({})", other.kind()),
                reason: format!("{INCLUDE_KEY} must be a string or a list of strings"),
            });
        }
    };

    for entry in entries {
        let mut include = PathBuf::from(&entry);
        validate_path(&include)?;
        if include.is_relative() {
            let base = origin.and_then(Path::parent).unwrap_or(Path::new("."));
            include = base.join(include);
        }
        if !include.is_file() {
            warn!(path = %include.display(), "included parameter file not found, skipping");
            continue;
        }
        let text = fs::read_to_string(&include)?;
        let table: toml::Table = text.parse()?;
        for (key, value) in table {
            tree.insert(key, value.into());
        }
    }
    Ok(())
}

/// Encode `instance` per the extension of `path` and write it, creating
/// parent directories as needed.
pub fn write_instance(path: &Path, instance: &ResolvedContainer) -> Result<()> {
    let format = FileFormat::from_path(path)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = match format {
        FileFormat::Toml => toml::to_string_pretty(instance)?,
        FileFormat::Json => serde_json::to_string_pretty(instance)?,
    };
    fs::write(path, text)?;
    Ok(())
}
