//! Parameter file path resolution and validation.
//!
//! Explicit paths are checked syntactically before any file access; default
//! paths are derived from the container name under the user's home directory.

use crate::schema::ContainerSchema;
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Syntactic validation of a path for the current platform.
///
/// This never touches the filesystem; it only rejects strings that can never
/// name a file on this OS.
pub fn validate_path(path: &Path) -> Result<()> {
    let text = path.to_string_lossy();
    if text.is_empty() {
        return Err(Error::PathValidation {
            path: text.into_owned(),
            reason: "path is empty".into(),
        });
    }
    if text.contains('\0') {
        return Err(Error::PathValidation {
            path: text.replace('\0', "\\0"),
            reason: "path contains a NUL byte".into(),
        });
    }
    #[cfg(windows)]
    validate_windows_components(path)?;
    Ok(())
}

#[cfg(windows)]
fn validate_windows_components(path: &Path) -> Result<()> {
    use std::path::Component;

    for component in path.components() {
        let Component::Normal(part) = component else {
            continue;
        };
        let part = part.to_string_lossy();
        if part
            .chars()
            .any(|c| matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*') || (c as u32) < 0x20)
        {
            return Err(Error::PathValidation {
                path: path.display().to_string(),
                reason: format!("component '{}' contains a character forbidden on Windows", part),
            });
        }
        if part.ends_with('.') || part.ends_with(' ') {
            return Err(Error::PathValidation {
                path: path.display().to_string(),
                reason: format!("component '{}' ends with a dot or space", part),
            });
        }
    }
    Ok(())
}

/// Resolve the absolute path a container should be loaded from.
///
/// An explicit path wins and is validated first; otherwise the schema's
/// default path applies. A schema without a default path and no explicit path
/// fails with [`Error::MissingPath`].
pub fn resolve_load_path(schema: &ContainerSchema, explicit: Option<&Path>) -> Result<PathBuf> {
    let path = match explicit {
        Some(path) => {
            validate_path(path)?;
            path.to_path_buf()
        }
        None => schema.default_filepath().ok_or_else(|| Error::MissingPath {
            container: schema.name().to_string(),
        })?,
    };
    Ok(std::path::absolute(&path)?)
}

/// Derive the hidden folder name for a container: strip the role token from
/// the name, separate interior capitals with underscores, lowercase, and
/// prefix with a dot.
pub(crate) fn derive_foldername(name: &str, token: &str) -> String {
    if name == token {
        return format!(".{}", token.to_lowercase());
    }
    let stripped = name.replace(token, "");
    let mut folder = String::with_capacity(stripped.len() + 2);
    folder.push('.');
    for (i, ch) in stripped.chars().enumerate() {
        if ch.is_uppercase() && i != 0 {
            folder.push('_');
        }
        folder.extend(ch.to_lowercase());
    }
    folder
}
