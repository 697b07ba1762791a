//! Per-container singleton cache.
//!
//! A [`Registry`] holds at most one resolved instance per container, created
//! lazily on first [`Registry::get`] and replaced only by an explicit reload.
//! It is an ordinary value meant to be owned by the application's composition
//! root and passed where needed, not a hidden global.
//!
//! The cache is guarded by a mutex so the check-cache-else-load sequence is
//! atomic; instances are shared as `Arc`, so repeated `get` calls hand out
//! the identical allocation.

use crate::format::{self, FileFormat, RawTable};
use crate::paths;
use crate::reconcile::{ResolvedContainer, apply_changes, reconcile};
use crate::schema::{ContainerSchema, Role};
use crate::value::ConfigValue;
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Options for [`Registry::get_with`].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Discard any cached instance and load afresh.
    pub reload: bool,
    /// Explicit file path; the container's default path applies when `None`.
    /// A previous load's path is never reused on reload.
    pub path: Option<PathBuf>,
}

impl LoadOptions {
    /// Reload from the container's default path.
    pub fn reload() -> Self {
        Self {
            reload: true,
            path: None,
        }
    }

    /// Reload from an explicit path.
    pub fn reload_from(path: impl Into<PathBuf>) -> Self {
        Self {
            reload: true,
            path: Some(path.into()),
        }
    }

    /// Load from an explicit path, keeping any cached instance.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            reload: false,
            path: Some(path.into()),
        }
    }
}

struct CacheEntry {
    instance: Arc<ResolvedContainer>,
    load_path: PathBuf,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    /// Write targets set via `set_filepath`, independent of load paths.
    write_paths: HashMap<String, PathBuf>,
}

/// Keyed cache of resolved container instances.
#[derive(Default)]
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the resolved instance for `schema`, loading and caching it on
    /// first access.
    ///
    /// When the parameter file does not exist, resolution runs entirely from
    /// defaults; if any field lacks a default this fails with
    /// [`Error::MissingFile`].
    pub fn get(&self, schema: &ContainerSchema) -> Result<Arc<ResolvedContainer>> {
        self.get_with(schema, LoadOptions::default())
    }

    /// Get with explicit reload/path control. `reload: true` unconditionally
    /// discards the cached instance and repeats the full resolve cycle.
    pub fn get_with(
        &self,
        schema: &ContainerSchema,
        options: LoadOptions,
    ) -> Result<Arc<ResolvedContainer>> {
        let mut inner = self.lock();
        if !options.reload {
            if let Some(entry) = inner.entries.get(schema.name()) {
                return Ok(Arc::clone(&entry.instance));
            }
        }

        schema.validate()?;
        let path = paths::resolve_load_path(schema, options.path.as_deref())?;
        // The format must be recognizable even if the file is absent.
        FileFormat::from_path(&path)?;

        let file_present = path.is_file();
        let tree = if file_present {
            format::read_tree(&path)?
        } else {
            warn!(
                container = schema.name(),
                path = %path.display(),
                "parameter file not found, resolving from defaults"
            );
            RawTable::new()
        };

        let instance = match reconcile(schema, &tree) {
            Ok(instance) => Arc::new(instance),
            Err(Error::MissingField { .. } | Error::MissingSection { .. }) if !file_present => {
                return Err(Error::MissingFile {
                    path: path.display().to_string(),
                    container: schema.name().to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        inner.entries.insert(
            schema.name().to_string(),
            CacheEntry {
                instance: Arc::clone(&instance),
                load_path: path,
            },
        );
        Ok(instance)
    }

    /// Associate a write target with a settings container, independent of the
    /// load path. Config-role containers are read-only.
    pub fn set_filepath(&self, schema: &ContainerSchema, path: impl Into<PathBuf>) -> Result<()> {
        self.require_settings(schema)?;
        let path = path.into();
        paths::validate_path(&path)?;
        FileFormat::from_path(&path)?;
        let path = std::path::absolute(&path)?;
        self.lock()
            .write_paths
            .insert(schema.name().to_string(), path);
        Ok(())
    }

    /// Write the cached instance to its associated path: the `set_filepath`
    /// target if any, else the path it was loaded from.
    pub fn save(&self, schema: &ContainerSchema) -> Result<()> {
        let inner = self.lock();
        let entry = inner
            .entries
            .get(schema.name())
            .ok_or_else(|| Error::NotLoaded {
                container: schema.name().to_string(),
            })?;
        let path = inner
            .write_paths
            .get(schema.name())
            .unwrap_or(&entry.load_path)
            .clone();
        format::write_instance(&path, &entry.instance)
    }

    /// Apply `changes` to a settings container, replace the cached instance,
    /// and persist it. Loads the container first if needed.
    pub fn update(
        &self,
        schema: &ContainerSchema,
        changes: &[(&str, &str, ConfigValue)],
    ) -> Result<Arc<ResolvedContainer>> {
        self.require_settings(schema)?;
        let current = self.get(schema)?;
        let updated = Arc::new(apply_changes(schema, &current, changes)?);

        let mut inner = self.lock();
        let entry = inner
            .entries
            .get_mut(schema.name())
            .ok_or_else(|| Error::NotLoaded {
                container: schema.name().to_string(),
            })?;
        entry.instance = Arc::clone(&updated);
        let load_path = entry.load_path.clone();
        let path = inner
            .write_paths
            .get(schema.name())
            .cloned()
            .unwrap_or(load_path);
        format::write_instance(&path, &updated)?;
        Ok(updated)
    }

    /// Drop the cached instance for `schema`, if any. The next `get` loads
    /// afresh.
    pub fn reset(&self, schema: &ContainerSchema) {
        self.lock().entries.remove(schema.name());
    }

    /// The path `save` would currently write to, if any instance or write
    /// target is known.
    pub fn filepath(&self, schema: &ContainerSchema) -> Option<PathBuf> {
        let inner = self.lock();
        inner
            .write_paths
            .get(schema.name())
            .cloned()
            .or_else(|| {
                inner
                    .entries
                    .get(schema.name())
                    .map(|e| e.load_path.clone())
            })
            .or_else(|| schema.default_filepath())
    }

    fn require_settings(&self, schema: &ContainerSchema) -> Result<()> {
        if schema.role() != Role::Settings {
            return Err(Error::ReadOnlyRole {
                container: schema.name().to_string(),
            });
        }
        Ok(())
    }

    /// Discard any cached instance and reload, from `path` if given, else
    /// from the container's default path.
    pub fn reload(
        &self,
        schema: &ContainerSchema,
        path: Option<&Path>,
    ) -> Result<Arc<ResolvedContainer>> {
        let options = LoadOptions {
            reload: true,
            path: path.map(Path::to_path_buf),
        };
        self.get_with(schema, options)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means another thread panicked mid-update; the
        // map itself is still coherent.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
