// src/core/admin.rs

//! The administrative object store: a flat key-value tree addressed by
//! DN-style dotted paths, persisted as JSON and edited by the `ctl`
//! subcommand. Holds the daemon's runtime tunables.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::info;

use crate::core::errors::AegisError;

/// One admin action, mapped 1:1 from the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminAction {
    /// Print the value at a path.
    Read { path: String },
    /// Write a leaf value, creating it if absent.
    WriteKey { path: String, value: String },
    /// Create an empty object at a path.
    CreateObject { path: String },
    /// Create an object and one leaf under it in a single step.
    CreateObjectAndKey {
        path: String,
        key: String,
        value: String,
    },
    /// Delete the object or key at a path.
    Delete { path: String },
    /// Print every leaf as `path=value` lines.
    PrintAll,
    /// Load `path=value` lines from a file.
    BulkLoad { file: PathBuf },
}

/// The persisted tree. All mutations are written back atomically (temp file
/// plus rename).
pub struct ObjectStore {
    path: PathBuf,
    root: Value,
}

impl ObjectStore {
    /// Opens an existing store, or starts an empty one if the file is
    /// missing.
    pub fn open(path: &Path) -> Result<Self, AegisError> {
        let root = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Value::Object(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if !root.is_object() {
            return Err(AegisError::AdminError(format!(
                "store '{}' is not a JSON object",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            root,
        })
    }

    pub fn save(&self) -> Result<(), AegisError> {
        let content = serde_json::to_string_pretty(&self.root)?;
        let temp = self.path.with_extension("tmp");
        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, &self.path)?;
        info!("Object store saved to {}", self.path.display());
        Ok(())
    }

    fn segments(path: &str) -> Result<Vec<&str>, AegisError> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(AegisError::MalformedDn(path.to_string()));
        }
        Ok(segments)
    }

    fn lookup(&self, path: &str) -> Result<&Value, AegisError> {
        let mut current = &self.root;
        for segment in Self::segments(path)? {
            current = current
                .get(segment)
                .ok_or_else(|| AegisError::NotFound(path.to_string()))?;
        }
        Ok(current)
    }

    fn lookup_parent_mut(&mut self, path: &str) -> Result<(&mut Map<String, Value>, String), AegisError> {
        let segments = Self::segments(path)?;
        let (leaf, parents) = segments
            .split_last()
            .ok_or_else(|| AegisError::MalformedDn(path.to_string()))?;
        let mut current = &mut self.root;
        for segment in parents {
            current = current
                .get_mut(*segment)
                .ok_or_else(|| AegisError::NotFound(path.to_string()))?;
        }
        let map = current
            .as_object_mut()
            .ok_or_else(|| AegisError::AdminError(format!("'{path}' parent is not an object")))?;
        Ok((map, (*leaf).to_string()))
    }

    pub fn read(&self, path: &str) -> Result<String, AegisError> {
        match self.lookup(path)? {
            Value::String(s) => Ok(s.clone()),
            other => Ok(other.to_string()),
        }
    }

    pub fn write_key(&mut self, path: &str, value: &str) -> Result<(), AegisError> {
        let (map, leaf) = self.lookup_parent_mut(path)?;
        if map.get(&leaf).is_some_and(Value::is_object) {
            return Err(AegisError::AdminError(format!(
                "'{path}' is an object, not a key"
            )));
        }
        map.insert(leaf, Value::String(value.to_string()));
        Ok(())
    }

    pub fn create_object(&mut self, path: &str) -> Result<(), AegisError> {
        let (map, leaf) = self.lookup_parent_mut(path)?;
        if map.contains_key(&leaf) {
            return Err(AegisError::DuplicateName(path.to_string()));
        }
        map.insert(leaf, Value::Object(Map::new()));
        Ok(())
    }

    pub fn delete(&mut self, path: &str) -> Result<(), AegisError> {
        let (map, leaf) = self.lookup_parent_mut(path)?;
        map.remove(&leaf)
            .map(|_| ())
            .ok_or_else(|| AegisError::NotFound(path.to_string()))
    }

    /// Every leaf as `path=value`, depth-first in key order.
    pub fn print_all(&self) -> Vec<String> {
        fn walk(prefix: &str, value: &Value, out: &mut Vec<String>) {
            match value {
                Value::Object(map) => {
                    for (key, child) in map {
                        let path = if prefix.is_empty() {
                            key.clone()
                        } else {
                            format!("{prefix}.{key}")
                        };
                        walk(&path, child, out);
                    }
                }
                Value::String(s) => out.push(format!("{prefix}={s}")),
                other => out.push(format!("{prefix}={other}")),
            }
        }
        let mut out = Vec::new();
        walk("", &self.root, &mut out);
        out
    }

    /// Loads `path=value` lines, creating intermediate objects as needed.
    /// `#` lines and blank lines are skipped.
    pub fn bulk_load(&mut self, content: &str) -> Result<usize, AegisError> {
        let mut loaded = 0;
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (path, value) = line.split_once('=').ok_or_else(|| {
                AegisError::AdminError(format!("line {}: expected 'path=value'", idx + 1))
            })?;
            self.ensure_parents(path.trim())?;
            self.write_key(path.trim(), value.trim())?;
            loaded += 1;
        }
        Ok(loaded)
    }

    fn ensure_parents(&mut self, path: &str) -> Result<(), AegisError> {
        let segments = Self::segments(path)?;
        let mut current = &mut self.root;
        for segment in &segments[..segments.len() - 1] {
            let map = current.as_object_mut().ok_or_else(|| {
                AegisError::AdminError(format!("'{path}' crosses a non-object value"))
            })?;
            current = map
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        Ok(())
    }

    /// Executes one action; mutating actions persist the store. Returns the
    /// lines to print.
    pub fn execute(&mut self, action: AdminAction) -> Result<Vec<String>, AegisError> {
        match action {
            AdminAction::Read { path } => Ok(vec![self.read(&path)?]),
            AdminAction::WriteKey { path, value } => {
                self.write_key(&path, &value)?;
                self.save()?;
                Ok(Vec::new())
            }
            AdminAction::CreateObject { path } => {
                self.create_object(&path)?;
                self.save()?;
                Ok(Vec::new())
            }
            AdminAction::CreateObjectAndKey { path, key, value } => {
                self.create_object(&path)?;
                self.write_key(&format!("{path}.{key}"), &value)?;
                self.save()?;
                Ok(Vec::new())
            }
            AdminAction::Delete { path } => {
                self.delete(&path)?;
                self.save()?;
                Ok(Vec::new())
            }
            AdminAction::PrintAll => Ok(self.print_all()),
            AdminAction::BulkLoad { file } => {
                let content = std::fs::read_to_string(&file)?;
                let loaded = self.bulk_load(&content)?;
                self.save()?;
                Ok(vec![format!("{loaded} keys loaded")])
            }
        }
    }
}
