//! Instance registry loaded once per run from a CSV source.
//!
//! The registry is immutable for the lifetime of a run: row order determines
//! task submission order and instance names double as identities, so blank or
//! duplicate names are rejected at load time rather than surfacing later as
//! colliding artifact paths.

use std::collections::BTreeSet;

use camino::Utf8Path;
use serde::Deserialize;
use thiserror::Error;

/// A named backup target with its connection parameters.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Instance {
    /// Unique instance name; identifies artifacts, logs, and remote prefixes.
    pub name: String,
    /// Host the producer connects to.
    pub host: String,
    /// Port the producer connects to.
    pub port: u16,
    /// Role used for the replication connection.
    pub user: String,
}

/// Errors raised while loading the instance registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Raised when the CSV source cannot be opened.
    #[error("failed to open instance file {path}: {message}")]
    Open {
        /// Path that could not be opened.
        path: String,
        /// Underlying I/O error message.
        message: String,
    },
    /// Raised when a row cannot be deserialised.
    #[error("failed to parse instance record: {0}")]
    Parse(String),
    /// Raised when an instance name is empty after trimming.
    #[error("instance record {record} has an empty name")]
    EmptyName {
        /// One-based record number within the source file.
        record: usize,
    },
    /// Raised when two rows share the same name.
    #[error("duplicate instance name: {0}")]
    DuplicateName(String),
}

/// Loads the instance list from a CSV file with columns `name,host,port,user`.
///
/// Row order is preserved; it determines task submission order only.
///
/// # Errors
///
/// Returns [`RegistryError`] when the file cannot be opened, a row fails to
/// parse, a name is blank, or a name appears twice.
pub fn load_instances(path: &Utf8Path) -> Result<Vec<Instance>, RegistryError> {
    let mut reader = csv::Reader::from_path(path).map_err(|err| RegistryError::Open {
        path: path.to_string(),
        message: err.to_string(),
    })?;

    let mut seen = BTreeSet::new();
    let mut instances = Vec::new();
    for (index, record) in reader.deserialize::<Instance>().enumerate() {
        let instance = record.map_err(|err| RegistryError::Parse(err.to_string()))?;
        if instance.name.trim().is_empty() {
            return Err(RegistryError::EmptyName { record: index + 1 });
        }
        if !seen.insert(instance.name.clone()) {
            return Err(RegistryError::DuplicateName(instance.name));
        }
        instances.push(instance);
    }

    Ok(instances)
}
