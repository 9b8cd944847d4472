// Sysfs attribute access for LEGO device classes
//
// Devices live under <root>/class/<class>/<node>/, one file per attribute.
// Every attribute is a short string; numeric attributes are decimal and list
// attributes are space-separated. Attributes are reopened on every access so
// reads always observe the driver's current value.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Error types for sysfs attribute access
#[derive(Debug, thiserror::Error)]
pub enum SysfsError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value in attribute {attribute}: '{value}'")]
    InvalidValue { attribute: String, value: String },
}

pub type Result<T> = std::result::Result<T, SysfsError>;

/// Locate the device node of `class` connected to `port` and bound to `driver`
///
/// Returns `Ok(None)` when no such node exists, including when the class
/// directory itself is missing (no device of that class was ever plugged in).
pub fn find_node(root: &Path, class: &str, port: &str, driver: &str) -> Result<Option<PathBuf>> {
    let class_dir = root.join("class").join(class);
    let entries = match fs::read_dir(&class_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(SysfsError::Io { path: class_dir, source }),
    };

    // Sorted so the first match is stable across calls
    let mut nodes = entries
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<std::io::Result<Vec<PathBuf>>>()
        .map_err(|source| SysfsError::Io {
            path: class_dir.clone(),
            source,
        })?;
    nodes.sort();

    for node in nodes {
        let address = Attribute::new(&node, "address");
        let driver_name = Attribute::new(&node, "driver_name");
        // Nodes can vanish between listing and reading when a device is unplugged
        let (Ok(address), Ok(driver_name)) = (address.read(), driver_name.read()) else {
            continue;
        };
        if address == port && driver_name == driver {
            debug!("Found {} node {} for {} on {}", class, node.display(), driver, port);
            return Ok(Some(node));
        }
    }

    Ok(None)
}

/// A single attribute file of a device node
#[derive(Debug, Clone)]
pub struct Attribute {
    name: String,
    path: PathBuf,
}

impl Attribute {
    pub fn new(node: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: node.join(name),
        }
    }

    fn io_error(&self, source: std::io::Error) -> SysfsError {
        SysfsError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Read the attribute with surrounding whitespace removed
    pub fn read(&self) -> Result<String> {
        let raw = fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        Ok(raw.trim().to_string())
    }

    /// Read a decimal integer attribute
    pub fn read_int(&self) -> Result<i32> {
        let value = self.read()?;
        value.parse().map_err(|_| SysfsError::InvalidValue {
            attribute: self.name.clone(),
            value,
        })
    }

    /// Read a space-separated list attribute
    pub fn read_list(&self) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .split_whitespace()
            .map(str::to_string)
            .collect())
    }

    /// Write a string value
    pub fn write(&self, value: &str) -> Result<()> {
        debug!("Write {}={}", self.name, value);
        fs::write(&self.path, value).map_err(|e| self.io_error(e))
    }

    /// Write a decimal integer value
    pub fn write_int(&self, value: i32) -> Result<()> {
        self.write(&value.to_string())
    }
}
