use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::compiler::{AssociatedData, CompileError};

/// Stands for the primary path with its extension stripped.
pub const BASE_PLACEHOLDER: &str = "{base}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociatedPattern {
    pub name: &'static str,
    pub template: &'static str,
}

impl AssociatedPattern {
    pub const fn new(name: &'static str, template: &'static str) -> Self {
        Self { name, template }
    }

    /// Templates without the placeholder are taken relative to the primary
    /// file's directory.
    pub fn resolve(&self, primary: &Path) -> PathBuf {
        if self.template.contains(BASE_PLACEHOLDER) {
            let base = primary.with_extension("");
            let mut resolved = OsString::new();
            for (index, part) in self.template.split(BASE_PLACEHOLDER).enumerate() {
                if index > 0 {
                    resolved.push(base.as_os_str());
                }
                resolved.push(part);
            }
            PathBuf::from(resolved)
        } else {
            match primary.parent() {
                Some(parent) => parent.join(self.template),
                None => PathBuf::from(self.template),
            }
        }
    }
}

pub fn resolve_associated(
    primary: &Path,
    patterns: &[AssociatedPattern],
) -> Result<AssociatedData, CompileError> {
    let mut data = AssociatedData::new();
    for pattern in patterns {
        let path = pattern.resolve(primary);
        match fs::read(&path) {
            Ok(bytes) => {
                data.insert(pattern.name.to_string(), bytes);
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(
                    primary = %primary.display(),
                    pattern = pattern.name,
                    path = %path.display(),
                    "associated_file_absent"
                );
            }
            Err(source) => return Err(CompileError::Read { path, source }),
        }
    }
    Ok(data)
}
