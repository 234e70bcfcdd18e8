//! Where the schema script comes from.

use crate::error::DbError;
use std::borrow::Cow;
use std::path::PathBuf;

/// The schema script shipped with the binary.
pub const BUNDLED_SCHEMA: &str = include_str!("schema.sql");

/// Source of the script that drops and recreates the store's tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SchemaSource {
    /// The script compiled into this crate.
    #[default]
    Bundled,
    /// A UTF-8 script file on disk, read on every initialization.
    File(PathBuf),
}

impl SchemaSource {
    /// Reads the script text.
    ///
    /// # Errors
    ///
    /// Returns `DbError::SchemaRead` if a file source cannot be read and
    /// `DbError::SchemaEncoding` if it is not valid UTF-8.
    pub fn load(&self) -> Result<Cow<'static, str>, DbError> {
        match self {
            SchemaSource::Bundled => Ok(Cow::Borrowed(BUNDLED_SCHEMA)),
            SchemaSource::File(path) => {
                let bytes = std::fs::read(path).map_err(|source| DbError::SchemaRead {
                    path: path.clone(),
                    source,
                })?;
                String::from_utf8(bytes)
                    .map(Cow::Owned)
                    .map_err(|source| DbError::SchemaEncoding {
                        path: path.clone(),
                        source,
                    })
            }
        }
    }
}
