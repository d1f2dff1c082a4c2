//! Core types used throughout the project.

use std::path::PathBuf;

use serde::{
    Deserialize,
    Serialize,
};

/// A requested change to one keypath in one locale, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingWrite {
    pub keypath: String,
    pub value: String,
    pub locale: String,
    /// Target file, for keys that do not exist anywhere yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filepath: Option<PathBuf>,
}

impl PendingWrite {
    #[must_use]
    pub fn new(
        keypath: impl Into<String>,
        value: impl Into<String>,
        locale: impl Into<String>,
    ) -> Self {
        Self { keypath: keypath.into(), value: value.into(), locale: locale.into(), filepath: None }
    }

    #[must_use]
    pub fn with_filepath(mut self, filepath: impl Into<PathBuf>) -> Self {
        self.filepath = Some(filepath.into());
        self
    }
}
