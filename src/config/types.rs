use serde::{
    Deserialize,
    Serialize,
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Configuration error in '{field_path}': {message}")]
pub struct ValidationError {
    /// JSON path to the field (e.g., "localesPaths[0]")
    pub field_path: String,
    pub message: String,
}

impl ValidationError {
    #[must_use]
    pub fn new(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field_path: field_path.into(), message: message.into() }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    ValidationErrors(Vec<ValidationError>),

    #[error("Failed to load configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, err)| format!("  {}. {} - {}", i + 1, err.field_path, err.message))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct I18nSettings {
    /// Locale directories relative to the workspace root.
    ///
    /// Later entries take precedence over earlier ones. When empty, locale
    /// directories under `src/` are discovered.
    pub locales_paths: Vec<String>,

    /// Glob, relative to each locale directory, selecting locale files.
    pub file_pattern: String,

    pub key_separator: String,

    pub source_language: String,

    /// Locale shown in lookups when none is requested.
    /// If unset, `source_language` is used.
    pub display_language: Option<String>,

    /// Max characters of a displayed value before truncation with ellipsis.
    /// `0` disables truncation.
    pub max_value_length: usize,
}

impl I18nSettings {
    /// Locale used when a lookup does not name one.
    #[must_use]
    pub fn display_language(&self) -> &str {
        self.display_language.as_deref().unwrap_or(&self.source_language)
    }

    /// # Errors
    /// - Required field is empty
    /// - Invalid glob pattern
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.key_separator.is_empty() {
            errors.push(ValidationError::new(
                "keySeparator",
                "The separator cannot be empty. Please specify a separator, for example: \".\" (dot)",
            ));
        }

        if self.source_language.trim().is_empty() {
            errors.push(ValidationError::new(
                "sourceLanguage",
                "The source language cannot be empty. Example: \"en\"",
            ));
        }

        if let Some(language) = &self.display_language
            && language.trim().is_empty()
        {
            errors.push(ValidationError::new(
                "displayLanguage",
                "The display language cannot be empty. Please specify a locale, or remove this field",
            ));
        }

        for (index, path) in self.locales_paths.iter().enumerate() {
            if path.trim().is_empty() {
                errors.push(ValidationError::new(
                    format!("localesPaths[{index}]"),
                    "The path cannot be empty. Example: \"src/locales\"",
                ));
            }
        }

        if self.file_pattern.is_empty() {
            errors.push(ValidationError::new(
                "filePattern",
                "The pattern cannot be empty. Example: \"**/*.json\"",
            ));
        } else if let Err(e) = globset::Glob::new(&self.file_pattern) {
            errors.push(ValidationError::new(
                "filePattern",
                format!("Invalid glob pattern '{}': {e}", self.file_pattern),
            ));
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

impl Default for I18nSettings {
    fn default() -> Self {
        Self {
            locales_paths: Vec::new(),
            file_pattern: "**/*.json".to_string(),
            key_separator: ".".to_string(),
            source_language: "en".to_string(),
            display_language: None,
            max_value_length: 0,
        }
    }
}
