//! Assembles the loaders of a workspace from its configuration.

use std::sync::Arc;

use crate::config::{
    ConfigManager,
    I18nSettings,
};
use crate::loader::{
    ComposedLoader,
    JsonLoader,
    JsonLoaderOptions,
    Loader,
    LoaderError,
};

/// The composed view over every locale directory of a workspace.
#[derive(Debug)]
pub struct Workspace {
    settings: I18nSettings,
    /// One loader per locale directory, lowest priority first
    sources: Vec<Arc<JsonLoader>>,
    composed: Arc<ComposedLoader>,
}

impl Workspace {
    /// Loads every configured (or discovered) locale directory.
    ///
    /// Directories that do not exist are skipped.
    ///
    /// # Errors
    /// Returns the first loader error other than an unreadable directory.
    pub async fn load(config: &ConfigManager) -> Result<Self, LoaderError> {
        let settings = config.get_settings().clone();
        let options = JsonLoaderOptions {
            file_pattern: settings.file_pattern.clone(),
            key_separator: settings.key_separator.clone(),
        };

        let mut sources = Vec::new();
        for dir in config.locales_paths() {
            match JsonLoader::load(&dir, options.clone()).await {
                Ok(loader) => sources.push(Arc::new(loader)),
                Err(LoaderError::Read { path, source }) => {
                    tracing::warn!(path = %path.display(), %source, "Skipping locale directory");
                }
                Err(error) => return Err(error),
            }
        }

        let children: Vec<Arc<dyn Loader>> = sources
            .iter()
            .map(|source| Arc::clone(source) as Arc<dyn Loader>)
            .collect();
        let composed = Arc::new(ComposedLoader::new());
        composed.set_loaders(children);
        tracing::info!(sources = sources.len(), "Workspace loaded");

        Ok(Self { settings, sources, composed })
    }

    #[must_use]
    pub const fn settings(&self) -> &I18nSettings {
        &self.settings
    }

    /// The merged loader, for reads, writes and change subscriptions.
    #[must_use]
    pub const fn loader(&self) -> &Arc<ComposedLoader> {
        &self.composed
    }

    /// Locale directory loaders, lowest priority first.
    #[must_use]
    pub fn sources(&self) -> &[Arc<JsonLoader>] {
        &self.sources
    }

    /// Displayed value of `keypath`, in `locale` or the display language.
    ///
    /// Values are truncated to `maxValueLength`; branches render as indented JSON.
    #[must_use]
    pub fn lookup(&self, keypath: &str, locale: Option<&str>) -> Option<String> {
        let locale = locale.unwrap_or_else(|| self.settings.display_language());
        self.composed.get_value_by_key(
            keypath,
            Some(locale),
            self.settings.max_value_length,
            Some(2),
        )
    }

    /// Re-reads every locale directory.
    ///
    /// # Errors
    /// Returns every failure, attributed to its directory.
    pub async fn reload(&self) -> Result<(), LoaderError> {
        let results =
            futures::future::join_all(self.sources.iter().map(|source| source.reload())).await;
        let failures: Vec<_> = self
            .sources
            .iter()
            .zip(results)
            .filter_map(|(source, result)| result.err().map(|e| (source.name().to_string(), e)))
            .flat_map(|(name, error)| error.into_failures(&name))
            .collect();

        if failures.is_empty() { Ok(()) } else { Err(LoaderError::ReloadFailures(failures)) }
    }
}
