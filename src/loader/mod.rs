//! Locale data sources.
//!
//! A [`Loader`] exposes one source of locale data as a tree and accepts writes
//! for the keys it owns. [`ComposedLoader`] merges many loaders behind the same
//! contract, so callers cannot tell one source from many.

/// Loader aggregating other loaders
pub mod composed;
/// Loader error types
mod error;
/// Directory of JSON locale files
pub mod json;
/// Formatting-preserving JSON edits
mod json_edit;
/// Locale and namespace detection from file paths
mod locale;

use std::path::{
    Path,
    PathBuf,
};
use std::sync::Arc;

pub use composed::{
    ComposedLoader,
    Distribution,
};
pub use error::{
    LoaderError,
    WriteFailure,
};
use futures::future::BoxFuture;
pub use json::{
    JsonLoader,
    JsonLoaderOptions,
};
pub use locale::is_locale_code;
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;

use crate::event::{
    ChangeEmitter,
    Subscription,
};
use crate::tree::{
    FlattenLocaleTree,
    LocaleNode,
    LocaleTree,
    TreeEntry,
};
use crate::types::PendingWrite;

/// One source of locale data.
///
/// Reads never fail: an unknown keypath yields `None`. Implementors provide the
/// tree, the ownership predicate and persistence; lookups have shared defaults
/// built on [`Loader::root`] and [`Loader::flatten_locale_tree`].
pub trait Loader: Send + Sync + std::fmt::Debug {
    /// Name used to tag change events.
    fn name(&self) -> &str;

    /// Files (or opaque source identifiers) this loader currently represents.
    fn files(&self) -> Vec<PathBuf>;

    fn root(&self) -> Arc<LocaleTree>;

    /// Flat keypath view of [`Loader::root`]. Must be refreshed whenever the source is re-read.
    fn flatten_locale_tree(&self) -> Arc<FlattenLocaleTree>;

    fn locales(&self) -> Vec<String>;

    /// Emitter fired whenever this source's tree materially changes.
    fn emitter(&self) -> &ChangeEmitter;

    /// Whether this loader owns `pending`. Must be free of side effects.
    fn can_handle_writes(&self, pending: &PendingWrite) -> bool;

    /// Persists a batch of pending writes.
    ///
    /// An empty or fully no-op batch is `Ok(())`; persistence problems are `Err`.
    fn write(&self, pendings: Vec<PendingWrite>) -> BoxFuture<'_, Result<(), LoaderError>>;

    /// Subscribes to this loader's change events.
    fn on_did_change(&self, listener: Box<dyn Fn(&str) + Send + Sync>) -> Subscription {
        self.emitter().subscribe(listener)
    }

    fn key_separator(&self) -> &str {
        "."
    }

    /// Where a not yet existing translation of `keypath` in `locale` should be written.
    fn get_shadow_file_path(&self, keypath: &str, _locale: &str) -> Option<PathBuf> {
        self.get_node_by_key(keypath)?.shadow_filepath.clone()
    }

    /// Finds a branch or leaf. With `tree`, `keypath` is relative to that subtree.
    fn get_tree_node_by_key(&self, keypath: &str, tree: Option<&LocaleTree>) -> Option<TreeEntry> {
        match tree {
            Some(tree) => tree.find(keypath, self.key_separator()),
            None => self.root().find(keypath, self.key_separator()),
        }
    }

    fn get_node_by_key(&self, keypath: &str) -> Option<Arc<LocaleNode>> {
        self.flatten_locale_tree().get(keypath).cloned()
    }

    fn get_filepath_by_key(&self, keypath: &str, locale: Option<&str>) -> Option<PathBuf> {
        self.get_node_by_key(keypath)?.filepath(locale).map(Path::to_path_buf)
    }

    /// Value of `keypath` in `locale` (first locale in identifier order when `None`).
    ///
    /// Leaves longer than `max_length` characters are cut and suffixed with `...`;
    /// `0` disables truncation. Branches are rendered as JSON, indented by
    /// `stringify_space` spaces when given.
    fn get_value_by_key(
        &self,
        keypath: &str,
        locale: Option<&str>,
        max_length: usize,
        stringify_space: Option<usize>,
    ) -> Option<String> {
        let entry = self.get_tree_node_by_key(keypath, None)?;
        render_value(&entry, locale, max_length, stringify_space)
    }

    /// Keypath whose value in `locale` equals `text`, smallest keypath first.
    fn get_key_by_value(&self, text: &str, locale: Option<&str>) -> Option<String> {
        self.flatten_locale_tree()
            .values()
            .filter(|node| node.value(locale) == Some(text))
            .map(|node| node.keypath.clone())
            .min()
    }
}

/// Renders a tree entry for display.
#[must_use]
pub fn render_value(
    entry: &TreeEntry,
    locale: Option<&str>,
    max_length: usize,
    stringify_space: Option<usize>,
) -> Option<String> {
    match entry {
        TreeEntry::Tree(tree) => stringify(&tree.to_json(locale), stringify_space),
        TreeEntry::Node(node) => node.value(locale).map(|value| truncate(value, max_length)),
    }
}

fn truncate(value: &str, max_length: usize) -> String {
    if max_length == 0 || value.chars().count() <= max_length {
        return value.to_string();
    }
    let mut truncated: String = value.chars().take(max_length).collect();
    truncated.push_str("...");
    truncated
}

fn stringify(value: &Value, space: Option<usize>) -> Option<String> {
    let Some(space) = space.filter(|space| *space > 0) else {
        return serde_json::to_string(value).ok();
    };
    let indent = " ".repeat(space);
    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer).ok()?;
    String::from_utf8(buffer).ok()
}
