//! Hierarchical and flattened locale data.

use std::collections::{
    BTreeMap,
    HashMap,
};
use std::path::{
    Path,
    PathBuf,
};
use std::sync::Arc;

use serde_json::{
    Map,
    Value,
};
use thiserror::Error;

/// Keypath -> leaf lookup table projected from a [`LocaleTree`].
pub type FlattenLocaleTree = HashMap<String, Arc<LocaleNode>>;

/// Raised when a keypath is a translation in one place and a group in another.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{keypath}' is used both as a translation and as a group")]
pub struct KeyConflict {
    pub keypath: String,
}

/// The value of one key in one locale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleRecord {
    pub locale: String,
    pub value: String,
    /// File the value was read from, if the source is file backed.
    pub filepath: Option<PathBuf>,
}

impl LocaleRecord {
    #[must_use]
    pub fn new(locale: impl Into<String>, value: impl Into<String>) -> Self {
        Self { locale: locale.into(), value: value.into(), filepath: None }
    }

    #[must_use]
    pub fn with_filepath(mut self, filepath: impl Into<PathBuf>) -> Self {
        self.filepath = Some(filepath.into());
        self
    }
}

/// A leaf: one logical translation key and its per-locale values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocaleNode {
    pub keypath: String,
    /// Locale -> record. Ordered so "first locale" is deterministic.
    pub locales: BTreeMap<String, LocaleRecord>,
    /// Where a missing locale's value would be written.
    pub shadow_filepath: Option<PathBuf>,
}

impl LocaleNode {
    #[must_use]
    pub fn new(keypath: impl Into<String>) -> Self {
        Self { keypath: keypath.into(), ..Self::default() }
    }

    /// Returns the record for `locale`, or the first record when `locale` is `None`.
    #[must_use]
    pub fn record(&self, locale: Option<&str>) -> Option<&LocaleRecord> {
        match locale {
            Some(locale) => self.locales.get(locale),
            None => self.locales.values().next(),
        }
    }

    #[must_use]
    pub fn value(&self, locale: Option<&str>) -> Option<&str> {
        self.record(locale).map(|record| record.value.as_str())
    }

    /// File holding the value for `locale`; without a locale, the first record that has one.
    #[must_use]
    pub fn filepath(&self, locale: Option<&str>) -> Option<&Path> {
        match locale {
            Some(locale) => self.locales.get(locale)?.filepath.as_deref(),
            None => self.locales.values().find_map(|record| record.filepath.as_deref()),
        }
    }
}

/// Either side of a tree edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEntry {
    Tree(Arc<LocaleTree>),
    Node(Arc<LocaleNode>),
}

impl TreeEntry {
    #[must_use]
    pub fn keypath(&self) -> &str {
        match self {
            Self::Tree(tree) => &tree.keypath,
            Self::Node(node) => &node.keypath,
        }
    }

    #[must_use]
    pub fn as_tree(&self) -> Option<&Arc<LocaleTree>> {
        match self {
            Self::Tree(tree) => Some(tree),
            Self::Node(_) => None,
        }
    }

    #[must_use]
    pub fn as_node(&self) -> Option<&Arc<LocaleNode>> {
        match self {
            Self::Node(node) => Some(node),
            Self::Tree(_) => None,
        }
    }
}

/// A branch of the key hierarchy. The root has an empty keypath.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocaleTree {
    pub keypath: String,
    pub children: HashMap<String, TreeEntry>,
}

impl LocaleTree {
    #[must_use]
    pub fn new(keypath: impl Into<String>) -> Self {
        Self { keypath: keypath.into(), children: HashMap::new() }
    }

    #[must_use]
    pub fn with_children(keypath: impl Into<String>, children: HashMap<String, TreeEntry>) -> Self {
        Self { keypath: keypath.into(), children }
    }

    /// Inserts `record` under `keypath`, creating intermediate branches.
    ///
    /// Segments are relative to this tree; the stored keypaths are absolute.
    ///
    /// # Errors
    /// Returns [`KeyConflict`] when a segment on the way is already a leaf, or the
    /// final segment is already a branch.
    pub fn insert_record(
        &mut self,
        keypath: &str,
        separator: &str,
        record: LocaleRecord,
    ) -> Result<(), KeyConflict> {
        let segments: Vec<&str> = keypath.split(separator).collect();
        let Some((last, parents)) = segments.split_last() else {
            return Ok(());
        };

        let mut current = self;
        for segment in parents {
            let path = join_keypath(&current.keypath, segment, separator);
            let entry = current
                .children
                .entry((*segment).to_string())
                .or_insert_with(|| TreeEntry::Tree(Arc::new(Self::new(path.clone()))));
            current = match entry {
                TreeEntry::Tree(tree) => Arc::make_mut(tree),
                TreeEntry::Node(_) => return Err(KeyConflict { keypath: path }),
            };
        }

        let path = join_keypath(&current.keypath, last, separator);
        let entry = current
            .children
            .entry((*last).to_string())
            .or_insert_with(|| TreeEntry::Node(Arc::new(LocaleNode::new(path.clone()))));
        match entry {
            TreeEntry::Node(node) => {
                Arc::make_mut(node).locales.insert(record.locale.clone(), record);
                Ok(())
            }
            TreeEntry::Tree(_) => Err(KeyConflict { keypath: path }),
        }
    }

    /// Walks `keypath` (relative to this tree) down to a branch or leaf.
    #[must_use]
    pub fn find(&self, keypath: &str, separator: &str) -> Option<TreeEntry> {
        let mut segments = keypath.split(separator);
        let first = segments.next()?;
        let mut entry = self.children.get(first)?;
        for segment in segments {
            entry = entry.as_tree()?.children.get(segment)?;
        }
        Some(entry.clone())
    }

    /// Projects every leaf below this tree into a keypath map.
    #[must_use]
    pub fn flatten(&self) -> FlattenLocaleTree {
        let mut flat = FlattenLocaleTree::new();
        self.collect_nodes(&mut flat);
        flat
    }

    fn collect_nodes(&self, flat: &mut FlattenLocaleTree) {
        for entry in self.children.values() {
            match entry {
                TreeEntry::Tree(tree) => tree.collect_nodes(flat),
                TreeEntry::Node(node) => {
                    flat.insert(node.keypath.clone(), Arc::clone(node));
                }
            }
        }
    }

    /// Renders the values of `locale` below this tree as a JSON object.
    ///
    /// Leaves without a value for `locale` are omitted, and so are branches that end up empty.
    #[must_use]
    pub fn to_json(&self, locale: Option<&str>) -> Value {
        let mut map = Map::new();
        for (segment, entry) in &self.children {
            match entry {
                TreeEntry::Tree(tree) => {
                    let value = tree.to_json(locale);
                    if value.as_object().is_some_and(|obj| !obj.is_empty()) {
                        map.insert(segment.clone(), value);
                    }
                }
                TreeEntry::Node(node) => {
                    if let Some(value) = node.value(locale) {
                        map.insert(segment.clone(), Value::String(value.to_string()));
                    }
                }
            }
        }
        Value::Object(map)
    }
}

/// Joins a parent keypath and a child segment.
#[must_use]
pub fn join_keypath(parent: &str, segment: &str, separator: &str) -> String {
    if parent.is_empty() { segment.to_string() } else { format!("{parent}{separator}{segment}") }
}
