//! Loader for a directory of JSON locale files.

use std::collections::{
    BTreeMap,
    BTreeSet,
};
use std::path::{
    Path,
    PathBuf,
};
use std::sync::{
    Arc,
    PoisonError,
    RwLock,
};

use futures::future::BoxFuture;
use globset::{
    Glob,
    GlobSet,
    GlobSetBuilder,
};
use ignore::WalkBuilder;
use serde_json::Value;

use super::json_edit::upsert_keys_in_json_text;
use super::locale::{
    FileLayout,
    detect_layout,
    mirror_path,
};
use super::{
    Loader,
    LoaderError,
    WriteFailure,
};
use crate::event::ChangeEmitter;
use crate::tree::{
    FlattenLocaleTree,
    LocaleRecord,
    LocaleTree,
    join_keypath,
};
use crate::types::PendingWrite;

/// Options shared by every JSON loader of a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonLoaderOptions {
    /// Glob, relative to the locale directory, selecting locale files
    pub file_pattern: String,
    pub key_separator: String,
}

impl Default for JsonLoaderOptions {
    fn default() -> Self {
        Self { file_pattern: "**/*.json".to_string(), key_separator: ".".to_string() }
    }
}

/// A locale file found in the directory.
#[derive(Debug, Clone)]
struct LocaleFile {
    path: PathBuf,
    layout: FileLayout,
}

/// Everything read from the directory at one point in time.
#[derive(Debug, Default)]
struct Snapshot {
    /// Locale files sorted by path
    files: Vec<LocaleFile>,
    root: Arc<LocaleTree>,
    flat: Arc<FlattenLocaleTree>,
    /// Sorted, unique
    locales: Vec<String>,
}

impl Snapshot {
    fn file(&self, path: &Path) -> Option<&LocaleFile> {
        self.files.iter().find(|file| file.path == path)
    }

    fn file_for(&self, locale: &str, namespace: Option<&str>) -> Option<&LocaleFile> {
        self.files.iter().find(|file| {
            file.layout.locale == locale && file.layout.namespace.as_deref() == namespace
        })
    }
}

/// File a pending write lands in.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    path: PathBuf,
    /// Namespace of the target file; stripped from keypaths before editing
    namespace: Option<String>,
}

/// One directory of JSON locale files.
///
/// Supported layouts are `<locale>.json`, `<locale>/<namespace>.json` and
/// `<namespace>/<locale>.json`. Keys of namespaced files are prefixed with the
/// namespace.
#[derive(Debug)]
pub struct JsonLoader {
    /// Display name, the directory path
    name: String,
    dir: PathBuf,
    options: JsonLoaderOptions,
    /// Compiled `options.file_pattern`
    matcher: GlobSet,
    snapshot: RwLock<Arc<Snapshot>>,
    emitter: ChangeEmitter,
}

impl JsonLoader {
    /// Reads every locale file below `dir`.
    ///
    /// # Errors
    /// - `dir` cannot be read
    /// - `options.file_pattern` is not a valid glob
    pub async fn load(
        dir: impl Into<PathBuf>,
        options: JsonLoaderOptions,
    ) -> Result<Self, LoaderError> {
        let dir = dir.into();
        let matcher = build_matcher(&options.file_pattern)?;
        let snapshot = read_snapshot(&dir, &matcher, &options.key_separator).await?;
        tracing::debug!(
            dir = %dir.display(),
            files = snapshot.files.len(),
            keys = snapshot.flat.len(),
            "Loaded locale directory"
        );

        Ok(Self {
            name: dir.display().to_string(),
            dir,
            options,
            matcher,
            snapshot: RwLock::new(Arc::new(snapshot)),
            emitter: ChangeEmitter::new(),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Re-reads the directory and notifies observers.
    ///
    /// # Errors
    /// Returns an error if the directory can no longer be read; the previous data is kept.
    pub async fn reload(&self) -> Result<(), LoaderError> {
        let snapshot =
            read_snapshot(&self.dir, &self.matcher, &self.options.key_separator).await?;
        tracing::info!(dir = %self.dir.display(), keys = snapshot.flat.len(), "Reloaded locales");
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
        self.emitter.fire(&self.name);
        Ok(())
    }

    /// Whether `keypath` exists here or `locale` is one of this directory's locales.
    fn owns(snapshot: &Snapshot, keypath: &str, locale: &str) -> bool {
        snapshot.flat.contains_key(keypath) || snapshot.locales.iter().any(|l| l == locale)
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Resolves where `keypath` in `locale` is, or would be, stored.
    ///
    /// In order: the record's own file, the mirror of the key's file in another
    /// locale, the locale's file for the key's namespace, the mirror of that
    /// namespace's file in another locale, and finally `<dir>/<locale>.json`.
    fn target(&self, snapshot: &Snapshot, keypath: &str, locale: &str) -> Option<Target> {
        let of_file = |path: PathBuf, file: &LocaleFile| Target {
            path,
            namespace: file.layout.namespace.clone(),
        };

        if let Some(node) = snapshot.flat.get(keypath) {
            let existing = node.locales.values().filter_map(|record| {
                let file = snapshot.file(record.filepath.as_deref()?)?;
                Some((record, file))
            });
            for (record, file) in existing {
                if record.locale == locale {
                    return Some(of_file(file.path.clone(), file));
                }
                if let Some(path) = mirror_path(&file.path, &record.locale, locale) {
                    return Some(of_file(path, file));
                }
            }
        }

        let separator = &self.options.key_separator;
        let is_namespace =
            |name: &str| snapshot.files.iter().any(|f| f.layout.namespace.as_deref() == Some(name));
        let namespace = keypath
            .split_once(separator.as_str())
            .map(|(head, _)| head)
            .filter(|head| is_namespace(head));

        if let Some(file) = snapshot.file_for(locale, namespace) {
            return Some(of_file(file.path.clone(), file));
        }
        let sibling = snapshot.files.iter().find(|f| f.layout.namespace.as_deref() == namespace);
        if let Some(file) = sibling
            && let Some(path) = mirror_path(&file.path, &file.layout.locale, locale)
        {
            return Some(of_file(path, file));
        }

        namespace
            .is_none()
            .then(|| Target { path: self.dir.join(format!("{locale}.json")), namespace: None })
    }

    /// Keypath as stored inside `target`'s file.
    fn key_in_file<'a>(&self, keypath: &'a str, target: &Target) -> &'a str {
        target
            .namespace
            .as_deref()
            .and_then(|namespace| keypath.strip_prefix(namespace))
            .and_then(|rest| rest.strip_prefix(self.options.key_separator.as_str()))
            .unwrap_or(keypath)
    }

    async fn write_batch(&self, pendings: Vec<PendingWrite>) -> Result<(), LoaderError> {
        let snapshot = self.snapshot();
        let mut failures: Vec<LoaderError> = Vec::new();

        let mut grouped: BTreeMap<PathBuf, (Target, Vec<(String, String)>)> = BTreeMap::new();
        for pending in pendings {
            let target = match &pending.filepath {
                Some(path) => Some(Target {
                    path: path.clone(),
                    namespace: snapshot.file(path).and_then(|f| f.layout.namespace.clone()),
                }),
                None => self.target(&snapshot, &pending.keypath, &pending.locale),
            };
            let Some(target) = target else {
                failures.push(LoaderError::NoTarget {
                    keypath: pending.keypath,
                    locale: pending.locale,
                });
                continue;
            };
            let key = self.key_in_file(&pending.keypath, &target).to_string();
            grouped
                .entry(target.path.clone())
                .or_insert_with(|| (target, Vec::new()))
                .1
                .push((key, pending.value));
        }

        // Every edit is computed before the first file is touched.
        let mut edits: Vec<(PathBuf, String)> = Vec::new();
        for (path, (_, entries)) in grouped {
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => String::new(),
                Err(source) => {
                    failures.push(LoaderError::Read { path, source });
                    continue;
                }
            };
            match upsert_keys_in_json_text(&text, &entries, &self.options.key_separator) {
                Ok(new_text) => edits.push((path, new_text)),
                Err(error) => failures.push(LoaderError::Edit { path, message: error.to_string() }),
            }
        }

        let written = edits.len();
        let results =
            futures::future::join_all(edits.into_iter().map(|(path, text)| persist(path, text)))
                .await;
        let persisted = results.iter().filter(|result| result.is_ok()).count();
        failures.extend(results.into_iter().filter_map(Result::err));
        tracing::debug!(dir = %self.dir.display(), written, persisted, "Persisted locale files");

        if persisted > 0
            && let Err(error) = self.reload().await
        {
            failures.push(error);
        }

        if failures.is_empty() {
            Ok(())
        } else {
            let name = self.name.clone();
            Err(LoaderError::WriteFailures(
                failures.into_iter().map(|error| WriteFailure::new(name.clone(), error)).collect(),
            ))
        }
    }
}

impl Loader for JsonLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn files(&self) -> Vec<PathBuf> {
        self.snapshot().files.iter().map(|file| file.path.clone()).collect()
    }

    fn root(&self) -> Arc<LocaleTree> {
        Arc::clone(&self.snapshot().root)
    }

    fn flatten_locale_tree(&self) -> Arc<FlattenLocaleTree> {
        Arc::clone(&self.snapshot().flat)
    }

    fn locales(&self) -> Vec<String> {
        self.snapshot().locales.clone()
    }

    fn emitter(&self) -> &ChangeEmitter {
        &self.emitter
    }

    fn key_separator(&self) -> &str {
        &self.options.key_separator
    }

    /// Claims a pending write whose file hint lies in this directory, or, without a
    /// hint, whose key already exists here or whose locale this directory has.
    fn can_handle_writes(&self, pending: &PendingWrite) -> bool {
        if let Some(path) = &pending.filepath {
            return path.starts_with(&self.dir);
        }
        Self::owns(&self.snapshot(), &pending.keypath, &pending.locale)
    }

    fn write(&self, pendings: Vec<PendingWrite>) -> BoxFuture<'_, Result<(), LoaderError>> {
        Box::pin(self.write_batch(pendings))
    }

    /// Proposed file for `keypath` in `locale`, if this directory would own the write.
    fn get_shadow_file_path(&self, keypath: &str, locale: &str) -> Option<PathBuf> {
        let snapshot = self.snapshot();
        if !Self::owns(&snapshot, keypath, locale) {
            return None;
        }
        self.target(&snapshot, keypath, locale).map(|target| target.path)
    }
}

fn build_matcher(pattern: &str) -> Result<GlobSet, LoaderError> {
    let to_error = |source| LoaderError::Pattern { pattern: pattern.to_string(), source };
    let glob = Glob::new(pattern).map_err(to_error)?;
    let mut builder = GlobSetBuilder::new();
    builder.add(glob);
    builder.build().map_err(to_error)
}

/// Finds locale files below `dir` matching `matcher`, sorted by path.
fn find_locale_files(dir: &Path, matcher: &GlobSet) -> Vec<LocaleFile> {
    let mut found = Vec::new();
    let walker = WalkBuilder::new(dir).hidden(false).git_ignore(true).follow_links(false).build();
    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(?err, "Failed to read directory entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }

        let path = entry.path();
        let Ok(relative) = path.strip_prefix(dir) else {
            continue;
        };
        if !matcher.is_match(relative) {
            continue;
        }
        let Some(layout) = detect_layout(relative) else {
            tracing::debug!(path = %path.display(), "Skipping file without a locale in its path");
            continue;
        };
        found.push(LocaleFile { path: path.to_path_buf(), layout });
    }
    found.sort_by(|a, b| a.path.cmp(&b.path));
    found
}

async fn read_snapshot(
    dir: &Path,
    matcher: &GlobSet,
    separator: &str,
) -> Result<Snapshot, LoaderError> {
    if let Err(source) = tokio::fs::metadata(dir).await {
        return Err(LoaderError::Read { path: dir.to_path_buf(), source });
    }

    let files = find_locale_files(dir, matcher);
    let contents = futures::future::join_all(
        files.iter().map(|file| async move { tokio::fs::read_to_string(&file.path).await }),
    )
    .await;

    let mut root = LocaleTree::new("");
    let mut locales = BTreeSet::new();
    for (file, content) in files.iter().zip(contents) {
        let json = match content.map(|text| serde_json::from_str::<Value>(&text)) {
            Ok(Ok(json)) => json,
            Ok(Err(error)) => {
                tracing::warn!(path = %file.path.display(), %error, "Failed to parse locale file");
                continue;
            }
            Err(error) => {
                tracing::warn!(path = %file.path.display(), %error, "Failed to read locale file");
                continue;
            }
        };
        locales.insert(file.layout.locale.clone());

        let mut entries = Vec::new();
        let prefix = file.layout.namespace.as_deref();
        flatten_json_value(&json, separator, prefix, &mut entries);
        for (keypath, value) in entries {
            let record = LocaleRecord::new(file.layout.locale.as_str(), value)
                .with_filepath(file.path.as_path());
            if let Err(conflict) = root.insert_record(&keypath, separator, record) {
                tracing::warn!(path = %file.path.display(), %conflict, "Skipping conflicting key");
            }
        }
    }

    let flat = root.flatten();
    Ok(Snapshot {
        files,
        root: Arc::new(root),
        flat: Arc::new(flat),
        locales: locales.into_iter().collect(),
    })
}

/// Flattens nested JSON objects into `(keypath, value)` pairs.
///
/// Strings are taken as is; arrays and other scalars keep their JSON text.
fn flatten_json_value(
    json: &Value,
    separator: &str,
    prefix: Option<&str>,
    result: &mut Vec<(String, String)>,
) {
    match json {
        Value::Object(map) => {
            for (key, value) in map {
                let full_key =
                    prefix.map_or_else(|| key.clone(), |p| join_keypath(p, key, separator));
                flatten_json_value(value, separator, Some(&full_key), result);
            }
        }
        Value::String(s) => {
            if let Some(key) = prefix {
                result.push((key.to_string(), s.clone()));
            }
        }
        _ => {
            if let Some(key) = prefix {
                result.push((key.to_string(), json.to_string()));
            }
        }
    }
}

/// Writes `text` to `path`, creating parent directories.
async fn persist(path: PathBuf, text: String) -> Result<(), LoaderError> {
    if let Some(parent) = path.parent()
        && let Err(source) = tokio::fs::create_dir_all(parent).await
    {
        return Err(LoaderError::Write { path, source });
    }
    match tokio::fs::write(&path, text).await {
        Ok(()) => Ok(()),
        Err(source) => Err(LoaderError::Write { path, source }),
    }
}
