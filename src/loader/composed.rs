//! A loader merging many child loaders into one view.

use std::collections::{
    HashMap,
    HashSet,
};
use std::path::PathBuf;
use std::sync::atomic::{
    AtomicBool,
    Ordering,
};
use std::sync::{
    Arc,
    Mutex,
    MutexGuard,
    PoisonError,
    RwLock,
};

use futures::future::BoxFuture;

use super::{
    Loader,
    LoaderError,
    WriteFailure,
};
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

/// Name of every composed loader, appended to re-broadcast change tags.
pub const COMPOSED_LOADER_NAME: &str = "[Composed]";

/// Pending writes assigned to their owning loaders.
#[derive(Debug, Default)]
pub struct Distribution {
    /// Owning loader and its batch, highest priority first.
    /// Loaders with nothing to write are left out.
    pub batches: Vec<(Arc<dyn Loader>, Vec<PendingWrite>)>,
    /// Pendings no loader claimed.
    pub unhandled: Vec<PendingWrite>,
}

/// Aggregates child loaders.
///
/// Priority follows registration order: a later loader wins over an earlier one,
/// both in the merged views and in point lookups.
///
/// The merged flat view is cached. The cache starts dirty, becomes clean when
/// it is rebuilt on read, and becomes dirty again whenever a child fires.
pub struct ComposedLoader {
    /// Child loaders in registration order
    loaders: RwLock<Vec<Arc<dyn Loader>>>,
    /// Change subscriptions on the current children
    watchers: Mutex<Vec<Subscription>>,
    /// Subscription on the external translator stream
    translator: Mutex<Option<Subscription>>,
    /// Last merged flat view
    cache: Mutex<Arc<FlattenLocaleTree>>,
    /// Set by child changes; the next flat read rebuilds `cache`
    dirty: Arc<AtomicBool>,
    emitter: ChangeEmitter,
}

impl ComposedLoader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            loaders: RwLock::new(Vec::new()),
            watchers: Mutex::new(Vec::new()),
            translator: Mutex::new(None),
            cache: Mutex::new(Arc::new(FlattenLocaleTree::new())),
            dirty: Arc::new(AtomicBool::new(true)),
            emitter: ChangeEmitter::new(),
        }
    }

    /// Child loaders in registration order.
    #[must_use]
    pub fn loaders(&self) -> Vec<Arc<dyn Loader>> {
        self.loaders.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Child loaders, highest priority first. The registered order is left untouched.
    #[must_use]
    pub fn loaders_reversed(&self) -> Vec<Arc<dyn Loader>> {
        let mut loaders = self.loaders();
        loaders.reverse();
        loaders
    }

    /// Replaces the children.
    ///
    /// Subscriptions on the previous children are released and one is installed per
    /// new child. The merged view is rebuilt on the next read, not here.
    pub fn set_loaders(&self, loaders: Vec<Arc<dyn Loader>>) {
        let mut watchers = lock(&self.watchers);
        watchers.clear();

        let subscriptions = loaders.iter().map(|loader| self.watch(loader.as_ref())).collect();

        *self.loaders.write().unwrap_or_else(PoisonError::into_inner) = loaders;
        *watchers = subscriptions;
        self.dirty.store(true, Ordering::Release);
    }

    fn watch(&self, loader: &dyn Loader) -> Subscription {
        let dirty = Arc::clone(&self.dirty);
        let emitter = self.emitter.clone();
        loader.emitter().subscribe(move |source| {
            dirty.store(true, Ordering::Release);
            emitter.fire(&format!("{source}+{COMPOSED_LOADER_NAME}"));
        })
    }

    /// Re-broadcasts changes of an external translation state stream.
    ///
    /// Binding again replaces the previous binding.
    pub fn bind_translator(&self, translator: &ChangeEmitter) {
        let emitter = self.emitter.clone();
        let subscription = translator.subscribe(move |_| emitter.fire(COMPOSED_LOADER_NAME));
        *lock(&self.translator) = Some(subscription);
    }

    /// Fires a change manually, tagged with `source` or this loader's name.
    pub fn fire(&self, source: Option<&str>) {
        self.emitter.fire(source.unwrap_or(COMPOSED_LOADER_NAME));
    }

    /// Assigns each pending write to the first loader, in priority order, that claims it.
    ///
    /// A claiming loader that already stores the key in the pending locale takes
    /// precedence over higher priority claimants that do not.
    #[must_use]
    pub fn distribute(&self, pendings: Vec<PendingWrite>) -> Distribution {
        let loaders = self.loaders_reversed();
        let mut batches: Vec<Vec<PendingWrite>> = vec![Vec::new(); loaders.len()];
        let mut unhandled = Vec::new();

        for pending in pendings {
            let owner = loaders
                .iter()
                .position(|loader| {
                    stores(loader.as_ref(), &pending.keypath, &pending.locale)
                        && loader.can_handle_writes(&pending)
                })
                .or_else(|| loaders.iter().position(|loader| loader.can_handle_writes(&pending)));
            match owner.and_then(|index| batches.get_mut(index)) {
                Some(batch) => batch.push(pending),
                None => {
                    tracing::info!(
                        keypath = %pending.keypath,
                        locale = %pending.locale,
                        "Unhandled write"
                    );
                    unhandled.push(pending);
                }
            }
        }

        let batches =
            loaders.into_iter().zip(batches).filter(|(_, batch)| !batch.is_empty()).collect();
        Distribution { batches, unhandled }
    }

    /// Writes a single pending value.
    pub async fn write_one(&self, pending: PendingWrite) -> Result<(), LoaderError> {
        self.write(vec![pending]).await
    }
}

impl Default for ComposedLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ComposedLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> =
            self.loaders().iter().map(|loader| loader.name().to_string()).collect();
        f.debug_struct("ComposedLoader")
            .field("loaders", &names)
            .field("dirty", &self.dirty.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Loader for ComposedLoader {
    fn name(&self) -> &str {
        COMPOSED_LOADER_NAME
    }

    fn files(&self) -> Vec<PathBuf> {
        self.loaders().iter().flat_map(|loader| loader.files()).collect()
    }

    /// Shallow overlay of the children's top-level entries; a later loader replaces
    /// an earlier one's whole subtree under the same top-level key.
    fn root(&self) -> Arc<LocaleTree> {
        let mut children: HashMap<String, TreeEntry> = HashMap::new();
        for loader in self.loaders() {
            let root = loader.root();
            children.extend(root.children.iter().map(|(key, entry)| (key.clone(), entry.clone())));
        }
        Arc::new(LocaleTree::with_children("", children))
    }

    fn flatten_locale_tree(&self) -> Arc<FlattenLocaleTree> {
        let mut cache = lock(&self.cache);
        // Cleared before rebuilding so a change arriving mid-rebuild marks it dirty again.
        if self.dirty.swap(false, Ordering::AcqRel) {
            let mut merged = FlattenLocaleTree::new();
            for loader in self.loaders() {
                let flat = loader.flatten_locale_tree();
                merged.extend(flat.iter().map(|(key, node)| (key.clone(), Arc::clone(node))));
            }
            tracing::debug!(keys = merged.len(), "Rebuilt merged locale tree");
            *cache = Arc::new(merged);
        }
        Arc::clone(&cache)
    }

    fn locales(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.loaders()
            .iter()
            .flat_map(|loader| loader.locales())
            .filter(|locale| seen.insert(locale.clone()))
            .collect()
    }

    fn emitter(&self) -> &ChangeEmitter {
        &self.emitter
    }

    fn can_handle_writes(&self, pending: &PendingWrite) -> bool {
        self.loaders().iter().any(|loader| loader.can_handle_writes(pending))
    }

    /// Routes each pending write to its owner and writes all batches concurrently.
    ///
    /// Every batch runs to completion even if others fail. Failures are returned
    /// together once all batches finished; completed batches are not rolled back.
    fn write(&self, pendings: Vec<PendingWrite>) -> BoxFuture<'_, Result<(), LoaderError>> {
        Box::pin(async move {
            tracing::debug!(count = pendings.len(), "Distributing pending writes");
            let Distribution { batches, .. } = self.distribute(pendings);

            let writes = batches.into_iter().map(|(loader, batch)| async move {
                let result = loader.write(batch).await;
                (loader, result)
            });
            let results = futures::future::join_all(writes).await;

            let mut failures: Vec<WriteFailure> = Vec::new();
            for (loader, result) in results {
                if let Err(error) = result {
                    tracing::warn!(loader = loader.name(), %error, "Write failed");
                    failures.extend(error.into_failures(loader.name()));
                }
            }

            if failures.is_empty() { Ok(()) } else { Err(LoaderError::WriteFailures(failures)) }
        })
    }

    /// The file already holding `keypath` in `locale`, else the highest priority proposal.
    fn get_shadow_file_path(&self, keypath: &str, locale: &str) -> Option<PathBuf> {
        let loaders = self.loaders_reversed();
        loaders
            .iter()
            .filter(|loader| stores(loader.as_ref(), keypath, locale))
            .find_map(|loader| loader.get_filepath_by_key(keypath, Some(locale)))
            .or_else(|| {
                loaders.iter().find_map(|loader| loader.get_shadow_file_path(keypath, locale))
            })
    }

    fn get_node_by_key(&self, keypath: &str) -> Option<Arc<LocaleNode>> {
        self.loaders_reversed().iter().find_map(|loader| loader.get_node_by_key(keypath))
    }

    /// Match from the highest priority loader that has one.
    fn get_key_by_value(&self, text: &str, locale: Option<&str>) -> Option<String> {
        self.loaders_reversed().iter().find_map(|loader| loader.get_key_by_value(text, locale))
    }

    fn get_tree_node_by_key(&self, keypath: &str, tree: Option<&LocaleTree>) -> Option<TreeEntry> {
        self.loaders_reversed()
            .iter()
            .find_map(|loader| loader.get_tree_node_by_key(keypath, tree))
    }

    fn get_filepath_by_key(&self, keypath: &str, locale: Option<&str>) -> Option<PathBuf> {
        self.loaders_reversed()
            .iter()
            .find_map(|loader| loader.get_filepath_by_key(keypath, locale))
    }

    fn get_value_by_key(
        &self,
        keypath: &str,
        locale: Option<&str>,
        max_length: usize,
        stringify_space: Option<usize>,
    ) -> Option<String> {
        self.loaders_reversed()
            .iter()
            .find_map(|loader| {
                loader.get_value_by_key(keypath, locale, max_length, stringify_space)
            })
    }
}

/// Whether `loader` has a record for `keypath` in `locale`.
fn stores(loader: &dyn Loader, keypath: &str, locale: &str) -> bool {
    loader.get_node_by_key(keypath).is_some_and(|node| node.locales.contains_key(locale))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use googletest::prelude::*;
    use rstest::rstest;
    use tokio::sync::Barrier;

    use super::*;
    use crate::test_utils::{
        Claim,
        StubLoader,
    };

    fn compose(loaders: Vec<Arc<dyn Loader>>) -> ComposedLoader {
        let composed = ComposedLoader::new();
        composed.set_loaders(loaders);
        composed
    }

    /// `[Base, Override]` where Override is registered last.
    fn base_and_override() -> (Arc<StubLoader>, Arc<StubLoader>, ComposedLoader) {
        let base = Arc::new(StubLoader::new("base").with("greeting", "en", "hi"));
        let over = Arc::new(
            StubLoader::new("override")
                .with("greeting", "en", "hello")
                .with("farewell", "en", "bye")
                .claiming(Claim::All),
        );
        let composed = compose(vec![base.clone(), over.clone()]);
        (base, over, composed)
    }

    fn values(flat: &FlattenLocaleTree) -> HashMap<String, String> {
        flat.iter()
            .map(|(key, node)| {
                (key.clone(), node.value(Some("en")).unwrap_or_default().to_string())
            })
            .collect()
    }

    fn recorder(composed: &ComposedLoader) -> (Arc<Mutex<Vec<String>>>, Subscription) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let subscription =
            composed.emitter().subscribe(move |src| sink.lock().unwrap().push(src.to_string()));
        (events, subscription)
    }

    #[googletest::test]
    fn later_loader_wins_in_flat_merge() {
        let (_, _, composed) = base_and_override();

        let flat = composed.flatten_locale_tree();

        let expected = HashMap::from([
            ("greeting".to_string(), "hello".to_string()),
            ("farewell".to_string(), "bye".to_string()),
        ]);
        assert_eq!(values(&flat), expected);
    }

    #[googletest::test]
    fn base_only_keys_survive_merge() {
        let base = StubLoader::new("base").with("only.base", "en", "B").into_arc();
        let over = StubLoader::new("override").with("only.over", "en", "O").into_arc();
        let composed = compose(vec![base, over]);

        let flat = composed.flatten_locale_tree();

        expect_that!(flat.len(), eq(2));
        expect_that!(composed.get_value_by_key("only.base", Some("en"), 0, None), some(eq("B")));
    }

    #[googletest::test]
    fn point_lookups_agree_with_bulk_merge() {
        let (_, _, composed) = base_and_override();

        let flat = composed.flatten_locale_tree();
        let merged = flat.get("greeting").and_then(|node| node.value(Some("en")));

        expect_that!(merged, some(eq("hello")));
        expect_that!(composed.get_value_by_key("greeting", Some("en"), 0, None), some(eq("hello")));
        let node = composed.get_tree_node_by_key("greeting", None).unwrap();
        expect_that!(node.as_node().and_then(|n| n.value(Some("en"))), some(eq("hello")));
    }

    #[googletest::test]
    fn consecutive_lookups_do_not_reorder_loaders() {
        let (_, _, composed) = base_and_override();
        let order = |c: &ComposedLoader| -> Vec<String> {
            c.loaders().iter().map(|l| l.name().to_string()).collect()
        };

        let before = order(&composed);
        let first = composed.get_value_by_key("greeting", Some("en"), 0, None);
        let second = composed.get_value_by_key("greeting", Some("en"), 0, None);
        let third = composed.get_filepath_by_key("greeting", None);
        let fourth = composed.get_filepath_by_key("greeting", None);

        assert_eq!(first, second);
        assert_eq!(third, fourth);
        assert_eq!(order(&composed), before);
        assert_eq!(before, vec!["base", "override"]);
        let reversed: Vec<String> =
            composed.loaders_reversed().iter().map(|l| l.name().to_string()).collect();
        assert_eq!(reversed, vec!["override", "base"]);
        assert_eq!(order(&composed), before);
    }

    #[googletest::test]
    fn flat_view_is_cached_until_a_child_changes() {
        let (base, over, composed) = base_and_override();

        let first = composed.flatten_locale_tree();
        let second = composed.flatten_locale_tree();

        expect_that!(Arc::ptr_eq(&first, &second), eq(true));
        expect_that!(base.flatten_calls(), eq(1));
        expect_that!(over.flatten_calls(), eq(1));
    }

    #[googletest::test]
    fn child_change_invalidates_cache_once() {
        let (base, _, composed) = base_and_override();
        let stale = composed.flatten_locale_tree();

        base.set("newcomer", "en", "new");
        base.set("newcomer", "en", "newer");
        let fresh = composed.flatten_locale_tree();
        let again = composed.flatten_locale_tree();

        expect_that!(Arc::ptr_eq(&stale, &fresh), eq(false));
        expect_that!(Arc::ptr_eq(&fresh, &again), eq(true));
        expect_that!(stale.contains_key("newcomer"), eq(false));
        expect_that!(fresh.get("newcomer").and_then(|n| n.value(Some("en"))), some(eq("newer")));
        expect_that!(base.flatten_calls(), eq(2));
    }

    #[googletest::test]
    fn replacing_loaders_drops_old_subscriptions() {
        let (base, over, composed) = base_and_override();
        let replacement = Arc::new(StubLoader::new("replacement").with("greeting", "en", "yo"));

        composed.set_loaders(vec![replacement.clone()]);

        expect_that!(base.emitter().listener_count(), eq(0));
        expect_that!(over.emitter().listener_count(), eq(0));
        expect_that!(replacement.emitter().listener_count(), eq(1));
        expect_that!(
            composed.flatten_locale_tree().get("greeting").and_then(|n| n.value(Some("en"))),
            some(eq("yo"))
        );
    }

    #[googletest::test]
    fn set_loaders_is_lazy() {
        let base = Arc::new(StubLoader::new("base").with("a", "en", "A"));

        let composed = compose(vec![base.clone()]);

        expect_that!(base.flatten_calls(), eq(0));
        expect_that!(composed.flatten_locale_tree().len(), eq(1));
        expect_that!(base.flatten_calls(), eq(1));
    }

    #[googletest::test]
    fn child_change_is_rebroadcast_with_origin() {
        let (base, _, composed) = base_and_override();
        let (events, _subscription) = recorder(&composed);

        base.set("x", "en", "X");

        assert_eq!(*events.lock().unwrap(), vec!["base+[Composed]"]);
    }

    #[googletest::test]
    fn translator_and_manual_fire_are_rebroadcast() {
        let (_, _, composed) = base_and_override();
        let translator = ChangeEmitter::new();
        composed.bind_translator(&translator);
        let (events, _subscription) = recorder(&composed);

        translator.fire("translator");
        composed.fire(None);
        composed.fire(Some("manual"));

        assert_eq!(*events.lock().unwrap(), vec!["[Composed]", "[Composed]", "manual"]);
    }

    #[googletest::test]
    fn merged_root_is_a_shallow_overlay() {
        let base = StubLoader::new("base")
            .with("page.title", "en", "Title")
            .with("page.body", "en", "Body")
            .with("menu", "en", "Menu")
            .into_arc();
        let over = StubLoader::new("override").with("page.title", "en", "Better title").into_arc();
        let composed = compose(vec![base, over]);

        let root = composed.root();

        expect_that!(root.keypath, eq(""));
        expect_that!(root.children.len(), eq(2));
        let page = root.children.get("page").and_then(TreeEntry::as_tree).unwrap();
        // the override's `page` replaced the base's, so `page.body` is gone
        expect_that!(page.children.contains_key("body"), eq(false));
        let title = root.find("page.title", ".").unwrap();
        expect_that!(title.as_node().and_then(|n| n.value(Some("en"))), some(eq("Better title")));
    }

    #[googletest::test]
    fn locales_are_a_deduplicated_union() {
        let a = StubLoader::new("a").with("k", "en", "K").with("k", "fr", "K").into_arc();
        let b = StubLoader::new("b").with("k", "fr", "K").with("k", "ja", "K").into_arc();
        let composed = compose(vec![a, b]);

        assert_eq!(composed.locales(), vec!["en", "fr", "ja"]);
    }

    #[googletest::test]
    fn files_concatenate_children() {
        let (_, _, composed) = base_and_override();

        assert_eq!(
            composed.files(),
            vec![PathBuf::from("/base.json"), PathBuf::from("/override.json")]
        );
    }

    #[googletest::test]
    fn shadow_path_comes_from_highest_priority_source() {
        let composed = compose(vec![StubLoader::new("a").into_arc()]);

        expect_that!(composed.get_shadow_file_path("greeting", "fr"), none());
    }

    #[rstest]
    #[case::prefix_owner("admin.title", Some("admin"))]
    #[case::catch_all("page.title", Some("site"))]
    fn distribute_picks_first_claim_in_priority_order(
        #[case] keypath: &str,
        #[case] expected_owner: Option<&str>,
    ) {
        let site = StubLoader::new("site").claiming(Claim::All).into_arc();
        let admin = StubLoader::new("admin").claiming(Claim::Prefix("admin.".into())).into_arc();
        let composed = compose(vec![site, admin]);

        let distribution = composed.distribute(vec![PendingWrite::new(keypath, "v", "en")]);

        let owners: Vec<&str> = distribution.batches.iter().map(|(l, _)| l.name()).collect();
        assert_eq!(owners.first().copied(), expected_owner);
        assert_eq!(owners.len(), 1);
        assert!(distribution.unhandled.is_empty());
    }

    #[googletest::test]
    fn distribute_prefers_loader_storing_the_locale() {
        let base = StubLoader::new("base")
            .with("title", "en", "Base")
            .with("title", "fr", "Titre")
            .claiming(Claim::All)
            .into_arc();
        let over = StubLoader::new("override")
            .with("title", "en", "Override")
            .claiming(Claim::All)
            .into_arc();
        let composed = compose(vec![base, over]);

        let distribution = composed.distribute(vec![
            PendingWrite::new("title", "Titre modifié", "fr"),
            PendingWrite::new("title", "Changed", "en"),
            PendingWrite::new("title", "Titel", "de"),
        ]);

        let owners: Vec<(&str, Vec<&str>)> = distribution
            .batches
            .iter()
            .map(|(l, batch)| (l.name(), batch.iter().map(|p| p.locale.as_str()).collect()))
            .collect();
        assert_eq!(owners, vec![("override", vec!["en", "de"]), ("base", vec!["fr"])]);
    }

    #[googletest::test]
    fn storing_loader_must_still_claim_the_write() {
        let base = StubLoader::new("base").with("title", "fr", "Titre").into_arc();
        let over = StubLoader::new("override").claiming(Claim::All).into_arc();
        let composed = compose(vec![base, over]);

        let distribution = composed.distribute(vec![PendingWrite::new("title", "T", "fr")]);

        let owners: Vec<&str> = distribution.batches.iter().map(|(l, _)| l.name()).collect();
        assert_eq!(owners, vec!["override"]);
    }

    #[googletest::test]
    fn shadow_path_points_at_existing_record_first() {
        let base = StubLoader::new("base")
            .with_file("title", "fr", "Titre", "/base/fr.json")
            .into_arc();
        let over = StubLoader::new("override")
            .with_file("title", "en", "Override", "/override/en.json")
            .into_arc();
        let composed = compose(vec![base, over]);

        assert_eq!(
            composed.get_shadow_file_path("title", "fr"),
            Some(PathBuf::from("/base/fr.json"))
        );
        assert_eq!(composed.get_shadow_file_path("title", "de"), None);
    }

    #[googletest::test]
    fn node_lookup_scans_highest_priority_first() {
        let (_, _, composed) = base_and_override();

        let node = composed.get_node_by_key("greeting").unwrap();

        expect_that!(node.value(Some("en")), some(eq("hello")));
        expect_that!(composed.get_node_by_key("missing"), none());
    }

    #[googletest::test]
    fn key_by_value_prefers_highest_priority_match() {
        let base = StubLoader::new("base").with("a.label", "en", "Save").into_arc();
        let over = StubLoader::new("override").with("z.label", "en", "Save").into_arc();
        let composed = compose(vec![base, over]);

        expect_that!(composed.get_key_by_value("Save", Some("en")), some(eq("z.label")));
        expect_that!(composed.get_key_by_value("Cancel", Some("en")), none());
    }

    #[tokio::test]
    async fn write_goes_only_to_the_owning_loader() {
        let (base, over, composed) = base_and_override();
        let pending = PendingWrite::new("greeting", "hey", "en");

        composed.write(vec![pending.clone()]).await.unwrap();

        assert!(base.batches().is_empty());
        assert_eq!(over.batches(), vec![vec![pending]]);
    }

    #[tokio::test]
    async fn write_groups_pendings_per_owner() {
        let site = Arc::new(StubLoader::new("site").claiming(Claim::All));
        let admin = Arc::new(StubLoader::new("admin").claiming(Claim::Prefix("admin.".into())));
        let composed = compose(vec![site.clone(), admin.clone()]);

        composed
            .write(vec![
                PendingWrite::new("admin.a", "1", "en"),
                PendingWrite::new("page.b", "2", "en"),
                PendingWrite::new("admin.c", "3", "en"),
            ])
            .await
            .unwrap();

        let admin_batches = admin.batches();
        assert_eq!(admin_batches.len(), 1);
        let admin_keys: Vec<&str> = admin_batches[0].iter().map(|p| p.keypath.as_str()).collect();
        assert_eq!(admin_keys, vec!["admin.a", "admin.c"]);
        assert_eq!(site.batches().len(), 1);
        assert_eq!(site.batches()[0][0].keypath, "page.b");
    }

    #[tokio::test]
    async fn unhandled_write_is_dropped_without_error() {
        let base = Arc::new(StubLoader::new("base"));
        let over = Arc::new(StubLoader::new("override"));
        let composed = compose(vec![base.clone(), over.clone()]);
        let pending = PendingWrite::new("orphan", "x", "en");

        let distribution = composed.distribute(vec![pending.clone()]);
        let result = composed.write(vec![pending.clone()]).await;

        assert!(result.is_ok());
        assert_eq!(distribution.unhandled, vec![pending]);
        assert!(distribution.batches.is_empty());
        assert!(base.batches().is_empty());
        assert!(over.batches().is_empty());
    }

    #[tokio::test]
    async fn failing_loader_does_not_block_siblings() {
        let broken = Arc::new(
            StubLoader::new("broken").claiming(Claim::Prefix("broken.".into())).failing(),
        );
        let healthy = Arc::new(StubLoader::new("healthy").claiming(Claim::Prefix("ok.".into())));
        let composed = compose(vec![broken.clone(), healthy.clone()]);

        let pendings =
            vec![PendingWrite::new("broken.a", "1", "en"), PendingWrite::new("ok.b", "2", "en")];

        let result = composed.write(pendings).await;

        let Err(LoaderError::WriteFailures(failures)) = result else {
            panic!("expected write failures");
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].loader, "broken");
        assert_eq!(healthy.get_value_by_key("ok.b", Some("en"), 0, None).as_deref(), Some("2"));
        assert_eq!(broken.get_value_by_key("broken.a", Some("en"), 0, None), None);
    }

    #[tokio::test]
    async fn batches_are_written_concurrently() {
        // Both writes must be in flight at once to pass the barrier.
        let barrier = Arc::new(Barrier::new(2));
        let a = Arc::new(
            StubLoader::new("a").claiming(Claim::Prefix("a.".into())).waiting_on(barrier.clone()),
        );
        let b = Arc::new(
            StubLoader::new("b").claiming(Claim::Prefix("b.".into())).waiting_on(barrier),
        );
        let composed = compose(vec![a.clone(), b.clone()]);

        let write = composed
            .write(vec![PendingWrite::new("a.x", "1", "en"), PendingWrite::new("b.y", "2", "en")]);
        let result = tokio::time::timeout(Duration::from_secs(5), write).await;

        assert!(matches!(result, Ok(Ok(()))));
        assert_eq!(a.batches().len(), 1);
        assert_eq!(b.batches().len(), 1);
    }

    #[tokio::test]
    async fn write_triggered_change_invalidates_cache() {
        let (_, over, composed) = base_and_override();
        let (events, _subscription) = recorder(&composed);
        let before = composed.flatten_locale_tree();

        composed.write_one(PendingWrite::new("greeting", "hey", "en")).await.unwrap();
        let after = composed.flatten_locale_tree();

        assert_eq!(before.get("greeting").and_then(|n| n.value(Some("en"))), Some("hello"));
        assert_eq!(after.get("greeting").and_then(|n| n.value(Some("en"))), Some("hey"));
        assert_eq!(*events.lock().unwrap(), vec!["override+[Composed]"]);
        assert_eq!(over.batches().len(), 1);
    }

    #[googletest::test]
    fn nested_composition_is_transparent() {
        let (_, _, inner) = base_and_override();
        let extra = StubLoader::new("extra").with("greeting", "en", "howdy").into_arc();
        let outer = compose(vec![Arc::new(inner), extra]);

        expect_that!(outer.get_value_by_key("greeting", Some("en"), 0, None), some(eq("howdy")));
        expect_that!(outer.get_value_by_key("farewell", Some("en"), 0, None), some(eq("bye")));
        expect_that!(outer.flatten_locale_tree().len(), eq(2));
    }
}
