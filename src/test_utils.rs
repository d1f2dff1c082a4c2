//! テスト用ユーティリティ
//!
//! 複数のテストモジュールで使用されるインメモリのローダーを提供します。
#![cfg(test)]

use std::path::PathBuf;
use std::sync::atomic::{
    AtomicUsize,
    Ordering,
};
use std::sync::{
    Arc,
    Mutex,
    PoisonError,
};

use futures::future::BoxFuture;
use tokio::sync::Barrier;

use crate::event::ChangeEmitter;
use crate::loader::{
    Loader,
    LoaderError,
};
use crate::tree::{
    FlattenLocaleTree,
    LocaleRecord,
    LocaleTree,
};
use crate::types::PendingWrite;

/// Which pending writes a [`StubLoader`] claims.
#[derive(Debug, Clone)]
pub(crate) enum Claim {
    Nothing,
    All,
    /// Keypaths starting with the prefix
    Prefix(String),
}

/// In-memory loader recording every write batch it receives.
#[derive(Debug)]
pub(crate) struct StubLoader {
    name: String,
    tree: Mutex<LocaleTree>,
    claim: Claim,
    fail_writes: bool,
    /// Every write waits here before completing, when set
    barrier: Option<Arc<Barrier>>,
    batches: Mutex<Vec<Vec<PendingWrite>>>,
    flatten_calls: AtomicUsize,
    emitter: ChangeEmitter,
}

impl StubLoader {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tree: Mutex::new(LocaleTree::new("")),
            claim: Claim::Nothing,
            fail_writes: false,
            barrier: None,
            batches: Mutex::new(Vec::new()),
            flatten_calls: AtomicUsize::new(0),
            emitter: ChangeEmitter::new(),
        }
    }

    pub(crate) fn with(self, keypath: &str, locale: &str, value: &str) -> Self {
        self.insert(keypath, LocaleRecord::new(locale, value));
        self
    }

    pub(crate) fn with_file(self, keypath: &str, locale: &str, value: &str, file: &str) -> Self {
        self.insert(keypath, LocaleRecord::new(locale, value).with_filepath(file));
        self
    }

    pub(crate) fn claiming(mut self, claim: Claim) -> Self {
        self.claim = claim;
        self
    }

    pub(crate) const fn failing(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub(crate) fn waiting_on(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    pub(crate) fn into_arc(self) -> Arc<dyn Loader> {
        Arc::new(self)
    }

    /// Changes a value in place and notifies observers, like an edited file would.
    pub(crate) fn set(&self, keypath: &str, locale: &str, value: &str) {
        self.insert(keypath, LocaleRecord::new(locale, value));
        self.emitter.fire(&self.name);
    }

    pub(crate) fn batches(&self) -> Vec<Vec<PendingWrite>> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn flatten_calls(&self) -> usize {
        self.flatten_calls.load(Ordering::SeqCst)
    }

    fn insert(&self, keypath: &str, record: LocaleRecord) {
        let mut tree = self.tree.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(conflict) = tree.insert_record(keypath, ".", record) {
            tracing::warn!(%conflict, "Stub insert skipped");
        }
    }
}

impl Loader for StubLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn files(&self) -> Vec<PathBuf> {
        vec![PathBuf::from(format!("/{}.json", self.name))]
    }

    fn root(&self) -> Arc<LocaleTree> {
        Arc::new(self.tree.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn flatten_locale_tree(&self) -> Arc<FlattenLocaleTree> {
        self.flatten_calls.fetch_add(1, Ordering::SeqCst);
        Arc::new(self.tree.lock().unwrap_or_else(PoisonError::into_inner).flatten())
    }

    fn locales(&self) -> Vec<String> {
        let mut locales: Vec<String> = self
            .tree
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flatten()
            .values()
            .flat_map(|node| node.locales.keys().cloned())
            .collect();
        locales.sort();
        locales.dedup();
        locales
    }

    fn emitter(&self) -> &ChangeEmitter {
        &self.emitter
    }

    fn can_handle_writes(&self, pending: &PendingWrite) -> bool {
        match &self.claim {
            Claim::Nothing => false,
            Claim::All => true,
            Claim::Prefix(prefix) => pending.keypath.starts_with(prefix.as_str()),
        }
    }

    fn write(&self, pendings: Vec<PendingWrite>) -> BoxFuture<'_, Result<(), LoaderError>> {
        Box::pin(async move {
            self.batches.lock().unwrap_or_else(PoisonError::into_inner).push(pendings.clone());
            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }
            if self.fail_writes {
                return Err(LoaderError::Write {
                    path: PathBuf::from(format!("/{}.json", self.name)),
                    source: std::io::Error::other("disk full"),
                });
            }
            for pending in &pendings {
                self.insert(&pending.keypath, LocaleRecord::new(&pending.locale, &pending.value));
            }
            self.emitter.fire(&self.name);
            Ok(())
        })
    }
}
