//! i18n-compose
//!
//! 複数のロケールデータソースを一つの階層ツリーとして読み書きするためのライブラリ

pub mod config;
pub mod event;
pub mod loader;
mod test_utils;
pub mod tree;
pub mod types;
pub mod workspace;

pub use event::{
    ChangeEmitter,
    Subscription,
};
pub use loader::{
    ComposedLoader,
    JsonLoader,
    Loader,
    LoaderError,
};
pub use tree::{
    FlattenLocaleTree,
    LocaleNode,
    LocaleRecord,
    LocaleTree,
    TreeEntry,
};
pub use types::PendingWrite;
pub use workspace::Workspace;
