//! ロケールディレクトリの自動検出

use std::path::{
    Path,
    PathBuf,
};

use ignore::WalkBuilder;

/// ロケールディレクトリとみなすディレクトリ名
const LOCALE_DIR_NAMES: &[&str] = &["locales", "locale", "i18n", "lang", "langs"];

/// 検出対象のルート (ワークスペースからの相対パス)
const SEARCH_ROOT: &str = "src";

/// `src/` 配下のロケールディレクトリを探す
///
/// `node_modules` は走査しない。見つかったディレクトリはワークスペースからの
/// 相対パスでソートして返す。ロケールディレクトリの中は探さない。
pub(super) fn discover_locale_dirs(workspace_root: &Path) -> Vec<PathBuf> {
    let search_root = workspace_root.join(SEARCH_ROOT);
    if !search_root.is_dir() {
        return Vec::new();
    }

    let mut found = Vec::new();
    let walker = WalkBuilder::new(&search_root)
        .hidden(false)
        .git_ignore(true)
        .follow_links(false)
        .filter_entry(|entry| entry.file_name() != "node_modules")
        .build();

    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(?err, "Failed to read directory entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_dir()) {
            continue;
        }

        let is_locale_dir = entry
            .file_name()
            .to_str()
            .is_some_and(|name| LOCALE_DIR_NAMES.contains(&name));
        if !is_locale_dir {
            continue;
        }
        // 既に見つかったディレクトリの中は対象外
        if found.iter().any(|dir: &PathBuf| entry.path().starts_with(workspace_root.join(dir))) {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(workspace_root) {
            found.push(relative.to_path_buf());
        }
    }

    found.sort();
    tracing::debug!(?found, "Discovered locale directories");
    found
}
