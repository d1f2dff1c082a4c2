//! 設定管理を行うモジュール

use std::path::{
    Path,
    PathBuf,
};

use super::{
    ConfigError,
    I18nSettings,
    discovery,
    loader,
};

/// 設定管理を行う
#[derive(Default, Debug, Clone)]
pub struct ConfigManager {
    /// 現在の設定
    current_settings: I18nSettings,

    /// ワークスペースのルートパス
    workspace_root: Option<PathBuf>,
}

impl ConfigManager {
    /// 新しい設定マネージャーを作成
    #[must_use]
    pub fn new() -> Self {
        Self { current_settings: I18nSettings::default(), workspace_root: None }
    }

    /// 設定を読み込む
    ///
    /// # Errors
    /// - ファイル読み込みエラー
    /// - JSON パースエラー
    /// - バリデーションエラー
    pub fn load_settings(&mut self, workspace_root: Option<PathBuf>) -> Result<(), ConfigError> {
        tracing::debug!("Loading settings for workspace: {:?}", workspace_root);

        let settings = if let Some(root) = &workspace_root {
            loader::load_from_workspace(root)?.map_or_else(I18nSettings::default, |ws| {
                tracing::debug!("Loaded workspace settings: {:?}", ws);
                ws
            })
        } else {
            I18nSettings::default()
        };

        settings.validate().map_err(ConfigError::ValidationErrors)?;

        self.current_settings = settings;
        self.workspace_root = workspace_root;
        tracing::debug!("Settings loaded successfully: {:?}", self.current_settings);

        Ok(())
    }

    /// 設定を更新する
    ///
    /// # Errors
    /// バリデーションエラー。この場合、現在の設定は変更されない
    pub fn update_settings(&mut self, new_settings: I18nSettings) -> Result<(), ConfigError> {
        tracing::debug!("Updating settings...");

        new_settings.validate().map_err(ConfigError::ValidationErrors)?;

        self.current_settings = new_settings;
        tracing::debug!("Settings updated successfully");

        Ok(())
    }

    /// 現在の設定を取得
    #[must_use]
    pub const fn get_settings(&self) -> &I18nSettings {
        &self.current_settings
    }

    /// ワークスペースルートを取得
    #[must_use]
    pub fn workspace_root(&self) -> Option<&Path> {
        self.workspace_root.as_deref()
    }

    /// ロケールディレクトリの絶対パスを優先度の低い順に返す
    ///
    /// `localesPaths` が空の場合は `src/` 配下から検出する。
    /// ワークスペースルートがない場合、相対パスはそのまま返す。
    #[must_use]
    pub fn locales_paths(&self) -> Vec<PathBuf> {
        let root = self.workspace_root.as_deref();
        let relative: Vec<PathBuf> = if self.current_settings.locales_paths.is_empty() {
            root.map(discovery::discover_locale_dirs).unwrap_or_default()
        } else {
            self.current_settings.locales_paths.iter().map(PathBuf::from).collect()
        };

        relative
            .into_iter()
            .map(|path| match root {
                Some(root) if path.is_relative() => root.join(path),
                _ => path,
            })
            .collect()
    }
}
