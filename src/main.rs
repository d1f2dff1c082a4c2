//! Command-line entry point: loads a workspace and reports on its locale data.
//!
//! Usage: `i18n-compose [workspace-root] [get <keypath> [locale]]`

use std::path::PathBuf;
use std::process::ExitCode;

use i18n_compose::Loader;
use i18n_compose::config::ConfigManager;
use i18n_compose::workspace::Workspace;

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout stays free for callers.
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (root, command) = match args.split_first() {
        Some((first, rest)) if first != "get" => (PathBuf::from(first), rest),
        _ => (PathBuf::from("."), args.as_slice()),
    };

    let mut config = ConfigManager::new();
    if let Err(error) = config.load_settings(Some(root)) {
        tracing::error!("{error}");
        return ExitCode::FAILURE;
    }
    let workspace = match Workspace::load(&config).await {
        Ok(workspace) => workspace,
        Err(error) => {
            tracing::error!("{error}");
            return ExitCode::FAILURE;
        }
    };

    let loader = workspace.loader();
    match command {
        [] => {
            tracing::info!(
                locales = ?loader.locales(),
                files = loader.files().len(),
                keys = loader.flatten_locale_tree().len(),
                "Locale data"
            );
        }
        [get, keypath, rest @ ..] if get == "get" && rest.len() <= 1 => {
            let locale = rest.first().map(String::as_str);
            let Some(value) = workspace.lookup(keypath, locale) else {
                tracing::error!(%keypath, "Key not found");
                return ExitCode::FAILURE;
            };
            let file = loader.get_filepath_by_key(keypath, locale);
            tracing::info!(%keypath, %value, file = ?file, "Resolved");
        }
        _ => {
            tracing::error!("Usage: i18n-compose [workspace-root] [get <keypath> [locale]]");
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}
