use std::fs;
use std::path::Path;

use anyhow::Context as _;
use directories::{ProjectDirs, UserDirs};
use libreria_api::ApiClient;
use libreria_application::AppContext;
use libreria_core::Settings;
use libreria_storage::Storage;
use libreria_ui::{Ui, UiExit};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Overrides the stored backend URL for this run only.
const API_URL_ENV: &str = "LIBRERIA_API_URL";
const LOG_ENV: &str = "LIBRERIA_LOG";

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let project_dirs =
        ProjectDirs::from("dev", "libreria", "libreria").context("resolve project dirs")?;

    let config_dir = project_dirs.config_dir();
    fs::create_dir_all(config_dir)
        .with_context(|| format!("create config dir {}", config_dir.display()))?;
    let _log_guard = init_logging(project_dirs.data_dir())?;

    let db_path = config_dir.join("libreria.db");
    let storage = Storage::open(&db_path)?;
    let mut settings = storage.load_settings()?;
    if fill_download_dir(&mut settings) {
        storage.save_settings(&settings)?;
    }

    let mut api_url = match std::env::var(API_URL_ENV) {
        Ok(url) if !url.trim().is_empty() => {
            tracing::info!(%url, "backend url from environment");
            url
        }
        _ => settings.api_url.clone(),
    };

    let mut ctx = AppContext::new(settings);
    loop {
        let client = ApiClient::new(&api_url)
            .with_context(|| format!("create api client for {api_url}"))?;
        let mut ui = Ui::new(ctx, client)?;
        let outcome = ui.run()?;
        ctx = outcome.ctx;
        storage.save_settings(&ctx.settings)?;

        match outcome.exit {
            UiExit::Quit => break,
            UiExit::Reconnect => {
                api_url = ctx.settings.api_url.clone();
                tracing::info!(%api_url, "reconnecting");
            }
        }
    }

    tracing::info!("bye");
    Ok(())
}

/// Daily rolling log file under the data dir. The terminal belongs to the UI,
/// so nothing is written to stderr.
fn init_logging(data_dir: &Path) -> anyhow::Result<WorkerGuard> {
    let log_dir = data_dir.join("logs");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("create log dir {}", log_dir.display()))?;
    let appender = tracing_appender::rolling::daily(&log_dir, "libreria.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!("init tracing: {err}"))?;
    Ok(guard)
}

/// Defaults an unset download dir to the user's Downloads folder.
fn fill_download_dir(settings: &mut Settings) -> bool {
    if !settings.download_dir.is_empty() {
        return false;
    }
    let Some(dir) = UserDirs::new().and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
    else {
        return false;
    };
    settings.download_dir = dir.to_string_lossy().to_string();
    true
}
