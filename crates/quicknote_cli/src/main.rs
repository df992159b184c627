//! QuickNote terminal client.
//!
//! # Responsibility
//! - Layer configuration: file, environment, then flags.
//! - Pick the backend (REST service or local SQLite) and run the shell.

mod app;
mod commands;

use anyhow::{anyhow, Context, Result};
use app::{App, Flow, TerminalDelivery};
use clap::{Parser, ValueEnum};
use log::info;
use quicknote_core::{
    init_logging, log_dir_for, ClientConfig, DocumentStore, FileCredentialStore, HttpBackend,
    IdentityProvider, LocalIdentityProvider, SqliteDocumentStore,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const DATA_DIR_NAME: &str = "quicknote";
const LOCAL_DB_FILE: &str = "quicknote.sqlite3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// REST document service.
    Http,
    /// SQLite file in the data directory; codes are printed to stderr.
    Local,
}

#[derive(Debug, Parser)]
#[command(
    name = "quicknote",
    version,
    about = "Passwordless notes from the terminal"
)]
struct Cli {
    /// JSON config file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Backend::Http)]
    backend: Backend,

    /// Overrides `api_base_url`.
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Directory for logs, credentials and the local database.
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    fn load_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_json_file(path)?,
            None => ClientConfig::default(),
        };
        config.apply_env()?;
        if let Some(url) = &self.api_url {
            config.api_base_url = url.clone();
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = Some(dir.clone());
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    let data_dir = resolve_data_dir(config.data_dir.as_deref())?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create `{}`", data_dir.display()))?;
    init_logging(&config.log_level, &log_dir_for(&data_dir)).map_err(|err| anyhow!(err))?;
    info!(
        "event=cli_start module=cli status=ok backend={:?} collection={}",
        cli.backend, config.collection
    );

    let (identity, store) = connect(cli.backend, &config, &data_dir)?;
    let app = App::new(identity, store, &config.collection);
    app.start().await;
    run_shell(&app).await?;

    info!("event=cli_exit module=cli status=ok");
    Ok(())
}

fn connect(
    backend: Backend,
    config: &ClientConfig,
    data_dir: &Path,
) -> Result<(Arc<dyn IdentityProvider>, Arc<dyn DocumentStore>)> {
    match backend {
        Backend::Http => {
            let http = Arc::new(HttpBackend::new(
                config,
                FileCredentialStore::in_dir(data_dir),
            )?);
            let identity: Arc<dyn IdentityProvider> = http.clone();
            let store: Arc<dyn DocumentStore> = http;
            Ok((identity, store))
        }
        Backend::Local => {
            let db_path = data_dir.join(LOCAL_DB_FILE);
            let local = LocalIdentityProvider::open(&db_path, Arc::new(TerminalDelivery))?;
            let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::sharing(&local));
            let identity: Arc<dyn IdentityProvider> = Arc::new(local);
            Ok((identity, store))
        }
    }
}

async fn run_shell(app: &App) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(&app.prompt())?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let command = match commands::parse(&line) {
            Ok(command) => command,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };

        match app.handle(command).await {
            Flow::Continue => {}
            Flow::Quit => break,
            Flow::ConfirmDelete(note) => {
                prompt(&format!("delete \"{}\"? [y/N] ", note.title))?;
                let answer = lines.next_line().await?.unwrap_or_default();
                if commands::is_yes(&answer) {
                    app.delete_confirmed(&note.id).await;
                } else {
                    println!("kept");
                }
            }
        }
    }
    Ok(())
}

fn prompt(text: &str) -> Result<()> {
    print!("{text}");
    std::io::stdout().flush()?;
    Ok(())
}

/// Configured directory made absolute, else the platform data directory.
fn resolve_data_dir(configured: Option<&Path>) -> Result<PathBuf> {
    match configured {
        Some(dir) if dir.is_absolute() => Ok(dir.to_path_buf()),
        Some(dir) => Ok(std::env::current_dir()?.join(dir)),
        None => dirs::data_dir()
            .map(|base| base.join(DATA_DIR_NAME))
            .ok_or_else(|| anyhow!("no platform data directory; pass --data-dir")),
    }
}
