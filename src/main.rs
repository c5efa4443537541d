use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, BufReader};

use ragchat::api::HttpRagClient;
use ragchat::chat::{ChatController, ChatSettings};
use ragchat::cli::Repl;
use ragchat::core::config::service::insert_path;
use ragchat::core::config::{AppPaths, ConfigService};
use ragchat::core::logging;
use ragchat::session::SessionStore;

#[derive(Parser)]
#[command(
    name = "ragchat",
    version,
    about = "Chat with a RAG knowledge base from the terminal",
    long_about = None
)]
struct Cli {
    /// Backend base URL (default: http://localhost:8001)
    #[arg(long)]
    api_url: Option<String>,

    /// Query mode: basic, combined or enhanced
    #[arg(short, long)]
    mode: Option<String>,

    /// Username for the login prompt
    #[arg(short, long)]
    username: Option<String>,

    /// Number of passages to retrieve per query
    #[arg(long)]
    top_k: Option<u32>,

    /// Directory holding config.yml, the saved session and logs
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Do not store exchanges on the server
    #[arg(long)]
    no_history: bool,
}

impl Cli {
    fn overrides(&self) -> Value {
        let mut root = Map::new();
        if let Some(url) = &self.api_url {
            insert_path(&mut root, &["api", "base_url"], Value::String(url.clone()));
        }
        if let Some(mode) = &self.mode {
            insert_path(&mut root, &["query", "default_mode"], Value::String(mode.clone()));
        }
        if let Some(top_k) = self.top_k {
            insert_path(&mut root, &["query", "top_k"], Value::from(top_k));
        }
        if self.no_history {
            insert_path(&mut root, &["history", "persist"], Value::Bool(false));
        }
        Value::Object(root)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = Arc::new(match &cli.data_dir {
        Some(dir) => AppPaths::with_data_dir(dir),
        None => AppPaths::new(),
    });
    let config_service = ConfigService::new(paths.clone());
    let config = config_service
        .load_config(&cli.overrides())
        .context("Failed to load configuration")?;
    logging::init(&paths, &config.logging);

    if let Err(err) = config_service.ensure_config_file() {
        tracing::warn!("Could not write default config: {}", err);
    }

    let mode = config.default_mode()?;
    let session = SessionStore::hydrate(&paths.session_path);
    let client = HttpRagClient::new(config.api.base_url.clone(), session.clone());
    tracing::info!("Using backend at {} in {} mode", client.base_url(), mode);

    let controller = ChatController::new(
        Arc::new(client),
        session,
        ChatSettings::from_config(&config),
        mode,
    );
    controller.check_health().await;

    let password = std::env::var("RAGCHAT_PASSWORD")
        .ok()
        .filter(|password| !password.is_empty());
    let mut repl = Repl::new(controller, cli.username, password, config.history.load_limit);
    repl.run(BufReader::new(tokio::io::stdin()).lines()).await
}
