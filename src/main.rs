//! Task Manager Server
//!
//! HTTP backend for multi-user task tracking with parent/child supervision
//! between accounts.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use task_manager::api::{AppState, start_server};
use task_manager::cli::{Cli, Command};
use task_manager::config::Config;
use task_manager::db::Database;
use task_manager::logging::{self, LogOutput};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, config_path) = Config::discover(cli.config.as_deref().map(Path::new))?;

    // CLI flags override file and environment
    if let Some(db_path) = &cli.database {
        config.server.db_path = db_path.into();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let directive = logging::filter_directive(&config.logging.level, cli.verbose);
    logging::init(&LogOutput::parse(&cli.log), &directive)?;

    config.validate()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::CheckConfig => {
            let mut shown = config.clone();
            shown.auth.jwt_secret = "<redacted>".to_string();
            if let Some(path) = &config_path {
                println!("# loaded from {}", path.display());
            }
            print!("{}", serde_yaml::to_string(&shown)?);
            Ok(())
        }
        Command::Serve => serve(config, config_path.as_deref()).await,
    }
}

async fn serve(config: Config, config_path: Option<&Path>) -> Result<()> {
    info!(
        stage = ?config.server.stage,
        config = ?config_path,
        log_level = %config.logging.level,
        relation_policy = %config.auth.relation_policy,
        "Starting task manager"
    );

    config.ensure_db_dir()?;
    let db = Arc::new(
        Database::open(&config.server.db_path)
            .with_context(|| format!("opening database {}", config.server.db_path.display()))?,
    );
    info!(path = %config.server.db_path.display(), "Database ready");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let state = AppState::from_config(db, &config);
    let handle = start_server(state, addr, &config.server.cors_origins).await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    handle.shutdown().await;

    Ok(())
}
