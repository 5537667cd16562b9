#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};

mod bot;
mod cli;
mod config;
mod db;
mod parsers;
mod slack;
mod utils;
mod web;

use bot::{ChatTransport, StandupBot};
use cli::{Cli, Commands};
use config::Config;
use slack::{SlackClient, SlashCommandHandler};
use web::WebServer;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from_file(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    utils::logging::init_tracing(&config.logging);

    if cli.command == Some(Commands::ValidateConfig) {
        info!("configuration at {} is valid", cli.config.display());
        return Ok(());
    }

    let config = Arc::new(config);
    web::metrics::Metrics::init();
    info!("slack standup bot starting up");

    let db_manager = Arc::new(
        db::DatabaseManager::new(&config.database)
            .await
            .context("failed to open database")?,
    );
    db_manager
        .migrate()
        .await
        .context("failed to migrate database")?;

    if cli.command == Some(Commands::Migrate) {
        info!("database schema is up to date");
        return Ok(());
    }

    let (event_tx, event_rx) = mpsc::channel(config.limits.event_buffer);
    let slack_client = Arc::new(SlackClient::new(config.clone(), event_tx)?);
    let transport: Arc<dyn ChatTransport> = slack_client.clone();

    let standup_bot = StandupBot::new(&config, &db_manager, transport);
    let commands = Arc::new(SlashCommandHandler::new(&db_manager));
    let web_server = WebServer::new(config.clone(), db_manager.clone(), commands);

    let bot_handle = tokio::spawn(standup_bot.run(event_rx));

    let web_handle = tokio::spawn(async move {
        if let Err(e) = web_server.start().await {
            error!("web server error: {}", e);
        }
    });

    let slack_task_client = slack_client.clone();
    let slack_handle = tokio::spawn(async move {
        if let Err(e) = slack_task_client.start().await {
            error!("slack client error: {:#}", e);
            return;
        }
        slack_task_client.wait().await;
    });

    tokio::pin!(bot_handle);
    tokio::pin!(web_handle);
    tokio::pin!(slack_handle);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, beginning shutdown");
        },
        _ = &mut bot_handle => {
            info!("standup bot task exited, beginning shutdown");
        },
        _ = &mut web_handle => {
            info!("web server task exited, beginning shutdown");
        },
        _ = &mut slack_handle => {
            info!("slack task exited, beginning shutdown");
        },
    }

    slack_handle.abort();
    web_handle.abort();

    if let Err(err) = slack_client.stop().await {
        error!("slack shutdown error: {}", err);
    }
    bot_handle.abort();

    info!("slack standup bot shutting down");
    Ok(())
}
