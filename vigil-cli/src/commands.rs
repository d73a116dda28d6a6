//! CLI subcommand handlers.

use crate::ConfigAction;
use crate::Commands;
use crate::watch::{self, WatchKey};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vigil_core::config::{self, VigilConfig};
use vigil_core::feed::FeedMode;
use vigil_core::{FeedClient, GatewayServer};

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Serve { host, port, seed } => {
            let mut config = load(workspace)?;
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if seed.is_some() {
                config.gateway.seed = seed;
            }
            config.validate()?;
            handle_serve(config).await
        }
        Commands::Watch {
            url,
            poll,
            threatmap,
            limit,
        } => {
            let mut config = load(workspace)?;
            if let Some(url) = url {
                config.feed.server_url = url;
            }
            if poll {
                config.feed.mode = FeedMode::Polling;
            }
            if threatmap {
                config.feed.stream_path = "/api/threatmap".to_string();
            }
            config.validate()?;
            handle_watch(config, limit).await
        }
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn load(workspace: &Path) -> anyhow::Result<VigilConfig> {
    config::load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            match config::init_workspace_config(workspace)? {
                Some(path) => println!("Created default configuration at: {}", path.display()),
                None => println!(
                    "Configuration file already exists at: {}",
                    config::workspace_config_path(workspace).display()
                ),
            }
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(workspace)?;
            println!("{}", config::to_toml(&config)?);
            Ok(())
        }
    }
}

async fn handle_serve(config: VigilConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
        }
        signal.cancel();
    });

    let gateway = Arc::new(Mutex::new(GatewayServer::new(config.gateway)));
    vigil_core::gateway::run_gateway(gateway, shutdown).await?;
    Ok(())
}

async fn handle_watch(config: VigilConfig, limit: usize) -> anyhow::Result<()> {
    let target = match config.feed.mode {
        FeedMode::Stream => config.feed.stream_url(),
        FeedMode::Polling => config.feed.server_url.clone(),
    };
    println!("{}", watch::banner(&target, config.feed.mode));

    let mut client = FeedClient::new(config.feed);
    let mut updates = client.subscribe();
    let mut conn = client.connect().await;
    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(update) => {
                    if let Some(line) = watch::render_update(&update) {
                        println!("{}", line);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Display fell behind the feed");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            line = stdin.next_line() => {
                let Ok(Some(line)) = line else { break };
                match WatchKey::parse(&line) {
                    Some(WatchKey::Pause) => {
                        client.toggle_pause().await;
                    }
                    Some(WatchKey::Clear) => {
                        client.clear().await;
                    }
                    Some(WatchKey::Reconnect) => {
                        conn = client.reconnect().await;
                    }
                    Some(WatchKey::Status) => {
                        println!("{}", watch::render_status(&client.snapshot().await, limit));
                    }
                    Some(WatchKey::Quit) => break,
                    None => println!("{}", watch::HELP),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.disconnect(conn).await;
    Ok(())
}
