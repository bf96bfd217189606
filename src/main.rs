// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use homepoll::server::{AppState, StaticSessions, build_router};
use homepoll::types::UserId;
use homepoll::{DeviceSync, MemoryStore, SyncConfig};

#[derive(Parser)]
#[command(name = "homepoll", version, about = "Long-poll device synchronization server")]
struct Args {
    /// Listen address
    #[arg(long, default_value = "0.0.0.0:8080", env = "LISTEN_ADDR")]
    addr: SocketAddr,

    /// Seconds a device stays online after each contact
    #[arg(long, default_value_t = 120, env = "HEARTBEAT_TTL_SECS")]
    heartbeat_ttl_secs: u64,

    /// Upper bound on a long-poll wait in seconds (0 waits without bound)
    #[arg(long, default_value_t = 60, env = "LONGPOLL_TIMEOUT_SECS")]
    longpoll_timeout_secs: u64,

    /// JSON snapshot loaded at startup and written on shutdown
    #[arg(long, env = "SNAPSHOT_PATH")]
    snapshot: Option<PathBuf>,

    /// Session grant as TOKEN=USER_ID (repeatable)
    #[arg(long = "session", value_parser = parse_session)]
    sessions: Vec<(String, UserId)>,

    /// Hardware type name as ID=TITLE (repeatable)
    #[arg(long = "device-type", value_parser = parse_device_type)]
    device_types: Vec<(u32, String)>,

    /// Seconds in-flight requests get to finish after a shutdown signal
    #[arg(long, default_value_t = 10, env = "SHUTDOWN_GRACE_SECS")]
    shutdown_grace_secs: u64,
}

fn parse_session(raw: &str) -> Result<(String, UserId), String> {
    let (token, user) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected TOKEN=USER_ID, got {raw:?}"))?;
    if token.is_empty() {
        return Err("empty token".to_string());
    }
    let user = user
        .parse()
        .map_err(|_| format!("invalid user id {user:?}"))?;
    Ok((token.to_string(), user))
}

fn parse_device_type(raw: &str) -> Result<(u32, String), String> {
    let (id, title) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ID=TITLE, got {raw:?}"))?;
    let id = id
        .parse()
        .map_err(|_| format!("invalid device type id {id:?}"))?;
    Ok((id, title.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let args = Args::parse();

    let records = Arc::new(match &args.snapshot {
        Some(path) => MemoryStore::load_snapshot(path)?,
        None => MemoryStore::new(),
    });

    let config = args.device_types.iter().fold(
        SyncConfig::default().with_heartbeat_ttl(Duration::from_secs(args.heartbeat_ttl_secs)),
        |config, (id, title)| config.with_device_type(*id, title.clone()),
    );
    let config = if args.longpoll_timeout_secs == 0 {
        config.without_longpoll_timeout()
    } else {
        config.with_longpoll_timeout(Duration::from_secs(args.longpoll_timeout_secs))
    };

    let sessions = args
        .sessions
        .into_iter()
        .fold(StaticSessions::new(), |sessions, (token, user)| {
            sessions.with_session(token, user)
        });
    info!(
        addr = %args.addr,
        sessions = sessions.len(),
        longpoll_timeout = ?config.longpoll_timeout,
        "Starting homepoll"
    );

    let sync = Arc::new(DeviceSync::new(records.clone(), config));
    let app = build_router(AppState::new(Arc::clone(&sync), Arc::new(sessions)));

    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let mut server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.changed().await;
            })
            .into_future(),
    );

    tokio::select! {
        joined = &mut server => joined??,
        () = shutdown_signal() => {
            // Pending long-polls would otherwise hold the drain open.
            sync.bus().close_all();
            let _ = stop_tx.send(true);
            let grace = Duration::from_secs(args.shutdown_grace_secs);
            match tokio::time::timeout(grace, &mut server).await {
                Ok(joined) => joined??,
                Err(_) => {
                    warn!(grace_secs = args.shutdown_grace_secs, "Drain deadline passed");
                    server.abort();
                }
            }
        }
    }

    if let Some(path) = &args.snapshot
        && let Err(err) = records.save_snapshot(path)
    {
        warn!(path = %path.display(), error = %err, "Failed to save snapshot");
        return Err(err.into());
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
    }
    info!("Shutting down");
}
