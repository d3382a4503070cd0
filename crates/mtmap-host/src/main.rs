// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// mtmap host: desktop harness for the map control bridge.
//
// Entry point. Initialises logging, loads the bridge config, attaches a
// session to the platform bridge and then speaks the command protocol as
// JSON lines: requests on stdin, replies and location events on stdout.
// Logs go to stderr so stdout stays a clean protocol stream.

mod services;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use mtmap_core::{BridgeConfig, MtMapError};
use mtmap_engine::{BridgeSession, Event};

use services::data_dir;
use services::router::Router;
use services::wire::{Inbound, Outbound};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("mtmap host starting");

    let config_path = data_dir::config_path();
    let config = BridgeConfig::load_or_default(&config_path);
    info!(path = %config_path.display(), channel = %config.channel_name, "bridge config loaded");

    let platform = mtmap_bridge::platform_bridge();
    let (session, mut events) = match BridgeSession::attach(platform, config) {
        Ok(attached) => attached,
        Err(e) => {
            error!(error = %e, "bridge session failed to attach");
            std::process::exit(1);
        }
    };
    let session = Arc::new(session);

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = out_rx.recv().await {
            let mut line = match serde_json::to_string(&message) {
                Ok(line) => line,
                Err(e) => {
                    error!(error = %e, "unserialisable outbound message");
                    continue;
                }
            };
            line.push('\n');
            if let Err(e) = stdout.write_all(line.as_bytes()).await {
                error!(error = %e, "stdout closed");
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let _ = out_tx.send(Outbound::Attached {
        session: session.id().to_string(),
        platform: session.platform_name().to_string(),
        channel: session.config().channel_name.clone(),
        view_type: session.view_type().to_string(),
    });

    let pump = {
        let out = out_tx.clone();
        let channel = session.config().channel_name.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let event = Outbound::Event {
                    channel: channel.clone(),
                    event: Event::from(event),
                };
                if out.send(event).is_err() {
                    break;
                }
            }
        })
    };

    let mut router = Router::new(Arc::clone(&session), out_tx.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut detached = false;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Inbound>(&line) {
            Ok(message) => {
                if !router.handle(message).await {
                    detached = true;
                    break;
                }
            }
            Err(e) => router.reject(&MtMapError::invalid(format!("malformed message: {e}"))),
        }
    }

    if !detached {
        router.shutdown().await;
    }
    // The session keeps the event sender alive, so the pump never ends on
    // its own.
    pump.abort();
    drop(router);
    drop(out_tx);
    if let Err(e) = writer.await {
        error!(error = %e, "stdout writer failed");
    }
    info!("mtmap host stopped");
}
