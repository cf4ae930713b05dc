// src/server/connection_loop.rs

//! The main server loop for accepting connections and handling graceful shutdown.

use super::context::ServerContext;
use crate::connection::ConnectionHandler;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// The main server loop that accepts connections and handles graceful shutdown.
pub async fn run(mut ctx: ServerContext) {
    let mut session_id_counter: u64 = 0;
    let mut client_tasks = JoinSet::new();
    let mut server_shutdown_rx = ctx.shutdown_tx.subscribe();

    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to create SIGINT stream");
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to create SIGTERM stream");

    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }
            // SHUTDOWN command or a fatal subsystem fault.
            _ = server_shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping accept loop.");
                break;
            }

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => {
                        error!("CRITICAL: Background task failed: {}. Shutting down.", e);
                        break;
                    }
                    Err(e) => {
                        error!("CRITICAL: Background task panicked: {e:?}. Shutting down.");
                        break;
                    }
                }
            },

            res = ctx.listener.accept() => {
                match res {
                    Ok((socket, addr)) => {
                        let Ok(permit) = ctx.connection_permits.clone().try_acquire_owned() else {
                            warn!("Connection limit reached; refusing connection from {}", addr);
                            continue;
                        };

                        info!("Accepted new connection from: {}", addr);
                        ctx.state.stats.increment_total_connections();

                        session_id_counter = session_id_counter.wrapping_add(1);
                        let session_id = session_id_counter;
                        let state_clone = ctx.state.clone();
                        let shutdown_rx = ctx.shutdown_tx.subscribe();

                        client_tasks.spawn(async move {
                            let _permit = permit;
                            let mut handler = ConnectionHandler::new(
                                socket,
                                addr,
                                state_clone,
                                session_id,
                                shutdown_rx,
                            );
                            if let Err(e) = handler.run().await {
                                warn!("Connection from {} terminated unexpectedly: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                }
            },

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("A client handler panicked: {e:?}");
                }
            },
        }
    }

    info!("Shutting down. Sending signal to all tasks.");
    if ctx.shutdown_tx.send(()).is_err() {
        // Every receiver already dropped; nothing left to signal.
        info!("No background tasks were listening for shutdown.");
    }

    client_tasks.shutdown().await;
    info!("All client connections closed.");

    ctx.background_tasks.shutdown().await;
    info!("All background tasks stopped.");

    if let Some(cluster) = ctx.state.cluster.as_ref() {
        if let Err(e) = cluster.save_config() {
            warn!("Failed to save cluster config on shutdown: {}", e);
        } else {
            info!("Cluster config saved.");
        }
    }
}
