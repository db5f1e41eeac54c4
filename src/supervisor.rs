// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Supervision
//!
//! The supervisor maintains exactly one healthy connection, transparently
//! to its dependents. Connect attempts are retried at a fixed interval with
//! no retry ceiling: brokers are assumed to eventually recover, so infinite
//! retry is the documented policy rather than an accident. An unexpected
//! connection close triggers reconnection; a caller-initiated [`close`]
//! suppresses it and is terminal.
//!
//! Dependents register an [`on_connect`] hook that runs on every successful
//! (re)connect. Channel state never survives a reconnect, so hooks are
//! where publishers and workers recreate their channel and topology.
//!
//! [`close`]: ConnectionSupervisor::close
//! [`on_connect`]: ConnectionSupervisor::on_connect

use crate::transport::{Transport, TransportConnection};
use futures_util::future::BoxFuture;
use std::{
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};
use tokio::{sync::watch, time::sleep};
use tracing::{debug, error, info, warn};

/// Callback invoked with the live connection on every (re)connect.
pub type ConnectHook =
    Arc<dyn Fn(Arc<dyn TransportConnection>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Lifecycle states of the supervised connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No connection and no attempt in flight.
    Disconnected,
    /// A connect attempt is outstanding.
    Connecting,
    /// The connection is usable; dependents may open channels.
    Connected,
    /// Terminal: `close()` was called, no further attempts.
    Closed,
}

/// Owns the reconnect state machine and the single live connection.
pub struct ConnectionSupervisor {
    transport: Arc<dyn Transport>,
    url: String,
    reconnect_delay: Duration,
    state_tx: watch::Sender<SupervisorState>,
    close_tx: watch::Sender<bool>,
    hooks: Mutex<Vec<ConnectHook>>,
    current: RwLock<Option<Arc<dyn TransportConnection>>>,
}

impl ConnectionSupervisor {
    pub fn new(
        transport: Arc<dyn Transport>,
        url: &str,
        reconnect_delay: Duration,
    ) -> ConnectionSupervisor {
        let (state_tx, _) = watch::channel(SupervisorState::Disconnected);
        let (close_tx, _) = watch::channel(false);

        ConnectionSupervisor {
            transport,
            url: url.to_owned(),
            reconnect_delay,
            state_tx,
            close_tx,
            hooks: Mutex::new(vec![]),
            current: RwLock::new(None),
        }
    }

    /// Starts the supervision loop on the current runtime.
    pub(crate) fn spawn(self: &Arc<Self>) {
        let supervisor = self.clone();
        tokio::spawn(async move { supervisor.run().await });
    }

    pub fn state(&self) -> SupervisorState {
        *self.state_tx.borrow()
    }

    /// Watch for state transitions, e.g. to await `Connected`.
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    /// Registers a hook invoked on every (re)connect, in registration
    /// order. A hook registered while already connected runs immediately
    /// with the live connection.
    pub async fn on_connect(&self, hook: ConnectHook) {
        self.hooks.lock().unwrap().push(hook.clone());

        let current = self.current.read().unwrap().clone();
        if let Some(conn) = current {
            hook(conn).await;
        }
    }

    /// Closes the active connection and suppresses reconnection. Returns
    /// true when this call performed the close; later calls are no-ops.
    pub async fn close(&self) -> bool {
        if self.close_tx.send_replace(true) {
            return false;
        }

        let conn = self.current.write().unwrap().take();
        if let Some(conn) = conn {
            let _ = conn.close().await;
        }
        true
    }

    async fn run(self: Arc<Self>) {
        let mut close_rx = self.close_tx.subscribe();

        loop {
            if *close_rx.borrow_and_update() {
                break;
            }
            self.state_tx.send_replace(SupervisorState::Connecting);

            let conn = match self.transport.connect(&self.url).await {
                Ok(conn) => conn,
                Err(err) => {
                    error!(error = err.to_string(), "failure to connect, retrying");
                    tokio::select! {
                        _ = sleep(self.reconnect_delay) => continue,
                        _ = wait_flag(&mut close_rx) => break,
                    }
                }
            };

            info!("amqp connected");
            *self.current.write().unwrap() = Some(conn.clone());
            self.state_tx.send_replace(SupervisorState::Connected);

            let hooks = self.hooks.lock().unwrap().clone();
            for hook in hooks {
                hook(conn.clone()).await;
            }

            tokio::select! {
                _ = conn.wait_close() => {
                    if *close_rx.borrow() {
                        break;
                    }
                    warn!("connection closed, reconnecting");
                    self.current.write().unwrap().take();
                    self.state_tx.send_replace(SupervisorState::Disconnected);
                    tokio::select! {
                        _ = sleep(self.reconnect_delay) => {},
                        _ = wait_flag(&mut close_rx) => break,
                    }
                }
                _ = wait_flag(&mut close_rx) => {
                    let stale = self.current.write().unwrap().take();
                    if let Some(stale) = stale {
                        let _ = stale.close().await;
                    }
                    break;
                }
            }
        }

        self.current.write().unwrap().take();
        self.state_tx.send_replace(SupervisorState::Closed);
        debug!("supervisor stopped");
    }
}

async fn wait_flag(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
