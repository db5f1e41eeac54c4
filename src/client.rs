// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Client Composition Root
//!
//! A [`Client`] wires one supervised connection to any number of publishers
//! and workers. Create it with a broker URL, hand out publishers, register
//! workers, close it when done:
//!
//! ```ignore
//! let client = Client::create("amqp://localhost");
//!
//! let publisher = client.publisher().await;
//! publisher.publish("jobs", "jobs", "Hello World!");
//!
//! client
//!     .worker(
//!         "jobs",
//!         WorkerConfig::default(),
//!         handler_fn(|msg| async move {
//!             println!("got {}", msg.text());
//!             true
//!         }),
//!     )
//!     .await;
//! ```

use crate::{
    channel::LapinTransport,
    publisher::Publisher,
    supervisor::{ConnectionSupervisor, SupervisorState},
    transport::Transport,
    worker::{MessageHandler, Worker, WorkerConfig},
};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;

/// Client-level configuration.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Interval between reconnect attempts. There is deliberately no
    /// retry ceiling; brokers are assumed to eventually recover.
    pub reconnect_delay: Duration,
}

impl Default for ClientOptions {
    fn default() -> ClientOptions {
        ClientOptions {
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

/// A messaging client over one supervised broker connection.
pub struct Client {
    supervisor: Arc<ConnectionSupervisor>,
}

impl Client {
    /// Creates a client for the given broker URL and starts connecting.
    /// Must be called within a tokio runtime.
    pub fn create(url: &str) -> Client {
        Client::create_with(url, ClientOptions::default())
    }

    /// Creates a client with explicit options.
    pub fn create_with(url: &str, options: ClientOptions) -> Client {
        Client::with_transport(LapinTransport::new(), url, options)
    }

    /// Creates a client over a custom transport. This is also the seam the
    /// test suite drives an in-memory broker through.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        url: &str,
        options: ClientOptions,
    ) -> Client {
        let supervisor = Arc::new(ConnectionSupervisor::new(
            transport,
            url,
            options.reconnect_delay,
        ));
        supervisor.spawn();

        Client { supervisor }
    }

    /// Creates a publisher with its own confirm channel and offline buffer.
    pub async fn publisher(&self) -> Publisher {
        Publisher::attach(&self.supervisor).await
    }

    /// Registers a worker consuming `queue`. Chainable; registration never
    /// fails, the worker (re)starts with every connection.
    pub async fn worker(
        &self,
        queue: &str,
        config: WorkerConfig,
        handler: Arc<dyn MessageHandler>,
    ) -> &Client {
        Worker::attach(&self.supervisor, queue, config, handler).await;
        self
    }

    /// Current lifecycle state of the underlying connection.
    pub fn state(&self) -> SupervisorState {
        self.supervisor.state()
    }

    /// Watch lifecycle transitions, e.g. to await the first connect.
    pub fn state_changes(&self) -> watch::Receiver<SupervisorState> {
        self.supervisor.subscribe()
    }

    /// Closes the connection and suppresses reconnection. Returns true
    /// when this call performed the close; later calls are no-ops.
    pub async fn close(&self) -> bool {
        self.supervisor.close().await
    }
}
