// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Acknowledging Worker
//!
//! A worker consumes one queue with bounded in-flight concurrency and
//! explicit ack/nack semantics, re-establishing its exchange/queue/binding
//! topology on every reconnect. The caller supplies a [`MessageHandler`];
//! returning `true` acknowledges the delivery, `false` negatively
//! acknowledges it with requeue so the broker redelivers (to this or
//! another worker). Handlers run concurrently up to the prefetch limit and
//! may complete out of order.
//!
//! Any setup failure closes the connection so the supervisor rebuilds it;
//! worker registration itself never fails to the caller.

use crate::{
    consumer::process_delivery,
    errors::AmqpError,
    exchange::{Binding, ExchangeKind, ExchangeOptions},
    queue::QueueOptions,
    supervisor::ConnectionSupervisor,
    topology::WorkerTopology,
    transport::{Message, TransportConnection},
};
use async_trait::async_trait;
use serde::Deserialize;
use std::{future::Future, sync::Arc};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Max unacknowledged deliveries in flight per worker. Bounds memory and
/// processing concurrency and provides backpressure against the broker.
pub const DEFAULT_PREFETCH: u16 = 10;

/// Processes one delivery. Returning `true` acknowledges the message,
/// `false` negatively acknowledges it with requeue.
///
/// Handlers are expected to be idempotent: a redelivery after a reconnect
/// or a `false` outcome re-processes the same logical message.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message) -> bool;
}

struct HandlerFn<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for HandlerFn<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send,
{
    async fn handle(&self, message: Message) -> bool {
        (self.0)(message).await
    }
}

/// Wraps an async closure into a [`MessageHandler`].
pub fn handler_fn<F, Fut>(handler: F) -> Arc<dyn MessageHandler>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    Arc::new(HandlerFn(handler))
}

/// Configuration of one worker. Immutable after the worker starts.
///
/// Deserializes from the JSON shape `{ "exchange", "exchangeType",
/// "exchangeOptions", "bindings" }`; binding entries of unrecognized shape
/// are skipped with a warning rather than failing the whole config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkerConfig {
    /// Exchange to bind the queue to. Empty selects the default exchange,
    /// which routes by queue name with no binding.
    pub exchange: String,
    pub exchange_type: ExchangeKind,
    pub exchange_options: ExchangeOptions,
    /// Bindings for the queue; `None` defaults to the queue name as a
    /// routing key.
    #[serde(deserialize_with = "Binding::deserialize_specs")]
    pub bindings: Option<Vec<Binding>>,
    pub queue_options: QueueOptions,
}

impl WorkerConfig {
    pub fn new() -> WorkerConfig {
        WorkerConfig::default()
    }

    pub fn exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    pub fn exchange_type(mut self, kind: ExchangeKind) -> Self {
        self.exchange_type = kind;
        self
    }

    pub fn exchange_options(mut self, options: ExchangeOptions) -> Self {
        self.exchange_options = options;
        self
    }

    pub fn binding(mut self, binding: Binding) -> Self {
        self.bindings.get_or_insert_with(Vec::new).push(binding);
        self
    }

    pub fn queue_options(mut self, options: QueueOptions) -> Self {
        self.queue_options = options;
        self
    }
}

/// One consuming worker; owns its channel and topology per connection.
pub(crate) struct Worker {
    queue: String,
    config: WorkerConfig,
    handler: Arc<dyn MessageHandler>,
}

impl Worker {
    /// Registers a worker with the supervisor; its setup runs on every
    /// (re)connect.
    pub(crate) async fn attach(
        supervisor: &ConnectionSupervisor,
        queue: &str,
        config: WorkerConfig,
        handler: Arc<dyn MessageHandler>,
    ) {
        let worker = Arc::new(Worker {
            queue: queue.to_owned(),
            config,
            handler,
        });

        supervisor
            .on_connect(Arc::new(move |conn| {
                let worker = worker.clone();
                Box::pin(async move { worker.start(conn).await })
            }))
            .await;
    }

    async fn start(&self, conn: Arc<dyn TransportConnection>) {
        if let Err(err) = self.setup(conn.clone()).await {
            error!(
                error = err.to_string(),
                queue = self.queue.as_str(),
                "worker setup failed, tearing down connection"
            );
            let _ = conn.close().await;
        }
    }

    async fn setup(&self, conn: Arc<dyn TransportConnection>) -> Result<(), AmqpError> {
        let channel = conn.create_channel().await?;
        channel.qos(DEFAULT_PREFETCH).await?;

        WorkerTopology::new(&self.queue, &self.config)
            .install(channel.as_ref())
            .await?;

        let tag = format!("{}-{}", self.queue, Uuid::new_v4());
        let mut deliveries = channel.consume(&self.queue, &tag).await?;
        info!(queue = self.queue.as_str(), "worker started");

        let handler = self.handler.clone();
        let queue = self.queue.clone();
        tokio::spawn(async move {
            while let Some(delivery) = deliveries.recv().await {
                tokio::spawn(process_delivery(
                    handler.clone(),
                    delivery,
                    conn.clone(),
                ));
            }
            debug!(queue = queue.as_str(), "consumer stream ended");
        });

        Ok(())
    }
}
