// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Worker Topology
//!
//! Declares the exchange/queue/binding topology a worker consumes from.
//! The install runs on every (re)connect since channel state does not
//! survive a reconnect, and every step is idempotent at the broker:
//! redeclaring the same queue or exchange and re-adding an identical
//! binding never errors and never duplicates routing.

use crate::{
    errors::AmqpError,
    exchange::Binding,
    transport::TransportChannel,
    worker::WorkerConfig,
};
use std::collections::BTreeMap;
use tracing::debug;

/// The topology of one worker: its queue plus the configured exchange and
/// bindings.
pub struct WorkerTopology<'tp> {
    queue: &'tp str,
    config: &'tp WorkerConfig,
}

impl<'tp> WorkerTopology<'tp> {
    pub fn new(queue: &'tp str, config: &'tp WorkerConfig) -> WorkerTopology<'tp> {
        WorkerTopology { queue, config }
    }

    /// Declares the queue, then the exchange and its bindings when one is
    /// configured. Publishing to the default exchange routes directly by
    /// queue name, so an empty exchange needs no binding at all.
    pub async fn install(&self, channel: &dyn TransportChannel) -> Result<(), AmqpError> {
        debug!(queue = self.queue, "declaring queue");
        channel
            .declare_queue(self.queue, &self.config.queue_options)
            .await?;

        if self.config.exchange.is_empty() {
            return Ok(());
        }

        debug!(
            exchange = self.config.exchange.as_str(),
            kind = self.config.exchange_type.as_str(),
            "declaring exchange"
        );
        channel
            .declare_exchange(
                &self.config.exchange,
                self.config.exchange_type,
                &self.config.exchange_options,
            )
            .await?;

        for binding in self.bindings() {
            let (pattern, args) = match &binding {
                Binding::RoutingKey(key) => (key.as_str(), BTreeMap::new()),
                Binding::HeaderMatch { pattern, args } => (pattern.as_str(), args.clone()),
            };

            debug!(
                queue = self.queue,
                exchange = self.config.exchange.as_str(),
                pattern = pattern,
                "binding queue"
            );
            channel
                .bind_queue(self.queue, &self.config.exchange, pattern, &args)
                .await?;
        }

        Ok(())
    }

    /// The configured bindings, defaulting to the queue name as a routing
    /// key when the config names an exchange but no bindings.
    fn bindings(&self) -> Vec<Binding> {
        match &self.config.bindings {
            Some(bindings) => bindings.clone(),
            None => vec![Binding::routing_key(self.queue)],
        }
    }
}
