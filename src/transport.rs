// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Transport Contract
//!
//! This module defines the narrow interface the client consumes from the
//! wire-protocol implementation: connecting, opening plain and confirm-mode
//! channels, declaring topology, publishing with confirmation and consuming
//! with explicit acknowledgement. Everything above this seam (supervisor,
//! publisher, worker) only ever sees these traits, which keeps the reconnect
//! and buffering logic independent of the broker library.
//!
//! The production implementation over `lapin` lives in [`crate::channel`].

use crate::{
    errors::AmqpError,
    exchange::{ExchangeKind, ExchangeOptions},
    publisher::PublishOptions,
    queue::QueueOptions,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::{borrow::Cow, collections::BTreeMap, sync::Arc};
use tracing::error;

/// Opens connections to a broker endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a new connection. A failed attempt is retried by the
    /// [`crate::supervisor::ConnectionSupervisor`], never by the transport.
    async fn connect(&self, url: &str) -> Result<Arc<dyn TransportConnection>, AmqpError>;
}

/// One live session with the broker.
///
/// The connection is owned by the supervisor and handed to dependents as a
/// capability to create channels; only the supervisor drives its lifecycle.
#[async_trait]
pub trait TransportConnection: Send + Sync {
    /// Creates a plain channel for consuming.
    async fn create_channel(&self) -> Result<Arc<dyn TransportChannel>, AmqpError>;

    /// Creates a channel in publisher-confirm mode.
    async fn create_confirm_channel(&self) -> Result<Arc<dyn TransportChannel>, AmqpError>;

    /// Resolves once the connection is no longer usable, whether the broker
    /// closed it or [`TransportConnection::close`] was called locally.
    async fn wait_close(&self);

    /// Closes the connection. Idempotent.
    async fn close(&self) -> Result<(), AmqpError>;

    /// Whether the connection is currently usable.
    fn is_open(&self) -> bool;
}

/// One logical channel over a connection.
#[async_trait]
pub trait TransportChannel: Send + Sync {
    /// Bounds the number of unacknowledged deliveries in flight.
    async fn qos(&self, prefetch: u16) -> Result<(), AmqpError>;

    /// Declares a queue. Redeclaring with identical options is a no-op at
    /// the broker.
    async fn declare_queue(&self, queue: &str, options: &QueueOptions) -> Result<(), AmqpError>;

    /// Declares an exchange. Redeclaring with identical options is a no-op
    /// at the broker.
    async fn declare_exchange(
        &self,
        exchange: &str,
        kind: ExchangeKind,
        options: &ExchangeOptions,
    ) -> Result<(), AmqpError>;

    /// Binds a queue to an exchange. `args` carries the header-match
    /// criteria for headers-type exchanges and is empty otherwise.
    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
        args: &BTreeMap<String, HeaderValue>,
    ) -> Result<(), AmqpError>;

    /// Publishes one message. On a confirm-mode channel this resolves only
    /// after the broker confirmation; a negative confirmation is
    /// [`AmqpError::PublishRejected`].
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        options: &PublishOptions,
    ) -> Result<(), AmqpError>;

    /// Starts consuming with manual acknowledgement, yielding deliveries
    /// through the returned receiver. The stream ends when the channel or
    /// its connection dies.
    async fn consume(
        &self,
        queue: &str,
        tag: &str,
    ) -> Result<tokio::sync::mpsc::Receiver<Delivery>, AmqpError>;

    /// Whether the channel is currently usable.
    fn is_open(&self) -> bool;
}

/// Settles one delivery with the broker.
#[async_trait]
pub trait Acker: Send + Sync {
    /// Acknowledges the delivery, removing it from the broker queue.
    async fn ack(&self) -> Result<(), AmqpError>;

    /// Negatively acknowledges the delivery, requeueing it for redelivery
    /// when `requeue` is true.
    async fn reject(&self, requeue: bool) -> Result<(), AmqpError>;
}

/// A header value carried by a message or a header-match binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Text(String),
    Int(i64),
    Uint(u32),
    Bool(bool),
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Text(value.to_owned())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Text(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Int(value)
    }
}

impl From<u32> for HeaderValue {
    fn from(value: u32) -> Self {
        HeaderValue::Uint(value)
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Bool(value)
    }
}

/// One message as handed to a worker handler.
#[derive(Debug, Clone)]
pub struct Message {
    /// Exchange the message was published to. Empty for the default exchange.
    pub exchange: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// Raw message body.
    pub body: Vec<u8>,
    /// Message headers.
    pub headers: BTreeMap<String, HeaderValue>,
    /// Whether the broker already delivered this message before.
    pub redelivered: bool,
}

impl Message {
    /// The body decoded as UTF-8 text.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Deserializes a JSON body into a typed value.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, AmqpError> {
        serde_json::from_slice(&self.body).map_err(|err| {
            error!(error = err.to_string(), "failure to parse message payload");
            AmqpError::ParsePayloadError
        })
    }
}

/// One delivery from the broker: the message plus its settlement handle.
pub struct Delivery {
    pub(crate) message: Message,
    pub(crate) acker: Arc<dyn Acker>,
}

impl Delivery {
    pub fn new(message: Message, acker: Arc<dyn Acker>) -> Delivery {
        Delivery { message, acker }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }
}
