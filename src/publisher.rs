// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Confirm-Mode Publisher
//!
//! This module provides the publisher side of the client. Every message
//! goes through the offline buffer and is replayed through a confirm-mode
//! channel, so a publish call never fails to the caller and never blocks on
//! broker availability: while disconnected messages simply accumulate in
//! the buffer (observable through [`Publisher::buffered`]) and are replayed
//! in FIFO order after the next successful reconnect.
//!
//! Confirmation is authoritative: a message is re-buffered only on a
//! pre-send failure or an explicit negative confirmation, never after the
//! broker confirmed it.

use crate::{
    buffer::{PendingMessage, PublishBuffer},
    errors::AmqpError,
    supervisor::ConnectionSupervisor,
    transport::{HeaderValue, TransportChannel, TransportConnection},
};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};
use tracing::{debug, error};

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Per-message publish options.
///
/// `persistent` defaults to true so messages survive a broker restart
/// unless the caller opts out.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub persistent: bool,
    pub headers: BTreeMap<String, HeaderValue>,
    pub message_type: Option<String>,
    pub content_type: Option<String>,
}

impl Default for PublishOptions {
    fn default() -> PublishOptions {
        PublishOptions {
            persistent: true,
            headers: BTreeMap::new(),
            message_type: None,
            content_type: None,
        }
    }
}

impl PublishOptions {
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// An outbound message body.
///
/// Raw bytes and text pass through untouched; structured values are
/// serialized to JSON and stamped with the JSON content type as part of the
/// publish contract.
#[derive(Debug, Clone)]
pub struct Payload {
    pub(crate) bytes: Vec<u8>,
    pub(crate) content_type: Option<&'static str>,
}

impl Payload {
    /// Serializes any `Serialize` value into a JSON payload.
    pub fn json<T: Serialize>(value: &T) -> Result<Payload, AmqpError> {
        let bytes = serde_json::to_vec(value).map_err(|err| {
            error!(error = err.to_string(), "failure to serialize payload");
            AmqpError::ParsePayloadError
        })?;

        Ok(Payload {
            bytes,
            content_type: Some(JSON_CONTENT_TYPE),
        })
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Payload {
        Payload {
            bytes,
            content_type: None,
        }
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Payload {
        bytes.to_vec().into()
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Payload {
        text.as_bytes().into()
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Payload {
        text.into_bytes().into()
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Payload {
        Payload {
            bytes: value.to_string().into_bytes(),
            content_type: Some(JSON_CONTENT_TYPE),
        }
    }
}

/// Publishes messages with broker-level delivery confirmation and automatic
/// replay across reconnects. Cheap to clone; clones share the channel and
/// buffer.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

struct PublisherInner {
    channel: RwLock<Option<Arc<dyn TransportChannel>>>,
    buffer: PublishBuffer,
}

impl Publisher {
    /// Creates a publisher and registers its channel setup with the
    /// supervisor, to run on every (re)connect.
    pub(crate) async fn attach(supervisor: &ConnectionSupervisor) -> Publisher {
        let publisher = Publisher {
            inner: Arc::new(PublisherInner {
                channel: RwLock::new(None),
                buffer: PublishBuffer::new(),
            }),
        };

        let hooked = publisher.clone();
        supervisor
            .on_connect(Arc::new(move |conn| {
                let publisher = hooked.clone();
                Box::pin(async move { publisher.setup(conn).await })
            }))
            .await;

        publisher
    }

    async fn setup(&self, conn: Arc<dyn TransportConnection>) {
        match conn.create_confirm_channel().await {
            Ok(channel) => {
                *self.inner.channel.write().unwrap() = Some(channel);
                debug!("publish channel ready");
                self.flush().await;
            }
            Err(err) => {
                error!(
                    error = err.to_string(),
                    "failure to create the publish channel"
                );
                let _ = conn.close().await;
            }
        }
    }

    /// Publishes a message with default options (`persistent: true`).
    ///
    /// Fire-and-forget: the call returns immediately, delivery is retried
    /// across reconnects until the broker confirms it.
    pub fn publish(&self, exchange: &str, routing_key: &str, payload: impl Into<Payload>) {
        self.publish_with(exchange, routing_key, payload, PublishOptions::default())
    }

    /// Publishes a message with explicit options.
    pub fn publish_with(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: impl Into<Payload>,
        options: PublishOptions,
    ) {
        let payload = payload.into();
        let mut options = options;
        if options.content_type.is_none() {
            options.content_type = payload.content_type.map(str::to_owned);
        }

        self.inner.buffer.append(PendingMessage {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            body: payload.bytes,
            options,
        });

        if self.inner.channel.read().unwrap().is_some() {
            let publisher = self.clone();
            tokio::spawn(async move { publisher.flush().await });
        }
    }

    /// Replays every buffered message through the live channel, stopping at
    /// the first failure. A no-op without a channel.
    pub async fn flush(&self) {
        let channel = self.inner.channel.read().unwrap().clone();
        if let Some(channel) = channel {
            self.inner.buffer.drain_into(channel.as_ref()).await;
        }
    }

    /// Number of messages waiting for a confirmed publish. Grows while the
    /// broker is unreachable; the only caller-visible degradation signal.
    pub fn buffered(&self) -> usize {
        self.inner.buffer.len()
    }
}
