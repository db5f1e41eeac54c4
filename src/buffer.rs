// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Offline Publish Buffer
//!
//! An ordered holding area for messages that could not be confirmed yet:
//! published while disconnected, rejected by the transport, or negatively
//! confirmed by the broker. The buffer is drained after every successful
//! (re)connect and after every publish call, so replayed messages keep
//! their FIFO order relative to each other and new messages queue behind
//! them.
//!
//! The buffer is unbounded; callers needing backpressure observe
//! [`PublishBuffer::len`] and wrap the publisher themselves.

use crate::{publisher::PublishOptions, transport::TransportChannel};
use std::{
    collections::VecDeque,
    sync::Mutex,
};
use tracing::{debug, warn};

/// One publish attempt not yet confirmed by the broker.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub options: PublishOptions,
}

/// FIFO queue of pending messages shared by one publisher.
#[derive(Default)]
pub struct PublishBuffer {
    queue: Mutex<VecDeque<PendingMessage>>,
    // Serializes drains so replay order is never interleaved.
    drain_lock: tokio::sync::Mutex<()>,
}

impl PublishBuffer {
    pub fn new() -> PublishBuffer {
        PublishBuffer::default()
    }

    /// Adds a message to the tail of the buffer.
    pub fn append(&self, message: PendingMessage) {
        let mut queue = self.queue.lock().unwrap();
        queue.push_back(message);
        debug!(depth = queue.len(), "message buffered");
    }

    /// Number of messages awaiting a confirmed publish.
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }

    /// Replays buffered messages through `channel` in FIFO order, stopping
    /// at the first message that fails to publish. The failed message is
    /// put back at the head so order is preserved for the next drain.
    pub async fn drain_into(&self, channel: &dyn TransportChannel) {
        let _guard = self.drain_lock.lock().await;

        loop {
            let message = self.queue.lock().unwrap().pop_front();
            let Some(message) = message else { break };

            let result = channel
                .publish(
                    &message.exchange,
                    &message.routing_key,
                    &message.body,
                    &message.options,
                )
                .await;

            if let Err(err) = result {
                warn!(
                    error = err.to_string(),
                    "replay failed, keeping message buffered"
                );
                self.queue.lock().unwrap().push_front(message);
                break;
            }
        }
    }
}
