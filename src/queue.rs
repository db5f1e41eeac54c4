// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Options
//!
//! Durability flags applied when a worker declares its queue. Queues are
//! durable by default so messages survive a broker restart; callers needing
//! dead-lettering configure it at the broker binding level.

use serde::Deserialize;

/// Options for a queue declaration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueueOptions {
    /// Whether the queue survives a broker restart.
    pub durable: bool,
    /// Whether the queue is exclusive to the declaring connection.
    pub exclusive: bool,
    /// Whether the queue is deleted once the last consumer disconnects.
    pub auto_delete: bool,
}

impl Default for QueueOptions {
    fn default() -> QueueOptions {
        QueueOptions {
            durable: true,
            exclusive: false,
            auto_delete: false,
        }
    }
}

impl QueueOptions {
    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    pub fn auto_delete(mut self, auto_delete: bool) -> Self {
        self.auto_delete = auto_delete;
        self
    }
}
