// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Resilient AMQP messaging client: a supervised connection that reconnects
//! on its own, a confirm-mode publisher that buffers while offline, and
//! acknowledging queue workers. See [`Client`] for the entry point.

mod consumer;

pub mod buffer;
pub mod channel;
pub mod client;
pub mod errors;
pub mod exchange;
pub mod publisher;
pub mod queue;
pub mod supervisor;
pub mod topology;
pub mod transport;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use client::{Client, ClientOptions};
pub use errors::AmqpError;
pub use exchange::{Binding, ExchangeKind, ExchangeOptions};
pub use publisher::{Payload, PublishOptions, Publisher};
pub use queue::QueueOptions;
pub use supervisor::SupervisorState;
pub use transport::{HeaderValue, Message};
pub use worker::{handler_fn, MessageHandler, WorkerConfig};
