// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the AMQP Client
//!
//! This module provides the error types for the resilient AMQP client.
//! The `AmqpError` enum represents all failure scenarios that can occur during
//! connection, channel, topology, publishing and message handling operations.
//!
//! Connection- and channel-level faults are recovered internally (retry,
//! channel recreation, publish buffering) and never surface to application
//! code through `publish` or worker registration.

use thiserror::Error;

/// Represents errors that can occur during AMQP operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// Error establishing a connection to the broker
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a queue to an exchange
    #[error("failure to bind queue `{1}` to exchange `{0}`")]
    BindingError(String, String),

    /// Error starting a consumer on a queue
    #[error("failure to start consumer on queue `{0}`")]
    ConsumerError(String),

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// The broker negatively confirmed a publish
    #[error("publish was negatively confirmed by the broker")]
    PublishRejected,

    /// Error serializing or parsing a message payload
    #[error("failure to parse payload")]
    ParsePayloadError,

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error negative-acknowledging a message
    #[error("failure to nack message")]
    NackMessageError,

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// A binding entry of unrecognized shape
    #[error("unrecognized binding spec `{0}`")]
    InvalidBindingSpec(String),
}
