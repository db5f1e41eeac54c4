// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Lapin Transport
//!
//! The production implementation of the transport contract over `lapin`.
//! This is the only module that touches the wire library: it maps the
//! trait calls onto lapin connections and channels, converts header maps
//! both directions, awaits publisher confirmations, and pumps the consumer
//! stream into an mpsc receiver.

use crate::{
    errors::AmqpError,
    exchange::{ExchangeKind, ExchangeOptions},
    publisher::PublishOptions,
    queue::QueueOptions,
    transport::{Acker, Delivery, HeaderValue, Message, Transport, TransportChannel, TransportConnection},
};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    publisher_confirm::Confirmation,
    types::{AMQPValue, FieldTable, LongString, ShortString},
    BasicProperties, Connection, ConnectionProperties,
};
use std::{
    collections::BTreeMap,
    sync::Arc,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Heartbeat negotiated with the broker when the URL carries none.
pub const HEARTBEAT_SECS: u64 = 60;

const CLOSE_REPLY_SUCCESS: u16 = 200;

/// [`Transport`] implementation over `lapin`.
#[derive(Default)]
pub struct LapinTransport;

impl LapinTransport {
    pub fn new() -> Arc<LapinTransport> {
        Arc::new(LapinTransport)
    }
}

#[async_trait]
impl Transport for LapinTransport {
    async fn connect(&self, url: &str) -> Result<Arc<dyn TransportConnection>, AmqpError> {
        debug!("creating amqp connection...");
        let uri = if url.contains('?') {
            url.to_owned()
        } else {
            format!("{url}?heartbeat={HEARTBEAT_SECS}")
        };

        let options = ConnectionProperties::default()
            .with_connection_name(LongString::from(env!("CARGO_PKG_NAME")));

        let conn = match Connection::connect(&uri, options).await {
            Ok(conn) => conn,
            Err(err) => {
                error!(error = err.to_string(), "failure to connect");
                return Err(AmqpError::ConnectionError);
            }
        };
        debug!("amqp connected");

        let (closed_tx, closed_rx) = watch::channel(false);
        let closed_tx = Arc::new(closed_tx);

        // Brokers emit error then close; lapin surfaces the terminal error
        // here, which is what ends wait_close for the supervisor.
        let on_error = closed_tx.clone();
        conn.on_error(move |err| {
            error!(error = err.to_string(), "connection error");
            let _ = on_error.send(true);
        });

        Ok(Arc::new(LapinConnection {
            inner: conn,
            closed_tx,
            closed_rx,
        }))
    }
}

struct LapinConnection {
    inner: Connection,
    closed_tx: Arc<watch::Sender<bool>>,
    closed_rx: watch::Receiver<bool>,
}

impl LapinConnection {
    async fn open(&self) -> Result<lapin::Channel, AmqpError> {
        debug!("creating amqp channel...");
        match self.inner.create_channel().await {
            Ok(channel) => {
                debug!("channel created");
                Ok(channel)
            }
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                Err(AmqpError::ChannelError)
            }
        }
    }
}

#[async_trait]
impl TransportConnection for LapinConnection {
    async fn create_channel(&self) -> Result<Arc<dyn TransportChannel>, AmqpError> {
        let channel = self.open().await?;
        Ok(Arc::new(LapinChannel { inner: channel }))
    }

    async fn create_confirm_channel(&self) -> Result<Arc<dyn TransportChannel>, AmqpError> {
        let channel = self.open().await?;

        if let Err(err) = channel.confirm_select(ConfirmSelectOptions::default()).await {
            error!(error = err.to_string(), "error to enable confirm mode");
            return Err(AmqpError::ChannelError);
        }

        Ok(Arc::new(LapinChannel { inner: channel }))
    }

    async fn wait_close(&self) {
        let mut rx = self.closed_rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    async fn close(&self) -> Result<(), AmqpError> {
        if let Err(err) = self.inner.close(CLOSE_REPLY_SUCCESS, "closing").await {
            // Closing an already-dead connection is not an error here.
            debug!(error = err.to_string(), "close on inactive connection");
        }
        let _ = self.closed_tx.send(true);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.inner.status().connected()
    }
}

struct LapinChannel {
    inner: lapin::Channel,
}

#[async_trait]
impl TransportChannel for LapinChannel {
    async fn qos(&self, prefetch: u16) -> Result<(), AmqpError> {
        self.inner
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "failure to configure qos");
                AmqpError::QoSDeclarationError(err.to_string())
            })
    }

    async fn declare_queue(&self, queue: &str, options: &QueueOptions) -> Result<(), AmqpError> {
        self.inner
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    passive: false,
                    durable: options.durable,
                    exclusive: options.exclusive,
                    auto_delete: options.auto_delete,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
            .map_err(|err| {
                error!(
                    error = err.to_string(),
                    queue = queue,
                    "error to declare the queue"
                );
                AmqpError::DeclareQueueError(queue.to_owned())
            })?;

        Ok(())
    }

    async fn declare_exchange(
        &self,
        exchange: &str,
        kind: ExchangeKind,
        options: &ExchangeOptions,
    ) -> Result<(), AmqpError> {
        self.inner
            .exchange_declare(
                exchange,
                kind.into(),
                ExchangeDeclareOptions {
                    passive: false,
                    durable: options.durable,
                    auto_delete: options.auto_delete,
                    internal: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
            .map_err(|err| {
                error!(
                    error = err.to_string(),
                    exchange = exchange,
                    "error to declare the exchange"
                );
                AmqpError::DeclareExchangeError(exchange.to_owned())
            })
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
        args: &BTreeMap<String, HeaderValue>,
    ) -> Result<(), AmqpError> {
        self.inner
            .queue_bind(
                queue,
                exchange,
                pattern,
                QueueBindOptions { nowait: false },
                FieldTable::from(amqp_field_map(args)),
            )
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error to bind queue to exchange");
                AmqpError::BindingError(exchange.to_owned(), queue.to_owned())
            })
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        options: &PublishOptions,
    ) -> Result<(), AmqpError> {
        let delivery_mode: u8 = if options.persistent { 2 } else { 1 };
        let mut properties = BasicProperties::default()
            .with_delivery_mode(delivery_mode)
            .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
            .with_headers(FieldTable::from(amqp_field_map(&options.headers)));

        if let Some(content_type) = &options.content_type {
            properties = properties.with_content_type(ShortString::from(content_type.as_str()));
        }
        if let Some(message_type) = &options.message_type {
            properties = properties.with_type(ShortString::from(message_type.as_str()));
        }

        let confirm = self
            .inner
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                body,
                properties,
            )
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error publishing message");
                AmqpError::PublishingError
            })?
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error awaiting publish confirm");
                AmqpError::PublishingError
            })?;

        match confirm {
            Confirmation::Nack(_) => {
                warn!("publish negatively confirmed by the broker");
                Err(AmqpError::PublishRejected)
            }
            _ => Ok(()),
        }
    }

    async fn consume(
        &self,
        queue: &str,
        tag: &str,
    ) -> Result<mpsc::Receiver<Delivery>, AmqpError> {
        let mut consumer = self
            .inner
            .basic_consume(
                queue,
                tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error to create the consumer");
                AmqpError::ConsumerError(queue.to_owned())
            })?;

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            while let Some(result) = consumer.next().await {
                match result {
                    Ok(delivery) => {
                        let message = Message {
                            exchange: delivery.exchange.to_string(),
                            routing_key: delivery.routing_key.to_string(),
                            headers: header_map(delivery.properties.headers().as_ref()),
                            redelivered: delivery.redelivered,
                            body: delivery.data,
                        };
                        let acker = Arc::new(LapinAcker {
                            inner: delivery.acker,
                        });

                        if tx.send(Delivery::new(message, acker)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        error!(error = err.to_string(), "consumer stream error");
                        break;
                    }
                }
            }
            debug!("lapin consumer stream ended");
        });

        Ok(rx)
    }

    fn is_open(&self) -> bool {
        self.inner.status().connected()
    }
}

struct LapinAcker {
    inner: lapin::acker::Acker,
}

#[async_trait]
impl Acker for LapinAcker {
    async fn ack(&self) -> Result<(), AmqpError> {
        self.inner
            .ack(BasicAckOptions { multiple: false })
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error whiling ack msg");
                AmqpError::AckMessageError
            })
    }

    async fn reject(&self, requeue: bool) -> Result<(), AmqpError> {
        self.inner
            .reject(BasicRejectOptions { requeue })
            .await
            .map_err(|err| {
                error!(error = err.to_string(), "error whiling reject msg");
                AmqpError::NackMessageError
            })
    }
}

fn amqp_field_map(headers: &BTreeMap<String, HeaderValue>) -> BTreeMap<ShortString, AMQPValue> {
    let mut fields = BTreeMap::new();

    for (key, value) in headers {
        let amqp_value = match value {
            HeaderValue::Text(text) => AMQPValue::LongString(LongString::from(text.as_str())),
            HeaderValue::Int(num) => AMQPValue::LongLongInt(*num),
            HeaderValue::Uint(num) => AMQPValue::LongUInt(*num),
            HeaderValue::Bool(flag) => AMQPValue::Boolean(*flag),
        };
        fields.insert(ShortString::from(key.as_str()), amqp_value);
    }

    fields
}

fn header_map(table: Option<&FieldTable>) -> BTreeMap<String, HeaderValue> {
    let mut headers = BTreeMap::new();
    let Some(table) = table else {
        return headers;
    };

    for (key, value) in table.inner() {
        let header = match value {
            AMQPValue::LongString(text) => HeaderValue::Text(text.to_string()),
            AMQPValue::ShortString(text) => HeaderValue::Text(text.to_string()),
            AMQPValue::LongLongInt(num) => HeaderValue::Int(*num),
            AMQPValue::LongInt(num) => HeaderValue::Int(i64::from(*num)),
            AMQPValue::ShortInt(num) => HeaderValue::Int(i64::from(*num)),
            AMQPValue::LongUInt(num) => HeaderValue::Uint(*num),
            AMQPValue::Boolean(flag) => HeaderValue::Bool(*flag),
            other => {
                debug!(
                    key = key.to_string(),
                    value = format!("{other:?}"),
                    "skipping header of unsupported type"
                );
                continue;
            }
        };
        headers.insert(key.to_string(), header);
    }

    headers
}
