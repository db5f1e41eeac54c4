// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Shared in-memory transport fakes for the unit tests: a scripted
//! transport (connect failures, forced connection drops) with recording
//! channels and ackers.

use crate::{
    buffer::PendingMessage,
    errors::AmqpError,
    exchange::{ExchangeKind, ExchangeOptions},
    publisher::PublishOptions,
    queue::QueueOptions,
    transport::{
        Acker, Delivery, HeaderValue, Transport, TransportChannel, TransportConnection,
    },
};
use async_trait::async_trait;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::sync::{mpsc, watch};

/// Polls `cond` until it holds, panicking after two seconds.
pub(crate) async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

pub(crate) struct FakeTransport {
    fail_remaining: AtomicUsize,
    attempts: AtomicUsize,
    connections: Mutex<Vec<Arc<FakeConnection>>>,
}

impl FakeTransport {
    pub(crate) fn new() -> FakeTransport {
        FakeTransport {
            fail_remaining: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            connections: Mutex::new(vec![]),
        }
    }

    /// Fails the next `count` connect attempts. `usize::MAX` fails every
    /// attempt until cleared with `fail_next_connects(0)`.
    pub(crate) fn fail_next_connects(&self, count: usize) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    pub(crate) fn connect_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn connections(&self) -> Vec<Arc<FakeConnection>> {
        self.connections.lock().unwrap().clone()
    }

    /// Simulates the broker dropping every live connection.
    pub(crate) fn kill_connections(&self) {
        for conn in self.connections() {
            conn.force_close();
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, _url: &str) -> Result<Arc<dyn TransportConnection>, AmqpError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(AmqpError::ConnectionError);
        }

        let conn = Arc::new(FakeConnection::new());
        self.connections.lock().unwrap().push(conn.clone());
        Ok(conn)
    }
}

pub(crate) struct FakeConnection {
    plain: Arc<FakeChannel>,
    confirm: Arc<FakeChannel>,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
}

impl FakeConnection {
    pub(crate) fn new() -> FakeConnection {
        let (closed_tx, closed_rx) = watch::channel(false);
        FakeConnection {
            plain: Arc::new(FakeChannel::new()),
            confirm: Arc::new(FakeChannel::new()),
            closed_tx,
            closed_rx,
        }
    }

    pub(crate) fn plain_channel(&self) -> Arc<FakeChannel> {
        self.plain.clone()
    }

    pub(crate) fn confirm_channel(&self) -> Arc<FakeChannel> {
        self.confirm.clone()
    }

    pub(crate) fn force_close(&self) {
        let _ = self.closed_tx.send(true);
    }
}

#[async_trait]
impl TransportConnection for FakeConnection {
    async fn create_channel(&self) -> Result<Arc<dyn TransportChannel>, AmqpError> {
        if !self.is_open() {
            return Err(AmqpError::ChannelError);
        }
        Ok(self.plain.clone())
    }

    async fn create_confirm_channel(&self) -> Result<Arc<dyn TransportChannel>, AmqpError> {
        if !self.is_open() {
            return Err(AmqpError::ChannelError);
        }
        Ok(self.confirm.clone())
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
        self.force_close();
        Ok(())
    }

    fn is_open(&self) -> bool {
        !*self.closed_rx.borrow()
    }
}

pub(crate) struct BindingRecord {
    pub(crate) queue: String,
    pub(crate) exchange: String,
    pub(crate) pattern: String,
    pub(crate) args: BTreeMap<String, HeaderValue>,
}

#[derive(Default)]
pub(crate) struct FakeChannel {
    published: Mutex<Vec<PendingMessage>>,
    fail_publishes: AtomicBool,
    publish_budget: Mutex<Option<usize>>,
    fail_declares: AtomicBool,
    declared_queues: Mutex<Vec<String>>,
    declared_exchanges: Mutex<Vec<(String, ExchangeKind)>>,
    bindings: Mutex<Vec<BindingRecord>>,
    prefetch: Mutex<Option<u16>>,
    consumed: Mutex<Vec<String>>,
    consumer_tx: Mutex<Option<mpsc::Sender<Delivery>>>,
}

impl FakeChannel {
    pub(crate) fn new() -> FakeChannel {
        FakeChannel::default()
    }

    pub(crate) fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Lets `budget` publishes through, then fails the rest.
    pub(crate) fn fail_publishes_after(&self, budget: usize) {
        *self.publish_budget.lock().unwrap() = Some(budget);
    }

    pub(crate) fn fail_declares(&self, fail: bool) {
        self.fail_declares.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn published(&self) -> Vec<PendingMessage> {
        self.published.lock().unwrap().clone()
    }

    pub(crate) fn published_bodies(&self) -> Vec<String> {
        self.published()
            .iter()
            .map(|record| String::from_utf8_lossy(&record.body).into_owned())
            .collect()
    }

    pub(crate) fn declared_queues(&self) -> Vec<String> {
        self.declared_queues.lock().unwrap().clone()
    }

    pub(crate) fn declared_exchanges(&self) -> Vec<(String, ExchangeKind)> {
        self.declared_exchanges.lock().unwrap().clone()
    }

    pub(crate) fn bindings(&self) -> Vec<BindingRecord> {
        let mut records = vec![];
        for binding in self.bindings.lock().unwrap().iter() {
            records.push(BindingRecord {
                queue: binding.queue.clone(),
                exchange: binding.exchange.clone(),
                pattern: binding.pattern.clone(),
                args: binding.args.clone(),
            });
        }
        records
    }

    pub(crate) fn prefetch(&self) -> Option<u16> {
        *self.prefetch.lock().unwrap()
    }

    pub(crate) fn consumed_queues(&self) -> Vec<String> {
        self.consumed.lock().unwrap().clone()
    }

    /// Pushes a delivery to the registered consumer.
    pub(crate) async fn deliver(&self, delivery: Delivery) {
        let tx = self
            .consumer_tx
            .lock()
            .unwrap()
            .clone()
            .expect("no consumer registered");
        tx.send(delivery).await.expect("consumer dropped");
    }
}

#[async_trait]
impl TransportChannel for FakeChannel {
    async fn qos(&self, prefetch: u16) -> Result<(), AmqpError> {
        *self.prefetch.lock().unwrap() = Some(prefetch);
        Ok(())
    }

    async fn declare_queue(&self, queue: &str, _options: &QueueOptions) -> Result<(), AmqpError> {
        if self.fail_declares.load(Ordering::SeqCst) {
            return Err(AmqpError::DeclareQueueError(queue.to_owned()));
        }
        self.declared_queues.lock().unwrap().push(queue.to_owned());
        Ok(())
    }

    async fn declare_exchange(
        &self,
        exchange: &str,
        kind: ExchangeKind,
        _options: &ExchangeOptions,
    ) -> Result<(), AmqpError> {
        if self.fail_declares.load(Ordering::SeqCst) {
            return Err(AmqpError::DeclareExchangeError(exchange.to_owned()));
        }
        self.declared_exchanges
            .lock()
            .unwrap()
            .push((exchange.to_owned(), kind));
        Ok(())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
        args: &BTreeMap<String, HeaderValue>,
    ) -> Result<(), AmqpError> {
        self.bindings.lock().unwrap().push(BindingRecord {
            queue: queue.to_owned(),
            exchange: exchange.to_owned(),
            pattern: pattern.to_owned(),
            args: args.clone(),
        });
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        options: &PublishOptions,
    ) -> Result<(), AmqpError> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(AmqpError::PublishRejected);
        }

        let mut budget = self.publish_budget.lock().unwrap();
        if let Some(remaining) = budget.as_mut() {
            if *remaining == 0 {
                return Err(AmqpError::PublishRejected);
            }
            *remaining -= 1;
        }
        drop(budget);

        self.published.lock().unwrap().push(PendingMessage {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            body: body.to_vec(),
            options: options.clone(),
        });
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        _tag: &str,
    ) -> Result<mpsc::Receiver<Delivery>, AmqpError> {
        let (tx, rx) = mpsc::channel(16);
        self.consumed.lock().unwrap().push(queue.to_owned());
        *self.consumer_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    fn is_open(&self) -> bool {
        true
    }
}

pub(crate) struct RecordingAcker {
    acks: AtomicUsize,
    rejects: Mutex<Vec<bool>>,
    fail_settlement: AtomicBool,
}

impl RecordingAcker {
    pub(crate) fn new() -> RecordingAcker {
        RecordingAcker {
            acks: AtomicUsize::new(0),
            rejects: Mutex::new(vec![]),
            fail_settlement: AtomicBool::new(false),
        }
    }

    pub(crate) fn fail_settlement(&self, fail: bool) {
        self.fail_settlement.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn acks(&self) -> usize {
        self.acks.load(Ordering::SeqCst)
    }

    pub(crate) fn rejects(&self) -> Vec<bool> {
        self.rejects.lock().unwrap().clone()
    }
}

#[async_trait]
impl Acker for RecordingAcker {
    async fn ack(&self) -> Result<(), AmqpError> {
        if self.fail_settlement.load(Ordering::SeqCst) {
            return Err(AmqpError::AckMessageError);
        }
        self.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reject(&self, requeue: bool) -> Result<(), AmqpError> {
        if self.fail_settlement.load(Ordering::SeqCst) {
            return Err(AmqpError::NackMessageError);
        }
        self.rejects.lock().unwrap().push(requeue);
        Ok(())
    }
}
