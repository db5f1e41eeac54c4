// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Per-Delivery Handling
//!
//! One delivery, one handler invocation, one settlement: the handler's
//! boolean outcome acknowledges the message or negatively acknowledges it
//! with requeue, so the broker redelivers it. A failure to settle means the
//! channel state is suspect, so the whole connection is torn down and the
//! supervisor rebuilds it.

use crate::{
    transport::{Delivery, TransportConnection},
    worker::MessageHandler,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

pub(crate) async fn process_delivery(
    handler: Arc<dyn MessageHandler>,
    delivery: Delivery,
    connection: Arc<dyn TransportConnection>,
) {
    let Delivery { message, acker } = delivery;
    let routing_key = message.routing_key.clone();

    let settled = if handler.handle(message).await {
        debug!(routing_key = routing_key.as_str(), "message processed");
        acker.ack().await
    } else {
        warn!(
            routing_key = routing_key.as_str(),
            "handler rejected message, requeuing"
        );
        acker.reject(true).await
    };

    if let Err(err) = settled {
        error!(
            error = err.to_string(),
            "failure to settle message, tearing down connection"
        );
        let _ = connection.close().await;
    }
}
