// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Definitions and Bindings
//!
//! This module provides the exchange types a worker can declare and the
//! binding specifications that connect a queue to an exchange. A binding is
//! either a plain routing key or a `(pattern, args)` pair where `args`
//! supplies header-match criteria for headers-type exchanges.
//!
//! Worker configuration can also be loaded from JSON; binding parsing is
//! deliberately lenient there: an entry of unrecognized shape is reported
//! and skipped without aborting the rest of worker startup.

use crate::{errors::AmqpError, transport::HeaderValue};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Types of exchanges available at the broker.
///
/// - Direct: routes on an exact routing-key match
/// - Topic: routes on wildcard pattern matching of routing keys
/// - Headers: routes on message header values instead of routing keys
/// - Fanout: broadcasts to all bound queues
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    #[default]
    Direct,
    Topic,
    Headers,
    Fanout,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Headers => "headers",
            ExchangeKind::Fanout => "fanout",
        }
    }
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::Headers => lapin::ExchangeKind::Headers,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
        }
    }
}

/// Durability flags for an exchange declaration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExchangeOptions {
    /// Whether the exchange survives a broker restart.
    pub durable: bool,
    /// Whether the exchange is deleted once unused.
    pub auto_delete: bool,
}

impl Default for ExchangeOptions {
    fn default() -> ExchangeOptions {
        ExchangeOptions {
            durable: true,
            auto_delete: false,
        }
    }
}

impl ExchangeOptions {
    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn auto_delete(mut self, auto_delete: bool) -> Self {
        self.auto_delete = auto_delete;
        self
    }
}

/// One queue-to-exchange binding.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Binds by routing key. An empty key is a valid catch-all bind for
    /// fanout and headers exchanges.
    RoutingKey(String),
    /// Binds by `(pattern, args)` where `args` supplies the header-match
    /// criteria of a headers-type exchange. The pattern is optional broker
    /// metadata and may be empty.
    HeaderMatch {
        pattern: String,
        args: BTreeMap<String, HeaderValue>,
    },
}

impl Binding {
    pub fn routing_key(key: impl Into<String>) -> Binding {
        Binding::RoutingKey(key.into())
    }

    pub fn header_match(
        pattern: impl Into<String>,
        args: BTreeMap<String, HeaderValue>,
    ) -> Binding {
        Binding::HeaderMatch {
            pattern: pattern.into(),
            args,
        }
    }

    /// Parses one binding entry from its JSON shape: a string is a routing
    /// key, an object with an optional string `pattern` and an `args` map is
    /// a header match. Anything else is an invalid spec.
    pub fn from_value(value: &Value) -> Result<Binding, AmqpError> {
        match value {
            Value::String(key) => Ok(Binding::RoutingKey(key.clone())),
            Value::Object(fields) => {
                let pattern = match fields.get("pattern") {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(pattern)) => pattern.clone(),
                    Some(_) => return Err(AmqpError::InvalidBindingSpec(value.to_string())),
                };

                let mut args = BTreeMap::new();
                if let Some(Value::Object(entries)) = fields.get("args") {
                    for (key, entry) in entries {
                        let header = match entry {
                            Value::String(text) => HeaderValue::Text(text.clone()),
                            Value::Bool(flag) => HeaderValue::Bool(*flag),
                            Value::Number(num) if num.is_i64() => {
                                HeaderValue::Int(num.as_i64().unwrap_or_default())
                            }
                            _ => return Err(AmqpError::InvalidBindingSpec(value.to_string())),
                        };
                        args.insert(key.clone(), header);
                    }
                }

                Ok(Binding::HeaderMatch { pattern, args })
            }
            _ => Err(AmqpError::InvalidBindingSpec(value.to_string())),
        }
    }

    /// Parses a bindings config value: a single entry or a sequence of
    /// entries. Invalid entries are reported and skipped, they never abort
    /// worker startup.
    pub fn parse_specs(value: &Value) -> Vec<Binding> {
        let entries = match value {
            Value::Array(entries) => entries.as_slice(),
            other => std::slice::from_ref(other),
        };

        entries
            .iter()
            .filter_map(|entry| match Binding::from_value(entry) {
                Ok(binding) => Some(binding),
                Err(err) => {
                    warn!(error = err.to_string(), "skipping invalid binding spec");
                    None
                }
            })
            .collect()
    }

    pub(crate) fn deserialize_specs<'de, D>(
        deserializer: D,
    ) -> Result<Option<Vec<Binding>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().map(Binding::parse_specs))
    }
}
