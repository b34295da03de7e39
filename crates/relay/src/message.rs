use bytes::Bytes;
use std::collections::HashMap;

/// Inbound header carrying the correlation identifier.
pub const CORRELATION_ID_HEADER: &str = "correlation_id";

/// Outbound header the correlation identifier is relayed under.
pub const CORRELATION_ID_HTTP_HEADER: &str = "X-Correlation-ID";

const KEY_SEPARATOR: char = ':';

/// A record read from the broker, relayed as-is.
///
/// The key has the shape `<origin>:<routingId>`. It is never rewritten after
/// the message is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    /// Raw record value (no parsing)
    pub content: Bytes,
    pub headers: HashMap<String, String>,
    pub key: String,
}

impl Message {
    pub fn new(key: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
            headers: HashMap::new(),
            key: key.into(),
        }
    }

    /// Builder-style header insert, mostly for tests and in-memory sources.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[inline]
    pub fn origin(&self) -> &str {
        split_key(&self.key).0
    }

    #[inline]
    pub fn routing_id(&self) -> &str {
        split_key(&self.key).1
    }

    /// Value of the `correlation_id` header, empty when absent.
    pub fn correlation_id(&self) -> &str {
        self.headers
            .get(CORRELATION_ID_HEADER)
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Split a key into `(origin, routing_id)` on the first `:` only.
///
/// A key without a separator is all origin.
pub fn split_key(key: &str) -> (&str, &str) {
    key.split_once(KEY_SEPARATOR).unwrap_or((key, ""))
}
