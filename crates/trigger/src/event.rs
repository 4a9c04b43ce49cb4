//! Inbound activation event decoding.
//!
//! Two shapes arrive at the trigger:
//! - a CloudWatch Logs subscription delivery, `{"awslogs": {"data": "..."}}`,
//!   where `data` is base64-encoded gzip of a JSON log batch;
//! - any other JSON object, treated as a direct activation request.
//!
//! `null`, non-object payloads and subscription control messages decode to
//! an empty batch.

use std::io::Read;

use base64::Engine;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Upper bound on a decompressed log batch.
pub const MAX_DECODED_BYTES: u64 = 8 * 1024 * 1024;

/// `messageType` of the health check CloudWatch sends when a subscription is created.
pub const CONTROL_MESSAGE: &str = "CONTROL_MESSAGE";

#[derive(Debug, Error)]
pub enum EventError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("awslogs.data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("awslogs.data is not valid gzip: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("decoded log batch exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("awslogs envelope has no data string")]
    MissingData,
}

/// One log line from the subscription batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(default)]
    pub id: Option<String>,
    /// Epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub message: String,
}

impl LogRecord {
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.timestamp)
    }

    /// Case-insensitive match on the dotted hostname or its dash-normalized
    /// form (`mc.example.com` / `mc-example-com`).
    pub fn mentions(&self, hostname: &str) -> bool {
        let host = hostname.trim_end_matches('.').to_ascii_lowercase();
        if host.is_empty() {
            return true;
        }
        let message = self.message.to_ascii_lowercase();
        message.contains(&host) || message.contains(&host.replace('.', "-"))
    }
}

/// Decoded body of `awslogs.data`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsDocument {
    #[serde(default)]
    pub message_type: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub log_group: Option<String>,
    #[serde(default)]
    pub log_stream: Option<String>,
    #[serde(default)]
    pub subscription_filters: Vec<String>,
    #[serde(default)]
    pub log_events: Vec<LogRecord>,
}

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationEvent {
    /// A structured invocation that is not a log delivery.
    Direct,
    /// A log subscription batch.
    Logs {
        log_group: Option<String>,
        records: Vec<LogRecord>,
    },
    /// Nothing to act on.
    Empty,
}

impl ActivationEvent {
    /// Decode raw invocation bytes. Blank input is an empty batch.
    pub fn from_slice(raw: &[u8]) -> Result<Self, EventError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::Empty);
        }
        let value: Value = serde_json::from_slice(raw)?;
        Self::from_value(&value)
    }

    pub fn from_value(payload: &Value) -> Result<Self, EventError> {
        let Some(obj) = payload.as_object() else {
            return Ok(Self::Empty);
        };
        let Some(awslogs) = obj.get("awslogs") else {
            return Ok(Self::Direct);
        };

        let data = awslogs
            .get("data")
            .and_then(Value::as_str)
            .ok_or(EventError::MissingData)?;
        let doc = decode_log_data(data)?;

        if doc.message_type == CONTROL_MESSAGE {
            debug!(log_group = ?doc.log_group, "Subscription control message");
            return Ok(Self::Empty);
        }

        Ok(Self::Logs {
            log_group: doc.log_group,
            records: doc.log_events,
        })
    }

    pub fn records(&self) -> &[LogRecord] {
        match self {
            Self::Logs { records, .. } => records,
            Self::Direct | Self::Empty => &[],
        }
    }

    /// Log records that count as client activity. With no hostname every
    /// record counts.
    pub fn matching_records<'a>(
        &'a self,
        hostname: Option<&'a str>,
    ) -> impl Iterator<Item = &'a LogRecord> + 'a {
        self.records()
            .iter()
            .filter(move |r| hostname.map_or(true, |h| r.mentions(h)))
    }

    /// Whether the event should lead to an activation attempt.
    pub fn has_activity(&self, hostname: Option<&str>) -> bool {
        match self {
            Self::Direct => true,
            Self::Empty => false,
            Self::Logs { .. } => self.matching_records(hostname).next().is_some(),
        }
    }
}

/// Decode `awslogs.data`: base64, then gzip, then JSON.
pub fn decode_log_data(data: &str) -> Result<LogsDocument, EventError> {
    let compressed = base64::engine::general_purpose::STANDARD.decode(data.trim())?;

    let mut decoded = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .take(MAX_DECODED_BYTES + 1)
        .read_to_end(&mut decoded)
        .map_err(EventError::Decompress)?;

    if decoded.len() as u64 > MAX_DECODED_BYTES {
        return Err(EventError::TooLarge {
            limit: MAX_DECODED_BYTES,
        });
    }

    Ok(serde_json::from_slice(&decoded)?)
}
