//! The result envelope returned by every dispatch.
//!
//! On the wire and in memory the shape is identical:
//! `{"success": bool, "data": any|null, "message": string|null}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message used when a feature reports failure without explaining why.
const MISSING_FAILURE_MESSAGE: &str = "execution_failure: feature reported failure without a message";

/// Normalized result of a dispatch call.
///
/// Invariant: `success == false` implies `message.is_some()`. The
/// constructors and [`Envelope::coerce`] uphold it; `data` is only present
/// on failure when a feature explicitly returned partial data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Whether the feature completed successfully.
    pub success: bool,
    /// Structured payload.
    #[serde(default)]
    pub data: Option<Value>,
    /// Human-readable message; always set on failure.
    #[serde(default)]
    pub message: Option<String>,
}

impl Envelope {
    /// A successful envelope carrying `data`.
    #[must_use]
    pub fn success(data: impl Into<Option<Value>>) -> Self {
        Self {
            success: true,
            data: data.into(),
            message: None,
        }
    }

    /// A failure envelope with no data.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }

    /// Attach a message (for success envelopes that want one).
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Normalize an arbitrary feature return value into an envelope.
    ///
    /// A JSON object whose keys are a subset of `success`/`data`/`message`,
    /// with a boolean `success` and a string-or-null `message`, is taken as
    /// an envelope verbatim. Anything else is wrapped as
    /// `{success: true, data: <value>, message: null}`.
    #[must_use]
    pub fn coerce(value: Value) -> Self {
        match value {
            Value::Null => Self::success(None),
            Value::Object(map) => match Self::from_conforming(&map) {
                Some(envelope) => envelope,
                None => Self::success(Value::Object(map)),
            },
            other => Self::success(other),
        }
    }

    fn from_conforming(map: &Map<String, Value>) -> Option<Self> {
        if !map
            .keys()
            .all(|k| matches!(k.as_str(), "success" | "data" | "message"))
        {
            return None;
        }
        let success = map.get("success")?.as_bool()?;
        let message = match map.get("message") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return None,
        };
        let data = match map.get("data") {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.clone()),
        };
        let message = if success {
            message
        } else {
            Some(message.unwrap_or_else(|| MISSING_FAILURE_MESSAGE.to_string()))
        };
        Some(Self {
            success,
            data,
            message,
        })
    }
}
