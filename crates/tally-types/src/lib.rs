//! Wire types shared between the tally worker and its parent process.
//!
//! The parent writes one JSON document per line to the worker. Each document
//! is a [`TrackingEvent`]: a free-form payload whose `type` field decides how
//! the worker handles it. The worker answers with a single
//! [`BrokerMessage::ReadyToReceive`] once it is able to accept events.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Field holding the discriminating tag of a tracking payload.
pub const TYPE_FIELD: &str = "type";
/// Field naming the target platform of a preview payload.
pub const PLATFORM_FIELD: &str = "platform";
/// Field holding the human-readable label enriched by device probing.
pub const LABEL_FIELD: &str = "label";

/// Classification of an inbound tracking payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackingKind {
    /// Any payload without a dedicated handler; forwarded verbatim.
    Generic,
    /// The parent has finished producing events.
    Finish,
    /// Preview application data that must be enriched per device.
    PreviewAppData,
}

impl TrackingKind {
    /// Classifies a raw `type` tag. Unknown or missing tags are generic.
    #[must_use]
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            Some("Finish") => Self::Finish,
            Some("PreviewAppData") => Self::PreviewAppData,
            _ => Self::Generic,
        }
    }

    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "Generic",
            Self::Finish => "Finish",
            Self::PreviewAppData => "PreviewAppData",
        }
    }
}

impl fmt::Display for TrackingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised when a payload does not have the shape an operation needs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventShapeError {
    /// The payload is not a JSON object, so it has no fields to update.
    #[error("tracking payload is not a JSON object")]
    NotAnObject,
    /// The label holds a structured value that cannot be extended as text.
    #[error("tracking label is not a scalar value")]
    LabelNotText,
}

/// A tracking payload received from the parent process.
///
/// The payload is kept as raw JSON so fields the worker does not understand
/// reach the sink untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingEvent(Value);

impl TrackingEvent {
    /// Wraps an arbitrary JSON value.
    #[must_use]
    pub const fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Builds the payload used when a finish is requested without one.
    #[must_use]
    pub fn finish() -> Self {
        let mut fields = Map::new();
        fields.insert(
            TYPE_FIELD.to_owned(),
            Value::String(TrackingKind::Finish.as_str().to_owned()),
        );
        Self(Value::Object(fields))
    }

    /// Parses a single JSON document.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] when the bytes are not a
    /// valid JSON document.
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes).map(Self)
    }

    /// Classifies the payload by its `type` tag.
    #[must_use]
    pub fn kind(&self) -> TrackingKind {
        TrackingKind::from_tag(self.str_field(TYPE_FIELD))
    }

    /// Target platform named by a preview payload.
    #[must_use]
    pub fn platform(&self) -> Option<&str> {
        self.str_field(PLATFORM_FIELD)
    }

    /// Current label, when it is a string.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.str_field(LABEL_FIELD)
    }

    /// Appends `_<suffix>` to the label.
    ///
    /// A missing or `null` label is treated as empty; numeric and boolean
    /// labels are rendered as text first.
    ///
    /// # Errors
    ///
    /// Returns [`EventShapeError::NotAnObject`] for non-object payloads and
    /// [`EventShapeError::LabelNotText`] when the label is an array or object.
    pub fn append_label_suffix(&mut self, suffix: &str) -> Result<(), EventShapeError> {
        let Value::Object(fields) = &mut self.0 else {
            return Err(EventShapeError::NotAnObject);
        };
        let mut label = match fields.get(LABEL_FIELD) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(Value::Number(number)) => number.to_string(),
            Some(Value::Bool(flag)) => flag.to_string(),
            Some(Value::Array(_) | Value::Object(_)) => return Err(EventShapeError::LabelNotText),
        };
        label.push('_');
        label.push_str(suffix);
        fields.insert(LABEL_FIELD.to_owned(), Value::String(label));
        Ok(())
    }

    /// Borrows the raw JSON payload.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    fn str_field(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }
}

impl From<Value> for TrackingEvent {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl fmt::Display for TrackingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Messages the worker sends back to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrokerMessage {
    /// The worker has finished starting up and accepts tracking events.
    #[serde(rename = "BrokerReadyToReceive")]
    ReadyToReceive,
}

impl BrokerMessage {
    /// Returns the wire name of the message.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadyToReceive => "BrokerReadyToReceive",
        }
    }
}

impl fmt::Display for BrokerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
