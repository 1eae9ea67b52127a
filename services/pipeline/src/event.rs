//! CloudEvents envelope for the imgguard pipeline.
//!
//! Every stage receives one [`CloudEvent`] per invocation. The context carries
//! the required CloudEvents attributes plus a loosely typed extension bag;
//! extension reads go through [`Lookup`] so a missing key and a value of the
//! wrong type stay distinguishable.

use crate::error::ValidationError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// CloudEvents specification version emitted by this crate
pub const SPEC_VERSION: &str = "1.0";

/// Content type for JSON payloads
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Value of an extension attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionValue {
    String(String),
    Boolean(bool),
    Integer(i64),
}

impl ExtensionValue {
    /// Name of the CloudEvents type held by this value
    pub fn type_name(&self) -> &'static str {
        match self {
            ExtensionValue::String(_) => "string",
            ExtensionValue::Boolean(_) => "boolean",
            ExtensionValue::Integer(_) => "integer",
        }
    }
}

impl fmt::Display for ExtensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtensionValue::String(s) => f.write_str(s),
            ExtensionValue::Boolean(b) => write!(f, "{}", b),
            ExtensionValue::Integer(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for ExtensionValue {
    fn from(value: &str) -> Self {
        ExtensionValue::String(value.to_string())
    }
}

impl From<String> for ExtensionValue {
    fn from(value: String) -> Self {
        ExtensionValue::String(value)
    }
}

impl From<bool> for ExtensionValue {
    fn from(value: bool) -> Self {
        ExtensionValue::Boolean(value)
    }
}

impl From<i64> for ExtensionValue {
    fn from(value: i64) -> Self {
        ExtensionValue::Integer(value)
    }
}

/// Result of a typed extension lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    MissingKey,
    WrongType { actual: &'static str },
}

impl<T> Lookup<T> {
    /// Convert into a validation result for the attribute `key`
    pub fn require(self, key: &str, expected: &'static str) -> Result<T, ValidationError> {
        match self {
            Lookup::Found(value) => Ok(value),
            Lookup::MissingKey => Err(ValidationError::MissingAttribute(key.to_string())),
            Lookup::WrongType { actual } => Err(ValidationError::WrongAttributeType {
                key: key.to_string(),
                expected,
                actual,
            }),
        }
    }
}

/// Context attributes of an event
#[derive(Debug, Clone, PartialEq)]
pub struct EventContext {
    pub id: String,
    pub source: String,
    pub spec_version: String,
    pub event_type: String,
    pub subject: Option<String>,
    pub time: Option<DateTime<Utc>>,
    pub data_content_type: Option<String>,
    pub data_schema: Option<String>,
    pub extensions: BTreeMap<String, ExtensionValue>,
}

impl EventContext {
    /// Create a context with a fresh id and the current time
    pub fn new(event_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            spec_version: SPEC_VERSION.to_string(),
            event_type: event_type.into(),
            subject: None,
            time: Some(Utc::now()),
            data_content_type: None,
            data_schema: None,
            extensions: BTreeMap::new(),
        }
    }

    /// Copy of this context for a derived event: fresh id and time, new source.
    /// Every other attribute, extensions included, is preserved.
    pub fn derive(&self, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            time: Some(Utc::now()),
            ..self.clone()
        }
    }

    /// Set the event id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the subject attribute
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Add an extension attribute
    pub fn with_extension(mut self, name: &str, value: impl Into<ExtensionValue>) -> Self {
        self.set_extension(name, value);
        self
    }

    /// Insert or replace an extension attribute. Names are stored lowercase.
    pub fn set_extension(&mut self, name: &str, value: impl Into<ExtensionValue>) {
        self.extensions.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Raw extension value
    pub fn extension(&self, name: &str) -> Option<&ExtensionValue> {
        self.extensions.get(name)
    }

    /// Look up a string-valued extension
    pub fn extension_str(&self, name: &str) -> Lookup<&str> {
        match self.extension(name) {
            None => Lookup::MissingKey,
            Some(ExtensionValue::String(value)) => Lookup::Found(value.as_str()),
            Some(other) => Lookup::WrongType {
                actual: other.type_name(),
            },
        }
    }

    /// Look up a boolean-valued extension.
    ///
    /// Binary HTTP mode carries every attribute as a string, so the canonical
    /// strings `"true"` and `"false"` are accepted as booleans.
    pub fn extension_bool(&self, name: &str) -> Lookup<bool> {
        match self.extension(name) {
            None => Lookup::MissingKey,
            Some(ExtensionValue::Boolean(value)) => Lookup::Found(*value),
            Some(ExtensionValue::String(value)) => match value.as_str() {
                "true" => Lookup::Found(true),
                "false" => Lookup::Found(false),
                _ => Lookup::WrongType { actual: "string" },
            },
            Some(other) => Lookup::WrongType {
                actual: other.type_name(),
            },
        }
    }

    /// Required string extension
    pub fn require_str(&self, name: &str) -> Result<&str, ValidationError> {
        self.extension_str(name).require(name, "string")
    }

    /// Required boolean extension
    pub fn require_bool(&self, name: &str) -> Result<bool, ValidationError> {
        self.extension_bool(name).require(name, "boolean")
    }
}

/// An event envelope as delivered by the transport runtime
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CloudEvent {
    /// Context attributes, absent when the transport delivered none
    pub context: Option<EventContext>,
    /// Raw payload
    pub data: Option<Bytes>,
}

impl CloudEvent {
    pub fn new(context: EventContext) -> Self {
        Self {
            context: Some(context),
            data: None,
        }
    }

    /// Attach a payload with its content type
    pub fn with_data(mut self, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        if let Some(ref mut context) = self.context {
            context.data_content_type = Some(content_type.into());
        }
        self.data = Some(data.into());
        self
    }

    /// Attach a JSON payload
    pub fn with_json_data<T: Serialize>(self, payload: &T) -> Result<Self, serde_json::Error> {
        let data = serde_json::to_vec(payload)?;
        Ok(self.with_data(JSON_CONTENT_TYPE, data))
    }

    pub fn id(&self) -> Option<&str> {
        self.context.as_ref().map(|c| c.id.as_str())
    }

    pub fn event_type(&self) -> Option<&str> {
        self.context.as_ref().map(|c| c.event_type.as_str())
    }

    /// True when the event carries a non-empty payload
    pub fn has_data(&self) -> bool {
        self.data.as_ref().map(|d| !d.is_empty()).unwrap_or(false)
    }

    /// Deserialize the payload as JSON
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, ValidationError> {
        let data = self
            .data
            .as_ref()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| ValidationError::MalformedPayload("event has no data".to_string()))?;

        serde_json::from_slice(data).map_err(|e| ValidationError::MalformedPayload(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn context_with(name: &str, value: ExtensionValue) -> EventContext {
        EventContext::new("custom.test", "tests").with_extension(name, value)
    }

    #[test]
    fn test_new_context_has_fresh_id() {
        let a = EventContext::new("custom.test", "tests");
        let b = EventContext::new("custom.test", "tests");

        assert_ne!(a.id, b.id);
        assert_eq!(a.spec_version, SPEC_VERSION);
        assert!(a.time.is_some());
    }

    #[test]
    fn test_derive_keeps_metadata() {
        let inbound = EventContext::new("google.storage.object.finalize", "//storage")
            .with_id("evt-1")
            .with_extension("traceparent", "00-abc-01");

        let derived = inbound.derive("custom.explicit-content-detector");

        assert_ne!(derived.id, "evt-1");
        assert_eq!(derived.source, "custom.explicit-content-detector");
        assert_eq!(derived.event_type, inbound.event_type);
        assert_eq!(derived.extension_str("traceparent"), Lookup::Found("00-abc-01"));
    }

    #[test]
    fn test_extension_str_lookup() {
        let context = context_with("bucketid", "incoming".into());

        assert_eq!(context.extension_str("bucketid"), Lookup::Found("incoming"));
        assert_eq!(context.extension_str("objectid"), Lookup::MissingKey);
    }

    #[test]
    fn test_extension_str_wrong_type() {
        let context = context_with("bucketid", ExtensionValue::Integer(7));

        assert_eq!(
            context.extension_str("bucketid"),
            Lookup::WrongType { actual: "integer" }
        );
        assert!(matches!(
            context.require_str("bucketid"),
            Err(ValidationError::WrongAttributeType { ref key, expected: "string", actual: "integer" })
                if key == "bucketid"
        ));
    }

    #[test]
    fn test_require_str_missing() {
        let context = EventContext::new("custom.test", "tests");

        assert_eq!(
            context.require_str("objectid"),
            Err(ValidationError::MissingAttribute("objectid".to_string()))
        );
    }

    #[test]
    fn test_extension_bool_accepts_canonical_strings() {
        assert_eq!(
            context_with("explicitcontent", "true".into()).extension_bool("explicitcontent"),
            Lookup::Found(true)
        );
        assert_eq!(
            context_with("explicitcontent", false.into()).extension_bool("explicitcontent"),
            Lookup::Found(false)
        );
        assert_eq!(
            context_with("explicitcontent", "yes".into()).extension_bool("explicitcontent"),
            Lookup::WrongType { actual: "string" }
        );
    }

    #[test]
    fn test_extension_names_are_lowercased() {
        let context = context_with("BucketID", "incoming".into());
        assert_eq!(context.extension_str("bucketid"), Lookup::Found("incoming"));
    }

    #[test]
    fn test_data_as_json() {
        #[derive(Deserialize)]
        struct Payload {
            name: String,
        }

        let event = CloudEvent::new(EventContext::new("custom.test", "tests"))
            .with_json_data(&serde_json::json!({ "name": "photo1.jpg" }))
            .unwrap();

        let payload: Payload = event.data_as().unwrap();
        assert_eq!(payload.name, "photo1.jpg");
        assert_eq!(
            event.context.unwrap().data_content_type.as_deref(),
            Some(JSON_CONTENT_TYPE)
        );
    }

    #[test]
    fn test_data_as_without_data_is_malformed() {
        let event = CloudEvent::new(EventContext::new("custom.test", "tests"));
        let result: Result<serde_json::Value, _> = event.data_as();

        assert!(matches!(result, Err(ValidationError::MalformedPayload(_))));
    }
}
