//! Event types and payload schemas exchanged between pipeline stages.

use crate::error::ValidationError;
use crate::event::{CloudEvent, EventContext};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event type of an upload-finalize notification
pub const FINALIZE_EVENT_TYPE: &str = "google.storage.object.finalize";

/// Event type of the inter-stage FileUploaded event
pub const FILE_UPLOADED_EVENT_TYPE: &str = "custom.fileuploaded";

/// Extension attribute names of the FileUploaded shim encoding
pub const BUCKET_ID_ATTR: &str = "bucketid";
pub const OBJECT_ID_ATTR: &str = "objectid";
pub const EXPLICIT_CONTENT_ATTR: &str = "explicitcontent";

/// Extension attribute brokers route on
pub const ROUTING_ATTR: &str = "customextension";
pub const ROUTE_EXPLICIT: &str = "explicit-content";
pub const ROUTE_CLEAN: &str = "no-explicit-content";

/// Suffix of the companion object holding extracted text
pub const TEXT_OBJECT_SUFFIX: &str = ".txt";

/// Reference to a single storage object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub bucket_id: String,
    pub object_id: String,
}

impl ObjectRef {
    pub fn new(bucket_id: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            bucket_id: bucket_id.into(),
            object_id: object_id.into(),
        }
    }

    /// Canonical locator understood by the image annotation service
    pub fn uri(&self) -> String {
        format!("gs://{}/{}", self.bucket_id, self.object_id)
    }

    /// Sibling object that receives the text extracted from this one
    pub fn text_companion(&self) -> ObjectRef {
        ObjectRef {
            bucket_id: self.bucket_id.clone(),
            object_id: format!("{}{}", self.object_id, TEXT_OBJECT_SUFFIX),
        }
    }

    /// Same object id in another bucket
    pub fn in_bucket(&self, bucket_id: impl Into<String>) -> ObjectRef {
        ObjectRef {
            bucket_id: bucket_id.into(),
            object_id: self.object_id.clone(),
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.bucket_id.is_empty() {
            return Err(ValidationError::MalformedPayload(
                "bucket id must not be empty".to_string(),
            ));
        }
        if self.object_id.is_empty() {
            return Err(ValidationError::MalformedPayload(
                "object id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gs://{}/{}", self.bucket_id, self.object_id)
    }
}

/// Object resource delivered with an upload-finalize notification
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageObject {
    /// Bucket holding the object
    pub bucket: String,
    /// Object name within the bucket
    pub name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    /// Size in bytes, encoded as a decimal string
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub generation: Option<String>,
    #[serde(default)]
    pub time_created: Option<DateTime<Utc>>,
}

impl StorageObject {
    /// Decode the notification payload of a finalize event
    pub fn from_event(event: &CloudEvent) -> Result<Self, ValidationError> {
        let object: StorageObject = event.data_as()?;
        object.object_ref().validate()?;
        Ok(object)
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(self.bucket.clone(), self.name.clone())
    }

    /// Parsed object size
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref().and_then(|s| s.parse().ok())
    }
}

/// How a FileUploaded event is physically encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventEncoding {
    /// JSON payload body (canonical)
    #[default]
    Body,
    /// Extension attributes on the envelope
    Extensions,
}

/// Payload of a `custom.fileuploaded` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploaded {
    #[serde(rename = "bucketid")]
    pub bucket_id: String,
    #[serde(rename = "objectid")]
    pub object_id: String,
    #[serde(rename = "explicitcontent", with = "lenient_bool")]
    pub explicit_content: bool,
}

impl FileUploaded {
    pub fn new(object: ObjectRef, explicit_content: bool) -> Self {
        Self {
            bucket_id: object.bucket_id,
            object_id: object.object_id,
            explicit_content,
        }
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(self.bucket_id.clone(), self.object_id.clone())
    }

    /// Value of the routing extension for this event
    pub fn route(&self) -> &'static str {
        if self.explicit_content {
            ROUTE_EXPLICIT
        } else {
            ROUTE_CLEAN
        }
    }

    /// Decode from an event in either supported encoding.
    ///
    /// The JSON body is canonical; events without data fall back to the
    /// extension attributes.
    pub fn from_event(event: &CloudEvent) -> Result<Self, ValidationError> {
        let payload = if event.has_data() {
            event.data_as::<FileUploaded>()?
        } else {
            let context = event
                .context
                .as_ref()
                .ok_or(ValidationError::MissingContext)?;
            Self::from_extensions(context)?
        };

        payload.object_ref().validate()?;
        Ok(payload)
    }

    /// Decode from the extension attribute encoding
    pub fn from_extensions(context: &EventContext) -> Result<Self, ValidationError> {
        Ok(Self {
            bucket_id: context.require_str(BUCKET_ID_ATTR)?.to_string(),
            object_id: context.require_str(OBJECT_ID_ATTR)?.to_string(),
            explicit_content: context.require_bool(EXPLICIT_CONTENT_ATTR)?,
        })
    }

    /// Write the extension attribute encoding onto `context`
    pub fn write_extensions(&self, context: &mut EventContext) {
        context.set_extension(BUCKET_ID_ATTR, self.bucket_id.as_str());
        context.set_extension(OBJECT_ID_ATTR, self.object_id.as_str());
        context.set_extension(EXPLICIT_CONTENT_ATTR, self.explicit_content);
    }

    /// Encode into an event built on `context`
    pub fn into_event(
        self,
        mut context: EventContext,
        encoding: EventEncoding,
    ) -> Result<CloudEvent, serde_json::Error> {
        context.event_type = FILE_UPLOADED_EVENT_TYPE.to_string();
        context.set_extension(ROUTING_ATTR, self.route());

        match encoding {
            EventEncoding::Body => {
                context.data_schema = None;
                CloudEvent::new(context).with_json_data(&self)
            }
            EventEncoding::Extensions => {
                context.data_content_type = None;
                context.data_schema = None;
                self.write_extensions(&mut context);
                Ok(CloudEvent::new(context))
            }
        }
    }
}

/// Accepts a JSON boolean or its `"true"`/`"false"` string form.
///
/// Older producers wrote the string form but left the key out entirely for
/// clean verdicts; such events still fail to decode, since the key is
/// required.
mod lenient_bool {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        String(String),
    }

    pub fn serialize<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bool(*value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        match BoolOrString::deserialize(deserializer)? {
            BoolOrString::Bool(b) => Ok(b),
            BoolOrString::String(s) => match s.as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(serde::de::Error::custom(format!(
                    "expected boolean, got string {:?}",
                    other
                ))),
            },
        }
    }
}
