//! Event validation and object locator extraction.

use crate::error::ValidationError;
use crate::event::{CloudEvent, EventContext};
use crate::schema::{ObjectRef, StorageObject, BUCKET_ID_ATTR, OBJECT_ID_ATTR};
use serde::{Deserialize, Serialize};

/// Check that the event has a context and exactly the accepted type.
///
/// Context presence is checked before the type so an envelope without any
/// metadata reports `MissingContext`.
pub fn expect_type<'a>(
    event: &'a CloudEvent,
    accepted: &str,
) -> Result<&'a EventContext, ValidationError> {
    let context = event
        .context
        .as_ref()
        .ok_or(ValidationError::MissingContext)?;

    if context.event_type != accepted {
        return Err(ValidationError::InvalidEventType {
            actual: context.event_type.clone(),
            expected: accepted.to_string(),
        });
    }

    Ok(context)
}

/// Where an upload notification carries the object locator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorSource {
    /// Native object resource in the payload (`bucket`, `name`)
    #[default]
    Payload,
    /// Caller-supplied `bucketid` / `objectid` extension attributes
    Extensions,
}

impl LocatorSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocatorSource::Payload => "payload",
            LocatorSource::Extensions => "extensions",
        }
    }

    /// Extract the object locator from an already type-checked event
    pub fn extract(&self, event: &CloudEvent) -> Result<ObjectRef, ValidationError> {
        match self {
            LocatorSource::Payload => Ok(StorageObject::from_event(event)?.object_ref()),
            LocatorSource::Extensions => {
                let context = event
                    .context
                    .as_ref()
                    .ok_or(ValidationError::MissingContext)?;
                let bucket_id = context.require_str(BUCKET_ID_ATTR)?;
                let object_id = context.require_str(OBJECT_ID_ATTR)?;

                if bucket_id.is_empty() || object_id.is_empty() {
                    return Err(ValidationError::MalformedPayload(format!(
                        "{} and {} must not be empty",
                        BUCKET_ID_ATTR, OBJECT_ID_ATTR
                    )));
                }

                Ok(ObjectRef::new(bucket_id, object_id))
            }
        }
    }
}
