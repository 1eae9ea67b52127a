//! CloudEvents HTTP binding.
//!
//! The transport runtime POSTs one event per request to `/`. Binary mode
//! carries context attributes as `ce-*` headers and the payload as the body;
//! structured mode carries the whole event as an `application/cloudevents+json`
//! document. Derived events are answered in binary mode.

use crate::config::HttpConfig;
use crate::error::{HandlerError, ValidationError};
use crate::event::{CloudEvent, EventContext, ExtensionValue, JSON_CONTENT_TYPE};
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use metrics::counter;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Media type of a structured-mode event
pub const STRUCTURED_CONTENT_TYPE: &str = "application/cloudevents+json";

const HEADER_PREFIX: &str = "ce-";

/// Specification versions accepted on input
const ACCEPTED_SPEC_VERSIONS: [&str; 2] = ["1.0", "0.3"];

/// One pipeline stage
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Stage name used in logs and metric labels
    fn name(&self) -> &'static str;

    /// Handle one event. `Ok(Some(_))` answers with a derived event.
    async fn handle(&self, event: CloudEvent) -> Result<Option<CloudEvent>, HandlerError>;

    /// Readiness probe
    async fn ready(&self) -> bool {
        true
    }
}

/// Decode an HTTP request into an event
pub fn decode_request(headers: &HeaderMap, body: Bytes) -> Result<CloudEvent, ValidationError> {
    let content_type = header_str(headers, CONTENT_TYPE.as_str())?;

    match content_type {
        Some(ct) if ct.starts_with(STRUCTURED_CONTENT_TYPE) => decode_structured(&body),
        _ => decode_binary(headers, content_type, body),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ValidationError> {
    headers
        .get(name)
        .map(|value| {
            value.to_str().map_err(|_| {
                ValidationError::MalformedEnvelope(format!("header {} is not visible ASCII", name))
            })
        })
        .transpose()
}

fn decode_binary(
    headers: &HeaderMap,
    content_type: Option<&str>,
    body: Bytes,
) -> Result<CloudEvent, ValidationError> {
    let mut attributes = BTreeMap::new();

    for (name, value) in headers {
        let Some(attribute) = name.as_str().strip_prefix(HEADER_PREFIX) else {
            continue;
        };

        let raw = value.to_str().map_err(|_| {
            ValidationError::MalformedEnvelope(format!("header {} is not visible ASCII", name))
        })?;
        let decoded = urlencoding::decode(raw).map_err(|e| {
            ValidationError::MalformedEnvelope(format!("header {}: {}", name, e))
        })?;

        attributes.insert(attribute.to_string(), decoded.into_owned());
    }

    let data = if body.is_empty() { None } else { Some(body) };

    if attributes.is_empty() {
        return Ok(CloudEvent {
            context: None,
            data,
        });
    }

    let mut context = context_from_attributes(&mut attributes)?;
    context.data_content_type = content_type.map(str::to_string);
    for (name, value) in attributes {
        context.set_extension(&name, value);
    }

    Ok(CloudEvent {
        context: Some(context),
        data,
    })
}

/// Build a context from the well-known attributes, removing them from `attributes`
fn context_from_attributes(
    attributes: &mut BTreeMap<String, String>,
) -> Result<EventContext, ValidationError> {
    let spec_version = take_required(attributes, "specversion")?;
    if !ACCEPTED_SPEC_VERSIONS.contains(&spec_version.as_str()) {
        return Err(ValidationError::MalformedEnvelope(format!(
            "unsupported specversion {}",
            spec_version
        )));
    }

    let id = take_required(attributes, "id")?;
    let source = take_required(attributes, "source")?;
    let event_type = take_required(attributes, "type")?;

    let time = attributes
        .remove("time")
        .map(|value| parse_time(&value))
        .transpose()?;

    Ok(EventContext {
        id,
        source,
        spec_version,
        event_type,
        subject: attributes.remove("subject"),
        time,
        data_content_type: attributes.remove("datacontenttype"),
        data_schema: attributes
            .remove("dataschema")
            .or_else(|| attributes.remove("schemaurl")),
        extensions: BTreeMap::new(),
    })
}

fn take_required(
    attributes: &mut BTreeMap<String, String>,
    name: &str,
) -> Result<String, ValidationError> {
    attributes
        .remove(name)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            ValidationError::MalformedEnvelope(format!("missing required attribute {}", name))
        })
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::parse_from_rfc3339(value)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| ValidationError::MalformedEnvelope(format!("invalid time {:?}: {}", value, e)))
}

fn decode_structured(body: &[u8]) -> Result<CloudEvent, ValidationError> {
    let document: Map<String, Value> = serde_json::from_slice(body)
        .map_err(|e| ValidationError::MalformedEnvelope(e.to_string()))?;

    let mut attributes = BTreeMap::new();
    let mut extensions = BTreeMap::new();
    let mut data = None;
    let mut data_base64 = None;

    for (name, value) in document {
        match name.as_str() {
            "data" => data = Some(value),
            "data_base64" => data_base64 = Some(value),
            "specversion" | "id" | "source" | "type" | "subject" | "time"
            | "datacontenttype" | "dataschema" | "schemaurl" => match value {
                Value::String(s) => {
                    attributes.insert(name, s);
                }
                Value::Null => {}
                other => {
                    return Err(ValidationError::MalformedEnvelope(format!(
                        "attribute {} must be a string, got {}",
                        name, other
                    )))
                }
            },
            _ => {
                if let Some(value) = extension_from_json(&name, value)? {
                    extensions.insert(name, value);
                }
            }
        }
    }

    let mut context = context_from_attributes(&mut attributes)?;
    for (name, value) in extensions {
        context.set_extension(&name, value);
    }

    let data = match (data, data_base64) {
        (Some(_), Some(_)) => {
            return Err(ValidationError::MalformedEnvelope(
                "data and data_base64 are mutually exclusive".to_string(),
            ))
        }
        (Some(Value::Null), None) | (None, None) => None,
        (None, Some(Value::String(encoded))) => Some(Bytes::from(
            BASE64
                .decode(encoded)
                .map_err(|e| ValidationError::MalformedEnvelope(format!("data_base64: {}", e)))?,
        )),
        (None, Some(_)) => {
            return Err(ValidationError::MalformedEnvelope(
                "data_base64 must be a string".to_string(),
            ))
        }
        (Some(value), None) => Some(json_data_bytes(&context, value)?),
    };

    if data.is_some() && context.data_content_type.is_none() {
        context.data_content_type = Some(JSON_CONTENT_TYPE.to_string());
    }

    Ok(CloudEvent {
        context: Some(context),
        data,
    })
}

/// Bytes of an inline `data` member. Strings under a non-JSON content type
/// are carried verbatim.
fn json_data_bytes(context: &EventContext, value: Value) -> Result<Bytes, ValidationError> {
    let is_json = context
        .data_content_type
        .as_deref()
        .map(|ct| ct.contains("json"))
        .unwrap_or(true);

    match value {
        Value::String(text) if !is_json => Ok(Bytes::from(text)),
        other => serde_json::to_vec(&other)
            .map(Bytes::from)
            .map_err(|e| ValidationError::MalformedEnvelope(e.to_string())),
    }
}

fn extension_from_json(name: &str, value: Value) -> Result<Option<ExtensionValue>, ValidationError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(ExtensionValue::String(s))),
        Value::Bool(b) => Ok(Some(ExtensionValue::Boolean(b))),
        Value::Number(n) => n.as_i64().map(|i| Some(ExtensionValue::Integer(i))).ok_or_else(|| {
            ValidationError::MalformedEnvelope(format!("extension {} must be an integer", name))
        }),
        _ => Err(ValidationError::MalformedEnvelope(format!(
            "extension {} has unsupported type",
            name
        ))),
    }
}

/// Encode a derived event as a binary-mode response
pub fn encode_response(event: &CloudEvent) -> Response {
    let Some(ref context) = event.context else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let mut headers = HeaderMap::new();
    insert_attribute(&mut headers, "specversion", &context.spec_version);
    insert_attribute(&mut headers, "id", &context.id);
    insert_attribute(&mut headers, "source", &context.source);
    insert_attribute(&mut headers, "type", &context.event_type);

    if let Some(ref subject) = context.subject {
        insert_attribute(&mut headers, "subject", subject);
    }
    if let Some(time) = context.time {
        insert_attribute(
            &mut headers,
            "time",
            &time.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
    }
    if let Some(ref schema) = context.data_schema {
        insert_attribute(&mut headers, "dataschema", schema);
    }
    for (name, value) in &context.extensions {
        insert_attribute(&mut headers, name, &value.to_string());
    }

    if let Some(content_type) = context
        .data_content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        headers.insert(CONTENT_TYPE, content_type);
    }

    let body = event.data.clone().unwrap_or_default();
    (StatusCode::OK, headers, body).into_response()
}

fn insert_attribute(headers: &mut HeaderMap, attribute: &str, value: &str) {
    let name = HeaderName::try_from(format!("{}{}", HEADER_PREFIX, attribute));
    let value = HeaderValue::from_str(&encode_header_value(value));

    match (name, value) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        _ => warn!(attribute, "Dropping attribute that cannot be carried as a header"),
    }
}

/// Percent-encode space, `"`, `%` and anything outside printable ASCII
fn encode_header_value(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b' ' | b'"' | b'%' => encoded.push_str(&format!("%{:02X}", byte)),
            0x21..=0x7e => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

/// Router for one stage
pub fn create_router<H>(handler: Arc<H>) -> Router
where
    H: EventHandler + 'static,
{
    Router::new()
        .route("/", post(receive_event::<H>))
        .route("/health", get(health_check::<H>))
        .route("/ready", get(readiness_check::<H>))
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}

async fn receive_event<H>(
    State(handler): State<Arc<H>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    H: EventHandler + 'static,
{
    let stage = handler.name();
    counter!("imgguard.events.received", "stage" => stage).increment(1);

    let event = match decode_request(&headers, body) {
        Ok(event) => event,
        Err(e) => {
            warn!(stage, error = %e, "Rejected undecodable request");
            counter!("imgguard.events.rejected", "stage" => stage, "code" => e.code()).increment(1);
            return e.into_response();
        }
    };

    let event_id = event.id().unwrap_or_default().to_string();

    match handler.handle(event).await {
        Ok(Some(derived)) => {
            counter!("imgguard.events.succeeded", "stage" => stage).increment(1);
            info!(stage, event_id = %event_id, derived_id = derived.id().unwrap_or_default(), "Event handled");
            encode_response(&derived)
        }
        Ok(None) => {
            counter!("imgguard.events.succeeded", "stage" => stage).increment(1);
            info!(stage, event_id = %event_id, "Event handled");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            if e.status().is_client_error() {
                warn!(stage, event_id = %event_id, code = e.code(), error = %e, "Event rejected");
                counter!("imgguard.events.rejected", "stage" => stage, "code" => e.code())
                    .increment(1);
            } else {
                error!(
                    stage,
                    event_id = %event_id,
                    code = e.code(),
                    partial_failure = e.is_partial_failure(),
                    error = %e,
                    "Event failed"
                );
                counter!("imgguard.events.failed", "stage" => stage, "code" => e.code())
                    .increment(1);
            }
            e.into_response()
        }
    }
}

/// Health check endpoint
async fn health_check<H>(State(handler): State<Arc<H>>) -> impl IntoResponse
where
    H: EventHandler + 'static,
{
    Json(serde_json::json!({
        "status": "healthy",
        "service": handler.name()
    }))
}

/// Readiness check endpoint
async fn readiness_check<H>(State(handler): State<Arc<H>>) -> impl IntoResponse
where
    H: EventHandler + 'static,
{
    if handler.ready().await {
        (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ready" })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "not_ready" })),
        )
    }
}

/// Serve `handler` until SIGINT or SIGTERM
pub async fn serve<H>(handler: Arc<H>, config: &HttpConfig) -> Result<()>
where
    H: EventHandler + 'static,
{
    let router = create_router(handler.clone());
    let addr = config.bind_address();

    info!(address = %addr, stage = handler.name(), "Starting event receiver");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Event receiver error")?;

    info!(stage = handler.name(), "Event receiver stopped");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
