//! Decoding of raw messages into [`ResolvedPayload`]s.
//!
//! ```text
//! event_type = serialized_event -> event_class lookup, JSON body, optional offload merge
//! event_type = pb_event         -> protobuf name lookup, JSON body
//! anything else                 -> generic: namespaced event name, JSON or raw body
//! ```

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::{
    headers, payload, Encoding, EventRegistry, OffloadReference, RawMessage, Resolution,
    ResolvedPayload, SkipReason, TargetKind,
};
use crate::error::ConsumerError;
use crate::ports::BlobStore;

pub struct PayloadResolver {
    registry: Arc<EventRegistry>,
    blob_store: Arc<dyn BlobStore>,
    default_disk: String,
    default_bucket: Option<String>,
}

impl PayloadResolver {
    pub fn new(
        registry: Arc<EventRegistry>,
        blob_store: Arc<dyn BlobStore>,
        default_disk: impl Into<String>,
        default_bucket: Option<String>,
    ) -> Self {
        Self {
            registry,
            blob_store,
            default_disk: default_disk.into(),
            default_bucket,
        }
    }

    pub async fn resolve(&self, message: &RawMessage) -> Result<Resolution, ConsumerError> {
        match Encoding::of(message) {
            Encoding::SerializedEvent => self.resolve_serialized(message).await,
            Encoding::ProtobufEvent => self.resolve_protobuf(message),
            Encoding::Generic => self.resolve_generic(message),
        }
    }

    async fn resolve_serialized(&self, message: &RawMessage) -> Result<Resolution, ConsumerError> {
        let class = message.header(headers::EVENT_CLASS).unwrap_or_default();
        if !self.registry.contains(TargetKind::Serialized, class) {
            debug!(event_class = class, "Event class is not registered");
            return Ok(Resolution::Skip(SkipReason::UnknownClass(class.to_string())));
        }

        let mut fields = decode_object(class, &message.body)?;

        if let Some(offload) = OffloadReference::from_message(
            message,
            &self.default_disk,
            self.default_bucket.as_deref(),
        ) {
            self.merge_offloaded(&offload, &mut fields).await?;
        }

        Ok(Resolution::Dispatch(payload_for(
            message,
            class.to_string(),
            TargetKind::Serialized,
            fields,
        )))
    }

    /// Fill `fields` with the heavy payload. Inline fields win on collision.
    async fn merge_offloaded(
        &self,
        offload: &OffloadReference,
        fields: &mut Map<String, Value>,
    ) -> Result<(), ConsumerError> {
        let bytes = self
            .blob_store
            .get(&offload.disk, offload.bucket.as_deref(), &offload.key())
            .await
            .map_err(|source| ConsumerError::OffloadedPayloadNotFound {
                hash: offload.hash.clone(),
                source,
            })?;

        let bytes = if offload.compressed {
            match payload::decompress(&bytes) {
                Ok(inflated) => inflated,
                Err(e) => {
                    warn!(
                        hash = %offload.hash,
                        disk = %offload.disk,
                        bucket = ?offload.bucket,
                        error = %e,
                        "Cannot decompress heavy payload"
                    );
                    return Ok(());
                }
            }
        } else {
            bytes
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(heavy)) => {
                for (key, value) in heavy {
                    fields.entry(key).or_insert(value);
                }
            }
            _ => warn!(
                hash = %offload.hash,
                disk = %offload.disk,
                bucket = ?offload.bucket,
                "empty heavy payload"
            ),
        }
        Ok(())
    }

    fn resolve_protobuf(&self, message: &RawMessage) -> Result<Resolution, ConsumerError> {
        let name = message.header(headers::EVENT).unwrap_or_default();
        if !self.registry.contains(TargetKind::Protobuf, name) {
            warn!(event = name, "Unknown event type");
            return Ok(Resolution::Skip(SkipReason::UnknownProtoName(
                name.to_string(),
            )));
        }

        let fields = decode_object(name, &message.body)?;
        Ok(Resolution::Dispatch(payload_for(
            message,
            name.to_string(),
            TargetKind::Protobuf,
            fields,
        )))
    }

    fn resolve_generic(&self, message: &RawMessage) -> Result<Resolution, ConsumerError> {
        let name = message.header(headers::EVENT).unwrap_or_default();
        let key = self.registry.generic_key(name);

        let body = match serde_json::from_str::<Value>(&message.body) {
            Ok(Value::Null) | Err(_) => Value::String(message.body.clone()),
            Ok(decoded) => decoded,
        };

        if self.registry.contains(TargetKind::Generic, &key) {
            let fields = match body {
                Value::Object(fields) => fields,
                other => {
                    return Err(ConsumerError::PayloadDecode {
                        target: key,
                        reason: format!("expected a JSON object, got {}", json_kind(&other)),
                    })
                }
            };
            return Ok(Resolution::Dispatch(payload_for(
                message,
                key,
                TargetKind::Generic,
                fields,
            )));
        }

        debug!(event = name, key = %key, "No generic event registered, using fallback");
        let header_map = message
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let mut fields = Map::new();
        fields.insert("headers".to_string(), Value::Object(header_map));
        fields.insert("payload".to_string(), body);

        Ok(Resolution::Dispatch(payload_for(
            message,
            name.to_string(),
            TargetKind::Unrecognized,
            fields,
        )))
    }
}

fn payload_for(
    message: &RawMessage,
    target: String,
    kind: TargetKind,
    fields: Map<String, Value>,
) -> ResolvedPayload {
    ResolvedPayload {
        target,
        kind,
        fields,
        correlation_id: message.correlation_id().map(str::to_string),
        reply_to: message.reply_destination().map(str::to_string),
        producer: message.producer().map(str::to_string),
    }
}

fn decode_object(target: &str, body: &str) -> Result<Map<String, Value>, ConsumerError> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(ConsumerError::PayloadDecode {
            target: target.to_string(),
            reason: format!("expected a JSON object, got {}", json_kind(&other)),
        }),
        Err(e) => Err(ConsumerError::PayloadDecode {
            target: target.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
