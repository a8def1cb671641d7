//! Wire encodings and the resolved intermediate payload.

use std::fmt;
use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde_json::{Map, Value};

use super::message::{headers, RawMessage};

/// `event_type` marker of class-serialized events.
pub const SERIALIZED_EVENT_MARKER: &str = "serialized_event";
/// `event_type` marker of protobuf events.
pub const PB_EVENT_MARKER: &str = "pb_event";

/// Payload encoding selected by the `event_type` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Generic,
    SerializedEvent,
    ProtobufEvent,
}

impl Encoding {
    /// Anything other than the two markers, including no header, is generic.
    pub fn of(message: &RawMessage) -> Self {
        match message.header(headers::EVENT_TYPE) {
            Some(SERIALIZED_EVENT_MARKER) => Self::SerializedEvent,
            Some(PB_EVENT_MARKER) => Self::ProtobufEvent,
            _ => Self::Generic,
        }
    }
}

/// Pointer to a heavy payload stored outside the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffloadReference {
    pub hash: String,
    pub disk: String,
    pub bucket: Option<String>,
    pub compressed: bool,
}

impl OffloadReference {
    /// Read the offload headers of a message.
    ///
    /// Returns `None` when the message declares no heavy-payload hash.
    pub fn from_message(
        message: &RawMessage,
        default_disk: &str,
        default_bucket: Option<&str>,
    ) -> Option<Self> {
        let hash = message
            .header(headers::EVENT_HEAVY_PAYLOAD_HASH)
            .filter(|h| !h.is_empty())?;

        let bucket = message
            .header(headers::EVENT_HEAVY_PAYLOAD_BUCKET)
            .or_else(|| message.header(headers::EVENT_CUSTOM_BUCKET))
            .or(default_bucket);

        Some(Self {
            hash: hash.to_string(),
            disk: message
                .header(headers::EVENT_HEAVY_PAYLOAD_DISK)
                .unwrap_or(default_disk)
                .to_string(),
            bucket: bucket.map(str::to_string),
            compressed: message
                .header(headers::EVENT_COMPRESS)
                .is_some_and(is_truthy),
        })
    }

    /// Blob key of the payload.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}.json", self.hash)
    }
}

fn is_truthy(value: &str) -> bool {
    !value.is_empty() && value != "0"
}

/// Inflate a zlib stream.
pub fn decompress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(bytes.len() * 4);
    ZlibDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

/// Deflate into a zlib stream, as producers do before offloading.
pub fn compress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// Which registry namespace a resolved payload targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Serialized,
    Generic,
    Protobuf,
    /// Generic event with no registered type.
    Unrecognized,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Serialized => "serialized",
            Self::Generic => "generic",
            Self::Protobuf => "protobuf",
            Self::Unrecognized => "unrecognized",
        })
    }
}

/// Decoded message, ready to be turned into a domain event.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPayload {
    /// Registry key (class name, qualified generic name or protobuf name).
    pub target: String,
    pub kind: TargetKind,
    pub fields: Map<String, Value>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    /// Producer id as carried on the message.
    pub producer: Option<String>,
}

/// Why a recognized message was accepted without dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UnknownClass(String),
    UnknownProtoName(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownClass(class) => write!(f, "unknown event class {class:?}"),
            Self::UnknownProtoName(name) => write!(f, "unknown protobuf name {name:?}"),
        }
    }
}

/// Result of resolving a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Dispatch(ResolvedPayload),
    Skip(SkipReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_selection() {
        let msg = RawMessage::new("{}");
        assert_eq!(Encoding::of(&msg), Encoding::Generic);

        let msg = msg.with_header(headers::EVENT_TYPE, SERIALIZED_EVENT_MARKER);
        assert_eq!(Encoding::of(&msg), Encoding::SerializedEvent);

        let msg = msg.with_header(headers::EVENT_TYPE, PB_EVENT_MARKER);
        assert_eq!(Encoding::of(&msg), Encoding::ProtobufEvent);

        let msg = msg.with_header(headers::EVENT_TYPE, "something_else");
        assert_eq!(Encoding::of(&msg), Encoding::Generic);
    }

    #[test]
    fn test_offload_reference_defaults() {
        let msg = RawMessage::new("{}").with_header(headers::EVENT_HEAVY_PAYLOAD_HASH, "abc");
        let offload = OffloadReference::from_message(&msg, "offloads", Some("heavy")).unwrap();
        assert_eq!(offload.disk, "offloads");
        assert_eq!(offload.bucket.as_deref(), Some("heavy"));
        assert!(!offload.compressed);
        assert_eq!(offload.key(), "abc.json");
    }

    #[test]
    fn test_offload_reference_headers() {
        let msg = RawMessage::new("{}")
            .with_header(headers::EVENT_HEAVY_PAYLOAD_HASH, "abc")
            .with_header(headers::EVENT_HEAVY_PAYLOAD_DISK, "s3")
            .with_header(headers::EVENT_CUSTOM_BUCKET, "legacy")
            .with_header(headers::EVENT_COMPRESS, "1");
        let offload = OffloadReference::from_message(&msg, "offloads", Some("heavy")).unwrap();
        assert_eq!(offload.disk, "s3");
        assert_eq!(offload.bucket.as_deref(), Some("legacy"));
        assert!(offload.compressed);

        let msg = msg.with_header(headers::EVENT_HEAVY_PAYLOAD_BUCKET, "current");
        let offload = OffloadReference::from_message(&msg, "offloads", None).unwrap();
        assert_eq!(offload.bucket.as_deref(), Some("current"));
    }

    #[test]
    fn test_no_hash_no_offload() {
        let msg = RawMessage::new("{}").with_header(headers::EVENT_HEAVY_PAYLOAD_HASH, "");
        assert!(OffloadReference::from_message(&msg, "offloads", None).is_none());
    }

    #[test]
    fn test_compress_falsy_values() {
        assert!(!is_truthy(""));
        assert!(!is_truthy("0"));
        assert!(is_truthy("true"));
    }

    #[test]
    fn test_zlib_decompress() {
        let packed = compress(br#"{"a":1}"#).unwrap();
        assert_eq!(decompress(&packed).unwrap(), br#"{"a":1}"#);
        assert!(decompress(b"not zlib").is_err());
    }
}
