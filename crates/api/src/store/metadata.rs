//! Metadata recorded next to every stored version.

use std::io::Cursor;

use scenegen_core::error::CoreError;
use scenegen_core::hashing::sha256_hex;
use serde_json::{Map, Value};

use super::source::FetchedSource;

/// Accept the caller's metadata as a JSON object (absent or `null` is empty).
pub fn caller_metadata(value: Option<Value>) -> Result<Map<String, Value>, CoreError> {
    match value {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(CoreError::Validation("metadata must be a JSON object".into())),
    }
}

/// Merge content facts into the caller's metadata. Computed keys win.
pub fn enrich(mut metadata: Map<String, Value>, fetched: &FetchedSource, mime_type: &str) -> Value {
    metadata.insert("size_bytes".into(), fetched.bytes.len().into());
    metadata.insert("sha256".into(), sha256_hex(&fetched.bytes).into());
    metadata.insert("mime_type".into(), mime_type.into());
    if let Some(url) = &fetched.source_url {
        metadata.insert("source_url".into(), url.clone().into());
    }
    if mime_type.starts_with("image/") {
        if let Some((width, height)) = image_dimensions(&fetched.bytes) {
            metadata.insert("width".into(), width.into());
            metadata.insert("height".into(), height.into());
        }
    }
    Value::Object(metadata)
}

/// Read dimensions from the image header without decoding pixels.
pub fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
