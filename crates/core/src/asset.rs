//! Asset kinds, storage path convention and inline payload decoding.
//!
//! Every stored artifact lives at a deterministic, version-qualified path:
//!
//! ```text
//! {owner_id}/{parent_id}/{kind}/v{version}.{ext}
//! ```
//!
//! Paths are never reused: the blob store refuses to overwrite an existing
//! path, so two writers racing for the same version cannot clobber each
//! other's bytes.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Asset kinds
// ---------------------------------------------------------------------------

/// What a generation job produces for a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// A still image.
    Image,
    /// A short video clip.
    Clip,
}

impl AssetKind {
    /// All kinds, in a stable order.
    pub const ALL: [AssetKind; 2] = [AssetKind::Image, AssetKind::Clip];

    /// Database / path representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Clip => "clip",
        }
    }

    /// MIME type assumed when neither the caller nor the source declares one.
    pub fn default_mime(self) -> &'static str {
        match self {
            Self::Image => "image/png",
            Self::Clip => "video/mp4",
        }
    }

    /// Whether `mime` is plausible for this kind.
    pub fn accepts_mime(self, mime: &str) -> bool {
        match self {
            Self::Image => mime.starts_with("image/"),
            Self::Clip => mime.starts_with("video/"),
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "clip" | "video" => Ok(Self::Clip),
            other => Err(CoreError::Validation(format!(
                "Unknown asset kind '{other}'. Must be one of: image, clip"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// MIME handling
// ---------------------------------------------------------------------------

/// Known MIME types and the file extension stored for each.
const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/webp", "webp"),
    ("image/gif", "gif"),
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("video/quicktime", "mov"),
];

/// Strip parameters (`; charset=...`) and normalise case.
pub fn normalize_mime(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// File extension for a MIME type, or `None` if unknown.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let mime = normalize_mime(mime);
    MIME_EXTENSIONS
        .iter()
        .find(|(m, _)| *m == mime)
        .map(|(_, ext)| *ext)
}

/// Choose the MIME type to store, in priority order: caller hint, type
/// declared by the source (data URI or `Content-Type`), kind default.
///
/// Candidates that are unknown or do not fit `kind` are skipped.
pub fn resolve_mime(kind: AssetKind, hint: Option<&str>, declared: Option<&str>) -> String {
    [hint, declared]
        .into_iter()
        .flatten()
        .map(normalize_mime)
        .find(|m| kind.accepts_mime(m) && extension_for_mime(m).is_some())
        .unwrap_or_else(|| kind.default_mime().to_string())
}

// ---------------------------------------------------------------------------
// Storage paths
// ---------------------------------------------------------------------------

/// Reject identifiers that could escape their directory.
pub fn validate_path_segment(field: &str, value: &str) -> Result<(), CoreError> {
    let ok = !value.is_empty()
        && value != "."
        && value != ".."
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "{field} '{value}' must be non-empty and contain only letters, digits, '-', '_' or '.'"
        )))
    }
}

/// Version-qualified blob path for an artifact.
///
/// # Examples
///
/// ```
/// use scenegen_core::asset::{storage_path, AssetKind};
///
/// assert_eq!(storage_path(7, "scene-1", AssetKind::Clip, 3, "mp4"), "7/scene-1/clip/v3.mp4");
/// ```
pub fn storage_path(
    owner_id: DbId,
    parent_id: &str,
    kind: AssetKind,
    version: i32,
    extension: &str,
) -> String {
    format!("{owner_id}/{parent_id}/{}/v{version}.{extension}", kind.as_str())
}

// ---------------------------------------------------------------------------
// Artifact references
// ---------------------------------------------------------------------------

/// Reference to a finished artifact: either an inline `data:` URI or a
/// remote URL the provider serves it from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` for `data:` URIs.
    pub fn is_inline(&self) -> bool {
        self.0.starts_with("data:")
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_inline() {
            // Inline payloads can be megabytes long; keep logs readable.
            let header = self.0.split(',').next().unwrap_or("data:");
            write!(f, "{header},…")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// A decoded `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinePayload {
    /// MIME type declared in the URI header, if any.
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

/// Decode a `data:[<mime>][;base64],<payload>` URI.
///
/// Non-base64 payloads are taken verbatim; percent-encoding is not
/// interpreted because providers only emit base64 payloads.
pub fn decode_data_uri(uri: &str) -> Result<InlinePayload, CoreError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| CoreError::Validation("Inline artifact must start with 'data:'".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| CoreError::Validation("Inline artifact is missing the ',' separator".into()))?;

    let mut params = header.split(';');
    let mime = params
        .next()
        .map(normalize_mime)
        .filter(|m| !m.is_empty());
    let is_base64 = params.any(|p| p.trim().eq_ignore_ascii_case("base64"));

    let bytes = if is_base64 {
        STANDARD
            .decode(payload.trim())
            .map_err(|e| CoreError::Validation(format!("Invalid base64 payload: {e}")))?
    } else {
        payload.as_bytes().to_vec()
    };

    if bytes.is_empty() {
        return Err(CoreError::Validation("Inline artifact is empty".into()));
    }

    Ok(InlinePayload { mime, bytes })
}

/// Encode bytes as a base64 `data:` URI.
pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}
