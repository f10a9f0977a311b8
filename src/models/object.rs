//! Represents an object (blob) addressed by an opaque key.

use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use chrono::{DateTime, Utc};

/// Standard HTTP headers persisted alongside an object and replayed on read.
///
/// Captured from the PUT request and written back onto the GET response,
/// so a client gets back the representation headers it uploaded with.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpMetadata {
    pub content_type: Option<String>,
    pub content_language: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub cache_control: Option<String>,
}

impl HttpMetadata {
    /// Pick the representation headers out of an inbound request.
    ///
    /// Values that are not valid visible ASCII are skipped.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Self {
            content_type: read(header::CONTENT_TYPE),
            content_language: read(header::CONTENT_LANGUAGE),
            content_disposition: read(header::CONTENT_DISPOSITION),
            content_encoding: read(header::CONTENT_ENCODING),
            cache_control: read(header::CACHE_CONTROL),
        }
    }

    /// Write the stored headers onto an outbound response.
    pub fn write_headers(&self, headers: &mut HeaderMap) {
        let fields = [
            (header::CONTENT_TYPE, &self.content_type),
            (header::CONTENT_LANGUAGE, &self.content_language),
            (header::CONTENT_DISPOSITION, &self.content_disposition),
            (header::CONTENT_ENCODING, &self.content_encoding),
            (header::CACHE_CONTROL, &self.cache_control),
        ];
        for (name, value) in fields {
            if let Some(value) = value.as_deref() {
                if let Ok(value) = HeaderValue::from_str(value) {
                    headers.insert(name, value);
                }
            }
        }
    }
}

/// Metadata for a single stored object.
///
/// The struct describes the payload, it does not hold the bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Object key (URL path minus its leading `/`).
    pub key: String,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Lowercase hex MD5 of the payload.
    pub etag: String,

    /// Representation headers captured at upload time.
    pub http_metadata: HttpMetadata,

    /// When the object was last written.
    pub uploaded: DateTime<Utc>,
}

impl ObjectMeta {
    /// The etag in its HTTP form, i.e. quoted.
    pub fn http_etag(&self) -> String {
        format!("\"{}\"", self.etag)
    }
}
