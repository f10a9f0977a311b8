//! The object store seam.
//!
//! Handlers only ever talk to `dyn ObjectStore`: get/put/delete by opaque key
//! plus a readiness probe. Concrete bindings live next door
//! (`memory_store`, `disk_store`).

use crate::models::object::{HttpMetadata, ObjectMeta};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use md5::Context;
use std::io;
use thiserror::Error;

/// A stream of payload chunks flowing into or out of a store.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// An object read back from a store: its metadata and a body stream.
pub struct StoredObject {
    pub meta: ObjectMeta,
    pub body: ByteStream,
}

/// Key-value byte-blob storage addressed by opaque string keys.
///
/// Keys are passed through untouched; implementations must not normalize or
/// reject them.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object, `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> StorageResult<Option<StoredObject>>;

    /// Store `body` under `key`, replacing any previous object.
    async fn put(
        &self,
        key: &str,
        http_metadata: HttpMetadata,
        body: ByteStream,
    ) -> StorageResult<ObjectMeta>;

    /// Remove `key`. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Cheap readiness probe for the backing resources.
    async fn ping(&self) -> StorageResult<()>;
}

/// Running size and MD5 over a payload as it streams through.
pub(crate) struct Digest {
    size_bytes: i64,
    context: Context,
}

impl Digest {
    pub(crate) fn new() -> Self {
        Self {
            size_bytes: 0,
            context: Context::new(),
        }
    }

    pub(crate) fn consume(&mut self, chunk: &[u8]) {
        self.size_bytes += chunk.len() as i64;
        self.context.consume(chunk);
    }

    /// Returns `(size_bytes, hex etag)`.
    pub(crate) fn finish(self) -> (i64, String) {
        (self.size_bytes, format!("{:x}", self.context.compute()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_known_md5() {
        let mut digest = Digest::new();
        digest.consume(b"hel");
        digest.consume(b"lo");
        let (size, etag) = digest.finish();
        assert_eq!(size, 5);
        assert_eq!(etag, "5d41402abc4b2a76b9719d911017c592");
    }
}
