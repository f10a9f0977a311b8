//! In-process object store.
//!
//! Keeps whole payloads in memory. Used for ephemeral deployments and as the
//! fake behind handler tests.

use crate::{
    models::object::{HttpMetadata, ObjectMeta},
    services::storage::{ByteStream, Digest, ObjectStore, StorageResult, StoredObject},
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::{StreamExt, stream};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, (ObjectMeta, Bytes)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> StorageResult<Option<StoredObject>> {
        let objects = self.objects.read().await;
        Ok(objects.get(key).map(|(meta, payload)| StoredObject {
            meta: meta.clone(),
            body: stream::once(futures::future::ready(Ok(payload.clone()))).boxed(),
        }))
    }

    async fn put(
        &self,
        key: &str,
        http_metadata: HttpMetadata,
        mut body: ByteStream,
    ) -> StorageResult<ObjectMeta> {
        // Collect before taking the lock so a slow upload never blocks readers.
        let mut buf = BytesMut::new();
        let mut digest = Digest::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            digest.consume(&chunk);
            buf.extend_from_slice(&chunk);
        }
        let (size_bytes, etag) = digest.finish();

        let meta = ObjectMeta {
            key: key.to_string(),
            size_bytes,
            etag,
            http_metadata,
            uploaded: Utc::now(),
        };

        self.objects
            .write()
            .await
            .insert(key.to_string(), (meta.clone(), buf.freeze()));
        Ok(meta)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::io;

    fn body(parts: &[&'static str]) -> ByteStream {
        let chunks: Vec<io::Result<Bytes>> = parts
            .iter()
            .map(|p| Ok(Bytes::from_static(p.as_bytes())))
            .collect();
        stream::iter(chunks).boxed()
    }

    async fn read_all(obj: StoredObject) -> Vec<u8> {
        let chunks: Vec<Bytes> = obj.body.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn put_then_get_returns_payload_and_etag() {
        let store = MemoryStore::new();
        let meta = store
            .put("a/b.txt", HttpMetadata::default(), body(&["hel", "lo"]))
            .await
            .unwrap();
        assert_eq!(meta.size_bytes, 5);
        assert_eq!(meta.etag, "5d41402abc4b2a76b9719d911017c592");

        let obj = store.get("a/b.txt").await.unwrap().unwrap();
        assert_eq!(obj.meta, meta);
        assert_eq!(read_all(obj).await, b"hello");
    }

    #[tokio::test]
    async fn put_overwrites_previous_object() {
        let store = MemoryStore::new();
        store.put("k", HttpMetadata::default(), body(&["one"])).await.unwrap();
        store.put("k", HttpMetadata::default(), body(&["two"])).await.unwrap();

        let obj = store.get("k").await.unwrap().unwrap();
        assert_eq!(read_all(obj).await, b"two");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        store.put("k", HttpMetadata::default(), body(&["x"])).await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn keys_are_not_normalized() {
        let store = MemoryStore::new();
        store.put("a//b", HttpMetadata::default(), body(&["x"])).await.unwrap();
        assert!(store.get("a/b").await.unwrap().is_none());
        assert!(store.get("a//b").await.unwrap().is_some());
    }
}
