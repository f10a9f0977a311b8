//! src/services/disk_store.rs
//!
//! DiskStore — object payloads on local disk, metadata in SQLite.
//!
//! Payloads are sharded beneath `base_path/{shard}/{shard}/{md5(key)}-{uuid}`.
//! File names derive from the key's digest rather than the key itself, so any
//! opaque key (empty, containing `..`, `\0`, or thousands of bytes long) maps
//! to a well-formed path inside `base_path`.
//!
//! Every upload gets a fresh file. The row in `objects` names the file that
//! belongs to it, so a payload only becomes visible when the transaction that
//! records its size and etag commits, and a superseded file is unlinked only
//! after that commit.

use crate::{
    models::object::{HttpMetadata, ObjectMeta},
    services::storage::{
        ByteStream, Digest, ObjectStore, StorageError, StorageResult, StoredObject,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use sqlx::{
    FromRow, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

/// Schema for the metadata database, embedded at build time.
const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// One row of the `objects` table.
#[derive(FromRow, Debug)]
struct ObjectRow {
    key: String,
    file_name: String,
    size_bytes: i64,
    etag: String,
    content_type: Option<String>,
    content_language: Option<String>,
    content_disposition: Option<String>,
    content_encoding: Option<String>,
    cache_control: Option<String>,
    uploaded: DateTime<Utc>,
}

impl From<ObjectRow> for ObjectMeta {
    fn from(row: ObjectRow) -> Self {
        ObjectMeta {
            key: row.key,
            size_bytes: row.size_bytes,
            etag: row.etag,
            http_metadata: HttpMetadata {
                content_type: row.content_type,
                content_language: row.content_language,
                content_disposition: row.content_disposition,
                content_encoding: row.content_encoding,
                cache_control: row.cache_control,
            },
            uploaded: row.uploaded,
        }
    }
}

#[derive(Clone)]
pub struct DiskStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl DiskStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Connect to the metadata database, creating the file if needed.
    pub async fn connect(database_url: &str) -> StorageResult<SqlitePool> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(pool)
    }

    /// Open a store: connect, apply the schema and make sure `base_path` exists.
    pub async fn open(database_url: &str, base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let pool = Self::connect(database_url).await?;
        migrate(&pool).await?;
        let store = Self::new(Arc::new(pool), base_path);
        fs::create_dir_all(&store.base_path).await?;
        Ok(store)
    }

    /// A fresh payload file name for `key`, relative to `base_path`.
    ///
    /// Uses MD5(key): the first two bytes become the shard directories
    /// (00–ff), the full hex digest plus a random suffix the file name.
    fn new_file_name(key: &str) -> String {
        let digest = md5::compute(key.as_bytes());
        format!(
            "{:02x}/{:02x}/{:x}-{}",
            digest[0],
            digest[1],
            digest,
            Uuid::new_v4().simple()
        )
    }

    fn payload_path(&self, file_name: &str) -> PathBuf {
        self.base_path.join(file_name)
    }

    async fn fetch_row(&self, key: &str) -> StorageResult<Option<ObjectRow>> {
        let row = sqlx::query_as::<_, ObjectRow>(
            "SELECT key, file_name, size_bytes, etag, content_type, content_language,
                    content_disposition, content_encoding, cache_control, uploaded
             FROM objects WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row)
    }

    /// Stream the payload into its own file and fsync it.
    /// Returns `(size, etag)`.
    ///
    /// The file is removed on any error. No row points at it yet, so a
    /// partial write is never visible to readers.
    async fn write_payload(
        &self,
        file_path: &Path,
        mut body: ByteStream,
    ) -> StorageResult<(i64, String)> {
        let parent = file_path.parent().ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(parent).await?;

        match Self::write_file(file_path, &mut body).await {
            Ok(digest) => Ok(digest.finish()),
            Err(err) => {
                let _ = fs::remove_file(file_path).await;
                Err(StorageError::Io(err))
            }
        }
    }

    async fn write_file(file_path: &Path, body: &mut ByteStream) -> io::Result<Digest> {
        let mut file = File::create(file_path).await?;
        let mut digest = Digest::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            digest.consume(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(digest)
    }

    /// Point `key` at `file_name` and return the new row together with the
    /// file it replaced, if any.
    ///
    /// The old row is taken out and the new one written in one transaction.
    /// Its first statement is a write, so concurrent writers queue on the
    /// SQLite write lock instead of interleaving. Dropping the transaction
    /// on any error rolls it back and leaves the previous row in place.
    async fn swap_row(
        &self,
        key: &str,
        file_name: &str,
        size_bytes: i64,
        etag: &str,
        http_metadata: &HttpMetadata,
    ) -> StorageResult<(ObjectRow, Option<String>)> {
        let mut tx = self.db.begin().await?;

        let previous: Option<String> =
            sqlx::query_scalar("DELETE FROM objects WHERE key = ? RETURNING file_name")
                .bind(key)
                .fetch_optional(&mut *tx)
                .await?;

        let row = sqlx::query_as::<_, ObjectRow>(
            r#"
            INSERT INTO objects (
                key, file_name, size_bytes, etag, content_type, content_language,
                content_disposition, content_encoding, cache_control, uploaded
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING key, file_name, size_bytes, etag, content_type, content_language,
                      content_disposition, content_encoding, cache_control, uploaded
            "#,
        )
        .bind(key)
        .bind(file_name)
        .bind(size_bytes)
        .bind(etag)
        .bind(&http_metadata.content_type)
        .bind(&http_metadata.content_language)
        .bind(&http_metadata.content_disposition)
        .bind(&http_metadata.content_encoding)
        .bind(&http_metadata.cache_control)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((row, previous))
    }

    /// Unlink a payload file that no row refers to any more.
    async fn remove_payload(&self, file_name: &str) -> StorageResult<()> {
        let file_path = self.payload_path(file_name);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    /// Remove empty shard directories up to `base_path`.
    ///
    /// Stops at the first directory that is not empty, missing, or fails.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

/// Apply the embedded schema. Safe to run repeatedly.
pub async fn migrate(db: &SqlitePool) -> StorageResult<()> {
    let statements = SCHEMA
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for DiskStore {
    /// A metadata row whose payload file has gone missing reads as absent.
    ///
    /// A put that commits between reading the row and opening its file
    /// unlinks the old payload; the lookup is then retried against the new row.
    async fn get(&self, key: &str) -> StorageResult<Option<StoredObject>> {
        let mut last_file = None;
        loop {
            let Some(row) = self.fetch_row(key).await? else {
                return Ok(None);
            };

            let file_path = self.payload_path(&row.file_name);
            match File::open(&file_path).await {
                Ok(file) => {
                    return Ok(Some(StoredObject {
                        meta: row.into(),
                        body: ReaderStream::new(file).boxed(),
                    }));
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    if last_file.as_deref() == Some(row.file_name.as_str()) {
                        debug!("payload {} missing for key {:?}", file_path.display(), key);
                        return Ok(None);
                    }
                    last_file = Some(row.file_name);
                }
                Err(err) => return Err(StorageError::Io(err)),
            }
        }
    }

    /// Upsert semantics: a second put on the same key replaces payload and
    /// metadata. A failed put leaves the previous object untouched.
    async fn put(
        &self,
        key: &str,
        http_metadata: HttpMetadata,
        body: ByteStream,
    ) -> StorageResult<ObjectMeta> {
        let file_name = Self::new_file_name(key);
        let file_path = self.payload_path(&file_name);
        let (size_bytes, etag) = self.write_payload(&file_path, body).await?;

        let (row, previous) = match self
            .swap_row(key, &file_name, size_bytes, &etag, &http_metadata)
            .await
        {
            Ok(swapped) => swapped,
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                return Err(err);
            }
        };

        // The new object is committed; a leftover old file only wastes space.
        if let Some(previous) = previous {
            if let Err(err) = self.remove_payload(&previous).await {
                tracing::warn!("failed to remove superseded payload {}: {}", previous, err);
            }
        }

        Ok(row.into())
    }

    /// Drops the metadata row first so readers stop seeing the object even if
    /// the file removal below fails.
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let removed: Option<String> =
            sqlx::query_scalar("DELETE FROM objects WHERE key = ? RETURNING file_name")
                .bind(key)
                .fetch_optional(&*self.db)
                .await?;

        match removed {
            Some(file_name) => self.remove_payload(&file_name).await,
            None => {
                debug!("delete of absent key {:?}", key);
                Ok(())
            }
        }
    }

    /// `SELECT 1` against SQLite, then a write/read/delete round trip on a
    /// scratch file under `base_path`.
    async fn ping(&self) -> StorageResult<()> {
        let one = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if one != 1 {
            return Err(StorageError::Io(io::Error::new(
                ErrorKind::Other,
                format!("unexpected SELECT 1 result: {}", one),
            )));
        }

        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let read_back = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if read_back? != b"readyz" {
            return Err(StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "file content mismatch",
            )));
        }
        Ok(())
    }
}
