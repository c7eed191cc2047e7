//! Response entry reads and writes.

use bytes::Bytes;
use tokio_rusqlite::{params, rusqlite};

use super::connection::CacheDb;
use crate::{CachedResponse, Error, RequestKey};

/// A stored response together with where and when it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub generation: String,
    pub key: RequestKey,
    pub response: CachedResponse,
    pub stored_at: String,
}

impl CacheDb {
    /// Insert or replace the entry for `key` in `generation`.
    ///
    /// The generation is created on first write. Non-2xx responses are
    /// rejected with `Error::InvalidInput`.
    pub async fn put_entry(&self, generation: &str, key: &RequestKey, response: &CachedResponse) -> Result<(), Error> {
        self.write_entry(generation, key, response, true).await.map(|_| ())
    }

    /// Like [`put_entry`](Self::put_entry), but only while `generation` exists.
    ///
    /// Returns `false` without writing when the generation has been deleted.
    /// The existence check and the write share one transaction, so a write
    /// racing a delete never brings the generation back.
    pub async fn put_entry_if_present(
        &self, generation: &str, key: &RequestKey, response: &CachedResponse,
    ) -> Result<bool, Error> {
        self.write_entry(generation, key, response, false).await
    }

    async fn write_entry(
        &self, generation: &str, key: &RequestKey, response: &CachedResponse, create: bool,
    ) -> Result<bool, Error> {
        if !response.is_success() {
            return Err(Error::InvalidInput(format!(
                "refusing to store status {} for {key}",
                response.status
            )));
        }

        let generation = generation.to_string();
        let key_hash = key.hash();
        let method = key.method().to_string();
        let url = key.url().to_string();
        let status = i64::from(response.status);
        let headers_json = serde_json::to_string(&response.headers)?;
        let body = response.body.clone();
        let now = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                if create {
                    tx.execute(
                        "INSERT OR IGNORE INTO generations (name, created_at) VALUES (?1, ?2)",
                        params![generation, now],
                    )?;
                } else {
                    let present: bool = tx.query_row(
                        "SELECT EXISTS(SELECT 1 FROM generations WHERE name = ?1)",
                        params![generation],
                        |row| row.get(0),
                    )?;
                    if !present {
                        return Ok(false);
                    }
                }
                tx.execute(
                    "INSERT INTO entries (
                    generation, key_hash, method, url, status_code, headers_json, body, stored_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(generation, key_hash) DO UPDATE SET
                    method = excluded.method,
                    url = excluded.url,
                    status_code = excluded.status_code,
                    headers_json = excluded.headers_json,
                    body = excluded.body,
                    stored_at = excluded.stored_at",
                    params![generation, key_hash, method, url, status, headers_json, body.as_ref(), now],
                )?;
                tx.commit()?;
                Ok(true)
            })
            .await
            .map_err(Error::from)
    }

    /// Get the entry for `key` in `generation`.
    ///
    /// Returns None on a miss, including when the generation does not exist.
    pub async fn get_entry(&self, generation: &str, key: &RequestKey) -> Result<Option<CacheEntry>, Error> {
        let generation = generation.to_string();
        let key_hash = key.hash();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT method, url, status_code, headers_json, body, stored_at
                FROM entries WHERE generation = ?1 AND key_hash = ?2",
                )?;

                let row = stmt.query_row(params![generation, key_hash], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                });

                let (method, url, status, headers_json, body, stored_at) = match row {
                    Ok(r) => r,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };

                let status = u16::try_from(status)
                    .map_err(|_| Error::InvalidInput(format!("stored status out of range: {status}")))?;
                let headers: Vec<(String, String)> = serde_json::from_str(&headers_json)?;

                Ok(Some(CacheEntry {
                    generation,
                    key: RequestKey::from_stored(method, url),
                    response: CachedResponse { status, headers, body: Bytes::from(body) },
                    stored_at,
                }))
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries held by `generation`.
    pub async fn entry_count(&self, generation: &str) -> Result<u64, Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entries WHERE generation = ?1",
                    params![generation],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn key(path: &str) -> RequestKey {
        RequestKey::new("GET", &Url::parse("https://app.example.com").unwrap().join(path).unwrap())
    }

    fn font() -> CachedResponse {
        CachedResponse::new(200, &b"wOF2"[..]).with_header("content-type", "font/woff2")
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let key = key("/fonts/Regular.woff2");

        db.put_entry("v1", &key, &font()).await.unwrap();

        let entry = db.get_entry("v1", &key).await.unwrap().unwrap();
        assert_eq!(entry.generation, "v1");
        assert_eq!(entry.key, key);
        assert_eq!(entry.response, font());
    }

    #[tokio::test]
    async fn test_put_creates_cold_generation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.list_generations().await.unwrap().is_empty());

        db.put_entry("v7", &key("/app.js"), &CachedResponse::new(200, "js"))
            .await
            .unwrap();

        assert!(db.list_generations().await.unwrap().contains("v7"));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let key = key("/api/health");

        db.put_entry("v1", &key, &CachedResponse::new(200, "old")).await.unwrap();
        db.put_entry("v1", &key, &CachedResponse::new(201, "new")).await.unwrap();

        let entry = db.get_entry("v1", &key).await.unwrap().unwrap();
        assert_eq!(entry.response.status, 201);
        assert_eq!(entry.response.body, Bytes::from_static(b"new"));
        assert_eq!(db.entry_count("v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_put_rejects_non_success() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let key = key("/missing.png");

        let result = db.put_entry("v1", &key, &CachedResponse::new(404, "nope")).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(db.get_entry("v1", &key).await.unwrap().is_none());
        assert!(db.list_generations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generations_are_isolated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let key = key("/index.html");

        db.put_entry("v1", &key, &CachedResponse::new(200, "one")).await.unwrap();

        assert!(db.get_entry("v2", &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_generation_removes_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry("v1", &key("/"), &CachedResponse::new(200, "root")).await.unwrap();
        db.put_entry("v1", &key("/index.html"), &CachedResponse::new(200, "index"))
            .await
            .unwrap();
        db.put_entry("v2", &key("/"), &CachedResponse::new(200, "root2")).await.unwrap();

        let removed = db.delete_generation("v1").await.unwrap();
        assert_eq!(removed, 2);
        assert!(db.get_entry("v1", &key("/")).await.unwrap().is_none());
        assert_eq!(db.entry_count("v1").await.unwrap(), 0);
        assert!(db.get_entry("v2", &key("/")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_put_if_present_writes_open_generation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_generation("v1").await.unwrap();

        let written = db.put_entry_if_present("v1", &key("/app.js"), &CachedResponse::new(200, "js")).await.unwrap();

        assert!(written);
        assert_eq!(db.entry_count("v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_put_if_present_skips_deleted_generation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_generation("v1").await.unwrap();
        db.delete_generation("v1").await.unwrap();

        let written = db.put_entry_if_present("v1", &key("/app.js"), &CachedResponse::new(200, "js")).await.unwrap();

        assert!(!written);
        assert!(db.list_generations().await.unwrap().is_empty());
        assert!(db.get_entry("v1", &key("/app.js")).await.unwrap().is_none());
    }
}
