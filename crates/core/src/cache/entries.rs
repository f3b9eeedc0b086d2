//! Entry CRUD operations within a generation.
//!
//! Expired entries are never returned: [`CacheDb::match_entry`] deletes them
//! on sight, and the purge functions sweep them in bulk.

use super::REFRESH_RECORD_KEY;
use super::connection::CacheDb;
use super::generations::GenerationHandle;
use super::hash::RequestKey;
use crate::Error;
use crate::http::{Response, ResponseKind};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A stored response and its bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub method: String,
    pub url: String,
    pub response: Response,
    pub stored_at: i64,
    pub expires_at: Option<i64>,
}

impl CacheEntry {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now_ms)
    }
}

type EntryRow = (String, String, i64, String, String, Vec<u8>, i64, Option<i64>);

fn decode_row(row: EntryRow) -> Result<CacheEntry, Error> {
    let (method, url, status, kind, headers_json, body, stored_at, expires_at) = row;
    let status = u16::try_from(status).map_err(|_| Error::CorruptEntry(format!("status {status} for {url}")))?;
    let kind = ResponseKind::parse(&kind).ok_or_else(|| Error::CorruptEntry(format!("kind {kind} for {url}")))?;
    let headers: Vec<(String, String)> = serde_json::from_str(&headers_json)?;
    Ok(CacheEntry {
        method,
        response: Response { url: url.clone(), status, headers, body, kind },
        url,
        stored_at,
        expires_at,
    })
}

/// Upsert one entry. Shared with the install transaction.
pub(crate) fn insert_entry(
    conn: &rusqlite::Connection, generation: &str, key: &RequestKey, response: &Response, stored_at: i64,
    expires_at: Option<i64>,
) -> Result<(), Error> {
    let headers_json = serde_json::to_string(&response.headers)?;
    conn.execute(
        "INSERT INTO entries (
            generation, cache_key, method, url, status, kind, headers_json, body, stored_at, expires_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(generation, cache_key) DO UPDATE SET
            method = excluded.method,
            url = excluded.url,
            status = excluded.status,
            kind = excluded.kind,
            headers_json = excluded.headers_json,
            body = excluded.body,
            stored_at = excluded.stored_at,
            expires_at = excluded.expires_at",
        params![
            generation,
            &key.cache_key,
            &key.method,
            &key.url,
            response.status as i64,
            response.kind.as_str(),
            headers_json,
            &response.body,
            stored_at,
            expires_at,
        ],
    )?;
    Ok(())
}

impl CacheDb {
    /// Look up an entry.
    ///
    /// Returns None if the key is absent or the entry has expired; an expired
    /// entry is deleted as part of the lookup.
    pub async fn match_entry(
        &self, generation: &GenerationHandle, key: &RequestKey, now_ms: i64,
    ) -> Result<Option<CacheEntry>, Error> {
        let generation = generation.name().to_string();
        let cache_key = key.cache_key.clone();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let result = conn.query_row(
                    "SELECT method, url, status, kind, headers_json, body, stored_at, expires_at
                    FROM entries WHERE generation = ?1 AND cache_key = ?2",
                    params![generation, cache_key],
                    |row| -> rusqlite::Result<EntryRow> {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                            row.get(7)?,
                        ))
                    },
                );

                let row = match result {
                    Ok(row) => row,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };

                let entry = decode_row(row)?;
                if entry.is_expired(now_ms) {
                    conn.execute(
                        "DELETE FROM entries WHERE generation = ?1 AND cache_key = ?2",
                        params![generation, cache_key],
                    )?;
                    return Ok(None);
                }
                Ok(Some(entry))
            })
            .await
            .map_err(Error::from)
    }

    /// Store a response. An existing entry under the same key is replaced.
    pub async fn put_entry(
        &self, generation: &GenerationHandle, key: &RequestKey, response: &Response, stored_at: i64,
        expires_at: Option<i64>,
    ) -> Result<(), Error> {
        let generation = generation.name().to_string();
        let key = key.clone();
        let response = response.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                insert_entry(conn, &generation, &key, &response, stored_at, expires_at)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete an entry. Returns false if there was nothing to delete.
    pub async fn delete_entry(&self, generation: &GenerationHandle, key: &RequestKey) -> Result<bool, Error> {
        let generation = generation.name().to_string();
        let cache_key = key.cache_key.clone();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute(
                    "DELETE FROM entries WHERE generation = ?1 AND cache_key = ?2",
                    params![generation, cache_key],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete an entry only if it has expired by `now_ms`.
    ///
    /// A newer write under the same key with a later expiry survives.
    pub async fn delete_expired_entry(
        &self, generation: &GenerationHandle, key: &RequestKey, now_ms: i64,
    ) -> Result<bool, Error> {
        let generation = generation.name().to_string();
        let cache_key = key.cache_key.clone();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute(
                    "DELETE FROM entries
                    WHERE generation = ?1 AND cache_key = ?2
                    AND expires_at IS NOT NULL AND expires_at <= ?3",
                    params![generation, cache_key, now_ms],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Keys of every entry in the generation, excluding the refresh record.
    pub async fn keys(&self, generation: &GenerationHandle) -> Result<Vec<RequestKey>, Error> {
        let generation = generation.name().to_string();
        self.conn
            .call(move |conn| -> Result<Vec<RequestKey>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT cache_key, method, url FROM entries
                    WHERE generation = ?1 AND cache_key != ?2
                    ORDER BY stored_at ASC, url ASC",
                )?;
                let keys = stmt
                    .query_map(params![generation, REFRESH_RECORD_KEY], |row| {
                        Ok(RequestKey { cache_key: row.get(0)?, method: row.get(1)?, url: row.get(2)? })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in the generation, excluding the refresh record.
    pub async fn count_entries(&self, generation: &GenerationHandle) -> Result<u64, Error> {
        let generation = generation.name().to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entries WHERE generation = ?1 AND cache_key != ?2",
                    params![generation, REFRESH_RECORD_KEY],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete expired entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_expired_entries(&self, generation: &GenerationHandle, now_ms: i64) -> Result<u64, Error> {
        let generation = generation.name().to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM entries
                    WHERE generation = ?1 AND cache_key != ?2
                    AND expires_at IS NOT NULL AND expires_at <= ?3",
                    params![generation, REFRESH_RECORD_KEY, now_ms],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete entries whose URL contains any of `markers`.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_entries_matching(&self, generation: &GenerationHandle, markers: &[String]) -> Result<u64, Error> {
        let generation = generation.name().to_string();
        let markers: Vec<String> = markers.iter().filter(|m| !m.is_empty()).cloned().collect();
        if markers.is_empty() {
            return Ok(0);
        }
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let stale: Vec<String> = {
                    let mut stmt = tx.prepare("SELECT cache_key, url FROM entries WHERE generation = ?1 AND cache_key != ?2")?;
                    let rows = stmt
                        .query_map(params![generation, REFRESH_RECORD_KEY], |row| {
                            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                        })?
                        .collect::<Result<Vec<_>, _>>()?;
                    rows.into_iter()
                        .filter(|(_, url)| markers.iter().any(|m| url.contains(m.as_str())))
                        .map(|(key, _)| key)
                        .collect()
                };

                let mut deleted = 0u64;
                for key in &stale {
                    deleted += tx.execute(
                        "DELETE FROM entries WHERE generation = ?1 AND cache_key = ?2",
                        params![generation, key],
                    )? as u64;
                }
                tx.commit()?;
                Ok(deleted)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Request;
    use url::Url;

    const T0: i64 = 1_700_000_000_000;

    fn key(path: &str) -> RequestKey {
        RequestKey::new(&Request::get(Url::parse(&format!("http://localhost{path}")).unwrap()), &[])
    }

    fn response(path: &str) -> Response {
        Response::new(format!("http://localhost{path}"), 200, path.as_bytes().to_vec())
            .with_header("content-type", "text/plain")
    }

    async fn setup() -> (CacheDb, GenerationHandle) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let handle = db.open_generation("app-v1", "app", T0).await.unwrap();
        (db, handle)
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let (db, handle) = setup().await;
        db.put_entry(&handle, &key("/x"), &response("/x"), T0, None).await.unwrap();

        let entry = db.match_entry(&handle, &key("/x"), T0).await.unwrap().unwrap();
        assert_eq!(entry.response.body, b"/x".to_vec());
        assert_eq!(entry.response.header("Content-Type"), Some("text/plain"));
        assert_eq!(entry.response.kind, ResponseKind::Basic);
        assert_eq!(entry.method, "GET");
        assert_eq!(entry.stored_at, T0);
    }

    #[tokio::test]
    async fn test_match_missing() {
        let (db, handle) = setup().await;
        assert!(db.match_entry(&handle, &key("/nope"), T0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_last_writer_wins() {
        let (db, handle) = setup().await;
        db.put_entry(&handle, &key("/x"), &response("/old"), T0, None).await.unwrap();
        db.put_entry(&handle, &key("/x"), &response("/new"), T0 + 1, None).await.unwrap();

        let entry = db.match_entry(&handle, &key("/x"), T0 + 1).await.unwrap().unwrap();
        assert_eq!(entry.response.body, b"/new".to_vec());
        assert_eq!(db.count_entries(&handle).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_put_into_missing_generation_fails() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let ghost = GenerationHandle::new("gone");
        let result = db.put_entry(&ghost, &key("/x"), &response("/x"), T0, None).await;
        assert!(matches!(result, Err(e) if e.is_storage()));
    }

    #[tokio::test]
    async fn test_match_expired_deletes() {
        let (db, handle) = setup().await;
        db.put_entry(&handle, &key("/y"), &response("/y"), T0, Some(T0 + 1000)).await.unwrap();

        assert!(db.match_entry(&handle, &key("/y"), T0 + 999).await.unwrap().is_some());
        assert!(db.match_entry(&handle, &key("/y"), T0 + 1000).await.unwrap().is_none());
        assert_eq!(db.count_entries(&handle).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_expired_entry_spares_newer_write() {
        let (db, handle) = setup().await;
        db.put_entry(&handle, &key("/y"), &response("/y"), T0, Some(T0 + 1000)).await.unwrap();
        db.put_entry(&handle, &key("/y"), &response("/y"), T0 + 500, Some(T0 + 1500)).await.unwrap();

        assert!(!db.delete_expired_entry(&handle, &key("/y"), T0 + 1000).await.unwrap());
        assert!(db.delete_expired_entry(&handle, &key("/y"), T0 + 1500).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let (db, handle) = setup().await;
        db.put_entry(&handle, &key("/x"), &response("/x"), T0, None).await.unwrap();
        assert!(db.delete_entry(&handle, &key("/x")).await.unwrap());
        assert!(!db.delete_entry(&handle, &key("/x")).await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_exclude_refresh_record() {
        let (db, handle) = setup().await;
        db.put_entry(&handle, &key("/a"), &response("/a"), T0, None).await.unwrap();
        db.put_entry(&handle, &key("/b"), &response("/b"), T0 + 1, None).await.unwrap();
        let record = Response::text(REFRESH_RECORD_KEY, "1");
        db.put_entry(&handle, &RequestKey::reserved(REFRESH_RECORD_KEY), &record, T0, None)
            .await
            .unwrap();

        let urls: Vec<String> = db.keys(&handle).await.unwrap().into_iter().map(|k| k.url).collect();
        assert_eq!(urls, vec!["http://localhost/a".to_string(), "http://localhost/b".to_string()]);
        assert_eq!(db.count_entries(&handle).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_purge_expired_entries() {
        let (db, handle) = setup().await;
        db.put_entry(&handle, &key("/old"), &response("/old"), T0, Some(T0 + 10)).await.unwrap();
        db.put_entry(&handle, &key("/fresh"), &response("/fresh"), T0, Some(T0 + 10_000)).await.unwrap();
        db.put_entry(&handle, &key("/forever"), &response("/forever"), T0, None).await.unwrap();

        assert_eq!(db.purge_expired_entries(&handle, T0 + 100).await.unwrap(), 1);
        assert_eq!(db.count_entries(&handle).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_purge_entries_matching() {
        let (db, handle) = setup().await;
        db.put_entry(&handle, &key("/app.js?v=2"), &response("/app.js?v=2"), T0, None).await.unwrap();
        db.put_entry(&handle, &key("/app.js"), &response("/app.js"), T0, None).await.unwrap();
        let record = Response::text(REFRESH_RECORD_KEY, "1");
        db.put_entry(&handle, &RequestKey::reserved(REFRESH_RECORD_KEY), &record, T0, None)
            .await
            .unwrap();

        let markers = vec!["?v=".to_string(), "lastCache".to_string()];
        assert_eq!(db.purge_entries_matching(&handle, &markers).await.unwrap(), 1);
        assert!(db.match_entry(&handle, &key("/app.js"), T0).await.unwrap().is_some());
        assert!(
            db.match_entry(&handle, &RequestKey::reserved(REFRESH_RECORD_KEY), T0)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_purge_entries_matching_no_markers() {
        let (db, handle) = setup().await;
        db.put_entry(&handle, &key("/a"), &response("/a"), T0, None).await.unwrap();
        assert_eq!(db.purge_entries_matching(&handle, &[]).await.unwrap(), 0);
    }
}
