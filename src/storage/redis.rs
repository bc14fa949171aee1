//! Redis backend.
//!
//! Every increment is a single `INCR` on the namespaced key; Redis does the
//! serialization, so there is no local batching.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult};
use url::Url;

use super::error::{StorageError, StorageResult};
use super::{word_key, Store, GLOBAL_KEY, KEY_PREFIX};
use crate::config::BackendKind;

/// Keys fetched per `SCAN` page during tear down.
const SCAN_PAGE: usize = 1000;

/// The Redis commands the store issues.
#[async_trait]
pub trait RedisCommands: Send + Sync {
    async fn ping(&self) -> RedisResult<()>;

    async fn incr(&self, key: &str) -> RedisResult<i64>;

    /// One `SCAN cursor MATCH pattern COUNT count` page: next cursor and keys.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> RedisResult<(u64, Vec<String>)>;

    async fn del(&self, keys: &[String]) -> RedisResult<u64>;
}

#[async_trait]
impl RedisCommands for ConnectionManager {
    async fn ping(&self) -> RedisResult<()> {
        let mut conn = self.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> RedisResult<i64> {
        let mut conn = self.clone();
        AsyncCommands::incr(&mut conn, key, 1_i64).await
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> RedisResult<(u64, Vec<String>)> {
        let mut conn = self.clone();
        redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
    }

    async fn del(&self, keys: &[String]) -> RedisResult<u64> {
        let mut conn = self.clone();
        AsyncCommands::del(&mut conn, keys).await
    }
}

/// Counter store backed by a Redis server.
pub struct RedisStore {
    conn: RwLock<Option<Arc<dyn RedisCommands>>>,
}

impl RedisStore {
    /// Connect to `address` and verify the connection with a `PING`.
    ///
    /// `address` is either `host:port` or a full `redis://` URL. A non-empty
    /// `password` overrides any credential in the URL.
    pub async fn open(address: &str, password: &str) -> StorageResult<Self> {
        let url = connection_url(address, password)?;
        let client = Client::open(url.as_str())?;
        let conn = ConnectionManager::new(client).await?;
        conn.ping().await?;

        tracing::info!(
            host = url.host_str().unwrap_or_default(),
            port = url.port_or_known_default().unwrap_or_default(),
            "Connected to redis"
        );

        Ok(Self::with_connection(Arc::new(conn)))
    }

    /// Wrap an already established connection.
    pub fn with_connection(conn: Arc<dyn RedisCommands>) -> Self {
        Self {
            conn: RwLock::new(Some(conn)),
        }
    }

    fn conn(&self) -> StorageResult<Arc<dyn RedisCommands>> {
        self.conn
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(StorageError::Closed)
    }

    async fn incr(&self, key: &str) -> StorageResult<u64> {
        let value = self.conn()?.incr(key).await?;
        u64::try_from(value).map_err(|_| StorageError::Corrupt {
            key: key.to_string(),
            reason: format!("negative counter {}", value),
        })
    }
}

fn connection_url(address: &str, password: &str) -> StorageResult<Url> {
    let invalid = |reason: String| StorageError::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    let raw = if address.contains("://") {
        address.to_string()
    } else {
        format!("redis://{}", address)
    };
    let mut url = Url::parse(&raw).map_err(|e| invalid(e.to_string()))?;

    if !password.is_empty() {
        url.set_password(Some(password))
            .map_err(|_| invalid("cannot carry a password".to_string()))?;
    }
    Ok(url)
}

#[async_trait]
impl Store for RedisStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }

    async fn ensure_db(&self) -> StorageResult<()> {
        // INCR creates keys on first use.
        self.conn().map(|_| ())
    }

    async fn tear_down(&self) -> StorageResult<()> {
        let conn = self.conn()?;
        let pattern = format!("{}*", KEY_PREFIX);
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;
        let mut failures = Vec::new();

        loop {
            let (next, keys) = match conn.scan(cursor, &pattern, SCAN_PAGE).await {
                Ok(page) => page,
                Err(e) => {
                    // Without a cursor there is no next page to visit.
                    failures.push(format!("scan at cursor {}: {}", cursor, e));
                    break;
                }
            };

            if !keys.is_empty() {
                match conn.del(&keys).await {
                    Ok(n) => deleted += n,
                    Err(e) => failures.push(format!("del {} keys: {}", keys.len(), e)),
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::info!(deleted, failures = failures.len(), "Redis storage torn down");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(StorageError::TearDown { deleted, failures })
        }
    }

    async fn close(&self) -> StorageResult<()> {
        let previous = self
            .conn
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if previous.is_some() {
            tracing::info!("Closed redis connection");
        }
        Ok(())
    }

    async fn healthy(&self) -> bool {
        match self.conn() {
            Ok(conn) => conn.ping().await.is_ok(),
            Err(_) => false,
        }
    }

    async fn inc_global(&self) -> StorageResult<u64> {
        self.incr(GLOBAL_KEY).await
    }

    async fn inc_word(&self, word: &str) -> StorageResult<u64> {
        self.incr(&word_key(word)).await
    }
}
