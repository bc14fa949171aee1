//! Embedded RocksDB backend.
//!
//! # Responsibilities
//! - Own the RocksDB handle for one generation
//! - Hand out counter values from leased sequences
//! - Return unused lease tails on close
//!
//! # Design Decisions
//! - All RocksDB calls run on the blocking pool; the state mutex is a std one
//!   and is never held across an await
//! - The global sequence leases 100 numbers at a time and lives for the
//!   whole generation
//! - Word sequences lease 2 numbers, take one and release immediately, so
//!   the key always holds the next value to hand out
//! - Tear down keeps the database open so `ensure_db` can run afterwards

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};

use super::error::{StorageError, StorageResult};
use super::sequence::Sequence;
use super::{word_key, Store, GLOBAL_KEY, KEY_PREFIX};
use crate::config::BackendKind;

const GLOBAL_BANDWIDTH: u64 = 100;
const WORD_BANDWIDTH: u64 = 2;

#[derive(Default)]
struct LocalState {
    db: Option<DB>,
    global: Option<Sequence>,
}

impl LocalState {
    fn db(&self) -> StorageResult<&DB> {
        self.db.as_ref().ok_or(StorageError::Closed)
    }
}

/// Counter store backed by a RocksDB directory.
pub struct LocalStore {
    path: PathBuf,
    state: Arc<Mutex<LocalState>>,
}

impl LocalStore {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let open_path = path.clone();
        let db = tokio::task::spawn_blocking(move || {
            let mut opts = Options::default();
            opts.create_if_missing(true);
            DB::open(&opts, &open_path)
        })
        .await??;

        tracing::info!(path = %path.display(), "Opened local storage");

        Ok(Self {
            path,
            state: Arc::new(Mutex::new(LocalState {
                db: Some(db),
                global: None,
            })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the locked state on the blocking pool.
    async fn with_state<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut LocalState) -> StorageResult<T> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        tokio::task::spawn_blocking(move || f(&mut lock(&state))).await?
    }
}

fn lock(state: &Mutex<LocalState>) -> MutexGuard<'_, LocalState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl Store for LocalStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn ensure_db(&self) -> StorageResult<()> {
        self.with_state(|state| {
            if state.global.is_none() {
                let seq = Sequence::acquire(state.db()?, GLOBAL_KEY, GLOBAL_BANDWIDTH)?;
                state.global = Some(seq);
                tracing::debug!("Acquired global counter sequence");
            }
            Ok(())
        })
        .await
    }

    async fn tear_down(&self) -> StorageResult<()> {
        let deleted = self
            .with_state(|state| {
                // The lease is discarded, not released: its key is about to go.
                state.global = None;
                let db = state.db()?;

                let mut batch = WriteBatch::default();
                let mut deleted = 0u64;
                let prefix = KEY_PREFIX.as_bytes();
                for item in db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
                    let (key, _) = item?;
                    if !key.starts_with(prefix) {
                        break;
                    }
                    batch.delete(&key);
                    deleted += 1;
                }
                db.write(batch)?;
                Ok(deleted)
            })
            .await?;

        tracing::info!(deleted, "Local storage torn down");
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        let closed = self
            .with_state(|state| {
                let Some(db) = state.db.take() else {
                    return Ok(false);
                };
                let released = match state.global.take() {
                    Some(mut seq) => seq.release(&db),
                    None => Ok(()),
                };
                drop(db);
                released.map(|_| true)
            })
            .await?;

        if closed {
            tracing::info!(path = %self.path.display(), "Closed local storage");
        } else {
            tracing::debug!(path = %self.path.display(), "Local storage already closed");
        }
        Ok(())
    }

    async fn healthy(&self) -> bool {
        self.with_state(|state| {
            state.db()?.get(GLOBAL_KEY)?;
            Ok(())
        })
        .await
        .is_ok()
    }

    async fn inc_global(&self) -> StorageResult<u64> {
        self.with_state(|state| {
            let LocalState { db, global } = state;
            let db = db.as_ref().ok_or(StorageError::Closed)?;
            let seq = global
                .as_mut()
                .ok_or(StorageError::NotInitialized("global counter"))?;
            Ok(seq.next(db)? + 1)
        })
        .await
    }

    async fn inc_word(&self, word: &str) -> StorageResult<u64> {
        let key = word_key(word);
        self.with_state(move |state| {
            let db = state.db()?;
            let mut seq = Sequence::acquire(db, key, WORD_BANDWIDTH)?;
            let value = seq.next(db)?;
            seq.release(db)?;
            Ok(value + 1)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_store(dir: &tempfile::TempDir) -> LocalStore {
        let store = LocalStore::open(dir.path()).await.unwrap();
        store.ensure_db().await.unwrap();
        store
    }

    #[tokio::test]
    async fn counters_reset_after_tear_down() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        for expected in 1..=3 {
            assert_eq!(store.inc_global().await.unwrap(), expected);
        }
        assert_eq!(store.inc_word("test").await.unwrap(), 1);
        assert_eq!(store.inc_word("test").await.unwrap(), 2);

        store.tear_down().await.unwrap();
        store.ensure_db().await.unwrap();

        assert_eq!(store.inc_global().await.unwrap(), 1);
        assert_eq!(store.inc_word("test").await.unwrap(), 1);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn words_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        assert_eq!(store.inc_word("alpha").await.unwrap(), 1);
        assert_eq!(store.inc_word("beta").await.unwrap(), 1);
        assert_eq!(store.inc_word("alpha").await.unwrap(), 2);
        assert_eq!(store.inc_global().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn close_and_reopen_continues_without_gap() {
        let dir = tempfile::tempdir().unwrap();

        let store = open_store(&dir).await;
        for expected in 1..=3 {
            assert_eq!(store.inc_global().await.unwrap(), expected);
        }
        store.close().await.unwrap();
        drop(store);

        let store = open_store(&dir).await;
        assert_eq!(store.inc_global().await.unwrap(), 4);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        store.close().await.unwrap();
        store.close().await.unwrap();
        assert!(!store.healthy().await);
        assert!(matches!(
            store.inc_global().await,
            Err(StorageError::Closed)
        ));
    }

    #[tokio::test]
    async fn inc_global_requires_ensure_db() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path()).await.unwrap();

        assert!(store.healthy().await);
        assert!(matches!(
            store.inc_global().await,
            Err(StorageError::NotInitialized(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_increments_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(open_store(&dir).await);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..50 {
                    seen.push(store.inc_global().await.unwrap());
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_unstable();
        let expected: Vec<u64> = (1..=400).collect();
        assert_eq!(all, expected);
    }
}
