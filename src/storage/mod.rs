//! Storage subsystem.
//!
//! # Responsibilities
//! - Open the configured backend once per generation
//! - Provide per-key monotonic counters
//! - Close the backend when the generation's lifetime scope ends
//!
//! # Data Flow
//! ```text
//! StorageConfig ──▶ StorageHandle::open ──▶ LocalStore (RocksDB)
//!                                       └─▶ RedisStore
//!
//! HelloService ──▶ Arc<dyn Counter> ──▶ StorageHandle ──▶ Arc<dyn Store>
//! ```
//!
//! # Design Decisions
//! - Backends are trait objects chosen from configuration, never generics
//! - Both backends share one key namespace: `ctr:global` and `ctr:word:<word>`
//! - A counter value is never handed out twice; gaps are tolerated
//! - The handle is cheap to clone; all clones share one backend

pub mod error;
pub mod local;
pub mod redis;
pub mod sequence;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::{BackendKind, StorageConfig};

pub use error::{StorageError, StorageResult};
pub use self::local::LocalStore;
pub use self::redis::RedisStore;

/// Prefix shared by every counter key.
pub const KEY_PREFIX: &str = "ctr:";

/// Key of the global counter.
pub const GLOBAL_KEY: &str = "ctr:global";

/// Key of the counter for `word`.
pub fn word_key(word: &str) -> String {
    format!("{}word:{}", KEY_PREFIX, word)
}

/// Lifecycle contract every storage backend fulfils.
#[async_trait]
pub trait Store: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Idempotent setup. Never destroys data.
    async fn ensure_db(&self) -> StorageResult<()>;

    /// Delete every counter. Only used by tests and reset flows.
    async fn tear_down(&self) -> StorageResult<()>;

    /// Release held resources without deleting data. Idempotent.
    async fn close(&self) -> StorageResult<()>;

    /// Liveness probe with no effect on counter state.
    async fn healthy(&self) -> bool;

    async fn inc_global(&self) -> StorageResult<u64>;

    async fn inc_word(&self, word: &str) -> StorageResult<u64>;
}

/// The counter capability handed to request handlers.
#[async_trait]
pub trait Counter: Send + Sync {
    /// Increment the global counter, returning the new value.
    async fn inc_global(&self) -> StorageResult<u64>;

    /// Increment the counter for `word`, returning the new value.
    async fn inc_word(&self, word: &str) -> StorageResult<u64>;
}

/// Shared handle to the storage backend of one generation.
#[derive(Clone)]
pub struct StorageHandle {
    store: Arc<dyn Store>,
}

impl std::fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageHandle")
            .field("kind", &self.store.kind())
            .finish()
    }
}

impl StorageHandle {
    /// Open the configured backend.
    ///
    /// The backend is closed automatically once `scope` is cancelled, unless
    /// it was closed before.
    pub async fn open(config: &StorageConfig, scope: &CancellationToken) -> StorageResult<Self> {
        let store: Arc<dyn Store> = match config.backend {
            BackendKind::Local => Arc::new(LocalStore::open(&config.address).await?),
            BackendKind::Redis => {
                Arc::new(RedisStore::open(&config.address, &config.password).await?)
            }
        };

        let handle = Self::from_store(store);
        handle.autoclose(scope.clone());
        Ok(handle)
    }

    /// Wrap an already opened backend.
    pub fn from_store(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn autoclose(&self, scope: CancellationToken) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            scope.cancelled().await;
            if let Err(e) = store.close().await {
                tracing::error!(error = %e, "Failed to close storage on scope exit");
            }
        });
    }

    pub fn kind(&self) -> BackendKind {
        self.store.kind()
    }

    pub async fn ensure_db(&self) -> StorageResult<()> {
        self.store.ensure_db().await
    }

    pub async fn tear_down(&self) -> StorageResult<()> {
        self.store.tear_down().await
    }

    pub async fn close(&self) -> StorageResult<()> {
        self.store.close().await
    }

    pub async fn healthy(&self) -> bool {
        self.store.healthy().await
    }

    /// The counter capability of this handle.
    pub fn counter(&self) -> Arc<dyn Counter> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Counter for StorageHandle {
    async fn inc_global(&self) -> StorageResult<u64> {
        self.store.inc_global().await
    }

    async fn inc_word(&self, word: &str) -> StorageResult<u64> {
        self.store.inc_word(word).await
    }
}
