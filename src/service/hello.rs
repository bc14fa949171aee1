//! The greeting endpoint's business logic.
//!
//! Handlers only parse input and map errors to codes; everything that decides
//! what the caller gets back lives here.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{timeout_at, Instant};

use crate::observability::metrics;
use crate::storage::{Counter, StorageResult};

/// Longest accepted `input`, in characters.
pub const MAX_INPUT_CHARS: usize = 200;

/// Time allowed for both counter increments of one request.
pub const COUNTER_BUDGET: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HelloInput {
    #[serde(default)]
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HelloOutput {
    pub response: String,
}

/// Counter values observed by this request. A failed increment leaves its
/// field empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HelloMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub this_word: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HelloError {
    #[error("input is required")]
    MissingInput,

    #[error("input must be at most {max} characters")]
    InputTooLong { max: usize },

    #[error("no response to rude people")]
    Rude,

    #[error("outrageous input")]
    VeryRude,
}

/// Greets callers and counts how often each word was used.
#[derive(Clone)]
pub struct HelloService {
    counter: Arc<dyn Counter>,
}

impl HelloService {
    pub fn new(counter: Arc<dyn Counter>) -> Self {
        Self { counter }
    }

    /// Reject input the service never acts on. Nothing is counted for it.
    pub fn validate(input: &HelloInput) -> Result<(), HelloError> {
        if input.input.is_empty() {
            return Err(HelloError::MissingInput);
        }
        if input.input.chars().count() > MAX_INPUT_CHARS {
            return Err(HelloError::InputTooLong {
                max: MAX_INPUT_CHARS,
            });
        }
        Ok(())
    }

    pub async fn hello(&self, input: &HelloInput) -> Result<(HelloOutput, HelloMeta), HelloError> {
        Self::validate(input)?;

        let deadline = Instant::now() + COUNTER_BUDGET;
        let word = input.input.as_str();

        let total = within(deadline, self.counter.inc_global())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to increase the global counter");
                metrics::record_counter_failure("global");
            })
            .ok();

        let this_word = within(deadline, self.counter.inc_word(word))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, word, "Failed to increase the word counter");
                metrics::record_counter_failure("word");
            })
            .ok();

        // Rude words are still counted.
        match word {
            "rude" => return Err(HelloError::Rude),
            "veryRude" => return Err(HelloError::VeryRude),
            _ => {}
        }

        Ok((
            HelloOutput {
                response: format!("Why hello there {}", word),
            },
            HelloMeta { total, this_word },
        ))
    }
}

#[derive(Debug, Error)]
enum IncrementError {
    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),

    #[error("counter budget of {0:?} exhausted")]
    Deadline(Duration),
}

async fn within<F>(deadline: Instant, increment: F) -> Result<u64, IncrementError>
where
    F: std::future::Future<Output = StorageResult<u64>>,
{
    match timeout_at(deadline, increment).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(IncrementError::Deadline(COUNTER_BUDGET)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryCounter {
        global: Mutex<u64>,
        words: Mutex<HashMap<String, u64>>,
        broken: bool,
    }

    #[async_trait]
    impl Counter for MemoryCounter {
        async fn inc_global(&self) -> StorageResult<u64> {
            if self.broken {
                return Err(StorageError::Closed);
            }
            let mut global = self.global.lock().unwrap();
            *global += 1;
            Ok(*global)
        }

        async fn inc_word(&self, word: &str) -> StorageResult<u64> {
            if self.broken {
                return Err(StorageError::Closed);
            }
            let mut words = self.words.lock().unwrap();
            let n = words.entry(word.to_string()).or_default();
            *n += 1;
            Ok(*n)
        }
    }

    fn input(s: &str) -> HelloInput {
        HelloInput {
            input: s.to_string(),
        }
    }

    #[tokio::test]
    async fn greets_and_counts() {
        let service = HelloService::new(Arc::new(MemoryCounter::default()));

        let (out, meta) = service.hello(&input("world")).await.unwrap();
        assert_eq!(out.response, "Why hello there world");
        assert_eq!(meta, HelloMeta { total: Some(1), this_word: Some(1) });

        service.hello(&input("world")).await.unwrap();
        let (_, meta) = service.hello(&input("moon")).await.unwrap();
        assert_eq!(meta, HelloMeta { total: Some(3), this_word: Some(1) });
    }

    #[tokio::test]
    async fn rude_input_is_refused_but_counted() {
        let counter = Arc::new(MemoryCounter::default());
        let service = HelloService::new(counter.clone());

        assert_eq!(service.hello(&input("rude")).await.unwrap_err(), HelloError::Rude);
        assert_eq!(
            service.hello(&input("veryRude")).await.unwrap_err(),
            HelloError::VeryRude
        );
        assert_eq!(*counter.global.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn invalid_input_is_not_counted() {
        let counter = Arc::new(MemoryCounter::default());
        let service = HelloService::new(counter.clone());

        assert_eq!(
            service.hello(&input("")).await.unwrap_err(),
            HelloError::MissingInput
        );
        let long = "a".repeat(MAX_INPUT_CHARS + 1);
        assert!(matches!(
            service.hello(&input(&long)).await.unwrap_err(),
            HelloError::InputTooLong { .. }
        ));
        assert!(service.hello(&input(&"é".repeat(MAX_INPUT_CHARS))).await.is_ok());
        assert_eq!(*counter.global.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn counter_failure_leaves_meta_empty() {
        let service = HelloService::new(Arc::new(MemoryCounter {
            broken: true,
            ..Default::default()
        }));

        let (out, meta) = service.hello(&input("world")).await.unwrap();
        assert_eq!(out.response, "Why hello there world");
        assert_eq!(meta, HelloMeta::default());
    }
}
