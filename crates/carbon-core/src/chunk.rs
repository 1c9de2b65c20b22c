//! Chunked parallel execution
//!
//! Large fleets are split into fixed-size chunks and evaluated on a
//! bounded pool of blocking workers. Each chunk gets a distinct
//! manifest id and writes its results back into a preallocated slot
//! vector at its own offset, so the merged output preserves the input
//! order no matter which chunk finishes first.

use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::constants::MAX_CHUNK_WORKERS;
use crate::error::{Error, Result};

/// Splits work into chunks and runs them on at most `max_workers`
/// blocking tasks at a time.
#[derive(Debug, Clone, Copy)]
pub struct ChunkExecutor {
    chunk_size: usize,
    max_workers: usize,
}

impl ChunkExecutor {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            max_workers: MAX_CHUNK_WORKERS,
        }
    }

    pub fn with_max_workers(chunk_size: usize, max_workers: usize) -> Self {
        Self {
            chunk_size,
            max_workers,
        }
    }

    /// Runs `work` over `items` chunk by chunk. The closure receives
    /// the chunk and a chunk index usable as a manifest id, and must
    /// return the processed items in their incoming order. The merged
    /// result preserves the order of `items`.
    pub async fn run<R, F>(&self, items: Vec<R>, work: F) -> Result<Vec<R>>
    where
        R: Send + 'static,
        F: Fn(Vec<R>, usize) -> Result<Vec<R>> + Send + Sync + 'static,
    {
        let total = items.len();
        if total == 0 {
            return Ok(Vec::new());
        }
        let chunk_size = self.chunk_size.min(total).max(1);
        let work = Arc::new(work);
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let slots: Arc<Mutex<Vec<Option<R>>>> =
            Arc::new(Mutex::new((0..total).map(|_| None).collect()));

        let mut chunks: Vec<Vec<R>> = Vec::new();
        let mut items = items.into_iter();
        loop {
            let chunk: Vec<R> = items.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            chunks.push(chunk);
        }
        tracing::debug!(
            total,
            chunks = chunks.len(),
            chunk_size,
            workers = self.max_workers,
            "dispatching chunked evaluation"
        );

        let mut handles: Vec<JoinHandle<Result<()>>> = Vec::with_capacity(chunks.len());
        for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            let work = Arc::clone(&work);
            let semaphore = Arc::clone(&semaphore);
            let slots = Arc::clone(&slots);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::Configuration(format!("worker pool closed: {e}")))?;
                let processed =
                    tokio::task::spawn_blocking(move || work(chunk, chunk_index))
                        .await
                        .map_err(|e| {
                            Error::Configuration(format!("chunk {chunk_index} panicked: {e}"))
                        })??;
                let mut slots = slots
                    .lock()
                    .map_err(|_| Error::Configuration("result slots poisoned".to_string()))?;
                let offset = chunk_index * chunk_size;
                for (i, item) in processed.into_iter().enumerate() {
                    slots[offset + i] = Some(item);
                }
                Ok(())
            }));
        }

        for handle in handles {
            handle
                .await
                .map_err(|e| Error::Configuration(format!("chunk task failed: {e}")))??;
        }

        let slots = Arc::try_unwrap(slots)
            .map_err(|_| Error::Configuration("result slots still shared".to_string()))?
            .into_inner()
            .map_err(|_| Error::Configuration("result slots poisoned".to_string()))?;
        Ok(slots.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[tokio::test]
    async fn test_order_preserved_under_jittered_completion() {
        let items: Vec<usize> = (0..1000).collect();
        let executor = ChunkExecutor::new(430);
        let result = executor
            .run(items, |chunk, _id| {
                let delay = rand::thread_rng().gen_range(1..20);
                std::thread::sleep(std::time::Duration::from_millis(delay));
                Ok(chunk)
            })
            .await
            .unwrap();
        assert_eq!(result, (0..1000).collect::<Vec<usize>>());
    }

    #[tokio::test]
    async fn test_chunks_get_distinct_ids() {
        let items: Vec<u32> = (0..25).collect();
        let executor = ChunkExecutor::new(10);
        let result = executor
            .run(items, |chunk, id| {
                Ok(chunk.into_iter().map(|v| v + (id as u32) * 100).collect())
            })
            .await
            .unwrap();
        assert_eq!(result[0], 0);
        assert_eq!(result[10], 110);
        assert_eq!(result[24], 224);
    }

    #[tokio::test]
    async fn test_chunk_size_capped_at_item_count() {
        let executor = ChunkExecutor::new(10_000);
        let result = executor.run(vec![1, 2, 3], |chunk, _| Ok(chunk)).await.unwrap();
        assert_eq!(result, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_chunk_error_propagates() {
        let executor = ChunkExecutor::new(2);
        let err = executor
            .run((0..6).collect::<Vec<i32>>(), |chunk, id| {
                if id == 1 {
                    Err(Error::EvaluatorFailure { manifest_id: id })
                } else {
                    Ok(chunk)
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EvaluatorFailure { manifest_id: 1 }));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let executor = ChunkExecutor::new(5);
        let result = executor.run(Vec::<i32>::new(), |chunk, _| Ok(chunk)).await.unwrap();
        assert!(result.is_empty());
    }
}
