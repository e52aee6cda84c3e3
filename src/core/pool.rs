//! Worker pool draining the work queue

use std::sync::Arc;

use log::warn;
use tokio::task::JoinSet;

use crate::core::error::{Error, Result};
use crate::core::fetcher::ChunkFetcher;
use crate::core::queue::WorkQueue;
use crate::core::retry::{RetryDecision, RetryPolicy};

/// A fixed set of workers sharing one queue and one fetcher
pub struct WorkerPool {
    queue: Arc<WorkQueue>,
    fetcher: Arc<ChunkFetcher>,
    retry: Arc<dyn RetryPolicy>,
    debug: bool,
}

impl WorkerPool {
    pub fn new(queue: WorkQueue, fetcher: ChunkFetcher, retry: Arc<dyn RetryPolicy>, debug: bool) -> Self {
        Self {
            queue: Arc::new(queue),
            fetcher: Arc::new(fetcher),
            retry,
            debug,
        }
    }

    /// Start `workers` tasks on the current runtime
    pub fn spawn(&self, workers: usize) -> JoinSet<Result<()>> {
        let mut set = JoinSet::new();
        for id in 0..workers.max(1) {
            let queue = Arc::clone(&self.queue);
            let fetcher = Arc::clone(&self.fetcher);
            let retry = Arc::clone(&self.retry);
            let debug = self.debug;
            set.spawn(async move { run_worker(id, &queue, &fetcher, retry.as_ref(), debug).await });
        }
        set
    }

    /// Run `workers` tasks until the queue is drained.
    ///
    /// The first worker that gives up aborts the rest.
    pub async fn run(&self, workers: usize) -> Result<()> {
        let mut set = self.spawn(workers);
        while let Some(joined) = set.join_next().await {
            let outcome = joined
                .map_err(|e| Error::TransportError(format!("worker task failed: {e}")))
                .and_then(|result| result);
            if let Err(e) = outcome {
                set.abort_all();
                return Err(e);
            }
        }
        Ok(())
    }
}

async fn run_worker(
    id: usize,
    queue: &WorkQueue,
    fetcher: &ChunkFetcher,
    retry: &dyn RetryPolicy,
    debug: bool,
) -> Result<()> {
    while let Some(range) = queue.next().await {
        let mut credited = 0u64;
        let mut attempt = 0u32;

        loop {
            let error = match fetcher.fetch(range, &mut credited).await {
                Ok(()) => break,
                Err(e) => e,
            };
            attempt = attempt.saturating_add(1);
            if debug {
                warn!("worker {id}: range {range} failed (attempt {attempt}): {error}");
            }

            match retry.on_failure(range, attempt, &error) {
                RetryDecision::Retry => {}
                RetryDecision::RetryAfter(delay) => tokio::time::sleep(delay).await,
                RetryDecision::GiveUp => {
                    return Err(Error::RetriesExhausted {
                        range,
                        attempts: attempt,
                        last: Box::new(error),
                    })
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::planner::plan_ranges;
    use crate::core::progress::ProgressCounter;
    use crate::core::queue::work_queue;
    use crate::core::retry::{BoundedRetry, RetryForever};
    use crate::core::store::OutputStore;
    use reqwest::{Client, Url};
    use std::time::Duration;
    use tempfile::tempdir;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn pool_for(
        server: &MockServer,
        store: OutputStore,
        counter: Arc<ProgressCounter>,
        total: u64,
        block: u64,
        retry: Arc<dyn RetryPolicy>,
    ) -> WorkerPool {
        let url = Url::parse(&format!("{}/file.bin", server.uri())).unwrap();
        let (producer, queue) = work_queue(4);
        tokio::spawn(producer.feed(plan_ranges(total, block).unwrap()));
        let fetcher = ChunkFetcher::new(Client::new(), url, None, 8, store, counter);
        WorkerPool::new(queue, fetcher, retry, true)
    }

    #[tokio::test]
    async fn test_failed_range_is_retried_until_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("range", "bytes=0-9"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .up_to_n_times(3)
            .expect(3)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(header("range", "bytes=0-9"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(b"0123456789".to_vec()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let dir = tempdir().unwrap();
        let store = OutputStore::create(dir.path().join("out.bin")).unwrap();
        let counter = Arc::new(ProgressCounter::new());
        let pool = pool_for(&mock_server, store.clone(), Arc::clone(&counter), 10, 10, Arc::new(RetryForever)).await;

        pool.run(2).await.unwrap();

        assert_eq!(counter.get(), 10);
        assert_eq!(std::fs::read(store.path()).unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn test_bounded_retry_surfaces_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("broken"))
            .mount(&mock_server)
            .await;

        let dir = tempdir().unwrap();
        let store = OutputStore::create(dir.path().join("out.bin")).unwrap();
        let counter = Arc::new(ProgressCounter::new());
        let retry = Arc::new(BoundedRetry::new(2, Duration::from_millis(1)));
        let pool = pool_for(&mock_server, store, counter, 10, 10, retry).await;

        match pool.run(1).await {
            Err(Error::RetriesExhausted { range, attempts, last }) => {
                assert_eq!(range.start, 0);
                assert_eq!(range.end, 10);
                assert_eq!(attempts, 2);
                assert!(matches!(*last, Error::RemoteError(ref msg) if msg == "broken"));
            }
            other => panic!("Expected RetriesExhausted, got {other:?}"),
        }
    }
}
