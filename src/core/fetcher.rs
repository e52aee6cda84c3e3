//! Chunk fetching for pan-dl
//!
//! One ranged GET per call, streamed straight into the output file.

use std::sync::Arc;

use futures::TryStreamExt;
use reqwest::header::RANGE;
use reqwest::{Client, Response, StatusCode, Url};
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

use crate::core::error::{Error, Result};
use crate::core::planner::ChunkRange;
use crate::core::probe::with_cookie;
use crate::core::progress::ProgressCounter;
use crate::core::store::OutputStore;

/// Fetches ranges of one URL into one output store
pub struct ChunkFetcher {
    client: Client,
    url: Url,
    cookie: Option<String>,
    buffer_size: usize,
    store: OutputStore,
    counter: Arc<ProgressCounter>,
}

impl ChunkFetcher {
    pub fn new(
        client: Client,
        url: Url,
        cookie: Option<String>,
        buffer_size: usize,
        store: OutputStore,
        counter: Arc<ProgressCounter>,
    ) -> Self {
        Self {
            client,
            url,
            cookie,
            buffer_size: buffer_size.max(1),
            store,
            counter,
        }
    }

    /// Download `range` into the store.
    ///
    /// `credited` is how many bytes of this range earlier attempts already
    /// added to the progress counter; only bytes past that mark are added
    /// again, so a retried range is never counted twice.
    pub async fn fetch(&self, range: ChunkRange, credited: &mut u64) -> Result<()> {
        let response = with_cookie(self.client.get(self.url.clone()), self.cookie.as_deref())
            .header(RANGE, range.header_value())
            .send()
            .await?;

        if response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(unexpected_status(response).await);
        }

        let mut reader = BufReader::with_capacity(self.buffer_size, body_reader(response));
        let mut buffer = vec![0u8; self.buffer_size];
        let mut position = range.start;

        while position < range.end {
            let bytes_read = reader
                .read(&mut buffer)
                .await
                .map_err(|e| Error::TransportError(format!("Stream read error: {e}")))?;
            if bytes_read == 0 {
                break;
            }

            // Never spill into the neighbouring range
            let remaining = usize::try_from(range.end - position).unwrap_or(usize::MAX);
            let len = bytes_read.min(remaining);

            buffer = self.store.write_buffer_at(buffer, len, position).await?;
            position += len as u64;

            let written = position - range.start;
            if written > *credited {
                self.counter.add(written - *credited);
                *credited = written;
            }
        }

        if position < range.end {
            return Err(Error::TransportError(format!(
                "range {range} ended early: got {} of {} bytes",
                position - range.start,
                range.len()
            )));
        }
        Ok(())
    }
}

/// Turn a non-206 response into a `RemoteError` carrying its body
async fn unexpected_status(response: Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if body.trim().is_empty() {
        Error::RemoteError(format!("expected 206 Partial Content, got {status}"))
    } else {
        Error::RemoteError(body)
    }
}

/// Expose a response body as an `AsyncRead`
fn body_reader(response: Response) -> impl AsyncRead + Send + Unpin {
    tokio_util::io::StreamReader::new(
        response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher_for(server: &MockServer, store: OutputStore, counter: Arc<ProgressCounter>, buffer: usize) -> ChunkFetcher {
        let url = Url::parse(&format!("{}/file.bin", server.uri())).unwrap();
        ChunkFetcher::new(Client::new(), url, Some("BDUSS=abc".to_string()), buffer, store, counter)
    }

    #[tokio::test]
    async fn test_fetch_writes_range_at_offset() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("range", "bytes=4-7"))
            .and(header("cookie", "BDUSS=abc"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(b"WXYZ".to_vec()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let dir = tempdir().unwrap();
        let store = OutputStore::create(dir.path().join("out.bin")).unwrap();
        store.write_all_at(b"abcd", 0).unwrap();
        let counter = Arc::new(ProgressCounter::new());
        let fetcher = fetcher_for(&mock_server, store.clone(), Arc::clone(&counter), 3);

        let mut credited = 0;
        fetcher.fetch(ChunkRange::new(4, 8), &mut credited).await.unwrap();

        assert_eq!(std::fs::read(store.path()).unwrap(), b"abcdWXYZ");
        assert_eq!(counter.get(), 4);
        assert_eq!(credited, 4);
    }

    #[tokio::test]
    async fn test_non_partial_status_is_remote_error_with_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("range not supported"))
            .mount(&mock_server)
            .await;

        let dir = tempdir().unwrap();
        let store = OutputStore::create(dir.path().join("out.bin")).unwrap();
        let counter = Arc::new(ProgressCounter::new());
        let fetcher = fetcher_for(&mock_server, store, Arc::clone(&counter), 16);

        let mut credited = 0;
        match fetcher.fetch(ChunkRange::new(0, 10), &mut credited).await {
            Err(Error::RemoteError(msg)) => assert_eq!(msg, "range not supported"),
            other => panic!("Expected RemoteError, got {other:?}"),
        }
        assert_eq!(counter.get(), 0);
    }

    #[tokio::test]
    async fn test_short_body_is_transport_error_and_counted_once() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(b"0123".to_vec()))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(b"0123456789".to_vec()))
            .mount(&mock_server)
            .await;

        let dir = tempdir().unwrap();
        let store = OutputStore::create(dir.path().join("out.bin")).unwrap();
        let counter = Arc::new(ProgressCounter::new());
        let fetcher = fetcher_for(&mock_server, store.clone(), Arc::clone(&counter), 4);
        let range = ChunkRange::new(0, 10);

        let mut credited = 0;
        let first = fetcher.fetch(range, &mut credited).await;
        assert!(matches!(first, Err(Error::TransportError(_))));
        assert_eq!(counter.get(), 4);

        fetcher.fetch(range, &mut credited).await.unwrap();
        assert_eq!(counter.get(), 10);
        assert_eq!(std::fs::read(store.path()).unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn test_oversized_body_is_clamped_to_range() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(b"AAAAAAAAAA".to_vec()))
            .mount(&mock_server)
            .await;

        let dir = tempdir().unwrap();
        let store = OutputStore::create(dir.path().join("out.bin")).unwrap();
        store.write_all_at(b"..........", 0).unwrap();
        let counter = Arc::new(ProgressCounter::new());
        let fetcher = fetcher_for(&mock_server, store.clone(), Arc::clone(&counter), 64);

        let mut credited = 0;
        fetcher.fetch(ChunkRange::new(2, 5), &mut credited).await.unwrap();

        assert_eq!(std::fs::read(store.path()).unwrap(), b"..AAA.....");
        assert_eq!(counter.get(), 3);
    }
}
