//! Streaming file transfer.
//!
//! The worker hands a `TransferClient` the download URL, the destination
//! path and a context carrying the cancellation token and a progress
//! channel. The production implementation streams the response body
//! through a byte counter; every chunk is a cancellation point, so pause
//! and cancel interrupt the transfer promptly.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use foliofox_core::download::DownloadError;

/// Byte counter snapshot published while a transfer runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSnapshot {
    /// Bytes written so far.
    pub bytes_downloaded: u64,
    /// Total bytes, when the response declared a length.
    pub total_bytes: Option<u64>,
    /// Monotonically increasing sequence number for change detection.
    pub seq: u64,
}

/// Per-attempt context for a transfer.
pub struct TransferContext {
    /// Cancelling this token stops the transfer at the next chunk.
    pub cancel: CancellationToken,
    /// Byte counter output; the progress bridge subscribes to it.
    pub progress: watch::Sender<TransferSnapshot>,
}

/// Port for performing one file transfer.
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Stream `url` to `dest`, reporting progress through the context.
    /// Returns the number of bytes written.
    ///
    /// Cancellation returns `DownloadError::Cancelled`; the partial file
    /// is left at `dest` for the caller to keep or delete.
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        ctx: &TransferContext,
    ) -> Result<u64, DownloadError>;
}

/// Production transfer client over reqwest.
///
/// No client-level total timeout: the worker owns the per-download
/// deadline. Individual connect stalls are bounded by the connect
/// timeout.
pub struct HttpTransferClient {
    client: reqwest::Client,
}

impl HttpTransferClient {
    /// Create a transfer client.
    ///
    /// # Panics
    ///
    /// Panics if the TLS backend cannot be initialized, which only
    /// happens on broken installs.
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("failed to create HTTP client");
        Self { client }
    }
}

impl Default for HttpTransferClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransferClient for HttpTransferClient {
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        ctx: &TransferContext,
    ) -> Result<u64, DownloadError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::from_io_error(&e))?;
        }

        let response = tokio::select! {
            biased;

            () = ctx.cancel.cancelled() => return Err(DownloadError::Cancelled),

            result = self.client.get(url).send() => {
                result.map_err(|e| DownloadError::transfer(e.to_string()))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::transfer_with_status(
                format!("GET {url} returned {status}"),
                status.as_u16(),
            ));
        }

        let total_bytes = response.content_length();
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| DownloadError::from_io_error(&e))?;
        let mut stream = response.bytes_stream();
        let mut bytes_downloaded: u64 = 0;
        let mut seq: u64 = 0;

        loop {
            let chunk = tokio::select! {
                biased;

                () = ctx.cancel.cancelled() => {
                    let _ = file.flush().await;
                    return Err(DownloadError::Cancelled);
                }

                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(Ok(chunk)) => {
                    file.write_all(&chunk)
                        .await
                        .map_err(|e| DownloadError::from_io_error(&e))?;
                    bytes_downloaded += chunk.len() as u64;
                    seq += 1;
                    ctx.progress.send_modify(|snapshot| {
                        snapshot.bytes_downloaded = bytes_downloaded;
                        snapshot.total_bytes = total_bytes;
                        snapshot.seq = seq;
                    });
                }
                Some(Err(e)) => {
                    return Err(DownloadError::transfer(e.to_string()));
                }
                None => break,
            }
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::from_io_error(&e))?;
        Ok(bytes_downloaded)
    }
}

// ============================================================================
// Fake transfer client for tests
// ============================================================================

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted behavior for one transfer attempt.
    #[derive(Clone)]
    pub enum FakeScript {
        /// Write `bytes` of content and succeed.
        Success { bytes: u64 },
        /// Write `count` chunks of `chunk` bytes, sleeping between them.
        Chunked {
            chunk: u64,
            count: u32,
            delay: Duration,
        },
        /// Fail with a retryable network error.
        FailTransient,
        /// Fail with a permanent 404.
        FailPermanent,
        /// Write `bytes`, then block until cancelled.
        HangAfter { bytes: u64 },
        /// Produce an empty file and report success.
        Empty,
    }

    /// Transfer client that plays scripts per attempt.
    ///
    /// Attempts consume the queued scripts in order; once the queue is
    /// empty, `fallback` plays for every further attempt.
    pub struct FakeTransferClient {
        scripts: Mutex<VecDeque<FakeScript>>,
        fallback: FakeScript,
        attempts: AtomicU32,
    }

    impl FakeTransferClient {
        pub fn new(fallback: FakeScript) -> Self {
            Self {
                scripts: Mutex::new(VecDeque::new()),
                fallback,
                attempts: AtomicU32::new(0),
            }
        }

        /// Queue a script for the next attempt.
        #[must_use]
        pub fn then(self, script: FakeScript) -> Self {
            self.scripts.lock().unwrap().push_back(script);
            self
        }

        pub fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }

        async fn write_bytes(
            dest: &Path,
            bytes: u64,
            ctx: &TransferContext,
            total: Option<u64>,
        ) -> Result<(), DownloadError> {
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DownloadError::from_io_error(&e))?;
            }
            #[allow(clippy::cast_possible_truncation)]
            let content = vec![b'x'; bytes as usize];
            tokio::fs::write(dest, &content)
                .await
                .map_err(|e| DownloadError::from_io_error(&e))?;
            ctx.progress.send_modify(|snapshot| {
                snapshot.bytes_downloaded = bytes;
                snapshot.total_bytes = total;
                snapshot.seq += 1;
            });
            Ok(())
        }
    }

    #[async_trait]
    impl TransferClient for FakeTransferClient {
        async fn download(
            &self,
            _url: &str,
            dest: &Path,
            ctx: &TransferContext,
        ) -> Result<u64, DownloadError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());

            match script {
                FakeScript::Success { bytes } => {
                    Self::write_bytes(dest, bytes, ctx, Some(bytes)).await?;
                    Ok(bytes)
                }
                FakeScript::Chunked {
                    chunk,
                    count,
                    delay,
                } => {
                    let total = chunk * u64::from(count);
                    let mut written: u64 = 0;
                    for _ in 0..count {
                        if ctx.cancel.is_cancelled() {
                            return Err(DownloadError::Cancelled);
                        }
                        written += chunk;
                        Self::write_bytes(dest, written, ctx, Some(total)).await?;
                        tokio::select! {
                            () = ctx.cancel.cancelled() => return Err(DownloadError::Cancelled),
                            () = tokio::time::sleep(delay) => {}
                        }
                    }
                    Ok(written)
                }
                FakeScript::FailTransient => {
                    Err(DownloadError::transfer("connection reset by peer"))
                }
                FakeScript::FailPermanent => Err(DownloadError::transfer_with_status(
                    "GET returned 404 Not Found",
                    404,
                )),
                FakeScript::HangAfter { bytes } => {
                    Self::write_bytes(dest, bytes, ctx, None).await?;
                    ctx.cancel.cancelled().await;
                    Err(DownloadError::Cancelled)
                }
                FakeScript::Empty => {
                    Self::write_bytes(dest, 0, ctx, Some(0)).await?;
                    Ok(0)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeScript, FakeTransferClient};
    use super::*;
    use std::time::Duration;

    fn context() -> (TransferContext, watch::Receiver<TransferSnapshot>) {
        let (tx, rx) = watch::channel(TransferSnapshot::default());
        (
            TransferContext {
                cancel: CancellationToken::new(),
                progress: tx,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn fake_success_writes_file_and_progress() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("book.epub");
        let client = FakeTransferClient::new(FakeScript::Success { bytes: 100 });
        let (ctx, rx) = context();

        let bytes = client.download("https://x", &dest, &ctx).await.unwrap();
        assert_eq!(bytes, 100);
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 100);
        assert_eq!(rx.borrow().bytes_downloaded, 100);
    }

    #[tokio::test]
    async fn fake_scripts_play_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("book.epub");
        let client = FakeTransferClient::new(FakeScript::Success { bytes: 10 })
            .then(FakeScript::FailTransient);
        let (ctx, _rx) = context();

        assert!(client.download("https://x", &dest, &ctx).await.is_err());
        assert!(client.download("https://x", &dest, &ctx).await.is_ok());
        assert_eq!(client.attempts(), 2);
    }

    #[tokio::test]
    async fn hang_script_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("book.epub");
        let client = FakeTransferClient::new(FakeScript::HangAfter { bytes: 5 });
        let (ctx, _rx) = context();

        let cancel = ctx.cancel.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let err = client.download("https://x", &dest, &ctx).await.unwrap_err();
        assert!(err.is_cancelled());
        // Partial file remains for the caller to keep or delete.
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 5);
        task.await.unwrap();
    }
}
