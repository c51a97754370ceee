use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{ACCEPT_RANGES, RANGE};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::DownloadSettings;
use crate::error::{Error, Result};
use crate::printer::Progress;

const HASH_BUF_SIZE: usize = 128 * 1024;

/// The outcome of a single transfer attempt, before retry classification.
#[derive(Debug)]
enum AttemptError {
    /// A transport-level failure. Retryable.
    Network(reqwest::Error),
    /// HTTP 5xx or 429. Retryable.
    Status(StatusCode),
    /// Any other HTTP 4xx. Fatal.
    Rejected(StatusCode),
    /// HTTP 416 on a resume; the cached prefix no longer matches the server.
    RangeNotSatisfiable,
    /// The server ignored a `Range` request mid-parallel-transfer.
    RangeIgnored,
    Io(std::io::Error),
    Interrupted,
}

impl AttemptError {
    fn retryable(&self) -> bool {
        matches!(self, AttemptError::Network(_) | AttemptError::Status(_))
    }

    fn into_error(self, url: &str) -> Error {
        match self {
            AttemptError::Network(err) => Error::Http(err),
            AttemptError::Status(status)
            | AttemptError::Rejected(status) => Error::DownloadRejected {
                url: url.to_string(),
                status: status.as_u16(),
            },
            AttemptError::RangeNotSatisfiable | AttemptError::RangeIgnored => {
                Error::DownloadRejected {
                    url: url.to_string(),
                    status: StatusCode::RANGE_NOT_SATISFIABLE.as_u16(),
                }
            }
            AttemptError::Io(err) => Error::Io(err),
            AttemptError::Interrupted => Error::Interrupted,
        }
    }
}

fn classify_status(status: StatusCode) -> Result<(), AttemptError> {
    if status == StatusCode::RANGE_NOT_SATISFIABLE {
        return Err(AttemptError::RangeNotSatisfiable);
    }
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(AttemptError::Status(status));
    }
    if status.is_client_error() {
        return Err(AttemptError::Rejected(status));
    }
    Ok(())
}

/// A resumable, verified downloader into the content cache.
pub struct Downloader {
    client: reqwest::Client,
    settings: DownloadSettings,
    token: CancellationToken,
}

impl Downloader {
    pub fn new(settings: DownloadSettings, token: CancellationToken) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            settings,
            token,
        })
    }

    /// Download `url` into `cache_path` and verify it against `expected_sha256`.
    ///
    /// A complete cached file is verified and returned without touching the
    /// network; a shorter one is resumed with a ranged request. Transfers are
    /// retried within the configured budget; checksum failures delete the
    /// cache file and are never retried.
    pub async fn fetch(
        &self,
        url: &str,
        expected_sha256: &str,
        expected_size: u64,
        cache_path: &Path,
        progress: &dyn Progress,
    ) -> Result<PathBuf> {
        progress.set_length(expected_size);

        match file_len(cache_path)? {
            Some(len) if len == expected_size => {
                trace!(path = %cache_path.display(), "Archive already cached, verifying");
                progress.bytes(len);
                progress.finish();
                self.verify(cache_path, expected_sha256).await?;
                return Ok(cache_path.to_path_buf());
            }
            Some(len) if len > expected_size => {
                // The cached file cannot be a prefix of the archive.
                debug!(path = %cache_path.display(), "Cached file is oversized, discarding");
                fs_err::tokio::remove_file(cache_path).await?;
            }
            Some(len) => {
                debug!(
                    path = %cache_path.display(),
                    have = len,
                    want = expected_size,
                    "Resuming partial download"
                );
                progress.bytes(len);
            }
            None => {}
        }

        let budget = self.settings.retry_count + 1;
        let mut attempts = 0u32;
        let mut restarted_on_416 = false;

        loop {
            attempts += 1;
            match self.attempt(url, expected_size, cache_path, progress).await {
                Ok(()) => break,
                Err(AttemptError::RangeNotSatisfiable) if !restarted_on_416 => {
                    // The cached prefix is not resumable; restart once from scratch.
                    debug!(url, "Server rejected the resume range, restarting download");
                    restarted_on_416 = true;
                    attempts -= 1;
                    remove_if_exists(cache_path).await?;
                }
                Err(AttemptError::Interrupted) => return Err(Error::Interrupted),
                Err(err) if err.retryable() && attempts < budget => {
                    debug!(url, attempt = attempts, ?err, "Transfer failed, retrying");
                    let delay = Duration::from_secs(self.settings.retry_delay_secs);
                    tokio::select! {
                        () = self.token.cancelled() => return Err(Error::Interrupted),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) if err.retryable() => {
                    return Err(Error::NetworkExhausted {
                        url: url.to_string(),
                        attempts,
                        source: Box::new(err.into_error(url)),
                    });
                }
                Err(err) => return Err(err.into_error(url)),
            }
        }

        progress.finish();
        self.verify(cache_path, expected_sha256).await?;
        Ok(cache_path.to_path_buf())
    }

    async fn attempt(
        &self,
        url: &str,
        expected_size: u64,
        cache_path: &Path,
        progress: &dyn Progress,
    ) -> Result<(), AttemptError> {
        let existing = file_len(cache_path).map_err(AttemptError::Io)?.unwrap_or(0);

        if existing == 0
            && self.settings.parallel
            && self.settings.max_connections > 1
            && expected_size > 0
        {
            match self
                .parallel_transfer(url, expected_size, cache_path, progress)
                .await
            {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    trace!(url, "Server does not support ranges, using a single stream");
                }
                Err(AttemptError::RangeIgnored) => {
                    // The server advertised ranges but replayed full bodies.
                    remove_if_exists(cache_path).await.map_err(AttemptError::Io)?;
                }
                Err(err) => {
                    // A segmented file with holes cannot be resumed by append.
                    remove_if_exists(cache_path).await.map_err(AttemptError::Io)?;
                    return Err(err);
                }
            }
        }

        self.single_stream(url, existing, cache_path, progress).await
    }

    async fn single_stream(
        &self,
        url: &str,
        resume_from: u64,
        cache_path: &Path,
        progress: &dyn Progress,
    ) -> Result<(), AttemptError> {
        let mut request = self.client.get(url);
        if resume_from > 0 {
            request = request.header(RANGE, format!("bytes={resume_from}-"));
        }

        let response = request.send().await.map_err(AttemptError::Network)?;
        classify_status(response.status())?;

        let mut file = if resume_from > 0 && response.status() == StatusCode::PARTIAL_CONTENT {
            fs_err::tokio::OpenOptions::new()
                .append(true)
                .open(cache_path)
                .await
                .map_err(AttemptError::Io)?
        } else {
            // Either a fresh download, or the server ignored the range and
            // replayed the whole body.
            fs_err::tokio::File::create(cache_path)
                .await
                .map_err(AttemptError::Io)?
        };

        let mut stream = response.bytes_stream();
        loop {
            let chunk = tokio::select! {
                () = self.token.cancelled() => return Err(AttemptError::Interrupted),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk.map_err(AttemptError::Network)?;
            file.write_all(&chunk).await.map_err(AttemptError::Io)?;
            progress.bytes(chunk.len() as u64);
        }

        file.flush().await.map_err(AttemptError::Io)?;
        Ok(())
    }

    /// Fetch disjoint segments concurrently into a preallocated file.
    ///
    /// Returns `Ok(false)` when the server does not advertise range support.
    /// Workers stream `(offset, bytes)` pairs to a single writer task that
    /// owns the file handle.
    async fn parallel_transfer(
        &self,
        url: &str,
        expected_size: u64,
        cache_path: &Path,
        progress: &dyn Progress,
    ) -> Result<bool, AttemptError> {
        let head = self
            .client
            .head(url)
            .send()
            .await
            .map_err(AttemptError::Network)?;
        match classify_status(head.status()) {
            Ok(()) => {}
            // Servers that refuse HEAD still serve plain GETs.
            Err(AttemptError::Rejected(_) | AttemptError::RangeNotSatisfiable) => {
                return Ok(false);
            }
            Err(err) => return Err(err),
        }

        let supports_ranges = head
            .headers()
            .get(ACCEPT_RANGES)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.eq_ignore_ascii_case("bytes"));
        if !supports_ranges {
            return Ok(false);
        }

        let connections = u64::from(self.settings.max_connections).min(expected_size);
        let segment = expected_size.div_ceil(connections);
        debug!(url, connections, segment, "Fetching archive segments in parallel");

        let file = fs_err::tokio::File::create(cache_path)
            .await
            .map_err(AttemptError::Io)?;
        file.set_len(expected_size).await.map_err(AttemptError::Io)?;
        let mut file = file;

        let (tx, mut rx) = tokio::sync::mpsc::channel::<(u64, Vec<u8>)>(16);
        let mut workers: JoinSet<Result<(), AttemptError>> = JoinSet::new();

        let mut start = 0u64;
        while start < expected_size {
            let end = (start + segment).min(expected_size) - 1;
            let client = self.client.clone();
            let url = url.to_string();
            let tx = tx.clone();
            workers.spawn(async move {
                let response = client
                    .get(&url)
                    .header(RANGE, format!("bytes={start}-{end}"))
                    .send()
                    .await
                    .map_err(AttemptError::Network)?;
                classify_status(response.status())?;
                if response.status() != StatusCode::PARTIAL_CONTENT {
                    return Err(AttemptError::RangeIgnored);
                }

                let mut offset = start;
                let mut stream = response.bytes_stream();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(AttemptError::Network)?;
                    let len = chunk.len() as u64;
                    if tx.send((offset, chunk.to_vec())).await.is_err() {
                        // The writer is gone; it carries the failure.
                        return Ok(());
                    }
                    offset += len;
                }
                Ok(())
            });
            start = end + 1;
        }
        drop(tx);

        let write_result: Result<(), AttemptError> = loop {
            let received = tokio::select! {
                () = self.token.cancelled() => break Err(AttemptError::Interrupted),
                received = rx.recv() => received,
            };
            let Some((offset, buf)) = received else {
                break Ok(());
            };
            if let Err(err) = file.seek(SeekFrom::Start(offset)).await {
                break Err(AttemptError::Io(err));
            }
            if let Err(err) = file.write_all(&buf).await {
                break Err(AttemptError::Io(err));
            }
            progress.bytes(buf.len() as u64);
        };

        if write_result.is_err() {
            workers.abort_all();
        }
        let mut worker_error: Option<AttemptError> = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    worker_error.get_or_insert(err);
                }
                Err(err) if err.is_cancelled() => {}
                Err(err) => {
                    worker_error.get_or_insert(AttemptError::Io(std::io::Error::other(err)));
                }
            }
        }
        write_result?;
        if let Some(err) = worker_error {
            return Err(err);
        }

        file.flush().await.map_err(AttemptError::Io)?;
        Ok(true)
    }

    /// Hash the cache file; delete it and fail on mismatch.
    async fn verify(&self, path: &Path, expected_sha256: &str) -> Result<()> {
        let actual = hash_file(path).await?;
        if !actual.eq_ignore_ascii_case(expected_sha256) {
            fs_err::tokio::remove_file(path).await?;
            return Err(Error::ChecksumMismatch {
                path: path.to_path_buf(),
                expected: expected_sha256.to_string(),
                actual,
            });
        }
        trace!(path = %path.display(), "Checksum verified");
        Ok(())
    }
}

/// The SHA-256 of a file, lowercase hex.
pub async fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = fs_err::tokio::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUF_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn file_len(path: &Path) -> std::io::Result<Option<u64>> {
    match fs_err::metadata(path) {
        Ok(metadata) => Ok(Some(metadata.len())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs_err::tokio::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
