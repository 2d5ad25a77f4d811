//! Step-driven chunked upload of one local file.
//!
//! The request body is a stream the connection pulls while [`FileUploader::step`]
//! feeds it one bounded chunk at a time, so a driver loop can interleave UI
//! work between calls instead of blocking for the whole transfer.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::SinkExt;
use reqwest::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use gallery_types::{mime, UploadResponse};

use crate::error::{GalleryClientError, Result};

/// Fixed multipart boundary token used for every upload request.
const MULTIPART_BOUNDARY: &str = "d5863be2b7234d17a3348556e8b757b5";

/// One local file queued for upload: its path and the MIME type it is
/// declared with. Immutable once created.
#[derive(Debug, Clone)]
pub struct UploadTarget {
    path: PathBuf,
    mime_type: String,
}

impl UploadTarget {
    /// Creates a target with the MIME type inferred from the file extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mime_type = mime::mime_type_for_path(&path).to_string();
        Self { path, mime_type }
    }

    pub fn with_mime_type(path: impl Into<PathBuf>, mime_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// File name part of the path, as declared in the multipart header.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Progress of one upload after a [`FileUploader::step`] call.
///
/// `handle` stays `None` until the upload completes; once present the upload
/// is terminal and must not be advanced again.
#[derive(Debug, Clone)]
pub struct UploadProgress {
    pub handle: Option<String>,
    /// Fraction of the file sent so far, in `[0, 1]`. Reaches exactly 1.0
    /// only on the call that yields the handle.
    pub fraction: f64,
}

/// Streams exactly one local file to the upload endpoint in bounded chunks.
///
/// Drive it to completion with repeated [`step`](Self::step) calls; each call
/// performs one chunk of I/O. Abandoning an unfinished uploader requires
/// [`abort`](Self::abort) (or dropping it), which closes the file and tears
/// down the connection.
#[derive(Debug)]
pub struct FileUploader {
    file: File,
    file_name: String,
    file_size: u64,
    bytes_sent: u64,
    chunk_size: usize,
    footer: Bytes,
    body_tx: Option<mpsc::Sender<io::Result<Bytes>>>,
    exchange: Option<JoinHandle<reqwest_middleware::Result<reqwest::Response>>>,
    finished: bool,
}

impl FileUploader {
    /// Opens the file and starts the upload request.
    ///
    /// The request declares an exact `Content-Length` covering the multipart
    /// header, the file bytes and the footer; the HTTP exchange runs on its
    /// own task and pulls body chunks as [`step`](Self::step) provides them,
    /// so this must be called from within a tokio runtime. Fails without any
    /// network side effects if the file cannot be opened or stat'd.
    pub async fn begin(
        client: &ClientWithMiddleware,
        upload_url: &str,
        target: &UploadTarget,
        chunk_size: usize,
    ) -> Result<Self> {
        let file = File::open(target.path()).await?;
        let file_size = file.metadata().await?.len();
        let file_name = target.file_name();

        let header = Bytes::from(format!(
            "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{file_name}\"\r\nContent-Type: {}\r\n\r\n",
            target.mime_type()
        ));
        let footer = Bytes::from(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n"));
        let content_length = header.len() as u64 + file_size + footer.len() as u64;

        debug!(url = upload_url, file = %file_name, file_size, "starting upload");

        // One chunk in flight at a time: the next send waits until the
        // connection has taken the previous chunk off the channel.
        let (mut body_tx, body_rx) = mpsc::channel::<io::Result<Bytes>>(1);

        let request = client
            .post(upload_url)
            .header(CONNECTION, "Keep-Alive")
            .header(CONTENT_LENGTH, content_length)
            .header(CONTENT_TYPE, format!("multipart/form-data;boundary={MULTIPART_BOUNDARY}"))
            .body(reqwest::Body::wrap_stream(body_rx));

        let exchange = tokio::spawn(request.send());

        if body_tx.send(Ok(header)).await.is_err() {
            exchange.abort();
            return Err(GalleryClientError::InternalError(anyhow!("upload connection closed before body start")));
        }

        Ok(Self {
            file,
            file_name,
            file_size,
            bytes_sent: 0,
            chunk_size,
            footer,
            body_tx: Some(body_tx),
            exchange: Some(exchange),
            finished: false,
        })
    }

    /// Sends the next chunk of the file.
    ///
    /// While bytes remain the returned handle is `None`. The call that sends
    /// the final file byte also sends the multipart footer, reads the
    /// response and returns the upload handle with fraction 1.0.
    pub async fn step(&mut self) -> Result<UploadProgress> {
        if self.finished {
            return Err(GalleryClientError::UploadAlreadyComplete);
        }

        if self.bytes_sent < self.file_size {
            let want = self.chunk_size.min((self.file_size - self.bytes_sent) as usize);
            let mut buf = vec![0u8; want];
            let n = self.file.read(&mut buf).await?;
            if n == 0 {
                // The file shrank after we declared its Content-Length.
                self.finished = true;
                return Err(GalleryClientError::IOError(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("{} truncated during upload", self.file_name),
                )));
            }
            buf.truncate(n);
            self.send_body(Bytes::from(buf)).await?;
            self.bytes_sent += n as u64;
            debug!(file = %self.file_name, sent = self.bytes_sent, total = self.file_size, "sent chunk");

            if self.bytes_sent < self.file_size {
                return Ok(UploadProgress {
                    handle: None,
                    fraction: self.bytes_sent as f64 / self.file_size as f64,
                });
            }
        }

        let handle = self.finish().await?;
        Ok(UploadProgress {
            handle: Some(handle),
            fraction: 1.0,
        })
    }

    /// Number of file bytes sent so far. Monotonically non-decreasing.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Size of the file being uploaded.
    pub fn total_bytes(&self) -> u64 {
        self.file_size
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Abandons the upload, closing the file and tearing down the connection.
    /// Any bytes the server already received are orphaned; there is no
    /// server-side cleanup call.
    pub fn abort(mut self) {
        debug!(file = %self.file_name, "aborting upload");
        self.body_tx = None;
        if let Some(exchange) = self.exchange.take() {
            exchange.abort();
        }
    }

    async fn finish(&mut self) -> Result<String> {
        // Spent from here on, even if the exchange fails.
        self.finished = true;

        let footer = self.footer.clone();
        self.send_body(footer).await?;
        // Closing the channel ends the request body.
        self.body_tx = None;

        let exchange = self
            .exchange
            .take()
            .ok_or_else(|| GalleryClientError::InternalError(anyhow!("upload exchange already consumed")))?;
        let response = exchange
            .await
            .map_err(|e| GalleryClientError::InternalError(anyhow!("upload task failed: {e}")))??;

        let status = response.status();
        if !status.is_success() {
            warn!(file = %self.file_name, %status, "upload rejected");
            return Err(upload_failed(status));
        }

        let body = response.bytes().await?;
        let parsed: UploadResponse = serde_json::from_slice(&body)?;
        if parsed.element_id.is_empty() {
            // Shouldn't happen[tm].
            return Err(GalleryClientError::MissingUploadHandle);
        }

        debug!(file = %self.file_name, handle = %parsed.element_id, "upload complete");
        Ok(parsed.element_id)
    }

    async fn send_body(&mut self, chunk: Bytes) -> Result<()> {
        let Some(body_tx) = self.body_tx.as_mut() else {
            return Err(GalleryClientError::InternalError(anyhow!("upload body already closed")));
        };

        if body_tx.send(Ok(chunk)).await.is_ok() {
            return Ok(());
        }

        // The connection stopped pulling the body. If the exchange already
        // finished, its status is the real story.
        self.finished = true;
        self.body_tx = None;
        let Some(exchange) = self.exchange.take() else {
            return Err(GalleryClientError::InternalError(anyhow!("upload connection closed mid-body")));
        };
        match exchange.await {
            Ok(Ok(response)) => Err(upload_failed(response.status())),
            Ok(Err(e)) => Err(e.into()),
            Err(e) => Err(GalleryClientError::InternalError(anyhow!("upload task failed: {e}"))),
        }
    }
}

impl Drop for FileUploader {
    fn drop(&mut self) {
        if let Some(exchange) = self.exchange.take() {
            exchange.abort();
        }
    }
}

fn upload_failed(status: StatusCode) -> GalleryClientError {
    GalleryClientError::UploadFailed {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("unknown").to_string(),
    }
}
