//! HTTP transport for the upload queue.
//!
//! Uploads each file as a streamed multipart `PUT` to the file store API
//! and reports progress as body chunks are handed to the connection.

use std::io;

use filebay_upload_queue::path::encode_path_for_api;
use filebay_upload_queue::{
    FilePayload, PayloadSource, ProgressCallback, Transfer, TransferError, TransferFuture,
};
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::multipart::{Form, Part};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Body chunk size.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Multipart field the server reads files from.
const FORM_FIELD: &str = "files";

/// Errors building an [`HttpTransfer`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid API origin: {0}")]
    InvalidOrigin(String),
}

/// Uploads files to `{api_origin}/api/files`.
#[derive(Debug, Clone)]
pub struct HttpTransfer {
    http: reqwest::Client,
    api_origin: String,
}

impl HttpTransfer {
    /// Creates a transport for the given origin, e.g. `http://localhost:8080`.
    pub fn new(api_origin: &str) -> Result<Self, Error> {
        let api_origin = api_origin.trim_end_matches('/');
        if !(api_origin.starts_with("http://") || api_origin.starts_with("https://")) {
            return Err(Error::InvalidOrigin(api_origin.to_string()));
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("filebay/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_origin: api_origin.to_string(),
        })
    }

    pub fn api_origin(&self) -> &str {
        &self.api_origin
    }

    fn upload_url(&self, target_path: &str) -> String {
        format!(
            "{}/api/files?path={}",
            self.api_origin,
            encode_path_for_api(target_path)
        )
    }

    async fn upload(
        &self,
        payload: &FilePayload,
        target_path: &str,
        on_progress: ProgressCallback,
    ) -> Result<(), TransferError> {
        let size = payload.size();
        let body = reqwest::Body::wrap_stream(counted(open_chunks(payload).await?, size, on_progress));
        let part = Part::stream_with_length(body, size)
            .file_name(payload.name().to_string())
            .mime_str("application/octet-stream")
            .map_err(network_error)?;
        let form = Form::new().part(FORM_FIELD, part);

        let url = self.upload_url(target_path);
        debug!(file = %payload.name(), size, %url, "uploading");

        let resp = self
            .http
            .put(&url)
            .multipart(form)
            .send()
            .await
            .map_err(network_error)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        let message = server_message(&body).unwrap_or_else(|| {
            format!(
                "{} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or_default()
            )
            .trim_end()
            .to_string()
        });
        warn!(file = %payload.name(), status = status.as_u16(), %message, "upload rejected");
        Err(TransferError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

impl Transfer for HttpTransfer {
    fn transfer<'a>(
        &'a self,
        payload: &'a FilePayload,
        target_path: &'a str,
        on_progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> TransferFuture<'a> {
        Box::pin(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(file = %payload.name(), "upload aborted");
                    Err(TransferError::Cancelled)
                }
                res = self.upload(payload, target_path, on_progress) => res,
            }
        })
    }
}

/// Opens the payload as a stream of body chunks.
async fn open_chunks(
    payload: &FilePayload,
) -> Result<BoxStream<'static, io::Result<Vec<u8>>>, TransferError> {
    match payload.source() {
        PayloadSource::Memory(data) => {
            let data = data.clone();
            let chunks = (0..data.len()).step_by(CHUNK_SIZE).map(move |start| {
                let end = (start + CHUNK_SIZE).min(data.len());
                Ok::<_, io::Error>(data[start..end].to_vec())
            });
            Ok(stream::iter(chunks).boxed())
        }
        PayloadSource::File(path) => {
            let file = tokio::fs::File::open(path).await.map_err(|e| {
                TransferError::Network(format!("failed to open {}: {e}", path.display()))
            })?;
            Ok(ReaderStream::with_capacity(file, CHUNK_SIZE)
                .map_ok(Vec::<u8>::from)
                .boxed())
        }
    }
}

/// Reports the running percentage after each chunk.
fn counted(
    chunks: BoxStream<'static, io::Result<Vec<u8>>>,
    total: u64,
    on_progress: ProgressCallback,
) -> BoxStream<'static, io::Result<Vec<u8>>> {
    let mut sent = 0u64;
    if total == 0 {
        on_progress(100);
    }
    chunks
        .inspect_ok(move |chunk| {
            sent += chunk.len() as u64;
            if total > 0 {
                on_progress(percent(sent, total));
            }
        })
        .boxed()
}

fn percent(sent: u64, total: u64) -> u8 {
    ((sent as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

/// Extracts the `error` field from a JSON error body.
fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn network_error(e: reqwest::Error) -> TransferError {
    TransferError::Network(format!("network error during upload: {e}"))
}
