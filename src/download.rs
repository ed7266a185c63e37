use crate::error::ProvisionError;
use async_trait::async_trait;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

/// Retrieves one HTTP(S) resource into a local file.
///
/// On success `dest` holds the complete body. On failure the state of
/// `dest` is unspecified and cleanup is the caller's job.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn download(&self, url: &str, dest: &Path) -> Result<Duration, ProvisionError>;
}

/// Single-attempt streaming GET; transport timeouts are reqwest's defaults.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    show_progress: bool,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ffprovision/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            show_progress: false,
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    fn progress_bar(&self, total_size: u64, filename: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total_size);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(format!("Downloading {}", filename));
        pb
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn download(&self, url: &str, dest: &Path) -> Result<Duration, ProvisionError> {
        let start = Instant::now();
        let filename = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| url.to_string());

        tracing::info!("Downloading {}...", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProvisionError::download(url, e))?;
        let total_size = response.content_length().unwrap_or(0);

        let pb = self.progress_bar(total_size, &filename);

        let mut file = fs::File::create(dest)
            .map_err(|e| ProvisionError::download(url, format!("{}: {}", dest.display(), e)))?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ProvisionError::download(url, e))?;
            file.write_all(&chunk)
                .map_err(|e| ProvisionError::download(url, format!("{}: {}", dest.display(), e)))?;
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }

        file.flush()
            .map_err(|e| ProvisionError::download(url, format!("{}: {}", dest.display(), e)))?;

        if total_size > 0 && downloaded != total_size {
            return Err(ProvisionError::download(
                url,
                format!("expected {} bytes, received {}", total_size, downloaded),
            ));
        }

        pb.finish_with_message("Download complete");

        let elapsed = start.elapsed();
        tracing::info!(
            "Downloaded {} bytes in {:.2}s",
            downloaded,
            elapsed.as_secs_f64()
        );
        Ok(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn fetcher() -> HttpFetcher {
        // Loopback requests must not be routed through a proxy from the environment
        HttpFetcher::with_client(reqwest::Client::builder().no_proxy().build().unwrap())
    }

    /// Answers a single request with a canned HTTP response.
    async fn serve_once(status_line: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status_line,
                body.len()
            );
            // Client may hang up early
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        });

        format!("http://{}/ffmpeg-release.zip", addr)
    }

    #[tokio::test]
    async fn test_download_writes_full_body() {
        let body: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
        let url = serve_once("200 OK", body.clone()).await;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("release.zip.download");

        fetcher().download(&url, &dest).await.unwrap();

        assert_eq!(fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn test_http_error_status_is_download_failure() {
        let url = serve_once("404 Not Found", b"missing".to_vec()).await;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("release.zip.download");

        let err = fetcher().download(&url, &dest).await.unwrap_err();
        match err {
            ProvisionError::DownloadFailed { url: failed, reason } => {
                assert_eq!(failed, url);
                assert!(reason.contains("404"), "reason: {}", reason);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_is_download_failure() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("release.zip.download");
        let err = fetcher()
            .download(&format!("http://{}/x.zip", addr), &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::DownloadFailed { .. }));
    }

    #[tokio::test]
    async fn test_unwritable_destination_is_download_failure() {
        let url = serve_once("200 OK", b"data".to_vec()).await;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("missing-dir").join("release.zip");

        let err = fetcher().download(&url, &dest).await.unwrap_err();
        assert!(matches!(err, ProvisionError::DownloadFailed { .. }));
    }
}
