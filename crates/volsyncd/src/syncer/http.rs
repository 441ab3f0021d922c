//! Single-file HTTP download.

use std::path::PathBuf;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::deadline::Deadline;
use crate::error::{Result, SyncError};
use crate::fsutil::ensure_dir;
use crate::mask::mask_credentials;
use crate::request::HttpDetails;
use crate::syncer::Syncer;

/// Name used when neither the headers nor the URL yield one.
const FALLBACK_FILENAME: &str = "downloaded_file";

/// Some servers refuse non-browser clients outright.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36";

pub struct HttpSyncer {
    details: HttpDetails,
    target: PathBuf,
    timeout: Duration,
}

impl HttpSyncer {
    pub fn new(details: HttpDetails, target: PathBuf, timeout: Duration) -> Self {
        Self {
            details,
            target,
            timeout,
        }
    }

    async fn download(&self, client: &reqwest::Client) -> Result<()> {
        let response = client
            .get(&self.details.url)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Network(format!(
                "download request failed: {}",
                status
            )));
        }

        let disposition = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let filename = resolve_filename(response.url().path(), disposition.as_deref());

        let out_path = self.target.join(&filename);
        let mut file = tokio::fs::File::create(&out_path)
            .await
            .map_err(|e| SyncError::filesystem(&out_path, e))?;

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            file.write_all(&chunk)
                .await
                .map_err(|e| SyncError::filesystem(&out_path, e))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| SyncError::filesystem(&out_path, e))?;

        log::info!("downloaded {} ({} bytes)", out_path.display(), written);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Syncer for HttpSyncer {
    async fn sync(&self) -> Result<()> {
        let deadline = Deadline::after(self.timeout);
        ensure_dir(&self.target)?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SyncError::Unknown(format!("failed to build http client: {}", e)))?;

        tokio::time::timeout(deadline.remaining()?, self.download(&client))
            .await
            .map_err(|_| deadline.expired())?
    }
}

fn map_reqwest_error(e: reqwest::Error) -> SyncError {
    // Error text can echo the URL, which may carry credentials.
    SyncError::Network(mask_credentials(&e.to_string()))
}

/// Filename resolution: `Content-Disposition` first, then the last URL path
/// segment, then a fixed fallback.
fn resolve_filename(url_path: &str, content_disposition: Option<&str>) -> String {
    if let Some(header) = content_disposition {
        if let Some(index) = header.find("filename=") {
            let value = &header[index + "filename=".len()..];
            let value = value.split(';').next().unwrap_or("");
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }

    let base = url_path.rsplit('/').next().unwrap_or("");
    if base.is_empty() || base == "." {
        FALLBACK_FILENAME.to_string()
    } else {
        base.to_string()
    }
}
