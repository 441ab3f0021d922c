//! Minimal S3-compatible object-store client.
//!
//! Speaks just enough of the S3 REST API for mirroring: a bounded
//! connectivity probe, paginated ListObjectsV2 and streaming object GETs,
//! signed with Signature V4. Addressing style and TLS strictness are picked
//! from the endpoint: the public cloud domain gets virtual-hosted addressing
//! and full verification, everything else defaults to path-style with
//! relaxed certificates (self-signed endpoints are the norm in private
//! deployments).

pub mod sigv4;

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use secrecy::ExposeSecret;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::deadline::Deadline;
use crate::error::{Result, SyncError};
use crate::request::S3Details;
use sigv4::{canonical_query_string, sign_get, uri_encode, SigningContext, EMPTY_PAYLOAD_SHA256};

/// How bucket and key are placed in the request URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingStyle {
    Path,
    VirtualHosted,
}

impl AddressingStyle {
    pub fn flipped(self) -> Self {
        match self {
            AddressingStyle::Path => AddressingStyle::VirtualHosted,
            AddressingStyle::VirtualHosted => AddressingStyle::Path,
        }
    }
}

/// One page of a ListObjectsV2 response.
#[derive(Debug, Default)]
pub struct ListPage {
    pub keys: Vec<String>,
    pub truncated: bool,
    pub continuation: Option<String>,
}

pub struct ObjectStoreClient<'a> {
    http: reqwest::Client,
    endpoint: Url,
    details: &'a S3Details,
    style: AddressingStyle,
    cloud_endpoint: bool,
}

impl<'a> ObjectStoreClient<'a> {
    /// Builds a client from validated details. No I/O happens here.
    pub fn connect(details: &'a S3Details) -> Result<Self> {
        let endpoint = Url::parse(&details.endpoint_url).map_err(|e| {
            SyncError::Validation(format!(
                "invalid endpoint URL '{}': {}",
                details.endpoint_url, e
            ))
        })?;
        if endpoint.host_str().is_none() {
            return Err(SyncError::Validation(format!(
                "endpoint URL '{}' has no host",
                details.endpoint_url
            )));
        }

        let cloud_endpoint = endpoint
            .host_str()
            .is_some_and(|h| h.ends_with("amazonaws.com"));
        let style = if cloud_endpoint {
            AddressingStyle::VirtualHosted
        } else {
            AddressingStyle::Path
        };

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!cloud_endpoint)
            .build()
            .map_err(|e| SyncError::Unknown(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            details,
            style,
            cloud_endpoint,
        })
    }

    pub fn style(&self) -> AddressingStyle {
        self.style
    }

    /// True for the public cloud provider's own domain.
    pub fn is_cloud_endpoint(&self) -> bool {
        self.cloud_endpoint
    }

    /// Same client with the opposite addressing style.
    pub fn with_flipped_style(&self) -> Self {
        Self {
            http: self.http.clone(),
            endpoint: self.endpoint.clone(),
            details: self.details,
            style: self.style.flipped(),
            cloud_endpoint: self.cloud_endpoint,
        }
    }

    /// Host header value and encoded request path for `key` (empty key
    /// addresses the bucket itself).
    fn request_parts(&self, key: &str) -> (String, String) {
        let host = self.endpoint.host_str().unwrap_or_default();
        let authority = match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        match self.style {
            AddressingStyle::Path => {
                let mut path = format!("/{}", self.details.bucket_name);
                if !key.is_empty() {
                    path.push('/');
                    path.push_str(&uri_encode(key, false));
                }
                (authority, path)
            }
            AddressingStyle::VirtualHosted => {
                let host = format!("{}.{}", self.details.bucket_name, authority);
                let path = if key.is_empty() {
                    "/".to_string()
                } else {
                    format!("/{}", uri_encode(key, false))
                };
                (host, path)
            }
        }
    }

    async fn signed_get(
        &self,
        key: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let (host, path) = self.request_parts(key);
        let ctx = SigningContext {
            access_key: &self.details.access_key,
            secret_key: self.details.secret_key.expose_secret(),
            region: &self.details.region,
        };
        let signed = sign_get(&ctx, &host, &path, query, chrono::Utc::now());

        let mut url = format!("{}://{}{}", self.endpoint.scheme(), host, path);
        let query_string = canonical_query_string(query);
        if !query_string.is_empty() {
            url.push('?');
            url.push_str(&query_string);
        }

        self.http
            .get(&url)
            .header("x-amz-date", &signed.amz_date)
            .header("x-amz-content-sha256", EMPTY_PAYLOAD_SHA256)
            .header("authorization", &signed.authorization)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))
    }

    fn check_status(status: reqwest::StatusCode, action: &str) -> Result<()> {
        if status.is_success() {
            return Ok(());
        }
        if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::UNAUTHORIZED
        {
            return Err(SyncError::Auth(format!(
                "object store rejected {} ({})",
                action, status
            )));
        }
        Err(SyncError::Network(format!(
            "object store {} failed ({})",
            action, status
        )))
    }

    /// Bounded listing of at most one key, to verify connectivity and
    /// addressing style before the real work.
    pub async fn probe(&self, timeout: Duration) -> Result<()> {
        let query = vec![
            ("list-type".to_string(), "2".to_string()),
            ("max-keys".to_string(), "1".to_string()),
        ];
        let response = self.signed_get("", &query, timeout).await?;
        Self::check_status(response.status(), "connectivity probe")
    }

    /// All keys under `prefix`, across pagination, in listing order.
    pub async fn list(&self, prefix: &str, deadline: &Deadline) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("prefix".to_string(), prefix.to_string()),
            ];
            if let Some(token) = &continuation {
                query.push(("continuation-token".to_string(), token.clone()));
            }

            let response = self.signed_get("", &query, deadline.remaining()?).await?;
            Self::check_status(response.status(), "listing")?;
            let body = response
                .text()
                .await
                .map_err(|e| SyncError::Network(e.to_string()))?;

            let page = parse_list_page(&body)?;
            keys.extend(page.keys);
            if !page.truncated {
                break;
            }
            continuation = page.continuation;
            if continuation.is_none() {
                // Truncated page without a token would loop forever.
                return Err(SyncError::Network(
                    "listing reported truncation without a continuation token".to_string(),
                ));
            }
        }

        Ok(keys)
    }

    /// Streams one object into `dest`. The caller owns partial-file cleanup.
    pub async fn fetch(&self, key: &str, dest: &Path, deadline: &Deadline) -> Result<()> {
        let response = self.signed_get(key, &[], deadline.remaining()?).await?;
        Self::check_status(response.status(), "download")?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| SyncError::filesystem(dest, e))?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| SyncError::Network(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| SyncError::filesystem(dest, e))?;
        }
        file.flush()
            .await
            .map_err(|e| SyncError::filesystem(dest, e))
    }
}

/// Parses one ListObjectsV2 XML page.
pub fn parse_list_page(xml: &str) -> Result<ListPage> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut page = ListPage::default();
    let mut in_contents = false;
    let mut current: Option<&'static str> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"Contents" => in_contents = true,
                b"Key" if in_contents => current = Some("key"),
                b"IsTruncated" => current = Some("truncated"),
                b"NextContinuationToken" => current = Some("continuation"),
                _ => current = None,
            },
            Ok(Event::End(ref e)) => {
                if e.local_name().as_ref() == b"Contents" {
                    in_contents = false;
                }
                current = None;
            }
            Ok(Event::Text(ref t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| SyncError::Network(format!("malformed listing XML: {}", e)))?;
                match current {
                    Some("key") => page.keys.push(text.into_owned()),
                    Some("truncated") => page.truncated = text.as_ref() == "true",
                    Some("continuation") => page.continuation = Some(text.into_owned()),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SyncError::Network(format!("malformed listing XML: {}", e)));
            }
            _ => {}
        }
    }

    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn details(endpoint: &str) -> S3Details {
        S3Details::from_value(&json!({
            "endpointUrl": endpoint,
            "bucketName": "assets",
            "path": "a/",
            "accessKey": "AK",
            "secretKey": "SK",
            "region": "us-east-1"
        }))
        .unwrap()
    }

    #[test]
    fn cloud_endpoint_gets_virtual_hosted_style() {
        let details = details("https://s3.us-east-1.amazonaws.com");
        let client = ObjectStoreClient::connect(&details).unwrap();
        assert!(client.is_cloud_endpoint());
        assert_eq!(client.style(), AddressingStyle::VirtualHosted);
    }

    #[test]
    fn private_endpoint_defaults_to_path_style() {
        let details = details("https://minio.internal:9000");
        let client = ObjectStoreClient::connect(&details).unwrap();
        assert!(!client.is_cloud_endpoint());
        assert_eq!(client.style(), AddressingStyle::Path);
    }

    #[test]
    fn invalid_endpoint_is_a_validation_error() {
        let details = details("not a url");
        let err = ObjectStoreClient::connect(&details).err().unwrap();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[test]
    fn path_style_request_parts() {
        let details = details("http://minio.internal:9000");
        let client = ObjectStoreClient::connect(&details).unwrap();
        let (host, path) = client.request_parts("a/file name.txt");
        assert_eq!(host, "minio.internal:9000");
        assert_eq!(path, "/assets/a/file%20name.txt");

        let (host, path) = client.request_parts("");
        assert_eq!(host, "minio.internal:9000");
        assert_eq!(path, "/assets");
    }

    #[test]
    fn virtual_hosted_request_parts() {
        let details = details("https://s3.amazonaws.com");
        let client = ObjectStoreClient::connect(&details).unwrap();
        let (host, path) = client.request_parts("a/x.txt");
        assert_eq!(host, "assets.s3.amazonaws.com");
        assert_eq!(path, "/a/x.txt");
    }

    #[test]
    fn style_flip_round_trips() {
        let details = details("http://minio.internal:9000");
        let client = ObjectStoreClient::connect(&details).unwrap();
        let flipped = client.with_flipped_style();
        assert_eq!(flipped.style(), AddressingStyle::VirtualHosted);
        assert_eq!(flipped.with_flipped_style().style(), AddressingStyle::Path);
    }

    #[test]
    fn parses_listing_page() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <ListBucketResult>
                <Name>assets</Name>
                <Prefix>a/</Prefix>
                <IsTruncated>true</IsTruncated>
                <NextContinuationToken>token-123</NextContinuationToken>
                <Contents><Key>a/</Key><Size>0</Size></Contents>
                <Contents><Key>a/x.txt</Key><Size>5</Size></Contents>
                <Contents><Key>a/b/y.txt</Key><Size>7</Size></Contents>
            </ListBucketResult>"#;

        let page = parse_list_page(xml).unwrap();
        assert_eq!(page.keys, vec!["a/", "a/x.txt", "a/b/y.txt"]);
        assert!(page.truncated);
        assert_eq!(page.continuation.as_deref(), Some("token-123"));
    }

    #[test]
    fn parses_terminal_page() {
        let xml = r#"<ListBucketResult>
                <IsTruncated>false</IsTruncated>
                <Contents><Key>a/x.txt</Key></Contents>
            </ListBucketResult>"#;

        let page = parse_list_page(xml).unwrap();
        assert_eq!(page.keys, vec!["a/x.txt"]);
        assert!(!page.truncated);
        assert!(page.continuation.is_none());
    }

    #[test]
    fn rejects_malformed_xml() {
        assert!(parse_list_page("<unclosed").is_err());
    }
}
