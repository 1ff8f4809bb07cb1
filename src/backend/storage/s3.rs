//! S3-compatible object storage client.
//!
//! A thin client over reqwest with SigV4 header signing: `put_object`
//! uploads a file and returns its public URL, `delete_object` removes one.
//! Public URLs go through the configured CDN base when present, otherwise
//! straight to the bucket endpoint.

use bytes::Bytes;
use chrono::Utc;
use reqwest::Method;
use thiserror::Error;

use crate::backend::server::config::StorageConfig;
use crate::backend::storage::sigv4;

/// Object storage failure
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage responded {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
}

/// Client for one bucket
#[derive(Clone)]
pub struct S3Client {
    http: reqwest::Client,
    config: StorageConfig,
}

impl S3Client {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn host(&self) -> String {
        format!(
            "{}.s3.{}.amazonaws.com",
            self.config.bucket, self.config.region
        )
    }

    /// Public URL for an object key: CDN when configured, bucket URL
    /// otherwise.
    pub fn public_url(&self, key: &str) -> String {
        match &self.config.cdn_base {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => format!("https://{}/{}", self.host(), key),
        }
    }

    /// Recover the object key from a public URL (either CDN or bucket form):
    /// the URL path without the leading slash, percent-decoded.
    pub fn key_from_url(url: &str) -> Option<String> {
        let rest = url.split_once("://")?.1;
        let (_, path) = rest.split_once('/')?;
        let key = percent_decode(path.trim_start_matches('/'));
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    }

    /// Upload an object and return its public URL.
    pub async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.send(Method::PUT, key, Some(body), Some(content_type))
            .await?;
        Ok(self.public_url(key))
    }

    /// Delete an object. Deleting a missing object succeeds (S3 semantics).
    pub async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.send(Method::DELETE, key, None, None).await
    }

    async fn send(
        &self,
        method: Method,
        key: &str,
        body: Option<Bytes>,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let payload_hash = sigv4::sha256_hex(body.as_deref().unwrap_or(&[]));
        let host = self.host();
        let canonical_uri = format!("/{}", sigv4::uri_encode(key, false));

        let mut headers = vec![
            ("host".to_string(), host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(content_type) = content_type {
            headers.push(("content-type".to_string(), content_type.to_string()));
        }

        let canonical =
            sigv4::canonical_request(method.as_str(), &canonical_uri, "", &headers, &payload_hash);
        let scope = format!("{}/{}/s3/aws4_request", date, self.config.region);
        let string_to_sign = sigv4::string_to_sign(&amz_date, &scope, &canonical.text);
        let signing_key =
            sigv4::signing_key(&self.config.secret_key, &date, &self.config.region, "s3");
        let signature = sigv4::signature(&signing_key, &string_to_sign);
        let authorization = sigv4::authorization_header(
            &self.config.access_key,
            &scope,
            &canonical.signed_headers,
            &signature,
        );

        let url = format!("https://{}{}", host, canonical_uri);
        let mut request = self
            .http
            .request(method, &url)
            .header("x-amz-date", amz_date)
            .header("x-amz-content-sha256", payload_hash)
            .header("Authorization", authorization);
        if let Some(content_type) = content_type {
            request = request.header("Content-Type", content_type);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            ) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(cdn_base: Option<&str>) -> S3Client {
        S3Client::new(StorageConfig {
            bucket: "branchtalk-media".to_string(),
            region: "ap-south-1".to_string(),
            access_key: "AKIAEXAMPLE".to_string(),
            secret_key: "secret".to_string(),
            cdn_base: cdn_base.map(|s| s.to_string()),
        })
    }

    #[test]
    fn test_public_url_without_cdn() {
        let url = client(None).public_url("payments/images/receipt.png");
        assert_eq!(
            url,
            "https://branchtalk-media.s3.ap-south-1.amazonaws.com/payments/images/receipt.png"
        );
    }

    #[test]
    fn test_public_url_with_cdn() {
        let url = client(Some("https://cdn.example.com/")).public_url("users/profileImages/a.jpg");
        assert_eq!(url, "https://cdn.example.com/users/profileImages/a.jpg");
    }

    #[test]
    fn test_key_from_url_round_trip() {
        let client = client(None);
        let key = "chats/images/1722470400000-abc-photo.jpg";
        assert_eq!(
            S3Client::key_from_url(&client.public_url(key)).as_deref(),
            Some(key)
        );

        let cdn =
            S3Client::key_from_url("https://cdn.example.com/payments/images/receipt.png");
        assert_eq!(cdn.as_deref(), Some("payments/images/receipt.png"));
    }

    #[test]
    fn test_key_from_url_rejects_garbage() {
        assert_eq!(S3Client::key_from_url("not a url"), None);
        assert_eq!(S3Client::key_from_url("https://host-only.example.com"), None);
    }

    #[test]
    fn test_key_from_url_decodes_percent_escapes() {
        assert_eq!(
            S3Client::key_from_url("https://cdn.example.com/chats/text/a%20b.txt").as_deref(),
            Some("chats/text/a b.txt")
        );
    }
}
