//! S3-backed [`BlobStore`] implementation.
//!
//! Talks to the S3 REST API directly with AWS Signature V4
//! authentication, using only pure-Rust dependencies (`hmac`, `sha2`)
//! for signing — no AWS SDK. Supports custom endpoints for
//! S3-compatible services (MinIO, LocalStack).
//!
//! # Configuration
//!
//! ```toml
//! [blobstore]
//! backend = "s3"
//! bucket = "corral-documents"
//! region = "us-east-1"
//! # endpoint_url = "http://localhost:9000"   # MinIO
//! ```
//!
//! # Environment Variables
//!
//! Credentials are read from environment variables:
//! - `AWS_ACCESS_KEY_ID` — required
//! - `AWS_SECRET_ACCESS_KEY` — required
//! - `AWS_SESSION_TOKEN` — optional (temporary credentials / IAM roles)
//!
//! # Pagination
//!
//! Prefix listings follow the `ListObjectsV2` continuation-token
//! mechanism, so prefixes holding 1000+ objects are handled
//! automatically.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::blobstore::BlobStore;
use crate::config::BlobStoreConfig;

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials loaded from environment variables.
struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// Blob store backed by an S3 bucket.
pub struct S3BlobStore {
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl S3BlobStore {
    /// Create a store for the configured bucket, reading credentials
    /// from the environment.
    pub fn new(config: &BlobStoreConfig) -> Result<Self> {
        let bucket = config
            .bucket
            .clone()
            .context("blobstore.bucket must be set for the s3 backend")?;
        Ok(Self {
            bucket,
            region: config.region.clone(),
            endpoint_url: config.endpoint_url.clone(),
            creds: AwsCredentials::from_env()?,
            client: reqwest::Client::new(),
        })
    }

    /// Hostname for the configured bucket, honoring custom endpoints.
    fn host(&self) -> String {
        if let Some(ref endpoint) = self.endpoint_url {
            endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string()
        } else {
            format!("{}.s3.{}.amazonaws.com", self.bucket, self.region)
        }
    }

    fn scheme(&self) -> &'static str {
        match self.endpoint_url {
            Some(ref e) if e.starts_with("http://") => "http",
            _ => "https",
        }
    }

    /// Build and send a signed request.
    ///
    /// `key` is the object key, or empty for bucket-level operations.
    /// `query` must contain unencoded parameter pairs; they are encoded
    /// and sorted into the canonical query string here.
    async fn signed_request(
        &self,
        method: &str,
        key: &str,
        query: &[(String, String)],
        payload: &[u8],
    ) -> Result<reqwest::Response> {
        let host = self.host();
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let canonical_uri = format!("/{}", encoded_key);

        let mut sorted_query = query.to_vec();
        sorted_query.sort_by(|a, b| a.0.cmp(&b.0));
        let canonical_querystring: String = sorted_query
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex_sha256(payload);

        let mut headers = vec![
            ("host".to_string(), host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, canonical_uri, canonical_querystring, canonical_headers, signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.creds.secret_access_key,
            &date_stamp,
            &self.region,
            "s3",
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        let mut url = format!("{}://{}{}", self.scheme(), host, canonical_uri);
        if !canonical_querystring.is_empty() {
            url = format!("{}?{}", url, canonical_querystring);
        }

        let mut req = match method {
            "GET" => self.client.get(&url),
            "PUT" => self.client.put(&url).body(payload.to_vec()),
            "DELETE" => self.client.delete(&url),
            other => bail!("Unsupported S3 method: {}", other),
        };

        req = req
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date);
        if let Some(ref token) = self.creds.session_token {
            req = req.header("x-amz-security-token", token);
        }

        req.send()
            .await
            .with_context(|| format!("S3 {} request failed for '{}'", method, key))
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let resp = self.signed_request("PUT", key, &[], bytes).await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "S3 PutObject failed (HTTP {}) for key '{}': {}",
                status,
                key,
                body.chars().take(300).collect::<String>()
            );
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let resp = self.signed_request("GET", key, &[], b"").await?;
        if !resp.status().is_success() {
            bail!("S3 GetObject failed (HTTP {}) for key '{}'", resp.status(), key);
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("max-keys".to_string(), "1000".to_string()),
                ("prefix".to_string(), prefix.to_string()),
            ];
            if let Some(ref token) = continuation_token {
                query.push(("continuation-token".to_string(), token.clone()));
            }

            let resp = self.signed_request("GET", "", &query, b"").await?;
            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                bail!(
                    "S3 ListObjectsV2 failed (HTTP {}): {}",
                    status,
                    body.chars().take(300).collect::<String>()
                );
            }

            let xml = resp.text().await?;
            let (batch, is_truncated, next_token) = parse_list_response(&xml);
            keys.extend(batch);

            if is_truncated {
                continuation_token = next_token;
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        for key in self.list(prefix).await? {
            let resp = self.signed_request("DELETE", &key, &[], b"").await?;
            if !resp.status().is_success() && resp.status().as_u16() != 404 {
                bail!(
                    "S3 DeleteObject failed (HTTP {}) for key '{}'",
                    resp.status(),
                    key
                );
            }
        }
        Ok(())
    }
}

// ============ AWS SigV4 Helpers ============

/// Compute the hex-encoded SHA-256 hash of data.
fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute HMAC-SHA256 of data with the given key.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986 (used in SigV4 canonical requests).
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

// ============ XML Parsing (minimal, no extra deps) ============

/// Parse a `ListObjectsV2` XML response into object keys, plus the
/// truncation flag and continuation token for pagination.
fn parse_list_response(xml: &str) -> (Vec<String>, bool, Option<String>) {
    let mut keys = Vec::new();
    let is_truncated = extract_xml_value(xml, "IsTruncated")
        .map(|v| v == "true")
        .unwrap_or(false);
    let next_token = extract_xml_value(xml, "NextContinuationToken");

    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        let block_start = start + "<Contents>".len();
        let Some(end) = remaining[block_start..].find("</Contents>") else {
            break;
        };
        let block = &remaining[block_start..block_start + end];

        if let Some(key) = extract_xml_value(block, "Key") {
            // Folder markers carry no payload.
            if !key.is_empty() && !key.ends_with('/') {
                keys.push(key);
            }
        }

        remaining = &remaining[block_start + end + "</Contents>".len()..];
    }

    (keys, is_truncated, next_token)
}

/// Extract the text content of an XML tag (simple, non-nested).
fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)?;
    let value_start = start + open.len();
    let end = xml[value_start..].find(&close)?;
    Some(xml[value_start..value_start + end].to_string())
}
