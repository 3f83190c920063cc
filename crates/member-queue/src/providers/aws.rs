//! AWS SQS transport using the SQS Query API over HTTPS.
//!
//! Requests are signed with AWS Signature Version 4 and responses are parsed
//! from XML, so the transport can be exercised against a mock HTTP server.
//!
//! ## Operations
//!
//! - `GetQueueUrl` resolves a queue name to its URL
//! - `ReceiveMessage` long-polls for up to 10 messages (wait capped at 20 s)
//! - `DeleteMessage` / `DeleteMessageBatch` acknowledge messages
//!
//! Standard queues deliver at least once; the content hash reported for each
//! message is SQS's `MD5OfBody`, so identical bodies share a hash.
//!
//! ## Authentication
//!
//! Credentials come from the configuration or, when absent there, from the
//! `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY` environment variables.

use crate::client::{DeleteEntry, DeleteFailure, QueueTransport};
use crate::error::{ConfigurationError, QueueError};
use crate::message::{MessageId, QueueName, ReceiptHandle, ReceivedMessage};
use crate::provider::{AwsSqsConfig, ProviderType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client as HttpClient;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;

#[cfg(test)]
#[path = "aws_tests.rs"]
mod tests;

const API_VERSION: &str = "2012-11-05";

// ============================================================================
// Error Types
// ============================================================================

/// AWS SQS specific errors
#[derive(Debug, thiserror::Error)]
pub enum AwsError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("SQS service error: {code}: {message}")]
    ServiceError { code: String, message: String },

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Invalid receipt handle: {0}")]
    InvalidReceipt(String),

    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl AwsError {
    /// Map AWS error to QueueError
    pub fn into_queue_error(self) -> QueueError {
        match self {
            Self::Authentication(message) => QueueError::AuthenticationFailed { message },
            Self::NetworkError(message) => QueueError::ConnectionFailed { message },
            Self::ServiceError { code, message } => QueueError::ProviderError {
                provider: "AwsSqs".to_string(),
                code,
                message,
            },
            Self::QueueNotFound(queue_name) => QueueError::QueueNotFound { queue_name },
            Self::InvalidReceipt(receipt) => QueueError::MessageNotFound { receipt },
            Self::ConfigurationError(message) => {
                QueueError::ConfigurationError(ConfigurationError::Invalid { message })
            }
            Self::MalformedResponse(message) => QueueError::MalformedResponse { message },
        }
    }
}

// ============================================================================
// AWS Signature V4 Signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// AWS Signature Version 4 signer for request authentication
///
/// 1. Canonical request (method, URI, sorted query, headers, payload hash)
/// 2. String to sign (algorithm, timestamp, scope, request hash)
/// 3. Signing key from the 4-level HMAC chain
/// 4. Authorization header
#[derive(Clone)]
struct AwsV4Signer {
    access_key: String,
    secret_key: String,
    region: String,
    service: String,
}

impl AwsV4Signer {
    fn new(access_key: String, secret_key: String, region: String) -> Self {
        Self {
            access_key,
            secret_key,
            region,
            service: "sqs".to_string(),
        }
    }

    /// Produce the `Authorization`, `x-amz-date` and `host` headers for a request
    fn sign_request(
        &self,
        method: &str,
        host: &str,
        path: &str,
        query_params: &HashMap<String, String>,
        body: &str,
        timestamp: &DateTime<Utc>,
    ) -> HashMap<String, String> {
        let date_stamp = timestamp.format("%Y%m%d").to_string();
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

        let canonical_query_string = canonical_query(query_params);
        let canonical_headers = format!("host:{}\nx-amz-date:{}\n", host, amz_date);
        let signed_headers = "host;x-amz-date";
        let payload_hash = format!("{:x}", Sha256::digest(body.as_bytes()));

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, path, canonical_query_string, canonical_headers, signed_headers, payload_hash
        );

        let algorithm = "AWS4-HMAC-SHA256";
        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let canonical_request_hash = format!("{:x}", Sha256::digest(canonical_request.as_bytes()));
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            algorithm, amz_date, credential_scope, canonical_request_hash
        );

        let signature = self.calculate_signature(&string_to_sign, &date_stamp);

        let authorization_header = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            algorithm, self.access_key, credential_scope, signed_headers, signature
        );

        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), authorization_header);
        headers.insert("x-amz-date".to_string(), amz_date);
        headers.insert("host".to_string(), host.to_string());

        headers
    }

    /// kSecret → kDate → kRegion → kService → kSigning → signature
    fn calculate_signature(&self, string_to_sign: &str, date_stamp: &str) -> String {
        let k_secret = format!("AWS4{}", self.secret_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        let signature = hmac_sha256(&k_signing, string_to_sign.as_bytes());

        hex::encode(signature)
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so new_from_slice cannot fail here
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC can take key of any size"),
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Sorted, percent-encoded query string
fn canonical_query(query_params: &HashMap<String, String>) -> String {
    let mut pairs = query_params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>();
    pairs.sort();
    pairs.join("&")
}

// ============================================================================
// AWS SQS Transport
// ============================================================================

/// AWS SQS queue transport
///
/// Thread-safe; share it across tasks behind an `Arc`.
pub struct AwsSqsTransport {
    http_client: HttpClient,
    signer: AwsV4Signer,
    config: AwsSqsConfig,
    endpoint: String,
}

impl AwsSqsTransport {
    /// Create new AWS SQS transport
    ///
    /// # Errors
    ///
    /// Returns an error if the region is empty, no credentials can be found,
    /// or the HTTP client cannot be built.
    pub fn new(config: AwsSqsConfig) -> Result<Self, AwsError> {
        if config.region.trim().is_empty() {
            return Err(AwsError::ConfigurationError(
                "Region cannot be empty".to_string(),
            ));
        }

        let access_key = config
            .access_key_id
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("AWS_ACCESS_KEY_ID").ok());
        let secret_key = config
            .secret_access_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("AWS_SECRET_ACCESS_KEY").ok());

        let signer = match (access_key, secret_key) {
            (Some(access_key), Some(secret_key)) => {
                AwsV4Signer::new(access_key, secret_key, config.region.clone())
            }
            _ => {
                return Err(AwsError::Authentication(
                    "No credentials configured".to_string(),
                ))
            }
        };

        let endpoint = config
            .endpoint
            .clone()
            .filter(|e| !e.trim().is_empty())
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("https://sqs.{}.amazonaws.com", config.region));

        // Must outlast the 20 second long-poll
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AwsError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            signer,
            config,
            endpoint,
        })
    }

    /// Endpoint requests are sent to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Make a signed SQS Query API request
    async fn make_request(&self, params: &HashMap<String, String>) -> Result<String, AwsError> {
        let method = "POST";
        let path = "/";

        let host = self
            .endpoint
            .strip_prefix("https://")
            .or_else(|| self.endpoint.strip_prefix("http://"))
            .unwrap_or(&self.endpoint);

        let timestamp = Utc::now();
        let auth_headers = self
            .signer
            .sign_request(method, host, path, params, "", &timestamp);

        let url = format!("{}{}?{}", self.endpoint, path, canonical_query(params));

        let mut request = self.http_client.post(&url);
        for (key, value) in auth_headers {
            request = request.header(&key, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AwsError::NetworkError(format!("Request timeout: {}", e))
            } else if e.is_connect() {
                AwsError::NetworkError(format!("Connection failed: {}", e))
            } else {
                AwsError::NetworkError(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| AwsError::NetworkError(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(parse_error_response(&response_body, status.as_u16()));
        }

        Ok(response_body)
    }

    fn action_params(action: &str) -> HashMap<String, String> {
        let mut params = HashMap::new();
        params.insert("Action".to_string(), action.to_string());
        params.insert("Version".to_string(), API_VERSION.to_string());
        params
    }
}

impl fmt::Debug for AwsSqsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSqsTransport")
            .field("region", &self.config.region)
            .field("endpoint", &self.endpoint)
            .field("credentials", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl QueueTransport for AwsSqsTransport {
    async fn resolve_queue_url(&self, queue: &QueueName) -> Result<String, QueueError> {
        let mut params = Self::action_params("GetQueueUrl");
        params.insert("QueueName".to_string(), queue.as_str().to_string());

        let response = self.make_request(&params).await.map_err(|e| match e {
            // SQS reports the error message, not the queue name, for unknown queues
            AwsError::QueueNotFound(_) => QueueError::QueueNotFound {
                queue_name: queue.to_string(),
            },
            other => other.into_queue_error(),
        })?;

        parse_queue_url_response(&response).map_err(AwsError::into_queue_error)
    }

    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: u32,
        wait_time: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let max_messages = max_messages.clamp(1, ProviderType::AwsSqs.max_batch_size());
        let wait_time_seconds = wait_time
            .min(ProviderType::AwsSqs.max_wait_time())
            .as_secs();

        let mut params = Self::action_params("ReceiveMessage");
        params.insert("QueueUrl".to_string(), queue_url.to_string());
        params.insert("MaxNumberOfMessages".to_string(), max_messages.to_string());
        params.insert("WaitTimeSeconds".to_string(), wait_time_seconds.to_string());
        params.insert(
            "AttributeName.1".to_string(),
            "ApproximateReceiveCount".to_string(),
        );

        let response = self
            .make_request(&params)
            .await
            .map_err(AwsError::into_queue_error)?;

        let messages =
            parse_receive_message_response(&response).map_err(AwsError::into_queue_error)?;
        debug!(queue_url = %queue_url, count = messages.len(), "SQS receive completed");

        Ok(messages)
    }

    async fn delete_message(
        &self,
        queue_url: &str,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        let mut params = Self::action_params("DeleteMessage");
        params.insert("QueueUrl".to_string(), queue_url.to_string());
        params.insert("ReceiptHandle".to_string(), receipt.handle().to_string());

        // DeleteMessage returns an empty result on success
        self.make_request(&params)
            .await
            .map_err(AwsError::into_queue_error)?;

        Ok(())
    }

    async fn delete_message_batch(
        &self,
        queue_url: &str,
        entries: &[DeleteEntry],
    ) -> Result<Vec<DeleteFailure>, QueueError> {
        let max_size = ProviderType::AwsSqs.max_batch_size() as usize;
        if entries.len() > max_size {
            return Err(QueueError::BatchTooLarge {
                size: entries.len(),
                max_size,
            });
        }
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut params = Self::action_params("DeleteMessageBatch");
        params.insert("QueueUrl".to_string(), queue_url.to_string());
        for (index, entry) in entries.iter().enumerate() {
            let n = index + 1;
            params.insert(
                format!("DeleteMessageBatchRequestEntry.{}.Id", n),
                entry.id.clone(),
            );
            params.insert(
                format!("DeleteMessageBatchRequestEntry.{}.ReceiptHandle", n),
                entry.receipt_handle.handle().to_string(),
            );
        }

        let response = self
            .make_request(&params)
            .await
            .map_err(AwsError::into_queue_error)?;

        parse_delete_batch_response(&response).map_err(AwsError::into_queue_error)
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::AwsSqs
    }
}

// ============================================================================
// XML Response Parsing
// ============================================================================

fn xml_error(e: impl fmt::Display) -> AwsError {
    AwsError::MalformedResponse(format!("XML parsing error: {}", e))
}

/// Parse GetQueueUrl XML response
fn parse_queue_url_response(xml: &str) -> Result<String, AwsError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut in_queue_url = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"QueueUrl" => {
                in_queue_url = true;
            }
            Ok(Event::Text(e)) if in_queue_url => {
                return e.unescape().map(|s| s.into_owned()).map_err(xml_error);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }

    Err(AwsError::MalformedResponse(
        "QueueUrl not found in response".to_string(),
    ))
}

/// Parse an SQS error document into an [`AwsError`]
fn parse_error_response(xml: &str, status_code: u16) -> AwsError {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut error_code = None;
    let mut error_message = None;
    let mut in_error = false;
    let mut in_code = false;
    let mut in_message = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Error" => in_error = true,
                b"Code" if in_error => in_code = true,
                b"Message" if in_error => in_message = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_code {
                    error_code = e.unescape().ok().map(|s| s.into_owned());
                    in_code = false;
                } else if in_message {
                    error_message = e.unescape().ok().map(|s| s.into_owned());
                    in_message = false;
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"Error" => {
                in_error = false;
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    let code = error_code.unwrap_or_else(|| "Unknown".to_string());
    let message = error_message.unwrap_or_else(|| format!("HTTP status {}", status_code));

    match code.as_str() {
        "AWS.SimpleQueueService.NonExistentQueue" | "QueueDoesNotExist" => {
            AwsError::QueueNotFound(message)
        }
        "InvalidClientTokenId" | "UnrecognizedClientException" | "SignatureDoesNotMatch" => {
            AwsError::Authentication(format!("{}: {}", code, message))
        }
        "InvalidReceiptHandle" | "ReceiptHandleIsInvalid" => AwsError::InvalidReceipt(message),
        _ if status_code == 401 || status_code == 403 => {
            AwsError::Authentication(format!("{}: {}", code, message))
        }
        _ => AwsError::ServiceError { code, message },
    }
}

/// Parse ReceiveMessage XML response
fn parse_receive_message_response(xml: &str) -> Result<Vec<ReceivedMessage>, AwsError> {
    #[derive(Default)]
    struct Current {
        message_id: Option<String>,
        receipt_handle: Option<String>,
        body: Option<String>,
        md5_of_body: Option<String>,
        receive_count: Option<u32>,
        attribute_name: Option<String>,
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Field {
        None,
        MessageId,
        ReceiptHandle,
        Body,
        Md5OfBody,
        AttributeName,
        AttributeValue,
    }

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut messages = Vec::new();
    let mut current: Option<Current> = None;
    let mut field = Field::None;
    let mut in_attribute = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                field = match (e.name().as_ref(), current.is_some(), in_attribute) {
                    (b"Message", _, _) => {
                        current = Some(Current::default());
                        Field::None
                    }
                    (b"Attribute", true, _) => {
                        in_attribute = true;
                        Field::None
                    }
                    (b"MessageId", true, false) => Field::MessageId,
                    (b"ReceiptHandle", true, false) => Field::ReceiptHandle,
                    (b"Body", true, false) => Field::Body,
                    (b"MD5OfBody", true, false) => Field::Md5OfBody,
                    (b"Name", true, true) => Field::AttributeName,
                    (b"Value", true, true) => Field::AttributeValue,
                    _ => Field::None,
                };
            }
            Ok(Event::Text(e)) => {
                if let Some(message) = current.as_mut() {
                    let text = e.unescape().map_err(xml_error)?.into_owned();
                    match field {
                        Field::MessageId => message.message_id = Some(text),
                        Field::ReceiptHandle => message.receipt_handle = Some(text),
                        Field::Body => message.body = Some(text),
                        Field::Md5OfBody => message.md5_of_body = Some(text),
                        Field::AttributeName => message.attribute_name = Some(text),
                        Field::AttributeValue => {
                            if message.attribute_name.as_deref() == Some("ApproximateReceiveCount")
                            {
                                message.receive_count = text.parse().ok();
                            }
                        }
                        Field::None => {}
                    }
                }
                field = Field::None;
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"Attribute" => {
                    in_attribute = false;
                    if let Some(message) = current.as_mut() {
                        message.attribute_name = None;
                    }
                }
                b"Message" => {
                    let Some(done) = current.take() else {
                        continue;
                    };
                    let Some(receipt) = done.receipt_handle else {
                        return Err(AwsError::MalformedResponse(
                            "Message without ReceiptHandle".to_string(),
                        ));
                    };

                    let message_id = done
                        .message_id
                        .and_then(|id| id.parse::<MessageId>().ok())
                        .unwrap_or_default();

                    messages.push(ReceivedMessage::new(
                        message_id,
                        done.body.unwrap_or_default(),
                        done.md5_of_body,
                        ReceiptHandle::new(receipt),
                        done.receive_count.unwrap_or(1),
                    ));
                }
                _ => field = Field::None,
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(messages)
}

/// Parse DeleteMessageBatch XML response into the failed entries
fn parse_delete_batch_response(xml: &str) -> Result<Vec<DeleteFailure>, AwsError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut failures = Vec::new();
    let mut current: Option<DeleteFailure> = None;
    let mut field: Option<&'static str> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"BatchResultErrorEntry" => {
                    current = Some(DeleteFailure {
                        id: String::new(),
                        code: String::new(),
                        message: String::new(),
                    });
                }
                b"Id" if current.is_some() => field = Some("id"),
                b"Code" if current.is_some() => field = Some("code"),
                b"Message" if current.is_some() => field = Some("message"),
                _ => field = None,
            },
            Ok(Event::Text(e)) => {
                if let (Some(entry), Some(name)) = (current.as_mut(), field.take()) {
                    let text = e.unescape().map_err(xml_error)?.into_owned();
                    match name {
                        "id" => entry.id = text,
                        "code" => entry.code = text,
                        _ => entry.message = text,
                    }
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"BatchResultErrorEntry" => {
                if let Some(entry) = current.take() {
                    failures.push(entry);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(failures)
}
