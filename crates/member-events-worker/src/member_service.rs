//! Member service capability used to send signup verification emails.
//!
//! The consumer never holds a member service directly. Each send attempt
//! opens a fresh [`ServiceScope`] from a [`ServiceScopeFactory`] and resolves
//! the service from it, so no per-request state survives between retries.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use std::time::Duration;
use tracing::debug;

#[cfg(test)]
#[path = "member_service_tests.rs"]
mod tests;

/// Header carrying the per-scope request identifier
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Operations on members
#[async_trait]
pub trait MemberService: Send + Sync {
    /// Send the signup verification email for a member
    async fn send_signup_verification_email(&self, member_id: i64) -> anyhow::Result<()>;
}

/// A unit of work owning the services resolved within it
pub trait ServiceScope: Send + Sync {
    fn member_service(&self) -> &dyn MemberService;
}

/// Opens service scopes
pub trait ServiceScopeFactory: Send + Sync {
    fn create_scope(&self) -> anyhow::Result<Box<dyn ServiceScope>>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// Member service backed by the member settings HTTP API
#[derive(Debug, Clone)]
pub struct HttpMemberService {
    http_client: HttpClient,
    base_url: String,
    request_id: String,
}

impl HttpMemberService {
    /// Identifier sent with every request made through this instance
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    fn verification_email_url(&self, member_id: i64) -> String {
        format!(
            "{}/members/{}/signup-verification-email",
            self.base_url, member_id
        )
    }
}

#[async_trait]
impl MemberService for HttpMemberService {
    async fn send_signup_verification_email(&self, member_id: i64) -> anyhow::Result<()> {
        let url = self.verification_email_url(member_id);
        debug!(member_id, request_id = %self.request_id, "Requesting signup verification email");

        self.http_client
            .post(&url)
            .header(REQUEST_ID_HEADER, &self.request_id)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("member service rejected verification email for member {}", member_id))?;

        Ok(())
    }
}

/// Scope owning one [`HttpMemberService`]
#[derive(Debug)]
pub struct HttpServiceScope {
    member_service: HttpMemberService,
}

impl ServiceScope for HttpServiceScope {
    fn member_service(&self) -> &dyn MemberService {
        &self.member_service
    }
}

/// Opens HTTP-backed scopes sharing one connection pool
#[derive(Debug, Clone)]
pub struct HttpServiceScopeFactory {
    http_client: HttpClient,
    base_url: String,
}

impl HttpServiceScopeFactory {
    /// Create a factory for the API at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Open a scope with a concrete service type
    pub fn open(&self) -> HttpServiceScope {
        HttpServiceScope {
            member_service: HttpMemberService {
                http_client: self.http_client.clone(),
                base_url: self.base_url.clone(),
                request_id: uuid::Uuid::new_v4().to_string(),
            },
        }
    }
}

impl ServiceScopeFactory for HttpServiceScopeFactory {
    fn create_scope(&self) -> anyhow::Result<Box<dyn ServiceScope>> {
        Ok(Box::new(self.open()))
    }
}
