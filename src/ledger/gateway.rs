//! External request gateway
//!
//! All traffic to the remote accounting API funnels through here: base URL
//! selection, bearer credential attachment, JSON envelopes, and the
//! hand-framed multipart upload. Non-2xx responses become a single
//! `RemoteApi { status, body }` so callers never touch raw transport
//! errors.

use crate::config::Environment;
use crate::ledger::credentials::CredentialManager;
use crate::ledger::error::{LedgerError, LedgerResult};
use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// The remote calls reconciliation and posting are built on. Split out as
/// a trait so those callers can run against a scripted remote in tests.
#[async_trait]
pub trait RemoteLedger: Send + Sync {
    /// GET a resource path (may carry its own query string)
    async fn get(&self, resource: &str) -> LedgerResult<Value>;

    /// POST a JSON body to a resource path
    async fn post_json(&self, resource: &str, body: &Value) -> LedgerResult<Value>;

    /// Run a statement in the remote query language
    async fn query(&self, statement: &str) -> LedgerResult<Value>;
}

pub struct LedgerGateway {
    http: Client,
    credentials: Arc<CredentialManager>,
    environment: Environment,
}

impl LedgerGateway {
    pub fn new(credentials: Arc<CredentialManager>, environment: Environment) -> Self {
        // Report and attachment flows can take a while on large accounts
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent("Brokerdesk/1.0 (Ledger Sync)")
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http,
            credentials,
            environment,
        }
    }

    fn company_url(&self, realm_id: &str, resource: &str) -> String {
        format!(
            "{}/v3/company/{}/{}",
            self.environment.base_url(),
            realm_id,
            resource
        )
    }

    async fn call(
        &self,
        method: Method,
        resource: &str,
        body: Option<&Value>,
    ) -> LedgerResult<Value> {
        let conn = self.credentials.ensure_live().await?;
        let url = self.company_url(&conn.realm_id, resource);
        debug!("Ledger call: {} {}", method, resource);

        let mut request = self
            .http
            .request(method, &url)
            .bearer_auth(&conn.access_token)
            .header("Accept", "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        Self::into_json(request.send().await?).await
    }

    /// Upload an attachment: two named parts joined with a caller-chosen
    /// boundary, framed by hand because the remote parser is strict about
    /// the envelope.
    pub async fn upload_attachment(
        &self,
        metadata: &Value,
        file_name: &str,
        content_type: &str,
        content: &[u8],
    ) -> LedgerResult<Value> {
        let conn = self.credentials.ensure_live().await?;
        let url = self.company_url(&conn.realm_id, "upload");

        let boundary = format!("brokerdesk-{}", Uuid::new_v4().simple());
        let body = build_multipart_body(
            &boundary,
            &metadata.to_string(),
            file_name,
            content_type,
            content,
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&conn.access_token)
            .header("Accept", "application/json")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await?;

        Self::into_json(response).await
    }

    async fn into_json(response: Response) -> LedgerResult<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::RemoteApi {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl RemoteLedger for LedgerGateway {
    async fn get(&self, resource: &str) -> LedgerResult<Value> {
        self.call(Method::GET, resource, None).await
    }

    async fn post_json(&self, resource: &str, body: &Value) -> LedgerResult<Value> {
        self.call(Method::POST, resource, Some(body)).await
    }

    async fn query(&self, statement: &str) -> LedgerResult<Value> {
        let conn = self.credentials.ensure_live().await?;
        let url = self.company_url(&conn.realm_id, "query");
        debug!("Ledger query: {}", statement);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&conn.access_token)
            .header("Accept", "application/json")
            .query(&[("query", statement)])
            .send()
            .await?;

        Self::into_json(response).await
    }
}

/// Frame the two-part upload body: `file_metadata_01` (JSON) then
/// `file_content_01` (raw bytes), CRLF line endings throughout.
pub fn build_multipart_body(
    boundary: &str,
    metadata_json: &str,
    file_name: &str,
    content_type: &str,
    content: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + metadata_json.len() + 512);

    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file_metadata_01\"\r\n\
          Content-Type: application/json\r\n\r\n",
    );
    body.extend_from_slice(metadata_json.as_bytes());
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file_content_01\"; filename=\"{}\"\r\n\
             Content-Type: {}\r\n\r\n",
            file_name, content_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}
