//! HTTP implementations of the backend traits.
//!
//! All services are plain JSON-over-HTTP endpoints configured in
//! [`EndpointConfig`]. Transport errors and non-success statuses map to
//! [`InterviewError::NetworkFailure`] tagged with the failing backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{
    AffectBackend, AffectRequest, AffectSampleRecord, AffectVerdict, CompletionRequest,
    ExecutionBackend, ExecutionOutput, ExecutionRequest, ProblemBackend, ProblemRequest,
    ReportBackend, SessionRecordPatch, TextBackend,
};
use crate::config::{Config, EndpointConfig};
use crate::error::{BackendKind, InterviewError, Result};

#[derive(Debug, Deserialize)]
struct TextResponse {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportUploadRequest<'a> {
    session_id: &'a str,
    report: &'a str,
}

#[derive(Debug, Deserialize)]
struct ReportUploadResponse {
    url: String,
}

/// All backends, served over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackends {
    client: Client,
    endpoints: EndpointConfig,
}

impl HttpBackends {
    /// Builds a client with the configured request timeout.
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timing.request_timeout())
            .build()
            .map_err(|e| {
                InterviewError::config_validation(
                    format!("cannot build HTTP client: {e}"),
                    "Check the TLS configuration of this machine",
                )
            })?;
        Ok(Self::with_client(client, config.endpoints.clone()))
    }

    /// Uses an existing client.
    #[must_use]
    pub const fn with_client(client: Client, endpoints: EndpointConfig) -> Self {
        Self { client, endpoints }
    }

    async fn send_json<B, R>(
        &self,
        kind: BackendKind,
        builder: reqwest::RequestBuilder,
        body: &B,
    ) -> Result<R>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let response = builder
            .json(body)
            .send()
            .await
            .map_err(|e| InterviewError::network(kind, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(InterviewError::network(
                kind,
                format!("HTTP {status}: {}", text.trim()),
            ));
        }

        debug!(backend = %kind, %status, "backend call succeeded");
        response
            .json::<R>()
            .await
            .map_err(|e| InterviewError::network(kind, format!("invalid response body: {e}")))
    }

    async fn send_no_body<B>(
        &self,
        kind: BackendKind,
        builder: reqwest::RequestBuilder,
        body: &B,
    ) -> Result<()>
    where
        B: Serialize + Sync + ?Sized,
    {
        let response = builder
            .json(body)
            .send()
            .await
            .map_err(|e| InterviewError::network(kind, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(backend = %kind, %status, "backend call succeeded");
            Ok(())
        } else {
            Err(InterviewError::network(kind, format!("HTTP {status}")))
        }
    }

    fn session_record_url(&self, session_id: &str) -> String {
        format!(
            "{}/{}",
            self.endpoints.session_record.trim_end_matches('/'),
            session_id
        )
    }
}

#[async_trait]
impl TextBackend for HttpBackends {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let builder = self.client.post(&self.endpoints.text_generation);
        let response: TextResponse = self
            .send_json(BackendKind::TextGeneration, builder, &request)
            .await?;
        Ok(response.text)
    }
}

#[async_trait]
impl ProblemBackend for HttpBackends {
    async fn generate(&self, request: ProblemRequest) -> Result<serde_json::Value> {
        let builder = self.client.post(&self.endpoints.problem_generation);
        self.send_json(BackendKind::ProblemGeneration, builder, &request)
            .await
    }
}

#[async_trait]
impl ExecutionBackend for HttpBackends {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutput> {
        let builder = self.client.post(&self.endpoints.code_execution);
        self.send_json(BackendKind::CodeExecution, builder, &request)
            .await
    }
}

#[async_trait]
impl AffectBackend for HttpBackends {
    async fn analyze(&self, request: AffectRequest) -> Result<AffectVerdict> {
        let builder = self.client.post(&self.endpoints.affect_detection);
        self.send_json(BackendKind::AffectDetection, builder, &request)
            .await
    }

    async fn store(&self, record: AffectSampleRecord) -> Result<()> {
        let builder = self.client.post(&self.endpoints.affect_storage);
        self.send_no_body(BackendKind::AffectStorage, builder, &record)
            .await
    }
}

#[async_trait]
impl ReportBackend for HttpBackends {
    async fn upload_report(&self, session_id: &str, text: &str) -> Result<String> {
        let builder = self.client.post(&self.endpoints.report_upload);
        let body = ReportUploadRequest {
            session_id,
            report: text,
        };
        let response: ReportUploadResponse =
            self.send_json(BackendKind::Report, builder, &body).await?;
        Ok(response.url)
    }

    async fn patch_session(&self, session_id: &str, patch: SessionRecordPatch) -> Result<()> {
        let builder = self.client.patch(self.session_record_url(session_id));
        self.send_no_body(BackendKind::Report, builder, &patch).await
    }
}
