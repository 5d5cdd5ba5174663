use std::path::Path;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::api::{
    BuildRef, PrescanOptions, RemoteScanAPI, ScanOptions, StatusReport, SubmissionAck, UploadAck,
};
use crate::error::{ApiError, ScanError};
use crate::outcome::ComplianceVerdict;
use crate::settings::{Credentials, Settings};

/// HTTP client for the remote security-analysis service.
///
/// Built once per run; the credential pair and connection pool are reused
/// read-only across every workflow step.
#[derive(Clone)]
pub struct HttpScanApi {
    http: reqwest::Client,
    base: reqwest::Url,
    credentials: Credentials,
}

impl std::fmt::Debug for HttpScanApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpScanApi")
            .field("base", &self.base)
            .field("credentials", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct BuildBody {
    build_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
    #[serde(default)]
    module_errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ComplianceBody {
    policy_compliance_status: String,
}

impl HttpScanApi {
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self, ScanError> {
        let base = reqwest::Url::parse(base_url)
            .map_err(|e| ScanError::Configuration(format!("invalid base url {base_url:?}: {e}")))?;
        Ok(Self {
            http: reqwest::Client::builder()
                .user_agent(concat!("sastgate/", env!("CARGO_PKG_VERSION")))
                .build()
                .expect("failed to build HTTP client"),
            base,
            credentials,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ScanError> {
        Self::new(&settings.base_url, settings.credentials.clone())
    }

    fn url(&self, path: &str) -> Result<reqwest::Url, ApiError> {
        self.base
            .join(path)
            .map_err(|e| ApiError::permanent(anyhow!("cannot build request url {path:?}: {e}")))
    }

    /// Send a request with auth attached and decode the JSON body, mapping
    /// transport and status failures onto the transient/permanent split the
    /// retry policy keys on.
    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = request
            .basic_auth(&self.credentials.api_key_id, Some(&self.credentials.api_key_secret))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ApiError::transient(anyhow!(e).context("request failed")))?;

        let status = response.status();
        debug!(status = %status, "remote response");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = anyhow!("remote returned HTTP {status}: {}", body.trim());
            return if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                Err(ApiError::permanent(err.context("authentication rejected")))
            } else if status == reqwest::StatusCode::REQUEST_TIMEOUT
                || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                || status.is_server_error()
            {
                Err(ApiError::transient(err))
            } else {
                Err(ApiError::permanent(err))
            };
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::permanent(anyhow!(e).context("failed to parse JSON response")))
    }
}

fn with_sandbox(mut url: reqwest::Url, sandbox: Option<&str>) -> reqwest::Url {
    if let Some(sandbox) = sandbox {
        url.query_pairs_mut().append_pair("sandbox", sandbox);
    }
    url
}

#[async_trait]
impl RemoteScanAPI for HttpScanApi {
    #[instrument(skip(self))]
    async fn create_build(
        &self,
        app_id: &str,
        build_id: &str,
        sandbox: Option<&str>,
    ) -> Result<BuildRef, ApiError> {
        let url = with_sandbox(self.url(&format!("apps/{app_id}/builds"))?, sandbox);
        let body = serde_json::json!({ "build_id": build_id });
        let acked: BuildBody = self.send_json(self.http.post(url).json(&body)).await?;
        Ok(BuildRef {
            app_id: app_id.to_string(),
            build_id: acked.build_id,
            sandbox: sandbox.map(str::to_string),
        })
    }

    #[instrument(skip(self, build, path), fields(build_id = %build.build_id, artifact = %path.display()))]
    async fn upload_artifact(&self, build: &BuildRef, path: &Path) -> Result<UploadAck, ApiError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ApiError::permanent(anyhow!("artifact has no file name: {}", path.display())))?;

        let data = std::fs::read(path)
            .with_context(|| format!("failed to read artifact {}", path.display()))
            .map_err(ApiError::Permanent)?;

        let mut url = self.url(&format!(
            "apps/{}/builds/{}/artifacts",
            build.app_id, build.build_id
        ))?;
        url.query_pairs_mut().append_pair("filename", filename);
        let url = with_sandbox(url, build.sandbox.as_deref());

        self.send_json(
            self.http
                .post(url)
                .header("Content-Type", "binary/octet-stream")
                .body(data),
        )
        .await
    }

    #[instrument(skip(self, build, options), fields(build_id = %build.build_id))]
    async fn begin_prescan(
        &self,
        build: &BuildRef,
        options: &PrescanOptions,
    ) -> Result<SubmissionAck, ApiError> {
        let url = with_sandbox(
            self.url(&format!(
                "apps/{}/builds/{}/prescan",
                build.app_id, build.build_id
            ))?,
            build.sandbox.as_deref(),
        );
        self.send_json(self.http.post(url).json(options)).await
    }

    #[instrument(skip(self, build, options), fields(build_id = %build.build_id))]
    async fn begin_scan(
        &self,
        build: &BuildRef,
        options: &ScanOptions,
    ) -> Result<SubmissionAck, ApiError> {
        let url = with_sandbox(
            self.url(&format!(
                "apps/{}/builds/{}/scan",
                build.app_id, build.build_id
            ))?,
            build.sandbox.as_deref(),
        );
        self.send_json(self.http.post(url).json(options)).await
    }

    #[instrument(skip(self, build), fields(build_id = %build.build_id))]
    async fn get_scan_status(&self, build: &BuildRef) -> Result<StatusReport, ApiError> {
        let url = with_sandbox(
            self.url(&format!(
                "apps/{}/builds/{}/status",
                build.app_id, build.build_id
            ))?,
            build.sandbox.as_deref(),
        );
        let body: StatusBody = self.send_json(self.http.get(url)).await?;
        Ok(StatusReport::new(body.status, body.module_errors))
    }

    #[instrument(skip(self))]
    async fn get_compliance(
        &self,
        app_id: &str,
        sandbox: Option<&str>,
    ) -> Result<ComplianceVerdict, ApiError> {
        let url = with_sandbox(self.url(&format!("apps/{app_id}/compliance"))?, sandbox);
        let body: ComplianceBody = self.send_json(self.http.get(url)).await?;
        Ok(ComplianceVerdict::from_status(&body.policy_compliance_status))
    }
}
