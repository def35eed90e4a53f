//! Document Intelligence client for layout analysis
//!
//! Speaks the asynchronous analyze protocol: a POST returns `202 Accepted` with an
//! `Operation-Location` header, which is then polled until the operation reaches a
//! terminal status.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::ExtractionConfig;
use crate::error::{Error, Result};

use super::layout::{AnalyzeOperation, AnalyzeStatus, LayoutAnalyzer, LayoutResult};

const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// REST client for the layout analysis service
pub struct DocumentIntelligenceClient {
    client: reqwest::Client,
    endpoint: String,
    model_id: String,
    api_version: String,
    api_key: Option<String>,
}

impl DocumentIntelligenceClient {
    /// Create a new client from extraction config
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model_id: config.model_id.clone(),
            api_version: config.api_version.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/formrecognizer/documentModels/{}:analyze?api-version={}",
            self.endpoint, self.model_id, self.api_version
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(KEY_HEADER, key),
            None => request,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    status: AnalyzeStatus,
    #[serde(default)]
    analyze_result: Option<LayoutResult>,
    #[serde(default)]
    error: Option<ServiceError>,
}

#[derive(Deserialize)]
struct ServiceError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[async_trait]
impl LayoutAnalyzer for DocumentIntelligenceClient {
    async fn begin_analyze(&self, data: &[u8], content_type: &str) -> Result<String> {
        let response = self
            .authorize(self.client.post(self.analyze_url()))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data.to_vec())
            .send()
            .await
            .map_err(|e| Error::extraction(format!("Analyze request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::extraction(format!(
                "Analyze request rejected ({}): {}",
                status, body
            )));
        }

        response
            .headers()
            .get("operation-location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| Error::extraction("Analyze response missing Operation-Location"))
    }

    async fn poll(&self, operation: &str) -> Result<AnalyzeOperation> {
        let response = self
            .authorize(self.client.get(operation))
            .send()
            .await
            .map_err(|e| Error::extraction(format!("Poll request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::extraction(format!("Poll failed ({}): {}", status, body)));
        }

        let body: OperationResponse = response
            .json()
            .await
            .map_err(|e| Error::extraction(format!("Failed to parse analyze result: {}", e)))?;

        Ok(AnalyzeOperation {
            status: body.status,
            result: body.analyze_result,
            error: body.error.map(|e| {
                format!(
                    "{}: {}",
                    e.code.unwrap_or_else(|| "error".to_string()),
                    e.message.unwrap_or_default()
                )
            }),
        })
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/formrecognizer/info?api-version={}", self.endpoint, self.api_version);
        match self.authorize(self.client.get(url)).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "document-intelligence"
    }
}
