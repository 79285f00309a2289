use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::capture::Frame;
use crate::error::RoundError;
use crate::protocols::{self, OpenedSession, ProcedureCatalog};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Reply to `POST /input-procedure`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureResponse {
    pub session_id: String,
    #[serde(default)]
    pub procedure: Option<String>,
    #[serde(default)]
    pub required_tools: Vec<String>,
}

/// Reply to `POST /detect`. Missing fields default to empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectResponse {
    #[serde(default)]
    pub detected_tools: BTreeMap<String, u32>,
    #[serde(default)]
    pub bounding_boxes: Vec<serde_json::Value>,
    #[serde(default)]
    pub objects_found: u32,
}

/// HTTP client for the session and detection backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("cartcheck")
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Registers a procedure with the backend and returns its session id and tool list.
    pub async fn input_procedure(&self, procedure: &str) -> Result<ProcedureResponse> {
        let url = self.url("/input-procedure");
        let response = self
            .client
            .post(&url)
            .form(&[("procedure", procedure)])
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;

        if !response.status().is_success() {
            bail!("HTTP {} from {}", response.status(), url);
        }

        response
            .json::<ProcedureResponse>()
            .await
            .with_context(|| format!("invalid procedure response from {url}"))
    }

    /// Uploads one frame for detection.
    pub async fn detect(&self, session_id: &str, frame: &Frame) -> Result<DetectResponse, RoundError> {
        let image = Part::bytes(frame.bytes.clone())
            .file_name(frame.file_name())
            .mime_str(frame.mime)?;
        let form = Form::new()
            .text("session_id", session_id.to_string())
            .part("image", image);

        let response = self
            .client
            .post(self.url("/detect"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RoundError::BackendRejected {
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|err| RoundError::MalformedResponse {
            reason: err.to_string(),
        })
    }
}

#[async_trait]
impl ProcedureCatalog for BackendClient {
    async fn open_session(&self, procedure: &str) -> Result<OpenedSession> {
        let response = self.input_procedure(procedure).await?;
        let procedure = response.procedure.unwrap_or_else(|| procedure.to_string());

        Ok(OpenedSession {
            session_id: response.session_id,
            required_items: response
                .required_tools
                .iter()
                .map(|tool| protocols::required_item_for_tool(tool))
                .collect(),
            location: None,
            timeout_secs: protocols::timeout_secs(&procedure),
            procedure,
        })
    }
}
