//! Body composition upload adapter.
//!
//! Takes one JSON measurement, hands it to a [`BodyCompositionSink`] and
//! produces the JSON report printed by `garmin-upload`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::api::ConnectClient;
use crate::auth::{GarminSession, GarminSsoClient};
use crate::error::UploadError;
use crate::fit::FitEncoder;
use crate::models::{BodyComposition, UploadSummary};

/// File name sent with the multipart upload.
const FIT_FILE_NAME: &str = "body_composition.fit";

/// Destination for measurements.
#[async_trait]
pub trait BodyCompositionSink: Send + Sync {
    async fn upload(&self, measurement: &BodyComposition) -> Result<()>;
}

/// Uploads measurements to Garmin Connect using tokens from `token_dir`.
pub struct GarminUploader {
    token_dir: PathBuf,
    sso: GarminSsoClient,
}

impl GarminUploader {
    pub fn new(token_dir: PathBuf, sso: GarminSsoClient) -> Self {
        Self { token_dir, sso }
    }

    /// Load the stored session, refreshing the OAuth2 token if it expired.
    async fn session(&self) -> Result<GarminSession> {
        let dir = &self.token_dir;
        info!(dir = %dir.display(), "Loading tokens");

        if !dir.is_dir() {
            bail!(
                "Token directory not found: {}. Run garmin-setup first.",
                dir.display()
            );
        }
        if !GarminSession::exists_in(dir) {
            bail!(
                "No Garmin tokens in {}. Run garmin-setup first.",
                dir.display()
            );
        }

        let mut session = GarminSession::load(dir)?;
        if session.oauth2.is_expired() {
            info!("OAuth2 token expired, refreshing");
            self.sso.refresh(&mut session).await?;
            session.save(dir).context("Failed to store refreshed tokens")?;
        }
        Ok(session)
    }
}

#[async_trait]
impl BodyCompositionSink for GarminUploader {
    async fn upload(&self, measurement: &BodyComposition) -> Result<()> {
        let session = self.session().await?;
        let domain = session
            .oauth1
            .domain
            .clone()
            .unwrap_or_else(|| self.sso.domain().to_string());

        let fit = FitEncoder::weight_file(Utc::now(), &measurement.to_weight_scale());
        debug!(bytes = fit.len(), "Encoded FIT file");

        info!("Uploading body composition");
        let client = ConnectClient::new(&session, &domain)?;
        let response = client.upload_fit(FIT_FILE_NAME, fit).await?;
        match upload_id(&response) {
            Some(id) => debug!(upload_id = %id, "Upload accepted"),
            None => debug!(response = %response, "Upload accepted without an upload id"),
        }
        info!("Upload successful");
        Ok(())
    }
}

/// `uploadId` from the upload service's import result.
fn upload_id(response: &Value) -> Option<&Value> {
    response
        .pointer("/detailedImportResult/uploadId")
        .filter(|id| !id.is_null())
}

/// JSON result written to stdout.
#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<UploadSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadReport {
    fn success(data: UploadSummary) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn failure(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Parse `raw` and upload it. Never fails: errors end up in the report.
pub async fn process_upload<S>(raw: &str, sink: &S) -> UploadReport
where
    S: BodyCompositionSink + ?Sized,
{
    match parse_and_upload(raw, sink).await {
        Ok(summary) => UploadReport::success(summary),
        Err(e) => {
            let message = format!("{:#}", e);
            error!(error = %message, "Upload failed");
            UploadReport::failure(message)
        }
    }
}

async fn parse_and_upload<S>(raw: &str, sink: &S) -> Result<UploadSummary, UploadError>
where
    S: BodyCompositionSink + ?Sized,
{
    let measurement: BodyComposition = serde_json::from_str(raw)?;
    sink.upload(&measurement).await?;
    Ok(measurement.summary())
}
