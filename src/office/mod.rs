use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Response, Url};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::model::ShadowStatus;

pub mod model;

pub use model::{ApplicationStatusEntry, CandidateApplication};

/// The office service as seen from the logistic side.
#[async_trait]
pub trait ApplicationSource: Send + Sync {
    /// NEW applications from `pickup` to `dropoff` created at or before `before`,
    /// ordered by creation time ascending.
    async fn unassigned_applications(
        &self,
        pickup_point_id: i64,
        dropoff_point_id: i64,
        before: DateTime<Utc>,
    ) -> Result<Vec<CandidateApplication>>;

    async fn mark_in_transit(&self, application_id: i64) -> Result<()>;

    async fn update_status(&self, application_id: i64, status: ShadowStatus) -> Result<()>;

    async fn statuses(&self, application_ids: &[i64]) -> Result<Vec<ApplicationStatusEntry>>;
}

#[derive(Clone)]
pub struct OfficeClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for OfficeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfficeClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OfficeClient {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(&cfg.office.base_url, cfg.office.timeout())
    }

    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        // Url::join drops the last path segment unless the base ends with '/'.
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).with_context(|| format!("invalid office URL {}", base))?;
        let http = Client::builder()
            .user_agent("logistic-planner/0.1")
            .timeout(timeout)
            .no_proxy()
            .build()
            .context("failed to build office HTTP client")?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("invalid office endpoint {}", path))
    }

    pub fn build_candidates_request(
        &self,
        pickup_point_id: i64,
        dropoff_point_id: i64,
        before: DateTime<Utc>,
    ) -> Result<reqwest::Request> {
        self.http
            .get(self.endpoint("internal/applications")?)
            .query(&[
                ("pickup_point_id", pickup_point_id.to_string()),
                ("dropoff_point_id", dropoff_point_id.to_string()),
                ("before", before.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ])
            .build()
            .context("failed to build office request")
    }

    async fn execute(&self, request: reqwest::Request) -> Result<Response> {
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, "office request");
        let res = self
            .http
            .execute(request)
            .await
            .with_context(|| format!("failed to reach office at {}", url))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!(
                "office error {} on {} {}: {}",
                status,
                method,
                url.path(),
                error_reason(&body)
            ));
        }
        Ok(res)
    }
}

/// The office answers failures with `{"error": "..."}`; fall back to the raw body.
fn error_reason(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl ApplicationSource for OfficeClient {
    async fn unassigned_applications(
        &self,
        pickup_point_id: i64,
        dropoff_point_id: i64,
        before: DateTime<Utc>,
    ) -> Result<Vec<CandidateApplication>> {
        let request = self.build_candidates_request(pickup_point_id, dropoff_point_id, before)?;
        let res = self.execute(request).await?;
        res.json::<Vec<CandidateApplication>>()
            .await
            .context("invalid office applications JSON")
    }

    async fn mark_in_transit(&self, application_id: i64) -> Result<()> {
        let url = self.endpoint(&format!(
            "internal/applications/{}/mark_in_transit",
            application_id
        ))?;
        let request = self.http.post(url).build()?;
        self.execute(request).await?;
        Ok(())
    }

    async fn update_status(&self, application_id: i64, status: ShadowStatus) -> Result<()> {
        let url = self.endpoint(&format!("office/applications/{}/status", application_id))?;
        let request = self
            .http
            .post(url)
            .json(&model::StatusUpdateBody {
                status: status.as_str(),
            })
            .build()?;
        self.execute(request).await?;
        Ok(())
    }

    async fn statuses(&self, application_ids: &[i64]) -> Result<Vec<ApplicationStatusEntry>> {
        if application_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = application_ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let request = self
            .http
            .get(self.endpoint("internal/applications/status")?)
            .query(&[("ids", ids)])
            .build()?;
        let res = self.execute(request).await?;
        res.json::<Vec<ApplicationStatusEntry>>()
            .await
            .context("invalid office status JSON")
    }
}
