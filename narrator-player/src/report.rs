//! Client for the daily report that supplies narration text

use crate::error::{Error, Result};
use narrator_common::report::Report;
use std::time::Duration;
use tracing::{debug, info};

/// Path of the daily report relative to the backend base URL
pub const TODAY_PATH: &str = "/reports/today";

/// Report documents are small; the whole request is bounded
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ReportClient {
    client: reqwest::Client,
    url: String,
}

impl ReportClient {
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), TODAY_PATH),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch today's report
    pub async fn fetch_today(&self) -> Result<Report> {
        debug!(url = %self.url, "Fetching today's report");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::Http(format!("Failed to reach {}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http(format!(
                "{} returned HTTP {}",
                self.url,
                status.as_u16()
            )));
        }

        let report: Report = response
            .json()
            .await
            .map_err(|e| Error::Http(format!("Invalid report from {}: {}", self.url, e)))?;

        info!(
            created_at = %report.created_at,
            articles = report.articles.len(),
            "Loaded today's report"
        );
        Ok(report)
    }

    /// Fetch today's report and return its narration text
    pub async fn fetch_narration_text(&self) -> Result<String> {
        let report = self.fetch_today().await?;
        report
            .narration_text()
            .map(str::to_string)
            .ok_or(Error::EmptyNarration)
    }
}
