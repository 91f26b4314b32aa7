//! Report wire types
//!
//! Shape of the `GET /reports/today` response. The player only consumes the
//! narration text; the article list is carried for clients that render
//! citations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cited article attached to a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportArticle {
    pub id: i64,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

/// Daily generated report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub created_at: DateTime<Utc>,
    pub text: String,
    #[serde(default)]
    pub articles: Vec<ReportArticle>,
}

impl Report {
    /// Plain narration text for the speech endpoint
    ///
    /// Markup is stripped upstream; this only trims surrounding whitespace.
    /// Returns `None` when nothing is left to narrate.
    pub fn narration_text(&self) -> Option<&str> {
        let text = self.text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}
