//! Upstream edition feed
//!
//! The FAA publishes the current edition as a small JSON document; the first
//! listed edition is the canonical one. Missing fields decode as empty so that
//! only the first edition is ever validated.

use chrono::NaiveDate;
use cifp_common::naming::parse_edition_date;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::debug;

use crate::error::PipelineError;

#[derive(Debug, Clone, Deserialize)]
pub struct EditionFeed {
    #[serde(default)]
    pub edition: Vec<Edition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edition {
    #[serde(default)]
    pub edition_name: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub edition_date: String,
    #[serde(default)]
    pub edition_number: Option<serde_json::Value>,
    #[serde(default)]
    pub product: Product,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub url: String,
}

/// The edition a run works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentEdition {
    /// Dedup key and cycle name (the upstream `editionDate`)
    pub name: String,
    pub date: NaiveDate,
    pub archive_url: String,
}

impl EditionFeed {
    /// First edition of the feed, with its date parsed.
    pub fn current(self) -> Result<CurrentEdition, PipelineError> {
        let edition = self
            .edition
            .into_iter()
            .next()
            .ok_or(PipelineError::NoEditionsAvailable)?;

        let date = parse_edition_date(&edition.edition_date)
            .map_err(|e| PipelineError::UpstreamUnavailable(e.to_string()))?;

        if edition.product.url.trim().is_empty() {
            return Err(PipelineError::UpstreamUnavailable(format!(
                "edition {} has no archive url",
                edition.edition_date
            )));
        }

        Ok(CurrentEdition {
            name: edition.edition_date,
            date,
            archive_url: edition.product.url,
        })
    }
}

/// One GET against the metadata endpoint.
pub async fn fetch_current_edition(
    client: &reqwest::Client,
    url: &str,
) -> Result<CurrentEdition, PipelineError> {
    let response = client
        .get(url)
        .header(ACCEPT, "application/json")
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| PipelineError::UpstreamUnavailable(e.to_string()))?;

    let body = response
        .bytes()
        .await
        .map_err(|e| PipelineError::UpstreamUnavailable(e.to_string()))?;

    let feed: EditionFeed = serde_json::from_slice(&body)
        .map_err(|e| PipelineError::UpstreamUnavailable(format!("unparsable edition feed: {}", e)))?;

    debug!(editions = feed.edition.len(), "Edition feed fetched");

    feed.current()
}
