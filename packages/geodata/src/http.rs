//! HTTP geodata provider for a CMS-style REST API.
//!
//! Requests look like
//! `GET {base_url}/{path}?pagination[page]=N&pagination[pageSize]=M&filters[country][id][$eq]=ID`
//! with an optional bearer token.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    Collection, DEFAULT_PAGE_SIZE, GeodataError, GeodataProvider, GeodataQuery, Page, retry,
};

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_zones_path() -> String {
    "api/zones".to_string()
}

fn default_places_path() -> String {
    "api/pois".to_string()
}

const fn default_timeout_secs() -> u64 {
    60
}

/// Connection settings for [`HttpGeodataProvider`], read from the
/// `[geodata]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeodataConfig {
    /// API root, e.g. `"https://cms.example.org"`.
    pub base_url: String,
    /// Bearer token, if the API needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Features per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Path of the zones collection.
    #[serde(default = "default_zones_path")]
    pub zones_path: String,
    /// Path of the places collection.
    #[serde(default = "default_places_path")]
    pub places_path: String,
    /// Owning country id used to filter both collections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_id: Option<String>,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl GeodataConfig {
    /// Creates a config for `base_url` with default paths and limits.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            page_size: DEFAULT_PAGE_SIZE,
            zones_path: default_zones_path(),
            places_path: default_places_path(),
            country_id: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// The query (owner filter and page size) this config implies.
    #[must_use]
    pub fn query(&self) -> GeodataQuery {
        GeodataQuery {
            owner_id: self.country_id.clone(),
            page_size: self.page_size,
        }
    }

    /// Full URL of `collection`.
    #[must_use]
    pub fn collection_url(&self, collection: Collection) -> String {
        let path = match collection {
            Collection::Zones => &self.zones_path,
            Collection::Places => &self.places_path,
        };
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Query-string pairs for one page request.
#[must_use]
pub fn page_params(query: &GeodataQuery, page: u32) -> Vec<(String, String)> {
    let mut params = vec![
        ("pagination[page]".to_string(), page.to_string()),
        ("pagination[pageSize]".to_string(), query.page_size.to_string()),
    ];
    if let Some(owner) = &query.owner_id {
        params.push(("filters[country][id][$eq]".to_string(), owner.clone()));
    }
    params
}

/// [`GeodataProvider`] backed by a REST API.
pub struct HttpGeodataProvider {
    client: reqwest::Client,
    config: GeodataConfig,
}

impl HttpGeodataProvider {
    /// Builds a provider with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`GeodataError::Http`] if the client cannot be built.
    pub fn new(config: GeodataConfig) -> Result<Self, GeodataError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            // Workers run on short-lived runtimes; pooled connections would outlive them.
            .pool_max_idle_per_host(0)
            .build()?;
        Ok(Self { client, config })
    }

    /// Connection settings.
    #[must_use]
    pub const fn config(&self) -> &GeodataConfig {
        &self.config
    }
}

#[async_trait]
impl GeodataProvider for HttpGeodataProvider {
    async fn fetch_page(
        &self,
        collection: Collection,
        query: &GeodataQuery,
        page: u32,
    ) -> Result<Page, GeodataError> {
        let url = self.config.collection_url(collection);
        let params = page_params(query, page);
        let body = retry::send_json(|| {
            let request = self.client.get(&url).query(&params);
            match &self.config.token {
                Some(token) => request.bearer_auth(token),
                None => request,
            }
        })
        .await?;
        Page::from_json(body)
    }
}
