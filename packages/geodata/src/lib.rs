#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geodata provider contract.
//!
//! The catchment loader consumes two paginated collections, zones and
//! places, each page shaped as
//!
//! ```json
//! { "data": [ ... ], "meta": { "pagination": { "pageCount": 12 } } }
//! ```
//!
//! [`GeodataProvider`] fetches one page; [`fetch_all_pages`] walks pages
//! `1..` until `page >= pageCount`. Raw features are turned into typed
//! [`Zone`](rider_demand_catchment_models::Zone)s by [`normalize`].

pub mod http;
pub mod normalize;
pub mod progress;
pub mod retry;

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use http::{GeodataConfig, HttpGeodataProvider};
pub use progress::{NullProgress, ProgressCallback, null_progress};

/// Errors that can occur while fetching geodata.
#[derive(Debug, thiserror::Error)]
pub enum GeodataError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not valid JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Response status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// Response did not follow the page/meta shape.
    #[error("Pagination error: {message}")]
    Pagination {
        /// Description of what was wrong.
        message: String,
    },

    /// The fetch was stopped before it finished.
    #[error("Fetch cancelled")]
    Cancelled,
}

/// The two feature collections a provider serves.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Collection {
    /// Land-use zones, classified by `zone_type`.
    Zones,
    /// Points of interest, always amenity class.
    Places,
}

/// One page of raw features.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Raw feature objects.
    pub features: Vec<serde_json::Value>,
    /// Total number of pages reported by the server.
    pub page_count: u32,
}

impl Page {
    /// Extracts a page from a `{data, meta.pagination.pageCount}` body.
    ///
    /// # Errors
    ///
    /// Returns [`GeodataError::Pagination`] if `data` is not an array or
    /// `pageCount` is missing.
    pub fn from_json(mut body: serde_json::Value) -> Result<Self, GeodataError> {
        let page_count = body
            .pointer("/meta/pagination/pageCount")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| GeodataError::Pagination {
                message: "missing meta.pagination.pageCount".to_string(),
            })?;

        let features = match body.get_mut("data").map(serde_json::Value::take) {
            Some(serde_json::Value::Array(items)) => items,
            Some(serde_json::Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(GeodataError::Pagination {
                    message: format!("'data' is not an array: {other}"),
                });
            }
        };

        Ok(Self {
            features,
            page_count: u32::try_from(page_count).unwrap_or(u32::MAX),
        })
    }
}

/// Filter and page size applied to every fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeodataQuery {
    /// Only features owned by this country/operator id.
    pub owner_id: Option<String>,
    /// Features per page.
    pub page_size: u32,
}

/// Default features per page.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

impl Default for GeodataQuery {
    fn default() -> Self {
        Self {
            owner_id: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl GeodataQuery {
    /// Sets the owner filter.
    #[must_use]
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    /// Sets the page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }
}

/// A source of paginated zone and place features.
#[async_trait]
pub trait GeodataProvider: Send + Sync {
    /// Fetches page `page` (1-based) of `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`GeodataError`] if the page cannot be fetched or parsed.
    async fn fetch_page(
        &self,
        collection: Collection,
        query: &GeodataQuery,
        page: u32,
    ) -> Result<Page, GeodataError>;
}

/// Fetches every page of `collection`, in order.
///
/// `stop` is checked before each page; once set, the fetch ends with
/// [`GeodataError::Cancelled`]. `progress` receives the page count after
/// the first page and one tick per page.
///
/// # Errors
///
/// Returns the first page error, or [`GeodataError::Cancelled`].
pub async fn fetch_all_pages(
    provider: &dyn GeodataProvider,
    collection: Collection,
    query: &GeodataQuery,
    stop: &AtomicBool,
    progress: &dyn ProgressCallback,
) -> Result<Vec<serde_json::Value>, GeodataError> {
    let mut features = Vec::new();
    let mut page = 1_u32;

    progress.set_message(format!("Fetching {collection}"));

    loop {
        if stop.load(Ordering::Relaxed) {
            log::debug!("Stopping {collection} fetch before page {page}");
            return Err(GeodataError::Cancelled);
        }

        let result = provider.fetch_page(collection, query, page).await?;
        log::debug!(
            "Fetched {collection} page {page}/{}: {} feature(s)",
            result.page_count,
            result.features.len()
        );

        if page == 1 {
            progress.set_total(u64::from(result.page_count.max(1)));
        }
        progress.inc(1);
        features.extend(result.features);

        if page >= result.page_count {
            break;
        }
        page += 1;
    }

    Ok(features)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    struct Pages {
        pages: BTreeMap<u32, Result<Page, u16>>,
        requested: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl GeodataProvider for Pages {
        async fn fetch_page(
            &self,
            _collection: Collection,
            _query: &GeodataQuery,
            page: u32,
        ) -> Result<Page, GeodataError> {
            self.requested.lock().unwrap().push(page);
            match self.pages.get(&page) {
                Some(Ok(p)) => Ok(p.clone()),
                Some(Err(status)) => Err(GeodataError::Status {
                    status: *status,
                    url: format!("test://{page}"),
                }),
                None => Ok(Page::default()),
            }
        }
    }

    fn page(ids: &[u32], page_count: u32) -> Page {
        Page {
            features: ids.iter().map(|id| json!({ "id": id })).collect(),
            page_count,
        }
    }

    #[test]
    fn parses_page_body() {
        let body = json!({
            "data": [{"id": 1}, {"id": 2}],
            "meta": {"pagination": {"page": 1, "pageSize": 2, "pageCount": 3, "total": 5}}
        });
        let page = Page::from_json(body).unwrap();
        assert_eq!(page.features.len(), 2);
        assert_eq!(page.page_count, 3);
    }

    #[test]
    fn rejects_page_without_meta() {
        let err = Page::from_json(json!({"data": []})).unwrap_err();
        assert!(matches!(err, GeodataError::Pagination { .. }));
        let err = Page::from_json(json!({"data": 4, "meta": {"pagination": {"pageCount": 1}}}))
            .unwrap_err();
        assert!(matches!(err, GeodataError::Pagination { .. }));
    }

    #[tokio::test]
    async fn walks_until_page_count() {
        let provider = Pages {
            pages: BTreeMap::from([
                (1, Ok(page(&[1, 2], 3))),
                (2, Ok(page(&[3, 4], 3))),
                (3, Ok(page(&[5], 3))),
            ]),
            requested: Mutex::new(Vec::new()),
        };
        let stop = AtomicBool::new(false);
        let features = fetch_all_pages(
            &provider,
            Collection::Zones,
            &GeodataQuery::default(),
            &stop,
            &NullProgress,
        )
        .await
        .unwrap();
        assert_eq!(features.len(), 5);
        assert_eq!(*provider.requested.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn empty_collection_fetches_one_page() {
        let provider = Pages {
            pages: BTreeMap::from([(1, Ok(page(&[], 0)))]),
            requested: Mutex::new(Vec::new()),
        };
        let stop = AtomicBool::new(false);
        let features = fetch_all_pages(
            &provider,
            Collection::Places,
            &GeodataQuery::default(),
            &stop,
            &NullProgress,
        )
        .await
        .unwrap();
        assert!(features.is_empty());
        assert_eq!(*provider.requested.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn page_failure_aborts_fetch() {
        let provider = Pages {
            pages: BTreeMap::from([(1, Ok(page(&[1], 3))), (2, Err(503))]),
            requested: Mutex::new(Vec::new()),
        };
        let stop = AtomicBool::new(false);
        let err = fetch_all_pages(
            &provider,
            Collection::Zones,
            &GeodataQuery::default(),
            &stop,
            &NullProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GeodataError::Status { status: 503, .. }));
        assert_eq!(*provider.requested.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn stop_flag_cancels_before_next_page() {
        let provider = Pages {
            pages: BTreeMap::new(),
            requested: Mutex::new(Vec::new()),
        };
        let stop = AtomicBool::new(true);
        let err = fetch_all_pages(
            &provider,
            Collection::Zones,
            &GeodataQuery::default(),
            &stop,
            &NullProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GeodataError::Cancelled));
        assert!(provider.requested.lock().unwrap().is_empty());
    }
}
