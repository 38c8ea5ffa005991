//! In-memory [`GeodataProvider`] for cache tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rider_demand_geodata::{Collection, GeodataError, GeodataProvider, GeodataQuery, Page};
use serde_json::Value;

/// Serves fixed zones and places split into pages of `page_size`.
pub struct StaticProvider {
    zones: Vec<Value>,
    places: Vec<Value>,
    page_size: usize,
    delay: Option<Duration>,
    /// Page number that fails with a 503, 0 for none.
    fail_on_page: AtomicU32,
}

impl StaticProvider {
    pub fn new(zones: Vec<Value>, places: Vec<Value>) -> Self {
        Self {
            zones,
            places,
            page_size: 100,
            delay: None,
            fail_on_page: AtomicU32::new(0),
        }
    }

    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sleeps for `delay` before answering each page.
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes every later request for `page` fail.
    pub fn fail_on_page(&self, page: u32) {
        self.fail_on_page.store(page, Ordering::Relaxed);
    }
}

#[async_trait]
impl GeodataProvider for StaticProvider {
    async fn fetch_page(
        &self,
        collection: Collection,
        _query: &GeodataQuery,
        page: u32,
    ) -> Result<Page, GeodataError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on_page.load(Ordering::Relaxed) == page {
            return Err(GeodataError::Status {
                status: 503,
                url: format!("test://{collection}/{page}"),
            });
        }

        let all = match collection {
            Collection::Zones => &self.zones,
            Collection::Places => &self.places,
        };
        let size = self.page_size.max(1);
        let page_count = u32::try_from(all.len().div_ceil(size)).unwrap();
        let start = (page.saturating_sub(1) as usize) * size;
        let features = all.iter().skip(start).take(size).cloned().collect();
        Ok(Page {
            features,
            page_count,
        })
    }
}
