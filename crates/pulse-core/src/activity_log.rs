// Historical activity log query
//
// Two-tier filtering:
// - `type_filter` is sent to the server and changes the dataset (and so
//   invalidates the page cursor, which resets to 1)
// - `search_term` narrows the rows of the page already fetched and never
//   triggers a fetch or changes `total_pages`
//
// A failed fetch leaves the previously displayed page in place, cursor and
// filter included: navigation only commits once its page has loaded.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::activity::{ActivityEvent, ActivityType};
use crate::error::QueryError;
use crate::traits::ActivityLogSource;

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Request sent to the paged log endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    /// 1-indexed page number
    pub page: u32,
    pub limit: u32,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<ActivityType>,
}

/// Pagination block of a log response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default = "one")]
    pub total_pages: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

fn one() -> u32 {
    1
}

/// One page of the historical log as returned by the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityPage {
    #[serde(default)]
    pub activities: Vec<ActivityEvent>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl ActivityPage {
    /// Total pages, never less than one (an empty result is still one page)
    pub fn total_pages(&self) -> u32 {
        self.pagination.total_pages.max(1)
    }
}

/// Parameters for a one-shot query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParams {
    pub page: u32,
    pub page_size: u32,
    pub type_filter: Option<ActivityType>,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            type_filter: None,
        }
    }
}

/// Result handed back by `query`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub items: Vec<ActivityEvent>,
    pub total_pages: u32,
    pub page: u32,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Stateful paged query behind the full activity-log screen
pub struct ActivityLogQuery {
    source: Arc<dyn ActivityLogSource>,
    page: u32,
    page_size: u32,
    type_filter: Option<ActivityType>,
    search_term: String,
    current: Option<ActivityPage>,
    /// Request that produced `current`
    displayed: Option<PageRequest>,
    last_error: Option<String>,
    loading: bool,
}

impl ActivityLogQuery {
    pub fn new(source: Arc<dyn ActivityLogSource>) -> Self {
        Self {
            source,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            type_filter: None,
            search_term: String::new(),
            current: None,
            displayed: None,
            last_error: None,
            loading: false,
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn type_filter(&self) -> Option<&ActivityType> {
        self.type_filter.as_ref()
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Total pages of the displayed result (1 before the first load)
    pub fn total_pages(&self) -> u32 {
        self.current.as_ref().map_or(1, ActivityPage::total_pages)
    }

    /// Every row of the displayed page
    pub fn items(&self) -> &[ActivityEvent] {
        self.current
            .as_ref()
            .map_or(&[][..], |page| page.activities.as_slice())
    }

    /// Rows of the displayed page that match the search term
    pub fn visible_items(&self) -> Vec<&ActivityEvent> {
        let needle = self.search_term.trim().to_lowercase();
        self.items()
            .iter()
            .filter(|event| needle.is_empty() || event.matches_search(&needle))
            .collect()
    }

    /// Whether a page was loaded and it has no rows (explicit empty state)
    pub fn is_empty(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|page| page.activities.is_empty())
    }

    /// Change the server-side filter; a change resets the cursor to page 1
    pub fn set_type_filter(&mut self, filter: Option<ActivityType>) -> bool {
        if self.type_filter == filter {
            return false;
        }
        debug!(filter = ?filter, "Activity type filter changed, resetting to page 1");
        self.type_filter = filter;
        self.page = 1;
        true
    }

    /// Change the page size; resets the cursor to page 1
    pub fn set_page_size(&mut self, page_size: u32) -> Result<(), QueryError> {
        if page_size == 0 {
            return Err(QueryError::InvalidPageSize(page_size));
        }
        if self.page_size != page_size {
            self.page_size = page_size;
            self.page = 1;
        }
        Ok(())
    }

    /// Move the cursor (clamped to `1..=total_pages` once a page is loaded)
    pub fn set_page(&mut self, page: u32) {
        let upper = if self.current.is_some() {
            self.total_pages()
        } else {
            u32::MAX
        };
        self.page = page.clamp(1, upper);
    }

    pub fn next_page(&mut self) -> bool {
        if self.page >= self.total_pages() {
            return false;
        }
        self.page += 1;
        true
    }

    pub fn prev_page(&mut self) -> bool {
        if self.page <= 1 {
            return false;
        }
        self.page -= 1;
        true
    }

    /// Client-side search over the displayed page; never fetches
    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
    }

    /// Apply `params` and fetch
    ///
    /// A `type_filter` different from the current one resets the page to 1,
    /// whatever `params.page` says.
    pub async fn query(&mut self, params: QueryParams) -> Result<QueryResult, QueryError> {
        self.set_page_size(params.page_size)?;
        self.page = params.page.max(1);
        self.set_type_filter(params.type_filter);
        self.reload().await
    }

    /// Fetch the page under the current cursor
    pub async fn reload(&mut self) -> Result<QueryResult, QueryError> {
        let request = PageRequest {
            page: self.page,
            limit: self.page_size,
            event_type: self.type_filter.clone(),
        };

        self.loading = true;
        let result = self.source.fetch_page(&request).await;
        self.loading = false;

        match result {
            Ok(page) => {
                debug!(
                    page = request.page,
                    rows = page.activities.len(),
                    total_pages = page.total_pages(),
                    "Activity page loaded"
                );
                self.last_error = None;
                self.current = Some(page);
                self.displayed = Some(request);
                Ok(self.result())
            }
            Err(source) => {
                warn!(page = request.page, error = %source, "Activity page fetch failed");
                self.last_error = Some(source.to_string());
                self.restore_displayed();
                Err(QueryError::Fetch {
                    page: request.page,
                    source,
                })
            }
        }
    }

    /// Put the cursor back on the page still on display
    fn restore_displayed(&mut self) {
        if let Some(shown) = &self.displayed {
            self.page = shown.page;
            self.page_size = shown.limit;
            self.type_filter = shown.event_type.clone();
        }
    }

    /// Snapshot of the displayed page (unfiltered by search)
    pub fn result(&self) -> QueryResult {
        QueryResult {
            items: self.items().to_vec(),
            total_pages: self.total_pages(),
            page: self.page,
        }
    }
}
