//! Headless table orchestration: pagination, debounced search with a separate
//! search source, facet filters and the skeleton/rows/error view.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::watch;
use url::form_urlencoded;

use crate::{
    client::{debounce::DebouncedSearch, error::ClientError, invalidation::Invalidations},
    listing::{MAX_PAGE_LIMIT, Page, Pagination},
    model::resource::Resource,
};

const RESERVED_KEYS: [&str; 3] = ["page", "limit", "search"];

/// Page, limit, search and facet selection of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableState {
    page: u32,
    limit: u32,
    default_limit: u32,
    search_term: String,
    debounced_search: String,
    facets: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    List,
    Search(String),
}

impl TableState {
    pub fn new(default_limit: u32) -> Self {
        let default_limit = default_limit.clamp(1, MAX_PAGE_LIMIT);
        Self {
            page: 1,
            limit: default_limit,
            default_limit,
            search_term: String::new(),
            debounced_search: String::new(),
            facets: BTreeMap::new(),
        }
    }

    /// Reads `page`, `limit`, `search` and facets from a URL query string.
    /// Facet values may repeat (`status=a&status=b`) or be comma separated.
    pub fn from_query(query: &str, default_limit: u32) -> Self {
        let mut state = Self::new(default_limit);
        let query = query.trim_start_matches('?');

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "page" => {
                    if let Ok(page) = value.trim().parse::<u32>() {
                        state.page = page.max(1);
                    }
                }
                "limit" => {
                    if let Ok(limit) = value.trim().parse::<u32>() {
                        state.limit = limit.clamp(1, MAX_PAGE_LIMIT);
                    }
                }
                "search" => {
                    state.search_term = value.to_string();
                    state.debounced_search = value.trim().to_string();
                }
                facet => {
                    for v in value.split(',').map(str::trim).filter(|v| !v.is_empty()) {
                        state
                            .facets
                            .entry(facet.to_string())
                            .or_default()
                            .insert(v.to_string());
                    }
                }
            }
        }
        state
    }

    /// Writes the state back as a query string, omitting defaults and empty values.
    pub fn to_query(&self) -> String {
        let mut out = form_urlencoded::Serializer::new(String::new());
        if self.page != 1 {
            out.append_pair("page", &self.page.to_string());
        }
        if self.limit != self.default_limit {
            out.append_pair("limit", &self.limit.to_string());
        }
        if !self.debounced_search.is_empty() {
            out.append_pair("search", &self.debounced_search);
        }
        for (name, values) in &self.facets {
            out.append_pair(name, &join(values));
        }
        out.finish()
    }

    /// Parameters of a request for the current page, always with page and limit.
    pub fn request_pairs(&self, search: Option<&str>) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".to_string(), self.page.to_string()),
            ("limit".to_string(), self.limit.to_string()),
        ];
        if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
            pairs.push(("search".to_string(), term.to_string()));
        }
        pairs.extend(
            self.facets
                .iter()
                .map(|(name, values)| (name.clone(), join(values))),
        );
        pairs
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn debounced_search(&self) -> &str {
        &self.debounced_search
    }

    pub fn facet(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.facets.get(name)
    }

    pub fn source(&self) -> DataSource {
        if self.debounced_search.is_empty() {
            DataSource::List
        } else {
            DataSource::Search(self.debounced_search.clone())
        }
    }

    /// Raw keystroke state; does not affect the data source until debounced.
    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
    }

    /// Applies a settled search term. Returns whether the data source changed.
    pub fn apply_debounced_search(&mut self, term: &str) -> bool {
        self.search_term = term.to_string();
        let term = term.trim();
        if term == self.debounced_search {
            return false;
        }
        self.debounced_search = term.to_string();
        self.page = 1;
        true
    }

    pub fn set_page(&mut self, page: u32) {
        self.page = page.max(1);
    }

    pub fn set_limit(&mut self, limit: u32) {
        self.limit = limit.clamp(1, MAX_PAGE_LIMIT);
        self.page = 1;
    }

    pub fn next_page(&mut self, total_pages: u32) -> bool {
        if self.page < total_pages {
            self.page += 1;
            true
        } else {
            false
        }
    }

    pub fn prev_page(&mut self) -> bool {
        if self.page > 1 {
            self.page -= 1;
            true
        } else {
            false
        }
    }

    /// Adds or removes one facet value; clearing the last value drops the facet.
    pub fn toggle_facet(&mut self, name: &str, value: &str) {
        if RESERVED_KEYS.contains(&name) {
            return;
        }
        let values = self.facets.entry(name.to_string()).or_default();
        if !values.remove(value) {
            values.insert(value.to_string());
        }
        if values.is_empty() {
            self.facets.remove(name);
        }
        self.page = 1;
    }

    pub fn clear_facets(&mut self) {
        self.facets.clear();
        self.page = 1;
    }
}

fn join(values: &BTreeSet<String>) -> String {
    values.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

/// What the table should render right now.
#[derive(Debug, Clone, PartialEq)]
pub enum TableView<T> {
    Skeleton,
    Rows {
        rows: Vec<T>,
        pagination: Pagination,
    },
    /// Toast text of the last failed load
    Failed(String),
}

/// The two data sources behind a table.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    type Row: Clone + Send + Sync + 'static;

    async fn list(&self, state: &TableState) -> Result<Page<Self::Row>, ClientError>;

    async fn search(&self, term: &str, state: &TableState) -> Result<Page<Self::Row>, ClientError>;
}

pub struct TableController<F: PageFetcher> {
    fetcher: F,
    resource: Resource,
    state: TableState,
    pagination: Option<Pagination>,
    view: watch::Sender<TableView<F::Row>>,
}

impl<F: PageFetcher> TableController<F> {
    pub fn new(fetcher: F, resource: Resource, state: TableState) -> Self {
        let (view, _) = watch::channel(TableView::Skeleton);
        Self {
            fetcher,
            resource,
            state,
            pagination: None,
            view,
        }
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    pub fn state(&self) -> &TableState {
        &self.state
    }

    pub fn view(&self) -> TableView<F::Row> {
        self.view.borrow().clone()
    }

    /// Follows view changes from another task, e.g. a renderer.
    pub fn subscribe(&self) -> watch::Receiver<TableView<F::Row>> {
        self.view.subscribe()
    }

    /// Loads the current page from whichever source is active.
    pub async fn refresh(&mut self) {
        self.view.send_replace(TableView::Skeleton);

        let result = match self.state.source() {
            DataSource::List => self.fetcher.list(&self.state).await,
            DataSource::Search(term) => self.fetcher.search(&term, &self.state).await,
        };

        let next = match result {
            Ok(page) => {
                self.pagination = Some(page.pagination);
                TableView::Rows {
                    rows: page.data,
                    pagination: page.pagination,
                }
            }
            Err(err) => {
                tracing::warn!(resource = %self.resource, error = %err, "Table load failed");
                TableView::Failed(err.toast_message())
            }
        };
        self.view.send_replace(next);
    }

    pub async fn set_page(&mut self, page: u32) {
        self.state.set_page(page);
        self.refresh().await;
    }

    pub async fn set_limit(&mut self, limit: u32) {
        self.state.set_limit(limit);
        self.refresh().await;
    }

    /// Whether the pager's next/previous buttons are enabled.
    pub fn pager(&self) -> (bool, bool) {
        self.pagination
            .map(|p| (p.has_prev(), p.has_next()))
            .unwrap_or((false, false))
    }

    pub async fn next_page(&mut self) -> bool {
        let total = self.pagination.map(|p| p.total_pages).unwrap_or(0);
        let moved = self.state.next_page(total);
        if moved {
            self.refresh().await;
        }
        moved
    }

    pub async fn prev_page(&mut self) -> bool {
        let moved = self.state.prev_page();
        if moved {
            self.refresh().await;
        }
        moved
    }

    pub async fn toggle_facet(&mut self, name: &str, value: &str) {
        self.state.toggle_facet(name, value);
        self.refresh().await;
    }

    pub async fn apply_search(&mut self, term: &str) -> bool {
        let changed = self.state.apply_debounced_search(term);
        if changed {
            self.refresh().await;
        }
        changed
    }

    /// Reloads when a change to `resource` makes this table stale.
    pub async fn on_invalidated(&mut self, resource: Resource) -> bool {
        if !self.resource.affected_by(resource) {
            return false;
        }
        self.refresh().await;
        true
    }

    /// Loads once, then follows settled search terms and invalidations until
    /// either input closes.
    pub async fn drive(mut self, mut search: DebouncedSearch, mut invalidations: Invalidations) -> Self {
        self.refresh().await;
        loop {
            tokio::select! {
                term = search.settled() => match term {
                    Some(term) => {
                        self.apply_search(&term).await;
                    }
                    None => break,
                },
                hit = invalidations.next() => match hit {
                    Some(()) => {
                        let resource = invalidations.resource();
                        self.on_invalidated(resource).await;
                    }
                    None => break,
                },
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{debounce::debounce_channel, invalidation::InvalidationBus};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::sleep;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        List(String),
        Search(String),
    }

    #[derive(Clone, Default)]
    struct FakeFetcher {
        calls: Arc<Mutex<Vec<Call>>>,
        fail_with: Option<u16>,
    }

    impl FakeFetcher {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn page(state: &TableState, total: u64) -> Page<String> {
            Page {
                data: vec![format!("row-p{}", state.page())],
                pagination: Pagination::new(state.page(), state.limit(), total),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        type Row = String;

        async fn list(&self, state: &TableState) -> Result<Page<String>, ClientError> {
            self.calls.lock().unwrap().push(Call::List(state.to_query()));
            if let Some(status) = self.fail_with {
                return Err(ClientError::from_response(status, br#"{"message":"Forbidden"}"#));
            }
            Ok(Self::page(state, 25))
        }

        async fn search(&self, term: &str, state: &TableState) -> Result<Page<String>, ClientError> {
            self.calls.lock().unwrap().push(Call::Search(term.to_string()));
            Ok(Self::page(state, 1))
        }
    }

    #[test]
    fn query_round_trip_is_stable() {
        let state = TableState::from_query("?page=3&limit=20&status=pending&status=approved&search=ann", 10);
        assert_eq!(state.page(), 3);
        assert_eq!(state.limit(), 20);
        assert_eq!(state.debounced_search(), "ann");
        assert_eq!(
            state.to_query(),
            "page=3&limit=20&search=ann&status=approved%2Cpending"
        );
        assert_eq!(TableState::from_query(&state.to_query(), 10), state);
    }

    #[test]
    fn defaults_are_omitted_and_garbage_ignored() {
        let state = TableState::from_query("page=abc&limit=&category=", 10);
        assert_eq!(state.page(), 1);
        assert_eq!(state.limit(), 10);
        assert_eq!(state.to_query(), "");
    }

    #[test]
    fn comma_separated_facets_are_split() {
        let state = TableState::from_query("leave_type=sick,annual", 10);
        let values: Vec<&str> = state
            .facet("leave_type")
            .unwrap()
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(values, vec!["annual", "sick"]);
    }

    #[test]
    fn toggling_facets_resets_page_and_drops_empty_facets() {
        let mut state = TableState::new(10);
        state.set_page(4);
        state.toggle_facet("status", "pending");
        assert_eq!(state.page(), 1);
        assert_eq!(state.to_query(), "status=pending");

        state.set_page(2);
        state.toggle_facet("status", "pending");
        assert_eq!(state.facet("status"), None);
        assert_eq!(state.page(), 1);
    }

    #[test]
    fn debounced_search_switches_source_and_resets_page() {
        let mut state = TableState::new(10);
        state.set_page(5);
        state.set_search_term("jo");
        assert_eq!(state.source(), DataSource::List);

        assert!(state.apply_debounced_search("john "));
        assert_eq!(state.source(), DataSource::Search("john".into()));
        assert_eq!(state.page(), 1);

        assert!(!state.apply_debounced_search("john"));
        assert!(state.apply_debounced_search("  "));
        assert_eq!(state.source(), DataSource::List);
    }

    #[test]
    fn paging_is_bounded() {
        let mut state = TableState::new(10);
        assert!(!state.prev_page());
        assert!(state.next_page(2));
        assert!(!state.next_page(2));
        state.set_limit(500);
        assert_eq!(state.limit(), MAX_PAGE_LIMIT);
        assert_eq!(state.page(), 1);
    }

    #[tokio::test]
    async fn view_starts_as_skeleton_then_shows_rows() {
        let fetcher = FakeFetcher::default();
        let mut table = TableController::new(fetcher, Resource::Employees, TableState::new(10));
        assert_eq!(table.view(), TableView::Skeleton);

        table.refresh().await;
        match table.view() {
            TableView::Rows { rows, pagination } => {
                assert_eq!(rows, vec!["row-p1".to_string()]);
                assert_eq!(pagination.total_pages, 3);
            }
            other => panic!("unexpected view: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_load_shows_toast_text() {
        let fetcher = FakeFetcher {
            fail_with: Some(403),
            ..Default::default()
        };
        let mut table = TableController::new(fetcher, Resource::Employees, TableState::new(10));
        table.refresh().await;
        assert_eq!(table.view(), TableView::Failed("Forbidden".into()));
    }

    #[tokio::test]
    async fn facet_toggle_refetches_with_new_query() {
        let fetcher = FakeFetcher::default();
        let mut table = TableController::new(fetcher.clone(), Resource::Leave, TableState::new(10));
        table.refresh().await;
        table.toggle_facet("status", "pending").await;

        assert_eq!(
            fetcher.calls(),
            vec![Call::List(String::new()), Call::List("status=pending".into())]
        );
    }

    #[tokio::test]
    async fn next_page_stops_at_last_page() {
        let fetcher = FakeFetcher::default();
        let mut table = TableController::new(fetcher.clone(), Resource::Leave, TableState::new(10));
        assert_eq!(table.pager(), (false, false));
        table.refresh().await;
        assert_eq!(table.pager(), (false, true));

        assert!(table.next_page().await);
        assert!(table.next_page().await);
        assert!(!table.next_page().await);
        assert_eq!(table.state().page(), 3);
        assert_eq!(table.pager(), (true, false));
        assert_eq!(fetcher.calls().len(), 3);
    }

    #[tokio::test]
    async fn other_resources_do_not_reload() {
        let fetcher = FakeFetcher::default();
        let mut table = TableController::new(fetcher.clone(), Resource::Leave, TableState::new(10));
        assert!(!table.on_invalidated(Resource::Events).await);
        assert!(table.on_invalidated(Resource::Leave).await);
        assert!(table.on_invalidated(Resource::Employees).await);
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn typing_fires_exactly_one_search_with_final_term() {
        let fetcher = FakeFetcher::default();
        let bus = InvalidationBus::default();
        let (input, search) = debounce_channel(Duration::from_millis(800));

        let table = TableController::new(fetcher.clone(), Resource::Employees, TableState::new(10));
        let driver = tokio::spawn(table.drive(search, bus.subscribe(Resource::Employees)));

        sleep(Duration::from_millis(10)).await;
        for term in ["a", "an", "ann"] {
            input.set(term);
            sleep(Duration::from_millis(200)).await;
        }
        // last keystroke at 410ms; still inside the quiet period
        sleep(Duration::from_millis(500)).await;
        assert_eq!(fetcher.calls(), vec![Call::List(String::new())]);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(
            fetcher.calls(),
            vec![Call::List(String::new()), Call::Search("ann".into())]
        );

        drop(input);
        let table = driver.await.unwrap();
        assert_eq!(table.state().source(), DataSource::Search("ann".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn mutation_elsewhere_reloads_bound_table() {
        let fetcher = FakeFetcher::default();
        let bus = InvalidationBus::default();
        let (input, search) = debounce_channel(Duration::from_millis(800));

        let table = TableController::new(fetcher.clone(), Resource::Leave, TableState::new(10));
        let mut views = table.subscribe();
        let driver = tokio::spawn(table.drive(search, bus.subscribe(Resource::Leave)));

        sleep(Duration::from_millis(10)).await;
        bus.publish(Resource::Announcements);
        bus.publish(Resource::Leave);
        sleep(Duration::from_millis(10)).await;

        assert_eq!(fetcher.calls().len(), 2);
        assert!(matches!(*views.borrow_and_update(), TableView::Rows { .. }));

        drop(input);
        driver.await.unwrap();
    }
}
