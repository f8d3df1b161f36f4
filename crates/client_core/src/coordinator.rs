//! Owns the mutable query state of one catalog view, drives the gateway and
//! republishes the derived list.
//!
//! Every product request is tagged with the request sequence current at
//! dispatch time. A response is applied only while its tag is still the
//! current sequence, so arrival order never decides which query wins.

use std::{
    collections::BTreeSet,
    sync::{Arc, Weak},
    time::Duration,
};

use shared::{
    domain::{DrinkType, Label, Product, SortKey},
    error::FetchFailure,
};
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    config::Settings,
    debounce::{DebouncedTerm, SearchDebouncer},
    engine::{self, FilterState, Pagination},
    gateway::{CatalogGateway, CatalogPage, CatalogQuery, QueryMode},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewVariant {
    /// Fetch up to `bulk_size` products once and do everything locally.
    Bulk { in_stock: bool },
    /// Labels, sort and page are served by the remote paged endpoint.
    Paged,
    /// Products only appear in response to a search.
    SearchOnly,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub variant: ViewVariant,
    pub drink_type_scope: Option<DrinkType>,
    pub page_size: u32,
    pub bulk_size: u32,
    pub search_debounce: Duration,
}

impl CoordinatorConfig {
    pub fn from_settings(settings: &Settings, variant: ViewVariant) -> Self {
        Self {
            variant,
            drink_type_scope: None,
            page_size: settings.page_size.max(1),
            bulk_size: settings.bulk_size.max(1),
            search_debounce: settings.search_debounce(),
        }
    }

    pub fn with_scope(mut self, scope: Option<DrinkType>) -> Self {
        self.drink_type_scope = scope;
        self
    }
}

/// Last fetched raw data. Only the coordinator writes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogStore {
    pub items: Vec<Product>,
    pub labels: Vec<Label>,
    /// `None` until a product response has been applied.
    pub total_pages: Option<u32>,
    /// Kind of query `items` answered. Decides local vs. remote paging.
    pub source: Option<QueryMode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryState {
    pub selected_labels: BTreeSet<String>,
    pub sort_key: SortKey,
    pub search_term: String,
    pub drink_type_scope: Option<DrinkType>,
    pub page: u32,
    pub page_size: u32,
    pub request_sequence: u64,
}

impl QueryState {
    fn new(config: &CoordinatorConfig) -> Self {
        Self {
            selected_labels: BTreeSet::new(),
            sort_key: SortKey::default(),
            search_term: String::new(),
            drink_type_scope: config.drink_type_scope.clone(),
            page: 1,
            page_size: config.page_size.max(1),
            request_sequence: 0,
        }
    }

    fn filter(&self) -> FilterState {
        FilterState {
            drink_type_scope: self.drink_type_scope.clone(),
            selected_labels: self.selected_labels.clone(),
            sort_key: self.sort_key,
        }
    }

    fn search_active(&self) -> bool {
        !self.search_term.is_empty()
    }
}

/// What the presentation layer renders.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogView {
    pub visible_items: Vec<Product>,
    pub loading: bool,
    pub error: bool,
    pub error_detail: Option<String>,
    pub total_pages: Option<u32>,
    pub page: u32,
    pub labels: Vec<Label>,
    pub search_term: String,
}

impl Default for CatalogView {
    fn default() -> Self {
        Self {
            visible_items: Vec::new(),
            loading: false,
            error: false,
            error_detail: None,
            total_pages: None,
            page: 1,
            labels: Vec::new(),
            search_term: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Mounted,
    Unmounted,
}

struct CoordinatorState {
    lifecycle: Lifecycle,
    query: QueryState,
    store: CatalogStore,
    visible: Vec<Product>,
    total_pages: Option<u32>,
    loading: bool,
    /// Set until both initial fetches have resolved.
    mount_pending: bool,
    error: Option<FetchFailure>,
    debouncer: SearchDebouncer,
    debounce_rx: Option<mpsc::UnboundedReceiver<DebouncedTerm>>,
    debounce_pump: Option<JoinHandle<()>>,
}

pub struct CatalogCoordinator {
    gateway: Arc<dyn CatalogGateway>,
    config: CoordinatorConfig,
    inner: Mutex<CoordinatorState>,
    view: watch::Sender<CatalogView>,
}

impl CatalogCoordinator {
    pub fn new(gateway: Arc<dyn CatalogGateway>, config: CoordinatorConfig) -> Arc<Self> {
        let (debouncer, debounce_rx) = SearchDebouncer::channel(config.search_debounce);
        let (view, _) = watch::channel(CatalogView::default());
        Arc::new(Self {
            gateway,
            inner: Mutex::new(CoordinatorState {
                lifecycle: Lifecycle::Created,
                query: QueryState::new(&config),
                store: CatalogStore::default(),
                visible: Vec::new(),
                total_pages: None,
                loading: false,
                mount_pending: false,
                error: None,
                debouncer,
                debounce_rx: Some(debounce_rx),
                debounce_pump: None,
            }),
            config,
            view,
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn subscribe(&self) -> watch::Receiver<CatalogView> {
        self.view.subscribe()
    }

    pub fn snapshot(&self) -> CatalogView {
        self.view.borrow().clone()
    }

    pub async fn query_state(&self) -> QueryState {
        self.inner.lock().await.query.clone()
    }

    pub async fn store(&self) -> CatalogStore {
        self.inner.lock().await.store.clone()
    }

    /// Fetches the label vocabulary and the variant's initial products.
    /// `loading` stays set until both have resolved.
    pub async fn on_mount(self: &Arc<Self>) {
        let mut guard = self.inner.lock().await;
        if guard.lifecycle != Lifecycle::Created {
            warn!(lifecycle = ?guard.lifecycle, "catalog view mounted twice; ignoring");
            return;
        }
        guard.lifecycle = Lifecycle::Mounted;
        info!(variant = ?self.config.variant, "catalog view mounted");

        if let Some(rx) = guard.debounce_rx.take() {
            guard.debounce_pump = Some(self.spawn_debounce_pump(rx));
        }

        guard.query.request_sequence += 1;
        let sequence = guard.query.request_sequence;
        let products_query = self.remote_query(&guard.query);
        guard.loading = true;
        guard.mount_pending = true;
        self.publish(&guard);
        drop(guard);

        let weak = Arc::downgrade(self);
        let gateway = Arc::clone(&self.gateway);
        tokio::spawn(async move {
            let labels = gateway.fetch_labels();
            let products = async {
                match &products_query {
                    Some(query) => Some((query.mode, gateway.fetch_products(query).await)),
                    None => None,
                }
            };
            let (labels, products) = futures::join!(labels, products);
            if let Some(coordinator) = weak.upgrade() {
                coordinator.apply_mount(sequence, labels, products).await;
            }
        });
    }

    /// Cancels the debounce timer and turns every outstanding response stale.
    pub async fn on_unmount(&self) {
        let mut guard = self.inner.lock().await;
        if guard.lifecycle == Lifecycle::Unmounted {
            return;
        }
        guard.lifecycle = Lifecycle::Unmounted;
        guard.debouncer.cancel();
        guard.query.request_sequence += 1;
        if let Some(pump) = guard.debounce_pump.take() {
            pump.abort();
        }
        guard.loading = false;
        guard.mount_pending = false;
        info!(sequence = guard.query.request_sequence, "catalog view unmounted");
        self.publish(&guard);
    }

    pub async fn set_selected_labels<I, S>(self: &Arc<Self>, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let selected: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        let mut guard = self.inner.lock().await;
        if guard.lifecycle == Lifecycle::Unmounted || guard.query.selected_labels == selected {
            return;
        }
        guard.query.selected_labels = selected;
        guard.query.page = 1;
        self.requery_or_rederive(&mut guard);
    }

    pub async fn set_sort_key(self: &Arc<Self>, sort_key: SortKey) {
        let mut guard = self.inner.lock().await;
        if guard.lifecycle == Lifecycle::Unmounted || guard.query.sort_key == sort_key {
            return;
        }
        guard.query.sort_key = sort_key;
        guard.query.page = 1;
        self.requery_or_rederive(&mut guard);
    }

    /// Routes text input through the debouncer. Clearing the field commits
    /// immediately.
    pub async fn set_search_term(self: &Arc<Self>, text: &str) {
        let mut guard = self.inner.lock().await;
        if guard.lifecycle == Lifecycle::Unmounted {
            return;
        }
        if let Some(cleared) = guard.debouncer.input(text.trim()) {
            self.commit_search(&mut guard, cleared);
        }
    }

    /// Out-of-range pages are clamped into `1..=total_pages`.
    pub async fn set_page(self: &Arc<Self>, page: u32) {
        let mut guard = self.inner.lock().await;
        if guard.lifecycle == Lifecycle::Unmounted {
            return;
        }
        let total_pages = self.known_page_count(&guard);
        let clamped = engine::clamp_page(page, total_pages);
        if clamped != page {
            debug!(requested = page, clamped, total_pages, "page clamped");
        }
        if clamped == guard.query.page {
            self.publish(&guard);
            return;
        }
        guard.query.page = clamped;

        let remote_paged = self
            .remote_query(&guard.query)
            .is_some_and(|query| query.page.is_some());
        if remote_paged {
            self.dispatch(&mut guard);
        } else {
            self.rederive(&mut guard);
            self.publish(&guard);
        }
    }

    /// Re-issues the current query under a fresh sequence number.
    pub async fn refresh(self: &Arc<Self>) {
        let mut guard = self.inner.lock().await;
        if guard.lifecycle != Lifecycle::Mounted {
            return;
        }
        self.dispatch(&mut guard);
    }

    fn spawn_debounce_pump(
        self: &Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<DebouncedTerm>,
    ) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(fired) = rx.recv().await {
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                coordinator.on_debounce_elapsed(fired).await;
            }
        })
    }

    async fn on_debounce_elapsed(self: &Arc<Self>, fired: DebouncedTerm) {
        let mut guard = self.inner.lock().await;
        if guard.lifecycle != Lifecycle::Mounted || !guard.debouncer.settle(&fired) {
            debug!(generation = fired.generation, "ignoring superseded search timer");
            return;
        }
        self.commit_search(&mut guard, fired.term);
    }

    fn commit_search(self: &Arc<Self>, state: &mut CoordinatorState, term: String) {
        if state.query.search_term == term {
            return;
        }
        debug!(term = %term, "search term committed");
        state.query.search_term = term;
        state.query.page = 1;
        self.dispatch(state);
    }

    /// Label and sort changes only reach the network for the paged variant
    /// outside of a search.
    fn requery_or_rederive(self: &Arc<Self>, state: &mut CoordinatorState) {
        if self.config.variant == ViewVariant::Paged && !state.query.search_active() {
            self.dispatch(state);
        } else {
            self.rederive(state);
            self.publish(state);
        }
    }

    /// Follows the data actually held rather than the committed search term.
    fn pagination(&self, state: &CoordinatorState) -> Pagination {
        let bulk = matches!(self.config.variant, ViewVariant::Bulk { .. });
        if bulk && state.store.source != Some(QueryMode::Search) {
            Pagination::Local {
                page: state.query.page,
                page_size: state.query.page_size,
            }
        } else {
            Pagination::Remote
        }
    }

    fn remote_query(&self, query: &QueryState) -> Option<CatalogQuery> {
        if query.search_active() {
            return Some(CatalogQuery::search(query.search_term.clone()));
        }
        match self.config.variant {
            ViewVariant::Bulk { in_stock } => {
                Some(CatalogQuery::bulk(self.config.bulk_size, in_stock))
            }
            ViewVariant::Paged if query.selected_labels.is_empty() => Some(CatalogQuery::paged(
                query.page,
                query.page_size,
                query.sort_key,
            )),
            ViewVariant::Paged => Some(CatalogQuery::labeled(
                query.selected_labels.iter().cloned().collect(),
                query.page,
                query.page_size,
                query.sort_key,
            )),
            ViewVariant::SearchOnly => None,
        }
    }

    fn known_page_count(&self, state: &CoordinatorState) -> u32 {
        match self.pagination(state) {
            Pagination::Local { page_size, .. } => {
                let filtered = engine::filter_and_sort(&state.store.items, &state.query.filter());
                engine::page_count(filtered.len(), page_size)
            }
            Pagination::Remote => state.store.total_pages.unwrap_or(1).max(1),
        }
    }

    fn dispatch(self: &Arc<Self>, state: &mut CoordinatorState) {
        if state.lifecycle != Lifecycle::Mounted {
            self.rederive(state);
            self.publish(state);
            return;
        }

        state.query.request_sequence += 1;
        let sequence = state.query.request_sequence;

        let Some(query) = self.remote_query(&state.query) else {
            debug!(sequence, "no product query for this view; clearing results");
            state.store.items.clear();
            state.store.total_pages = None;
            state.store.source = None;
            state.loading = false;
            state.error = None;
            self.rederive(state);
            self.publish(state);
            return;
        };

        debug!(sequence, mode = %query.mode, page = ?query.page, "dispatching catalog query");
        state.loading = true;
        self.publish(state);

        let weak = Arc::downgrade(self);
        let gateway = Arc::clone(&self.gateway);
        tokio::spawn(async move {
            let result = gateway.fetch_products(&query).await;
            if let Some(coordinator) = weak.upgrade() {
                coordinator.apply_products(sequence, query.mode, result).await;
            }
        });
    }

    async fn apply_products(
        &self,
        sequence: u64,
        mode: QueryMode,
        result: Result<CatalogPage, FetchFailure>,
    ) {
        let mut guard = self.inner.lock().await;
        if !self.is_current(&guard, sequence) {
            debug!(
                sequence,
                current = guard.query.request_sequence,
                %mode,
                "discarding stale catalog response"
            );
            return;
        }
        guard.loading = false;
        self.absorb_products(&mut guard, mode, result);
        self.publish(&guard);
    }

    async fn apply_mount(
        &self,
        sequence: u64,
        labels: Result<Vec<Label>, FetchFailure>,
        products: Option<(QueryMode, Result<CatalogPage, FetchFailure>)>,
    ) {
        let mut guard = self.inner.lock().await;
        if guard.lifecycle != Lifecycle::Mounted {
            return;
        }
        guard.mount_pending = false;

        // A newer query owns `loading` and the product list.
        if self.is_current(&guard, sequence) {
            guard.loading = false;
            match products {
                Some((mode, result)) => self.absorb_products(&mut guard, mode, result),
                None => self.rederive(&mut guard),
            }
        } else if products.is_some() {
            debug!(sequence, "discarding stale initial product page");
        }

        match labels {
            Ok(labels) => guard.store.labels = labels,
            Err(failure) => {
                warn!(kind = ?failure.kind(), %failure, "label vocabulary unavailable");
                guard.error = Some(failure);
            }
        }
        self.publish(&guard);
    }

    fn is_current(&self, state: &CoordinatorState, sequence: u64) -> bool {
        state.lifecycle == Lifecycle::Mounted && state.query.request_sequence == sequence
    }

    /// On failure the store is untouched, so the last visible list stays.
    fn absorb_products(
        &self,
        state: &mut CoordinatorState,
        mode: QueryMode,
        result: Result<CatalogPage, FetchFailure>,
    ) {
        match result {
            Ok(page) => {
                debug!(
                    items = page.items.len(),
                    total_pages = page.total_pages,
                    "catalog response applied"
                );
                state.store.items = page.items;
                state.store.total_pages = Some(page.total_pages);
                state.store.source = Some(mode);
                state.error = None;
                self.rederive(state);
            }
            Err(failure) => {
                warn!(
                    kind = ?failure.kind(),
                    %failure,
                    "catalog query failed; keeping previous results"
                );
                state.error = Some(failure);
            }
        }
    }

    fn rederive(&self, state: &mut CoordinatorState) {
        let filter = state.query.filter();
        match self.pagination(state) {
            Pagination::Local { page, page_size } => {
                let filtered = engine::filter_and_sort(&state.store.items, &filter);
                let total_pages = engine::page_count(filtered.len(), page_size);
                let page = engine::clamp_page(page, total_pages);
                state.query.page = page;
                state.visible = engine::paginate(filtered, Pagination::Local { page, page_size });
                state.total_pages = state.store.total_pages.map(|_| total_pages);
            }
            Pagination::Remote => {
                state.visible = engine::derive(&state.store.items, &filter, Pagination::Remote);
                state.total_pages = state.store.total_pages;
            }
        }
    }

    fn publish(&self, state: &CoordinatorState) {
        self.view.send_replace(CatalogView {
            visible_items: state.visible.clone(),
            loading: state.loading || state.mount_pending,
            error: state.error.is_some(),
            error_detail: state.error.as_ref().map(ToString::to_string),
            total_pages: state.total_pages,
            page: state.query.page,
            labels: state.store.labels.clone(),
            search_term: state.query.search_term.clone(),
        });
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
