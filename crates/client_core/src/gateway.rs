//! Remote catalog reads. Every call is exactly one outbound request and every
//! failure comes back as a [`FetchFailure`] value.

use std::fmt;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Label, Product, ProductId, SortKey},
    error::FetchFailure,
    protocol::{LabelRecord, ProductListResponse, ProductRecord},
};
use tracing::{debug, warn};
use url::Url;

use crate::config::Settings;

const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Full,
    Labeled,
    Search,
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueryMode::Full => "full",
            QueryMode::Labeled => "labeled",
            QueryMode::Search => "search",
        })
    }
}

/// Describes one product read.
///
/// `Full` without a `page` is the unpaged bulk read; with a `page` it is the
/// remote paged list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogQuery {
    pub mode: QueryMode,
    pub labels: Vec<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub search_term: Option<String>,
    pub sort_key: Option<SortKey>,
    pub in_stock: bool,
}

impl CatalogQuery {
    pub fn bulk(size: u32, in_stock: bool) -> Self {
        Self {
            mode: QueryMode::Full,
            labels: Vec::new(),
            page: None,
            page_size: Some(size),
            search_term: None,
            sort_key: None,
            in_stock,
        }
    }

    pub fn paged(page: u32, page_size: u32, sort_key: SortKey) -> Self {
        Self {
            mode: QueryMode::Full,
            labels: Vec::new(),
            page: Some(page),
            page_size: Some(page_size),
            search_term: None,
            sort_key: Some(sort_key),
            in_stock: false,
        }
    }

    pub fn labeled(labels: Vec<String>, page: u32, page_size: u32, sort_key: SortKey) -> Self {
        Self {
            mode: QueryMode::Labeled,
            labels,
            ..Self::paged(page, page_size, sort_key)
        }
    }

    pub fn search(term: impl Into<String>) -> Self {
        Self {
            mode: QueryMode::Search,
            labels: Vec::new(),
            page: None,
            page_size: None,
            search_term: Some(term.into()),
            sort_key: None,
            in_stock: false,
        }
    }

    fn path(&self) -> &'static str {
        match self.mode {
            QueryMode::Search => "cocktails/search",
            QueryMode::Full | QueryMode::Labeled => "cocktails",
        }
    }

    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if self.mode == QueryMode::Search {
            pairs.push(("search_term", self.search_term.clone().unwrap_or_default()));
            return pairs;
        }
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(size) = self.page_size {
            pairs.push(("size", size.to_string()));
        }
        if self.mode == QueryMode::Labeled {
            pairs.extend(self.labels.iter().map(|label| ("labels", label.clone())));
        }
        if let Some(sort_key) = self.sort_key {
            pairs.push(("order_by", sort_key.as_query_value().to_string()));
        }
        if self.in_stock {
            pairs.push(("in_stock", "true".to_string()));
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogPage {
    pub items: Vec<Product>,
    pub total_pages: u32,
}

#[async_trait]
pub trait CatalogGateway: Send + Sync {
    async fn fetch_products(&self, query: &CatalogQuery) -> Result<CatalogPage, FetchFailure>;
    async fn fetch_labels(&self) -> Result<Vec<Label>, FetchFailure>;
    async fn fetch_product(&self, id: ProductId) -> Result<Product, FetchFailure>;
    /// Whether the API recognises the caller. Never fails; any error is `false`.
    async fn identity_present(&self) -> bool;
}

pub struct HttpCatalogGateway {
    http: Client,
    base_url: Url,
    identity_path: String,
}

impl HttpCatalogGateway {
    pub fn new(
        http: Client,
        base_url: &str,
        identity_path: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("invalid catalog api url '{base_url}'"))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http,
            base_url,
            identity_path: identity_path.into(),
        })
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .context("failed to build http client")?;
        Self::new(http, &settings.api_url, settings.identity_path.clone())
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchFailure> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| FetchFailure::network(format!("invalid endpoint '{path}': {err}")))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, FetchFailure> {
        let response = request
            .send()
            .await
            .map_err(|err| FetchFailure::network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(FetchFailure::http(status.as_u16(), detail));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| FetchFailure::network(err.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|err| FetchFailure::decode(err.to_string()))
    }
}

fn decode_products(records: Vec<ProductRecord>) -> Result<Vec<Product>, FetchFailure> {
    records
        .into_iter()
        .map(|record| {
            Product::try_from(record).map_err(|err| FetchFailure::decode(err.to_string()))
        })
        .collect()
}

#[async_trait]
impl CatalogGateway for HttpCatalogGateway {
    async fn fetch_products(&self, query: &CatalogQuery) -> Result<CatalogPage, FetchFailure> {
        let url = self.endpoint(query.path())?;
        debug!(mode = %query.mode, %url, "fetching catalog products");

        let result: Result<CatalogPage, FetchFailure> = async {
            let body: ProductListResponse = self
                .get_json(self.http.get(url).query(&query.query_pairs()))
                .await?;
            let items = decode_products(body.items)?;
            Ok(CatalogPage {
                items,
                total_pages: body.pages.unwrap_or(1).max(1),
            })
        }
        .await;

        if let Err(failure) = &result {
            warn!(
                mode = %query.mode,
                kind = ?failure.kind(),
                %failure,
                "catalog product fetch failed"
            );
        }
        result
    }

    async fn fetch_labels(&self) -> Result<Vec<Label>, FetchFailure> {
        let url = self.endpoint("labels")?;
        let records: Vec<LabelRecord> = self.get_json(self.http.get(url)).await.map_err(|failure| {
            warn!(kind = ?failure.kind(), %failure, "label vocabulary fetch failed");
            failure
        })?;
        Ok(records.into_iter().map(Label::from).collect())
    }

    async fn fetch_product(&self, id: ProductId) -> Result<Product, FetchFailure> {
        let url = self.endpoint("cocktails")?;
        let body: ProductListResponse = self
            .get_json(self.http.get(url).query(&[("cocktail_id", id.0)]))
            .await?;
        let record = body
            .items
            .into_iter()
            .next()
            .ok_or_else(|| FetchFailure::http(404, format!("cocktail {id} not found")))?;
        Product::try_from(record).map_err(|err| FetchFailure::decode(err.to_string()))
    }

    async fn identity_present(&self) -> bool {
        let url = match self.endpoint(&self.identity_path) {
            Ok(url) => url,
            Err(_) => return false,
        };
        match self.http.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(error = %err, "identity probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
