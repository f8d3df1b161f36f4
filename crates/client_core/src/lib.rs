//! Catalog query pipeline: remote reads, search debouncing, the pure
//! filter/sort/paginate engine and the view-state coordinator that ties them
//! together.

pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod engine;
pub mod gateway;

pub use coordinator::{
    CatalogCoordinator, CatalogStore, CatalogView, CoordinatorConfig, QueryState, ViewVariant,
};
pub use gateway::{CatalogGateway, CatalogPage, CatalogQuery, HttpCatalogGateway, QueryMode};
