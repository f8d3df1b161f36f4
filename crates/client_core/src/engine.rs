//! Pure transform from a raw product list and filter state to the exact slice
//! to display. Scope filter, label filter, sort and paginate always run in
//! that order.

use std::{cmp::Ordering, collections::BTreeSet};

use shared::domain::{DrinkType, Product, SortKey};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub drink_type_scope: Option<DrinkType>,
    pub selected_labels: BTreeSet<String>,
    pub sort_key: SortKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// The remote side already returned exactly one page.
    Remote,
    Local { page: u32, page_size: u32 },
}

pub fn derive(items: &[Product], filter: &FilterState, pagination: Pagination) -> Vec<Product> {
    paginate(filter_and_sort(items, filter), pagination)
}

/// Steps 1-3: scope, labels (any selected label qualifies), stable sort.
pub fn filter_and_sort(items: &[Product], filter: &FilterState) -> Vec<Product> {
    let mut kept: Vec<Product> = items
        .iter()
        .filter(|product| match &filter.drink_type_scope {
            Some(scope) => product.drink_type.as_ref() == Some(scope),
            None => true,
        })
        .filter(|product| {
            filter.selected_labels.is_empty()
                || product
                    .labels
                    .iter()
                    .any(|label| filter.selected_labels.contains(&label.name))
        })
        .cloned()
        .collect();

    // `sort_by` is stable, ties keep input order.
    match filter.sort_key {
        SortKey::Name => kept.sort_by(|a, b| compare_names(&a.name, &b.name)),
        SortKey::Rating => kept.sort_by(|a, b| b.rating_or_zero().total_cmp(&a.rating_or_zero())),
        SortKey::AlcoholContent => {
            kept.sort_by(|a, b| b.alcohol_content.total_cmp(&a.alcohol_content))
        }
    }
    kept
}

pub fn paginate(items: Vec<Product>, pagination: Pagination) -> Vec<Product> {
    match pagination {
        Pagination::Remote => items,
        Pagination::Local { page, page_size } => {
            let page_size = page_size.max(1) as usize;
            let start = (page.max(1) as usize - 1).saturating_mul(page_size);
            items.into_iter().skip(start).take(page_size).collect()
        }
    }
}

/// Number of local pages for `len` filtered items. Never below one.
pub fn page_count(len: usize, page_size: u32) -> u32 {
    let page_size = page_size.max(1) as usize;
    let pages = len.div_ceil(page_size).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

pub fn clamp_page(page: u32, total_pages: u32) -> u32 {
    page.clamp(1, total_pages.max(1))
}

/// Case-insensitive ordering with a code point tie-break, so "apple" sorts
/// next to "Apple" instead of after "Zombie".
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    folded.then_with(|| a.cmp(b))
}
